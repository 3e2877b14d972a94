use super::*;
use std::cell::{Cell, RefCell};

use futures::channel::oneshot;
use futures::executor::block_on;
use futures::future::join;

use crate::options::{StringEncoding, UnsupportedPolicy};
use crate::value::{ErrorKind, ViewKind};

const PREFIX: [u8; 2] = [0xC0, 0x01];
/// Empty ExtraTypeInfo + EOF.
const EMPTY_SUFFIX: [u8; 4] = [0xB8, 0x19, 0x00, 0x40];

fn enc(value: &Value) -> Vec<u8> {
    encode(value, &TypeRegistry::new(), &EncodeOptions::default()).unwrap()
}

fn enc_with(value: &Value, options: EncodeOptions) -> Vec<u8> {
    encode(value, &TypeRegistry::new(), &options).unwrap()
}

/// Root record bytes of an encoding without extra types.
fn body(bytes: &[u8]) -> &[u8] {
    assert_eq!(bytes[..2], PREFIX, "format version");
    assert_eq!(bytes[bytes.len() - 4..], EMPTY_SUFFIX, "trailer");
    &bytes[2..bytes.len() - 4]
}

fn f64_le(value: f64) -> [u8; 8] {
    value.to_le_bytes()
}

// ============================================================================
// Primitive records
// ============================================================================

#[test]
fn encode_small_integer_exact_bytes() {
    assert_eq!(enc(&42.into()), [0xC0, 0x01, 0x19, 0x2A, 0xB8, 0x19, 0x00, 0x40]);
}

#[test]
fn encode_string_utf8() {
    assert_eq!(body(&enc(&"ab".into())), [0x20, 0x19, 0x02, b'a', b'b']);
}

#[test]
fn encode_empty_string() {
    assert_eq!(body(&enc(&"".into())), [0x20, 0x19, 0x00]);
}

#[test]
fn encode_string_utf16() {
    let options = EncodeOptions::default().with_string_encoding(StringEncoding::Utf16);
    let bytes = enc_with(&"aé".into(), options);
    assert_eq!(body(&bytes), [0x21, 0x19, 0x04, 0x61, 0x00, 0xE9, 0x00]);
}

#[test]
fn utf16_applies_to_values_but_not_keys() {
    let options = EncodeOptions::default().with_string_encoding(StringEncoding::Utf16);
    let value = Value::object([("k", Value::from("v"))]);
    let bytes = enc_with(&value, options);
    assert_eq!(
        body(&bytes),
        [0x50, 0x19, 0x01, 0x19, 0x01, b'k', 0x21, 0x19, 0x02, b'v', 0x00]
    );
}

#[test]
fn encode_singletons() {
    assert_eq!(body(&enc(&Value::Undefined)), [0x00]);
    assert_eq!(body(&enc(&Value::Null)), [0x08]);
    assert_eq!(body(&enc(&false.into())), [0x10]);
    assert_eq!(body(&enc(&true.into())), [0x11]);
}

#[test]
fn numbers_use_minimal_width() {
    assert_eq!(body(&enc(&0.into())), [0x19, 0x00]);
    assert_eq!(body(&enc(&(-1).into())), [0x18, 0xFF]);
    assert_eq!(body(&enc(&300.into())), [0x1B, 0x2C, 0x01]);
    assert_eq!(body(&enc(&(-300).into())), [0x1A, 0xD4, 0xFE]);
    assert_eq!(body(&enc(&70000.into())), [0x1D, 0x70, 0x11, 0x01, 0x00]);
    assert_eq!(body(&enc(&(-70000).into())), [0x1C, 0x90, 0xEE, 0xFE, 0xFF]);
}

#[test]
fn non_integral_numbers_are_doubles() {
    for n in [3.5, -0.0, 2f64.powi(31), f64::INFINITY, 1e300] {
        let bytes = enc(&n.into());
        let b = body(&bytes);
        assert_eq!(b[0], 0x1E, "{n}");
        assert_eq!(b[1..], f64_le(n), "{n}");
    }
}

#[test]
fn nan_is_written_as_double() {
    let bytes = enc(&f64::NAN.into());
    let b = body(&bytes);
    assert_eq!(b[0], 0x1E);
    assert!(f64::from_le_bytes(b[1..9].try_into().unwrap()).is_nan());
}

#[test]
fn bigint_sign_and_magnitude() {
    let mut expected = vec![0x28];
    expected.extend_from_slice(&f64_le(1.0));
    expected.push(0xFF);
    assert_eq!(body(&enc(&Value::bigint(255u64))), expected);

    let mut expected = vec![0x29];
    expected.extend_from_slice(&f64_le(2.0));
    expected.extend_from_slice(&[0x01, 0x00]);
    assert_eq!(body(&enc(&Value::bigint(-256i64))), expected);

    let mut expected = vec![0x28];
    expected.extend_from_slice(&f64_le(0.0));
    assert_eq!(body(&enc(&Value::bigint(0u64))), expected);
}

// ============================================================================
// Containers
// ============================================================================

#[test]
fn encode_dense_array() {
    let value = Value::array([1.into(), 2.into()]);
    assert_eq!(body(&enc(&value)), [0x48, 0x19, 0x02, 0x19, 0x01, 0x19, 0x02]);
}

#[test]
fn sparse_array_collapses_hole_runs() {
    let value = Value::sparse_array([Some(1.into()), None, None, Some(2.into())]);
    assert_eq!(
        body(&enc(&value)),
        [0x48, 0x19, 0x04, 0x19, 0x01, 0x30, 0x19, 0x02, 0x19, 0x02]
    );
}

#[test]
fn trailing_holes_are_written() {
    let value = Value::sparse_array([None, None, None]);
    assert_eq!(body(&enc(&value)), [0x48, 0x19, 0x03, 0x30, 0x19, 0x03]);
}

#[test]
fn explicit_undefined_is_not_a_hole() {
    let value = Value::sparse_array([Some(Value::Undefined), None]);
    assert_eq!(body(&enc(&value)), [0x48, 0x19, 0x02, 0x00, 0x30, 0x19, 0x01]);
}

#[test]
fn plain_object_keeps_insertion_order() {
    let value = Value::object([("b", Value::from(1)), ("a", Value::from(2))]);
    assert_eq!(
        body(&enc(&value)),
        [0x50, 0x19, 0x02, 0x19, 0x01, b'b', 0x19, 0x01, 0x19, 0x01, b'a', 0x19, 0x02]
    );
}

#[test]
fn encode_set_and_map() {
    let set = Value::set([1.into(), "x".into()]);
    assert_eq!(body(&enc(&set)), [0x58, 0x19, 0x02, 0x19, 0x01, 0x20, 0x19, 0x01, b'x']);

    let map = Value::map([(Value::Null, true.into())]);
    assert_eq!(body(&enc(&map)), [0x60, 0x19, 0x01, 0x08, 0x11]);
}

// ============================================================================
// References
// ============================================================================

#[test]
fn self_cycle_becomes_reference_zero() {
    let value = Value::object(Vec::<(&str, Value)>::new());
    value.as_obj().unwrap().insert("self", value.clone());
    assert_eq!(
        body(&enc(&value)),
        [0x50, 0x19, 0x01, 0x19, 0x04, b's', b'e', b'l', b'f', 0x38, 0x19, 0x00]
    );
}

#[test]
fn shared_value_is_written_once() {
    let shared = Value::object(Vec::<(&str, Value)>::new());
    let value = Value::array([shared.clone(), shared]);
    // Array = Referenz 0, geteiltes Objekt = Referenz 1.
    assert_eq!(
        body(&enc(&value)),
        [0x48, 0x19, 0x02, 0x50, 0x19, 0x00, 0x38, 0x19, 0x01]
    );
}

#[test]
fn equal_but_distinct_values_are_not_shared() {
    let value = Value::array([Value::date(0.0), Value::date(0.0)]);
    let bytes = enc(&value);
    assert!(!body(&bytes).contains(&0x38));
}

#[test]
fn mutual_cycle_terminates() {
    let a = Value::array(Vec::<Value>::new());
    let b = Value::array([a.clone()]);
    a.as_obj().unwrap().push(b.clone());
    // a: Array(1) -> b: Array(1) -> Reference 0
    assert_eq!(
        body(&enc(&a)),
        [0x48, 0x19, 0x01, 0x48, 0x19, 0x01, 0x38, 0x19, 0x00]
    );
}

#[test]
fn encoding_is_deterministic() {
    let inner = Value::set([1.into(), Value::date(5.0)]);
    let value = Value::object([
        ("list", Value::array([inner.clone(), inner, 2.5.into()])),
        ("map", Value::map([("k".into(), Value::regexp("a+", "g"))])),
    ]);
    assert_eq!(enc(&value), enc(&value));
}

// ============================================================================
// Built-in object kinds
// ============================================================================

#[test]
fn boxed_primitives() {
    assert_eq!(body(&enc(&Value::boxed_boolean(true))), [0x79]);
    assert_eq!(body(&enc(&Value::boxed_number(7.0))), [0x81, 0x07]);
    assert_eq!(body(&enc(&Value::boxed_string("s"))), [0x88, 0x19, 0x01, b's']);

    let mut expected = vec![0x91];
    expected.extend_from_slice(&f64_le(1.0));
    expected.push(0x05);
    assert_eq!(body(&enc(&Value::boxed_bigint(-5i64))), expected);
}

#[test]
fn date_is_untagged_double() {
    let mut expected = vec![0x98];
    expected.extend_from_slice(&f64_le(1_700_000_000_000.0));
    assert_eq!(body(&enc(&Value::date(1_700_000_000_000.0))), expected);
}

#[test]
fn regexp_source_and_flags() {
    assert_eq!(
        body(&enc(&Value::regexp("a.b", "gi"))),
        [0xA0, 0x19, 0x03, b'a', b'.', b'b', 0x19, 0x02, b'g', b'i']
    );
}

#[test]
fn error_kind_message_and_stack() {
    assert_eq!(
        body(&enc(&Value::error(ErrorKind::TypeError, "no"))),
        [0xAD, 0x20, 0x19, 0x02, b'n', b'o', 0x00]
    );

    let with_stack = Value::Obj(Obj::new(Object::Error(ErrorValue {
        kind: ErrorKind::Error,
        message: None,
        stack: Some("at x".into()),
    })));
    assert_eq!(
        body(&enc(&with_stack)),
        [0xA8, 0x00, 0x20, 0x19, 0x04, b'a', b't', b' ', b'x']
    );
}

#[test]
fn array_buffer_small() {
    let mut expected = vec![0x68];
    expected.extend_from_slice(&f64_le(3.0));
    expected.extend_from_slice(&[1, 2, 3]);
    assert_eq!(body(&enc(&Value::array_buffer(vec![1u8, 2, 3]))), expected);
}

#[test]
fn typed_array_view_window() {
    let view = Value::typed_array(ViewKind::Uint16, vec![0u8, 1, 2, 3, 4, 5, 6, 7], 2, 2).unwrap();
    let mut expected = vec![0x70, ViewKind::Uint16 as u8];
    expected.extend_from_slice(&f64_le(4.0));
    expected.extend_from_slice(&f64_le(2.0));
    expected.extend_from_slice(&f64_le(2.0));
    expected.extend_from_slice(&[2, 3, 4, 5]);
    assert_eq!(body(&enc(&view)), expected);
}

#[test]
fn large_array_buffer_is_passed_through() {
    let data = Bytes::from(vec![0x5A; crate::chunk_buffer::ZERO_COPY_THRESHOLD * 2]);
    let value = Value::array_buffer(data.clone());
    let chunks = encode_chunks(&value, &TypeRegistry::new(), &EncodeOptions::default()).unwrap();
    assert!(chunks.iter().any(|c| c.as_ptr() == data.as_ptr() && c.len() == data.len()));
    assert_eq!(chunks.concat().len(), 2 + 1 + 8 + data.len() + 4);
}

// ============================================================================
// Unsupported values
// ============================================================================

#[test]
fn unsupported_fails_by_default() {
    let err = encode(&Value::symbol("s"), &TypeRegistry::new(), &EncodeOptions::default()).unwrap_err();
    assert_eq!(err, Error::unsupported("symbol"));

    let nested = Value::array([Value::function("f")]);
    let err = encode(&nested, &TypeRegistry::new(), &EncodeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedValue { .. }));
}

#[test]
fn omitted_root_becomes_undefined() {
    for policy in [UnsupportedPolicy::Warn, UnsupportedPolicy::Avoid] {
        let options = EncodeOptions::default().with_unsupported(policy);
        let bytes = enc_with(&Value::symbol("s"), options);
        assert_eq!(bytes, [0xC0, 0x01, 0x00, 0xB8, 0x19, 0x00, 0x40]);
    }
}

#[test]
fn omitted_object_value_drops_key() {
    let options = EncodeOptions::default().with_unsupported(UnsupportedPolicy::Avoid);
    let value = Value::object([("f", Value::function("f")), ("n", Value::from(1))]);
    assert_eq!(
        body(&enc_with(&value, options)),
        [0x50, 0x19, 0x01, 0x19, 0x01, b'n', 0x19, 0x01]
    );
}

#[test]
fn omitted_array_element_becomes_hole() {
    let options = EncodeOptions::default().with_unsupported(UnsupportedPolicy::Warn);
    let value = Value::array([Value::symbol("s"), 1.into()]);
    assert_eq!(
        body(&enc_with(&value, options)),
        [0x48, 0x19, 0x02, 0x30, 0x19, 0x01, 0x19, 0x01]
    );
}

#[test]
fn omitted_elements_merge_with_hole_runs() {
    let options = EncodeOptions::default().with_unsupported(UnsupportedPolicy::Avoid);
    let value = Value::sparse_array([None, Some(Value::function("f")), None, Some(7.into())]);
    assert_eq!(
        body(&enc_with(&value, options)),
        [0x48, 0x19, 0x04, 0x30, 0x19, 0x03, 0x19, 0x07]
    );
}

#[test]
fn omission_in_nested_array_keeps_sibling_in_place() {
    let options = EncodeOptions::default().with_unsupported(UnsupportedPolicy::Avoid);
    let value = Value::array([Value::array([Value::symbol("s")]), 7.into()]);
    // Inneres Array: 1 Slot als Luecke, danach folgt die 7 als zweites Element.
    assert_eq!(
        body(&enc_with(&value, options)),
        [0x48, 0x19, 0x02, 0x48, 0x19, 0x01, 0x30, 0x19, 0x01, 0x19, 0x07]
    );
}

#[test]
fn omitted_extra_type_component_becomes_undefined() {
    let mut registry = TypeRegistry::new();
    registry
        .define("Tagged", |v: &Value| match v.downcast_host::<Point>() {
            Some(p) => Serialized::Components(vec![Value::symbol("tag"), p.x.into()]),
            None => Serialized::Unmatched,
        })
        .unwrap();
    let options = EncodeOptions::default().with_unsupported(UnsupportedPolicy::Avoid);
    let bytes = encode(&Value::host(Point { x: 4.0, y: 0.0 }), &registry, &options).unwrap();
    assert_eq!(bytes[2..10], [0xB0, 0x00, 0x00, 0x19, 0x02, 0x00, 0x19, 0x04]);
    assert_eq!(bytes[10], 0xB8);
}

#[test]
fn warn_policy_logs_each_omission() {
    capture_log::install();
    let options = EncodeOptions::default().with_unsupported(UnsupportedPolicy::Warn);
    let value = Value::array([Value::symbol("s"), Value::function("f")]);
    enc_with(&value, options);
    let warnings = capture_log::take();
    assert_eq!(warnings.len(), 2, "{warnings:?}");
    assert!(warnings[0].contains("symbol"), "{warnings:?}");
    assert!(warnings[1].contains("function"), "{warnings:?}");

    let options = EncodeOptions::default().with_unsupported(UnsupportedPolicy::Avoid);
    enc_with(&value, options);
    assert!(capture_log::take().is_empty());
}

/// Sammelt Warnungen pro Test-Thread.
mod capture_log {
    use std::cell::RefCell;
    use std::sync::Once;

    use log::{Level, LevelFilter, Log, Metadata, Record};

    thread_local! {
        static WARNINGS: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    struct Capture;

    impl Log for Capture {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            metadata.level() <= Level::Warn
        }

        fn log(&self, record: &Record<'_>) {
            if self.enabled(record.metadata()) {
                WARNINGS.with(|w| w.borrow_mut().push(record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture;
    static INSTALL: Once = Once::new();

    pub(super) fn install() {
        INSTALL.call_once(|| {
            log::set_logger(&CAPTURE).expect("no other logger in unit tests");
            log::set_max_level(LevelFilter::Warn);
        });
        take();
    }

    pub(super) fn take() -> Vec<String> {
        WARNINGS.with(|w| std::mem::take(&mut *w.borrow_mut()))
    }
}

#[test]
fn omitted_set_element_and_map_entries() {
    let options = EncodeOptions::default().with_unsupported(UnsupportedPolicy::Avoid);
    let set = Value::set([Value::host(1u8), 2.into()]);
    assert_eq!(body(&enc_with(&set, options.clone())), [0x58, 0x19, 0x01, 0x19, 0x02]);

    let map = Value::map([
        (Value::symbol("k"), 1.into()),
        (2.into(), Value::symbol("v")),
    ]);
    assert_eq!(body(&enc_with(&map, options)), [0x60, 0x19, 0x01, 0x19, 0x02, 0x00]);
}

// ============================================================================
// Extra types
// ============================================================================

struct Point {
    x: f64,
    y: f64,
}

fn point_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .define("Point", |value: &Value| match value.downcast_host::<Point>() {
            Some(p) => Serialized::Components(vec![p.x.into(), p.y.into()]),
            None => Serialized::Unmatched,
        })
        .unwrap();
    registry
}

#[test]
fn extra_type_point_exact_bytes() {
    let value = Value::host(Point { x: 1.0, y: 2.0 });
    let bytes = encode(&value, &point_registry(), &EncodeOptions::default()).unwrap();
    assert_eq!(
        bytes,
        [
            0xC0, 0x01, // FormatVersion
            0xB0, 0x00, 0x00, 0x19, 0x02, 0x19, 0x01, 0x19, 0x02, // Point(1, 2)
            0xB8, 0x19, 0x01, 0x20, 0x19, 0x05, b'P', b'o', b'i', b'n', b't', // manifest
            0x40,
        ]
    );
}

#[test]
fn extra_type_serializer_runs_once_per_instance() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let mut registry = TypeRegistry::new();
    registry
        .define("Point", move |value: &Value| match value.downcast_host::<Point>() {
            Some(p) => {
                counter.set(counter.get() + 1);
                Serialized::Components(vec![p.x.into()])
            }
            None => Serialized::Unmatched,
        })
        .unwrap();

    let point = Value::host(Point { x: 3.0, y: 0.0 });
    let value = Value::array([point.clone(), point]);
    let bytes = encode(&value, &registry, &EncodeOptions::default()).unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(
        bytes[2..14],
        [0x48, 0x19, 0x02, 0xB0, 0x00, 0x00, 0x19, 0x01, 0x19, 0x03, 0x38, 0x19][..]
    );
    assert_eq!(bytes[14], 0x01);
}

#[test]
fn type_ids_follow_first_use() {
    struct A;
    struct B;
    let mut registry = TypeRegistry::new();
    registry
        .define("Alpha", |v: &Value| match v.downcast_host::<A>() {
            Some(_) => Serialized::Components(vec![]),
            None => Serialized::Unmatched,
        })
        .unwrap()
        .define("Beta", |v: &Value| match v.downcast_host::<B>() {
            Some(_) => Serialized::Components(vec![]),
            None => Serialized::Unmatched,
        })
        .unwrap();

    let value = Value::array([Value::host(B), Value::host(A)]);
    let bytes = encode(&value, &registry, &EncodeOptions::default()).unwrap();
    let mut expected = vec![0xC0, 0x01, 0x48, 0x19, 0x02];
    expected.extend_from_slice(&[0xB0, 0x00, 0x00, 0x19, 0x00]);
    expected.extend_from_slice(&[0xB0, 0x01, 0x00, 0x19, 0x00]);
    expected.extend_from_slice(&[0xB8, 0x19, 0x02]);
    expected.extend_from_slice(&[0x20, 0x19, 0x04, b'B', b'e', b't', b'a']);
    expected.extend_from_slice(&[0x20, 0x19, 0x05, b'A', b'l', b'p', b'h', b'a']);
    expected.push(0x40);
    assert_eq!(bytes, expected);
}

#[test]
fn extra_types_claim_built_in_kinds() {
    let mut registry = TypeRegistry::new();
    registry
        .define("Stamp", |v: &Value| match v.as_obj().map(|o| matches!(&*o.borrow(), Object::Date(_))) {
            Some(true) => Serialized::Components(vec!["t".into()]),
            _ => Serialized::Unmatched,
        })
        .unwrap();
    let bytes = encode(&Value::date(1.0), &registry, &EncodeOptions::default()).unwrap();
    assert_eq!(bytes[2..10], [0xB0, 0x00, 0x00, 0x19, 0x01, 0x20, 0x19, 0x01]);
}

// ============================================================================
// Deferred extra types
// ============================================================================

/// Host value whose serialization arrives through a channel.
struct Later {
    rx: RefCell<Option<oneshot::Receiver<Vec<Value>>>>,
}

fn later(rx: oneshot::Receiver<Vec<Value>>) -> Value {
    Value::host(Later { rx: RefCell::new(Some(rx)) })
}

fn later_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .define("Later", |value: &Value| match value.downcast_host::<Later>() {
            Some(later) => {
                let rx = later.rx.borrow_mut().take().expect("serialized twice");
                Serialized::deferred(async move { rx.await.unwrap_or_default() })
            }
            None => Serialized::Unmatched,
        })
        .unwrap();
    registry
}

/// Same type name, resolved immediately. Components come from a queue in
/// walk order.
fn eager_registry(results: Vec<Vec<Value>>) -> TypeRegistry {
    let queue = RefCell::new(results.into_iter());
    let mut registry = TypeRegistry::new();
    registry
        .define("Later", move |value: &Value| match value.downcast_host::<Later>() {
            Some(_) => Serialized::Components(queue.borrow_mut().next().unwrap()),
            None => Serialized::Unmatched,
        })
        .unwrap();
    registry
}

#[test]
fn sync_target_rejects_pending_results() {
    let (_tx, rx) = oneshot::channel();
    let registry = later_registry();
    let encoding = Encoder::new(&registry, EncodeOptions::default())
        .encode(&later(rx))
        .unwrap();
    assert_eq!(encoding.pending(), 1);
    assert!(!encoding.is_complete());
    assert_eq!(encoding.into_bytes().unwrap_err(), Error::SyncTargetConflict { pending: 1 });
}

#[test]
fn encoding_completes_once_deferred_results_arrive() {
    let registry = later_registry();
    let (_tx, rx) = oneshot::channel();
    let pending = Encoder::new(&registry, EncodeOptions::default()).encode(&later(rx)).unwrap();
    assert!(!pending.is_complete());

    let done = Encoder::new(&registry, EncodeOptions::default())
        .encode(&Value::array([1.into()]))
        .unwrap();
    assert_eq!(done.pending(), 0);
    assert!(done.is_complete());
    assert_eq!(done.into_bytes().unwrap(), enc(&Value::array([1.into()])));
}

#[test]
fn encode_rejects_deferred_result() {
    let (_tx, rx) = oneshot::channel();
    let err = encode(&later(rx), &later_registry(), &EncodeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::SyncTargetConflict { pending: 1 }));
}

#[test]
fn deferred_results_land_in_walk_order() {
    let (tx1, rx1) = oneshot::channel();
    let (tx2, rx2) = oneshot::channel();
    let registry = later_registry();
    let value = Value::array([later(rx1), "mid".into(), later(rx2)]);
    let encoding = encode_async(&value, &registry, &EncodeOptions::default());

    // Zweites Ergebnis kommt zuerst an.
    let (bytes, ()) = block_on(join(encoding, async move {
        tx2.send(vec![Value::from("second")]).unwrap();
        tx1.send(vec![1.into(), 2.into()]).unwrap();
    }));

    let (_t1, r1) = oneshot::channel();
    let (_t2, r2) = oneshot::channel();
    let eager = eager_registry(vec![vec![1.into(), 2.into()], vec!["second".into()]]);
    let expected = encode(
        &Value::array([later(r1), "mid".into(), later(r2)]),
        &eager,
        &EncodeOptions::default(),
    )
    .unwrap();
    assert_eq!(bytes.unwrap(), expected);
}

#[test]
fn deferred_result_may_defer_again() {
    let (outer_tx, outer_rx) = oneshot::channel();
    let (inner_tx, inner_rx) = oneshot::channel();
    let registry = later_registry();
    let value = later(outer_rx);
    let future = encode_async(&value, &registry, &EncodeOptions::default());

    let (bytes, ()) = block_on(join(future, async move {
        outer_tx.send(vec![later(inner_rx), 9.into()]).unwrap();
        inner_tx.send(vec![Value::Null]).unwrap();
    }));
    assert_eq!(
        bytes.unwrap(),
        [
            0xC0, 0x01,
            0xB0, 0x00, 0x00, 0x19, 0x02, // outer Later, 2 components
            0xB0, 0x00, 0x00, 0x19, 0x01, 0x08, // inner Later(null)
            0x19, 0x09,
            0xB8, 0x19, 0x01, 0x20, 0x19, 0x05, b'L', b'a', b't', b'e', b'r',
            0x40,
        ]
    );
}

#[test]
fn async_targets_without_deferreds_match_sync() {
    let value = Value::object([("a", Value::array([1.into(), Value::Null]))]);
    let registry = TypeRegistry::new();
    let options = EncodeOptions::default();
    let sync = encode(&value, &registry, &options).unwrap();
    assert_eq!(block_on(encode_async(&value, &registry, &options)).unwrap(), sync);
    let chunks = block_on(encode_chunks_async(&value, &registry, &options)).unwrap();
    assert_eq!(chunks.concat(), sync);
}

#[test]
fn stream_yields_all_chunks() {
    let (tx, rx) = oneshot::channel();
    let registry = later_registry();
    let value = Value::array([later(rx), Value::array_buffer(vec![7u8; 20_000])]);
    let stream = encode_stream(&value, &registry, &EncodeOptions::default());
    tx.send(vec![true.into()]).unwrap();
    let chunks: Vec<Bytes> = block_on(stream.map(|c| c.unwrap()).collect());
    assert!(chunks.len() > 1);
    let out = chunks.concat();
    assert_eq!(out[..2], PREFIX);
    assert_eq!(*out.last().unwrap(), 0x40);
}

#[test]
fn stream_reports_walk_error() {
    let registry = TypeRegistry::new();
    let stream = encode_stream(&Value::symbol("s"), &registry, &EncodeOptions::default());
    let items: Vec<Result<Bytes>> = block_on(stream.collect());
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(Error::UnsupportedValue { .. })));
}

#[test]
fn writer_target_counts_bytes() {
    let mut out = Vec::new();
    let written = encode_to_writer(&"hi".into(), &TypeRegistry::new(), &EncodeOptions::default(), &mut out).unwrap();
    assert_eq!(written, out.len());
    assert_eq!(out, enc(&"hi".into()));
}
