//! Value graph encoder.
//!
//! Walks the graph depth first and writes one self-describing record per
//! value into a [`ChunkBuffer`]. Referencable values are entered into a
//! reference table before their children are visited, so later occurrences
//! (cycles included) become `Reference` records. Values claimed by an extra
//! type are written through the registry; deferred serializations get a
//! reserved sub-buffer and the walk continues without waiting.
//!
//! # Beispiel
//!
//! ```
//! use structbin::encoder::encode;
//! use structbin::options::EncodeOptions;
//! use structbin::registry::TypeRegistry;
//! use structbin::Value;
//!
//! let bytes = encode(&Value::from(42), &TypeRegistry::new(), &EncodeOptions::default()).unwrap();
//! assert_eq!(bytes, [0xC0, 0x01, 0x19, 0x2A, 0xB8, 0x19, 0x00, 0x40]);
//! ```

mod number;
mod output;
mod pending;

use std::future::Future;
use std::io::Write;
use std::mem;
use std::rc::Rc;

use bytes::Bytes;
use futures::future;
use futures::stream::{self, LocalBoxStream, StreamExt};
use log::{debug, trace, warn};

use crate::chunk_buffer::{BufferId, ChunkBuffer};
use crate::options::{EncodeOptions, StringEncoding, UnsupportedPolicy};
use crate::registry::{Serialized, TypeDescriptor, TypeRegistry};
use crate::value::{ErrorValue, Obj, Object, TypedView, Value};
use crate::wire::{boolean_bits, sign_bits, DataType, FORMAT_VERSION};
use crate::{Error, FastIndexMap, FastIndexSet, Result};

pub use number::select_width;
pub use output::Encoding;
use pending::{Completed, PendingQueue};

/// How the walk continues with one value, decided before any byte of it is
/// written.
enum Step {
    /// Unsupported and skipped.
    Omit,
    /// Primitive, written inline.
    Inline,
    /// Already visited; index into the reference table.
    Reference(usize),
    /// Claimed by the extra type at this registry index.
    Extra(usize, Serialized),
    /// Referencable built-in kind.
    Builtin,
}

/// Count prefix of a container that may shrink through omitted values.
enum Count {
    Written,
    Reserved(BufferId),
}

/// One encode session. Disposable: [`Encoder::encode`] consumes it.
pub struct Encoder<'r> {
    registry: &'r TypeRegistry,
    options: EncodeOptions,
    buffer: ChunkBuffer,
    /// Node receiving writes; switched while filling a reservation.
    current: BufferId,
    references: FastIndexSet<Obj>,
    /// Registry indices in first-use order; position = type id.
    used_types: FastIndexSet<usize>,
    pending: PendingQueue,
    /// Reservation for the ExtraTypeInfo record; taken when written.
    manifest: Option<BufferId>,
}

impl<'r> Encoder<'r> {
    pub fn new(registry: &'r TypeRegistry, options: EncodeOptions) -> Self {
        let buffer = ChunkBuffer::new();
        let current = buffer.root();
        Self {
            registry,
            options,
            buffer,
            current,
            references: FastIndexSet::default(),
            used_types: FastIndexSet::default(),
            pending: PendingQueue::default(),
            manifest: None,
        }
    }

    /// Runs the synchronous walk over `value`.
    ///
    /// Deferred extra type results are still outstanding afterwards if
    /// [`Encoding::pending`] is non-zero; only async targets can wait for them.
    pub fn encode(mut self, value: &Value) -> Result<Encoding<'r>> {
        let root = self.buffer.root();
        self.put_header(DataType::FormatVersion, 0);
        self.put_bytes(&[FORMAT_VERSION]);
        self.render(value)?;

        let manifest = self.buffer.allocate_sub_buffer(root);
        self.put_header(DataType::Eof, 0);
        self.buffer.end(root);
        self.manifest = Some(manifest);

        debug!(
            "encode walk finished: {} referencable value(s), {} deferred outstanding",
            self.references.len(),
            self.pending.len()
        );
        if self.pending.is_empty() {
            self.finish_manifest();
        }
        Ok(Encoding::new(self))
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn render(&mut self, value: &Value) -> Result<()> {
        let step = self.prepare(value)?;
        self.emit(value, step)
    }

    /// Classifies `value`. Reference lookup happens before the registry is
    /// consulted, so a repeated value never reaches user code twice.
    fn prepare(&mut self, value: &Value) -> Result<Step> {
        let obj = match value {
            Value::Symbol(_) => return self.unsupported("symbol"),
            Value::Obj(obj) => obj,
            _ => return Ok(Step::Inline),
        };
        if let Some(index) = self.references.get_index_of(obj) {
            return Ok(Step::Reference(index));
        }
        if let Some((index, result)) = self.registry.match_value(value) {
            return Ok(Step::Extra(index, result));
        }
        let kind = {
            let object = obj.borrow();
            match &*object {
                Object::Function(_) | Object::Host(_) => Some(object.kind_name()),
                _ => None,
            }
        };
        match kind {
            Some(kind) => self.unsupported(kind),
            None => Ok(Step::Builtin),
        }
    }

    fn unsupported(&self, kind: &'static str) -> Result<Step> {
        match self.options.unsupported {
            UnsupportedPolicy::Error => Err(Error::unsupported(kind)),
            UnsupportedPolicy::Warn => {
                warn!("cannot encode {kind}; value omitted");
                Ok(Step::Omit)
            }
            UnsupportedPolicy::Avoid => Ok(Step::Omit),
        }
    }

    /// Writes the record chosen by [`Self::prepare`]. An omitted value in a
    /// position that needs a record (root, extra type component, map
    /// value) becomes `Undefined`.
    fn emit(&mut self, value: &Value, step: Step) -> Result<()> {
        match (step, value) {
            (Step::Omit, _) => {
                self.put_header(DataType::Undefined, 0);
                Ok(())
            }
            (Step::Inline, _) => {
                self.put_primitive(value);
                Ok(())
            }
            (Step::Reference(index), _) => {
                self.put_header(DataType::Reference, 0);
                self.put_number(index as f64);
                Ok(())
            }
            (Step::Extra(index, result), Value::Obj(obj)) => self.put_extra(obj, index, result),
            (Step::Builtin, Value::Obj(obj)) => self.put_builtin(obj),
            (_, other) => unreachable!("no referencable step for {other:?}"),
        }
    }

    /// Could this value end up omitted? Only asked under non-failing policies.
    fn may_be_omitted(value: &Value) -> bool {
        match value {
            Value::Symbol(_) => true,
            Value::Obj(obj) => matches!(&*obj.borrow(), Object::Function(_) | Object::Host(_)),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Primitive writers
    // ------------------------------------------------------------------

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buffer.put_bytes(self.current, bytes);
    }

    fn put_header(&mut self, data_type: DataType, sub: u8) {
        self.put_bytes(&[data_type.header(sub)]);
    }

    /// Untagged 8-byte double.
    fn put_f64(&mut self, value: f64) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Full `Number` record at the smallest lossless width.
    fn put_number(&mut self, value: f64) {
        self.put_number_record(DataType::Number, value);
    }

    fn put_number_record(&mut self, data_type: DataType, value: f64) {
        let width = select_width(value);
        self.put_header(data_type, width as u8);
        let bytes = number::to_le_bytes(value, width);
        self.put_bytes(&bytes[..width.byte_len()]);
    }

    /// Byte length as a `Number` record followed by the encoded text.
    fn put_str_payload(&mut self, text: &str, encoding: StringEncoding) {
        match encoding {
            StringEncoding::Utf8 => {
                self.put_number(text.len() as f64);
                self.put_bytes(text.as_bytes());
            }
            StringEncoding::Utf16 => {
                let mut units = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    units.extend_from_slice(&unit.to_le_bytes());
                }
                self.put_number(units.len() as f64);
                self.buffer.put_shared(self.current, Bytes::from(units));
            }
        }
    }

    fn put_string_record(&mut self, data_type: DataType, text: &str, encoding: StringEncoding) {
        self.put_header(data_type, encoding.wire_bits());
        self.put_str_payload(text, encoding);
    }

    /// Array buffer payload: byte length as untagged double, then the bytes.
    fn put_raw_buffer(&mut self, bytes: Bytes) {
        self.put_f64(bytes.len() as f64);
        self.buffer.put_shared(self.current, bytes);
    }

    fn put_primitive(&mut self, value: &Value) {
        match value {
            Value::Undefined => self.put_header(DataType::Undefined, 0),
            Value::Null => self.put_header(DataType::Null, 0),
            Value::Boolean(b) => self.put_header(DataType::Boolean, boolean_bits(*b)),
            Value::Number(n) => self.put_number(*n),
            Value::String(s) => {
                self.put_string_record(DataType::String, s, self.options.string_encoding)
            }
            Value::BigInt(big) => {
                self.put_header(DataType::BigInt, sign_bits(big.is_negative()));
                self.put_raw_buffer(Bytes::copy_from_slice(big.magnitude()));
            }
            Value::Symbol(_) | Value::Obj(_) => unreachable!("not a primitive: {value:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Referencable kinds
    // ------------------------------------------------------------------

    fn register(&mut self, obj: &Obj) {
        let (index, fresh) = self.references.insert_full(obj.clone());
        debug_assert!(fresh, "value registered twice");
        trace!("registered {obj:?} as reference {index}");
    }

    fn put_builtin(&mut self, obj: &Obj) -> Result<()> {
        self.register(obj);
        let object = obj.borrow();
        match &*object {
            Object::Array(items) => {
                self.put_header(DataType::Array, 0);
                self.put_elements(items)?;
            }
            Object::Plain(map) => {
                self.put_header(DataType::Object, 0);
                self.put_pairs(map)?;
            }
            Object::Set(items) => {
                self.put_header(DataType::Set, 0);
                let count = self.open_count(items.len(), items.iter());
                let mut written = 0;
                for item in items {
                    let step = self.prepare(item)?;
                    if matches!(step, Step::Omit) {
                        continue;
                    }
                    self.emit(item, step)?;
                    written += 1;
                }
                self.close_count(count, written);
            }
            Object::Map(entries) => {
                self.put_header(DataType::Map, 0);
                self.put_entries(entries)?;
            }
            Object::ArrayBuffer(bytes) => {
                self.put_header(DataType::ArrayBuffer, 0);
                self.put_raw_buffer(bytes.clone());
            }
            Object::View(view) => self.put_view(view),
            Object::Boolean(b) => self.put_header(DataType::BooleanObject, boolean_bits(*b)),
            Object::Number(n) => self.put_number_record(DataType::NumberObject, *n),
            Object::String(s) => {
                self.put_string_record(DataType::StringObject, s, self.options.string_encoding)
            }
            Object::BigInt(big) => {
                self.put_header(DataType::BigIntObject, sign_bits(big.is_negative()));
                self.put_raw_buffer(Bytes::copy_from_slice(big.magnitude()));
            }
            Object::Date(millis) => {
                self.put_header(DataType::Date, 0);
                self.put_f64(*millis);
            }
            Object::RegExp { source, flags } => {
                self.put_header(DataType::RegExp, 0);
                self.put_str_payload(source, StringEncoding::Utf8);
                self.put_str_payload(flags, StringEncoding::Utf8);
            }
            Object::Error(error) => self.put_error(error),
            Object::Function(_) | Object::Host(_) => {
                unreachable!("{} reached the built-in path", object.kind_name())
            }
        }
        Ok(())
    }

    fn put_view(&mut self, view: &TypedView) {
        self.put_header(DataType::ArrayBufferView, 0);
        self.put_bytes(&[view.kind() as u8]);
        self.put_f64(view.byte_length() as f64);
        self.put_f64(view.byte_offset() as f64);
        self.put_f64(view.len() as f64);
        self.buffer.put_shared(self.current, view.bytes());
    }

    fn put_error(&mut self, error: &ErrorValue) {
        self.put_header(DataType::Error, error.kind as u8);
        for field in [&error.message, &error.stack] {
            match field {
                Some(text) => self.put_string_record(DataType::String, text, StringEncoding::Utf8),
                None => self.put_header(DataType::Undefined, 0),
            }
        }
    }

    /// Length, then elements; runs of holes collapse into one
    /// `ArrayEmptySlots` record. Omitted elements join the hole run, so no
    /// later index moves.
    fn put_elements(&mut self, items: &[Option<Value>]) -> Result<()> {
        self.put_number(items.len() as f64);
        let mut holes = 0usize;
        for item in items {
            let step = match item {
                Some(value) => self.prepare(value)?,
                None => Step::Omit,
            };
            let (Some(value), false) = (item, matches!(step, Step::Omit)) else {
                holes += 1;
                continue;
            };
            if holes > 0 {
                self.put_empty_slots(holes);
                holes = 0;
            }
            self.emit(value, step)?;
        }
        if holes > 0 {
            self.put_empty_slots(holes);
        }
        Ok(())
    }

    fn put_empty_slots(&mut self, count: usize) {
        self.put_header(DataType::ArrayEmptySlots, 0);
        self.put_number(count as f64);
    }

    /// Component list of an extra type: an array without header.
    fn put_untagged_array(&mut self, items: &[Value]) -> Result<()> {
        self.put_number(items.len() as f64);
        for item in items {
            self.render(item)?;
        }
        Ok(())
    }

    /// Pair count, then key/value pairs. A pair whose value is omitted is
    /// dropped along with its key.
    fn put_pairs(&mut self, map: &FastIndexMap<Rc<str>, Value>) -> Result<()> {
        let count = self.open_count(map.len(), map.values());
        let mut written = 0;
        for (key, value) in map {
            let step = self.prepare(value)?;
            if matches!(step, Step::Omit) {
                continue;
            }
            self.put_str_payload(key, StringEncoding::Utf8);
            self.emit(value, step)?;
            written += 1;
        }
        self.close_count(count, written);
        Ok(())
    }

    /// Entry count, then key/value pairs. An omitted key drops the entry; an
    /// omitted value is written as `Undefined`.
    fn put_entries(&mut self, entries: &[(Value, Value)]) -> Result<()> {
        let count = self.open_count(entries.len(), entries.iter().map(|(k, _)| k));
        let mut written = 0;
        for (key, value) in entries {
            let step = self.prepare(key)?;
            if matches!(step, Step::Omit) {
                continue;
            }
            self.emit(key, step)?;
            let step = self.prepare(value)?;
            self.emit(value, step)?;
            written += 1;
        }
        self.close_count(count, written);
        Ok(())
    }

    /// Writes `len` directly unless one of `values` may be omitted, in which
    /// case the count position is reserved and filled by [`Self::close_count`].
    fn open_count<'v>(&mut self, len: usize, mut values: impl Iterator<Item = &'v Value>) -> Count {
        let may_shrink = self.options.unsupported != UnsupportedPolicy::Error
            && values.any(Self::may_be_omitted);
        if may_shrink {
            Count::Reserved(self.buffer.allocate_sub_buffer(self.current))
        } else {
            self.put_number(len as f64);
            Count::Written
        }
    }

    fn close_count(&mut self, count: Count, written: usize) {
        if let Count::Reserved(slot) = count {
            let saved = mem::replace(&mut self.current, slot);
            self.put_number(written as f64);
            self.current = saved;
            self.buffer.end(slot);
        }
    }

    // ------------------------------------------------------------------
    // Extra types
    // ------------------------------------------------------------------

    fn put_extra(&mut self, obj: &Obj, index: usize, result: Serialized) -> Result<()> {
        self.register(obj);
        let (type_id, _) = self.used_types.insert_full(index);
        // Registry holds at most 2^16 types.
        let type_id = type_id as u16;
        self.put_header(DataType::ExtraType, 0);
        self.put_bytes(&type_id.to_le_bytes());
        match result {
            Serialized::Components(components) => self.put_untagged_array(&components),
            Serialized::Deferred(future) => {
                let slot = self.buffer.allocate_sub_buffer(self.current);
                self.pending.push(slot, type_id, future);
                trace!(
                    "deferred extra type {type_id} reserved sub-buffer ({} outstanding, {} started)",
                    self.pending.len(),
                    self.pending.started()
                );
                Ok(())
            }
            Serialized::Unmatched => unreachable!("registry returned an unmatched result"),
        }
    }

    /// Writes resolved components into their reservation.
    fn complete_deferred(&mut self, completed: Completed) -> Result<()> {
        let Completed { slot, type_id, components } = completed;
        trace!("deferred extra type {type_id} resolved with {} component(s)", components.len());
        let saved = mem::replace(&mut self.current, slot);
        let result = self.put_untagged_array(&components);
        self.current = saved;
        result?;
        self.buffer.end(slot);
        if self.pending.is_empty() {
            self.finish_manifest();
        }
        Ok(())
    }

    /// Writes the ExtraTypeInfo record into its reservation once nothing is
    /// outstanding. Names are listed in type id order.
    fn finish_manifest(&mut self) {
        let Some(slot) = self.manifest.take() else {
            return;
        };
        debug_assert!(self.pending.is_empty());
        let registry = self.registry;
        let names: Vec<&str> = self
            .used_types
            .iter()
            .filter_map(|&index| registry.get(index))
            .map(TypeDescriptor::name)
            .collect();
        let saved = mem::replace(&mut self.current, slot);
        self.put_header(DataType::ExtraTypeInfo, 0);
        self.put_number(names.len() as f64);
        for name in names {
            self.put_string_record(DataType::String, name, StringEncoding::Utf8);
        }
        self.current = saved;
        self.buffer.end(slot);
        debug!("extra type manifest written ({} type(s))", self.used_types.len());
    }
}

// ============================================================================
// Convenience entry points
// ============================================================================

/// Encodes into one contiguous buffer. Fails with
/// [`Error::SyncTargetConflict`] if an extra type defers its result.
pub fn encode(value: &Value, registry: &TypeRegistry, options: &EncodeOptions) -> Result<Vec<u8>> {
    Encoder::new(registry, options.clone()).encode(value)?.into_bytes()
}

/// Encodes into the ordered chunk list. Large buffers appear as their own
/// chunk without being copied.
pub fn encode_chunks(value: &Value, registry: &TypeRegistry, options: &EncodeOptions) -> Result<Vec<Bytes>> {
    Encoder::new(registry, options.clone()).encode(value)?.into_chunks()
}

/// Encodes into a writer; returns the number of bytes written.
pub fn encode_to_writer(
    value: &Value,
    registry: &TypeRegistry,
    options: &EncodeOptions,
    writer: impl Write,
) -> Result<usize> {
    Encoder::new(registry, options.clone()).encode(value)?.write_to(writer)
}

/// Encodes, waiting for deferred extra types. The synchronous walk runs
/// before this function returns; the future only drives deferred results.
pub fn encode_async<'r>(
    value: &Value,
    registry: &'r TypeRegistry,
    options: &EncodeOptions,
) -> impl Future<Output = Result<Vec<u8>>> + 'r {
    let walked = Encoder::new(registry, options.clone()).encode(value);
    async move { walked?.bytes().await }
}

/// Like [`encode_async`], resolving to the chunk list.
pub fn encode_chunks_async<'r>(
    value: &Value,
    registry: &'r TypeRegistry,
    options: &EncodeOptions,
) -> impl Future<Output = Result<Vec<Bytes>>> + 'r {
    let walked = Encoder::new(registry, options.clone()).encode(value);
    async move { walked?.chunks().await }
}

/// Encodes into a stream of chunks that starts yielding once the whole
/// output is ready.
pub fn encode_stream<'r>(
    value: &Value,
    registry: &'r TypeRegistry,
    options: &EncodeOptions,
) -> LocalBoxStream<'r, Result<Bytes>> {
    match Encoder::new(registry, options.clone()).encode(value) {
        Ok(encoding) => encoding.into_stream(),
        Err(err) => stream::once(future::ready(Err(err))).boxed_local(),
    }
}

#[cfg(test)]
mod tests;
