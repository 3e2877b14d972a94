//! structbin – binary encoder for structured value graphs
//!
//! Encodes graphs of dynamically typed values (primitives, containers, typed
//! byte views, boxed primitives, dates, regular expressions, errors) into a
//! compact tagged binary format. Shared and cyclic values are written once
//! and referenced afterwards. Applications extend the format with named extra
//! types whose serializers may produce their components asynchronously.
//!
//! # Beispiel
//!
//! ```
//! use structbin::{encode, EncodeOptions, Serialized, TypeRegistry, Value};
//!
//! struct Point { x: f64, y: f64 }
//!
//! let mut registry = TypeRegistry::new();
//! registry.define("Point", |value: &Value| match value.downcast_host::<Point>() {
//!     Some(p) => Serialized::Components(vec![p.x.into(), p.y.into()]),
//!     None => Serialized::Unmatched,
//! }).unwrap();
//!
//! let origin = Value::host(Point { x: 0.0, y: 0.0 });
//! let graph = Value::object([("a", origin.clone()), ("b", origin)]);
//! let bytes = encode(&graph, &registry, &EncodeOptions::default()).unwrap();
//! assert_eq!(&bytes[..2], [0xC0, 0x01]);
//! assert_eq!(bytes.last(), Some(&0x40));
//! ```

pub mod bigint;
pub mod chunk_buffer;
pub mod encoder;
pub mod error;
pub mod json;
pub mod options;
pub mod registry;
pub mod value;
pub mod wire;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent; fuer interne Datenstrukturen).
pub type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

/// IndexSet mit ahash; Position = Einfuegereihenfolge.
pub type FastIndexSet<K> = indexmap::IndexSet<K, ahash::RandomState>;

// Public API: Values
pub use bigint::BigInt;
pub use value::{ErrorKind, ErrorValue, Obj, Object, TypedView, Value, ViewKind};

// Public API: Options
pub use options::{EncodeOptions, StringEncoding, UnsupportedPolicy};

// Public API: Extra types
pub use registry::{Serialized, TypeDescriptor, TypeRegistry};

// Public API: Encoder
pub use encoder::{
    encode, encode_async, encode_chunks, encode_chunks_async, encode_stream, encode_to_writer,
    Encoder, Encoding,
};

// Public API: JSON
pub use json::{encode_json, parse_json};
