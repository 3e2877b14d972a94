//! In-memory value graph accepted by the encoder.
//!
//! Primitives are stored inline in [`Value`]. Every other kind lives behind an
//! [`Obj`] handle: a shared, mutable cell whose pointer is its identity. Two
//! clones of one `Obj` are the same value to the encoder, which is what makes
//! shared subgraphs and cycles expressible.
//!
//! # Beispiel
//!
//! ```
//! use structbin::Value;
//!
//! let node = Value::object([("name", Value::from("a"))]);
//! node.as_obj().unwrap().insert("self", node.clone());
//! assert!(node.is_referencable());
//! ```

use core::fmt;
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use bytes::Bytes;

use crate::bigint::BigInt;
use crate::{Error, FastIndexMap, Result};

/// A node of the value graph.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    BigInt(BigInt),
    /// Symbols have no encoding.
    Symbol(Rc<str>),
    /// Any referencable value.
    Obj(Obj),
}

/// Shared handle to a referencable value; identity is the allocation.
#[derive(Clone)]
pub struct Obj(Rc<RefCell<Object>>);

/// Payload kinds behind an [`Obj`].
pub enum Object {
    /// Dense or sparse array; `None` marks a hole.
    Array(Vec<Option<Value>>),
    /// Plain object; keys iterate in insertion order.
    Plain(FastIndexMap<Rc<str>, Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    ArrayBuffer(Bytes),
    View(TypedView),
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    BigInt(BigInt),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    RegExp { source: Rc<str>, flags: Rc<str> },
    Error(ErrorValue),
    /// Functions only encode through an extra type.
    Function(Rc<str>),
    /// Application object; only encodes through an extra type.
    Host(Rc<dyn Any>),
}

/// Element kind of an array buffer view. The discriminant is the wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ViewKind {
    DataView = 0,
    Int8 = 1,
    Uint8 = 2,
    Uint8Clamped = 3,
    Int16 = 4,
    Uint16 = 5,
    Int32 = 6,
    Uint32 = 7,
    Float32 = 8,
    Float64 = 9,
    BigInt64 = 10,
    BigUint64 = 11,
}

impl ViewKind {
    /// Bytes per element; a `DataView` counts bytes.
    pub fn element_size(self) -> usize {
        match self {
            Self::DataView | Self::Int8 | Self::Uint8 | Self::Uint8Clamped => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Float64 | Self::BigInt64 | Self::BigUint64 => 8,
        }
    }
}

/// A typed window into a byte buffer.
#[derive(Debug, Clone)]
pub struct TypedView {
    kind: ViewKind,
    buffer: Bytes,
    byte_offset: usize,
    length: usize,
}

impl TypedView {
    /// Validates that `length` elements starting at `byte_offset` fit into `buffer`.
    pub fn new(kind: ViewKind, buffer: Bytes, byte_offset: usize, length: usize) -> Result<Self> {
        let byte_length = length.saturating_mul(kind.element_size());
        if byte_offset.checked_add(byte_length).map_or(true, |end| end > buffer.len()) {
            return Err(Error::InvalidView {
                byte_offset,
                byte_length,
                buffer_length: buffer.len(),
            });
        }
        Ok(Self { kind, buffer, byte_offset, length })
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn byte_length(&self) -> usize {
        self.length * self.kind.element_size()
    }

    /// The viewed bytes; shares the backing allocation.
    pub fn bytes(&self) -> Bytes {
        self.buffer.slice(self.byte_offset..self.byte_offset + self.byte_length())
    }
}

/// Built-in error constructors. The discriminant is the wire sub-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ErrorKind {
    #[default]
    Error = 0,
    EvalError = 1,
    RangeError = 2,
    ReferenceError = 3,
    SyntaxError = 4,
    TypeError = 5,
    UriError = 6,
}

impl ErrorKind {
    /// Maps a constructor name; unknown names fall back to `Error`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "EvalError" => Self::EvalError,
            "RangeError" => Self::RangeError,
            "ReferenceError" => Self::ReferenceError,
            "SyntaxError" => Self::SyntaxError,
            "TypeError" => Self::TypeError,
            "URIError" => Self::UriError,
            _ => Self::Error,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: Option<Rc<str>>,
    pub stack: Option<Rc<str>>,
}

impl Object {
    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Array(_) => "Array",
            Self::Plain(_) => "Object",
            Self::Set(_) => "Set",
            Self::Map(_) => "Map",
            Self::ArrayBuffer(_) => "ArrayBuffer",
            Self::View(v) if v.kind == ViewKind::DataView => "DataView",
            Self::View(_) => "TypedArray",
            Self::Boolean(_) => "Boolean object",
            Self::Number(_) => "Number object",
            Self::String(_) => "String object",
            Self::BigInt(_) => "BigInt object",
            Self::Date(_) => "Date",
            Self::RegExp { .. } => "RegExp",
            Self::Error(_) => "Error",
            Self::Function(_) => "function",
            Self::Host(_) => "host object",
        }
    }
}

impl Obj {
    pub fn new(object: Object) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Sets a property of a plain object.
    ///
    /// # Panics
    ///
    /// Panics if this is not a plain object.
    pub fn insert(&self, key: impl Into<Rc<str>>, value: Value) -> Option<Value> {
        match &mut *self.borrow_mut() {
            Object::Plain(map) => map.insert(key.into(), value),
            other => panic!("insert on {}", other.kind_name()),
        }
    }

    /// Appends an element to an array.
    ///
    /// # Panics
    ///
    /// Panics if this is not an array.
    pub fn push(&self, value: Value) {
        match &mut *self.borrow_mut() {
            Object::Array(items) => items.push(Some(value)),
            other => panic!("push on {}", other.kind_name()),
        }
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Obj {}

impl Hash for Obj {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Obj {
    // Kein rekursives Debug: der Graph darf Zyklen enthalten.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(obj) => write!(f, "Obj({} @ {:#x})", obj.kind_name(), self.addr()),
            Err(_) => write!(f, "Obj(<borrowed> @ {:#x})", self.addr()),
        }
    }
}

impl Value {
    fn wrap(object: Object) -> Self {
        Self::Obj(Obj::new(object))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::wrap(Object::Array(items.into_iter().map(Some).collect()))
    }

    /// Array with holes at the `None` positions.
    pub fn sparse_array(items: impl IntoIterator<Item = Option<Value>>) -> Self {
        Self::wrap(Object::Array(items.into_iter().collect()))
    }

    pub fn object<K: Into<Rc<str>>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::wrap(Object::Plain(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Self::wrap(Object::Set(items.into_iter().collect()))
    }

    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self::wrap(Object::Map(entries.into_iter().collect()))
    }

    pub fn array_buffer(bytes: impl Into<Bytes>) -> Self {
        Self::wrap(Object::ArrayBuffer(bytes.into()))
    }

    pub fn typed_array(
        kind: ViewKind,
        buffer: impl Into<Bytes>,
        byte_offset: usize,
        length: usize,
    ) -> Result<Self> {
        Ok(Self::wrap(Object::View(TypedView::new(kind, buffer.into(), byte_offset, length)?)))
    }

    pub fn data_view(buffer: impl Into<Bytes>, byte_offset: usize, byte_length: usize) -> Result<Self> {
        Self::typed_array(ViewKind::DataView, buffer, byte_offset, byte_length)
    }

    pub fn boxed_boolean(value: bool) -> Self {
        Self::wrap(Object::Boolean(value))
    }

    pub fn boxed_number(value: f64) -> Self {
        Self::wrap(Object::Number(value))
    }

    pub fn boxed_string(value: impl Into<Rc<str>>) -> Self {
        Self::wrap(Object::String(value.into()))
    }

    pub fn boxed_bigint(value: impl Into<BigInt>) -> Self {
        Self::wrap(Object::BigInt(value.into()))
    }

    pub fn date(millis: f64) -> Self {
        Self::wrap(Object::Date(millis))
    }

    pub fn regexp(source: impl Into<Rc<str>>, flags: impl Into<Rc<str>>) -> Self {
        Self::wrap(Object::RegExp {
            source: source.into(),
            flags: flags.into(),
        })
    }

    pub fn error(kind: ErrorKind, message: impl Into<Rc<str>>) -> Self {
        Self::wrap(Object::Error(ErrorValue {
            kind,
            message: Some(message.into()),
            stack: None,
        }))
    }

    pub fn function(name: impl Into<Rc<str>>) -> Self {
        Self::wrap(Object::Function(name.into()))
    }

    pub fn host<T: Any>(value: T) -> Self {
        Self::wrap(Object::Host(Rc::new(value)))
    }

    pub fn symbol(description: impl Into<Rc<str>>) -> Self {
        Self::Symbol(description.into())
    }

    pub fn bigint(value: impl Into<BigInt>) -> Self {
        Self::BigInt(value.into())
    }

    pub fn as_obj(&self) -> Option<&Obj> {
        match self {
            Self::Obj(obj) => Some(obj),
            _ => None,
        }
    }

    /// True for every kind that takes part in reference tracking.
    pub fn is_referencable(&self) -> bool {
        matches!(self, Self::Obj(_))
    }

    /// Returns the host payload if this is a host object of type `T`.
    pub fn downcast_host<T: Any>(&self) -> Option<Rc<T>> {
        let obj = self.as_obj()?;
        let any = match &*obj.borrow() {
            Object::Host(any) => Rc::clone(any),
            _ => return None,
        };
        any.downcast::<T>().ok()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value.into())
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Self::BigInt(value)
    }
}

impl From<Obj> for Value {
    fn from(obj: Obj) -> Self {
        Self::Obj(obj)
    }
}
