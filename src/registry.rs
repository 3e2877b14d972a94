//! Extra type registry.
//!
//! Extra types extend the wire format with application-specific values. A
//! descriptor pairs a name with a serializer that either declines a value or
//! turns it into a list of component values, immediately or through a
//! future. Descriptors are consulted in registration order; the first one
//! that does not decline wins.
//!
//! # Beispiel
//!
//! ```
//! use structbin::registry::{Serialized, TypeRegistry};
//! use structbin::Value;
//!
//! struct Point { x: f64, y: f64 }
//!
//! let mut registry = TypeRegistry::new();
//! registry.define("Point", |value: &Value| match value.downcast_host::<Point>() {
//!     Some(p) => Serialized::Components(vec![p.x.into(), p.y.into()]),
//!     None => Serialized::Unmatched,
//! }).unwrap();
//! assert_eq!(registry.len(), 1);
//! assert!(registry.define("Point", |_: &Value| Serialized::Unmatched).is_err());
//! ```

use std::future::Future;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::value::Value;
use crate::wire::{RESERVED_ERROR_NAMES, RESERVED_TYPE_NAMES};
use crate::{Error, FastHashMap, Result};

/// Longest accepted type name.
pub const MAX_TYPE_NAME_LEN: usize = 32;

/// Type ids are written as u16.
pub const MAX_EXTRA_TYPES: usize = 1 << 16;

/// Result of an extra type serializer.
pub enum Serialized {
    /// The value is not of this type.
    Unmatched,
    Components(Vec<Value>),
    /// Components that become available later.
    Deferred(LocalBoxFuture<'static, Vec<Value>>),
}

impl Serialized {
    pub fn deferred(future: impl Future<Output = Vec<Value>> + 'static) -> Self {
        Self::Deferred(future.boxed_local())
    }
}

type SerializeFn = dyn Fn(&Value) -> Serialized;

/// A registered extra type.
pub struct TypeDescriptor {
    name: Rc<str>,
    serialize: Box<SerializeFn>,
}

impl TypeDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serialize(&self, value: &Value) -> Serialized {
        (self.serialize)(value)
    }
}

/// Ordered list of extra types.
#[derive(Default)]
pub struct TypeRegistry {
    types: Vec<TypeDescriptor>,
    by_name: FastHashMap<Rc<str>, usize>,
}

/// Checks a type name against the naming rules.
pub fn validate_type_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_type_name(name, "name is empty"));
    }
    if name.chars().count() > MAX_TYPE_NAME_LEN {
        return Err(Error::invalid_type_name(
            name,
            format!("longer than {MAX_TYPE_NAME_LEN} characters"),
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
        return Err(Error::invalid_type_name(name, "must start with an uppercase letter"));
    }
    if let Some(bad) = name
        .chars()
        .find(|&c| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
    {
        return Err(Error::invalid_type_name(name, format!("character {bad:?} not allowed")));
    }
    if RESERVED_TYPE_NAMES.contains(&name) || RESERVED_ERROR_NAMES.contains(&name) {
        return Err(Error::invalid_type_name(name, "reserved for a built-in type"));
    }
    Ok(())
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extra type. Fails on invalid or duplicate names and when
    /// the registry is full.
    pub fn define<F>(&mut self, name: &str, serialize: F) -> Result<&mut Self>
    where
        F: Fn(&Value) -> Serialized + 'static,
    {
        validate_type_name(name)?;
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateTypeName(name.to_owned()));
        }
        if self.types.len() >= MAX_EXTRA_TYPES {
            return Err(Error::RegistryFull { limit: MAX_EXTRA_TYPES });
        }
        let name: Rc<str> = name.into();
        self.by_name.insert(Rc::clone(&name), self.types.len());
        self.types.push(TypeDescriptor {
            name,
            serialize: Box::new(serialize),
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TypeDescriptor> {
        self.types.get(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    /// Runs the serializers in registration order and returns the first
    /// match with its registry index.
    pub(crate) fn match_value(&self, value: &Value) -> Option<(usize, Serialized)> {
        self.types.iter().enumerate().find_map(|(index, td)| match td.serialize(value) {
            Serialized::Unmatched => None,
            matched => Some((index, matched)),
        })
    }
}
