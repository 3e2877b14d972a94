//! Central error type for the encoder.
//!
//! Registration errors surface from [`TypeRegistry::define`](crate::registry::TypeRegistry::define),
//! everything else from an encode call. Broken internal invariants are
//! panics, not variants of this enum.

use core::fmt;
use std::borrow::Cow;

/// All recoverable failures of registration and encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// An extra type name violates the naming rules.
    InvalidTypeName {
        /// Der abgelehnte Name.
        name: String,
        /// Welche Regel verletzt wurde.
        reason: Cow<'static, str>,
    },
    /// An extra type with this name is already registered.
    DuplicateTypeName(String),
    /// The registry already holds the maximum number of extra types.
    RegistryFull { limit: usize },
    /// A value has no encoding and the policy is [`UnsupportedPolicy::Error`](crate::options::UnsupportedPolicy::Error).
    UnsupportedValue { kind: Cow<'static, str> },
    /// A synchronous output was requested while deferred custom-type
    /// serializations are still outstanding.
    SyncTargetConflict { pending: usize },
    /// A typed view does not fit into its backing buffer.
    InvalidView {
        byte_offset: usize,
        byte_length: usize,
        buffer_length: usize,
    },
    /// Writing the encoded output failed.
    IoError(String),
    /// JSON input could not be parsed.
    InvalidJson(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTypeName { name, reason } => {
                write!(f, "invalid extra type name '{name}': {reason}")
            }
            Self::DuplicateTypeName(name) => write!(f, "extra type '{name}' is already defined"),
            Self::RegistryFull { limit } => {
                write!(f, "extra type registry is full ({limit} types)")
            }
            Self::UnsupportedValue { kind } => write!(
                f,
                "cannot encode {kind}; set the unsupported policy to Avoid to skip it, \
                 or define an extra type for it"
            ),
            Self::SyncTargetConflict { pending } => write!(
                f,
                "cannot produce output synchronously: {pending} deferred extra type \
                 serialization(s) outstanding; use an async target"
            ),
            Self::InvalidView { byte_offset, byte_length, buffer_length } => write!(
                f,
                "view range {byte_offset}..{} exceeds buffer of {buffer_length} bytes",
                byte_offset.saturating_add(*byte_length)
            ),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
            Self::InvalidJson(msg) => write!(f, "invalid JSON: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl Error {
    /// Erstellt einen `InvalidTypeName` Fehler.
    pub fn invalid_type_name(name: impl Into<String>, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidTypeName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Erstellt einen `UnsupportedValue` Fehler.
    pub fn unsupported(kind: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedValue { kind: kind.into() }
    }

    /// True for errors raised at registration time.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTypeName { .. } | Self::DuplicateTypeName(_) | Self::RegistryFull { .. }
        )
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
