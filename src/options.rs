//! Encode options.
//!
//! # Beispiel
//!
//! ```
//! use structbin::options::{EncodeOptions, StringEncoding, UnsupportedPolicy};
//!
//! let opts = EncodeOptions::default()
//!     .with_string_encoding(StringEncoding::Utf16)
//!     .with_unsupported(UnsupportedPolicy::Avoid);
//!
//! assert_eq!(opts.string_encoding(), StringEncoding::Utf16);
//! assert_eq!(opts.unsupported(), UnsupportedPolicy::Avoid);
//! ```

/// What happens when the walk meets a value without an encoding
/// (symbols, functions, host objects no extra type claims).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsupportedPolicy {
    /// Abort the whole encode with [`Error::UnsupportedValue`](crate::Error::UnsupportedValue).
    #[default]
    Error,
    /// Log a warning and omit the value.
    Warn,
    /// Omit the value silently.
    Avoid,
}

/// Encoding of string values. Fixed for the duration of one encode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    #[default]
    Utf8,
    /// UTF-16 code units, little endian.
    Utf16,
}

/// Options controlling one encode call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodeOptions {
    pub(crate) unsupported: UnsupportedPolicy,
    pub(crate) string_encoding: StringEncoding,
}

impl EncodeOptions {
    /// Setzt die Policy fuer nicht encodierbare Werte.
    pub fn with_unsupported(mut self, policy: UnsupportedPolicy) -> Self {
        self.unsupported = policy;
        self
    }

    /// Setzt das String-Encoding.
    pub fn with_string_encoding(mut self, encoding: StringEncoding) -> Self {
        self.string_encoding = encoding;
        self
    }

    pub fn unsupported(&self) -> UnsupportedPolicy {
        self.unsupported
    }

    pub fn string_encoding(&self) -> StringEncoding {
        self.string_encoding
    }
}
