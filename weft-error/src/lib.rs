// Weft - weft-error
// Module: error handling
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Error handling for the Weft WebAssembly engine.
//!
//! Every fallible engine operation reports a single [`Error`] carrying a
//! category, a numeric code and a human-readable diagnostic. The categories
//! are deliberately disjoint:
//!
//! - [`ErrorCategory::Parse`] / [`ErrorCategory::Validation`]: the binary is
//!   structurally or statically invalid; fatal to that load attempt.
//! - [`ErrorCategory::Link`]: imports cannot be satisfied by the given
//!   provider chain; fatal to that instantiation attempt, the module itself
//!   remains valid and reusable.
//! - [`ErrorCategory::Runtime`]: resource-level failures outside of
//!   WebAssembly trap semantics (traps have their own type in weft-runtime).
//! - [`ErrorCategory::Contract`]: internal consistency violations such as a
//!   caller supplying the wrong result arity. These indicate a programming
//!   bug in a collaborator and are never coerced into any other class.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod codes;

use core::fmt;

/// Error categories for engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCategory {
    /// The bytes are not a well-formed WebAssembly binary.
    Parse,
    /// The module is well-formed but statically invalid.
    Validation,
    /// An import could not be satisfied by the provider chain.
    Link,
    /// A runtime resource failure (allocation, limits) outside trap
    /// semantics.
    Runtime,
    /// A programming-contract violation by a collaborator.
    Contract,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::Validation => "validation",
            Self::Link => "link",
            Self::Runtime => "runtime",
            Self::Contract => "contract",
        };
        f.write_str(s)
    }
}

/// The engine error type.
///
/// Categorized errors with a numeric code and a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// Error category.
    pub category: ErrorCategory,
    /// Error code, see [`codes`].
    pub code: u16,
    /// Human-readable diagnostic.
    pub message: String,
}

impl Error {
    /// Creates a new error.
    pub fn new(category: ErrorCategory, code: u16, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Parse, codes::PARSE_ERROR, message)
    }

    /// Creates a validation error.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, codes::VALIDATION_ERROR, message)
    }

    /// Creates a link error.
    pub fn link_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Link, codes::LINK_ERROR, message)
    }

    /// Creates a runtime error.
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Runtime, codes::RUNTIME_ERROR, message)
    }

    /// Creates a contract (internal consistency) error.
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Contract, codes::CONTRACT_VIOLATION, message)
    }

    /// True for decode-time failures (parse or validation).
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self.category,
            ErrorCategory::Parse | ErrorCategory::Validation
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {:04}] {}", self.category, self.code, self.message)
    }
}

impl std::error::Error for Error {}

/// A specialized `Result` type for engine operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_disjoint_and_preserved() {
        let e = Error::link_error("unknown import spectest:print");
        assert_eq!(e.category, ErrorCategory::Link);
        assert!(!e.is_decode_error());
        assert_eq!(e.message, "unknown import spectest:print");

        let e = Error::validation_error("type mismatch");
        assert!(e.is_decode_error());
    }

    #[test]
    fn display_includes_category_and_code() {
        let e = Error::new(ErrorCategory::Parse, codes::UNEXPECTED_EOF, "unexpected end");
        let s = e.to_string();
        assert!(s.contains("parse"));
        assert!(s.contains("unexpected end"));
    }
}
