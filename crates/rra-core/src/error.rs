//! Error types for the rra relational algebra engine.

use alloc::string::String;
use core::fmt;

/// Result type alias for rra-core operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The four error kinds of spec.md §7.
#[derive(Debug, Clone)]
pub enum Error {
    /// A row's keys differ from its scheme, or two relations with
    /// incompatible schemes were combined (union/intersection/difference
    /// require matching schemes; equijoin/rename forbid ambiguous overlap).
    SchemeViolation { message: String },
    /// A storage adapter reported an error (I/O, corruption, missing file).
    StorageError { message: String },
    /// A plist (or other serialized form) was malformed on read, or a
    /// value could not be serialized on write.
    SerializationError { message: String },
    /// An internal invariant was violated (e.g. a willChange/didChange
    /// mismatch). Should abort in debug builds, be reported in release.
    InvariantViolation { message: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SchemeViolation { message } => write!(f, "scheme violation: {message}"),
            Error::StorageError { message } => write!(f, "storage error: {message}"),
            Error::SerializationError { message } => write!(f, "serialization error: {message}"),
            Error::InvariantViolation { message } => write!(f, "invariant violation: {message}"),
        }
    }
}

impl Error {
    pub fn scheme_violation(message: impl Into<String>) -> Self {
        Error::SchemeViolation { message: message.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Error::StorageError { message: message.into() }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Error::SerializationError { message: message.into() }
    }

    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Error::InvariantViolation { message: message.into() }
    }

    /// True for error kinds that should only ever indicate a bug in this
    /// crate rather than bad input or a failing adapter.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::InvariantViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let err = Error::scheme_violation("schemes must match");
        assert!(alloc::format!("{err}").contains("schemes must match"));
    }

    #[test]
    fn invariant_violation_is_distinguishable() {
        assert!(Error::invariant_violation("x").is_invariant_violation());
        assert!(!Error::storage("x").is_invariant_violation());
    }
}
