//! # Core Error Types
//!
//! All errors that can be raised by the core primitives.

use thiserror::Error;

/// Errors raised by registries, pools, timers and lifecycle checks.
///
/// Every variant is a local, synchronous failure meant for the immediate
/// caller. None of them is retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An object was used after it was disposed.
    #[error("{what} used after disposal")]
    Disposed {
        /// What kind of object was used.
        what: &'static str,
    },

    /// The call is not valid for the current state of the object.
    ///
    /// Attaching an attached node, mutating the sealed registry and resolving
    /// services from a detached component all end up here.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An object was handed to a collection owned by someone else.
    #[error("ownership mismatch: {0}")]
    OwnershipMismatch(String),

    /// A construction parameter was out of range.
    #[error("{name} must be positive, got {value}")]
    InvalidArgument {
        /// The parameter name.
        name: &'static str,
        /// The rejected value.
        value: u64,
    },

    /// A required entry was not present.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// A scoped service lookup found nothing for the requested type.
    #[error("service not registered: {0}")]
    ServiceNotFound(&'static str),

    /// A configuration file could not be read or parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Returns true for errors caused by using a disposed object.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed { .. })
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Rejects zero for a parameter that must be positive.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] when `value` is zero.
pub fn ensure_positive(name: &'static str, value: usize) -> CoreResult<usize> {
    if value == 0 {
        return Err(CoreError::InvalidArgument { name, value: 0 });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_positive() {
        assert_eq!(ensure_positive("parallelism", 4), Ok(4));
        assert_eq!(
            ensure_positive("parallelism", 0),
            Err(CoreError::InvalidArgument { name: "parallelism", value: 0 })
        );
    }

    #[test]
    fn test_error_messages() {
        let err = CoreError::Disposed { what: "draw operation" };
        assert!(err.is_disposed());
        assert_eq!(err.to_string(), "draw operation used after disposal");
    }
}
