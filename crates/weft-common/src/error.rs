//! Common error types for the Weft control plane.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`WeftError`].
pub type WeftResult<T> = Result<T, WeftError>;

/// Common errors across the Weft crates.
///
/// The variants map onto the control plane's error kinds: absent resources,
/// policy refusals, malformed configuration, state conflicts, exhausted
/// allocators, and unexpected host failures.
#[derive(Error, Diagnostic, Debug)]
pub enum WeftError {
    /// Network not found.
    #[error("Network not found: {id}")]
    #[diagnostic(code(weft::network::not_found))]
    NetworkNotFound {
        /// The network id that was not found.
        id: String,
    },

    /// Endpoint not found.
    #[error("Endpoint not found: {id}")]
    #[diagnostic(code(weft::endpoint::not_found))]
    EndpointNotFound {
        /// The endpoint id that was not found.
        id: String,
    },

    /// Address pool not found.
    #[error("Address pool not found: {id}")]
    #[diagnostic(code(weft::ipam::pool_not_found))]
    PoolNotFound {
        /// The pool id that was not found.
        id: String,
    },

    /// No driver registered under the given name.
    #[error("Driver not found: {name}")]
    #[diagnostic(code(weft::driver::not_found))]
    DriverNotFound {
        /// The driver name that was not found.
        name: String,
    },

    /// Operation disallowed by policy.
    #[error("Operation forbidden: {operation}")]
    #[diagnostic(code(weft::forbidden))]
    Forbidden {
        /// The refused operation.
        operation: String,
    },

    /// Malformed configuration or request.
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(weft::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Requested resource is already in use or overlaps existing state.
    #[error("Conflict: {message}")]
    #[diagnostic(code(weft::conflict))]
    Conflict {
        /// The error message.
        message: String,
    },

    /// No more of the requested resource is available.
    #[error("Resource exhausted: {resource}")]
    #[diagnostic(
        code(weft::exhausted),
        help("Release unused networks or endpoints, or widen the pool")
    )]
    Exhausted {
        /// The exhausted resource.
        resource: String,
    },

    /// Invalid resource id format.
    #[error("Invalid resource id: {id}")]
    #[diagnostic(
        code(weft::invalid_id),
        help("Resource ids must be alphanumeric with hyphens and underscores, 1-64 characters")
    )]
    InvalidId {
        /// The invalid id.
        id: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(weft::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(weft::serialization))]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(weft::internal),
        help("This is a bug, please report it at https://github.com/weft-net/weft/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl From<serde_json::Error> for WeftError {
    fn from(err: serde_json::Error) -> Self {
        WeftError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WeftError::NetworkNotFound {
            id: "abc123".to_string(),
        };
        assert_eq!(err.to_string(), "Network not found: abc123");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WeftError = io_err.into();
        assert!(matches!(err, WeftError::Io(_)));
    }

    #[test]
    fn forbidden_display() {
        let err = WeftError::Forbidden {
            operation: "delete default network".to_string(),
        };
        assert_eq!(err.to_string(), "Operation forbidden: delete default network");
    }
}
