//! Error taxonomy shared by adapters and the engine.
//!
//! Adapters classify every failure into one of three kinds. The engine only
//! ever looks at the kind, never at the message.

use thiserror::Error;

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The remote object does not exist.
    NotFound,
    /// Network, timeout or rate-limit condition. Retried on the next pass.
    Transient,
    /// Needs operator intervention (bad credentials, invalid parameters).
    Permanent,
}

/// Errors returned by remote resource adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Remote object absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Temporary failure, expected to clear on its own.
    #[error("transient: {0}")]
    Transient(String),

    /// Failure that will repeat until the spec or credentials change.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl RemoteError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        RemoteError::NotFound(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        RemoteError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        RemoteError::Permanent(msg.into())
    }

    /// Get the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::NotFound(_) => ErrorKind::NotFound,
            RemoteError::Transient(_) => ErrorKind::Transient,
            RemoteError::Permanent(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// The message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            RemoteError::NotFound(m) | RemoteError::Transient(m) | RemoteError::Permanent(m) => m,
        }
    }

    /// Prefix the message with context, keeping the classification.
    pub fn context(self, ctx: &str) -> Self {
        match self {
            RemoteError::NotFound(m) => RemoteError::NotFound(format!("{}: {}", ctx, m)),
            RemoteError::Transient(m) => RemoteError::Transient(format!("{}: {}", ctx, m)),
            RemoteError::Permanent(m) => RemoteError::Permanent(format!("{}: {}", ctx, m)),
        }
    }
}

/// Result type for adapter calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(RemoteError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(RemoteError::transient("x").kind(), ErrorKind::Transient);
        assert_eq!(RemoteError::permanent("x").kind(), ErrorKind::Permanent);
        assert!(RemoteError::not_found("x").is_not_found());
        assert!(!RemoteError::permanent("x").is_transient());
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = RemoteError::transient("connection reset").context("cannot create record");
        assert!(err.is_transient());
        assert_eq!(err.message(), "cannot create record: connection reset");
        assert_eq!(
            err.to_string(),
            "transient: cannot create record: connection reset"
        );
    }
}
