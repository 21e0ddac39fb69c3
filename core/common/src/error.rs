//! Common error types for fsgate.

use std::fmt;
use thiserror::Error;

/// Top-level error type for fsgate operations.
///
/// The type is `Clone` so a single in-flight operation can hand the same
/// outcome to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No usable session token for a provider that requires one.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// The provider does not implement the requested method.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A remote call failed after every retry was spent.
    #[error("{0}")]
    RemoteRequestFailed(Box<RequestFailure>),

    /// The backend rejected the session token.
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// The host is navigating away; the result will never arrive in-process.
    #[error("Redirecting to {0}")]
    Redirecting(String),

    /// The backend answered with an error code or an HTTP failure.
    #[error("{0}")]
    Remote(RemoteError),

    /// Transport-level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication flow failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether a remote call that failed with this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Remote(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Diagnostics reported by a storage backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP status, when the failure came from the transport layer.
    pub status: Option<u16>,
    /// Backend error code.
    pub code: Option<i64>,
    /// Backend message or raw response text.
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Remote error")?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        if let Some(code) = self.code {
            write!(f, " [code {}]", code)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// A remote request that exhausted its retries, with the context it ran in.
#[derive(Debug, Clone)]
pub struct RequestFailure {
    pub method: String,
    pub path: String,
    /// Username of the acting user, if any.
    pub user: Option<String>,
    /// Query parameters sent to the backend (access token excluded).
    pub params: Vec<(String, String)>,
    pub data_type: Option<String>,
    pub attempts: u32,
    /// The last underlying failure.
    pub cause: Error,
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Remote request failed: {} {} after {} attempt(s)",
            self.method, self.path, self.attempts
        )?;
        if let Some(user) = &self.user {
            write!(f, " as {}", user)?;
        }
        write!(f, ": {}", self.cause)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(Error::Network("reset".to_string()).is_transient());
        assert!(Error::Remote(RemoteError::default()).is_transient());
        assert!(!Error::NotSupported("readAcl".to_string()).is_transient());
        assert!(!Error::NotAuthorized("no token".to_string()).is_transient());
    }

    #[test]
    fn test_request_failure_display() {
        let failure = RequestFailure {
            method: "read".to_string(),
            path: "/a.txt".to_string(),
            user: Some("alice".to_string()),
            params: vec![("method".to_string(), "download".to_string())],
            data_type: Some("text".to_string()),
            attempts: 4,
            cause: Error::Remote(RemoteError {
                status: Some(500),
                code: Some(31066),
                message: "file does not exist".to_string(),
            }),
        };

        let message = Error::RemoteRequestFailed(Box::new(failure)).to_string();
        assert!(message.contains("read /a.txt"));
        assert!(message.contains("4 attempt(s)"));
        assert!(message.contains("alice"));
        assert!(message.contains("31066"));
    }
}
