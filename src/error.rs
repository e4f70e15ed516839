//! Error types for the agent orchestration runtime

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the runtime.
///
/// Every public fallible operation returns through this sum type rather
/// than an unstructured exception; see the error-handling design for the
/// recoverability of each kind.
#[derive(Error, Debug)]
pub enum Error {
    /// Security gate could not establish identity (bad key, bad token, no
    /// credential supplied at all). Recoverable by re-authenticating.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// RBAC check rejected the caller for lacking a required permission.
    /// Not recoverable for the current credential.
    #[error("permission denied: missing permission '{0}'")]
    PermissionDenied(String),

    /// Rate limiter rejected the request for the given resource type.
    /// Recoverable by retrying after the window rolls over.
    #[error("rate limit exceeded for resource '{0}'")]
    RateLimited(String),

    /// Resource quota rejected the request; cumulative usage already at
    /// or above cap. Not recoverable without an administrative reset.
    #[error("quota exceeded for resource '{0}'")]
    QuotaExceeded(String),

    /// Content safety filter rejected (rather than rewrote) the input.
    /// Recoverable by rewriting the offending content and retrying.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Referenced session id does not resolve to a stored session.
    /// Recoverable by creating a new session.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Referenced agent template name is not registered.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Handoff chain exceeded the configured recursion depth.
    #[error("handoff recursion limit exceeded (depth {0})")]
    HandoffLoop(usize),

    /// Turn exceeded its total-duration or per-event budget.
    #[error("operation timed out")]
    Timeout,

    /// Caller cancelled an in-flight turn.
    #[error("operation cancelled")]
    Cancelled,

    /// A synchronous entry point was called from inside the async
    /// executor. Always a caller bug, never recoverable by retry.
    #[error("synchronous API called from within the async executor")]
    AsyncReentry,

    /// Session/context store backed by Redis failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JWT encode/decode/verification error.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Invalid configuration (malformed template, bad env var, …).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid input supplied by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Any uncategorized failure. Treated as retryable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new auth-failed error.
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Error::AuthFailed(msg.into())
    }

    /// Create a new permission-denied error.
    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Error::PermissionDenied(permission.into())
    }

    /// Create a new rate-limited error.
    pub fn rate_limited(resource_type: impl Into<String>) -> Self {
        Error::RateLimited(resource_type.into())
    }

    /// Create a new quota-exceeded error.
    pub fn quota_exceeded(resource_type: impl Into<String>) -> Self {
        Error::QuotaExceeded(resource_type.into())
    }

    /// Create a new content-blocked error.
    pub fn content_blocked(msg: impl Into<String>) -> Self {
        Error::ContentBlocked(msg.into())
    }

    /// Create a new session-not-found error.
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Error::SessionNotFound(session_id.into())
    }

    /// Create a new template-not-found error.
    pub fn template_not_found(name: impl Into<String>) -> Self {
        Error::TemplateNotFound(name.into())
    }

    /// Create a new config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new invalid-input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// True if retrying the same operation unchanged might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_) | Error::Timeout | Error::Internal(_) | Error::Redis(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_auth_failed() {
        let err = Error::auth_failed("malformed key");
        assert!(matches!(err, Error::AuthFailed(_)));
        assert_eq!(err.to_string(), "authentication failed: malformed key");
    }

    #[test]
    fn test_error_permission_denied() {
        let err = Error::permission_denied("admin");
        assert_eq!(err.to_string(), "permission denied: missing permission 'admin'");
    }

    #[test]
    fn test_error_rate_limited_retryable() {
        let err = Error::rate_limited("model");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_permission_denied_not_retryable() {
        let err = Error::permission_denied("admin");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_handoff_loop() {
        let err = Error::HandoffLoop(3);
        assert_eq!(err.to_string(), "handoff recursion limit exceeded (depth 3)");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn _returns_result() -> Result<i32> {
            Ok(42)
        }

        fn _returns_error() -> Result<i32> {
            Err(Error::Timeout)
        }
    }
}
