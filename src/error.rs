use thiserror::Error;

/// key: grace-error-taxonomy
/// Closed set of error kinds shared across every component. Component-local
/// error enums convert into this one at the boundary where they cross into
/// another component's API.
#[derive(Debug, Error)]
pub enum GraceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("policy denied: {0}")]
    PolicyDenied(String),
    #[error("requires review: session {parliament_session_id}")]
    RequiresReview { parliament_session_id: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backpressure: queue full")]
    BackpressureFull,
    #[error("log unavailable: {0}")]
    LogUnavailable(String),
    #[error("chain broken at seq {0}")]
    ChainBroken(u64),
    #[error("adapter error: {message} (retryable={retryable})")]
    AdapterError { message: String, retryable: bool },
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error("shutdown in progress")]
    Shutdown,
}

pub type GraceResult<T> = Result<T, GraceError>;

impl GraceError {
    /// Whether this kind is one `safe_*` helpers are permitted to recover
    /// from locally (telemetry-grade best-effort writes). Security-relevant
    /// kinds are never downgraded this way.
    pub fn is_best_effort_recoverable(&self) -> bool {
        matches!(self, GraceError::Timeout(_) | GraceError::BackpressureFull)
    }
}
