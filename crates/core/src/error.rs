use thiserror::Error;

/// Failures surfaced by the activation controller.
///
/// Gate denials and idempotent no-ops are not errors; they are reported
/// through `GateDecision` and the handler outcome instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("service not found: {cluster}/{service}")]
    ServiceNotFound { cluster: String, service: String },

    #[error("transient orchestrator error: {0}")]
    Transient(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("orchestrator rejected request: {0}")]
    Orchestrator(String),
}

impl ControlError {
    /// Only throttling and network faults are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
