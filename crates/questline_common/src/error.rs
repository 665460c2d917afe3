//! Engine error taxonomy.
//!
//! A low-confidence verification rejection is not an error: it is a normal
//! `Rejected` outcome carrying the oracle's reasons. Only caller mistakes and
//! collaborator failures surface through `EngineError`.

use thiserror::Error;

/// Errors produced by the progression engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The caller passed something malformed (negative XP delta, evidence of
    /// the wrong kind, an out-of-range step index). Not retryable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the current state (submitting to a
    /// terminal session, unlocking an already-unlocked achievement). Not
    /// retryable.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The entity store or the verification oracle failed or timed out.
    /// Engine state is left unchanged; the caller may retry with backoff.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
}

impl EngineError {
    /// Whether the caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::CollaboratorUnavailable(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_collaborator_failures_are_retryable() {
        assert!(!EngineError::InvalidArgument("x".into()).is_retryable());
        assert!(!EngineError::InvalidState("x".into()).is_retryable());
        assert!(EngineError::CollaboratorUnavailable("timeout".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = EngineError::InvalidState("session is terminal".into());
        assert_eq!(err.to_string(), "invalid state: session is terminal");
    }
}
