//! Verification step model, completeness predicates, and oracle contract.
//!
//! The oracle produces the step plan once at session start; after that the
//! plan is immutable data the state machine walks. Each step has a local
//! completeness predicate gating advancement; the holistic accept/reject
//! judgment happens once, over all collected evidence.

use serde::{Deserialize, Serialize};

use crate::reward::RewardEvent;

/// Minimum trimmed length for a free-text answer.
pub const FREE_TEXT_MIN_CHARS: usize = 10;

/// Minimum whitespace-delimited tokens for a reflection.
pub const REFLECTION_MIN_TOKENS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    AmountInput,
    FreeTextInput,
    DocumentUpload,
    Quiz,
    Reflection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
}

/// One step of a verification plan. Immutable for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationStep {
    pub kind: StepKind,
    pub prompt: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    /// Only populated for `Quiz` steps.
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

/// Evidence payload for one step. Variants mirror `StepKind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StepEvidence {
    Amount { value: f64 },
    Text { value: String },
    Document { file_handle: String },
    QuizAnswers { answers: Vec<String> },
    Reflection { text: String },
}

impl StepEvidence {
    /// Whether this payload is the right shape for the given step kind.
    pub fn matches(&self, kind: StepKind) -> bool {
        matches!(
            (kind, self),
            (StepKind::AmountInput, StepEvidence::Amount { .. })
                | (StepKind::FreeTextInput, StepEvidence::Text { .. })
                | (StepKind::DocumentUpload, StepEvidence::Document { .. })
                | (StepKind::Quiz, StepEvidence::QuizAnswers { .. })
                | (StepKind::Reflection, StepEvidence::Reflection { .. })
        )
    }
}

/// Local completeness predicate for one step.
pub fn step_complete(step: &VerificationStep, evidence: &StepEvidence) -> bool {
    match (step.kind, evidence) {
        (StepKind::AmountInput, StepEvidence::Amount { value }) => *value > 0.0,
        (StepKind::FreeTextInput, StepEvidence::Text { value }) => {
            value.trim().len() >= FREE_TEXT_MIN_CHARS
        }
        (StepKind::DocumentUpload, StepEvidence::Document { file_handle }) => {
            !file_handle.trim().is_empty()
        }
        (StepKind::Quiz, StepEvidence::QuizAnswers { answers }) => {
            answers.len() == step.questions.len()
                && !answers.is_empty()
                && answers.iter().all(|a| !a.trim().is_empty())
        }
        (StepKind::Reflection, StepEvidence::Reflection { text }) => {
            text.split_whitespace().count() >= REFLECTION_MIN_TOKENS
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Collecting,
    Validating,
    Accepted,
    Rejected,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Accepted | SessionStatus::Rejected)
    }
}

/// One step plus its collected evidence, as compiled for the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledStep {
    pub kind: StepKind,
    pub prompt: String,
    pub evidence: StepEvidence,
}

/// Everything the oracle sees when judging a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledEvidence {
    pub steps: Vec<CompiledStep>,
}

/// Oracle judgment over compiled evidence.
///
/// The raw oracle JSON is an untrusted external contract: the shape is
/// validated at parse time and `confidence_score` clamped to [0, 1] before
/// the acceptance policy is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub accept: bool,
    pub confidence_score: f64,
    pub reasons: String,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

impl OracleVerdict {
    /// Clamp the confidence score into [0, 1]. Non-finite scores collapse
    /// to 0.0.
    pub fn clamped(mut self) -> Self {
        self.confidence_score = if self.confidence_score.is_finite() {
            self.confidence_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// The acceptance policy: explicit accept AND confidence at or above
    /// the threshold.
    pub fn passes(&self, threshold: f64) -> bool {
        self.accept && self.confidence_score >= threshold
    }
}

/// Final result of a verification session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum VerificationOutcome {
    Accepted {
        reward: RewardEvent,
        confidence: f64,
    },
    /// The oracle's reasons are surfaced verbatim.
    Rejected {
        reasons: String,
        red_flags: Vec<String>,
        confidence: f64,
    },
}
