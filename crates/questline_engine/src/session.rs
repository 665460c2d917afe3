//! Verification session state machine.
//!
//! Lifecycle: `Collecting` (re-entrant, free navigation across steps) ->
//! `Validating` (one oracle judgment pending) -> `Accepted` | `Rejected`.
//! Sessions are ephemeral, keyed by (user, mission), and destroyed on a
//! terminal transition or cancellation; only the final outcome is written
//! back to the mission record. An oracle failure during validation leaves
//! the session in `Validating` so the caller can retry or abandon it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use questline_common::{
    step_complete, CompiledEvidence, CompiledStep, EngineError, EngineResult, MissionDefinition,
    OracleVerdict, SessionStatus, StepEvidence, VerificationStep,
};

/// One in-flight verification session.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub id: String,
    pub user_id: String,
    pub mission: MissionDefinition,
    /// Immutable for the session's lifetime.
    pub steps: Vec<VerificationStep>,
    pub current_step: usize,
    pub status: SessionStatus,
    evidence: HashMap<usize, StepEvidence>,
    accepted_verdict: Option<OracleVerdict>,
    completion_recorded: bool,
}

impl VerificationSession {
    pub fn new(user_id: &str, mission: MissionDefinition, steps: Vec<VerificationStep>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            mission,
            steps,
            current_step: 0,
            status: SessionStatus::Collecting,
            evidence: HashMap::new(),
            accepted_verdict: None,
            completion_recorded: false,
        }
    }

    /// Remember a passing verdict. A settlement retry after a downstream
    /// failure reuses it instead of consulting the oracle again.
    pub fn record_accepted_verdict(&mut self, verdict: OracleVerdict) {
        self.accepted_verdict = Some(verdict);
    }

    pub fn accepted_verdict(&self) -> Option<&OracleVerdict> {
        self.accepted_verdict.as_ref()
    }

    /// Remember that the mission completion write committed. A settlement
    /// retry skips the check-and-set and only re-attempts the reward.
    pub fn record_completion(&mut self) {
        self.completion_recorded = true;
    }

    pub fn completion_recorded(&self) -> bool {
        self.completion_recorded
    }

    /// Attach evidence to a step. Navigation is free while collecting: any
    /// step index may be revisited and overwritten.
    pub fn submit(&mut self, step_index: usize, evidence: StepEvidence) -> EngineResult<()> {
        if self.status != SessionStatus::Collecting {
            return Err(EngineError::InvalidState(format!(
                "session {} is not collecting (status {:?})",
                self.id, self.status
            )));
        }
        let step = self.steps.get(step_index).ok_or_else(|| {
            EngineError::InvalidArgument(format!(
                "step index {step_index} out of range ({} steps)",
                self.steps.len()
            ))
        })?;
        if !evidence.matches(step.kind) {
            return Err(EngineError::InvalidArgument(format!(
                "evidence kind does not match step kind {:?}",
                step.kind
            )));
        }

        self.evidence.insert(step_index, evidence);
        self.current_step = step_index;
        Ok(())
    }

    pub fn step_is_complete(&self, step_index: usize) -> bool {
        match (self.steps.get(step_index), self.evidence.get(&step_index)) {
            (Some(step), Some(evidence)) => step_complete(step, evidence),
            _ => false,
        }
    }

    pub fn all_steps_complete(&self) -> bool {
        (0..self.steps.len()).all(|i| self.step_is_complete(i))
    }

    /// Transition `Collecting` -> `Validating`. Requires every step's
    /// completeness predicate to hold.
    pub fn begin_validation(&mut self) -> EngineResult<CompiledEvidence> {
        match self.status {
            SessionStatus::Collecting => {
                if !self.all_steps_complete() {
                    let missing: Vec<usize> = (0..self.steps.len())
                        .filter(|i| !self.step_is_complete(*i))
                        .collect();
                    return Err(EngineError::InvalidState(format!(
                        "steps {missing:?} are incomplete"
                    )));
                }
                self.status = SessionStatus::Validating;
                Ok(self.compile())
            }
            // Retry after an oracle failure: recompile, stay validating.
            SessionStatus::Validating => Ok(self.compile()),
            _ => Err(EngineError::InvalidState(format!(
                "session {} is terminal",
                self.id
            ))),
        }
    }

    fn compile(&self) -> CompiledEvidence {
        let steps = self
            .steps
            .iter()
            .enumerate()
            .filter_map(|(i, step)| {
                self.evidence.get(&i).map(|evidence| CompiledStep {
                    kind: step.kind,
                    prompt: step.prompt.clone(),
                    evidence: evidence.clone(),
                })
            })
            .collect();
        CompiledEvidence { steps }
    }

    /// Record the decision. Only legal while `Validating`.
    pub fn settle(&mut self, accepted: bool) -> EngineResult<()> {
        if self.status != SessionStatus::Validating {
            return Err(EngineError::InvalidState(format!(
                "session {} is not validating",
                self.id
            )));
        }
        self.status = if accepted {
            SessionStatus::Accepted
        } else {
            SessionStatus::Rejected
        };
        Ok(())
    }

    /// Abandon a collecting session. Nothing was persisted, so this has no
    /// side effects. A validating session cannot be cancelled: its verdict
    /// may still arrive and is discarded by the caller instead.
    pub fn cancel(&self) -> EngineResult<()> {
        if self.status != SessionStatus::Collecting {
            return Err(EngineError::InvalidState(format!(
                "session {} is not collecting",
                self.id
            )));
        }
        Ok(())
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            mission_id: self.mission.id.clone(),
            status: self.status,
            current_step: self.current_step,
            total_steps: self.steps.len(),
            steps_complete: (0..self.steps.len())
                .map(|i| self.step_is_complete(i))
                .collect(),
        }
    }
}

/// Caller-facing snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub mission_id: String,
    pub status: SessionStatus,
    pub current_step: usize,
    pub total_steps: usize,
    pub steps_complete: Vec<bool>,
}

/// Registry of live sessions: one per (user, mission), independent across
/// users and across missions for the same user.
#[derive(Default)]
pub struct SessionRegistry {
    by_id: RwLock<HashMap<String, Arc<Mutex<VerificationSession>>>>,
    by_key: RwLock<HashMap<(String, String), String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: VerificationSession) -> EngineResult<String> {
        let key = (session.user_id.clone(), session.mission.id.clone());
        let id = session.id.clone();

        let mut by_key = self.by_key.write().await;
        if by_key.contains_key(&key) {
            return Err(EngineError::InvalidState(format!(
                "a verification session for mission {} is already open",
                session.mission.id
            )));
        }
        by_key.insert(key, id.clone());
        self.by_id
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(session)));
        Ok(id)
    }

    pub async fn get(&self, session_id: &str) -> EngineResult<Arc<Mutex<VerificationSession>>> {
        self.by_id
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!("unknown session {session_id}"))
            })
    }

    /// Destroy a session (terminal transition or cancellation).
    pub async fn remove(&self, session_id: &str) {
        if let Some(entry) = self.by_id.write().await.remove(session_id) {
            let session = entry.lock().await;
            self.by_key
                .write()
                .await
                .remove(&(session.user_id.clone(), session.mission.id.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_common::{Difficulty, StepKind, VerificationLogic};

    fn mission() -> MissionDefinition {
        MissionDefinition {
            id: "m1".to_string(),
            tier_id: None,
            title: "Save 500".to_string(),
            description: "Put 500 aside this month".to_string(),
            difficulty: Difficulty::Medium,
            xp_reward: 100,
            gold_reward: 50,
            verification: VerificationLogic {
                target_value: 500.0,
                baseline: None,
                is_increase: None,
                check_type: None,
            },
        }
    }

    fn two_step_session() -> VerificationSession {
        VerificationSession::new(
            "u1",
            mission(),
            vec![
                VerificationStep {
                    kind: StepKind::AmountInput,
                    prompt: "How much?".to_string(),
                    placeholder: None,
                    questions: Vec::new(),
                },
                VerificationStep {
                    kind: StepKind::Reflection,
                    prompt: "Describe it".to_string(),
                    placeholder: None,
                    questions: Vec::new(),
                },
            ],
        )
    }

    fn reflection_text() -> String {
        vec!["word"; 20].join(" ")
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut session = two_step_session();
        let err = session
            .submit(
                0,
                StepEvidence::Text {
                    value: "not a number".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let mut session = two_step_session();
        let err = session
            .submit(5, StepEvidence::Amount { value: 1.0 })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_validation_gated_on_completeness() {
        let mut session = two_step_session();
        session
            .submit(0, StepEvidence::Amount { value: 500.0 })
            .unwrap();

        // Reflection still missing.
        assert!(matches!(
            session.begin_validation().unwrap_err(),
            EngineError::InvalidState(_)
        ));

        session
            .submit(
                1,
                StepEvidence::Reflection {
                    text: reflection_text(),
                },
            )
            .unwrap();

        let compiled = session.begin_validation().unwrap();
        assert_eq!(session.status, SessionStatus::Validating);
        assert_eq!(compiled.steps.len(), 2);
    }

    #[test]
    fn test_revisiting_a_step_overwrites_evidence() {
        let mut session = two_step_session();
        session
            .submit(0, StepEvidence::Amount { value: 100.0 })
            .unwrap();
        session
            .submit(
                1,
                StepEvidence::Reflection {
                    text: reflection_text(),
                },
            )
            .unwrap();
        // Back to step 0 with a corrected amount.
        session
            .submit(0, StepEvidence::Amount { value: 750.0 })
            .unwrap();
        assert_eq!(session.current_step, 0);

        let compiled = session.begin_validation().unwrap();
        assert_eq!(
            compiled.steps[0].evidence,
            StepEvidence::Amount { value: 750.0 }
        );
    }

    #[test]
    fn test_terminal_session_rejects_submission() {
        let mut session = two_step_session();
        session
            .submit(0, StepEvidence::Amount { value: 500.0 })
            .unwrap();
        session
            .submit(
                1,
                StepEvidence::Reflection {
                    text: reflection_text(),
                },
            )
            .unwrap();
        session.begin_validation().unwrap();
        session.settle(true).unwrap();

        let err = session
            .submit(0, StepEvidence::Amount { value: 1.0 })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn test_recorded_verdict_and_completion_survive_for_retry() {
        let mut session = two_step_session();
        session
            .submit(0, StepEvidence::Amount { value: 500.0 })
            .unwrap();
        session
            .submit(
                1,
                StepEvidence::Reflection {
                    text: reflection_text(),
                },
            )
            .unwrap();
        session.begin_validation().unwrap();

        assert!(session.accepted_verdict().is_none());
        session.record_accepted_verdict(OracleVerdict {
            accept: true,
            confidence_score: 0.85,
            reasons: "consistent".to_string(),
            red_flags: Vec::new(),
        });
        session.record_completion();

        // The session is still validating; a retry can read both markers.
        assert_eq!(session.status, SessionStatus::Validating);
        assert_eq!(
            session.accepted_verdict().map(|v| v.confidence_score),
            Some(0.85)
        );
        assert!(session.completion_recorded());
    }

    #[test]
    fn test_cancel_only_while_collecting() {
        let mut session = two_step_session();
        assert!(session.cancel().is_ok());

        session
            .submit(0, StepEvidence::Amount { value: 500.0 })
            .unwrap();
        session
            .submit(
                1,
                StepEvidence::Reflection {
                    text: reflection_text(),
                },
            )
            .unwrap();
        session.begin_validation().unwrap();
        assert!(session.cancel().is_err());
    }

    #[tokio::test]
    async fn test_registry_enforces_one_session_per_mission() {
        let registry = SessionRegistry::new();
        registry.insert(two_step_session()).await.unwrap();

        let err = registry.insert(two_step_session()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_registry_remove_frees_the_key() {
        let registry = SessionRegistry::new();
        let id = registry.insert(two_step_session()).await.unwrap();
        registry.remove(&id).await;

        registry.insert(two_step_session()).await.unwrap();
    }
}
