//! Verification-oracle collaborator.
//!
//! Two calls per mission: one to plan the evidence-collection steps at
//! session start, one holistic judgment over everything collected. The HTTP
//! implementation targets an Ollama-style endpoint; model output is an
//! untrusted contract, so the JSON shape is validated and the confidence
//! score clamped before any policy runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use questline_common::{
    CompiledEvidence, EngineError, EngineResult, MissionDefinition, OracleConfig, OracleVerdict,
    StepKind, VerificationStep,
};

const PLAN_SYSTEM_PROMPT: &str = "You plan verification for personal-finance missions. \
Given a mission, choose the evidence-collection steps that would prove it was done. \
Available step kinds: amount_input (a positive number), free_text_input (specifics the \
user provides), document_upload (statement/receipt/screenshot), quiz (2-3 questions only \
someone who did the mission could answer), reflection (detailed description of execution). \
Always end with a reflection step. Respond with JSON: \
{\"steps\": [{\"kind\": \"...\", \"prompt\": \"...\", \"placeholder\": null, \
\"questions\": [{\"question\": \"...\"}]}]}";

const JUDGE_SYSTEM_PROMPT: &str = "You are a strict validator of personal-finance mission \
completion. Inspect every piece of collected evidence: do the values look plausible, are \
answers specific rather than generic, do quiz answers make contextual sense, is the \
reflection concrete about execution? Reject on inconsistency or generic filler. Respond \
with JSON: {\"accept\": bool, \"confidence_score\": number between 0 and 1, \
\"reasons\": \"...\", \"red_flags\": [\"...\"]}";

#[async_trait]
pub trait VerificationOracle: Send + Sync {
    /// Produce the step plan for a mission. Called once per session.
    async fn generate_steps(
        &self,
        mission: &MissionDefinition,
    ) -> EngineResult<Vec<VerificationStep>>;

    /// One holistic judgment over the compiled evidence.
    async fn judge(
        &self,
        mission: &MissionDefinition,
        evidence: &CompiledEvidence,
    ) -> EngineResult<OracleVerdict>;
}

/// HTTP oracle against an Ollama-style completion endpoint.
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                EngineError::CollaboratorUnavailable(format!("failed to build http client: {e}"))
            })?;
        Ok(Self { client, config })
    }

    async fn call_json(&self, system_prompt: &str, user_prompt: &str) -> EngineResult<Value> {
        let url = format!("{}/api/generate", self.config.endpoint);
        let body = json!({
            "model": self.config.model,
            "system": system_prompt,
            "prompt": user_prompt,
            "stream": false,
            "format": "json",
        });

        debug!(model = %self.config.model, "calling verification oracle");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::CollaboratorUnavailable(format!("oracle request: {e}")))?;

        if !response.status().is_success() {
            return Err(EngineError::CollaboratorUnavailable(format!(
                "oracle returned status {}",
                response.status()
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| EngineError::CollaboratorUnavailable(format!("oracle body: {e}")))?;

        let text = envelope
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::CollaboratorUnavailable("oracle envelope missing response".to_string())
            })?;

        serde_json::from_str(text).map_err(|e| {
            EngineError::CollaboratorUnavailable(format!("oracle returned invalid json: {e}"))
        })
    }
}

/// Parse a step plan out of untrusted oracle JSON.
fn parse_steps(value: &Value) -> EngineResult<Vec<VerificationStep>> {
    let raw = value
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            EngineError::CollaboratorUnavailable("oracle plan missing steps array".to_string())
        })?;

    let mut steps = Vec::with_capacity(raw.len());
    for entry in raw {
        match serde_json::from_value::<VerificationStep>(entry.clone()) {
            Ok(step) => {
                // A quiz without questions can never be completed.
                if step.kind == StepKind::Quiz && step.questions.is_empty() {
                    warn!("oracle produced a quiz step with no questions, skipping");
                    continue;
                }
                steps.push(step);
            }
            Err(e) => {
                // Unknown kinds and malformed entries are dropped, not fatal.
                warn!(error = %e, "skipping malformed oracle step");
            }
        }
    }

    if steps.is_empty() {
        return Err(EngineError::CollaboratorUnavailable(
            "oracle plan contained no usable steps".to_string(),
        ));
    }
    Ok(steps)
}

/// Parse a verdict out of untrusted oracle JSON, tolerating common key
/// variations and clamping the confidence score.
fn parse_verdict(value: &Value) -> EngineResult<OracleVerdict> {
    let accept = value
        .get("accept")
        .or_else(|| value.get("is_valid"))
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            EngineError::CollaboratorUnavailable("oracle verdict missing accept flag".to_string())
        })?;

    let confidence_score = value
        .get("confidence_score")
        .or_else(|| value.get("confidence"))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            EngineError::CollaboratorUnavailable("oracle verdict missing confidence".to_string())
        })?;

    let reasons = value
        .get("reasons")
        .or_else(|| value.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let red_flags = value
        .get("red_flags")
        .and_then(Value::as_array)
        .map(|flags| {
            flags
                .iter()
                .filter_map(|f| f.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(OracleVerdict {
        accept,
        confidence_score,
        reasons,
        red_flags,
    }
    .clamped())
}

#[async_trait]
impl VerificationOracle for HttpOracle {
    async fn generate_steps(
        &self,
        mission: &MissionDefinition,
    ) -> EngineResult<Vec<VerificationStep>> {
        let prompt = format!(
            "MISSION\ntitle: {}\ndescription: {}\ndifficulty: {:?}\ntarget value: {}",
            mission.title,
            mission.description,
            mission.difficulty,
            mission.verification.target_value,
        );
        let value = self.call_json(PLAN_SYSTEM_PROMPT, &prompt).await?;
        parse_steps(&value)
    }

    async fn judge(
        &self,
        mission: &MissionDefinition,
        evidence: &CompiledEvidence,
    ) -> EngineResult<OracleVerdict> {
        let compiled = serde_json::to_string_pretty(evidence).map_err(|e| {
            EngineError::CollaboratorUnavailable(format!("failed to compile evidence: {e}"))
        })?;
        let prompt = format!(
            "MISSION\ntitle: {}\ndescription: {}\n\nCOLLECTED EVIDENCE\n{}",
            mission.title, mission.description, compiled,
        );
        let value = self.call_json(JUDGE_SYSTEM_PROMPT, &prompt).await?;
        parse_verdict(&value)
    }
}

/// Deterministic oracle for tests: fixed step plan, scripted verdicts,
/// optional failure injection, call counting.
pub struct FakeOracle {
    steps: Vec<VerificationStep>,
    verdicts: Mutex<Vec<EngineResult<OracleVerdict>>>,
    default_verdict: OracleVerdict,
    plan_calls: AtomicUsize,
    judge_calls: AtomicUsize,
}

impl FakeOracle {
    pub fn new(steps: Vec<VerificationStep>) -> Self {
        Self {
            steps,
            verdicts: Mutex::new(Vec::new()),
            default_verdict: OracleVerdict {
                accept: true,
                confidence_score: 0.9,
                reasons: "evidence is consistent".to_string(),
                red_flags: Vec::new(),
            },
            plan_calls: AtomicUsize::new(0),
            judge_calls: AtomicUsize::new(0),
        }
    }

    /// A single reflection step, the smallest plan the engine accepts.
    pub fn with_reflection_step() -> Self {
        Self::new(vec![VerificationStep {
            kind: StepKind::Reflection,
            prompt: "Describe how you completed the mission".to_string(),
            placeholder: None,
            questions: Vec::new(),
        }])
    }

    pub fn set_default_verdict(mut self, verdict: OracleVerdict) -> Self {
        self.default_verdict = verdict;
        self
    }

    /// Queue results returned by `judge` in order, before falling back to
    /// the default verdict.
    pub async fn queue_judge_result(&self, result: EngineResult<OracleVerdict>) {
        self.verdicts.lock().await.push(result);
    }

    pub fn plan_call_count(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }

    pub fn judge_call_count(&self) -> usize {
        self.judge_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationOracle for FakeOracle {
    async fn generate_steps(
        &self,
        _mission: &MissionDefinition,
    ) -> EngineResult<Vec<VerificationStep>> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        if self.steps.is_empty() {
            return Err(EngineError::CollaboratorUnavailable(
                "oracle plan contained no usable steps".to_string(),
            ));
        }
        Ok(self.steps.clone())
    }

    async fn judge(
        &self,
        _mission: &MissionDefinition,
        _evidence: &CompiledEvidence,
    ) -> EngineResult<OracleVerdict> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        let mut queued = self.verdicts.lock().await;
        if queued.is_empty() {
            Ok(self.default_verdict.clone())
        } else {
            queued.remove(0)
        }
    }
}
