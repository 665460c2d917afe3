//! Progression engine facade.
//!
//! Serialization discipline: every read-modify-write of a user's
//! `ProgressionState`, and every achievement unlock check, runs under that
//! user's lock. Verification sessions are independent per (user, mission);
//! only the terminal accept transition re-enters the per-user critical
//! section, where the mission-completed check-and-set guards against double
//! rewarding.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use questline_common::{
    accessible_tiers, compute_streak, evaluate, net_worth, AchievementDefinition, EngineConfig,
    EngineError, EngineResult, LevelCurve, MetricsSnapshot, MissionDefinition, MissionTier,
    RewardEvent, RewardSource, StepEvidence, StreakUpdate, UserAchievementRecord,
    VerificationOutcome,
};

use crate::oracle::VerificationOracle;
use crate::rewards;
use crate::session::{SessionRegistry, SessionView, VerificationSession};
use crate::store::EntityStore;

pub struct ProgressionEngine {
    store: Arc<dyn EntityStore>,
    oracle: Arc<dyn VerificationOracle>,
    config: EngineConfig,
    curve: LevelCurve,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    sessions: SessionRegistry,
}

impl ProgressionEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        oracle: Arc<dyn VerificationOracle>,
        config: EngineConfig,
    ) -> Self {
        let config = config.sanitized();
        let curve = config.level_curve();
        Self {
            store,
            oracle,
            config,
            curve,
            user_locks: Mutex::new(HashMap::new()),
            sessions: SessionRegistry::new(),
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        // Sweep entries nobody holds; the map stays bounded by the number
        // of users with an operation in flight.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Fold an activity day into the user's login streak. Lazy: called on
    /// interaction, never from a timer.
    pub async fn record_activity(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> EngineResult<StreakUpdate> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut state = self.store.load_progression(user_id).await?;
        let update = compute_streak(state.login_streak, state.last_activity_date, today);

        if update.anomaly {
            warn!(
                user_id,
                ?today,
                last = ?state.last_activity_date,
                "activity date precedes last recorded activity, streak untouched"
            );
            return Ok(update);
        }

        if state.login_streak != update.streak || state.last_activity_date != Some(today) {
            state.login_streak = update.streak;
            state.last_activity_date = Some(today);
            state.version += 1;
            self.store.save_progression(user_id, &state).await?;
        }
        Ok(update)
    }

    /// Evaluate the achievement catalog and unlock whatever newly qualifies.
    ///
    /// Runs entirely under the user's lock so two concurrent evaluations
    /// cannot both unlock the same achievement. The unlock record is written
    /// before the reward. A failure midway through the loop surfaces the
    /// error and drops the events already emitted in this call; the rewards
    /// behind them are persisted, and re-running never applies them again,
    /// so callers needing an audit of what landed re-derive it from the
    /// stored progression state.
    pub async fn evaluate_and_unlock(
        &self,
        user_id: &str,
        catalog: &[AchievementDefinition],
    ) -> EngineResult<Vec<RewardEvent>> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let state = self.store.load_progression(user_id).await?;
        let snapshot = MetricsSnapshot {
            missions_completed: self.store.completed_mission_count(user_id).await?,
            goals_completed: self.store.completed_goal_count(user_id).await?,
            level: state.level,
            total_xp: state.total_xp,
            currency: state.currency,
            streak: state.login_streak,
        };
        let records = self.store.achievement_records(user_id).await?;
        let qualified = evaluate(&snapshot, catalog, &records);

        let mut events = Vec::with_capacity(qualified.len());
        for q in qualified {
            let record = UserAchievementRecord::unlocked_now(&q.definition.id, q.progress);
            self.store.insert_achievement_record(user_id, &record).await?;
            info!(user_id, achievement = %q.definition.id, "achievement unlocked");

            let source = RewardSource::AchievementUnlocked {
                achievement_id: q.definition.id.clone(),
                xp_reward: q.definition.xp_reward,
                gold_reward: q.definition.gold_reward,
            };
            match self.apply_reward_locked(user_id, &source).await {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(
                        user_id,
                        achievement = %q.definition.id,
                        applied = events.len(),
                        "unlock loop aborted, earlier rewards remain persisted"
                    );
                    return Err(e);
                }
            }
        }
        Ok(events)
    }

    /// Assets minus outstanding debt balances.
    pub async fn net_worth(&self, user_id: &str) -> EngineResult<f64> {
        let assets = self.store.assets(user_id).await?;
        let debts = self.store.debts(user_id).await?;
        Ok(net_worth(&assets, &debts))
    }

    /// The accessible prefix of the tier ladder for this user.
    pub async fn accessible_tiers(&self, user_id: &str) -> EngineResult<Vec<MissionTier>> {
        let tiers = self.store.tiers().await?;
        let worth = self.net_worth(user_id).await?;
        Ok(accessible_tiers(&tiers, worth))
    }

    /// Apply a reward source event, emitting exactly one audit event.
    /// Idempotence is the caller's contract: achievements are guarded by the
    /// unlock record, missions by the session's terminal state.
    pub async fn apply_reward(
        &self,
        user_id: &str,
        source: &RewardSource,
    ) -> EngineResult<RewardEvent> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        self.apply_reward_locked(user_id, source).await
    }

    /// Reward application body; the caller holds the user's lock.
    async fn apply_reward_locked(
        &self,
        user_id: &str,
        source: &RewardSource,
    ) -> EngineResult<RewardEvent> {
        let resolved = rewards::resolve(self.store.as_ref(), user_id, source).await?;

        let mut state = self.store.load_progression(user_id).await?;
        let event = rewards::settle(&mut state, &self.curve, &resolved)?;
        state.version += 1;
        self.store.save_progression(user_id, &state).await?;

        debug!(
            user_id,
            source = ?event.source,
            xp = event.xp_granted,
            leveled_up = event.leveled_up,
            "reward applied"
        );
        Ok(event)
    }

    /// Open a verification session for a mission. The oracle plans the
    /// evidence steps once; the plan is immutable for the session.
    pub async fn start_verification(
        &self,
        user_id: &str,
        mission: &MissionDefinition,
    ) -> EngineResult<String> {
        if self.store.is_mission_completed(user_id, &mission.id).await? {
            return Err(EngineError::InvalidState(format!(
                "mission {} is already completed",
                mission.id
            )));
        }

        let steps = self.oracle.generate_steps(mission).await?;
        debug!(user_id, mission = %mission.id, steps = steps.len(), "verification planned");

        let session = VerificationSession::new(user_id, mission.clone(), steps);
        self.sessions.insert(session).await
    }

    /// Attach evidence to a step of an open session.
    pub async fn submit_step(
        &self,
        session_id: &str,
        step_index: usize,
        evidence: StepEvidence,
    ) -> EngineResult<SessionView> {
        let entry = self.sessions.get(session_id).await?;
        let mut session = entry.lock().await;
        session.submit(step_index, evidence)?;
        Ok(session.view())
    }

    pub async fn session_view(&self, session_id: &str) -> EngineResult<SessionView> {
        let entry = self.sessions.get(session_id).await?;
        let session = entry.lock().await;
        Ok(session.view())
    }

    /// Abandon a collecting session. No side effects.
    pub async fn cancel_verification(&self, session_id: &str) -> EngineResult<()> {
        let entry = self.sessions.get(session_id).await?;
        {
            let session = entry.lock().await;
            session.cancel()?;
        }
        self.sessions.remove(session_id).await;
        Ok(())
    }

    /// Submit the collected evidence for the single holistic judgment and
    /// settle the session.
    ///
    /// An oracle failure propagates as retryable and leaves the session in
    /// `Validating`; it never silently accepts. On accept, the mission
    /// completion check-and-set and the reward run under the user's lock so
    /// the same mission can never pay out twice. A passing verdict and the
    /// committed completion write are recorded on the session before any
    /// further store write, so a retry after a reward failure re-attempts
    /// only the reward, with the same verdict and without a second
    /// check-and-set.
    pub async fn finalize(&self, session_id: &str) -> EngineResult<VerificationOutcome> {
        let entry = self.sessions.get(session_id).await?;
        let mut session = entry.lock().await;

        let mission = session.mission.clone();
        let user_id = session.user_id.clone();
        let threshold = self.config.verification.confidence_threshold;

        let verdict = match session.accepted_verdict().cloned() {
            Some(verdict) => verdict,
            None => {
                let compiled = session.begin_validation()?;
                let verdict = self.oracle.judge(&mission, &compiled).await?;
                if verdict.passes(threshold) {
                    session.record_accepted_verdict(verdict.clone());
                }
                verdict
            }
        };

        let outcome = if verdict.passes(threshold) {
            let lock = self.user_lock(&user_id).await;
            let _guard = lock.lock().await;

            if !session.completion_recorded() {
                let newly_completed = self
                    .store
                    .mark_mission_completed(&user_id, &mission.id, verdict.confidence_score)
                    .await?;
                if !newly_completed {
                    // Completed through another path while we were validating.
                    session.settle(false)?;
                    drop(session);
                    self.sessions.remove(session_id).await;
                    return Err(EngineError::InvalidState(format!(
                        "mission {} was already completed",
                        mission.id
                    )));
                }
                session.record_completion();
            }

            let source = RewardSource::MissionAccepted {
                mission_id: mission.id.clone(),
                xp_reward: mission.xp_reward,
                gold_reward: mission.gold_reward,
            };
            let reward = self.apply_reward_locked(&user_id, &source).await?;
            session.settle(true)?;
            info!(
                user_id,
                mission = %mission.id,
                confidence = verdict.confidence_score,
                "mission verified and completed"
            );

            VerificationOutcome::Accepted {
                reward,
                confidence: verdict.confidence_score,
            }
        } else {
            session.settle(false)?;
            info!(
                user_id,
                mission = %mission.id,
                confidence = verdict.confidence_score,
                "mission verification rejected"
            );

            VerificationOutcome::Rejected {
                reasons: verdict.reasons,
                red_flags: verdict.red_flags,
                confidence: verdict.confidence_score,
            }
        };

        drop(session);
        self.sessions.remove(session_id).await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FakeOracle;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_idle_user_locks_are_swept() {
        let engine = ProgressionEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FakeOracle::with_reflection_step()),
            EngineConfig::default(),
        );
        let day = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();

        for i in 0..10 {
            engine
                .record_activity(&format!("u{i}"), day)
                .await
                .unwrap();
        }
        // The next acquisition sweeps the ten idle entries.
        engine.record_activity("u-last", day).await.unwrap();

        let locks = engine.user_locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("u-last"));
    }
}
