//! Entity-store collaborator.
//!
//! Persistence of users, missions, achievements, tiers, assets and debts is
//! owned by an external store; the engine reaches it through this trait.
//! `MemoryStore` backs tests and local development with the same contract,
//! including the at-most-once unlock insert and the atomic mission
//! completion check-and-set.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use questline_common::{
    Asset, Debt, EngineError, EngineResult, MissionTier, ProgressionState, UserAchievementRecord,
};

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Load a user's progression state, creating the default for new users.
    async fn load_progression(&self, user_id: &str) -> EngineResult<ProgressionState>;

    /// Persist a user's progression state. Callers bump `version` first.
    async fn save_progression(&self, user_id: &str, state: &ProgressionState) -> EngineResult<()>;

    async fn achievement_records(&self, user_id: &str) -> EngineResult<Vec<UserAchievementRecord>>;

    /// Insert an unlock record. Fails with `InvalidState` if the achievement
    /// is already unlocked for this user; this is the at-most-once write.
    async fn insert_achievement_record(
        &self,
        user_id: &str,
        record: &UserAchievementRecord,
    ) -> EngineResult<()>;

    async fn completed_mission_count(&self, user_id: &str) -> EngineResult<u64>;

    async fn completed_goal_count(&self, user_id: &str) -> EngineResult<u64>;

    async fn tiers(&self) -> EngineResult<Vec<MissionTier>>;

    async fn assets(&self, user_id: &str) -> EngineResult<Vec<Asset>>;

    async fn debts(&self, user_id: &str) -> EngineResult<Vec<Debt>>;

    async fn debt(&self, user_id: &str, debt_id: &str) -> EngineResult<Option<Debt>>;

    /// Remove a defeated debt. Terminal: the record is deleted, not zeroed.
    async fn delete_debt(&self, user_id: &str, debt_id: &str) -> EngineResult<()>;

    async fn is_mission_completed(&self, user_id: &str, mission_id: &str) -> EngineResult<bool>;

    /// Mark a mission complete. Returns false if it was already complete;
    /// the check and the write are one atomic step.
    async fn mark_mission_completed(
        &self,
        user_id: &str,
        mission_id: &str,
        confidence: f64,
    ) -> EngineResult<bool>;
}

#[derive(Default)]
struct MemoryStoreInner {
    progression: HashMap<String, ProgressionState>,
    achievements: HashMap<String, Vec<UserAchievementRecord>>,
    goals_completed: HashMap<String, u64>,
    tiers: Vec<MissionTier>,
    assets: HashMap<String, Vec<Asset>>,
    debts: HashMap<String, Vec<Debt>>,
    completed_missions: HashMap<String, HashSet<String>>,
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_tiers(&self, tiers: Vec<MissionTier>) {
        self.inner.write().await.tiers = tiers;
    }

    pub async fn add_asset(&self, user_id: &str, asset: Asset) {
        self.inner
            .write()
            .await
            .assets
            .entry(user_id.to_string())
            .or_default()
            .push(asset);
    }

    pub async fn add_debt(&self, user_id: &str, debt: Debt) {
        self.inner
            .write()
            .await
            .debts
            .entry(user_id.to_string())
            .or_default()
            .push(debt);
    }

    pub async fn set_completed_goals(&self, user_id: &str, count: u64) {
        self.inner
            .write()
            .await
            .goals_completed
            .insert(user_id.to_string(), count);
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load_progression(&self, user_id: &str) -> EngineResult<ProgressionState> {
        let inner = self.inner.read().await;
        Ok(inner
            .progression
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_progression(&self, user_id: &str, state: &ProgressionState) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .progression
            .insert(user_id.to_string(), state.clone());
        Ok(())
    }

    async fn achievement_records(&self, user_id: &str) -> EngineResult<Vec<UserAchievementRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.achievements.get(user_id).cloned().unwrap_or_default())
    }

    async fn insert_achievement_record(
        &self,
        user_id: &str,
        record: &UserAchievementRecord,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        let records = inner.achievements.entry(user_id.to_string()).or_default();
        let duplicate = records
            .iter()
            .any(|r| r.achievement_id == record.achievement_id && r.unlocked);
        if duplicate {
            return Err(EngineError::InvalidState(format!(
                "achievement {} already unlocked for user {user_id}",
                record.achievement_id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn completed_mission_count(&self, user_id: &str) -> EngineResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .completed_missions
            .get(user_id)
            .map(|m| m.len() as u64)
            .unwrap_or(0))
    }

    async fn completed_goal_count(&self, user_id: &str) -> EngineResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.goals_completed.get(user_id).copied().unwrap_or(0))
    }

    async fn tiers(&self) -> EngineResult<Vec<MissionTier>> {
        Ok(self.inner.read().await.tiers.clone())
    }

    async fn assets(&self, user_id: &str) -> EngineResult<Vec<Asset>> {
        let inner = self.inner.read().await;
        Ok(inner.assets.get(user_id).cloned().unwrap_or_default())
    }

    async fn debts(&self, user_id: &str) -> EngineResult<Vec<Debt>> {
        let inner = self.inner.read().await;
        Ok(inner.debts.get(user_id).cloned().unwrap_or_default())
    }

    async fn debt(&self, user_id: &str, debt_id: &str) -> EngineResult<Option<Debt>> {
        let inner = self.inner.read().await;
        Ok(inner
            .debts
            .get(user_id)
            .and_then(|debts| debts.iter().find(|d| d.id == debt_id).cloned()))
    }

    async fn delete_debt(&self, user_id: &str, debt_id: &str) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(debts) = inner.debts.get_mut(user_id) {
            debts.retain(|d| d.id != debt_id);
        }
        Ok(())
    }

    async fn is_mission_completed(&self, user_id: &str, mission_id: &str) -> EngineResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .completed_missions
            .get(user_id)
            .is_some_and(|m| m.contains(mission_id)))
    }

    async fn mark_mission_completed(
        &self,
        user_id: &str,
        mission_id: &str,
        _confidence: f64,
    ) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .completed_missions
            .entry(user_id.to_string())
            .or_default()
            .insert(mission_id.to_string()))
    }
}
