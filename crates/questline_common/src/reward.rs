//! Reward sources and the audit event emitted per application.
//!
//! One `RewardEvent` is emitted per logical source event; callers must not
//! apply the same source twice. For achievements that is enforced by the
//! unlock record, for missions by the session's terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monetary units per XP point for derived rewards (asset growth,
/// defeated debt totals).
pub const AMOUNT_PER_XP: f64 = 100.0;

/// A progression-relevant event carrying its reward parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RewardSource {
    AchievementUnlocked {
        achievement_id: String,
        xp_reward: u64,
        gold_reward: u64,
    },
    MissionAccepted {
        mission_id: String,
        xp_reward: u64,
        gold_reward: u64,
    },
    /// Arbitrary asset top-up. XP is derived from the amount, not fixed,
    /// and may be zero.
    AssetValueIncreased { asset_id: String, amount: f64 },
    /// Terminal domain event: the debt record is deleted, not updated.
    DebtFullyRepaid { debt_id: String },
}

impl RewardSource {
    pub fn kind(&self) -> RewardKind {
        match self {
            RewardSource::AchievementUnlocked { .. } => RewardKind::Achievement,
            RewardSource::MissionAccepted { .. } => RewardKind::Mission,
            RewardSource::AssetValueIncreased { .. } => RewardKind::AssetGrowth,
            RewardSource::DebtFullyRepaid { .. } => RewardKind::DebtDefeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    Achievement,
    Mission,
    AssetGrowth,
    DebtDefeat,
}

/// Audit record of one applied reward. Emitted, not stored, by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardEvent {
    pub source: RewardKind,
    pub xp_granted: u64,
    pub currency_granted: u64,
    pub leveled_up: bool,
    pub new_level: Option<u32>,
    pub levels_crossed: Vec<u32>,
    pub skill_points_gained: u32,
    pub occurred_at: DateTime<Utc>,
}

/// XP derived from a monetary amount (asset growth, defeated debt total).
pub fn xp_from_amount(amount: f64) -> u64 {
    if amount <= 0.0 || !amount.is_finite() {
        return 0;
    }
    (amount / AMOUNT_PER_XP).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xp_from_amount_floors() {
        assert_eq!(xp_from_amount(0.0), 0);
        assert_eq!(xp_from_amount(99.99), 0);
        assert_eq!(xp_from_amount(100.0), 1);
        assert_eq!(xp_from_amount(2350.0), 23);
    }

    #[test]
    fn test_xp_from_amount_ignores_garbage() {
        assert_eq!(xp_from_amount(-500.0), 0);
        assert_eq!(xp_from_amount(f64::NAN), 0);
        assert_eq!(xp_from_amount(f64::INFINITY), 0);
    }

    #[test]
    fn test_source_kind_mapping() {
        let source = RewardSource::DebtFullyRepaid {
            debt_id: "d1".to_string(),
        };
        assert_eq!(source.kind(), RewardKind::DebtDefeat);
    }
}
