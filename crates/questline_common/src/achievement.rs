//! Achievement catalog and evaluation.
//!
//! Evaluation is a pure read: it compares a metrics snapshot against the
//! catalog and the user's existing records and reports what newly qualifies.
//! Writing the unlock record (and rewarding) is the caller's job, performed
//! under per-user serialization so the at-most-once guarantee holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a catalog entry triggers on.
///
/// Closed enum so adding a trigger is a compile-time-checked decision.
/// `Unknown` is the serde catch-all for trigger types this build does not
/// recognize; evaluation skips them instead of failing, so a newer catalog
/// stays loadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    MissionsCount,
    GoalsCount,
    Level,
    Xp,
    Currency,
    Streak,
    #[serde(other)]
    Unknown,
}

/// Immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: String,
    pub title: String,
    pub trigger: TriggerType,
    pub trigger_value: u64,
    pub xp_reward: u64,
    pub gold_reward: u64,
}

/// Per-user unlock record. At most one per (user, achievement); immutable
/// once `unlocked` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAchievementRecord {
    pub achievement_id: String,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub progress_at_unlock: u64,
}

impl UserAchievementRecord {
    pub fn unlocked_now(achievement_id: &str, progress: u64) -> Self {
        Self {
            achievement_id: achievement_id.to_string(),
            unlocked: true,
            unlocked_at: Some(Utc::now()),
            progress_at_unlock: progress,
        }
    }
}

/// Snapshot of the per-user metrics achievements trigger on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub missions_completed: u64,
    pub goals_completed: u64,
    pub level: u32,
    pub total_xp: u64,
    pub currency: u64,
    pub streak: u32,
}

/// A catalog entry that newly qualifies, with the metric value that hit the
/// trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedAchievement {
    pub definition: AchievementDefinition,
    pub progress: u64,
}

/// Determine which catalog entries newly qualify.
///
/// Safe to re-run on the same snapshot: entries with an existing unlocked
/// record are never reported again.
pub fn evaluate(
    snapshot: &MetricsSnapshot,
    catalog: &[AchievementDefinition],
    records: &[UserAchievementRecord],
) -> Vec<QualifiedAchievement> {
    catalog
        .iter()
        .filter_map(|def| {
            let already_unlocked = records
                .iter()
                .any(|r| r.achievement_id == def.id && r.unlocked);
            if already_unlocked {
                return None;
            }

            let progress = match def.trigger {
                TriggerType::MissionsCount => snapshot.missions_completed,
                TriggerType::GoalsCount => snapshot.goals_completed,
                TriggerType::Level => u64::from(snapshot.level),
                TriggerType::Xp => snapshot.total_xp,
                TriggerType::Currency => snapshot.currency,
                TriggerType::Streak => u64::from(snapshot.streak),
                TriggerType::Unknown => return None,
            };

            (progress >= def.trigger_value).then(|| QualifiedAchievement {
                definition: def.clone(),
                progress,
            })
        })
        .collect()
}
