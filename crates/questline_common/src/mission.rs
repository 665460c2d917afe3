//! Mission catalog model.
//!
//! Missions are immutable definitions; completion state lives at the entity
//! store. Manual missions are settled through the verification session flow,
//! which is why the definition carries enough context for the oracle to plan
//! and judge evidence.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Legendary,
}

/// How automatic progress checks compare against `target_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// Compare an absolute metric value.
    Absolute,
    /// Compare a percentage change from `baseline`.
    Percentage,
}

/// Parameters describing what counts as completing the mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationLogic {
    pub target_value: f64,
    #[serde(default)]
    pub baseline: Option<f64>,
    /// Whether the tracked metric is expected to go up (savings) or down
    /// (spending, debt).
    #[serde(default)]
    pub is_increase: Option<bool>,
    #[serde(default)]
    pub check_type: Option<CheckType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionDefinition {
    pub id: String,
    #[serde(default)]
    pub tier_id: Option<String>,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub xp_reward: u64,
    pub gold_reward: u64,
    pub verification: VerificationLogic,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mission_deserializes_with_sparse_verification() {
        let json = r#"{
            "id": "m1",
            "title": "Save your first 500",
            "description": "Put 500 aside this month",
            "difficulty": "medium",
            "xp_reward": 100,
            "gold_reward": 50,
            "verification": { "target_value": 500.0 }
        }"#;

        let mission: MissionDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(mission.difficulty, Difficulty::Medium);
        assert!(mission.tier_id.is_none());
        assert!(mission.verification.baseline.is_none());
        assert!(mission.verification.check_type.is_none());
    }
}
