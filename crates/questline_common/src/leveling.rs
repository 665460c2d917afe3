//! Leveling curve and XP settlement.
//!
//! The curve is linear: clearing level N costs `N * xp_per_level` XP. The
//! constant lives in `LevelCurve` and nowhere else. A single grant may cross
//! several level boundaries; settlement loops until the remainder fits under
//! the current threshold.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Default XP needed per level step.
pub const DEFAULT_XP_PER_LEVEL: u64 = 100;

/// Levels per skill point. Crossing a multiple of this grants one point.
pub const LEVELS_PER_SKILL_POINT: u32 = 5;

/// The leveling curve. Single source of truth for XP thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCurve {
    xp_per_level: u64,
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self {
            xp_per_level: DEFAULT_XP_PER_LEVEL,
        }
    }
}

impl LevelCurve {
    /// A non-zero step is required; zero would make settlement diverge.
    pub fn new(xp_per_level: u64) -> Self {
        Self {
            xp_per_level: xp_per_level.max(1),
        }
    }

    /// XP needed to clear the given level.
    pub fn xp_required_for_level(&self, level: u32) -> u64 {
        u64::from(level) * self.xp_per_level
    }
}

/// Per-user progression state.
///
/// Invariants after settlement: `current_xp < xp_required_for_level(level)`
/// and `total_xp` never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionState {
    pub level: u32,
    /// XP accrued within the current level.
    pub current_xp: u64,
    /// Lifetime XP, monotonically non-decreasing.
    pub total_xp: u64,
    pub currency: u64,
    pub skill_points: u32,
    pub login_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    /// Bumped on every persisted write; lets compare-and-set stores detect
    /// conflicting writers.
    pub version: u64,
}

impl Default for ProgressionState {
    fn default() -> Self {
        Self {
            level: 1,
            current_xp: 0,
            total_xp: 0,
            currency: 0,
            skill_points: 0,
            login_streak: 0,
            last_activity_date: None,
            version: 0,
        }
    }
}

/// Result of settling one XP grant against the curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSettlement {
    pub leveled_up: bool,
    /// Every level entered during this grant, in order.
    pub levels_crossed: Vec<u32>,
    pub skill_points_gained: u32,
}

/// Apply an XP delta to a progression state.
///
/// Negative deltas are rejected. Any non-negative delta succeeds; there is no
/// upper bound on level.
pub fn apply_xp(
    state: &mut ProgressionState,
    curve: &LevelCurve,
    xp_delta: i64,
) -> EngineResult<LevelSettlement> {
    if xp_delta < 0 {
        return Err(EngineError::InvalidArgument(format!(
            "negative xp delta: {xp_delta}"
        )));
    }

    let mut remaining = xp_delta as u64;
    let old_level = state.level;
    state.total_xp += remaining;

    let mut crossed = Vec::new();
    loop {
        let threshold = curve.xp_required_for_level(state.level);
        if state.current_xp + remaining >= threshold {
            remaining = state.current_xp + remaining - threshold;
            state.current_xp = 0;
            state.level += 1;
            crossed.push(state.level);
        } else {
            state.current_xp += remaining;
            break;
        }
    }

    let gained = state.level / LEVELS_PER_SKILL_POINT - old_level / LEVELS_PER_SKILL_POINT;
    state.skill_points += gained;

    Ok(LevelSettlement {
        leveled_up: !crossed.is_empty(),
        levels_crossed: crossed,
        skill_points_gained: gained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_curve() {
        let curve = LevelCurve::default();
        for level in 1..=50u32 {
            assert_eq!(curve.xp_required_for_level(level), u64::from(level) * 100);
        }
    }

    #[test]
    fn test_zero_step_is_clamped() {
        let curve = LevelCurve::new(0);
        assert_eq!(curve.xp_required_for_level(3), 3);
    }

    #[test]
    fn test_single_level_up_with_remainder() {
        let curve = LevelCurve::default();
        let mut state = ProgressionState {
            level: 1,
            current_xp: 90,
            ..Default::default()
        };

        let settlement = apply_xp(&mut state, &curve, 15).unwrap();

        assert_eq!(state.level, 2);
        assert_eq!(state.current_xp, 5);
        assert_eq!(state.total_xp, 15);
        assert!(settlement.leveled_up);
        assert_eq!(settlement.levels_crossed, vec![2]);
    }

    #[test]
    fn test_multi_level_jump_in_one_grant() {
        let curve = LevelCurve::default();
        let mut state = ProgressionState::default();

        // 100 + 200 + 300 = 600 clears levels 1..=3, 50 left over on level 4.
        let settlement = apply_xp(&mut state, &curve, 650).unwrap();

        assert_eq!(state.level, 4);
        assert_eq!(state.current_xp, 50);
        assert_eq!(settlement.levels_crossed, vec![2, 3, 4]);
    }

    #[test]
    fn test_sequential_grants_match_single_grant() {
        let curve = LevelCurve::default();
        let mut a = ProgressionState::default();
        let mut b = ProgressionState::default();

        apply_xp(&mut a, &curve, 5).unwrap();
        apply_xp(&mut a, &curve, 250).unwrap();
        apply_xp(&mut b, &curve, 255).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_negative_delta_rejected() {
        let curve = LevelCurve::default();
        let mut state = ProgressionState::default();
        let before = state.clone();

        let err = apply_xp(&mut state, &curve, -1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_settlement_invariant_holds() {
        let curve = LevelCurve::default();
        let mut state = ProgressionState::default();

        for delta in [0, 1, 99, 100, 999, 12345] {
            apply_xp(&mut state, &curve, delta).unwrap();
            assert!(state.current_xp < curve.xp_required_for_level(state.level));
        }
    }

    #[test]
    fn test_skill_points_on_level_bucket_change() {
        let curve = LevelCurve::default();
        let mut state = ProgressionState {
            level: 4,
            ..Default::default()
        };

        // Level 4 -> 6 crosses the /5 bucket once.
        let settlement = apply_xp(&mut state, &curve, 900).unwrap();

        assert_eq!(state.level, 6);
        assert_eq!(settlement.skill_points_gained, 1);
        assert_eq!(state.skill_points, 1);
    }
}
