//! Consecutive-day activity streaks.
//!
//! Streak maintenance is lazy: the caller folds in `today` on each user
//! interaction, there is no internal clock. Repeated same-day calls are
//! idempotent, and a `today` before the recorded last activity (clock skew)
//! never decrements the streak; it is flagged for the caller to log.

use chrono::NaiveDate;

/// Outcome of folding one activity day into a streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub streak: u32,
    /// `today` was before the recorded last activity. The streak was left
    /// untouched.
    pub anomaly: bool,
}

/// Fold `today` into a streak given the last recorded activity date.
pub fn compute_streak(
    current_streak: u32,
    last_activity_date: Option<NaiveDate>,
    today: NaiveDate,
) -> StreakUpdate {
    let Some(last) = last_activity_date else {
        // First ever activity.
        return StreakUpdate {
            streak: 1,
            anomaly: false,
        };
    };

    match (today - last).num_days() {
        0 => StreakUpdate {
            streak: current_streak,
            anomaly: false,
        },
        1 => StreakUpdate {
            streak: current_streak + 1,
            anomaly: false,
        },
        gap if gap >= 2 => StreakUpdate {
            streak: 1,
            anomaly: false,
        },
        // today < last: clock skew, no-op.
        _ => StreakUpdate {
            streak: current_streak,
            anomaly: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_activity_starts_at_one() {
        let update = compute_streak(0, None, date(2026, 3, 1));
        assert_eq!(update.streak, 1);
        assert!(!update.anomaly);
    }

    #[test]
    fn test_same_day_is_idempotent() {
        let today = date(2026, 3, 1);
        let update = compute_streak(7, Some(today), today);
        assert_eq!(update.streak, 7);

        // Folding the same day again changes nothing.
        let again = compute_streak(update.streak, Some(today), today);
        assert_eq!(again, update);
    }

    #[test]
    fn test_consecutive_day_increments() {
        let update = compute_streak(7, Some(date(2026, 3, 1)), date(2026, 3, 2));
        assert_eq!(update.streak, 8);
        assert!(!update.anomaly);
    }

    #[test]
    fn test_two_day_gap_resets() {
        let update = compute_streak(30, Some(date(2026, 3, 1)), date(2026, 3, 3));
        assert_eq!(update.streak, 1);
    }

    #[test]
    fn test_clock_skew_flags_anomaly_without_decrement() {
        let update = compute_streak(5, Some(date(2026, 3, 10)), date(2026, 3, 8));
        assert_eq!(update.streak, 5);
        assert!(update.anomaly);
    }

    #[test]
    fn test_month_boundary() {
        let update = compute_streak(3, Some(date(2026, 2, 28)), date(2026, 3, 1));
        assert_eq!(update.streak, 4);
    }
}
