//! Net-worth gated mission tiers.
//!
//! Tiers form a ladder ordered by `order_index`. A tier is accessible only
//! when its own net-worth threshold is met AND every lower tier is
//! accessible. A later tier with an incidentally low threshold never unlocks
//! past a failed one; the result is always a prefix of the ladder.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionTier {
    pub id: String,
    pub name: String,
    /// Strictly increasing across the catalog.
    pub order_index: u32,
    pub min_net_worth_required: f64,
}

/// The accessible prefix of the tier ladder for the given net worth.
pub fn accessible_tiers(tiers: &[MissionTier], net_worth: f64) -> Vec<MissionTier> {
    let mut ladder: Vec<&MissionTier> = tiers.iter().collect();
    ladder.sort_by_key(|t| t.order_index);

    let mut accessible = Vec::new();
    for tier in ladder {
        if net_worth >= tier.min_net_worth_required {
            accessible.push(tier.clone());
        } else {
            break;
        }
    }
    accessible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(order: u32, min: f64) -> MissionTier {
        MissionTier {
            id: format!("tier-{order}"),
            name: format!("Tier {order}"),
            order_index: order,
            min_net_worth_required: min,
        }
    }

    #[test]
    fn test_zero_threshold_ladder_fully_accessible() {
        let tiers = vec![tier(1, 0.0), tier(2, 0.0), tier(3, 0.0)];
        assert_eq!(accessible_tiers(&tiers, 0.0).len(), 3);
    }

    #[test]
    fn test_no_skipping_past_failed_tier() {
        // Tier 3 has a zero threshold but tier 2 blocks the ladder.
        let tiers = vec![tier(1, 0.0), tier(2, 1000.0), tier(3, 0.0)];

        let accessible = accessible_tiers(&tiers, 500.0);
        assert_eq!(accessible.len(), 1);
        assert_eq!(accessible[0].order_index, 1);
    }

    #[test]
    fn test_unsorted_input_is_walked_in_order() {
        let tiers = vec![tier(3, 2000.0), tier(1, 0.0), tier(2, 500.0)];

        let accessible = accessible_tiers(&tiers, 800.0);
        let orders: Vec<u32> = accessible.iter().map(|t| t.order_index).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn test_negative_net_worth_unlocks_nothing_above_zero() {
        let tiers = vec![tier(1, 0.0), tier(2, 500.0)];
        assert!(accessible_tiers(&tiers, -250.0).is_empty());
    }

    #[test]
    fn test_exact_threshold_is_accessible() {
        let tiers = vec![tier(1, 0.0), tier(2, 1000.0)];
        assert_eq!(accessible_tiers(&tiers, 1000.0).len(), 2);
    }
}
