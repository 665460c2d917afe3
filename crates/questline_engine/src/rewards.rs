//! Reward application.
//!
//! Splits a reward into two phases so the engine can order writes safely:
//! `resolve` turns a source event into concrete XP/currency amounts (and
//! performs the terminal debt deletion), `settle` folds the amounts into the
//! user's progression state and emits the audit event. Both run inside the
//! per-user critical section owned by the engine.

use chrono::Utc;
use tracing::info;

use questline_common::{
    apply_xp, xp_from_amount, EngineError, EngineResult, LevelCurve, ProgressionState, RewardEvent,
    RewardKind, RewardSource,
};

use crate::store::EntityStore;

#[derive(Debug)]
pub(crate) struct ResolvedReward {
    pub kind: RewardKind,
    pub xp: u64,
    pub currency: u64,
}

/// Turn a source event into concrete amounts.
///
/// `DebtFullyRepaid` verifies the balance is zero and deletes the debt
/// record here, before the XP settlement: the deletion is the terminal
/// domain event, and a retry after a midway failure finds the debt gone
/// rather than rewarding it twice.
pub(crate) async fn resolve(
    store: &dyn EntityStore,
    user_id: &str,
    source: &RewardSource,
) -> EngineResult<ResolvedReward> {
    let kind = source.kind();
    match source {
        RewardSource::AchievementUnlocked {
            xp_reward,
            gold_reward,
            ..
        }
        | RewardSource::MissionAccepted {
            xp_reward,
            gold_reward,
            ..
        } => Ok(ResolvedReward {
            kind,
            xp: *xp_reward,
            currency: *gold_reward,
        }),

        RewardSource::AssetValueIncreased { asset_id, amount } => {
            if !amount.is_finite() || *amount < 0.0 {
                return Err(EngineError::InvalidArgument(format!(
                    "asset growth amount {amount} for {asset_id}"
                )));
            }
            Ok(ResolvedReward {
                kind,
                xp: xp_from_amount(*amount),
                currency: 0,
            })
        }

        RewardSource::DebtFullyRepaid { debt_id } => {
            let debt = store
                .debt(user_id, debt_id)
                .await?
                .ok_or_else(|| EngineError::InvalidArgument(format!("unknown debt {debt_id}")))?;
            if !debt.is_defeated() {
                return Err(EngineError::InvalidState(format!(
                    "debt {debt_id} still has outstanding balance {}",
                    debt.outstanding_balance
                )));
            }

            store.delete_debt(user_id, debt_id).await?;
            info!(user_id, debt_id, creditor = %debt.creditor, "debt defeated");

            Ok(ResolvedReward {
                kind,
                xp: xp_from_amount(debt.total_amount),
                currency: 0,
            })
        }
    }
}

/// Fold resolved amounts into progression state and emit the audit event.
pub(crate) fn settle(
    state: &mut ProgressionState,
    curve: &LevelCurve,
    resolved: &ResolvedReward,
) -> EngineResult<RewardEvent> {
    let settlement = apply_xp(state, curve, resolved.xp as i64)?;
    state.currency += resolved.currency;

    Ok(RewardEvent {
        source: resolved.kind,
        xp_granted: resolved.xp,
        currency_granted: resolved.currency,
        leveled_up: settlement.leveled_up,
        new_level: settlement.leveled_up.then_some(state.level),
        levels_crossed: settlement.levels_crossed,
        skill_points_gained: settlement.skill_points_gained,
        occurred_at: Utc::now(),
    })
}
