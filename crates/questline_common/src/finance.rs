//! Minimal financial entity shapes the engine needs from the store.
//!
//! Full account/asset/debt CRUD belongs to the entity store collaborator;
//! the engine only reads what tier gating and debt-defeat rewards require.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: String,
    pub creditor: String,
    /// Original size of the debt; the basis for the defeat reward.
    pub total_amount: f64,
    pub outstanding_balance: f64,
}

impl Debt {
    pub fn is_defeated(&self) -> bool {
        self.outstanding_balance <= 0.0
    }
}

/// Assets minus outstanding debt balances, the tier-gating metric.
pub fn net_worth(assets: &[Asset], debts: &[Debt]) -> f64 {
    let assets_total: f64 = assets.iter().map(|a| a.value).sum();
    let debts_total: f64 = debts.iter().map(|d| d.outstanding_balance).sum();
    assets_total - debts_total
}
