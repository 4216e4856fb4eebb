use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, PaymentFact};

/// Orders moved to `Failed` by one sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpiryResult {
    pub expired: Vec<Order>,
}

impl ExpiryResult {
    pub fn count(&self) -> usize {
        self.expired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
    }
}

/// What one reconciliation pass did for a rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The rail had no pending order.
    Idle,
    /// The pending order had no eligible candidate in the signal.
    Unmatched { order_id: OrderId },
    /// The pending order was settled by `fact`. `ambiguous` is set when more than one candidate was eligible.
    Settled { order: Order, fact: PaymentFact, ambiguous: bool },
    /// A candidate matched, but its reference had already settled another order. Nothing was changed.
    Duplicate { order_id: OrderId, external_ref: String },
}

impl ReconcileOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, ReconcileOutcome::Settled { .. })
    }

    pub fn settled_order(&self) -> Option<&Order> {
        match self {
            ReconcileOutcome::Settled { order, .. } => Some(order),
            _ => None,
        }
    }
}
