//! # Payment rails
//!
//! A rail adapter knows three things about its payment channel:
//! * where a payer should send funds for an order (the *target*: a QR payload or a receiving address),
//! * how to turn a raw signal from the channel into normalized [`PaymentFact`]s,
//! * for pull-based rails, how to fetch that signal from an upstream explorer.
//!
//! Adapters never touch the database. Matching candidates to the pending order, the replay guard and the settlement
//! itself live in the [`Reconciler`](crate::Reconciler).
//!
//! | Rail     | Signal                                | Target                 | Unique reference        |
//! |----------|---------------------------------------|------------------------|-------------------------|
//! | QR       | pushed notification text              | static QR payload      | synthesized from signal |
//! | Coin-A   | polled explorer transaction details   | configured address     | transaction id          |
//! | Coin-B   | polled explorer transaction details   | configured address     | transaction hash        |
mod coin;
mod coin_a;
mod coin_b;
mod explorer;
mod qr;

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
pub use coin::{ChainExplorer, ChainTransfer, CoinRail, DEFAULT_HISTORY_LIMIT};
pub use coin_a::{CoinAExplorer, DEFAULT_COIN_A_DECIMALS};
pub use coin_b::CoinBExplorer;
pub use explorer::ExplorerClient;
pub use qr::{QrAmountParser, QrRail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db_types::{NewOrder, Order, PaymentFact, Rail};

#[derive(Debug, Clone, Error)]
pub enum RailError {
    #[error("Upstream payment source is unavailable. {0}")]
    UpstreamUnavailable(String),
    #[error("Could not interpret the payment signal. {0}")]
    MalformedSignal(String),
    #[error("The {0} rail does not accept this kind of signal")]
    UnsupportedSignal(Rail),
}

/// A push notification from a bank or e-wallet app reporting an incoming QR payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrNotification {
    pub text: String,
    pub received_at: DateTime<Utc>,
    /// Delivery id assigned by the notification forwarder, if it provides one.
    pub id: Option<String>,
}

impl QrNotification {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self { text: text.into(), received_at: Utc::now(), id: None }
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Raw input from a rail, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RailSignal {
    /// Pushed notification text (QR rail).
    Notification(QrNotification),
    /// Transaction detail documents fetched from a chain explorer (coin rails).
    Transactions(Vec<Value>),
}

impl RailSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            RailSignal::Notification(_) => "notification",
            RailSignal::Transactions(_) => "transactions",
        }
    }
}

#[async_trait]
pub trait RailAdapter: Send + Sync {
    fn rail(&self) -> Rail;

    /// How long an order on this rail may stay pending.
    fn ttl(&self) -> Duration;

    /// Where the payer must send funds for `order`.
    fn compute_target(&self, order: &NewOrder) -> String;

    /// Whether candidates must carry an external id to be eligible. Coin rails need a txid for the replay guard.
    fn requires_unique_reference(&self) -> bool {
        true
    }

    /// Normalizes a raw signal into candidate payment facts for `order`. Facts that cannot belong to the order (wrong
    /// receiver, too few confirmations) are dropped here. Amount and time matching is left to the reconciler.
    fn extract_candidates(&self, order: &Order, signal: &RailSignal) -> Result<Vec<PaymentFact>, RailError>;

    /// Fetches a fresh signal for the pending `order` from upstream. Push-only rails return `Ok(None)`.
    async fn poll(&self, _order: &Order) -> Result<Option<RailSignal>, RailError> {
        Ok(None)
    }

    /// Pull-based rails are polled by the background workers.
    fn is_pull_based(&self) -> bool {
        false
    }
}

/// The set of rails enabled on this server. A rail with no adapter is disabled: orders for it are rejected.
#[derive(Clone, Default)]
pub struct RailRegistry {
    adapters: HashMap<Rail, Arc<dyn RailAdapter>>,
}

impl Debug for RailRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RailRegistry({:?})", self.rails())
    }
}

impl RailRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: RailAdapter + 'static>(&mut self, adapter: A) -> &mut Self {
        self.adapters.insert(adapter.rail(), Arc::new(adapter));
        self
    }

    pub fn get(&self, rail: Rail) -> Option<Arc<dyn RailAdapter>> {
        self.adapters.get(&rail).cloned()
    }

    pub fn is_enabled(&self, rail: Rail) -> bool {
        self.adapters.contains_key(&rail)
    }

    /// Enabled rails, in canonical order.
    pub fn rails(&self) -> Vec<Rail> {
        Rail::ALL.into_iter().filter(|r| self.adapters.contains_key(r)).collect()
    }

    pub fn pull_rails(&self) -> Vec<Rail> {
        self.rails().into_iter().filter(|r| self.adapters.get(r).map(|a| a.is_pull_based()).unwrap_or(false)).collect()
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use crate::db_types::{NewOrder, Order, OrderStatusType};

    /// The order as it would be stored right after admission.
    pub fn pending(order: NewOrder) -> Order {
        Order {
            id: 1,
            order_id: order.order_id,
            rail: order.rail,
            kind: order.kind,
            amount: order.amount,
            issuer_name: order.issuer.name,
            issuer_contact: order.issuer.contact,
            memo: order.memo,
            target: order.target,
            external_ref: None,
            status: OrderStatusType::Pending,
            created_at: order.created_at,
            deadline: order.deadline,
            updated_at: order.created_at,
        }
    }
}
