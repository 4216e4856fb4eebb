//! Address-based coin rails.
//!
//! Both coin rails share the same mechanics: funds go to one configured receive address, and the evidence of payment
//! is a transaction to that address found through a chain explorer. Only the explorer API (and hence the JSON schema
//! of its transaction documents) differs, which is what [`ChainExplorer`] abstracts.
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::*;
use paygate_common::Amount;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    db_types::{NewOrder, Order, PaymentFact, Rail},
    rails::{RailAdapter, RailError, RailSignal},
};

/// The most recent historical transactions looked at per poll, unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 25;
const DETAIL_CACHE_CAPACITY: usize = 1024;

/// A transfer to an address, normalized from an explorer's transaction document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransfer {
    pub txid: String,
    pub sender: Option<String>,
    pub receiver: String,
    pub amount: Amount,
    pub confirmations: u32,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<ChainTransfer> for PaymentFact {
    fn from(t: ChainTransfer) -> Self {
        PaymentFact {
            amount: t.amount,
            external_id: Some(t.txid),
            sender: t.sender,
            receiver: Some(t.receiver),
            timestamp: t.timestamp,
            confirmations: Some(t.confirmations),
        }
    }
}

/// Read-only access to a chain explorer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainExplorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ids of unconfirmed transactions to `address`.
    async fn pending_txids(&self, address: &str) -> Result<Vec<String>, RailError>;

    /// Ids of confirmed transactions to `address`, most recent first.
    async fn history_txids(&self, address: &str) -> Result<Vec<String>, RailError>;

    /// The raw transaction document for `txid`.
    async fn transaction(&self, txid: &str) -> Result<Value, RailError>;

    /// Converts a raw transaction document into a [`ChainTransfer`].
    fn normalize(&self, detail: &Value) -> Result<ChainTransfer, RailError>;
}

pub struct CoinRail<E> {
    rail: Rail,
    explorer: E,
    address: String,
    ttl: Duration,
    min_confirmations: u32,
    history_limit: usize,
    detail_cache: RwLock<HashMap<String, Value>>,
}

impl<E: ChainExplorer> CoinRail<E> {
    pub fn new<S: Into<String>>(rail: Rail, explorer: E, address: S, ttl: Duration) -> Self {
        Self {
            rail,
            explorer,
            address: address.into(),
            ttl,
            min_confirmations: 0,
            history_limit: DEFAULT_HISTORY_LIMIT,
            detail_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Transfers with fewer confirmations are ignored until a later poll.
    pub fn with_min_confirmations(mut self, min_confirmations: u32) -> Self {
        self.min_confirmations = min_confirmations;
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Resolves a txid to its document. Documents for transfers that already have enough confirmations do not change
    /// any more, so they are served from the cache on later polls.
    async fn transaction_detail(&self, txid: &str) -> Result<Value, RailError> {
        let cached = self.detail_cache.read().await.get(txid).cloned();
        if let Some(detail) = cached {
            trace!("🛰️ {} detail for {txid} served from cache", self.rail);
            return Ok(detail);
        }
        let detail = self.explorer.transaction(txid).await?;
        let settled = self
            .explorer
            .normalize(&detail)
            .map(|t| t.confirmations >= self.min_confirmations.max(1))
            .unwrap_or(false);
        if settled {
            let mut cache = self.detail_cache.write().await;
            if cache.len() >= DETAIL_CACHE_CAPACITY {
                cache.clear();
            }
            cache.insert(txid.to_string(), detail.clone());
        }
        Ok(detail)
    }
}

#[async_trait]
impl<E: ChainExplorer + 'static> RailAdapter for CoinRail<E> {
    fn rail(&self) -> Rail {
        self.rail
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn compute_target(&self, _order: &NewOrder) -> String {
        self.address.clone()
    }

    fn extract_candidates(&self, order: &Order, signal: &RailSignal) -> Result<Vec<PaymentFact>, RailError> {
        let details = match signal {
            RailSignal::Transactions(details) => details,
            RailSignal::Notification(_) => return Err(RailError::UnsupportedSignal(self.rail)),
        };
        let mut failures = 0usize;
        let mut facts = Vec::with_capacity(details.len());
        for detail in details {
            let transfer = match self.explorer.normalize(detail) {
                Ok(t) => t,
                Err(e) => {
                    warn!("🛰️ {} skipped a transaction document it could not read. {e}", self.explorer.name());
                    failures += 1;
                    continue;
                },
            };
            if transfer.receiver != order.target {
                trace!("🛰️ {} is not addressed to {}. Skipping", transfer.txid, order.target);
                continue;
            }
            if transfer.confirmations < self.min_confirmations {
                debug!(
                    "🛰️ {} has {} of {} confirmations. It will be looked at again on a later poll",
                    transfer.txid, transfer.confirmations, self.min_confirmations
                );
                continue;
            }
            facts.push(PaymentFact::from(transfer));
        }
        if !details.is_empty() && failures == details.len() {
            return Err(RailError::MalformedSignal(format!(
                "None of the {failures} transaction documents from {} could be read",
                self.explorer.name()
            )));
        }
        Ok(facts)
    }

    /// Lists pending and recent historical transactions to the order's target address and resolves each to its
    /// document. A failed listing aborts the poll; the next tick tries again. A transaction that cannot be looked up
    /// is skipped, unless every lookup fails.
    async fn poll(&self, order: &Order) -> Result<Option<RailSignal>, RailError> {
        let pending = self.explorer.pending_txids(&order.target).await?;
        let history = self.explorer.history_txids(&order.target).await?;
        let mut seen = HashSet::new();
        let txids = pending
            .into_iter()
            .chain(history.into_iter().take(self.history_limit))
            .filter(|txid| seen.insert(txid.clone()))
            .collect::<Vec<_>>();
        trace!("🛰️ {} reports {} candidate transactions for {}", self.explorer.name(), txids.len(), order.target);
        let mut details = Vec::with_capacity(txids.len());
        let mut last_error = None;
        for txid in &txids {
            match self.transaction_detail(txid).await {
                Ok(detail) => details.push(detail),
                Err(e) => {
                    warn!("🛰️ {} could not look up {txid}. Skipping it for this poll. {e}", self.explorer.name());
                    last_error = Some(e);
                },
            }
        }
        match last_error {
            Some(e) if details.is_empty() => Err(e),
            _ => Ok(Some(RailSignal::Transactions(details))),
        }
    }

    fn is_pull_based(&self) -> bool {
        true
    }
}
