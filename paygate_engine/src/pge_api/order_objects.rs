use std::fmt::Display;

use chrono::{DateTime, Utc};
use paygate_common::Amount;
use serde::{Deserialize, Serialize};

use crate::db_types::{Issuer, OrderId, OrderKind, OrderStatusType, Rail, Reservation, Totals};

/// A caller's request for a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub rail: Rail,
    pub amount: Amount,
    #[serde(default)]
    pub kind: OrderKind,
    pub issuer: Issuer,
    pub memo: Option<String>,
}

impl OrderRequest {
    pub fn new(rail: Rail, amount: Amount, issuer: Issuer) -> Self {
        Self { rail, amount, kind: OrderKind::default(), issuer, memo: None }
    }

    pub fn with_kind(mut self, kind: OrderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_memo<S: Into<String>>(mut self, memo: S) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub rail: Option<Rail>,
    pub status: Option<Vec<OrderStatusType>>,
    pub issuer_contact: Option<String>,
    pub memo: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl OrderQueryFilter {
    pub fn with_rail(mut self, rail: Rail) -> Self {
        self.rail = Some(rail);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_issuer_contact<S: Into<String>>(mut self, contact: S) -> Self {
        self.issuer_contact = Some(contact.into());
        self
    }

    pub fn with_memo<S: Into<String>>(mut self, memo: S) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if no `WHERE` clause is needed. `limit` is not a filter.
    pub fn is_empty(&self) -> bool {
        self.rail.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.issuer_contact.is_none() &&
            self.memo.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(rail) = &self.rail {
            write!(f, "rail: {rail}. ")?;
        }
        if let Some(status) = &self.status {
            let s = status.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",");
            write!(f, "status: {s}. ")?;
        }
        if let Some(contact) = &self.issuer_contact {
            write!(f, "issuer_contact: {contact}. ")?;
        }
        if let Some(memo) = &self.memo {
            write!(f, "memo: {memo}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since: {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until: {until}. ")?;
        }
        Ok(())
    }
}

/// Public view of a rail's single-flight slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub rail: Rail,
    pub enabled: bool,
    pub busy: bool,
    pub order_id: Option<OrderId>,
    pub deadline: Option<DateTime<Utc>>,
    pub seconds_remaining: Option<i64>,
}

impl QueueStatus {
    pub fn idle(rail: Rail, enabled: bool) -> Self {
        Self { rail, enabled, busy: false, order_id: None, deadline: None, seconds_remaining: None }
    }

    /// Describes the slot from its reservation row. An occupied slot is busy even when its deadline has passed; it
    /// stays busy until the sweeper or the next admission frees it.
    pub fn from_reservation(reservation: &Reservation, enabled: bool, now: DateTime<Utc>) -> Self {
        if !reservation.is_occupied() {
            return Self::idle(reservation.rail, enabled);
        }
        Self {
            rail: reservation.rail,
            enabled,
            busy: true,
            order_id: reservation.order_id.clone(),
            deadline: reservation.deadline,
            seconds_remaining: reservation.deadline.map(|d| (d - now).num_seconds().max(0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsReport {
    pub rails: Vec<Totals>,
    pub global: Totals,
}

impl TotalsReport {
    pub fn for_rail(&self, rail: Rail) -> Option<&Totals> {
        self.rails.iter().find(|t| t.scope == rail.as_str())
    }
}
