use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

pub use paygate_common::Amount;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------         Rail          ---------------------------------------------------------
/// A payment channel through which an order can be paid.
///
/// Each rail admits at most one pending order at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Rail {
    /// Static QR code, settled from bank/e-wallet notification text.
    Qr,
    /// Address-based coin rail with an account/UTXO style explorer.
    CoinA,
    /// Address-based coin rail with a token-indexer style explorer.
    CoinB,
}

impl Rail {
    pub const ALL: [Rail; 3] = [Rail::Qr, Rail::CoinA, Rail::CoinB];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rail::Qr => "qr",
            Rail::CoinA => "coin_a",
            Rail::CoinB => "coin_b",
        }
    }
}

impl Display for Rail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rail {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "qr" => Ok(Self::Qr),
            "coin_a" => Ok(Self::CoinA),
            "coin_b" => Ok(Self::CoinB),
            other => Err(ConversionError(format!("Unknown rail: {other}"))),
        }
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order holds its rail's reservation and is waiting for a matching payment.
    Pending,
    /// A matching payment was observed and the order was settled.
    Success,
    /// The order's deadline passed before a payment was matched.
    Failed,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatusType::Pending)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Success => write!(f, "Success"),
            OrderStatusType::Failed => write!(f, "Failed"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------       OrderKind       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    #[default]
    Donation,
    Merchandise,
}

impl Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Donation => write!(f, "donation"),
            OrderKind::Merchandise => write!(f, "merchandise"),
        }
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    /// Generates a fresh, practically unique order id of the form `qr-20240601-9f3ac21b`.
    pub fn random(rail: Rail, now: DateTime<Utc>) -> Self {
        let nonce = rand::random::<u32>();
        Self(format!("{rail}-{}-{nonce:08x}", now.format("%Y%m%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Issuer         ---------------------------------------------------------
/// The person placing the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub name: String,
    pub contact: String,
}

impl Issuer {
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, contact: S2) -> Self {
        Self { name: name.into(), contact: contact.into() }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    #[serde(skip_serializing)]
    #[serde(default)]
    pub id: i64,
    pub order_id: OrderId,
    pub rail: Rail,
    pub kind: OrderKind,
    pub amount: Amount,
    pub issuer_name: String,
    pub issuer_contact: String,
    pub memo: Option<String>,
    /// Where the payer must send funds: a QR payload or a receiving address.
    pub target: String,
    /// Payment reference (txid or synthesized notification id) recorded on settlement.
    pub external_ref: Option<String>,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatusType::Pending
    }

    /// True once `now` is strictly past the deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline - now).num_seconds().max(0)
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub rail: Rail,
    pub kind: OrderKind,
    pub amount: Amount,
    pub issuer: Issuer,
    pub memo: Option<String>,
    pub target: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl NewOrder {
    /// Creates a new order on `rail` with a fresh order id. The target is left blank; the rail adapter fills it in
    /// during admission.
    pub fn new(rail: Rail, amount: Amount, issuer: Issuer, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            order_id: OrderId::random(rail, created_at),
            rail,
            kind: OrderKind::default(),
            amount,
            issuer,
            memo: None,
            target: String::new(),
            created_at,
            deadline: created_at + ttl,
        }
    }

    pub fn with_kind(mut self, kind: OrderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_memo<S: Into<String>>(mut self, memo: S) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn with_target<S: Into<String>>(mut self, target: S) -> Self {
        self.target = target.into();
        self
    }
}

//--------------------------------------      Reservation      ---------------------------------------------------------
/// The single-flight slot of a rail. At most one pending order can hold it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Reservation {
    pub rail: Rail,
    pub order_id: Option<OrderId>,
    pub deadline: Option<DateTime<Utc>>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_occupied(&self) -> bool {
        self.order_id.is_some()
    }

    /// True when the slot is occupied by an order whose deadline has passed.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.is_occupied() && self.deadline.map(|d| now > d).unwrap_or(false)
    }
}

//--------------------------------------        Totals         ---------------------------------------------------------
pub const GLOBAL_TOTALS_SCOPE: &str = "global";

/// Running sum of settled amounts for one scope: a rail name, or `global`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Totals {
    pub scope: String,
    pub total_amount: Amount,
    pub settled_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl Totals {
    pub fn is_global(&self) -> bool {
        self.scope == GLOBAL_TOTALS_SCOPE
    }
}

//--------------------------------------     PaymentFact       ---------------------------------------------------------
/// A normalized observation of a payment on some rail, extracted from a raw rail signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFact {
    pub amount: Amount,
    /// Transaction id, or a synthesized reference for notification-based rails.
    pub external_id: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub confirmations: Option<u32>,
}

impl PaymentFact {
    pub fn new(amount: Amount) -> Self {
        Self { amount, external_id: None, sender: None, receiver: None, timestamp: None, confirmations: None }
    }

    pub fn with_external_id<S: Into<String>>(mut self, id: S) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_sender<S: Into<String>>(mut self, sender: S) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_receiver<S: Into<String>>(mut self, receiver: S) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = Some(confirmations);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rail_names() {
        assert_eq!(Rail::CoinA.to_string(), "coin_a");
        assert_eq!(Rail::from_str("coin-b").unwrap(), Rail::CoinB);
        assert_eq!(Rail::from_str(" QR ").unwrap(), Rail::Qr);
        assert!(Rail::from_str("paypal").is_err());
        assert_eq!(serde_json::to_string(&Rail::CoinB).unwrap(), "\"coin_b\"");
    }

    #[test]
    fn order_ids_carry_the_rail() {
        let id = OrderId::random(Rail::Qr, Utc::now());
        assert!(id.as_str().starts_with("qr-"));
        assert_ne!(id, OrderId::random(Rail::Qr, Utc::now()));
    }

    #[test]
    fn stale_reservations() {
        let now = Utc::now();
        let mut r = Reservation {
            rail: Rail::Qr,
            order_id: None,
            deadline: None,
            version: 0,
            updated_at: now,
        };
        assert!(!r.is_stale(now));
        r.order_id = Some(OrderId::from("qr-1".to_string()));
        r.deadline = Some(now - Duration::seconds(1));
        assert!(r.is_stale(now));
        r.deadline = Some(now);
        assert!(!r.is_stale(now));
    }
}
