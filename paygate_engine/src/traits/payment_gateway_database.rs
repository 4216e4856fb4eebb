use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType, Rail},
    rails::RailError,
    traits::OrderLedger,
};

/// This trait defines the state transitions that a backend for the payment engine must support.
///
/// Every mutating method is a single atomic unit. Backends must guarantee that:
/// * a rail's reservation is claimed only if it is currently free, and in the same transaction as the order insert;
/// * an order leaves `Pending` at most once (compare-and-set on status);
/// * settling an order releases the rail's reservation and adds the amount to the rail and global totals, all or
///   nothing;
/// * no two orders on a rail are ever settled with the same external reference.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + OrderLedger {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Claims the rail's reservation for `order` and inserts it as `Pending`, atomically.
    ///
    /// Fails with [`PaymentGatewayError::RailBusy`] if the rail already has a pending order.
    async fn create_reserved_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    /// Moves the order from `expected` to `new` status if, and only if, it currently has status `expected`, recording
    /// `external_ref` when one is given.
    ///
    /// Returns [`PaymentGatewayError::NotPending`] when the current status differs. This does not touch the
    /// reservation or the totals; use [`Self::settle_order`] or [`Self::expire_order`] for the full transitions.
    async fn compare_and_set_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new: OrderStatusType,
        external_ref: Option<&str>,
    ) -> Result<Order, PaymentGatewayError>;

    /// `Pending` → `Success`, recording `external_ref`, releasing the reservation and incrementing the rail and global
    /// totals in one transaction.
    async fn settle_order(&self, order_id: &OrderId, external_ref: &str) -> Result<Order, PaymentGatewayError>;

    /// `Pending` → `Failed` and release of the reservation, in one transaction. Only succeeds if `now` is strictly
    /// past the order's deadline.
    async fn expire_order(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<Order, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Rail {rail} is busy with another pending order{}", .deadline.map(|d| format!(" until {d}")).unwrap_or_default())]
    RailBusy { rail: Rail, order_id: Option<OrderId>, deadline: Option<DateTime<Utc>> },
    #[error("Order {0} is no longer pending")]
    NotPending(OrderId),
    #[error("Order {order_id} cannot be expired before its deadline of {deadline}")]
    DeadlineNotReached { order_id: OrderId, deadline: DateTime<Utc> },
    #[error("Rail {0} is not configured on this server")]
    RailNotConfigured(Rail),
    #[error("Invalid order amount. {0}")]
    InvalidAmount(String),
    #[error("Payment reference {external_ref} has already settled an order on {rail}")]
    DuplicateExternalRef { rail: Rail, external_ref: String },
    #[error("The reservation for {0} is not held by the order being finalised")]
    ReservationMismatch(Rail),
    #[error("Upstream payment source unavailable. {0}")]
    UpstreamUnavailable(String),
    #[error("Settling this order would overflow the {0} totals")]
    TotalsOverflow(String),
    #[error("Malformed payment signal. {0}")]
    MalformedSignal(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}

impl From<RailError> for PaymentGatewayError {
    fn from(e: RailError) -> Self {
        match e {
            RailError::UpstreamUnavailable(s) => PaymentGatewayError::UpstreamUnavailable(s),
            RailError::MalformedSignal(s) => PaymentGatewayError::MalformedSignal(s),
            RailError::UnsupportedSignal(rail) => {
                PaymentGatewayError::MalformedSignal(format!("{rail} cannot interpret this kind of signal"))
            },
        }
    }
}
