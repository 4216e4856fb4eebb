use crate::{
    db_types::{Order, OrderId, Rail, Reservation, Totals},
    order_objects::OrderQueryFilter,
    traits::PaymentGatewayError,
};

/// Read-only queries against the order ledger.
///
/// [`PaymentGatewayDatabase`](crate::traits::PaymentGatewayDatabase) handles every state transition. `OrderLedger`
/// only ever reads, so its methods are safe to call without holding a rail lock.
#[allow(async_fn_in_trait)]
pub trait OrderLedger {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError>;

    /// Orders matching the filter, oldest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Whether some order on `rail` has already been settled with this payment reference.
    async fn is_external_ref_settled(&self, rail: Rail, external_ref: &str) -> Result<bool, PaymentGatewayError>;

    async fn fetch_reservation(&self, rail: Rail) -> Result<Reservation, PaymentGatewayError>;

    /// One row per rail plus the `global` row.
    async fn fetch_totals(&self) -> Result<Vec<Totals>, PaymentGatewayError>;
}
