use serde::{Deserialize, Serialize};

use crate::db_types::{Order, PaymentFact};

/// An order was settled by a matching payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettledEvent {
    pub order: Order,
}

impl OrderSettledEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order reached its deadline unpaid and its rail was released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExpiredEvent {
    pub order: Order,
}

impl OrderExpiredEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Several payments matched one pending order. The earliest settled it; the others need an operator to look at them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousMatchEvent {
    pub order: Order,
    pub chosen: PaymentFact,
    pub others: Vec<PaymentFact>,
}

impl AmbiguousMatchEvent {
    pub fn new(order: Order, chosen: PaymentFact, others: Vec<PaymentFact>) -> Self {
        Self { order, chosen, others }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderSettled(OrderSettledEvent),
    OrderExpired(OrderExpiredEvent),
    AmbiguousMatch(AmbiguousMatchEvent),
}
