//! #  Backend contracts.
//!
//! This module defines the behaviour that a database backend needs to expose in order to be used by the payment
//! engine.
//!
//! * [`PaymentGatewayDatabase`] performs every state transition of an order: admission under the rail's
//!   reservation, settlement, expiry and the totals that go with them. Each call is atomic.
//! * [`OrderLedger`] provides read-only queries over orders, reservations and totals.
mod data_objects;
mod order_ledger;
mod payment_gateway_database;

pub use data_objects::{ExpiryResult, ReconcileOutcome};
pub use order_ledger::OrderLedger;
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
