//! Paygate Payment Engine
//!
//! The payment engine admits donation and merchandise orders onto payment rails and decides, from untrusted external
//! signals, which order an incoming payment settles. It is transport-agnostic: the HTTP server is a thin layer on top.
//!
//! The library is divided into these sections:
//! 1. Storage ([`traits`] and the SQLite backend, [`SqliteDatabase`]). Each rail has a single reservation row, so at
//!    most one order per rail is ever pending. Every state transition is a single transaction.
//! 2. Rails ([`rails`]). A [`rails::RailAdapter`] per payment method computes the payment target and turns raw signals
//!    (QR notification text, block explorer listings) into normalized payment facts.
//! 3. The public API: [`QueueApi`] for admission, settlement and expiry, and [`Reconciler`] for matching signals
//!    against the pending order of a rail.
//!
//! The engine also emits [`events`] when orders settle or expire, and when a payment matches ambiguously. Hook into
//! them to notify payers or operators.
pub mod db_types;
pub mod events;
mod pge_api;
pub mod rails;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use pge_api::{
    order_objects,
    queue_api::{QueueApi, RailLocks},
    reconciler::Reconciler,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db as sqlite_db, SqliteDatabase};
pub use traits::{ExpiryResult, OrderLedger, PaymentGatewayDatabase, PaymentGatewayError, ReconcileOutcome};
