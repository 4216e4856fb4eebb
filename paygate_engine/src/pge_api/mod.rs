//! # Payment engine public API
//!
//! * [`queue_api`] is the single-flight queue controller. It admits orders, one pending order per rail, and performs
//!   settlement and expiry.
//! * [`reconciler`] turns rail signals (webhook notifications, explorer polls) into settlements through the queue.
//! * [`order_objects`] holds the request and report types used by both.
//!
//! Both APIs are generic over the database backend:
//!
//! ```rust,ignore
//! use paygate_engine::{events::EventProducers, rails::RailRegistry, QueueApi, Reconciler, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/paygate.db", 5).await?;
//! let queue = QueueApi::new(db, RailRegistry::new(), EventProducers::default());
//! let reconciler = Reconciler::new(queue.clone());
//! ```
pub mod order_objects;
pub mod queue_api;
pub mod reconciler;
