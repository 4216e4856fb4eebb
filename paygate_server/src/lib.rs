//! # Paygate server
//! This crate hosts the HTTP surface and background workers of the payment gateway. It is responsible for:
//! * Admitting payment orders onto a rail and telling the payer where to pay.
//! * Receiving QR payment notifications and reconciling them against the pending QR order.
//! * Polling the block explorers of the coin rails and reconciling what they report.
//! * Sweeping reservations whose deadline has passed.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `POST /orders`: Request a new order. Returns `409 Conflict` while the rail is busy.
//! * `GET /orders`: Search orders by rail, status, issuer, memo and creation time.
//! * `GET /orders/{order_id}`: The current status of an order.
//! * `GET /queue/{rail}`: Whether a rail is idle, and if not, which order holds it and until when.
//! * `GET /totals`: Settled totals per rail, and across all rails.
//! * `POST /webhook/qr`: Payment notifications forwarded from the merchant's banking app.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod poll_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
