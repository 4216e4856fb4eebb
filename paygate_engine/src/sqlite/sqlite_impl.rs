//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
//!
//! Every mutating transaction opens with a conditional write (claiming a reservation, or a status compare-and-set).
//! SQLite allows one writer at a time, so the first statement of each transaction also serialises it against every
//! other admission, settlement and expiry.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::db::{db_url, new_pool, orders, reservations, totals};
use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType, Rail, Reservation, Totals},
    order_objects::OrderQueryFilter,
    traits::{OrderLedger, PaymentGatewayDatabase, PaymentGatewayError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Claims the rail's reservation and inserts the order in a single transaction.
    ///
    /// If the claim fails, the transaction is rolled back and the current holder of the reservation is reported in
    /// the [`PaymentGatewayError::RailBusy`] error.
    async fn create_reserved_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let rail = order.rail;
        let now = order.created_at;
        if !reservations::claim(rail, &order.order_id, order.deadline, now, &mut tx).await? {
            let current = reservations::fetch(rail, &mut tx).await?;
            debug!("🗃️ {rail} is busy with {:?}. Order {} rejected", current.order_id, order.order_id);
            return Err(PaymentGatewayError::RailBusy { rail, order_id: current.order_id, deadline: current.deadline });
        }
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} now holds the {rail} reservation until {}", order.order_id, order.deadline);
        Ok(order)
    }

    async fn compare_and_set_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new: OrderStatusType,
        external_ref: Option<&str>,
    ) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::compare_and_set_status(order_id, expected, new, external_ref, Utc::now(), &mut conn)
            .await?
            .ok_or_else(|| PaymentGatewayError::NotPending(order_id.clone()))
    }

    /// Takes a pending order, and in a single atomic transaction,
    /// * marks it as `Success` and records the payment reference,
    /// * releases its rail's reservation,
    /// * adds the order amount to the rail and global totals.
    ///
    /// If the order is no longer pending, nothing changes and [`PaymentGatewayError::NotPending`] is returned.
    async fn settle_order(&self, order_id: &OrderId, external_ref: &str) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let order = orders::compare_and_set_status(
            order_id,
            OrderStatusType::Pending,
            OrderStatusType::Success,
            Some(external_ref),
            now,
            &mut tx,
        )
        .await?
        .ok_or_else(|| PaymentGatewayError::NotPending(order_id.clone()))?;
        if !reservations::release(order.rail, &order.order_id, now, &mut tx).await? {
            error!(
                "🗃️ Order {order_id} was pending but did not hold the {} reservation. The settlement has been rolled \
                 back. This indicates a data integrity problem that needs manual attention.",
                order.rail
            );
            return Err(PaymentGatewayError::ReservationMismatch(order.rail));
        }
        totals::increment(order.rail, order.amount, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} settled by [{external_ref}] for {}. {} reservation released", order.amount, order.rail);
        Ok(order)
    }

    /// Marks a pending order as `Failed` and releases its reservation in one transaction, provided `now` is past the
    /// order's deadline. An early call rolls back and returns [`PaymentGatewayError::DeadlineNotReached`].
    async fn expire_order(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::compare_and_set_status(
            order_id,
            OrderStatusType::Pending,
            OrderStatusType::Failed,
            None,
            now,
            &mut tx,
        )
        .await?
        .ok_or_else(|| PaymentGatewayError::NotPending(order_id.clone()))?;
        if !order.is_overdue(now) {
            trace!("🗃️ Order {order_id} is not overdue yet. Rolling back expiry");
            return Err(PaymentGatewayError::DeadlineNotReached { order_id: order_id.clone(), deadline: order.deadline });
        }
        if !reservations::release(order.rail, &order.order_id, now, &mut tx).await? {
            error!(
                "🗃️ Order {order_id} was pending but did not hold the {} reservation. The expiry has been rolled back.",
                order.rail
            );
            return Err(PaymentGatewayError::ReservationMismatch(order.rail));
        }
        tx.commit().await?;
        debug!("🗃️ Order {order_id} expired. {} reservation released", order.rail);
        Ok(order)
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderLedger for SqliteDatabase {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn is_external_ref_settled(&self, rail: Rail, external_ref: &str) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let settled = orders::is_external_ref_settled(rail, external_ref, &mut conn).await?;
        Ok(settled)
    }

    async fn fetch_reservation(&self, rail: Rail) -> Result<Reservation, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        reservations::fetch(rail, &mut conn).await
    }

    async fn fetch_totals(&self) -> Result<Vec<Totals>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let totals = totals::fetch_all(&mut conn).await?;
        Ok(totals)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn migrate(&self) -> Result<(), PaymentGatewayError> {
        migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PaymentGatewayError::DatabaseError(format!("Migration failed. {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
