//! The `reservations` table holds exactly one row per rail. A row with a non-null `order_id` means the rail has a
//! pending order, and no other order may be admitted until the row is released.
use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, Rail, Reservation},
    traits::PaymentGatewayError,
};

/// Claims the rail's slot for `order_id` if, and only if, it is currently free.
///
/// Returns `true` if the slot was claimed. The conditional update is the first write in an admission transaction, so
/// SQLite serialises competing admissions on the database write lock and exactly one of them sees a free slot.
pub async fn claim(
    rail: Rail,
    order_id: &OrderId,
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE reservations SET
            order_id = $1,
            deadline = $2,
            version = version + 1,
            updated_at = $3
        WHERE rail = $4 AND order_id IS NULL
        "#,
    )
    .bind(order_id.as_str())
    .bind(deadline)
    .bind(now)
    .bind(rail)
    .execute(conn)
    .await?;
    let claimed = result.rows_affected() == 1;
    trace!("🗃️ Reservation claim on {rail} by {order_id}: {claimed}");
    Ok(claimed)
}

/// Releases the rail's slot, but only if it is held by `order_id`. Returns `false` if the slot was free or held by
/// another order.
pub async fn release(
    rail: Rail,
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE reservations SET
            order_id = NULL,
            deadline = NULL,
            version = version + 1,
            updated_at = $1
        WHERE rail = $2 AND order_id = $3
        "#,
    )
    .bind(now)
    .bind(rail)
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    let released = result.rows_affected() == 1;
    trace!("🗃️ Reservation release on {rail} by {order_id}: {released}");
    Ok(released)
}

pub async fn fetch(rail: Rail, conn: &mut SqliteConnection) -> Result<Reservation, PaymentGatewayError> {
    let reservation: Option<Reservation> =
        sqlx::query_as("SELECT * FROM reservations WHERE rail = $1").bind(rail).fetch_optional(conn).await?;
    reservation.ok_or_else(|| {
        PaymentGatewayError::DatabaseError(format!("No reservation row exists for {rail}. Have migrations been run?"))
    })
}
