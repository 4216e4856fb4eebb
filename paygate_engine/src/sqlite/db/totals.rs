use chrono::{DateTime, Utc};
use log::trace;
use paygate_common::Amount;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Rail, Totals, GLOBAL_TOTALS_SCOPE},
    traits::PaymentGatewayError,
};

/// Adds `amount` to the totals of `rail` and to the global totals, and bumps both settled counts.
///
/// Amounts are stored as exact decimal TEXT, so the addition happens here rather than in SQL. Call this inside the
/// settlement transaction, after the status update has taken the write lock.
pub async fn increment(
    rail: Rail,
    amount: Amount,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    for scope in [rail.as_str(), GLOBAL_TOTALS_SCOPE] {
        let current = fetch_scope(scope, &mut *conn).await?;
        let total = current
            .total_amount
            .checked_add(amount)
            .ok_or_else(|| PaymentGatewayError::TotalsOverflow(scope.to_string()))?;
        sqlx::query(
            "UPDATE totals SET total_amount = $1, settled_count = settled_count + 1, updated_at = $2 WHERE scope = $3",
        )
        .bind(total)
        .bind(now)
        .bind(scope)
        .execute(&mut *conn)
        .await?;
        trace!("🗃️ Totals for {scope} are now {total}");
    }
    Ok(())
}

pub async fn fetch_scope(scope: &str, conn: &mut SqliteConnection) -> Result<Totals, PaymentGatewayError> {
    let totals: Option<Totals> =
        sqlx::query_as("SELECT * FROM totals WHERE scope = $1").bind(scope).fetch_optional(conn).await?;
    totals.ok_or_else(|| PaymentGatewayError::DatabaseError(format!("No totals row exists for {scope}")))
}

pub async fn fetch_all(conn: &mut SqliteConnection) -> Result<Vec<Totals>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM totals ORDER BY scope").fetch_all(conn).await
}
