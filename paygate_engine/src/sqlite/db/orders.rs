use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType, Rail},
    order_objects::OrderQueryFilter,
    traits::PaymentGatewayError,
};

/// Inserts a new `Pending` order using the given connection. This is not atomic. Embed the call inside a transaction
/// that has already claimed the rail's reservation, passing `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                rail,
                kind,
                amount,
                issuer_name,
                issuer_contact,
                memo,
                target,
                status,
                created_at,
                deadline,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'Pending', $9, $10, $9)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.rail)
    .bind(order.kind)
    .bind(order.amount)
    .bind(order.issuer.name)
    .bind(order.issuer.contact)
    .bind(order.memo)
    .bind(order.target)
    .bind(order.created_at)
    .bind(order.deadline)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order [{}] inserted with id {}", order.order_id, order.id);
    Ok(order)
}

/// Returns the order with the given `order_id`, if it exists
pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(rail) = query.rail {
        where_clause.push("rail = ");
        where_clause.push_bind_unseparated(rail);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        let statuses = statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(contact) = query.issuer_contact {
        where_clause.push("issuer_contact = ");
        where_clause.push_bind_unseparated(contact);
    }
    if let Some(memo) = query.memo {
        where_clause.push("memo LIKE ");
        where_clause.push_bind_unseparated(format!("%{memo}%"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }

    trace!("📝️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

/// Conditionally moves the order from `expected` to `new` status. Returns `None` (and changes nothing) when the order
/// does not currently have status `expected`, or does not exist.
///
/// When `external_ref` is given it is recorded on the order. A reference that has already settled another order on
/// the same rail is rejected by the `orders_settled_ref_idx` index and reported as
/// [`PaymentGatewayError::DuplicateExternalRef`].
pub async fn compare_and_set_status(
    order_id: &OrderId,
    expected: OrderStatusType,
    new: OrderStatusType,
    external_ref: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let result = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders SET
            status = $1,
            external_ref = COALESCE($2, external_ref),
            updated_at = $3
        WHERE order_id = $4 AND status = $5
        RETURNING *;
        "#,
    )
    .bind(new)
    .bind(external_ref)
    .bind(now)
    .bind(order_id.as_str())
    .bind(expected)
    .fetch_optional(&mut *conn)
    .await;
    match result {
        Ok(Some(order)) => {
            trace!("📝️ Order {order_id} moved from {expected} to {new}");
            Ok(Some(order))
        },
        Ok(None) => {
            trace!("📝️ Order {order_id} is not {expected}. Status left unchanged");
            Ok(None)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            let external_ref = external_ref.unwrap_or_default().to_string();
            match fetch_order_by_order_id(order_id, conn).await? {
                Some(order) => Err(PaymentGatewayError::DuplicateExternalRef { rail: order.rail, external_ref }),
                None => Err(PaymentGatewayError::DatabaseError(e.to_string())),
            }
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn is_external_ref_settled(
    rail: Rail,
    external_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE rail = $1 AND external_ref = $2 AND status = 'Success'")
            .bind(rail)
            .bind(external_ref)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}
