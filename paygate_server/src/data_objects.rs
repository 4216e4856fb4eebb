use chrono::{DateTime, Utc};
use paygate_common::Amount;
use paygate_engine::{
    db_types::{Issuer, Order, OrderKind, OrderStatusType, Rail},
    order_objects::{OrderQueryFilter, OrderRequest},
    rails::QrNotification,
    ReconcileOutcome,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequestBody {
    pub rail: Rail,
    pub amount: Amount,
    #[serde(default)]
    pub kind: OrderKind,
    pub issuer_name: String,
    pub issuer_contact: String,
    pub memo: Option<String>,
}

impl From<OrderRequestBody> for OrderRequest {
    fn from(body: OrderRequestBody) -> Self {
        let request = OrderRequest::new(body.rail, body.amount, Issuer::new(body.issuer_name, body.issuer_contact))
            .with_kind(body.kind);
        match body.memo {
            Some(memo) => request.with_memo(memo),
            None => request,
        }
    }
}

/// What a payer needs to complete an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub rail: Rail,
    pub amount: Amount,
    pub status: OrderStatusType,
    pub target: String,
    pub deadline: DateTime<Utc>,
    pub seconds_remaining: i64,
    pub external_ref: Option<String>,
}

impl OrderResponse {
    pub fn new(order: Order, now: DateTime<Utc>) -> Self {
        let seconds_remaining = if order.is_pending() { order.seconds_remaining(now) } else { 0 };
        Self {
            order_id: order.order_id.0,
            rail: order.rail,
            amount: order.amount,
            status: order.status,
            target: order.target,
            deadline: order.deadline,
            seconds_remaining,
            external_ref: order.external_ref,
        }
    }
}

/// Query string of `GET /orders`. A flattened form of [`OrderQueryFilter`], which query strings cannot express.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderSearchParams {
    pub rail: Option<Rail>,
    pub status: Option<OrderStatusType>,
    pub issuer_contact: Option<String>,
    pub memo: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl From<OrderSearchParams> for OrderQueryFilter {
    fn from(p: OrderSearchParams) -> Self {
        OrderQueryFilter {
            rail: p.rail,
            status: p.status.map(|s| vec![s]),
            issuer_contact: p.issuer_contact,
            memo: p.memo,
            since: p.since,
            until: p.until,
            limit: p.limit,
        }
    }
}

/// Body of `POST /webhook/qr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrNotificationBody {
    pub text: String,
    pub received_at: Option<DateTime<Utc>>,
    pub id: Option<String>,
}

impl From<QrNotificationBody> for QrNotification {
    fn from(body: QrNotificationBody) -> Self {
        let mut notification = QrNotification::new(body.text);
        if let Some(at) = body.received_at {
            notification = notification.with_received_at(at);
        }
        if let Some(id) = body.id {
            notification = notification.with_id(id);
        }
        notification
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WebhookResponse {
    Outcome(ReconcileOutcome),
    Dropped { result: String, reason: String },
}

impl WebhookResponse {
    pub fn dropped<S: Into<String>>(reason: S) -> Self {
        Self::Dropped { result: "dropped".into(), reason: reason.into() }
    }
}
