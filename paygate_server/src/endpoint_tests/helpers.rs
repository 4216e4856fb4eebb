use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use chrono::Duration;
use log::*;
use paygate_engine::{
    db_types::{Order, OrderId},
    events::EventProducers,
    rails::{QrRail, RailRegistry},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    PaymentGatewayDatabase,
    QueueApi,
    Reconciler,
    SqliteDatabase,
};
use serde_json::{json, Value};
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{data_objects::OrderResponse, server::configure};

pub const QR_PAYLOAD: &str = "00020101021126570011ID.DANA.WWW011893600915000000000102";

/// A fresh database with only the QR rail enabled.
pub async fn setup() -> (QueueApi<SqliteDatabase>, Reconciler<SqliteDatabase>) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
    let mut rails = RailRegistry::new();
    rails.register(QrRail::new(QR_PAYLOAD, Duration::minutes(5)).expect("valid regexes"));
    let queue = QueueApi::new(db, rails, EventProducers::default());
    let reconciler = Reconciler::new(queue.clone());
    (queue, reconciler)
}

pub async fn tear_down(mut api: QueueApi<SqliteDatabase>) {
    let url = api.db().url().to_string();
    if let Err(e) = api.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Failed to drop database {url}: {e}");
    }
}

/// Sends `req` to an app serving every route and returns the status and the body.
pub async fn send(
    queue: &QueueApi<SqliteDatabase>,
    reconciler: &Reconciler<SqliteDatabase>,
    req: TestRequest,
) -> (StatusCode, String) {
    let app = App::new()
        .app_data(web::Data::new(queue.clone()))
        .app_data(web::Data::new(reconciler.clone()))
        .configure(configure::<SqliteDatabase>);
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub fn order_body(rail: &str, amount: &str) -> Value {
    json!({
        "rail": rail,
        "amount": amount,
        "issuer_name": "Budi",
        "issuer_contact": "+628123456789",
        "memo": "Fundraiser"
    })
}

/// Places a QR order through the API and returns it.
pub async fn place_qr_order(
    queue: &QueueApi<SqliteDatabase>,
    reconciler: &Reconciler<SqliteDatabase>,
    amount: &str,
) -> OrderResponse {
    let req = TestRequest::post().uri("/orders").set_json(order_body("qr", amount));
    let (status, body) = send(queue, reconciler, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    serde_json::from_str(&body).expect("an order response")
}

pub async fn fetch_order(queue: &QueueApi<SqliteDatabase>, order: &OrderResponse) -> Order {
    queue.order_status(&OrderId(order.order_id.clone())).await.expect("order exists")
}
