use std::str::FromStr;

use actix_web::{http::StatusCode, test::TestRequest};
use paygate_common::Amount;
use paygate_engine::{
    db_types::OrderStatusType,
    order_objects::{QueueStatus, TotalsReport},
};
use serde_json::json;

use super::helpers::{order_body, place_qr_order, send, setup, tear_down, QR_PAYLOAD};
use crate::data_objects::OrderResponse;

#[actix_web::test]
async fn health_check() {
    let (queue, reconciler) = setup().await;
    let (status, body) = send(&queue, &reconciler, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    tear_down(queue).await;
}

#[actix_web::test]
async fn request_order_returns_target_and_deadline() {
    let (queue, reconciler) = setup().await;
    let order = place_qr_order(&queue, &reconciler, "15000").await;
    assert!(order.order_id.starts_with("qr-"));
    assert_eq!(order.target, QR_PAYLOAD);
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.amount, Amount::from_str("15000").unwrap());
    assert!(order.seconds_remaining > 0 && order.seconds_remaining <= 300);
    tear_down(queue).await;
}

#[actix_web::test]
async fn busy_rail_is_a_conflict() {
    let (queue, reconciler) = setup().await;
    let first = place_qr_order(&queue, &reconciler, "15000").await;
    let req = TestRequest::post().uri("/orders").set_json(order_body("qr", "20000"));
    let (status, body) = send(&queue, &reconciler, req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("error"), "{body}");
    // The first order still holds the rail
    let (status, body) = send(&queue, &reconciler, TestRequest::get().uri("/queue/qr")).await;
    assert_eq!(status, StatusCode::OK);
    let slot: QueueStatus = serde_json::from_str(&body).unwrap();
    assert!(slot.busy);
    assert_eq!(slot.order_id.map(|id| id.0), Some(first.order_id));
    tear_down(queue).await;
}

#[actix_web::test]
async fn bad_order_requests() {
    let (queue, reconciler) = setup().await;
    let req = TestRequest::post().uri("/orders").set_json(order_body("qr", "0"));
    let (status, _) = send(&queue, &reconciler, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // Coin-A is not configured in these tests
    let req = TestRequest::post().uri("/orders").set_json(order_body("coin_a", "0.05"));
    let (status, _) = send(&queue, &reconciler, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let req = TestRequest::post().uri("/orders").set_json(json!({ "rail": "qr", "amount": "15000" }));
    let (status, _) = send(&queue, &reconciler, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    tear_down(queue).await;
}

#[actix_web::test]
async fn order_status() {
    let (queue, reconciler) = setup().await;
    let order = place_qr_order(&queue, &reconciler, "15000").await;
    let req = TestRequest::get().uri(&format!("/orders/{}", order.order_id));
    let (status, body) = send(&queue, &reconciler, req).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: OrderResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(fetched.order_id, order.order_id);
    assert_eq!(fetched.status, OrderStatusType::Pending);

    let (status, body) = send(&queue, &reconciler, TestRequest::get().uri("/orders/qr-19700101-deadbeef")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("qr-19700101-deadbeef"), "{body}");
    tear_down(queue).await;
}

#[actix_web::test]
async fn search_orders() {
    let (queue, reconciler) = setup().await;
    let order = place_qr_order(&queue, &reconciler, "15000").await;
    let (status, body) = send(&queue, &reconciler, TestRequest::get().uri("/orders?rail=qr&status=Pending")).await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<OrderResponse> = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_id, order.order_id);

    let (status, body) = send(&queue, &reconciler, TestRequest::get().uri("/orders?status=Success")).await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<OrderResponse> = serde_json::from_str(&body).unwrap();
    assert!(orders.is_empty());
    tear_down(queue).await;
}

#[actix_web::test]
async fn queue_status_per_rail() {
    let (queue, reconciler) = setup().await;
    let (status, body) = send(&queue, &reconciler, TestRequest::get().uri("/queue/qr")).await;
    assert_eq!(status, StatusCode::OK);
    let slot: QueueStatus = serde_json::from_str(&body).unwrap();
    assert!(slot.enabled);
    assert!(!slot.busy);
    assert!(slot.order_id.is_none());

    let (status, body) = send(&queue, &reconciler, TestRequest::get().uri("/queue/coin_b")).await;
    assert_eq!(status, StatusCode::OK);
    let slot: QueueStatus = serde_json::from_str(&body).unwrap();
    assert!(!slot.enabled);

    let (status, _) = send(&queue, &reconciler, TestRequest::get().uri("/queue/paypal")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    tear_down(queue).await;
}

#[actix_web::test]
async fn totals_start_at_zero() {
    let (queue, reconciler) = setup().await;
    let (status, body) = send(&queue, &reconciler, TestRequest::get().uri("/totals")).await;
    assert_eq!(status, StatusCode::OK);
    let totals: TotalsReport = serde_json::from_str(&body).unwrap();
    assert_eq!(totals.global.settled_count, 0);
    assert_eq!(totals.global.total_amount, Amount::default());
    tear_down(queue).await;
}
