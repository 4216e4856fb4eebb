use std::str::FromStr;

use actix_web::{http::StatusCode, test::TestRequest};
use paygate_common::Amount;
use paygate_engine::{db_types::OrderStatusType, order_objects::TotalsReport, ReconcileOutcome};
use serde_json::{json, Value};

use super::helpers::{fetch_order, place_qr_order, send, setup, tear_down};

fn notification(text: &str, id: &str) -> TestRequest {
    TestRequest::post().uri("/webhook/qr").set_json(json!({ "text": text, "id": id }))
}

#[actix_web::test]
async fn notification_settles_pending_order() {
    let (queue, reconciler) = setup().await;
    let order = place_qr_order(&queue, &reconciler, "15000").await;
    let (status, body) = send(&queue, &reconciler, notification("Rp15.000 diterima dari BUDI", "n-1")).await;
    assert_eq!(status, StatusCode::OK);
    let outcome: ReconcileOutcome = serde_json::from_str(&body).unwrap();
    assert!(outcome.is_settled(), "{body}");

    let settled = fetch_order(&queue, &order).await;
    assert_eq!(settled.status, OrderStatusType::Success);
    assert!(settled.external_ref.as_deref().is_some_and(|r| r.starts_with("qr-")));

    let (_, body) = send(&queue, &reconciler, TestRequest::get().uri("/totals")).await;
    let totals: TotalsReport = serde_json::from_str(&body).unwrap();
    assert_eq!(totals.global.total_amount, Amount::from_str("15000").unwrap());
    assert_eq!(totals.global.settled_count, 1);
    tear_down(queue).await;
}

#[actix_web::test]
async fn replayed_notification_is_ignored() {
    let (queue, reconciler) = setup().await;
    place_qr_order(&queue, &reconciler, "15000").await;
    let (_, body) = send(&queue, &reconciler, notification("Rp15.000 diterima", "n-1")).await;
    assert!(serde_json::from_str::<ReconcileOutcome>(&body).unwrap().is_settled());

    // Rail is idle now
    let (status, body) = send(&queue, &reconciler, notification("Rp15.000 diterima", "n-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<ReconcileOutcome>(&body).unwrap(), ReconcileOutcome::Idle);

    // A second order for the same amount cannot be settled by the same delivery
    let second = place_qr_order(&queue, &reconciler, "15000").await;
    let (status, body) = send(&queue, &reconciler, notification("Rp15.000 diterima", "n-1")).await;
    assert_eq!(status, StatusCode::OK);
    let outcome: ReconcileOutcome = serde_json::from_str(&body).unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Unmatched { .. }), "{body}");
    assert_eq!(fetch_order(&queue, &second).await.status, OrderStatusType::Pending);
    tear_down(queue).await;
}

#[actix_web::test]
async fn wrong_amount_is_unmatched() {
    let (queue, reconciler) = setup().await;
    let order = place_qr_order(&queue, &reconciler, "15000").await;
    let (status, body) = send(&queue, &reconciler, notification("Rp14.999 diterima", "n-2")).await;
    assert_eq!(status, StatusCode::OK);
    let outcome: ReconcileOutcome = serde_json::from_str(&body).unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Unmatched { .. }), "{body}");
    assert_eq!(fetch_order(&queue, &order).await.status, OrderStatusType::Pending);
    tear_down(queue).await;
}

#[actix_web::test]
async fn unreadable_notification_is_dropped() {
    let (queue, reconciler) = setup().await;
    let order = place_qr_order(&queue, &reconciler, "15000").await;
    let (status, body) = send(&queue, &reconciler, notification("Pembayaran diterima", "n-3")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["result"], "dropped");
    assert_eq!(fetch_order(&queue, &order).await.status, OrderStatusType::Pending);
    tear_down(queue).await;
}
