use chrono::{Duration, Utc};
use paygate_engine::{
    db_types::{OrderId, OrderStatusType, Rail},
    events::EventProducers,
    rails::{QrRail, RailRegistry},
    OrderLedger,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    QueueApi,
};

mod support;
use support::{amount, prepare_test_env, random_db_path, request, setup, tear_down, COIN_A_ADDRESS, QR_PAYLOAD};

#[tokio::test]
async fn admission_fills_in_target_and_deadline() {
    let api = setup().await;
    let order = api.request_order(request(Rail::Qr, "15000").with_memo("Kaos ukuran L")).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.target, QR_PAYLOAD);
    assert_eq!(order.deadline - order.created_at, Duration::minutes(5));
    assert_eq!(order.memo.as_deref(), Some("Kaos ukuran L"));
    assert!(order.order_id.as_str().starts_with("qr-"));

    let coin = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();
    assert_eq!(coin.target, COIN_A_ADDRESS);
    assert_eq!(coin.deadline - coin.created_at, Duration::minutes(30));

    let current = api.current_reservation(Rail::Qr).await.unwrap().unwrap();
    assert_eq!(current.order_id, order.order_id);
    assert!(api.current_reservation(Rail::CoinB).await.unwrap().is_none());
    tear_down(api).await;
}

#[tokio::test]
async fn rejects_bad_requests() {
    let api = setup().await;
    let err = api.request_order(request(Rail::Qr, "0")).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidAmount(_)));
    let err = api.request_order(request(Rail::Qr, "-5")).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidAmount(_)));
    let err = api.request_order(request(Rail::CoinB, "10")).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::RailNotConfigured(Rail::CoinB)));
    assert!(api.current_reservation(Rail::Qr).await.unwrap().is_none());
    tear_down(api).await;
}

#[tokio::test]
async fn settling_updates_totals_once() {
    let api = setup().await;
    let order = api.request_order(request(Rail::Qr, "15000")).await.unwrap();
    let settled = api.settle(&order.order_id, "qr-0001").await.unwrap();
    assert_eq!(settled.status, OrderStatusType::Success);
    assert_eq!(settled.external_ref.as_deref(), Some("qr-0001"));
    assert!(!api.queue_status(Rail::Qr).await.unwrap().busy);

    let err = api.settle(&order.order_id, "qr-0001").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotPending(_)));
    let err = api.settle(&order.order_id, "qr-0002").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotPending(_)));
    let err = api.expire(&order.order_id, Utc::now() + Duration::hours(1)).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotPending(_)));

    let totals = api.totals().await.unwrap();
    let qr = totals.for_rail(Rail::Qr).unwrap();
    assert_eq!(qr.total_amount, amount("15000"));
    assert_eq!(qr.settled_count, 1);
    assert_eq!(totals.global.total_amount, amount("15000"));
    assert_eq!(totals.global.settled_count, 1);
    assert_eq!(api.order_status(&order.order_id).await.unwrap().status, OrderStatusType::Success);
    tear_down(api).await;
}

#[tokio::test]
async fn totals_sum_every_settlement() {
    let api = setup().await;
    for (i, value) in ["15000", "2500.50", "100"].into_iter().enumerate() {
        let order = api.request_order(request(Rail::Qr, value)).await.unwrap();
        api.settle(&order.order_id, &format!("qr-{i:04}")).await.unwrap();
    }
    let coin = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();
    api.settle(&coin.order_id, "9f0c").await.unwrap();
    let expired = api.request_order(request(Rail::CoinA, "1.25")).await.unwrap();
    api.expire(&expired.order_id, expired.deadline + Duration::seconds(1)).await.unwrap();

    let totals = api.totals().await.unwrap();
    let qr = totals.for_rail(Rail::Qr).unwrap();
    assert_eq!(qr.total_amount, amount("17600.50"));
    assert_eq!(qr.settled_count, 3);
    let coin_a = totals.for_rail(Rail::CoinA).unwrap();
    assert_eq!(coin_a.total_amount, amount("0.05"));
    assert_eq!(coin_a.settled_count, 1);
    let coin_b = totals.for_rail(Rail::CoinB).unwrap();
    assert_eq!(coin_b.total_amount, amount("0"));
    assert_eq!(totals.global.total_amount, amount("17600.55"));
    assert_eq!(totals.global.settled_count, 4);
    tear_down(api).await;
}

#[tokio::test]
async fn unpaid_coin_order_is_swept() {
    let api = setup().await;
    let order = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();

    let early = api.expire_stale_reservations(Utc::now()).await.unwrap();
    assert!(early.is_empty());
    let err = api.expire(&order.order_id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::DeadlineNotReached { .. }));
    assert_eq!(api.order_status(&order.order_id).await.unwrap().status, OrderStatusType::Pending);
    let err = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::RailBusy { .. }));

    let swept = api.expire_stale_reservations(order.deadline + Duration::seconds(1)).await.unwrap();
    assert_eq!(swept.count(), 1);
    assert_eq!(swept.expired[0].order_id, order.order_id);
    assert_eq!(api.order_status(&order.order_id).await.unwrap().status, OrderStatusType::Failed);
    assert!(!api.queue_status(Rail::CoinA).await.unwrap().busy);

    // A second sweep is a no-op
    let again = api.expire_stale_reservations(order.deadline + Duration::seconds(2)).await.unwrap();
    assert!(again.is_empty());
    let err = api.settle(&order.order_id, "late-tx").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotPending(_)));

    let next = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();
    assert_eq!(next.status, OrderStatusType::Pending);
    let totals = api.totals().await.unwrap();
    assert_eq!(totals.global.settled_count, 0);
    tear_down(api).await;
}

#[tokio::test]
async fn admission_expires_an_overdue_reservation() {
    let url = random_db_path();
    let db = prepare_test_env(&url).await;
    let mut rails = RailRegistry::new();
    rails.register(QrRail::new(QR_PAYLOAD, Duration::milliseconds(50)).unwrap());
    let api = QueueApi::new(db, rails, EventProducers::default());

    let first = api.request_order(request(Rail::Qr, "15000")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    let second = api.request_order(request(Rail::Qr, "20000")).await.unwrap();
    assert_eq!(api.order_status(&first.order_id).await.unwrap().status, OrderStatusType::Failed);
    assert_eq!(api.current_reservation(Rail::Qr).await.unwrap().unwrap().order_id, second.order_id);
    tear_down(api).await;
}

#[tokio::test]
async fn unknown_orders() {
    let api = setup().await;
    let id = OrderId("qr-20240601-deadbeef".into());
    assert!(matches!(api.order_status(&id).await, Err(PaymentGatewayError::OrderNotFound(_))));
    assert!(matches!(api.settle(&id, "qr-1").await, Err(PaymentGatewayError::NotPending(_))));
    assert!(matches!(api.expire(&id, Utc::now()).await, Err(PaymentGatewayError::NotPending(_))));
    tear_down(api).await;
}

#[tokio::test]
async fn compare_and_set_requires_the_expected_status() {
    let api = setup().await;
    let order = api.request_order(request(Rail::Qr, "15000")).await.unwrap();
    let err = api
        .db()
        .compare_and_set_status(&order.order_id, OrderStatusType::Success, OrderStatusType::Failed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotPending(_)));
    let stored = api.db().fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Pending);
    assert!(stored.external_ref.is_none());
    tear_down(api).await;
}

#[tokio::test]
async fn a_reference_settles_only_one_order() {
    let api = setup().await;
    let first = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();
    api.settle(&first.order_id, "9f0c").await.unwrap();
    let second = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();
    let err = api.settle(&second.order_id, "9f0c").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::DuplicateExternalRef { rail: Rail::CoinA, .. }));
    // Nothing changed: the second order still holds the rail and the totals count one settlement
    assert_eq!(api.current_reservation(Rail::CoinA).await.unwrap().unwrap().order_id, second.order_id);
    assert_eq!(api.totals().await.unwrap().global.settled_count, 1);
    assert!(api.db().is_external_ref_settled(Rail::CoinA, "9f0c").await.unwrap());
    assert!(!api.db().is_external_ref_settled(Rail::CoinB, "9f0c").await.unwrap());
    tear_down(api).await;
}

#[tokio::test]
async fn totals_overflow_leaves_the_order_pending() {
    let api = setup().await;
    let biggest = "79228162514264337593543950335";
    let first = api.request_order(request(Rail::Qr, biggest)).await.unwrap();
    api.settle(&first.order_id, "qr-big-1").await.unwrap();

    let second = api.request_order(request(Rail::Qr, biggest)).await.unwrap();
    let err = api.settle(&second.order_id, "qr-big-2").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::TotalsOverflow(_)), "{err}");
    // The whole settlement rolled back
    assert_eq!(api.order_status(&second.order_id).await.unwrap().status, OrderStatusType::Pending);
    assert_eq!(api.current_reservation(Rail::Qr).await.unwrap().unwrap().order_id, second.order_id);
    assert!(!api.db().is_external_ref_settled(Rail::Qr, "qr-big-2").await.unwrap());
    let totals = api.totals().await.unwrap();
    assert_eq!(totals.global.total_amount, amount(biggest));
    assert_eq!(totals.global.settled_count, 1);

    // It can still run out its deadline like any other unpaid order
    let expired = api.expire(&second.order_id, second.deadline + Duration::seconds(1)).await.unwrap();
    assert_eq!(expired.status, OrderStatusType::Failed);
    tear_down(api).await;
}

#[tokio::test]
async fn concurrent_settlements_sum_into_totals() {
    let api = setup().await;
    let qr = api.request_order(request(Rail::Qr, "15000")).await.unwrap();
    let coin = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();
    let (qr_result, coin_result) =
        tokio::join!(api.settle(&qr.order_id, "qr-concurrent"), api.settle(&coin.order_id, "tx-concurrent"));
    assert_eq!(qr_result.unwrap().status, OrderStatusType::Success);
    assert_eq!(coin_result.unwrap().status, OrderStatusType::Success);

    let totals = api.totals().await.unwrap();
    assert_eq!(totals.for_rail(Rail::Qr).unwrap().total_amount, amount("15000"));
    assert_eq!(totals.for_rail(Rail::CoinA).unwrap().total_amount, amount("0.05"));
    assert_eq!(totals.global.total_amount, amount("15000.05"));
    assert_eq!(totals.global.settled_count, 2);
    assert!(!api.queue_status(Rail::Qr).await.unwrap().busy);
    assert!(!api.queue_status(Rail::CoinA).await.unwrap().busy);
    tear_down(api).await;
}

#[tokio::test]
async fn settle_and_expire_race_has_one_winner() {
    let api = setup().await;
    let order = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();
    let (settled, expired) = tokio::join!(
        api.settle(&order.order_id, "tx-race"),
        api.expire(&order.order_id, order.deadline + Duration::seconds(1))
    );
    let totals = api.totals().await.unwrap();
    let status = api.order_status(&order.order_id).await.unwrap().status;
    match (settled, expired) {
        (Ok(_), Err(PaymentGatewayError::NotPending(_))) => {
            assert_eq!(status, OrderStatusType::Success);
            assert_eq!(totals.global.settled_count, 1);
            assert_eq!(totals.global.total_amount, amount("0.05"));
        },
        (Err(PaymentGatewayError::NotPending(_)), Ok(_)) => {
            assert_eq!(status, OrderStatusType::Failed);
            assert_eq!(totals.global.settled_count, 0);
        },
        (s, e) => panic!("Expected exactly one winner. Got settle: {s:?}, expire: {e:?}"),
    }
    assert!(!api.queue_status(Rail::CoinA).await.unwrap().busy);
    tear_down(api).await;
}
