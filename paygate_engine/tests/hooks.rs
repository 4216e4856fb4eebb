use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use chrono::Duration;
use futures_util::FutureExt;
use log::*;
use paygate_engine::{
    db_types::Rail,
    events::{EventHandlers, EventHooks},
    rails::{QrNotification, RailSignal},
    Reconciler,
};

mod support;
use support::{request, setup_with, tear_down, StaticExplorer, COIN_A_ADDRESS};

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

async fn wait_for(hook: &HookCalled, expected: i32) {
    for _ in 0..100 {
        if hook.count() >= expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn hooks_fire_on_terminal_transitions() {
    let settled = HookCalled::default();
    let expired = HookCalled::default();
    let ambiguous = HookCalled::default();
    let mut hooks = EventHooks::default();
    let s = settled.clone();
    hooks.on_order_settled(move |ev| {
        info!("🪝️ Settled {}", ev.order.order_id);
        let s = s.clone();
        async move { s.called() }.boxed()
    });
    let e = expired.clone();
    hooks.on_order_expired(move |ev| {
        info!("🪝️ Expired {}", ev.order.order_id);
        let e = e.clone();
        async move { e.called() }.boxed()
    });
    let a = ambiguous.clone();
    hooks.on_ambiguous_match(move |ev| {
        info!("🪝️ {} other payments matched {}", ev.others.len(), ev.order.order_id);
        let a = a.clone();
        async move { a.called() }.boxed()
    });
    let handlers = EventHandlers::new(8, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let explorer = StaticExplorer::default();
    let api = setup_with(explorer.clone(), producers).await;
    let reconciler = Reconciler::new(api.clone());

    api.request_order(request(Rail::Qr, "15000")).await.unwrap();
    let signal = RailSignal::Notification(QrNotification::new("Rp15.000 diterima").with_id("n-1"));
    assert!(reconciler.try_reconcile(Rail::Qr, &signal).await.unwrap().is_settled());

    let order = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();
    api.expire_stale_reservations(order.deadline + Duration::seconds(1)).await.unwrap();

    let order = api.request_order(request(Rail::CoinA, "0.05")).await.unwrap();
    explorer.add_transfer("tx-1", COIN_A_ADDRESS, "0.05", 1, order.created_at + Duration::seconds(1)).await;
    explorer.add_transfer("tx-2", COIN_A_ADDRESS, "0.05", 1, order.created_at + Duration::seconds(2)).await;
    let outcome = reconciler.poll_and_reconcile(Rail::CoinA, std::time::Duration::from_secs(5)).await.unwrap();
    assert!(outcome.is_settled());

    wait_for(&settled, 2).await;
    wait_for(&expired, 1).await;
    wait_for(&ambiguous, 1).await;
    assert_eq!(settled.count(), 2);
    assert_eq!(expired.count(), 1);
    assert_eq!(ambiguous.count(), 1);
    tear_down(api).await;
}

#[tokio::test]
async fn no_hooks_no_events() {
    let handlers = EventHandlers::new(8, EventHooks::default());
    let producers = handlers.producers();
    assert!(producers.order_settled_producer.is_empty());
    assert!(producers.order_expired_producer.is_empty());
    assert!(producers.ambiguous_match_producer.is_empty());
    handlers.start_handlers().await;
    let api = setup_with(StaticExplorer::default(), producers).await;
    let order = api.request_order(request(Rail::Qr, "15000")).await.unwrap();
    api.settle(&order.order_id, "qr-1").await.unwrap();
    tear_down(api).await;
}
