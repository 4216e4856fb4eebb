//! Background polling for pull-based rails.
//!
//! Each pull rail gets its own ticker. On every tick the ticker asks the rail's explorer for fresh transfers (bounded by
//! the explorer timeout) and forwards whatever it got to a single reconciliation task over a channel. A slow explorer
//! on one rail therefore never delays polling on another.
use std::time::Duration;

use log::*;
use paygate_engine::{db_types::Rail, rails::RailSignal, PaymentGatewayError, Reconciler, SqliteDatabase};
use tokio::{
    sync::mpsc::{self, Receiver, Sender},
    task::JoinHandle,
};

const SIGNAL_BUFFER: usize = 32;

/// Starts one poller per pull-based rail and the task that reconciles their signals. Returns the handles of every
/// spawned task. Do not await them, as they run indefinitely.
pub fn start_poll_workers(
    reconciler: Reconciler<SqliteDatabase>,
    interval: Duration,
    timeout: Duration,
) -> Vec<JoinHandle<()>> {
    let rails = reconciler.queue().rails().pull_rails();
    if rails.is_empty() {
        info!("📡️ No pull-based rails are enabled. Poll workers are not started.");
        return Vec::new();
    }
    let (sender, receiver) = mpsc::channel(SIGNAL_BUFFER);
    let mut handles = rails
        .into_iter()
        .map(|rail| start_rail_poller(rail, reconciler.clone(), sender.clone(), interval, timeout))
        .collect::<Vec<_>>();
    handles.push(start_reconcile_task(reconciler, receiver));
    handles
}

fn start_rail_poller(
    rail: Rail,
    reconciler: Reconciler<SqliteDatabase>,
    sender: Sender<(Rail, RailSignal)>,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("📡️ Poller for {rail} started. Polling every {interval:?}");
        loop {
            timer.tick().await;
            match reconciler.poll_signal(rail, timeout).await {
                Ok(Some(signal)) => {
                    trace!("📡️ Got {} from {rail}", signal.kind());
                    if sender.send((rail, signal)).await.is_err() {
                        error!("📡️ The reconciliation task has stopped. Poller for {rail} is shutting down.");
                        break;
                    }
                },
                Ok(None) => trace!("📡️ {rail} is idle"),
                Err(PaymentGatewayError::UpstreamUnavailable(e)) => {
                    warn!("📡️ {rail} explorer is unavailable. Will try again next tick. {e}");
                },
                Err(e) => error!("📡️ Could not poll {rail}. {e}"),
            }
        }
    })
}

fn start_reconcile_task(
    reconciler: Reconciler<SqliteDatabase>,
    mut receiver: Receiver<(Rail, RailSignal)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((rail, signal)) = receiver.recv().await {
            match reconciler.try_reconcile(rail, &signal).await {
                Ok(outcome) if outcome.is_settled() => info!("📡️ {rail} poll settled an order: {outcome:?}"),
                Ok(outcome) => debug!("📡️ {rail} poll: {outcome:?}"),
                Err(e) => error!("📡️ Could not reconcile {rail} poll. {e}"),
            }
        }
        info!("📡️ All pollers have stopped. Reconciliation task is shutting down.");
    })
}
