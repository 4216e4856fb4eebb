use std::time::Duration;

use chrono::Utc;
use log::*;
use paygate_engine::{db_types::Order, QueueApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, each rail whose pending order is past its deadline has the order marked `Failed` and the
/// reservation released.
pub fn start_expiry_worker(api: QueueApi<SqliteDatabase>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Reservation expiry worker started. Sweeping every {interval:?}");
        loop {
            timer.tick().await;
            trace!("🕰️ Running reservation expiry job");
            match api.expire_stale_reservations(Utc::now()).await {
                Ok(result) if result.is_empty() => {},
                Ok(result) => {
                    info!("🕰️ {} orders expired", result.count());
                    debug!("🕰️ Expired orders: {}", order_list(&result.expired));
                },
                Err(e) => {
                    error!("🕰️ Error running reservation expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] order_id: {} amount: {}", o.rail, o.order_id, o.amount))
        .collect::<Vec<String>>()
        .join(", ")
}
