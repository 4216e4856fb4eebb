use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use futures::FutureExt;
use log::*;
use paygate_engine::{
    events::{EventHandlers, EventHooks},
    PaymentGatewayDatabase,
    QueueApi,
    Reconciler,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    poll_worker::start_poll_workers,
    routes::{
        health,
        OrderStatusRoute,
        QrWebhookRoute,
        QueueStatusRoute,
        RequestOrderRoute,
        SearchOrdersRoute,
        TotalsRoute,
    },
};

const EVENT_BUFFER: usize = 128;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    }
    let registry = config.rail_registry()?;
    let handlers = EventHandlers::new(EVENT_BUFFER, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let queue = QueueApi::new(db, registry, producers);
    let reconciler = Reconciler::new(queue.clone());
    // These run forever, so don't hold on to the handles
    let _ = start_expiry_worker(queue.clone(), config.sweep_interval);
    let _ = start_poll_workers(reconciler.clone(), config.poll_interval, config.explorer_timeout);

    let srv = create_server_instance(&config, queue, reconciler)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: &ServerConfig,
    queue: QueueApi<SqliteDatabase>,
    reconciler: Reconciler<SqliteDatabase>,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("paygate::access_log"))
            .app_data(web::Data::new(queue.clone()))
            .app_data(web::Data::new(reconciler.clone()))
            .configure(configure::<SqliteDatabase>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers every route. The caller provides `QueueApi<B>` and `Reconciler<B>` as app data.
pub fn configure<B: PaymentGatewayDatabase + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(RequestOrderRoute::<B>::new())
        .service(SearchOrdersRoute::<B>::new())
        .service(OrderStatusRoute::<B>::new())
        .service(QueueStatusRoute::<B>::new())
        .service(TotalsRoute::<B>::new())
        .service(QrWebhookRoute::<B>::new());
}

/// Hooks that write terminal transitions to the log. Collaborators that need to react to these events (e.g. a
/// notification dispatcher) install their own hooks in place of these.
fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_settled(|ev| {
            info!("📬️ Order {} settled for {} on {}", ev.order.order_id, ev.order.amount, ev.order.rail);
            async {}.boxed()
        })
        .on_order_expired(|ev| {
            info!("📬️ Order {} expired unpaid on {}", ev.order.order_id, ev.order.rail);
            async {}.boxed()
        })
        .on_ambiguous_match(|ev| {
            let others = ev.others.iter().filter_map(|f| f.external_id.clone()).collect::<Vec<_>>().join(", ");
            warn!(
                "📬️ Order {} matched more than one payment. Settled with {:?}. Review these as well: [{others}]",
                ev.order.order_id, ev.chosen.external_id
            );
            async {}.boxed()
        });
    hooks
}
