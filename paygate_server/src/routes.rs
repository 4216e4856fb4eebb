//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every database and explorer operation in the engine is async, so
//! handlers only ever `.await` them.
use std::str::FromStr;

use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use paygate_engine::{
    db_types::{OrderId, Rail},
    rails::RailSignal,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    QueueApi,
    Reconciler,
};

use crate::{
    data_objects::{OrderRequestBody, OrderResponse, OrderSearchParams, QrNotificationBody, WebhookResponse},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(request_order => Post "/orders" impl PaymentGatewayDatabase);
/// Route handler for `POST /orders`
///
/// Admits a new order onto the requested rail and returns the payment target and deadline. If the rail already has
/// a pending order, the response is `409 Conflict` and the caller should try again later.
pub async fn request_order<B: PaymentGatewayDatabase>(
    body: web::Json<OrderRequestBody>,
    api: web::Data<QueueApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    debug!("💻️ New order request for {} on {}", body.amount, body.rail);
    let order = api.request_order(body.into()).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::new(order, Utc::now())))
}

route!(order_status => Get "/orders/{order_id}" impl PaymentGatewayDatabase);
pub async fn order_status<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<QueueApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    trace!("💻️ GET order status for {order_id}");
    let order = api.order_status(&order_id).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::new(order, Utc::now())))
}

route!(search_orders => Get "/orders" impl PaymentGatewayDatabase);
/// Route handler for `GET /orders`
///
/// Query parameters: `rail`, `status`, `issuer_contact`, `memo` (substring), `since`, `until` (RFC3339) and `limit`.
pub async fn search_orders<B: PaymentGatewayDatabase>(
    query: web::Query<OrderSearchParams>,
    api: web::Data<QueueApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let filter = query.into_inner().into();
    let orders = api.search_orders(filter).await?;
    let now = Utc::now();
    let orders = orders.into_iter().map(|o| OrderResponse::new(o, now)).collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(orders))
}

//----------------------------------------------   Queue  ----------------------------------------------------
route!(queue_status => Get "/queue/{rail}" impl PaymentGatewayDatabase);
pub async fn queue_status<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<QueueApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let rail = Rail::from_str(&path.into_inner()).map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    let status = api.queue_status(rail).await?;
    Ok(HttpResponse::Ok().json(status))
}

route!(totals => Get "/totals" impl PaymentGatewayDatabase);
pub async fn totals<B: PaymentGatewayDatabase>(api: web::Data<QueueApi<B>>) -> Result<HttpResponse, ServerError> {
    let totals = api.totals().await?;
    Ok(HttpResponse::Ok().json(totals))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(qr_webhook => Post "/webhook/qr" impl PaymentGatewayDatabase);
/// Route handler for `POST /webhook/qr`
///
/// Receives payment notification text forwarded from the merchant's banking app and reconciles it against the
/// pending QR order. Text that carries no amount is acknowledged with `"dropped"`, so that the sender does not keep
/// retrying it.
pub async fn qr_webhook<B: PaymentGatewayDatabase>(
    body: web::Json<QrNotificationBody>,
    reconciler: web::Data<Reconciler<B>>,
) -> Result<HttpResponse, ServerError> {
    let signal = RailSignal::Notification(body.into_inner().into());
    match reconciler.try_reconcile(Rail::Qr, &signal).await {
        Ok(outcome) => {
            debug!("💻️ QR notification reconciled: {outcome:?}");
            Ok(HttpResponse::Ok().json(WebhookResponse::Outcome(outcome)))
        },
        Err(PaymentGatewayError::MalformedSignal(reason)) => {
            warn!("💻️ Dropping QR notification. {reason}");
            Ok(HttpResponse::Ok().json(WebhookResponse::dropped(reason)))
        },
        Err(e) => Err(e.into()),
    }
}
