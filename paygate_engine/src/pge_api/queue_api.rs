use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;
use tokio::sync::Mutex;

use crate::{
    db_types::{NewOrder, Order, OrderId, Rail},
    events::{EventProducers, EventType, OrderExpiredEvent, OrderSettledEvent},
    order_objects::{OrderQueryFilter, OrderRequest, QueueStatus, TotalsReport},
    rails::RailRegistry,
    traits::{ExpiryResult, PaymentGatewayDatabase, PaymentGatewayError},
};

/// One async lock per rail. Every operation that can change a rail's reservation holds its lock.
#[derive(Debug, Default)]
pub struct RailLocks {
    qr: Mutex<()>,
    coin_a: Mutex<()>,
    coin_b: Mutex<()>,
}

impl RailLocks {
    pub fn for_rail(&self, rail: Rail) -> &Mutex<()> {
        match rail {
            Rail::Qr => &self.qr,
            Rail::CoinA => &self.coin_a,
            Rail::CoinB => &self.coin_b,
        }
    }
}

/// `QueueApi` is the single-flight queue controller.
///
/// It admits new orders (at most one pending order per rail), and performs the two terminal transitions, settlement
/// and expiry. Clones share the rail locks and event producers, so a `QueueApi` can be handed to every request handler
/// and background worker.
#[derive(Clone)]
pub struct QueueApi<B> {
    db: B,
    rails: Arc<RailRegistry>,
    locks: Arc<RailLocks>,
    producers: EventProducers,
}

impl<B> Debug for QueueApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "QueueApi ({:?})", self.rails)
    }
}

impl<B> QueueApi<B> {
    pub fn new(db: B, rails: RailRegistry, producers: EventProducers) -> Self {
        Self { db, rails: Arc::new(rails), locks: Arc::new(RailLocks::default()), producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn rails(&self) -> &RailRegistry {
        &self.rails
    }

    pub(crate) async fn publish(&self, event: EventType) {
        self.producers.publish(event).await;
    }
}

impl<B> QueueApi<B>
where B: PaymentGatewayDatabase
{
    /// Admits a new order onto its rail.
    ///
    /// The amount must be strictly positive and the rail must be configured. If the rail's reservation is held by an
    /// order whose deadline has already passed, that order is expired first. Otherwise an occupied rail results in
    /// [`PaymentGatewayError::RailBusy`], which carries the blocking order and its deadline.
    pub async fn request_order(&self, request: OrderRequest) -> Result<Order, PaymentGatewayError> {
        let rail = request.rail;
        if !request.amount.is_positive() {
            return Err(PaymentGatewayError::InvalidAmount(format!("{} is not a positive amount", request.amount)));
        }
        let adapter = self.rails.get(rail).ok_or(PaymentGatewayError::RailNotConfigured(rail))?;
        let (result, expired) = {
            let _guard = self.locks.for_rail(rail).lock().await;
            let expired = self.expire_if_stale(rail, Utc::now()).await;
            let mut new_order = NewOrder::new(rail, request.amount, request.issuer, adapter.ttl()).with_kind(request.kind);
            if let Some(memo) = request.memo {
                new_order = new_order.with_memo(memo);
            }
            let target = adapter.compute_target(&new_order);
            let new_order = new_order.with_target(target);
            (self.db.create_reserved_order(new_order).await, expired)
        };
        if let Some(order) = expired {
            self.publish(EventType::OrderExpired(OrderExpiredEvent::new(order))).await;
        }
        match &result {
            Ok(order) => info!("🚦️ Order {} admitted on {rail} for {} until {}", order.order_id, order.amount, order.deadline),
            Err(PaymentGatewayError::RailBusy { order_id, .. }) => {
                debug!("🚦️ {rail} is busy with {order_id:?}. New order request rejected")
            },
            Err(e) => warn!("🚦️ Could not admit a new order on {rail}. {e}"),
        }
        result
    }

    /// The order that currently holds the rail's reservation, if any.
    pub async fn current_reservation(&self, rail: Rail) -> Result<Option<Order>, PaymentGatewayError> {
        let reservation = self.db.fetch_reservation(rail).await?;
        match reservation.order_id {
            Some(order_id) => {
                let order = self.db.fetch_order(&order_id).await?;
                if order.is_none() {
                    error!("🚦️ The {rail} reservation points at order {order_id}, which does not exist");
                }
                Ok(order)
            },
            None => Ok(None),
        }
    }

    /// Marks a pending order as `Success`, records `external_ref`, releases the rail and updates the totals.
    ///
    /// Orders that are not pending (including unknown ones) give [`PaymentGatewayError::NotPending`].
    pub async fn settle(&self, order_id: &OrderId, external_ref: &str) -> Result<Order, PaymentGatewayError> {
        let order = self.pending_order(order_id, "settle").await?;
        self.settle_pending(&order, external_ref).await
    }

    pub(crate) async fn settle_pending(&self, order: &Order, external_ref: &str) -> Result<Order, PaymentGatewayError> {
        let result = {
            let _guard = self.locks.for_rail(order.rail).lock().await;
            self.db.settle_order(&order.order_id, external_ref).await
        };
        match result {
            Ok(settled) => {
                info!("🚦️ Order {} settled on {} by [{external_ref}]", settled.order_id, settled.rail);
                self.publish(EventType::OrderSettled(OrderSettledEvent::new(settled.clone()))).await;
                Ok(settled)
            },
            Err(PaymentGatewayError::NotPending(id)) => {
                info!("🚦️ Duplicate settlement of {id} by [{external_ref}] ignored. The order is no longer pending");
                Err(PaymentGatewayError::NotPending(id))
            },
            Err(e) => Err(e),
        }
    }

    /// Marks a pending order as `Failed` and releases its rail, provided `now` is past its deadline.
    pub async fn expire(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<Order, PaymentGatewayError> {
        let order = self.pending_order(order_id, "expire").await?;
        let result = {
            let _guard = self.locks.for_rail(order.rail).lock().await;
            self.db.expire_order(order_id, now).await
        };
        let expired = result?;
        info!("🚦️ Order {} on {} expired unpaid", expired.order_id, expired.rail);
        self.publish(EventType::OrderExpired(OrderExpiredEvent::new(expired.clone()))).await;
        Ok(expired)
    }

    /// Expires every order whose reservation deadline is before `now`. Failures on one rail are logged and do not
    /// stop the sweep of the others.
    pub async fn expire_stale_reservations(&self, now: DateTime<Utc>) -> Result<ExpiryResult, PaymentGatewayError> {
        let mut result = ExpiryResult::default();
        for rail in Rail::ALL {
            let expired = {
                let _guard = self.locks.for_rail(rail).lock().await;
                self.expire_if_stale(rail, now).await
            };
            if let Some(order) = expired {
                self.publish(EventType::OrderExpired(OrderExpiredEvent::new(order.clone()))).await;
                result.expired.push(order);
            }
        }
        Ok(result)
    }

    // Caller must hold the rail lock.
    async fn expire_if_stale(&self, rail: Rail, now: DateTime<Utc>) -> Option<Order> {
        let reservation = match self.db.fetch_reservation(rail).await {
            Ok(r) => r,
            Err(e) => {
                warn!("🚦️ Could not read the {rail} reservation. {e}");
                return None;
            },
        };
        if !reservation.is_stale(now) {
            return None;
        }
        let order_id = reservation.order_id?;
        match self.db.expire_order(&order_id, now).await {
            Ok(order) => {
                info!("🚦️ Order {order_id} on {rail} passed its deadline of {} and was expired", order.deadline);
                Some(order)
            },
            Err(PaymentGatewayError::NotPending(_)) => {
                debug!("🚦️ Order {order_id} was already finalised. Nothing to expire");
                None
            },
            Err(e) => {
                warn!("🚦️ Could not expire order {order_id} on {rail}. {e}");
                None
            },
        }
    }

    async fn pending_order(&self, order_id: &OrderId, action: &str) -> Result<Order, PaymentGatewayError> {
        match self.db.fetch_order(order_id).await? {
            Some(order) if order.is_pending() => Ok(order),
            Some(order) => {
                info!("🚦️ Cannot {action} order {order_id}. It is already {}", order.status);
                Err(PaymentGatewayError::NotPending(order_id.clone()))
            },
            None => {
                info!("🚦️ Cannot {action} order {order_id}. It does not exist");
                Err(PaymentGatewayError::NotPending(order_id.clone()))
            },
        }
    }

    pub async fn order_status(&self, order_id: &OrderId) -> Result<Order, PaymentGatewayError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))
    }

    pub async fn queue_status(&self, rail: Rail) -> Result<QueueStatus, PaymentGatewayError> {
        let reservation = self.db.fetch_reservation(rail).await?;
        Ok(QueueStatus::from_reservation(&reservation, self.rails.is_enabled(rail), Utc::now()))
    }

    pub async fn totals(&self) -> Result<TotalsReport, PaymentGatewayError> {
        let (global, rails): (Vec<_>, Vec<_>) = self.db.fetch_totals().await?.into_iter().partition(|t| t.is_global());
        let global = global
            .into_iter()
            .next()
            .ok_or_else(|| PaymentGatewayError::DatabaseError("The global totals row is missing".into()))?;
        Ok(TotalsReport { rails, global })
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PaymentGatewayError> {
        trace!("🚦️ Searching orders. {query}");
        self.db.search_orders(query).await
    }
}
