use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    AmbiguousMatchEvent,
    EventHandler,
    EventProducer,
    EventType,
    Handler,
    OrderExpiredEvent,
    OrderSettledEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_settled_producer: Vec<EventProducer<OrderSettledEvent>>,
    pub order_expired_producer: Vec<EventProducer<OrderExpiredEvent>>,
    pub ambiguous_match_producer: Vec<EventProducer<AmbiguousMatchEvent>>,
}

impl EventProducers {
    /// Hands the event to every subscriber of its kind.
    pub async fn publish(&self, event: EventType) {
        match event {
            EventType::OrderSettled(ev) => {
                for p in &self.order_settled_producer {
                    p.publish_event(ev.clone()).await;
                }
            },
            EventType::OrderExpired(ev) => {
                for p in &self.order_expired_producer {
                    p.publish_event(ev.clone()).await;
                }
            },
            EventType::AmbiguousMatch(ev) => {
                for p in &self.ambiguous_match_producer {
                    p.publish_event(ev.clone()).await;
                }
            },
        }
    }
}

pub struct EventHandlers {
    pub on_order_settled: Option<EventHandler<OrderSettledEvent>>,
    pub on_order_expired: Option<EventHandler<OrderExpiredEvent>>,
    pub on_ambiguous_match: Option<EventHandler<AmbiguousMatchEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_settled = hooks.on_order_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_order_expired = hooks.on_order_expired.map(|f| EventHandler::new(buffer_size, f));
        let on_ambiguous_match = hooks.on_ambiguous_match.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_settled, on_order_expired, on_ambiguous_match }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_settled {
            result.order_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_expired {
            result.order_expired_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_ambiguous_match {
            result.ambiguous_match_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_settled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_expired {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_ambiguous_match {
            tokio::spawn(handler.start_handler());
        }
    }
}

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_settled: Option<Handler<OrderSettledEvent>>,
    pub on_order_expired: Option<Handler<OrderExpiredEvent>>,
    pub on_ambiguous_match: Option<Handler<AmbiguousMatchEvent>>,
}

impl EventHooks {
    pub fn on_order_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderSettledEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_settled = Some(Arc::new(f));
        self
    }

    pub fn on_order_expired<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderExpiredEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_expired = Some(Arc::new(f));
        self
    }

    pub fn on_ambiguous_match<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AmbiguousMatchEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_ambiguous_match = Some(Arc::new(f));
        self
    }
}
