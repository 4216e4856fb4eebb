use std::{fmt::Debug, time::Duration};

use log::*;

use crate::{
    db_types::{Order, PaymentFact, Rail},
    events::{AmbiguousMatchEvent, EventType},
    pge_api::queue_api::QueueApi,
    rails::{RailAdapter, RailSignal},
    traits::{PaymentGatewayDatabase, PaymentGatewayError, ReconcileOutcome},
};

/// Matches rail signals against the order holding each rail's reservation, and settles it on a match.
///
/// The reconciler never branches on the rail. Everything rail-specific happens in the [`RailAdapter`]: normalizing
/// the signal, dropping transfers to the wrong receiver or with too few confirmations. What is left is matched here on
/// exact amount, timestamp and (where the rail needs it) an unused payment reference.
#[derive(Clone)]
pub struct Reconciler<B> {
    queue: QueueApi<B>,
}

impl<B> Debug for Reconciler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reconciler ({:?})", self.queue)
    }
}

impl<B> Reconciler<B> {
    pub fn new(queue: QueueApi<B>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &QueueApi<B> {
        &self.queue
    }
}

impl<B> Reconciler<B>
where B: PaymentGatewayDatabase
{
    /// Matches `signal` against the pending order on `rail`.
    ///
    /// * No pending order: [`ReconcileOutcome::Idle`].
    /// * No eligible candidate: [`ReconcileOutcome::Unmatched`].
    /// * One or more eligible candidates: the earliest settles the order. With more than one the outcome is flagged
    ///   as ambiguous and an `AmbiguousMatch` event is published.
    /// * The order was finalised concurrently, or the reference was taken in the meantime:
    ///   [`ReconcileOutcome::Duplicate`].
    ///
    /// A signal that cannot be read fails with [`PaymentGatewayError::MalformedSignal`] and changes nothing.
    pub async fn try_reconcile(&self, rail: Rail, signal: &RailSignal) -> Result<ReconcileOutcome, PaymentGatewayError> {
        let adapter = self.adapter(rail)?;
        let Some(order) = self.queue.current_reservation(rail).await? else {
            trace!("🔎️ No pending order on {rail}. {} signal ignored", signal.kind());
            return Ok(ReconcileOutcome::Idle);
        };
        if !order.is_pending() {
            warn!("🔎️ The {rail} reservation is held by {}, which is {}", order.order_id, order.status);
            return Ok(ReconcileOutcome::Idle);
        }
        let candidates = adapter.extract_candidates(&order, signal)?;
        trace!("🔎️ {} candidate payments for order {} on {rail}", candidates.len(), order.order_id);
        let mut eligible = self.eligible_candidates(adapter.as_ref(), &order, candidates).await?;
        if eligible.is_empty() {
            debug!("🔎️ No payment in the {} signal matches order {}", signal.kind(), order.order_id);
            return Ok(ReconcileOutcome::Unmatched { order_id: order.order_id });
        }
        // Earliest first
        eligible.sort_by_key(|f| f.timestamp);
        let fact = eligible.remove(0);
        let ambiguous = !eligible.is_empty();
        let external_ref = fact.external_id.clone().unwrap_or_else(|| format!("unreferenced-{}", order.order_id));
        match self.queue.settle_pending(&order, &external_ref).await {
            Ok(settled) => {
                if ambiguous {
                    warn!(
                        "🔎️ {} payments matched order {} on {rail}. The earliest, [{external_ref}], settled it. The \
                         others need manual review.",
                        eligible.len() + 1,
                        settled.order_id
                    );
                    let event = AmbiguousMatchEvent::new(settled.clone(), fact.clone(), eligible);
                    self.queue.publish(EventType::AmbiguousMatch(event)).await;
                }
                Ok(ReconcileOutcome::Settled { order: settled, fact, ambiguous })
            },
            Err(PaymentGatewayError::NotPending(order_id)) => {
                Ok(ReconcileOutcome::Duplicate { order_id, external_ref })
            },
            Err(PaymentGatewayError::DuplicateExternalRef { external_ref, .. }) => {
                info!("🔎️ [{external_ref}] has already settled another order on {rail}");
                Ok(ReconcileOutcome::Duplicate { order_id: order.order_id, external_ref })
            },
            Err(e) => Err(e),
        }
    }

    /// Asks a pull-based rail for a fresh signal for its pending order. The upstream call is abandoned after
    /// `timeout`, which is reported as [`PaymentGatewayError::UpstreamUnavailable`].
    ///
    /// Returns `None` if the rail is idle or does not pull its signals.
    pub async fn poll_signal(&self, rail: Rail, timeout: Duration) -> Result<Option<RailSignal>, PaymentGatewayError> {
        let adapter = self.adapter(rail)?;
        let Some(order) = self.queue.current_reservation(rail).await? else {
            return Ok(None);
        };
        if !order.is_pending() {
            return Ok(None);
        }
        match tokio::time::timeout(timeout, adapter.poll(&order)).await {
            Ok(signal) => Ok(signal?),
            Err(_) => {
                Err(PaymentGatewayError::UpstreamUnavailable(format!("{rail} did not answer within {timeout:?}")))
            },
        }
    }

    pub async fn poll_and_reconcile(&self, rail: Rail, timeout: Duration) -> Result<ReconcileOutcome, PaymentGatewayError> {
        match self.poll_signal(rail, timeout).await? {
            Some(signal) => self.try_reconcile(rail, &signal).await,
            None => Ok(ReconcileOutcome::Idle),
        }
    }

    async fn eligible_candidates(
        &self,
        adapter: &dyn RailAdapter,
        order: &Order,
        candidates: Vec<PaymentFact>,
    ) -> Result<Vec<PaymentFact>, PaymentGatewayError> {
        let mut eligible = Vec::with_capacity(candidates.len());
        for fact in candidates {
            if fact.amount != order.amount {
                trace!("🔎️ {} does not match the {} requested by {}", fact.amount, order.amount, order.order_id);
                continue;
            }
            // An undated payment cannot be shown to postdate the order, so it is never eligible
            match fact.timestamp {
                Some(t) if t >= order.created_at => {},
                Some(_) => {
                    trace!("🔎️ Payment {:?} predates order {}", fact.external_id, order.order_id);
                    continue;
                },
                None => {
                    debug!("🔎️ Payment {:?} carries no timestamp and cannot be used for {}", fact.external_id, order.order_id);
                    continue;
                },
            }
            if adapter.requires_unique_reference() {
                let Some(external_ref) = fact.external_id.as_deref() else {
                    trace!("🔎️ Payment of {} has no reference and cannot be used on {}", fact.amount, order.rail);
                    continue;
                };
                if self.queue.db().is_external_ref_settled(order.rail, external_ref).await? {
                    debug!("🔎️ [{external_ref}] has already settled an order on {}. Replay ignored", order.rail);
                    continue;
                }
            }
            eligible.push(fact);
        }
        Ok(eligible)
    }

    fn adapter(&self, rail: Rail) -> Result<std::sync::Arc<dyn RailAdapter>, PaymentGatewayError> {
        self.queue.rails().get(rail).ok_or(PaymentGatewayError::RailNotConfigured(rail))
    }
}
