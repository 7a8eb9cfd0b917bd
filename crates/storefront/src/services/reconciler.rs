//! Payment webhook reconciliation.
//!
//! Every delivery is verified before anything else happens, including any
//! storage access. Verified events are matched to an order through the
//! session's correlation metadata and applied through the [`OrderLedger`].
//!
//! Failures split three ways:
//! - bad signature or payload: rejected, the processor should not retry
//! - storage or processor lookup unavailable: error, the processor retries
//! - anything retrying cannot fix (unknown order, contradictory event):
//!   acknowledged as `unresolved` or `conflict` and reported for manual
//!   reconciliation

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use rygstore_core::{OrderId, UserId};

use super::ledger::{Cancellation, Confirmation, LedgerError, OrderLedger};
use crate::db::RepositoryError;
use crate::payments::{
    CorrelationMetadata, EventKind, PaymentError, PaymentProcessor, SignatureError,
    WebhookEvent, WebhookVerifier,
};

/// How a verified event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The event changed an order.
    Processed,
    /// Nothing to do (duplicate, non-terminal, or irrelevant kind).
    Ignored,
    /// The event could not be matched to an order.
    Unresolved,
    /// The event contradicts the order's state.
    Conflict,
}

/// Response body for an accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgement {
    pub received: bool,
    pub outcome: ReconcileOutcome,
}

impl From<ReconcileOutcome> for Acknowledgement {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            received: true,
            outcome,
        }
    }
}

/// Errors that reject a delivery.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("webhook signature rejected: {0}")]
    Signature(#[from] SignatureError),

    #[error("webhook payload malformed: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// Session lookup failed transiently.
    #[error("payment processor lookup failed: {0}")]
    Processor(#[source] PaymentError),

    /// Order storage failed transiently.
    #[error("order storage unavailable: {0}")]
    Storage(#[source] RepositoryError),
}

impl ReconcileError {
    /// Whether the processor should redeliver.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Processor(_) | Self::Storage(_))
    }
}

/// Correlation fields carried through logs and error reports.
#[derive(Debug, Default)]
struct EventContext<'a> {
    event_id: &'a str,
    event_type: &'a str,
    payment_intent: Option<&'a str>,
    order_id: Option<OrderId>,
    user_id: Option<&'a UserId>,
}

impl EventContext<'_> {
    /// Log at error level and report to Sentry for manual follow-up.
    fn report(&self, message: &str) {
        let order_id = self.order_id.map(|id| id.to_string());
        let user_id = self.user_id.map(ToString::to_string);

        error!(
            event_id = %self.event_id,
            event_type = %self.event_type,
            payment_intent = ?self.payment_intent,
            order_id = ?order_id,
            user_id = ?user_id,
            "Webhook needs manual reconciliation: {message}"
        );

        sentry::with_scope(
            |scope| {
                scope.set_tag("webhook.event_id", self.event_id);
                scope.set_tag("webhook.event_type", self.event_type);
                if let Some(pi) = self.payment_intent {
                    scope.set_tag("payment_intent", pi);
                }
                if let Some(id) = &order_id {
                    scope.set_tag("order_id", id);
                }
                if let Some(id) = &user_id {
                    scope.set_user(Some(sentry::User {
                        id: Some(id.clone()),
                        ..Default::default()
                    }));
                }
            },
            || sentry::capture_message(message, sentry::Level::Error),
        );
    }
}

/// Applies verified payment notifications to orders.
#[derive(Clone)]
pub struct PaymentReconciler {
    verifier: WebhookVerifier,
    processor: Arc<dyn PaymentProcessor>,
    ledger: OrderLedger,
}

impl PaymentReconciler {
    #[must_use]
    pub fn new(
        verifier: WebhookVerifier,
        processor: Arc<dyn PaymentProcessor>,
        ledger: OrderLedger,
    ) -> Self {
        Self {
            verifier,
            processor,
            ledger,
        }
    }

    /// Verify and apply one delivery.
    ///
    /// # Errors
    ///
    /// - `Signature` / `MalformedPayload` if the delivery is not authentic or
    ///   not decodable; nothing was read or written
    /// - `Processor` / `Storage` on transient failures; the delivery should
    ///   be retried
    #[instrument(
        skip(self, payload, signature),
        fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
    )]
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<Acknowledgement, ReconcileError> {
        if let Err(e) = self.verifier.verify(payload, signature) {
            warn!(error = %e, "Rejected webhook with invalid signature");
            return Err(e.into());
        }

        let event = WebhookEvent::parse(payload)?;
        let span = tracing::Span::current();
        span.record("event_id", event.id.as_str());
        span.record("event_type", event.kind.name());

        let mut ctx = EventContext {
            event_id: &event.id,
            event_type: event.kind.name(),
            ..EventContext::default()
        };

        let outcome = match &event.kind {
            EventKind::PaymentSucceeded { payment_intent } => {
                ctx.payment_intent = Some(payment_intent.as_str());
                match self.correlate_intent(&mut ctx, payment_intent).await? {
                    Some(meta) => self.confirm(&ctx, &meta).await?,
                    None => ReconcileOutcome::Unresolved,
                }
            }
            EventKind::PaymentCanceled { payment_intent } => {
                ctx.payment_intent = Some(payment_intent.as_str());
                match self.correlate_intent(&mut ctx, payment_intent).await? {
                    Some(meta) => self.cancel(&ctx, &meta).await?,
                    None => ReconcileOutcome::Unresolved,
                }
            }
            EventKind::SessionExpired { session } => {
                ctx.payment_intent = session.payment_intent.as_deref();
                match CorrelationMetadata::from_metadata(&session.metadata) {
                    Ok(meta) => {
                        ctx.order_id = Some(meta.order_id);
                        self.cancel(&ctx, &meta).await?
                    }
                    Err(e) => {
                        ctx.report(&format!("expired session {} has bad metadata: {e}", session.id));
                        ReconcileOutcome::Unresolved
                    }
                }
            }
            EventKind::PaymentFailed { payment_intent } => {
                info!(payment_intent = %payment_intent, "Payment attempt failed, awaiting retry or cancel");
                ReconcileOutcome::Ignored
            }
            EventKind::Other(kind) => {
                debug!(kind = %kind, "Ignoring webhook event");
                ReconcileOutcome::Ignored
            }
        };

        Ok(outcome.into())
    }

    /// Find the order behind a payment intent via its checkout session.
    ///
    /// Returns `None` (already reported) when nothing usable is found.
    async fn correlate_intent(
        &self,
        ctx: &mut EventContext<'_>,
        payment_intent: &str,
    ) -> Result<Option<CorrelationMetadata>, ReconcileError> {
        let sessions = match self.processor.list_sessions_by_payment_intent(payment_intent).await {
            Ok(sessions) => sessions,
            Err(e) if e.is_retryable() => return Err(ReconcileError::Processor(e)),
            Err(e) => {
                ctx.report(&format!("session lookup rejected: {e}"));
                return Ok(None);
            }
        };

        let Some(session) = sessions.first() else {
            ctx.report("no checkout session for payment intent");
            return Ok(None);
        };

        match CorrelationMetadata::from_metadata(&session.metadata) {
            Ok(meta) => {
                ctx.order_id = Some(meta.order_id);
                Ok(Some(meta))
            }
            Err(e) => {
                ctx.report(&format!("session {} has bad metadata: {e}", session.id));
                Ok(None)
            }
        }
    }

    async fn confirm(
        &self,
        ctx: &EventContext<'_>,
        meta: &CorrelationMetadata,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match self.ledger.confirm_payment(meta.order_id, &meta.user_id).await {
            Ok(Confirmation::Settled) => Ok(ReconcileOutcome::Processed),
            Ok(Confirmation::AlreadyPaid) => {
                debug!(order_id = %meta.order_id, "Duplicate payment confirmation");
                Ok(ReconcileOutcome::Ignored)
            }
            Err(e) => Self::anomaly(ctx, meta, e),
        }
    }

    async fn cancel(
        &self,
        ctx: &EventContext<'_>,
        meta: &CorrelationMetadata,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match self.ledger.cancel_unpaid(meta.order_id, &meta.user_id).await {
            Ok(Cancellation::Deleted) => Ok(ReconcileOutcome::Processed),
            Ok(Cancellation::AlreadyGone) => Ok(ReconcileOutcome::Ignored),
            Err(e) => Self::anomaly(ctx, meta, e),
        }
    }

    fn anomaly(
        ctx: &EventContext<'_>,
        meta: &CorrelationMetadata,
        err: LedgerError,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let ctx = EventContext {
            user_id: Some(&meta.user_id),
            order_id: Some(meta.order_id),
            ..*ctx
        };

        match err {
            LedgerError::Repository(e) if e.is_transient() => Err(ReconcileError::Storage(e)),
            LedgerError::Repository(e) => {
                ctx.report(&format!("order could not be read: {e}"));
                Ok(ReconcileOutcome::Unresolved)
            }
            LedgerError::NotFound(_) => {
                ctx.report("order referenced by payment does not exist");
                Ok(ReconcileOutcome::Unresolved)
            }
            e @ (LedgerError::Conflict { .. } | LedgerError::OwnerMismatch { .. }) => {
                ctx.report(&e.to_string());
                Ok(ReconcileOutcome::Conflict)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rygstore_core::{CartItems, PaymentMethod, ProductId};
    use secrecy::SecretString;

    use super::*;
    use crate::db::{CartStore, OrderStore};
    use crate::models::Order;
    use crate::payments::CheckoutSession;
    use crate::payments::signature::unix_now;
    use crate::testing::{FakeProcessor, MemoryStore, event_payload, new_order};

    const SECRET: &str = "whsec_unit_7Hq2";

    struct Harness {
        reconciler: PaymentReconciler,
        verifier: WebhookVerifier,
        store: Arc<MemoryStore>,
        processor: Arc<FakeProcessor>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let processor = Arc::new(FakeProcessor::new());
        let verifier = WebhookVerifier::new(SecretString::from(SECRET), Duration::from_secs(300));
        Harness {
            reconciler: PaymentReconciler::new(
                verifier.clone(),
                processor.clone(),
                OrderLedger::new(store.clone()),
            ),
            verifier,
            store,
            processor,
        }
    }

    impl Harness {
        /// A card order with a processor session and a non-empty cart.
        async fn card_order(&self) -> (Order, String) {
            let user = UserId::new("user_1");
            self.store
                .set(&user, &CartItems::from_quantities([(ProductId::generate(), 2)]))
                .await
                .unwrap();
            let order = self
                .store
                .create_order(&new_order(&user, PaymentMethod::Card))
                .await
                .unwrap();
            let session = self.processor.open_session(order.id, &user);
            (order, session.payment_intent.unwrap_or_default())
        }

        async fn deliver(&self, payload: &[u8]) -> Result<Acknowledgement, ReconcileError> {
            let header = self.verifier.sign(payload, unix_now()).unwrap();
            self.reconciler.handle(payload, Some(&header)).await
        }
    }

    #[tokio::test]
    async fn test_bad_signature_touches_nothing() {
        let h = harness();
        let payload = event_payload("evt_1", "payment_intent.succeeded", "pi_x");

        let err = h
            .reconciler
            .handle(&payload, Some("t=1,v1=deadbeef"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Signature(_)));
        assert_eq!(h.store.calls(), 0);
        assert_eq!(h.processor.lookups(), 0);
    }

    #[tokio::test]
    async fn test_success_marks_paid_and_duplicate_is_ignored() {
        let h = harness();
        let (order, intent) = h.card_order().await;
        let payload = event_payload("evt_1", "payment_intent.succeeded", &intent);

        let first = h.deliver(&payload).await.unwrap();
        let second = h.deliver(&payload).await.unwrap();

        assert_eq!(first.outcome, ReconcileOutcome::Processed);
        assert_eq!(second.outcome, ReconcileOutcome::Ignored);
        assert!(h.store.get_order(order.id).await.unwrap().unwrap().paid);
        assert!(h.store.get(&order.user_id).await.unwrap().is_empty());
        assert_eq!(h.store.settlements(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_paid_is_conflict() {
        let h = harness();
        let (order, intent) = h.card_order().await;
        h.deliver(&event_payload("evt_1", "payment_intent.succeeded", &intent))
            .await
            .unwrap();

        let ack = h
            .deliver(&event_payload("evt_2", "payment_intent.canceled", &intent))
            .await
            .unwrap();

        assert_eq!(ack.outcome, ReconcileOutcome::Conflict);
        assert!(h.store.get_order(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancel_unpaid_deletes_order() {
        let h = harness();
        let (order, intent) = h.card_order().await;

        let ack = h
            .deliver(&event_payload("evt_1", "payment_intent.canceled", &intent))
            .await
            .unwrap();

        assert_eq!(ack.outcome, ReconcileOutcome::Processed);
        assert!(h.store.get_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_expiry_deletes_order() {
        let h = harness();
        let (order, _) = h.card_order().await;
        let session = CheckoutSession {
            id: "cs_expired".to_string(),
            url: None,
            payment_intent: None,
            metadata: [
                ("orderId".to_string(), order.id.to_string()),
                ("userId".to_string(), order.user_id.to_string()),
            ]
            .into_iter()
            .collect(),
        };
        let payload = serde_json::to_vec(&serde_json::json!({
            "id": "evt_9",
            "type": "checkout.session.expired",
            "data": {"object": {
                "id": session.id,
                "url": null,
                "payment_intent": null,
                "metadata": session.metadata,
            }}
        }))
        .unwrap();

        let ack = h.deliver(&payload).await.unwrap();

        assert_eq!(ack.outcome, ReconcileOutcome::Processed);
        assert!(h.store.get_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_intent_is_unresolved() {
        let h = harness();

        let ack = h
            .deliver(&event_payload("evt_1", "payment_intent.succeeded", "pi_unknown"))
            .await
            .unwrap();

        assert_eq!(ack.outcome, ReconcileOutcome::Unresolved);
    }

    #[tokio::test]
    async fn test_payment_failed_is_not_terminal() {
        let h = harness();
        let (order, intent) = h.card_order().await;

        let ack = h
            .deliver(&event_payload("evt_1", "payment_intent.payment_failed", &intent))
            .await
            .unwrap();

        assert_eq!(ack.outcome, ReconcileOutcome::Ignored);
        assert!(h.store.get_order(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_storage_outage_is_retryable() {
        let h = harness();
        let (_, intent) = h.card_order().await;
        h.store.set_unavailable(true);

        let err = h
            .deliver(&event_payload("evt_1", "payment_intent.succeeded", &intent))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_permanent_storage_fault_is_unresolved() {
        let h = harness();
        let (order, intent) = h.card_order().await;
        h.store.set_corrupted(true);

        let ack = h
            .deliver(&event_payload("evt_1", "payment_intent.succeeded", &intent))
            .await
            .unwrap();

        assert_eq!(ack.outcome, ReconcileOutcome::Unresolved);
        h.store.set_corrupted(false);
        assert!(!h.store.get_order(order.id).await.unwrap().unwrap().paid);
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_retryable() {
        let h = harness();
        let (_, intent) = h.card_order().await;
        h.processor.fail_lookups_with_timeout();

        let err = h
            .deliver(&event_payload("evt_1", "payment_intent.succeeded", &intent))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Processor(PaymentError::Timeout)));
    }
}
