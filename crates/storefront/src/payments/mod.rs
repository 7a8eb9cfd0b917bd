//! Payment processor integration.
//!
//! # Architecture
//!
//! - [`PaymentProcessor`] is the outbound seam: hosted checkout sessions and
//!   session lookup by payment intent. [`StripeClient`] implements it over
//!   the REST API with form-encoded requests.
//! - [`WebhookVerifier`] authenticates inbound notifications before anything
//!   else looks at them.
//! - [`WebhookEvent`] is the typed view of a verified notification.
//! - [`CorrelationMetadata`] ties a processor session back to an order. It is
//!   the only way a notification is matched to an order, so it is validated
//!   when parsed rather than where it is used.

mod client;
pub mod events;
pub mod signature;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use rygstore_core::{OrderId, UserId};

pub use client::StripeClient;
pub use events::{EventKind, WebhookEvent};
pub use signature::{SIGNATURE_HEADER, SignatureError, WebhookVerifier};

/// Errors that can occur when talking to the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The call did not finish within the configured timeout.
    #[error("payment processor timed out")]
    Timeout,

    /// Connection failure, 5xx, or rate limiting.
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),

    /// The processor refused the request (4xx).
    #[error("payment processor rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response could not be understood.
    #[error("payment processor response error: {0}")]
    Response(String),
}

impl PaymentError {
    /// Whether the same call may succeed if retried later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

/// Metadata key carrying the order ID.
pub const ORDER_ID_KEY: &str = "orderId";
/// Metadata key carrying the buyer's user ID.
pub const USER_ID_KEY: &str = "userId";

/// Why session metadata could not be turned into [`CorrelationMetadata`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("metadata is missing '{0}'")]
    Missing(&'static str),

    #[error("metadata '{ORDER_ID_KEY}' is not a valid order id: {0}")]
    InvalidOrderId(String),

    #[error("metadata '{USER_ID_KEY}' is empty")]
    EmptyUserId,
}

/// The `(order, buyer)` pair embedded in every checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationMetadata {
    pub order_id: OrderId,
    pub user_id: UserId,
}

impl CorrelationMetadata {
    /// Parse the correlation pair out of raw session metadata.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError` if a key is absent, the order ID is not a UUID,
    /// or the user ID is blank.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Self, MetadataError> {
        let order_raw = metadata
            .get(ORDER_ID_KEY)
            .ok_or(MetadataError::Missing(ORDER_ID_KEY))?;
        let user_raw = metadata
            .get(USER_ID_KEY)
            .ok_or(MetadataError::Missing(USER_ID_KEY))?;

        let order_id = order_raw
            .trim()
            .parse()
            .map_err(|_| MetadataError::InvalidOrderId(order_raw.clone()))?;
        let user_id = UserId::new(user_raw.trim());
        if user_id.is_empty() {
            return Err(MetadataError::EmptyUserId);
        }

        Ok(Self { order_id, user_id })
    }

    /// Key/value pairs to attach to a new session.
    #[must_use]
    pub fn to_pairs(&self) -> [(&'static str, String); 2] {
        [
            (ORDER_ID_KEY, self.order_id.to_string()),
            (USER_ID_KEY, self.user_id.to_string()),
        ]
    }
}

/// A line shown on the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub name: String,
    /// Unit price in minor currency units.
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Request for a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: CorrelationMetadata,
    /// Sent as the processor-side idempotency key so a retried create
    /// returns the same session.
    pub idempotency_key: String,
}

/// A checkout session as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Outbound calls to the payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Sessions associated with a payment intent, most recent first.
    async fn list_sessions_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Vec<CheckoutSession>, PaymentError>;
}
