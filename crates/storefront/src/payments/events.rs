//! Typed webhook events.
//!
//! Only the fields the reconciler needs are decoded. Event kinds this
//! service does not act on are kept as [`EventKind::Other`] so they can be
//! acknowledged without failing deserialization.

use serde::Deserialize;
use serde_json::Value;

use super::CheckoutSession;

/// What a verified notification reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `payment_intent.succeeded`
    PaymentSucceeded { payment_intent: String },
    /// `payment_intent.canceled`
    PaymentCanceled { payment_intent: String },
    /// `payment_intent.payment_failed`; the buyer may still retry on the
    /// hosted page, so this is not terminal.
    PaymentFailed { payment_intent: String },
    /// `checkout.session.expired`
    SessionExpired { session: CheckoutSession },
    /// Anything else.
    Other(String),
}

impl EventKind {
    /// The processor's name for this kind.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::PaymentSucceeded { .. } => "payment_intent.succeeded",
            Self::PaymentCanceled { .. } => "payment_intent.canceled",
            Self::PaymentFailed { .. } => "payment_intent.payment_failed",
            Self::SessionExpired { .. } => "checkout.session.expired",
            Self::Other(name) => name,
        }
    }
}

/// A decoded webhook notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: EventKind,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: Value,
}

#[derive(Deserialize)]
struct PaymentIntentObject {
    id: String,
}

impl WebhookEvent {
    /// Decode a raw (already verified) payload.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the envelope or the object of a kind
    /// this service acts on is malformed.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawEvent = serde_json::from_slice(payload)?;
        let object = raw.data.object;

        let intent = |object: Value| -> Result<String, serde_json::Error> {
            Ok(serde_json::from_value::<PaymentIntentObject>(object)?.id)
        };

        let kind = match raw.event_type.as_str() {
            "payment_intent.succeeded" => EventKind::PaymentSucceeded {
                payment_intent: intent(object)?,
            },
            "payment_intent.canceled" => EventKind::PaymentCanceled {
                payment_intent: intent(object)?,
            },
            "payment_intent.payment_failed" => EventKind::PaymentFailed {
                payment_intent: intent(object)?,
            },
            "checkout.session.expired" => EventKind::SessionExpired {
                session: serde_json::from_value(object)?,
            },
            _ => EventKind::Other(raw.event_type),
        };

        Ok(Self { id: raw.id, kind })
    }
}
