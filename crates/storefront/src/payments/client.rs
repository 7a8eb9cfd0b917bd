//! Stripe REST client.
//!
//! Requests are form-encoded with bracketed keys (`line_items[0][quantity]`)
//! and authenticated with the secret key as a bearer token. Every call is
//! bounded by the configured timeout.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentProcessor};
use crate::config::PaymentConfig;

/// Payment processor client backed by the Stripe API.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: SecretString,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SessionList {
    data: Vec<CheckoutSession>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    /// Create a new client from payment configuration.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(config: &PaymentConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.api_base)
    }

    async fn read<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, PaymentError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| PaymentError::Response(e.to_string()));
        }

        let message = response
            .json::<ErrorEnvelope>()
            .await
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or_else(|| status.to_string());

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            warn!(status = %status, message = %message, "Payment processor unavailable");
            return Err(PaymentError::Unavailable(message));
        }

        Err(PaymentError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport_error(err: &reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        PaymentError::Timeout
    } else {
        PaymentError::Unavailable(err.to_string())
    }
}

/// Form fields for a checkout session request.
fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }

    // On the session for expiry events, on the intent for intent events
    for (key, value) in request.metadata.to_pairs() {
        form.push((format!("metadata[{key}]"), value.clone()));
        form.push((format!("payment_intent_data[metadata][{key}]"), value));
    }

    form
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip(self, request), fields(order_id = %request.metadata.order_id))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .post(self.url("checkout/sessions"))
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&session_form(request))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let session: CheckoutSession = Self::read(response).await?;
        if session.url.is_none() {
            return Err(PaymentError::Response(format!(
                "session {} has no redirect url",
                session.id
            )));
        }

        debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn list_sessions_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Vec<CheckoutSession>, PaymentError> {
        let response = self
            .client
            .get(self.url("checkout/sessions"))
            .bearer_auth(self.secret_key.expose_secret())
            .query(&[("payment_intent", payment_intent), ("limit", "1")])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let list: SessionList = Self::read(response).await?;
        debug!(count = list.data.len(), "Sessions listed");
        Ok(list.data)
    }
}
