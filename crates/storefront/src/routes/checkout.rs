//! Checkout handler.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use rygstore_core::{AddressId, OrderId, PaymentMethod};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::services::{CheckoutItem, CheckoutOutcome, CheckoutRequest};
use crate::state::AppState;

/// Header carrying the client's retry key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// `POST /checkout` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub address_id: AddressId,
    pub items: Vec<CheckoutItem>,
    pub payment_method: PaymentMethod,
}

/// `POST /checkout` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_id: OrderId,
    /// Hosted payment page for card orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        match outcome {
            CheckoutOutcome::Placed { order_id } => Self {
                success: true,
                order_id,
                url: None,
            },
            CheckoutOutcome::Redirect {
                order_id,
                redirect_url,
            } => Self {
                success: true,
                order_id,
                url: Some(redirect_url),
            },
        }
    }
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::BadRequest("Idempotency-Key must be ASCII".to_string()))?
        .trim();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::BadRequest(format!(
            "Idempotency-Key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(Some(key.to_string()))
}

/// Place an order from the submitted items.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    headers: HeaderMap,
    body: std::result::Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<Json<CheckoutResponse>> {
    let Json(body) = body?;
    let idempotency_key = idempotency_key(&headers)?;

    let outcome = state
        .checkout()
        .checkout(CheckoutRequest {
            user_id: user.id,
            address_id: body.address_id,
            items: body.items,
            payment_method: body.payment_method,
            idempotency_key,
        })
        .await?;

    let order_id = outcome.order_id().to_string();
    add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order_id.as_str())]));
    Ok(Json(outcome.into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_idempotency_key_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers).unwrap(), None);

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static(" retry-1 "));
        assert_eq!(idempotency_key(&headers).unwrap(), Some("retry-1".to_string()));

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("  "));
        assert!(idempotency_key(&headers).is_err());
    }

    #[test]
    fn test_response_includes_url_only_for_card() {
        let order_id = OrderId::generate();
        let placed = serde_json::to_value(CheckoutResponse::from(CheckoutOutcome::Placed {
            order_id,
        }))
        .unwrap();
        assert!(placed.get("url").is_none());
        assert_eq!(placed["orderId"], order_id.to_string());

        let redirect = serde_json::to_value(CheckoutResponse::from(CheckoutOutcome::Redirect {
            order_id,
            redirect_url: "https://pay.test/cs_1".to_string(),
        }))
        .unwrap();
        assert_eq!(redirect["url"], "https://pay.test/cs_1");
    }
}
