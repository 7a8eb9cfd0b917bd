//! Payment processor webhook handler.
//!
//! The body is taken as raw bytes: the signature covers the exact payload,
//! so it must not pass through a JSON extractor first. No session is
//! needed; authenticity comes from the signature alone.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use tracing::instrument;

use crate::error::Result;
use crate::payments::SIGNATURE_HEADER;
use crate::services::Acknowledgement;
use crate::state::AppState;

/// Receive one webhook delivery.
///
/// 200 with an outcome when handled (including unresolvable events), 400
/// when the signature or payload is bad, 503 when the processor should
/// redeliver later.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Acknowledgement>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ack = state.reconciler().handle(&body, signature).await?;
    Ok(Json(ack))
}
