//! Buyer order handlers.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
};
use serde::Serialize;
use tracing::instrument;

use rygstore_core::OrderId;

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::{Order, OrderFilter};
use crate::services::Cancellation;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub success: bool,
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub deleted: bool,
}

/// Orders for the signed-in buyer, newest first.
///
/// Without filters this is the "my orders" view: cash orders plus paid
/// card orders.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    filter: std::result::Result<Query<OrderFilter>, QueryRejection>,
) -> Result<Json<OrderListResponse>> {
    let Query(filter) = filter?;
    let orders = state.ledger().list_for_buyer(&user.id, &filter).await?;
    Ok(Json(OrderListResponse {
        success: true,
        orders,
    }))
}

/// Cancel an unpaid card order before payment.
#[instrument(skip_all, fields(user_id = %user.id, order_id = tracing::field::Empty))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    id: std::result::Result<Path<OrderId>, PathRejection>,
) -> Result<Json<CancelResponse>> {
    let Path(id) = id?;
    tracing::Span::current().record("order_id", tracing::field::display(id));

    let outcome = state.ledger().cancel_unpaid(id, &user.id).await?;
    Ok(Json(CancelResponse {
        success: true,
        deleted: outcome == Cancellation::Deleted,
    }))
}
