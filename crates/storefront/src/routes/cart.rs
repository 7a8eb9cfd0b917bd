//! Cart route handlers.
//!
//! The cart lives server-side on the user record. Every handler answers with
//! the cart as stored after the change, so clients can drop their optimistic
//! copy when a write fails.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection, rejection::PathRejection},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use rygstore_core::{CartItems, ProductId};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::state::AppState;

/// Cart response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub success: bool,
    pub cart_items: CartItems,
    pub total_quantity: u64,
}

impl From<CartItems> for CartResponse {
    fn from(cart_items: CartItems) -> Self {
        Self {
            success: true,
            total_quantity: cart_items.total_quantity(),
            cart_items,
        }
    }
}

/// `PUT /cart` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceCartBody {
    pub cart_items: CartItems,
}

/// `PATCH /cart/items/{product_id}` body.
#[derive(Debug, Deserialize)]
pub struct SetQuantityBody {
    pub quantity: i64,
}

/// Current cart.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<CartResponse>> {
    let items = state.carts().get(&user.id).await?;
    Ok(Json(items.into()))
}

/// Replace the whole cart; an empty mapping clears it.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn replace(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    body: std::result::Result<Json<ReplaceCartBody>, JsonRejection>,
) -> Result<Json<CartResponse>> {
    let Json(body) = body?;
    state.carts().replace(&user.id, &body.cart_items).await?;
    Ok(Json(body.cart_items.into()))
}

/// Add one unit of a product.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn add_one(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    product: std::result::Result<Path<ProductId>, PathRejection>,
) -> Result<Json<CartResponse>> {
    let Path(product) = product?;
    let items = state.carts().add_one(&user.id, product).await?;
    let product_id = product.to_string();
    add_breadcrumb("cart", "Added item", Some(&[("product_id", product_id.as_str())]));
    Ok(Json(items.into()))
}

/// Set a product's quantity; zero or less removes it.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn set_quantity(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    product: std::result::Result<Path<ProductId>, PathRejection>,
    body: std::result::Result<Json<SetQuantityBody>, JsonRejection>,
) -> Result<Json<CartResponse>> {
    let Path(product) = product?;
    let Json(body) = body?;
    let items = state
        .carts()
        .set_quantity(&user.id, product, body.quantity)
        .await?;
    Ok(Json(items.into()))
}
