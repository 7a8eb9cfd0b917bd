//! Address book handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::{Address, NewAddress};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AddressListResponse {
    pub success: bool,
    pub addresses: Vec<Address>,
}

#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub success: bool,
    pub address: Address,
}

/// The buyer's saved addresses, oldest first.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<AddressListResponse>> {
    let addresses = state.addresses().list_addresses(&user.id).await?;
    Ok(Json(AddressListResponse {
        success: true,
        addresses,
    }))
}

/// Save a new address.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    body: std::result::Result<Json<NewAddress>, JsonRejection>,
) -> Result<Json<AddressResponse>> {
    let Json(body) = body?;
    let address = body.normalized()?;
    let address = state.addresses().create_address(&user.id, &address).await?;
    tracing::info!(address_id = %address.id, "Address added");
    Ok(Json(AddressResponse {
        success: true,
        address,
    }))
}
