//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                     - Liveness
//! GET    /health/ready               - Database readiness
//!
//! # Cart (requires auth)
//! GET    /cart                       - Current cart
//! PUT    /cart                       - Replace the whole cart
//! POST   /cart/items/{product_id}    - Add one unit
//! PATCH  /cart/items/{product_id}    - Set quantity (0 removes)
//!
//! # Checkout (requires auth)
//! POST   /checkout                   - Place an order; optional Idempotency-Key
//!
//! # Orders (requires auth)
//! GET    /orders                     - Buyer's orders (?paymentMethod=&paid=)
//! DELETE /orders/{id}                - Cancel an unpaid card order
//!
//! # Addresses (requires auth)
//! GET    /addresses                  - Address book
//! POST   /addresses                  - Add an address
//!
//! # Webhooks (signature-authenticated, no session)
//! POST   /webhooks/payment           - Payment processor notifications
//! ```

pub mod addresses;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod webhooks;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).put(cart::replace))
        .route(
            "/items/{product_id}",
            post(cart::add_one).patch(cart::set_quantity),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list))
        .route("/{id}", delete(orders::cancel))
}

/// Create the address routes router.
pub fn address_routes() -> Router<AppState> {
    Router::new().route("/", get(addresses::list).post(addresses::create))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/cart", cart_routes())
        .route("/checkout", post(checkout::checkout))
        .nest("/orders", order_routes())
        .nest("/addresses", address_routes())
        .route("/webhooks/payment", post(webhooks::payment))
}
