//! RygStore Storefront library.
//!
//! Cart, checkout, and payment reconciliation for the storefront. The binary
//! in `main.rs` wires these pieces to `PostgreSQL` and the payment
//! processor; tests wire them to the in-memory doubles in [`testing`].
//!
//! # Architecture
//!
//! - [`db`] - Store traits and their `PostgreSQL` repositories
//! - [`payments`] - Processor client, webhook signatures, event parsing
//! - [`services`] - Cart, order ledger, checkout, reconciliation
//! - [`routes`] - JSON handlers over the services
//! - [`state`] - Wiring shared by every handler

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use axum::{Router, extract::Request};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use crate::state::AppState;

/// Build the full application router.
///
/// Layers, innermost first: sessions, request ID, HTTP tracing, then the
/// Sentry hub and transaction layers so every request is covered.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = tracing::field::Empty,
            user_id = tracing::field::Empty,
        )
    });

    routes::routes()
        .layer(session_layer)
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(trace_layer)
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
