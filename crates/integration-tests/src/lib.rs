//! Integration tests for RygStore.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p rygstore-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout` - Authentication, cash and card checkout, idempotent retries
//! - `webhooks` - Signature rejection, duplicate and contradictory deliveries
//! - `cart` - Cart edits and order listing through the HTTP surface
//!
//! Every test drives the real router with `tower::ServiceExt::oneshot`
//! over the in-memory stores from `rygstore_storefront::testing`, so no
//! database or network is needed.
