//! RygStore Core - Shared types library.
//!
//! This crate provides common types used across all RygStore components:
//! - `storefront` - Cart, checkout, and payment reconciliation service
//! - `cli` - Command-line tools for migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, carts, statuses, and the order
//!   payment state machine
//! - [`pricing`] - Line totals, surcharge, and grand total computation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod pricing;
pub mod types;

pub use pricing::{PriceBreakdown, PricedProduct, PricingError, SurchargeRate, price_lines};
pub use types::*;
