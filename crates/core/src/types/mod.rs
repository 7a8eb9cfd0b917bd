//! Core types for RygStore.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod money;
pub mod order;
pub mod status;

pub use cart::CartItems;
pub use id::*;
pub use money::{MINOR_UNITS_PER_UNIT, Money, NegativeAmount};
pub use order::{ConflictReason, PaymentSignal, PaymentState, Transition, decide};
pub use status::*;
