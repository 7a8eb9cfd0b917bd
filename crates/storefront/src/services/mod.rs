//! Business logic services for storefront.
//!
//! # Services
//!
//! - [`cart`] - Add-one / set-quantity / replace on top of the cart store
//! - [`ledger`] - The only code that changes an order's paid flag
//! - [`checkout`] - Turns a cart into an order and, for card payments, a
//!   hosted payment session
//! - [`reconciler`] - Applies verified payment notifications to orders

pub mod cart;
pub mod checkout;
pub mod ledger;
pub mod reconciler;

pub use cart::CartService;
pub use checkout::{
    CheckoutError, CheckoutItem, CheckoutOutcome, CheckoutRequest, CheckoutService, RedirectUrls,
};
pub use ledger::{Cancellation, Confirmation, LedgerError, OrderLedger};
pub use reconciler::{Acknowledgement, PaymentReconciler, ReconcileError, ReconcileOutcome};
