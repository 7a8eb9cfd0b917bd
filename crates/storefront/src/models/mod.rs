//! Domain models for storefront.

pub mod address;
pub mod order;
pub mod product;
pub mod session;

pub use address::{Address, AddressSnapshot, AddressValidationError, NewAddress};
pub use order::{NewOrder, Order, OrderFilter, OrderLine};
pub use product::{NewProduct, Product};
pub use session::{CurrentUser, keys as session_keys};
