//! Database operations for storefront `PostgreSQL`.
//!
//! ## Tables (schema `storefront`)
//!
//! - `users` - One row per buyer, holding the cart as JSONB
//! - `products` - Catalog (seeded via the CLI)
//! - `addresses` - Saved shipping addresses
//! - `orders` - Placed orders with the paid flag and processor session
//!
//! Sessions live in `tower_sessions.session`.
//!
//! Each table sits behind an `async_trait` store so services can run against
//! the in-memory stores in [`crate::testing`].
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p rygstore-cli -- migrate
//! ```

pub mod addresses;
pub mod carts;
pub mod orders;
pub mod products;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use addresses::{AddressBook, AddressRepository};
pub use carts::{CartEdit, CartRepository, CartStore};
pub use orders::{OrderRepository, OrderStore, PaymentSettlement, UnpaidRemoval};
pub use products::{ProductCatalog, ProductRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in database is invalid or corrupted.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested record was not found.
    #[error("not found")]
    NotFound,

    /// Operation conflicts with existing data (e.g., unique constraint).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            )
        )
    }

    /// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_unique_violation(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(RepositoryError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!RepositoryError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!RepositoryError::NotFound.is_transient());
        assert!(!RepositoryError::Conflict("x".to_string()).is_transient());
    }
}
