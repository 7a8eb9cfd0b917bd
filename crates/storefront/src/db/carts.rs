//! Cart persistence.
//!
//! The cart is a JSONB column on the buyer's row. Rows are created lazily on
//! the first write.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use rygstore_core::{CartItems, UserId};

use super::RepositoryError;

/// An in-place edit applied to a cart under the row lock.
pub type CartEdit<'a> = &'a (dyn Fn(&mut CartItems) + Send + Sync);

/// Storage for per-buyer carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The buyer's cart; empty when the buyer has no row yet.
    async fn get(&self, user: &UserId) -> Result<CartItems, RepositoryError>;

    /// Replace the buyer's cart wholesale.
    async fn set(&self, user: &UserId, items: &CartItems) -> Result<(), RepositoryError>;

    /// Read-modify-write the buyer's cart atomically and return the result.
    ///
    /// Concurrent edits for the same buyer are serialized; none is lost.
    async fn modify(&self, user: &UserId, edit: CartEdit<'_>) -> Result<CartItems, RepositoryError>;
}

/// `PostgreSQL` cart store.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: PgPool,
}

impl CartRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for CartRepository {
    async fn get(&self, user: &UserId) -> Result<CartItems, RepositoryError> {
        let cart: Option<Json<CartItems>> =
            sqlx::query_scalar("SELECT cart FROM storefront.users WHERE id = $1")
                .bind(user)
                .fetch_optional(&self.pool)
                .await?;

        Ok(cart.map(|Json(items)| items).unwrap_or_default())
    }

    async fn set(&self, user: &UserId, items: &CartItems) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.users (id, cart)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET cart = EXCLUDED.cart, updated_at = NOW()
            ",
        )
        .bind(user)
        .bind(Json(items))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn modify(&self, user: &UserId, edit: CartEdit<'_>) -> Result<CartItems, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO storefront.users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user)
            .execute(&mut *tx)
            .await?;

        let Json(mut items): Json<CartItems> =
            sqlx::query_scalar("SELECT cart FROM storefront.users WHERE id = $1 FOR UPDATE")
                .bind(user)
                .fetch_one(&mut *tx)
                .await?;

        edit(&mut items);

        sqlx::query("UPDATE storefront.users SET cart = $2, updated_at = NOW() WHERE id = $1")
            .bind(user)
            .bind(Json(&items))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(items)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use rygstore_core::ProductId;

    use super::*;

    #[sqlx::test(migrations = "migrations")]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_concurrent_modify_loses_no_increment(pool: PgPool) {
        let carts = Arc::new(CartRepository::new(pool));
        let user = UserId::new("user_1");
        let product = ProductId::generate();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let carts = Arc::clone(&carts);
                let user = user.clone();
                tokio::spawn(async move {
                    carts
                        .modify(&user, &move |items: &mut CartItems| items.add_one(product))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(carts.get(&user).await.unwrap().quantity(&product), 16);
    }

    #[sqlx::test(migrations = "migrations")]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_missing_row_reads_as_empty_cart(pool: PgPool) {
        let carts = CartRepository::new(pool);
        let user = UserId::new("user_1");
        assert!(carts.get(&user).await.unwrap().is_empty());

        let product = ProductId::generate();
        carts.set(&user, &CartItems::from_quantities([(product, 2)])).await.unwrap();
        let items = carts
            .modify(&user, &move |items: &mut CartItems| items.set_quantity(product, 0))
            .await
            .unwrap();
        assert!(items.is_empty());
        assert!(carts.get(&user).await.unwrap().is_empty());
    }
}
