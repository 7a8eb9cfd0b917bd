//! Cart operations.

use std::sync::Arc;

use tracing::instrument;

use rygstore_core::{CartItems, ProductId, UserId};

use crate::db::{CartStore, RepositoryError};

/// Cart edits for a signed-in buyer.
///
/// Increment and set-quantity are read-modify-write cycles run through
/// [`CartStore::modify`], so concurrent edits from two tabs both land.
#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartStore>,
}

impl CartService {
    #[must_use]
    pub fn new(carts: Arc<dyn CartStore>) -> Self {
        Self { carts }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if the cart cannot be read.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn get(&self, user: &UserId) -> Result<CartItems, RepositoryError> {
        self.carts.get(user).await
    }

    /// Replace the whole cart. An empty cart clears it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the cart cannot be persisted.
    #[instrument(skip(self, items), fields(user_id = %user, lines = items.len()))]
    pub async fn replace(&self, user: &UserId, items: &CartItems) -> Result<(), RepositoryError> {
        self.carts.set(user, items).await
    }

    /// Add one unit of `product`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the cart cannot be persisted.
    #[instrument(skip(self), fields(user_id = %user, product_id = %product))]
    pub async fn add_one(
        &self,
        user: &UserId,
        product: ProductId,
    ) -> Result<CartItems, RepositoryError> {
        self.carts
            .modify(user, &move |items: &mut CartItems| items.add_one(product))
            .await
    }

    /// Set `product` to exactly `quantity` units; zero or less removes it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the cart cannot be persisted.
    #[instrument(skip(self), fields(user_id = %user, product_id = %product))]
    pub async fn set_quantity(
        &self,
        user: &UserId,
        product: ProductId,
        quantity: i64,
    ) -> Result<CartItems, RepositoryError> {
        self.carts
            .modify(user, &move |items: &mut CartItems| {
                items.set_quantity(product, quantity);
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    fn service() -> (CartService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CartService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_add_then_set_to_zero() {
        let (carts, _) = service();
        let user = UserId::new("user_1");
        let a = ProductId::generate();
        let b = ProductId::generate();

        carts.add_one(&user, a).await.unwrap();
        carts.add_one(&user, a).await.unwrap();
        carts.add_one(&user, b).await.unwrap();
        let cart = carts.set_quantity(&user, b, 0).await.unwrap();

        assert_eq!(cart, CartItems::from_quantities([(a, 2)]));
        assert_eq!(carts.get(&user).await.unwrap(), cart);
    }

    #[tokio::test]
    async fn test_replace_with_empty_clears() {
        let (carts, _) = service();
        let user = UserId::new("user_1");
        carts.add_one(&user, ProductId::generate()).await.unwrap();

        carts.replace(&user, &CartItems::new()).await.unwrap();

        assert!(carts.get(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_surfaces_error() {
        let (carts, store) = service();
        store.fail_next_write();

        let result = carts.add_one(&UserId::new("user_1"), ProductId::generate()).await;

        assert!(result.is_err());
        assert!(carts.get(&UserId::new("user_1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let (carts, _) = service();
        let user = UserId::new("user_1");
        let a = ProductId::generate();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let carts = carts.clone();
                let user = user.clone();
                tokio::spawn(async move { carts.add_one(&user, a).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(carts.get(&user).await.unwrap().quantity(&a), 20);
    }
}
