//! Per-user cart contents.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::id::ProductId;

/// Mapping of product to positive quantity.
///
/// A quantity of zero is never stored: setting an entry to zero (or
/// deserializing a non-positive quantity) removes it. Ordered by product ID
/// so serialized carts are stable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct CartItems(BTreeMap<ProductId, u32>);

impl CartItems {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a cart from `(product, quantity)` pairs, dropping non-positive quantities.
    ///
    /// Later pairs for the same product overwrite earlier ones.
    pub fn from_quantities<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (ProductId, i64)>,
    {
        let mut cart = Self::new();
        for (product, quantity) in pairs {
            cart.set_quantity(product, quantity);
        }
        cart
    }

    /// Increment a product's quantity by one, inserting it at 1 if absent.
    pub fn add_one(&mut self, product: ProductId) {
        let entry = self.0.entry(product).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    /// Set a product's quantity; `quantity <= 0` removes the entry.
    pub fn set_quantity(&mut self, product: ProductId, quantity: i64) {
        match u32::try_from(quantity) {
            Ok(q) if q > 0 => {
                self.0.insert(product, q);
            }
            Ok(_) => {
                self.0.remove(&product);
            }
            Err(_) if quantity > 0 => {
                self.0.insert(product, u32::MAX);
            }
            Err(_) => {
                self.0.remove(&product);
            }
        }
    }

    /// Quantity of a product (0 when absent).
    #[must_use]
    pub fn quantity(&self, product: &ProductId) -> u32 {
        self.0.get(product).copied().unwrap_or(0)
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.0.values().map(|q| u64::from(*q)).sum()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate `(product, quantity)` pairs in product order.
    pub fn iter(&self) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.0.iter().map(|(p, q)| (*p, *q))
    }
}

impl<'de> Deserialize<'de> for CartItems {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<ProductId, i64>::deserialize(deserializer)?;
        Ok(Self::from_quantities(raw))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_one_increments() {
        let a = ProductId::generate();
        let mut cart = CartItems::new();
        cart.add_one(a);
        cart.add_one(a);
        assert_eq!(cart.quantity(&a), 2);
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn test_set_zero_removes_entry() {
        let a = ProductId::generate();
        let b = ProductId::generate();
        let mut cart = CartItems::from_quantities([(a, 2), (b, 1)]);

        cart.set_quantity(b, 0);

        assert_eq!(cart.quantity(&a), 2);
        assert_eq!(cart.quantity(&b), 0);
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn test_negative_quantity_removes_entry() {
        let a = ProductId::generate();
        let mut cart = CartItems::from_quantities([(a, 3)]);
        cart.set_quantity(a, -4);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_deserialize_drops_non_positive() {
        let a = ProductId::generate();
        let b = ProductId::generate();
        let json = format!(r#"{{"{a}": 2, "{b}": 0}}"#);

        let cart: CartItems = serde_json::from_str(&json).unwrap();

        assert_eq!(cart.quantity(&a), 2);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.total_quantity(), 2);
    }

    #[test]
    fn test_empty_cart_serializes_to_empty_object() {
        assert_eq!(serde_json::to_string(&CartItems::new()).unwrap(), "{}");
    }
}
