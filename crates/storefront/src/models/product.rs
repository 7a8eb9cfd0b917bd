//! Catalog products.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rygstore_core::{Money, PricedProduct, ProductId};

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub category: String,
    /// List price, shown struck through when an offer applies.
    pub price: Money,
    /// Price actually charged.
    pub offer_price: Money,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Pricing view of this product, charging the offer price.
    #[must_use]
    pub fn priced(&self) -> PricedProduct {
        PricedProduct {
            id: self.id,
            name: self.name.clone(),
            unit_price: self.offer_price,
        }
    }
}

/// Input for inserting or updating a catalog product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub price: Money,
    pub offer_price: Money,
}
