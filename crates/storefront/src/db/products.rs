//! Product catalog repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use rygstore_core::{Money, ProductId};

use super::RepositoryError;
use crate::models::{NewProduct, Product};

/// Read access to the catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Current catalog entries for `ids`. Unknown IDs are simply absent.
    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.find_by_ids(&[id]).await?.into_iter().next())
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    category: String,
    price: i64,
    offer_price: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let money = |value: i64, field: &str| {
            Money::new(value).ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "negative {field} {value} for product {}",
                    row.id
                ))
            })
        };

        Ok(Self {
            price: money(row.price, "price")?,
            offer_price: money(row.offer_price, "offer_price")?,
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            created_at: row.created_at,
        })
    }
}

/// `PostgreSQL` product repository.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a product or overwrite the existing one with the same ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row: ProductRow = sqlx::query_as(
            r"
            INSERT INTO storefront.products (id, name, description, category, price, offer_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                category = EXCLUDED.category,
                price = EXCLUDED.price,
                offer_price = EXCLUDED.offer_price
            RETURNING id, name, description, category, price, offer_price, created_at
            ",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price.amount())
        .bind(product.offer_price.amount())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }
}

#[async_trait]
impl ProductCatalog for ProductRepository {
    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(ProductId::as_uuid).collect();

        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, name, description, category, price, offer_price, created_at
            FROM storefront.products
            WHERE id = ANY($1)
            ",
        )
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }
}
