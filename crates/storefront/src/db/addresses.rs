//! Shipping address repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use rygstore_core::{AddressId, UserId};

use super::RepositoryError;
use crate::models::{Address, NewAddress};

/// Storage for buyers' saved addresses.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Save a new address for `owner`.
    async fn create_address(
        &self,
        owner: &UserId,
        address: &NewAddress,
    ) -> Result<Address, RepositoryError>;

    /// The address with `id` if it belongs to `owner`.
    async fn find_address(
        &self,
        id: AddressId,
        owner: &UserId,
    ) -> Result<Option<Address>, RepositoryError>;

    /// All of `owner`'s addresses, oldest first.
    async fn list_addresses(&self, owner: &UserId) -> Result<Vec<Address>, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: AddressId,
    user_id: UserId,
    full_name: String,
    phone_number: String,
    pincode: String,
    area: String,
    city: String,
    state: String,
    created_at: DateTime<Utc>,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            full_name: row.full_name,
            phone_number: row.phone_number,
            pincode: row.pincode,
            area: row.area,
            city: row.city,
            state: row.state,
            created_at: row.created_at,
        }
    }
}

const ADDRESS_COLUMNS: &str =
    "id, user_id, full_name, phone_number, pincode, area, city, state, created_at";

/// `PostgreSQL` address repository.
#[derive(Debug, Clone)]
pub struct AddressRepository {
    pool: PgPool,
}

impl AddressRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AddressBook for AddressRepository {
    async fn create_address(
        &self,
        owner: &UserId,
        address: &NewAddress,
    ) -> Result<Address, RepositoryError> {
        let row: AddressRow = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.addresses
                (id, user_id, full_name, phone_number, pincode, area, city, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ADDRESS_COLUMNS}
            "
        ))
        .bind(AddressId::generate())
        .bind(owner)
        .bind(&address.full_name)
        .bind(&address.phone_number)
        .bind(&address.pincode)
        .bind(&address.area)
        .bind(&address.city)
        .bind(&address.state)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_address(
        &self,
        id: AddressId,
        owner: &UserId,
    ) -> Result<Option<Address>, RepositoryError> {
        let row: Option<AddressRow> = sqlx::query_as(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM storefront.addresses WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Address::from))
    }

    async fn list_addresses(&self, owner: &UserId) -> Result<Vec<Address>, RepositoryError> {
        let rows: Vec<AddressRow> = sqlx::query_as(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM storefront.addresses WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Address::from).collect())
    }
}
