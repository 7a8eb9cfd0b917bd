//! Order repository.
//!
//! The `paid` column only ever moves from `false` to `true`, and only through
//! [`OrderStore::settle_payment`], whose conditional update makes duplicate
//! confirmations harmless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use rygstore_core::{AddressId, Money, OrderId, PaymentMethod, UserId};

use super::RepositoryError;
use crate::models::{AddressSnapshot, NewOrder, Order, OrderFilter, OrderLine};

/// Result of settling a card payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentSettlement {
    /// The order flipped to paid and the buyer's cart was cleared.
    Settled,
    /// The order was already paid; nothing changed.
    AlreadyPaid,
    /// No card order with this ID exists.
    NotFound,
}

/// Result of removing an unpaid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpaidRemoval {
    Deleted,
    /// The order is paid and was left untouched.
    AlreadyPaid,
    NotFound,
}

/// Storage for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an unpaid order.
    ///
    /// Returns `RepositoryError::Conflict` if the buyer already has an order
    /// with the same idempotency key.
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Insert an unpaid order and empty the buyer's cart in one transaction.
    async fn create_order_and_clear_cart(&self, order: &NewOrder)
        -> Result<Order, RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn find_by_idempotency_key(
        &self,
        user: &UserId,
        key: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Record the processor session created for an order.
    async fn attach_payment_session(
        &self,
        id: OrderId,
        session_id: &str,
        redirect_url: &str,
    ) -> Result<(), RepositoryError>;

    /// Mark an unpaid card order paid and clear its owner's cart, atomically.
    ///
    /// The cart is cleared only on the call that performs the flip.
    async fn settle_payment(&self, id: OrderId) -> Result<PaymentSettlement, RepositoryError>;

    /// Delete an order only while it is unpaid.
    async fn delete_unpaid(&self, id: OrderId) -> Result<UnpaidRemoval, RepositoryError>;

    /// The buyer's orders matching `filter`, newest first.
    async fn list_orders(
        &self,
        user: &UserId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    address_id: AddressId,
    shipping_address: Json<AddressSnapshot>,
    items: Json<Vec<OrderLine>>,
    amount: i64,
    payment_method: String,
    paid: bool,
    status: String,
    payment_session_id: Option<String>,
    payment_redirect_url: Option<String>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let corrupt =
            |what: String| RepositoryError::DataCorruption(format!("order {}: {what}", row.id));

        let amount = Money::new(row.amount)
            .ok_or_else(|| corrupt(format!("negative amount {}", row.amount)))?;
        let payment_method = row.payment_method.parse().map_err(corrupt)?;
        let status = row.status.parse().map_err(corrupt)?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            address_id: row.address_id,
            shipping_address: row.shipping_address.0,
            items: row.items.0,
            amount,
            payment_method,
            paid: row.paid,
            status,
            payment_session_id: row.payment_session_id,
            payment_redirect_url: row.payment_redirect_url,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, user_id, address_id, shipping_address, items, amount, \
     payment_method, paid, status, payment_session_id, payment_redirect_url, \
     idempotency_key, created_at";

/// `PostgreSQL` order repository.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        order: &NewOrder,
    ) -> Result<Order, RepositoryError> {
        let row: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.orders
                (id, user_id, address_id, shipping_address, items, amount,
                 payment_method, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.id)
        .bind(&order.user_id)
        .bind(order.address_id)
        .bind(Json(&order.shipping_address))
        .bind(Json(&order.items))
        .bind(order.amount.amount())
        .bind(order.payment_method.as_str())
        .bind(order.idempotency_key.as_deref())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| RepositoryError::from_unique_violation(e, "order with this idempotency key"))?;

        row.try_into()
    }

    async fn clear_cart(
        tx: &mut Transaction<'_, Postgres>,
        user: &UserId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE storefront.users SET cart = '{}'::jsonb, updated_at = NOW() WHERE id = $1",
        )
        .bind(user)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let created = Self::insert(&mut tx, order).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn create_order_and_clear_cart(
        &self,
        order: &NewOrder,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let created = Self::insert(&mut tx, order).await?;
        Self::clear_cart(&mut tx, &order.user_id).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        user: &UserId,
        key: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE user_id = $1 AND idempotency_key = $2"
        ))
        .bind(user)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn attach_payment_session(
        &self,
        id: OrderId,
        session_id: &str,
        redirect_url: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET payment_session_id = $2, payment_redirect_url = $3
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(session_id)
        .bind(redirect_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn settle_payment(&self, id: OrderId) -> Result<PaymentSettlement, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Concurrent settlements block on the row lock; the loser sees paid = TRUE
        let owner: Option<UserId> = sqlx::query_scalar(
            r"
            UPDATE storefront.orders
            SET paid = TRUE, paid_at = NOW()
            WHERE id = $1 AND paid = FALSE AND payment_method = $2
            RETURNING user_id
            ",
        )
        .bind(id)
        .bind(PaymentMethod::Card.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = if let Some(owner) = owner {
            Self::clear_cart(&mut tx, &owner).await?;
            PaymentSettlement::Settled
        } else {
            let paid: Option<bool> = sqlx::query_scalar(
                "SELECT paid FROM storefront.orders WHERE id = $1 AND payment_method = $2",
            )
            .bind(id)
            .bind(PaymentMethod::Card.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            match paid {
                Some(true) => PaymentSettlement::AlreadyPaid,
                Some(false) | None => PaymentSettlement::NotFound,
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete_unpaid(&self, id: OrderId) -> Result<UnpaidRemoval, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.orders WHERE id = $1 AND paid = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(UnpaidRemoval::Deleted);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM storefront.orders WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(if exists {
            UnpaidRemoval::AlreadyPaid
        } else {
            UnpaidRemoval::NotFound
        })
    }

    async fn list_orders(
        &self,
        user: &UserId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, RepositoryError> {
        // Without an explicit filter: cash orders plus paid card orders
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM storefront.orders
            WHERE user_id = $1
              AND CASE
                    WHEN $2::text IS NULL AND $3::boolean IS NULL
                        THEN payment_method = 'cash_on_delivery' OR paid
                    ELSE ($2::text IS NULL OR payment_method = $2)
                     AND ($3::boolean IS NULL OR paid = $3)
                  END
            ORDER BY created_at DESC
            "
        ))
        .bind(user)
        .bind(filter.payment_method.map(|m| m.as_str()))
        .bind(filter.paid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}
