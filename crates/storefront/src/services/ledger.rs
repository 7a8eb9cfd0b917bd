//! Order ledger.
//!
//! Every paid-flag change goes through here. The ledger reads the order,
//! asks [`rygstore_core::decide`] what the signal means for it, and applies
//! the result with the store's conditional updates, so a concurrent delivery
//! that slips in between the read and the write still lands on the same
//! final state.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use rygstore_core::{ConflictReason, OrderId, PaymentSignal, Transition, UserId, decide};

use crate::db::{OrderStore, PaymentSettlement, RepositoryError, UnpaidRemoval};
use crate::models::{NewOrder, Order, OrderFilter};

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// The signal contradicts the order's recorded state.
    #[error("order {order_id}: {reason}")]
    Conflict {
        order_id: OrderId,
        reason: ConflictReason,
    },

    /// The caller's user does not own the order.
    #[error("order {order_id} is not owned by {user_id}")]
    OwnerMismatch { order_id: OrderId, user_id: UserId },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of a payment confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The order is now paid and the buyer's cart was cleared.
    Settled,
    /// The order was already paid; nothing changed.
    AlreadyPaid,
}

/// Result of a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    Deleted,
    /// The order no longer exists.
    AlreadyGone,
}

/// Order creation, lookup, and the paid/deleted state machine.
#[derive(Clone)]
pub struct OrderLedger {
    orders: Arc<dyn OrderStore>,
}

impl OrderLedger {
    #[must_use]
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    /// Record a new unpaid order.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Repository` on storage failure, including a
    /// `Conflict` for a reused idempotency key.
    #[instrument(skip(self, order), fields(order_id = %order.id, user_id = %order.user_id))]
    pub async fn place(&self, order: &NewOrder) -> Result<Order, LedgerError> {
        let order = self.orders.create_order(order).await?;
        info!(amount = %order.amount, method = %order.payment_method, "Order placed");
        Ok(order)
    }

    /// Record a new order and empty the buyer's cart atomically.
    ///
    /// # Errors
    ///
    /// See [`place`](Self::place).
    #[instrument(skip(self, order), fields(order_id = %order.id, user_id = %order.user_id))]
    pub async fn place_and_clear_cart(&self, order: &NewOrder) -> Result<Order, LedgerError> {
        let order = self.orders.create_order_and_clear_cart(order).await?;
        info!(amount = %order.amount, method = %order.payment_method, "Order placed, cart cleared");
        Ok(order)
    }

    /// # Errors
    ///
    /// Returns `LedgerError::Repository` on storage failure.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, LedgerError> {
        Ok(self.orders.get_order(id).await?)
    }

    /// # Errors
    ///
    /// Returns `LedgerError::Repository` on storage failure.
    pub async fn find_by_idempotency_key(
        &self,
        user: &UserId,
        key: &str,
    ) -> Result<Option<Order>, LedgerError> {
        Ok(self.orders.find_by_idempotency_key(user, key).await?)
    }

    /// Remember the processor session for an order.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Repository` on storage failure.
    #[instrument(skip(self, redirect_url))]
    pub async fn attach_payment_session(
        &self,
        id: OrderId,
        session_id: &str,
        redirect_url: &str,
    ) -> Result<(), LedgerError> {
        Ok(self
            .orders
            .attach_payment_session(id, session_id, redirect_url)
            .await?)
    }

    /// Remove an order whose payment session could not be created.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Repository` on storage failure.
    #[instrument(skip(self))]
    pub async fn discard_unpaid(&self, id: OrderId) -> Result<(), LedgerError> {
        match self.orders.delete_unpaid(id).await? {
            UnpaidRemoval::Deleted | UnpaidRemoval::NotFound => Ok(()),
            UnpaidRemoval::AlreadyPaid => Err(LedgerError::Conflict {
                order_id: id,
                reason: ConflictReason::CancelAfterPaid,
            }),
        }
    }

    /// Apply a payment confirmation for `owner`'s order.
    ///
    /// Repeated confirmations return `AlreadyPaid` and leave the cart alone.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the order does not exist
    /// - `OwnerMismatch` if `owner` is not the buyer
    /// - `Conflict` for a non-card order
    #[instrument(skip(self), fields(order_id = %id, user_id = %owner))]
    pub async fn confirm_payment(
        &self,
        id: OrderId,
        owner: &UserId,
    ) -> Result<Confirmation, LedgerError> {
        let order = self.owned_order(id, owner).await?.ok_or(LedgerError::NotFound(id))?;

        match decide(order.payment_method, order.payment_state(), PaymentSignal::Confirmed) {
            Transition::MarkPaid => match self.orders.settle_payment(id).await? {
                PaymentSettlement::Settled => {
                    info!("Order marked paid");
                    Ok(Confirmation::Settled)
                }
                PaymentSettlement::AlreadyPaid => Ok(Confirmation::AlreadyPaid),
                PaymentSettlement::NotFound => Err(LedgerError::NotFound(id)),
            },
            Transition::AlreadyPaid => Ok(Confirmation::AlreadyPaid),
            Transition::Conflict(reason) => Err(LedgerError::Conflict { order_id: id, reason }),
            Transition::Delete => Err(LedgerError::Conflict {
                order_id: id,
                reason: ConflictReason::NotCardOrder,
            }),
        }
    }

    /// Apply a cancellation (payment canceled, session expired, or buyer
    /// request) to `owner`'s order.
    ///
    /// # Errors
    ///
    /// - `OwnerMismatch` if `owner` is not the buyer
    /// - `Conflict` if the order is paid or is not a card order
    #[instrument(skip(self), fields(order_id = %id, user_id = %owner))]
    pub async fn cancel_unpaid(
        &self,
        id: OrderId,
        owner: &UserId,
    ) -> Result<Cancellation, LedgerError> {
        let Some(order) = self.owned_order(id, owner).await? else {
            return Ok(Cancellation::AlreadyGone);
        };

        let paid_conflict = LedgerError::Conflict {
            order_id: id,
            reason: ConflictReason::CancelAfterPaid,
        };

        match decide(order.payment_method, order.payment_state(), PaymentSignal::Cancelled) {
            Transition::Delete => match self.orders.delete_unpaid(id).await? {
                UnpaidRemoval::Deleted => {
                    info!("Unpaid order deleted");
                    Ok(Cancellation::Deleted)
                }
                UnpaidRemoval::NotFound => Ok(Cancellation::AlreadyGone),
                UnpaidRemoval::AlreadyPaid => {
                    warn!("Order was paid while being cancelled");
                    Err(paid_conflict)
                }
            },
            Transition::Conflict(reason) => Err(LedgerError::Conflict { order_id: id, reason }),
            Transition::MarkPaid | Transition::AlreadyPaid => Err(paid_conflict),
        }
    }

    /// The buyer's orders.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Repository` on storage failure.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn list_for_buyer(
        &self,
        user: &UserId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, LedgerError> {
        Ok(self.orders.list_orders(user, filter).await?)
    }

    async fn owned_order(&self, id: OrderId, owner: &UserId) -> Result<Option<Order>, LedgerError> {
        match self.orders.get_order(id).await? {
            Some(order) if &order.user_id != owner => Err(LedgerError::OwnerMismatch {
                order_id: id,
                user_id: owner.clone(),
            }),
            other => Ok(other),
        }
    }
}
