//! Orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rygstore_core::{
    AddressId, FulfillmentStatus, Money, OrderId, PaymentMethod, PaymentState, ProductId, UserId,
};

use super::address::AddressSnapshot;

/// One purchased line, priced when the order was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub shipping_address: AddressSnapshot,
    pub items: Vec<OrderLine>,
    /// Grand total (subtotal plus surcharge) fixed at creation.
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub paid: bool,
    pub status: FulfillmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_session_id: Option<String>,
    #[serde(skip)]
    pub payment_redirect_url: Option<String>,
    #[serde(skip)]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub const fn payment_state(&self) -> PaymentState {
        PaymentState::from_paid(self.paid)
    }
}

/// Input for creating an order. New orders are always unpaid and `Placed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub shipping_address: AddressSnapshot,
    pub items: Vec<OrderLine>,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub idempotency_key: Option<String>,
}

impl NewOrder {
    /// The order as it looks right after insertion.
    #[must_use]
    pub fn into_order(self, created_at: DateTime<Utc>) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            address_id: self.address_id,
            shipping_address: self.shipping_address,
            items: self.items,
            amount: self.amount,
            payment_method: self.payment_method,
            paid: false,
            status: FulfillmentStatus::Placed,
            payment_session_id: None,
            payment_redirect_url: None,
            idempotency_key: self.idempotency_key,
            created_at,
        }
    }
}

/// Filter for listing a buyer's orders.
///
/// The default lists what the buyer should see: every cash-on-delivery
/// order plus card orders that have been paid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub payment_method: Option<PaymentMethod>,
    pub paid: Option<bool>,
}

impl OrderFilter {
    /// Whether `order` passes this filter.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        match (self.payment_method, self.paid) {
            (None, None) => {
                order.payment_method == PaymentMethod::CashOnDelivery || order.paid
            }
            (method, paid) => {
                method.is_none_or(|m| m == order.payment_method) && paid.is_none_or(|p| p == order.paid)
            }
        }
    }
}
