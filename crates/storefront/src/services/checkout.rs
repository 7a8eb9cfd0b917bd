//! Checkout orchestration.
//!
//! ```text
//! validate items ─▶ resolve address ─▶ load catalog prices ─▶ price
//!     │
//!     ├─ cash: insert order + clear cart (one transaction) ─▶ Placed
//!     └─ card: insert unpaid order ─▶ create processor session
//!                 ├─ ok:   record session on order ─▶ Redirect
//!                 └─ fail: delete the order ─▶ PaymentSessionFailed
//! ```
//!
//! A retry carrying the same idempotency key returns the first attempt's
//! outcome instead of creating another order.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use rygstore_core::{
    AddressId, Money, OrderId, PaymentMethod, PriceBreakdown, PricedProduct, PricingError,
    ProductId, SurchargeRate, UserId, price_lines,
};

use super::ledger::{LedgerError, OrderLedger};
use crate::db::{AddressBook, ProductCatalog, RepositoryError};
use crate::models::{NewOrder, Order, OrderLine};
use crate::payments::{
    CheckoutSessionRequest, CorrelationMetadata, PaymentError, PaymentProcessor, SessionLineItem,
};

/// Name of the processor line carrying the surcharge.
const SURCHARGE_LINE_NAME: &str = "Tax";

/// One requested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CheckoutItem {
    pub product: ProductId,
    pub quantity: i64,
}

/// Everything needed to place an order.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub address_id: AddressId,
    pub items: Vec<CheckoutItem>,
    pub payment_method: PaymentMethod,
    pub idempotency_key: Option<String>,
}

/// Successful checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Cash order placed; nothing more to do.
    Placed { order_id: OrderId },
    /// Card order awaiting payment at `redirect_url`.
    Redirect {
        order_id: OrderId,
        redirect_url: String,
    },
}

impl CheckoutOutcome {
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        match self {
            Self::Placed { order_id } | Self::Redirect { order_id, .. } => *order_id,
        }
    }
}

/// Errors from checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("no items to check out")]
    EmptyCart,

    #[error("invalid quantity {quantity} for product {product}")]
    InvalidQuantity { product: ProductId, quantity: i64 },

    #[error("address {0} not found")]
    InvalidAddress(AddressId),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("order total is too large")]
    TotalOverflow,

    /// Another request with the same idempotency key has not finished.
    #[error("a checkout with this idempotency key is already in progress")]
    InProgress,

    /// The order was rolled back; nothing was charged.
    #[error("payment session could not be created: {0}")]
    PaymentSessionFailed(#[source] PaymentError),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<LedgerError> for CheckoutError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Repository(e) => Self::Repository(e),
            other => Self::Repository(RepositoryError::Conflict(other.to_string())),
        }
    }
}

impl From<PricingError> for CheckoutError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::ProductNotFound(id) => Self::ProductNotFound(id),
            PricingError::InvalidQuantity(product) => Self::InvalidQuantity {
                product,
                quantity: 0,
            },
            PricingError::Overflow => Self::TotalOverflow,
        }
    }
}

/// Where the processor sends the buyer afterwards.
#[derive(Debug, Clone)]
pub struct RedirectUrls {
    pub success: String,
    pub cancel: String,
}

/// Checkout orchestrator.
#[derive(Clone)]
pub struct CheckoutService {
    products: Arc<dyn ProductCatalog>,
    addresses: Arc<dyn AddressBook>,
    ledger: OrderLedger,
    processor: Arc<dyn PaymentProcessor>,
    surcharge_rate: SurchargeRate,
    currency: String,
    redirects: RedirectUrls,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        products: Arc<dyn ProductCatalog>,
        addresses: Arc<dyn AddressBook>,
        ledger: OrderLedger,
        processor: Arc<dyn PaymentProcessor>,
        surcharge_rate: SurchargeRate,
        currency: String,
        redirects: RedirectUrls,
    ) -> Self {
        Self {
            products,
            addresses,
            ledger,
            processor,
            surcharge_rate,
            currency,
            redirects,
        }
    }

    /// Place an order for `request.items`.
    ///
    /// # Errors
    ///
    /// - `EmptyCart` / `InvalidQuantity` for bad input; no order is created
    /// - `InvalidAddress` if the address is not the buyer's
    /// - `ProductNotFound` naming the first unknown product
    /// - `InProgress` if the idempotency key belongs to an unfinished attempt
    /// - `PaymentSessionFailed` after rolling back the card order
    /// - `Repository` on storage failure
    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            method = %request.payment_method,
            order_id = tracing::field::Empty
        )
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, CheckoutError> {
        let quantities = merge_items(&request.items)?;

        if let Some(key) = request.idempotency_key.as_deref()
            && let Some(existing) = self.ledger.find_by_idempotency_key(&request.user_id, key).await?
        {
            info!(order_id = %existing.id, "Replaying checkout for idempotency key");
            return replay(&existing);
        }

        let address = self
            .addresses
            .find_address(request.address_id, &request.user_id)
            .await?
            .ok_or(CheckoutError::InvalidAddress(request.address_id))?;

        let breakdown = self.price(&quantities).await?;

        let order = NewOrder {
            id: OrderId::generate(),
            user_id: request.user_id.clone(),
            address_id: address.id,
            shipping_address: address.snapshot(),
            items: breakdown
                .lines
                .iter()
                .map(|line| OrderLine {
                    product: line.product,
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            amount: breakdown.grand_total,
            payment_method: request.payment_method,
            idempotency_key: request.idempotency_key.clone(),
        };
        tracing::Span::current().record("order_id", tracing::field::display(order.id));

        match request.payment_method {
            PaymentMethod::CashOnDelivery => {
                let placed = self.ledger.place_and_clear_cart(&order).await;
                let placed = self.recover_duplicate(&request, placed).await?;
                Ok(CheckoutOutcome::Placed { order_id: placed.id })
            }
            PaymentMethod::Card => {
                let placed = self.ledger.place(&order).await;
                let placed = self.recover_duplicate(&request, placed).await?;
                if placed.id != order.id {
                    return replay(&placed);
                }
                self.start_payment(&placed, &breakdown).await
            }
        }
    }

    /// Load current catalog prices and price the lines.
    async fn price(
        &self,
        quantities: &[(ProductId, u32)],
    ) -> Result<PriceBreakdown, CheckoutError> {
        let ids: Vec<ProductId> = quantities.iter().map(|(p, _)| *p).collect();
        let catalog: HashMap<ProductId, PricedProduct> = self
            .products
            .find_by_ids(&ids)
            .await?
            .iter()
            .map(|p| (p.id, p.priced()))
            .collect();

        Ok(price_lines(
            quantities.iter().copied(),
            &catalog,
            self.surcharge_rate,
        )?)
    }

    /// A unique-key conflict on insert means a concurrent attempt with the
    /// same idempotency key won; hand back its order.
    async fn recover_duplicate(
        &self,
        request: &CheckoutRequest,
        placed: Result<Order, LedgerError>,
    ) -> Result<Order, CheckoutError> {
        match (placed, request.idempotency_key.as_deref()) {
            (Ok(order), _) => Ok(order),
            (Err(LedgerError::Repository(RepositoryError::Conflict(_))), Some(key)) => self
                .ledger
                .find_by_idempotency_key(&request.user_id, key)
                .await?
                .ok_or(CheckoutError::InProgress),
            (Err(e), _) => Err(e.into()),
        }
    }

    /// Create the hosted session for a freshly inserted card order, rolling
    /// the order back if that fails.
    async fn start_payment(
        &self,
        order: &Order,
        breakdown: &PriceBreakdown,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let session_request = self.session_request(order, breakdown)?;

        let session = match self.processor.create_checkout_session(&session_request).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "Payment session failed, rolling back order");
                self.roll_back(order).await;
                return Err(CheckoutError::PaymentSessionFailed(e));
            }
        };

        let Some(redirect_url) = session.url else {
            self.roll_back(order).await;
            return Err(CheckoutError::PaymentSessionFailed(PaymentError::Response(
                format!("session {} has no redirect url", session.id),
            )));
        };

        if let Err(e) = self
            .ledger
            .attach_payment_session(order.id, &session.id, &redirect_url)
            .await
        {
            self.roll_back(order).await;
            return Err(e.into());
        }

        info!(session_id = %session.id, "Payment session created");
        Ok(CheckoutOutcome::Redirect {
            order_id: order.id,
            redirect_url,
        })
    }

    fn session_request(
        &self,
        order: &Order,
        breakdown: &PriceBreakdown,
    ) -> Result<CheckoutSessionRequest, CheckoutError> {
        let minor = |m: Money| m.to_minor_units().ok_or(CheckoutError::TotalOverflow);

        let mut line_items = breakdown
            .lines
            .iter()
            .map(|line| {
                Ok(SessionLineItem {
                    name: line.name.clone(),
                    unit_amount: minor(line.unit_price)?,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>, CheckoutError>>()?;

        // Surcharge goes to the processor as its own line so the charge
        // equals the order amount
        if breakdown.surcharge > Money::ZERO {
            line_items.push(SessionLineItem {
                name: SURCHARGE_LINE_NAME.to_string(),
                unit_amount: minor(breakdown.surcharge)?,
                quantity: 1,
            });
        }

        Ok(CheckoutSessionRequest {
            line_items,
            currency: self.currency.clone(),
            success_url: self.redirects.success.clone(),
            cancel_url: self.redirects.cancel.clone(),
            metadata: CorrelationMetadata {
                order_id: order.id,
                user_id: order.user_id.clone(),
            },
            idempotency_key: order.id.to_string(),
        })
    }

    /// Delete an order whose payment session could not be set up.
    ///
    /// A failure here leaves an unpaid order holding the idempotency key, so
    /// it is reported for manual cleanup.
    async fn roll_back(&self, order: &Order) {
        let Err(e) = self.ledger.discard_unpaid(order.id).await else {
            return;
        };

        error!(
            order_id = %order.id,
            user_id = %order.user_id,
            error = %e,
            "Failed to roll back unpaid order"
        );

        let message = format!("unpaid order {} left behind after payment session failure: {e}", order.id);
        sentry::with_scope(
            |scope| {
                scope.set_tag("order_id", order.id);
                scope.set_user(Some(sentry::User {
                    id: Some(order.user_id.to_string()),
                    ..Default::default()
                }));
            },
            || sentry::capture_message(&message, sentry::Level::Error),
        );
    }
}

/// Validate quantities and merge repeated products.
///
/// Lines keep the position of each product's first appearance.
fn merge_items(items: &[CheckoutItem]) -> Result<Vec<(ProductId, u32)>, CheckoutError> {
    if items.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut merged: Vec<(ProductId, u32)> = Vec::with_capacity(items.len());
    for item in items {
        let invalid = CheckoutError::InvalidQuantity {
            product: item.product,
            quantity: item.quantity,
        };
        let quantity = u32::try_from(item.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or(invalid)?;
        match merged.iter_mut().find(|(product, _)| *product == item.product) {
            Some((_, total)) => {
                *total = total
                    .checked_add(quantity)
                    .ok_or(CheckoutError::TotalOverflow)?;
            }
            None => merged.push((item.product, quantity)),
        }
    }
    Ok(merged)
}

/// Outcome of an earlier attempt with the same idempotency key.
fn replay(order: &Order) -> Result<CheckoutOutcome, CheckoutError> {
    match order.payment_method {
        PaymentMethod::CashOnDelivery => Ok(CheckoutOutcome::Placed { order_id: order.id }),
        PaymentMethod::Card => order
            .payment_redirect_url
            .clone()
            .map(|redirect_url| CheckoutOutcome::Redirect {
                order_id: order.id,
                redirect_url,
            })
            .ok_or(CheckoutError::InProgress),
    }
}
