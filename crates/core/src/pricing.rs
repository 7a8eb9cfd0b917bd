//! Cart pricing: line totals, subtotal, flat surcharge, grand total.
//!
//! Pure functions only. Callers load the catalog prices first so that the
//! charged amount reflects prices at order-creation time.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Money, ProductId};

/// Errors from price computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// A line references a product the catalog does not know.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// A line has a zero quantity.
    #[error("invalid quantity for product {0}")]
    InvalidQuantity(ProductId),

    /// The total does not fit in the amount type.
    #[error("order total overflows")]
    Overflow,
}

/// Invalid surcharge rate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("surcharge rate must be in [0, 1), got {0}")]
pub struct InvalidSurchargeRate(pub Decimal);

/// Fraction of the subtotal added as surcharge (tax), floored to whole units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurchargeRate(Decimal);

impl SurchargeRate {
    /// Validate and wrap a rate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSurchargeRate` if the rate is negative or at least 1.
    pub fn new(rate: Decimal) -> Result<Self, InvalidSurchargeRate> {
        if rate.is_sign_negative() || rate >= Decimal::ONE {
            return Err(InvalidSurchargeRate(rate));
        }
        Ok(Self(rate))
    }

    /// The rate as a decimal fraction.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// `floor(subtotal × rate)`.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::Overflow` if the product cannot be represented.
    pub fn surcharge_for(&self, subtotal: Money) -> Result<Money, PricingError> {
        let raw = Decimal::from(subtotal.amount())
            .checked_mul(self.0)
            .ok_or(PricingError::Overflow)?
            .floor();
        raw.to_i64()
            .and_then(Money::new)
            .ok_or(PricingError::Overflow)
    }
}

impl Default for SurchargeRate {
    /// Two percent.
    fn default() -> Self {
        Self(Decimal::new(2, 2))
    }
}

/// Catalog data needed to price a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedProduct {
    pub id: ProductId,
    pub name: String,
    /// Price actually charged per unit (the offer price).
    pub unit_price: Money,
}

/// One priced line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotal {
    pub product: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// Full price breakdown for a set of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub lines: Vec<LineTotal>,
    pub subtotal: Money,
    pub surcharge: Money,
    pub grand_total: Money,
}

/// Price `(product, quantity)` lines against `catalog`.
///
/// Lines keep their input order. Every product must be present in the
/// catalog; a missing one fails the whole computation rather than being
/// skipped.
///
/// # Errors
///
/// - `ProductNotFound` naming the first unknown product
/// - `InvalidQuantity` for a zero quantity
/// - `Overflow` if any sum or product overflows
pub fn price_lines<I>(
    items: I,
    catalog: &HashMap<ProductId, PricedProduct>,
    rate: SurchargeRate,
) -> Result<PriceBreakdown, PricingError>
where
    I: IntoIterator<Item = (ProductId, u32)>,
{
    let mut lines = Vec::new();
    let mut subtotal = Money::ZERO;

    for (product_id, quantity) in items {
        if quantity == 0 {
            return Err(PricingError::InvalidQuantity(product_id));
        }
        let product = catalog
            .get(&product_id)
            .ok_or(PricingError::ProductNotFound(product_id))?;

        let line_subtotal = product
            .unit_price
            .checked_mul(quantity)
            .ok_or(PricingError::Overflow)?;
        subtotal = subtotal
            .checked_add(line_subtotal)
            .ok_or(PricingError::Overflow)?;

        lines.push(LineTotal {
            product: product_id,
            name: product.name.clone(),
            quantity,
            unit_price: product.unit_price,
            subtotal: line_subtotal,
        });
    }

    let surcharge = rate.surcharge_for(subtotal)?;
    let grand_total = subtotal
        .checked_add(surcharge)
        .ok_or(PricingError::Overflow)?;

    Ok(PriceBreakdown {
        lines,
        subtotal,
        surcharge,
        grand_total,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn product(price: i64) -> PricedProduct {
        PricedProduct {
            id: ProductId::generate(),
            name: format!("product-{price}"),
            unit_price: Money::new(price).unwrap(),
        }
    }

    fn catalog(products: &[PricedProduct]) -> HashMap<ProductId, PricedProduct> {
        products.iter().map(|p| (p.id, p.clone())).collect()
    }

    #[test]
    fn test_small_cart_has_zero_surcharge() {
        let a = product(10);
        let b = product(5);
        let cat = catalog(&[a.clone(), b.clone()]);

        let breakdown = price_lines([(a.id, 2), (b.id, 1)], &cat, SurchargeRate::default()).unwrap();

        assert_eq!(breakdown.subtotal.amount(), 25);
        assert_eq!(breakdown.surcharge.amount(), 0);
        assert_eq!(breakdown.grand_total.amount(), 25);
        assert_eq!(breakdown.lines.len(), 2);
        assert_eq!(breakdown.lines[0].subtotal.amount(), 20);
    }

    #[test]
    fn test_surcharge_is_floored() {
        let a = product(199);
        let cat = catalog(&[a.clone()]);

        let breakdown = price_lines([(a.id, 1)], &cat, SurchargeRate::default()).unwrap();

        // 199 * 0.02 = 3.98 -> 3
        assert_eq!(breakdown.surcharge.amount(), 3);
        assert_eq!(breakdown.grand_total.amount(), 202);
    }

    #[test]
    fn test_missing_product_fails() {
        let a = product(10);
        let missing = ProductId::generate();
        let cat = catalog(&[a.clone()]);

        let err = price_lines([(a.id, 1), (missing, 1)], &cat, SurchargeRate::default()).unwrap_err();

        assert_eq!(err, PricingError::ProductNotFound(missing));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let a = product(10);
        let cat = catalog(&[a.clone()]);
        assert_eq!(
            price_lines([(a.id, 0)], &cat, SurchargeRate::default()).unwrap_err(),
            PricingError::InvalidQuantity(a.id)
        );
    }

    #[test]
    fn test_overflow_is_an_error() {
        let a = product(i64::MAX / 2);
        let cat = catalog(&[a.clone()]);
        assert_eq!(
            price_lines([(a.id, 3)], &cat, SurchargeRate::default()).unwrap_err(),
            PricingError::Overflow
        );
    }

    #[test]
    fn test_surcharge_rate_bounds() {
        assert!(SurchargeRate::new(Decimal::new(-1, 2)).is_err());
        assert!(SurchargeRate::new(Decimal::ONE).is_err());
        assert!(SurchargeRate::new(Decimal::ZERO).is_ok());
    }

    proptest! {
        #[test]
        fn prop_grand_total_matches_formula(
            lines in prop::collection::vec((0_i64..10_000, 1_u32..50), 1..20)
        ) {
            let products: Vec<PricedProduct> = lines.iter().map(|(price, _)| product(*price)).collect();
            let cat = catalog(&products);
            let items: Vec<(ProductId, u32)> = products
                .iter()
                .zip(lines.iter())
                .map(|(p, (_, qty))| (p.id, *qty))
                .collect();

            let breakdown = price_lines(items, &cat, SurchargeRate::default()).unwrap();

            let sum: i64 = lines.iter().map(|(price, qty)| price * i64::from(*qty)).sum();
            // floor(sum * 0.02) == sum * 2 / 100 for non-negative integers
            let expected = sum + sum * 2 / 100;
            prop_assert_eq!(breakdown.grand_total.amount(), expected);
            prop_assert_eq!(breakdown.subtotal.amount(), sum);
        }
    }
}
