//! Status enums for orders.

use serde::{Deserialize, Serialize};

/// How the buyer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Paid to the courier on delivery; no processor involvement.
    CashOnDelivery,
    /// Hosted card checkout at the payment processor.
    Card,
}

impl PaymentMethod {
    /// Stable string form used in storage and query strings.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CashOnDelivery => "cash_on_delivery",
            Self::Card => "card",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash_on_delivery" | "cod" => Ok(Self::CashOnDelivery),
            "card" | "stripe" => Ok(Self::Card),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}

/// Order fulfillment status.
///
/// Independent of the paid flag; payment reconciliation never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    #[default]
    Placed,
    Shipped,
    Delivered,
}

impl FulfillmentStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
        }
    }
}

impl std::str::FromStr for FulfillmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placed" => Ok(Self::Placed),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            _ => Err(format!("invalid fulfillment status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("card".parse(), Ok(PaymentMethod::Card));
        assert_eq!("cod".parse(), Ok(PaymentMethod::CashOnDelivery));
        assert!("bitcoin".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_payment_method_serde_matches_as_str() {
        for method in [PaymentMethod::Card, PaymentMethod::CashOnDelivery] {
            let json = serde_json::to_string(&method).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
        }
    }

    #[test]
    fn test_fulfillment_defaults_to_placed() {
        assert_eq!(FulfillmentStatus::default(), FulfillmentStatus::Placed);
    }
}
