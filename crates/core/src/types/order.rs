//! Order payment state machine.
//!
//! ```text
//!            Confirmed              Cancelled
//!   Unpaid ─────────────▶ Paid    Unpaid ─────────▶ (deleted)
//!   Paid   ── Confirmed ─▶ Paid (no-op)
//!   Paid   ── Cancelled ─▶ conflict
//! ```
//!
//! Cash-on-delivery orders never receive processor signals; any signal for
//! one is a conflict.

use serde::{Deserialize, Serialize};

use super::status::PaymentMethod;

/// Payment state derived from the order's paid flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Unpaid,
    Paid,
}

impl PaymentState {
    #[must_use]
    pub const fn from_paid(paid: bool) -> Self {
        if paid { Self::Paid } else { Self::Unpaid }
    }

    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }
}

/// Terminal outcome reported for an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentSignal {
    /// Processor confirmed the funds.
    Confirmed,
    /// Payment was canceled, the session expired, or the buyer cancelled.
    Cancelled,
}

/// What the ledger must do in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Flip `paid` to true and clear the owner's cart.
    MarkPaid,
    /// Already paid; nothing to do.
    AlreadyPaid,
    /// Remove the unpaid order.
    Delete,
    /// The signal contradicts the recorded state.
    Conflict(ConflictReason),
}

/// Why a signal was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictReason {
    /// Cancellation for an order that is already paid.
    CancelAfterPaid,
    /// Processor signal for a cash-on-delivery order.
    NotCardOrder,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CancelAfterPaid => f.write_str("cancellation received for a paid order"),
            Self::NotCardOrder => f.write_str("payment signal received for a non-card order"),
        }
    }
}

/// Decide the transition for `signal` given the order's method and state.
#[must_use]
pub const fn decide(method: PaymentMethod, state: PaymentState, signal: PaymentSignal) -> Transition {
    if !matches!(method, PaymentMethod::Card) {
        return Transition::Conflict(ConflictReason::NotCardOrder);
    }

    match (state, signal) {
        (PaymentState::Unpaid, PaymentSignal::Confirmed) => Transition::MarkPaid,
        (PaymentState::Paid, PaymentSignal::Confirmed) => Transition::AlreadyPaid,
        (PaymentState::Unpaid, PaymentSignal::Cancelled) => Transition::Delete,
        (PaymentState::Paid, PaymentSignal::Cancelled) => {
            Transition::Conflict(ConflictReason::CancelAfterPaid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_unpaid_marks_paid() {
        assert_eq!(
            decide(PaymentMethod::Card, PaymentState::Unpaid, PaymentSignal::Confirmed),
            Transition::MarkPaid
        );
    }

    #[test]
    fn test_confirm_is_idempotent() {
        assert_eq!(
            decide(PaymentMethod::Card, PaymentState::Paid, PaymentSignal::Confirmed),
            Transition::AlreadyPaid
        );
    }

    #[test]
    fn test_cancel_unpaid_deletes() {
        assert_eq!(
            decide(PaymentMethod::Card, PaymentState::Unpaid, PaymentSignal::Cancelled),
            Transition::Delete
        );
    }

    #[test]
    fn test_cancel_paid_conflicts() {
        assert_eq!(
            decide(PaymentMethod::Card, PaymentState::Paid, PaymentSignal::Cancelled),
            Transition::Conflict(ConflictReason::CancelAfterPaid)
        );
    }

    #[test]
    fn test_cash_orders_ignore_processor() {
        for state in [PaymentState::Unpaid, PaymentState::Paid] {
            for signal in [PaymentSignal::Confirmed, PaymentSignal::Cancelled] {
                assert_eq!(
                    decide(PaymentMethod::CashOnDelivery, state, signal),
                    Transition::Conflict(ConflictReason::NotCardOrder)
                );
            }
        }
    }
}
