//! Discount-aware payment breakdown.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Discount, PaymentRecord};

/// Minor currency units (centavos).
const MONEY_SCALE: u32 = 2;

/// Half-up rounding to the minor unit. Amounts here are never negative, so
/// rounding away from zero at the midpoint is the same thing.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseAmount {
    pub payment_id: Uuid,
    pub payment_phase: String,
    pub percentage: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentBreakdown {
    pub base_total: Decimal,
    pub discount_percent: Decimal,
    pub discounted_total: Decimal,
    pub phases: Vec<PhaseAmount>,
}

impl PaymentBreakdown {
    /// Compute the discounted total and each phase's share of it.
    ///
    /// Percentages are not required to add up to 100.
    pub fn calculate(base_total: Decimal, discount: Discount, phases: &[PaymentRecord]) -> Self {
        let discount_percent = discount.as_percent();
        let discounted_total = round_money(
            base_total * (Decimal::ONE_HUNDRED - discount_percent) / Decimal::ONE_HUNDRED,
        );

        let phases = phases
            .iter()
            .map(|phase| PhaseAmount {
                payment_id: phase.payment_id,
                payment_phase: phase.payment_phase.clone(),
                percentage: phase.percentage,
                amount: round_money(discounted_total * phase.percentage / Decimal::ONE_HUNDRED),
            })
            .collect();

        Self {
            base_total,
            discount_percent,
            discounted_total,
            phases,
        }
    }

    pub fn total_scheduled(&self) -> Decimal {
        self.phases.iter().map(|p| p.amount).sum()
    }
}

/// Rewrite every payment amount for the current line-item total and discount.
///
/// A request without payment records is left alone and `None` is returned.
pub fn recalculate_amounts(
    base_total: Decimal,
    discount: Discount,
    payments: &mut [PaymentRecord],
) -> Option<PaymentBreakdown> {
    if payments.is_empty() {
        return None;
    }

    let breakdown = PaymentBreakdown::calculate(base_total, discount, payments);
    for (payment, phase) in payments.iter_mut().zip(&breakdown.phases) {
        payment.amount = phase.amount;
    }

    tracing::debug!(
        base_total = %breakdown.base_total,
        discount_percent = %breakdown.discount_percent,
        discounted_total = %breakdown.discounted_total,
        phases = breakdown.phases.len(),
        "Payment amounts recalculated"
    );

    Some(breakdown)
}
