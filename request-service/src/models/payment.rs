//! Payment schedule model.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Status of a single installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Pending => "Pending",
            PaymentRecordStatus::Paid => "Paid",
            PaymentRecordStatus::Overdue => "Overdue",
            PaymentRecordStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(PaymentRecordStatus::Pending),
            "paid" => Some(PaymentRecordStatus::Paid),
            "overdue" => Some(PaymentRecordStatus::Overdue),
            "cancelled" | "canceled" => Some(PaymentRecordStatus::Cancelled),
            _ => None,
        }
    }
}

/// Aggregate payment status of a request, derived from its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Partial => "Partial",
            PaymentStatus::Paid => "Paid",
        }
    }

    /// Cancelled installments are left out of the aggregate.
    pub fn derive(payments: &[PaymentRecord]) -> Self {
        let live: Vec<_> = payments
            .iter()
            .filter(|p| p.status != PaymentRecordStatus::Cancelled)
            .collect();
        let paid = live
            .iter()
            .filter(|p| p.status == PaymentRecordStatus::Paid)
            .count();

        match paid {
            0 => PaymentStatus::Pending,
            n if n == live.len() => PaymentStatus::Paid,
            _ => PaymentStatus::Partial,
        }
    }
}

/// One installment of a request's payment schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: Uuid,
    pub payment_phase: String,
    /// Share of the discounted total, fixed at creation.
    pub percentage: Decimal,
    /// Derived from the breakdown; rewritten whenever the discount changes.
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
    pub status: PaymentRecordStatus,
    pub proof_of_payment_file: Option<String>,
}

/// Input for creating a payment phase.
#[derive(Debug, Clone)]
pub struct CreatePaymentPhase {
    pub payment_phase: String,
    pub percentage: Decimal,
    pub due_date: Option<NaiveDate>,
}

impl PaymentRecord {
    pub fn new(input: CreatePaymentPhase) -> Result<Self, ValidationError> {
        let payment_phase = input.payment_phase.trim().to_string();
        if payment_phase.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if input.percentage < Decimal::ZERO || input.percentage > Decimal::ONE_HUNDRED {
            return Err(ValidationError::PercentageOutOfRange(input.percentage));
        }

        Ok(Self {
            payment_id: Uuid::new_v4(),
            payment_phase,
            percentage: input.percentage,
            amount: Decimal::ZERO,
            due_date: input.due_date,
            status: PaymentRecordStatus::Pending,
            proof_of_payment_file: None,
        })
    }
}

/// A pending installment joined with the request fields the reminder job needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuePayment {
    pub payment: PaymentRecord,
    pub request_id: Uuid,
    pub request_number: String,
    pub customer_id: Uuid,
    pub assigned_staff_id: Option<Uuid>,
}
