//! Service request model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::line_item::{LineItemType, ServiceLineItem};
use super::payment::{PaymentRecord, PaymentStatus};
use crate::error::ValidationError;

/// Workflow state of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Pending,
    Assigned,
    WaitingForApproval,
    Approved,
    Ongoing,
    Completed,
    Cancelled,
}

impl ServiceStatus {
    /// Label stored in the `service_status` column and shown to operators.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Pending => "Pending",
            ServiceStatus::Assigned => "Assigned",
            ServiceStatus::WaitingForApproval => "Waiting for Approval",
            ServiceStatus::Approved => "Approved",
            ServiceStatus::Ongoing => "Ongoing",
            ServiceStatus::Completed => "Completed",
            ServiceStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ServiceStatus::Pending),
            "assigned" => Some(ServiceStatus::Assigned),
            "waiting for approval" | "waiting_for_approval" => {
                Some(ServiceStatus::WaitingForApproval)
            }
            "approved" => Some(ServiceStatus::Approved),
            "ongoing" => Some(ServiceStatus::Ongoing),
            "completed" => Some(ServiceStatus::Completed),
            "cancelled" | "canceled" => Some(ServiceStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceStatus::Completed | ServiceStatus::Cancelled)
    }

    /// Statuses that require a staff member on the request.
    pub fn requires_staff(&self) -> bool {
        matches!(
            self,
            ServiceStatus::Assigned | ServiceStatus::WaitingForApproval
        )
    }

    /// Line items may only be added, removed or repriced in these statuses.
    pub fn allows_item_changes(&self) -> bool {
        matches!(self, ServiceStatus::Pending | ServiceStatus::Assigned)
    }

    /// Discount editing is closed once work has started.
    pub fn allows_discount_changes(&self) -> bool {
        !matches!(
            self,
            ServiceStatus::Ongoing | ServiceStatus::Completed | ServiceStatus::Cancelled
        )
    }

    /// Statuses an operator may pick in the internal status editor.
    pub fn selectable() -> &'static [ServiceStatus] {
        &[
            ServiceStatus::Pending,
            ServiceStatus::Assigned,
            ServiceStatus::WaitingForApproval,
            ServiceStatus::Ongoing,
            ServiceStatus::Completed,
            ServiceStatus::Cancelled,
        ]
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discount applied to the line-item total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "percent", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    Percent(Decimal),
}

impl Discount {
    pub fn percent(value: Decimal) -> Result<Self, ValidationError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(ValidationError::DiscountOutOfRange(value));
        }
        Ok(Discount::Percent(value))
    }

    /// Re-check a discount that was built without [`Discount::percent`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Discount::None => Ok(()),
            Discount::Percent(p) => Discount::percent(*p).map(|_| ()),
        }
    }

    /// Read a nullable discount column.
    pub fn from_column(value: Option<Decimal>) -> Result<Self, ValidationError> {
        match value {
            None => Ok(Discount::None),
            Some(v) => Discount::percent(v),
        }
    }

    pub fn as_percent(&self) -> Decimal {
        match self {
            Discount::None => Decimal::ZERO,
            Discount::Percent(p) => *p,
        }
    }

    pub fn to_column(&self) -> Option<Decimal> {
        match self {
            Discount::None => None,
            Discount::Percent(p) => Some(*p),
        }
    }
}

/// Role of whoever is driving an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Staff,
    Customer,
}

/// The authenticated caller, as resolved by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: ActorRole::Admin,
        }
    }

    pub fn staff(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: ActorRole::Staff,
        }
    }

    pub fn customer(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: ActorRole::Customer,
        }
    }
}

/// A service request and everything saved with it in one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub request_id: Uuid,
    pub request_number: String,
    pub customer_id: Uuid,
    pub service_status: ServiceStatus,
    pub assigned_staff_id: Option<Uuid>,
    pub discount: Discount,
    pub service_start_date: Option<NaiveDate>,
    pub service_end_date: Option<NaiveDate>,
    pub line_items: Vec<ServiceLineItem>,
    pub payments: Vec<PaymentRecord>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl ServiceRequest {
    /// A freshly submitted request: always `Pending`, no staff, no discount.
    pub fn new(request_number: impl Into<String>, customer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            request_id: Uuid::new_v4(),
            request_number: request_number.into(),
            customer_id,
            service_status: ServiceStatus::Pending,
            assigned_staff_id: None,
            discount: Discount::None,
            service_start_date: None,
            service_end_date: None,
            line_items: Vec::new(),
            payments: Vec::new(),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn has_staff(&self) -> bool {
        self.assigned_staff_id.is_some()
    }

    /// Sum of every line total, before discount.
    pub fn base_total(&self) -> Decimal {
        self.line_items.iter().map(ServiceLineItem::line_total).sum()
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::derive(&self.payments)
    }

    /// Names of service items still missing warranty months or start date.
    pub fn items_missing_warranty(&self) -> Vec<String> {
        self.line_items
            .iter()
            .filter(|item| item.item_type == LineItemType::Service && !item.warranty_complete())
            .map(|item| item.name.clone())
            .collect()
    }

    pub fn line_item(&self, line_item_id: Uuid) -> Option<&ServiceLineItem> {
        self.line_items
            .iter()
            .find(|item| item.line_item_id == line_item_id)
    }

    pub fn payment_mut(&mut self, payment_id: Uuid) -> Option<&mut PaymentRecord> {
        self.payments
            .iter_mut()
            .find(|payment| payment.payment_id == payment_id)
    }
}

/// Interpret a raw staff-assignment value as stored by older versions of the
/// admin UI, where unassigned requests carried a display string.
///
/// Returns the parsed id and whether the raw value was unreadable.
pub fn parse_staff_assignment(raw: Option<&str>) -> (Option<Uuid>, bool) {
    let Some(value) = raw.map(str::trim) else {
        return (None, false);
    };

    if value.is_empty() || value == "-" || value.eq_ignore_ascii_case("not assigned") {
        return (None, false);
    }

    match Uuid::parse_str(value) {
        Ok(id) => (Some(id), false),
        Err(_) => (None, true),
    }
}
