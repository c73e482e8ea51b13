//! Line item model for service requests.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Warranty length given to new service items.
pub const DEFAULT_WARRANTY_MONTHS: u32 = 6;

/// Line item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemType {
    Service,
    Chemical,
    Refrigerant,
}

impl LineItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemType::Service => "service",
            LineItemType::Chemical => "chemical",
            LineItemType::Refrigerant => "refrigerant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "service" => Some(LineItemType::Service),
            "chemical" => Some(LineItemType::Chemical),
            "refrigerant" => Some(LineItemType::Refrigerant),
            _ => None,
        }
    }
}

/// Warranty state of a service item on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarrantyStatus {
    NotStarted,
    Active,
    Expired,
}

impl WarrantyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarrantyStatus::NotStarted => "not_started",
            WarrantyStatus::Active => "active",
            WarrantyStatus::Expired => "expired",
        }
    }
}

/// Warranty terms carried by service items only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warranty {
    pub months: Option<u32>,
    pub start_date: Option<NaiveDate>,
}

impl Warranty {
    pub fn is_complete(&self) -> bool {
        self.months.is_some() && self.start_date.is_some()
    }

    /// Last covered day is the day before `start + months`.
    pub fn end_date(&self) -> Option<NaiveDate> {
        let start = self.start_date?;
        let months = self.months?;
        start.checked_add_months(Months::new(months))
    }

    pub fn status_on(&self, day: NaiveDate) -> WarrantyStatus {
        match (self.start_date, self.end_date()) {
            (Some(start), Some(end)) if day >= start => {
                if day < end {
                    WarrantyStatus::Active
                } else {
                    WarrantyStatus::Expired
                }
            }
            _ => WarrantyStatus::NotStarted,
        }
    }
}

/// Line item on a service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLineItem {
    pub line_item_id: Uuid,
    pub name: String,
    pub item_type: LineItemType,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    /// Always `None` for chemical and refrigerant items.
    pub warranty: Option<Warranty>,
}

/// Input for adding a line item.
#[derive(Debug, Clone)]
pub struct CreateLineItem {
    pub name: String,
    pub item_type: LineItemType,
    pub unit_price: Decimal,
    pub quantity: Decimal,
}

impl ServiceLineItem {
    pub fn new(input: CreateLineItem) -> Result<Self, ValidationError> {
        let name = input.name.trim().to_string();
        check_pricing(&name, input.unit_price, input.quantity)?;

        let warranty = (input.item_type == LineItemType::Service).then_some(Warranty {
            months: Some(DEFAULT_WARRANTY_MONTHS),
            start_date: None,
        });

        Ok(Self {
            line_item_id: Uuid::new_v4(),
            name,
            item_type: input.item_type,
            unit_price: input.unit_price,
            quantity: input.quantity,
            warranty,
        })
    }

    /// Re-check an item that did not come through [`ServiceLineItem::new`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_pricing(self.name.trim(), self.unit_price, self.quantity)?;
        match (self.item_type, self.warranty) {
            (LineItemType::Service, Some(w)) if w.months == Some(0) => {
                Err(ValidationError::ZeroWarrantyMonths)
            }
            (LineItemType::Service, _) | (_, None) => Ok(()),
            (_, Some(_)) => Err(ValidationError::WarrantyOnNonServiceItem(self.name.clone())),
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * self.quantity
    }

    /// Non-service items never need warranty data.
    pub fn warranty_complete(&self) -> bool {
        match self.item_type {
            LineItemType::Service => self.warranty.is_some_and(|w| w.is_complete()),
            _ => true,
        }
    }

    pub fn warranty_status(&self, day: NaiveDate) -> Option<WarrantyStatus> {
        self.warranty.map(|w| w.status_on(day))
    }

    pub fn set_warranty(
        &mut self,
        months: Option<u32>,
        start_date: Option<NaiveDate>,
    ) -> Result<(), ValidationError> {
        if self.item_type != LineItemType::Service {
            return Err(ValidationError::WarrantyOnNonServiceItem(self.name.clone()));
        }
        if months == Some(0) {
            return Err(ValidationError::ZeroWarrantyMonths);
        }
        self.warranty = Some(Warranty { months, start_date });
        Ok(())
    }

    /// Pricing-relevant identity, used to detect item edits on save.
    pub(crate) fn pricing_key(&self) -> (Uuid, &str, LineItemType, Decimal, Decimal) {
        (
            self.line_item_id,
            self.name.as_str(),
            self.item_type,
            self.unit_price,
            self.quantity,
        )
    }
}

fn check_pricing(name: &str, unit_price: Decimal, quantity: Decimal) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if unit_price < Decimal::ZERO {
        return Err(ValidationError::NegativePrice(unit_price));
    }
    if quantity <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveQuantity(quantity));
    }
    Ok(())
}
