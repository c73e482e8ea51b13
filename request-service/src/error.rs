//! Error taxonomy for request-service.

use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ServiceStatus;

/// A requested transition or edit whose precondition is not met.
///
/// Always recoverable; the message is shown to the operator verbatim and the
/// request is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusRestrictionError {
    #[error("Cannot set status to {requested}: a staff member must be assigned first.")]
    StaffRequired { requested: ServiceStatus },

    #[error("Cannot set status to Ongoing: the request must be approved by the customer first.")]
    NotApproved,

    #[error("Cannot set status to Completed: the service must be Ongoing first.")]
    NotOngoing,

    #[error("Cannot set status to Completed: the service end date is not set.")]
    MissingEndDate,

    #[error(
        "Cannot set status to Completed: warranty details are missing for: {}.",
        .items.join(", ")
    )]
    IncompleteWarranty { items: Vec<String> },

    #[error(
        "Status reverted to Pending because staff was unassigned. Review the request and save again."
    )]
    StaffUnassigned,

    #[error("Approved can only be set by the customer's approval.")]
    ApprovalRequiresCustomer,

    #[error("Only a request waiting for approval can be approved (current status: {current}).")]
    NotAwaitingApproval { current: ServiceStatus },

    #[error("Cannot move a request from {current} back to {requested}.")]
    BackwardMove {
        current: ServiceStatus,
        requested: ServiceStatus,
    },

    #[error("The request is {current} and can no longer change status.")]
    Terminal { current: ServiceStatus },

    #[error("Only an administrator can cancel a service request.")]
    CancelNotPermitted,

    #[error("The discount cannot be changed once the request is {current}.")]
    DiscountLocked { current: ServiceStatus },

    #[error("Line items cannot be changed while the request is {current}.")]
    ItemsLocked { current: ServiceStatus },
}

/// Malformed input, rejected before anything is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Discount must be between 0 and 100 percent, got {0}")]
    DiscountOutOfRange(Decimal),

    #[error("Payment percentage must be between 0 and 100, got {0}")]
    PercentageOutOfRange(Decimal),

    #[error("Unit price cannot be negative, got {0}")]
    NegativePrice(Decimal),

    #[error("Quantity must be greater than zero, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Warranty applies to service items only ({0})")]
    WarrantyOnNonServiceItem(String),

    #[error("Warranty months must be greater than zero")]
    ZeroWarrantyMonths,

    #[error("Line item {0} does not belong to this request")]
    UnknownLineItem(Uuid),

    #[error("Payment {0} does not belong to this request")]
    UnknownPayment(Uuid),

    #[error("Payment schedule is fixed once created")]
    PaymentScheduleChanged,

    #[error("Customer {0} does not own this request")]
    NotRequestOwner(Uuid),
}

/// A notification that could not be handed to the delivery channel.
///
/// Logged and counted; never fails the scheduler run or the enclosing save.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Delivery of {kind} notification to {recipient_id} for payment {payment_id} failed: {reason}")]
pub struct DeliveryFailure {
    pub payment_id: Uuid,
    pub recipient_id: Uuid,
    pub kind: &'static str,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Restriction(#[from] StatusRestrictionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Infrastructure(#[from] AppError),
}

impl ServiceError {
    /// The restriction to redisplay to the operator, if this is one.
    pub fn restriction(&self) -> Option<&StatusRestrictionError> {
        match self {
            ServiceError::Restriction(r) => Some(r),
            _ => None,
        }
    }
}
