//! Domain models for request-service.

mod contact;
mod line_item;
mod notification;
mod payment;
mod service_request;

pub use contact::{Audience, Contact};
pub use line_item::{
    CreateLineItem, LineItemType, ServiceLineItem, Warranty, WarrantyStatus,
    DEFAULT_WARRANTY_MONTHS,
};
pub use notification::NotificationKind;
pub use payment::{
    CreatePaymentPhase, DuePayment, PaymentRecord, PaymentRecordStatus, PaymentStatus,
};
pub use service_request::{
    parse_staff_assignment, Actor, ActorRole, Discount, ServiceRequest, ServiceStatus,
};
