//! Persistence and directory contracts the core depends on.

use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{Contact, DuePayment, PaymentRecordStatus, ServiceRequest, ServiceStatus};

#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Load a request with its line items and payment schedule.
    async fn load_request(&self, request_id: Uuid) -> Result<ServiceRequest, AppError>;

    /// Persist the request, its line items and payment amounts as one unit,
    /// writing `effective_status` as the service status.
    async fn save_request(
        &self,
        request: &ServiceRequest,
        effective_status: ServiceStatus,
    ) -> Result<(), AppError>;

    /// Pending payments with a due date on or after `window_start`.
    async fn list_due_payments(&self, window_start: NaiveDate)
        -> Result<Vec<DuePayment>, AppError>;

    async fn update_payment_status(
        &self,
        payment_id: Uuid,
        status: PaymentRecordStatus,
        proof_of_payment_file: Option<String>,
    ) -> Result<(), AppError>;

    async fn update_payment_due_date(
        &self,
        payment_id: Uuid,
        due_date: NaiveDate,
    ) -> Result<(), AppError>;
}

/// Read-only lookup of people who can be notified.
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn active_admins(&self) -> Result<Vec<Contact>, AppError>;
    async fn find_staff(&self, staff_id: Uuid) -> Result<Option<Contact>, AppError>;
    async fn find_customer(&self, customer_id: Uuid) -> Result<Option<Contact>, AppError>;
}
