//! PostgreSQL implementation of the repository and staff directory.
//!
//! The schema itself is managed outside this service.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    parse_staff_assignment, Contact, Discount, DuePayment, LineItemType, PaymentRecord,
    PaymentRecordStatus, ServiceLineItem, ServiceRequest, ServiceStatus, Warranty,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::{RequestRepository, StaffDirectory};

#[derive(Debug, FromRow)]
struct RequestRow {
    request_id: Uuid,
    request_number: String,
    customer_id: Uuid,
    service_status: String,
    assigned_staff: Option<String>,
    discount_percent: Option<Decimal>,
    service_start_date: Option<NaiveDate>,
    service_end_date: Option<NaiveDate>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct LineItemRow {
    line_item_id: Uuid,
    name: String,
    item_type: String,
    unit_price: Decimal,
    quantity: Decimal,
    warranty_months: Option<i32>,
    warranty_start_date: Option<NaiveDate>,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    payment_phase: String,
    percentage: Decimal,
    amount: Decimal,
    due_date: Option<NaiveDate>,
    status: String,
    proof_of_payment_file: Option<String>,
}

#[derive(Debug, FromRow)]
struct DuePaymentRow {
    #[sqlx(flatten)]
    payment: PaymentRow,
    request_id: Uuid,
    request_number: String,
    customer_id: Uuid,
    assigned_staff: Option<String>,
}

#[derive(Debug, FromRow)]
struct ContactRow {
    user_id: Uuid,
    full_name: String,
    email: String,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            user_id: row.user_id,
            full_name: row.full_name,
            email: row.email,
        }
    }
}

fn corrupt(what: &str, value: impl std::fmt::Display) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("Unrecognised {} '{}' in storage", what, value))
}

impl TryFrom<LineItemRow> for ServiceLineItem {
    type Error = AppError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        let item_type =
            LineItemType::parse(&row.item_type).ok_or_else(|| corrupt("item type", &row.item_type))?;

        let warranty = match item_type {
            LineItemType::Service => Some(Warranty {
                months: row
                    .warranty_months
                    .map(u32::try_from)
                    .transpose()
                    .map_err(|_| corrupt("warranty months", row.warranty_months.unwrap_or_default()))?,
                start_date: row.warranty_start_date,
            }),
            _ => None,
        };

        Ok(ServiceLineItem {
            line_item_id: row.line_item_id,
            name: row.name,
            item_type,
            unit_price: row.unit_price,
            quantity: row.quantity,
            warranty,
        })
    }
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = PaymentRecordStatus::parse(&row.status)
            .ok_or_else(|| corrupt("payment status", &row.status))?;

        Ok(PaymentRecord {
            payment_id: row.payment_id,
            payment_phase: row.payment_phase,
            percentage: row.percentage,
            amount: row.amount,
            due_date: row.due_date,
            status,
            proof_of_payment_file: row.proof_of_payment_file,
        })
    }
}

/// Resolve the legacy staff column, warning when it holds neither an id nor
/// one of the known "unassigned" markers.
fn staff_from_column(request_id: Uuid, raw: Option<&str>) -> Option<Uuid> {
    let (staff_id, unreadable) = parse_staff_assignment(raw);
    if unreadable {
        warn!(
            request_id = %request_id,
            raw = raw.unwrap_or_default(),
            "Unreadable staff assignment, treating request as unassigned"
        );
    }
    staff_id
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "request-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    async fn contacts_by_role(&self, role: &str) -> Result<Vec<Contact>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_contacts"])
            .start_timer();

        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT user_id, full_name, email
            FROM users
            WHERE role = $1 AND is_active = TRUE
            ORDER BY full_name
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list {} users: {}", role, e)))?;

        timer.observe_duration();

        Ok(rows.into_iter().map(Contact::from).collect())
    }

    async fn contact(&self, user_id: Uuid, role: &str) -> Result<Option<Contact>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_contact"])
            .start_timer();

        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT user_id, full_name, email
            FROM users
            WHERE user_id = $1 AND role = $2 AND is_active = TRUE
            "#,
        )
        .bind(user_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get user: {}", e)))?;

        timer.observe_duration();

        Ok(row.map(Contact::from))
    }
}

#[async_trait]
impl RequestRepository for Database {
    #[instrument(skip(self), fields(request_id = %request_id))]
    async fn load_request(&self, request_id: Uuid) -> Result<ServiceRequest, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_request"])
            .start_timer();

        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT request_id, request_number, customer_id, service_status, assigned_staff,
                   discount_percent, service_start_date, service_end_date, created_utc, updated_utc
            FROM service_requests
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load request: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Service request {} not found", request_id)))?;

        let items = sqlx::query_as::<_, LineItemRow>(
            r#"
            SELECT line_item_id, name, item_type, unit_price, quantity,
                   warranty_months, warranty_start_date
            FROM service_line_items
            WHERE request_id = $1
            ORDER BY position
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load line items: {}", e)))?;

        let payments = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, payment_phase, percentage, amount, due_date, status,
                   proof_of_payment_file
            FROM payment_records
            WHERE request_id = $1
            ORDER BY position
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load payments: {}", e)))?;

        timer.observe_duration();

        let service_status = ServiceStatus::parse(&row.service_status)
            .ok_or_else(|| corrupt("service status", &row.service_status))?;
        let discount = Discount::from_column(row.discount_percent)
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Stored discount invalid: {}", e)))?;

        Ok(ServiceRequest {
            request_id: row.request_id,
            request_number: row.request_number,
            customer_id: row.customer_id,
            service_status,
            assigned_staff_id: staff_from_column(row.request_id, row.assigned_staff.as_deref()),
            discount,
            service_start_date: row.service_start_date,
            service_end_date: row.service_end_date,
            line_items: items
                .into_iter()
                .map(ServiceLineItem::try_from)
                .collect::<Result<_, _>>()?,
            payments: payments
                .into_iter()
                .map(PaymentRecord::try_from)
                .collect::<Result<_, _>>()?,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }

    #[instrument(skip(self, request), fields(request_id = %request.request_id, status = %effective_status))]
    async fn save_request(
        &self,
        request: &ServiceRequest,
        effective_status: ServiceStatus,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_request"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e)))?;

        let updated = sqlx::query(
            r#"
            UPDATE service_requests
            SET service_status = $2,
                assigned_staff = $3,
                discount_percent = $4,
                service_start_date = $5,
                service_end_date = $6,
                updated_utc = NOW()
            WHERE request_id = $1
            "#,
        )
        .bind(request.request_id)
        .bind(effective_status.as_str())
        .bind(request.assigned_staff_id.map(|id| id.to_string()))
        .bind(request.discount.to_column())
        .bind(request.service_start_date)
        .bind(request.service_end_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update request: {}", e)))?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Service request {} not found",
                request.request_id
            )));
        }

        let kept: Vec<Uuid> = request.line_items.iter().map(|i| i.line_item_id).collect();
        sqlx::query(
            r#"
            DELETE FROM service_line_items
            WHERE request_id = $1 AND NOT (line_item_id = ANY($2))
            "#,
        )
        .bind(request.request_id)
        .bind(&kept)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to remove line items: {}", e)))?;

        for (position, item) in request.line_items.iter().enumerate() {
            let warranty = item.warranty.unwrap_or(Warranty {
                months: None,
                start_date: None,
            });
            sqlx::query(
                r#"
                INSERT INTO service_line_items (line_item_id, request_id, position, name, item_type,
                                                unit_price, quantity, warranty_months, warranty_start_date)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (line_item_id) DO UPDATE
                SET position = EXCLUDED.position,
                    name = EXCLUDED.name,
                    item_type = EXCLUDED.item_type,
                    unit_price = EXCLUDED.unit_price,
                    quantity = EXCLUDED.quantity,
                    warranty_months = EXCLUDED.warranty_months,
                    warranty_start_date = EXCLUDED.warranty_start_date
                "#,
            )
            .bind(item.line_item_id)
            .bind(request.request_id)
            .bind(position as i32)
            .bind(&item.name)
            .bind(item.item_type.as_str())
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(warranty.months.map(|m| m as i32))
            .bind(warranty.start_date)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to save line item: {}", e)))?;
        }

        for payment in &request.payments {
            sqlx::query(
                r#"
                UPDATE payment_records
                SET amount = $2, due_date = $3, status = $4, proof_of_payment_file = $5
                WHERE payment_id = $1 AND request_id = $6
                "#,
            )
            .bind(payment.payment_id)
            .bind(payment.amount)
            .bind(payment.due_date)
            .bind(payment.status.as_str())
            .bind(&payment.proof_of_payment_file)
            .bind(request.request_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to save payment: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(
            line_items = request.line_items.len(),
            payments = request.payments.len(),
            "Service request saved"
        );

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_due_payments(
        &self,
        window_start: NaiveDate,
    ) -> Result<Vec<DuePayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_due_payments"])
            .start_timer();

        let rows = sqlx::query_as::<_, DuePaymentRow>(
            r#"
            SELECT p.payment_id, p.payment_phase, p.percentage, p.amount, p.due_date, p.status,
                   p.proof_of_payment_file, r.request_id, r.request_number, r.customer_id,
                   r.assigned_staff
            FROM payment_records p
            JOIN service_requests r ON r.request_id = p.request_id
            WHERE p.status = $1
              AND p.due_date IS NOT NULL
              AND p.due_date >= $2
            ORDER BY p.due_date, p.payment_id
            "#,
        )
        .bind(PaymentRecordStatus::Pending.as_str())
        .bind(window_start)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list due payments: {}", e)))?;

        timer.observe_duration();

        rows.into_iter()
            .map(|row| {
                Ok(DuePayment {
                    assigned_staff_id: staff_from_column(row.request_id, row.assigned_staff.as_deref()),
                    payment: PaymentRecord::try_from(row.payment)?,
                    request_id: row.request_id,
                    request_number: row.request_number,
                    customer_id: row.customer_id,
                })
            })
            .collect()
    }

    #[instrument(skip(self, proof_of_payment_file), fields(payment_id = %payment_id, status = status.as_str()))]
    async fn update_payment_status(
        &self,
        payment_id: Uuid,
        status: PaymentRecordStatus,
        proof_of_payment_file: Option<String>,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_payment_status"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE payment_records
            SET status = $2,
                proof_of_payment_file = COALESCE($3, proof_of_payment_file)
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .bind(status.as_str())
        .bind(proof_of_payment_file)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update payment: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id)));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn update_payment_due_date(
        &self,
        payment_id: Uuid,
        due_date: NaiveDate,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_payment_due_date"])
            .start_timer();

        let result = sqlx::query("UPDATE payment_records SET due_date = $2 WHERE payment_id = $1")
            .bind(payment_id)
            .bind(due_date)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to set due date: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl StaffDirectory for Database {
    async fn active_admins(&self) -> Result<Vec<Contact>, AppError> {
        self.contacts_by_role("admin").await
    }

    async fn find_staff(&self, staff_id: Uuid) -> Result<Option<Contact>, AppError> {
        self.contact(staff_id, "staff").await
    }

    async fn find_customer(&self, customer_id: Uuid) -> Result<Option<Contact>, AppError> {
        self.contact(customer_id, "customer").await
    }
}
