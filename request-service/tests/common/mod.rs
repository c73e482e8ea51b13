//! Test helper module for request-service integration tests.
//!
//! Provides in-memory collaborators (repository, staff directory, notifier)
//! and a harness that wires them into the manager and scheduler.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use request_service::config::SchedulerConfig;
use request_service::models::{
    Contact, CreateLineItem, CreatePaymentPhase, DuePayment, LineItemType, PaymentRecord,
    PaymentRecordStatus, ServiceLineItem, ServiceRequest, ServiceStatus,
};
use request_service::services::{
    init_metrics, today_in, InMemoryDedupStore, Notifier, PaymentDueScheduler, RequestRepository,
    ServiceRequestManager, StaffDirectory,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryRepository {
    requests: Mutex<HashMap<Uuid, ServiceRequest>>,
    saves: AtomicUsize,
}

impl InMemoryRepository {
    pub fn insert(&self, request: ServiceRequest) {
        self.requests
            .lock()
            .unwrap()
            .insert(request.request_id, request);
    }

    pub fn get(&self, request_id: Uuid) -> ServiceRequest {
        self.requests.lock().unwrap()[&request_id].clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestRepository for InMemoryRepository {
    async fn load_request(&self, request_id: Uuid) -> Result<ServiceRequest, AppError> {
        self.requests
            .lock()
            .unwrap()
            .get(&request_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("request {} not found", request_id)))
    }

    async fn save_request(
        &self,
        request: &ServiceRequest,
        effective_status: ServiceStatus,
    ) -> Result<(), AppError> {
        let mut stored = request.clone();
        stored.service_status = effective_status;
        self.requests
            .lock()
            .unwrap()
            .insert(stored.request_id, stored);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_due_payments(
        &self,
        window_start: NaiveDate,
    ) -> Result<Vec<DuePayment>, AppError> {
        let requests = self.requests.lock().unwrap();
        let mut due: Vec<DuePayment> = requests
            .values()
            .flat_map(|request| {
                request
                    .payments
                    .iter()
                    .filter(|p| p.status == PaymentRecordStatus::Pending)
                    .filter(|p| p.due_date.is_some_and(|d| d >= window_start))
                    .map(|p| DuePayment {
                        payment: p.clone(),
                        request_id: request.request_id,
                        request_number: request.request_number.clone(),
                        customer_id: request.customer_id,
                        assigned_staff_id: request.assigned_staff_id,
                    })
            })
            .collect();
        due.sort_by_key(|d| (d.payment.due_date, d.payment.payment_id));
        Ok(due)
    }

    async fn update_payment_status(
        &self,
        payment_id: Uuid,
        status: PaymentRecordStatus,
        proof_of_payment_file: Option<String>,
    ) -> Result<(), AppError> {
        let mut requests = self.requests.lock().unwrap();
        let payment = requests
            .values_mut()
            .find_map(|r| r.payment_mut(payment_id))
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;
        payment.status = status;
        if proof_of_payment_file.is_some() {
            payment.proof_of_payment_file = proof_of_payment_file;
        }
        Ok(())
    }

    async fn update_payment_due_date(
        &self,
        payment_id: Uuid,
        due_date: NaiveDate,
    ) -> Result<(), AppError> {
        let mut requests = self.requests.lock().unwrap();
        let payment = requests
            .values_mut()
            .find_map(|r| r.payment_mut(payment_id))
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;
        payment.due_date = Some(due_date);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    pub customers: Vec<Contact>,
    pub admins: Vec<Contact>,
    pub staff: Vec<Contact>,
}

#[async_trait]
impl StaffDirectory for InMemoryDirectory {
    async fn active_admins(&self) -> Result<Vec<Contact>, AppError> {
        Ok(self.admins.clone())
    }

    async fn find_staff(&self, staff_id: Uuid) -> Result<Option<Contact>, AppError> {
        Ok(self.staff.iter().find(|c| c.user_id == staff_id).cloned())
    }

    async fn find_customer(&self, customer_id: Uuid) -> Result<Option<Contact>, AppError> {
        Ok(self.customers.iter().find(|c| c.user_id == customer_id).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct SentNotification {
    pub recipient_id: Uuid,
    pub subject: String,
    pub body: String,
    pub email: String,
}

/// Records every notification; can be told to fail for given recipients.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: Mutex<HashSet<Uuid>>,
}

impl RecordingNotifier {
    pub fn fail_for(&self, recipient_id: Uuid) {
        self.failing.lock().unwrap().insert(recipient_id);
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient_id: Uuid) -> Vec<SentNotification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient_id == recipient_id)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient_id: Uuid,
        subject: &str,
        body: &str,
        recipient_email: &str,
    ) -> bool {
        if self.failing.lock().unwrap().contains(&recipient_id) {
            return false;
        }
        self.sent.lock().unwrap().push(SentNotification {
            recipient_id,
            subject: subject.to_string(),
            body: body.to_string(),
            email: recipient_email.to_string(),
        });
        true
    }
}

pub fn contact(name: &str) -> Contact {
    Contact {
        user_id: Uuid::new_v4(),
        full_name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
    }
}

/// Everything a test needs, wired the way startup wires it.
pub struct TestHarness {
    pub repository: Arc<InMemoryRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub dedup: Arc<InMemoryDedupStore>,
    pub scheduler: Arc<PaymentDueScheduler>,
    pub manager: ServiceRequestManager,
    pub customer: Contact,
    pub admin: Contact,
    pub staff: Contact,
}

impl TestHarness {
    pub fn new() -> Self {
        init_metrics();

        let customer = contact("Acme Foods");
        let admin = contact("Office Admin");
        let staff = contact("Field Tech");

        let repository = Arc::new(InMemoryRepository::default());
        let directory = Arc::new(InMemoryDirectory {
            customers: vec![customer.clone()],
            admins: vec![admin.clone()],
            staff: vec![staff.clone()],
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let dedup = Arc::new(InMemoryDedupStore::new());
        let settings = SchedulerConfig::default();
        let timezone = settings.timezone;

        let scheduler = Arc::new(PaymentDueScheduler::new(
            repository.clone(),
            directory,
            notifier.clone(),
            dedup.clone(),
            settings,
            "₱",
        ));
        let manager = ServiceRequestManager::new(repository.clone(), scheduler.clone(), timezone);

        Self {
            repository,
            notifier,
            dedup,
            scheduler,
            manager,
            customer,
            admin,
            staff,
        }
    }

    pub fn today(&self) -> NaiveDate {
        today_in(self.scheduler.settings().timezone)
    }

    /// A request owned by the harness customer, stored before returning.
    pub fn seed_request(&self, status: ServiceStatus, with_staff: bool) -> ServiceRequest {
        let mut request = ServiceRequest::new("SR-2025-0001", self.customer.user_id);
        request.service_status = status;
        request.assigned_staff_id = with_staff.then_some(self.staff.user_id);
        request.line_items.push(service_item("Aircon cleaning", 100_000));
        request.payments = vec![
            phase("Down Payment", 50, None),
            phase("Completion Balance", 50, None),
        ];
        self.repository.insert(request.clone());
        request
    }

    /// A pending-status request with one pending payment due on `due_date`.
    pub fn seed_due_payment(&self, due_date: NaiveDate, with_staff: bool) -> ServiceRequest {
        let mut request = ServiceRequest::new("SR-2025-0042", self.customer.user_id);
        request.service_status = if with_staff {
            ServiceStatus::Assigned
        } else {
            ServiceStatus::Pending
        };
        request.assigned_staff_id = with_staff.then_some(self.staff.user_id);
        let mut payment = phase("Down Payment", 50, Some(due_date));
        payment.amount = Decimal::from(45_000);
        request.payments = vec![payment];
        self.repository.insert(request.clone());
        request
    }
}

pub fn service_item(name: &str, price: i64) -> ServiceLineItem {
    ServiceLineItem::new(CreateLineItem {
        name: name.to_string(),
        item_type: LineItemType::Service,
        unit_price: Decimal::from(price),
        quantity: Decimal::ONE,
    })
    .unwrap()
}

pub fn phase(name: &str, percentage: i64, due_date: Option<NaiveDate>) -> PaymentRecord {
    PaymentRecord::new(CreatePaymentPhase {
        payment_phase: name.to_string(),
        percentage: Decimal::from(percentage),
        due_date,
    })
    .unwrap()
}
