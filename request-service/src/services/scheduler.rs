//! Daily payment-due reminders.
//!
//! Each run scans pending payments, classifies them by days until due and
//! fans out to the customer, every active admin and the assigned staff
//! member. Every send is gated by the dedup store so a recipient gets at
//! most one notification of a given kind per payment per day. Delivery
//! failures are logged and counted; they never abort the run.

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::error::{DeliveryFailure, ServiceError};
use crate::models::{Audience, Contact, DuePayment, NotificationKind};
use crate::services::dedup::{DedupKey, DedupStore};
use crate::services::messages::{compose, PaymentContext};
use crate::services::metrics::{record_notification, record_scheduler_run};
use crate::services::notifier::Notifier;
use crate::services::repository::{RequestRepository, StaffDirectory};

/// Counts for one scheduler run or one deadline-set broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub payments_scanned: usize,
    pub payments_matched: usize,
    pub delivered: usize,
    pub skipped_duplicates: usize,
    pub failed: usize,
}

enum Outcome {
    Delivered,
    Duplicate,
    Failed,
}

impl RunSummary {
    fn count(&mut self, kind: NotificationKind, audience: Audience, outcome: Outcome) {
        let label = match outcome {
            Outcome::Delivered => {
                self.delivered += 1;
                "delivered"
            }
            Outcome::Duplicate => {
                self.skipped_duplicates += 1;
                "skipped_duplicate"
            }
            Outcome::Failed => {
                self.failed += 1;
                "failed"
            }
        };
        record_notification(kind, audience, label);
    }
}

/// Current calendar day in the scheduler's timezone.
pub fn today_in(timezone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&timezone).date_naive()
}

pub struct PaymentDueScheduler {
    repository: Arc<dyn RequestRepository>,
    directory: Arc<dyn StaffDirectory>,
    notifier: Arc<dyn Notifier>,
    dedup: Arc<dyn DedupStore>,
    settings: SchedulerConfig,
    currency_symbol: String,
    run_lock: Mutex<()>,
}

impl PaymentDueScheduler {
    pub fn new(
        repository: Arc<dyn RequestRepository>,
        directory: Arc<dyn StaffDirectory>,
        notifier: Arc<dyn Notifier>,
        dedup: Arc<dyn DedupStore>,
        settings: SchedulerConfig,
        currency_symbol: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            directory,
            notifier,
            dedup,
            settings,
            currency_symbol: currency_symbol.into(),
            run_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &SchedulerConfig {
        &self.settings
    }

    /// Run one scan for `today`. Overlapping calls in this process wait for
    /// each other.
    #[instrument(skip(self), fields(today = %today))]
    pub async fn run_once(&self, today: NaiveDate) -> Result<RunSummary, ServiceError> {
        let _guard = self.run_lock.lock().await;
        info!("Payment due scan started");

        let cutoff = Utc::now() - Duration::days(i64::from(self.settings.dedup_retention_days));
        match self.dedup.sweep(cutoff).await {
            Ok(removed) if removed > 0 => info!(removed, "Expired dedup entries removed"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Dedup sweep failed"),
        }

        let window_start = today - Duration::days(self.settings.overdue_lookback_days);
        let payments = match self.repository.list_due_payments(window_start).await {
            Ok(payments) => payments,
            Err(e) => {
                error!(error = %e, transient = e.is_transient(), "Failed to list due payments");
                record_scheduler_run("error");
                return Err(e.into());
            }
        };

        let admins = self.load_admins().await;
        let mut summary = RunSummary {
            payments_scanned: payments.len(),
            ..RunSummary::default()
        };

        for due in &payments {
            let Some(due_date) = due.payment.due_date else {
                continue;
            };
            let days_until_due = (due_date - today).num_days();
            let Some(kind) =
                NotificationKind::classify(days_until_due, self.settings.reminder_days_before)
            else {
                continue;
            };

            summary.payments_matched += 1;
            let recipients = self.recipients(due, &admins).await;
            let customer_name = customer_name(&recipients);

            for (audience, contact) in &recipients {
                let ctx = self.context(due, due_date, days_until_due, &customer_name);
                let outcome = self
                    .dispatch_once(due, kind, *audience, contact, &ctx, today)
                    .await;
                summary.count(kind, *audience, outcome);
            }
        }

        record_scheduler_run("ok");
        info!(
            scanned = summary.payments_scanned,
            matched = summary.payments_matched,
            delivered = summary.delivered,
            skipped = summary.skipped_duplicates,
            failed = summary.failed,
            "Payment due scan finished"
        );

        Ok(summary)
    }

    /// Announce a newly set payment deadline to everyone involved.
    ///
    /// Not gated by the dedup store: each call notifies once.
    #[instrument(skip(self, due), fields(payment_id = %due.payment.payment_id))]
    pub async fn notify_deadline_set(&self, due: &DuePayment, today: NaiveDate) -> RunSummary {
        let mut summary = RunSummary {
            payments_scanned: 1,
            ..RunSummary::default()
        };
        let Some(due_date) = due.payment.due_date else {
            warn!("Deadline notification requested for a payment without a due date");
            return summary;
        };

        summary.payments_matched = 1;
        let kind = NotificationKind::DeadlineSet;
        let admins = self.load_admins().await;
        let recipients = self.recipients(due, &admins).await;
        let customer_name = customer_name(&recipients);
        let days_until_due = (due_date - today).num_days();

        for (audience, contact) in &recipients {
            let ctx = self.context(due, due_date, days_until_due, &customer_name);
            let message = compose(kind, *audience, &ctx);
            let outcome = if self
                .notifier
                .notify(contact.user_id, &message.subject, &message.body, &contact.email)
                .await
            {
                Outcome::Delivered
            } else {
                log_failure(due, contact, kind, "notifier reported failure");
                Outcome::Failed
            };
            summary.count(kind, *audience, outcome);
        }

        summary
    }

    /// Register the daily job and, when configured, kick off an immediate run.
    pub async fn start(self: Arc<Self>) -> Result<JobScheduler, AppError> {
        let job_scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to create job scheduler: {}", e)))?;

        let expression = self.settings.cron_expression();
        let timezone = self.settings.timezone;

        info!(
            cron = %expression,
            timezone = %timezone,
            "Scheduling payment due reminders"
        );

        let job = Job::new_async_tz(expression.as_str(), timezone, {
            let scheduler = Arc::clone(&self);
            move |_uuid, _l| {
                let scheduler = Arc::clone(&scheduler);
                Box::pin(async move {
                    scheduler.run_scheduled().await;
                })
            }
        })
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid reminder schedule: {}", e)))?;

        job_scheduler
            .add(job)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to add reminder job: {}", e)))?;

        job_scheduler
            .start()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to start job scheduler: {}", e)))?;

        if self.settings.run_on_startup {
            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                info!("Running payment due scan on startup");
                scheduler.run_scheduled().await;
            });
        }

        Ok(job_scheduler)
    }

    async fn run_scheduled(&self) {
        let today = today_in(self.settings.timezone);
        if let Err(e) = self.run_once(today).await {
            error!(error = %e, "Scheduled payment due scan failed");
        }
    }

    async fn dispatch_once(
        &self,
        due: &DuePayment,
        kind: NotificationKind,
        audience: Audience,
        contact: &Contact,
        ctx: &PaymentContext<'_>,
        today: NaiveDate,
    ) -> Outcome {
        let key = DedupKey {
            payment_id: due.payment.payment_id,
            kind,
            recipient_id: contact.user_id,
            date: today,
        };

        match self.dedup.seen(&key).await {
            Ok(true) => return Outcome::Duplicate,
            Ok(false) => {}
            Err(e) => {
                log_failure(due, contact, kind, &format!("dedup lookup failed: {}", e));
                return Outcome::Failed;
            }
        }

        let message = compose(kind, audience, ctx);
        if !self
            .notifier
            .notify(contact.user_id, &message.subject, &message.body, &contact.email)
            .await
        {
            log_failure(due, contact, kind, "notifier reported failure");
            return Outcome::Failed;
        }

        if let Err(e) = self.dedup.mark(&key, Utc::now()).await {
            warn!(
                payment_id = %due.payment.payment_id,
                recipient_id = %contact.user_id,
                error = %e,
                "Notification sent but dedup key not recorded"
            );
        }
        Outcome::Delivered
    }

    async fn load_admins(&self) -> Vec<Contact> {
        match self.directory.active_admins().await {
            Ok(admins) => {
                if admins.is_empty() {
                    warn!("No active admins to notify");
                }
                admins
            }
            Err(e) => {
                error!(error = %e, "Failed to load admin contacts");
                Vec::new()
            }
        }
    }

    /// Customer first, then admins, then the assigned staff member.
    async fn recipients(&self, due: &DuePayment, admins: &[Contact]) -> Vec<(Audience, Contact)> {
        let mut recipients = Vec::with_capacity(admins.len() + 2);

        match self.directory.find_customer(due.customer_id).await {
            Ok(Some(customer)) => recipients.push((Audience::Customer, customer)),
            Ok(None) => warn!(
                request_id = %due.request_id,
                customer_id = %due.customer_id,
                "Customer not found, skipping customer notification"
            ),
            Err(e) => error!(
                request_id = %due.request_id,
                error = %e,
                "Failed to look up customer"
            ),
        }

        recipients.extend(admins.iter().cloned().map(|a| (Audience::Admin, a)));

        if let Some(staff_id) = due.assigned_staff_id {
            match self.directory.find_staff(staff_id).await {
                Ok(Some(staff)) => recipients.push((Audience::Staff, staff)),
                Ok(None) => warn!(
                    request_id = %due.request_id,
                    staff_id = %staff_id,
                    "Assigned staff member not found or inactive"
                ),
                Err(e) => error!(
                    request_id = %due.request_id,
                    error = %e,
                    "Failed to look up assigned staff member"
                ),
            }
        }

        recipients
    }

    fn context<'a>(
        &'a self,
        due: &'a DuePayment,
        due_date: NaiveDate,
        days_until_due: i64,
        customer_name: &'a str,
    ) -> PaymentContext<'a> {
        PaymentContext {
            request_number: &due.request_number,
            payment_phase: &due.payment.payment_phase,
            amount: due.payment.amount,
            due_date,
            days_until_due,
            currency_symbol: &self.currency_symbol,
            customer_name,
        }
    }
}

fn customer_name(recipients: &[(Audience, Contact)]) -> String {
    recipients
        .iter()
        .find(|(audience, _)| *audience == Audience::Customer)
        .map(|(_, c)| c.full_name.clone())
        .unwrap_or_else(|| "the customer".to_string())
}

fn log_failure(due: &DuePayment, contact: &Contact, kind: NotificationKind, reason: &str) {
    let failure = DeliveryFailure {
        payment_id: due.payment.payment_id,
        recipient_id: contact.user_id,
        kind: kind.as_str(),
        reason: reason.to_string(),
    };
    warn!(
        payment_id = %failure.payment_id,
        recipient_id = %failure.recipient_id,
        kind = failure.kind,
        "{}",
        failure
    );
}
