//! Request-level operations invoked by the admin, staff and customer surfaces.
//!
//! Every mutating operation follows the same shape: load the persisted
//! request, validate the change against it, reconcile the status, apply the
//! change to a copy and persist that copy in one save. A rejected operation
//! leaves both the stored request and the caller's draft untouched, except
//! for the staff-unassignment revert which deliberately rewrites the draft.

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{ServiceError, StatusRestrictionError, ValidationError};
use crate::models::{
    Actor, ActorRole, CreateLineItem, Discount, DuePayment, PaymentRecordStatus, PaymentStatus,
    ServiceLineItem, ServiceRequest, ServiceStatus,
};
use crate::services::breakdown::{recalculate_amounts, PaymentBreakdown};
use crate::services::metrics::record_transition;
use crate::services::repository::RequestRepository;
use crate::services::scheduler::{today_in, PaymentDueScheduler, RunSummary};
use crate::services::status::{
    apply_customer_approval, apply_status_change, reconcile_for_save, reconcile_loaded, Advisory,
    SaveReconciliation, StatusChange,
};

/// A request as presented to callers, with its effective status.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedRequest {
    pub request: ServiceRequest,
    pub advisories: Vec<Advisory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub effective_status: ServiceStatus,
    pub status_change: Option<StatusChange>,
    pub advisories: Vec<Advisory>,
    /// Present when payment amounts were recalculated.
    pub breakdown: Option<PaymentBreakdown>,
}

pub struct ServiceRequestManager {
    repository: Arc<dyn RequestRepository>,
    scheduler: Arc<PaymentDueScheduler>,
    timezone: Tz,
}

impl ServiceRequestManager {
    pub fn new(
        repository: Arc<dyn RequestRepository>,
        scheduler: Arc<PaymentDueScheduler>,
        timezone: Tz,
    ) -> Self {
        Self {
            repository,
            scheduler,
            timezone,
        }
    }

    fn today(&self) -> NaiveDate {
        today_in(self.timezone)
    }

    /// Load a request, correcting a legacy Assigned-without-staff status.
    ///
    /// The correction is written back, so its advisory is reported once.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn load_request(&self, request_id: Uuid) -> Result<LoadedRequest, ServiceError> {
        let mut request = self.repository.load_request(request_id).await?;
        let reconciliation = reconcile_loaded(&request);
        log_advisories(request_id, &reconciliation.advisories);

        if request.service_status != reconciliation.effective_status {
            let from = request.service_status;
            request.service_status = reconciliation.effective_status;
            match self
                .repository
                .save_request(&request, request.service_status)
                .await
            {
                Ok(()) => record_transition(from, request.service_status, true),
                Err(e) => warn!(error = %e, "Failed to persist corrected status"),
            }
        }

        Ok(LoadedRequest {
            request,
            advisories: reconciliation.advisories,
        })
    }

    /// Status editor: move a request to `requested` and persist it.
    #[instrument(skip(self, actor), fields(request_id = %request_id, requested = %requested))]
    pub async fn change_status(
        &self,
        request_id: Uuid,
        requested: ServiceStatus,
        actor: &Actor,
    ) -> Result<SaveOutcome, ServiceError> {
        let LoadedRequest {
            mut request,
            advisories,
        } = self.load_request(request_id).await?;

        let change = self.transition(&mut request, requested, actor)?;
        self.repository
            .save_request(&request, request.service_status)
            .await?;

        info!(from = %change.from, to = %change.to, "Service status changed");

        Ok(SaveOutcome {
            effective_status: request.service_status,
            status_change: Some(change),
            advisories,
            breakdown: None,
        })
    }

    /// Persist an edited draft of a request.
    ///
    /// Payment status, due dates and proof files are taken from the stored
    /// request; only `record_payment` and `set_payment_due_date` change them.
    /// On success the draft is replaced by what was stored. When the draft
    /// unassigns staff from an Assigned request, nothing is stored, the
    /// draft's status is set to Pending and `StaffUnassigned` is returned;
    /// saving the draft again then goes through.
    #[instrument(skip(self, draft, actor), fields(request_id = %draft.request_id))]
    pub async fn save(
        &self,
        draft: &mut ServiceRequest,
        actor: &Actor,
    ) -> Result<SaveOutcome, ServiceError> {
        validate_draft(draft)?;

        let persisted = self.repository.load_request(draft.request_id).await?;
        let loaded = reconcile_loaded(&persisted);
        let current = loaded.effective_status;
        let mut advisories = loaded.advisories;

        check_payment_schedule(&persisted, draft)?;

        let discount_changed = draft.discount != persisted.discount;
        if discount_changed && !current.allows_discount_changes() {
            return Err(StatusRestrictionError::DiscountLocked { current }.into());
        }

        let items_changed = !same_pricing(&persisted, draft);
        if items_changed && !current.allows_item_changes() {
            return Err(StatusRestrictionError::ItemsLocked { current }.into());
        }

        if current.is_terminal() && !same_warranties(&persisted, draft) {
            return Err(StatusRestrictionError::Terminal { current }.into());
        }

        let target = match reconcile_for_save(draft) {
            SaveReconciliation::RevertToPending if current == ServiceStatus::Assigned => {
                draft.service_status = ServiceStatus::Pending;
                record_transition(current, ServiceStatus::Pending, false);
                warn!("Staff unassigned from an Assigned request, status reverted to Pending");
                return Err(StatusRestrictionError::StaffUnassigned.into());
            }
            // Asking for Assigned without staff; the transition check rejects it.
            SaveReconciliation::RevertToPending => draft.service_status,
            SaveReconciliation::Proceed(reconciliation) => {
                advisories.extend(reconciliation.advisories);
                reconciliation.effective_status
            }
        };

        let mut candidate = draft.clone();
        candidate.payments = persisted.payments.clone();
        candidate.service_status = current;
        let change = self.transition(&mut candidate, target, actor)?;

        let breakdown = if discount_changed || items_changed {
            recalculate_amounts(candidate.base_total(), candidate.discount, &mut candidate.payments)
        } else {
            None
        };

        self.repository
            .save_request(&candidate, candidate.service_status)
            .await?;

        log_advisories(candidate.request_id, &advisories);
        info!(
            status = %candidate.service_status,
            recalculated = breakdown.is_some(),
            "Service request changes saved"
        );

        *draft = candidate;

        Ok(SaveOutcome {
            effective_status: draft.service_status,
            status_change: (!change.is_noop()).then_some(change),
            advisories,
            breakdown,
        })
    }

    pub async fn update_discount(
        &self,
        request_id: Uuid,
        discount: Discount,
        actor: &Actor,
    ) -> Result<SaveOutcome, ServiceError> {
        let mut draft = self.load_request(request_id).await?.request;
        draft.discount = discount;
        self.save(&mut draft, actor).await
    }

    pub async fn add_line_item(
        &self,
        request_id: Uuid,
        input: CreateLineItem,
        actor: &Actor,
    ) -> Result<SaveOutcome, ServiceError> {
        let item = ServiceLineItem::new(input)?;
        let mut draft = self.load_request(request_id).await?.request;
        draft.line_items.push(item);
        self.save(&mut draft, actor).await
    }

    pub async fn remove_line_item(
        &self,
        request_id: Uuid,
        line_item_id: Uuid,
        actor: &Actor,
    ) -> Result<SaveOutcome, ServiceError> {
        let mut draft = self.load_request(request_id).await?.request;
        let before = draft.line_items.len();
        draft.line_items.retain(|item| item.line_item_id != line_item_id);
        if draft.line_items.len() == before {
            return Err(ValidationError::UnknownLineItem(line_item_id).into());
        }
        self.save(&mut draft, actor).await
    }

    /// Record warranty terms on a service item. Allowed until the request is
    /// closed, since warranties are usually filled in while work is ongoing.
    pub async fn set_warranty(
        &self,
        request_id: Uuid,
        line_item_id: Uuid,
        months: Option<u32>,
        start_date: Option<NaiveDate>,
        actor: &Actor,
    ) -> Result<SaveOutcome, ServiceError> {
        let mut draft = self.load_request(request_id).await?.request;
        let item = draft
            .line_items
            .iter_mut()
            .find(|item| item.line_item_id == line_item_id)
            .ok_or(ValidationError::UnknownLineItem(line_item_id))?;
        item.set_warranty(months, start_date)?;
        self.save(&mut draft, actor).await
    }

    /// The customer portal's approval action.
    #[instrument(skip(self, actor), fields(request_id = %request_id, user_id = %actor.user_id))]
    pub async fn record_customer_approval(
        &self,
        request_id: Uuid,
        actor: &Actor,
    ) -> Result<SaveOutcome, ServiceError> {
        let LoadedRequest {
            mut request,
            advisories,
        } = self.load_request(request_id).await?;

        if actor.role == ActorRole::Customer && actor.user_id != request.customer_id {
            return Err(ValidationError::NotRequestOwner(actor.user_id).into());
        }

        let from = request.service_status;
        let change = match apply_customer_approval(&mut request, actor) {
            Ok(change) => change,
            Err(e) => {
                record_transition(from, ServiceStatus::Approved, false);
                return Err(e.into());
            }
        };
        record_transition(change.from, change.to, true);

        self.repository
            .save_request(&request, request.service_status)
            .await?;

        info!("Customer approved service request");

        Ok(SaveOutcome {
            effective_status: request.service_status,
            status_change: Some(change),
            advisories,
            breakdown: None,
        })
    }

    pub async fn cancel(&self, request_id: Uuid, actor: &Actor) -> Result<SaveOutcome, ServiceError> {
        self.change_status(request_id, ServiceStatus::Cancelled, actor)
            .await
    }

    /// Update one installment and return the request's derived payment status.
    #[instrument(skip(self, proof_of_payment_file), fields(request_id = %request_id, payment_id = %payment_id))]
    pub async fn record_payment(
        &self,
        request_id: Uuid,
        payment_id: Uuid,
        status: PaymentRecordStatus,
        proof_of_payment_file: Option<String>,
    ) -> Result<PaymentStatus, ServiceError> {
        let mut request = self.repository.load_request(request_id).await?;
        let payment = request
            .payment_mut(payment_id)
            .ok_or(ValidationError::UnknownPayment(payment_id))?;

        payment.status = status;
        if proof_of_payment_file.is_some() {
            payment.proof_of_payment_file = proof_of_payment_file.clone();
        }

        self.repository
            .update_payment_status(payment_id, status, proof_of_payment_file)
            .await?;

        let derived = request.payment_status();
        info!(
            payment_status = status.as_str(),
            request_payment_status = derived.as_str(),
            "Payment recorded"
        );
        Ok(derived)
    }

    /// Set an installment's due date. When the date actually changes, the
    /// customer, admins and assigned staff are told once.
    #[instrument(skip(self), fields(request_id = %request_id, payment_id = %payment_id))]
    pub async fn set_payment_due_date(
        &self,
        request_id: Uuid,
        payment_id: Uuid,
        due_date: NaiveDate,
    ) -> Result<Option<RunSummary>, ServiceError> {
        let mut request = self.repository.load_request(request_id).await?;
        let payment = request
            .payment_mut(payment_id)
            .ok_or(ValidationError::UnknownPayment(payment_id))?;

        if payment.due_date == Some(due_date) {
            return Ok(None);
        }
        payment.due_date = Some(due_date);
        let payment = payment.clone();

        self.repository
            .update_payment_due_date(payment_id, due_date)
            .await?;

        let due = DuePayment {
            payment,
            request_id: request.request_id,
            request_number: request.request_number.clone(),
            customer_id: request.customer_id,
            assigned_staff_id: request.assigned_staff_id,
        };
        let summary = self.scheduler.notify_deadline_set(&due, self.today()).await;
        Ok(Some(summary))
    }

    fn transition(
        &self,
        request: &mut ServiceRequest,
        requested: ServiceStatus,
        actor: &Actor,
    ) -> Result<StatusChange, StatusRestrictionError> {
        let from = request.service_status;
        match apply_status_change(request, requested, actor, self.today()) {
            Ok(change) => {
                if !change.is_noop() {
                    record_transition(change.from, change.to, true);
                }
                if let Some(day) = change.start_date_set {
                    info!(service_start_date = %day, "Service start date set");
                }
                Ok(change)
            }
            Err(e) => {
                record_transition(from, requested, false);
                warn!(from = %from, requested = %requested, reason = %e, "Status change rejected");
                Err(e)
            }
        }
    }
}

fn validate_draft(draft: &ServiceRequest) -> Result<(), ValidationError> {
    draft.discount.validate()?;
    draft.line_items.iter().try_for_each(ServiceLineItem::validate)
}

/// Payment phases and their percentages are fixed once created.
fn check_payment_schedule(
    persisted: &ServiceRequest,
    draft: &ServiceRequest,
) -> Result<(), ValidationError> {
    let unchanged = persisted.payments.len() == draft.payments.len()
        && persisted.payments.iter().zip(&draft.payments).all(|(a, b)| {
            a.payment_id == b.payment_id
                && a.payment_phase == b.payment_phase
                && a.percentage == b.percentage
        });
    if unchanged {
        Ok(())
    } else {
        Err(ValidationError::PaymentScheduleChanged)
    }
}

fn same_pricing(persisted: &ServiceRequest, draft: &ServiceRequest) -> bool {
    persisted
        .line_items
        .iter()
        .map(ServiceLineItem::pricing_key)
        .eq(draft.line_items.iter().map(ServiceLineItem::pricing_key))
}

fn same_warranties(persisted: &ServiceRequest, draft: &ServiceRequest) -> bool {
    persisted
        .line_items
        .iter()
        .map(|i| (i.line_item_id, i.warranty))
        .eq(draft.line_items.iter().map(|i| (i.line_item_id, i.warranty)))
}

fn log_advisories(request_id: Uuid, advisories: &[Advisory]) {
    for advisory in advisories {
        match advisory {
            Advisory::AutoPromoted { .. } => info!(request_id = %request_id, "{}", advisory),
            _ => warn!(request_id = %request_id, "{}", advisory),
        }
    }
}
