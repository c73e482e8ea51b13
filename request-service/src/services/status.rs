//! Service status state machine.
//!
//! Everything here is pure: functions take the request (or a draft of it),
//! decide, and either return a rejection without touching anything or apply
//! the change in one step. Persistence happens elsewhere.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::StatusRestrictionError;
use crate::models::{Actor, ActorRole, ServiceRequest, ServiceStatus};

/// A transition that was accepted and applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from: ServiceStatus,
    pub to: ServiceStatus,
    /// Set when entering Ongoing filled in an empty service start date.
    pub start_date_set: Option<NaiveDate>,
}

impl StatusChange {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Message the caller must surface to the operator alongside a successful
/// load or save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// Persisted status contradicted the staff assignment and was corrected.
    StatusCorrected {
        from: ServiceStatus,
        to: ServiceStatus,
    },
    /// Staff was assigned to a pending request, so it moved to Assigned.
    AutoPromoted { to: ServiceStatus },
    /// Persisted data breaks an invariant that has no safe correction.
    Inconsistent { detail: String },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::StatusCorrected { from, to } => write!(
                f,
                "Status was inconsistent ({} without an assigned staff member) and has been corrected to {}.",
                from, to
            ),
            Advisory::AutoPromoted { to } => write!(
                f,
                "Status changed to {} because a staff member was assigned.",
                to
            ),
            Advisory::Inconsistent { detail } => write!(f, "Data inconsistency: {}", detail),
        }
    }
}

/// Status to present or persist, plus what the caller should be told.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub effective_status: ServiceStatus,
    pub advisories: Vec<Advisory>,
}

/// Outcome of reconciling a draft before it is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveReconciliation {
    Proceed(Reconciliation),
    /// Staff was cleared on an Assigned request: the save is refused, the
    /// draft goes back to Pending and the caller has to submit again.
    RevertToPending,
}

/// Check whether `requested` may be entered from the request's current state.
pub fn check_transition(
    request: &ServiceRequest,
    requested: ServiceStatus,
    actor: &Actor,
) -> Result<(), StatusRestrictionError> {
    let current = request.service_status;

    if requested.requires_staff() && !request.has_staff() {
        return Err(StatusRestrictionError::StaffRequired { requested });
    }

    if requested == current {
        return Ok(());
    }

    if current.is_terminal() {
        return Err(StatusRestrictionError::Terminal { current });
    }

    match requested {
        ServiceStatus::Pending => require_pre_approval(current, requested, &[
            ServiceStatus::Assigned,
            ServiceStatus::WaitingForApproval,
        ]),
        ServiceStatus::Assigned => require_pre_approval(current, requested, &[
            ServiceStatus::Pending,
            ServiceStatus::WaitingForApproval,
        ]),
        ServiceStatus::WaitingForApproval => require_pre_approval(current, requested, &[
            ServiceStatus::Pending,
            ServiceStatus::Assigned,
        ]),
        ServiceStatus::Approved => Err(StatusRestrictionError::ApprovalRequiresCustomer),
        ServiceStatus::Ongoing => {
            if current != ServiceStatus::Approved {
                return Err(StatusRestrictionError::NotApproved);
            }
            Ok(())
        }
        ServiceStatus::Completed => check_completion(request),
        ServiceStatus::Cancelled => {
            if actor.role != ActorRole::Admin {
                return Err(StatusRestrictionError::CancelNotPermitted);
            }
            Ok(())
        }
    }
}

fn require_pre_approval(
    current: ServiceStatus,
    requested: ServiceStatus,
    allowed_from: &[ServiceStatus],
) -> Result<(), StatusRestrictionError> {
    if allowed_from.contains(&current) {
        Ok(())
    } else {
        Err(StatusRestrictionError::BackwardMove { current, requested })
    }
}

fn check_completion(request: &ServiceRequest) -> Result<(), StatusRestrictionError> {
    if request.service_status != ServiceStatus::Ongoing {
        return Err(StatusRestrictionError::NotOngoing);
    }
    if request.service_end_date.is_none() {
        return Err(StatusRestrictionError::MissingEndDate);
    }

    let items = request.items_missing_warranty();
    if !items.is_empty() {
        return Err(StatusRestrictionError::IncompleteWarranty { items });
    }
    Ok(())
}

/// Validate and apply a status change requested through the status editor.
///
/// On rejection the request is untouched.
pub fn apply_status_change(
    request: &mut ServiceRequest,
    requested: ServiceStatus,
    actor: &Actor,
    today: NaiveDate,
) -> Result<StatusChange, StatusRestrictionError> {
    check_transition(request, requested, actor)?;

    let from = request.service_status;
    let mut start_date_set = None;

    if requested == ServiceStatus::Ongoing
        && from != ServiceStatus::Ongoing
        && request.service_start_date.is_none()
    {
        request.service_start_date = Some(today);
        start_date_set = Some(today);
    }

    request.service_status = requested;

    Ok(StatusChange {
        from,
        to: requested,
        start_date_set,
    })
}

/// The customer-approval action: Waiting for Approval -> Approved.
pub fn apply_customer_approval(
    request: &mut ServiceRequest,
    actor: &Actor,
) -> Result<StatusChange, StatusRestrictionError> {
    if actor.role != ActorRole::Customer {
        return Err(StatusRestrictionError::ApprovalRequiresCustomer);
    }

    let current = request.service_status;
    if current != ServiceStatus::WaitingForApproval {
        return Err(StatusRestrictionError::NotAwaitingApproval { current });
    }

    request.service_status = ServiceStatus::Approved;
    Ok(StatusChange {
        from: current,
        to: ServiceStatus::Approved,
        start_date_set: None,
    })
}

/// Resolve the status to present for a request as loaded from storage.
pub fn reconcile_loaded(request: &ServiceRequest) -> Reconciliation {
    let mut advisories = Vec::new();
    let mut effective_status = request.service_status;

    if request.service_status == ServiceStatus::Assigned && !request.has_staff() {
        effective_status = ServiceStatus::Pending;
        advisories.push(Advisory::StatusCorrected {
            from: ServiceStatus::Assigned,
            to: ServiceStatus::Pending,
        });
    }

    if request.service_status == ServiceStatus::WaitingForApproval && !request.has_staff() {
        advisories.push(Advisory::Inconsistent {
            detail: "request is waiting for approval but has no assigned staff member"
                .to_string(),
        });
    }

    if request.service_status == ServiceStatus::Completed {
        if request.service_end_date.is_none() {
            advisories.push(Advisory::Inconsistent {
                detail: "request is completed but has no service end date".to_string(),
            });
        }
        let items = request.items_missing_warranty();
        if !items.is_empty() {
            advisories.push(Advisory::Inconsistent {
                detail: format!(
                    "request is completed but warranty details are missing for: {}",
                    items.join(", ")
                ),
            });
        }
    }

    Reconciliation {
        effective_status,
        advisories,
    }
}

/// Resolve the status to persist for a draft about to be saved.
pub fn reconcile_for_save(draft: &ServiceRequest) -> SaveReconciliation {
    match (draft.service_status, draft.has_staff()) {
        (ServiceStatus::Assigned, false) => SaveReconciliation::RevertToPending,
        (ServiceStatus::Pending, true) => SaveReconciliation::Proceed(Reconciliation {
            effective_status: ServiceStatus::Assigned,
            advisories: vec![Advisory::AutoPromoted {
                to: ServiceStatus::Assigned,
            }],
        }),
        (status, _) => SaveReconciliation::Proceed(Reconciliation {
            effective_status: status,
            advisories: Vec::new(),
        }),
    }
}
