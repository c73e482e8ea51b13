//! Save, status and payment workflow tests for the request manager.

mod common;

use chrono::Duration;
use common::{service_item, TestHarness};
use request_service::error::{ServiceError, StatusRestrictionError, ValidationError};
use request_service::models::{
    Actor, CreateLineItem, Discount, LineItemType, PaymentRecordStatus, PaymentStatus,
    ServiceStatus,
};
use request_service::services::Advisory;
use rust_decimal::Decimal;
use uuid::Uuid;

fn admin() -> Actor {
    Actor::admin(Uuid::new_v4())
}

fn restriction(err: ServiceError) -> StatusRestrictionError {
    match err {
        ServiceError::Restriction(r) => r,
        other => panic!("expected a status restriction, got {:?}", other),
    }
}

#[tokio::test]
async fn assigning_staff_to_pending_request_promotes_it() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Pending, false);

    let mut draft = harness
        .manager
        .load_request(request.request_id)
        .await
        .unwrap()
        .request;
    draft.assigned_staff_id = Some(harness.staff.user_id);

    let outcome = harness.manager.save(&mut draft, &admin()).await.unwrap();

    assert_eq!(outcome.effective_status, ServiceStatus::Assigned);
    assert_eq!(
        outcome.advisories,
        vec![Advisory::AutoPromoted {
            to: ServiceStatus::Assigned
        }]
    );
    assert_eq!(draft.service_status, ServiceStatus::Assigned);
    assert_eq!(
        harness.repository.get(request.request_id).service_status,
        ServiceStatus::Assigned
    );
}

#[tokio::test]
async fn unassigning_staff_reverts_then_requires_a_second_save() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Assigned, true);

    let mut draft = harness
        .manager
        .load_request(request.request_id)
        .await
        .unwrap()
        .request;
    draft.assigned_staff_id = None;

    let err = harness.manager.save(&mut draft, &admin()).await.unwrap_err();
    assert_eq!(restriction(err), StatusRestrictionError::StaffUnassigned);
    assert_eq!(draft.service_status, ServiceStatus::Pending);

    let stored = harness.repository.get(request.request_id);
    assert_eq!(stored.service_status, ServiceStatus::Assigned);
    assert_eq!(stored.assigned_staff_id, Some(harness.staff.user_id));
    assert_eq!(harness.repository.save_count(), 0);

    let outcome = harness.manager.save(&mut draft, &admin()).await.unwrap();
    assert_eq!(outcome.effective_status, ServiceStatus::Pending);

    let stored = harness.repository.get(request.request_id);
    assert_eq!(stored.service_status, ServiceStatus::Pending);
    assert_eq!(stored.assigned_staff_id, None);
}

#[tokio::test]
async fn legacy_assigned_without_staff_loads_as_pending() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Assigned, false);

    let loaded = harness.manager.load_request(request.request_id).await.unwrap();

    assert_eq!(loaded.request.service_status, ServiceStatus::Pending);
    assert_eq!(
        loaded.advisories,
        vec![Advisory::StatusCorrected {
            from: ServiceStatus::Assigned,
            to: ServiceStatus::Pending
        }]
    );
    assert_eq!(
        harness.repository.get(request.request_id).service_status,
        ServiceStatus::Pending
    );

    let reloaded = harness.manager.load_request(request.request_id).await.unwrap();
    assert!(reloaded.advisories.is_empty());
}

#[tokio::test]
async fn status_requiring_staff_is_rejected_without_staff() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Pending, false);

    for requested in [ServiceStatus::Assigned, ServiceStatus::WaitingForApproval] {
        let err = harness
            .manager
            .change_status(request.request_id, requested, &admin())
            .await
            .unwrap_err();
        assert_eq!(
            restriction(err),
            StatusRestrictionError::StaffRequired { requested }
        );
    }

    assert_eq!(
        harness.repository.get(request.request_id).service_status,
        ServiceStatus::Pending
    );
}

#[tokio::test]
async fn discount_change_recalculates_every_installment() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Assigned, true);
    let discount = Discount::percent(Decimal::from(10)).unwrap();

    let outcome = harness
        .manager
        .update_discount(request.request_id, discount, &admin())
        .await
        .unwrap();

    let breakdown = outcome.breakdown.expect("amounts recalculated");
    assert_eq!(breakdown.discounted_total, Decimal::from(90_000));

    let stored = harness.repository.get(request.request_id);
    assert_eq!(stored.discount, discount);
    assert!(stored
        .payments
        .iter()
        .all(|p| p.amount == Decimal::from(45_000)));
}

#[tokio::test]
async fn discount_is_locked_once_work_starts() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Ongoing, true);

    let err = harness
        .manager
        .update_discount(
            request.request_id,
            Discount::percent(Decimal::from(5)).unwrap(),
            &admin(),
        )
        .await
        .unwrap_err();

    assert_eq!(
        restriction(err),
        StatusRestrictionError::DiscountLocked {
            current: ServiceStatus::Ongoing
        }
    );
    assert_eq!(harness.repository.get(request.request_id).discount, Discount::None);
}

#[tokio::test]
async fn line_items_are_locked_outside_editable_statuses() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::WaitingForApproval, true);

    let err = harness
        .manager
        .add_line_item(
            request.request_id,
            CreateLineItem {
                name: "R32 refill".to_string(),
                item_type: LineItemType::Refrigerant,
                unit_price: Decimal::from(3_500),
                quantity: Decimal::from(2),
            },
            &admin(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        restriction(err),
        StatusRestrictionError::ItemsLocked { .. }
    ));
}

#[tokio::test]
async fn adding_an_item_reprices_the_schedule() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Pending, false);

    harness
        .manager
        .add_line_item(
            request.request_id,
            CreateLineItem {
                name: "Coil cleaner".to_string(),
                item_type: LineItemType::Chemical,
                unit_price: Decimal::from(10_000),
                quantity: Decimal::ONE,
            },
            &admin(),
        )
        .await
        .unwrap();

    let stored = harness.repository.get(request.request_id);
    assert_eq!(stored.line_items.len(), 2);
    assert_eq!(stored.line_items[1].warranty, None);
    assert_eq!(stored.payments[0].amount, Decimal::from(55_000));

    let removed = stored.line_items[1].line_item_id;
    harness
        .manager
        .remove_line_item(request.request_id, removed, &admin())
        .await
        .unwrap();
    assert_eq!(
        harness.repository.get(request.request_id).payments[0].amount,
        Decimal::from(50_000)
    );

    let err = harness
        .manager
        .remove_line_item(request.request_id, removed, &admin())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::UnknownLineItem(_))
    ));
}

#[tokio::test]
async fn completion_requires_end_date_and_every_warranty() {
    let harness = TestHarness::new();
    let mut request = harness.seed_request(ServiceStatus::Ongoing, true);
    request.line_items.push(service_item("Duct sealing", 20_000));
    request.service_end_date = Some(harness.today());
    harness.repository.insert(request.clone());

    let first = request.line_items[0].line_item_id;
    harness
        .manager
        .set_warranty(
            request.request_id,
            first,
            Some(12),
            Some(harness.today()),
            &admin(),
        )
        .await
        .unwrap();

    let err = harness
        .manager
        .change_status(request.request_id, ServiceStatus::Completed, &admin())
        .await
        .unwrap_err();
    assert_eq!(
        restriction(err),
        StatusRestrictionError::IncompleteWarranty {
            items: vec!["Duct sealing".to_string()]
        }
    );
    assert_eq!(
        harness.repository.get(request.request_id).service_status,
        ServiceStatus::Ongoing
    );

    let second = request.line_items[1].line_item_id;
    harness
        .manager
        .set_warranty(
            request.request_id,
            second,
            Some(6),
            Some(harness.today()),
            &admin(),
        )
        .await
        .unwrap();

    let outcome = harness
        .manager
        .change_status(request.request_id, ServiceStatus::Completed, &admin())
        .await
        .unwrap();
    assert_eq!(outcome.effective_status, ServiceStatus::Completed);
}

#[tokio::test]
async fn customer_approval_unlocks_ongoing() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::WaitingForApproval, true);

    let err = harness
        .manager
        .change_status(request.request_id, ServiceStatus::Ongoing, &admin())
        .await
        .unwrap_err();
    assert_eq!(restriction(err), StatusRestrictionError::NotApproved);

    let stranger = Actor::customer(Uuid::new_v4());
    let err = harness
        .manager
        .record_customer_approval(request.request_id, &stranger)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::NotRequestOwner(_))
    ));

    let owner = Actor::customer(harness.customer.user_id);
    harness
        .manager
        .record_customer_approval(request.request_id, &owner)
        .await
        .unwrap();

    let outcome = harness
        .manager
        .change_status(request.request_id, ServiceStatus::Ongoing, &admin())
        .await
        .unwrap();
    let change = outcome.status_change.unwrap();
    assert_eq!(change.start_date_set, Some(harness.today()));
    assert_eq!(
        harness.repository.get(request.request_id).service_start_date,
        Some(harness.today())
    );
}

#[tokio::test]
async fn only_admins_cancel() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Assigned, true);

    let err = harness
        .manager
        .cancel(request.request_id, &Actor::staff(harness.staff.user_id))
        .await
        .unwrap_err();
    assert_eq!(restriction(err), StatusRestrictionError::CancelNotPermitted);

    let outcome = harness
        .manager
        .cancel(request.request_id, &admin())
        .await
        .unwrap();
    assert_eq!(outcome.effective_status, ServiceStatus::Cancelled);

    let err = harness
        .manager
        .change_status(request.request_id, ServiceStatus::Pending, &admin())
        .await
        .unwrap_err();
    assert!(matches!(
        restriction(err),
        StatusRestrictionError::Terminal { .. }
    ));
}

#[tokio::test]
async fn payment_status_follows_recorded_installments() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Ongoing, true);
    let down = request.payments[0].payment_id;
    let balance = request.payments[1].payment_id;

    let status = harness
        .manager
        .record_payment(
            request.request_id,
            down,
            PaymentRecordStatus::Paid,
            Some("receipts/down-payment.pdf".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::Partial);

    let status = harness
        .manager
        .record_payment(request.request_id, balance, PaymentRecordStatus::Paid, None)
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::Paid);

    let stored = harness.repository.get(request.request_id);
    assert_eq!(
        stored.payments[0].proof_of_payment_file.as_deref(),
        Some("receipts/down-payment.pdf")
    );
}

#[tokio::test]
async fn payment_schedule_cannot_be_rewritten_on_save() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Pending, false);

    let mut draft = harness
        .manager
        .load_request(request.request_id)
        .await
        .unwrap()
        .request;
    draft.payments[0].percentage = Decimal::from(70);
    draft.service_end_date = Some(harness.today() + Duration::days(7));

    let err = harness.manager.save(&mut draft, &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::PaymentScheduleChanged)
    ));
    assert_eq!(harness.repository.get(request.request_id).service_end_date, None);
}

#[tokio::test]
async fn out_of_range_discount_is_rejected_before_any_write() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Assigned, true);

    for percent in [-20, 150] {
        let err = harness
            .manager
            .update_discount(
                request.request_id,
                Discount::Percent(Decimal::from(percent)),
                &admin(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::DiscountOutOfRange(_))
        ));
    }

    let stored = harness.repository.get(request.request_id);
    assert_eq!(stored.discount, Discount::None);
    assert_eq!(stored.payments, request.payments);
    assert_eq!(harness.repository.save_count(), 0);
}

#[tokio::test]
async fn draft_items_are_revalidated_on_save() {
    let harness = TestHarness::new();
    let request = harness.seed_request(ServiceStatus::Pending, false);

    let mut draft = harness
        .manager
        .load_request(request.request_id)
        .await
        .unwrap()
        .request;
    let mut bad = service_item("Free inspection", 0);
    bad.unit_price = Decimal::NEGATIVE_ONE;
    draft.line_items.push(bad);

    let err = harness.manager.save(&mut draft, &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::NegativePrice(_))
    ));

    draft.line_items.pop();
    draft.line_items[0].quantity = Decimal::ZERO;
    let err = harness.manager.save(&mut draft, &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::NonPositiveQuantity(_))
    ));

    let stored = harness.repository.get(request.request_id);
    assert_eq!(stored.line_items, request.line_items);
    assert_eq!(harness.repository.save_count(), 0);
}

#[tokio::test]
async fn stale_draft_does_not_undo_a_recorded_payment() {
    let harness = TestHarness::new();
    let today = harness.today();
    let request = harness.seed_due_payment(today + Duration::days(3), true);
    let payment_id = request.payments[0].payment_id;

    let mut stale = harness
        .manager
        .load_request(request.request_id)
        .await
        .unwrap()
        .request;

    harness
        .manager
        .record_payment(
            request.request_id,
            payment_id,
            PaymentRecordStatus::Paid,
            Some("receipts/proof.pdf".to_string()),
        )
        .await
        .unwrap();

    stale.service_end_date = Some(today + Duration::days(7));
    harness.manager.save(&mut stale, &admin()).await.unwrap();

    let stored = harness.repository.get(request.request_id);
    assert_eq!(stored.service_end_date, Some(today + Duration::days(7)));
    assert_eq!(stored.payments[0].status, PaymentRecordStatus::Paid);
    assert_eq!(
        stored.payments[0].proof_of_payment_file.as_deref(),
        Some("receipts/proof.pdf")
    );
    assert_eq!(stale.payments[0].status, PaymentRecordStatus::Paid);

    let summary = harness.scheduler.run_once(today).await.unwrap();
    assert_eq!(summary.payments_scanned, 0);
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn due_dates_only_move_through_the_deadline_operation() {
    let harness = TestHarness::new();
    let today = harness.today();
    let request = harness.seed_request(ServiceStatus::Assigned, true);

    let mut draft = harness
        .manager
        .load_request(request.request_id)
        .await
        .unwrap()
        .request;
    draft.payments[0].due_date = Some(today + Duration::days(5));

    harness.manager.save(&mut draft, &admin()).await.unwrap();

    assert_eq!(harness.repository.get(request.request_id).payments[0].due_date, None);
    assert_eq!(draft.payments[0].due_date, None);
    assert!(harness.notifier.sent().is_empty());
}
