use chrono::Duration;

use super::common::*;
use crate::settlement::clock::Clock;
use crate::settlement::domain::{AdvanceId, AdvanceStatus};
use crate::settlement::error::{SettlementError, ValidationError};
use crate::settlement::money::Money;
use crate::settlement::repository::{AdvanceRepository, NotificationEvent};

#[test]
fn submit_rejects_zero_and_negative_amounts() {
    let h = harness();

    for amount in [0, -500] {
        match h.service.submit_advance(worker(), Money::from(amount), None) {
            Err(SettlementError::Validation(ValidationError::NonPositiveAmount { .. })) => {}
            other => panic!("expected non-positive amount error, got {other:?}"),
        }
    }
    assert!(h.advances.pending().expect("pending").is_empty());
}

#[test]
fn submit_enforces_configured_maximum() {
    let h = harness();

    match h.service.submit_advance(worker(), Money::from(50_001), None) {
        Err(SettlementError::Validation(ValidationError::ExceedsMaximum { amount, max })) => {
            assert_eq!(amount, Money::from(50_001));
            assert_eq!(max, Money::from(50_000));
        }
        other => panic!("expected exceeds maximum error, got {other:?}"),
    }

    let at_limit = h
        .service
        .submit_advance(worker(), Money::from(50_000), Some("rent".to_string()))
        .expect("amount at the limit is allowed");
    assert_eq!(at_limit.status, AdvanceStatus::Pending);
    assert_eq!(at_limit.reason.as_deref(), Some("rent"));
    assert_eq!(at_limit.requested_at, start());
}

#[test]
fn approve_resolves_once_and_then_refuses() {
    let h = harness();
    let submitted = h
        .service
        .submit_advance(worker(), Money::from(30_000), None)
        .expect("submit");

    h.clock.advance(Duration::minutes(5));
    let approved = h
        .service
        .approve_advance(&submitted.id, "admin1")
        .expect("first approval succeeds");
    assert_eq!(approved.status, AdvanceStatus::Approved);
    assert_eq!(approved.resolved_by.as_deref(), Some("admin1"));
    assert_eq!(approved.resolved_at, Some(start() + Duration::minutes(5)));

    match h.service.approve_advance(&submitted.id, "admin1") {
        Err(SettlementError::InvalidStateTransition {
            current, attempted, ..
        }) => {
            assert_eq!(current, AdvanceStatus::Approved);
            assert_eq!(attempted, AdvanceStatus::Approved);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    match h.service.reject_advance(&submitted.id, "admin2") {
        Err(SettlementError::InvalidStateTransition { current, .. }) => {
            assert_eq!(current, AdvanceStatus::Approved)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn rejected_advance_is_terminal() {
    let h = harness();
    let submitted = h
        .service
        .submit_advance(worker(), Money::from(12_000), None)
        .expect("submit");

    let rejected = h
        .service
        .reject_advance(&submitted.id, "admin1")
        .expect("rejection succeeds");
    assert_eq!(rejected.status, AdvanceStatus::Rejected);

    let err = h
        .service
        .approve_advance(&submitted.id, "admin1")
        .expect_err("cannot re-open a rejected advance");
    assert!(err.to_string().contains("already rejected"));
}

#[test]
fn resolving_unknown_advance_is_not_found() {
    let h = harness();
    let missing = AdvanceId("adv-missing".to_string());

    match h.service.approve_advance(&missing, "admin1") {
        Err(SettlementError::AdvanceNotFound(id)) => assert_eq!(id, missing),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn resolving_requires_an_approver() {
    let h = harness();
    let submitted = h
        .service
        .submit_advance(worker(), Money::from(1_000), None)
        .expect("submit");

    match h.service.approve_advance(&submitted.id, "   ") {
        Err(SettlementError::Validation(ValidationError::MissingActor { field })) => {
            assert_eq!(field, "approver")
        }
        other => panic!("expected missing approver, got {other:?}"),
    }
    let stored = h
        .advances
        .fetch(&submitted.id)
        .expect("fetch")
        .expect("present");
    assert!(stored.is_pending());
}

#[test]
fn resolution_notifies_the_worker() {
    let h = harness();
    let first = h
        .service
        .submit_advance(worker(), Money::from(2_000), None)
        .expect("submit");
    let second = h
        .service
        .submit_advance(worker(), Money::from(3_000), None)
        .expect("submit");

    h.service.approve_advance(&first.id, "admin1").expect("approve");
    h.service.reject_advance(&second.id, "admin1").expect("reject");

    assert_eq!(
        h.notifier.events(),
        vec![
            NotificationEvent::AdvanceApproved {
                worker_id: worker(),
                advance_id: first.id,
                amount: Money::from(2_000),
            },
            NotificationEvent::AdvanceRejected {
                worker_id: worker(),
                advance_id: second.id,
                amount: Money::from(3_000),
            },
        ]
    );
}

#[test]
fn notification_failure_does_not_roll_back_approval() {
    let h = harness();
    h.notifier.break_transport();
    let submitted = h
        .service
        .submit_advance(worker(), Money::from(30_000), None)
        .expect("submit");

    let approved = h
        .service
        .approve_advance(&submitted.id, "admin1")
        .expect("approval survives notification failure");

    let stored = h
        .advances
        .fetch(&approved.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, AdvanceStatus::Approved);
    assert!(h.notifier.events().is_empty());
}

#[test]
fn pending_queue_is_oldest_first_and_skips_resolved() {
    let h = harness();
    let oldest = h
        .service
        .submit_advance(worker(), Money::from(1_000), None)
        .expect("submit");
    h.clock.advance(Duration::hours(1));
    let resolved = h
        .service
        .submit_advance(other_worker(), Money::from(2_000), None)
        .expect("submit");
    h.clock.advance(Duration::hours(1));
    let newest = h
        .service
        .submit_advance(other_worker(), Money::from(3_000), None)
        .expect("submit");
    h.service
        .approve_advance(&resolved.id, "admin1")
        .expect("approve");

    let pending: Vec<AdvanceId> = h
        .service
        .list_pending_advances()
        .expect("pending")
        .into_iter()
        .map(|advance| advance.id)
        .collect();
    assert_eq!(pending, vec![oldest.id, newest.id]);

    let for_other = h
        .service
        .advances_for_worker(&other_worker())
        .expect("worker advances");
    assert_eq!(for_other.len(), 2);
    assert_eq!(for_other[0].status, AdvanceStatus::Approved);
}

#[test]
fn approved_total_uses_the_settlement_window() {
    let h = harness();
    let before = h
        .service
        .submit_advance(worker(), Money::from(5_000), None)
        .expect("submit");
    let after = h
        .service
        .submit_advance(worker(), Money::from(7_000), None)
        .expect("submit");

    h.service.approve_advance(&before.id, "admin1").expect("approve");
    let window_start = h.clock.now();
    h.clock.advance(Duration::milliseconds(1));
    h.service.approve_advance(&after.id, "admin1").expect("approve");

    let workflow = h.service.advances();
    assert_eq!(
        workflow
            .approved_total_since(&worker(), None)
            .expect("total"),
        Money::from(12_000)
    );
    assert_eq!(
        workflow
            .approved_total_since(&worker(), Some(window_start))
            .expect("total"),
        Money::from(7_000)
    );
}
