//! Integration tests for the entitlement calculator.
//!
//! The precedence chain is the contract: administrator overrides beat
//! payment status, payment status beats date math, and missing dates
//! never yield an active service.

use chrono::{DateTime, TimeZone, Utc};
use recon_core::{
    engine::ReconEngine,
    entitlement::{phase_of, Phase},
    payment::{PaymentKind, PaymentStatus},
    store::{PaymentRow, ServiceRow},
    tranche::Decision,
    types::Role,
};

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()
}

fn payment_row(
    status: PaymentStatus,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    completed: bool,
) -> PaymentRow {
    PaymentRow {
        payment_id: "pay-1".into(),
        account_id: "acct-1".into(),
        service_id: "svc-1".into(),
        kind: PaymentKind::Full,
        status,
        amount: 1000,
        amount_paid: 0,
        start_date,
        end_date,
        is_service_completed: completed,
        version: 0,
        created_at: at(1),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Precedence (pure)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn completed_dominates_everything() {
    // Expired window, rejected status: completed still wins.
    let p = payment_row(PaymentStatus::Rejected, Some(at(1)), Some(at(2)), true);
    assert_eq!(phase_of(&p, at(20)), Phase::Completed);
}

#[test]
fn rejected_status_beats_date_math() {
    let p = payment_row(PaymentStatus::Rejected, Some(at(1)), Some(at(30)), false);
    assert_eq!(phase_of(&p, at(10)), Phase::Rejected);
}

#[test]
fn pending_status_beats_date_math() {
    let p = payment_row(PaymentStatus::Pending, Some(at(1)), Some(at(30)), false);
    assert_eq!(phase_of(&p, at(10)), Phase::Pending);
}

#[test]
fn missing_dates_never_produce_active() {
    let p = payment_row(PaymentStatus::Approved, None, None, false);
    assert_eq!(phase_of(&p, at(10)), Phase::Pending);

    let p = payment_row(PaymentStatus::Approved, Some(at(1)), None, false);
    assert_eq!(phase_of(&p, at(10)), Phase::Pending);

    let p = payment_row(PaymentStatus::Partial, None, Some(at(30)), false);
    assert_eq!(phase_of(&p, at(10)), Phase::Pending);
}

#[test]
fn date_window_drives_the_phase() {
    let p = payment_row(PaymentStatus::Approved, Some(at(10)), Some(at(20)), false);

    assert_eq!(phase_of(&p, at(5)), Phase::Pending, "before the window");
    assert_eq!(phase_of(&p, at(10)), Phase::Active, "start is inclusive");
    assert_eq!(phase_of(&p, at(15)), Phase::Active);
    assert_eq!(phase_of(&p, at(20)), Phase::Active, "end is inclusive");
    assert_eq!(phase_of(&p, at(21)), Phase::Expired);
}

#[test]
fn partial_payments_use_the_window_too() {
    let p = payment_row(PaymentStatus::Partial, Some(at(10)), Some(at(20)), false);
    assert_eq!(phase_of(&p, at(15)), Phase::Active);
}

#[test]
fn phase_is_a_pure_read() {
    let p = payment_row(PaymentStatus::Approved, Some(at(10)), Some(at(20)), false);
    let before = p.clone();
    let _ = phase_of(&p, at(15));
    assert_eq!(p, before);
}

// ─────────────────────────────────────────────────────────────────────────────
// Through the engine
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn engine_derives_phase_from_live_state() {
    let engine = ReconEngine::in_memory().unwrap();
    let customer = engine.create_account(Role::Customer).unwrap();
    engine
        .upsert_service(&ServiceRow {
            service_id: "svc-seo".into(),
            name: "SEO audit".into(),
            price: 400,
            duration_label: "1 month".into(),
        })
        .unwrap();

    let payment = engine
        .create_payment(&customer.account_id, "svc-seo", PaymentKind::Full, "TXN-9")
        .unwrap();
    let id = payment.payment_id.clone();

    // Unapproved and undated: pending.
    assert_eq!(engine.entitlement_phase(&id, at(5)).unwrap(), Phase::Pending);

    engine.adjudicate_tranche(&id, 1, Decision::Approved, None).unwrap();
    assert_eq!(
        engine.entitlement_phase(&id, at(5)).unwrap(),
        Phase::Pending,
        "approved but undated stays pending"
    );

    engine.set_service_window(&id, at(10), at(20)).unwrap();
    assert_eq!(engine.entitlement_phase(&id, at(15)).unwrap(), Phase::Active);
    assert_eq!(engine.entitlement_phase(&id, at(25)).unwrap(), Phase::Expired);

    // The administrator's completed flag wins over the expired window.
    engine.mark_service_completed(&id).unwrap();
    assert_eq!(
        engine.entitlement_phase(&id, at(25)).unwrap(),
        Phase::Completed
    );
}
