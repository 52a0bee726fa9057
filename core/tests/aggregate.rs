//! Integration tests for the payment aggregate: derived status, paid and
//! due totals, and submission ordering.

use recon_core::{
    engine::ReconEngine,
    error::ReconError,
    payment::{amount_paid_of, derive_status, ensure_in_sequence, PaymentKind, PaymentStatus},
    planner::Split,
    store::{ServiceRow, TrancheRow},
    tranche::{Decision, TrancheStatus},
    types::Role,
};

fn tranche(number: u32, amount: i64, status: TrancheStatus) -> TrancheRow {
    TrancheRow {
        payment_id: "pay-1".into(),
        installment_number: number,
        percentage: 50,
        amount,
        due_date: None,
        status,
        transaction_ref: None,
        submitted_at: None,
        approved_at: None,
        paid_at: None,
        admin_notes: None,
        resubmissions: 0,
    }
}

/// Engine with one installment-enabled customer and one 1000-unit
/// service, returning (engine, account_id, admin_id).
fn build() -> (ReconEngine, String, String) {
    let engine = ReconEngine::in_memory().expect("in_memory engine");
    let customer = engine.create_account(Role::Customer).unwrap();
    let admin = engine.create_account(Role::Administrator).unwrap();
    engine
        .set_installment_policy(
            &customer.account_id,
            true,
            &[Split::new(30, 0), Split::new(70, 15)],
            &admin.account_id,
        )
        .unwrap();
    engine
        .upsert_service(&ServiceRow {
            service_id: "svc-web".into(),
            name: "Website build".into(),
            price: 1000,
            duration_label: "3 months".into(),
        })
        .unwrap();
    (engine, customer.account_id, admin.account_id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Status derivation (pure)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn all_settled_is_approved() {
    let tranches = [
        tranche(1, 300, TrancheStatus::Approved),
        tranche(2, 700, TrancheStatus::Paid),
    ];
    assert_eq!(derive_status(&tranches), PaymentStatus::Approved);
}

#[test]
fn settled_plus_open_is_partial() {
    let tranches = [
        tranche(1, 300, TrancheStatus::Approved),
        tranche(2, 700, TrancheStatus::Pending),
    ];
    assert_eq!(derive_status(&tranches), PaymentStatus::Partial);
}

#[test]
fn rejected_current_tranche_rejects_the_payment() {
    let tranches = [
        tranche(1, 300, TrancheStatus::Approved),
        tranche(2, 300, TrancheStatus::Rejected),
        tranche(3, 400, TrancheStatus::Pending),
    ];
    assert_eq!(derive_status(&tranches), PaymentStatus::Rejected);
}

#[test]
fn nothing_settled_is_pending() {
    let tranches = [
        tranche(1, 300, TrancheStatus::Submitted),
        tranche(2, 700, TrancheStatus::Pending),
    ];
    assert_eq!(derive_status(&tranches), PaymentStatus::Pending);
}

#[test]
fn amount_paid_counts_approved_and_paid_only() {
    let tranches = [
        tranche(1, 300, TrancheStatus::Paid),
        tranche(2, 300, TrancheStatus::Approved),
        tranche(3, 200, TrancheStatus::Submitted),
        tranche(4, 200, TrancheStatus::Rejected),
    ];
    assert_eq!(amount_paid_of(&tranches), 600);
}

#[test]
fn sequence_guard_requires_prior_tranche_settled() {
    let tranches = [
        tranche(1, 300, TrancheStatus::Submitted),
        tranche(2, 700, TrancheStatus::Pending),
    ];
    let err = ensure_in_sequence("pay-1", &tranches, 2).unwrap_err();
    assert!(matches!(err, ReconError::OutOfSequence { .. }), "got {err:?}");

    ensure_in_sequence("pay-1", &tranches, 1).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// The worked 1000 / 30-70 example, end to end
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn installment_flow_recomputes_totals_and_status() {
    let (engine, customer, _admin) = build();

    let payment = engine
        .create_payment(&customer, "svc-web", PaymentKind::Installment, "TXN-1")
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, 1000);
    assert_eq!(payment.amount_paid, 0);
    assert_eq!(payment.amount_due(), 1000);

    let tranches = engine.store.tranches_for_payment(&payment.payment_id).unwrap();
    assert_eq!(tranches.len(), 2);
    assert_eq!(tranches[0].amount, 300);
    assert_eq!(tranches[1].amount, 700);
    assert_eq!(tranches[0].status, TrancheStatus::Submitted);

    // Approve tranche 1: partial, 300 in, 700 owed.
    engine
        .adjudicate_tranche(&payment.payment_id, 1, Decision::Approved, None)
        .unwrap();
    let p = engine.store.get_payment(&payment.payment_id).unwrap();
    assert_eq!(p.status, PaymentStatus::Partial);
    assert_eq!(p.amount_paid, 300);
    assert_eq!(p.amount_due(), 700);

    // Approve tranche 2: fully approved, nothing owed.
    engine
        .submit_tranche(&payment.payment_id, 2, "TXN-2")
        .unwrap();
    engine
        .adjudicate_tranche(&payment.payment_id, 2, Decision::Approved, None)
        .unwrap();
    let p = engine.store.get_payment(&payment.payment_id).unwrap();
    assert_eq!(p.status, PaymentStatus::Approved);
    assert_eq!(p.amount_paid, 1000);
    assert_eq!(p.amount_due(), 0);
}

#[test]
fn paid_plus_due_always_equals_amount() {
    let (engine, customer, _admin) = build();
    let payment = engine
        .create_payment(&customer, "svc-web", PaymentKind::Installment, "TXN-1")
        .unwrap();

    let check = |label: &str| {
        let p = engine.store.get_payment(&payment.payment_id).unwrap();
        assert_eq!(p.amount_paid + p.amount_due(), p.amount, "after {label}");
    };

    check("creation");
    engine
        .adjudicate_tranche(&payment.payment_id, 1, Decision::Approved, None)
        .unwrap();
    check("approving tranche 1");
    engine
        .mark_tranche_paid(&payment.payment_id, 1)
        .unwrap();
    check("marking tranche 1 paid");
    engine
        .submit_tranche(&payment.payment_id, 2, "TXN-2")
        .unwrap();
    check("submitting tranche 2");
    engine
        .adjudicate_tranche(&payment.payment_id, 2, Decision::Rejected, Some("bad ref"))
        .unwrap();
    check("rejecting tranche 2");
    engine
        .submit_tranche(&payment.payment_id, 2, "TXN-3")
        .unwrap();
    engine
        .adjudicate_tranche(&payment.payment_id, 2, Decision::Approved, None)
        .unwrap();
    check("approving resubmitted tranche 2");
}

#[test]
fn rejection_of_current_tranche_surfaces_on_the_payment() {
    let (engine, customer, _admin) = build();
    let payment = engine
        .create_payment(&customer, "svc-web", PaymentKind::Installment, "TXN-1")
        .unwrap();

    engine
        .adjudicate_tranche(&payment.payment_id, 1, Decision::Rejected, Some("no match"))
        .unwrap();
    let p = engine.store.get_payment(&payment.payment_id).unwrap();
    assert_eq!(p.status, PaymentStatus::Rejected);

    // Resubmission pulls the payment back out of rejected.
    engine
        .submit_tranche(&payment.payment_id, 1, "TXN-1B")
        .unwrap();
    let p = engine.store.get_payment(&payment.payment_id).unwrap();
    assert_eq!(p.status, PaymentStatus::Pending);

    let t = engine.store.get_tranche(&payment.payment_id, 1).unwrap();
    assert_eq!(t.resubmissions, 1);
}

#[test]
fn full_payment_has_a_single_hundred_percent_tranche() {
    let (engine, customer, _admin) = build();
    let payment = engine
        .create_payment(&customer, "svc-web", PaymentKind::Full, "TXN-FULL")
        .unwrap();

    let tranches = engine.store.tranches_for_payment(&payment.payment_id).unwrap();
    assert_eq!(tranches.len(), 1);
    assert_eq!(tranches[0].percentage, 100);
    assert_eq!(tranches[0].amount, 1000);

    engine
        .adjudicate_tranche(&payment.payment_id, 1, Decision::Approved, None)
        .unwrap();
    let p = engine.store.get_payment(&payment.payment_id).unwrap();
    assert_eq!(p.status, PaymentStatus::Approved);
    assert_eq!(p.amount_paid, 1000);
}
