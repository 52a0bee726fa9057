//! Integration tests for the installment planner.
//!
//! Covers:
//! 1. Payment-in-full plans (empty schedule)
//! 2. Split validation (sum and positivity)
//! 3. Exact rounding reconciliation into the last tranche
//! 4. Due-date offsets

use chrono::{Duration, TimeZone, Utc};
use recon_core::{
    error::ReconError,
    planner::{plan, validate_splits, Split},
};

fn purchase_date() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment in full
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn empty_schedule_is_one_full_tranche() {
    let tranches = plan(1000, &[], purchase_date()).unwrap();
    assert_eq!(tranches.len(), 1);
    assert_eq!(tranches[0].installment_number, 1);
    assert_eq!(tranches[0].percentage, 100);
    assert_eq!(tranches[0].amount, 1000);
    assert!(tranches[0].due_date.is_none(), "full payment has no due date");
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn percentages_must_sum_to_100() {
    let splits = [Split::new(30, 0), Split::new(60, 15)];
    let err = plan(1000, &splits, purchase_date()).unwrap_err();
    assert!(matches!(err, ReconError::Validation { .. }), "got {err:?}");
}

#[test]
fn zero_percentage_is_rejected() {
    let splits = [Split::new(0, 0), Split::new(100, 15)];
    let err = validate_splits(&splits).unwrap_err();
    assert!(matches!(err, ReconError::Validation { .. }), "got {err:?}");
}

#[test]
fn empty_schedule_validates() {
    validate_splits(&[]).unwrap();
}

#[test]
fn non_positive_price_is_rejected() {
    let splits = [Split::new(30, 0), Split::new(70, 15)];
    assert!(plan(0, &splits, purchase_date()).is_err());
    assert!(plan(-5, &splits, purchase_date()).is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Amounts and rounding
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn thirty_seventy_split_of_1000() {
    let splits = [Split::new(30, 0), Split::new(70, 15)];
    let tranches = plan(1000, &splits, purchase_date()).unwrap();

    assert_eq!(tranches.len(), 2);
    assert_eq!(tranches[0].amount, 300);
    assert_eq!(tranches[1].amount, 700);
    assert!(tranches[0].due_date.is_none(), "tranche 1 has no due-date floor");
    assert_eq!(
        tranches[1].due_date,
        Some(purchase_date() + Duration::days(15))
    );
}

#[test]
fn rounding_remainder_lands_in_last_tranche() {
    // 33% of 101 rounds to 33, twice; 34% rounds to 34. That allocates
    // 100, so the last tranche absorbs the missing unit.
    let splits = [Split::new(33, 0), Split::new(33, 10), Split::new(34, 20)];
    let tranches = plan(101, &splits, purchase_date()).unwrap();

    assert_eq!(tranches[0].amount, 33);
    assert_eq!(tranches[1].amount, 33);
    assert_eq!(tranches[2].amount, 35);
    let total: i64 = tranches.iter().map(|t| t.amount).sum();
    assert_eq!(total, 101, "no currency drift");
}

#[test]
fn over_allocation_is_pulled_back_from_last_tranche() {
    // 50% of 999 rounds up to 500 twice, so the last tranche gives one
    // unit back.
    let splits = [Split::new(50, 0), Split::new(50, 30)];
    let tranches = plan(999, &splits, purchase_date()).unwrap();

    assert_eq!(tranches[0].amount, 500);
    assert_eq!(tranches[1].amount, 499);
}

#[test]
fn amounts_always_sum_to_price() {
    let schedules: &[&[Split]] = &[
        &[Split::new(30, 0), Split::new(70, 15)],
        &[Split::new(33, 0), Split::new(33, 10), Split::new(34, 20)],
        &[Split::new(1, 0), Split::new(99, 60)],
        &[
            Split::new(25, 0),
            Split::new(25, 10),
            Split::new(25, 20),
            Split::new(25, 30),
        ],
    ];
    for price in [1, 7, 99, 100, 101, 999, 1000, 123_457] {
        for splits in schedules {
            let tranches = plan(price, splits, purchase_date()).unwrap();
            let total: i64 = tranches.iter().map(|t| t.amount).sum();
            assert_eq!(total, price, "drift for price {price} splits {splits:?}");
        }
    }
}

#[test]
fn installment_numbers_are_one_based_and_ordered() {
    let splits = [Split::new(20, 0), Split::new(30, 10), Split::new(50, 20)];
    let tranches = plan(500, &splits, purchase_date()).unwrap();
    let numbers: Vec<u32> = tranches.iter().map(|t| t.installment_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}
