//! Suspicion monitor: scans installment payments for missed deadlines
//! and flags the owning accounts.
//!
//! The scan is read-mostly and tolerates slightly stale data; the flag
//! itself is an idempotent per-account effect. The monitor never clears
//! a flag, that is an explicit administrator action.

use crate::{error::ReconResult, store::ReconStore, types::{AccountId, PaymentId}};
use chrono::{DateTime, Duration, Utc};

/// An installment payment whose next unresolved tranche is past due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverdueTranche {
    pub account_id: AccountId,
    pub payment_id: PaymentId,
    pub installment_number: u32,
    pub due_date: DateTime<Utc>,
}

/// Walk every installment payment that is not yet fully approved and
/// report the ones whose next unresolved tranche has a due date more
/// than `grace_days` in the past. One entry per payment.
pub fn find_overdue(
    store: &ReconStore,
    grace_days: i64,
    now: DateTime<Utc>,
) -> ReconResult<Vec<OverdueTranche>> {
    let mut overdue = Vec::new();

    for payment in store.unsettled_installment_payments()? {
        let tranches = store.tranches_for_payment(&payment.payment_id)?;
        // The next unresolved tranche is the first one not yet settled.
        let next = match tranches.iter().find(|t| !t.status.is_settled()) {
            Some(t) => t,
            None => continue,
        };
        let due_date = match next.due_date {
            Some(d) => d,
            // Tranche 1 has no due-date floor and can never be overdue.
            None => continue,
        };
        if due_date + Duration::days(grace_days) < now {
            overdue.push(OverdueTranche {
                account_id: payment.account_id.clone(),
                payment_id: payment.payment_id.clone(),
                installment_number: next.installment_number,
                due_date,
            });
        }
    }

    Ok(overdue)
}
