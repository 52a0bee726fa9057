//! Payment aggregate: purchase-level status and totals derived from
//! tranche state.
//!
//! RULE: `status` and `amount_paid` are materialized views. They are
//! recomputed from the tranche rows after every accepted transition,
//! inside the same store transaction, and never accepted from callers.

use crate::{
    error::{ReconError, ReconResult},
    store::{PaymentRow, TrancheRow},
    tranche::TrancheStatus,
    types::Amount,
};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Full,
    Installment,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Full => "full",
            PaymentKind::Installment => "installment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(PaymentKind::Full),
            "installment" => Some(PaymentKind::Installment),
            _ => None,
        }
    }
}

impl ToSql for PaymentKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PaymentKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        PaymentKind::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown payment kind: {s}").into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "partial" => Some(PaymentStatus::Partial),
            "approved" => Some(PaymentStatus::Approved),
            "rejected" => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }
}

impl ToSql for PaymentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PaymentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        PaymentStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown payment status: {s}").into()))
    }
}

/// Sum of tranche amounts treated as received.
///
/// Approved counts alongside paid: funds are recognized when the evidence
/// is verified, the separate mark-paid step only closes the ledger.
pub fn amount_paid_of(tranches: &[TrancheRow]) -> Amount {
    tranches
        .iter()
        .filter(|t| t.status.is_settled())
        .map(|t| t.amount)
        .sum()
}

/// Derive the purchase-level status from the tranche rows.
///
/// Approved when every tranche is settled. Rejected when the current
/// tranche (first unsettled) is rejected and nothing after it has
/// progressed. Partial when some money is in and some is still owed.
/// Pending otherwise.
pub fn derive_status(tranches: &[TrancheRow]) -> PaymentStatus {
    if !tranches.is_empty() && tranches.iter().all(|t| t.status.is_settled()) {
        return PaymentStatus::Approved;
    }

    if let Some(current) = tranches.iter().find(|t| !t.status.is_settled()) {
        let later_untouched = tranches
            .iter()
            .filter(|t| t.installment_number > current.installment_number)
            .all(|t| t.status == TrancheStatus::Pending);
        if current.status == TrancheStatus::Rejected && later_untouched {
            return PaymentStatus::Rejected;
        }
    }

    let any_settled = tranches.iter().any(|t| t.status.is_settled());
    if any_settled {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}

/// Recompute the derived fields on a payment row from its tranches.
/// Returns true when either field changed.
pub fn recompute(payment: &mut PaymentRow, tranches: &[TrancheRow]) -> bool {
    let status = derive_status(tranches);
    let amount_paid = amount_paid_of(tranches);
    let changed = payment.status != status || payment.amount_paid != amount_paid;
    payment.status = status;
    payment.amount_paid = amount_paid;
    changed
}

/// Tranche N past the first may be submitted only once tranche N-1 is
/// approved or paid.
pub fn ensure_in_sequence(
    payment_id: &str,
    tranches: &[TrancheRow],
    installment_number: u32,
) -> ReconResult<()> {
    if installment_number <= 1 {
        return Ok(());
    }
    let required = installment_number - 1;
    let prev = tranches
        .iter()
        .find(|t| t.installment_number == required)
        .ok_or_else(|| {
            ReconError::not_found("tranche", format!("{payment_id}#{required}"))
        })?;
    if !prev.status.is_settled() {
        return Err(ReconError::OutOfSequence {
            payment_id: payment_id.to_string(),
            installment_number,
            required,
        });
    }
    Ok(())
}
