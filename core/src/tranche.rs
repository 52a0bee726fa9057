//! Tranche state machine.
//!
//! States: pending -> submitted -> {approved, rejected}; approved -> paid;
//! rejected -> submitted (resubmission in place, same tranche). Paid is
//! terminal.
//!
//! Every transition checks its guards before touching the row, so a
//! refused transition leaves the tranche exactly as it was.

use crate::{
    error::{ReconError, ReconResult},
    store::TrancheRow,
};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrancheStatus {
    Pending,
    Submitted,
    Approved,
    Rejected,
    Paid,
}

impl TrancheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrancheStatus::Pending => "pending",
            TrancheStatus::Submitted => "submitted",
            TrancheStatus::Approved => "approved",
            TrancheStatus::Rejected => "rejected",
            TrancheStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TrancheStatus::Pending),
            "submitted" => Some(TrancheStatus::Submitted),
            "approved" => Some(TrancheStatus::Approved),
            "rejected" => Some(TrancheStatus::Rejected),
            "paid" => Some(TrancheStatus::Paid),
            _ => None,
        }
    }

    /// A settled tranche no longer needs customer action and counts
    /// toward the paid total: approved or paid.
    pub fn is_settled(&self) -> bool {
        matches!(self, TrancheStatus::Approved | TrancheStatus::Paid)
    }
}

impl ToSql for TrancheStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TrancheStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        TrancheStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown tranche status: {s}").into()))
    }
}

/// The administrator's verdict on a submitted tranche.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Record a customer submission of payment evidence.
///
/// Legal from `pending` and `rejected`. Resubmitting the same transaction
/// reference to a tranche already `submitted` is refused as a duplicate
/// rather than reprocessed. A resubmission after rejection bumps the
/// counter and clears the prior rejection note.
pub fn submit(
    tranche: &mut TrancheRow,
    transaction_ref: &str,
    now: DateTime<Utc>,
) -> ReconResult<()> {
    let transaction_ref = transaction_ref.trim();
    if transaction_ref.is_empty() {
        return Err(ReconError::validation(
            "transaction reference must not be empty",
        ));
    }

    match tranche.status {
        TrancheStatus::Submitted
            if tranche.transaction_ref.as_deref() == Some(transaction_ref) =>
        {
            Err(ReconError::DuplicateSubmission {
                payment_id: tranche.payment_id.clone(),
                installment_number: tranche.installment_number,
                transaction_ref: transaction_ref.to_string(),
            })
        }
        TrancheStatus::Pending | TrancheStatus::Rejected => {
            if tranche.status == TrancheStatus::Rejected {
                tranche.resubmissions += 1;
                tranche.admin_notes = None;
            }
            tranche.transaction_ref = Some(transaction_ref.to_string());
            tranche.submitted_at = Some(now);
            tranche.status = TrancheStatus::Submitted;
            Ok(())
        }
        _ => Err(illegal(tranche, "submit")),
    }
}

/// Record the administrator's verdict on a submitted tranche.
///
/// Approval confirms the payment evidence; settlement is closed
/// separately by [`mark_paid`]. On rejection the submitted reference is
/// retained for audit and only the submission timestamp clears.
pub fn adjudicate(
    tranche: &mut TrancheRow,
    decision: Decision,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> ReconResult<()> {
    if tranche.status != TrancheStatus::Submitted {
        return Err(illegal(tranche, "adjudicate"));
    }
    match decision {
        Decision::Approved => {
            tranche.status = TrancheStatus::Approved;
            tranche.approved_at = Some(now);
        }
        Decision::Rejected => {
            tranche.status = TrancheStatus::Rejected;
            tranche.submitted_at = None;
        }
    }
    tranche.admin_notes = notes.map(str::to_string);
    Ok(())
}

/// Close the ledger step for an approved tranche.
pub fn mark_paid(tranche: &mut TrancheRow, now: DateTime<Utc>) -> ReconResult<()> {
    if tranche.status != TrancheStatus::Approved {
        return Err(illegal(tranche, "mark_paid"));
    }
    tranche.status = TrancheStatus::Paid;
    tranche.paid_at = Some(now);
    Ok(())
}

fn illegal(tranche: &TrancheRow, attempted: &'static str) -> ReconError {
    ReconError::IllegalTransition {
        payment_id: tranche.payment_id.clone(),
        installment_number: tranche.installment_number,
        from: tranche.status.as_str(),
        attempted,
    }
}
