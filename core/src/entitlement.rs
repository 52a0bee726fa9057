//! Entitlement calculator: the customer-visible lifecycle phase of a
//! purchased service.
//!
//! Pure and re-evaluated on every read, never persisted.

use crate::store::PaymentRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Active,
    Expired,
    Completed,
    Rejected,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Active => "active",
            Phase::Expired => "expired",
            Phase::Completed => "completed",
            Phase::Rejected => "rejected",
        }
    }
}

/// Derive the phase from payment state plus wall-clock time.
///
/// The precedence is load-bearing: the administrator's completed flag
/// dominates everything, rejected/pending payment status dominates date
/// math, and missing dates never produce `Active`.
pub fn phase_of(payment: &PaymentRow, now: DateTime<Utc>) -> Phase {
    if payment.is_service_completed {
        return Phase::Completed;
    }
    match payment.status {
        crate::payment::PaymentStatus::Rejected => return Phase::Rejected,
        crate::payment::PaymentStatus::Pending => return Phase::Pending,
        _ => {}
    }
    let (start, end) = match (payment.start_date, payment.end_date) {
        (Some(start), Some(end)) => (start, end),
        _ => return Phase::Pending,
    };
    if now < start {
        Phase::Pending
    } else if now <= end {
        Phase::Active
    } else {
        Phase::Expired
    }
}
