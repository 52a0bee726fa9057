//! The audit event log.
//!
//! RULE: every accepted state change appends an event. The log is
//! append-only; events are added per feature, never removed or reordered.

use crate::{
    payment::{PaymentKind, PaymentStatus},
    types::{AccountId, Amount, PaymentId, Role, ServiceId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconEvent {
    AccountCreated {
        account_id: AccountId,
        role: Role,
    },
    PaymentCreated {
        payment_id: PaymentId,
        account_id: AccountId,
        service_id: ServiceId,
        kind: PaymentKind,
        amount: Amount,
        tranche_count: u32,
    },
    TrancheSubmitted {
        payment_id: PaymentId,
        installment_number: u32,
        transaction_ref: String,
        resubmission: bool,
    },
    TrancheApproved {
        payment_id: PaymentId,
        installment_number: u32,
    },
    TrancheRejected {
        payment_id: PaymentId,
        installment_number: u32,
        notes: Option<String>,
    },
    TranchePaid {
        payment_id: PaymentId,
        installment_number: u32,
    },
    PaymentStatusChanged {
        payment_id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
        amount_paid: Amount,
    },
    ServiceWindowSet {
        payment_id: PaymentId,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    },
    ServiceCompleted {
        payment_id: PaymentId,
    },
    InstallmentPolicyUpdated {
        account_id: AccountId,
        enabled: bool,
        updated_by: AccountId,
    },
    AccountFlagged {
        account_id: AccountId,
        /// "monitor" for the automatic scan, otherwise the administrator id.
        flagged_by: String,
        payment_id: Option<PaymentId>,
        installment_number: Option<u32>,
    },
    AccountUnflagged {
        account_id: AccountId,
        cleared_by: AccountId,
    },
}

impl ReconEvent {
    /// Stable string name for the event_type column.
    pub fn event_type(&self) -> &'static str {
        match self {
            ReconEvent::AccountCreated { .. } => "account_created",
            ReconEvent::PaymentCreated { .. } => "payment_created",
            ReconEvent::TrancheSubmitted { .. } => "tranche_submitted",
            ReconEvent::TrancheApproved { .. } => "tranche_approved",
            ReconEvent::TrancheRejected { .. } => "tranche_rejected",
            ReconEvent::TranchePaid { .. } => "tranche_paid",
            ReconEvent::PaymentStatusChanged { .. } => "payment_status_changed",
            ReconEvent::ServiceWindowSet { .. } => "service_window_set",
            ReconEvent::ServiceCompleted { .. } => "service_completed",
            ReconEvent::InstallmentPolicyUpdated { .. } => "installment_policy_updated",
            ReconEvent::AccountFlagged { .. } => "account_flagged",
            ReconEvent::AccountUnflagged { .. } => "account_unflagged",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
    /// JSON-serialized ReconEvent.
    pub payload: String,
}
