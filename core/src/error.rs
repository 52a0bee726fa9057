use crate::types::PaymentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Illegal transition for payment {payment_id} tranche {installment_number}: {from} does not allow {attempted}")]
    IllegalTransition {
        payment_id: PaymentId,
        installment_number: u32,
        from: &'static str,
        attempted: &'static str,
    },

    #[error("Out-of-sequence submission for payment {payment_id}: tranche {installment_number} requires tranche {required} approved or paid")]
    OutOfSequence {
        payment_id: PaymentId,
        installment_number: u32,
        required: u32,
    },

    #[error("Duplicate submission for payment {payment_id} tranche {installment_number}: transaction ref '{transaction_ref}' already recorded")]
    DuplicateSubmission {
        payment_id: PaymentId,
        installment_number: u32,
        transaction_ref: String,
    },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Concurrent modification of payment {payment_id} (stale version {expected})")]
    Conflict { payment_id: PaymentId, expected: i64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReconError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReconError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ReconError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type ReconResult<T> = Result<T, ReconError>;
