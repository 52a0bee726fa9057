//! Installment planner: turns a service price and a split schedule into
//! the ordered tranche list for a purchase.
//!
//! Pure module. No store access; the engine persists what the planner
//! computes.

use crate::{
    error::{ReconError, ReconResult},
    types::Amount,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One slice of an installment schedule: a percentage of the price and
/// the number of days after purchase it falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub percentage: u32,
    #[serde(default)]
    pub due_offset_days: i64,
}

impl Split {
    pub fn new(percentage: u32, due_offset_days: i64) -> Self {
        Self {
            percentage,
            due_offset_days,
        }
    }
}

/// A tranche as computed by the planner, before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTranche {
    pub installment_number: u32,
    pub percentage: u32,
    pub amount: Amount,
    pub due_date: Option<DateTime<Utc>>,
}

/// Non-empty schedules must have strictly positive percentages summing
/// to exactly 100. An empty schedule is valid and means payment in full.
pub fn validate_splits(splits: &[Split]) -> ReconResult<()> {
    if splits.is_empty() {
        return Ok(());
    }
    if splits.iter().any(|s| s.percentage == 0) {
        return Err(ReconError::validation(
            "every split percentage must be greater than zero",
        ));
    }
    let total: u32 = splits.iter().map(|s| s.percentage).sum();
    if total != 100 {
        return Err(ReconError::validation(format!(
            "split percentages must sum to 100, got {total}"
        )));
    }
    Ok(())
}

/// Compute the ordered tranche list for a purchase.
///
/// An empty schedule yields a single 100% tranche payable immediately.
/// Otherwise each tranche gets `round(price * percentage / 100)` and the
/// last tranche absorbs the rounding remainder, so the amounts always sum
/// to `price` exactly. The first tranche has no due-date floor; later
/// tranches fall due `due_offset_days` after the purchase date.
pub fn plan(
    price: Amount,
    splits: &[Split],
    purchased_at: DateTime<Utc>,
) -> ReconResult<Vec<PlannedTranche>> {
    if price <= 0 {
        return Err(ReconError::validation(format!(
            "price must be positive, got {price}"
        )));
    }
    validate_splits(splits)?;

    if splits.is_empty() {
        return Ok(vec![PlannedTranche {
            installment_number: 1,
            percentage: 100,
            amount: price,
            due_date: None,
        }]);
    }

    let mut tranches: Vec<PlannedTranche> = splits
        .iter()
        .enumerate()
        .map(|(i, split)| PlannedTranche {
            installment_number: (i + 1) as u32,
            percentage: split.percentage,
            amount: round_share(price, split.percentage),
            due_date: if i == 0 {
                None
            } else {
                Some(purchased_at + Duration::days(split.due_offset_days))
            },
        })
        .collect();

    // Fold the rounding remainder into the last tranche so the amounts
    // sum to the price exactly.
    let allocated: Amount = tranches.iter().map(|t| t.amount).sum();
    if let Some(last) = tranches.last_mut() {
        last.amount += price - allocated;
    }

    Ok(tranches)
}

/// Round half up, in whole currency units.
fn round_share(price: Amount, percentage: u32) -> Amount {
    (price * percentage as i64 + 50) / 100
}
