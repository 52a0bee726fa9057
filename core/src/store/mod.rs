//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. The engine and the
//! domain modules call store methods; they never execute SQL directly.

use crate::{
    error::{ReconError, ReconResult},
    event::EventLogEntry,
    payment::{PaymentKind, PaymentStatus},
    planner::Split,
    tranche::TrancheStatus,
    types::{AccountId, Amount, PaymentId, Role, ServiceId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

mod account;
mod payment;

pub struct ReconStore {
    conn: Connection,
}

impl ReconStore {
    pub fn open(path: &str) -> ReconResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ReconResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ReconResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_payments.sql"))?;
        Ok(())
    }

    // ── Transactions ───────────────────────────────────────────

    /// Start an IMMEDIATE transaction: takes the write lock up front so a
    /// multi-statement transition holds per-payment exclusion end to end.
    pub fn begin_immediate(&self) -> ReconResult<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(())
    }

    pub fn commit(&self) -> ReconResult<()> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    pub fn rollback(&self) -> ReconResult<()> {
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> ReconResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (occurred_at, event_type, payload) VALUES (?1, ?2, ?3)",
            params![entry.occurred_at, entry.event_type, entry.payload],
        )?;
        Ok(())
    }

    pub fn events_of_type(&self, event_type: &str) -> ReconResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, occurred_at, event_type, payload
             FROM event_log WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    occurred_at: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> ReconResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(count)
    }

    // ── Service catalog (read-only collaborator data) ──────────

    pub fn upsert_service(&self, service: &ServiceRow) -> ReconResult<()> {
        self.conn.execute(
            "INSERT INTO service (service_id, name, price, duration_label)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (service_id) DO UPDATE SET
                 name = excluded.name,
                 price = excluded.price,
                 duration_label = excluded.duration_label",
            params![
                service.service_id,
                service.name,
                service.price,
                service.duration_label,
            ],
        )?;
        Ok(())
    }

    pub fn get_service(&self, service_id: &str) -> ReconResult<ServiceRow> {
        self.conn
            .query_row(
                "SELECT service_id, name, price, duration_label
                 FROM service WHERE service_id = ?1",
                params![service_id],
                |row| {
                    Ok(ServiceRow {
                        service_id: row.get(0)?,
                        name: row.get(1)?,
                        price: row.get(2)?,
                        duration_label: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| ReconError::not_found("service", service_id))
    }
}

/// Map the JSON splits column, surfacing bad data as a column error.
fn splits_from_json(idx: usize, raw: String) -> rusqlite::Result<Vec<Split>> {
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ── Row structs ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRow {
    pub account_id: AccountId,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_suspicious: bool,
    pub installment_enabled: bool,
    pub installment_splits: Vec<Split>,
    pub policy_updated_by: Option<AccountId>,
    pub policy_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRow {
    pub service_id: ServiceId,
    pub name: String,
    pub price: Amount,
    pub duration_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRow {
    pub payment_id: PaymentId,
    pub account_id: AccountId,
    pub service_id: ServiceId,
    pub kind: PaymentKind,
    pub status: PaymentStatus,
    /// Service price at purchase time. Immutable.
    pub amount: Amount,
    /// Derived. See payment::recompute.
    pub amount_paid: Amount,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_service_completed: bool,
    /// Optimistic concurrency counter, bumped on every recompute.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl PaymentRow {
    /// Remaining balance, clamped to zero.
    pub fn amount_due(&self) -> Amount {
        (self.amount - self.amount_paid).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrancheRow {
    pub payment_id: PaymentId,
    pub installment_number: u32,
    pub percentage: u32,
    pub amount: Amount,
    pub due_date: Option<DateTime<Utc>>,
    pub status: TrancheStatus,
    pub transaction_ref: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub resubmissions: i64,
}

/// Aggregated counters for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStats {
    pub total: i64,
    pub pending: i64,
    pub partial: i64,
    pub approved: i64,
    pub rejected: i64,
    /// Sum of amount_paid across all payments (recognized revenue).
    pub amount_recognized: Amount,
}
