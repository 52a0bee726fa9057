use super::{PaymentRow, PaymentStats, ReconStore, TrancheRow};
use crate::{
    error::{ReconError, ReconResult},
    payment::PaymentStatus,
    types::Amount,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const PAYMENT_COLUMNS: &str = "payment_id, account_id, service_id, kind, status, amount, \
     amount_paid, start_date, end_date, is_service_completed, version, created_at";

const TRANCHE_COLUMNS: &str = "payment_id, installment_number, percentage, amount, due_date, \
     status, transaction_ref, submitted_at, approved_at, paid_at, admin_notes, resubmissions";

impl ReconStore {
    // ── Payment ───────────────────────────────────────────────────

    pub fn insert_payment(&self, payment: &PaymentRow) -> ReconResult<()> {
        self.conn.execute(
            "INSERT INTO payment (
                payment_id, account_id, service_id, kind, status, amount,
                amount_paid, start_date, end_date, is_service_completed,
                version, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                payment.payment_id,
                payment.account_id,
                payment.service_id,
                payment.kind,
                payment.status,
                payment.amount,
                payment.amount_paid,
                payment.start_date,
                payment.end_date,
                payment.is_service_completed,
                payment.version,
                payment.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_payment(&self, payment_id: &str) -> ReconResult<PaymentRow> {
        self.conn
            .query_row(
                &format!("SELECT {PAYMENT_COLUMNS} FROM payment WHERE payment_id = ?1"),
                params![payment_id],
                map_payment_row,
            )
            .optional()?
            .ok_or_else(|| ReconError::not_found("payment", payment_id))
    }

    pub fn payments_for_account(&self, account_id: &str) -> ReconResult<Vec<PaymentRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment
             WHERE account_id = ?1 ORDER BY created_at ASC, payment_id ASC"
        ))?;
        let rows = stmt.query_map(params![account_id], map_payment_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn all_payments(&self) -> ReconResult<Vec<PaymentRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment ORDER BY created_at ASC, payment_id ASC"
        ))?;
        let rows = stmt.query_map([], map_payment_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Installment payments that still have unsettled tranches. Input to
    /// the suspicion scan.
    pub fn unsettled_installment_payments(&self) -> ReconResult<Vec<PaymentRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment
             WHERE kind = 'installment' AND status != 'approved'
             ORDER BY created_at ASC, payment_id ASC"
        ))?;
        let rows = stmt.query_map([], map_payment_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Persist the recomputed derived fields, guarded by the optimistic
    /// version counter. Returns false when the row moved underneath the
    /// caller (stale version): nothing is written in that case.
    pub fn update_payment_derived(
        &self,
        payment_id: &str,
        status: PaymentStatus,
        amount_paid: Amount,
        expected_version: i64,
    ) -> ReconResult<bool> {
        let n = self.conn.execute(
            "UPDATE payment
             SET status = ?1, amount_paid = ?2, version = version + 1
             WHERE payment_id = ?3 AND version = ?4",
            params![status, amount_paid, payment_id, expected_version],
        )?;
        Ok(n > 0)
    }

    pub fn set_service_window(
        &self,
        payment_id: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> ReconResult<()> {
        let n = self.conn.execute(
            "UPDATE payment SET start_date = ?1, end_date = ?2 WHERE payment_id = ?3",
            params![start_date, end_date, payment_id],
        )?;
        if n == 0 {
            return Err(ReconError::not_found("payment", payment_id));
        }
        Ok(())
    }

    /// One-way administrator override, independent of dates.
    pub fn set_service_completed(&self, payment_id: &str) -> ReconResult<()> {
        let n = self.conn.execute(
            "UPDATE payment SET is_service_completed = 1 WHERE payment_id = ?1",
            params![payment_id],
        )?;
        if n == 0 {
            return Err(ReconError::not_found("payment", payment_id));
        }
        Ok(())
    }

    pub fn payment_stats(&self) -> ReconResult<PaymentStats> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'pending'), 0),
                    COALESCE(SUM(status = 'partial'), 0),
                    COALESCE(SUM(status = 'approved'), 0),
                    COALESCE(SUM(status = 'rejected'), 0),
                    COALESCE(SUM(amount_paid), 0)
             FROM payment",
            [],
            |row| {
                Ok(PaymentStats {
                    total: row.get(0)?,
                    pending: row.get(1)?,
                    partial: row.get(2)?,
                    approved: row.get(3)?,
                    rejected: row.get(4)?,
                    amount_recognized: row.get(5)?,
                })
            },
        )?;
        Ok(stats)
    }

    // ── Tranche ───────────────────────────────────────────────────

    pub fn insert_tranche(&self, tranche: &TrancheRow) -> ReconResult<()> {
        self.conn.execute(
            "INSERT INTO tranche (
                payment_id, installment_number, percentage, amount, due_date,
                status, transaction_ref, submitted_at, approved_at, paid_at,
                admin_notes, resubmissions
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                tranche.payment_id,
                tranche.installment_number,
                tranche.percentage,
                tranche.amount,
                tranche.due_date,
                tranche.status,
                tranche.transaction_ref,
                tranche.submitted_at,
                tranche.approved_at,
                tranche.paid_at,
                tranche.admin_notes,
                tranche.resubmissions,
            ],
        )?;
        Ok(())
    }

    pub fn get_tranche(&self, payment_id: &str, installment_number: u32) -> ReconResult<TrancheRow> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {TRANCHE_COLUMNS} FROM tranche
                     WHERE payment_id = ?1 AND installment_number = ?2"
                ),
                params![payment_id, installment_number],
                map_tranche_row,
            )
            .optional()?
            .ok_or_else(|| {
                ReconError::not_found("tranche", format!("{payment_id}#{installment_number}"))
            })
    }

    pub fn tranches_for_payment(&self, payment_id: &str) -> ReconResult<Vec<TrancheRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRANCHE_COLUMNS} FROM tranche
             WHERE payment_id = ?1 ORDER BY installment_number ASC"
        ))?;
        let rows = stmt.query_map(params![payment_id], map_tranche_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Persist a tranche after a state-machine transition. Tranches are
    /// never deleted, only updated in place.
    pub fn update_tranche(&self, tranche: &TrancheRow) -> ReconResult<()> {
        let n = self.conn.execute(
            "UPDATE tranche
             SET status = ?1, transaction_ref = ?2, submitted_at = ?3,
                 approved_at = ?4, paid_at = ?5, admin_notes = ?6,
                 resubmissions = ?7
             WHERE payment_id = ?8 AND installment_number = ?9",
            params![
                tranche.status,
                tranche.transaction_ref,
                tranche.submitted_at,
                tranche.approved_at,
                tranche.paid_at,
                tranche.admin_notes,
                tranche.resubmissions,
                tranche.payment_id,
                tranche.installment_number,
            ],
        )?;
        if n == 0 {
            return Err(ReconError::not_found(
                "tranche",
                format!("{}#{}", tranche.payment_id, tranche.installment_number),
            ));
        }
        Ok(())
    }
}

fn map_payment_row(row: &Row<'_>) -> rusqlite::Result<PaymentRow> {
    Ok(PaymentRow {
        payment_id: row.get(0)?,
        account_id: row.get(1)?,
        service_id: row.get(2)?,
        kind: row.get(3)?,
        status: row.get(4)?,
        amount: row.get(5)?,
        amount_paid: row.get(6)?,
        start_date: row.get(7)?,
        end_date: row.get(8)?,
        is_service_completed: row.get(9)?,
        version: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn map_tranche_row(row: &Row<'_>) -> rusqlite::Result<TrancheRow> {
    Ok(TrancheRow {
        payment_id: row.get(0)?,
        installment_number: row.get::<_, i64>(1)? as u32,
        percentage: row.get::<_, i64>(2)? as u32,
        amount: row.get(3)?,
        due_date: row.get(4)?,
        status: row.get(5)?,
        transaction_ref: row.get(6)?,
        submitted_at: row.get(7)?,
        approved_at: row.get(8)?,
        paid_at: row.get(9)?,
        admin_notes: row.get(10)?,
        resubmissions: row.get(11)?,
    })
}
