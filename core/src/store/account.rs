use super::{splits_from_json, AccountRow, ReconStore};
use crate::{
    error::{ReconError, ReconResult},
    planner::Split,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

impl ReconStore {
    // ── Account ───────────────────────────────────────────────────

    pub fn insert_account(&self, account: &AccountRow) -> ReconResult<()> {
        let splits_json = serde_json::to_string(&account.installment_splits)?;
        self.conn.execute(
            "INSERT INTO account (
                account_id, role, is_active, is_verified, is_suspicious,
                installment_enabled, installment_splits,
                policy_updated_by, policy_updated_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                account.account_id,
                account.role,
                account.is_active,
                account.is_verified,
                account.is_suspicious,
                account.installment_enabled,
                splits_json,
                account.policy_updated_by,
                account.policy_updated_at,
                account.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_account(&self, account_id: &str) -> ReconResult<AccountRow> {
        self.conn
            .query_row(
                "SELECT account_id, role, is_active, is_verified, is_suspicious,
                        installment_enabled, installment_splits,
                        policy_updated_by, policy_updated_at, created_at
                 FROM account WHERE account_id = ?1",
                params![account_id],
                map_account_row,
            )
            .optional()?
            .ok_or_else(|| ReconError::not_found("account", account_id))
    }

    // ── Installment policy ────────────────────────────────────────

    pub fn update_installment_policy(
        &self,
        account_id: &str,
        enabled: bool,
        splits: &[Split],
        updated_by: &str,
        updated_at: DateTime<Utc>,
    ) -> ReconResult<()> {
        let splits_json = serde_json::to_string(splits)?;
        let n = self.conn.execute(
            "UPDATE account
             SET installment_enabled = ?1, installment_splits = ?2,
                 policy_updated_by = ?3, policy_updated_at = ?4
             WHERE account_id = ?5",
            params![enabled, splits_json, updated_by, updated_at, account_id],
        )?;
        if n == 0 {
            return Err(ReconError::not_found("account", account_id));
        }
        Ok(())
    }

    // ── Suspicion flag ────────────────────────────────────────────

    /// Idempotent flag: marks the account suspicious and disables its
    /// installment policy. Returns true only when the account was not
    /// already flagged, so re-flagging is a no-op.
    pub fn flag_account_suspicious(&self, account_id: &str) -> ReconResult<bool> {
        let n = self.conn.execute(
            "UPDATE account SET is_suspicious = 1, installment_enabled = 0
             WHERE account_id = ?1 AND is_suspicious = 0",
            params![account_id],
        )?;
        Ok(n > 0)
    }

    /// Explicit administrator clear. Does not re-enable the installment
    /// policy; the administrator re-enables it separately.
    pub fn clear_account_suspicious(&self, account_id: &str) -> ReconResult<()> {
        let n = self.conn.execute(
            "UPDATE account SET is_suspicious = 0 WHERE account_id = ?1",
            params![account_id],
        )?;
        if n == 0 {
            return Err(ReconError::not_found("account", account_id));
        }
        Ok(())
    }

    pub fn count_suspicious_accounts(&self) -> ReconResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM account WHERE is_suspicious = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_account_row(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        account_id: row.get(0)?,
        role: row.get(1)?,
        is_active: row.get(2)?,
        is_verified: row.get(3)?,
        is_suspicious: row.get(4)?,
        installment_enabled: row.get(5)?,
        installment_splits: splits_from_json(6, row.get(6)?)?,
        policy_updated_by: row.get(7)?,
        policy_updated_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}
