//! The reconciliation engine: the boundary surface external callers
//! (client UI, admin console) invoke. Everything below it is internal.
//!
//! RULES:
//!   - Every operation is a short-lived request/response unit.
//!   - Tranche transitions run inside one IMMEDIATE transaction:
//!     state-machine step, tranche write, aggregate recompute with the
//!     optimistic version guard. A failed recompute rolls the whole
//!     transition back.
//!   - Derived payment fields are never accepted from callers.
//!   - Every accepted change appends to the event log. Notifications go
//!     out after commit and never roll anything back.
//!   - No ambient session: callers pass explicit account ids.

use crate::{
    clock::{Clock, SystemClock},
    config::ReconConfig,
    entitlement::{self, Phase},
    error::{ReconError, ReconResult},
    event::{EventLogEntry, ReconEvent},
    notify::{LogNotifier, Notifier},
    payment::{self, PaymentKind},
    planner::{self, Split},
    store::{AccountRow, PaymentRow, PaymentStats, ReconStore, ServiceRow, TrancheRow},
    suspicion,
    tranche::{self, Decision, TrancheStatus},
    types::{AccountId, Role},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct ReconEngine {
    pub store: ReconStore,
    config: ReconConfig,
    clock: Box<dyn Clock>,
    notifier: Box<dyn Notifier>,
}

impl ReconEngine {
    pub fn new(store: ReconStore, config: ReconConfig) -> Self {
        Self {
            store,
            config,
            clock: Box::new(SystemClock),
            notifier: Box::new(LogNotifier),
        }
    }

    /// Open (or create) a database at `path`, migrate it, and wire up a
    /// production engine.
    pub fn open(path: &str, config: ReconConfig) -> ReconResult<Self> {
        let store = ReconStore::open(path)?;
        store.migrate()?;
        Ok(Self::new(store, config))
    }

    /// Fully wired engine over an in-memory database (used in tests).
    pub fn in_memory() -> ReconResult<Self> {
        let store = ReconStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, ReconConfig::default()))
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    // ── Accounts and policy ───────────────────────────────────────

    pub fn create_account(&self, role: Role) -> ReconResult<AccountRow> {
        let account = AccountRow {
            account_id: Uuid::new_v4().to_string(),
            role,
            is_active: true,
            is_verified: false,
            is_suspicious: false,
            installment_enabled: false,
            installment_splits: Vec::new(),
            policy_updated_by: None,
            policy_updated_at: None,
            created_at: self.clock.now(),
        };
        self.store.insert_account(&account)?;
        self.append_event(&ReconEvent::AccountCreated {
            account_id: account.account_id.clone(),
            role,
        })?;
        Ok(account)
    }

    /// Configure an account's installment policy. Splits are validated
    /// once here; the planner trusts stored policy thereafter.
    pub fn set_installment_policy(
        &self,
        account_id: &str,
        enabled: bool,
        splits: &[Split],
        updated_by: &str,
    ) -> ReconResult<AccountRow> {
        planner::validate_splits(splits)?;
        self.store.get_account(account_id)?;
        let now = self.clock.now();
        self.store
            .update_installment_policy(account_id, enabled, splits, updated_by, now)?;
        self.append_event(&ReconEvent::InstallmentPolicyUpdated {
            account_id: account_id.to_string(),
            enabled,
            updated_by: updated_by.to_string(),
        })?;
        self.store.get_account(account_id)
    }

    /// Manual administrator toggle of the suspicion flag. Flagging also
    /// disables the installment policy, the same effect the monitor has;
    /// clearing does not re-enable it.
    pub fn set_account_suspicious(
        &self,
        account_id: &str,
        suspicious: bool,
        admin_id: &str,
    ) -> ReconResult<AccountRow> {
        let account = self.store.get_account(account_id)?;
        if account.is_suspicious == suspicious {
            return Ok(account);
        }
        if suspicious {
            self.store.flag_account_suspicious(account_id)?;
            self.append_event(&ReconEvent::AccountFlagged {
                account_id: account_id.to_string(),
                flagged_by: admin_id.to_string(),
                payment_id: None,
                installment_number: None,
            })?;
            self.notify(account_id, "Account flagged", "Installment plans are disabled.");
        } else {
            self.store.clear_account_suspicious(account_id)?;
            self.append_event(&ReconEvent::AccountUnflagged {
                account_id: account_id.to_string(),
                cleared_by: admin_id.to_string(),
            })?;
            self.notify(account_id, "Account cleared", "The suspicion flag was removed.");
        }
        self.store.get_account(account_id)
    }

    // ── Service catalog ───────────────────────────────────────────

    pub fn upsert_service(&self, service: &ServiceRow) -> ReconResult<()> {
        if service.price <= 0 {
            return Err(ReconError::validation(format!(
                "service price must be positive, got {}",
                service.price
            )));
        }
        self.store.upsert_service(service)
    }

    // ── Purchases ─────────────────────────────────────────────────

    /// Create a payment for a service, plan its tranches, and record the
    /// purchase-time submission of tranche 1.
    pub fn create_payment(
        &self,
        account_id: &str,
        service_id: &str,
        kind: PaymentKind,
        initial_transaction_ref: &str,
    ) -> ReconResult<PaymentRow> {
        let account = self.store.get_account(account_id)?;
        if !account.is_active {
            return Err(ReconError::validation(format!(
                "account {account_id} is not active"
            )));
        }
        let service = self.store.get_service(service_id)?;
        let now = self.clock.now();

        let splits: Vec<Split> = match kind {
            PaymentKind::Full => Vec::new(),
            PaymentKind::Installment => {
                if account.is_suspicious {
                    return Err(ReconError::validation(format!(
                        "account {account_id} is flagged suspicious and may not start installment plans"
                    )));
                }
                if !account.installment_enabled {
                    return Err(ReconError::validation(format!(
                        "installment plans are not enabled for account {account_id}"
                    )));
                }
                let splits = if account.installment_splits.is_empty() {
                    self.config.default_splits.clone()
                } else {
                    account.installment_splits.clone()
                };
                if splits.len() < 2 {
                    return Err(ReconError::validation(
                        "an installment schedule needs at least two splits",
                    ));
                }
                splits
            }
        };

        let planned = planner::plan(service.price, &splits, now)?;
        let payment_id = Uuid::new_v4().to_string();
        let mut tranches: Vec<TrancheRow> = planned
            .into_iter()
            .map(|p| TrancheRow {
                payment_id: payment_id.clone(),
                installment_number: p.installment_number,
                percentage: p.percentage,
                amount: p.amount,
                due_date: p.due_date,
                status: TrancheStatus::Pending,
                transaction_ref: None,
                submitted_at: None,
                approved_at: None,
                paid_at: None,
                admin_notes: None,
                resubmissions: 0,
            })
            .collect();

        // The purchase carries the first transaction reference.
        tranche::submit(&mut tranches[0], initial_transaction_ref, now)?;

        let mut payment = PaymentRow {
            payment_id: payment_id.clone(),
            account_id: account_id.to_string(),
            service_id: service_id.to_string(),
            kind,
            status: payment::PaymentStatus::Pending,
            amount: service.price,
            amount_paid: 0,
            start_date: None,
            end_date: None,
            is_service_completed: false,
            version: 0,
            created_at: now,
        };
        payment::recompute(&mut payment, &tranches);

        self.in_txn(|| {
            self.store.insert_payment(&payment)?;
            for t in &tranches {
                self.store.insert_tranche(t)?;
            }
            self.append_event(&ReconEvent::PaymentCreated {
                payment_id: payment_id.clone(),
                account_id: account_id.to_string(),
                service_id: service_id.to_string(),
                kind,
                amount: payment.amount,
                tranche_count: tranches.len() as u32,
            })?;
            self.append_event(&ReconEvent::TrancheSubmitted {
                payment_id: payment_id.clone(),
                installment_number: 1,
                transaction_ref: initial_transaction_ref.trim().to_string(),
                resubmission: false,
            })?;
            Ok(())
        })?;

        log::info!(
            "payment {payment_id} created: account={account_id} service={service_id} kind={} amount={}",
            kind.as_str(),
            payment.amount
        );
        self.notify(
            account_id,
            "Payment received",
            "Your payment was recorded and is awaiting verification.",
        );
        self.store.get_payment(&payment_id)
    }

    // ── Tranche lifecycle ─────────────────────────────────────────

    /// Customer submits evidence of payment for a tranche.
    pub fn submit_tranche(
        &self,
        payment_id: &str,
        installment_number: u32,
        transaction_ref: &str,
    ) -> ReconResult<TrancheRow> {
        let (payment, mut tranches) = self.load_payment(payment_id)?;
        payment::ensure_in_sequence(payment_id, &tranches, installment_number)?;
        let idx = tranche_index(payment_id, &tranches, installment_number)?;
        let resubmission = tranches[idx].status == TrancheStatus::Rejected;
        let now = self.clock.now();

        self.in_txn(|| {
            tranche::submit(&mut tranches[idx], transaction_ref, now)?;
            self.store.update_tranche(&tranches[idx])?;
            self.recompute_and_persist(&payment, &tranches)?;
            self.append_event(&ReconEvent::TrancheSubmitted {
                payment_id: payment_id.to_string(),
                installment_number,
                transaction_ref: transaction_ref.trim().to_string(),
                resubmission,
            })?;
            Ok(())
        })?;

        Ok(tranches[idx].clone())
    }

    /// Administrator approves or rejects a submitted tranche.
    pub fn adjudicate_tranche(
        &self,
        payment_id: &str,
        installment_number: u32,
        decision: Decision,
        notes: Option<&str>,
    ) -> ReconResult<TrancheRow> {
        let (payment, mut tranches) = self.load_payment(payment_id)?;
        let idx = tranche_index(payment_id, &tranches, installment_number)?;
        let now = self.clock.now();

        self.in_txn(|| {
            tranche::adjudicate(&mut tranches[idx], decision, notes, now)?;
            self.store.update_tranche(&tranches[idx])?;
            self.recompute_and_persist(&payment, &tranches)?;
            let event = match decision {
                Decision::Approved => ReconEvent::TrancheApproved {
                    payment_id: payment_id.to_string(),
                    installment_number,
                },
                Decision::Rejected => ReconEvent::TrancheRejected {
                    payment_id: payment_id.to_string(),
                    installment_number,
                    notes: notes.map(str::to_string),
                },
            };
            self.append_event(&event)?;
            Ok(())
        })?;

        let (subject, body) = match decision {
            Decision::Approved => (
                "Installment approved",
                format!("Installment {installment_number} was verified."),
            ),
            Decision::Rejected => (
                "Installment rejected",
                format!("Installment {installment_number} was rejected. Please resubmit."),
            ),
        };
        self.notify(&payment.account_id, subject, &body);
        Ok(tranches[idx].clone())
    }

    /// Administrator closes the ledger step for an approved tranche.
    pub fn mark_tranche_paid(
        &self,
        payment_id: &str,
        installment_number: u32,
    ) -> ReconResult<TrancheRow> {
        let (payment, mut tranches) = self.load_payment(payment_id)?;
        let idx = tranche_index(payment_id, &tranches, installment_number)?;
        let now = self.clock.now();

        self.in_txn(|| {
            tranche::mark_paid(&mut tranches[idx], now)?;
            self.store.update_tranche(&tranches[idx])?;
            self.recompute_and_persist(&payment, &tranches)?;
            self.append_event(&ReconEvent::TranchePaid {
                payment_id: payment_id.to_string(),
                installment_number,
            })?;
            Ok(())
        })?;

        Ok(tranches[idx].clone())
    }

    // ── Service window and completion ─────────────────────────────

    /// Set the service activation window. An operational decision made
    /// by the administrator, editable, never derived from dates.
    pub fn set_service_window(
        &self,
        payment_id: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> ReconResult<PaymentRow> {
        if end_date < start_date {
            return Err(ReconError::validation(
                "service window end date precedes the start date",
            ));
        }
        self.store.get_payment(payment_id)?;
        self.store
            .set_service_window(payment_id, start_date, end_date)?;
        self.append_event(&ReconEvent::ServiceWindowSet {
            payment_id: payment_id.to_string(),
            start_date,
            end_date,
        })?;
        self.store.get_payment(payment_id)
    }

    /// One-way administrator override. Idempotent.
    pub fn mark_service_completed(&self, payment_id: &str) -> ReconResult<PaymentRow> {
        let payment = self.store.get_payment(payment_id)?;
        if payment.is_service_completed {
            return Ok(payment);
        }
        self.store.set_service_completed(payment_id)?;
        self.append_event(&ReconEvent::ServiceCompleted {
            payment_id: payment_id.to_string(),
        })?;
        self.notify(
            &payment.account_id,
            "Service completed",
            "Your service was marked as completed.",
        );
        self.store.get_payment(payment_id)
    }

    // ── Reads ─────────────────────────────────────────────────────

    pub fn payment(&self, payment_id: &str) -> ReconResult<(PaymentRow, Vec<TrancheRow>)> {
        self.load_payment(payment_id)
    }

    pub fn payments_for_account(&self, account_id: &str) -> ReconResult<Vec<PaymentRow>> {
        self.store.payments_for_account(account_id)
    }

    pub fn payment_stats(&self) -> ReconResult<PaymentStats> {
        self.store.payment_stats()
    }

    /// Derive the customer-visible phase of a purchased service at `now`.
    pub fn entitlement_phase(&self, payment_id: &str, now: DateTime<Utc>) -> ReconResult<Phase> {
        let payment = self.store.get_payment(payment_id)?;
        Ok(entitlement::phase_of(&payment, now))
    }

    // ── Suspicion scan ────────────────────────────────────────────

    /// Flag accounts whose installment schedule has slipped. Idempotent:
    /// already-flagged accounts are skipped, so a rerun returns only
    /// accounts flagged for the first time.
    pub fn run_suspicion_scan(&self, now: DateTime<Utc>) -> ReconResult<Vec<AccountId>> {
        let overdue = suspicion::find_overdue(&self.store, self.config.suspicion.grace_days, now)?;
        let mut flagged = Vec::new();

        for hit in overdue {
            if !self.store.flag_account_suspicious(&hit.account_id)? {
                continue;
            }
            self.append_event(&ReconEvent::AccountFlagged {
                account_id: hit.account_id.clone(),
                flagged_by: "monitor".to_string(),
                payment_id: Some(hit.payment_id.clone()),
                installment_number: Some(hit.installment_number),
            })?;
            log::warn!(
                "account {} flagged suspicious: payment {} tranche {} overdue since {}",
                hit.account_id,
                hit.payment_id,
                hit.installment_number,
                hit.due_date
            );
            self.notify(
                &hit.account_id,
                "Installment overdue",
                "A missed installment deadline disabled new installment plans on your account.",
            );
            flagged.push(hit.account_id);
        }

        Ok(flagged)
    }

    // ── Internals ─────────────────────────────────────────────────

    fn load_payment(&self, payment_id: &str) -> ReconResult<(PaymentRow, Vec<TrancheRow>)> {
        let payment = self.store.get_payment(payment_id)?;
        let tranches = self.store.tranches_for_payment(payment_id)?;
        Ok((payment, tranches))
    }

    /// Recompute the aggregate and persist it under the version guard.
    /// Emits the status-change event when the derived status moved.
    fn recompute_and_persist(
        &self,
        before: &PaymentRow,
        tranches: &[TrancheRow],
    ) -> ReconResult<()> {
        let mut after = before.clone();
        payment::recompute(&mut after, tranches);
        let stored = self.store.update_payment_derived(
            &after.payment_id,
            after.status,
            after.amount_paid,
            before.version,
        )?;
        if !stored {
            return Err(ReconError::Conflict {
                payment_id: after.payment_id.clone(),
                expected: before.version,
            });
        }
        if after.status != before.status {
            self.append_event(&ReconEvent::PaymentStatusChanged {
                payment_id: after.payment_id.clone(),
                from: before.status,
                to: after.status,
                amount_paid: after.amount_paid,
            })?;
        }
        Ok(())
    }

    fn in_txn<T>(&self, f: impl FnOnce() -> ReconResult<T>) -> ReconResult<T> {
        self.store.begin_immediate()?;
        match f() {
            Ok(value) => {
                self.store.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = self.store.rollback() {
                    log::error!("rollback failed after {err}: {rb}");
                }
                Err(err)
            }
        }
    }

    fn append_event(&self, event: &ReconEvent) -> ReconResult<()> {
        let entry = EventLogEntry {
            id: None,
            occurred_at: self.clock.now(),
            event_type: event.event_type().to_string(),
            payload: serde_json::to_string(event)?,
        };
        self.store.append_event(&entry)
    }

    fn notify(&self, account_id: &str, subject: &str, body: &str) {
        if self.config.notifications_enabled {
            self.notifier.send(account_id, subject, body);
        }
    }
}

fn tranche_index(
    payment_id: &str,
    tranches: &[TrancheRow],
    installment_number: u32,
) -> ReconResult<usize> {
    tranches
        .iter()
        .position(|t| t.installment_number == installment_number)
        .ok_or_else(|| {
            ReconError::not_found("tranche", format!("{payment_id}#{installment_number}"))
        })
}
