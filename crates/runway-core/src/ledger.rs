//! Transaction ledger
//!
//! Owns every state transition of a transaction and every mutation of the
//! loan, credit and installment state hanging off expense rules.
//!
//! ```text
//! projected -> pending -> completed | partial | skipped
//! ```
//!
//! Completed and partial transactions may be resubmitted: the previous effect
//! is reversed before the new one applies, so the balance moves by the
//! difference only. Nothing moves back to projected or pending.
//!
//! The cached `current_balance` on a profile is never adjusted by deltas. After
//! each mutation [`TransactionLedger::sync_balance`] recomputes it from the
//! initial balance and the realized transactions, under a per-user lock.
//! Mutations of one transaction (or rule) are serialized with a per-id lock,
//! and the writes of one mutation land through a single [`Store::apply`] batch.
//!
//! Locks are always taken in the same order: expense rule, then transaction,
//! then the user's balance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::amortization::PAID_OFF_EPSILON;
use crate::balance::compute_balance_from_transactions;
use crate::dates::{add_days, today};
use crate::error::{Error, Result};
use crate::models::{
    validate_amount, ExpenseRule, NewTransaction, SourceType, Transaction, TransactionStatus,
    UserProfile,
};
use crate::store::{Store, StoreWrite, TransactionQuery};

/// Days between a partially paid transaction and its remainder
pub const DEFAULT_REMAINDER_OFFSET_DAYS: i64 = 7;

/// Cached and computed balances closer than this are in sync
const DRIFT_TOLERANCE: f64 = 0.005;

/// Per-key mutexes, created on first use
#[derive(Default)]
struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }
}

/// Hold a per-key lock, recovering from poison if a holder panicked
fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!("Ledger lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Result of completing a transaction
#[derive(Debug, Clone, Serialize)]
pub struct LedgerOutcome {
    pub transaction: Transaction,
    /// Net change of the balance caused by this call
    pub balance_delta: f64,
    pub new_balance: f64,
    /// Pending remainders deleted because the transaction is now paid in full
    pub removed_remainders: Vec<String>,
}

/// Result of a partial payment
#[derive(Debug, Clone, Serialize)]
pub struct PartialPayment {
    pub transaction: Transaction,
    pub remainder: Transaction,
    pub balance_delta: f64,
    pub new_balance: f64,
    pub removed_remainders: Vec<String>,
}

/// Cached vs computed balance for one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub user_id: String,
    pub initial_balance: f64,
    pub cached_balance: f64,
    pub computed_balance: f64,
    /// cached - computed
    pub drift: f64,
    pub in_sync: bool,
    pub realized_count: usize,
}

pub struct TransactionLedger<S: Store> {
    store: S,
    locks: LockRegistry,
    balance_locks: LockRegistry,
    remainder_offset_days: i64,
}

impl<S: Store> TransactionLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: LockRegistry::default(),
            balance_locks: LockRegistry::default(),
            remainder_offset_days: DEFAULT_REMAINDER_OFFSET_DAYS,
        }
    }

    pub fn with_remainder_offset(mut self, days: i64) -> Self {
        self.remainder_offset_days = days;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn load_transaction(&self, id: &str) -> Result<Transaction> {
        self.store
            .get_transaction(id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))
    }

    fn load_rule(&self, rule_id: &str) -> Result<ExpenseRule> {
        self.store
            .get_expense_rule(rule_id)?
            .ok_or_else(|| Error::NotFound(format!("Expense rule {}", rule_id)))
    }

    pub fn profile(&self, user_id: &str) -> Result<UserProfile> {
        self.store
            .get_profile(user_id)?
            .ok_or_else(|| Error::NotFound(format!("Profile for user {}", user_id)))
    }

    /// Create a user's profile with its starting balance
    pub fn create_profile(&self, user_id: &str, initial_balance: f64) -> Result<UserProfile> {
        if !initial_balance.is_finite() {
            return Err(Error::Validation("Initial balance must be a number".into()));
        }
        let lock = self.balance_locks.handle(user_id);
        let _guard = hold(&lock);

        if self.store.get_profile(user_id)?.is_some() {
            return Err(Error::InvalidState(format!(
                "Profile for user {} already exists",
                user_id
            )));
        }
        let profile = UserProfile::new(user_id, initial_balance);
        self.store.put_profile(&profile)?;
        info!(user_id, initial_balance, "Profile created");
        Ok(profile)
    }

    /// Change the baseline balance; the cached balance follows
    pub fn set_initial_balance(&self, user_id: &str, initial_balance: f64) -> Result<UserProfile> {
        if !initial_balance.is_finite() {
            return Err(Error::Validation("Initial balance must be a number".into()));
        }
        {
            let lock = self.balance_locks.handle(user_id);
            let _guard = hold(&lock);
            let mut profile = self.profile(user_id)?;
            profile.initial_balance = initial_balance;
            profile.updated_at = Utc::now();
            self.store.put_profile(&profile)?;
        }
        info!(user_id, initial_balance, "Initial balance updated");
        self.sync_balance(user_id)
    }

    pub fn create_transaction(&self, new: NewTransaction) -> Result<Transaction> {
        new.validate()?;
        // The owner must exist before anything is recorded against them
        self.profile(&new.user_id)?;

        let tx = new.into_transaction();
        self.store.create_transaction(&tx)?;
        info!(id = %tx.id, name = %tx.name, amount = tx.projected_amount, "Transaction created");
        self.sync_balance(&tx.user_id)?;
        Ok(tx)
    }

    /// Delete a transaction at the user's request
    pub fn delete_transaction(&self, id: &str) -> Result<Transaction> {
        let lock = self.locks.handle(id);
        let _guard = hold(&lock);

        let tx = self.load_transaction(id)?;
        self.store.delete_transaction(id)?;
        info!(id, name = %tx.name, "Transaction deleted");
        self.sync_balance(&tx.user_id)?;
        Ok(tx)
    }

    /// Delete the open transactions generated by a rule
    ///
    /// Realized history stays so the balance does not change retroactively.
    /// Each candidate is re-read under its lock, so one completed in the
    /// meantime is kept.
    pub fn delete_rule_transactions(&self, rule_id: &str) -> Result<usize> {
        let open = self.store.query_transactions(
            &TransactionQuery::new()
                .source_id(rule_id)
                .statuses(&[TransactionStatus::Projected, TransactionStatus::Pending]),
        )?;

        let mut deleted = 0;
        let mut users: Vec<String> = Vec::new();
        for candidate in &open {
            let lock = self.locks.handle(&candidate.id);
            let _guard = hold(&lock);

            let tx = match self.store.get_transaction(&candidate.id)? {
                Some(tx) if tx.status.is_open() => tx,
                _ => {
                    debug!(rule_id, id = %candidate.id, "Transaction changed before delete, keeping");
                    continue;
                }
            };
            self.store.delete_transaction(&tx.id)?;
            deleted += 1;
            if !users.contains(&tx.user_id) {
                users.push(tx.user_id);
            }
        }
        for user_id in &users {
            self.sync_balance(user_id)?;
        }

        info!(rule_id, deleted, "Rule transactions deleted");
        Ok(deleted)
    }

    /// Delete an expense rule together with its open transactions
    pub fn delete_expense_rule(&self, rule_id: &str) -> Result<usize> {
        let lock = self.locks.handle(&rule_key(rule_id));
        let _guard = hold(&lock);

        self.load_rule(rule_id)?;
        let deleted = self.delete_rule_transactions(rule_id)?;
        self.store.delete_expense_rule(rule_id)?;
        info!(rule_id, "Expense rule deleted");
        Ok(deleted)
    }

    /// Pending remainders spawned by a partial payment of `parent_id`
    fn pending_remainders(&self, parent_id: &str) -> Result<Vec<String>> {
        let remainders = self.store.query_transactions(
            &TransactionQuery::new()
                .parent_id(parent_id)
                .status(TransactionStatus::Pending),
        )?;
        Ok(remainders.into_iter().map(|r| r.id).collect())
    }

    /// Lock handle of the rule a transaction was generated from, if any
    ///
    /// The source of a transaction never changes, so it can be read before
    /// the transaction lock is held.
    fn source_rule_lock(&self, id: &str) -> Result<Option<Arc<Mutex<()>>>> {
        let tx = self.load_transaction(id)?;
        Ok(match (tx.source_type, tx.source_id.as_deref()) {
            (SourceType::ExpenseRule, Some(rule_id)) => Some(self.locks.handle(&rule_key(rule_id))),
            _ => None,
        })
    }

    /// Mark a transaction paid (or received) in full
    pub fn complete(
        &self,
        id: &str,
        actual_amount: f64,
        actual_date: Option<NaiveDate>,
        notes: Option<String>,
    ) -> Result<LedgerOutcome> {
        validate_amount("Actual amount", actual_amount)?;

        let rule_lock = self.source_rule_lock(id)?;
        let _rule_guard = rule_lock.as_deref().map(hold);
        let lock = self.locks.handle(id);
        let _guard = hold(&lock);

        let mut tx = self.load_transaction(id)?;
        if tx.status == TransactionStatus::Skipped {
            return Err(Error::InvalidState(format!(
                "Transaction {} was skipped and cannot be completed",
                id
            )));
        }

        let previous_status = tx.status;
        let old_effect = tx.balance_effect();
        let now = Utc::now();

        tx.actual_amount = Some(actual_amount);
        tx.variance = Some(actual_amount - tx.projected_amount);
        tx.status = TransactionStatus::Completed;
        tx.actual_date = Some(actual_date.unwrap_or_else(today));
        tx.completed_at = Some(now);
        tx.updated_at = now;
        if notes.is_some() {
            tx.notes = notes;
        }

        let mut writes = vec![StoreWrite::UpdateTransaction(tx.clone())];
        let removed_remainders = if previous_status == TransactionStatus::Partial {
            self.pending_remainders(id)?
        } else {
            Vec::new()
        };
        writes.extend(
            removed_remainders
                .iter()
                .map(|remainder_id| StoreWrite::DeleteTransaction(remainder_id.clone())),
        );

        // Rule side effects happen once, on the first full payment
        if previous_status != TransactionStatus::Completed {
            if let Some(rule) = self.rule_effects(&tx)? {
                writes.push(StoreWrite::PutExpenseRule(rule));
            }
        }
        self.store.apply(&writes)?;

        let balance_delta = tx.balance_effect() - old_effect;
        let profile = self.sync_balance(&tx.user_id)?;

        info!(
            id,
            name = %tx.name,
            actual_amount,
            balance_delta,
            removed = removed_remainders.len(),
            resubmitted = previous_status.is_realized(),
            "Transaction completed"
        );

        Ok(LedgerOutcome {
            transaction: tx,
            balance_delta,
            new_balance: profile.current_balance,
            removed_remainders,
        })
    }

    /// The source rule of a completed payment with its loan or installment
    /// plan moved forward, or `None` when nothing changes
    ///
    /// Callers hold the rule lock.
    fn rule_effects(&self, tx: &Transaction) -> Result<Option<ExpenseRule>> {
        let rule_id = match (tx.source_type, tx.source_id.as_deref()) {
            (SourceType::ExpenseRule, Some(rule_id)) => rule_id,
            _ => return Ok(None),
        };
        let mut rule = match self.store.get_expense_rule(rule_id)? {
            Some(rule) => rule,
            None => {
                warn!(rule_id, transaction_id = %tx.id, "Source rule no longer exists");
                return Ok(None);
            }
        };

        let mut changed = false;
        if rule.loan_config.is_some() {
            match tx.payment_breakdown {
                Some(breakdown) => {
                    record_loan_payment(&mut rule, breakdown.principal_paid)?;
                    changed = true;
                }
                None => warn!(rule_id, transaction_id = %tx.id, "Loan payment has no breakdown"),
            }
        }
        match rule.installment_config.as_ref().map(|plan| plan.remaining()) {
            Some(0) => warn!(rule_id, transaction_id = %tx.id, "Installment plan already fully paid"),
            Some(_) => {
                record_installment(&mut rule)?;
                changed = true;
            }
            None => {}
        }
        Ok(changed.then_some(rule))
    }

    /// Mark a transaction as not happening
    pub fn skip(&self, id: &str, notes: Option<String>) -> Result<Transaction> {
        let lock = self.locks.handle(id);
        let _guard = hold(&lock);

        let mut tx = self.load_transaction(id)?;
        if tx.is_realized() {
            return Err(Error::InvalidState(format!(
                "Transaction {} is already {} and cannot be skipped",
                id, tx.status
            )));
        }

        tx.status = TransactionStatus::Skipped;
        tx.updated_at = Utc::now();
        if notes.is_some() {
            tx.notes = notes;
        }
        self.store.update_transaction(&tx)?;
        self.sync_balance(&tx.user_id)?;

        info!(id, name = %tx.name, "Transaction skipped");
        Ok(tx)
    }

    /// Pay part of a transaction and schedule the rest
    pub fn partial_pay(
        &self,
        id: &str,
        partial_amount: f64,
        notes: Option<String>,
    ) -> Result<PartialPayment> {
        validate_amount("Partial amount", partial_amount)?;

        let lock = self.locks.handle(id);
        let _guard = hold(&lock);

        let mut tx = self.load_transaction(id)?;
        if tx.status == TransactionStatus::Skipped {
            return Err(Error::InvalidState(format!(
                "Transaction {} was skipped and cannot be paid",
                id
            )));
        }
        if partial_amount <= 0.0 || partial_amount >= tx.projected_amount {
            return Err(Error::Validation(format!(
                "Partial amount must be between 0 and {:.2} (got {:.2})",
                tx.projected_amount, partial_amount
            )));
        }

        let old_effect = tx.balance_effect();
        let removed_remainders = self.pending_remainders(id)?;
        let now = Utc::now();

        tx.actual_amount = Some(partial_amount);
        tx.variance = Some(partial_amount - tx.projected_amount);
        tx.status = TransactionStatus::Partial;
        tx.actual_date = Some(today());
        tx.completed_at = Some(now);
        tx.updated_at = now;
        if notes.is_some() {
            tx.notes = notes;
        }

        let mut remainder = NewTransaction::new(
            &tx.user_id,
            &format!("{} (remaining)", tx.name),
            tx.tx_type,
            tx.projected_amount - partial_amount,
            add_days(tx.scheduled_date, self.remainder_offset_days),
        )
        .with_category(&tx.category)
        .with_status(TransactionStatus::Pending)
        .into_transaction();
        remainder.parent_transaction_id = Some(tx.id.clone());

        // Old remainders go only if the new one lands with the payment
        let mut writes: Vec<StoreWrite> = removed_remainders
            .iter()
            .map(|remainder_id| StoreWrite::DeleteTransaction(remainder_id.clone()))
            .collect();
        writes.push(StoreWrite::UpdateTransaction(tx.clone()));
        writes.push(StoreWrite::CreateTransaction(remainder.clone()));
        self.store.apply(&writes)?;

        let balance_delta = tx.balance_effect() - old_effect;
        let profile = self.sync_balance(&tx.user_id)?;

        info!(
            id,
            partial_amount,
            remainder_id = %remainder.id,
            remainder_amount = remainder.projected_amount,
            "Partial payment recorded"
        );

        Ok(PartialPayment {
            transaction: tx,
            remainder,
            balance_delta,
            new_balance: profile.current_balance,
            removed_remainders,
        })
    }

    /// Reduce a loan by the principal portion of a payment
    pub fn apply_loan_payment(&self, rule_id: &str, principal_paid: f64) -> Result<ExpenseRule> {
        let lock = self.locks.handle(&rule_key(rule_id));
        let _guard = hold(&lock);

        let mut rule = self.load_rule(rule_id)?;
        record_loan_payment(&mut rule, principal_paid)?;
        self.store.put_expense_rule(&rule)?;
        Ok(rule)
    }

    /// Record a card's new statement balance
    pub fn update_credit_balance(&self, rule_id: &str, new_balance: f64) -> Result<ExpenseRule> {
        validate_amount("Credit balance", new_balance)?;
        let lock = self.locks.handle(&rule_key(rule_id));
        let _guard = hold(&lock);

        let mut rule = self.load_rule(rule_id)?;
        let credit = rule.credit_config.as_mut().ok_or_else(|| {
            Error::InvalidState(format!("Expense rule {} has no credit card", rule_id))
        })?;
        let previous = credit.current_balance;
        credit.current_balance = new_balance;
        self.store.put_expense_rule(&rule)?;

        info!(rule_id, previous, new_balance, "Credit balance updated");
        Ok(rule)
    }

    /// Count one more installment as paid
    pub fn advance_installment(&self, rule_id: &str) -> Result<ExpenseRule> {
        let lock = self.locks.handle(&rule_key(rule_id));
        let _guard = hold(&lock);

        let mut rule = self.load_rule(rule_id)?;
        record_installment(&mut rule)?;
        self.store.put_expense_rule(&rule)?;
        Ok(rule)
    }

    /// Compare the cached balance with the one derived from the ledger
    pub fn reconcile(&self, user_id: &str) -> Result<ReconciliationReport> {
        let profile = self.profile(user_id)?;
        let txs = self
            .store
            .query_transactions(&TransactionQuery::for_user(user_id))?;
        let computed = compute_balance_from_transactions(profile.initial_balance, &txs);
        let drift = profile.current_balance - computed;
        let in_sync = drift.abs() < DRIFT_TOLERANCE;

        if !in_sync {
            warn!(
                user_id,
                cached = profile.current_balance,
                computed,
                drift,
                "Balance drift detected"
            );
        }

        Ok(ReconciliationReport {
            user_id: user_id.to_string(),
            initial_balance: profile.initial_balance,
            cached_balance: profile.current_balance,
            computed_balance: computed,
            drift,
            in_sync,
            realized_count: txs.iter().filter(|t| t.is_realized()).count(),
        })
    }

    /// Recompute and store the cached balance; the only writer of it
    pub fn sync_balance(&self, user_id: &str) -> Result<UserProfile> {
        let lock = self.balance_locks.handle(user_id);
        let _guard = hold(&lock);

        let mut profile = self.profile(user_id)?;
        let txs = self
            .store
            .query_transactions(&TransactionQuery::for_user(user_id))?;
        let computed = compute_balance_from_transactions(profile.initial_balance, &txs);

        if (profile.current_balance - computed).abs() > f64::EPSILON {
            debug!(
                user_id,
                cached = profile.current_balance,
                computed,
                "Syncing cached balance"
            );
            profile.current_balance = computed;
            profile.updated_at = Utc::now();
            self.store.put_profile(&profile)?;
        }
        Ok(profile)
    }
}

fn rule_key(rule_id: &str) -> String {
    format!("rule:{}", rule_id)
}

fn record_loan_payment(rule: &mut ExpenseRule, principal_paid: f64) -> Result<()> {
    validate_amount("Principal paid", principal_paid)?;
    let rule_id = rule.id.clone();
    let loan = rule.loan_config.as_mut().ok_or_else(|| {
        Error::InvalidState(format!("Expense rule {} has no loan", rule_id))
    })?;

    loan.current_balance = (loan.current_balance - principal_paid).max(0.0);
    loan.payments_made += 1;
    let paid_off = loan.current_balance <= PAID_OFF_EPSILON;
    let remaining = loan.current_balance;
    if paid_off {
        rule.is_active = false;
    }

    info!(rule_id = %rule_id, principal_paid, remaining, paid_off, "Loan payment applied");
    Ok(())
}

fn record_installment(rule: &mut ExpenseRule) -> Result<()> {
    let rule_id = rule.id.clone();
    let plan = rule.installment_config.as_mut().ok_or_else(|| {
        Error::InvalidState(format!("Expense rule {} has no installment plan", rule_id))
    })?;
    if plan.remaining() == 0 {
        return Err(Error::InvalidState(format!(
            "All {} installments of rule {} are already paid",
            plan.total_installments, rule_id
        )));
    }

    plan.installments_paid += 1;
    let finished = plan.remaining() == 0;
    let paid = plan.installments_paid;
    if finished {
        rule.is_active = false;
    }

    info!(rule_id = %rule_id, paid, finished, "Installment recorded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Frequency, InstallmentConfig, LoanConfig, PaymentBreakdown, TransactionType,
    };
    use crate::store::MemoryStore;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ledger() -> TransactionLedger<MemoryStore> {
        let ledger = TransactionLedger::new(MemoryStore::new());
        ledger.create_profile("u1", 1000.0).unwrap();
        ledger
    }

    fn add(ledger: &TransactionLedger<MemoryStore>, tx_type: TransactionType, amount: f64) -> Transaction {
        ledger
            .create_transaction(NewTransaction::new("u1", "Item", tx_type, amount, d(2024, 1, 1)))
            .unwrap()
    }

    fn rule(id: &str) -> ExpenseRule {
        ExpenseRule {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: "Rule".to_string(),
            category: String::new(),
            amount: 100.0,
            frequency: Frequency::Monthly,
            is_active: true,
            loan_config: None,
            credit_config: None,
            installment_config: None,
        }
    }

    #[test]
    fn test_complete_applies_signed_effect() {
        let ledger = ledger();
        let bill = add(&ledger, TransactionType::Bill, 120.0);

        let outcome = ledger.complete(&bill.id, 110.0, Some(d(2024, 1, 2)), None).unwrap();
        assert_eq!(outcome.balance_delta, -110.0);
        assert_eq!(outcome.new_balance, 890.0);
        assert_eq!(outcome.transaction.variance, Some(-10.0));
        assert_eq!(outcome.transaction.actual_date, Some(d(2024, 1, 2)));
        assert!(outcome.transaction.completed_at.is_some());
    }

    #[test]
    fn test_resubmission_moves_balance_by_difference() {
        let ledger = ledger();
        let pay = add(&ledger, TransactionType::Income, 500.0);

        ledger.complete(&pay.id, 500.0, None, None).unwrap();
        let again = ledger.complete(&pay.id, 650.0, None, None).unwrap();
        assert_eq!(again.balance_delta, 150.0);
        assert_eq!(again.new_balance, 1650.0);

        let bill = add(&ledger, TransactionType::Expense, 100.0);
        ledger.complete(&bill.id, 100.0, None, None).unwrap();
        let lower = ledger.complete(&bill.id, 80.0, None, None).unwrap();
        assert_eq!(lower.balance_delta, 20.0);
        assert_eq!(lower.new_balance, 1570.0);
    }

    #[test]
    fn test_partial_pay_spawns_linked_remainder() {
        let ledger = ledger();
        let bill = add(&ledger, TransactionType::Bill, 100.0);

        let first = ledger.partial_pay(&bill.id, 40.0, None).unwrap();
        assert_eq!(first.remainder.projected_amount, 60.0);
        assert_eq!(first.remainder.scheduled_date, d(2024, 1, 8));
        assert_eq!(first.remainder.status, TransactionStatus::Pending);
        assert_eq!(first.remainder.parent_transaction_id.as_deref(), Some(bill.id.as_str()));
        assert_eq!(first.new_balance, 960.0);

        let second = ledger.partial_pay(&bill.id, 70.0, None).unwrap();
        assert_eq!(second.removed_remainders, vec![first.remainder.id.clone()]);
        assert_eq!(second.remainder.projected_amount, 30.0);
        assert_eq!(second.balance_delta, -30.0);
        assert_eq!(second.new_balance, 930.0);
        assert!(ledger.store().get_transaction(&first.remainder.id).unwrap().is_none());
    }

    #[test]
    fn test_complete_after_partial_removes_remainder() {
        let ledger = ledger();
        let bill = add(&ledger, TransactionType::Bill, 100.0);
        let partial = ledger.partial_pay(&bill.id, 40.0, None).unwrap();

        let outcome = ledger.complete(&bill.id, 100.0, None, None).unwrap();
        assert_eq!(outcome.removed_remainders, vec![partial.remainder.id]);
        assert_eq!(outcome.balance_delta, -60.0);
        assert_eq!(outcome.new_balance, 900.0);
    }

    #[test]
    fn test_partial_amount_bounds() {
        let ledger = ledger();
        let bill = add(&ledger, TransactionType::Bill, 100.0);
        for amount in [0.0, 100.0, 150.0, -5.0] {
            assert!(matches!(
                ledger.partial_pay(&bill.id, amount, None),
                Err(Error::Validation(_))
            ));
        }
    }

    #[test]
    fn test_skip_rules() {
        let ledger = ledger();
        let bill = add(&ledger, TransactionType::Bill, 100.0);
        let skipped = ledger.skip(&bill.id, Some("waived".into())).unwrap();
        assert_eq!(skipped.status, TransactionStatus::Skipped);
        assert_eq!(ledger.profile("u1").unwrap().current_balance, 1000.0);
        assert!(matches!(
            ledger.complete(&bill.id, 100.0, None, None),
            Err(Error::InvalidState(_))
        ));

        let paid = add(&ledger, TransactionType::Bill, 50.0);
        ledger.complete(&paid.id, 50.0, None, None).unwrap();
        assert!(matches!(ledger.skip(&paid.id, None), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_missing_ids() {
        let ledger = ledger();
        assert!(ledger.complete("nope", 1.0, None, None).unwrap_err().is_not_found());
        assert!(ledger.skip("nope", None).unwrap_err().is_not_found());
        assert!(ledger.partial_pay("nope", 1.0, None).unwrap_err().is_not_found());
        assert!(ledger.apply_loan_payment("nope", 1.0).unwrap_err().is_not_found());
    }

    #[test]
    fn test_loan_payment_forwarded_once() {
        let ledger = ledger();
        let mut loan_rule = rule("loan");
        loan_rule.loan_config = Some(LoanConfig {
            principal: 1000.0,
            annual_rate: 12.0,
            term_months: 12,
            monthly_payment: 88.85,
            current_balance: 1000.0,
            payments_made: 0,
        });
        ledger.store().put_expense_rule(&loan_rule).unwrap();

        let payment = ledger
            .create_transaction(
                NewTransaction::new("u1", "Loan", TransactionType::Loan, 88.85, d(2024, 1, 1))
                    .with_source(SourceType::ExpenseRule, "loan")
                    .with_payment_breakdown(PaymentBreakdown {
                        payment_number: 1,
                        principal_paid: 78.85,
                        interest_paid: 10.0,
                    }),
            )
            .unwrap();

        ledger.complete(&payment.id, 88.85, None, None).unwrap();
        ledger.complete(&payment.id, 90.0, None, None).unwrap();

        let loan = ledger.store().get_expense_rule("loan").unwrap().unwrap().loan_config.unwrap();
        assert_eq!(loan.payments_made, 1);
        assert!((loan.current_balance - 921.15).abs() < 1e-9);
    }

    #[test]
    fn test_loan_paid_off_deactivates_rule() {
        let ledger = ledger();
        let mut loan_rule = rule("loan");
        loan_rule.loan_config = Some(LoanConfig {
            principal: 1000.0,
            annual_rate: 0.0,
            term_months: 10,
            monthly_payment: 100.0,
            current_balance: 50.0,
            payments_made: 9,
        });
        ledger.store().put_expense_rule(&loan_rule).unwrap();

        let updated = ledger.apply_loan_payment("loan", 100.0).unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.loan_config.unwrap().current_balance, 0.0);

        ledger.store().put_expense_rule(&rule("plain")).unwrap();
        assert!(matches!(
            ledger.apply_loan_payment("plain", 10.0),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            ledger.update_credit_balance("plain", 10.0),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_installments_advance_on_completion() {
        let ledger = ledger();
        let mut plan = rule("bnpl");
        plan.installment_config = Some(InstallmentConfig {
            total_installments: 2,
            installments_paid: 1,
        });
        ledger.store().put_expense_rule(&plan).unwrap();

        let tx = ledger
            .create_transaction(
                NewTransaction::new("u1", "Sofa", TransactionType::Expense, 250.0, d(2024, 2, 1))
                    .with_source(SourceType::ExpenseRule, "bnpl"),
            )
            .unwrap();
        ledger.complete(&tx.id, 250.0, None, None).unwrap();

        let rule = ledger.store().get_expense_rule("bnpl").unwrap().unwrap();
        assert!(!rule.is_active);
        assert_eq!(rule.installment_config.unwrap().installments_paid, 2);
        assert!(matches!(ledger.advance_installment("bnpl"), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_reconcile_detects_and_sync_fixes_drift() {
        let ledger = ledger();
        let pay = add(&ledger, TransactionType::Income, 300.0);
        ledger.complete(&pay.id, 300.0, None, None).unwrap();

        let mut profile = ledger.profile("u1").unwrap();
        profile.current_balance = 5000.0;
        ledger.store().put_profile(&profile).unwrap();

        let report = ledger.reconcile("u1").unwrap();
        assert!(!report.in_sync);
        assert_eq!(report.computed_balance, 1300.0);
        assert_eq!(report.drift, 3700.0);
        assert_eq!(report.realized_count, 1);

        let synced = ledger.sync_balance("u1").unwrap();
        assert_eq!(synced.current_balance, 1300.0);
        assert!(ledger.reconcile("u1").unwrap().in_sync);
    }

    #[test]
    fn test_delete_rule_keeps_realized_history() {
        let ledger = ledger();
        ledger.store().put_expense_rule(&rule("gym")).unwrap();
        let mk = |day| {
            ledger
                .create_transaction(
                    NewTransaction::new("u1", "Gym", TransactionType::Expense, 40.0, d(2024, 1, day))
                        .with_source(SourceType::ExpenseRule, "gym"),
                )
                .unwrap()
        };
        let paid = mk(1);
        mk(2);
        mk(3);
        ledger.complete(&paid.id, 40.0, None, None).unwrap();

        assert_eq!(ledger.delete_expense_rule("gym").unwrap(), 2);
        assert!(ledger.store().get_expense_rule("gym").unwrap().is_none());
        assert!(ledger.store().get_transaction(&paid.id).unwrap().is_some());
        assert_eq!(ledger.profile("u1").unwrap().current_balance, 960.0);
    }

    #[test]
    fn test_delete_realized_transaction_restores_balance() {
        let ledger = ledger();
        let bill = add(&ledger, TransactionType::Bill, 75.0);
        ledger.complete(&bill.id, 75.0, None, None).unwrap();
        assert_eq!(ledger.profile("u1").unwrap().current_balance, 925.0);

        ledger.delete_transaction(&bill.id).unwrap();
        assert_eq!(ledger.profile("u1").unwrap().current_balance, 1000.0);
        assert!(ledger.delete_transaction(&bill.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_profile_lifecycle() {
        let ledger = ledger();
        assert!(matches!(
            ledger.create_profile("u1", 5.0),
            Err(Error::InvalidState(_))
        ));
        let bill = add(&ledger, TransactionType::Bill, 100.0);
        ledger.complete(&bill.id, 100.0, None, None).unwrap();

        let profile = ledger.set_initial_balance("u1", 2000.0).unwrap();
        assert_eq!(profile.current_balance, 1900.0);
        assert!(ledger
            .create_transaction(NewTransaction::new("ghost", "X", TransactionType::Bill, 1.0, d(2024, 1, 1)))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_concurrent_completions_do_not_double_count() {
        let ledger = Arc::new(ledger());
        let pay = add(&ledger, TransactionType::Income, 100.0);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                let id = pay.id.clone();
                std::thread::spawn(move || {
                    ledger.complete(&id, 100.0 + i as f64, None, None).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let tx = ledger.store().get_transaction(&pay.id).unwrap().unwrap();
        let profile = ledger.profile("u1").unwrap();
        assert_eq!(profile.current_balance, 1000.0 + tx.actual_amount.unwrap());
        assert!(ledger.reconcile("u1").unwrap().in_sync);
    }

    // ========== Interleaving ==========

    type WriteHook = Arc<dyn Fn(Vec<StoreWrite>) -> Vec<StoreWrite> + Send + Sync>;
    type QueryHook = Box<dyn FnOnce(&MemoryStore) + Send>;

    /// MemoryStore with hooks to pause or rewrite batches and to act right
    /// after a query returns
    #[derive(Default)]
    struct HookedStore {
        inner: MemoryStore,
        before_apply: Mutex<Option<WriteHook>>,
        after_query: Mutex<Option<QueryHook>>,
    }

    impl HookedStore {
        fn on_apply(&self, hook: impl Fn(Vec<StoreWrite>) -> Vec<StoreWrite> + Send + Sync + 'static) {
            *self.before_apply.lock().unwrap() = Some(Arc::new(hook));
        }

        fn once_after_query(&self, hook: impl FnOnce(&MemoryStore) + Send + 'static) {
            *self.after_query.lock().unwrap() = Some(Box::new(hook));
        }
    }

    impl Store for HookedStore {
        fn apply(&self, writes: &[StoreWrite]) -> Result<()> {
            let hook = self.before_apply.lock().unwrap().clone();
            let writes = match hook {
                Some(hook) => hook(writes.to_vec()),
                None => writes.to_vec(),
            };
            self.inner.apply(&writes)
        }
        fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
            self.inner.get_transaction(id)
        }
        fn create_transaction(&self, tx: &Transaction) -> Result<()> {
            self.inner.create_transaction(tx)
        }
        fn update_transaction(&self, tx: &Transaction) -> Result<()> {
            self.inner.update_transaction(tx)
        }
        fn delete_transaction(&self, id: &str) -> Result<()> {
            self.inner.delete_transaction(id)
        }
        fn query_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
            let found = self.inner.query_transactions(query)?;
            let hook = self.after_query.lock().unwrap().take();
            if let Some(hook) = hook {
                hook(&self.inner);
            }
            Ok(found)
        }
        fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
            self.inner.get_profile(user_id)
        }
        fn put_profile(&self, profile: &UserProfile) -> Result<()> {
            self.inner.put_profile(profile)
        }
        fn get_expense_rule(&self, id: &str) -> Result<Option<ExpenseRule>> {
            self.inner.get_expense_rule(id)
        }
        fn put_expense_rule(&self, rule: &ExpenseRule) -> Result<()> {
            self.inner.put_expense_rule(rule)
        }
        fn delete_expense_rule(&self, id: &str) -> Result<()> {
            self.inner.delete_expense_rule(id)
        }
        fn list_expense_rules(&self, user_id: &str) -> Result<Vec<ExpenseRule>> {
            self.inner.list_expense_rules(user_id)
        }
        fn put_income_source(&self, source: &crate::models::IncomeSource) -> Result<()> {
            self.inner.put_income_source(source)
        }
        fn list_income_sources(&self, user_id: &str) -> Result<Vec<crate::models::IncomeSource>> {
            self.inner.list_income_sources(user_id)
        }
    }

    fn hooked_ledger() -> TransactionLedger<HookedStore> {
        let ledger = TransactionLedger::new(HookedStore::default());
        ledger.create_profile("u1", 1000.0).unwrap();
        ledger
    }

    fn loan_payment(ledger: &TransactionLedger<HookedStore>) -> Transaction {
        let mut loan_rule = rule("loan");
        loan_rule.loan_config = Some(LoanConfig {
            principal: 1000.0,
            annual_rate: 12.0,
            term_months: 12,
            monthly_payment: 88.85,
            current_balance: 1000.0,
            payments_made: 0,
        });
        ledger.store().put_expense_rule(&loan_rule).unwrap();
        ledger
            .create_transaction(
                NewTransaction::new("u1", "Loan", TransactionType::Loan, 88.85, d(2024, 1, 1))
                    .with_source(SourceType::ExpenseRule, "loan")
                    .with_payment_breakdown(PaymentBreakdown {
                        payment_number: 1,
                        principal_paid: 78.85,
                        interest_paid: 10.0,
                    }),
            )
            .unwrap()
    }

    #[test]
    fn test_complete_and_rule_delete_interleave_without_hanging() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let ledger = Arc::new(hooked_ledger());
        let payment = loan_payment(&ledger);

        // Hold the completion inside its write until the rule delete has started
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        ledger.store().on_apply(move |writes| {
            let completing = writes.iter().any(|w| {
                matches!(w, StoreWrite::UpdateTransaction(t) if t.status == TransactionStatus::Completed)
            });
            if completing {
                let _ = entered_tx.lock().unwrap().send(());
                let _ = release_rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
            }
            writes
        });

        let (complete_done, complete_rx) = mpsc::channel();
        {
            let ledger = Arc::clone(&ledger);
            let id = payment.id.clone();
            thread::spawn(move || {
                let _ = complete_done.send(ledger.complete(&id, 88.85, None, None).map(|o| o.transaction));
            });
        }
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (delete_done, delete_rx) = mpsc::channel();
        {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let _ = delete_done.send(ledger.delete_expense_rule("loan"));
            });
        }
        thread::sleep(Duration::from_millis(100));
        release_tx.send(()).unwrap();

        let completed = complete_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("complete did not return")
            .unwrap();
        let deleted = delete_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("delete_expense_rule did not return")
            .unwrap();

        assert_eq!(completed.status, TransactionStatus::Completed);
        assert_eq!(deleted, 0);
        assert!(ledger.store().get_expense_rule("loan").unwrap().is_none());
        let stored = ledger.store().get_transaction(&payment.id).unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert!((ledger.profile("u1").unwrap().current_balance - 911.15).abs() < 1e-9);
    }

    #[test]
    fn test_rule_delete_keeps_transaction_completed_after_query() {
        let ledger = hooked_ledger();
        ledger.store().put_expense_rule(&rule("gym")).unwrap();
        let mk = |day| {
            ledger
                .create_transaction(
                    NewTransaction::new("u1", "Gym", TransactionType::Expense, 40.0, d(2024, 1, day))
                        .with_source(SourceType::ExpenseRule, "gym"),
                )
                .unwrap()
        };
        let raced = mk(1);
        let open = mk(2);

        // Another caller completes `raced` between the lookup and the delete
        let raced_id = raced.id.clone();
        ledger.store().once_after_query(move |store| {
            let mut tx = store.get_transaction(&raced_id).unwrap().unwrap();
            tx.status = TransactionStatus::Completed;
            tx.actual_amount = Some(40.0);
            store.update_transaction(&tx).unwrap();
        });

        assert_eq!(ledger.delete_rule_transactions("gym").unwrap(), 1);
        let kept = ledger.store().get_transaction(&raced.id).unwrap().unwrap();
        assert_eq!(kept.status, TransactionStatus::Completed);
        assert!(ledger.store().get_transaction(&open.id).unwrap().is_none());
        assert_eq!(ledger.profile("u1").unwrap().current_balance, 960.0);
    }

    #[test]
    fn test_failed_remainder_insert_keeps_previous_remainder() {
        let ledger = hooked_ledger();
        let bill = ledger
            .create_transaction(NewTransaction::new("u1", "Power", TransactionType::Bill, 100.0, d(2024, 1, 1)))
            .unwrap();
        let first = ledger.partial_pay(&bill.id, 40.0, None).unwrap();

        // Remainder inserts collide with their parent's id and fail
        ledger.store().on_apply(|writes| {
            writes
                .into_iter()
                .map(|w| match w {
                    StoreWrite::CreateTransaction(mut t) => {
                        if let Some(parent) = t.parent_transaction_id.clone() {
                            t.id = parent;
                        }
                        StoreWrite::CreateTransaction(t)
                    }
                    other => other,
                })
                .collect()
        });

        assert!(matches!(
            ledger.partial_pay(&bill.id, 70.0, None),
            Err(Error::InvalidState(_))
        ));
        let remainder = ledger.store().get_transaction(&first.remainder.id).unwrap().unwrap();
        assert_eq!(remainder.projected_amount, 60.0);
        let stored = ledger.store().get_transaction(&bill.id).unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Partial);
        assert_eq!(stored.actual_amount, Some(40.0));
        assert_eq!(ledger.profile("u1").unwrap().current_balance, 960.0);
        assert!(ledger.reconcile("u1").unwrap().in_sync);
    }

    #[test]
    fn test_full_installment_plan_does_not_block_completion() {
        let ledger = ledger();
        let mut plan = rule("bnpl");
        plan.installment_config = Some(InstallmentConfig {
            total_installments: 2,
            installments_paid: 2,
        });
        ledger.store().put_expense_rule(&plan).unwrap();

        let tx = ledger
            .create_transaction(
                NewTransaction::new("u1", "Extra", TransactionType::Expense, 25.0, d(2024, 3, 1))
                    .with_source(SourceType::ExpenseRule, "bnpl"),
            )
            .unwrap();
        let outcome = ledger.complete(&tx.id, 25.0, None, None).unwrap();
        assert_eq!(outcome.new_balance, 975.0);
        let rule = ledger.store().get_expense_rule("bnpl").unwrap().unwrap();
        assert_eq!(rule.installment_config.unwrap().installments_paid, 2);
    }
}
