//! Persistence contract for the ledger
//!
//! The ledger only ever talks to a [`Store`]. Two implementations ship with the
//! crate: [`MemoryStore`] for tests and embedding, and
//! [`crate::db::Database`] for the on-disk SQLite document store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{
    ExpenseRule, IncomeSource, Transaction, TransactionStatus, TransactionType, UserProfile,
};

/// One write of an atomic [`Store::apply`] batch
#[derive(Debug, Clone)]
pub enum StoreWrite {
    CreateTransaction(Transaction),
    /// Fails the batch with `NotFound` when the id does not exist
    UpdateTransaction(Transaction),
    /// Fails the batch with `NotFound` when the id does not exist
    DeleteTransaction(String),
    PutExpenseRule(ExpenseRule),
}

/// Document store keyed by id with read-before-write existence checks
pub trait Store: Send + Sync {
    /// Apply every write in order, or none of them
    fn apply(&self, writes: &[StoreWrite]) -> Result<()>;

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>>;
    fn create_transaction(&self, tx: &Transaction) -> Result<()>;
    /// Fails with `NotFound` when the id does not exist
    fn update_transaction(&self, tx: &Transaction) -> Result<()>;
    /// Fails with `NotFound` when the id does not exist
    fn delete_transaction(&self, id: &str) -> Result<()>;
    fn query_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>>;

    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;
    fn put_profile(&self, profile: &UserProfile) -> Result<()>;

    fn get_expense_rule(&self, id: &str) -> Result<Option<ExpenseRule>>;
    fn put_expense_rule(&self, rule: &ExpenseRule) -> Result<()>;
    fn delete_expense_rule(&self, id: &str) -> Result<()>;
    fn list_expense_rules(&self, user_id: &str) -> Result<Vec<ExpenseRule>>;

    fn put_income_source(&self, source: &IncomeSource) -> Result<()>;
    fn list_income_sources(&self, user_id: &str) -> Result<Vec<IncomeSource>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Filter over transactions, ordered by scheduled date
///
/// Empty `statuses`/`types` mean "any". The date range is inclusive and
/// applies to the scheduled date.
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub user_id: Option<String>,
    pub statuses: Vec<TransactionStatus>,
    pub types: Vec<TransactionType>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub source_id: Option<String>,
    pub parent_id: Option<String>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl TransactionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: &str) -> Self {
        Self::new().user(user_id)
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn statuses(mut self, statuses: &[TransactionStatus]) -> Self {
        self.statuses.extend_from_slice(statuses);
        self
    }

    pub fn tx_type(mut self, tx_type: TransactionType) -> Self {
        self.types.push(tx_type);
        self
    }

    pub fn date_range(mut self, range: Option<(NaiveDate, NaiveDate)>) -> Self {
        self.date_range = range;
        self
    }

    pub fn source_id(mut self, source_id: &str) -> Self {
        self.source_id = Some(source_id.to_string());
        self
    }

    /// Remainders spawned by a partial payment of `parent_id`
    pub fn parent_id(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Whether a transaction passes every filter
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(ref user_id) = self.user_id {
            if &tx.user_id != user_id {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&tx.status) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&tx.tx_type) {
            return false;
        }
        if let Some((from, to)) = self.date_range {
            if tx.scheduled_date < from || tx.scheduled_date > to {
                return false;
            }
        }
        if let Some(ref source_id) = self.source_id {
            if tx.source_id.as_ref() != Some(source_id) {
                return false;
            }
        }
        if let Some(ref parent_id) = self.parent_id {
            if tx.parent_transaction_id.as_ref() != Some(parent_id) {
                return false;
            }
        }
        true
    }

    /// Sort and truncate an unordered match set the way the SQL store does
    pub fn finish(&self, mut txs: Vec<Transaction>) -> Vec<Transaction> {
        txs.sort_by(|a, b| {
            (a.scheduled_date, a.created_at, &a.id).cmp(&(b.scheduled_date, b.created_at, &b.id))
        });
        if self.order == SortOrder::Descending {
            txs.reverse();
        }
        if let Some(limit) = self.limit {
            txs.truncate(limit);
        }
        txs
    }
}

/// In-process store backed by mutex-guarded maps
#[derive(Default)]
pub struct MemoryStore {
    transactions: Mutex<HashMap<String, Transaction>>,
    profiles: Mutex<HashMap<String, UserProfile>>,
    expense_rules: Mutex<HashMap<String, ExpenseRule>>,
    income_sources: Mutex<HashMap<String, IncomeSource>>,
}

/// Lock a map, recovering the data if a writer panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Memory store mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_write(
    txs: &mut HashMap<String, Transaction>,
    rules: &mut HashMap<String, ExpenseRule>,
    write: &StoreWrite,
) -> Result<()> {
    match write {
        StoreWrite::CreateTransaction(tx) => {
            if txs.contains_key(&tx.id) {
                return Err(Error::InvalidState(format!(
                    "Transaction {} already exists",
                    tx.id
                )));
            }
            txs.insert(tx.id.clone(), tx.clone());
        }
        StoreWrite::UpdateTransaction(tx) => match txs.get_mut(&tx.id) {
            Some(existing) => *existing = tx.clone(),
            None => return Err(Error::NotFound(format!("Transaction {}", tx.id))),
        },
        StoreWrite::DeleteTransaction(id) => {
            if txs.remove(id).is_none() {
                return Err(Error::NotFound(format!("Transaction {}", id)));
            }
        }
        StoreWrite::PutExpenseRule(rule) => {
            rules.insert(rule.id.clone(), rule.clone());
        }
    }
    Ok(())
}

impl Store for MemoryStore {
    fn apply(&self, writes: &[StoreWrite]) -> Result<()> {
        let mut txs = lock(&self.transactions);
        let mut rules = lock(&self.expense_rules);

        // Work on copies and swap them in only when every write succeeded
        let mut next_txs = txs.clone();
        let mut next_rules = rules.clone();
        for write in writes {
            apply_write(&mut next_txs, &mut next_rules, write)?;
        }
        *txs = next_txs;
        *rules = next_rules;
        Ok(())
    }

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        Ok(lock(&self.transactions).get(id).cloned())
    }

    fn create_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut txs = lock(&self.transactions);
        if txs.contains_key(&tx.id) {
            return Err(Error::InvalidState(format!(
                "Transaction {} already exists",
                tx.id
            )));
        }
        txs.insert(tx.id.clone(), tx.clone());
        Ok(())
    }

    fn update_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut txs = lock(&self.transactions);
        match txs.get_mut(&tx.id) {
            Some(existing) => {
                *existing = tx.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("Transaction {}", tx.id))),
        }
    }

    fn delete_transaction(&self, id: &str) -> Result<()> {
        lock(&self.transactions)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))
    }

    fn query_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
        let matched = lock(&self.transactions)
            .values()
            .filter(|tx| query.matches(tx))
            .cloned()
            .collect();
        Ok(query.finish(matched))
    }

    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(lock(&self.profiles).get(user_id).cloned())
    }

    fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        lock(&self.profiles).insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    fn get_expense_rule(&self, id: &str) -> Result<Option<ExpenseRule>> {
        Ok(lock(&self.expense_rules).get(id).cloned())
    }

    fn put_expense_rule(&self, rule: &ExpenseRule) -> Result<()> {
        lock(&self.expense_rules).insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    fn delete_expense_rule(&self, id: &str) -> Result<()> {
        lock(&self.expense_rules)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Expense rule {}", id)))
    }

    fn list_expense_rules(&self, user_id: &str) -> Result<Vec<ExpenseRule>> {
        let mut rules: Vec<_> = lock(&self.expense_rules)
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rules)
    }

    fn put_income_source(&self, source: &IncomeSource) -> Result<()> {
        lock(&self.income_sources).insert(source.id.clone(), source.clone());
        Ok(())
    }

    fn list_income_sources(&self, user_id: &str) -> Result<Vec<IncomeSource>> {
        let mut sources: Vec<_> = lock(&self.income_sources)
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTransaction;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn tx(user: &str, name: &str, day: u32) -> Transaction {
        NewTransaction::new(user, name, TransactionType::Bill, 50.0, d(day)).into_transaction()
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let t = tx("u1", "Rent", 1);
        assert!(store.update_transaction(&t).unwrap_err().is_not_found());
        assert!(store.delete_transaction(&t.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_filters_and_orders() {
        let store = MemoryStore::new();
        let late = tx("u1", "Late", 20);
        let early = tx("u1", "Early", 2);
        let mut done = tx("u1", "Done", 10);
        done.status = TransactionStatus::Completed;
        let other = tx("u2", "Other", 5);
        for t in [&late, &early, &done, &other] {
            store.create_transaction(t).unwrap();
        }

        let all = store
            .query_transactions(&TransactionQuery::for_user("u1"))
            .unwrap();
        let names: Vec<_> = all.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Early", "Done", "Late"]);

        let open = store
            .query_transactions(
                &TransactionQuery::for_user("u1")
                    .statuses(&[TransactionStatus::Projected, TransactionStatus::Pending])
                    .order(SortOrder::Descending),
            )
            .unwrap();
        let names: Vec<_> = open.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Late", "Early"]);

        let window = store
            .query_transactions(
                &TransactionQuery::for_user("u1").date_range(Some((d(5), d(15)))),
            )
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].name, "Done");
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let store = MemoryStore::new();
        let rent = tx("u1", "Rent", 1);
        store.create_transaction(&rent).unwrap();

        let mut paid = rent.clone();
        paid.status = TransactionStatus::Completed;
        let fresh = tx("u1", "Fresh", 3);
        let err = store
            .apply(&[
                StoreWrite::UpdateTransaction(paid.clone()),
                StoreWrite::CreateTransaction(fresh.clone()),
                StoreWrite::DeleteTransaction("missing".into()),
            ])
            .unwrap_err();
        assert!(err.is_not_found());
        let stored = store.get_transaction(&rent.id).unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Projected);
        assert!(store.get_transaction(&fresh.id).unwrap().is_none());

        store
            .apply(&[
                StoreWrite::UpdateTransaction(paid),
                StoreWrite::CreateTransaction(fresh.clone()),
            ])
            .unwrap();
        let stored = store.get_transaction(&rent.id).unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert!(store.get_transaction(&fresh.id).unwrap().is_some());
    }

    #[test]
    fn test_parent_query() {
        let store = MemoryStore::new();
        let parent = tx("u1", "Parent", 1);
        let mut child = tx("u1", "Child", 8);
        child.parent_transaction_id = Some(parent.id.clone());
        store.create_transaction(&parent).unwrap();
        store.create_transaction(&child).unwrap();

        let found = store
            .query_transactions(&TransactionQuery::new().parent_id(&parent.id))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, child.id);
    }
}
