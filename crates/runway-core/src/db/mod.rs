//! SQLite document store with connection pooling and migrations
//!
//! Records are stored as JSON documents next to the columns the ledger filters
//! on, so queries stay indexed while the document keeps the full model.
//!
//! - `transactions` - Transaction CRUD and filtered queries
//! - `profiles` - User profiles, expense rules and income sources

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::TransactionBehavior;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{ExpenseRule, IncomeSource, Transaction, UserProfile};
use crate::store::{Store, StoreWrite, TransactionQuery};

mod profiles;
mod transaction_filter;
mod transactions;

pub use transaction_filter::FilterResult;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Deserialize a stored JSON document
pub(crate) fn from_document<T: DeserializeOwned>(document: &str) -> Result<T> {
    Ok(serde_json::from_str(document)?)
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open (or create) a database file and bring its schema up to date
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` so every pooled
    /// connection sees the same data.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "runway_test_{}_{}.db",
            std::process::id(),
            id
        ));

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path.to_string_lossy())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Apply a batch of writes inside one SQLite transaction
    ///
    /// The write lock is taken up front so another process cannot interleave
    /// its own writes between ours.
    pub fn apply_writes(&self, writes: &[StoreWrite]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for write in writes {
            match write {
                StoreWrite::CreateTransaction(t) => transactions::insert_transaction(&tx, t)?,
                StoreWrite::UpdateTransaction(t) => transactions::update_transaction(&tx, t)?,
                StoreWrite::DeleteTransaction(id) => transactions::delete_transaction(&tx, id)?,
                StoreWrite::PutExpenseRule(rule) => profiles::upsert_expense_rule(&tx, rule)?,
            }
        }

        tx.commit()?;
        debug!(writes = writes.len(), "Write batch committed");
        Ok(())
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the ledger's writes
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- User profiles (initial balance + cached current balance)
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                document TEXT NOT NULL,                  -- JSON UserProfile
                updated_at TEXT NOT NULL
            );

            -- Transactions
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,                     -- UUID v4
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,                    -- projected, pending, completed, partial, skipped
                tx_type TEXT NOT NULL,                   -- income, expense, bill, loan
                scheduled_date TEXT NOT NULL,            -- YYYY-MM-DD
                source_id TEXT,                          -- income source or expense rule id
                parent_transaction_id TEXT,              -- set on partial-payment remainders
                created_at TEXT NOT NULL,
                document TEXT NOT NULL                   -- JSON Transaction
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, scheduled_date);
            CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);
            CREATE INDEX IF NOT EXISTS idx_transactions_source ON transactions(source_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_parent ON transactions(parent_transaction_id);

            -- Recurring expense rules (loan / credit / installment configs live in the document)
            CREATE TABLE IF NOT EXISTS expense_rules (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                document TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_expense_rules_user ON expense_rules(user_id);

            -- Recurring income sources
            CREATE TABLE IF NOT EXISTS income_sources (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                document TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_income_sources_user ON income_sources(user_id);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

impl Store for Database {
    fn apply(&self, writes: &[StoreWrite]) -> Result<()> {
        self.apply_writes(writes)
    }

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        Database::get_transaction(self, id)
    }

    fn create_transaction(&self, tx: &Transaction) -> Result<()> {
        self.insert_transaction(tx)
    }

    fn update_transaction(&self, tx: &Transaction) -> Result<()> {
        Database::update_transaction(self, tx)
    }

    fn delete_transaction(&self, id: &str) -> Result<()> {
        Database::delete_transaction(self, id)
    }

    fn query_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
        Database::query_transactions(self, query)
    }

    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Database::get_profile(self, user_id)
    }

    fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        self.upsert_profile(profile)
    }

    fn get_expense_rule(&self, id: &str) -> Result<Option<ExpenseRule>> {
        Database::get_expense_rule(self, id)
    }

    fn put_expense_rule(&self, rule: &ExpenseRule) -> Result<()> {
        self.upsert_expense_rule(rule)
    }

    fn delete_expense_rule(&self, id: &str) -> Result<()> {
        Database::delete_expense_rule(self, id)
    }

    fn list_expense_rules(&self, user_id: &str) -> Result<Vec<ExpenseRule>> {
        Database::list_expense_rules(self, user_id)
    }

    fn put_income_source(&self, source: &IncomeSource) -> Result<()> {
        self.upsert_income_source(source)
    }

    fn list_income_sources(&self, user_id: &str) -> Result<Vec<IncomeSource>> {
        Database::list_income_sources(self, user_id)
    }
}

#[cfg(test)]
mod tests;
