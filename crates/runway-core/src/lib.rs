//! Runway Core Library
//!
//! Projection and balance-analysis engine for the Runway personal finance tool:
//! - Calendar-date helpers (strict `YYYY-MM-DD` at the boundary)
//! - Loan amortization and credit card payoff analysis
//! - Transaction ledger state machine with balance reconciliation
//! - Daily balances, bill coverage, runway and crunch forecasts
//! - Composite financial health score with insights
//! - Store contract with in-memory and SQLite implementations
//! - Text summaries and CSV/JSON export

pub mod amortization;
pub mod balance;
pub mod config;
pub mod credit;
pub mod dates;
pub mod db;
pub mod error;
pub mod export;
pub mod health;
pub mod ledger;
pub mod models;
pub mod store;
pub mod summary;

pub use amortization::{AmortizationStep, CreditCardProjectionConfig, ScheduleSummary};
pub use balance::{
    BalanceStatus, BillCoverageReport, CategoryKind, CategoryTotal, Crunch, DayBalance,
    MonthlyCashFlow, MonthlyTotals, Runway, VarianceReport,
};
pub use config::EngineConfig;
pub use credit::{MonthlyBreakdown, PayoffScenario, PayoffSummary};
pub use db::Database;
pub use error::{Error, Result};
pub use export::ExportFormat;
pub use health::{HealthPeriod, HealthScore, HealthWeights, TrendDirection};
pub use ledger::{LedgerOutcome, PartialPayment, ReconciliationReport, TransactionLedger};
pub use models::{
    CreditConfig, ExpenseRule, Frequency, IncomeSource, InstallmentConfig, LoanConfig,
    MinimumPaymentMethod, NewTransaction, PaymentBreakdown, PaymentStrategy, SourceType,
    Transaction, TransactionStatus, TransactionType, UserProfile,
};
pub use store::{MemoryStore, SortOrder, Store, StoreWrite, TransactionQuery};
pub use summary::FinancialSummary;
