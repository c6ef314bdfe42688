//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Runway - See how far your money goes
#[derive(Parser)]
#[command(name = "runway")]
#[command(about = "Personal finance projection and balance forecasting", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "runway.db", global = true)]
    pub db: PathBuf,

    /// User whose ledger to work with
    #[arg(long, default_value = "default", global = true)]
    pub user: String,

    /// Engine config file (defaults to the platform data dir, then built-in values)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and create the user's profile
    Init {
        /// Starting balance
        #[arg(short, long, default_value = "0")]
        balance: f64,
    },

    /// Show the profile, or change its starting balance
    Profile {
        /// New starting balance
        #[arg(long)]
        set_initial: Option<f64>,
    },

    /// Schedule a transaction
    Add {
        /// Transaction name
        name: String,

        /// Projected amount (positive)
        amount: f64,

        /// Type: income, expense, bill, loan
        #[arg(short = 't', long = "type", default_value = "expense")]
        tx_type: String,

        /// Scheduled date (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Category
        #[arg(short, long)]
        category: Option<String>,

        /// Initial status: projected or pending
        #[arg(long, default_value = "projected")]
        status: String,

        /// Expense rule this transaction belongs to
        #[arg(long)]
        rule: Option<String>,
    },

    /// List transactions
    List {
        /// Only these statuses (comma-separated)
        #[arg(short, long)]
        status: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Newest first
        #[arg(long)]
        desc: bool,

        /// Maximum rows
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Mark a transaction paid or received in full
    Complete {
        /// Transaction ID
        id: String,

        /// Actual amount (defaults to the projected amount)
        #[arg(short, long)]
        amount: Option<f64>,

        /// Date it happened (YYYY-MM-DD, defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Mark a transaction as not happening
    Skip {
        /// Transaction ID
        id: String,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Pay part of a transaction and schedule the rest
    Partial {
        /// Transaction ID
        id: String,

        /// Amount paid now
        amount: f64,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Compare the cached balance with the ledger
    Reconcile {
        /// Rewrite the cached balance when it drifted
        #[arg(long)]
        fix: bool,
    },

    /// Manage income sources
    Income {
        #[command(subcommand)]
        action: Option<IncomeAction>,
    },

    /// Manage expense rules
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Day-by-day balance timeline
    Balances {
        /// Start date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD, defaults to 30 days out)
        #[arg(long)]
        to: Option<String>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Can the balance cover upcoming bills?
    Coverage {
        /// Days to look ahead (defaults to config)
        #[arg(short, long, value_parser = clap::value_parser!(i64).range(1..=36_500))]
        days: Option<i64>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Days until the money runs out
    Runway {
        /// Days to look ahead (defaults to config)
        #[arg(short, long, value_parser = clap::value_parser!(i64).range(1..=36_500))]
        days: Option<i64>,
    },

    /// First day expenses push the balance negative
    Crunch {
        /// Days to look ahead (defaults to config)
        #[arg(short, long, value_parser = clap::value_parser!(i64).range(1..=36_500))]
        days: Option<i64>,
    },

    /// Composite financial health score
    Health {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Projected vs actual amounts of realized transactions
    Variance {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Totals per category
    Categories {
        /// income or expenses
        #[arg(short, long, default_value = "expenses")]
        kind: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Projected and actual totals for one month
    Monthly {
        /// Year (defaults to the current year)
        #[arg(short, long)]
        year: Option<i32>,

        /// Month 1-12 (defaults to the current month)
        #[arg(short, long)]
        month: Option<u32>,
    },

    /// Loan amortization schedule
    Amortize {
        /// Loan principal
        principal: f64,

        /// Annual rate in percent (6 = 6%)
        rate: f64,

        /// Term in months
        #[arg(short, long)]
        term: Option<u32>,

        /// Fixed monthly payment (computed from the term when omitted)
        #[arg(short, long)]
        payment: Option<f64>,

        /// First payment date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        start: Option<String>,

        /// Output CSV
        #[arg(long)]
        csv: bool,
    },

    /// Credit card payoff analysis
    Payoff {
        /// Read the card from this expense rule
        #[arg(long)]
        rule: Option<String>,

        /// Card balance
        #[arg(long)]
        balance: Option<f64>,

        /// APR in percent
        #[arg(long, default_value = "0")]
        apr: f64,

        /// Credit limit (for utilization)
        #[arg(long, default_value = "0")]
        limit: f64,

        /// Minimum payment percent of balance
        #[arg(long, default_value = "1")]
        min_percent: f64,

        /// Minimum payment floor
        #[arg(long, default_value = "25")]
        min_floor: f64,

        /// percent-only or percent-plus-interest
        #[arg(long, default_value = "percent-only")]
        method: String,

        /// Pay this fixed amount instead of the minimum
        #[arg(long)]
        fixed: Option<f64>,

        /// Show the month-by-month minimum-payment projection
        #[arg(long)]
        projection: bool,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Text summary of balance, cash flow, bills, runway and health
    Summary {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a balance timeline or transactions
    Export {
        /// What to export: balances, transactions
        #[arg(short, long, default_value = "balances")]
        what: String,

        /// Format: csv, json
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum IncomeAction {
    /// Add an income source
    Add {
        /// Source name
        name: String,

        /// Amount per occurrence
        amount: f64,

        /// daily, weekly, bi-weekly, semi-monthly, monthly, quarterly, yearly, one-time
        #[arg(short, long, default_value = "monthly")]
        frequency: String,
    },
    /// List income sources
    List,
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// Add an expense rule
    Add {
        /// Rule name
        name: String,

        /// Amount per occurrence
        amount: f64,

        /// daily, weekly, bi-weekly, semi-monthly, monthly, quarterly, yearly, one-time
        #[arg(short, long, default_value = "monthly")]
        frequency: String,

        /// Category
        #[arg(short, long)]
        category: Option<String>,

        /// Loan principal (makes this a loan rule)
        #[arg(long)]
        loan_principal: Option<f64>,

        /// Loan annual rate in percent
        #[arg(long, default_value = "0")]
        loan_rate: f64,

        /// Loan term in months
        #[arg(long, default_value = "60")]
        loan_term: u32,

        /// Number of installments (makes this an installment plan)
        #[arg(long)]
        installments: Option<u32>,
    },
    /// List expense rules
    List,
    /// Delete a rule and its open transactions
    Delete {
        /// Rule ID
        id: String,
    },
}
