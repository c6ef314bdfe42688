//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` / `load_config` / `open_ledger` - Shared setup used by every command
//! - `parse_day` / `resolve_range` - Date argument handling
//! - `cmd_init` - Initialize the database and profile
//! - `cmd_profile` - Show or change the profile

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use runway_core::dates::{add_days, parse_date, today};
use runway_core::{Database, EngineConfig, TransactionLedger, TransactionQuery};

pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    Database::new(path_str).context("Failed to open database")
}

/// Explicit config file, else the data-dir override, else built-in values
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_path(path).context("Failed to load config"),
        None => EngineConfig::load().context("Failed to load config"),
    }
}

pub fn open_ledger(db: &Database, config: &EngineConfig) -> TransactionLedger<Database> {
    TransactionLedger::new(db.clone()).with_remainder_offset(config.remainder_offset_days)
}

/// Parse an optional `YYYY-MM-DD` argument
pub fn parse_day(value: Option<&str>, flag: &str) -> Result<Option<NaiveDate>> {
    value
        .map(|s| parse_date(s).with_context(|| format!("Invalid --{} date", flag)))
        .transpose()
}

/// Optional --from/--to pair; a missing side defaults relative to the other
pub fn resolve_range(
    from: Option<&str>,
    to: Option<&str>,
    default_days: i64,
) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let from = parse_day(from, "from")?;
    let to = parse_day(to, "to")?;
    let range = match (from, to) {
        (None, None) => None,
        (Some(from), None) => Some((from, add_days(from, default_days))),
        (None, Some(to)) => Some((add_days(to, -default_days), to)),
        (Some(from), Some(to)) => Some((from, to)),
    };
    if let Some((from, to)) = range {
        if from > to {
            anyhow::bail!("--from {} is after --to {}", from, to);
        }
    }
    Ok(range)
}

/// All of a user's transactions, oldest first
pub fn load_transactions(
    db: &Database,
    user: &str,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<runway_core::Transaction>> {
    let query = TransactionQuery::for_user(user).date_range(range);
    db.query_transactions(&query)
        .context("Failed to load transactions")
}

pub fn cmd_init(db: &Database, user: &str, balance: f64) -> Result<()> {
    println!("🔧 Initializing database at {}...", db.path());

    let ledger = TransactionLedger::new(db.clone());
    if db.get_profile(user)?.is_some() {
        println!("   Profile '{}' already exists (use 'runway profile --set-initial')", user);
    } else {
        ledger
            .create_profile(user, balance)
            .context("Failed to create profile")?;
        println!("   Created profile '{}' with balance ${:.2}", user, balance);
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Schedule a bill: runway add Rent 1200 --type bill --date 2024-07-01");
    println!("  2. See how far it goes: runway runway");

    Ok(())
}

pub fn cmd_profile(db: &Database, user: &str, set_initial: Option<f64>) -> Result<()> {
    let ledger = TransactionLedger::new(db.clone());
    let profile = match set_initial {
        Some(balance) => ledger
            .set_initial_balance(user, balance)
            .context("Failed to update starting balance")?,
        None => ledger.profile(user).context("No profile found (run 'runway init')")?,
    };

    println!();
    println!("👤 Profile: {}", profile.user_id);
    println!("   ─────────────────────────────");
    println!("   Starting balance: ${:.2}", profile.initial_balance);
    println!("   Current balance:  ${:.2}", profile.current_balance);
    println!("   Updated:          {}", profile.updated_at.format("%Y-%m-%d %H:%M"));

    Ok(())
}

/// Today unless a date was given
pub fn day_or_today(value: Option<&str>, flag: &str) -> Result<NaiveDate> {
    Ok(parse_day(value, flag)?.unwrap_or_else(today))
}
