//! Export command implementation

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use runway_core::balance::calculate_daily_balances;
use runway_core::dates::{add_days, today};
use runway_core::export::{export_daily_balances_csv, export_transactions_csv, to_json};
use runway_core::{Database, EngineConfig, ExportFormat};

use super::{load_profile, load_transactions, parse_day, resolve_range};

/// Render the requested export as a string
pub fn render_export(
    db: &Database,
    config: &EngineConfig,
    user: &str,
    what: &str,
    format: ExportFormat,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<String> {
    match what.to_lowercase().as_str() {
        "balances" => {
            let profile = load_profile(db, user)?;
            let start = parse_day(from, "from")?.unwrap_or_else(today);
            let end = parse_day(to, "to")?.unwrap_or_else(|| add_days(start, 30));
            if start > end {
                anyhow::bail!("--from {} is after --to {}", start, end);
            }
            let transactions = load_transactions(db, user, None)?;
            let days = calculate_daily_balances(
                profile.current_balance,
                &transactions,
                start,
                end,
                config.warning_threshold,
            );
            Ok(match format {
                ExportFormat::Csv => export_daily_balances_csv(&days)?,
                ExportFormat::Json => to_json(&days.values().collect::<Vec<_>>())?,
            })
        }
        "transactions" => {
            let transactions = load_transactions(db, user, resolve_range(from, to, 30)?)?;
            Ok(match format {
                ExportFormat::Csv => export_transactions_csv(&transactions)?,
                ExportFormat::Json => to_json(&transactions)?,
            })
        }
        other => anyhow::bail!("Unknown export: {}. Available: balances, transactions", other),
    }
}

pub fn cmd_export(
    db: &Database,
    config: &EngineConfig,
    user: &str,
    what: &str,
    format: &str,
    from: Option<&str>,
    to: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let format: ExportFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let content = render_export(db, config, user, what, format, from, to)?;

    match output {
        Some(path) => {
            fs::write(path, &content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("✅ Exported {} to {}", what, path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}
