//! Export of timelines, schedules and transactions
//!
//! Supports:
//! - CSV via the `csv` writer (quoting handled there)
//! - Pretty JSON of any serializable report

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::amortization::AmortizationStep;
use crate::balance::DayBalance;
use crate::credit::MonthlyBreakdown;
use crate::error::{Error, Result};
use crate::models::Transaction;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown export format: {} (use csv or json)", s)),
        }
    }
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = wtr.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

fn money(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// One row per day of a balance timeline
pub fn export_daily_balances_csv(days: &BTreeMap<NaiveDate, DayBalance>) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "date",
        "opening_balance",
        "income",
        "expenses",
        "closing_balance",
        "status",
        "transactions",
    ])?;

    for day in days.values() {
        let names = day
            .transactions
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        wtr.write_record([
            day.date.to_string(),
            money(day.opening_balance),
            money(day.total_income),
            money(day.total_expenses),
            money(day.closing_balance),
            day.status.to_string(),
            names,
        ])?;
    }

    finish(wtr)
}

/// Amortization steps, one row per payment
pub fn export_amortization_csv(steps: &[AmortizationStep]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for step in steps {
        wtr.serialize(step)?;
    }
    if steps.is_empty() {
        wtr.write_record([
            "payment_number",
            "date",
            "payment",
            "principal",
            "interest",
            "remaining_balance",
        ])?;
    }
    finish(wtr)
}

/// Card payoff months, one row per month
pub fn export_payoff_csv(months: &[MonthlyBreakdown]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for month in months {
        wtr.serialize(month)?;
    }
    if months.is_empty() {
        wtr.write_record([
            "month",
            "date",
            "payment",
            "principal",
            "interest",
            "remaining_balance",
            "cumulative_interest",
            "cumulative_principal",
        ])?;
    }
    finish(wtr)
}

/// Transactions with both projected and actual amounts
pub fn export_transactions_csv(transactions: &[Transaction]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "id",
        "scheduled_date",
        "name",
        "type",
        "category",
        "status",
        "projected_amount",
        "actual_amount",
        "variance",
        "actual_date",
    ])?;

    for tx in transactions {
        wtr.write_record([
            tx.id.clone(),
            tx.scheduled_date.to_string(),
            tx.name.clone(),
            tx.tx_type.to_string(),
            tx.category.clone(),
            tx.status.to_string(),
            money(tx.projected_amount),
            tx.actual_amount.map(money).unwrap_or_default(),
            tx.variance.map(money).unwrap_or_default(),
            tx.actual_date.map(|d| d.to_string()).unwrap_or_default(),
        ])?;
    }

    finish(wtr)
}

/// Pretty JSON of any report
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
