//! Balance timelines and forward-looking cash analysis
//!
//! Everything here is a pure function over a caller-supplied slice of
//! transactions. The current balance already contains every completed and
//! partial transaction, so historical views first undo those effects and then
//! replay them on their effective dates.
//!
//! Forward walks (coverage, runway, crunch) only look at open transactions.
//! An overdue open transaction is treated as due today, and on a shared day
//! income lands before outflows.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::dates::{add_days, clamp_window, date_range, month_bounds};
use crate::error::{Error, Result};
use crate::models::{ExpenseRule, Frequency, IncomeSource, Transaction, TransactionStatus, TransactionType};

pub const DEFAULT_WARNING_THRESHOLD: f64 = 500.0;
pub const DEFAULT_COVERAGE_DAYS: i64 = 14;
pub const DEFAULT_RUNWAY_DAYS: i64 = 365;
pub const DEFAULT_CRUNCH_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceStatus {
    Safe,
    Warning,
    Danger,
}

impl BalanceStatus {
    pub fn classify(balance: f64, warning_threshold: f64) -> Self {
        if balance < 0.0 {
            Self::Danger
        } else if balance < warning_threshold {
            Self::Warning
        } else {
            Self::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

impl std::fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One day of the balance timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBalance {
    pub date: NaiveDate,
    pub opening_balance: f64,
    pub closing_balance: f64,
    pub total_income: f64,
    pub total_expenses: f64,
    pub transactions: Vec<Transaction>,
    pub status: BalanceStatus,
}

/// Initial balance plus the signed effect of every completed or partial transaction
pub fn compute_balance_from_transactions(initial_balance: f64, transactions: &[Transaction]) -> f64 {
    initial_balance + transactions.iter().map(|t| t.balance_effect()).sum::<f64>()
}

/// Day-by-day balances for `start..=end`
pub fn calculate_daily_balances(
    current_balance: f64,
    transactions: &[Transaction],
    start: NaiveDate,
    end: NaiveDate,
    warning_threshold: f64,
) -> BTreeMap<NaiveDate, DayBalance> {
    let mut days = BTreeMap::new();
    if start > end {
        return days;
    }

    // Balance before any realized transaction happened
    let baseline: f64 = current_balance - transactions.iter().map(|t| t.balance_effect()).sum::<f64>();

    let mut by_day: BTreeMap<NaiveDate, Vec<&Transaction>> = BTreeMap::new();
    let mut opening = baseline;
    for tx in transactions {
        if tx.status == TransactionStatus::Skipped {
            continue;
        }
        let date = tx.effective_date();
        if date < start {
            // Open transactions before the window never happened
            if tx.is_realized() {
                opening += tx.balance_effect();
            }
        } else if date <= end {
            by_day.entry(date).or_default().push(tx);
        }
    }

    for date in date_range(start, end) {
        let day_txs = by_day.remove(&date).unwrap_or_default();
        let total_income: f64 = day_txs
            .iter()
            .filter(|t| !t.is_outflow())
            .map(|t| t.effective_amount())
            .sum();
        let total_expenses: f64 = day_txs
            .iter()
            .filter(|t| t.is_outflow())
            .map(|t| t.effective_amount())
            .sum();
        let closing = opening + total_income - total_expenses;

        days.insert(
            date,
            DayBalance {
                date,
                opening_balance: opening,
                closing_balance: closing,
                total_income,
                total_expenses,
                transactions: day_txs.into_iter().cloned().collect(),
                status: BalanceStatus::classify(closing, warning_threshold),
            },
        );
        opening = closing;
    }

    days
}

/// Open transactions due by `horizon`, in walk order
///
/// Overdue ones are due `today`; income sorts first within a day.
fn upcoming(transactions: &[Transaction], today: NaiveDate, horizon: NaiveDate) -> Vec<(NaiveDate, &Transaction)> {
    let mut due: Vec<_> = transactions
        .iter()
        .filter(|t| t.status.is_open() && t.scheduled_date <= horizon)
        .map(|t| (t.scheduled_date.max(today), t))
        .collect();
    due.sort_by(|(a_date, a), (b_date, b)| {
        (a_date, a.is_outflow(), a.scheduled_date, a.created_at)
            .cmp(&(b_date, b.is_outflow(), b.scheduled_date, b.created_at))
    });
    due
}

/// An upcoming transaction and whether the running balance covers it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoveredBill {
    pub transaction_id: String,
    pub name: String,
    pub tx_type: TransactionType,
    pub date: NaiveDate,
    pub amount: f64,
    pub balance_after: f64,
    pub can_cover: bool,
    /// Absolute deficit after paying this bill (0 when covered)
    pub shortfall: f64,
}

/// First bill the balance cannot cover
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shortfall {
    pub date: NaiveDate,
    pub amount: f64,
    pub shortfall: f64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillCoverageReport {
    pub starting_balance: f64,
    pub bills: Vec<CoveredBill>,
    pub bills_at_risk: Vec<CoveredBill>,
    pub total_upcoming: f64,
    pub total_income: f64,
    pub projected_balance: f64,
    pub can_cover_all: bool,
    pub first_shortfall: Option<Shortfall>,
}

/// Whether upcoming bills in the next `days_ahead` days can be paid
pub fn get_bill_coverage_report(
    current_balance: f64,
    transactions: &[Transaction],
    days_ahead: i64,
    today: NaiveDate,
) -> BillCoverageReport {
    let horizon = add_days(today, clamp_window(days_ahead));
    let mut running = current_balance;
    let mut bills = Vec::new();
    let mut total_upcoming = 0.0;
    let mut total_income = 0.0;

    for (date, tx) in upcoming(transactions, today, horizon) {
        let amount = tx.effective_amount();
        if !tx.is_outflow() {
            running += amount;
            total_income += amount;
            continue;
        }

        running -= amount;
        total_upcoming += amount;
        let can_cover = running >= 0.0;
        bills.push(CoveredBill {
            transaction_id: tx.id.clone(),
            name: tx.name.clone(),
            tx_type: tx.tx_type,
            date,
            amount,
            balance_after: running,
            can_cover,
            shortfall: if can_cover { 0.0 } else { -running },
        });
    }

    let bills_at_risk: Vec<CoveredBill> = bills.iter().filter(|b| !b.can_cover).cloned().collect();
    let first_shortfall = bills_at_risk.first().map(|b| Shortfall {
        date: b.date,
        amount: b.amount,
        shortfall: b.shortfall,
        name: b.name.clone(),
    });

    debug!(
        bills = bills.len(),
        at_risk = bills_at_risk.len(),
        projected_balance = running,
        "Bill coverage computed"
    );

    BillCoverageReport {
        starting_balance: current_balance,
        can_cover_all: bills_at_risk.is_empty(),
        bills,
        bills_at_risk,
        total_upcoming,
        total_income,
        projected_balance: running,
        first_shortfall,
    }
}

/// Days until the balance runs out
///
/// Runs out means zero or below, so a balance of exactly 0.00 ends the runway.
/// The health score's runway component counts to the first negative day
/// instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Runway {
    pub days: i64,
    /// `None` when the balance stays positive for the whole window
    pub run_out_date: Option<NaiveDate>,
}

/// Walk open transactions forward; the balance runs out once it is zero or below
///
/// The window is clamped to `0..=MAX_WINDOW_DAYS`.
pub fn get_runway(
    current_balance: f64,
    transactions: &[Transaction],
    max_days: i64,
    today: NaiveDate,
) -> Runway {
    let max_days = clamp_window(max_days);
    let horizon = add_days(today, max_days);
    let due = upcoming(transactions, today, horizon);
    let mut due = due.into_iter().peekable();
    let mut balance = current_balance;

    for offset in 0..=max_days {
        let date = add_days(today, offset);
        while let Some((_, tx)) = due.next_if(|(d, _)| *d == date) {
            balance += tx.signed_amount();
        }
        if balance <= 0.0 {
            return Runway {
                days: offset,
                run_out_date: Some(date),
            };
        }
    }

    Runway {
        days: max_days,
        run_out_date: None,
    }
}

/// First expense-driven negative balance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Crunch {
    pub date: NaiveDate,
    pub balance: f64,
    pub shortfall: f64,
    pub expenses: f64,
}

/// First day with outflows on which the balance ends negative
pub fn get_next_crunch(
    current_balance: f64,
    transactions: &[Transaction],
    max_days: i64,
    today: NaiveDate,
) -> Option<Crunch> {
    let max_days = clamp_window(max_days);
    let horizon = add_days(today, max_days);
    let mut due = upcoming(transactions, today, horizon).into_iter().peekable();
    let mut balance = current_balance;

    for offset in 0..=max_days {
        let date = add_days(today, offset);
        let mut expenses = 0.0;
        while let Some((_, tx)) = due.next_if(|(d, _)| *d == date) {
            balance += tx.signed_amount();
            if tx.is_outflow() {
                expenses += tx.effective_amount();
            }
        }
        if expenses > 0.0 && balance < 0.0 {
            return Some(Crunch {
                date,
                balance,
                shortfall: -balance,
                expenses,
            });
        }
    }
    None
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole.abs() < f64::EPSILON {
        0.0
    } else {
        part / whole * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceItem {
    pub transaction_id: String,
    pub name: String,
    pub category: String,
    pub tx_type: TransactionType,
    pub projected_amount: f64,
    pub actual_amount: f64,
    pub variance: f64,
    /// `None` when nothing was projected
    pub variance_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceReport {
    pub items: Vec<VarianceItem>,
    pub total_projected: f64,
    pub total_actual: f64,
    pub total_variance: f64,
    pub variance_percent: f64,
    /// Outflows that cost more than projected
    pub over_budget_count: usize,
    /// Outflows that cost less than projected
    pub under_budget_count: usize,
}

/// Projected vs actual for every realized transaction
pub fn calculate_variance_report(transactions: &[Transaction]) -> VarianceReport {
    let items: Vec<VarianceItem> = transactions
        .iter()
        .filter(|t| t.is_realized())
        .map(|t| {
            let actual = t.actual_amount.unwrap_or(0.0);
            let variance = t.variance.unwrap_or(actual - t.projected_amount);
            VarianceItem {
                transaction_id: t.id.clone(),
                name: t.name.clone(),
                category: t.category.clone(),
                tx_type: t.tx_type,
                projected_amount: t.projected_amount,
                actual_amount: actual,
                variance,
                variance_percent: (t.projected_amount > 0.0)
                    .then(|| variance / t.projected_amount * 100.0),
            }
        })
        .collect();

    let total_projected: f64 = items.iter().map(|i| i.projected_amount).sum();
    let total_actual: f64 = items.iter().map(|i| i.actual_amount).sum();
    let total_variance = total_actual - total_projected;
    let outflows = || items.iter().filter(|i| i.tx_type.is_outflow());

    VarianceReport {
        over_budget_count: outflows().filter(|i| i.variance > 0.0).count(),
        under_budget_count: outflows().filter(|i| i.variance < 0.0).count(),
        variance_percent: percent_of(total_variance, total_projected),
        total_projected,
        total_actual,
        total_variance,
        items,
    }
}

/// Which side of the ledger a category breakdown covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Income,
    Expenses,
}

impl std::str::FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" | "expenses" => Ok(Self::Expenses),
            _ => Err(format!("Unknown category kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub count: usize,
    pub percent: f64,
}

/// Totals per category, largest first
pub fn get_category_breakdown(transactions: &[Transaction], kind: CategoryKind) -> Vec<CategoryTotal> {
    let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for tx in transactions {
        if tx.status == TransactionStatus::Skipped {
            continue;
        }
        let wanted = match kind {
            CategoryKind::Income => !tx.is_outflow(),
            CategoryKind::Expenses => tx.is_outflow(),
        };
        if !wanted {
            continue;
        }
        let category = if tx.category.is_empty() {
            "uncategorized"
        } else {
            tx.category.as_str()
        };
        let entry = totals.entry(category).or_insert((0.0, 0));
        entry.0 += tx.effective_amount();
        entry.1 += 1;
    }

    let grand_total: f64 = totals.values().map(|(total, _)| total).sum();
    let mut breakdown: Vec<CategoryTotal> = totals
        .into_iter()
        .map(|(category, (total, count))| CategoryTotal {
            category: category.to_string(),
            total,
            count,
            percent: percent_of(total, grand_total),
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    breakdown
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotals {
    pub year: i32,
    pub month: u32,
    pub projected_income: f64,
    pub projected_expenses: f64,
    pub actual_income: f64,
    pub actual_expenses: f64,
    pub net_projected: f64,
    pub net_actual: f64,
    pub completed_count: usize,
    pub open_count: usize,
    pub skipped_count: usize,
    /// Realized share of non-skipped transactions, in percent
    pub completion_rate: f64,
}

/// Projected and actual totals for transactions scheduled in a month
pub fn calculate_monthly_totals(transactions: &[Transaction], year: i32, month: u32) -> Result<MonthlyTotals> {
    let (first, last) = month_bounds(year, month)
        .ok_or_else(|| Error::Validation(format!("Invalid month {}-{}", year, month)))?;

    let mut totals = MonthlyTotals {
        year,
        month,
        projected_income: 0.0,
        projected_expenses: 0.0,
        actual_income: 0.0,
        actual_expenses: 0.0,
        net_projected: 0.0,
        net_actual: 0.0,
        completed_count: 0,
        open_count: 0,
        skipped_count: 0,
        completion_rate: 0.0,
    };

    for tx in transactions
        .iter()
        .filter(|t| t.scheduled_date >= first && t.scheduled_date <= last)
    {
        if tx.status == TransactionStatus::Skipped {
            totals.skipped_count += 1;
            continue;
        }
        if tx.is_outflow() {
            totals.projected_expenses += tx.projected_amount;
        } else {
            totals.projected_income += tx.projected_amount;
        }
        if tx.is_realized() {
            totals.completed_count += 1;
            let actual = tx.actual_amount.unwrap_or(0.0);
            if tx.is_outflow() {
                totals.actual_expenses += actual;
            } else {
                totals.actual_income += actual;
            }
        } else {
            totals.open_count += 1;
        }
    }

    totals.net_projected = totals.projected_income - totals.projected_expenses;
    totals.net_actual = totals.actual_income - totals.actual_expenses;
    totals.completion_rate = percent_of(
        totals.completed_count as f64,
        (totals.completed_count + totals.open_count) as f64,
    );
    Ok(totals)
}

/// A recurring item normalized to a monthly amount
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlowLine {
    pub name: String,
    pub frequency: Frequency,
    pub amount: f64,
    pub monthly_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCashFlow {
    pub income: Vec<CashFlowLine>,
    pub expenses: Vec<CashFlowLine>,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub net: f64,
    /// Net as a fraction of income (0 without income)
    pub savings_rate: f64,
}

/// Monthly equivalent of all active income sources and expense rules
pub fn project_monthly_cash_flow(income_sources: &[IncomeSource], expense_rules: &[ExpenseRule]) -> MonthlyCashFlow {
    let income: Vec<CashFlowLine> = income_sources
        .iter()
        .filter(|s| s.is_active)
        .map(|s| CashFlowLine {
            name: s.name.clone(),
            frequency: s.frequency,
            amount: s.amount,
            monthly_amount: s.amount * s.frequency.monthly_multiplier(),
        })
        .collect();
    let expenses: Vec<CashFlowLine> = expense_rules
        .iter()
        .filter(|r| r.is_active)
        .map(|r| CashFlowLine {
            name: r.name.clone(),
            frequency: r.frequency,
            amount: r.amount,
            monthly_amount: r.amount * r.frequency.monthly_multiplier(),
        })
        .collect();

    let monthly_income: f64 = income.iter().map(|l| l.monthly_amount).sum();
    let monthly_expenses: f64 = expenses.iter().map(|l| l.monthly_amount).sum();
    let net = monthly_income - monthly_expenses;

    MonthlyCashFlow {
        income,
        expenses,
        monthly_income,
        monthly_expenses,
        net,
        savings_rate: if monthly_income > 0.0 { net / monthly_income } else { 0.0 },
    }
}
