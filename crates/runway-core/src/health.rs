//! Financial health score
//!
//! Four components, each scored 0-100, combined as a weighted average:
//!
//! - **Runway**: days until the projected balance goes negative (90-day walk)
//! - **Savings rate**: (income - expenses) / income over the period
//! - **Bill payment**: share of past bills paid on or before their due date
//! - **Balance trend**: least-squares slope of daily closing balances,
//!   normalized by the mean balance
//!
//! Up to three insights are generated, checked in that same order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::balance::{calculate_daily_balances, DEFAULT_WARNING_THRESHOLD};
use crate::dates::{add_days, clamp_window};
use crate::models::{Transaction, TransactionStatus};

pub const DEFAULT_HEALTH_PERIOD_DAYS: i64 = 30;

/// Forward window of the runway component
pub const RUNWAY_HORIZON_DAYS: i64 = 90;

const MAX_INSIGHTS: usize = 3;

/// Normalized slope beyond which the balance counts as moving
const TREND_THRESHOLD: f64 = 0.005;
/// Normalized slope that earns the full improving/declining score
const TREND_SATURATION: f64 = 0.05;

/// Relative weight of each component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthWeights {
    pub runway: f64,
    pub savings: f64,
    pub bills: f64,
    pub trend: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            runway: 0.30,
            savings: 0.30,
            bills: 0.20,
            trend: 0.20,
        }
    }
}

impl HealthWeights {
    pub fn total(&self) -> f64 {
        self.runway + self.savings + self.bills + self.trend
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunwayComponent {
    pub score: f64,
    /// Days until the balance is strictly below zero, capped at the horizon
    ///
    /// A balance of exactly 0.00 still counts as runway here, unlike
    /// [`crate::balance::Runway`], which ends on the first day at zero or below.
    pub days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavingsComponent {
    pub score: f64,
    pub rate: f64,
    pub income: f64,
    pub expenses: f64,
    /// False when nothing was recorded in the period
    pub has_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillComponent {
    pub score: f64,
    pub on_time: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendComponent {
    pub score: f64,
    pub direction: TrendDirection,
    pub normalized_slope: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthScore {
    pub score: f64,
    pub grade: &'static str,
    pub color: &'static str,
    pub runway: RunwayComponent,
    pub savings: SavingsComponent,
    pub bills: BillComponent,
    pub trend: TrendComponent,
    pub insights: Vec<String>,
}

/// Period over which the backward-looking components are measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl HealthPeriod {
    /// The `days` days ending on `today`, at most `MAX_WINDOW_DAYS`
    pub fn ending(today: NaiveDate, days: i64) -> Self {
        Self {
            start: add_days(today, -(clamp_window(days) - 1).max(0)),
            end: today,
        }
    }

    fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

pub fn grade_for(score: f64) -> &'static str {
    match score {
        s if s >= 90.0 => "A",
        s if s >= 80.0 => "B",
        s if s >= 70.0 => "C",
        s if s >= 60.0 => "D",
        _ => "F",
    }
}

pub fn color_for(score: f64) -> &'static str {
    match score {
        s if s >= 80.0 => "#22c55e",
        s if s >= 60.0 => "#eab308",
        s if s >= 40.0 => "#f97316",
        _ => "#ef4444",
    }
}

fn runway_band(days: i64) -> f64 {
    match days {
        d if d >= 90 => 100.0,
        d if d >= 60 => 80.0,
        d if d >= 30 => 60.0,
        d if d >= 14 => 40.0,
        d if d >= 7 => 20.0,
        _ => 0.0,
    }
}

fn savings_band(rate: f64) -> f64 {
    match rate {
        r if r >= 0.30 => 100.0,
        r if r >= 0.20 => 80.0,
        r if r >= 0.10 => 60.0,
        r if r >= 0.05 => 40.0,
        r if r >= 0.0 => 20.0,
        _ => 0.0,
    }
}

/// Days until the balance first drops below zero, walking open transactions
pub fn score_runway(current_balance: f64, transactions: &[Transaction], today: NaiveDate) -> RunwayComponent {
    let mut due: Vec<(NaiveDate, &Transaction)> = transactions
        .iter()
        .filter(|t| t.status.is_open())
        .map(|t| (t.scheduled_date.max(today), t))
        .filter(|(date, _)| *date <= add_days(today, RUNWAY_HORIZON_DAYS))
        .collect();
    due.sort_by_key(|(date, t)| (*date, t.is_outflow()));

    let mut balance = current_balance;
    let mut days = RUNWAY_HORIZON_DAYS;
    let mut due = due.into_iter().peekable();
    for offset in 0..=RUNWAY_HORIZON_DAYS {
        let date = add_days(today, offset);
        while let Some((_, tx)) = due.next_if(|(d, _)| *d == date) {
            balance += tx.signed_amount();
        }
        if balance < 0.0 {
            days = offset;
            break;
        }
    }

    RunwayComponent {
        score: runway_band(days),
        days,
    }
}

/// Savings rate over the period; an empty period is not penalized
pub fn score_savings(transactions: &[Transaction], period: HealthPeriod) -> SavingsComponent {
    let mut income = 0.0;
    let mut expenses = 0.0;
    let mut count = 0;
    for tx in transactions
        .iter()
        .filter(|t| t.status != TransactionStatus::Skipped && period.contains(t.effective_date()))
    {
        count += 1;
        if tx.is_outflow() {
            expenses += tx.effective_amount();
        } else {
            income += tx.effective_amount();
        }
    }

    if count == 0 {
        return SavingsComponent {
            score: 100.0,
            rate: 0.0,
            income,
            expenses,
            has_data: false,
        };
    }

    let rate = if income > 0.0 {
        (income - expenses) / income
    } else if expenses > 0.0 {
        -1.0
    } else {
        0.0
    };

    SavingsComponent {
        score: savings_band(rate),
        rate,
        income,
        expenses,
        has_data: true,
    }
}

/// Share of past, non-projected bills that were paid by their due date
pub fn score_bills(transactions: &[Transaction], period: HealthPeriod, today: NaiveDate) -> BillComponent {
    let bills: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| {
            t.is_outflow()
                && t.scheduled_date < today
                && period.contains(t.scheduled_date)
                && !matches!(t.status, TransactionStatus::Projected | TransactionStatus::Skipped)
        })
        .collect();

    let on_time = bills
        .iter()
        .filter(|t| {
            t.status == TransactionStatus::Completed
                && t.actual_date.unwrap_or(t.scheduled_date) <= t.scheduled_date
        })
        .count();

    let score = if bills.is_empty() {
        100.0
    } else {
        on_time as f64 / bills.len() as f64 * 100.0
    };

    BillComponent {
        score,
        on_time,
        total: bills.len(),
    }
}

/// Ordinary least-squares slope of `ys` against their index
fn ols_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (num, den) = ys
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Direction of the daily closing balance over the period
pub fn score_trend(
    current_balance: f64,
    transactions: &[Transaction],
    period: HealthPeriod,
    today: NaiveDate,
) -> TrendComponent {
    let end = period.end.min(today);
    let closings: Vec<f64> = calculate_daily_balances(
        current_balance,
        transactions,
        period.start,
        end,
        DEFAULT_WARNING_THRESHOLD,
    )
    .values()
    .map(|day| day.closing_balance)
    .collect();

    let stable = TrendComponent {
        score: 50.0,
        direction: TrendDirection::Stable,
        normalized_slope: 0.0,
    };
    if closings.len() < 2 {
        return stable;
    }

    let mean = closings.iter().sum::<f64>() / closings.len() as f64;
    if mean.abs() < 0.01 {
        return stable;
    }

    let normalized = ols_slope(&closings) / mean.abs();
    if normalized > TREND_THRESHOLD {
        TrendComponent {
            score: 70.0 + 30.0 * (normalized / TREND_SATURATION).min(1.0),
            direction: TrendDirection::Improving,
            normalized_slope: normalized,
        }
    } else if normalized < -TREND_THRESHOLD {
        TrendComponent {
            score: 30.0 - 30.0 * (normalized.abs() / TREND_SATURATION).min(1.0),
            direction: TrendDirection::Declining,
            normalized_slope: normalized,
        }
    } else {
        TrendComponent {
            normalized_slope: normalized,
            ..stable
        }
    }
}

fn generate_insights(
    runway: &RunwayComponent,
    savings: &SavingsComponent,
    bills: &BillComponent,
    trend: &TrendComponent,
) -> Vec<String> {
    let mut insights = Vec::new();

    if runway.days < 30 {
        insights.push(format!(
            "Your balance is projected to go negative in {} days. Review upcoming bills or move income earlier.",
            runway.days
        ));
    } else if runway.days >= RUNWAY_HORIZON_DAYS {
        insights.push("Your balance stays positive for the next 90 days.".to_string());
    }

    if !savings.has_data {
        insights.push("No income or expenses were recorded for this period.".to_string());
    } else if savings.rate < 0.0 {
        insights.push(format!(
            "You spent {:.0}% more than you earned this period.",
            if savings.income > 0.0 {
                (savings.expenses - savings.income) / savings.income * 100.0
            } else {
                100.0
            }
        ));
    } else if savings.rate >= 0.20 {
        insights.push(format!(
            "Excellent savings rate of {:.0}%.",
            savings.rate * 100.0
        ));
    } else if savings.rate < 0.10 {
        insights.push(format!(
            "Your savings rate is {:.0}%. Aim for at least 10%.",
            savings.rate * 100.0
        ));
    }

    if bills.total > 0 {
        let late = bills.total - bills.on_time;
        if late == 0 {
            insights.push(format!("All {} bills were paid on time.", bills.total));
        } else {
            insights.push(format!(
                "{} of {} bills were paid late or are still outstanding.",
                late, bills.total
            ));
        }
    }

    match trend.direction {
        TrendDirection::Improving => insights.push("Your balance is trending upward.".to_string()),
        TrendDirection::Declining => {
            insights.push("Your balance is trending downward.".to_string())
        }
        TrendDirection::Stable => {}
    }

    insights.truncate(MAX_INSIGHTS);
    insights
}

/// Composite score for a user's current position
pub fn calculate_health_score(
    current_balance: f64,
    transactions: &[Transaction],
    period: HealthPeriod,
    today: NaiveDate,
    weights: &HealthWeights,
) -> HealthScore {
    let runway = score_runway(current_balance, transactions, today);
    let savings = score_savings(transactions, period);
    let bills = score_bills(transactions, period, today);
    let trend = score_trend(current_balance, transactions, period, today);

    let total_weight = weights.total();
    let weighted = runway.score * weights.runway
        + savings.score * weights.savings
        + bills.score * weights.bills
        + trend.score * weights.trend;
    let score = if total_weight > 0.0 {
        (weighted / total_weight).round()
    } else {
        0.0
    };

    debug!(
        score,
        runway = runway.score,
        savings = savings.score,
        bills = bills.score,
        trend = trend.score,
        "Health score computed"
    );

    let insights = generate_insights(&runway, &savings, &bills, &trend);
    HealthScore {
        score,
        grade: grade_for(score),
        color: color_for(score),
        runway,
        savings,
        bills,
        trend,
        insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTransaction, TransactionType};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    fn today() -> NaiveDate {
        d(30)
    }

    fn period() -> HealthPeriod {
        HealthPeriod::ending(today(), 30)
    }

    fn tx(tx_type: TransactionType, amount: f64, date: NaiveDate) -> Transaction {
        NewTransaction::new("u1", "Item", tx_type, amount, date).into_transaction()
    }

    fn completed(tx_type: TransactionType, amount: f64, scheduled: NaiveDate, paid: NaiveDate) -> Transaction {
        let mut t = tx(tx_type, amount, scheduled);
        t.status = TransactionStatus::Completed;
        t.actual_amount = Some(amount);
        t.actual_date = Some(paid);
        t
    }

    #[test]
    fn test_empty_period_is_not_penalized() {
        let health = calculate_health_score(1000.0, &[], period(), today(), &HealthWeights::default());
        assert_eq!(health.savings.score, 100.0);
        assert!(!health.savings.has_data);
        assert!(health
            .insights
            .iter()
            .any(|i| i == "No income or expenses were recorded for this period."));
        assert!(!health.insights.iter().any(|i| i.contains("Excellent")));
        // Runway 100, savings 100, bills 100, trend 50
        assert_eq!(health.score, 90.0);
        assert_eq!(health.grade, "A");
    }

    #[test]
    fn test_period_ending() {
        let p = HealthPeriod::ending(today(), 30);
        assert_eq!(p.start, d(1));
        assert_eq!(p.end, d(30));
    }

    #[test]
    fn test_runway_bands() {
        let txs = vec![tx(TransactionType::Bill, 600.0, add_days(today(), 20))];
        let runway = score_runway(500.0, &txs, today());
        assert_eq!(runway.days, 20);
        assert_eq!(runway.score, 40.0);

        // Exactly zero is not negative
        let txs = vec![tx(TransactionType::Bill, 500.0, add_days(today(), 5))];
        assert_eq!(score_runway(500.0, &txs, today()).days, 90);

        assert_eq!(score_runway(-1.0, &[], today()).score, 0.0);
    }

    #[test]
    fn test_savings_bands() {
        let txs = vec![
            completed(TransactionType::Income, 1000.0, d(5), d(5)),
            completed(TransactionType::Expense, 750.0, d(6), d(6)),
        ];
        let savings = score_savings(&txs, period());
        assert!((savings.rate - 0.25).abs() < 1e-9);
        assert_eq!(savings.score, 80.0);

        let spend_only = vec![completed(TransactionType::Expense, 10.0, d(6), d(6))];
        let savings = score_savings(&spend_only, period());
        assert_eq!(savings.rate, -1.0);
        assert_eq!(savings.score, 0.0);
    }

    #[test]
    fn test_bill_payment_rate() {
        let mut pending = tx(TransactionType::Bill, 30.0, d(12));
        pending.status = TransactionStatus::Pending;
        let txs = vec![
            completed(TransactionType::Bill, 100.0, d(10), d(9)),
            completed(TransactionType::Bill, 100.0, d(11), d(14)),
            pending,
            // Future and projected bills do not count
            tx(TransactionType::Bill, 100.0, d(8)),
            completed(TransactionType::Income, 900.0, d(10), d(10)),
        ];
        let bills = score_bills(&txs, period(), today());
        assert_eq!(bills.total, 3);
        assert_eq!(bills.on_time, 1);
        assert!((bills.score - 100.0 / 3.0).abs() < 1e-9);

        assert_eq!(score_bills(&[], period(), today()).score, 100.0);
    }

    #[test]
    fn test_trend_direction() {
        // Paid 100 every day for the last 10 days: steadily rising balance
        let txs: Vec<_> = (21..=30)
            .map(|day| completed(TransactionType::Income, 100.0, d(day), d(day)))
            .collect();
        let trend = score_trend(2000.0, &txs, period(), today());
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert!(trend.score >= 70.0 && trend.score <= 100.0);

        let flat = score_trend(2000.0, &[], period(), today());
        assert_eq!(flat.direction, TrendDirection::Stable);
        assert_eq!(flat.score, 50.0);

        let single_day = HealthPeriod::ending(today(), 1);
        assert_eq!(score_trend(2000.0, &txs, single_day, today()).score, 50.0);
    }

    #[test]
    fn test_declining_trend_insight() {
        let txs: Vec<_> = (1..=30)
            .map(|day| completed(TransactionType::Expense, 50.0, d(day), d(day)))
            .collect();
        let health = calculate_health_score(500.0, &txs, period(), today(), &HealthWeights::default());
        assert_eq!(health.trend.direction, TrendDirection::Declining);
        assert!(health.insights.len() <= 3);
        assert!(health.insights[1].starts_with("You spent"));
    }

    #[test]
    fn test_grade_and_color() {
        assert_eq!(grade_for(95.0), "A");
        assert_eq!(grade_for(80.0), "B");
        assert_eq!(grade_for(59.9), "F");
        assert_eq!(color_for(85.0), "#22c55e");
        assert_eq!(color_for(65.0), "#eab308");
        assert_eq!(color_for(45.0), "#f97316");
        assert_eq!(color_for(10.0), "#ef4444");
    }
}
