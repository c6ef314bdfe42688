//! Credit card payoff analysis
//!
//! Projects how long a fixed monthly payment takes to clear a card, flags the
//! minimum-payment trap, and compares faster payoff scenarios against the
//! card's current payment strategy.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::amortization::{credit_minimum_payment, monthly_rate, PAID_OFF_EPSILON};
use crate::dates::add_months;
use crate::models::{CreditConfig, PaymentStrategy};

/// Ceiling for fixed-payment payoff schedules (50 years)
pub const DEFAULT_PAYOFF_MAX_MONTHS: u32 = 600;

/// Months after which a non-shrinking balance is declared a trap
const TRAP_GRACE_MONTHS: u32 = 12;

/// Effective payment at or below this multiple of monthly interest is a trap
const TRAP_INTEREST_MULTIPLE: f64 = 1.1;

/// One month of a fixed-payment payoff
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBreakdown {
    pub month: u32,
    pub date: NaiveDate,
    pub payment: f64,
    pub principal: f64,
    pub interest: f64,
    pub remaining_balance: f64,
    pub cumulative_interest: f64,
    pub cumulative_principal: f64,
}

/// Outcome of paying a card with its configured strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoffSummary {
    pub current_balance: f64,
    pub effective_payment: f64,
    pub minimum_payment: f64,
    pub current_monthly_interest: f64,
    /// `None` when the schedule never reaches zero
    pub payoff_date: Option<NaiveDate>,
    /// `None` means never (infinite)
    pub months_to_payoff: Option<u32>,
    pub years_to_payoff: Option<f64>,
    pub total_amount_paid: f64,
    pub total_interest_paid: f64,
    pub utilization: f64,
    pub is_minimum_payment_trap: bool,
    pub schedule: Vec<MonthlyBreakdown>,
}

/// An alternative payment plan and what it saves
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoffScenario {
    pub name: String,
    pub monthly_payment: f64,
    pub months_to_payoff: u32,
    pub total_interest: f64,
    pub payoff_date: Option<NaiveDate>,
    pub interest_saved: f64,
    /// `None` when the current strategy never pays the card off
    pub months_saved: Option<u32>,
}

/// Round up to the next cent, tolerating float noise on exact cents
fn ceil_to_cent(amount: f64) -> f64 {
    ((amount * 100.0) - 1e-7).ceil() / 100.0
}

/// Minimum payment due on the card's current balance
pub fn minimum_payment(config: &CreditConfig) -> f64 {
    let interest = config.current_balance * monthly_rate(config.apr);
    credit_minimum_payment(
        config.current_balance,
        interest,
        config.minimum_payment_percent,
        config.minimum_payment_floor,
        config.minimum_payment_method,
    )
}

/// Payment the configured strategy makes each month
pub fn effective_payment(config: &CreditConfig) -> f64 {
    let minimum = minimum_payment(config);
    match config.payment_strategy {
        PaymentStrategy::Minimum => minimum,
        PaymentStrategy::Fixed => config
            .fixed_payment_amount
            .filter(|amount| *amount > 0.0)
            .unwrap_or(minimum),
        PaymentStrategy::FullBalance => {
            config.current_balance * (1.0 + monthly_rate(config.apr))
        }
    }
}

/// Payment that clears `balance` in exactly `months`, rounded up to the cent
pub fn calculate_payment_for_months(balance: f64, apr: f64, months: u32) -> f64 {
    if months == 0 {
        return ceil_to_cent(balance);
    }
    let r = monthly_rate(apr);
    let n = months as f64;
    if r == 0.0 {
        return ceil_to_cent(balance / n);
    }
    let growth = (1.0 + r).powf(n);
    ceil_to_cent(balance * r * growth / (growth - 1.0))
}

/// Fixed-payment payoff schedule
///
/// Month `n` is dated `start_date + (n - 1)` months. After the first year a
/// month whose principal portion is under a cent ends the schedule (the
/// balance is not shrinking); that month is not recorded.
pub fn calculate_credit_card_payoff(
    balance: f64,
    apr: f64,
    fixed_monthly_payment: f64,
    start_date: NaiveDate,
    max_months: u32,
) -> Vec<MonthlyBreakdown> {
    let r = monthly_rate(apr);
    let mut schedule = Vec::new();
    let mut remaining = balance;
    let mut cumulative_interest = 0.0;
    let mut cumulative_principal = 0.0;
    let mut month = 0;

    while remaining > PAID_OFF_EPSILON && month < max_months {
        month += 1;
        let interest = remaining * r;
        let payment = fixed_monthly_payment.min(remaining + interest);
        let principal = payment - interest;

        if month > TRAP_GRACE_MONTHS && principal < 0.01 {
            debug!(month, remaining, "Balance not shrinking, stopping payoff schedule");
            break;
        }

        remaining -= principal;
        cumulative_interest += interest;
        cumulative_principal += principal;

        schedule.push(MonthlyBreakdown {
            month,
            date: add_months(start_date, month as i32 - 1),
            payment,
            principal,
            interest,
            remaining_balance: remaining.max(0.0),
            cumulative_interest,
            cumulative_principal,
        });
    }

    schedule
}

fn paid_off(schedule: &[MonthlyBreakdown]) -> Option<&MonthlyBreakdown> {
    schedule
        .last()
        .filter(|m| m.remaining_balance <= PAID_OFF_EPSILON)
}

/// Payoff outcome of the card's configured strategy
pub fn calculate_payoff_summary(config: &CreditConfig, start_date: NaiveDate) -> PayoffSummary {
    let current_monthly_interest = config.current_balance * monthly_rate(config.apr);
    let minimum = minimum_payment(config);
    let payment = effective_payment(config);

    let schedule = calculate_credit_card_payoff(
        config.current_balance,
        config.apr,
        payment,
        start_date,
        DEFAULT_PAYOFF_MAX_MONTHS,
    );

    let total_amount_paid: f64 = schedule.iter().map(|m| m.payment).sum();
    let total_interest_paid = schedule.last().map(|m| m.cumulative_interest).unwrap_or(0.0);

    let finished = if config.current_balance <= PAID_OFF_EPSILON {
        Some((start_date, 0))
    } else {
        paid_off(&schedule).map(|m| (m.date, m.month))
    };

    let is_trap = config.current_balance > PAID_OFF_EPSILON
        && payment <= TRAP_INTEREST_MULTIPLE * current_monthly_interest;
    if is_trap {
        warn!(
            balance = config.current_balance,
            payment, current_monthly_interest, "Minimum-payment trap detected"
        );
    }

    PayoffSummary {
        current_balance: config.current_balance,
        effective_payment: payment,
        minimum_payment: minimum,
        current_monthly_interest,
        payoff_date: finished.map(|(date, _)| date),
        months_to_payoff: finished.map(|(_, months)| months),
        years_to_payoff: finished.map(|(_, months)| months as f64 / 12.0),
        total_amount_paid,
        total_interest_paid,
        utilization: config.utilization(),
        is_minimum_payment_trap: is_trap,
        schedule,
    }
}

/// Faster payoff plans that beat the current strategy, cheapest payment first
pub fn compare_payoff_scenarios(config: &CreditConfig, start_date: NaiveDate) -> Vec<PayoffScenario> {
    if config.current_balance <= PAID_OFF_EPSILON {
        return Vec::new();
    }

    let current = calculate_payoff_summary(config, start_date);
    let balance = config.current_balance;

    let candidates = [
        ("Double payment", current.effective_payment * 2.0),
        (
            "Pay off in 12 months",
            calculate_payment_for_months(balance, config.apr, 12),
        ),
        (
            "Pay off in 24 months",
            calculate_payment_for_months(balance, config.apr, 24),
        ),
    ];

    let mut scenarios: Vec<PayoffScenario> = candidates
        .iter()
        .filter_map(|(name, payment)| {
            let schedule = calculate_credit_card_payoff(
                balance,
                config.apr,
                *payment,
                start_date,
                DEFAULT_PAYOFF_MAX_MONTHS,
            );
            let last = paid_off(&schedule)?;
            let interest_saved = current.total_interest_paid - last.cumulative_interest;
            let months_saved = current
                .months_to_payoff
                .map(|months| months.saturating_sub(last.month));

            let saves = match current.months_to_payoff {
                Some(_) => interest_saved > 0.005,
                None => true,
            };
            saves.then(|| PayoffScenario {
                name: name.to_string(),
                monthly_payment: *payment,
                months_to_payoff: last.month,
                total_interest: last.cumulative_interest,
                payoff_date: Some(last.date),
                interest_saved,
                months_saved,
            })
        })
        .collect();

    scenarios.sort_by(|a, b| {
        a.monthly_payment
            .partial_cmp(&b.monthly_payment)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scenarios
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MinimumPaymentMethod;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn card(balance: f64, apr: f64, strategy: PaymentStrategy, fixed: Option<f64>) -> CreditConfig {
        CreditConfig {
            current_balance: balance,
            credit_limit: 10_000.0,
            apr,
            minimum_payment_percent: 1.0,
            minimum_payment_floor: 25.0,
            minimum_payment_method: MinimumPaymentMethod::PercentOnly,
            payment_strategy: strategy,
            fixed_payment_amount: fixed,
            due_day: None,
        }
    }

    #[test]
    fn test_minimum_payment_trap() {
        let config = card(5000.0, 24.0, PaymentStrategy::Minimum, None);
        let summary = calculate_payoff_summary(&config, start());

        assert!((summary.minimum_payment - 50.0).abs() < 1e-9);
        assert!((summary.current_monthly_interest - 100.0).abs() < 1e-9);
        assert!(summary.is_minimum_payment_trap);
        assert!(summary.payoff_date.is_none());
        assert!(summary.months_to_payoff.is_none());
        assert!(summary.years_to_payoff.is_none());
        // Stopped after the grace year instead of running 600 months
        assert_eq!(summary.schedule.len(), 12);
    }

    #[test]
    fn test_fixed_payment_pays_off() {
        let config = card(3000.0, 18.0, PaymentStrategy::Fixed, Some(300.0));
        let summary = calculate_payoff_summary(&config, start());

        assert!(!summary.is_minimum_payment_trap);
        let months = summary.months_to_payoff.unwrap();
        assert_eq!(months, 11);
        assert_eq!(summary.payoff_date, Some(add_months(start(), 10)));
        let last = summary.schedule.last().unwrap();
        assert!(last.remaining_balance <= PAID_OFF_EPSILON);
        assert!((last.cumulative_principal - 3000.0).abs() < 0.02);
        assert!(
            (summary.total_amount_paid - (3000.0 + summary.total_interest_paid)).abs() < 0.02
        );
    }

    #[test]
    fn test_full_balance_strategy_pays_in_one_month() {
        let config = card(1200.0, 12.0, PaymentStrategy::FullBalance, None);
        let summary = calculate_payoff_summary(&config, start());
        assert_eq!(summary.months_to_payoff, Some(1));
        assert!((summary.total_interest_paid - 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_strategy_without_amount_falls_back_to_minimum() {
        let config = card(1000.0, 12.0, PaymentStrategy::Fixed, None);
        assert_eq!(effective_payment(&config), minimum_payment(&config));
    }

    #[test]
    fn test_payment_for_months_rounds_up() {
        // 1000 over 3 months at 0% is 333.333.. -> 333.34
        assert_eq!(calculate_payment_for_months(1000.0, 0.0, 3), 333.34);
        // Exact cents stay put
        assert_eq!(calculate_payment_for_months(1200.0, 0.0, 12), 100.0);

        let payment = calculate_payment_for_months(5000.0, 24.0, 12);
        let schedule = calculate_credit_card_payoff(5000.0, 24.0, payment, start(), 600);
        assert!(schedule.len() <= 12);
        assert!(schedule.last().unwrap().remaining_balance <= PAID_OFF_EPSILON);
    }

    #[test]
    fn test_scenarios_for_trapped_card() {
        let config = card(5000.0, 24.0, PaymentStrategy::Minimum, None);
        let scenarios = compare_payoff_scenarios(&config, start());

        // Double minimum (100) equals the interest and never pays off, so it is dropped
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Pay off in 24 months", "Pay off in 12 months"]);
        assert!(scenarios.iter().all(|s| s.months_saved.is_none()));
        assert!(scenarios[0].monthly_payment < scenarios[1].monthly_payment);
    }

    #[test]
    fn test_scenarios_only_keep_savings() {
        // Paying 1000/month on 3000 already beats a 12 or 24 month plan
        let config = card(3000.0, 18.0, PaymentStrategy::Fixed, Some(1000.0));
        let scenarios = compare_payoff_scenarios(&config, start());
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].name, "Double payment");
        assert!(scenarios[0].interest_saved > 0.0);
        assert!(scenarios[0].months_saved.unwrap() >= 1);
    }

    #[test]
    fn test_zero_balance_has_nothing_to_compare() {
        let config = card(0.0, 18.0, PaymentStrategy::Minimum, None);
        assert!(compare_payoff_scenarios(&config, start()).is_empty());
        let summary = calculate_payoff_summary(&config, start());
        assert_eq!(summary.months_to_payoff, Some(0));
        assert!(!summary.is_minimum_payment_trap);
    }
}
