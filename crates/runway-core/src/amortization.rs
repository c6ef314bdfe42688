//! Loan and credit-card amortization schedules
//!
//! Two schedule shapes:
//! - fixed-payment loans (annuity payment derived when not given)
//! - credit cards paying the minimum each month
//!
//! Payments smaller than the month's interest cannot reduce the balance. The
//! principal portion is floored at zero and the schedule stops after
//! `STALL_LIMIT` months without progress instead of running to the ceiling.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dates::{add_months, pin_to_day};
use crate::models::{LoanConfig, MinimumPaymentMethod, PaymentBreakdown};

/// Balance at or below this is treated as paid off
pub const PAID_OFF_EPSILON: f64 = 0.01;

/// Iteration ceiling when no term is given
pub const DEFAULT_MAX_MONTHS: u32 = 360;

/// Consecutive months without principal progress before a schedule is cut off
pub const STALL_LIMIT: u32 = 12;

/// One payment in a schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationStep {
    pub payment_number: u32,
    pub date: NaiveDate,
    pub payment: f64,
    pub principal: f64,
    pub interest: f64,
    pub remaining_balance: f64,
}

/// Totals over a schedule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleSummary {
    pub payments: usize,
    pub total_paid: f64,
    pub total_interest: f64,
    pub total_principal: f64,
    pub payoff_date: Option<NaiveDate>,
    pub final_balance: f64,
}

/// Minimum-payment projection input for a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCardProjectionConfig {
    pub balance: f64,
    /// Annual percentage rate in percent
    pub apr: f64,
    /// Percent of balance (2.0 = 2%)
    pub min_payment_percent: f64,
    pub min_payment_floor: f64,
    #[serde(default)]
    pub min_payment_method: MinimumPaymentMethod,
    pub start_date: NaiveDate,
    /// Fixed statement due day of month
    #[serde(default)]
    pub due_day: Option<u32>,
    #[serde(default = "default_max_months")]
    pub max_months: u32,
}

fn default_max_months() -> u32 {
    DEFAULT_MAX_MONTHS
}

/// Monthly rate from an annual percentage
pub fn monthly_rate(annual_rate_percent: f64) -> f64 {
    annual_rate_percent / 1200.0
}

/// Standard annuity payment: `P·r·(1+r)^n / ((1+r)^n − 1)`
pub fn calculate_monthly_payment(principal: f64, annual_rate: f64, term_months: u32) -> f64 {
    if term_months == 0 {
        return principal;
    }
    let r = monthly_rate(annual_rate);
    let n = term_months as f64;
    if r == 0.0 {
        return principal / n;
    }
    let growth = (1.0 + r).powf(n);
    principal * r * growth / (growth - 1.0)
}

/// Minimum card payment for a balance
pub fn credit_minimum_payment(
    balance: f64,
    interest: f64,
    percent: f64,
    floor: f64,
    method: MinimumPaymentMethod,
) -> f64 {
    let percent_part = balance * percent / 100.0;
    match method {
        MinimumPaymentMethod::PercentOnly => floor.max(percent_part),
        MinimumPaymentMethod::PercentPlusInterest => floor.max(percent_part + interest),
    }
}

/// Fixed-payment loan schedule
///
/// Step `n` is dated `start_date + (n - 1)` months. The schedule ends when the
/// balance is paid off, after `term_months` steps (360 when absent), or when
/// the payment has not reduced principal for `STALL_LIMIT` months.
pub fn calculate_amortization_schedule(
    principal: f64,
    annual_rate: f64,
    term_months: Option<u32>,
    monthly_payment: Option<f64>,
    start_date: NaiveDate,
) -> Vec<AmortizationStep> {
    let max_months = term_months.filter(|t| *t > 0).unwrap_or(DEFAULT_MAX_MONTHS);
    let payment = monthly_payment
        .unwrap_or_else(|| calculate_monthly_payment(principal, annual_rate, max_months));
    let r = monthly_rate(annual_rate);

    if !payment.is_finite() || payment <= 0.0 || principal <= PAID_OFF_EPSILON {
        return Vec::new();
    }

    let mut steps = Vec::new();
    let mut balance = principal;
    let mut stalled_months = 0;

    for month in 0..max_months {
        if balance <= PAID_OFF_EPSILON {
            break;
        }

        let interest = balance * r;
        let mut step_payment = payment;
        let mut principal_part = (payment - interest).max(0.0);

        if principal_part >= balance {
            principal_part = balance;
            step_payment = principal_part + interest;
        }

        balance -= principal_part;

        steps.push(AmortizationStep {
            payment_number: month + 1,
            date: add_months(start_date, month as i32),
            payment: step_payment,
            principal: principal_part,
            interest,
            remaining_balance: balance.max(0.0),
        });

        if principal_part <= 0.0 {
            stalled_months += 1;
            if stalled_months >= STALL_LIMIT {
                warn!(
                    payment,
                    balance, "Loan payment does not cover interest, schedule stalled"
                );
                break;
            }
        } else {
            stalled_months = 0;
        }
    }

    debug!(
        steps = steps.len(),
        payment, "Amortization schedule calculated"
    );
    steps
}

/// Minimum-payment schedule for a credit card
pub fn calculate_credit_card_projection(
    config: &CreditCardProjectionConfig,
) -> Vec<AmortizationStep> {
    let r = monthly_rate(config.apr);
    let mut steps = Vec::new();
    let mut balance = config.balance;
    let mut stalled_months = 0;

    for month in 0..config.max_months {
        if balance <= PAID_OFF_EPSILON {
            break;
        }

        let interest = balance * r;
        let minimum = credit_minimum_payment(
            balance,
            interest,
            config.min_payment_percent,
            config.min_payment_floor,
            config.min_payment_method,
        );
        let payment = minimum.min(balance + interest);
        let principal_part = (payment - interest).max(0.0).min(balance);
        balance -= principal_part;

        let mut date = add_months(config.start_date, month as i32);
        if let Some(day) = config.due_day {
            date = pin_to_day(date, day);
        }

        steps.push(AmortizationStep {
            payment_number: month + 1,
            date,
            payment,
            principal: principal_part,
            interest,
            remaining_balance: balance.max(0.0),
        });

        if principal_part <= 0.0 {
            stalled_months += 1;
            if stalled_months >= STALL_LIMIT {
                warn!(
                    balance,
                    "Minimum payment does not cover interest, projection stalled"
                );
                break;
            }
        } else {
            stalled_months = 0;
        }
    }

    steps
}

/// Totals and payoff date of a schedule
///
/// `payoff_date` is only set when the final balance is actually paid off;
/// a schedule that merely ran out of iterations has none.
pub fn summarize_schedule(steps: &[AmortizationStep]) -> ScheduleSummary {
    let total_paid: f64 = steps.iter().map(|s| s.payment).sum();
    let total_interest: f64 = steps.iter().map(|s| s.interest).sum();
    let total_principal: f64 = steps.iter().map(|s| s.principal).sum();
    let final_balance = steps.last().map(|s| s.remaining_balance).unwrap_or(0.0);
    let payoff_date = steps
        .last()
        .filter(|s| s.remaining_balance <= PAID_OFF_EPSILON)
        .map(|s| s.date);

    ScheduleSummary {
        payments: steps.len(),
        total_paid,
        total_interest,
        total_principal,
        payoff_date,
        final_balance,
    }
}

/// Breakdown of the next payment on a loan, `None` once paid off
pub fn next_loan_payment(loan: &LoanConfig) -> Option<PaymentBreakdown> {
    if loan.current_balance <= PAID_OFF_EPSILON {
        return None;
    }
    let interest = loan.current_balance * monthly_rate(loan.annual_rate);
    let principal = (loan.monthly_payment - interest)
        .max(0.0)
        .min(loan.current_balance);
    Some(PaymentBreakdown {
        payment_number: loan.payments_made + 1,
        principal_paid: principal,
        interest_paid: interest,
    })
}
