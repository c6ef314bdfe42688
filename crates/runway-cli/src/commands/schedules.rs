//! Loan amortization and credit card payoff commands

use anyhow::{Context, Result};
use runway_core::amortization::{
    calculate_amortization_schedule, calculate_credit_card_projection, summarize_schedule,
};
use runway_core::credit::{
    calculate_credit_card_payoff, calculate_payoff_summary, compare_payoff_scenarios,
};
use runway_core::export::export_amortization_csv;
use runway_core::{
    CreditCardProjectionConfig, CreditConfig, Database, EngineConfig, MinimumPaymentMethod,
    PaymentStrategy,
};

use super::day_or_today;

pub fn cmd_amortize(
    config: &EngineConfig,
    principal: f64,
    rate: f64,
    term: Option<u32>,
    payment: Option<f64>,
    start: Option<&str>,
    csv: bool,
) -> Result<()> {
    if term.is_none() && payment.is_none() {
        anyhow::bail!("Give a --term, a --payment, or both");
    }
    let start = day_or_today(start, "start")?;
    // A payment-only loan runs until paid off, capped by config
    let term = term.or(Some(config.amortization_max_months));
    let steps = calculate_amortization_schedule(principal, rate, term, payment, start);

    if csv {
        print!("{}", export_amortization_csv(&steps)?);
        return Ok(());
    }

    let summary = summarize_schedule(&steps);

    println!();
    println!("🏦 Amortization: ${:.2} at {:.2}%", principal, rate);
    println!("   ─────────────────────────────────────────────────────────────");
    println!("     #  │ Date       │   Payment │ Principal │  Interest │    Balance");
    for step in &steps {
        println!(
            "   {:>4} │ {} │ {:>9.2} │ {:>9.2} │ {:>9.2} │ {:>10.2}",
            step.payment_number,
            step.date,
            step.payment,
            step.principal,
            step.interest,
            step.remaining_balance
        );
    }
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   {} payments, ${:.2} total, ${:.2} interest",
        summary.payments, summary.total_paid, summary.total_interest
    );
    match summary.payoff_date {
        Some(date) => println!("   ✅ Paid off {}", date),
        None => println!(
            "   ⚠️  Not paid off, ${:.2} still owed",
            summary.final_balance
        ),
    }
    Ok(())
}

/// Card parameters given on the command line
pub struct CardArgs<'a> {
    pub rule: Option<&'a str>,
    pub balance: Option<f64>,
    pub apr: f64,
    pub limit: f64,
    pub min_percent: f64,
    pub min_floor: f64,
    pub method: &'a str,
    pub fixed: Option<f64>,
}

/// Card from an expense rule, or from explicit arguments
fn resolve_card(db: &Database, args: &CardArgs) -> Result<CreditConfig> {
    if let Some(rule_id) = args.rule {
        let rule = db
            .get_expense_rule(rule_id)?
            .with_context(|| format!("Expense rule {} not found", rule_id))?;
        let mut card = rule
            .credit_config
            .with_context(|| format!("Expense rule {} has no credit card", rule_id))?;
        if let Some(fixed) = args.fixed {
            card.payment_strategy = PaymentStrategy::Fixed;
            card.fixed_payment_amount = Some(fixed);
        }
        return Ok(card);
    }

    let balance = args
        .balance
        .context("Give --balance or --rule")?;
    let method: MinimumPaymentMethod = args.method.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    Ok(CreditConfig {
        current_balance: balance,
        credit_limit: args.limit,
        apr: args.apr,
        minimum_payment_percent: args.min_percent,
        minimum_payment_floor: args.min_floor,
        minimum_payment_method: method,
        payment_strategy: if args.fixed.is_some() {
            PaymentStrategy::Fixed
        } else {
            PaymentStrategy::Minimum
        },
        fixed_payment_amount: args.fixed,
        due_day: None,
    })
}

pub fn cmd_payoff(
    db: &Database,
    config: &EngineConfig,
    args: CardArgs,
    projection: bool,
    json: bool,
) -> Result<()> {
    let card = resolve_card(db, &args)?;
    let start = runway_core::dates::today();
    let summary = calculate_payoff_summary(&card, start);
    let scenarios = compare_payoff_scenarios(&card, start);

    if json {
        let value = serde_json::json!({
            "summary": summary,
            "scenarios": scenarios,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("💳 Credit Card Payoff");
    println!("   ─────────────────────────────────────────────");
    println!("   Balance:          ${:.2}", summary.current_balance);
    if card.credit_limit > 0.0 {
        println!("   Utilization:      {:.1}%", summary.utilization * 100.0);
    }
    println!("   Monthly interest: ${:.2}", summary.current_monthly_interest);
    println!("   Minimum payment:  ${:.2}", summary.minimum_payment);
    println!("   Paying:           ${:.2}/month", summary.effective_payment);
    println!();

    match (summary.payoff_date, summary.months_to_payoff) {
        (Some(date), Some(months)) => {
            println!("   ✅ Paid off {} ({} months)", date, months);
            println!(
                "   Total paid ${:.2}, interest ${:.2}",
                summary.total_amount_paid, summary.total_interest_paid
            );
        }
        _ => println!("   ⚠️  At this payment the card is never paid off"),
    }
    if summary.is_minimum_payment_trap {
        println!("   🪤 Minimum-payment trap: the payment barely covers interest");
    }

    if !scenarios.is_empty() {
        println!();
        println!("   Faster options:");
        for scenario in &scenarios {
            let saved_months = scenario
                .months_saved
                .map(|m| format!(", {} months sooner", m))
                .unwrap_or_default();
            println!(
                "   • {:<22} ${:>9.2}/month → {} months, saves ${:.2}{}",
                scenario.name,
                scenario.monthly_payment,
                scenario.months_to_payoff,
                scenario.interest_saved,
                saved_months
            );
        }
    }

    if projection {
        let steps = calculate_credit_card_projection(&CreditCardProjectionConfig {
            balance: card.current_balance,
            apr: card.apr,
            min_payment_percent: card.minimum_payment_percent,
            min_payment_floor: card.minimum_payment_floor,
            min_payment_method: card.minimum_payment_method,
            start_date: start,
            due_day: card.due_day,
            max_months: config.amortization_max_months,
        });
        let total = summarize_schedule(&steps);
        println!();
        println!("   Minimum-payment projection:");
        for step in steps.iter().take(24) {
            println!(
                "   {:>4} │ {} │ {:>9.2} │ {:>9.2} interest │ {:>10.2}",
                step.payment_number, step.date, step.payment, step.interest, step.remaining_balance
            );
        }
        if steps.len() > 24 {
            println!("   ... {} more months", steps.len() - 24);
        }
        println!(
            "   {} payments, ${:.2} interest",
            total.payments, total.total_interest
        );
    } else if summary.payoff_date.is_none() {
        // Show how far the configured horizon gets
        let schedule = calculate_credit_card_payoff(
            card.current_balance,
            card.apr,
            summary.effective_payment,
            start,
            config.credit_max_months,
        );
        if let Some(last) = schedule.last() {
            println!(
                "   After {} months: ${:.2} still owed, ${:.2} interest paid",
                last.month, last.remaining_balance, last.cumulative_interest
            );
        }
    }
    Ok(())
}
