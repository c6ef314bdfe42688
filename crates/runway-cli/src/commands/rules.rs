//! Income source and expense rule command implementations

use anyhow::{Context, Result};
use runway_core::amortization::calculate_monthly_payment;
use runway_core::{
    Database, EngineConfig, ExpenseRule, Frequency, IncomeSource, InstallmentConfig, LoanConfig,
};
use uuid::Uuid;

use super::{open_ledger, truncate};

fn parse_frequency(value: &str) -> Result<Frequency> {
    value.parse().map_err(|e: String| anyhow::anyhow!(e))
}

pub fn cmd_income_add(db: &Database, user: &str, name: &str, amount: f64, frequency: &str) -> Result<IncomeSource> {
    if !(amount.is_finite() && amount > 0.0) {
        anyhow::bail!("Amount must be positive");
    }
    let source = IncomeSource {
        id: Uuid::new_v4().to_string(),
        user_id: user.to_string(),
        name: name.to_string(),
        amount,
        frequency: parse_frequency(frequency)?,
        is_active: true,
    };
    db.upsert_income_source(&source)
        .context("Failed to save income source")?;

    println!("✅ Added income source {} (${:.2} {})", source.name, source.amount, source.frequency);
    Ok(source)
}

pub fn cmd_income_list(db: &Database, user: &str) -> Result<()> {
    let sources = db.list_income_sources(user)?;
    if sources.is_empty() {
        println!("No income sources. Add one with:");
        println!("  runway income add Salary 2500 --frequency bi-weekly");
        return Ok(());
    }

    println!();
    println!("💰 Income Sources");
    println!("   ─────────────────────────────────────────────");
    for source in &sources {
        let marker = if source.is_active { " " } else { "✗" };
        println!(
            "   {} {:<28} │ ${:>10.2} │ {}",
            marker,
            truncate(&source.name, 28),
            source.amount,
            source.frequency
        );
    }
    Ok(())
}

/// Arguments of `runway rules add`
pub struct RuleArgs<'a> {
    pub name: &'a str,
    pub amount: f64,
    pub frequency: &'a str,
    pub category: Option<&'a str>,
    pub loan_principal: Option<f64>,
    pub loan_rate: f64,
    pub loan_term: u32,
    pub installments: Option<u32>,
}

pub fn cmd_rules_add(db: &Database, user: &str, args: RuleArgs) -> Result<ExpenseRule> {
    if !(args.amount.is_finite() && args.amount > 0.0) {
        anyhow::bail!("Amount must be positive");
    }

    let loan_config = match args.loan_principal {
        Some(principal) => {
            if args.loan_term == 0 {
                anyhow::bail!("Loan term must be at least one month");
            }
            Some(LoanConfig {
                principal,
                annual_rate: args.loan_rate,
                term_months: args.loan_term,
                monthly_payment: calculate_monthly_payment(principal, args.loan_rate, args.loan_term),
                current_balance: principal,
                payments_made: 0,
            })
        }
        None => None,
    };

    let rule = ExpenseRule {
        id: Uuid::new_v4().to_string(),
        user_id: user.to_string(),
        name: args.name.to_string(),
        category: args.category.unwrap_or("uncategorized").to_string(),
        amount: loan_config
            .as_ref()
            .map(|l| l.monthly_payment)
            .unwrap_or(args.amount),
        frequency: parse_frequency(args.frequency)?,
        is_active: true,
        loan_config,
        credit_config: None,
        installment_config: args.installments.map(|total| InstallmentConfig {
            total_installments: total,
            installments_paid: 0,
        }),
    };
    db.upsert_expense_rule(&rule)
        .context("Failed to save expense rule")?;

    println!("✅ Added expense rule {} (${:.2} {})", rule.name, rule.amount, rule.frequency);
    println!("   ID: {}", rule.id);
    if let Some(ref loan) = rule.loan_config {
        println!(
            "   Loan: ${:.2} at {:.2}% over {} months",
            loan.principal, loan.annual_rate, loan.term_months
        );
    }
    Ok(rule)
}

pub fn cmd_rules_list(db: &Database, user: &str) -> Result<()> {
    let rules = db.list_expense_rules(user)?;
    if rules.is_empty() {
        println!("No expense rules. Add one with:");
        println!("  runway rules add Rent 1200 --category housing");
        return Ok(());
    }

    println!();
    println!("📋 Expense Rules");
    println!("   ─────────────────────────────────────────────────────────────");
    for rule in &rules {
        let kind = if let Some(ref loan) = rule.loan_config {
            format!("loan, ${:.2} left", loan.current_balance)
        } else if let Some(ref card) = rule.credit_config {
            format!("card, ${:.2} owed", card.current_balance)
        } else if let Some(ref plan) = rule.installment_config {
            format!("{} of {} installments paid", plan.installments_paid, plan.total_installments)
        } else {
            rule.category.clone()
        };
        println!(
            "   {:<24} │ ${:>9.2} │ {:<12} │ {}",
            truncate(&rule.name, 24),
            rule.amount,
            rule.frequency.to_string(),
            kind
        );
        println!("      {}", rule.id);
    }
    Ok(())
}

pub fn cmd_rules_delete(db: &Database, config: &EngineConfig, id: &str) -> Result<()> {
    let ledger = open_ledger(db, config);
    let removed = ledger
        .delete_expense_rule(id)
        .context("Failed to delete expense rule")?;
    println!("🗑️  Deleted rule {} and {} open transaction(s)", id, removed);
    Ok(())
}
