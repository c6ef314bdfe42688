//! Transaction command implementations (add, list, complete, skip, partial, reconcile)

use anyhow::{Context, Result};
use runway_core::dates::today;
use runway_core::{
    Database, EngineConfig, NewTransaction, SortOrder, SourceType, Transaction, TransactionQuery,
    TransactionStatus, TransactionType,
};

use super::{day_or_today, open_ledger, parse_day, resolve_range, truncate};

/// Arguments of `runway add`
pub struct AddArgs<'a> {
    pub name: &'a str,
    pub amount: f64,
    pub tx_type: &'a str,
    pub date: Option<&'a str>,
    pub category: Option<&'a str>,
    pub status: &'a str,
    pub rule: Option<&'a str>,
}

fn format_amount(tx: &Transaction) -> String {
    let amount = tx.effective_amount();
    if tx.is_outflow() {
        format!("\x1b[31m-${:.2}\x1b[0m", amount) // Red for outflows
    } else {
        format!("\x1b[32m+${:.2}\x1b[0m", amount) // Green for income
    }
}

pub fn cmd_add(db: &Database, config: &EngineConfig, user: &str, args: AddArgs) -> Result<Transaction> {
    let tx_type: TransactionType = args.tx_type.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let status: TransactionStatus = args.status.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    if !status.is_open() {
        anyhow::bail!("New transactions must be projected or pending (use 'runway complete' afterwards)");
    }
    let date = day_or_today(args.date, "date")?;

    let mut new = NewTransaction::new(user, args.name, tx_type, args.amount, date).with_status(status);
    if let Some(category) = args.category {
        new = new.with_category(category);
    }
    if let Some(rule_id) = args.rule {
        let rule = db
            .get_expense_rule(rule_id)?
            .ok_or_else(|| anyhow::anyhow!("Expense rule {} not found", rule_id))?;
        new = new.with_source(SourceType::ExpenseRule, &rule.id);
        if let Some(breakdown) = rule
            .loan_config
            .as_ref()
            .and_then(runway_core::amortization::next_loan_payment)
        {
            new = new.with_payment_breakdown(breakdown);
        }
    }

    let ledger = open_ledger(db, config);
    let tx = ledger
        .create_transaction(new)
        .context("Failed to add transaction")?;

    println!("✅ Scheduled {} ({}) ${:.2} on {}", tx.name, tx.tx_type, tx.projected_amount, tx.scheduled_date);
    println!("   ID: {}", tx.id);
    Ok(tx)
}

/// Arguments of `runway list`
pub struct ListArgs<'a> {
    pub status: Option<&'a str>,
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub desc: bool,
    pub limit: usize,
    pub json: bool,
}

pub fn cmd_list(db: &Database, user: &str, args: ListArgs) -> Result<()> {
    let mut query = TransactionQuery::for_user(user)
        .date_range(resolve_range(args.from, args.to, 30)?)
        .limit(Some(args.limit));
    if args.desc {
        query = query.order(SortOrder::Descending);
    }
    if let Some(statuses) = args.status {
        let statuses = statuses
            .split(',')
            .map(|s| s.trim().parse::<TransactionStatus>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!(e))?;
        query = query.statuses(&statuses);
    }

    let transactions = db.query_transactions(&query)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        println!("No transactions found. Schedule one with:");
        println!("  runway add Rent 1200 --type bill --date 2024-07-01");
        return Ok(());
    }

    let total = db.count_transactions(&query)?;

    println!();
    println!("📝 Transactions ({} of {})", transactions.len(), total);
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in &transactions {
        println!(
            "   {} │ {:>9} │ {:>12} │ {} [{}]",
            tx.scheduled_date,
            tx.status.as_str(),
            format_amount(tx),
            truncate(&tx.name, 32),
            tx.id
        );
    }

    Ok(())
}

pub fn cmd_complete(
    db: &Database,
    config: &EngineConfig,
    id: &str,
    amount: Option<f64>,
    date: Option<&str>,
    notes: Option<String>,
) -> Result<()> {
    let ledger = open_ledger(db, config);
    let tx = db
        .get_transaction(id)?
        .ok_or_else(|| anyhow::anyhow!("Transaction {} not found", id))?;
    let amount = amount.unwrap_or(tx.projected_amount);
    let date = parse_day(date, "date")?;

    let outcome = ledger
        .complete(id, amount, date, notes)
        .context("Failed to complete transaction")?;

    println!("✅ Completed {} for ${:.2}", outcome.transaction.name, amount);
    if let Some(variance) = outcome.transaction.variance {
        if variance.abs() >= 0.005 {
            println!("   Variance: {:+.2} vs projected", variance);
        }
    }
    if !outcome.removed_remainders.is_empty() {
        println!("   Removed {} pending remainder(s)", outcome.removed_remainders.len());
    }
    println!(
        "   Balance: ${:.2} ({:+.2})",
        outcome.new_balance, outcome.balance_delta
    );
    Ok(())
}

pub fn cmd_skip(db: &Database, config: &EngineConfig, id: &str, notes: Option<String>) -> Result<()> {
    let ledger = open_ledger(db, config);
    let tx = ledger.skip(id, notes).context("Failed to skip transaction")?;
    println!("⏭️  Skipped {} ({})", tx.name, tx.scheduled_date);
    Ok(())
}

pub fn cmd_partial(
    db: &Database,
    config: &EngineConfig,
    id: &str,
    amount: f64,
    notes: Option<String>,
) -> Result<()> {
    let ledger = open_ledger(db, config);
    let payment = ledger
        .partial_pay(id, amount, notes)
        .context("Failed to record partial payment")?;

    println!("💸 Paid ${:.2} of {}", amount, payment.transaction.name);
    println!(
        "   Remaining ${:.2} scheduled for {} (ID: {})",
        payment.remainder.projected_amount, payment.remainder.scheduled_date, payment.remainder.id
    );
    println!(
        "   Balance: ${:.2} ({:+.2})",
        payment.new_balance, payment.balance_delta
    );
    Ok(())
}

pub fn cmd_reconcile(db: &Database, config: &EngineConfig, user: &str, fix: bool) -> Result<()> {
    let ledger = open_ledger(db, config);
    let report = ledger.reconcile(user).context("Failed to reconcile")?;

    println!();
    println!("🧮 Reconciliation for {} ({})", report.user_id, today());
    println!("   ─────────────────────────────");
    println!("   Starting balance:   ${:.2}", report.initial_balance);
    println!("   Realized entries:   {}", report.realized_count);
    println!("   Computed balance:   ${:.2}", report.computed_balance);
    println!("   Cached balance:     ${:.2}", report.cached_balance);

    if report.in_sync {
        println!();
        println!("✅ Balance is in sync");
    } else if fix {
        let profile = ledger.sync_balance(user)?;
        println!();
        println!("🔧 Drift of {:+.2} corrected, balance is now ${:.2}", report.drift, profile.current_balance);
    } else {
        println!();
        println!("⚠️  Drift of {:+.2}. Run 'runway reconcile --fix' to correct it.", report.drift);
    }
    Ok(())
}
