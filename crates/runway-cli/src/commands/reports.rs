//! Report command implementations
//!
//! Every report loads the user's profile and transactions, then hands them to
//! the pure analysis functions in `runway_core::balance` / `health` / `summary`.

use anyhow::{Context, Result};
use chrono::Datelike;
use runway_core::balance::{
    calculate_daily_balances, calculate_monthly_totals, calculate_variance_report,
    get_bill_coverage_report, get_category_breakdown, get_next_crunch, get_runway,
};
use runway_core::dates::{add_days, today};
use runway_core::health::calculate_health_score;
use runway_core::{
    BalanceStatus, CategoryKind, Database, EngineConfig, FinancialSummary, HealthPeriod,
    UserProfile,
};

use super::{load_transactions, parse_day, resolve_range, truncate};

pub fn load_profile(db: &Database, user: &str) -> Result<UserProfile> {
    db.get_profile(user)?
        .with_context(|| format!("No profile for user '{}' (run 'runway init')", user))
}

fn status_icon(status: BalanceStatus) -> &'static str {
    match status {
        BalanceStatus::Safe => "🟢",
        BalanceStatus::Warning => "🟡",
        BalanceStatus::Danger => "🔴",
    }
}

pub fn cmd_balances(
    db: &Database,
    config: &EngineConfig,
    user: &str,
    from: Option<&str>,
    to: Option<&str>,
    json: bool,
) -> Result<()> {
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

    if json {
        let days: Vec<_> = days.values().collect();
        println!("{}", serde_json::to_string_pretty(&days)?);
        return Ok(());
    }

    println!();
    println!("📅 Daily Balances ({} to {})", start, end);
    println!("   ─────────────────────────────────────────────────────────────");
    for day in days.values() {
        let names = day
            .transactions
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "   {} {} │ ${:>10.2} │ +{:>8.2} -{:>8.2} │ {}",
            status_icon(day.status),
            day.date,
            day.closing_balance,
            day.total_income,
            day.total_expenses,
            truncate(&names, 40)
        );
    }
    Ok(())
}

pub fn cmd_coverage(
    db: &Database,
    config: &EngineConfig,
    user: &str,
    days: Option<i64>,
    json: bool,
) -> Result<()> {
    let profile = load_profile(db, user)?;
    let days = days.unwrap_or(config.coverage_days);
    let transactions = load_transactions(db, user, None)?;
    let report = get_bill_coverage_report(profile.current_balance, &transactions, days, today());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("🧾 Bill Coverage (next {} days)", days);
    println!("   ─────────────────────────────────────────────");
    println!("   Starting balance: ${:.2}", report.starting_balance);
    println!("   Income expected:  ${:.2}", report.total_income);
    println!("   Bills due:        ${:.2}", report.total_upcoming);
    println!("   Projected:        ${:.2}", report.projected_balance);
    println!();

    if report.bills.is_empty() {
        println!("   No bills due.");
    }
    for bill in &report.bills {
        let mark = if bill.can_cover { "✓" } else { "✗" };
        println!(
            "   {} {} │ ${:>9.2} │ after ${:>10.2} │ {}",
            mark,
            bill.date,
            bill.amount,
            bill.balance_after,
            truncate(&bill.name, 30)
        );
    }

    println!();
    match report.first_shortfall {
        Some(ref shortfall) => println!(
            "⚠️  {} bill(s) at risk. First: {} on {} is short by ${:.2}",
            report.bills_at_risk.len(),
            shortfall.name,
            shortfall.date,
            shortfall.shortfall
        ),
        None => println!("✅ Every bill is covered"),
    }
    Ok(())
}

pub fn cmd_runway(db: &Database, config: &EngineConfig, user: &str, days: Option<i64>) -> Result<()> {
    let profile = load_profile(db, user)?;
    let days = days.unwrap_or(config.runway_days);
    let transactions = load_transactions(db, user, None)?;
    let runway = get_runway(profile.current_balance, &transactions, days, today());

    println!();
    println!("🛫 Runway");
    println!("   ─────────────────────────────");
    println!("   Current balance: ${:.2}", profile.current_balance);
    match runway.run_out_date {
        Some(date) => println!("   ⚠️  Money runs out in {} days ({})", runway.days, date),
        None => println!("   ✅ Balance stays positive for at least {} days", runway.days),
    }
    Ok(())
}

pub fn cmd_crunch(db: &Database, config: &EngineConfig, user: &str, days: Option<i64>) -> Result<()> {
    let profile = load_profile(db, user)?;
    let days = days.unwrap_or(config.crunch_days);
    let transactions = load_transactions(db, user, None)?;

    println!();
    println!("🗜️  Next Crunch (next {} days)", days);
    println!("   ─────────────────────────────");
    match get_next_crunch(profile.current_balance, &transactions, days, today()) {
        Some(crunch) => {
            println!("   Date:      {}", crunch.date);
            println!("   Expenses:  ${:.2}", crunch.expenses);
            println!("   Balance:   ${:.2}", crunch.balance);
            println!("   Shortfall: ${:.2}", crunch.shortfall);
        }
        None => println!("   ✅ No crunch ahead"),
    }
    Ok(())
}

pub fn cmd_health(db: &Database, config: &EngineConfig, user: &str, json: bool) -> Result<()> {
    let profile = load_profile(db, user)?;
    let transactions = load_transactions(db, user, None)?;
    let today = today();
    let health = calculate_health_score(
        profile.current_balance,
        &transactions,
        HealthPeriod::ending(today, config.health_period_days),
        today,
        &config.health_weights,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    println!();
    println!("❤️  Financial Health: {:.0}/100 ({})", health.score, health.grade);
    println!("   ─────────────────────────────────────────────");
    println!(
        "   Runway:  {:>5.1}  ({} days)",
        health.runway.score, health.runway.days
    );
    println!(
        "   Savings: {:>5.1}  ({:.1}% of income)",
        health.savings.score,
        health.savings.rate * 100.0
    );
    println!(
        "   Bills:   {:>5.1}  ({} of {} on time)",
        health.bills.score, health.bills.on_time, health.bills.total
    );
    println!(
        "   Trend:   {:>5.1}  ({})",
        health.trend.score,
        health.trend.direction.as_str()
    );

    if !health.insights.is_empty() {
        println!();
        for insight in &health.insights {
            println!("   💡 {}", insight);
        }
    }
    Ok(())
}

pub fn cmd_variance(db: &Database, user: &str, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let transactions = load_transactions(db, user, resolve_range(from, to, 30)?)?;
    let report = calculate_variance_report(&transactions);

    if report.items.is_empty() {
        println!("No completed transactions to compare.");
        return Ok(());
    }

    println!();
    println!("📏 Projected vs Actual");
    println!("   ─────────────────────────────────────────────────────────────");
    for item in &report.items {
        let percent = item
            .variance_percent
            .map(|p| format!("{:+.1}%", p))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "   {:<28} │ ${:>9.2} → ${:>9.2} │ {:+9.2} ({})",
            truncate(&item.name, 28),
            item.projected_amount,
            item.actual_amount,
            item.variance,
            percent
        );
    }
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   Total: ${:.2} projected, ${:.2} actual ({:+.2}, {:+.1}%)",
        report.total_projected, report.total_actual, report.total_variance, report.variance_percent
    );
    println!(
        "   Over budget: {}   Under budget: {}",
        report.over_budget_count, report.under_budget_count
    );
    Ok(())
}

pub fn cmd_categories(
    db: &Database,
    user: &str,
    kind: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let kind: CategoryKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let transactions = load_transactions(db, user, resolve_range(from, to, 30)?)?;
    let totals = get_category_breakdown(&transactions, kind);

    if totals.is_empty() {
        println!("No transactions to group.");
        return Ok(());
    }

    println!();
    println!("🗂️  Categories ({})", match kind {
        CategoryKind::Income => "income",
        CategoryKind::Expenses => "expenses",
    });
    println!("   ─────────────────────────────────────────────");
    for total in &totals {
        let bar_len = (total.percent / 5.0).round() as usize;
        println!(
            "   {:<20} ${:>10.2} {:>5.1}% {} ({})",
            truncate(&total.category, 20),
            total.total,
            total.percent,
            "█".repeat(bar_len),
            total.count
        );
    }
    Ok(())
}

pub fn cmd_monthly(db: &Database, user: &str, year: Option<i32>, month: Option<u32>) -> Result<()> {
    let now = today();
    let year = year.unwrap_or_else(|| now.year());
    let month = month.unwrap_or_else(|| now.month());
    let transactions = load_transactions(db, user, None)?;
    let totals = calculate_monthly_totals(&transactions, year, month)
        .context("Failed to compute monthly totals")?;

    println!();
    println!("🗓️  {}-{:02}", totals.year, totals.month);
    println!("   ─────────────────────────────────────────────");
    println!("                  Projected       Actual");
    println!(
        "   Income     ${:>10.2}  ${:>10.2}",
        totals.projected_income, totals.actual_income
    );
    println!(
        "   Expenses   ${:>10.2}  ${:>10.2}",
        totals.projected_expenses, totals.actual_expenses
    );
    println!(
        "   Net        ${:>10.2}  ${:>10.2}",
        totals.net_projected, totals.net_actual
    );
    println!();
    println!(
        "   {} completed, {} open, {} skipped ({:.0}% done)",
        totals.completed_count,
        totals.open_count,
        totals.skipped_count,
        totals.completion_rate
    );
    Ok(())
}

pub fn cmd_summary(db: &Database, config: &EngineConfig, user: &str, json: bool) -> Result<()> {
    let profile = load_profile(db, user)?;
    let transactions = load_transactions(db, user, None)?;
    let income = db.list_income_sources(user)?;
    let rules = db.list_expense_rules(user)?;
    let summary = FinancialSummary::assemble(&profile, &transactions, &income, &rules, config, today());

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary.render());
    }
    Ok(())
}
