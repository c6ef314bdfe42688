//! Financial summary for external text-generation consumers
//!
//! Collects everything an advice writer needs into one value and renders it as
//! plain text blocks or as template variables.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::balance::{
    get_bill_coverage_report, get_runway, project_monthly_cash_flow, BillCoverageReport,
    CashFlowLine, MonthlyCashFlow, Runway,
};
use crate::config::EngineConfig;
use crate::health::{calculate_health_score, HealthPeriod, HealthScore};
use crate::models::{ExpenseRule, IncomeSource, Transaction, UserProfile};

/// Limit on list lengths in rendered output
const MAX_LISTED: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct FinancialSummary {
    pub as_of: NaiveDate,
    pub current_balance: f64,
    pub cash_flow: MonthlyCashFlow,
    pub coverage: BillCoverageReport,
    pub coverage_days: i64,
    pub runway: Runway,
    pub health: HealthScore,
}

impl FinancialSummary {
    pub fn assemble(
        profile: &UserProfile,
        transactions: &[Transaction],
        income_sources: &[IncomeSource],
        expense_rules: &[ExpenseRule],
        config: &EngineConfig,
        today: NaiveDate,
    ) -> Self {
        let balance = profile.current_balance;
        Self {
            as_of: today,
            current_balance: balance,
            cash_flow: project_monthly_cash_flow(income_sources, expense_rules),
            coverage: get_bill_coverage_report(balance, transactions, config.coverage_days, today),
            coverage_days: config.coverage_days,
            runway: get_runway(balance, transactions, config.runway_days, today),
            health: calculate_health_score(
                balance,
                transactions,
                HealthPeriod::ending(today, config.health_period_days),
                today,
                &config.health_weights,
            ),
        }
    }

    fn format_lines(lines: &[CashFlowLine]) -> String {
        if lines.is_empty() {
            return "(none)".to_string();
        }
        lines
            .iter()
            .take(MAX_LISTED)
            .map(|l| {
                format!(
                    "- {}: {:.2} {} ({:.2}/month)",
                    l.name, l.amount, l.frequency, l.monthly_amount
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_bills(&self) -> String {
        if self.coverage.bills.is_empty() {
            return "(none)".to_string();
        }
        self.coverage
            .bills
            .iter()
            .take(MAX_LISTED)
            .map(|b| {
                let flag = if b.can_cover {
                    String::new()
                } else {
                    format!(" [short by {:.2}]", b.shortfall)
                };
                format!("- {} {}: {:.2}{}", b.date, b.name, b.amount, flag)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_runway(&self) -> String {
        match self.runway.run_out_date {
            Some(date) => format!("{} days (runs out {})", self.runway.days, date),
            None => format!("more than {} days", self.runway.days),
        }
    }

    /// Values for prompt templates
    pub fn to_template_vars(&self) -> HashMap<&'static str, String> {
        let mut vars = HashMap::new();

        vars.insert("as_of", self.as_of.to_string());
        vars.insert("current_balance", format!("{:.2}", self.current_balance));
        vars.insert("monthly_income", format!("{:.2}", self.cash_flow.monthly_income));
        vars.insert("monthly_expenses", format!("{:.2}", self.cash_flow.monthly_expenses));
        vars.insert("monthly_net", format!("{:.2}", self.cash_flow.net));
        vars.insert("income_list", Self::format_lines(&self.cash_flow.income));
        vars.insert("expense_list", Self::format_lines(&self.cash_flow.expenses));
        vars.insert("upcoming_bills", self.format_bills());
        vars.insert("coverage_days", self.coverage_days.to_string());
        vars.insert("can_cover_all", self.coverage.can_cover_all.to_string());
        vars.insert("runway", self.format_runway());
        vars.insert("health_score", format!("{:.0}", self.health.score));
        vars.insert("health_grade", self.health.grade.to_string());

        if let Some(ref shortfall) = self.coverage.first_shortfall {
            vars.insert(
                "first_shortfall",
                format!(
                    "{} on {} is short by {:.2}",
                    shortfall.name, shortfall.date, shortfall.shortfall
                ),
            );
        }

        if !self.health.insights.is_empty() {
            vars.insert(
                "insights",
                self.health
                    .insights
                    .iter()
                    .map(|i| format!("- {}", i))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }

        vars
    }

    /// Plain-text summary, one block per topic
    pub fn render(&self) -> String {
        let vars = self.to_template_vars();
        let get = |key: &str| vars.get(key).cloned().unwrap_or_default();

        let mut bills = format!(
            "## Upcoming bills (next {} days)\n{}",
            get("coverage_days"),
            get("upcoming_bills")
        );
        if let Some(shortfall) = vars.get("first_shortfall") {
            bills.push_str(&format!("\nFirst shortfall: {}", shortfall));
        }

        let mut health = format!("## Health: {} ({})", get("health_score"), get("health_grade"));
        if let Some(insights) = vars.get("insights") {
            health.push('\n');
            health.push_str(insights);
        }

        let blocks = [
            format!(
                "## Balance (as of {})\nCurrent balance: {}",
                get("as_of"),
                get("current_balance")
            ),
            format!(
                "## Monthly cash flow\nIncome {} / Expenses {} / Net {}",
                get("monthly_income"),
                get("monthly_expenses"),
                get("monthly_net")
            ),
            format!("## Income\n{}", get("income_list")),
            format!("## Expenses\n{}", get("expense_list")),
            bills,
            format!("## Runway (until the balance reaches zero)\n{}", get("runway")),
            health,
        ];

        let mut out = blocks.join("\n\n");
        out.push('\n');
        out
    }
}
