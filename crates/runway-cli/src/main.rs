//! Runway CLI - Personal finance projection and balance forecasting
//!
//! Usage:
//!   runway init --balance 2500        Create the database and profile
//!   runway add Rent 1200 --type bill  Schedule a transaction
//!   runway complete <id>              Mark it paid
//!   runway runway                     Days until the money runs out

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    // Schedule math needs no database
    if let Commands::Amortize {
        principal,
        rate,
        term,
        payment,
        ref start,
        csv,
    } = cli.command
    {
        let config = commands::load_config(cli.config.as_deref())?;
        return commands::cmd_amortize(&config, principal, rate, term, payment, start.as_deref(), csv);
    }

    let config = commands::load_config(cli.config.as_deref())?;
    let db = commands::open_db(&cli.db)?;
    let user = cli.user.as_str();

    match cli.command {
        Commands::Init { balance } => commands::cmd_init(&db, user, balance),
        Commands::Profile { set_initial } => commands::cmd_profile(&db, user, set_initial),
        Commands::Add {
            name,
            amount,
            tx_type,
            date,
            category,
            status,
            rule,
        } => commands::cmd_add(
            &db,
            &config,
            user,
            commands::AddArgs {
                name: &name,
                amount,
                tx_type: &tx_type,
                date: date.as_deref(),
                category: category.as_deref(),
                status: &status,
                rule: rule.as_deref(),
            },
        )
        .map(|_| ()),
        Commands::List {
            status,
            from,
            to,
            desc,
            limit,
            json,
        } => commands::cmd_list(
            &db,
            user,
            commands::ListArgs {
                status: status.as_deref(),
                from: from.as_deref(),
                to: to.as_deref(),
                desc,
                limit,
                json,
            },
        ),
        Commands::Complete {
            id,
            amount,
            date,
            notes,
        } => commands::cmd_complete(&db, &config, &id, amount, date.as_deref(), notes),
        Commands::Skip { id, notes } => commands::cmd_skip(&db, &config, &id, notes),
        Commands::Partial { id, amount, notes } => {
            commands::cmd_partial(&db, &config, &id, amount, notes)
        }
        Commands::Reconcile { fix } => commands::cmd_reconcile(&db, &config, user, fix),
        Commands::Income { action } => match action {
            None | Some(IncomeAction::List) => commands::cmd_income_list(&db, user),
            Some(IncomeAction::Add {
                name,
                amount,
                frequency,
            }) => commands::cmd_income_add(&db, user, &name, amount, &frequency).map(|_| ()),
        },
        Commands::Rules { action } => match action {
            None | Some(RulesAction::List) => commands::cmd_rules_list(&db, user),
            Some(RulesAction::Add {
                name,
                amount,
                frequency,
                category,
                loan_principal,
                loan_rate,
                loan_term,
                installments,
            }) => commands::cmd_rules_add(
                &db,
                user,
                commands::RuleArgs {
                    name: &name,
                    amount,
                    frequency: &frequency,
                    category: category.as_deref(),
                    loan_principal,
                    loan_rate,
                    loan_term,
                    installments,
                },
            )
            .map(|_| ()),
            Some(RulesAction::Delete { id }) => commands::cmd_rules_delete(&db, &config, &id),
        },
        Commands::Balances { from, to, json } => {
            commands::cmd_balances(&db, &config, user, from.as_deref(), to.as_deref(), json)
        }
        Commands::Coverage { days, json } => commands::cmd_coverage(&db, &config, user, days, json),
        Commands::Runway { days } => commands::cmd_runway(&db, &config, user, days),
        Commands::Crunch { days } => commands::cmd_crunch(&db, &config, user, days),
        Commands::Health { json } => commands::cmd_health(&db, &config, user, json),
        Commands::Variance { from, to } => {
            commands::cmd_variance(&db, user, from.as_deref(), to.as_deref())
        }
        Commands::Categories { kind, from, to } => {
            commands::cmd_categories(&db, user, &kind, from.as_deref(), to.as_deref())
        }
        Commands::Monthly { year, month } => commands::cmd_monthly(&db, user, year, month),
        Commands::Payoff {
            rule,
            balance,
            apr,
            limit,
            min_percent,
            min_floor,
            method,
            fixed,
            projection,
            json,
        } => commands::cmd_payoff(
            &db,
            &config,
            commands::CardArgs {
                rule: rule.as_deref(),
                balance,
                apr,
                limit,
                min_percent,
                min_floor,
                method: &method,
                fixed,
            },
            projection,
            json,
        ),
        Commands::Summary { json } => commands::cmd_summary(&db, &config, user, json),
        Commands::Export {
            what,
            format,
            from,
            to,
            output,
        } => commands::cmd_export(
            &db,
            &config,
            user,
            &what,
            &format,
            from.as_deref(),
            to.as_deref(),
            output.as_deref(),
        ),
        // Handled above
        Commands::Amortize { .. } => Ok(()),
    }
}
