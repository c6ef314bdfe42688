//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - init, profile and shared utilities (open_db, load_config, dates)
//! - `transactions` - add, list, complete, skip, partial, reconcile
//! - `rules` - income sources and expense rules
//! - `reports` - balances, coverage, runway, crunch, health, variance, categories, monthly, summary
//! - `schedules` - loan amortization and credit card payoff
//! - `export` - CSV/JSON export

pub mod core;
pub mod export;
pub mod reports;
pub mod rules;
pub mod schedules;
pub mod transactions;

// Re-export command functions for main.rs
pub use self::core::*;
pub use export::*;
pub use reports::*;
pub use rules::*;
pub use schedules::*;
pub use transactions::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
