//! Domain models for Runway

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of cash movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Bill,
    Loan,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Bill => "bill",
            Self::Loan => "loan",
        }
    }

    /// Everything except income takes money out of the balance
    pub fn is_outflow(&self) -> bool {
        !matches!(self, Self::Income)
    }

    /// +1 for income, -1 for outflows
    pub fn sign(&self) -> f64 {
        if self.is_outflow() {
            -1.0
        } else {
            1.0
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "bill" => Ok(Self::Bill),
            "loan" => Ok(Self::Loan),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a transaction
///
/// `Projected -> Pending -> {Completed, Partial, Skipped}`. Completed and
/// partial may be resubmitted; nothing moves back to projected or pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Projected,
    Pending,
    Completed,
    Partial,
    Skipped,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projected => "projected",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Skipped => "skipped",
        }
    }

    /// Completed or partial: the transaction has touched the balance
    pub fn is_realized(&self) -> bool {
        matches!(self, Self::Completed | Self::Partial)
    }

    /// Projected or pending: still expected to happen
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Projected | Self::Pending)
    }

    pub fn all() -> &'static [TransactionStatus] {
        &[
            Self::Projected,
            Self::Pending,
            Self::Completed,
            Self::Partial,
            Self::Skipped,
        ]
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "projected" => Ok(Self::Projected),
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a transaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Manually entered
    #[default]
    Manual,
    /// Generated from a recurring income source
    IncomeSource,
    /// Generated from a recurring expense rule
    ExpenseRule,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::IncomeSource => "income_source",
            Self::ExpenseRule => "expense_rule",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "income_source" => Ok(Self::IncomeSource),
            "expense_rule" => Ok(Self::ExpenseRule),
            _ => Err(format!("Unknown source type: {}", s)),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Principal/interest split of an amortized loan payment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    pub payment_number: u32,
    pub principal_paid: f64,
    pub interest_paid: f64,
}

/// A scheduled or realized cash movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub category: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub source_id: Option<String>,
    pub projected_amount: f64,
    #[serde(default)]
    pub actual_amount: Option<f64>,
    #[serde(default)]
    pub variance: Option<f64>,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub actual_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub parent_transaction_id: Option<String>,
    #[serde(default)]
    pub payment_breakdown: Option<PaymentBreakdown>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_realized(&self) -> bool {
        self.status.is_realized()
    }

    pub fn is_outflow(&self) -> bool {
        self.tx_type.is_outflow()
    }

    /// Actual amount once realized, projected amount otherwise
    pub fn effective_amount(&self) -> f64 {
        if self.is_realized() {
            self.actual_amount.unwrap_or(self.projected_amount)
        } else {
            self.projected_amount
        }
    }

    /// Day the money moves (or is expected to move)
    pub fn effective_date(&self) -> NaiveDate {
        if self.is_realized() {
            self.actual_date.unwrap_or(self.scheduled_date)
        } else {
            self.scheduled_date
        }
    }

    /// Signed amount this transaction has contributed to the balance
    ///
    /// Zero unless completed or partial.
    pub fn balance_effect(&self) -> f64 {
        if self.is_realized() {
            self.tx_type.sign() * self.actual_amount.unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Signed effective amount, used by forward projections
    pub fn signed_amount(&self) -> f64 {
        self.tx_type.sign() * self.effective_amount()
    }
}

/// Input for a manually entered (or externally generated) transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: String,
    pub name: String,
    pub tx_type: TransactionType,
    pub category: String,
    pub projected_amount: f64,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub payment_breakdown: Option<PaymentBreakdown>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewTransaction {
    pub fn new(
        user_id: &str,
        name: &str,
        tx_type: TransactionType,
        projected_amount: f64,
        scheduled_date: NaiveDate,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: name.to_string(),
            tx_type,
            category: "uncategorized".to_string(),
            projected_amount,
            scheduled_date,
            status: TransactionStatus::Projected,
            source_type: SourceType::Manual,
            source_id: None,
            payment_breakdown: None,
            notes: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_source(mut self, source_type: SourceType, source_id: &str) -> Self {
        self.source_type = source_type;
        self.source_id = Some(source_id.to_string());
        self
    }

    pub fn with_payment_breakdown(mut self, breakdown: PaymentBreakdown) -> Self {
        self.payment_breakdown = Some(breakdown);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_amount("projected amount", self.projected_amount)?;
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Transaction name is required".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::Validation("Transaction owner is required".into()));
        }
        // Realized transactions only come out of the ledger operations
        if self.status.is_realized() {
            return Err(Error::Validation(format!(
                "New transactions cannot start as {}",
                self.status
            )));
        }
        Ok(())
    }

    /// Materialize into a stored transaction with a fresh id
    pub fn into_transaction(self) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id,
            name: self.name,
            tx_type: self.tx_type,
            category: self.category,
            source_type: self.source_type,
            source_id: self.source_id,
            projected_amount: self.projected_amount,
            actual_amount: None,
            variance: None,
            scheduled_date: self.scheduled_date,
            actual_date: None,
            completed_at: None,
            status: self.status,
            parent_transaction_id: None,
            payment_breakdown: self.payment_breakdown,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Reject NaN, infinite and negative amounts
pub fn validate_amount(label: &str, amount: f64) -> Result<()> {
    if !amount.is_finite() {
        return Err(Error::Validation(format!("{} must be a number", label)));
    }
    if amount < 0.0 {
        return Err(Error::Validation(format!(
            "{} cannot be negative (got {:.2})",
            label, amount
        )));
    }
    Ok(())
}

/// Recurrence frequency of an income source or expense rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Daily,
    Weekly,
    BiWeekly,
    SemiMonthly,
    Monthly,
    Quarterly,
    Yearly,
    OneTime,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi-weekly",
            Self::SemiMonthly => "semi-monthly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::OneTime => "one-time",
        }
    }

    /// Factor that turns one occurrence's amount into a monthly equivalent
    pub fn monthly_multiplier(&self) -> f64 {
        match self {
            Self::Daily => 365.0 / 12.0,
            Self::Weekly => 52.0 / 12.0,
            Self::BiWeekly => 26.0 / 12.0,
            Self::SemiMonthly => 2.0,
            Self::Monthly => 1.0,
            Self::Quarterly => 1.0 / 3.0,
            Self::Yearly => 1.0 / 12.0,
            Self::OneTime => 0.0,
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "bi-weekly" | "biweekly" => Ok(Self::BiWeekly),
            "semi-monthly" | "semimonthly" => Ok(Self::SemiMonthly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" | "annual" => Ok(Self::Yearly),
            "one-time" | "once" => Ok(Self::OneTime),
            _ => Err(format!("Unknown frequency: {}", s)),
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recurring income template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeSource {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub frequency: Frequency,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A recurring expense template, optionally backed by a loan, card or installment plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRule {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub amount: f64,
    pub frequency: Frequency,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub loan_config: Option<LoanConfig>,
    #[serde(default)]
    pub credit_config: Option<CreditConfig>,
    #[serde(default)]
    pub installment_config: Option<InstallmentConfig>,
}

fn default_true() -> bool {
    true
}

/// Fixed-payment amortized loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanConfig {
    pub principal: f64,
    /// Annual rate in percent (6.0 = 6%)
    pub annual_rate: f64,
    pub term_months: u32,
    pub monthly_payment: f64,
    pub current_balance: f64,
    #[serde(default)]
    pub payments_made: u32,
}

/// How a card's minimum payment is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MinimumPaymentMethod {
    /// max(floor, balance * pct)
    #[default]
    PercentOnly,
    /// max(floor, balance * pct + interest)
    PercentPlusInterest,
}

impl std::str::FromStr for MinimumPaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "percent_only" => Ok(Self::PercentOnly),
            "percent_plus_interest" => Ok(Self::PercentPlusInterest),
            _ => Err(format!("Unknown minimum payment method: {}", s)),
        }
    }
}

/// Which payment the card holder makes each month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStrategy {
    #[default]
    Minimum,
    Fixed,
    FullBalance,
}

impl std::str::FromStr for PaymentStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "minimum" => Ok(Self::Minimum),
            "fixed" => Ok(Self::Fixed),
            "full_balance" | "full" => Ok(Self::FullBalance),
            _ => Err(format!("Unknown payment strategy: {}", s)),
        }
    }
}

/// Revolving credit card state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditConfig {
    pub current_balance: f64,
    #[serde(default)]
    pub credit_limit: f64,
    /// Annual percentage rate in percent (24.0 = 24%)
    pub apr: f64,
    /// Minimum payment percent of balance (1.0 = 1%)
    pub minimum_payment_percent: f64,
    pub minimum_payment_floor: f64,
    #[serde(default)]
    pub minimum_payment_method: MinimumPaymentMethod,
    #[serde(default)]
    pub payment_strategy: PaymentStrategy,
    #[serde(default)]
    pub fixed_payment_amount: Option<f64>,
    /// Statement due day of month
    #[serde(default)]
    pub due_day: Option<u32>,
}

impl CreditConfig {
    /// Fraction of the limit in use; 0 when no limit is recorded
    pub fn utilization(&self) -> f64 {
        if self.credit_limit > 0.0 {
            self.current_balance / self.credit_limit
        } else {
            0.0
        }
    }
}

/// Fixed number of equal installments (buy-now-pay-later and similar)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentConfig {
    pub total_installments: u32,
    #[serde(default)]
    pub installments_paid: u32,
}

impl InstallmentConfig {
    pub fn remaining(&self) -> u32 {
        self.total_installments.saturating_sub(self.installments_paid)
    }
}

/// Balance-related part of a user's profile
///
/// `current_balance` is a cache. The canonical value is
/// `initial_balance + sum(realized transaction effects)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub initial_balance: f64,
    pub current_balance: f64,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: &str, initial_balance: f64) -> Self {
        Self {
            user_id: user_id.to_string(),
            initial_balance,
            current_balance: initial_balance,
            updated_at: Utc::now(),
        }
    }
}
