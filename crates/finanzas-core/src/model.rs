// Domain records mirrored from the hosted database tables.
//
// Rows arrive as PostgREST JSON (or from the local SQLite store) and are
// deserialized leniently: numeric columns may come back as JSON strings,
// identifiers may be integers or UUIDs, and nullable columns are tolerated.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected user input for a new record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Por favor completa todos los campos requeridos")]
    MissingFields,

    #[error("Monto inválido: {0}")]
    InvalidAmount(String),

    #[error("Fecha inválida: {0}")]
    InvalidDate(String),
}

// ---------------------------------------------------------------------------
// TransactionKind
// ---------------------------------------------------------------------------

/// Direction of a transaction. Amounts are stored positive; the kind carries
/// the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    /// Multiplier applied to the stored amount when computing a balance.
    pub fn sign(self) -> f64 {
        match self {
            TransactionKind::Income => 1.0,
            TransactionKind::Expense => -1.0,
        }
    }

    /// Wire representation used by the `type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TransactionKind::Income => "Ingreso",
            TransactionKind::Expense => "Gasto",
        }
    }

    pub fn symbol(self) -> char {
        match self {
            TransactionKind::Income => '+',
            TransactionKind::Expense => '-',
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            TransactionKind::Income => TransactionKind::Expense,
            TransactionKind::Expense => TransactionKind::Income,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(TransactionKind::Income),
            "expense" => Some(TransactionKind::Expense),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// A persisted income or expense record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(deserialize_with = "de_amount")]
    pub amount: f64,
    #[serde(default, deserialize_with = "de_null_default")]
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// The booking date, falling back to the creation timestamp's date.
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.date.or_else(|| self.created_at.map(|ts| ts.date_naive()))
    }

    /// Amount with the kind's sign applied.
    pub fn signed_amount(&self) -> f64 {
        self.kind.sign() * self.amount
    }

    pub fn is_income(&self) -> bool {
        self.kind == TransactionKind::Income
    }

    pub fn is_expense(&self) -> bool {
        self.kind == TransactionKind::Expense
    }

    /// Description for display, with the placeholder used across the app.
    pub fn description_or_default(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => "Sin descripción",
        }
    }
}

/// A transaction as entered by the user, before the backend assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTransaction {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub date: NaiveDate,
}

impl NewTransaction {
    /// Check the fields the form requires. Amount must be a positive finite
    /// number and the category must be non-blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.category.trim().is_empty() {
            return Err(ValidationError::MissingFields);
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ValidationError::InvalidAmount(self.amount.to_string()));
        }
        Ok(())
    }

    /// Normalize whitespace: trimmed category, blank descriptions dropped.
    pub fn normalized(mut self) -> Self {
        self.category = self.category.trim().to_string();
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self
    }
}

// ---------------------------------------------------------------------------
// Balance snapshot
// ---------------------------------------------------------------------------

/// Row of the `user_balance` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: String,
    #[serde(deserialize_with = "de_amount")]
    pub balance: f64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Row of the `custom_categories` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCategory {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_income: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl CustomCategory {
    pub fn kind(&self) -> TransactionKind {
        if self.is_income {
            TransactionKind::Income
        } else {
            TransactionKind::Expense
        }
    }
}

pub const DEFAULT_CATEGORY_COLOR: &str = "#3B82F6";

/// Insert payload for a custom category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCustomCategory {
    pub name: String,
    pub is_income: bool,
    pub color: String,
    pub icon: String,
}

impl NewCustomCategory {
    pub fn new(kind: TransactionKind, name: &str) -> Self {
        let icon = match kind {
            TransactionKind::Income => "💰",
            TransactionKind::Expense => "💸",
        };
        NewCustomCategory {
            name: name.trim().to_string(),
            is_income: kind == TransactionKind::Income,
            color: DEFAULT_CATEGORY_COLOR.to_string(),
            icon: icon.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Savings goals
// ---------------------------------------------------------------------------

/// Row of the `goal_contributions` table, embedded under its goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalContribution {
    #[serde(deserialize_with = "de_amount")]
    pub amount: f64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Row of the `savings_goals` table with its contributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsGoal {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(alias = "name", default, deserialize_with = "de_null_default")]
    pub title: String,
    #[serde(deserialize_with = "de_amount")]
    pub target_amount: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "goal_contributions",
        default,
        deserialize_with = "de_null_default"
    )]
    pub contributions: Vec<GoalContribution>,
}

impl SavingsGoal {
    pub fn total_contributed(&self) -> f64 {
        self.contributions.iter().map(|c| c.amount).sum()
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Authenticated user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Lenient deserialization helpers
// ---------------------------------------------------------------------------

/// Replace NaN and infinities with zero.
pub fn sanitize_amount(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Text(String),
}

impl From<IdRepr> for String {
    fn from(id: IdRepr) -> String {
        match id {
            IdRepr::Int(n) => n.to_string(),
            IdRepr::Text(s) => s,
        }
    }
}

fn de_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NumberOrText>::deserialize(deserializer)?;
    Ok(match raw {
        Some(NumberOrText::Number(n)) => sanitize_amount(n),
        Some(NumberOrText::Text(s)) => s.trim().parse::<f64>().map(sanitize_amount).unwrap_or(0.0),
        None => 0.0,
    })
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    IdRepr::deserialize(deserializer).map(String::from)
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<IdRepr>::deserialize(deserializer)?.map(String::from))
}

fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_from_postgrest_row() {
        let json = r#"{
            "id": 17,
            "user_id": "u-1",
            "type": "expense",
            "amount": "12500.00",
            "category": "Alimentación",
            "description": null,
            "date": "2026-10-03",
            "created_at": "2026-10-03T14:22:10.123456+00:00"
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.id, "17");
        assert_eq!(tx.kind, TransactionKind::Expense);
        assert!((tx.amount - 12500.0).abs() < f64::EPSILON);
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2026, 10, 3));
        assert_eq!(tx.description_or_default(), "Sin descripción");
        assert!((tx.signed_amount() + 12500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn transaction_uuid_id_and_numeric_amount() {
        let json = r#"{
            "id": "6f1c2a9e-0000-4000-8000-000000000001",
            "type": "income",
            "amount": 800000,
            "category": "Salario"
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.id, "6f1c2a9e-0000-4000-8000-000000000001");
        assert!(tx.is_income());
        assert!(tx.user_id.is_none());
        assert!(tx.effective_date().is_none());
    }

    #[test]
    fn unparseable_amount_becomes_zero() {
        let json = r#"{ "id": 1, "type": "income", "amount": "abc", "category": "Bonos" }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.amount, 0.0);
    }

    #[test]
    fn effective_date_falls_back_to_created_at() {
        let json = r#"{
            "id": 2, "type": "expense", "amount": 10, "category": "Otros",
            "date": null, "created_at": "2026-09-30T23:59:00Z"
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.effective_date(), NaiveDate::from_ymd_opt(2026, 9, 30));
    }

    #[test]
    fn new_transaction_validation() {
        let mut tx = NewTransaction {
            kind: TransactionKind::Expense,
            amount: 1500.0,
            category: "Transporte".into(),
            description: Some("  ".into()),
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        };
        assert!(tx.validate().is_ok());
        assert_eq!(tx.clone().normalized().description, None);

        tx.category = "   ".into();
        assert_eq!(tx.validate(), Err(ValidationError::MissingFields));

        tx.category = "Transporte".into();
        tx.amount = 0.0;
        assert!(matches!(tx.validate(), Err(ValidationError::InvalidAmount(_))));
        tx.amount = f64::NAN;
        assert!(matches!(tx.validate(), Err(ValidationError::InvalidAmount(_))));
    }

    #[test]
    fn new_transaction_serializes_type_column() {
        let tx = NewTransaction {
            kind: TransactionKind::Income,
            amount: 10.0,
            category: "Bonos".into(),
            description: None,
            date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        };
        let v = serde_json::to_value(&tx).unwrap();
        assert_eq!(v["type"], "income");
        assert_eq!(v["date"], "2026-01-02");
    }

    #[test]
    fn savings_goal_with_embedded_contributions() {
        let json = r#"{
            "id": 3,
            "user_id": "u-1",
            "title": "Vacaciones",
            "target_amount": "500000",
            "goal_contributions": [
                { "amount": 100000, "date": "2026-08-01" },
                { "amount": "50000", "date": null }
            ]
        }"#;
        let goal: SavingsGoal = serde_json::from_str(json).unwrap();
        assert_eq!(goal.title, "Vacaciones");
        assert!((goal.total_contributed() - 150000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn savings_goal_null_contributions() {
        let json = r#"{ "id": 4, "name": "Auto", "target_amount": 1, "goal_contributions": null }"#;
        let goal: SavingsGoal = serde_json::from_str(json).unwrap();
        assert_eq!(goal.title, "Auto");
        assert!(goal.contributions.is_empty());
    }

    #[test]
    fn new_custom_category_defaults() {
        let c = NewCustomCategory::new(TransactionKind::Income, "  Arriendo ");
        assert_eq!(c.name, "Arriendo");
        assert!(c.is_income);
        assert_eq!(c.icon, "💰");
        assert_eq!(c.color, DEFAULT_CATEGORY_COLOR);
        assert_eq!(NewCustomCategory::new(TransactionKind::Expense, "x").icon, "💸");
    }

    #[test]
    fn kind_helpers() {
        assert_eq!(TransactionKind::parse("income"), Some(TransactionKind::Income));
        assert_eq!(TransactionKind::parse("other"), None);
        assert_eq!(TransactionKind::Income.toggled(), TransactionKind::Expense);
        assert_eq!(TransactionKind::Expense.symbol(), '-');
    }
}
