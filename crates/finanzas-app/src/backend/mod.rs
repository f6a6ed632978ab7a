// Backend abstraction: authentication plus row access for the five tables.
//
// `SupabaseBackend` talks to a hosted project over HTTP; `LocalBackend` keeps
// the same tables in SQLite. The app loop and the admin tool only see the
// traits defined here.

pub mod local;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use finanzas_core::config::{BackendKind, Config};
use finanzas_core::model::{
    CustomCategory, NewCustomCategory, NewTransaction, SavingsGoal, Transaction,
    TransactionKind, User, UserBalance,
};

pub use local::LocalBackend;
pub use supabase::SupabaseBackend;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("email already registered")]
    EmailTaken,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("session expired")]
    SessionExpired,

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("table {table} is not accessible: {message}")]
    TableUnavailable { table: String, message: String },

    #[error("backend returned {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Spanish text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::InvalidCredentials => "Email o contraseña incorrectos".into(),
            BackendError::EmailTaken => "Este email ya está registrado".into(),
            BackendError::NotAuthenticated | BackendError::SessionExpired => {
                "Tu sesión expiró. Inicia sesión nuevamente.".into()
            }
            BackendError::NotFound(_) => "No se encontró el registro".into(),
            BackendError::TableUnavailable { table, .. } => {
                format!("La tabla {table} no existe o no es accesible")
            }
            BackendError::Api { message, .. } => message.clone(),
            BackendError::Network(_) => {
                "No se puede conectar a la base de datos. Verifica tu conexión.".into()
            }
            BackendError::Database(_) | BackendError::Decode(_) => {
                "Error al acceder a los datos".into()
            }
            BackendError::NotConfigured(_) => {
                "No se puede conectar a la base de datos. Verifica la configuración de Supabase."
                    .into()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Authenticated session, persisted between runs by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl Session {
    /// True when the token expires within a minute of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|exp| exp <= now + Duration::seconds(60))
    }
}

/// Result of a sign-up. Hosted projects usually require email confirmation
/// before the first sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(Session),
    ConfirmationRequired { email: String },
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Transactions,
    UserBalance,
    CustomCategories,
    SavingsGoals,
    GoalContributions,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Transactions,
        Table::UserBalance,
        Table::CustomCategories,
        Table::SavingsGoals,
        Table::GoalContributions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Transactions => "transactions",
            Table::UserBalance => "user_balance",
            Table::CustomCategories => "custom_categories",
            Table::SavingsGoals => "savings_goals",
            Table::GoalContributions => "goal_contributions",
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Operations available to a signed-in user. All row operations are scoped to
/// `user_id`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short label for logs and the status bar.
    fn name(&self) -> &'static str;

    /// Install a session restored from disk (or clear it).
    fn set_session(&self, session: Option<Session>);

    fn current_session(&self) -> Option<Session>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn reset_password(&self, email: &str) -> Result<(), BackendError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError>;

    /// Transactions newest first, optionally capped at `limit`.
    async fn list_transactions(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, BackendError>;

    async fn insert_transaction(
        &self,
        user_id: &str,
        tx: &NewTransaction,
    ) -> Result<Transaction, BackendError>;

    async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<(), BackendError>;

    /// Stored balance snapshot, `None` when the row does not exist.
    async fn fetch_balance(&self, user_id: &str) -> Result<Option<UserBalance>, BackendError>;

    async fn list_custom_categories(
        &self,
        user_id: &str,
    ) -> Result<Vec<CustomCategory>, BackendError>;

    async fn insert_custom_category(
        &self,
        user_id: &str,
        category: &NewCustomCategory,
    ) -> Result<CustomCategory, BackendError>;

    async fn delete_custom_category(
        &self,
        user_id: &str,
        kind: TransactionKind,
        name: &str,
    ) -> Result<(), BackendError>;

    /// Goals newest first with their contributions embedded.
    async fn list_goals(&self, user_id: &str) -> Result<Vec<SavingsGoal>, BackendError>;
}

/// Cross-user operations for the diagnostics tool.
#[async_trait]
pub trait AdminBackend: Backend {
    /// Distinct owners of transactions, most recently active first.
    async fn transaction_owners(&self) -> Result<Vec<String>, BackendError>;

    async fn all_balances(&self) -> Result<Vec<UserBalance>, BackendError>;

    async fn insert_balance(&self, user_id: &str, balance: f64) -> Result<(), BackendError>;

    async fn update_balance(&self, user_id: &str, balance: f64) -> Result<(), BackendError>;

    async fn count_rows(&self, table: Table) -> Result<u64, BackendError>;

    async fn all_goals(&self) -> Result<Vec<SavingsGoal>, BackendError>;

    async fn all_transactions(&self) -> Result<Vec<Transaction>, BackendError>;

    /// One user's transactions, newest first, without needing their session.
    async fn user_transactions(&self, user_id: &str) -> Result<Vec<Transaction>, BackendError>;

    async fn user_balance(&self, user_id: &str) -> Result<Option<UserBalance>, BackendError>;
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Backend selected by `[backend] kind`, for the interactive app.
pub fn open_backend(config: &Config) -> Result<Arc<dyn Backend>, BackendError> {
    let backend: Arc<dyn Backend> = match config.backend.kind {
        BackendKind::Local => Arc::new(LocalBackend::open(&config.backend.local_path)?),
        BackendKind::Supabase => Arc::new(SupabaseBackend::from_config(config)?),
    };
    Ok(backend)
}

/// Same selection for the admin tool. The hosted backend only sees other
/// users' rows when a service key is configured.
pub fn open_admin_backend(config: &Config) -> Result<Arc<dyn AdminBackend>, BackendError> {
    let backend: Arc<dyn AdminBackend> = match config.backend.kind {
        BackendKind::Local => Arc::new(LocalBackend::open(&config.backend.local_path)?),
        BackendKind::Supabase => Arc::new(SupabaseBackend::from_config(config)?),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at,
            user: User {
                id: "u-1".into(),
                email: Some("ana@example.com".into()),
            },
        }
    }

    #[test]
    fn expiry_has_a_minute_of_slack() {
        let now = Utc::now();
        assert!(!session(None).is_expired(now));
        assert!(!session(Some(now + Duration::minutes(10))).is_expired(now));
        assert!(session(Some(now + Duration::seconds(30))).is_expired(now));
        assert!(session(Some(now - Duration::hours(1))).is_expired(now));
    }

    #[test]
    fn session_json_roundtrip_keeps_user() {
        let s = session(None);
        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user.id, "u-1");
    }

    #[test]
    fn user_messages_are_spanish() {
        assert_eq!(
            BackendError::InvalidCredentials.user_message(),
            "Email o contraseña incorrectos"
        );
        let api = BackendError::Api {
            status: 400,
            code: None,
            message: "duplicate key".into(),
        };
        assert_eq!(api.user_message(), "duplicate key");
        assert_eq!(Table::GoalContributions.as_str(), "goal_contributions");
    }

    #[test]
    fn backend_follows_configured_kind() {
        let mut config = Config::default();
        assert!(matches!(
            open_backend(&config),
            Err(BackendError::NotConfigured(_))
        ));

        config.backend.kind = BackendKind::Local;
        config.backend.local_path = ":memory:".into();
        assert_eq!(open_backend(&config).unwrap().name(), "local");
        assert_eq!(open_admin_backend(&config).unwrap().name(), "local");
    }
}
