// SQLite backend: the hosted tables plus a local users/sessions store.
//
// The `user_balance` snapshot is recomputed inside the same SQL transaction
// as every transaction insert or delete, so it always equals the signed sum
// of the user's rows unless someone edits it directly.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use finanzas_core::model::{
    CustomCategory, GoalContribution, NewCustomCategory, NewTransaction, SavingsGoal,
    Transaction, TransactionKind, User, UserBalance,
};

use super::{AdminBackend, Backend, BackendError, Session, SignUpOutcome, Table};

const SESSION_TTL_MINUTES: i64 = 60;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id            TEXT PRIMARY KEY,
        email         TEXT NOT NULL UNIQUE,
        password_salt TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        created_at    TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        access_token  TEXT PRIMARY KEY,
        refresh_token TEXT NOT NULL UNIQUE,
        user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        expires_at    TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS transactions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     TEXT NOT NULL,
        type        TEXT NOT NULL CHECK (type IN ('income', 'expense')),
        amount      REAL NOT NULL,
        category    TEXT NOT NULL,
        description TEXT,
        date        TEXT,
        created_at  TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id, date);

    CREATE TABLE IF NOT EXISTS user_balance (
        user_id    TEXT PRIMARY KEY,
        balance    REAL NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS custom_categories (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id   TEXT NOT NULL,
        name      TEXT NOT NULL,
        is_income INTEGER NOT NULL,
        color     TEXT,
        icon      TEXT,
        UNIQUE(user_id, name, is_income)
    );

    CREATE TABLE IF NOT EXISTS savings_goals (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id       TEXT NOT NULL,
        title         TEXT NOT NULL,
        target_amount REAL NOT NULL,
        created_at    TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS goal_contributions (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        goal_id INTEGER NOT NULL REFERENCES savings_goals(id) ON DELETE CASCADE,
        amount  REAL NOT NULL,
        date    TEXT
    );
";

const TRANSACTION_COLUMNS: &str =
    "id, user_id, type, amount, category, description, date, created_at";

/// SQLite-backed implementation of [`Backend`] and [`AdminBackend`].
pub struct LocalBackend {
    conn: Mutex<Connection>,
    session: Mutex<Option<Session>>,
}

impl LocalBackend {
    /// Open (or create) the database at `path`. Pass `":memory:"` for an
    /// ephemeral database.
    pub fn open(path: &str) -> Result<Self, BackendError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;
        info!(path, "local backend opened");
        Ok(Self {
            conn: Mutex::new(conn),
            session: Mutex::new(None),
        })
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BackendError> {
        self.conn
            .lock()
            .map_err(|_| BackendError::Decode("database mutex poisoned".into()))
    }

    fn store_session(&self, session: Option<Session>) {
        match self.session.lock() {
            Ok(mut slot) => *slot = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    // -- goals: the hosted project manages these elsewhere; locally they are
    //    created through these helpers --

    /// Create a savings goal and return its id.
    pub fn create_goal(
        &self,
        user_id: &str,
        title: &str,
        target_amount: f64,
    ) -> Result<String, BackendError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO savings_goals (user_id, title, target_amount, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, title, target_amount, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid().to_string())
    }

    pub fn add_contribution(
        &self,
        goal_id: &str,
        amount: f64,
        date: Option<NaiveDate>,
    ) -> Result<(), BackendError> {
        let goal_id: i64 = goal_id
            .parse()
            .map_err(|_| BackendError::NotFound(format!("savings goal {goal_id}")))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO goal_contributions (goal_id, amount, date) VALUES (?1, ?2, ?3)",
            params![goal_id, amount, date.map(|d| d.to_string())],
        )?;
        Ok(())
    }

    fn new_session(conn: &Connection, user: User) -> Result<Session, BackendError> {
        let session = Session {
            access_token: Uuid::new_v4().simple().to_string(),
            refresh_token: Uuid::new_v4().simple().to_string(),
            expires_at: Some(Utc::now() + Duration::minutes(SESSION_TTL_MINUTES)),
            user,
        };
        let expires = session.expires_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        conn.execute(
            "INSERT INTO sessions (access_token, refresh_token, user_id, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.access_token,
                session.refresh_token,
                session.user.id,
                expires
            ],
        )?;
        Ok(session)
    }

    fn query_goals(
        conn: &Connection,
        user_id: Option<&str>,
    ) -> Result<Vec<SavingsGoal>, BackendError> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, target_amount, created_at FROM savings_goals
             WHERE (?1 IS NULL OR user_id = ?1)
             ORDER BY created_at DESC, id DESC",
        )?;
        let mut goals = stmt
            .query_map(params![user_id], |row| {
                let id: i64 = row.get(0)?;
                let created_at: Option<String> = row.get(4)?;
                Ok(SavingsGoal {
                    id: id.to_string(),
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    target_amount: row.get(3)?,
                    created_at: created_at.as_deref().and_then(parse_timestamp),
                    contributions: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut contrib_stmt = conn.prepare(
            "SELECT amount, date FROM goal_contributions WHERE goal_id = ?1 ORDER BY id",
        )?;
        for goal in &mut goals {
            goal.contributions = contrib_stmt
                .query_map(params![goal.id], |row| {
                    let date: Option<String> = row.get(1)?;
                    Ok(GoalContribution {
                        amount: row.get(0)?,
                        date: date.as_deref().and_then(parse_date),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(goals)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let id: i64 = row.get(0)?;
    let kind: String = row.get(2)?;
    let kind = TransactionKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown transaction type {kind:?}").into(),
        )
    })?;
    let date: Option<String> = row.get(6)?;
    let created_at: Option<String> = row.get(7)?;
    Ok(Transaction {
        id: id.to_string(),
        user_id: row.get(1)?,
        kind,
        amount: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        date: date.as_deref().and_then(parse_date),
        created_at: created_at.as_deref().and_then(parse_timestamp),
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<CustomCategory> {
    let id: i64 = row.get(0)?;
    Ok(CustomCategory {
        id: Some(id.to_string()),
        user_id: row.get(1)?,
        name: row.get(2)?,
        is_income: row.get(3)?,
        color: row.get(4)?,
        icon: row.get(5)?,
    })
}

fn balance_from_row(row: &Row<'_>) -> rusqlite::Result<UserBalance> {
    let updated_at: Option<String> = row.get(2)?;
    Ok(UserBalance {
        user_id: row.get(0)?,
        balance: row.get(1)?,
        updated_at: updated_at.as_deref().and_then(parse_timestamp),
    })
}

/// Recompute the user's snapshot from their transactions.
fn refresh_balance(conn: &Connection, user_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO user_balance (user_id, balance, updated_at)
         VALUES (
             ?1,
             (SELECT COALESCE(SUM(CASE WHEN type = 'income' THEN amount ELSE -amount END), 0)
              FROM transactions WHERE user_id = ?1),
             ?2
         )
         ON CONFLICT(user_id) DO UPDATE SET
             balance = excluded.balance,
             updated_at = excluded.updated_at",
        params![user_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn set_session(&self, session: Option<Session>) {
        self.store_session(session);
    }

    fn current_session(&self) -> Option<Session> {
        match self.session.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let email = normalize_email(email);
        let session = {
            let conn = self.conn()?;
            let row: Option<(String, String, String)> = conn
                .query_row(
                    "SELECT id, password_salt, password_hash FROM users WHERE email = ?1",
                    params![email],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()?;
            let Some((id, salt, hash)) = row else {
                return Err(BackendError::InvalidCredentials);
            };
            if password_digest(&salt, password) != hash {
                warn!(email = %email, "local sign-in with wrong password");
                return Err(BackendError::InvalidCredentials);
            }
            Self::new_session(
                &conn,
                User {
                    id,
                    email: Some(email.clone()),
                },
            )?
        };
        info!(user_id = %session.user.id, "signed in (local)");
        self.store_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let email = normalize_email(email);
        let session = {
            let conn = self.conn()?;
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                    params![email],
                    |r| r.get(0),
                )?;
            if exists {
                return Err(BackendError::EmailTaken);
            }
            let id = Uuid::new_v4().to_string();
            let salt = Uuid::new_v4().simple().to_string();
            conn.execute(
                "INSERT INTO users (id, email, password_salt, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    email,
                    salt,
                    password_digest(&salt, password),
                    Utc::now().to_rfc3339()
                ],
            )?;
            Self::new_session(
                &conn,
                User {
                    id,
                    email: Some(email.clone()),
                },
            )?
        };
        info!(user_id = %session.user.id, "registered (local)");
        self.store_session(Some(session.clone()));
        Ok(SignUpOutcome::SignedIn(session))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.current_session() {
            let conn = self.conn()?;
            conn.execute(
                "DELETE FROM sessions WHERE access_token = ?1",
                params![session.access_token],
            )?;
        }
        self.store_session(None);
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), BackendError> {
        // No mail delivery locally; mirror the hosted behavior of not
        // revealing whether the address exists.
        info!(email = %normalize_email(email), "password reset requested (local backend)");
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let session = {
            let conn = self.conn()?;
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT s.user_id, u.email FROM sessions s JOIN users u ON u.id = s.user_id
                     WHERE s.refresh_token = ?1",
                    params![refresh_token],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let Some((user_id, email)) = row else {
                return Err(BackendError::SessionExpired);
            };
            conn.execute(
                "DELETE FROM sessions WHERE refresh_token = ?1",
                params![refresh_token],
            )?;
            Self::new_session(
                &conn,
                User {
                    id: user_id,
                    email: Some(email),
                },
            )?
        };
        debug!(user_id = %session.user.id, "session refreshed (local)");
        self.store_session(Some(session.clone()));
        Ok(session)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, BackendError> {
        let conn = self.conn()?;
        let limit: i64 = limit.map(|n| n as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = ?1
             ORDER BY COALESCE(date, substr(created_at, 1, 10)) DESC, created_at DESC, id DESC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![user_id, limit], transaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn insert_transaction(
        &self,
        user_id: &str,
        tx: &NewTransaction,
    ) -> Result<Transaction, BackendError> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;
        db_tx.execute(
            "INSERT INTO transactions (user_id, type, amount, category, description, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                tx.kind.as_str(),
                tx.amount,
                tx.category,
                tx.description,
                tx.date.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        let id = db_tx.last_insert_rowid();
        refresh_balance(&db_tx, user_id)?;
        let inserted = db_tx.query_row(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
            params![id],
            transaction_from_row,
        )?;
        db_tx.commit()?;
        debug!(user_id, id, "transaction inserted (local)");
        Ok(inserted)
    }

    async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<(), BackendError> {
        let row_id: i64 = id
            .parse()
            .map_err(|_| BackendError::NotFound(format!("transaction {id}")))?;
        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;
        let deleted = db_tx.execute(
            "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
            params![row_id, user_id],
        )?;
        if deleted == 0 {
            return Err(BackendError::NotFound(format!("transaction {id}")));
        }
        refresh_balance(&db_tx, user_id)?;
        db_tx.commit()?;
        debug!(user_id, id, "transaction deleted (local)");
        Ok(())
    }

    async fn fetch_balance(&self, user_id: &str) -> Result<Option<UserBalance>, BackendError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT user_id, balance, updated_at FROM user_balance WHERE user_id = ?1",
                params![user_id],
                balance_from_row,
            )
            .optional()?;
        Ok(row)
    }

    async fn list_custom_categories(
        &self,
        user_id: &str,
    ) -> Result<Vec<CustomCategory>, BackendError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, is_income, color, icon FROM custom_categories
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![user_id], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn insert_custom_category(
        &self,
        user_id: &str,
        category: &NewCustomCategory,
    ) -> Result<CustomCategory, BackendError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO custom_categories (user_id, name, is_income, color, icon)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                category.name,
                category.is_income,
                category.color,
                category.icon
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(BackendError::Api {
                    status: 409,
                    code: Some("23505".into()),
                    message: "Esta categoría ya existe".into(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        let id = conn.last_insert_rowid();
        let row = conn.query_row(
            "SELECT id, user_id, name, is_income, color, icon FROM custom_categories WHERE id = ?1",
            params![id],
            category_from_row,
        )?;
        Ok(row)
    }

    async fn delete_custom_category(
        &self,
        user_id: &str,
        kind: TransactionKind,
        name: &str,
    ) -> Result<(), BackendError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM custom_categories WHERE user_id = ?1 AND name = ?2 AND is_income = ?3",
            params![user_id, name, kind == TransactionKind::Income],
        )?;
        if deleted == 0 {
            return Err(BackendError::NotFound(format!("category {name}")));
        }
        Ok(())
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<SavingsGoal>, BackendError> {
        let conn = self.conn()?;
        Self::query_goals(&conn, Some(user_id))
    }
}

// ---------------------------------------------------------------------------
// AdminBackend
// ---------------------------------------------------------------------------

#[async_trait]
impl AdminBackend for LocalBackend {
    async fn transaction_owners(&self) -> Result<Vec<String>, BackendError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id FROM transactions GROUP BY user_id ORDER BY MAX(created_at) DESC",
        )?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    async fn all_balances(&self) -> Result<Vec<UserBalance>, BackendError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, balance, updated_at FROM user_balance ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map([], balance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn insert_balance(&self, user_id: &str, balance: f64) -> Result<(), BackendError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_balance (user_id, balance, updated_at) VALUES (?1, ?2, ?3)",
            params![user_id, balance, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn update_balance(&self, user_id: &str, balance: f64) -> Result<(), BackendError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE user_balance SET balance = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, balance, Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(BackendError::NotFound(format!("user_balance {user_id}")));
        }
        Ok(())
    }

    async fn count_rows(&self, table: Table) -> Result<u64, BackendError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", table.as_str()),
                [],
                |r| r.get(0),
            )
            .map_err(|e| BackendError::TableUnavailable {
                table: table.as_str().to_string(),
                message: e.to_string(),
            })?;
        Ok(count.max(0) as u64)
    }

    async fn all_goals(&self) -> Result<Vec<SavingsGoal>, BackendError> {
        let conn = self.conn()?;
        Self::query_goals(&conn, None)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>, BackendError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map([], transaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn user_transactions(&self, user_id: &str) -> Result<Vec<Transaction>, BackendError> {
        self.list_transactions(user_id, None).await
    }

    async fn user_balance(&self, user_id: &str) -> Result<Option<UserBalance>, BackendError> {
        self.fetch_balance(user_id).await
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
