// Hosted backend: GoTrue for authentication, PostgREST for rows.
//
// Row-level security on the hosted project scopes reads to the signed-in
// user; every query still filters on `user_id` explicitly. Cross-user admin
// calls use the service key when one is configured.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use finanzas_core::config::Config;
use finanzas_core::model::{
    CustomCategory, NewCustomCategory, NewTransaction, SavingsGoal, Transaction,
    TransactionKind, User, UserBalance,
};

use super::{AdminBackend, Backend, BackendError, Session, SignUpOutcome, Table};

const GOALS_SELECT: &str = "*,goal_contributions(amount,date)";

pub struct SupabaseBackend {
    http: reqwest::Client,
    url: String,
    anon_key: String,
    service_key: Option<String>,
    session: RwLock<Option<Session>>,
}

impl SupabaseBackend {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let url: String = url.into();
        SupabaseBackend {
            http: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_key: None,
            session: RwLock::new(None),
        }
    }

    /// Use the service-role key for admin calls so row-level security does
    /// not hide other users' rows.
    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        if config.backend.url.trim().is_empty() {
            return Err(BackendError::NotConfigured("SUPABASE_URL is not set".into()));
        }
        let anon_key = config
            .credentials
            .supabase_anon_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BackendError::NotConfigured("SUPABASE_ANON_KEY is not set".into()))?;
        let mut backend = SupabaseBackend::new(config.backend.url.clone(), anon_key);
        if let Some(key) = config
            .credentials
            .supabase_service_key
            .clone()
            .filter(|k| !k.trim().is_empty())
        {
            backend = backend.with_service_key(key);
        }
        Ok(backend)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path)
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.url, table.as_str())
    }

    fn access_token(&self) -> Result<String, BackendError> {
        self.current_session()
            .map(|s| s.access_token)
            .ok_or(BackendError::NotAuthenticated)
    }

    /// Bearer token for cross-user calls.
    fn admin_token(&self) -> Result<String, BackendError> {
        match &self.service_key {
            Some(key) => Ok(key.clone()),
            None => self.access_token(),
        }
    }

    fn auth_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.auth_url(path))
            .header("apikey", &self.anon_key)
    }

    fn rest_request(&self, method: Method, table: Table, token: &str) -> RequestBuilder {
        let apikey = match &self.service_key {
            Some(key) if key == token => key.as_str(),
            _ => self.anon_key.as_str(),
        };
        self.http
            .request(method, self.rest_url(table))
            .header("apikey", apikey)
            .bearer_auth(token)
    }

    fn put_session(&self, session: Option<Session>) {
        match self.session.write() {
            Ok(mut slot) => *slot = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    // -- PostgREST helpers --

    async fn select<T: DeserializeOwned>(
        &self,
        table: Table,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let resp = self
            .rest_request(Method::GET, table, token)
            .query(query)
            .send()
            .await?;
        decode_rows(table, resp).await
    }

    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: Table,
        token: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let resp = self
            .rest_request(Method::POST, table, token)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let mut rows: Vec<T> = decode_rows(table, resp).await?;
        if rows.is_empty() {
            return Err(BackendError::Decode(format!(
                "insert into {} returned no rows",
                table.as_str()
            )));
        }
        Ok(rows.swap_remove(0))
    }

    /// Delete or update with `return=representation`; returns how many rows
    /// the filter matched.
    async fn mutate(
        &self,
        method: Method,
        table: Table,
        token: &str,
        filter: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<usize, BackendError> {
        let mut req = self
            .rest_request(method, table, token)
            .header("Prefer", "return=representation")
            .query(filter);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        let rows: Vec<serde_json::Value> = decode_rows(table, resp).await?;
        Ok(rows.len())
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// GoTrue and PostgREST error bodies, across versions.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => self.error_code.clone().or_else(|| self.error.clone()),
        }
    }

    fn message(&self, fallback: &str) -> String {
        self.msg
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| fallback.to_string())
    }
}

pub(crate) fn parse_session(body: &str, now: DateTime<Utc>) -> Result<Session, BackendError> {
    let token: TokenResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(token.into_session(now))
}

/// Sign-up returns a full token response when the project auto-confirms,
/// otherwise just the pending user.
pub(crate) fn parse_sign_up(
    body: &str,
    email: &str,
    now: DateTime<Utc>,
) -> Result<SignUpOutcome, BackendError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    if value.get("access_token").is_some_and(|t| t.is_string()) {
        return parse_session(body, now).map(SignUpOutcome::SignedIn);
    }
    let email = value
        .get("email")
        .and_then(|e| e.as_str())
        .unwrap_or(email)
        .to_string();
    Ok(SignUpOutcome::ConfirmationRequired { email })
}

pub(crate) fn classify_auth_error(status: StatusCode, body: &str) -> BackendError {
    let err = ErrorBody::parse(body);
    let code = err.code().unwrap_or_default();
    let message = err.message(status.canonical_reason().unwrap_or("error"));
    let lowered = message.to_lowercase();

    if code == "invalid_credentials"
        || (code == "invalid_grant" && lowered.contains("credentials"))
        || lowered.contains("invalid login credentials")
    {
        return BackendError::InvalidCredentials;
    }
    if code == "user_already_exists" || lowered.contains("already registered") {
        return BackendError::EmailTaken;
    }
    if code == "refresh_token_not_found"
        || code == "session_not_found"
        || lowered.contains("refresh token")
    {
        return BackendError::SessionExpired;
    }
    BackendError::Api {
        status: status.as_u16(),
        code: (!code.is_empty()).then_some(code),
        message,
    }
}

pub(crate) fn classify_rest_error(table: Table, status: StatusCode, body: &str) -> BackendError {
    let err = ErrorBody::parse(body);
    let code = err.code();
    let message = err.message(status.canonical_reason().unwrap_or("error"));

    match code.as_deref() {
        Some("42P01") | Some("PGRST205") => BackendError::TableUnavailable {
            table: table.as_str().to_string(),
            message,
        },
        Some("PGRST301") | Some("PGRST303") => BackendError::SessionExpired,
        _ if status == StatusCode::UNAUTHORIZED => BackendError::SessionExpired,
        _ if status == StatusCode::NOT_FOUND => BackendError::TableUnavailable {
            table: table.as_str().to_string(),
            message,
        },
        _ => BackendError::Api {
            status: status.as_u16(),
            code,
            message,
        },
    }
}

/// Total from a PostgREST `Content-Range` header such as `0-24/3573` or `*/0`.
pub(crate) fn parse_content_range(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}

async fn decode_rows<T: DeserializeOwned>(
    table: Table,
    resp: Response,
) -> Result<Vec<T>, BackendError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let err = classify_rest_error(table, status, &body);
        warn!(table = table.as_str(), %status, error = %err, "postgrest request failed");
        return Err(err);
    }
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&body).map_err(|e| {
        BackendError::Decode(format!("{} rows: {e}", table.as_str()))
    })
}

async fn auth_body(resp: Response) -> Result<String, BackendError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_auth_error(status, &body))
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[derive(Serialize)]
struct Owned<'a, T: Serialize> {
    user_id: &'a str,
    #[serde(flatten)]
    row: &'a T,
}

#[derive(Deserialize)]
struct OwnerRow {
    user_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[async_trait]
impl Backend for SupabaseBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    fn set_session(&self, session: Option<Session>) {
        self.put_session(session);
    }

    fn current_session(&self) -> Option<Session> {
        match self.session.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let resp = self
            .auth_request(Method::POST, "token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email.trim(), "password": password }))
            .send()
            .await?;
        let session = parse_session(&auth_body(resp).await?, Utc::now())?;
        info!(user_id = %session.user.id, "signed in");
        self.put_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let email = email.trim();
        let resp = self
            .auth_request(Method::POST, "signup")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let outcome = parse_sign_up(&auth_body(resp).await?, email, Utc::now())?;
        match &outcome {
            SignUpOutcome::SignedIn(session) => {
                info!(user_id = %session.user.id, "registered and signed in");
                self.put_session(Some(session.clone()));
            }
            SignUpOutcome::ConfirmationRequired { .. } => {
                info!("registered, awaiting email confirmation");
            }
        }
        Ok(outcome)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Ok(token) = self.access_token() {
            let result = self
                .auth_request(Method::POST, "logout")
                .bearer_auth(token)
                .send()
                .await;
            // The local session is cleared either way.
            match result {
                Ok(resp) if !resp.status().is_success() => {
                    debug!(status = %resp.status(), "logout rejected by server");
                }
                Err(e) => warn!("logout request failed: {e}"),
                Ok(_) => {}
            }
        }
        self.put_session(None);
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), BackendError> {
        let resp = self
            .auth_request(Method::POST, "recover")
            .json(&json!({ "email": email.trim() }))
            .send()
            .await?;
        auth_body(resp).await?;
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let resp = self
            .auth_request(Method::POST, "token")
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let session = match auth_body(resp).await {
            Ok(body) => parse_session(&body, Utc::now())?,
            Err(BackendError::Api { status, .. }) if (400..500).contains(&status) => {
                return Err(BackendError::SessionExpired);
            }
            Err(e) => return Err(e),
        };
        debug!(user_id = %session.user.id, "session refreshed");
        self.put_session(Some(session.clone()));
        Ok(session)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, BackendError> {
        let token = self.access_token()?;
        let mut query = vec![
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            ("order", "date.desc.nullslast,created_at.desc".to_string()),
        ];
        if let Some(n) = limit {
            query.push(("limit", n.to_string()));
        }
        self.select(Table::Transactions, &token, &query).await
    }

    async fn insert_transaction(
        &self,
        user_id: &str,
        tx: &NewTransaction,
    ) -> Result<Transaction, BackendError> {
        let token = self.access_token()?;
        self.insert(Table::Transactions, &token, &Owned { user_id, row: tx })
            .await
    }

    async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<(), BackendError> {
        let token = self.access_token()?;
        let deleted = self
            .mutate(
                Method::DELETE,
                Table::Transactions,
                &token,
                &[("id", eq(id)), ("user_id", eq(user_id))],
                None,
            )
            .await?;
        if deleted == 0 {
            return Err(BackendError::NotFound(format!("transaction {id}")));
        }
        Ok(())
    }

    async fn fetch_balance(&self, user_id: &str) -> Result<Option<UserBalance>, BackendError> {
        let token = self.access_token()?;
        let mut rows: Vec<UserBalance> = self
            .select(
                Table::UserBalance,
                &token,
                &[("select", "*".to_string()), ("user_id", eq(user_id))],
            )
            .await?;
        Ok((!rows.is_empty()).then(|| rows.swap_remove(0)))
    }

    async fn list_custom_categories(
        &self,
        user_id: &str,
    ) -> Result<Vec<CustomCategory>, BackendError> {
        let token = self.access_token()?;
        self.select(
            Table::CustomCategories,
            &token,
            &[
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn insert_custom_category(
        &self,
        user_id: &str,
        category: &NewCustomCategory,
    ) -> Result<CustomCategory, BackendError> {
        let token = self.access_token()?;
        self.insert(
            Table::CustomCategories,
            &token,
            &Owned {
                user_id,
                row: category,
            },
        )
        .await
    }

    async fn delete_custom_category(
        &self,
        user_id: &str,
        kind: TransactionKind,
        name: &str,
    ) -> Result<(), BackendError> {
        let token = self.access_token()?;
        let is_income = kind == TransactionKind::Income;
        let deleted = self
            .mutate(
                Method::DELETE,
                Table::CustomCategories,
                &token,
                &[
                    ("user_id", eq(user_id)),
                    ("name", eq(name)),
                    ("is_income", eq(&is_income.to_string())),
                ],
                None,
            )
            .await?;
        if deleted == 0 {
            return Err(BackendError::NotFound(format!("category {name}")));
        }
        Ok(())
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<SavingsGoal>, BackendError> {
        let token = self.access_token()?;
        self.select(
            Table::SavingsGoals,
            &token,
            &[
                ("select", GOALS_SELECT.to_string()),
                ("user_id", eq(user_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// AdminBackend
// ---------------------------------------------------------------------------

#[async_trait]
impl AdminBackend for SupabaseBackend {
    async fn transaction_owners(&self) -> Result<Vec<String>, BackendError> {
        let token = self.admin_token()?;
        let rows: Vec<OwnerRow> = self
            .select(
                Table::Transactions,
                &token,
                &[
                    ("select", "user_id".to_string()),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;
        let mut owners: Vec<String> = Vec::new();
        for id in rows.into_iter().filter_map(|r| r.user_id) {
            if !owners.contains(&id) {
                owners.push(id);
            }
        }
        Ok(owners)
    }

    async fn all_balances(&self) -> Result<Vec<UserBalance>, BackendError> {
        let token = self.admin_token()?;
        self.select(
            Table::UserBalance,
            &token,
            &[
                ("select", "*".to_string()),
                ("order", "updated_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn insert_balance(&self, user_id: &str, balance: f64) -> Result<(), BackendError> {
        let token = self.admin_token()?;
        let _: serde_json::Value = self
            .insert(
                Table::UserBalance,
                &token,
                &json!({
                    "user_id": user_id,
                    "balance": balance,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn update_balance(&self, user_id: &str, balance: f64) -> Result<(), BackendError> {
        let token = self.admin_token()?;
        let updated = self
            .mutate(
                Method::PATCH,
                Table::UserBalance,
                &token,
                &[("user_id", eq(user_id))],
                Some(json!({ "balance": balance, "updated_at": Utc::now() })),
            )
            .await?;
        if updated == 0 {
            return Err(BackendError::NotFound(format!("user_balance {user_id}")));
        }
        Ok(())
    }

    async fn count_rows(&self, table: Table) -> Result<u64, BackendError> {
        let token = self.admin_token()?;
        let resp = self
            .rest_request(Method::GET, table, &token)
            .header("Prefer", "count=exact")
            .header("Range", "0-0")
            .query(&[("select", "*")])
            .send()
            .await?;
        let status = resp.status();
        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !status.is_success() {
            let body = resp.text().await?;
            return Err(classify_rest_error(table, status, &body));
        }
        range
            .as_deref()
            .and_then(parse_content_range)
            .ok_or_else(|| BackendError::Decode(format!("no row count for {}", table.as_str())))
    }

    async fn all_goals(&self) -> Result<Vec<SavingsGoal>, BackendError> {
        let token = self.admin_token()?;
        self.select(
            Table::SavingsGoals,
            &token,
            &[
                ("select", GOALS_SELECT.to_string()),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>, BackendError> {
        let token = self.admin_token()?;
        self.select(
            Table::Transactions,
            &token,
            &[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn user_transactions(&self, user_id: &str) -> Result<Vec<Transaction>, BackendError> {
        let token = self.admin_token()?;
        self.select(
            Table::Transactions,
            &token,
            &[
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("order", "date.desc.nullslast,created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn user_balance(&self, user_id: &str) -> Result<Option<UserBalance>, BackendError> {
        let token = self.admin_token()?;
        let mut rows: Vec<UserBalance> = self
            .select(
                Table::UserBalance,
                &token,
                &[("select", "*".to_string()), ("user_id", eq(user_id))],
            )
            .await?;
        Ok((!rows.is_empty()).then(|| rows.swap_remove(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_790_000_000, 0).unwrap()
    }

    #[test]
    fn token_response_to_session() {
        let body = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt",
            "user": {"id": "uuid-1", "email": "ana@example.com", "role": "authenticated"}
        }"#;
        let s = parse_session(body, now()).unwrap();
        assert_eq!(s.access_token, "jwt");
        assert_eq!(s.user.id, "uuid-1");
        assert_eq!(s.expires_at, Some(now() + Duration::seconds(3600)));
    }

    #[test]
    fn absolute_expiry_wins() {
        let body = r#"{"access_token":"a","refresh_token":"r","expires_in":10,
                       "expires_at":1790009999,"user":{"id":"u"}}"#;
        let s = parse_session(body, now()).unwrap();
        assert_eq!(s.expires_at, DateTime::from_timestamp(1_790_009_999, 0));
    }

    #[test]
    fn sign_up_without_session_needs_confirmation() {
        let body = r#"{"id":"uuid-2","email":"new@example.com","confirmation_sent_at":"2026-10-01T00:00:00Z"}"#;
        assert_eq!(
            parse_sign_up(body, "ignored@example.com", now()).unwrap(),
            SignUpOutcome::ConfirmationRequired {
                email: "new@example.com".into()
            }
        );
        let auto = r#"{"access_token":"a","refresh_token":"r","user":{"id":"u"}}"#;
        assert!(matches!(
            parse_sign_up(auto, "x", now()).unwrap(),
            SignUpOutcome::SignedIn(_)
        ));
    }

    #[test]
    fn auth_errors_are_classified() {
        let old = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert!(matches!(
            classify_auth_error(StatusCode::BAD_REQUEST, old),
            BackendError::InvalidCredentials
        ));
        let new = r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#;
        assert!(matches!(
            classify_auth_error(StatusCode::BAD_REQUEST, new),
            BackendError::InvalidCredentials
        ));
        let taken = r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#;
        assert!(matches!(
            classify_auth_error(StatusCode::UNPROCESSABLE_ENTITY, taken),
            BackendError::EmailTaken
        ));
        let weak = r#"{"code":422,"error_code":"weak_password","msg":"Password should be at least 6 characters."}"#;
        match classify_auth_error(StatusCode::UNPROCESSABLE_ENTITY, weak) {
            BackendError::Api { status, code, message } => {
                assert_eq!(status, 422);
                assert_eq!(code.as_deref(), Some("weak_password"));
                assert!(message.starts_with("Password should"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rest_errors_are_classified() {
        let missing = r#"{"code":"42P01","message":"relation \"public.user_balance\" does not exist"}"#;
        assert!(matches!(
            classify_rest_error(Table::UserBalance, StatusCode::NOT_FOUND, missing),
            BackendError::TableUnavailable { ref table, .. } if table == "user_balance"
        ));
        let expired = r#"{"code":"PGRST301","message":"JWT expired"}"#;
        assert!(matches!(
            classify_rest_error(Table::Transactions, StatusCode::UNAUTHORIZED, expired),
            BackendError::SessionExpired
        ));
        let dup = r#"{"code":"23505","message":"duplicate key value"}"#;
        assert!(matches!(
            classify_rest_error(Table::CustomCategories, StatusCode::CONFLICT, dup),
            BackendError::Api { status: 409, .. }
        ));
        assert!(matches!(
            classify_rest_error(Table::Transactions, StatusCode::BAD_GATEWAY, "<html>"),
            BackendError::Api { status: 502, code: None, .. }
        ));
    }

    #[test]
    fn content_range_totals() {
        assert_eq!(parse_content_range("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-0/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn owned_payload_flattens_row() {
        let tx = NewTransaction {
            kind: TransactionKind::Expense,
            amount: 1500.0,
            category: "Comida".into(),
            description: None,
            date: chrono::NaiveDate::from_ymd_opt(2026, 10, 3).unwrap(),
        };
        let value = serde_json::to_value(Owned {
            user_id: "u-1",
            row: &tx,
        })
        .unwrap();
        assert_eq!(value["user_id"], "u-1");
        assert_eq!(value["type"], "expense");
        assert_eq!(value["date"], "2026-10-03");
    }

    #[test]
    fn from_config_requires_url_and_key() {
        let mut config = Config::default();
        assert!(matches!(
            SupabaseBackend::from_config(&config),
            Err(BackendError::NotConfigured(_))
        ));
        config.backend.url = "https://abc.supabase.co/".into();
        config.credentials.supabase_anon_key = Some("anon".into());
        let backend = SupabaseBackend::from_config(&config).unwrap();
        assert_eq!(backend.rest_url(Table::Transactions), "https://abc.supabase.co/rest/v1/transactions");
        assert!(matches!(backend.access_token(), Err(BackendError::NotAuthenticated)));
    }
}
