// Balance snapshot reconciliation and table diagnostics for the admin tool.
//
// The stored `user_balance` row is a cache of Σ income − Σ expense. These
// routines recompute it from the transactions, report drift, and optionally
// rewrite the row.

use tracing::{info, warn};

use finanzas_core::context::GoalProgress;
use finanzas_core::ledger::{self, Totals};
use finanzas_core::model::{Transaction, UserBalance};

use crate::backend::{AdminBackend, BackendError, Table};

/// Differences at or below this are rounding noise.
pub const BALANCE_TOLERANCE: f64 = 0.01;

// ---------------------------------------------------------------------------
// Per-user balance check
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BalanceStatus {
    Matches { stored: f64 },
    Mismatch { stored: f64, difference: f64 },
    /// No `user_balance` row exists.
    Missing,
}

pub fn classify(computed: f64, stored: Option<f64>) -> BalanceStatus {
    match stored {
        None => BalanceStatus::Missing,
        Some(stored) => {
            let difference = (computed - stored).abs();
            if difference > BALANCE_TOLERANCE {
                BalanceStatus::Mismatch { stored, difference }
            } else {
                BalanceStatus::Matches { stored }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceCheck {
    pub user_id: String,
    pub transaction_count: usize,
    pub totals: Totals,
    pub computed: f64,
    pub status: BalanceStatus,
}

impl BalanceCheck {
    pub fn needs_fix(&self) -> bool {
        !matches!(self.status, BalanceStatus::Matches { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixAction {
    Created,
    Updated,
    Unchanged,
}

pub async fn check_user(
    backend: &dyn AdminBackend,
    user_id: &str,
) -> Result<BalanceCheck, BackendError> {
    let transactions = backend.user_transactions(user_id).await?;
    let stored = backend.user_balance(user_id).await?;
    Ok(build_check(user_id, &transactions, stored.as_ref()))
}

fn build_check(user_id: &str, transactions: &[Transaction], stored: Option<&UserBalance>) -> BalanceCheck {
    let totals = ledger::totals(transactions);
    let computed = totals.net();
    BalanceCheck {
        user_id: user_id.to_string(),
        transaction_count: transactions.len(),
        totals,
        computed,
        status: classify(computed, stored.map(|b| b.balance)),
    }
}

/// Create a missing snapshot or overwrite a drifted one with the computed
/// balance.
pub async fn apply_fix(
    backend: &dyn AdminBackend,
    check: &BalanceCheck,
) -> Result<FixAction, BackendError> {
    match check.status {
        BalanceStatus::Matches { .. } => Ok(FixAction::Unchanged),
        BalanceStatus::Missing => {
            backend.insert_balance(&check.user_id, check.computed).await?;
            info!(user_id = %check.user_id, balance = check.computed, "balance row created");
            Ok(FixAction::Created)
        }
        BalanceStatus::Mismatch { stored, .. } => {
            backend.update_balance(&check.user_id, check.computed).await?;
            info!(
                user_id = %check.user_id,
                from = stored,
                to = check.computed,
                "balance row updated"
            );
            Ok(FixAction::Updated)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserReport {
    pub check: BalanceCheck,
    /// Set when fixing was requested.
    pub fix: Option<FixAction>,
}

/// Outcome of a sweep over every user owning transactions. One user's failure
/// does not stop the sweep.
#[derive(Debug, Default)]
pub struct CheckSummary {
    pub reports: Vec<UserReport>,
    pub failures: Vec<(String, String)>,
}

impl CheckSummary {
    pub fn drifted(&self) -> usize {
        self.reports.iter().filter(|r| r.check.needs_fix()).count()
    }
}

pub async fn check_all(
    backend: &dyn AdminBackend,
    fix: bool,
) -> Result<CheckSummary, BackendError> {
    let owners = backend.transaction_owners().await?;
    info!(users = owners.len(), fix, "checking balance snapshots");

    let mut summary = CheckSummary::default();
    for user_id in owners {
        let result = async {
            let check = check_user(backend, &user_id).await?;
            let fix = if fix {
                Some(apply_fix(backend, &check).await?)
            } else {
                None
            };
            Ok::<_, BackendError>(UserReport { check, fix })
        }
        .await;
        match result {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                warn!(user_id = %user_id, "balance check failed: {e}");
                summary.failures.push((user_id, e.to_string()));
            }
        }
    }
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Table diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TableStatus {
    pub table: Table,
    /// Row count, or the reason the table could not be read.
    pub rows: Result<u64, String>,
}

pub async fn verify_tables(backend: &dyn AdminBackend) -> Vec<TableStatus> {
    let mut statuses = Vec::with_capacity(Table::ALL.len());
    for table in Table::ALL {
        let rows = backend.count_rows(table).await.map_err(|e| {
            warn!(table = table.as_str(), "table check failed: {e}");
            e.user_message()
        });
        statuses.push(TableStatus { table, rows });
    }
    statuses
}

// ---------------------------------------------------------------------------
// User overview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub user_id: String,
    pub transaction_count: usize,
    pub balance: Option<f64>,
    pub goal_count: usize,
}

/// Every user id seen in transactions, balances or goals, in that order of
/// first appearance.
pub async fn user_overview(backend: &dyn AdminBackend) -> Result<Vec<UserSummary>, BackendError> {
    let transactions = backend.all_transactions().await?;
    let balances = backend.all_balances().await?;
    let goals = backend.all_goals().await?;

    let mut ids: Vec<String> = Vec::new();
    let seen = transactions
        .iter()
        .filter_map(|t| t.user_id.clone())
        .chain(balances.iter().map(|b| b.user_id.clone()))
        .chain(goals.iter().filter_map(|g| g.user_id.clone()));
    for id in seen {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    Ok(ids
        .into_iter()
        .map(|user_id| UserSummary {
            transaction_count: transactions
                .iter()
                .filter(|t| t.user_id.as_deref() == Some(user_id.as_str()))
                .count(),
            balance: balances
                .iter()
                .find(|b| b.user_id == user_id)
                .map(|b| b.balance),
            goal_count: goals
                .iter()
                .filter(|g| g.user_id.as_deref() == Some(user_id.as_str()))
                .count(),
            user_id,
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct UserDetails {
    pub user_id: String,
    /// Newest first.
    pub transactions: Vec<Transaction>,
    pub balance: Option<UserBalance>,
    pub goals: Vec<GoalProgress>,
}

pub async fn user_details(
    backend: &dyn AdminBackend,
    user_id: &str,
) -> Result<UserDetails, BackendError> {
    let transactions = backend.user_transactions(user_id).await?;
    let balance = backend.user_balance(user_id).await?;
    let goals = backend
        .all_goals()
        .await?
        .into_iter()
        .filter(|g| g.user_id.as_deref() == Some(user_id))
        .map(GoalProgress::new)
        .collect();
    Ok(UserDetails {
        user_id: user_id.to_string(),
        transactions,
        balance,
        goals,
    })
}
