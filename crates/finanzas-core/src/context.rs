// Financial context: the per-user summary the assistant reasons over.
//
// Built once per chat turn from a snapshot of the user's rows. The figures are
// period-aware (current month, rolling average, all loaded history) so the
// prompt can always state which period a number belongs to.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::format::format_clp;
use crate::ledger::{self, CategoryTotal, Totals, YearMonth};
use crate::model::{sanitize_amount, CustomCategory, SavingsGoal, Transaction};
use crate::stats::savings_rate;

pub const DATA_WARNING: &str = "Los datos pueden tener inconsistencias. Verificar cálculos.";

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Tunables for context aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// How many of the most recent transactions are loaded.
    pub transaction_limit: usize,
    /// Window (in months) of the rolling averages.
    pub average_months: u32,
    /// Months covered by the spending trend.
    pub trend_months: u32,
}

impl Default for ContextSettings {
    fn default() -> Self {
        ContextSettings {
            transaction_limit: 100,
            average_months: 3,
            trend_months: 6,
        }
    }
}

/// Raw rows fetched for one user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialSnapshot {
    pub user_id: String,
    pub transactions: Vec<Transaction>,
    /// Stored `user_balance` row, `None` when the user has none yet.
    pub stored_balance: Option<f64>,
    pub goals: Vec<SavingsGoal>,
    pub custom_categories: Vec<CustomCategory>,
}

// ---------------------------------------------------------------------------
// Derived figures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub goal: SavingsGoal,
    pub total_contributed: f64,
    /// Percentage, capped at 100.
    pub progress: f64,
    pub is_completed: bool,
}

impl GoalProgress {
    pub fn new(goal: SavingsGoal) -> Self {
        let total_contributed = goal.total_contributed();
        let target = goal.target_amount;
        let (progress, is_completed) = if target <= 0.0 {
            (100.0, true)
        } else {
            (
                (total_contributed / target * 100.0).min(100.0),
                total_contributed >= target,
            )
        };
        GoalProgress {
            goal,
            total_contributed,
            progress,
            is_completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingTrend {
    pub month: YearMonth,
    /// `"octubre de 2026"`
    pub label: String,
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinancialHealth {
    /// Balance covers at least three average months of expenses.
    pub has_emergency_fund: bool,
    pub is_overspending: bool,
    /// Mean progress over all goals, `0` without goals.
    pub savings_goal_progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialContext {
    pub user_id: String,
    pub balance: f64,
    /// Newest first.
    pub transactions: Vec<Transaction>,
    pub goals: Vec<GoalProgress>,
    pub custom_categories: Vec<CustomCategory>,

    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub avg_monthly_income: f64,
    pub avg_monthly_expenses: f64,
    pub average_months: u32,

    pub category_analysis: Vec<CategoryTotal>,
    pub spending_trends: Vec<SpendingTrend>,

    pub savings_rate: f64,
    pub total_savings_goals: f64,
    pub total_savings_progress: f64,
    pub financial_health: FinancialHealth,

    pub generated_on: NaiveDate,
    pub transaction_count: usize,
    pub active_goals_count: usize,
}

impl FinancialContext {
    pub fn build(snapshot: FinancialSnapshot, today: NaiveDate, settings: &ContextSettings) -> Self {
        let FinancialSnapshot {
            user_id,
            mut transactions,
            stored_balance,
            goals,
            custom_categories,
        } = snapshot;

        ledger::sort_newest_first(&mut transactions);
        transactions.truncate(settings.transaction_limit);

        let current = YearMonth::from_date(today);
        let monthly = ledger::month_totals(&transactions, current);

        let months = settings.average_months.max(1);
        let recent = ledger::totals_since(&transactions, ledger::months_before(today, months));
        let avg_monthly_income = recent.income / months as f64;
        let avg_monthly_expenses = recent.expenses / months as f64;

        let balance = stored_balance.unwrap_or_else(|| ledger::balance(&transactions));

        let goals: Vec<GoalProgress> = goals.into_iter().map(GoalProgress::new).collect();
        let total_savings_goals = goals.iter().map(|g| g.goal.target_amount).sum();
        let total_savings_progress = goals.iter().map(|g| g.total_contributed).sum();
        let savings_goal_progress = if goals.is_empty() {
            0.0
        } else {
            goals.iter().map(|g| g.progress).sum::<f64>() / goals.len() as f64
        };
        let active_goals_count = goals.iter().filter(|g| !g.is_completed).count();

        let spending_trends = ledger::monthly_flows(&transactions, current, settings.trend_months)
            .into_iter()
            .map(|f| SpendingTrend {
                month: f.month,
                label: f.month.label(),
                income: f.income,
                expenses: f.expenses,
                net: f.net(),
            })
            .collect();

        FinancialContext {
            category_analysis: ledger::category_totals(&transactions),
            transaction_count: transactions.len(),
            user_id,
            balance,
            transactions,
            custom_categories,
            monthly_income: monthly.income,
            monthly_expenses: monthly.expenses,
            avg_monthly_income,
            avg_monthly_expenses,
            average_months: months,
            spending_trends,
            savings_rate: savings_rate(avg_monthly_income, avg_monthly_expenses),
            total_savings_goals,
            total_savings_progress,
            financial_health: FinancialHealth {
                has_emergency_fund: balance >= avg_monthly_expenses * 3.0,
                is_overspending: avg_monthly_expenses > avg_monthly_income,
                savings_goal_progress,
            },
            goals,
            generated_on: today,
            active_goals_count,
        }
    }

    /// Totals over every loaded transaction.
    pub fn historical_totals(&self) -> Totals {
        ledger::totals(&self.transactions)
    }

    /// The `n` most recent transactions.
    pub fn recent_transactions(&self, n: usize) -> &[Transaction] {
        &self.transactions[..n.min(self.transactions.len())]
    }

    pub fn top_categories(&self, n: usize) -> Vec<CategoryTotal> {
        ledger::top_categories(&self.transactions, n)
    }

    /// Replace every non-finite figure with zero.
    pub fn sanitized(mut self) -> Self {
        self.balance = sanitize_amount(self.balance);
        self.monthly_income = sanitize_amount(self.monthly_income);
        self.monthly_expenses = sanitize_amount(self.monthly_expenses);
        self.avg_monthly_income = sanitize_amount(self.avg_monthly_income);
        self.avg_monthly_expenses = sanitize_amount(self.avg_monthly_expenses);
        self.savings_rate = sanitize_amount(self.savings_rate);
        self.total_savings_goals = sanitize_amount(self.total_savings_goals);
        self.total_savings_progress = sanitize_amount(self.total_savings_progress);
        self.financial_health.savings_goal_progress =
            sanitize_amount(self.financial_health.savings_goal_progress);
        for tx in &mut self.transactions {
            tx.amount = sanitize_amount(tx.amount);
        }
        for g in &mut self.goals {
            g.total_contributed = sanitize_amount(g.total_contributed);
            g.progress = sanitize_amount(g.progress);
        }
        for c in &mut self.category_analysis {
            c.total = sanitize_amount(c.total);
        }
        for t in &mut self.spending_trends {
            t.income = sanitize_amount(t.income);
            t.expenses = sanitize_amount(t.expenses);
            t.net = sanitize_amount(t.net);
        }
        self
    }

    /// Fail unless every loaded transaction belongs to `user_id`.
    ///
    /// Rows without an owner column are accepted.
    pub fn verify_ownership(&self, user_id: &str) -> Result<(), OwnershipError> {
        if user_id.trim().is_empty() {
            warn!("ownership check without an authenticated user");
            return Err(OwnershipError::NotAuthenticated);
        }
        let foreign: Vec<&Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.user_id.as_deref().is_some_and(|owner| owner != user_id))
            .collect();
        if let Some(first) = foreign.first() {
            error!(
                current_user = user_id,
                foreign_count = foreign.len(),
                example_id = %first.id,
                "SECURITY: transactions from another user in financial context"
            );
            return Err(OwnershipError::ForeignTransactions {
                count: foreign.len(),
            });
        }
        Ok(())
    }

    /// Cross-check the period figures against each other.
    pub fn report(&self) -> ContextReport {
        let mut report = ContextReport::default();
        if self.transactions.is_empty() {
            return report;
        }
        let history = self.historical_totals();
        let window = self.average_months as f64;

        if (history.expenses - self.avg_monthly_expenses * window).abs() > self.avg_monthly_expenses {
            report.warning = Some(DATA_WARNING.to_string());
        }

        if (history.expenses - self.monthly_expenses).abs() > self.monthly_expenses * 0.1 {
            report.inconsistencies.push(format!(
                "Discrepancia en gastos: calculado {} vs reportado {}",
                format_clp(history.expenses),
                format_clp(self.monthly_expenses)
            ));
        }
        if (history.income - self.monthly_income).abs() > self.monthly_income * 0.1 {
            report.inconsistencies.push(format!(
                "Discrepancia en ingresos: calculado {} vs reportado {}",
                format_clp(history.income),
                format_clp(self.monthly_income)
            ));
        }
        if self.avg_monthly_expenses > self.monthly_expenses * 5.0 {
            report.inconsistencies.push(
                "El promedio mensual de gastos parece muy alto comparado con el mes actual".into(),
            );
        }
        if self.avg_monthly_income > self.monthly_income * 5.0 {
            report.inconsistencies.push(
                "El promedio mensual de ingresos parece muy alto comparado con el mes actual".into(),
            );
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Validation results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    #[error("Usuario no autenticado")]
    NotAuthenticated,

    #[error("Error de seguridad: Los datos no pertenecen al usuario autenticado")]
    ForeignTransactions { count: usize },
}

/// Data-quality notes attached to the assistant prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextReport {
    pub warning: Option<String>,
    pub inconsistencies: Vec<String>,
}

impl ContextReport {
    pub fn is_clean(&self) -> bool {
        self.warning.is_none() && self.inconsistencies.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::tx;
    use crate::model::{GoalContribution, TransactionKind::*};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn goal(id: &str, target: f64, contributed: &[f64]) -> SavingsGoal {
        SavingsGoal {
            id: id.into(),
            user_id: Some("u-1".into()),
            title: format!("Meta {id}"),
            target_amount: target,
            created_at: None,
            contributions: contributed
                .iter()
                .map(|a| GoalContribution {
                    amount: *a,
                    date: None,
                })
                .collect(),
        }
    }

    fn snapshot() -> FinancialSnapshot {
        FinancialSnapshot {
            user_id: "u-1".into(),
            transactions: vec![
                tx(Income, 900_000.0, "Salario", "2026-10-01"),
                tx(Expense, 60_000.0, "Alimentación", "2026-10-04"),
                tx(Expense, 40_000.0, "Transporte", "2026-10-10"),
                tx(Income, 900_000.0, "Salario", "2026-09-01"),
                tx(Expense, 200_000.0, "Hogar", "2026-09-15"),
                tx(Expense, 999_000.0, "Otros", "2026-01-15"),
            ],
            stored_balance: Some(1_000_000.0),
            goals: vec![goal("1", 100_000.0, &[50_000.0]), goal("2", 10_000.0, &[20_000.0])],
            custom_categories: vec![],
        }
    }

    #[test]
    fn monthly_and_average_figures() {
        let ctx = FinancialContext::build(snapshot(), today(), &ContextSettings::default());
        assert!((ctx.monthly_income - 900_000.0).abs() < 1e-9);
        assert!((ctx.monthly_expenses - 100_000.0).abs() < 1e-9);
        // window starts 2026-07-19
        assert!((ctx.avg_monthly_income - 600_000.0).abs() < 1e-9);
        assert!((ctx.avg_monthly_expenses - 100_000.0).abs() < 1e-9);
        assert!((ctx.savings_rate - 83.333_333).abs() < 1e-3);
        assert_eq!(ctx.transaction_count, 6);
        assert_eq!(ctx.balance, 1_000_000.0);
    }

    #[test]
    fn balance_falls_back_to_computed() {
        let mut snap = snapshot();
        snap.stored_balance = None;
        let ctx = FinancialContext::build(snap, today(), &ContextSettings::default());
        assert!((ctx.balance - 501_000.0).abs() < 1e-9);
    }

    #[test]
    fn goal_progress_capped_and_counted() {
        let ctx = FinancialContext::build(snapshot(), today(), &ContextSettings::default());
        assert_eq!(ctx.goals[0].progress, 50.0);
        assert!(!ctx.goals[0].is_completed);
        assert_eq!(ctx.goals[1].progress, 100.0);
        assert!(ctx.goals[1].is_completed);
        assert_eq!(ctx.active_goals_count, 1);
        assert!((ctx.total_savings_goals - 110_000.0).abs() < 1e-9);
        assert!((ctx.total_savings_progress - 70_000.0).abs() < 1e-9);
        assert!((ctx.financial_health.savings_goal_progress - 75.0).abs() < 1e-9);
    }

    #[test]
    fn zero_target_goal_is_complete() {
        let g = GoalProgress::new(goal("z", 0.0, &[]));
        assert!(g.is_completed);
        assert_eq!(g.progress, 100.0);
    }

    #[test]
    fn health_flags() {
        let ctx = FinancialContext::build(snapshot(), today(), &ContextSettings::default());
        assert!(ctx.financial_health.has_emergency_fund);
        assert!(!ctx.financial_health.is_overspending);
    }

    #[test]
    fn trends_cover_six_months() {
        let ctx = FinancialContext::build(snapshot(), today(), &ContextSettings::default());
        assert_eq!(ctx.spending_trends.len(), 6);
        let last = ctx.spending_trends.last().unwrap();
        assert_eq!(last.label, "octubre de 2026");
        assert!((last.net - 800_000.0).abs() < 1e-9);
    }

    #[test]
    fn transaction_limit_keeps_most_recent() {
        let settings = ContextSettings {
            transaction_limit: 2,
            ..ContextSettings::default()
        };
        let ctx = FinancialContext::build(snapshot(), today(), &settings);
        assert_eq!(ctx.transaction_count, 2);
        assert_eq!(ctx.transactions[0].date, NaiveDate::from_ymd_opt(2026, 10, 10));
        assert_eq!(ctx.recent_transactions(10).len(), 2);
    }

    #[test]
    fn ownership_rejects_foreign_rows() {
        let mut snap = snapshot();
        snap.transactions[2].user_id = Some("intruder".into());
        let ctx = FinancialContext::build(snap, today(), &ContextSettings::default());
        assert_eq!(
            ctx.verify_ownership("u-1"),
            Err(OwnershipError::ForeignTransactions { count: 1 })
        );
        assert_eq!(ctx.verify_ownership(""), Err(OwnershipError::NotAuthenticated));
    }

    #[test]
    fn ownership_accepts_rows_without_owner() {
        let mut snap = snapshot();
        snap.transactions[0].user_id = None;
        let ctx = FinancialContext::build(snap, today(), &ContextSettings::default());
        assert!(ctx.verify_ownership("u-1").is_ok());
    }

    #[test]
    fn report_flags_history_vs_month() {
        let ctx = FinancialContext::build(snapshot(), today(), &ContextSettings::default());
        let report = ctx.report();
        // history expenses 1_299_000 vs 3 * 100_000
        assert_eq!(report.warning.as_deref(), Some(DATA_WARNING));
        assert_eq!(
            report.inconsistencies[0],
            "Discrepancia en gastos: calculado $1.299.000 vs reportado $100.000"
        );
        assert_eq!(
            report.inconsistencies[1],
            "Discrepancia en ingresos: calculado $1.800.000 vs reportado $900.000"
        );
        assert_eq!(report.inconsistencies.len(), 2);
    }

    #[test]
    fn report_flags_high_average() {
        let snap = FinancialSnapshot {
            user_id: "u-1".into(),
            transactions: vec![tx(Expense, 600_000.0, "Hogar", "2026-09-01")],
            ..FinancialSnapshot::default()
        };
        let ctx = FinancialContext::build(snap, today(), &ContextSettings::default());
        let report = ctx.report();
        assert!(report
            .inconsistencies
            .iter()
            .any(|i| i.starts_with("El promedio mensual de gastos")));
    }

    #[test]
    fn empty_context_has_clean_report() {
        let snap = FinancialSnapshot {
            user_id: "u-1".into(),
            ..FinancialSnapshot::default()
        };
        let ctx = FinancialContext::build(snap, today(), &ContextSettings::default());
        assert!(ctx.report().is_clean());
        assert_eq!(ctx.balance, 0.0);
        assert_eq!(ctx.savings_rate, 0.0);
    }

    #[test]
    fn sanitized_clears_non_finite() {
        let mut ctx = FinancialContext::build(snapshot(), today(), &ContextSettings::default());
        ctx.balance = f64::NAN;
        ctx.avg_monthly_income = f64::INFINITY;
        let ctx = ctx.sanitized();
        assert_eq!(ctx.balance, 0.0);
        assert_eq!(ctx.avg_monthly_income, 0.0);
    }
}
