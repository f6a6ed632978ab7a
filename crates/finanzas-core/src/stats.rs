// Figures behind the statistics tab and the AI analysis request.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::ledger::{self, MonthlyFlow, YearMonth};
use crate::model::{Transaction, TransactionKind};

/// Category that marks a paycheck.
pub const SALARY_CATEGORY: &str = "Salario";

/// Months shown in the income/expense comparison.
pub const COMPARISON_MONTHS: u32 = 6;

/// Income and expenses of one month, keyed by `YYYY-MM` in [`Statistics::monthly_map`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthFigures {
    pub income: f64,
    pub expenses: f64,
}

/// One point of the daily spending series since the last salary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyExpense {
    pub date: NaiveDate,
    pub amount: f64,
    pub cumulative: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_income: f64,
    pub total_expenses: f64,
    /// Latest salary booked in the current month, if any.
    pub last_salary_date: Option<NaiveDate>,
    pub expenses_since_salary: f64,
    pub daily_expenses: Vec<DailyExpense>,
    pub expenses_by_category: BTreeMap<String, f64>,
    pub monthly: Vec<MonthlyFlow>,
    pub savings_rate: f64,
}

impl Statistics {
    pub fn compute(txs: &[Transaction], today: NaiveDate) -> Self {
        let current = YearMonth::from_date(today);
        let totals = ledger::totals(txs);

        let last_salary_date = txs
            .iter()
            .filter(|t| t.kind == TransactionKind::Income && t.category == SALARY_CATEGORY)
            .filter_map(|t| t.effective_date())
            .filter(|d| current.contains(*d))
            .max();

        let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        if let Some(since) = last_salary_date {
            for tx in txs.iter().filter(|t| t.is_expense()) {
                if let Some(d) = tx.effective_date().filter(|d| *d >= since) {
                    *by_day.entry(d).or_insert(0.0) += tx.amount;
                }
            }
        }

        let mut running = 0.0;
        let daily_expenses: Vec<DailyExpense> = by_day
            .into_iter()
            .map(|(date, amount)| {
                running += amount;
                DailyExpense {
                    date,
                    amount,
                    cumulative: running,
                }
            })
            .collect();

        Statistics {
            total_income: totals.income,
            total_expenses: totals.expenses,
            last_salary_date,
            expenses_since_salary: running,
            daily_expenses,
            expenses_by_category: ledger::expenses_by_category(txs),
            monthly: ledger::monthly_flows(txs, current, COMPARISON_MONTHS),
            savings_rate: savings_rate(totals.income, totals.expenses),
        }
    }

    /// Monthly comparison keyed by `YYYY-MM`, as embedded in the analysis prompt.
    pub fn monthly_map(&self) -> BTreeMap<String, MonthFigures> {
        self.monthly
            .iter()
            .map(|m| {
                (
                    m.month.key(),
                    MonthFigures {
                        income: m.income,
                        expenses: m.expenses,
                    },
                )
            })
            .collect()
    }

    /// Largest single-month expense figure in the comparison, for bar scaling.
    pub fn monthly_peak(&self) -> f64 {
        self.monthly
            .iter()
            .flat_map(|m| [m.income, m.expenses])
            .fold(0.0, f64::max)
    }
}

/// `(income - expenses) / income * 100`, or `0` when there is no income.
pub fn savings_rate(income: f64, expenses: f64) -> f64 {
    if income > 0.0 {
        (income - expenses) / income * 100.0
    } else {
        0.0
    }
}
