// Ledger arithmetic: totals, balances, monthly and per-category aggregates.
//
// Every function here is a single pass over a transaction slice. The one
// invariant the application relies on lives here: balance is the signed sum
// of all transactions.

use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;

use crate::format;
use crate::model::{Transaction, TransactionKind};

// ---------------------------------------------------------------------------
// YearMonth
// ---------------------------------------------------------------------------

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        YearMonth { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month `n` months before this one.
    pub fn minus(self, n: u32) -> Self {
        let index = self.year * 12 + self.month as i32 - 1 - n as i32;
        YearMonth {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Sortable key, e.g. `2026-10`.
    pub fn key(self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }

    /// `"octubre de 2026"`
    pub fn label(self) -> String {
        format::month_year_label(self.year, self.month)
    }

    /// `"oct 26"`
    pub fn short_label(self) -> String {
        format::short_month_label(self.year, self.month)
    }
}

/// The date `months` calendar months before `date`, clamped to month end.
pub fn months_before(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

/// Income and expense sums over some set of transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub income: f64,
    pub expenses: f64,
}

impl Totals {
    pub fn add(&mut self, tx: &Transaction) {
        match tx.kind {
            TransactionKind::Income => self.income += tx.amount,
            TransactionKind::Expense => self.expenses += tx.amount,
        }
    }

    pub fn net(&self) -> f64 {
        self.income - self.expenses
    }
}

/// Sum income and expenses over all transactions.
pub fn totals<'a, I>(txs: I) -> Totals
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut t = Totals::default();
    for tx in txs {
        t.add(tx);
    }
    t
}

/// Signed sum of all transactions.
pub fn balance(txs: &[Transaction]) -> f64 {
    totals(txs).net()
}

/// Totals restricted to transactions whose effective date is in `month`.
pub fn month_totals(txs: &[Transaction], month: YearMonth) -> Totals {
    totals(
        txs.iter()
            .filter(|t| t.effective_date().is_some_and(|d| month.contains(d))),
    )
}

/// Totals over transactions dated on or after `since`.
pub fn totals_since(txs: &[Transaction], since: NaiveDate) -> Totals {
    totals(
        txs.iter()
            .filter(|t| t.effective_date().is_some_and(|d| d >= since)),
    )
}

// ---------------------------------------------------------------------------
// Category aggregates
// ---------------------------------------------------------------------------

/// One bucket of the per-category partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub name: String,
    pub kind: TransactionKind,
    pub total: f64,
    pub count: usize,
}

/// Partition transactions by `(kind, category)`.
///
/// Each transaction lands in exactly one bucket, so bucket totals per kind add
/// up to that kind's overall total. Buckets are ordered by kind, then name.
pub fn category_totals(txs: &[Transaction]) -> Vec<CategoryTotal> {
    let mut buckets: BTreeMap<(TransactionKind, &str), (f64, usize)> = BTreeMap::new();
    for tx in txs {
        let entry = buckets
            .entry((tx.kind, tx.category.as_str()))
            .or_insert((0.0, 0));
        entry.0 += tx.amount;
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|((kind, name), (total, count))| CategoryTotal {
            name: name.to_string(),
            kind,
            total,
            count,
        })
        .collect()
}

/// The `n` largest buckets by total (ties broken by name).
pub fn top_categories(txs: &[Transaction], n: usize) -> Vec<CategoryTotal> {
    let mut all = category_totals(txs);
    all.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    all.truncate(n);
    all
}

/// Expense totals keyed by category.
pub fn expenses_by_category(txs: &[Transaction]) -> BTreeMap<String, f64> {
    let mut map = BTreeMap::new();
    for tx in txs.iter().filter(|t| t.is_expense()) {
        *map.entry(tx.category.clone()).or_insert(0.0) += tx.amount;
    }
    map
}

// ---------------------------------------------------------------------------
// Monthly flows
// ---------------------------------------------------------------------------

/// Income and expenses booked in one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyFlow {
    pub month: YearMonth,
    pub income: f64,
    pub expenses: f64,
}

impl MonthlyFlow {
    pub fn net(&self) -> f64 {
        self.income - self.expenses
    }
}

/// The `count` months ending at `last`, oldest first, zero-filled.
pub fn monthly_flows(txs: &[Transaction], last: YearMonth, count: u32) -> Vec<MonthlyFlow> {
    (0..count)
        .rev()
        .map(|back| {
            let month = last.minus(back);
            let t = month_totals(txs, month);
            MonthlyFlow {
                month,
                income: t.income,
                expenses: t.expenses,
            }
        })
        .collect()
}

/// Sort newest first by effective date, then by creation time. Undated
/// transactions go last.
pub fn sort_newest_first(txs: &mut [Transaction]) {
    txs.sort_by(|a, b| {
        b.effective_date()
            .cmp(&a.effective_date())
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
