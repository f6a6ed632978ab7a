// Messages between the app orchestrator and the TUI.
//
// The TUI sends `UserCommand`s; the orchestrator answers with `UiUpdate`s.
// Data changes are pushed as a whole `AppSnapshot` rather than as deltas.

use chrono::NaiveDate;

use finanzas_core::categories::CategorySet;
use finanzas_core::format::parse_clp;
use finanzas_core::ledger::Totals;
use finanzas_core::model::{NewTransaction, Transaction, TransactionKind, ValidationError};
use finanzas_core::stats::Statistics;

// ---------------------------------------------------------------------------
// Tabs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabId {
    #[default]
    Dashboard,
    Transactions,
    Categories,
    Statistics,
    Assistant,
}

impl TabId {
    pub const ALL: [TabId; 5] = [
        TabId::Dashboard,
        TabId::Transactions,
        TabId::Categories,
        TabId::Statistics,
        TabId::Assistant,
    ];

    pub fn title(self) -> &'static str {
        match self {
            TabId::Dashboard => "Inicio",
            TabId::Transactions => "Transacciones",
            TabId::Categories => "Categorías",
            TabId::Statistics => "Estadísticas",
            TabId::Assistant => "Asistente",
        }
    }

    pub fn index(self) -> usize {
        TabId::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn from_index(i: usize) -> Option<TabId> {
        TabId::ALL.get(i).copied()
    }

    pub fn next(self) -> TabId {
        TabId::ALL[(self.index() + 1) % TabId::ALL.len()]
    }

    pub fn prev(self) -> TabId {
        TabId::ALL[(self.index() + TabId::ALL.len() - 1) % TabId::ALL.len()]
    }
}

// ---------------------------------------------------------------------------
// Transaction form
// ---------------------------------------------------------------------------

/// Raw text of the add-transaction form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionForm {
    pub kind: TransactionKind,
    pub amount: String,
    pub category: String,
    pub description: String,
    /// `YYYY-MM-DD`; blank means today.
    pub date: String,
}

impl TransactionForm {
    pub fn new(kind: TransactionKind) -> Self {
        TransactionForm {
            kind,
            amount: String::new(),
            category: String::new(),
            description: String::new(),
            date: String::new(),
        }
    }

    /// Parse and validate into an insert payload.
    pub fn parse(&self, today: NaiveDate) -> Result<NewTransaction, ValidationError> {
        if self.amount.trim().is_empty() || self.category.trim().is_empty() {
            return Err(ValidationError::MissingFields);
        }
        let amount = parse_clp(&self.amount)?;
        let date = match self.date.trim() {
            "" => today,
            s => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| ValidationError::InvalidDate(s.to_string()))?,
        };
        let tx = NewTransaction {
            kind: self.kind,
            amount,
            category: self.category.clone(),
            description: Some(self.description.clone()),
            date,
        }
        .normalized();
        tx.validate()?;
        Ok(tx)
    }
}

// ---------------------------------------------------------------------------
// Commands (TUI -> app)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    SignIn {
        email: String,
        password: String,
    },
    SignUp {
        email: String,
        password: String,
        confirm: String,
    },
    ResetPassword {
        email: String,
    },
    SignOut,
    /// Reload every table for the signed-in user.
    Refresh,
    AddTransaction(TransactionForm),
    DeleteTransaction {
        id: String,
    },
    AddCategory {
        kind: TransactionKind,
        name: String,
    },
    DeleteCategory {
        kind: TransactionKind,
        name: String,
    },
    SendChat(String),
    ClearChat,
    RequestAnalysis,
    ToggleValues,
    SwitchTab(TabId),
    ExportCsv,
    Quit,
}

// ---------------------------------------------------------------------------
// Updates (app -> TUI)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// One-line message shown in the status area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSpeaker {
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub speaker: ChatSpeaker,
    pub text: String,
}

/// Everything the tabs render for the signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSnapshot {
    pub user_email: Option<String>,
    pub backend: &'static str,
    pub today: NaiveDate,
    /// Newest first.
    pub transactions: Vec<Transaction>,
    pub balance: f64,
    pub month: Totals,
    pub categories: CategorySet,
    pub statistics: Statistics,
    pub suggestions: Vec<String>,
    pub llm_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Snapshot(Box<AppSnapshot>),
    SignedIn { email: Option<String> },
    SignedOut,
    /// Registration accepted; the user must confirm by email.
    SignUpComplete,
    Notice(Notice),
    Busy(bool),
    TransactionSaved,
    CategorySaved { kind: TransactionKind, name: String },
    ValuesVisible(bool),
    ChatStarted { question: String },
    ChatToken(String),
    ChatComplete(String),
    ChatFailed(String),
    ChatCleared,
    AnalysisStarted,
    AnalysisComplete(String),
    AnalysisFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn tab_cycle_wraps() {
        assert_eq!(TabId::Dashboard.prev(), TabId::Assistant);
        assert_eq!(TabId::Assistant.next(), TabId::Dashboard);
        assert_eq!(TabId::from_index(2), Some(TabId::Categories));
        assert_eq!(TabId::from_index(9), None);
        assert_eq!(TabId::Statistics.index(), 3);
    }

    #[test]
    fn form_parses_grouped_amount_and_defaults_date() {
        let form = TransactionForm {
            amount: "$12.500".into(),
            category: " Alimentación ".into(),
            description: "  ".into(),
            ..TransactionForm::new(TransactionKind::Expense)
        };
        let tx = form.parse(today()).unwrap();
        assert_eq!(tx.amount, 12_500.0);
        assert_eq!(tx.category, "Alimentación");
        assert_eq!(tx.description, None);
        assert_eq!(tx.date, today());
    }

    #[test]
    fn form_rejects_bad_input() {
        let mut form = TransactionForm::new(TransactionKind::Income);
        assert_eq!(form.parse(today()), Err(ValidationError::MissingFields));

        form.amount = "0".into();
        form.category = "Salario".into();
        assert!(matches!(form.parse(today()), Err(ValidationError::InvalidAmount(_))));

        form.amount = "100".into();
        form.date = "19/10/2026".into();
        assert_eq!(
            form.parse(today()),
            Err(ValidationError::InvalidDate("19/10/2026".into()))
        );

        form.date = "2026-10-01".into();
        assert_eq!(
            form.parse(today()).unwrap().date,
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
        );
    }
}
