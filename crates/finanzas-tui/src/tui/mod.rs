// Terminal front end: view state, update handling, rendering and the
// input/render loop.
//
// The TUI owns a `ViewState` mirroring what the app orchestrator pushes over
// the `UiUpdate` channel. Key presses either mutate the view locally or
// become `UserCommand`s. The screen is redrawn at ~30 fps.

pub mod input;
pub mod layout;
pub mod widgets;

use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use futures_util::StreamExt;
use ratatui::Frame;
use tokio::sync::mpsc;

use finanzas_app::protocol::{
    AppSnapshot, ChatEntry, ChatSpeaker, Notice, TabId, TransactionForm, UiUpdate, UserCommand,
};
use finanzas_core::model::{Transaction, TransactionKind};
use finanzas_llm::protocol::LlmStatus;

use layout::{build_layout, AppLayout};

// ---------------------------------------------------------------------------
// Auth screen state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
    Reset,
}

impl AuthMode {
    pub fn title(self) -> &'static str {
        match self {
            AuthMode::SignIn => "Iniciar sesión",
            AuthMode::SignUp => "Crear cuenta",
            AuthMode::Reset => "Recuperar contraseña",
        }
    }

    /// Number of input fields shown in this mode.
    pub fn field_count(self) -> usize {
        match self {
            AuthMode::SignIn => 2,
            AuthMode::SignUp => 3,
            AuthMode::Reset => 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthForm {
    pub mode: AuthMode,
    pub email: String,
    pub password: String,
    pub confirm: String,
    /// Index of the focused field: email, password, confirm.
    pub focus: usize,
}

impl AuthForm {
    pub fn set_mode(&mut self, mode: AuthMode) {
        self.mode = mode;
        self.password.clear();
        self.confirm.clear();
        self.focus = 0;
    }

    pub fn focused_field(&mut self) -> &mut String {
        match self.focus {
            0 => &mut self.email,
            1 => &mut self.password,
            _ => &mut self.confirm,
        }
    }

    pub fn command(&self) -> UserCommand {
        match self.mode {
            AuthMode::SignIn => UserCommand::SignIn {
                email: self.email.clone(),
                password: self.password.clone(),
            },
            AuthMode::SignUp => UserCommand::SignUp {
                email: self.email.clone(),
                password: self.password.clone(),
                confirm: self.confirm.clone(),
            },
            AuthMode::Reset => UserCommand::ResetPassword {
                email: self.email.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction form overlay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Amount,
    Category,
    Description,
    Date,
}

impl FormField {
    pub const ALL: [FormField; 4] = [
        FormField::Amount,
        FormField::Category,
        FormField::Description,
        FormField::Date,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Amount => "Monto",
            FormField::Category => "Categoría",
            FormField::Description => "Descripción",
            FormField::Date => "Fecha (AAAA-MM-DD)",
        }
    }

    pub fn next(self) -> FormField {
        let i = FormField::ALL.iter().position(|f| *f == self).unwrap_or(0);
        FormField::ALL[(i + 1) % FormField::ALL.len()]
    }

    pub fn prev(self) -> FormField {
        let i = FormField::ALL.iter().position(|f| *f == self).unwrap_or(0);
        FormField::ALL[(i + FormField::ALL.len() - 1) % FormField::ALL.len()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub form: TransactionForm,
    pub focus: FormField,
}

impl FormState {
    pub fn new(kind: TransactionKind) -> Self {
        FormState {
            form: TransactionForm::new(kind),
            focus: FormField::Amount,
        }
    }

    pub fn focused_text(&mut self) -> &mut String {
        match self.focus {
            FormField::Amount => &mut self.form.amount,
            FormField::Category => &mut self.form.category,
            FormField::Description => &mut self.form.description,
            FormField::Date => &mut self.form.date,
        }
    }
}

/// Modal question awaiting y/n.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    Quit,
    DeleteTransaction { id: String, label: String },
    DeleteCategory { kind: TransactionKind, name: String },
}

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// TUI-local state that mirrors the application state for rendering.
pub struct ViewState {
    pub signed_in: bool,
    pub user_email: Option<String>,
    /// Latest data pushed by the app; `None` until the first load.
    pub snapshot: Option<AppSnapshot>,
    pub show_values: bool,
    pub busy: bool,
    pub notice: Option<Notice>,
    pub active_tab: TabId,

    pub auth: AuthForm,
    pub form: Option<FormState>,
    pub confirm: Option<Confirm>,

    /// Cursor in the transactions list (newest first).
    pub selected_transaction: usize,
    pub category_kind: TransactionKind,
    pub selected_category: usize,
    /// Name being typed for a new category.
    pub category_input: Option<String>,

    pub chat: Vec<ChatEntry>,
    pub chat_input: String,
    pub chat_compose: bool,
    pub chat_status: LlmStatus,
    /// Partial assistant reply while tokens stream in.
    pub streaming_reply: String,
    /// Cursor over the quick prompts followed by the suggestions.
    pub chip_index: Option<usize>,

    pub analysis_text: String,
    pub analysis_status: LlmStatus,
    /// Lines scrolled in the statistics and assistant panels.
    pub scroll: u16,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            signed_in: false,
            user_email: None,
            snapshot: None,
            show_values: true,
            busy: false,
            notice: None,
            active_tab: TabId::Dashboard,
            auth: AuthForm::default(),
            form: None,
            confirm: None,
            selected_transaction: 0,
            category_kind: TransactionKind::Expense,
            selected_category: 0,
            category_input: None,
            chat: Vec::new(),
            chat_input: String::new(),
            chat_compose: false,
            chat_status: LlmStatus::Idle,
            streaming_reply: String::new(),
            chip_index: None,
            analysis_text: String::new(),
            analysis_status: LlmStatus::Idle,
            scroll: 0,
        }
    }
}

impl ViewState {
    pub fn transactions(&self) -> &[Transaction] {
        self.snapshot
            .as_ref()
            .map(|s| s.transactions.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected_transaction(&self) -> Option<&Transaction> {
        self.transactions().get(self.selected_transaction)
    }

    /// Categories listed for the current kind on the categories tab.
    pub fn category_names(&self) -> Vec<String> {
        self.snapshot
            .as_ref()
            .map(|s| s.categories.list(self.category_kind).to_vec())
            .unwrap_or_default()
    }

    /// Quick prompts first, then the data-driven suggestions, as
    /// `(label, question)`.
    pub fn chips(&self) -> Vec<(String, String)> {
        let mut chips: Vec<(String, String)> = finanzas_llm::prompt::QUICK_PROMPTS
            .iter()
            .map(|(label, question)| (label.to_string(), question.to_string()))
            .collect();
        if let Some(snap) = &self.snapshot {
            chips.extend(snap.suggestions.iter().map(|s| {
                (
                    s.clone(),
                    format!("{}{}", finanzas_llm::prompt::SUGGESTION_PREFIX, s),
                )
            }));
        }
        chips
    }

    pub fn apply_snapshot(&mut self, snapshot: AppSnapshot) {
        self.user_email = snapshot.user_email.clone().or(self.user_email.take());
        self.snapshot = Some(snapshot);
        self.clamp_cursors();
    }

    fn clamp_cursors(&mut self) {
        let tx_len = self.transactions().len();
        self.selected_transaction = self.selected_transaction.min(tx_len.saturating_sub(1));
        let cat_len = self.category_names().len();
        self.selected_category = self.selected_category.min(cat_len.saturating_sub(1));
    }

    fn reset_user_view(&mut self) {
        self.snapshot = None;
        self.user_email = None;
        self.form = None;
        self.confirm = None;
        self.selected_transaction = 0;
        self.selected_category = 0;
        self.category_input = None;
        self.chat.clear();
        self.chat_input.clear();
        self.chat_compose = false;
        self.chat_status = LlmStatus::Idle;
        self.streaming_reply.clear();
        self.chip_index = None;
        self.analysis_text.clear();
        self.analysis_status = LlmStatus::Idle;
        self.scroll = 0;
        self.active_tab = TabId::Dashboard;
    }
}

// ---------------------------------------------------------------------------
// UiUpdate processing
// ---------------------------------------------------------------------------

/// Apply a single UiUpdate to the ViewState.
pub fn apply_ui_update(state: &mut ViewState, update: UiUpdate) {
    match update {
        UiUpdate::Snapshot(snapshot) => state.apply_snapshot(*snapshot),
        UiUpdate::SignedIn { email } => {
            state.reset_user_view();
            state.signed_in = true;
            state.user_email = email;
            state.auth.set_mode(AuthMode::SignIn);
        }
        UiUpdate::SignedOut => {
            state.reset_user_view();
            state.signed_in = false;
            state.busy = false;
        }
        UiUpdate::SignUpComplete => {
            state.auth.set_mode(AuthMode::SignIn);
        }
        UiUpdate::Notice(notice) => state.notice = Some(notice),
        UiUpdate::Busy(busy) => state.busy = busy,
        UiUpdate::TransactionSaved => {
            state.form = None;
            state.notice = Some(Notice::success("Transacción guardada"));
        }
        UiUpdate::CategorySaved { kind, name } => {
            if let Some(form) = state.form.as_mut() {
                if form.form.kind == kind {
                    form.form.category = name.clone();
                }
            }
            state.category_input = None;
            state.notice = Some(Notice::success(format!("Categoría \"{name}\" agregada")));
        }
        UiUpdate::ValuesVisible(visible) => state.show_values = visible,
        UiUpdate::ChatStarted { question } => {
            state.chat.push(ChatEntry {
                speaker: ChatSpeaker::User,
                text: question,
            });
            state.streaming_reply.clear();
            state.chat_status = LlmStatus::Streaming;
        }
        UiUpdate::ChatToken(token) => {
            state.streaming_reply.push_str(&token);
        }
        UiUpdate::ChatComplete(text) => {
            state.streaming_reply.clear();
            state.chat.push(ChatEntry {
                speaker: ChatSpeaker::Assistant,
                text,
            });
            state.chat_status = LlmStatus::Complete;
        }
        UiUpdate::ChatFailed(text) => {
            state.streaming_reply.clear();
            state.chat.push(ChatEntry {
                speaker: ChatSpeaker::Error,
                text,
            });
            state.chat_status = LlmStatus::Error;
        }
        UiUpdate::ChatCleared => {
            state.chat.clear();
            state.streaming_reply.clear();
            state.chat_status = LlmStatus::Idle;
            state.scroll = 0;
        }
        UiUpdate::AnalysisStarted => {
            state.analysis_text.clear();
            state.analysis_status = LlmStatus::Streaming;
        }
        UiUpdate::AnalysisComplete(text) => {
            state.analysis_text = text;
            state.analysis_status = LlmStatus::Complete;
        }
        UiUpdate::AnalysisFailed(text) => {
            state.analysis_text = text;
            state.analysis_status = LlmStatus::Error;
        }
    }
}

// ---------------------------------------------------------------------------
// Render frame
// ---------------------------------------------------------------------------

/// Render the complete frame for the current view.
pub fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());

    if !state.signed_in {
        widgets::auth::render(frame, layout.body, state);
        widgets::status_bar::render_notice(frame, layout.notice, state);
        widgets::help_bar::render(frame, layout.help_bar, state);
        return;
    }

    widgets::status_bar::render(frame, layout.status_bar, state);
    render_main_panel(frame, &layout, state);
    widgets::status_bar::render_notice(frame, layout.notice, state);
    widgets::help_bar::render(frame, layout.help_bar, state);

    if let Some(form) = &state.form {
        widgets::transaction_form::render(frame, layout.body, form, state);
    }
    if let Some(confirm) = &state.confirm {
        widgets::confirm::render(frame, frame.area(), confirm);
    }
}

fn render_main_panel(frame: &mut Frame, layout: &AppLayout, state: &ViewState) {
    match state.active_tab {
        TabId::Dashboard => widgets::dashboard::render(frame, layout.body, state),
        TabId::Transactions => widgets::transactions::render(frame, layout.body, state),
        TabId::Categories => widgets::categories::render(frame, layout.body, state),
        TabId::Statistics => widgets::statistics::render(frame, layout.body, state),
        TabId::Assistant => widgets::chat::render(frame, layout.body, state),
    }
}

// ---------------------------------------------------------------------------
// Main TUI loop
// ---------------------------------------------------------------------------

/// Run the TUI event loop.
///
/// Initializes the terminal, installs a panic hook that restores it, and
/// selects over UI updates, keyboard input and render ticks until the user
/// quits or the app closes the update channel.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        ratatui::restore();
        original_hook(panic_info);
    }));

    let mut view_state = ViewState::default();
    let mut event_stream = EventStream::new();

    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(ui_update) => apply_ui_update(&mut view_state, ui_update),
                    // App is shutting down.
                    None => break,
                }
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        if key_event.kind == KeyEventKind::Press
                            && key_event.code == KeyCode::Char('c')
                            && key_event.modifiers.contains(KeyModifiers::CONTROL)
                        {
                            let _ = cmd_tx.send(UserCommand::Quit).await;
                            break;
                        }
                        if let Some(cmd) = input::handle_key(key_event, &mut view_state) {
                            let quit = cmd == UserCommand::Quit;
                            let _ = cmd_tx.send(cmd).await;
                            if quit {
                                break;
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }

            _ = render_tick.tick() => {
                terminal.draw(|frame| render_frame(frame, &view_state))?;
            }
        }
    }

    ratatui::restore();
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use finanzas_core::categories::CategorySet;
    use finanzas_core::ledger::{self, YearMonth};
    use finanzas_core::stats::Statistics;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    pub(crate) fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    pub(crate) fn tx(id: &str, kind: TransactionKind, amount: f64, category: &str, day: u32) -> Transaction {
        Transaction {
            id: id.into(),
            user_id: Some("u-1".into()),
            kind,
            amount,
            category: category.into(),
            description: Some(format!("mov {id}")),
            date: NaiveDate::from_ymd_opt(2026, 10, day),
            created_at: None,
        }
    }

    pub(crate) fn sample_snapshot() -> AppSnapshot {
        let transactions = vec![
            tx("3", TransactionKind::Expense, 45_000.0, "Alimentación", 15),
            tx("2", TransactionKind::Expense, 300_000.0, "Hogar", 5),
            tx("1", TransactionKind::Income, 1_200_000.0, "Salario", 1),
        ];
        AppSnapshot {
            user_email: Some("ana@example.com".into()),
            backend: "local",
            today: today(),
            balance: ledger::balance(&transactions),
            month: ledger::month_totals(&transactions, YearMonth::from_date(today())),
            categories: CategorySet::default(),
            statistics: Statistics::compute(&transactions, today()),
            suggestions: vec!["📊 Tu mayor gasto es en Hogar".into()],
            llm_enabled: true,
            transactions,
        }
    }

    pub(crate) fn signed_in_state() -> ViewState {
        let mut state = ViewState::default();
        apply_ui_update(
            &mut state,
            UiUpdate::SignedIn {
                email: Some("ana@example.com".into()),
            },
        );
        apply_ui_update(&mut state, UiUpdate::Snapshot(Box::new(sample_snapshot())));
        state
    }

    /// Render into a test terminal and return the screen as text.
    pub(crate) fn render_to_string(state: &ViewState, width: u16, height: u16) -> String {
        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render_frame(frame, state)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn view_state_default_is_signed_out() {
        let state = ViewState::default();
        assert!(!state.signed_in);
        assert!(state.snapshot.is_none());
        assert!(state.show_values);
        assert_eq!(state.active_tab, TabId::Dashboard);
        assert_eq!(state.auth.mode, AuthMode::SignIn);
        assert_eq!(state.chat_status, LlmStatus::Idle);
    }

    #[test]
    fn sign_in_then_out_resets_view() {
        let mut state = signed_in_state();
        assert!(state.signed_in);
        assert_eq!(state.transactions().len(), 3);
        state.active_tab = TabId::Statistics;
        state.analysis_text = "algo".into();

        apply_ui_update(&mut state, UiUpdate::SignedOut);
        assert!(!state.signed_in);
        assert!(state.snapshot.is_none());
        assert!(state.analysis_text.is_empty());
        assert_eq!(state.active_tab, TabId::Dashboard);
    }

    #[test]
    fn chat_stream_accumulates_then_commits() {
        let mut state = signed_in_state();
        apply_ui_update(
            &mut state,
            UiUpdate::ChatStarted {
                question: "¿Cómo voy?".into(),
            },
        );
        apply_ui_update(&mut state, UiUpdate::ChatToken("Vas ".into()));
        apply_ui_update(&mut state, UiUpdate::ChatToken("bien".into()));
        assert_eq!(state.streaming_reply, "Vas bien");
        assert_eq!(state.chat_status, LlmStatus::Streaming);

        apply_ui_update(&mut state, UiUpdate::ChatComplete("Vas bien.".into()));
        assert!(state.streaming_reply.is_empty());
        assert_eq!(state.chat.len(), 2);
        assert_eq!(state.chat[1].speaker, ChatSpeaker::Assistant);

        apply_ui_update(&mut state, UiUpdate::ChatFailed("error".into()));
        assert_eq!(state.chat[2].speaker, ChatSpeaker::Error);
        assert_eq!(state.chat_status, LlmStatus::Error);

        apply_ui_update(&mut state, UiUpdate::ChatCleared);
        assert!(state.chat.is_empty());
    }

    #[test]
    fn saved_category_fills_open_form() {
        let mut state = signed_in_state();
        state.form = Some(FormState::new(TransactionKind::Expense));
        apply_ui_update(
            &mut state,
            UiUpdate::CategorySaved {
                kind: TransactionKind::Expense,
                name: "Mascotas".into(),
            },
        );
        assert_eq!(state.form.as_ref().unwrap().form.category, "Mascotas");

        apply_ui_update(&mut state, UiUpdate::TransactionSaved);
        assert!(state.form.is_none());
        assert_eq!(state.notice, Some(Notice::success("Transacción guardada")));
    }

    #[test]
    fn snapshot_clamps_selection() {
        let mut state = signed_in_state();
        state.selected_transaction = 2;
        let mut snap = sample_snapshot();
        snap.transactions.truncate(1);
        apply_ui_update(&mut state, UiUpdate::Snapshot(Box::new(snap)));
        assert_eq!(state.selected_transaction, 0);
    }

    #[test]
    fn chips_list_quick_prompts_then_suggestions() {
        let state = signed_in_state();
        let chips = state.chips();
        assert_eq!(chips.len(), 4);
        assert_eq!(chips[0].1, "¿Cómo puedo ahorrar más dinero?");
        assert_eq!(chips[3].1, "Explícame: 📊 Tu mayor gasto es en Hogar");
    }

    #[test]
    fn every_tab_renders() {
        let mut state = signed_in_state();
        for tab in TabId::ALL {
            state.active_tab = tab;
            let screen = render_to_string(&state, 120, 40);
            assert!(screen.contains(tab.title()), "tab {tab:?} missing its title");
        }
    }

    #[test]
    fn signed_out_renders_auth_screen() {
        let state = ViewState::default();
        let screen = render_to_string(&state, 100, 30);
        assert!(screen.contains("Iniciar sesión"));
        assert!(screen.contains("Email"));
    }

    #[test]
    fn tiny_terminal_does_not_panic() {
        let mut state = signed_in_state();
        state.form = Some(FormState::new(TransactionKind::Income));
        state.confirm = Some(Confirm::Quit);
        for tab in TabId::ALL {
            state.active_tab = tab;
            render_to_string(&state, 20, 6);
        }
    }
}
