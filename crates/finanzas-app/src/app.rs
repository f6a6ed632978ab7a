// Application state and orchestration logic.
//
// The central event loop coordinates user commands from the TUI and events
// from the LLM task. It owns the loaded rows for the signed-in user, talks to
// the backend, and pushes UI updates to the TUI render loop.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use finanzas_core::categories::CategorySet;
use finanzas_core::config::Config;
use finanzas_core::context::{FinancialContext, FinancialSnapshot};
use finanzas_core::ledger::{self, YearMonth};
use finanzas_core::model::{CustomCategory, NewCustomCategory, SavingsGoal, Transaction, TransactionKind};
use finanzas_core::stats::Statistics;
use finanzas_llm::client::{CompletionParams, LlmClient};
use finanzas_llm::prompt::{self, CHAT_ERROR_MESSAGE};
use finanzas_llm::protocol::{ChatMessage, LlmEvent};

use crate::auth::{self, SessionStore};
use crate::backend::{Backend, BackendError, Session, SignUpOutcome};
use crate::chat::{ChatError, ChatService};
use crate::export;
use crate::protocol::{AppSnapshot, Notice, TabId, TransactionForm, UiUpdate, UserCommand};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// What the LLM is currently working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmMode {
    /// Answering the pending chat question.
    Chat,
    /// Producing the statistics-tab analysis.
    Analysis,
}

pub const ANALYSIS_ERROR_MESSAGE: &str =
    "No se pudo generar el análisis. Verifica tu configuración de OpenAI e intenta de nuevo.";

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    /// `None` disables persistence (tests, or no data directory).
    pub session_store: Option<SessionStore>,
    pub session: Option<Session>,

    /// Newest first.
    pub transactions: Vec<Transaction>,
    pub stored_balance: Option<f64>,
    pub goals: Vec<SavingsGoal>,
    pub custom_categories: Vec<CustomCategory>,
    pub categories: CategorySet,

    pub chat: ChatService,
    pub show_values: bool,
    pub active_tab: TabId,
    /// Where CSV exports are written.
    pub export_dir: PathBuf,
    /// Pinned date for deterministic runs; `None` uses the local clock.
    pub fixed_today: Option<NaiveDate>,

    pub llm_client: Arc<LlmClient>,
    /// Spawned tasks stream through a clone of this sender.
    pub llm_tx: mpsc::Sender<LlmEvent>,
    pub current_llm_task: Option<JoinHandle<()>>,
    pub llm_mode: Option<LlmMode>,
    /// Identifies the current LLM task; events from older generations are
    /// dropped in `handle_llm_event`.
    pub llm_generation: u64,
}

impl AppState {
    pub fn new(
        config: Config,
        backend: Arc<dyn Backend>,
        session_store: Option<SessionStore>,
        llm_client: LlmClient,
        llm_tx: mpsc::Sender<LlmEvent>,
    ) -> Self {
        let chat = ChatService::new(config.llm.history_limit);
        let show_values = config.ui.show_values;
        AppState {
            config,
            backend,
            session_store,
            session: None,
            transactions: Vec::new(),
            stored_balance: None,
            goals: Vec::new(),
            custom_categories: Vec::new(),
            categories: CategorySet::default(),
            chat,
            show_values,
            active_tab: TabId::Dashboard,
            export_dir: PathBuf::from("."),
            fixed_today: None,
            llm_client: Arc::new(llm_client),
            llm_tx,
            current_llm_task: None,
            llm_mode: None,
            llm_generation: 0,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.fixed_today.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user.id.as_str())
    }

    /// Balance shown on the dashboard: Σ income − Σ expense over the loaded
    /// rows.
    pub fn balance(&self) -> f64 {
        ledger::balance(&self.transactions)
    }

    pub fn financial_context(&self) -> FinancialContext {
        FinancialContext::build(
            FinancialSnapshot {
                user_id: self.user_id().unwrap_or_default().to_string(),
                transactions: self.transactions.clone(),
                stored_balance: self.stored_balance,
                goals: self.goals.clone(),
                custom_categories: self.custom_categories.clone(),
            },
            self.today(),
            &self.config.context,
        )
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let today = self.today();
        let context = self.financial_context();
        AppSnapshot {
            user_email: self.session.as_ref().and_then(|s| s.user.email.clone()),
            backend: self.backend.name(),
            today,
            transactions: self.transactions.clone(),
            balance: self.balance(),
            month: ledger::month_totals(&self.transactions, YearMonth::from_date(today)),
            categories: self.categories.clone(),
            statistics: Statistics::compute(&self.transactions, today),
            suggestions: prompt::suggestions(&context),
            llm_enabled: self.llm_client.is_enabled(),
        }
    }

    fn clear_user_data(&mut self) {
        self.session = None;
        self.transactions.clear();
        self.stored_balance = None;
        self.goals.clear();
        self.custom_categories.clear();
        self.categories = CategorySet::default();
        self.chat.clear();
    }

    // -- session --

    /// Restore the persisted session, if any. Returns whether a user is
    /// signed in afterwards.
    pub async fn restore_session(&mut self) -> anyhow::Result<bool> {
        let Some(store) = &self.session_store else {
            return Ok(false);
        };
        let restored = auth::restore_session(self.backend.as_ref(), store, Utc::now()).await?;
        self.session = restored;
        Ok(self.session.is_some())
    }

    fn persist_session(&self) {
        if let (Some(store), Some(session)) = (&self.session_store, &self.session) {
            if let Err(e) = store.save(session) {
                warn!("could not persist session: {e:#}");
            }
        }
    }

    /// Refresh an expired access token before a backend call.
    async fn ensure_fresh_session(&mut self) -> Result<String, BackendError> {
        let Some(session) = self.session.clone() else {
            return Err(BackendError::NotAuthenticated);
        };
        if session.is_expired(Utc::now()) {
            debug!("access token expired, refreshing");
            let fresh = self.backend.refresh_session(&session.refresh_token).await?;
            self.session = Some(fresh);
            self.persist_session();
        }
        Ok(self.session.as_ref().map(|s| s.user.id.clone()).unwrap_or_default())
    }

    // -- data --

    /// Load every table for the signed-in user. Balance, goals and custom
    /// categories degrade to empty when their tables cannot be read.
    pub async fn load_user_data(&mut self) -> Result<(), BackendError> {
        let user_id = self.ensure_fresh_session().await?;
        let backend = Arc::clone(&self.backend);

        let mut transactions = backend.list_transactions(&user_id, None).await?;
        ledger::sort_newest_first(&mut transactions);

        self.stored_balance = match backend.fetch_balance(&user_id).await {
            Ok(row) => row.map(|b| b.balance),
            Err(e) => {
                warn!("balance snapshot unavailable: {e}");
                None
            }
        };
        self.goals = backend.list_goals(&user_id).await.unwrap_or_else(|e| {
            warn!("savings goals unavailable: {e}");
            Vec::new()
        });
        self.custom_categories = backend
            .list_custom_categories(&user_id)
            .await
            .unwrap_or_else(|e| {
                warn!("custom categories unavailable: {e}");
                Vec::new()
            });
        self.categories = CategorySet::with_custom(&self.custom_categories);

        info!(
            user_id = %user_id,
            transactions = transactions.len(),
            goals = self.goals.len(),
            custom_categories = self.custom_categories.len(),
            "user data loaded"
        );
        self.transactions = transactions;
        Ok(())
    }

    async fn reload_balance(&mut self, user_id: &str) {
        match self.backend.fetch_balance(user_id).await {
            Ok(row) => self.stored_balance = row.map(|b| b.balance),
            Err(e) => warn!("balance snapshot unavailable: {e}"),
        }
    }

    // -- LLM --

    pub fn cancel_llm_task(&mut self) {
        if let Some(handle) = self.current_llm_task.take() {
            handle.abort();
            info!("cancelled previous LLM task");
        }
        if self.llm_mode.take() == Some(LlmMode::Chat) {
            self.chat.abandon_turn();
        }
    }

    fn next_generation(&mut self, mode: LlmMode) -> u64 {
        self.cancel_llm_task();
        self.llm_generation += 1;
        self.llm_mode = Some(mode);
        self.llm_generation
    }

    /// Start an assistant turn. The reply streams back as `LlmEvent`s.
    pub fn start_chat(&mut self, question: &str) -> Result<(), ChatError> {
        if self.llm_mode == Some(LlmMode::Analysis) {
            self.cancel_llm_task();
        }
        let user_id = self.user_id().unwrap_or_default().to_string();
        let context = self.financial_context();
        let messages = self.chat.begin_turn(&user_id, &context, question)?;
        let params = CompletionParams::chat(&self.config.llm);

        let generation = self.next_generation(LlmMode::Chat);
        let client = Arc::clone(&self.llm_client);
        let tx = self.llm_tx.clone();
        self.current_llm_task = Some(tokio::spawn(async move {
            if let Err(e) = client.stream_chat(&messages, &params, tx, generation).await {
                warn!("chat task failed: {e}");
            }
        }));
        info!(generation, "chat turn started");
        Ok(())
    }

    /// Start the statistics analysis as a single non-streamed completion.
    pub fn start_analysis(&mut self) {
        let today = self.today();
        let stats = Statistics::compute(&self.transactions, today);
        let messages = vec![
            ChatMessage::system(prompt::ANALYSIS_SYSTEM_PROMPT),
            ChatMessage::user(prompt::analysis_prompt(self.balance(), &stats)),
        ];
        let params = CompletionParams::analysis(&self.config.llm);

        let generation = self.next_generation(LlmMode::Analysis);
        let client = Arc::clone(&self.llm_client);
        let tx = self.llm_tx.clone();
        self.current_llm_task = Some(tokio::spawn(async move {
            let event = match client.complete(&messages, &params).await {
                Ok(done) => LlmEvent::Complete {
                    full_text: done.content,
                    input_tokens: done.input_tokens,
                    output_tokens: done.output_tokens,
                    generation,
                },
                Err(e) => LlmEvent::Error {
                    message: e.to_string(),
                    generation,
                },
            };
            let _ = tx.send(event).await;
        }));
        info!(generation, "analysis started");
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the main application event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. LLM events from the spawned completion task
/// 2. User commands from the TUI
///
/// Pushes UI updates through `ui_tx` for the TUI render loop.
pub async fn run(
    mut llm_rx: mpsc::Receiver<LlmEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!(backend = state.backend.name(), "application event loop started");

    match state.restore_session().await {
        Ok(true) => {
            let email = state.session.as_ref().and_then(|s| s.user.email.clone());
            let _ = ui_tx.send(UiUpdate::SignedIn { email }).await;
            reload_and_push(&mut state, &ui_tx).await;
        }
        Ok(false) => {
            let _ = ui_tx.send(UiUpdate::SignedOut).await;
        }
        Err(e) => {
            warn!("session restore failed: {e:#}");
            let _ = ui_tx.send(UiUpdate::SignedOut).await;
            let _ = ui_tx
                .send(UiUpdate::Notice(Notice::error(
                    "No se pudo restaurar la sesión. Inicia sesión nuevamente.",
                )))
                .await;
        }
    }

    let _ = ui_tx.send(UiUpdate::ValuesVisible(state.show_values)).await;

    // When the LLM channel closes, stop polling it so select! never spins.
    let mut llm_open = true;

    loop {
        tokio::select! {
            llm_event = llm_rx.recv(), if llm_open => {
                match llm_event {
                    Some(event) => handle_llm_event(&mut state, event, &ui_tx).await,
                    None => {
                        info!("LLM channel closed");
                        llm_open = false;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => handle_user_command(&mut state, cmd, &ui_tx).await,
                    None => {
                        info!("command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    state.cancel_llm_task();
    info!("application event loop exiting");
    Ok(())
}

async fn notify(ui_tx: &mpsc::Sender<UiUpdate>, notice: Notice) {
    let _ = ui_tx.send(UiUpdate::Notice(notice)).await;
}

async fn push_snapshot(state: &AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    let _ = ui_tx
        .send(UiUpdate::Snapshot(Box::new(state.build_snapshot())))
        .await;
}

/// Report a backend failure. An expired session signs the user out.
async fn report_backend_error(
    state: &mut AppState,
    err: BackendError,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    warn!("backend error: {err}");
    if matches!(err, BackendError::SessionExpired | BackendError::NotAuthenticated) {
        state.cancel_llm_task();
        state.clear_user_data();
        state.backend.set_session(None);
        if let Some(store) = &state.session_store {
            let _ = store.clear();
        }
        let _ = ui_tx.send(UiUpdate::SignedOut).await;
    }
    notify(ui_tx, Notice::error(err.user_message())).await;
}

async fn reload_and_push(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    let _ = ui_tx.send(UiUpdate::Busy(true)).await;
    match state.load_user_data().await {
        Ok(()) => push_snapshot(state, ui_tx).await,
        Err(e) => report_backend_error(state, e, ui_tx).await,
    }
    let _ = ui_tx.send(UiUpdate::Busy(false)).await;
}

async fn finish_sign_in(state: &mut AppState, session: Session, ui_tx: &mpsc::Sender<UiUpdate>) {
    let email = session.user.email.clone();
    state.clear_user_data();
    state.session = Some(session);
    state.persist_session();
    let _ = ui_tx.send(UiUpdate::SignedIn { email }).await;
    notify(ui_tx, Notice::success(auth::SIGN_IN_OK)).await;
    reload_and_push(state, ui_tx).await;
}

/// Handle an event from the LLM task.
async fn handle_llm_event(state: &mut AppState, event: LlmEvent, ui_tx: &mpsc::Sender<UiUpdate>) {
    if event.generation() != state.llm_generation {
        debug!(
            event_generation = event.generation(),
            current = state.llm_generation,
            "discarding stale LLM event"
        );
        return;
    }

    match (state.llm_mode, event) {
        (Some(LlmMode::Chat), LlmEvent::Token { text, .. }) => {
            let _ = ui_tx.send(UiUpdate::ChatToken(text)).await;
        }
        (Some(LlmMode::Chat), LlmEvent::Complete { full_text, output_tokens, .. }) => {
            state.chat.finish_turn(&full_text);
            state.llm_mode = None;
            state.current_llm_task = None;
            debug!(output_tokens, "chat reply complete");
            let _ = ui_tx.send(UiUpdate::ChatComplete(full_text)).await;
        }
        (Some(LlmMode::Chat), LlmEvent::Error { message, .. }) => {
            warn!("chat error: {message}");
            state.chat.abandon_turn();
            state.llm_mode = None;
            state.current_llm_task = None;
            let _ = ui_tx
                .send(UiUpdate::ChatFailed(CHAT_ERROR_MESSAGE.to_string()))
                .await;
        }
        (Some(LlmMode::Analysis), LlmEvent::Token { .. }) => {}
        (Some(LlmMode::Analysis), LlmEvent::Complete { full_text, .. }) => {
            state.llm_mode = None;
            state.current_llm_task = None;
            let _ = ui_tx.send(UiUpdate::AnalysisComplete(full_text)).await;
        }
        (Some(LlmMode::Analysis), LlmEvent::Error { message, .. }) => {
            warn!("analysis error: {message}");
            state.llm_mode = None;
            state.current_llm_task = None;
            let _ = ui_tx
                .send(UiUpdate::AnalysisFailed(ANALYSIS_ERROR_MESSAGE.to_string()))
                .await;
        }
        (None, _) => {
            debug!("LLM event with no active mode, discarding");
        }
    }
}

/// Handle a user command from the TUI.
async fn handle_user_command(
    state: &mut AppState,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    match cmd {
        UserCommand::SignIn { email, password } => {
            if let Err(e) = auth::validate_sign_in(&email, &password) {
                notify(ui_tx, Notice::error(e.to_string())).await;
                return;
            }
            match state.backend.sign_in(&email, &password).await {
                Ok(session) => finish_sign_in(state, session, ui_tx).await,
                Err(e) => notify(ui_tx, Notice::error(e.user_message())).await,
            }
        }
        UserCommand::SignUp {
            email,
            password,
            confirm,
        } => {
            if let Err(e) = auth::validate_sign_up(&email, &password, &confirm) {
                notify(ui_tx, Notice::error(e.to_string())).await;
                return;
            }
            match state.backend.sign_up(&email, &password).await {
                Ok(SignUpOutcome::SignedIn(session)) => {
                    finish_sign_in(state, session, ui_tx).await;
                }
                Ok(SignUpOutcome::ConfirmationRequired { email }) => {
                    info!(%email, "sign-up awaiting confirmation");
                    let _ = ui_tx.send(UiUpdate::SignUpComplete).await;
                    notify(ui_tx, Notice::success(auth::SIGN_UP_OK)).await;
                }
                Err(e) => notify(ui_tx, Notice::error(e.user_message())).await,
            }
        }
        UserCommand::ResetPassword { email } => {
            if let Err(e) = auth::validate_reset(&email) {
                notify(ui_tx, Notice::error(e.to_string())).await;
                return;
            }
            match state.backend.reset_password(&email).await {
                Ok(()) => notify(ui_tx, Notice::success(auth::RESET_SENT)).await,
                Err(e) => notify(ui_tx, Notice::error(e.user_message())).await,
            }
        }
        UserCommand::SignOut => {
            state.cancel_llm_task();
            if let Err(e) = state.backend.sign_out().await {
                warn!("sign-out failed: {e}");
            }
            if let Some(store) = &state.session_store {
                if let Err(e) = store.clear() {
                    warn!("could not remove stored session: {e:#}");
                }
            }
            state.clear_user_data();
            info!("signed out");
            let _ = ui_tx.send(UiUpdate::SignedOut).await;
        }
        UserCommand::Refresh => {
            reload_and_push(state, ui_tx).await;
        }
        UserCommand::AddTransaction(form) => add_transaction(state, form, ui_tx).await,
        UserCommand::DeleteTransaction { id } => delete_transaction(state, &id, ui_tx).await,
        UserCommand::AddCategory { kind, name } => add_category(state, kind, &name, ui_tx).await,
        UserCommand::DeleteCategory { kind, name } => {
            delete_category(state, kind, &name, ui_tx).await
        }
        UserCommand::SendChat(question) => {
            let question = question.trim().to_string();
            if question.is_empty() {
                return;
            }
            match state.start_chat(&question) {
                Ok(()) => {
                    let _ = ui_tx.send(UiUpdate::ChatStarted { question }).await;
                }
                Err(ChatError::EmptyMessage) => {}
                Err(ChatError::Busy) => {
                    notify(ui_tx, Notice::info("Espera la respuesta anterior")).await;
                }
                Err(e @ ChatError::Ownership(_)) => {
                    let _ = ui_tx.send(UiUpdate::ChatFailed(e.to_string())).await;
                    notify(ui_tx, Notice::error(e.to_string())).await;
                }
            }
        }
        UserCommand::ClearChat => {
            if state.llm_mode == Some(LlmMode::Chat) {
                state.cancel_llm_task();
            }
            state.chat.clear();
            let _ = ui_tx.send(UiUpdate::ChatCleared).await;
        }
        UserCommand::RequestAnalysis => {
            if state.transactions.is_empty() {
                notify(
                    ui_tx,
                    Notice::info("Agrega transacciones para generar un análisis"),
                )
                .await;
                return;
            }
            state.start_analysis();
            let _ = ui_tx.send(UiUpdate::AnalysisStarted).await;
        }
        UserCommand::ToggleValues => {
            state.show_values = !state.show_values;
            let _ = ui_tx.send(UiUpdate::ValuesVisible(state.show_values)).await;
        }
        UserCommand::SwitchTab(tab) => {
            state.active_tab = tab;
        }
        UserCommand::ExportCsv => {
            let path = export::export_path(&state.export_dir, state.today());
            match export::write_csv(&path, &state.transactions) {
                Ok(rows) => {
                    info!(rows, path = %path.display(), "transactions exported");
                    notify(
                        ui_tx,
                        Notice::success(format!(
                            "{rows} transacciones exportadas a {}",
                            path.display()
                        )),
                    )
                    .await;
                }
                Err(e) => {
                    warn!("export failed: {e:#}");
                    notify(ui_tx, Notice::error("No se pudo exportar el archivo CSV")).await;
                }
            }
        }
        UserCommand::Quit => {
            // Handled by the run loop.
        }
    }
}

async fn add_transaction(state: &mut AppState, form: TransactionForm, ui_tx: &mpsc::Sender<UiUpdate>) {
    let new_tx = match form.parse(state.today()) {
        Ok(tx) => tx,
        Err(e) => {
            notify(ui_tx, Notice::error(e.to_string())).await;
            return;
        }
    };
    let user_id = match state.ensure_fresh_session().await {
        Ok(id) => id,
        Err(e) => return report_backend_error(state, e, ui_tx).await,
    };
    match state.backend.insert_transaction(&user_id, &new_tx).await {
        Ok(saved) => {
            info!(id = %saved.id, kind = saved.kind.as_str(), "transaction added");
            state.transactions.push(saved);
            ledger::sort_newest_first(&mut state.transactions);
            state.reload_balance(&user_id).await;
            let _ = ui_tx.send(UiUpdate::TransactionSaved).await;
            push_snapshot(state, ui_tx).await;
        }
        Err(e) => report_backend_error(state, e, ui_tx).await,
    }
}

async fn delete_transaction(state: &mut AppState, id: &str, ui_tx: &mpsc::Sender<UiUpdate>) {
    let user_id = match state.ensure_fresh_session().await {
        Ok(user_id) => user_id,
        Err(e) => return report_backend_error(state, e, ui_tx).await,
    };
    match state.backend.delete_transaction(&user_id, id).await {
        Ok(()) => {
            state.transactions.retain(|t| t.id != id);
            state.reload_balance(&user_id).await;
            info!(id, "transaction deleted");
            notify(ui_tx, Notice::success("Transacción eliminada")).await;
            push_snapshot(state, ui_tx).await;
        }
        Err(e) => report_backend_error(state, e, ui_tx).await,
    }
}

async fn add_category(
    state: &mut AppState,
    kind: TransactionKind,
    name: &str,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    let name = match state.categories.validate_new(kind, name) {
        Ok(n) => n,
        Err(e) => {
            notify(ui_tx, Notice::error(e.to_string())).await;
            return;
        }
    };
    let user_id = match state.ensure_fresh_session().await {
        Ok(id) => id,
        Err(e) => return report_backend_error(state, e, ui_tx).await,
    };
    match state
        .backend
        .insert_custom_category(&user_id, &NewCustomCategory::new(kind, &name))
        .await
    {
        Ok(row) => {
            state.custom_categories.push(row);
            state.categories.insert(kind, &name);
            info!(%name, kind = kind.as_str(), "category added");
            let _ = ui_tx.send(UiUpdate::CategorySaved { kind, name }).await;
            push_snapshot(state, ui_tx).await;
        }
        Err(e) => report_backend_error(state, e, ui_tx).await,
    }
}

async fn delete_category(
    state: &mut AppState,
    kind: TransactionKind,
    name: &str,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    if let Err(e) = state.categories.validate_delete(kind, name, &state.transactions) {
        notify(ui_tx, Notice::error(e.to_string())).await;
        return;
    }
    let user_id = match state.ensure_fresh_session().await {
        Ok(id) => id,
        Err(e) => return report_backend_error(state, e, ui_tx).await,
    };
    match state.backend.delete_custom_category(&user_id, kind, name).await {
        Ok(()) => {
            state
                .custom_categories
                .retain(|c| !(c.kind() == kind && c.name == name));
            state.categories.remove(kind, name);
            info!(name, kind = kind.as_str(), "category deleted");
            notify(ui_tx, Notice::success("Categoría eliminada")).await;
            push_snapshot(state, ui_tx).await;
        }
        Err(e) => report_backend_error(state, e, ui_tx).await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use finanzas_core::config::{BackendKind, Config};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.backend.kind = BackendKind::Local;
        config.backend.local_path = ":memory:".into();
        config
    }

    async fn signed_in_state() -> (AppState, mpsc::Receiver<LlmEvent>) {
        let backend = Arc::new(LocalBackend::open_in_memory().unwrap());
        let SignUpOutcome::SignedIn(session) =
            backend.sign_up("ana@example.com", "secreto").await.unwrap()
        else {
            panic!("local sign-up signs in");
        };
        let (llm_tx, llm_rx) = mpsc::channel(64);
        let mut state = AppState::new(test_config(), backend, None, LlmClient::Disabled, llm_tx);
        state.fixed_today = NaiveDate::from_ymd_opt(2026, 10, 19);
        state.session = Some(session);
        (state, llm_rx)
    }

    fn drain(rx: &mut mpsc::Receiver<UiUpdate>) -> Vec<UiUpdate> {
        let mut out = Vec::new();
        while let Ok(u) = rx.try_recv() {
            out.push(u);
        }
        out
    }

    fn form(kind: TransactionKind, amount: &str, category: &str) -> TransactionForm {
        TransactionForm {
            amount: amount.into(),
            category: category.into(),
            date: "2026-10-10".into(),
            ..TransactionForm::new(kind)
        }
    }

    #[tokio::test]
    async fn add_and_delete_transaction_updates_snapshot() {
        let (mut state, _llm_rx) = signed_in_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(64);

        handle_user_command(
            &mut state,
            UserCommand::AddTransaction(form(TransactionKind::Income, "500.000", "Salario")),
            &ui_tx,
        )
        .await;
        handle_user_command(
            &mut state,
            UserCommand::AddTransaction(form(TransactionKind::Expense, "120000", "Hogar")),
            &ui_tx,
        )
        .await;
        assert_eq!(state.balance(), 380_000.0);
        assert_eq!(state.stored_balance, Some(380_000.0));

        let updates = drain(&mut ui_rx);
        assert!(updates.contains(&UiUpdate::TransactionSaved));
        let Some(UiUpdate::Snapshot(snap)) = updates.last().cloned() else {
            panic!("expected snapshot last, got {updates:?}");
        };
        assert_eq!(snap.transactions.len(), 2);
        assert_eq!(snap.month.income, 500_000.0);
        assert!(!snap.llm_enabled);

        let id = state.transactions[0].id.clone();
        handle_user_command(&mut state, UserCommand::DeleteTransaction { id }, &ui_tx).await;
        assert_eq!(state.transactions.len(), 1);
        assert_eq!(state.stored_balance, Some(state.balance()));
    }

    #[tokio::test]
    async fn invalid_form_becomes_notice() {
        let (mut state, _llm_rx) = signed_in_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(16);
        handle_user_command(
            &mut state,
            UserCommand::AddTransaction(form(TransactionKind::Expense, "", "Hogar")),
            &ui_tx,
        )
        .await;
        assert_eq!(
            drain(&mut ui_rx),
            vec![UiUpdate::Notice(Notice::error(
                "Por favor completa todos los campos requeridos"
            ))]
        );
        assert!(state.transactions.is_empty());
    }

    #[tokio::test]
    async fn category_rules_are_enforced() {
        let (mut state, _llm_rx) = signed_in_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(64);

        handle_user_command(
            &mut state,
            UserCommand::AddCategory {
                kind: TransactionKind::Expense,
                name: " Mascotas ".into(),
            },
            &ui_tx,
        )
        .await;
        assert!(state.categories.contains(TransactionKind::Expense, "Mascotas"));
        assert!(drain(&mut ui_rx).contains(&UiUpdate::CategorySaved {
            kind: TransactionKind::Expense,
            name: "Mascotas".into()
        }));

        handle_user_command(
            &mut state,
            UserCommand::DeleteCategory {
                kind: TransactionKind::Expense,
                name: "Hogar".into(),
            },
            &ui_tx,
        )
        .await;
        assert_eq!(
            drain(&mut ui_rx),
            vec![UiUpdate::Notice(Notice::error(
                "No se pueden eliminar las categorías predeterminadas"
            ))]
        );

        handle_user_command(
            &mut state,
            UserCommand::DeleteCategory {
                kind: TransactionKind::Expense,
                name: "Mascotas".into(),
            },
            &ui_tx,
        )
        .await;
        assert!(!state.categories.contains(TransactionKind::Expense, "Mascotas"));
        assert!(state.custom_categories.is_empty());
    }

    #[tokio::test]
    async fn disabled_llm_rolls_back_chat_turn() {
        let (mut state, mut llm_rx) = signed_in_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(64);

        handle_user_command(&mut state, UserCommand::SendChat("¿Cómo ahorro?".into()), &ui_tx)
            .await;
        assert_eq!(state.llm_mode, Some(LlmMode::Chat));
        assert!(state.chat.is_pending());

        let event = llm_rx.recv().await.expect("error event");
        assert!(matches!(event, LlmEvent::Error { generation: 1, .. }));
        handle_llm_event(&mut state, event, &ui_tx).await;

        assert!(state.chat.history().is_empty());
        assert_eq!(state.llm_mode, None);
        let updates = drain(&mut ui_rx);
        assert_eq!(
            updates,
            vec![
                UiUpdate::ChatStarted {
                    question: "¿Cómo ahorro?".into()
                },
                UiUpdate::ChatFailed(CHAT_ERROR_MESSAGE.into()),
            ]
        );
    }

    #[tokio::test]
    async fn stale_generation_is_ignored() {
        let (mut state, _llm_rx) = signed_in_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(16);
        state.llm_generation = 3;
        state.llm_mode = Some(LlmMode::Analysis);
        handle_llm_event(
            &mut state,
            LlmEvent::Complete {
                full_text: "viejo".into(),
                input_tokens: 0,
                output_tokens: 0,
                generation: 2,
            },
            &ui_tx,
        )
        .await;
        assert!(drain(&mut ui_rx).is_empty());
        assert_eq!(state.llm_mode, Some(LlmMode::Analysis));

        handle_llm_event(
            &mut state,
            LlmEvent::Complete {
                full_text: "nuevo".into(),
                input_tokens: 0,
                output_tokens: 0,
                generation: 3,
            },
            &ui_tx,
        )
        .await;
        assert_eq!(drain(&mut ui_rx), vec![UiUpdate::AnalysisComplete("nuevo".into())]);
    }

    #[tokio::test]
    async fn chat_reply_is_recorded() {
        let (mut state, _llm_rx) = signed_in_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(16);
        state.start_chat("hola").unwrap();
        let generation = state.llm_generation;
        if let Some(task) = state.current_llm_task.take() {
            task.abort();
        }

        for event in [
            LlmEvent::Token {
                text: "Ho".into(),
                generation,
            },
            LlmEvent::Complete {
                full_text: "Hola!".into(),
                input_tokens: 10,
                output_tokens: 2,
                generation,
            },
        ] {
            handle_llm_event(&mut state, event, &ui_tx).await;
        }
        assert_eq!(state.chat.history().len(), 2);
        assert!(!state.chat.is_pending());
        assert_eq!(
            drain(&mut ui_rx),
            vec![
                UiUpdate::ChatToken("Ho".into()),
                UiUpdate::ChatComplete("Hola!".into())
            ]
        );
    }

    #[tokio::test]
    async fn sign_out_clears_user_data() {
        let (mut state, _llm_rx) = signed_in_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(64);
        handle_user_command(
            &mut state,
            UserCommand::AddTransaction(form(TransactionKind::Income, "10", "Bonos")),
            &ui_tx,
        )
        .await;
        handle_user_command(&mut state, UserCommand::SignOut, &ui_tx).await;
        assert!(state.session.is_none());
        assert!(state.transactions.is_empty());
        assert_eq!(drain(&mut ui_rx).last(), Some(&UiUpdate::SignedOut));

        handle_user_command(&mut state, UserCommand::Refresh, &ui_tx).await;
        let updates = drain(&mut ui_rx);
        assert!(updates.contains(&UiUpdate::Notice(Notice::error(
            "Tu sesión expiró. Inicia sesión nuevamente."
        ))));
    }

    #[tokio::test]
    async fn toggle_values_and_export() {
        let (mut state, _llm_rx) = signed_in_state().await;
        let (ui_tx, mut ui_rx) = mpsc::channel(64);
        state.export_dir =
            std::env::temp_dir().join(format!("finanzas_app_export_{}", std::process::id()));

        handle_user_command(&mut state, UserCommand::ToggleValues, &ui_tx).await;
        assert!(!state.show_values);
        assert_eq!(drain(&mut ui_rx), vec![UiUpdate::ValuesVisible(false)]);

        handle_user_command(&mut state, UserCommand::ExportCsv, &ui_tx).await;
        let path = export::export_path(&state.export_dir, state.today());
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&state.export_dir);
    }
}
