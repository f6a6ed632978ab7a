// Keyboard input handling and command dispatch.
//
// Translates crossterm key events into `UserCommand`s for the app
// orchestrator, or into local `ViewState` changes (tab switching, cursors,
// text entry). Text-entry modes capture printable keys before the global
// shortcuts see them.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use finanzas_app::protocol::{Notice, TabId, UserCommand};
use finanzas_core::categories::is_default;
use finanzas_core::format::format_clp;
use finanzas_core::model::TransactionKind;

use super::{AuthMode, Confirm, FormField, FormState, ViewState};

/// Lines moved by PageUp / PageDown.
const PAGE_SIZE: usize = 10;

/// Handle a keyboard event.
///
/// Returns `Some(UserCommand)` when the key press should be forwarded to the
/// app orchestrator, `None` when it was handled locally.
pub fn handle_key(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    // Windows reports both press and release.
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL) && key_event.code == KeyCode::Char('c')
    {
        return Some(UserCommand::Quit);
    }

    if state.confirm.is_some() {
        return handle_confirm(key_event, state);
    }
    if !state.signed_in {
        return handle_auth(key_event, state);
    }
    if state.form.is_some() {
        return handle_form(key_event, state);
    }
    if state.category_input.is_some() {
        return handle_category_input(key_event, state);
    }
    if state.chat_compose {
        return handle_compose(key_event, state);
    }

    match key_event.code {
        KeyCode::Char(c @ '1'..='5') => {
            let index = c as usize - '1' as usize;
            TabId::from_index(index).map(|tab| switch_tab(state, tab))
        }
        KeyCode::Tab => Some(switch_tab(state, state.active_tab.next())),
        KeyCode::BackTab => Some(switch_tab(state, state.active_tab.prev())),
        KeyCode::Char('q') => {
            state.confirm = Some(Confirm::Quit);
            None
        }
        KeyCode::Char('v') => Some(UserCommand::ToggleValues),
        KeyCode::Char('r') => Some(UserCommand::Refresh),
        KeyCode::Char('e') => Some(UserCommand::ExportCsv),
        KeyCode::Char('o') => Some(UserCommand::SignOut),
        KeyCode::Char('i') => {
            state.form = Some(FormState::new(TransactionKind::Income));
            None
        }
        KeyCode::Char('g') => {
            state.form = Some(FormState::new(TransactionKind::Expense));
            None
        }
        _ => match state.active_tab {
            TabId::Dashboard => None,
            TabId::Transactions => handle_transactions_tab(key_event, state),
            TabId::Categories => handle_categories_tab(key_event, state),
            TabId::Statistics => handle_statistics_tab(key_event, state),
            TabId::Assistant => handle_assistant_tab(key_event, state),
        },
    }
}

fn switch_tab(state: &mut ViewState, tab: TabId) -> UserCommand {
    if state.active_tab != tab {
        state.scroll = 0;
    }
    state.active_tab = tab;
    UserCommand::SwitchTab(tab)
}

/// Append or delete one character of a text field.
fn edit_text(field: &mut String, key_event: KeyEvent) {
    match key_event.code {
        KeyCode::Backspace => {
            field.pop();
        }
        KeyCode::Char(c)
            if !key_event
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            field.push(c);
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Modal handlers
// ---------------------------------------------------------------------------

fn handle_confirm(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Char('s') | KeyCode::Enter => {
            match state.confirm.take()? {
                Confirm::Quit => Some(UserCommand::Quit),
                Confirm::DeleteTransaction { id, .. } => Some(UserCommand::DeleteTransaction { id }),
                Confirm::DeleteCategory { kind, name } => {
                    Some(UserCommand::DeleteCategory { kind, name })
                }
            }
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            state.confirm = None;
            None
        }
        _ => None,
    }
}

fn handle_auth(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    let auth = &mut state.auth;
    match key_event.code {
        KeyCode::F(1) => auth.set_mode(AuthMode::SignIn),
        KeyCode::F(2) => auth.set_mode(AuthMode::SignUp),
        KeyCode::F(3) => auth.set_mode(AuthMode::Reset),
        KeyCode::Tab | KeyCode::Down => {
            auth.focus = (auth.focus + 1) % auth.mode.field_count();
        }
        KeyCode::BackTab | KeyCode::Up => {
            let n = auth.mode.field_count();
            auth.focus = (auth.focus + n - 1) % n;
        }
        KeyCode::Enter => return Some(auth.command()),
        _ => edit_text(auth.focused_field(), key_event),
    }
    None
}

fn handle_form(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    let categories = state
        .snapshot
        .as_ref()
        .zip(state.form.as_ref())
        .map(|(snap, f)| snap.categories.list(f.form.kind).to_vec())
        .unwrap_or_default();
    let form = state.form.as_mut()?;

    match key_event.code {
        KeyCode::Esc => {
            state.form = None;
        }
        KeyCode::Enter => return Some(UserCommand::AddTransaction(form.form.clone())),
        KeyCode::Tab | KeyCode::Down => form.focus = form.focus.next(),
        KeyCode::BackTab | KeyCode::Up => form.focus = form.focus.prev(),
        KeyCode::Char('t') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
            form.form.kind = form.form.kind.toggled();
            form.form.category.clear();
        }
        KeyCode::F(2) => {
            let name = form.form.category.trim();
            if name.is_empty() {
                state.notice = Some(Notice::error("Por favor ingresa un nombre para la categoría"));
                return None;
            }
            return Some(UserCommand::AddCategory {
                kind: form.form.kind,
                name: name.to_string(),
            });
        }
        KeyCode::Left | KeyCode::Right if form.focus == FormField::Category => {
            if categories.is_empty() {
                return None;
            }
            let current = categories.iter().position(|c| *c == form.form.category);
            let len = categories.len();
            let next = match (current, key_event.code) {
                (None, KeyCode::Left) => len - 1,
                (None, _) => 0,
                (Some(i), KeyCode::Left) => (i + len - 1) % len,
                (Some(i), _) => (i + 1) % len,
            };
            form.form.category = categories[next].clone();
        }
        _ => edit_text(form.focused_text(), key_event),
    }
    None
}

fn handle_category_input(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    let input = state.category_input.as_mut()?;
    match key_event.code {
        KeyCode::Esc => {
            state.category_input = None;
            None
        }
        KeyCode::Enter => Some(UserCommand::AddCategory {
            kind: state.category_kind,
            name: input.clone(),
        }),
        _ => {
            edit_text(input, key_event);
            None
        }
    }
}

fn handle_compose(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Esc => {
            state.chat_compose = false;
            None
        }
        KeyCode::Enter => {
            let question = state.chat_input.trim().to_string();
            if question.is_empty() {
                return None;
            }
            state.chat_input.clear();
            state.scroll = 0;
            Some(UserCommand::SendChat(question))
        }
        _ => {
            edit_text(&mut state.chat_input, key_event);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Per-tab handlers
// ---------------------------------------------------------------------------

fn move_cursor(cursor: &mut usize, len: usize, code: KeyCode) {
    if len == 0 {
        *cursor = 0;
        return;
    }
    let last = len - 1;
    *cursor = match code {
        KeyCode::Up | KeyCode::Char('k') => cursor.saturating_sub(1),
        KeyCode::Down | KeyCode::Char('j') => (*cursor + 1).min(last),
        KeyCode::PageUp => cursor.saturating_sub(PAGE_SIZE),
        KeyCode::PageDown => (*cursor + PAGE_SIZE).min(last),
        KeyCode::Home => 0,
        KeyCode::End => last,
        _ => *cursor,
    };
}

fn scroll(state: &mut ViewState, code: KeyCode) {
    state.scroll = match code {
        KeyCode::Up | KeyCode::Char('k') => state.scroll.saturating_sub(1),
        KeyCode::Down | KeyCode::Char('j') => state.scroll.saturating_add(1),
        KeyCode::PageUp => state.scroll.saturating_sub(PAGE_SIZE as u16),
        KeyCode::PageDown => state.scroll.saturating_add(PAGE_SIZE as u16),
        KeyCode::Home => 0,
        _ => state.scroll,
    };
}

fn handle_transactions_tab(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('d') | KeyCode::Delete => {
            if let Some(tx) = state.selected_transaction() {
                let label = format!(
                    "{} {} ({})",
                    tx.kind.label(),
                    format_clp(tx.amount),
                    tx.category
                );
                state.confirm = Some(Confirm::DeleteTransaction {
                    id: tx.id.clone(),
                    label,
                });
            }
            None
        }
        code => {
            let len = state.transactions().len();
            move_cursor(&mut state.selected_transaction, len, code);
            None
        }
    }
}

fn handle_categories_tab(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Left | KeyCode::Right | KeyCode::Char('t') => {
            state.category_kind = state.category_kind.toggled();
            state.selected_category = 0;
            None
        }
        KeyCode::Char('n') => {
            state.category_input = Some(String::new());
            None
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            let names = state.category_names();
            let Some(name) = names.get(state.selected_category) else {
                return None;
            };
            if is_default(state.category_kind, name) {
                state.notice = Some(Notice::error(
                    "No se pueden eliminar las categorías predeterminadas",
                ));
            } else {
                state.confirm = Some(Confirm::DeleteCategory {
                    kind: state.category_kind,
                    name: name.clone(),
                });
            }
            None
        }
        code => {
            let len = state.category_names().len();
            move_cursor(&mut state.selected_category, len, code);
            None
        }
    }
}

fn handle_statistics_tab(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('a') => Some(UserCommand::RequestAnalysis),
        code => {
            scroll(state, code);
            None
        }
    }
}

fn handle_assistant_tab(key_event: KeyEvent, state: &mut ViewState) -> Option<UserCommand> {
    let chips = state.chips();
    match key_event.code {
        KeyCode::Char('/') => {
            state.chat_compose = true;
            state.chip_index = None;
            None
        }
        KeyCode::Char('c') => Some(UserCommand::ClearChat),
        KeyCode::Up | KeyCode::Down => {
            if chips.is_empty() {
                return None;
            }
            let last = chips.len() - 1;
            state.chip_index = match (state.chip_index, key_event.code) {
                (None, KeyCode::Down) => Some(0),
                (None, _) => Some(last),
                (Some(0), KeyCode::Up) => None,
                (Some(i), KeyCode::Up) => Some(i - 1),
                (Some(i), _) => Some((i + 1).min(last)),
            };
            None
        }
        KeyCode::Enter => match state.chip_index.take() {
            Some(i) => chips.get(i).map(|(_, q)| {
                state.scroll = 0;
                UserCommand::SendChat(q.clone())
            }),
            None => {
                state.chat_compose = true;
                None
            }
        },
        KeyCode::Esc => {
            state.chip_index = None;
            None
        }
        code => {
            scroll(state, code);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
