// Categories tab: default and custom categories per kind, usage totals, and
// the new-category input line.

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use finanzas_core::categories::is_default;
use finanzas_core::format::format_amount;
use finanzas_core::ledger;
use finanzas_core::model::TransactionKind;

use crate::tui::ViewState;

pub fn kind_title(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Income => "Categorías de ingresos",
        TransactionKind::Expense => "Categorías de gastos",
    }
}

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let [list_area, input_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).areas(area);

    let kind = state.category_kind;
    let names = state.category_names();
    let totals = ledger::category_totals(state.transactions());

    let items: Vec<ListItem> = names
        .iter()
        .map(|name| {
            let used = totals.iter().find(|t| t.kind == kind && t.name == *name);
            let tag = if is_default(kind, name) {
                Span::styled("predeterminada", Style::default().fg(Color::DarkGray))
            } else {
                Span::styled("personalizada", Style::default().fg(Color::Cyan))
            };
            let usage = match used {
                Some(t) => format!(
                    "{} en {} mov.",
                    format_amount(t.total, state.show_values),
                    t.count
                ),
                None => "sin movimientos".to_string(),
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{name:<20}"), Style::default().add_modifier(Modifier::BOLD)),
                tag,
                Span::styled(format!("  {usage}"), Style::default().fg(Color::Gray)),
            ]))
        })
        .collect();

    let title = format!(" Categorías · {} (←/→ cambia) ", kind_title(kind));
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("▶ ");
    let mut list_state = ListState::default().with_selected(Some(state.selected_category));
    frame.render_stateful_widget(list, list_area, &mut list_state);

    let input = match &state.category_input {
        Some(text) => Paragraph::new(Line::from(vec![
            Span::styled("Nombre: ", Style::default().fg(Color::Gray)),
            Span::styled(format!("{text}_"), Style::default().fg(Color::Yellow)),
        ])),
        None => Paragraph::new(Span::styled(
            "n: nueva categoría · d: eliminar la seleccionada",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(
        input.block(Block::default().borders(Borders::ALL).title(" Nueva categoría ")),
        input_area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::tests::{render_to_string, signed_in_state};
    use finanzas_app::protocol::TabId;

    #[test]
    fn lists_kind_with_usage() {
        let mut state = signed_in_state();
        state.active_tab = TabId::Categories;
        let screen = render_to_string(&state, 120, 30);
        assert!(screen.contains("Categorías de gastos"));
        assert!(screen.contains("Hogar"));
        assert!(screen.contains("$300.000 en 1 mov."));

        state.category_kind = TransactionKind::Income;
        state.category_input = Some("Vent".into());
        let screen = render_to_string(&state, 120, 30);
        assert!(screen.contains("Categorías de ingresos"));
        assert!(screen.contains("Vent_"));
    }
}
