// Transactions tab: full history, newest first, with a selection cursor for
// deletion.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use finanzas_core::format::{format_amount, short_date_es};
use finanzas_core::ledger;
use finanzas_core::model::{Transaction, TransactionKind};

use crate::tui::ViewState;

/// One row: date, signed amount, category and description.
pub fn transaction_line(tx: &Transaction, visible: bool) -> Line<'static> {
    let (sign, color) = match tx.kind {
        TransactionKind::Income => ("+", Color::Green),
        TransactionKind::Expense => ("-", Color::Red),
    };
    let date = tx
        .effective_date()
        .map(short_date_es)
        .unwrap_or_else(|| "--".to_string());
    let amount = if visible {
        format!("{sign}{}", format_amount(tx.amount, true))
    } else {
        format_amount(tx.amount, false)
    };
    Line::from(vec![
        Span::styled(format!("{date:>7}  "), Style::default().fg(Color::Gray)),
        Span::styled(format!("{amount:>14}  "), Style::default().fg(color)),
        Span::styled(
            format!("{:<16} ", tx.category),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            tx.description_or_default().to_string(),
            Style::default().fg(Color::Gray),
        ),
    ])
}

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let transactions = state.transactions();
    let totals = ledger::totals(transactions);
    let title = format!(
        " Transacciones ({}) · ingresos {} · gastos {} ",
        transactions.len(),
        format_amount(totals.income, state.show_values),
        format_amount(totals.expenses, state.show_values),
    );
    let block = Block::default().borders(Borders::ALL).title(title);

    if transactions.is_empty() {
        let empty = Paragraph::new(vec![
            Line::from("No hay transacciones registradas."),
            Line::from(Span::styled(
                "Presiona i para agregar un ingreso o g para un gasto.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = transactions
        .iter()
        .map(|tx| ListItem::new(transaction_line(tx, state.show_values)))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("▶ ");
    let mut list_state = ListState::default().with_selected(Some(state.selected_transaction));
    frame.render_stateful_widget(list, area, &mut list_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::tests::{render_to_string, signed_in_state, tx};

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn line_signs_amount_by_kind() {
        let expense = tx("1", TransactionKind::Expense, 45_000.0, "Alimentación", 15);
        let line = text(&transaction_line(&expense, true));
        assert!(line.contains("15 oct"));
        assert!(line.contains("-$45.000"));
        assert!(line.contains("mov 1"));

        let income = tx("2", TransactionKind::Income, 1000.0, "Bonos", 2);
        assert!(text(&transaction_line(&income, true)).contains("+$1.000"));
        assert!(text(&transaction_line(&income, false)).contains("$ ****"));
    }

    #[test]
    fn renders_all_rows_with_totals() {
        let state = {
            let mut s = signed_in_state();
            s.active_tab = finanzas_app::protocol::TabId::Transactions;
            s
        };
        let screen = render_to_string(&state, 120, 30);
        assert!(screen.contains("Transacciones (3)"));
        assert!(screen.contains("Salario"));
        assert!(screen.contains("Hogar"));
        assert!(screen.contains("▶"));
    }
}
