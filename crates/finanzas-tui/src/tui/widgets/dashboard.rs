// Dashboard tab: balance card, current month card, quick actions and the
// five most recent transactions.

use chrono::Datelike;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use finanzas_core::format::{format_amount, long_date_es, month_year_label};
use finanzas_core::model::Transaction;

use super::transactions::transaction_line;
use crate::tui::ViewState;

pub const RECENT_COUNT: usize = 5;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let outer = Block::default().borders(Borders::ALL).title(" Inicio ");
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let Some(snap) = &state.snapshot else {
        frame.render_widget(Paragraph::new("Cargando datos…"), inner);
        return;
    };
    let visible = state.show_values;

    let [cards, actions, recent] = Layout::vertical([
        Constraint::Length(6),
        Constraint::Length(3),
        Constraint::Min(3),
    ])
    .areas(inner);
    let [balance_area, month_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(cards);

    let balance_color = if snap.balance < 0.0 { Color::Red } else { Color::Green };
    let balance = Paragraph::new(vec![
        Line::from(Span::styled(
            long_date_es(snap.today),
            Style::default().fg(Color::Gray),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format_amount(snap.balance, visible),
            Style::default().fg(balance_color).add_modifier(Modifier::BOLD),
        )),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Balance total "));
    frame.render_widget(balance, balance_area);

    let month_label = month_year_label(snap.today.year(), snap.today.month());
    let month = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Ingresos  ", Style::default().fg(Color::Gray)),
            Span::styled(
                format_amount(snap.month.income, visible),
                Style::default().fg(Color::Green),
            ),
        ]),
        Line::from(vec![
            Span::styled("Gastos    ", Style::default().fg(Color::Gray)),
            Span::styled(
                format_amount(snap.month.expenses, visible),
                Style::default().fg(Color::Red),
            ),
        ]),
        Line::from(vec![
            Span::styled("Neto      ", Style::default().fg(Color::Gray)),
            Span::styled(
                format_amount(snap.month.net(), visible),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {month_label} ")),
    );
    frame.render_widget(month, month_area);

    let quick = Paragraph::new(Line::from(vec![
        Span::styled(" i ", Style::default().fg(Color::Black).bg(Color::Green)),
        Span::raw(" Agregar ingreso   "),
        Span::styled(" g ", Style::default().fg(Color::Black).bg(Color::Red)),
        Span::raw(" Agregar gasto   "),
        Span::styled(" 5 ", Style::default().fg(Color::Black).bg(Color::Cyan)),
        Span::raw(" Preguntar al asistente"),
    ]))
    .block(Block::default().borders(Borders::ALL).title(" Acciones rápidas "));
    frame.render_widget(quick, actions);

    frame.render_widget(
        Paragraph::new(recent_lines(&snap.transactions, visible)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Transacciones recientes "),
        ),
        recent,
    );
}

pub fn recent_lines(transactions: &[Transaction], visible: bool) -> Vec<Line<'static>> {
    if transactions.is_empty() {
        return vec![Line::from(Span::styled(
            "No hay transacciones registradas todavía",
            Style::default().fg(Color::DarkGray),
        ))];
    }
    transactions
        .iter()
        .take(RECENT_COUNT)
        .map(|tx| transaction_line(tx, visible))
        .collect()
}
