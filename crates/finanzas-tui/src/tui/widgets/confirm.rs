// Confirmation overlay for quitting and deletions.
//
// Rendered centered on top of the main layout while `ViewState::confirm`
// is set.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::tui::layout::centered_rect;
use crate::tui::Confirm;

const DIALOG_WIDTH: u16 = 52;
const DIALOG_HEIGHT: u16 = 6;

pub fn question(confirm: &Confirm) -> (&'static str, String) {
    match confirm {
        Confirm::Quit => (" ¿Salir? ", "¿Seguro que quieres salir?".to_string()),
        Confirm::DeleteTransaction { label, .. } => (
            " Eliminar transacción ",
            format!("¿Estás seguro de que quieres eliminar esta transacción? {label}"),
        ),
        Confirm::DeleteCategory { name, .. } => (
            " Eliminar categoría ",
            format!("¿Eliminar la categoría \"{name}\"?"),
        ),
    }
}

pub fn render(frame: &mut Frame, area: Rect, confirm: &Confirm) {
    let dialog_area = centered_rect(DIALOG_WIDTH, DIALOG_HEIGHT, area);
    frame.render_widget(Clear, dialog_area);

    let (title, text) = question(confirm);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));

    let lines = vec![
        Line::from(text),
        Line::from(vec![
            Span::raw("("),
            Span::styled("y", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::raw("/"),
            Span::styled("n", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            Span::raw(")"),
        ]),
    ];
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, dialog_area);
}
