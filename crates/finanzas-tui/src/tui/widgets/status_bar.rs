// Status bar (user, backend, tab strip, busy marker) and the notice line.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use finanzas_app::protocol::{NoticeLevel, TabId};

use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let mut spans = vec![Span::styled(
        " Finanzas ",
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];

    if let Some(email) = &state.user_email {
        spans.push(Span::styled(
            format!(" {email} "),
            Style::default().fg(Color::White),
        ));
    }
    if let Some(snap) = &state.snapshot {
        spans.push(Span::styled(
            format!("[{}] ", snap.backend),
            Style::default().fg(Color::Gray),
        ));
    }
    spans.push(Span::styled("| ", Style::default().fg(Color::Gray)));
    spans.extend(tab_spans(state.active_tab));

    if !state.show_values {
        spans.push(Span::styled("(oculto) ", Style::default().fg(Color::Yellow)));
    }
    if state.busy {
        spans.push(Span::styled(
            "Cargando…",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

/// "[1:Inicio] [2:Transacciones] ..." with the active tab highlighted.
pub fn tab_spans(active: TabId) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (i, tab) in TabId::ALL.iter().enumerate() {
        let style = if *tab == active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(format!("[{}:{}]", i + 1, tab.title()), style));
        spans.push(Span::raw(" "));
    }
    spans
}

pub fn notice_color(level: NoticeLevel) -> Color {
    match level {
        NoticeLevel::Info => Color::Cyan,
        NoticeLevel::Success => Color::Green,
        NoticeLevel::Error => Color::Red,
    }
}

/// The last notice pushed by the app, if any.
pub fn render_notice(frame: &mut Frame, area: Rect, state: &ViewState) {
    let Some(notice) = &state.notice else {
        return;
    };
    let line = Line::from(Span::styled(
        format!(" {}", notice.text),
        Style::default().fg(notice_color(notice.level)),
    ));
    frame.render_widget(Paragraph::new(line), area);
}
