// Assistant tab: conversation, quick prompts and suggestions, and the
// compose line.

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use finanzas_app::protocol::ChatSpeaker;
use finanzas_llm::prompt::WELCOME_MESSAGE;
use finanzas_llm::protocol::LlmStatus;

use crate::tui::ViewState;

fn speaker_style(speaker: ChatSpeaker) -> (&'static str, Style) {
    match speaker {
        ChatSpeaker::User => ("Tú", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        ChatSpeaker::Assistant => (
            "Asistente",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        ChatSpeaker::Error => ("Error", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
    }
}

fn push_message(lines: &mut Vec<Line<'static>>, speaker: ChatSpeaker, text: &str) {
    let (name, style) = speaker_style(speaker);
    lines.push(Line::from(Span::styled(format!("{name}:"), style)));
    let body_style = if speaker == ChatSpeaker::Error {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    for line in text.lines() {
        lines.push(Line::from(Span::styled(line.to_string(), body_style)));
    }
    lines.push(Line::from(""));
}

/// The conversation as rendered lines, newest at the bottom.
pub fn conversation_lines(state: &ViewState) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    push_message(&mut lines, ChatSpeaker::Assistant, WELCOME_MESSAGE);
    for entry in &state.chat {
        push_message(&mut lines, entry.speaker, &entry.text);
    }
    if state.chat_status == LlmStatus::Streaming {
        let partial = if state.streaming_reply.is_empty() {
            "Escribiendo…".to_string()
        } else {
            format!("{}▌", state.streaming_reply)
        };
        push_message(&mut lines, ChatSpeaker::Assistant, &partial);
    }
    lines
}

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let chips = state.chips();
    let chip_rows = chips.len() as u16 + 2;
    let [conversation_area, chips_area, input_area] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(chip_rows),
        Constraint::Length(3),
    ])
    .areas(area);

    let lines = conversation_lines(state);
    // Keep the newest lines in view unless the user scrolled up.
    let visible_rows = conversation_area.height.saturating_sub(2) as usize;
    let bottom = lines.len().saturating_sub(visible_rows) as u16;
    let offset = bottom.saturating_sub(state.scroll);
    let title = if state.snapshot.as_ref().is_some_and(|s| !s.llm_enabled) {
        " Asistente (sin OPENAI_API_KEY) "
    } else {
        " Asistente "
    };
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((offset, 0))
            .block(Block::default().borders(Borders::ALL).title(title)),
        conversation_area,
    );

    let chip_lines: Vec<Line> = chips
        .iter()
        .enumerate()
        .map(|(i, (label, _))| {
            let selected = state.chip_index == Some(i);
            let style = if selected {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(
                format!("{} {label}", if selected { "▶" } else { " " }),
                style,
            ))
        })
        .collect();
    frame.render_widget(
        Paragraph::new(chip_lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Preguntas rápidas y sugerencias (↑/↓, Enter) "),
        ),
        chips_area,
    );

    let input = if state.chat_compose {
        Line::from(Span::styled(
            format!("{}_", state.chat_input),
            Style::default().fg(Color::Yellow),
        ))
    } else {
        Line::from(Span::styled(
            "Presiona / para escribir tu pregunta",
            Style::default().fg(Color::DarkGray),
        ))
    };
    frame.render_widget(
        Paragraph::new(input).block(Block::default().borders(Borders::ALL).title(" Mensaje ")),
        input_area,
    );
}
