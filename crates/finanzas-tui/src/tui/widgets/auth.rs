// Auth screen: sign in, sign up and password reset in one centered box.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::tui::layout::centered_rect;
use crate::tui::{AuthMode, ViewState};

const BOX_WIDTH: u16 = 56;

fn mask(secret: &str) -> String {
    "•".repeat(secret.chars().count())
}

fn field_line(label: &str, value: String, focused: bool) -> Line<'static> {
    let marker = if focused { "▶ " } else { "  " };
    let value_style = if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    let cursor = if focused { "_" } else { "" };
    Line::from(vec![
        Span::styled(marker.to_string(), Style::default().fg(Color::Yellow)),
        Span::styled(format!("{label:<22}"), Style::default().fg(Color::Gray)),
        Span::styled(format!("{value}{cursor}"), value_style),
    ])
}

pub fn lines(state: &ViewState) -> Vec<Line<'static>> {
    let auth = &state.auth;
    let mut lines = vec![
        Line::from(Span::styled(
            "Tu asistente de finanzas personales",
            Style::default().fg(Color::Cyan),
        )),
        Line::from(""),
        field_line("Email", auth.email.clone(), auth.focus == 0),
    ];
    if auth.mode != AuthMode::Reset {
        lines.push(field_line("Contraseña", mask(&auth.password), auth.focus == 1));
    }
    if auth.mode == AuthMode::SignUp {
        lines.push(field_line(
            "Confirmar contraseña",
            mask(&auth.confirm),
            auth.focus == 2,
        ));
    }
    lines.push(Line::from(""));
    let hint = match auth.mode {
        AuthMode::SignIn => "¿No tienes cuenta? F2 para registrarte. ¿Olvidaste tu contraseña? F3",
        AuthMode::SignUp => "La contraseña debe tener al menos 6 caracteres. F1 para volver",
        AuthMode::Reset => "Te enviaremos un enlace de recuperación. F1 para volver",
    };
    lines.push(Line::from(Span::styled(
        hint,
        Style::default().fg(Color::DarkGray),
    )));
    lines
}

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let content = lines(state);
    let height = content.len() as u16 + 2;
    let rect = centered_rect(BOX_WIDTH, height + 2, area);
    frame.render_widget(Clear, rect);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            format!(" {} ", state.auth.mode.title()),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, rect);
}
