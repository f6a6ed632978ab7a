// Add-transaction overlay.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use finanzas_core::model::TransactionKind;

use crate::tui::layout::centered_rect;
use crate::tui::{FormField, FormState, ViewState};

const FORM_WIDTH: u16 = 64;

pub fn render(frame: &mut Frame, area: Rect, form: &FormState, state: &ViewState) {
    let kind = form.form.kind;
    let accent = match kind {
        TransactionKind::Income => Color::Green,
        TransactionKind::Expense => Color::Red,
    };

    let mut lines = vec![Line::from(vec![
        Span::styled("  Tipo                  ", Style::default().fg(Color::Gray)),
        Span::styled(
            kind.label().to_string(),
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
        ),
    ])];
    for field in FormField::ALL {
        let focused = field == form.focus;
        let value = match field {
            FormField::Amount => &form.form.amount,
            FormField::Category => &form.form.category,
            FormField::Description => &form.form.description,
            FormField::Date => &form.form.date,
        };
        let shown = if value.is_empty() && field == FormField::Date && !focused {
            "(hoy)".to_string()
        } else if focused {
            format!("{value}_")
        } else {
            value.clone()
        };
        lines.push(Line::from(vec![
            Span::styled(
                if focused { "▶ " } else { "  " },
                Style::default().fg(Color::Yellow),
            ),
            Span::styled(format!("{:<22}", field.label()), Style::default().fg(Color::Gray)),
            Span::styled(
                shown,
                if focused {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default().fg(Color::White)
                },
            ),
        ]));
    }

    if form.focus == FormField::Category {
        let options = state
            .snapshot
            .as_ref()
            .map(|s| s.categories.list(kind).join(", "))
            .unwrap_or_default();
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  {options}"),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let title = match kind {
        TransactionKind::Income => " Nuevo ingreso ",
        TransactionKind::Expense => " Nuevo gasto ",
    };
    let rect = centered_rect(FORM_WIDTH, lines.len() as u16 + 2, area);
    frame.render_widget(Clear, rect);
    let paragraph = Paragraph::new(lines)
        .wrap(ratatui::widgets::Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent))
                .title(title),
        );
    frame.render_widget(paragraph, rect);
}

#[cfg(test)]
mod tests {
    use crate::tui::tests::{render_to_string, signed_in_state};
    use crate::tui::{FormField, FormState};
    use finanzas_core::model::TransactionKind;

    #[test]
    fn form_overlay_shows_fields_and_category_choices() {
        let mut state = signed_in_state();
        let mut form = FormState::new(TransactionKind::Expense);
        form.form.amount = "4500".into();
        form.focus = FormField::Category;
        state.form = Some(form);

        let screen = render_to_string(&state, 120, 40);
        assert!(screen.contains("Nuevo gasto"));
        assert!(screen.contains("4500"));
        assert!(screen.contains("(hoy)"));
        assert!(screen.contains("Alimentación"));
    }
}
