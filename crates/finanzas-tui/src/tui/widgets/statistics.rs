// Statistics tab: totals, spending since the last salary, category and
// monthly text bars, and the AI analysis panel.

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use finanzas_core::format::{format_amount, format_percent, short_date_es};
use finanzas_core::stats::Statistics;
use finanzas_llm::protocol::LlmStatus;

use crate::tui::ViewState;

const BAR_WIDTH: usize = 28;

/// Horizontal bar proportional to `value / max`.
pub fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || !value.is_finite() || value <= 0.0 {
        return String::new();
    }
    let filled = ((value / max) * width as f64).round() as usize;
    "█".repeat(filled.clamp(1, width))
}

fn label(text: impl Into<String>) -> Span<'static> {
    Span::styled(text.into(), Style::default().fg(Color::Gray))
}

fn heading(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))
}

pub fn stats_lines(stats: &Statistics, visible: bool) -> Vec<Line<'static>> {
    let mut lines = vec![
        heading("Resumen"),
        Line::from(vec![
            label("Ingresos totales   "),
            Span::styled(format_amount(stats.total_income, visible), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            label("Gastos totales     "),
            Span::styled(format_amount(stats.total_expenses, visible), Style::default().fg(Color::Red)),
        ]),
        Line::from(vec![
            label("Tasa de ahorro     "),
            Span::raw(format_percent(stats.savings_rate)),
        ]),
        Line::from(""),
        heading("Gastos desde el último sueldo"),
    ];

    match stats.last_salary_date {
        Some(date) => {
            lines.push(Line::from(vec![
                label(format!("Desde el {}: ", short_date_es(date))),
                Span::styled(
                    format_amount(stats.expenses_since_salary, visible),
                    Style::default().fg(Color::Red),
                ),
            ]));
            let peak = stats
                .daily_expenses
                .iter()
                .map(|d| d.amount)
                .fold(0.0, f64::max);
            for day in &stats.daily_expenses {
                lines.push(Line::from(vec![
                    label(format!("{:>7} ", short_date_es(day.date))),
                    Span::styled(bar(day.amount, peak, BAR_WIDTH), Style::default().fg(Color::Red)),
                    Span::raw(format!(
                        " {} (acum. {})",
                        format_amount(day.amount, visible),
                        format_amount(day.cumulative, visible)
                    )),
                ]));
            }
        }
        None => lines.push(Line::from(label("No hay sueldo registrado este mes"))),
    }

    lines.push(Line::from(""));
    lines.push(heading("Gastos por categoría"));
    let mut categories: Vec<(&String, &f64)> = stats.expenses_by_category.iter().collect();
    categories.sort_by(|a, b| b.1.total_cmp(a.1));
    let cat_peak = categories.first().map(|(_, v)| **v).unwrap_or(0.0);
    if categories.is_empty() {
        lines.push(Line::from(label("Sin gastos registrados")));
    }
    for (name, total) in categories {
        let share = if stats.total_expenses > 0.0 {
            total / stats.total_expenses * 100.0
        } else {
            0.0
        };
        lines.push(Line::from(vec![
            label(format!("{name:<16} ")),
            Span::styled(bar(*total, cat_peak, BAR_WIDTH), Style::default().fg(Color::Magenta)),
            Span::raw(format!(" {} ({})", format_amount(*total, visible), format_percent(share))),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(heading("Comparación mensual"));
    let month_peak = stats.monthly_peak();
    for flow in &stats.monthly {
        lines.push(Line::from(vec![
            label(format!("{:<8} ", flow.month.short_label())),
            Span::styled(bar(flow.income, month_peak, BAR_WIDTH), Style::default().fg(Color::Green)),
            Span::raw(format!(" {}", format_amount(flow.income, visible))),
        ]));
        lines.push(Line::from(vec![
            label(format!("{:<8} ", "")),
            Span::styled(bar(flow.expenses, month_peak, BAR_WIDTH), Style::default().fg(Color::Red)),
            Span::raw(format!(" {}", format_amount(flow.expenses, visible))),
        ]));
    }
    lines
}

pub fn analysis_text(state: &ViewState) -> String {
    let llm_enabled = state.snapshot.as_ref().is_some_and(|s| s.llm_enabled);
    match state.analysis_status {
        LlmStatus::Idle if !llm_enabled => {
            "Configura OPENAI_API_KEY para habilitar el análisis con IA.".to_string()
        }
        LlmStatus::Idle => "Presiona a para generar un análisis de tus finanzas.".to_string(),
        LlmStatus::Streaming => "Analizando tus finanzas…".to_string(),
        LlmStatus::Complete | LlmStatus::Error => state.analysis_text.clone(),
    }
}

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let [stats_area, analysis_area] =
        Layout::horizontal([Constraint::Percentage(58), Constraint::Percentage(42)]).areas(area);

    let lines = match &state.snapshot {
        Some(snap) => stats_lines(&snap.statistics, state.show_values),
        None => vec![Line::from("Cargando datos…")],
    };
    frame.render_widget(
        Paragraph::new(lines)
            .scroll((state.scroll, 0))
            .block(Block::default().borders(Borders::ALL).title(" Estadísticas ")),
        stats_area,
    );

    let color = match state.analysis_status {
        LlmStatus::Error => Color::Red,
        _ => Color::White,
    };
    frame.render_widget(
        Paragraph::new(analysis_text(state))
            .style(Style::default().fg(color))
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title(" Análisis con IA ")),
        analysis_area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::tests::{render_to_string, sample_snapshot, signed_in_state};
    use finanzas_app::protocol::{TabId, UiUpdate};

    #[test]
    fn bars_scale_and_clamp() {
        assert_eq!(bar(50.0, 100.0, 10).chars().count(), 5);
        assert_eq!(bar(100.0, 100.0, 10).chars().count(), 10);
        assert_eq!(bar(0.1, 100.0, 10).chars().count(), 1);
        assert!(bar(0.0, 100.0, 10).is_empty());
        assert!(bar(5.0, 0.0, 10).is_empty());
    }

    #[test]
    fn stats_lines_cover_every_section() {
        let snap = sample_snapshot();
        let text: String = stats_lines(&snap.statistics, true)
            .iter()
            .flat_map(|l| l.spans.iter().map(|s| s.content.to_string()))
            .collect();
        assert!(text.contains("Desde el 1 oct"));
        assert!(text.contains("$345.000"));
        assert!(text.contains("Hogar"));
        assert!(text.contains("87.0%"));
        assert!(text.contains("Tasa de ahorro"));
    }

    #[test]
    fn analysis_panel_tracks_status() {
        let mut state = signed_in_state();
        state.active_tab = TabId::Statistics;
        assert!(analysis_text(&state).contains("Presiona a"));

        crate::tui::apply_ui_update(&mut state, UiUpdate::AnalysisStarted);
        assert_eq!(analysis_text(&state), "Analizando tus finanzas…");

        crate::tui::apply_ui_update(
            &mut state,
            UiUpdate::AnalysisComplete("Gastas mucho en Hogar.".into()),
        );
        let screen = render_to_string(&state, 120, 40);
        assert!(screen.contains("Gastas mucho en Hogar."));
    }
}
