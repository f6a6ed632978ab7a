// Help bar: key hints for the current screen and mode.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use finanzas_app::protocol::TabId;

use crate::tui::ViewState;

pub fn hints(state: &ViewState) -> &'static str {
    if state.confirm.is_some() {
        return " y:Confirmar | n/Esc:Cancelar";
    }
    if !state.signed_in {
        return " F1:Ingresar | F2:Registrarse | F3:Recuperar | Tab:Campo | Enter:Enviar | Ctrl+C:Salir";
    }
    if state.form.is_some() {
        return " Tab:Campo | ←/→:Categoría | F2:Nueva categoría | Ctrl+T:Tipo | Enter:Guardar | Esc:Cancelar";
    }
    if state.category_input.is_some() {
        return " Enter:Agregar | Esc:Cancelar";
    }
    if state.chat_compose {
        return " Enter:Enviar | Esc:Terminar";
    }
    match state.active_tab {
        TabId::Dashboard => {
            " i:Ingreso | g:Gasto | v:Ocultar montos | r:Actualizar | e:Exportar | o:Salir de cuenta | q:Salir"
        }
        TabId::Transactions => " ↑/↓:Mover | d:Eliminar | i:Ingreso | g:Gasto | e:Exportar | q:Salir",
        TabId::Categories => " ←/→:Tipo | ↑/↓:Mover | n:Nueva | d:Eliminar | q:Salir",
        TabId::Statistics => " a:Análisis con IA | ↑/↓:Desplazar | q:Salir",
        TabId::Assistant => " /:Escribir | ↑/↓:Sugerencias | Enter:Enviar | c:Limpiar | q:Salir",
    }
}

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let paragraph = Paragraph::new(Line::from(Span::styled(
        hints(state),
        Style::default().fg(Color::White).add_modifier(Modifier::DIM),
    )))
    .style(Style::default().bg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}
