// Screen layout.
//
// +--------------------------------------------------+
// | Status Bar (1 row): user, backend, tab strip      |
// +--------------------------------------------------+
// | Body (fill): active tab or auth screen            |
// +--------------------------------------------------+
// | Notice (1 row)                                    |
// | Help Bar (1 row)                                  |
// +--------------------------------------------------+

use ratatui::layout::{Constraint, Flex, Layout, Rect};

#[derive(Debug, Clone)]
pub struct AppLayout {
    pub status_bar: Rect,
    pub body: Rect,
    pub notice: Rect,
    pub help_bar: Rect,
}

pub fn build_layout(area: Rect) -> AppLayout {
    let [status_bar, body, notice, help_bar] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    AppLayout {
        status_bar,
        body,
        notice,
        help_bar,
    }
}

/// A `width` x `height` rectangle centered in `area`, clamped to fit.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    let [rect] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    rect
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
