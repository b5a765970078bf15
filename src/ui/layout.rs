// src/ui/layout.rs

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Screen regions of the console.
pub struct AppLayout {
    pub input: Rect,
    pub report: Rect,
    pub summary: Rect,
    pub footer: Rect,
    /// Empty when the history panel is hidden.
    pub history: Rect,
}

/// Splits the frame into input line, content row and footer.
///
/// The content row holds the analysis report and the summary side by side,
/// plus the ledger history when `show_history` is set.
pub fn create_layout(frame_size: Rect, show_history: bool) -> AppLayout {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(frame_size);

    let content_constraints = if show_history {
        vec![Constraint::Percentage(45), Constraint::Percentage(22), Constraint::Percentage(33)]
    } else {
        vec![Constraint::Percentage(70), Constraint::Percentage(30)]
    };

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(content_constraints)
        .split(main_chunks[1]);

    AppLayout {
        input: main_chunks[0],
        report: content_chunks[0],
        summary: content_chunks[1],
        history: if show_history { content_chunks[2] } else { Rect::default() },
        footer: main_chunks[2],
    }
}
