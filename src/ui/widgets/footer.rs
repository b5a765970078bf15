// src/ui/widgets/footer.rs

use crate::app::{App, AppState};
use ratatui::{
    prelude::*,
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::Paragraph,
};

fn key(label: &str) -> Span<'_> {
    Span::styled(label, Style::new().bold().fg(Color::Yellow))
}

/// Renders the footer with the keys available in the current state.
pub fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let spans = match app.state {
        AppState::Idle => Line::from(vec![
            key("Enter"),
            Span::raw(" evaluate, "),
            key(":"),
            Span::raw("allow|block|unallow|unblock|clear|forget|purge|report|lists, "),
            key("Tab"),
            Span::raw(" history, "),
            key("Esc"),
            Span::raw(" quit"),
        ]),
        AppState::Finished => Line::from(vec![
            key("[↑↓]"),
            Span::raw(" analyzers, "),
            key("[N]"),
            Span::raw("ew, "),
            key("[H]"),
            Span::raw("istory, "),
            key("[PgUp/PgDn]"),
            Span::raw(" scroll history, "),
            key("[Q]"),
            Span::raw("uit"),
        ]),
        AppState::Evaluating => Line::from("Evaluating... Press Esc to quit."),
    };

    frame.render_widget(Paragraph::new(spans).alignment(Alignment::Center), area);
}
