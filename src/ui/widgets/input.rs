// src/ui/widgets/input.rs
use crate::app::{App, AppState, Notice};
use ratatui::{prelude::*, widgets::{Block, Borders, Paragraph}};

/// Renders the input line: a domain to evaluate, or a `:command`.
pub fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let title = match &app.notice {
        Notice::None => Line::from("Domain or :command"),
        Notice::Info(message) => Line::from(vec![
            Span::raw("Domain or :command  "),
            Span::styled(message.as_str(), Style::default().fg(Color::Cyan)),
        ]),
        Notice::Error(message) => Line::from(vec![
            Span::raw("Domain or :command  "),
            Span::styled(message.as_str(), Style::default().fg(Color::Red)),
        ]),
    };
    let style = if app.input.starts_with(':') {
        Style::default().fg(Color::Magenta)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let input_paragraph = Paragraph::new(app.input.as_str())
        .block(Block::default().borders(Borders::ALL).title(title))
        .style(style);
    frame.render_widget(input_paragraph, area);

    if app.state != AppState::Evaluating {
        frame.set_cursor_position((area.x + app.input.chars().count() as u16 + 1, area.y + 1));
    }
}
