// src/ui/widgets/history.rs

use crate::app::App;
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation},
};
use vanguard_rs_verdict::DecisionRecord;

fn history_line(record: &DecisionRecord) -> Line<'_> {
    let verdict = record.effective_verdict();
    let style = if verdict.is_blocking() {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    };
    Line::from(vec![
        Span::styled(record.timestamp.format("%m-%d %H:%M:%S").to_string(), Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(format!("{:<11}", verdict.to_string()), style),
        Span::raw(record.domain.as_str()),
    ])
}

/// Renders the most recent ledger rows, newest first.
pub fn render_history(frame: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default().title("History (PgUp/PgDn)").borders(Borders::ALL);
    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = app.history.iter().map(history_line).collect();
    let paragraph = Paragraph::new(lines).scroll((app.history_scroll as u16, 0));
    frame.render_widget(paragraph, inner_area);

    let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight).thumb_symbol("■");
    frame.render_stateful_widget(scrollbar, inner_area, &mut app.history_scroll_state);
}
