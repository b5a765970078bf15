// src/ui/widgets/analysis_view.rs

use crate::app::{App, AppState, SPINNER_CHARS};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use vanguard_rs_verdict::core::models::{AnalyzerResult, ListsSnapshot};

pub fn render_analysis_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let main_block = Block::default().borders(Borders::ALL).title("Analyzers (navigate with ↑ ↓)");

    if app.state != AppState::Finished {
        let content = match app.state {
            AppState::Evaluating => Paragraph::new(Line::from(vec![
                Span::styled(format!("{} ", SPINNER_CHARS[app.spinner_frame]), Style::default().fg(Color::Cyan)),
                Span::raw("Waiting for analyzers..."),
            ]))
            .alignment(Alignment::Center),
            _ => Paragraph::new("Analyzer results will appear here...").alignment(Alignment::Center),
        };
        frame.render_widget(content.block(main_block), area);
        return;
    }

    if let Some((snapshot, conflicts)) = &app.lists {
        let p = Paragraph::new(lists_text(snapshot, conflicts)).wrap(Wrap { trim: true }).block(main_block.title("Lists"));
        frame.render_widget(p, area);
        return;
    }

    let inner_area = main_block.inner(area);
    frame.render_widget(main_block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Min(0)])
        .split(inner_area);

    let results: &[AnalyzerResult] = app.record.as_ref().map_or(&[], |r| r.analyzer_results.as_slice());
    let items: Vec<ListItem> = results.iter().map(result_item).collect();
    let list = if items.is_empty() {
        let text = match app.record.as_ref().and_then(|r| r.fast_path) {
            Some(kind) => format!("Decided from the {kind} list; no analyzer was called."),
            None => "No analyzer results.".to_string(),
        };
        List::new(vec![ListItem::new(Line::from(text).dark_gray())])
    } else {
        List::new(items)
    };
    let list = list.highlight_style(Style::new().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, chunks[0], &mut app.analysis_list_state);

    let detail_block = Block::default().borders(Borders::TOP).title("Details");
    let selected = app.analysis_list_state.selected().and_then(|i| results.get(i));
    let mut lines: Vec<Line> = Vec::new();
    if let Some(result) = selected {
        lines.extend(result_details(result));
        lines.push(Line::from(""));
    }
    if let Some(narrative) = &app.narrative {
        lines.push(Line::from("NARRATIVE".yellow().bold()));
        lines.extend(narrative.lines.iter().map(|l| Line::from(format!("- {l}"))));
        lines.push(Line::from(narrative.summary.as_str()));
    }
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }).block(detail_block), chunks[1]);
}

fn result_item(result: &AnalyzerResult) -> ListItem<'_> {
    let (mark, style) = if !result.ok {
        ("ERR ", Style::default().fg(Color::Magenta))
    } else if result.flagged() {
        ("FLAG", Style::default().fg(Color::Red))
    } else {
        ("OK  ", Style::default().fg(Color::Green))
    };
    ListItem::new(Line::from(vec![
        Span::styled(format!("[{mark}] "), style),
        Span::raw(result.module_name.as_str()),
        Span::styled(format!("  {} ms", result.elapsed_ms), Style::default().fg(Color::DarkGray)),
    ]))
}

fn result_details(result: &AnalyzerResult) -> Vec<Line<'_>> {
    let mut lines = vec![
        Line::from(result.module_name.as_str().yellow().bold()),
        Line::from(format!("reason: {}", result.reason)),
        Line::from(format!("score: {:.3}", result.score)),
    ];
    if let Some(label) = &result.label {
        lines.push(Line::from(format!("label: {label}")));
    }
    if let Some(details) = &result.details {
        lines.push(Line::from(format!("details: {details}")));
    }
    lines
}

fn lists_text<'a>(snapshot: &'a ListsSnapshot, conflicts: &'a [String]) -> Text<'a> {
    let mut lines = vec![Line::from(format!("ALLOW ({})", snapshot.allow_count).green().bold())];
    lines.extend(snapshot.allowlist.iter().map(|d| Line::from(format!("  {d}"))));
    lines.push(Line::from(""));
    lines.push(Line::from(format!("BLOCK ({})", snapshot.block_count).red().bold()));
    lines.extend(snapshot.blocklist.iter().map(|d| Line::from(format!("  {d}"))));
    if !conflicts.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from("ON BOTH LISTS (treated as block)".magenta().bold()));
        lines.extend(conflicts.iter().map(|d| Line::from(format!("  {d}"))));
    }
    Text::from(lines)
}
