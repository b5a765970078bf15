// src/ui/widgets/summary.rs

use crate::app::{App, AppState};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Gauge, Paragraph},
};
use vanguard_rs_verdict::Verdict;

fn verdict_style(verdict: Verdict) -> Style {
    match verdict {
        Verdict::Allow | Verdict::Legit => Style::default().fg(Color::Green),
        Verdict::Suspicious => Style::default().fg(Color::Yellow),
        Verdict::Block | Verdict::Malicious => Style::default().fg(Color::Red),
    }
}

/// Renders the verdict, the Tier-1 score gauge and the Tier-2 blend.
pub fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let summary_container = Block::default().borders(Borders::ALL).title("Summary");
    frame.render_widget(summary_container, area);

    let summary_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Verdict
            Constraint::Length(1), // Gauge
            Constraint::Length(1),
            Constraint::Length(4), // Tier-1 counts
            Constraint::Length(1),
            Constraint::Min(0), // Tier-2
        ])
        .split(area);

    if app.state != AppState::Finished {
        return;
    }
    let Some(record) = &app.record else {
        return;
    };
    let summary = &app.summary;
    let effective = record.effective_verdict();

    let verdict_text = Text::from(vec![
        Line::from(record.domain.as_str().bold()),
        Line::from(effective.to_string()).style(verdict_style(effective).add_modifier(Modifier::BOLD)),
    ]);
    frame.render_widget(Paragraph::new(verdict_text).alignment(Alignment::Center), summary_chunks[0]);

    let gauge = Gauge::default()
        .percent(summary.gauge_percent())
        .label(format!("{:.2} / {:.2}", summary.score, summary.threshold))
        .style(verdict_style(record.verdict));
    frame.render_widget(gauge, summary_chunks[1]);

    let mut tier1_lines = vec![
        Line::from(vec![Span::raw("Tier-1: "), Span::styled(record.verdict.to_string(), verdict_style(record.verdict))]),
        Line::from(vec![Span::raw("Flagged: "), Span::styled(summary.flagged.to_string(), Style::default().fg(Color::Red))]),
        Line::from(vec![Span::raw("Failed: "), Span::styled(summary.failed.to_string(), Style::default().fg(Color::Magenta))]),
    ];
    if let Some(list) = record.fast_path {
        tier1_lines.push(Line::from(format!("Fast path: {list}list")));
    }
    frame.render_widget(Paragraph::new(tier1_lines).block(Block::default().title("TIER-1".bold())), summary_chunks[3]);

    let tier2_block = Block::default().title("TIER-2".bold());
    let tier2_lines = match (summary.tier2_score, summary.final_score, summary.final_verdict) {
        (Some(tier2), Some(final_score), Some(final_verdict)) => {
            let mut lines = vec![
                Line::from(format!("Probe score: {tier2:.3}")),
                Line::from(vec![
                    Span::raw(format!("Final: {final_score:.2} ")),
                    Span::styled(final_verdict.to_string(), verdict_style(final_verdict)),
                ]),
            ];
            if let Some(enrichment) = &record.tier2_enrichment {
                lines.push(Line::from(format!(
                    "Web: {:.2} ({} redirects)",
                    enrichment.meta_score, enrichment.redirects
                )));
                if let Some(error) = &enrichment.error {
                    lines.push(Line::from(error.as_str().dark_gray()));
                }
            }
            if let Some(intel) = &record.tier2_intel {
                lines.push(Line::from(format!(
                    "Intel: {:.2} ({}/{} engines)",
                    intel.intel_score, intel.positives, intel.total_engines
                )));
                if let Some(error) = &intel.error {
                    lines.push(Line::from(error.as_str().dark_gray()));
                }
            }
            lines
        }
        _ => vec![Line::from("Not escalated.".dark_gray())],
    };
    frame.render_widget(Paragraph::new(tier2_lines).block(tier2_block), summary_chunks[5]);
}
