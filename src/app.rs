// src/app.rs

use ratatui::widgets::{ListState, ScrollbarState};
use vanguard_rs_verdict::core::models::ListsSnapshot;
use vanguard_rs_verdict::core::narrative::Narrative;
use vanguard_rs_verdict::{DecisionRecord, Verdict};

pub const SPINNER_CHARS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Results sent back to the UI loop by background engine tasks.
#[derive(Debug)]
pub enum EngineEvent {
    Evaluated { record: Box<DecisionRecord>, narrative: Option<Narrative> },
    Narrative(Narrative),
    Lists { snapshot: ListsSnapshot, conflicts: Vec<String> },
    History(Vec<DecisionRecord>),
    Notice(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    None,
    Info(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Evaluating,
    Finished,
}

/// Headline numbers of the decision on screen.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VerdictSummary {
    pub score: f64,
    pub threshold: f64,
    pub verdict: Option<Verdict>,
    pub flagged: usize,
    pub failed: usize,
    pub tier2_score: Option<f64>,
    pub final_score: Option<f64>,
    pub final_verdict: Option<Verdict>,
}

impl VerdictSummary {
    pub fn from_record(record: &DecisionRecord) -> Self {
        Self {
            score: record.score,
            threshold: record.threshold,
            verdict: Some(record.verdict),
            flagged: record.analyzer_results.iter().filter(|r| r.flagged()).count(),
            failed: record.analyzer_results.iter().filter(|r| !r.ok).count(),
            tier2_score: record.tier2_score,
            final_score: record.final_score,
            final_verdict: record.final_verdict,
        }
    }

    /// Score as a share of the threshold, for the gauge.
    pub fn gauge_percent(&self) -> u16 {
        if self.threshold <= 0.0 {
            return 0;
        }
        ((self.score / self.threshold) * 100.0).clamp(0.0, 100.0) as u16
    }
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub input: String,
    pub record: Option<DecisionRecord>,
    /// Explanation shown in the detail pane; may belong to a `:report` lookup
    /// rather than to `record`.
    pub narrative: Option<Narrative>,
    pub summary: VerdictSummary,
    pub analysis_list_state: ListState,
    pub show_history: bool,
    pub history: Vec<DecisionRecord>,
    pub history_scroll: usize,
    pub history_scroll_state: ScrollbarState,
    pub lists: Option<(ListsSnapshot, Vec<String>)>,
    pub notice: Notice,
    pub spinner_frame: usize,
}

impl App {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            state: AppState::Idle,
            input: String::new(),
            record: None,
            narrative: None,
            summary: VerdictSummary::default(),
            analysis_list_state: ListState::default(),
            show_history: false,
            history: Vec::new(),
            history_scroll: 0,
            history_scroll_state: ScrollbarState::default(),
            lists: None,
            notice: Notice::None,
            spinner_frame: 0,
        }
    }

    pub fn on_tick(&mut self) {
        if self.state == AppState::Evaluating {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_CHARS.len();
        }
    }

    pub fn apply(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Evaluated { record, narrative } => {
                self.summary = VerdictSummary::from_record(&record);
                self.analysis_list_state = ListState::default();
                if !record.analyzer_results.is_empty() {
                    self.analysis_list_state.select(Some(0));
                }
                self.notice = Notice::Info(format!("query {}", record.query_id));
                self.record = Some(*record);
                self.narrative = narrative;
                self.lists = None;
                self.state = AppState::Finished;
            }
            EngineEvent::Narrative(narrative) => {
                self.narrative = Some(narrative);
                self.lists = None;
                self.state = AppState::Finished;
            }
            EngineEvent::Lists { snapshot, conflicts } => {
                self.lists = Some((snapshot, conflicts));
                self.state = AppState::Finished;
            }
            EngineEvent::History(rows) => {
                self.history = rows;
                self.history_scroll = 0;
                self.history_scroll_state = ScrollbarState::new(self.history.len());
            }
            EngineEvent::Notice(message) => {
                self.notice = Notice::Info(message);
                if self.state == AppState::Evaluating {
                    self.state = AppState::Idle;
                }
            }
            EngineEvent::Failed(message) => {
                self.notice = Notice::Error(message);
                if self.state == AppState::Evaluating {
                    self.state = AppState::Idle;
                }
            }
        }
    }

    pub fn select_previous(&mut self) {
        let selected = self.analysis_list_state.selected().unwrap_or(0);
        self.analysis_list_state.select(Some(selected.saturating_sub(1)));
    }

    pub fn select_next(&mut self) {
        let count = self.record.as_ref().map_or(0, |r| r.analyzer_results.len());
        if count == 0 {
            return;
        }
        let selected = self.analysis_list_state.selected().map_or(0, |i| (i + 1).min(count - 1));
        self.analysis_list_state.select(Some(selected));
    }

    pub fn scroll_history_up(&mut self) {
        self.history_scroll = self.history_scroll.saturating_sub(1);
        self.history_scroll_state = self.history_scroll_state.position(self.history_scroll);
    }

    pub fn scroll_history_down(&mut self) {
        self.history_scroll = (self.history_scroll + 1).min(self.history.len().saturating_sub(1));
        self.history_scroll_state = self.history_scroll_state.position(self.history_scroll);
    }

    pub fn toggle_history(&mut self) {
        self.show_history = !self.show_history;
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Back to an empty input line; the history panel stays as it is.
    pub fn reset(&mut self) {
        self.state = AppState::Idle;
        self.input = String::new();
        self.record = None;
        self.narrative = None;
        self.summary = VerdictSummary::default();
        self.analysis_list_state = ListState::default();
        self.lists = None;
        self.notice = Notice::None;
    }
}
