// src/main.rs

use color_eyre::eyre::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use vanguard_rs_verdict::core::ledger::{DEFAULT_PAGE, PurgeScope};
use vanguard_rs_verdict::core::narrative::narrate_record;
use vanguard_rs_verdict::{Engine, EngineConfig, logging};

mod app;
mod commands;
mod ui;

use app::{App, AppState, EngineEvent, Notice};
use commands::{Command, parse_command};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = EngineConfig::load()?;
    logging::initialize_logging(&config.data_dir)?;
    config.log_summary();
    let engine = Arc::new(Engine::open(config).await?);
    info!("Console starting.");

    // --- Setup ---
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let outcome = run(&mut terminal, &engine).await;

    // --- Restore Terminal ---
    stdout().execute(LeaveAlternateScreen)?;
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    outcome
}

async fn run(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, engine: &Arc<Engine>) -> Result<()> {
    let mut app = App::new();
    let (tx, mut rx) = mpsc::channel(16);
    spawn_command(engine, &tx, Command::History);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if event::poll(Duration::from_millis(100))? {
            handle_events(&mut app, engine, &tx)?;
        }
        while let Ok(engine_event) = rx.try_recv() {
            app.apply(engine_event);
        }
        app.on_tick();
    }
    Ok(())
}

fn handle_events(app: &mut App, engine: &Arc<Engine>, tx: &mpsc::Sender<EngineEvent>) -> Result<()> {
    if let Event::Key(key) = event::read()? {
        if key.kind == KeyEventKind::Press {
            match app.state {
                AppState::Idle => handle_idle_input(app, key.code, engine, tx),
                AppState::Finished => handle_finished_input(app, key.code),
                AppState::Evaluating => {
                    if key.code == KeyCode::Esc {
                        app.quit();
                    }
                }
            }
        }
    }
    Ok(())
}

fn handle_idle_input(app: &mut App, key_code: KeyCode, engine: &Arc<Engine>, tx: &mpsc::Sender<EngineEvent>) {
    match key_code {
        KeyCode::Esc => app.quit(),
        KeyCode::Tab => app.toggle_history(),
        KeyCode::PageUp => app.scroll_history_up(),
        KeyCode::PageDown => app.scroll_history_down(),
        KeyCode::Char(c) => app.input.push(c),
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Enter => {
            let line = std::mem::take(&mut app.input);
            if line.trim().is_empty() {
                return;
            }
            match parse_command(&line) {
                Ok(Command::Quit) => app.quit(),
                Ok(command) => {
                    match command {
                        Command::Evaluate(_) | Command::Report(_) => app.state = AppState::Evaluating,
                        Command::History => app.show_history = true,
                        _ => {}
                    }
                    spawn_command(engine, tx, command);
                }
                Err(e) => app.notice = Notice::Error(e.to_string()),
            }
        }
        _ => {}
    }
}

fn handle_finished_input(app: &mut App, key_code: KeyCode) {
    match key_code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
        KeyCode::Char('n') => app.reset(),
        KeyCode::Char(':') => {
            app.reset();
            app.input.push(':');
        }
        KeyCode::Char('h') | KeyCode::Tab => app.toggle_history(),
        KeyCode::Up => app.select_previous(),
        KeyCode::Down => app.select_next(),
        KeyCode::PageUp => app.scroll_history_up(),
        KeyCode::PageDown => app.scroll_history_down(),
        _ => {}
    }
}

/// Runs a command on the engine in the background; the ledger history is
/// refreshed afterwards since most commands change it.
fn spawn_command(engine: &Arc<Engine>, tx: &mpsc::Sender<EngineEvent>, command: Command) {
    let engine = Arc::clone(engine);
    let tx = tx.clone();
    tokio::spawn(async move {
        if !matches!(command, Command::History) {
            let event = execute(&engine, command).await;
            let _ = tx.send(event).await;
        }
        let history = match engine.recent(DEFAULT_PAGE).await {
            Ok(rows) => EngineEvent::History(rows),
            Err(e) => {
                error!(error = %e, "Failed to load history.");
                EngineEvent::Failed(format!("history unavailable: {e}"))
            }
        };
        let _ = tx.send(history).await;
    });
}

async fn execute(engine: &Engine, command: Command) -> EngineEvent {
    let outcome: vanguard_rs_verdict::Result<EngineEvent> = async {
        Ok(match command {
            Command::Evaluate(domain) => {
                let record = engine.evaluate(&domain, None).await?;
                let narrative = Some(narrate_record(&record, engine.registry()));
                EngineEvent::Evaluated { record: Box::new(record), narrative }
            }
            Command::Add(kind, domain) => {
                let added = engine.add_to_list(kind, &domain).await?;
                let state = if added { "added to" } else { "already on" };
                EngineEvent::Notice(format!("{domain} {state} the {kind}list"))
            }
            Command::Remove(kind, domain) => {
                let removed = engine.remove_from_list(kind, &domain).await?;
                let state = if removed { "removed from" } else { "was not on" };
                EngineEvent::Notice(format!("{domain} {state} the {kind}list"))
            }
            Command::Clear(kind) => {
                let removed = engine.clear_list(kind).await?;
                EngineEvent::Notice(format!("{kind}list cleared, {removed} entries removed"))
            }
            Command::Forget(query_id) => {
                let rows = engine.forget(&query_id).await?;
                EngineEvent::Notice(format!("{rows} ledger row(s) deleted for {query_id}"))
            }
            Command::Purge(scope) => {
                let rows = engine.purge(scope).await?;
                let what = match scope {
                    PurgeScope::All => "all".to_string(),
                    PurgeScope::Verdict(verdict) => verdict.to_string(),
                };
                EngineEvent::Notice(format!("{rows} ledger row(s) purged ({what})"))
            }
            Command::Report(target) => {
                let narrative = if target.starts_with("q-") {
                    engine.narrative_for_query(&target).await?
                } else {
                    engine.narrative_for_domain(&target).await?
                };
                EngineEvent::Narrative(narrative)
            }
            Command::Lists => EngineEvent::Lists {
                snapshot: engine.lists().await,
                conflicts: engine.list_conflicts().await,
            },
            Command::History => EngineEvent::History(engine.recent(DEFAULT_PAGE).await?),
            Command::Quit => EngineEvent::Notice(String::new()),
        })
    }
    .await;

    outcome.unwrap_or_else(|e| {
        error!(error = %e, "Console command failed.");
        EngineEvent::Failed(e.to_string())
    })
}
