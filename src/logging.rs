// src/logging.rs

use crate::config::PROJECT_NAME;
use color_eyre::eyre::Result;
use lazy_static::lazy_static;
use std::path::Path;
use time::macros::format_description;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::{self, EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

lazy_static! {
    pub static ref LOG_ENV: String = format!("{}_LOGLEVEL", PROJECT_NAME.clone());
    pub static ref LOG_FILE: String = format!("{}.log", env!("CARGO_PKG_NAME"));
}

/// Filter directives: `RUST_LOG`, then the crate's own variable, then `info`.
fn filter_directives(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup("RUST_LOG")
        .or_else(|| lookup(LOG_ENV.as_str()))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| format!("{}=info", env!("CARGO_CRATE_NAME")))
}

/// Initializes file-based logging in `directory`.
///
/// The terminal belongs to the console UI, so nothing is written to stdout.
pub fn initialize_logging(directory: &Path) -> Result<()> {
    std::fs::create_dir_all(directory)?;
    let log_path = directory.join(LOG_FILE.as_str());
    let log_file = std::fs::File::create(log_path)?;

    let timer = LocalTime::new(format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"));
    let file_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_timer(timer)
        .with_target(false)
        .with_ansi(false)
        .with_filter(EnvFilter::new(filter_directives(|key| std::env::var(key).ok())));

    tracing_subscriber::registry()
        .with(file_subscriber)
        .with(ErrorLayer::default())
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn rust_log_wins_over_the_crate_variable() {
        let env: HashMap<String, String> = [
            ("RUST_LOG".to_string(), "debug".to_string()),
            (LOG_ENV.clone(), "warn".to_string()),
        ]
        .into();
        assert_eq!(filter_directives(|k| env.get(k).cloned()), "debug");
    }

    #[test]
    fn falls_back_to_crate_info() {
        let env: HashMap<String, String> = [(LOG_ENV.clone(), "trace".to_string())].into();
        assert_eq!(filter_directives(|k| env.get(k).cloned()), "trace");
        assert_eq!(filter_directives(|_| None), "vanguard_rs_verdict=info");
    }
}
