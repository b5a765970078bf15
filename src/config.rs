// src/config.rs

use crate::core::error::{EngineError, Result};
use crate::core::registry::{ModuleRegistry, ModuleSpec};
use directories::ProjectDirs;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();
    pub static ref CONFIG_ENV: String = format!("{}_CONFIG", PROJECT_NAME.clone());
    pub static ref THRESHOLD_ENV: String = format!("{}_THRESHOLD", PROJECT_NAME.clone());
    pub static ref DATA_DIR_ENV: String = format!("{}_DATA_DIR", PROJECT_NAME.clone());
}

const API_KEY_ENVS: &[&str] = &["VIRUSTOTAL_API_KEY", "VT_API_KEY"];

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "vanguard-rs", env!("CARGO_PKG_NAME"))
}

/// Local data directory for the ledger, reports, lists and the log file.
pub fn get_data_dir() -> PathBuf {
    if let Some(proj_dirs) = project_directory() {
        proj_dirs.data_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".data")
    }
}

fn default_config_file() -> Option<PathBuf> {
    project_directory().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// `<CRATE>_CONFIG` if set, else `config.toml` in the platform config dir.
pub fn config_file() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV.as_str()).ok().map(PathBuf::from).or_else(default_config_file)
}

/// Settings for the reputation (threat-intel) probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self { base_url: "https://www.virustotal.com/api/v3".to_string(), api_key: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub modules: Vec<ModuleSpec>,
    /// Tier-1 score at or above which a domain is blocked.
    pub decision_threshold: f64,
    /// Tier-1 score at or above which (and below the decision threshold)
    /// Tier-2 probes run.
    pub escalation_threshold: f64,
    pub call_timeout_ms: u64,
    pub evaluation_budget_ms: u64,
    pub probe_timeout_ms: u64,
    pub tier2_enabled: bool,
    pub data_dir: PathBuf,
    pub intel: IntelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            modules: ModuleRegistry::default().iter().cloned().collect(),
            decision_threshold: 2.0,
            escalation_threshold: 1.0,
            call_timeout_ms: 4_000,
            evaluation_budget_ms: 10_000,
            probe_timeout_ms: 6_000,
            tier2_enabled: true,
            data_dir: get_data_dir(),
            intel: IntelConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads defaults, then the TOML file (if any), then environment overrides.
    ///
    /// Runs before logging is set up; call `log_summary` once it is.
    pub fn load() -> Result<Self> {
        let mut config = match config_file() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn log_summary(&self) {
        let file = config_file()
            .filter(|path| path.exists())
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "none".to_string());
        info!(
            config_file = %file,
            modules = self.modules.len(),
            threshold = self.decision_threshold,
            escalation = self.escalation_threshold,
            tier2 = self.tier2_enabled,
            data_dir = %self.data_dir.display(),
            "Configuration loaded."
        );
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Reading configuration file.");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| EngineError::configuration(e.to_string()))
    }

    /// Applies overrides from a key lookup (the process environment in production).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(threshold) = lookup(THRESHOLD_ENV.as_str()).and_then(|v| v.trim().parse().ok()) {
            self.decision_threshold = threshold;
        }
        if let Some(dir) = lookup(DATA_DIR_ENV.as_str()).filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(key) = API_KEY_ENVS.iter().find_map(|k| lookup(*k)).filter(|v| !v.trim().is_empty()) {
            self.intel.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.modules.is_empty() {
            return Err(EngineError::configuration("at least one analyzer module is required"));
        }
        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.name.as_str()) {
                return Err(EngineError::configuration(format!("duplicate module '{}'", module.name)));
            }
            if !module.weight.is_finite() || module.weight <= 0.0 {
                return Err(EngineError::configuration(format!(
                    "module '{}' has non-positive weight {}",
                    module.name, module.weight
                )));
            }
        }
        if self.call_timeout_ms == 0 || self.evaluation_budget_ms == 0 || self.probe_timeout_ms == 0 {
            return Err(EngineError::configuration("timeouts must be greater than zero"));
        }
        if !self.decision_threshold.is_finite() || !self.escalation_threshold.is_finite() {
            return Err(EngineError::configuration(format!(
                "thresholds must be finite numbers (decision {}, escalation {})",
                self.decision_threshold, self.escalation_threshold
            )));
        }
        if self.escalation_threshold >= self.decision_threshold {
            return Err(EngineError::configuration(format!(
                "escalation threshold {} must be below decision threshold {}",
                self.escalation_threshold, self.decision_threshold
            )));
        }
        Ok(())
    }

    pub fn registry(&self) -> ModuleRegistry {
        ModuleRegistry::new(self.modules.clone())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn evaluation_budget(&self) -> Duration {
        Duration::from_millis(self.evaluation_budget_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.db")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub fn lists_dir(&self) -> PathBuf {
        self.data_dir.join("lists")
    }
}
