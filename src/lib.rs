// src/lib.rs

//! Domain trust evaluation.
//!
//! [`Engine::evaluate`] turns a bare domain name into a [`DecisionRecord`] by
//! polling a registry of analyzer services concurrently, combining their
//! flags by weighted vote and escalating borderline cases to slower
//! enrichment and reputation probes. Every decision is kept in a SQLite
//! ledger, with one JSON report per analyzer for later explanation.

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::EngineConfig;
pub use crate::core::engine::Engine;
pub use crate::core::error::{EngineError, ProbeError, Result};
pub use crate::core::models::{DecisionRecord, ListKind, Verdict};
