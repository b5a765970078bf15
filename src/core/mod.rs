// src/core/mod.rs

// The evaluation core. Nothing in here knows about the terminal UI.

/// Data structures shared by every stage: requests, analyzer results,
/// Tier-2 outcomes and the decision record.
pub mod models;

pub mod error;
pub mod domain;

/// The ordered set of analyzer services and their weights.
pub mod registry;

/// Fail-open HTTP adapter to analyzer services.
pub mod client;

pub mod lists;
pub mod reports;
pub mod ledger;
pub mod tier2;
pub mod narrative;

/// Orchestrates a full evaluation across the modules above.
pub mod engine;
