// src/ui/widgets/mod.rs

pub mod analysis_view; // Per-analyzer results and the narrative.
pub mod footer;
pub mod history; // Recent ledger rows.
pub mod input;
pub mod summary;
