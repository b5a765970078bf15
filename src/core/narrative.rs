// src/core/narrative.rs

//! Human-readable explanations of past decisions.
//!
//! Both builders are pure: the same record (or the same set of report
//! artifacts) always yields the same lines, ordered by module registration.

use crate::core::models::{AnalyzerResult, DecisionRecord, ListKind, Verdict};
use crate::core::registry::ModuleRegistry;
use crate::core::reports::ReportArtifact;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narrative {
    pub query_id: String,
    pub domain: String,
    /// One line per analyzer, in registration order.
    pub lines: Vec<String>,
    pub summary: String,
}

impl fmt::Display for Narrative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Decision {} for {}", self.query_id, self.domain)?;
        for line in &self.lines {
            writeln!(f, "  - {line}")?;
        }
        write!(f, "{}", self.summary)
    }
}

fn explain(result: &AnalyzerResult, weight: f64) -> String {
    let stance = if !result.ok {
        "FAILED"
    } else if result.flagged() {
        "FLAGGED"
    } else {
        "allowed"
    };
    let label = result.label.as_deref().map(|l| format!(" [{l}]")).unwrap_or_default();
    format!(
        "{}: {}{} score={:.2} weight={:.2} ({})",
        result.module_name, stance, label, result.score, weight, result.reason
    )
}

fn ordered<'a>(registry: &ModuleRegistry, results: impl Iterator<Item = &'a AnalyzerResult>) -> Vec<&'a AnalyzerResult> {
    let mut results: Vec<&AnalyzerResult> = results.collect();
    registry.sort_by_registration(&mut results, |r| r.module_name.as_str());
    results
}

/// Explains a ledgered decision.
pub fn narrate_record(record: &DecisionRecord, registry: &ModuleRegistry) -> Narrative {
    let lines = match record.fast_path {
        Some(list) => vec![format!("fast path: domain is on the {list}list, no analyzer was called")],
        None => ordered(registry, record.analyzer_results.iter())
            .into_iter()
            .map(|r| explain(r, registry.weight(&r.module_name)))
            .collect(),
    };

    let mut summary = format!(
        "Tier-1 score {:.2} against threshold {:.2}: {}.",
        record.score, record.threshold, record.verdict
    );
    if let (Some(tier2), Some(final_score), Some(final_verdict)) =
        (record.tier2_score, record.final_score, record.final_verdict)
    {
        let meta = record.tier2_enrichment.as_ref().map_or(0.0, |e| e.meta_score);
        let intel = record.tier2_intel.as_ref().map_or(0.0, |i| i.intel_score);
        summary.push_str(&format!(
            " Tier-2 enrichment {meta:.2}, intel {intel:.2}, combined {tier2:.3}; final score {final_score:.2}: {final_verdict}."
        ));
    }

    Narrative { query_id: record.query_id.clone(), domain: record.domain.clone(), lines, summary }
}

/// Rebuilds an explanation from per-analyzer report artifacts alone.
///
/// Used when the ledger has no row for the domain. The score is recomputed
/// from the current registry weights. Returns `None` when there is nothing
/// to explain.
pub fn narrate_reports(
    domain: &str,
    artifacts: &[ReportArtifact],
    registry: &ModuleRegistry,
    threshold: f64,
) -> Option<Narrative> {
    let first = artifacts.first()?;
    let results = ordered(registry, artifacts.iter().map(|a| &a.result));

    let score: f64 = results
        .iter()
        .filter(|r| r.flagged())
        .map(|r| registry.weight(&r.module_name))
        .sum();
    let verdict = if score >= threshold { Verdict::Block } else { Verdict::Allow };

    Some(Narrative {
        query_id: first.query_id.clone(),
        domain: domain.to_string(),
        lines: results.iter().map(|r| explain(r, registry.weight(&r.module_name))).collect(),
        summary: format!(
            "Rebuilt from {} report(s): score {:.2} against threshold {:.2}: {}. Would be written to the {}list.",
            results.len(),
            score,
            threshold,
            verdict,
            ListKind::for_verdict(verdict)
        ),
    })
}
