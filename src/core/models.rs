// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

// --- Verdicts ---

/// Categorical risk decision for a domain.
///
/// Tier-1 produces `Allow`/`Block`; Tier-2 blending refines the decision into
/// one of `Legit`, `Suspicious` or `Malicious`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Verdict {
    Allow,
    Block,
    Legit,
    Suspicious,
    Malicious,
}

impl Verdict {
    /// True for the verdicts that deny the domain.
    pub fn is_blocking(self) -> bool {
        matches!(self, Verdict::Block | Verdict::Malicious)
    }
}

/// The two administrative membership lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ListKind {
    Allow,
    Block,
}

impl ListKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ListKind::Allow => "allowlist.txt",
            ListKind::Block => "blocklist.txt",
        }
    }

    /// The Tier-1 verdict a fast-path hit on this list produces.
    pub fn verdict(self) -> Verdict {
        match self {
            ListKind::Allow => Verdict::Allow,
            ListKind::Block => Verdict::Block,
        }
    }

    /// The list a Tier-1 verdict is written back to.
    pub fn for_verdict(verdict: Verdict) -> Self {
        if verdict.is_blocking() { ListKind::Block } else { ListKind::Allow }
    }
}

// --- Requests ---

/// Mints a fresh, globally unique query identifier.
///
/// The identifier never contains `_`, which keeps report artifact file names
/// (`<query_id>_<module>_<domain>.json`) unambiguous.
pub fn new_query_id() -> String {
    format!("q-{}", Uuid::new_v4().simple())
}

/// One evaluation, as sent to every analyzer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub query_id: String,
    pub domain: String,
    pub client_ip: String,
}

impl EvaluationRequest {
    pub fn new(domain: impl Into<String>, client_ip: Option<&str>) -> Self {
        Self {
            query_id: new_query_id(),
            domain: domain.into(),
            client_ip: client_ip
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

// --- Tier-1 ---

/// The outcome of one analyzer call.
///
/// `ok == false` means the call itself failed; such a result always carries
/// `flag == 0` and a reason of the form `error:<cause>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerResult {
    pub module_name: String,
    pub ok: bool,
    pub flag: u8,
    pub score: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl AnalyzerResult {
    /// A fail-open result for a call that did not produce a usable answer.
    pub fn failed(module_name: &str, cause: impl std::fmt::Display, elapsed_ms: u64) -> Self {
        Self {
            module_name: module_name.to_string(),
            ok: false,
            flag: 0,
            score: 0.0,
            reason: format!("error:{cause}"),
            label: None,
            details: None,
            elapsed_ms,
        }
    }

    pub fn flagged(&self) -> bool {
        self.flag != 0
    }
}

/// Aggregated Tier-1 consensus for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier1Outcome {
    pub score: f64,
    pub verdict: Verdict,
    pub reasons: String,
    /// Results in registry order.
    pub results: Vec<AnalyzerResult>,
}

// --- Tier-2 ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub final_url: Option<String>,
    pub redirects: u32,
    pub status_code: Option<u16>,
    pub content_length: Option<u64>,
    pub favicon_hash: Option<String>,
    pub phishing_tokens: Vec<String>,
    pub has_password_form: bool,
    pub meta_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnrichmentResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self { error: Some(reason.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntelResult {
    pub positives: u64,
    pub total_engines: u64,
    pub sources: Vec<String>,
    pub intel_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntelResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self { error: Some(reason.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier2Outcome {
    pub enrichment: EnrichmentResult,
    pub intel: IntelResult,
    pub tier2_score: f64,
    pub final_score: f64,
    pub final_verdict: Verdict,
}

// --- Decision record ---

/// The audit row produced by one evaluation.
///
/// `score` and `verdict` are the Tier-1 values and never change once written.
/// The Tier-2 fields stay `None` unless escalation ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub query_id: String,
    pub domain: String,
    pub client_ip: String,
    pub score: f64,
    pub threshold: f64,
    pub verdict: Verdict,
    pub reasons: String,
    #[serde(rename = "modules")]
    pub analyzer_results: Vec<AnalyzerResult>,
    pub fast_path: Option<ListKind>,
    pub tier2_enrichment: Option<EnrichmentResult>,
    pub tier2_intel: Option<IntelResult>,
    pub tier2_score: Option<f64>,
    pub final_score: Option<f64>,
    pub final_verdict: Option<Verdict>,
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn from_tier1(request: &EvaluationRequest, threshold: f64, tier1: Tier1Outcome) -> Self {
        Self {
            query_id: request.query_id.clone(),
            domain: request.domain.clone(),
            client_ip: request.client_ip.clone(),
            score: tier1.score,
            threshold,
            verdict: tier1.verdict,
            reasons: tier1.reasons,
            analyzer_results: tier1.results,
            fast_path: None,
            tier2_enrichment: None,
            tier2_intel: None,
            tier2_score: None,
            final_score: None,
            final_verdict: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_fast_path(request: &EvaluationRequest, threshold: f64, list: ListKind) -> Self {
        let (score, reasons) = match list {
            ListKind::Allow => (0.0, "allowlisted"),
            ListKind::Block => (threshold, "blocklisted"),
        };
        Self {
            query_id: request.query_id.clone(),
            domain: request.domain.clone(),
            client_ip: request.client_ip.clone(),
            score,
            threshold,
            verdict: list.verdict(),
            reasons: reasons.to_string(),
            analyzer_results: Vec::new(),
            fast_path: Some(list),
            tier2_enrichment: None,
            tier2_intel: None,
            tier2_score: None,
            final_score: None,
            final_verdict: None,
            timestamp: Utc::now(),
        }
    }

    pub fn attach_tier2(&mut self, tier2: Tier2Outcome) {
        self.tier2_enrichment = Some(tier2.enrichment);
        self.tier2_intel = Some(tier2.intel);
        self.tier2_score = Some(tier2.tier2_score);
        self.final_score = Some(tier2.final_score);
        self.final_verdict = Some(tier2.final_verdict);
    }

    /// The most refined verdict available for this record.
    pub fn effective_verdict(&self) -> Verdict {
        self.final_verdict.unwrap_or(self.verdict)
    }
}

/// Contents of both membership lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListsSnapshot {
    pub allowlist: Vec<String>,
    pub blocklist: Vec<String>,
    pub allow_count: usize,
    pub block_count: usize,
}
