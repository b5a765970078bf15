// src/core/engine.rs

//! The evaluation orchestrator.
//!
//! One `evaluate` call runs the whole pipeline: input validation, the
//! allow/block fast path, concurrent Tier-1 analyzer calls, weighted
//! consensus, report artifacts, list write-back, the ledger row and, when the
//! Tier-1 score is suspicious but not conclusive, Tier-2 escalation.

use crate::config::EngineConfig;
use crate::core::client::AnalyzerClient;
use crate::core::domain::normalize_domain;
use crate::core::error::{EngineError, Result};
use crate::core::ledger::{Ledger, PurgeScope};
use crate::core::lists::ListStore;
use crate::core::models::{
    AnalyzerResult, DecisionRecord, EvaluationRequest, ListKind, ListsSnapshot, Tier1Outcome, Verdict,
};
use crate::core::narrative::{Narrative, narrate_record, narrate_reports};
use crate::core::registry::ModuleRegistry;
use crate::core::reports::ReportStore;
use crate::core::tier2::{Tier2Escalation, should_escalate};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Combines analyzer results into the Tier-1 consensus.
///
/// The score is the sum of the weights of flagging modules; failed calls
/// never flag. `results` are reordered by registration so the reason string
/// is stable across runs.
pub fn aggregate(registry: &ModuleRegistry, mut results: Vec<AnalyzerResult>, threshold: f64) -> Tier1Outcome {
    registry.sort_by_registration(&mut results, |r| r.module_name.as_str());

    let score: f64 = results
        .iter()
        .filter(|r| r.flagged())
        .map(|r| registry.weight(&r.module_name))
        .sum();
    let verdict = if score >= threshold { Verdict::Block } else { Verdict::Allow };
    let reasons = results
        .iter()
        .map(|r| {
            let mark = if r.flagged() { "FLAG" } else { "OK" };
            format!("{}:{}({})", r.module_name, mark, r.reason)
        })
        .collect::<Vec<_>>()
        .join("; ");

    Tier1Outcome { score, verdict, reasons, results }
}

pub struct Engine {
    config: EngineConfig,
    registry: ModuleRegistry,
    client: AnalyzerClient,
    lists: ListStore,
    ledger: Ledger,
    reports: ReportStore,
    tier2: Option<Tier2Escalation>,
}

impl Engine {
    /// Validates the configuration and opens every store under `data_dir`.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let tier2 = if config.tier2_enabled { Some(Tier2Escalation::from_config(&config)?) } else { None };
        let engine = Self {
            registry: config.registry(),
            client: AnalyzerClient::new(config.call_timeout())?,
            lists: ListStore::open(config.lists_dir()).await?,
            ledger: Ledger::open(&config.ledger_path()).await?,
            reports: ReportStore::open(config.reports_dir()).await?,
            tier2,
            config,
        };
        info!(
            modules = engine.registry.len(),
            tier2 = engine.tier2.is_some(),
            "Engine ready."
        );
        Ok(engine)
    }

    /// Replaces the Tier-2 probes.
    pub fn with_tier2(mut self, tier2: Tier2Escalation) -> Self {
        self.tier2 = Some(tier2);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Evaluates one domain and returns its decision record.
    ///
    /// Only invalid input is an error. Analyzer, probe and storage failures
    /// are logged and folded into the record.
    pub async fn evaluate(&self, domain: &str, client_ip: Option<&str>) -> Result<DecisionRecord> {
        let domain = normalize_domain(domain)?;
        let request = EvaluationRequest::new(domain, client_ip);
        let threshold = self.config.decision_threshold;
        info!(domain = %request.domain, query_id = %request.query_id, client_ip = %request.client_ip, "Evaluation started.");

        if let Some(list) = self.lists.is_listed(&request.domain).await {
            info!(domain = %request.domain, list = %list, "Fast-path hit.");
            let record = DecisionRecord::from_fast_path(&request, threshold, list);
            self.record(&record).await;
            return Ok(record);
        }

        let tier1 = self.evaluate_tier1(&request).await;
        info!(
            domain = %request.domain,
            score = tier1.score,
            verdict = %tier1.verdict,
            "Tier-1 consensus reached."
        );

        if let Err(e) = self.reports.write_all(&request, &tier1.results).await {
            error!(query_id = %request.query_id, error = %e, "Failed to write report artifacts.");
        }
        let list = ListKind::for_verdict(tier1.verdict);
        if let Err(e) = self.lists.add(list, &request.domain).await {
            error!(domain = %request.domain, list = %list, error = %e, "Failed to cache verdict in list.");
        }

        let escalate = should_escalate(tier1.score, self.config.escalation_threshold, threshold);
        let mut record = DecisionRecord::from_tier1(&request, threshold, tier1);
        let stored = self.record(&record).await;

        if let Some(tier2) = self.tier2.as_ref().filter(|_| escalate) {
            let outcome = tier2.evaluate_tier2(&request, self.normalized(record.score)).await;
            if stored {
                match self.ledger.attach_tier2(&request.query_id, &outcome).await {
                    Ok(true) => {}
                    Ok(false) => warn!(query_id = %request.query_id, "Ledger row already carried Tier-2 data."),
                    Err(e) => error!(query_id = %request.query_id, error = %e, "Failed to store Tier-2 outcome."),
                }
            }
            record.attach_tier2(outcome);
        } else if escalate {
            debug!(domain = %request.domain, "Escalation warranted but Tier-2 is disabled.");
        }

        Ok(record)
    }

    /// Calls every registered analyzer concurrently and aggregates the answers.
    ///
    /// All calls run to completion or to their own timeout; the shared
    /// evaluation budget caps every call.
    pub async fn evaluate_tier1(&self, request: &EvaluationRequest) -> Tier1Outcome {
        let deadline = Instant::now() + self.config.evaluation_budget();

        let handles: Vec<_> = self
            .registry
            .iter()
            .map(|module| {
                let client = self.client.clone();
                let module = module.clone();
                let request = request.clone();
                let name = module.name.clone();
                let handle = tokio::spawn(async move { client.call(&module, &request, Some(deadline)).await });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(module = %name, error = %e, "Analyzer task aborted.");
                    results.push(AnalyzerResult::failed(&name, "aborted", 0));
                }
            }
        }

        aggregate(&self.registry, results, self.config.decision_threshold)
    }

    /// Tier-1 score as a fraction of the total registry weight.
    pub fn normalized(&self, score: f64) -> f64 {
        let total = self.registry.total_weight();
        if total > 0.0 { (score / total).clamp(0.0, 1.0) } else { 0.0 }
    }

    async fn record(&self, record: &DecisionRecord) -> bool {
        match self.ledger.insert(record).await {
            Ok(_) => true,
            Err(e) => {
                error!(query_id = %record.query_id, error = %e, "Failed to record decision.");
                false
            }
        }
    }

    // --- List administration ---

    pub async fn add_to_list(&self, kind: ListKind, domain: &str) -> Result<bool> {
        let domain = normalize_domain(domain)?;
        self.lists.add(kind, &domain).await
    }

    pub async fn remove_from_list(&self, kind: ListKind, domain: &str) -> Result<bool> {
        let domain = normalize_domain(domain)?;
        self.lists.remove(kind, &domain).await
    }

    pub async fn clear_list(&self, kind: ListKind) -> Result<usize> {
        self.lists.clear(kind).await
    }

    pub async fn lists(&self) -> ListsSnapshot {
        self.lists.snapshot().await
    }

    pub async fn list_conflicts(&self) -> Vec<String> {
        self.lists.conflicts().await
    }

    // --- Ledger queries ---

    pub async fn decision(&self, query_id: &str) -> Result<Option<DecisionRecord>> {
        self.ledger.get(query_id).await
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<DecisionRecord>> {
        self.ledger.recent(limit).await
    }

    pub async fn history(&self, domain: &str, limit: u32) -> Result<Vec<DecisionRecord>> {
        let domain = normalize_domain(domain)?;
        self.ledger.history(&domain, limit).await
    }

    pub async fn forget(&self, query_id: &str) -> Result<u64> {
        self.ledger.delete(query_id).await
    }

    pub async fn purge(&self, scope: PurgeScope) -> Result<u64> {
        self.ledger.purge(scope).await
    }

    // --- Narratives ---

    /// Explains one evaluation, preferring the ledger row over report files.
    pub async fn narrative_for_query(&self, query_id: &str) -> Result<Narrative> {
        if let Some(record) = self.ledger.get(query_id).await? {
            return Ok(narrate_record(&record, &self.registry));
        }
        let artifacts = self.reports.for_query(query_id).await?;
        let domain = artifacts.first().map(|a| a.domain.clone()).unwrap_or_default();
        narrate_reports(&domain, &artifacts, &self.registry, self.config.decision_threshold)
            .ok_or_else(|| EngineError::NotFound(format!("no decision for query '{query_id}'")))
    }

    /// Explains the latest evaluation of a domain from its report artifacts.
    pub async fn narrative_for_domain(&self, domain: &str) -> Result<Narrative> {
        let domain = normalize_domain(domain)?;
        let artifacts = self.reports.latest_for_domain(&domain).await?;
        narrate_reports(&domain, &artifacts, &self.registry, self.config.decision_threshold)
            .ok_or_else(|| EngineError::NotFound(format!("no reports for domain '{domain}'")))
    }
}
