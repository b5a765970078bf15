// src/core/tier2/mod.rs

//! Second-tier escalation: slower web-enrichment and reputation probes that
//! run only when the Tier-1 consensus is suspicious but not conclusive.

pub mod enrichment;
pub mod intel;

use crate::config::EngineConfig;
use crate::core::error::{EngineError, ProbeError};
use crate::core::models::{EnrichmentResult, EvaluationRequest, IntelResult, Tier2Outcome, Verdict};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use self::enrichment::WebEnrichmentProbe;
use self::intel::ReputationProbe;

/// Weight of the enrichment sub-score inside the Tier-2 score.
pub const ENRICHMENT_WEIGHT: f64 = 0.4;
/// Weight of the reputation sub-score inside the Tier-2 score.
pub const INTEL_WEIGHT: f64 = 0.6;
/// Share of the normalized Tier-1 score in the final blend.
pub const TIER1_MIX: f64 = 0.9;
/// Share of the Tier-2 score in the final blend.
pub const TIER2_MIX: f64 = 0.1;
/// Final scores up to this value are `Legit`.
pub const LEGIT_CEILING: f64 = 0.5;
/// Final scores up to this value (and above `LEGIT_CEILING`) are `Suspicious`.
pub const SUSPICIOUS_CEILING: f64 = 0.7;

/// Inspects what a domain serves over HTTP.
#[async_trait]
pub trait EnrichmentProbe: Send + Sync {
    async fn enrich(&self, domain: &str) -> Result<EnrichmentResult, ProbeError>;
}

/// Asks an external reputation service about a domain.
#[async_trait]
pub trait IntelProbe: Send + Sync {
    async fn lookup(&self, domain: &str) -> Result<IntelResult, ProbeError>;
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 }
}

/// Escalate on suspicion, not on certainty: the lower bound is inclusive,
/// and scores that already block are not re-probed.
pub fn should_escalate(tier1_score: f64, escalation_threshold: f64, decision_threshold: f64) -> bool {
    tier1_score >= escalation_threshold && tier1_score < decision_threshold
}

/// Maps a blended final score onto the three-level verdict.
pub fn classify(final_score: f64) -> Verdict {
    if final_score <= LEGIT_CEILING {
        Verdict::Legit
    } else if final_score <= SUSPICIOUS_CEILING {
        Verdict::Suspicious
    } else {
        Verdict::Malicious
    }
}

/// Blends the normalized Tier-1 score with the Tier-2 score.
pub fn blend(tier1_normalized: f64, tier2_score: f64) -> (f64, Verdict) {
    let final_score = round_to(clamp_unit(tier1_normalized) * TIER1_MIX + clamp_unit(tier2_score) * TIER2_MIX, 2);
    (final_score, classify(final_score))
}

pub struct Tier2Escalation {
    enrichment: Arc<dyn EnrichmentProbe>,
    intel: Arc<dyn IntelProbe>,
    timeout: Duration,
}

impl Tier2Escalation {
    pub fn new(enrichment: Arc<dyn EnrichmentProbe>, intel: Arc<dyn IntelProbe>, timeout: Duration) -> Self {
        Self { enrichment, intel, timeout }
    }

    /// The production probes: live HTTP enrichment and the reputation API.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let timeout = config.probe_timeout();
        let enrichment = WebEnrichmentProbe::new(timeout)
            .map_err(|e| EngineError::configuration(format!("enrichment probe: {e}")))?;
        let intel = ReputationProbe::new(&config.intel.base_url, config.intel.api_key.clone(), timeout)
            .map_err(|e| EngineError::configuration(format!("intel probe: {e}")))?;
        Ok(Self::new(Arc::new(enrichment), Arc::new(intel), timeout))
    }

    /// Runs both probes concurrently and blends their scores.
    ///
    /// A probe that fails or times out contributes a zero sub-score and an
    /// error reason; it never prevents the blend.
    pub async fn evaluate_tier2(&self, request: &EvaluationRequest, tier1_normalized: f64) -> Tier2Outcome {
        info!(domain = %request.domain, query_id = %request.query_id, "Escalating to Tier-2 probes.");
        let (enrichment, intel) = tokio::join!(
            tokio::time::timeout(self.timeout, self.enrichment.enrich(&request.domain)),
            tokio::time::timeout(self.timeout, self.intel.lookup(&request.domain)),
        );

        let enrichment = match enrichment {
            Ok(Ok(mut result)) => {
                result.meta_score = clamp_unit(result.meta_score);
                result
            }
            Ok(Err(e)) => {
                warn!(domain = %request.domain, error = %e, "Enrichment probe failed.");
                EnrichmentResult::failed(format!("error:{e}"))
            }
            Err(_) => {
                warn!(domain = %request.domain, "Enrichment probe timed out.");
                EnrichmentResult::failed(format!("error:{}", ProbeError::Timeout))
            }
        };
        let intel = match intel {
            Ok(Ok(mut result)) => {
                result.intel_score = clamp_unit(result.intel_score);
                result
            }
            Ok(Err(e)) => {
                warn!(domain = %request.domain, error = %e, "Intel probe failed.");
                IntelResult::failed(format!("error:{e}"))
            }
            Err(_) => {
                warn!(domain = %request.domain, "Intel probe timed out.");
                IntelResult::failed(format!("error:{}", ProbeError::Timeout))
            }
        };

        let tier2_score = round_to(enrichment.meta_score * ENRICHMENT_WEIGHT + intel.intel_score * INTEL_WEIGHT, 3);
        let (final_score, final_verdict) = blend(tier1_normalized, tier2_score);
        info!(
            domain = %request.domain,
            tier2_score,
            final_score,
            verdict = %final_verdict,
            "Tier-2 blend complete."
        );
        Tier2Outcome { enrichment, intel, tier2_score, final_score, final_verdict }
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    fn escalation(enrichment: FixedEnrichment, intel: Arc<dyn IntelProbe>) -> Tier2Escalation {
        Tier2Escalation::new(Arc::new(enrichment), intel, Duration::from_millis(200))
    }

    #[test]
    fn escalation_window_is_lower_inclusive_upper_exclusive() {
        assert!(should_escalate(1.0, 1.0, 2.0));
        assert!(should_escalate(1.5, 1.0, 2.0));
        assert!(!should_escalate(0.5, 1.0, 2.0));
        assert!(!should_escalate(2.0, 1.0, 2.0));
    }

    #[test]
    fn final_score_thresholds() {
        assert_eq!(classify(0.5), Verdict::Legit);
        assert_eq!(classify(0.51), Verdict::Suspicious);
        assert_eq!(classify(0.7), Verdict::Suspicious);
        assert_eq!(classify(0.71), Verdict::Malicious);
        assert_eq!(blend(1.0, 1.0), (1.0, Verdict::Malicious));
        assert_eq!(blend(0.5, 0.5), (0.5, Verdict::Legit));
        assert_eq!(blend(2.0 / 3.0, 0.8), (0.68, Verdict::Suspicious));
    }

    #[tokio::test]
    async fn blends_both_sub_scores() {
        let tier2 = escalation(
            FixedEnrichment(Ok(EnrichmentResult { meta_score: 0.5, ..Default::default() })),
            Arc::new(FixedIntel(Ok(IntelResult { positives: 5, total_engines: 10, intel_score: 0.5, ..Default::default() }))),
        );
        let outcome = tier2.evaluate_tier2(&EvaluationRequest::new("example-test123.xyz", None), 1.0 / 3.0).await;
        assert_eq!(outcome.tier2_score, 0.5);
        assert_eq!(outcome.final_score, 0.35);
        assert_eq!(outcome.final_verdict, Verdict::Legit);
    }

    #[tokio::test]
    async fn failed_probes_degrade_to_zero() {
        let tier2 = escalation(
            FixedEnrichment(Err(|| ProbeError::Status(502))),
            Arc::new(FixedIntel(Ok(IntelResult { intel_score: 1.0, ..Default::default() }))),
        );
        let outcome = tier2.evaluate_tier2(&EvaluationRequest::new("a.com", None), 0.5).await;
        assert_eq!(outcome.enrichment.meta_score, 0.0);
        assert_eq!(outcome.enrichment.error.as_deref(), Some("error:status 502"));
        assert_eq!(outcome.tier2_score, 0.6);
    }

    #[tokio::test]
    async fn stalled_probes_time_out() {
        let tier2 = escalation(FixedEnrichment(Ok(EnrichmentResult { meta_score: 1.0, ..Default::default() })), Arc::new(StalledIntel));
        let started = std::time::Instant::now();
        let outcome = tier2.evaluate_tier2(&EvaluationRequest::new("a.com", None), 0.5).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.intel.error.as_deref(), Some("error:timeout"));
        assert_eq!(outcome.tier2_score, 0.4);
    }

    #[tokio::test]
    async fn out_of_range_sub_scores_are_clamped() {
        let tier2 = escalation(
            FixedEnrichment(Ok(EnrichmentResult { meta_score: 7.0, ..Default::default() })),
            Arc::new(FixedIntel(Ok(IntelResult { intel_score: f64::NAN, ..Default::default() }))),
        );
        let outcome = tier2.evaluate_tier2(&EvaluationRequest::new("a.com", None), 0.0).await;
        assert_eq!(outcome.enrichment.meta_score, 1.0);
        assert_eq!(outcome.intel.intel_score, 0.0);
    }
}
