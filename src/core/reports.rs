// src/core/reports.rs

use crate::core::error::Result;
use crate::core::models::{AnalyzerResult, EvaluationRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, error, warn};

/// Longest name part kept verbatim; longer ones get a digest suffix.
const MAX_COMPONENT: usize = 64;
const KEPT_PREFIX: usize = 48;

/// One analyzer's answer for one evaluation, as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub query_id: String,
    pub module: String,
    pub domain: String,
    /// Registration index of the module when the report was written.
    pub position: usize,
    pub recorded_at: DateTime<Utc>,
    pub result: AnalyzerResult,
}

/// Directory of `<query_id>_<module>_<domain>.json` report files.
///
/// Each name part is capped so the file name stays within filesystem limits;
/// lookups match on the JSON fields, not on the name.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

fn file_component(raw: &str) -> String {
    let safe: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if safe.len() <= MAX_COMPONENT {
        return safe;
    }
    let digest = format!("{:x}", Sha256::digest(raw.as_bytes()));
    // `safe` is ASCII, so byte slicing is on char boundaries.
    format!("{}-{}", &safe[..KEPT_PREFIX], &digest[..12])
}

impl ReportStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, query_id: &str, module: &str, domain: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}.json",
            file_component(query_id),
            file_component(module),
            file_component(domain)
        ))
    }

    pub async fn write(&self, request: &EvaluationRequest, position: usize, result: &AnalyzerResult) -> Result<PathBuf> {
        let artifact = ReportArtifact {
            query_id: request.query_id.clone(),
            module: result.module_name.clone(),
            domain: request.domain.clone(),
            position,
            recorded_at: Utc::now(),
            result: result.clone(),
        };
        let path = self.path_for(&artifact.query_id, &artifact.module, &artifact.domain);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&artifact)?).await?;
        debug!(path = %path.display(), "Report written.");
        Ok(path)
    }

    /// Writes one report per result; `results` must be in registry order.
    ///
    /// A failed file is logged and skipped. Returns how many were written, or
    /// the last error when none was.
    pub async fn write_all(&self, request: &EvaluationRequest, results: &[AnalyzerResult]) -> Result<usize> {
        let mut written = 0;
        let mut last_error = None;
        for (position, result) in results.iter().enumerate() {
            match self.write(request, position, result).await {
                Ok(_) => written += 1,
                Err(e) => {
                    error!(query_id = %request.query_id, module = %result.module_name, error = %e, "Failed to write report.");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if written == 0 => Err(e),
            _ => Ok(written),
        }
    }

    /// All reports of one evaluation, ordered by module position.
    pub async fn for_query(&self, query_id: &str) -> Result<Vec<ReportArtifact>> {
        let prefix = format!("{}_", file_component(query_id));
        let mut artifacts = self.scan(|name| name.starts_with(&prefix)).await?;
        artifacts.retain(|a| a.query_id == query_id);
        artifacts.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.module.cmp(&b.module)));
        Ok(artifacts)
    }

    /// The reports of the most recent evaluation of `domain`.
    pub async fn latest_for_domain(&self, domain: &str) -> Result<Vec<ReportArtifact>> {
        let suffix = format!("_{}.json", file_component(domain));
        let candidates = self.scan(|name| name.ends_with(&suffix)).await?;

        let mut by_query: BTreeMap<String, Vec<ReportArtifact>> = BTreeMap::new();
        for artifact in candidates.into_iter().filter(|a| a.domain == domain) {
            by_query.entry(artifact.query_id.clone()).or_default().push(artifact);
        }

        let latest = by_query.into_values().max_by(|a, b| {
            let newest = |group: &[ReportArtifact]| group.iter().map(|r| r.recorded_at).max();
            newest(a.as_slice()).cmp(&newest(b.as_slice())).then_with(|| a[0].query_id.cmp(&b[0].query_id))
        });
        let mut artifacts = latest.unwrap_or_default();
        artifacts.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.module.cmp(&b.module)));
        Ok(artifacts)
    }

    async fn scan(&self, wanted: impl Fn(&str) -> bool) -> Result<Vec<ReportArtifact>> {
        let mut artifacts = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") || !wanted(&name) {
                continue;
            }
            let bytes = match tokio::fs::read(entry.path()).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = %name, error = %e, "Skipping unreadable report.");
                    continue;
                }
            };
            match serde_json::from_slice::<ReportArtifact>(&bytes) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => warn!(file = %name, error = %e, "Skipping unreadable report."),
            }
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn result(module: &str, flag: u8) -> AnalyzerResult {
        AnalyzerResult {
            module_name: module.to_string(),
            ok: true,
            flag,
            score: f64::from(flag),
            reason: "ok".to_string(),
            label: None,
            details: None,
            elapsed_ms: 3,
        }
    }

    #[tokio::test]
    async fn writes_one_file_per_module_named_by_query_module_domain() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(dir.path()).await.unwrap();
        let request = EvaluationRequest::new("malicious-test.tk", None);

        let results = vec![result("domain_classifier", 1), AnalyzerResult::failed("whois_analyzer", "timeout", 4000)];
        assert_eq!(store.write_all(&request, &results).await.unwrap(), 2);

        let expected = dir.path().join(format!("{}_whois_analyzer_malicious-test.tk.json", request.query_id));
        assert!(expected.exists());

        let loaded = store.for_query(&request.query_id).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].module, "domain_classifier");
        assert_eq!(loaded[1].result.reason, "error:timeout");
    }

    #[tokio::test]
    async fn latest_for_domain_picks_the_newest_evaluation() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(dir.path()).await.unwrap();

        let older = EvaluationRequest::new("repeat.com", None);
        store.write_all(&older, &[result("domain_classifier", 0)]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = EvaluationRequest::new("repeat.com", None);
        store.write_all(&newer, &[result("domain_classifier", 1), result("anomaly_detector", 0)]).await.unwrap();
        let other = EvaluationRequest::new("other.com", None);
        store.write_all(&other, &[result("domain_classifier", 1)]).await.unwrap();

        let latest = store.latest_for_domain("repeat.com").await.unwrap();
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().all(|a| a.query_id == newer.query_id));

        assert!(store.latest_for_domain("never-seen.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn long_domains_get_bounded_file_names() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(dir.path()).await.unwrap();
        let label = "a".repeat(59);
        let domain = format!("{label}.{label}.{label}.{label}.com");
        assert_eq!(domain.len(), 243);

        let request = EvaluationRequest::new(domain.as_str(), None);
        let results = vec![
            result("domain_classifier", 1),
            result("anomaly_detector", 0),
            AnalyzerResult::failed("whois_analyzer", "timeout", 4000),
        ];
        assert_eq!(store.write_all(&request, &results).await.unwrap(), 3);

        for entry in std::fs::read_dir(dir.path()).unwrap() {
            assert!(entry.unwrap().file_name().len() <= 255);
        }
        let latest = store.latest_for_domain(&domain).await.unwrap();
        assert_eq!(latest.len(), 3);
        assert!(latest.iter().all(|a| a.domain == domain));

        // Distinct long domains sharing a prefix do not collide.
        let sibling = format!("{label}.{label}.{label}.{label}.net");
        assert_ne!(file_component(&domain), file_component(&sibling));
        assert!(store.latest_for_domain(&sibling).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_failed_file_does_not_stop_the_rest() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(dir.path()).await.unwrap();
        let request = EvaluationRequest::new("partial.com", None);
        // A directory squatting on the first report's path makes that write fail.
        std::fs::create_dir(dir.path().join(format!("{}_domain_classifier_partial.com.json", request.query_id))).unwrap();

        let results = vec![result("domain_classifier", 1), result("anomaly_detector", 0)];
        assert_eq!(store.write_all(&request, &results).await.unwrap(), 1);
        let written = dir.path().join(format!("{}_anomaly_detector_partial.com.json", request.query_id));
        assert!(written.is_file());

        let loaded = store.for_query(&request.query_id).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].module, "anomaly_detector");
    }

    #[tokio::test]
    async fn unreadable_files_are_skipped() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("q-1_m_x.com.json"), b"{not json").unwrap();
        assert!(store.for_query("q-1").await.unwrap().is_empty());
    }
}
