// src/core/tier2/intel.rs

use super::{IntelProbe, round_to};
use crate::core::error::ProbeError;
use crate::core::models::IntelResult;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = "VanguardRS-Verdict/0.1";
const MAX_SOURCES: usize = 10;

/// Client for a VirusTotal-style domain reputation API.
pub struct ReputationProbe {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ReputationProbe {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }
}

#[async_trait]
impl IntelProbe for ReputationProbe {
    async fn lookup(&self, domain: &str) -> Result<IntelResult, ProbeError> {
        let api_key = self.api_key.as_deref().ok_or(ProbeError::MissingApiKey)?;
        let url = format!("{}/domains/{}", self.base_url, domain);
        debug!(url = %url, "Querying reputation service.");

        let response = self.http.get(&url).header("x-apikey", api_key).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(ProbeError::NotFound),
            other => return Err(ProbeError::Status(other.as_u16())),
        }
        let body: Value = response.json().await.map_err(|e| ProbeError::Malformed(e.to_string()))?;
        let result = summarize(&body)?;
        info!(domain, positives = result.positives, total = result.total_engines, "Reputation lookup finished.");
        Ok(result)
    }
}

/// Reduces a domain report to the detection ratio and the flagging engines.
fn summarize(body: &Value) -> Result<IntelResult, ProbeError> {
    let attributes = body
        .pointer("/data/attributes")
        .ok_or_else(|| ProbeError::Malformed("missing data.attributes".to_string()))?;
    let stats = attributes
        .get("last_analysis_stats")
        .and_then(Value::as_object)
        .ok_or_else(|| ProbeError::Malformed("missing last_analysis_stats".to_string()))?;
    let count = |key: &str| stats.get(key).and_then(Value::as_u64).unwrap_or(0);

    let positives = count("malicious") + count("suspicious");
    let total_engines = positives + count("harmless") + count("undetected");

    let sources = attributes
        .get("last_analysis_results")
        .and_then(Value::as_object)
        .map(|engines| {
            engines
                .iter()
                .filter(|(_, verdict)| {
                    matches!(verdict.get("category").and_then(Value::as_str), Some("malicious" | "suspicious"))
                })
                .map(|(engine, _)| engine.clone())
                .take(MAX_SOURCES)
                .collect()
        })
        .unwrap_or_default();

    Ok(IntelResult {
        positives,
        total_engines,
        sources,
        intel_score: round_to(positives as f64 / total_engines.max(1) as f64, 3),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe(server: &MockServer, key: Option<&str>) -> ReputationProbe {
        ReputationProbe::new(&server.uri(), key.map(str::to_string), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn ratio_counts_malicious_and_suspicious() {
        let body = json!({"data": {"attributes": {
            "last_analysis_stats": {"malicious": 3, "suspicious": 1, "harmless": 10, "undetected": 6},
            "last_analysis_results": {
                "EngineA": {"category": "malicious"},
                "EngineB": {"category": "harmless"},
                "EngineC": {"category": "suspicious"}
            }
        }}});
        let result = summarize(&body).unwrap();
        assert_eq!((result.positives, result.total_engines), (4, 20));
        assert_eq!(result.intel_score, 0.2);
        assert_eq!(result.sources, vec!["EngineA", "EngineC"]);
    }

    #[test]
    fn never_seen_domains_score_zero() {
        let body = json!({"data": {"attributes": {"last_analysis_stats": {}}}});
        let result = summarize(&body).unwrap();
        assert_eq!(result.total_engines, 0);
        assert_eq!(result.intel_score, 0.0);
    }

    #[test]
    fn sources_are_capped() {
        let engines: serde_json::Map<String, Value> =
            (0..25).map(|i| (format!("E{i:02}"), json!({"category": "malicious"}))).collect();
        let body = json!({"data": {"attributes": {
            "last_analysis_stats": {"malicious": 25},
            "last_analysis_results": engines
        }}});
        assert_eq!(summarize(&body).unwrap().sources.len(), MAX_SOURCES);
    }

    #[tokio::test]
    async fn sends_the_api_key_and_reads_the_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/domains/example-test123.xyz"))
            .and(header("x-apikey", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"attributes": {
                "last_analysis_stats": {"malicious": 1, "harmless": 3}
            }}})))
            .expect(1)
            .mount(&server)
            .await;

        let result = probe(&server, Some("secret")).lookup("example-test123.xyz").await.unwrap();
        assert_eq!(result.intel_score, 0.25);
    }

    #[tokio::test]
    async fn missing_key_skips_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let err = probe(&server, Some("  ")).lookup("a.com").await.unwrap_err();
        assert!(matches!(err, ProbeError::MissingApiKey));
    }

    #[tokio::test]
    async fn unknown_and_failing_lookups_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/domains/unknown.com"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/domains/limited.com"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/domains/garbled.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let probe = probe(&server, Some("k"));
        assert!(matches!(probe.lookup("unknown.com").await, Err(ProbeError::NotFound)));
        assert!(matches!(probe.lookup("limited.com").await, Err(ProbeError::Status(429))));
        assert!(matches!(probe.lookup("garbled.com").await, Err(ProbeError::Malformed(_))));
    }
}
