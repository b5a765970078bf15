// tests/engine_flow.rs

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vanguard_rs_verdict::core::ledger::PurgeScope;
use vanguard_rs_verdict::core::models::{EnrichmentResult, IntelResult};
use vanguard_rs_verdict::core::registry::ModuleSpec;
use vanguard_rs_verdict::core::tier2::{EnrichmentProbe, IntelProbe, Tier2Escalation};
use vanguard_rs_verdict::{Engine, EngineConfig, ListKind, ProbeError, Verdict};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODULES: [&str; 3] = ["domain_classifier", "anomaly_detector", "whois_analyzer"];

#[derive(Default)]
struct CountingEnrichment(AtomicUsize);

#[async_trait]
impl EnrichmentProbe for CountingEnrichment {
    async fn enrich(&self, _domain: &str) -> Result<EnrichmentResult, ProbeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(EnrichmentResult { redirects: 3, meta_score: 0.8, ..Default::default() })
    }
}

#[derive(Default)]
struct CountingIntel(AtomicUsize);

#[async_trait]
impl IntelProbe for CountingIntel {
    async fn lookup(&self, _domain: &str) -> Result<IntelResult, ProbeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(ProbeError::MissingApiKey)
    }
}

struct Harness {
    server: MockServer,
    dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self { server: MockServer::start().await, dir: tempfile::tempdir().unwrap() }
    }

    async fn respond(&self, module: &str, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(format!("/{module}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    fn config(&self) -> EngineConfig {
        EngineConfig {
            modules: MODULES
                .iter()
                .map(|name| ModuleSpec::new(*name, format!("{}/{}", self.server.uri(), name), 1.0))
                .collect(),
            call_timeout_ms: 400,
            tier2_enabled: false,
            data_dir: self.dir.path().to_path_buf(),
            ..EngineConfig::default()
        }
    }

    async fn engine(&self) -> Engine {
        Engine::open(self.config()).await.unwrap()
    }
}

#[tokio::test]
async fn two_flags_out_of_three_block_and_cache_the_domain() {
    let h = Harness::new().await;
    h.respond("domain_classifier", json!({"flag": 1, "score": 0.93, "reason": "dga-like"})).await;
    h.respond("anomaly_detector", json!({"flag": 1, "reason": "query burst"})).await;
    h.respond("whois_analyzer", json!({"flag": 0})).await;
    let engine = h.engine().await;

    let record = engine.evaluate("malicious-test.tk", Some("10.0.0.7")).await.unwrap();
    assert_eq!(record.score, 2.0);
    assert_eq!(record.verdict, Verdict::Block);
    assert_eq!(record.client_ip, "10.0.0.7");
    assert_eq!(
        record.reasons,
        "domain_classifier:FLAG(dga-like); anomaly_detector:FLAG(query burst); whois_analyzer:OK(ok)"
    );
    assert!(record.tier2_score.is_none());

    let lists = engine.lists().await;
    assert_eq!(lists.blocklist, vec!["malicious-test.tk"]);
    assert!(lists.allowlist.is_empty());

    let on_disk = std::fs::read_to_string(h.dir.path().join("lists").join("blocklist.txt")).unwrap();
    assert_eq!(on_disk, "malicious-test.tk\n");

    let reports = std::fs::read_dir(h.dir.path().join("reports")).unwrap().count();
    assert_eq!(reports, 3);
}

#[tokio::test]
async fn listed_domains_short_circuit_without_calling_analyzers() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"flag": 1})))
        .expect(0)
        .mount(&h.server)
        .await;
    let engine = h.engine().await;
    engine.add_to_list(ListKind::Block, "bad.tk").await.unwrap();
    engine.add_to_list(ListKind::Allow, "Good.COM").await.unwrap();

    let blocked = engine.evaluate("BAD.tk.", None).await.unwrap();
    assert_eq!(blocked.verdict, Verdict::Block);
    assert_eq!(blocked.fast_path, Some(ListKind::Block));
    assert!(blocked.analyzer_results.is_empty());

    let allowed = engine.evaluate("good.com", None).await.unwrap();
    assert_eq!(allowed.verdict, Verdict::Allow);
    assert_eq!(allowed.score, 0.0);

    // Fast-path decisions are ledgered too.
    assert_eq!(engine.recent(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn borderline_score_escalates_to_tier2() {
    let h = Harness::new().await;
    h.respond("domain_classifier", json!({"flag": 1})).await;
    h.respond("anomaly_detector", json!({"flag": 0})).await;
    h.respond("whois_analyzer", json!({"flag": 0})).await;

    let enrichment = Arc::new(CountingEnrichment::default());
    let intel = Arc::new(CountingIntel::default());
    let tier2 = Tier2Escalation::new(enrichment.clone(), intel.clone(), Duration::from_secs(1));
    let engine = h.engine().await.with_tier2(tier2);

    let record = engine.evaluate("example-test123.xyz", None).await.unwrap();
    assert_eq!(record.score, 1.0);
    assert_eq!(enrichment.0.load(Ordering::SeqCst), 1);
    assert_eq!(intel.0.load(Ordering::SeqCst), 1);

    // 0.8 * 0.4 + 0 * 0.6
    assert_eq!(record.tier2_score, Some(0.32));
    assert_eq!(record.tier2_intel.as_ref().and_then(|i| i.error.as_deref()), Some("error:missing api key"));
    assert_eq!(record.final_verdict, Some(Verdict::Legit));

    let stored = engine.decision(&record.query_id).await.unwrap().unwrap();
    assert_eq!(stored.score, record.score);
    assert_eq!(stored.verdict, Verdict::Allow);
    assert_eq!(stored.reasons, record.reasons);
    assert_eq!(stored.tier2_score, Some(0.32));
    assert_eq!(stored.final_score, record.final_score);
}

#[tokio::test]
async fn one_slow_analyzer_costs_at_most_its_timeout() {
    let h = Harness::new().await;
    h.respond("domain_classifier", json!({"flag": 1})).await;
    h.respond("anomaly_detector", json!({"flag": 1})).await;
    Mock::given(method("POST"))
        .and(path("/whois_analyzer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"flag": 1})).set_delay(Duration::from_secs(5)))
        .mount(&h.server)
        .await;
    let engine = h.engine().await;

    let started = Instant::now();
    let record = engine.evaluate("slow-whois.net", None).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(record.analyzer_results.len(), 3);
    let whois = &record.analyzer_results[2];
    assert_eq!(whois.module_name, "whois_analyzer");
    assert!(!whois.ok);
    assert_eq!(whois.reason, "error:timeout");
    assert_eq!(record.score, 2.0);
    assert_eq!(record.verdict, Verdict::Block);
}

#[tokio::test]
async fn dead_analyzers_fail_open() {
    let h = Harness::new().await;
    let mut config = h.config();
    for module in &mut config.modules {
        module.endpoint = "http://127.0.0.1:9/check".to_string();
    }
    let engine = Engine::open(config).await.unwrap();

    let record = engine.evaluate("unreachable.org", None).await.unwrap();
    assert_eq!(record.score, 0.0);
    assert_eq!(record.verdict, Verdict::Allow);
    assert!(record.analyzer_results.iter().all(|r| !r.ok && r.reason.starts_with("error:")));
}

#[tokio::test]
async fn ledger_round_trip_and_purge() {
    let h = Harness::new().await;
    for module in MODULES {
        h.respond(module, json!({"flag": 0})).await;
    }
    let engine = h.engine().await;

    let record = engine.evaluate("roundtrip.io", None).await.unwrap();
    let stored = engine.decision(&record.query_id).await.unwrap().unwrap();
    assert_eq!(stored.query_id, record.query_id);
    assert_eq!(stored.domain, record.domain);
    assert_eq!(stored.analyzer_results, record.analyzer_results);
    assert_eq!(stored.timestamp, record.timestamp);

    // The second evaluation hits the allowlist written back by the first.
    let again = engine.evaluate("roundtrip.io", None).await.unwrap();
    assert_eq!(again.fast_path, Some(ListKind::Allow));
    assert_eq!(engine.history("roundtrip.io", 10).await.unwrap().len(), 2);

    assert_eq!(engine.purge(PurgeScope::Verdict(Verdict::Block)).await.unwrap(), 0);
    assert_eq!(engine.forget(&record.query_id).await.unwrap(), 1);
    assert!(engine.decision(&record.query_id).await.unwrap().is_none());
    assert_eq!(engine.purge(PurgeScope::All).await.unwrap(), 1);
}
