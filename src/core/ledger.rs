// src/core/ledger.rs

use crate::core::error::{EngineError, Result};
use crate::core::models::{DecisionRecord, ListKind, Tier2Outcome, Verdict};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Largest page `recent` will return.
pub const MAX_PAGE: u32 = 200;
pub const DEFAULT_PAGE: u32 = 50;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS decisions (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    query_id         TEXT NOT NULL,
    domain           TEXT NOT NULL,
    client_ip        TEXT NOT NULL,
    score            REAL NOT NULL,
    threshold        REAL NOT NULL,
    verdict          TEXT NOT NULL,
    reasons          TEXT NOT NULL,
    modules_result   TEXT NOT NULL,
    fast_path        TEXT,
    tier2_enrichment TEXT,
    tier2_intel      TEXT,
    tier2_score      REAL,
    final_score      REAL,
    final_verdict    TEXT,
    ts               TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS decisions_query_id ON decisions (query_id)",
    "CREATE INDEX IF NOT EXISTS decisions_domain ON decisions (domain)",
];

const SELECT_COLUMNS: &str = "query_id, domain, client_ip, score, threshold, verdict, reasons, modules_result, \
     fast_path, tier2_enrichment, tier2_intel, tier2_score, final_score, final_verdict, ts";

/// Which rows a bulk delete removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope {
    All,
    /// Rows whose Tier-1 or final verdict matches.
    Verdict(Verdict),
}

/// Append-only store of decision records.
///
/// Rows are never rewritten, with one exception: the Tier-2 columns of a row
/// may be filled in once, after escalation completes.
#[derive(Debug)]
pub struct Ledger {
    pool: SqlitePool,
    writes: Mutex<()>,
}

impl Ledger {
    /// Opens (creating if needed) the SQLite ledger at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
        let ledger = Self { pool, writes: Mutex::new(()) };
        ledger.migrate().await?;
        info!(path = %path.display(), "Ledger opened.");
        Ok(ledger)
    }

    /// A private in-memory ledger.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection: every in-memory connection is its own database.
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        let ledger = Self { pool, writes: Mutex::new(()) };
        ledger.migrate().await?;
        Ok(ledger)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Appends a record and returns its row id.
    pub async fn insert(&self, record: &DecisionRecord) -> Result<i64> {
        let _guard = self.writes.lock().await;
        let result = sqlx::query(
            "INSERT INTO decisions (query_id, domain, client_ip, score, threshold, verdict, reasons, modules_result, \
             fast_path, tier2_enrichment, tier2_intel, tier2_score, final_score, final_verdict, ts) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.query_id)
        .bind(&record.domain)
        .bind(&record.client_ip)
        .bind(record.score)
        .bind(record.threshold)
        .bind(record.verdict.to_string())
        .bind(&record.reasons)
        .bind(serde_json::to_string(&record.analyzer_results)?)
        .bind(record.fast_path.map(|k| k.to_string()))
        .bind(to_json_opt(&record.tier2_enrichment)?)
        .bind(to_json_opt(&record.tier2_intel)?)
        .bind(record.tier2_score)
        .bind(record.final_score)
        .bind(record.final_verdict.map(|v| v.to_string()))
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();
        debug!(id, query_id = %record.query_id, verdict = %record.verdict, "Decision recorded.");
        Ok(id)
    }

    /// Fills in the Tier-2 columns of the latest row for `query_id`.
    ///
    /// Returns `false` when there is no such row or it already carries Tier-2
    /// data; Tier-1 columns are never touched.
    pub async fn attach_tier2(&self, query_id: &str, tier2: &Tier2Outcome) -> Result<bool> {
        let _guard = self.writes.lock().await;
        let result = sqlx::query(
            "UPDATE decisions SET tier2_enrichment = ?, tier2_intel = ?, tier2_score = ?, final_score = ?, final_verdict = ? \
             WHERE id = (SELECT MAX(id) FROM decisions WHERE query_id = ?) AND tier2_score IS NULL",
        )
        .bind(serde_json::to_string(&tier2.enrichment)?)
        .bind(serde_json::to_string(&tier2.intel)?)
        .bind(tier2.tier2_score)
        .bind(tier2.final_score)
        .bind(tier2.final_verdict.to_string())
        .bind(query_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Point lookup; the latest row wins if the id was recorded twice.
    pub async fn get(&self, query_id: &str) -> Result<Option<DecisionRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM decisions WHERE query_id = ? ORDER BY id DESC LIMIT 1");
        let row = sqlx::query(&sql).bind(query_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(decode_row).transpose()
    }

    /// Most recent records first, at most `MAX_PAGE` of them.
    pub async fn recent(&self, limit: u32) -> Result<Vec<DecisionRecord>> {
        let limit = limit.clamp(1, MAX_PAGE);
        let sql = format!("SELECT {SELECT_COLUMNS} FROM decisions ORDER BY id DESC LIMIT ?");
        let rows = sqlx::query(&sql).bind(i64::from(limit)).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    /// Every record for a domain, most recent first.
    pub async fn history(&self, domain: &str, limit: u32) -> Result<Vec<DecisionRecord>> {
        let limit = limit.clamp(1, MAX_PAGE);
        let sql = format!("SELECT {SELECT_COLUMNS} FROM decisions WHERE domain = ? ORDER BY id DESC LIMIT ?");
        let rows = sqlx::query(&sql).bind(domain).bind(i64::from(limit)).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    /// Deletes every row for `query_id`; returns the number removed.
    pub async fn delete(&self, query_id: &str) -> Result<u64> {
        let _guard = self.writes.lock().await;
        let result = sqlx::query("DELETE FROM decisions WHERE query_id = ?").bind(query_id).execute(&self.pool).await?;
        info!(query_id, removed = result.rows_affected(), "Ledger rows deleted.");
        Ok(result.rows_affected())
    }

    pub async fn purge(&self, scope: PurgeScope) -> Result<u64> {
        let _guard = self.writes.lock().await;
        let result = match scope {
            PurgeScope::All => sqlx::query("DELETE FROM decisions").execute(&self.pool).await?,
            PurgeScope::Verdict(verdict) => {
                let name = verdict.to_string();
                sqlx::query("DELETE FROM decisions WHERE verdict = ? OR final_verdict = ?")
                    .bind(&name)
                    .bind(&name)
                    .execute(&self.pool)
                    .await?
            }
        };
        info!(?scope, removed = result.rows_affected(), "Ledger purged.");
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM decisions").fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

fn to_json_opt<T: Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value.as_ref().map(serde_json::to_string).transpose().map_err(EngineError::from)
}

fn from_json_opt<T: DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.map(|s| serde_json::from_str(&s)).transpose().map_err(EngineError::from)
}

fn parse_enum<T: FromStr>(column: &str, raw: &str) -> Result<T> {
    T::from_str(raw).map_err(|_| EngineError::Storage(sqlx::Error::Decode(format!("bad {column} value '{raw}'").into())))
}

fn decode_row(row: &SqliteRow) -> Result<DecisionRecord> {
    let verdict: String = row.try_get("verdict")?;
    let fast_path: Option<String> = row.try_get("fast_path")?;
    let final_verdict: Option<String> = row.try_get("final_verdict")?;
    let modules: String = row.try_get("modules_result")?;
    let ts: String = row.try_get("ts")?;
    let timestamp = DateTime::parse_from_rfc3339(&ts)
        .map_err(|e| EngineError::Storage(sqlx::Error::Decode(Box::new(e))))?
        .with_timezone(&Utc);

    Ok(DecisionRecord {
        query_id: row.try_get("query_id")?,
        domain: row.try_get("domain")?,
        client_ip: row.try_get("client_ip")?,
        score: row.try_get("score")?,
        threshold: row.try_get("threshold")?,
        verdict: parse_enum("verdict", &verdict)?,
        reasons: row.try_get("reasons")?,
        analyzer_results: serde_json::from_str(&modules)?,
        fast_path: fast_path.map(|k| parse_enum::<ListKind>("fast_path", &k)).transpose()?,
        tier2_enrichment: from_json_opt(row.try_get("tier2_enrichment")?)?,
        tier2_intel: from_json_opt(row.try_get("tier2_intel")?)?,
        tier2_score: row.try_get("tier2_score")?,
        final_score: row.try_get("final_score")?,
        final_verdict: final_verdict.map(|v| parse_enum::<Verdict>("final_verdict", &v)).transpose()?,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{AnalyzerResult, EnrichmentResult, EvaluationRequest, IntelResult, Tier1Outcome};
    use tempfile::tempdir;

    fn record(domain: &str, score: f64, verdict: Verdict) -> DecisionRecord {
        let request = EvaluationRequest::new(domain, Some("192.0.2.7"));
        DecisionRecord::from_tier1(
            &request,
            2.0,
            Tier1Outcome {
                score,
                verdict,
                reasons: "domain_classifier:FLAG(entropy)".to_string(),
                results: vec![AnalyzerResult::failed("whois_analyzer", "timeout", 4000)],
            },
        )
    }

    fn tier2() -> Tier2Outcome {
        Tier2Outcome {
            enrichment: EnrichmentResult { redirects: 3, meta_score: 0.5, ..Default::default() },
            intel: IntelResult::failed("missing api key"),
            tier2_score: 0.2,
            final_score: 0.32,
            final_verdict: Verdict::Legit,
        }
    }

    #[tokio::test]
    async fn records_round_trip_by_query_id() {
        let ledger = Ledger::in_memory().await.unwrap();
        let rec = record("malicious-test.tk", 2.0, Verdict::Block);
        ledger.insert(&rec).await.unwrap();

        let loaded = ledger.get(&rec.query_id).await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert!(ledger.get("q-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tier2_update_adds_without_overwriting_tier1() {
        let ledger = Ledger::in_memory().await.unwrap();
        let rec = record("example-test123.xyz", 1.0, Verdict::Allow);
        ledger.insert(&rec).await.unwrap();

        assert!(ledger.attach_tier2(&rec.query_id, &tier2()).await.unwrap());
        assert!(!ledger.attach_tier2(&rec.query_id, &tier2()).await.unwrap());

        let loaded = ledger.get(&rec.query_id).await.unwrap().unwrap();
        assert_eq!(loaded.score, rec.score);
        assert_eq!(loaded.verdict, Verdict::Allow);
        assert_eq!(loaded.reasons, rec.reasons);
        assert_eq!(loaded.tier2_score, Some(0.2));
        assert_eq!(loaded.final_verdict, Some(Verdict::Legit));
        assert_eq!(loaded.tier2_enrichment.unwrap().redirects, 3);

        let mut expected = rec.clone();
        expected.attach_tier2(tier2());
        assert_eq!(ledger.get(&rec.query_id).await.unwrap().unwrap(), expected);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_bounded() {
        let ledger = Ledger::in_memory().await.unwrap();
        for i in 0..5 {
            ledger.insert(&record(&format!("d{i}.com"), 0.0, Verdict::Allow)).await.unwrap();
        }
        let page = ledger.recent(3).await.unwrap();
        assert_eq!(page.iter().map(|r| r.domain.as_str()).collect::<Vec<_>>(), vec!["d4.com", "d3.com", "d2.com"]);
        assert_eq!(ledger.recent(10_000).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn domains_keep_their_full_history() {
        let ledger = Ledger::in_memory().await.unwrap();
        ledger.insert(&record("repeat.com", 0.0, Verdict::Allow)).await.unwrap();
        ledger.insert(&record("repeat.com", 2.0, Verdict::Block)).await.unwrap();
        let history = ledger.history("repeat.com", DEFAULT_PAGE).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].verdict, Verdict::Block);
    }

    #[tokio::test]
    async fn delete_and_purge_by_scope() {
        let ledger = Ledger::in_memory().await.unwrap();
        let keep = record("keep.com", 0.0, Verdict::Allow);
        let gone = record("gone.tk", 2.0, Verdict::Block);
        let refined = record("refined.xyz", 1.0, Verdict::Allow);
        for r in [&keep, &gone, &refined] {
            ledger.insert(r).await.unwrap();
        }
        ledger.attach_tier2(&refined.query_id, &tier2()).await.unwrap();

        assert_eq!(ledger.delete(&gone.query_id).await.unwrap(), 1);
        assert_eq!(ledger.delete(&gone.query_id).await.unwrap(), 0);
        assert_eq!(ledger.purge(PurgeScope::Verdict(Verdict::Legit)).await.unwrap(), 1);
        assert_eq!(ledger.count().await.unwrap(), 1);
        assert_eq!(ledger.purge(PurgeScope::All).await.unwrap(), 1);
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_ledger_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db").join("ledger.db");
        let rec = record("persist.com", 0.0, Verdict::Allow);
        {
            let ledger = Ledger::open(&path).await.unwrap();
            ledger.insert(&rec).await.unwrap();
        }
        let ledger = Ledger::open(&path).await.unwrap();
        assert_eq!(ledger.get(&rec.query_id).await.unwrap(), Some(rec));
    }
}
