// src/core/client.rs

use crate::core::error::{EngineError, Result};
use crate::core::models::{AnalyzerResult, EvaluationRequest};
use crate::core::registry::ModuleSpec;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const USER_AGENT: &str = "VanguardRS-Verdict/0.1";

/// Why an analyzer call produced no usable answer.
#[derive(Debug, Clone, PartialEq)]
pub enum CallFailure {
    /// The per-call timeout elapsed.
    Timeout,
    /// The evaluation-wide budget was already spent before the call started.
    Deadline,
    Transport(String),
    Status(u16),
    Malformed(String),
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::Timeout => write!(f, "timeout"),
            CallFailure::Deadline => write!(f, "deadline"),
            CallFailure::Transport(e) => write!(f, "transport: {e}"),
            CallFailure::Status(code) => write!(f, "status {code}"),
            CallFailure::Malformed(e) => write!(f, "malformed: {e}"),
        }
    }
}

/// Uniform adapter to any analyzer service.
///
/// `call` never fails: transport errors, non-200 answers, timeouts and schema
/// violations all come back as a fail-open `AnalyzerResult`.
#[derive(Debug, Clone)]
pub struct AnalyzerClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl AnalyzerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| EngineError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, timeout })
    }

    /// Calls one analyzer, bounded by the per-call timeout and by `deadline`.
    pub async fn call(
        &self,
        module: &ModuleSpec,
        request: &EvaluationRequest,
        deadline: Option<Instant>,
    ) -> AnalyzerResult {
        let started = Instant::now();
        let budget = match deadline {
            Some(deadline) => self.timeout.min(deadline.saturating_duration_since(started)),
            None => self.timeout,
        };
        if budget.is_zero() {
            warn!(module = %module.name, query_id = %request.query_id, "Evaluation budget exhausted before call.");
            return AnalyzerResult::failed(&module.name, CallFailure::Deadline, 0);
        }

        debug!(module = %module.name, endpoint = %module.endpoint, timeout_ms = budget.as_millis() as u64, "Calling analyzer.");
        let outcome = match tokio::time::timeout(budget, self.fetch(&module.endpoint, request)).await {
            Ok(Ok(body)) => interpret(&module.name, body),
            Ok(Err(failure)) => Err(failure),
            Err(_) => Err(CallFailure::Timeout),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(mut result) => {
                result.elapsed_ms = elapsed_ms;
                debug!(module = %module.name, flag = result.flag, elapsed_ms, "Analyzer answered.");
                result
            }
            Err(failure) => {
                warn!(module = %module.name, query_id = %request.query_id, error = %failure, elapsed_ms, "Analyzer call failed.");
                AnalyzerResult::failed(&module.name, failure, elapsed_ms)
            }
        }
    }

    async fn fetch(&self, endpoint: &str, request: &EvaluationRequest) -> std::result::Result<Value, CallFailure> {
        let response = self.http.post(endpoint).json(request).send().await.map_err(transport_failure)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(CallFailure::Status(status.as_u16()));
        }
        let body = response.bytes().await.map_err(transport_failure)?;
        serde_json::from_slice(&body).map_err(|e| CallFailure::Malformed(e.to_string()))
    }
}

fn transport_failure(e: reqwest::Error) -> CallFailure {
    if e.is_timeout() { CallFailure::Timeout } else { CallFailure::Transport(e.to_string()) }
}

/// Maps an analyzer response body onto an `AnalyzerResult`.
///
/// Only `flag` (0, 1 or a boolean) is mandatory; `score` defaults to the flag
/// and `reason` to `ok` (or the joined `reasons` array some analyzers emit).
fn interpret(module_name: &str, body: Value) -> std::result::Result<AnalyzerResult, CallFailure> {
    let Value::Object(obj) = body else {
        return Err(CallFailure::Malformed("response is not a JSON object".to_string()));
    };

    let flag = match obj.get("flag") {
        Some(Value::Bool(b)) => u8::from(*b),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v == 0.0 => 0,
            Some(v) if v == 1.0 => 1,
            _ => return Err(CallFailure::Malformed(format!("flag {n} is not 0 or 1"))),
        },
        Some(_) => return Err(CallFailure::Malformed("flag is not numeric or boolean".to_string())),
        None => return Err(CallFailure::Malformed("missing flag".to_string())),
    };

    let score = obj.get("score").and_then(Value::as_f64).filter(|s| s.is_finite()).unwrap_or(f64::from(flag));

    Ok(AnalyzerResult {
        module_name: module_name.to_string(),
        ok: true,
        flag,
        score,
        reason: reason_of(&obj),
        label: obj.get("label").and_then(Value::as_str).map(str::to_string),
        details: obj.get("details").cloned(),
        elapsed_ms: 0,
    })
}

fn reason_of(obj: &Map<String, Value>) -> String {
    if let Some(reason) = obj.get("reason").and_then(Value::as_str) {
        return reason.to_string();
    }
    if let Some(reasons) = obj.get("reasons").and_then(Value::as_array) {
        let joined: Vec<&str> = reasons.iter().filter_map(Value::as_str).collect();
        if !joined.is_empty() {
            return joined.join("; ");
        }
    }
    "ok".to_string()
}
