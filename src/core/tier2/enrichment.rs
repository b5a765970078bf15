// src/core/tier2/enrichment.rs

use super::{EnrichmentProbe, round_to};
use crate::core::error::ProbeError;
use crate::core::models::EnrichmentResult;
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const USER_AGENT: &str = "VanguardRS-Verdict/0.1";
const MAX_REDIRECTS: u32 = 10;
const THIN_CONTENT_BYTES: u64 = 500;

/// URL fragments typical of credential-harvesting pages.
const PHISHING_TOKENS: &[&str] = &["login", "verify", "secure", "account", "update"];

/// Fetches a domain's landing page over plain HTTP and scores its shape.
pub struct WebEnrichmentProbe {
    http: reqwest::Client,
    origin: Option<Url>,
}

impl WebEnrichmentProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        // Redirects are followed by hand so that every hop is counted.
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { http, origin: None })
    }

    /// Probes `origin` instead of `http://<domain>/`.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    fn start_url(&self, domain: &str) -> Result<Url, ProbeError> {
        match &self.origin {
            Some(origin) => Ok(origin.clone()),
            None => Url::parse(&format!("http://{domain}/")).map_err(|e| ProbeError::Malformed(e.to_string())),
        }
    }

    /// SHA-256 of the icon bytes, or `None` if there is no usable icon.
    async fn fingerprint(&self, icon: Url) -> Option<String> {
        let response = self.http.get(icon.clone()).send().await.ok()?;
        if !response.status().is_success() {
            debug!(url = %icon, status = %response.status(), "No favicon.");
            return None;
        }
        let bytes = response.bytes().await.ok()?;
        if bytes.is_empty() {
            return None;
        }
        Some(format!("{:x}", Sha256::digest(&bytes)))
    }
}

#[async_trait]
impl EnrichmentProbe for WebEnrichmentProbe {
    async fn enrich(&self, domain: &str) -> Result<EnrichmentResult, ProbeError> {
        info!(domain, "Starting enrichment probe.");
        let mut url = self.start_url(domain)?;
        let mut redirects = 0;

        let response = loop {
            let response = self.http.get(url.clone()).send().await?;
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            match location {
                Some(location) if response.status().is_redirection() && redirects < MAX_REDIRECTS => {
                    url = url.join(&location).map_err(|e| ProbeError::Malformed(format!("bad redirect: {e}")))?;
                    redirects += 1;
                    debug!(hop = redirects, to = %url, "Following redirect.");
                }
                _ => break response,
            }
        };

        let status_code = response.status().as_u16();
        let body = response.bytes().await?;
        let page = inspect_page(&String::from_utf8_lossy(&body));

        let icon = page
            .icon_href
            .and_then(|href| url.join(&href).ok())
            .or_else(|| url.join("/favicon.ico").ok());
        let favicon_hash = match icon {
            Some(icon) => self.fingerprint(icon).await,
            None => None,
        };

        let lowered = url.as_str().to_ascii_lowercase();
        let phishing_tokens = PHISHING_TOKENS
            .iter()
            .filter(|token| lowered.contains(*token))
            .map(|token| token.to_string())
            .collect();

        let mut result = EnrichmentResult {
            final_url: Some(url.to_string()),
            redirects,
            status_code: Some(status_code),
            content_length: Some(body.len() as u64),
            favicon_hash,
            phishing_tokens,
            has_password_form: page.has_password_form,
            meta_score: 0.0,
            error: None,
        };
        result.meta_score = meta_score(&result);
        info!(domain, redirects, status_code, meta_score = result.meta_score, "Enrichment probe finished.");
        Ok(result)
    }
}

/// Heuristic landing-page score in `[0, 1]`.
pub fn meta_score(result: &EnrichmentResult) -> f64 {
    let mut score: f64 = 0.0;
    if result.redirects > 2 {
        score += 0.3;
    }
    if result.content_length.is_some_and(|len| len < THIN_CONTENT_BYTES) {
        score += 0.2;
    }
    if result.favicon_hash.is_none() {
        score += 0.2;
    }
    if !result.phishing_tokens.is_empty() {
        score += 0.3;
    }
    round_to(score.min(1.0), 3)
}

struct PageFacts {
    icon_href: Option<String>,
    has_password_form: bool,
}

// `Html` is not `Send`, so parsing stays out of the async body.
fn inspect_page(body: &str) -> PageFacts {
    let document = Html::parse_document(body);

    let mut icon_href = None;
    if let Ok(selector) = Selector::parse(r#"link[rel~="icon"][href]"#) {
        icon_href = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string);
    }

    let mut has_password_form = false;
    if let Ok(selector) = Selector::parse(r#"form input[type="password"]"#) {
        has_password_form = document.select(&selector).next().is_some();
    }

    PageFacts { icon_href, has_password_form }
}
