// src/core/domain.rs

use crate::core::error::{EngineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_DOMAIN_LEN: usize = 253;

static RE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9_])?$").unwrap());

/// Normalizes a raw domain into its canonical lowercase form, rejecting
/// anything that is not a plausible host name.
pub fn normalize_domain(raw: &str) -> Result<String> {
    let invalid = |reason| EngineError::InvalidDomain { domain: raw.to_string(), reason };

    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }
    if trimmed.len() > MAX_DOMAIN_LEN {
        return Err(invalid("longer than 253 characters"));
    }

    let domain = trimmed.to_ascii_lowercase();
    if domain.split('.').any(|label| !RE_LABEL.is_match(label)) {
        return Err(invalid("malformed label"));
    }
    Ok(domain)
}
