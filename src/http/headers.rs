//! Rate limit response headers.

use http::header::RETRY_AFTER;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlidegateError};
use crate::ratelimit::Decision;

/// Configured names of the rate limit response headers.
///
/// An empty name switches that header off entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseHeaders {
    pub limit: String,
    pub remaining: String,
    pub reset: String,
    pub retry_after: String,
    pub increment: String,
}

impl Default for ResponseHeaders {
    fn default() -> Self {
        Self {
            limit: "X-RateLimit-Limit".to_string(),
            remaining: "X-RateLimit-Remaining".to_string(),
            reset: "X-RateLimit-Reset".to_string(),
            retry_after: "Retry-After".to_string(),
            increment: "X-RateLimit-Increment".to_string(),
        }
    }
}

impl ResponseHeaders {
    /// Emit no rate limit headers at all.
    pub fn none() -> Self {
        Self {
            limit: String::new(),
            remaining: String::new(),
            reset: String::new(),
            retry_after: String::new(),
            increment: String::new(),
        }
    }
}

/// Parsed, ready-to-use header names.
#[derive(Debug, Clone)]
pub struct HeaderNames {
    limit: Option<HeaderName>,
    remaining: Option<HeaderName>,
    reset: Option<HeaderName>,
    retry_after: Option<HeaderName>,
    increment: Option<HeaderName>,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            limit: Some(HeaderName::from_static("x-ratelimit-limit")),
            remaining: Some(HeaderName::from_static("x-ratelimit-remaining")),
            reset: Some(HeaderName::from_static("x-ratelimit-reset")),
            retry_after: Some(RETRY_AFTER),
            increment: Some(HeaderName::from_static("x-ratelimit-increment")),
        }
    }
}

impl TryFrom<&ResponseHeaders> for HeaderNames {
    type Error = SlidegateError;

    fn try_from(headers: &ResponseHeaders) -> Result<Self> {
        Ok(Self {
            limit: parse_name(&headers.limit)?,
            remaining: parse_name(&headers.remaining)?,
            reset: parse_name(&headers.reset)?,
            retry_after: parse_name(&headers.retry_after)?,
            increment: parse_name(&headers.increment)?,
        })
    }
}

impl HeaderNames {
    /// Headers describing `decision`.
    ///
    /// `Retry-After` is only present on rejections and the increment header
    /// only for requests weighing more than one unit.
    pub fn render(&self, decision: &Decision) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(name) = &self.limit {
            headers.insert(name.clone(), HeaderValue::from(decision.limit));
        }
        if let Some(name) = &self.remaining {
            headers.insert(name.clone(), HeaderValue::from(decision.remaining));
        }
        if let Some(name) = &self.reset {
            headers.insert(name.clone(), HeaderValue::from(decision.reset));
        }
        if let (Some(name), Some(secs)) = (&self.retry_after, decision.retry_after_secs()) {
            headers.insert(name.clone(), HeaderValue::from(secs));
        }
        if let Some(name) = &self.increment {
            if decision.increment > 1 {
                headers.insert(name.clone(), HeaderValue::from(decision.increment));
            }
        }
        headers
    }
}

fn parse_name(name: &str) -> Result<Option<HeaderName>> {
    if name.is_empty() {
        return Ok(None);
    }
    HeaderName::try_from(name)
        .map(Some)
        .map_err(|_| SlidegateError::InvalidHeaderName(name.to_string()))
}
