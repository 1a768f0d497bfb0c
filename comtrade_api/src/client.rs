//! HTTP client for the UN Comtrade final-data API.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::{
    query::{Query, TradeQuery},
    types::{ErrorPayload, ResponseEnvelope, TradeRecord},
    Error,
};

/// Unauthenticated endpoint: tighter limits, at most 500 rows per call.
pub const BASE_URL_PREVIEW: &str = "https://comtradeapi.un.org/public/v1/preview";
/// Authenticated endpoint, used whenever a subscription key is configured.
pub const BASE_URL_API: &str = "https://comtradeapi.un.org/data/v1/get";
/// Placeholder written into fresh config files; treated as "no key".
pub const PLACEHOLDER_KEY: &str = "APIKEYHERE";

const KEY_PARAM: &str = "subscription-key";

/// HTTP client for the Comtrade final-data endpoints.
///
/// Picks the preview or the authenticated endpoint depending on whether a
/// subscription key is supplied. The key travels as a query parameter and
/// is never logged; only a four character prefix appears in logs.
pub struct Client {
    /// Base URL for the API. Defaults to one of the two public endpoints.
    base_api_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl Client {
    /// Creates a client for the production endpoint matching `api_key`.
    pub fn new(api_key: Option<&str>, timeout: Duration) -> Result<Self, Error> {
        let api_key = normalize_api_key(api_key);
        let base = if api_key.is_some() {
            BASE_URL_API
        } else {
            BASE_URL_PREVIEW
        };
        Self::build(base, api_key, timeout)
    }

    /// Creates a client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        Self::build(base_url, normalize_api_key(api_key), timeout)
    }

    fn build(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                Error::Transport(e.to_string())
            })?;
        tracing::info!("baseURL: {}", base_url);
        if let Some(key) = &api_key {
            tracing::info!("APIKEY: {}...", key_prefix(key));
        }
        Ok(Self {
            base_api_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }

    /// True when no subscription key is configured (preview endpoint limits apply).
    pub fn is_preview(&self) -> bool {
        self.api_key.is_none()
    }

    fn get_url(&self, query: &TradeQuery) -> Result<Url, Error> {
        let raw = format!("{}{}", self.base_api_url, query.path());
        let url = Url::parse(&raw).map_err(|e| {
            tracing::error!("Invalid URL constructed: {}", e);
            Error::Transport(format!("invalid URL {}: {}", raw, e))
        })?;
        let mut url = query.add_to_url(&url);
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair(KEY_PARAM, key);
        }
        Ok(url)
    }

    /// The URL a request for `query` would hit, with the credential hidden.
    pub fn echo_url(&self, query: &TradeQuery) -> Result<String, Error> {
        Ok(redact_url(self.get_url(query)?.as_str()))
    }

    /// Fetches final data rows for `query`. An empty vector is a valid answer.
    pub async fn get_final_data(&self, query: &TradeQuery) -> Result<Vec<TradeRecord>, Error> {
        let url = self.get_url(query)?;
        tracing::debug!("GET {}", redact_url(url.as_str()));

        let resp = self
            .http
            .get(url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| transport_error("Failed to get resource", e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| transport_error("Failed to read response body", e))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let message = error_message(&body);
            tracing::warn!("Throttled by server: {}", message);
            return Err(Error::RateLimited { message });
        }
        if !status.is_success() {
            let message = error_message(&body);
            tracing::error!("Request failed with status {}: {}", status, message);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        if let Ok(payload) = serde_json::from_str::<ErrorPayload>(&body) {
            let message = payload.message.unwrap_or_else(|| truncate_body(&body));
            if payload.status_code == 429 {
                return Err(Error::RateLimited { message });
            }
            tracing::error!("Server returned JSON error {}: {}", payload.status_code, message);
            return Err(Error::Service {
                code: payload.status_code,
                message,
            });
        }

        let envelope = serde_json::from_str::<ResponseEnvelope>(&body).map_err(|e| {
            let snippet = truncate_body(&body);
            tracing::error!("Failed to parse resource: {} | body: {}", e, snippet);
            Error::Parse(format!("{} | body: {}", e, snippet))
        })?;

        if let Some(err) = envelope.error.filter(|e| !e.trim().is_empty()) {
            tracing::error!("Server returned error: {}", err);
            return Err(Error::Service {
                code: status.as_u16() as i64,
                message: err,
            });
        }

        let rows = envelope.data.unwrap_or_default();
        tracing::debug!("Number of records fetched: {}", rows.len());
        Ok(rows)
    }
}

/// Trims the key and maps empty or placeholder keys to `None`.
pub fn normalize_api_key(api_key: Option<&str>) -> Option<String> {
    api_key
        .map(str::trim)
        .filter(|k| !k.is_empty() && *k != PLACEHOLDER_KEY)
        .map(str::to_string)
}

/// First four characters of the key, safe to log.
pub fn key_prefix(key: &str) -> String {
    key.chars().take(4).collect()
}

/// Replaces the value of the credential query parameter with `HIDDEN`.
pub fn redact_url(url: &str) -> String {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    let re = KEY_RE
        .get_or_init(|| Regex::new(r"subscription-key=[^&#]*").expect("static redaction pattern"));
    re.replace_all(url, "subscription-key=HIDDEN").into_owned()
}

/// reqwest errors carry the request URL, and with it the key. The URL is
/// dropped before the error is logged or stored.
fn transport_error(context: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        tracing::warn!("Request timed out");
        return Error::Timeout;
    }
    let message = redact_url(&e.without_url().to_string());
    tracing::warn!("{}: {}", context, message);
    Error::Transport(message)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| truncate_body(body))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_key_in_middle_and_end() {
        assert_eq!(
            redact_url("https://x/C/A/HS?period=2020&subscription-key=abcd1234&flowCode=M"),
            "https://x/C/A/HS?period=2020&subscription-key=HIDDEN&flowCode=M"
        );
        assert_eq!(
            redact_url("https://x/C/A/HS?subscription-key=abcd1234"),
            "https://x/C/A/HS?subscription-key=HIDDEN"
        );
    }

    #[test]
    fn placeholder_and_blank_keys_are_ignored() {
        assert_eq!(normalize_api_key(Some("APIKEYHERE")), None);
        assert_eq!(normalize_api_key(Some("   ")), None);
        assert_eq!(normalize_api_key(None), None);
        assert_eq!(normalize_api_key(Some(" k3y ")), Some("k3y".to_string()));
    }

    #[test]
    fn key_prefix_is_short() {
        assert_eq!(key_prefix("0123456789abcdef"), "0123");
        assert_eq!(key_prefix("ab"), "ab");
    }

    #[test]
    fn endpoint_follows_key() {
        let preview = Client::new(None, Duration::from_secs(5)).unwrap();
        assert!(preview.is_preview());
        let full = Client::new(Some("secret-key"), Duration::from_secs(5)).unwrap();
        assert!(!full.is_preview());
        let url = full
            .echo_url(&TradeQuery::default().with_period("2020"))
            .unwrap();
        assert!(url.starts_with(BASE_URL_API));
        assert!(url.contains("subscription-key=HIDDEN"));
        assert!(!url.contains("secret-key"));
    }
}
