//! Stable cache keys for sub-requests.

use std::fmt;

use comtrade_api::TradeQuery;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ComtradeError;

#[derive(Serialize)]
struct CanonicalRequest<'a> {
    query: &'a TradeQuery,
    preview: bool,
}

/// SHA-256 of the canonical JSON form of a single sub-request.
///
/// The subscription key is not part of [`TradeQuery`], so rotating keys
/// keeps existing cache entries valid. The endpoint variant is included
/// because the preview endpoint truncates results.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    pub fn of(query: &TradeQuery, preview: bool) -> Result<Self, ComtradeError> {
        let canonical = serde_json::to_vec(&CanonicalRequest { query, preview })?;
        let digest = Sha256::digest(&canonical);
        Ok(Self(hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
