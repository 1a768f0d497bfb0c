use serde::{Deserialize, Serialize};

use super::TradeRecord;

/// Successful response body of the final-data endpoints.
#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub elapsed_time: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub data: Option<Vec<TradeRecord>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Structured error body, returned with 4xx/5xx statuses and occasionally
/// with a 200 status.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub status_code: i64,
    #[serde(default)]
    pub message: Option<String>,
}
