use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One observation returned by the final-data endpoints.
///
/// The columns the analytics need are typed; everything else the service
/// sends (ISO codes, quantities, weights, CIF/FOB values, ...) is kept in
/// `extra` so a cached row round-trips without loss.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TradeRecord {
    pub type_code: Option<String>,
    pub freq_code: Option<String>,
    pub ref_year: Option<i32>,
    #[serde(deserialize_with = "lenient_code")]
    pub period: Option<String>,
    pub reporter_code: Option<i64>,
    pub reporter_desc: Option<String>,
    pub flow_code: Option<String>,
    pub flow_desc: Option<String>,
    pub partner_code: Option<i64>,
    pub partner_desc: Option<String>,
    pub partner2_code: Option<i64>,
    pub partner2_desc: Option<String>,
    pub cl_code: Option<String>,
    #[serde(deserialize_with = "lenient_code")]
    pub cmd_code: Option<String>,
    pub cmd_desc: Option<String>,
    #[serde(deserialize_with = "lenient_code")]
    pub customs_code: Option<String>,
    pub customs_desc: Option<String>,
    #[serde(deserialize_with = "lenient_code")]
    pub mos_code: Option<String>,
    pub mot_code: Option<i64>,
    pub mot_desc: Option<String>,
    pub qty_unit_code: Option<i64>,
    pub primary_value: Option<f64>,
    pub is_aggregate: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Codes arrive as strings or bare numbers depending on the column and
/// classification; normalize both to a string.
fn lenient_code<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_numeric_and_string_codes() {
        let row: TradeRecord = serde_json::from_value(serde_json::json!({
            "refYear": 2020,
            "period": 2020,
            "reporterCode": 156,
            "partnerCode": 226,
            "partner2Code": 0,
            "flowCode": "M",
            "cmdCode": "27",
            "customsCode": "C00",
            "motCode": 0,
            "primaryValue": 1166493970.0,
            "isAggregate": true,
            "reporterISO": "CHN"
        }))
        .unwrap();
        assert_eq!(row.period.as_deref(), Some("2020"));
        assert_eq!(row.cmd_code.as_deref(), Some("27"));
        assert_eq!(row.partner_code, Some(226));
        assert_eq!(row.extra.get("reporterISO"), Some(&Value::from("CHN")));
    }

    #[test]
    fn missing_columns_default_to_none() {
        let row: TradeRecord = serde_json::from_str(r#"{"partnerCode": 0}"#).unwrap();
        assert_eq!(row.partner_code, Some(0));
        assert!(row.primary_value.is_none());
        assert!(row.extra.is_empty());
    }
}
