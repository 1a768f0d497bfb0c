use comtrade_api::types::{ErrorPayload, ResponseEnvelope, TradeRecord};

fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
}

#[test]
fn deserialize_final_data_full() {
    let json = load_fixture("final_data.json");
    let resp: ResponseEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(resp.count, Some(3));
    assert_eq!(resp.error.as_deref(), Some(""));

    let data = resp.data.unwrap();
    assert_eq!(data.len(), 3);

    let world = &data[0];
    assert_eq!(world.reporter_code, Some(156));
    assert_eq!(world.partner_code, Some(0));
    assert_eq!(world.partner_desc.as_deref(), Some("World"));
    assert_eq!(world.flow_code.as_deref(), Some("M"));
    assert_eq!(world.cmd_code.as_deref(), Some("TOTAL"));
    assert_eq!(world.customs_code.as_deref(), Some("C00"));
    assert_eq!(world.mos_code.as_deref(), Some("0"));
    assert_eq!(world.primary_value, Some(2065964324780.0));
    assert_eq!(world.is_aggregate, Some(true));
    assert_eq!(world.extra.get("partnerISO").and_then(|v| v.as_str()), Some("W00"));
}

#[test]
fn deserialize_envelope_without_data() {
    let resp: ResponseEnvelope =
        serde_json::from_str(r#"{"elapsedTime":"0.01 secs","count":0,"data":null}"#).unwrap();
    assert!(resp.data.is_none());
    assert!(resp.error.is_none());
}

#[test]
fn deserialize_error_payload() {
    let payload: ErrorPayload = serde_json::from_str(
        r#"{"statusCode":429,"message":"Rate limit is exceeded. Try again in 3 seconds."}"#,
    )
    .unwrap();
    assert_eq!(payload.status_code, 429);
    assert!(payload.message.unwrap().starts_with("Rate limit"));
}

#[test]
fn data_envelope_is_not_an_error_payload() {
    let json = load_fixture("final_data.json");
    assert!(serde_json::from_str::<ErrorPayload>(&json).is_err());
}

#[test]
fn record_survives_cache_round_trip() {
    let json = load_fixture("final_data.json");
    let resp: ResponseEnvelope = serde_json::from_str(&json).unwrap();
    let rows = resp.data.unwrap();
    let cached = serde_json::to_string(&rows).unwrap();
    let back: Vec<TradeRecord> = serde_json::from_str(&cached).unwrap();
    assert_eq!(rows, back);
    assert_eq!(back[2].extra.get("reporterISO").and_then(|v| v.as_str()), Some("CHN"));
}
