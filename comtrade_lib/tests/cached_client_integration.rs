//! Integration tests for CachedClient against a wiremock server.

use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};

use comtrade_lib::{CachedClient, ComtradeConfig, ComtradeError, FetchOptions, TradeQuery};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(cache_dir: &Path) -> ComtradeConfig {
    ComtradeConfig::default()
        .with_cache_dir(cache_dir)
        .with_rate_limit(100, Duration::from_millis(10))
        .with_retry(3, Duration::from_millis(5), Duration::from_millis(20))
        .with_timeout(Duration::from_secs(5))
}

fn client(server: &MockServer, cache_dir: &Path) -> CachedClient {
    CachedClient::with_base_url(&server.uri(), &config(cache_dir)).expect("create client")
}

fn envelope(partners: &[i64]) -> serde_json::Value {
    let data: Vec<serde_json::Value> = partners
        .iter()
        .map(|p| {
            json!({
                "typeCode": "C",
                "freqCode": "A",
                "refYear": 2020,
                "period": "2020",
                "reporterCode": 156,
                "flowCode": "M",
                "partnerCode": p,
                "partner2Code": 0,
                "cmdCode": "TOTAL",
                "customsCode": "C00",
                "motCode": 0,
                "primaryValue": 1000.0 + *p as f64,
                "isAggregate": true
            })
        })
        .collect();
    json!({ "count": data.len(), "data": data, "error": "" })
}

fn query() -> TradeQuery {
    TradeQuery::default()
        .with_reporter("156")
        .with_period("2020")
        .with_flow_code("M")
        .with_cmd_code("TOTAL")
}

#[tokio::test]
async fn identical_requests_hit_the_network_once() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/C/A/HS"))
        .and(query_param("partner2Code", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&[0, 226, 620])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, tmp.path());
    let first = client
        .get_final_data(&query(), &FetchOptions::default())
        .await
        .unwrap();
    let second = client
        .get_final_data(&query(), &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(client.cache().entries().unwrap().len(), 1);
    assert_eq!(client.tracker().summary().cache_hits, 1);
}

#[tokio::test]
async fn expired_entries_are_fetched_again() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/C/A/HS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&[226])))
        .expect(2)
        .mount(&server)
        .await;

    client(&server, tmp.path())
        .get_final_data(&query(), &FetchOptions::default())
        .await
        .unwrap();

    // Age every entry past the 60 day window
    let long_ago = SystemTime::now() - Duration::from_secs(61 * 24 * 3600);
    for entry in std::fs::read_dir(tmp.path()).unwrap() {
        let file = File::options().write(true).open(entry.unwrap().path()).unwrap();
        file.set_modified(long_ago).unwrap();
    }

    let client = client(&server, tmp.path());
    // Swept when the client was built
    assert!(client.cache().entries().unwrap().is_empty());
    let rows = client
        .get_final_data(&query(), &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn world_rows_removed_for_open_partner_queries() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/C/A/HS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&[0, 226, 620])))
        .mount(&server)
        .await;

    let rows = client(&server, tmp.path())
        .get_final_data(&query(), &FetchOptions::default().with_remove_world(true))
        .await
        .unwrap();
    let partners: Vec<i64> = rows.iter().filter_map(|r| r.partner_code).collect();
    assert_eq!(partners, vec![226, 620]);
}

#[tokio::test]
async fn persistent_throttling_exhausts_retries() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/C/A/HS"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"statusCode": 429, "message": "Rate limit is exceeded"})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server, tmp.path());
    let err = client
        .get_final_data(&query(), &FetchOptions::default())
        .await
        .unwrap_err();

    match err {
        ComtradeError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other:?}"),
    }
    let summary = client.tracker().summary();
    assert_eq!(summary.requests_rate_limited, 3);
    assert!(client.cache().entries().unwrap().is_empty());
}

#[tokio::test]
async fn service_errors_are_not_retried() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/C/A/HS"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"statusCode": 400, "message": "Invalid period"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, tmp.path())
        .get_final_data(&query(), &FetchOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid period"));
}

#[tokio::test]
async fn thirteen_years_split_into_two_calls() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/C/A/HS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&[226])))
        .expect(2)
        .mount(&server)
        .await;

    let mut query = TradeQuery::default().with_reporter("156");
    for year in 2010..=2022 {
        query = query.with_period(&year.to_string());
    }
    let rows = client(&server, tmp.path())
        .get_final_data(&query, &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let requests = server.received_requests().await.unwrap();
    let periods: Vec<String> = requests
        .iter()
        .map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "period")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        })
        .collect();
    assert_eq!(periods[0].split(',').count(), 12);
    assert_eq!(periods[1], "2022");
}

#[tokio::test]
async fn empty_answers_are_retried_then_accepted_when_allowed() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/C/A/HS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&[])))
        .expect(4)
        .mount(&server)
        .await;

    let client = client(&server, tmp.path());
    let err = client
        .get_final_data(&query(), &FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ComtradeError::RetriesExhausted { .. }));

    let rows = client
        .get_final_data(&query(), &FetchOptions::default().with_retry_if_empty(false))
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(client.tracker().summary().requests_empty, 3);
}
