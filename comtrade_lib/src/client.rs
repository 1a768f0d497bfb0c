//! Caching and rate-limiting wrapper around the API client.

use comtrade_api::types::TradeRecord;
use comtrade_api::TradeQuery;

use crate::assembler::{assemble, diagnose, AssembleOptions};
use crate::cache::DiskCache;
use crate::config::{CacheFailurePolicy, ComtradeConfig};
use crate::error::{CacheError, ComtradeError};
use crate::fetcher::{Fetcher, RetryPolicy, Transport};
use crate::fingerprint::RequestFingerprint;
use crate::leaderboard::{trade_balance, TradeBalanceRow};
use crate::planner::{parse_periods, split_periods, DEFAULT_PERIOD_GROUP};
use crate::rate_limiter::{Clock, RateLimiter, RequestTracker, TokioClock};

/// Per-call retrieval switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    /// Read and write the disk cache.
    pub use_cache: bool,
    /// Treat an empty answer as transient: retry it and never serve it from cache.
    pub retry_if_empty: bool,
    /// Drop world rows when no partner filter is set.
    pub remove_world: bool,
    /// Periods per network call.
    pub period_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            retry_if_empty: true,
            remove_world: false,
            period_size: DEFAULT_PERIOD_GROUP,
        }
    }
}

impl FetchOptions {
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_retry_if_empty(mut self, retry: bool) -> Self {
        self.retry_if_empty = retry;
        self
    }

    pub fn with_remove_world(mut self, remove: bool) -> Self {
        self.remove_world = remove;
        self
    }

    pub fn with_period_size(mut self, size: usize) -> Self {
        self.period_size = size;
        self
    }
}

/// API client wrapper that adds a disk cache, rate limiting and retries.
///
/// Multi-period queries are split into groups of at most `period_size`
/// periods. Each group is served from the cache when a valid entry exists;
/// otherwise it goes through the rate limiter and retry loop and the answer
/// is cached. Groups run one after the other and their rows are
/// concatenated in request order.
pub struct CachedClient<T: Transport = comtrade_api::Client, C: Clock = TokioClock> {
    fetcher: Fetcher<T, C>,
    cache: DiskCache,
    cache_policy: CacheFailurePolicy,
}

impl CachedClient<comtrade_api::Client, TokioClock> {
    /// Creates a client for the production endpoint selected by the config's key.
    pub fn new(config: &ComtradeConfig) -> Result<Self, ComtradeError> {
        let inner = comtrade_api::Client::new(config.api_key.as_deref(), config.timeout)?;
        Self::with_transport(
            inner,
            RateLimiter::new(config.calls_per_period, config.period),
            config,
        )
    }

    /// Creates a client with a custom base URL. Used for testing.
    pub fn with_base_url(base_url: &str, config: &ComtradeConfig) -> Result<Self, ComtradeError> {
        let inner = comtrade_api::Client::with_base_url(
            base_url,
            config.api_key.as_deref(),
            config.timeout,
        )?;
        Self::with_transport(
            inner,
            RateLimiter::new(config.calls_per_period, config.period),
            config,
        )
    }
}

impl<C: Clock> CachedClient<comtrade_api::Client, C> {
    /// The URL the first sub-request of `query` would hit, credential hidden.
    pub fn echo_url(&self, query: &TradeQuery) -> Result<String, ComtradeError> {
        Ok(self.fetcher.transport().echo_url(&with_defaults(query))?)
    }
}

impl<T: Transport, C: Clock> CachedClient<T, C> {
    /// Wires a transport and limiter together with the config's cache and
    /// retry settings. Stale cache entries are swept here.
    pub fn with_transport(
        transport: T,
        limiter: RateLimiter<C>,
        config: &ComtradeConfig,
    ) -> Result<Self, ComtradeError> {
        let client = Self {
            fetcher: Fetcher::with_limiter(transport, limiter, RetryPolicy::from_config(config)),
            cache: DiskCache::new(&config.cache_dir, config.cache_validity()),
            cache_policy: config.cache_failure_policy,
        };
        client.guard(client.cache.sweep())?;
        Ok(client)
    }

    pub fn tracker(&self) -> &RequestTracker {
        self.fetcher.tracker()
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Removes every cache entry. Returns the number of files deleted.
    pub fn clear_cache(&self) -> Result<usize, ComtradeError> {
        Ok(self.cache.clear()?)
    }

    /// Retrieves final data for `query`, splitting it by period and going
    /// through the cache for each group.
    ///
    /// Any group that fails aborts the whole call; rows from groups that
    /// already succeeded stay cached.
    pub async fn get_final_data(
        &self,
        query: &TradeQuery,
        options: &FetchOptions,
    ) -> Result<Vec<TradeRecord>, ComtradeError> {
        let query = with_defaults(query);
        let groups = split_periods(&query.periods, options.period_size)?;
        let preview = self.fetcher.transport().is_preview();

        let mut chunks = Vec::with_capacity(groups.len());
        for (i, group) in groups.iter().enumerate() {
            if groups.len() > 1 {
                tracing::info!("Period group {}/{}: {}", i + 1, groups.len(), group);
            }
            let sub = query.for_sub_period(group);
            chunks.push(self.fetch_group(&sub, preview, options).await?);
        }

        let rows = assemble(chunks, &AssembleOptions::for_query(&query, options.remove_world));
        diagnose(&rows, &query);
        tracing::debug!("Assembled {} rows from {} groups", rows.len(), groups.len());
        Ok(rows)
    }

    async fn fetch_group(
        &self,
        sub: &TradeQuery,
        preview: bool,
        options: &FetchOptions,
    ) -> Result<Vec<TradeRecord>, ComtradeError> {
        if !options.use_cache {
            return self.fetcher.fetch(sub, options.retry_if_empty).await;
        }

        let fingerprint = RequestFingerprint::of(sub, preview)?;
        if let Some(Some(rows)) = self.guard(self.cache.get(&fingerprint, options.retry_if_empty))? {
            tracing::debug!("Cache hit for {} ({} rows)", fingerprint, rows.len());
            self.tracker().record_cache_hit();
            return Ok(rows);
        }

        let rows = self.fetcher.fetch(sub, options.retry_if_empty).await?;
        self.guard(self.cache.put(&fingerprint, &rows))?;
        Ok(rows)
    }

    /// Applies the cache failure policy: `Abort` propagates the error,
    /// `Bypass` logs it and carries on without the cache.
    fn guard<V>(&self, result: Result<V, CacheError>) -> Result<Option<V>, ComtradeError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) => match self.cache_policy {
                CacheFailurePolicy::Abort => Err(e.into()),
                CacheFailurePolicy::Bypass => {
                    tracing::warn!("Ignoring cache failure: {}", e);
                    Ok(None)
                }
            },
        }
    }

    /// Import/export totals of `reporter` per period, with default options.
    ///
    /// `partners` restricts the counterpart countries (`None` for all,
    /// `"0"` for the world aggregate). With `mirror`, the partners' own
    /// declarations are fetched as well and fill the `X<M` and `M<X`
    /// columns.
    pub async fn get_trade_flows(
        &self,
        reporter: &str,
        periods: &str,
        partners: Option<&str>,
        mirror: bool,
    ) -> Result<Vec<TradeBalanceRow>, ComtradeError> {
        self.get_trade_flows_with(reporter, periods, partners, mirror, &FetchOptions::default())
            .await
    }

    /// Like [`Self::get_trade_flows`]; every query runs one period per call.
    pub async fn get_trade_flows_with(
        &self,
        reporter: &str,
        periods: &str,
        partners: Option<&str>,
        mirror: bool,
        options: &FetchOptions,
    ) -> Result<Vec<TradeBalanceRow>, ComtradeError> {
        let periods = parse_periods(periods)?;
        let options = FetchOptions {
            period_size: 1,
            remove_world: true,
            ..*options
        };

        let reported = |flow: &str| flow_query(Some(reporter), partners, flow, &periods);
        let imports = self.get_final_data(&reported("M"), &options).await?;
        let exports = self.get_final_data(&reported("X"), &options).await?;

        let (mirror_imports, mirror_exports) = if mirror {
            let counterparts = partners.filter(|p| p.trim() != "0");
            let mirrored = |flow: &str| flow_query(counterparts, Some(reporter), flow, &periods);
            (
                self.get_final_data(&mirrored("M"), &options).await?,
                self.get_final_data(&mirrored("X"), &options).await?,
            )
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(trade_balance(&imports, &exports, &mirror_imports, &mirror_exports))
    }
}

/// Unset `partner2Code` becomes `0`; otherwise the service adds per
/// secondary-partner rows on top of their total.
fn with_defaults(query: &TradeQuery) -> TradeQuery {
    let mut query = query.clone();
    if query.partner2_code.is_none() {
        query.partner2_code = Some("0".to_string());
    }
    query
}

/// Totals-only query: all commodities, all customs procedures, all modes
/// of transport.
fn flow_query(
    reporters: Option<&str>,
    partners: Option<&str>,
    flow: &str,
    periods: &[String],
) -> TradeQuery {
    let mut query = TradeQuery::default()
        .with_flow_code(flow)
        .with_cmd_code("TOTAL")
        .with_partner2("0")
        .with_customs_code("C00")
        .with_mot_code("0");
    query.periods = periods.to_vec();
    query.reporter_codes = split_codes(reporters);
    query.partner_codes = split_codes(partners);
    query
}

fn split_codes(codes: Option<&str>) -> Vec<String> {
    codes
        .map(|c| {
            c.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::test_transport::{rows, ScriptedTransport};
    use crate::rate_limiter::test_clock::ManualClock;
    use std::sync::Arc;
    use std::time::Duration;

    type TestClient = CachedClient<ScriptedTransport, Arc<ManualClock>>;

    fn client(
        dir: &std::path::Path,
        responses: Vec<Result<Vec<TradeRecord>, comtrade_api::Error>>,
    ) -> (TestClient, Arc<ManualClock>) {
        let clock = ManualClock::new();
        let limiter = RateLimiter::with_clock(100, Duration::from_secs(1), Arc::clone(&clock));
        let config = ComtradeConfig::default().with_cache_dir(dir);
        let client =
            CachedClient::with_transport(ScriptedTransport::new(responses), limiter, &config)
                .unwrap();
        (client, clock)
    }

    fn calls(client: &TestClient) -> Vec<TradeQuery> {
        client.fetcher.transport().calls.lock().unwrap().clone()
    }

    fn years(n: i32) -> TradeQuery {
        let mut query = TradeQuery::default().with_reporter("156");
        for year in 2010..2010 + n {
            query = query.with_period(&year.to_string());
        }
        query
    }

    #[tokio::test]
    async fn thirteen_years_take_two_calls_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, _) = client(tmp.path(), vec![Ok(rows(&[24, 76])), Ok(rows(&[620]))]);

        let result = client
            .get_final_data(&years(13), &FetchOptions::default())
            .await
            .unwrap();
        let partners: Vec<i64> = result.iter().filter_map(|r| r.partner_code).collect();
        assert_eq!(partners, vec![24, 76, 620]);

        let sent = calls(&client);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].periods.len(), 12);
        assert_eq!(sent[1].periods, vec!["2022".to_string()]);
        assert!(sent.iter().all(|q| q.partner2_code.as_deref() == Some("0")));
    }

    #[tokio::test]
    async fn second_identical_call_served_from_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, _) = client(tmp.path(), vec![Ok(rows(&[226]))]);
        let query = years(1);

        let first = client.get_final_data(&query, &FetchOptions::default()).await.unwrap();
        let second = client.get_final_data(&query, &FetchOptions::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls(&client).len(), 1);
        assert_eq!(client.tracker().summary().cache_hits, 1);
    }

    #[tokio::test]
    async fn cache_disabled_always_fetches() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, _) = client(tmp.path(), vec![Ok(rows(&[226])), Ok(rows(&[226]))]);
        let options = FetchOptions::default().without_cache();
        client.get_final_data(&years(1), &options).await.unwrap();
        client.get_final_data(&years(1), &options).await.unwrap();
        assert_eq!(calls(&client).len(), 2);
        assert!(client.cache().entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn world_rows_removed_on_request() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, _) = client(tmp.path(), vec![Ok(rows(&[0, 226, 620]))]);
        let options = FetchOptions::default().with_remove_world(true);
        let result = client.get_final_data(&years(1), &options).await.unwrap();
        let partners: Vec<i64> = result.iter().filter_map(|r| r.partner_code).collect();
        assert_eq!(partners, vec![226, 620]);
    }

    #[tokio::test]
    async fn failing_group_aborts_but_keeps_earlier_groups_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let rejected = Err(comtrade_api::Error::HttpStatus {
            status: 400,
            message: "bad period".into(),
        });
        let (client, _) = client(tmp.path(), vec![Ok(rows(&[24])), rejected]);
        let err = client
            .get_final_data(&years(13), &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ComtradeError::Api(_)));
        assert_eq!(client.cache().entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_entry_follows_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let query = years(1);
        let fingerprint = RequestFingerprint::of(&with_defaults(&query), false).unwrap();
        let path = tmp.path().join(format!("{}.json", fingerprint));

        std::fs::write(&path, "not json").unwrap();
        let (abort, _) = client(tmp.path(), vec![Ok(rows(&[226]))]);
        let err = abort
            .get_final_data(&query, &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ComtradeError::Cache(CacheError::Corrupt { .. })));
        assert!(!path.exists());

        std::fs::write(&path, "not json").unwrap();
        let clock = ManualClock::new();
        let config = ComtradeConfig::default()
            .with_cache_dir(tmp.path())
            .with_cache_failure_policy(CacheFailurePolicy::Bypass);
        let bypass = CachedClient::with_transport(
            ScriptedTransport::new(vec![Ok(rows(&[226]))]),
            RateLimiter::with_clock(100, Duration::from_secs(1), clock),
            &config,
        )
        .unwrap();
        let result = bypass.get_final_data(&query, &FetchOptions::default()).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn trade_flows_issue_reported_and_mirror_queries() {
        let tmp = tempfile::tempdir().unwrap();
        let row = |period: &str, value: f64| TradeRecord {
            period: Some(period.to_string()),
            partner_code: Some(24),
            primary_value: Some(value),
            ..Default::default()
        };
        let (client, _) = client(
            tmp.path(),
            vec![
                Ok(vec![row("2020", 100.0)]),
                Ok(vec![row("2020", 60.0)]),
                Ok(vec![row("2020", 70.0)]),
                Ok(vec![row("2020", 90.0)]),
            ],
        );

        let table = client
            .get_trade_flows("156", "2020", Some("24"), true)
            .await
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].imports, 100.0);
        assert_eq!(table[0].exports, 60.0);
        assert_eq!(table[0].mirror_exports, 70.0);
        assert_eq!(table[0].mirror_imports, 90.0);

        let sent = calls(&client);
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].reporter_codes, vec!["156".to_string()]);
        assert_eq!(sent[0].flow_codes, vec!["M".to_string()]);
        assert_eq!(sent[0].cmd_codes, vec!["TOTAL".to_string()]);
        assert_eq!(sent[2].reporter_codes, vec!["24".to_string()]);
        assert_eq!(sent[2].partner_codes, vec!["156".to_string()]);
        assert_eq!(sent[3].flow_codes, vec!["X".to_string()]);
    }

    #[tokio::test]
    async fn mirror_of_world_leaves_reporters_open() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, _) = client(
            tmp.path(),
            (0..4).map(|_| Ok(rows(&[0]))).collect(),
        );
        client
            .get_trade_flows("156", "2021", Some("0"), true)
            .await
            .unwrap();
        let sent = calls(&client);
        assert_eq!(sent[0].partner_codes, vec!["0".to_string()]);
        assert!(sent[2].reporter_codes.is_empty());
        assert_eq!(sent[2].partner_codes, vec!["156".to_string()]);
    }
}
