//! Library layer for the Comtrade toolkit: cached, rate-limited retrieval
//! plus leaderboard analytics.
//!
//! Wraps the `comtrade_api` crate with period splitting, a disk cache,
//! a sliding-window rate limiter with bounded retries, result assembly and
//! grouped rank/share computations over the returned rows.

pub mod analytics;
pub mod assembler;
pub mod cache;
pub mod client;
pub mod codebook;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod fingerprint;
pub mod leaderboard;
pub mod planner;
pub mod rate_limiter;
pub mod validation;

pub use comtrade_api;
pub use comtrade_api::types;
pub use comtrade_api::{FreqCode, Query, TradeQuery, TypeCode, WORLD_CODE};

pub use analytics::{Annotated, Columns, RankSpec};
pub use cache::DiskCache;
pub use client::{CachedClient, FetchOptions};
pub use codebook::CodeBook;
pub use config::{CacheFailurePolicy, ComtradeConfig};
pub use error::{CacheError, ComtradeError};
pub use leaderboard::TradeBalanceRow;
pub use rate_limiter::{RequestTracker, TrackerSummary};
