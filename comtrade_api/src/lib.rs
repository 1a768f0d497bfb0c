//! Thin async client for the UN Comtrade final-data API: query builder,
//! wire types, and the error taxonomy the retry layer classifies on.

mod client;
mod errors;
mod query;
pub mod types;
pub use self::client::{
    key_prefix, normalize_api_key, redact_url, Client, BASE_URL_API, BASE_URL_PREVIEW,
    PLACEHOLDER_KEY,
};
pub use self::errors::Error;
pub use self::query::{FreqCode, Query, QueryCommon, TradeQuery, TypeCode, WORLD_CODE};
