mod common;
pub use self::common::{FreqCode, Query, QueryCommon, TypeCode};

mod trade;
pub use self::trade::{TradeQuery, WORLD_CODE};
