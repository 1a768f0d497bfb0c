mod meta;
pub use self::meta::{ErrorPayload, ResponseEnvelope};

mod trade;
pub use self::trade::TradeRecord;
