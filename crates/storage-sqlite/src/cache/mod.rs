mod model;
mod repository;

pub use model::{
    denormalize, format_timestamp, CacheEntryDB, OhlcvDailyDB, OhlcvIntradayDB, OhlcvRows,
    NO_MARKET,
};
pub use repository::SqliteCacheStore;
