use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use super::model::{
    denormalize, format_timestamp, CacheEntryDB, OhlcvDailyDB, OhlcvIntradayDB, OhlcvRows,
    NO_MARKET,
};
use crate::db::{self, get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::cache_entries::dsl as entries_dsl;
use crate::schema::ohlcv_daily::dsl as daily_dsl;
use crate::schema::ohlcv_intraday::dsl as intraday_dsl;
use finrelay_core::cache::PersistentCache;
use finrelay_core::Result;
use finrelay_market_data::{DataResponse, Market, Timeframe};

/// Rows per multi-row insert statement.
const OHLCV_CHUNK: usize = 500;

/// SQLite-backed persistent cache tier.
///
/// Reads use the connection pool; every write goes through the single writer
/// actor. Expired entries stay on disk until [`PersistentCache::purge_expired`].
pub struct SqliteCacheStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteCacheStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Opens (creating if needed) the database at `db_path`, applies pending
    /// migrations and starts the writer actor. Must be called inside a Tokio
    /// runtime.
    pub fn open(db_path: &str) -> Result<Self> {
        db::init_at(db_path)?;
        let pool = db::create_pool(db_path)?;
        db::run_migrations(&pool)?;
        let writer = db::spawn_writer((*pool).clone());
        debug!("Opened persistent cache at {}", db_path);
        Ok(Self::new(pool, writer))
    }

    /// Opens the database resolved by [`db::get_db_path`] for `data_dir`.
    pub fn open_in_dir(data_dir: &str) -> Result<Self> {
        Self::open(&db::get_db_path(data_dir))
    }

    /// Number of stored entries, expired ones included.
    pub fn entry_count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        entries_dsl::cache_entries
            .count()
            .get_result(&mut conn)
            .into_core()
    }

    /// Daily bars for `symbol`, oldest first.
    pub fn daily_bars(&self, symbol: &str, market: Option<Market>) -> Result<Vec<OhlcvDailyDB>> {
        let mut conn = get_connection(&self.pool)?;
        let market = market.map(|m| m.as_str()).unwrap_or(NO_MARKET);
        daily_dsl::ohlcv_daily
            .filter(daily_dsl::symbol.eq(symbol))
            .filter(daily_dsl::market.eq(market))
            .order(daily_dsl::trade_date.asc())
            .select(OhlcvDailyDB::as_select())
            .load(&mut conn)
            .into_core()
    }

    /// Intraday bars for `symbol` at `timeframe`, oldest first.
    pub fn intraday_bars(
        &self,
        symbol: &str,
        market: Option<Market>,
        timeframe: Timeframe,
    ) -> Result<Vec<OhlcvIntradayDB>> {
        let mut conn = get_connection(&self.pool)?;
        let market = market.map(|m| m.as_str()).unwrap_or(NO_MARKET);
        intraday_dsl::ohlcv_intraday
            .filter(intraday_dsl::symbol.eq(symbol))
            .filter(intraday_dsl::market.eq(market))
            .filter(intraday_dsl::timeframe.eq(timeframe.as_str()))
            .order(intraday_dsl::timestamp.asc())
            .select(OhlcvIntradayDB::as_select())
            .load(&mut conn)
            .into_core()
    }

    async fn upsert_ohlcv(&self, rows: OhlcvRows) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let mut total = 0;
                match rows {
                    OhlcvRows::Daily(rows) => {
                        for chunk in rows.chunks(OHLCV_CHUNK) {
                            total += diesel::replace_into(daily_dsl::ohlcv_daily)
                                .values(chunk)
                                .execute(conn)
                                .into_core()?;
                        }
                    }
                    OhlcvRows::Intraday(rows) => {
                        for chunk in rows.chunks(OHLCV_CHUNK) {
                            total += diesel::replace_into(intraday_dsl::ohlcv_intraday)
                                .values(chunk)
                                .execute(conn)
                                .into_core()?;
                        }
                    }
                }
                Ok(total)
            })
            .await
    }
}

#[async_trait]
impl PersistentCache for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<DataResponse>> {
        let mut conn = get_connection(&self.pool)?;
        let now = format_timestamp(Utc::now());

        let payload = entries_dsl::cache_entries
            .filter(entries_dsl::cache_key.eq(key))
            .filter(
                entries_dsl::expires_at
                    .is_null()
                    .or(entries_dsl::expires_at.gt(now)),
            )
            .select(entries_dsl::response_json)
            .first::<String>(&mut conn)
            .optional()
            .into_core()?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json).into_core()?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, response: &DataResponse, ttl: Option<Duration>) -> Result<()> {
        let now = Utc::now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl))
            .map(format_timestamp);

        let row = CacheEntryDB {
            cache_key: key.to_string(),
            response_json: serde_json::to_string(response).into_core()?,
            expires_at,
            created_at: format_timestamp(now),
        };

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::replace_into(entries_dsl::cache_entries)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await?;

        if let Some(rows) = denormalize(response, now) {
            let count = rows.len();
            match self.upsert_ohlcv(rows).await {
                Ok(_) => debug!("Stored {} OHLCV rows for {}", count, key),
                Err(e) => warn!("OHLCV denormalization failed for {}: {}", key, e),
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let removed = diesel::delete(
                    entries_dsl::cache_entries.filter(entries_dsl::cache_key.eq(key)),
                )
                .execute(conn)
                .into_core()?;
                Ok(removed > 0)
            })
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let now = format_timestamp(Utc::now());

        let found = entries_dsl::cache_entries
            .filter(entries_dsl::cache_key.eq(key))
            .filter(
                entries_dsl::expires_at
                    .is_null()
                    .or(entries_dsl::expires_at.gt(now)),
            )
            .select(entries_dsl::cache_key)
            .first::<String>(&mut conn)
            .optional()
            .into_core()?;

        Ok(found.is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.writer
            .exec(|conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(entries_dsl::cache_entries)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        diesel::sql_query("SELECT 1").execute(&mut conn).into_core()?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = format_timestamp(Utc::now());
        let purged = self
            .writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                diesel::delete(
                    entries_dsl::cache_entries.filter(entries_dsl::expires_at.le(now)),
                )
                .execute(conn)
                .into_core()
            })
            .await?;
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        Ok(purged)
    }
}
