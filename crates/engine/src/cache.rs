//! In-memory snapshot cache
//!
//! [`load`] bulk-reads N trading days of snapshots and OHLC bars from a
//! [`SnapshotSource`] and produces an immutable [`DataCache`]. Every scorer,
//! detector, aggregator and backtest borrows the cache read-only; fresh data
//! means building a new cache and swapping it in through [`CacheHandle`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use persistence::repository::{OhlcRepository, SnapshotRepository};
use persistence::{Database, SqlitePool};
use tracing::{debug, info, warn};

use crate::types::{parse_date, OhlcBar, Snapshot};
use crate::EngineError;

/// All snapshots of one trading date, keyed (and iterated) by symbol
pub type DayMap = BTreeMap<String, Snapshot>;

// ============================================================================
// Source interface
// ============================================================================

/// Read side of the snapshot/OHLC store
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Trading dates ascending; `Some(n)` keeps the most recent n
    async fn list_dates(&self, limit: Option<usize>) -> Result<Vec<NaiveDate>, EngineError>;

    async fn get_symbols(&self) -> Result<Vec<String>, EngineError>;

    async fn get_snapshot_batch(
        &self,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, DayMap>, EngineError>;

    async fn get_ohlc_batch(
        &self,
        symbol: &str,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, OhlcBar>, EngineError>;
}

/// [`SnapshotSource`] backed by the SQLite store
#[derive(Clone)]
pub struct SqliteSnapshotSource {
    pool: SqlitePool,
}

impl SqliteSnapshotSource {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool_clone(),
        }
    }
}

fn iso(dates: &[NaiveDate]) -> Vec<String> {
    dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect()
}

#[async_trait]
impl SnapshotSource for SqliteSnapshotSource {
    async fn list_dates(&self, limit: Option<usize>) -> Result<Vec<NaiveDate>, EngineError> {
        let limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));
        let raw = SnapshotRepository::new(&self.pool).list_dates(limit).await?;

        Ok(raw
            .iter()
            .filter_map(|d| match parse_date(d) {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!(date = %d, error = %e, "Skipping unparseable trading date");
                    None
                }
            })
            .collect())
    }

    async fn get_symbols(&self) -> Result<Vec<String>, EngineError> {
        Ok(SnapshotRepository::new(&self.pool).get_symbols().await?)
    }

    async fn get_snapshot_batch(
        &self,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, DayMap>, EngineError> {
        let records = SnapshotRepository::new(&self.pool)
            .get_for_dates(&iso(dates))
            .await?;

        let mut batch: BTreeMap<NaiveDate, DayMap> = BTreeMap::new();
        for record in records {
            let symbol = record.symbol.clone();
            match Snapshot::from_record(record) {
                Ok(s) => {
                    batch.entry(s.date).or_default().insert(symbol, s);
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "Skipping malformed snapshot"),
            }
        }
        Ok(batch)
    }

    async fn get_ohlc_batch(
        &self,
        symbol: &str,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, OhlcBar>, EngineError> {
        let records = OhlcRepository::new(&self.pool)
            .get_bars(symbol, &iso(dates))
            .await?;

        let mut bars = BTreeMap::new();
        for r in &records {
            match parse_date(&r.date) {
                Ok(date) => {
                    bars.insert(date, OhlcBar::from(r));
                }
                Err(e) => warn!(symbol, date = %r.date, error = %e, "Skipping malformed bar"),
            }
        }
        Ok(bars)
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Immutable view of N trading days: date → symbol → snapshot, symbol → date → bar
#[derive(Debug, Clone, Default)]
pub struct DataCache {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    snapshots: BTreeMap<NaiveDate, DayMap>,
    ohlc: HashMap<String, BTreeMap<NaiveDate, OhlcBar>>,
}

impl DataCache {
    /// Build a cache from already-materialised rows. Later duplicates of a
    /// (date, symbol) pair win; dates are derived from the snapshots.
    pub fn from_parts(
        snapshots: impl IntoIterator<Item = Snapshot>,
        bars: impl IntoIterator<Item = (String, NaiveDate, OhlcBar)>,
    ) -> Self {
        let mut by_date: BTreeMap<NaiveDate, DayMap> = BTreeMap::new();
        for s in snapshots {
            by_date.entry(s.date).or_default().insert(s.symbol.clone(), s);
        }

        let mut ohlc: HashMap<String, BTreeMap<NaiveDate, OhlcBar>> = HashMap::new();
        for (symbol, date, bar) in bars {
            ohlc.entry(symbol).or_default().insert(date, bar);
        }

        let symbols: BTreeSet<String> = by_date
            .values()
            .flat_map(|day| day.keys().cloned())
            .chain(ohlc.keys().cloned())
            .collect();

        Self {
            dates: by_date.keys().copied().collect(),
            symbols: symbols.into_iter().collect(),
            snapshots: by_date,
            ohlc,
        }
    }

    /// Trading dates, ascending
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Requested view date (YYYY-MM-DD), or the latest loaded date when `raw` is `None`
    pub fn resolve_view_date(&self, raw: Option<&str>) -> Result<NaiveDate, EngineError> {
        match raw {
            Some(raw) => parse_date(raw).map_err(|e| EngineError::InvalidDate(format!("{raw}: {e}"))),
            None => self.latest_date().ok_or(EngineError::NoDates),
        }
    }

    /// All snapshots for `date` (None when the date was not loaded)
    pub fn day(&self, date: NaiveDate) -> Option<&DayMap> {
        self.snapshots.get(&date)
    }

    pub fn snapshot(&self, date: NaiveDate, symbol: &str) -> Option<&Snapshot> {
        self.snapshots.get(&date).and_then(|day| day.get(symbol))
    }

    pub fn bar(&self, symbol: &str, date: NaiveDate) -> Option<&OhlcBar> {
        self.ohlc.get(symbol).and_then(|bars| bars.get(&date))
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// The trading date immediately before `date`
    pub fn prev_date(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.index_of(date)?;
        idx.checked_sub(1).map(|i| self.dates[i])
    }

    /// Dates up to and including `date` (the "as of" view with no lookahead)
    pub fn dates_up_to(&self, date: NaiveDate) -> &[NaiveDate] {
        let end = self.dates.partition_point(|d| *d <= date);
        &self.dates[..end]
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.values().map(|d| d.len()).sum()
    }

    pub fn bar_count(&self) -> usize {
        self.ohlc.values().map(|b| b.len()).sum()
    }

    /// Entry and exit prices for a trade signalled on `dates[signal_idx]` and held `hold` days.
    ///
    /// Entry is the next day's open when it sits within `max_gap_pct` of the
    /// signal close, else the signal close. Exit is the snapshot close `hold`
    /// days later. `None` when the next-day bar is missing or invalid, a price
    /// is missing, or the realised move exceeds `max_gap_pct * hold` (splits,
    /// bad ticks).
    pub fn resolve_trade_prices(
        &self,
        symbol: &str,
        signal_close: f64,
        signal_idx: usize,
        hold: usize,
        max_gap_pct: f64,
    ) -> Option<(f64, f64)> {
        if signal_close <= 0.0 || hold == 0 {
            return None;
        }
        let next_date = *self.dates.get(signal_idx + 1)?;
        let exit_date = *self.dates.get(signal_idx + hold)?;

        let exit = self.snapshot(exit_date, symbol)?.close;
        if exit <= 0.0 {
            return None;
        }

        let bar = self.bar(symbol, next_date).filter(|b| b.is_valid())?;
        let open_gap = ((bar.open - signal_close) / signal_close * 100.0).abs();
        let entry = if open_gap <= max_gap_pct {
            bar.open
        } else {
            signal_close
        };

        let move_pct = ((exit - entry) / entry * 100.0).abs();
        if move_pct > max_gap_pct * hold as f64 {
            debug!(symbol, entry, exit, move_pct, "Rejecting trade on implausible price move");
            return None;
        }

        Some((entry, exit))
    }
}

/// Load the most recent `days` trading days (all days when `None`)
pub async fn load<S>(source: &S, days: Option<usize>) -> Result<DataCache, EngineError>
where
    S: SnapshotSource + ?Sized,
{
    let dates = source.list_dates(days).await?;
    if dates.is_empty() {
        warn!("Snapshot store has no trading dates; cache is empty");
        return Ok(DataCache::default());
    }

    let symbols = source.get_symbols().await?;
    let snapshots = source.get_snapshot_batch(&dates).await?;

    let mut ohlc = HashMap::with_capacity(symbols.len());
    for symbol in &symbols {
        let bars = source.get_ohlc_batch(symbol, &dates).await?;
        if !bars.is_empty() {
            ohlc.insert(symbol.clone(), bars);
        }
    }

    let cache = DataCache {
        dates,
        symbols,
        snapshots,
        ohlc,
    };

    info!(
        dates = cache.dates.len(),
        symbols = cache.symbols.len(),
        snapshots = cache.snapshot_count(),
        bars = cache.bar_count(),
        first = ?cache.dates.first(),
        last = ?cache.dates.last(),
        "Snapshot cache loaded"
    );

    Ok(cache)
}

// ============================================================================
// Shared handle
// ============================================================================

/// Shared, swappable cache. Readers take an `Arc` to a complete cache and keep
/// it for the whole computation; `replace` swaps in a new one in a single step.
pub struct CacheHandle {
    current: RwLock<Arc<DataCache>>,
}

impl CacheHandle {
    pub fn new(cache: DataCache) -> Self {
        Self {
            current: RwLock::new(Arc::new(cache)),
        }
    }

    pub fn current(&self) -> Arc<DataCache> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `cache`, returning the one it replaced
    pub fn replace(&self, cache: DataCache) -> Arc<DataCache> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::repository::{OhlcRecord, SnapshotRecord};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn snap(day: u32, symbol: &str, close: f64) -> Snapshot {
        Snapshot {
            close,
            ..Snapshot::new(d(day), symbol)
        }
    }

    fn bar(open: f64) -> OhlcBar {
        OhlcBar {
            open,
            high: open * 1.02,
            low: open * 0.98,
            close: open,
        }
    }

    #[test]
    fn test_from_parts_orders_dates_and_symbols() {
        let cache = DataCache::from_parts(
            vec![snap(5, "ZEE", 10.0), snap(3, "ABB", 20.0), snap(4, "ABB", 21.0)],
            vec![("ITC".to_string(), d(4), bar(400.0))],
        );
        assert_eq!(cache.dates(), &[d(3), d(4), d(5)]);
        assert_eq!(cache.symbols(), &["ABB", "ITC", "ZEE"]);
        assert_eq!(cache.prev_date(d(4)), Some(d(3)));
        assert_eq!(cache.prev_date(d(3)), None);
        assert_eq!(cache.dates_up_to(d(4)), &[d(3), d(4)]);
        assert_eq!(cache.snapshot(d(4), "ABB").map(|s| s.close), Some(21.0));
    }

    #[test]
    fn test_resolve_view_date() {
        let cache = DataCache::from_parts(vec![snap(3, "ABB", 20.0), snap(4, "ABB", 21.0)], vec![]);
        assert_eq!(cache.resolve_view_date(None).unwrap(), d(4));
        assert_eq!(cache.resolve_view_date(Some("2025-03-03")).unwrap(), d(3));
        assert!(matches!(
            cache.resolve_view_date(Some("03/03/2025")),
            Err(EngineError::InvalidDate(_))
        ));
        assert!(matches!(
            DataCache::default().resolve_view_date(None),
            Err(EngineError::NoDates)
        ));
    }

    #[test]
    fn test_trade_prices_prefer_next_open() {
        let cache = DataCache::from_parts(
            vec![snap(3, "ABB", 100.0), snap(4, "ABB", 104.0)],
            vec![("ABB".to_string(), d(4), bar(101.0))],
        );
        assert_eq!(
            cache.resolve_trade_prices("ABB", 100.0, 0, 1, 20.0),
            Some((101.0, 104.0))
        );
    }

    #[test]
    fn test_trade_prices_fall_back_to_signal_close_on_large_gap() {
        // Open gaps 30% but the close is sane relative to the signal close
        let cache = DataCache::from_parts(
            vec![snap(3, "ABB", 100.0), snap(4, "ABB", 110.0)],
            vec![("ABB".to_string(), d(4), bar(130.0))],
        );
        assert_eq!(
            cache.resolve_trade_prices("ABB", 100.0, 0, 1, 20.0),
            Some((100.0, 110.0))
        );
    }

    #[test]
    fn test_trade_prices_reject_missing_bar_and_big_moves() {
        let cache = DataCache::from_parts(
            vec![snap(3, "ABB", 100.0), snap(4, "ABB", 125.0)],
            vec![("ABB".to_string(), d(4), bar(125.0))],
        );
        // 25% open gap → entry falls back to 100, exit 125 is a 25% move > 20%
        assert_eq!(cache.resolve_trade_prices("ABB", 100.0, 0, 1, 20.0), None);
        // Same move allowed over a 2-day hold budget, but there is no third date
        assert_eq!(cache.resolve_trade_prices("ABB", 100.0, 0, 2, 20.0), None);

        let no_bar = DataCache::from_parts(vec![snap(3, "ABB", 100.0), snap(4, "ABB", 101.0)], vec![]);
        assert_eq!(no_bar.resolve_trade_prices("ABB", 100.0, 0, 1, 20.0), None);

        let bad_bar = DataCache::from_parts(
            vec![snap(3, "ABB", 100.0), snap(4, "ABB", 101.0)],
            vec![("ABB".to_string(), d(4), bar(0.0))],
        );
        assert_eq!(bad_bar.resolve_trade_prices("ABB", 100.0, 0, 1, 20.0), None);
    }

    #[test]
    fn test_handle_swap_keeps_old_readers_intact() {
        let handle = CacheHandle::new(DataCache::from_parts(vec![snap(3, "ABB", 1.0)], vec![]));
        let before = handle.current();

        let old = handle.replace(DataCache::from_parts(
            vec![snap(3, "ABB", 1.0), snap(4, "ABB", 2.0)],
            vec![],
        ));

        assert_eq!(before.dates().len(), 1);
        assert_eq!(old.dates().len(), 1);
        assert_eq!(handle.current().dates().len(), 2);
    }

    #[tokio::test]
    async fn test_load_from_sqlite_store() {
        let db = Database::in_memory().await.unwrap();
        let snapshots = SnapshotRepository::new(db.pool());
        let rec = |date: &str, symbol: &str, trend: &str| SnapshotRecord {
            date: date.to_string(),
            symbol: symbol.to_string(),
            oi_trend: Some(trend.to_string()),
            close: Some(100.0),
            ..Default::default()
        };
        snapshots
            .upsert_many(&[
                rec("2025-03-03", "ABB", "NewShort"),
                rec("2025-03-04", "ABB", "AggressiveNewLong"),
                rec("2025-03-05", "ABB", "Neutral"),
                rec("2025-03-05", "ITC", "LongCover"),
            ])
            .await
            .unwrap();
        OhlcRepository::new(db.pool())
            .upsert_many(&[OhlcRecord {
                symbol: "ABB".to_string(),
                date: "2025-03-05".to_string(),
                open: Some(99.0),
                high: Some(102.0),
                low: Some(98.0),
                close: Some(101.0),
            }])
            .await
            .unwrap();

        let source = SqliteSnapshotSource::new(&db);
        let cache = load(&source, Some(2)).await.unwrap();

        assert_eq!(cache.dates(), &[d(4), d(5)]);
        assert_eq!(cache.symbols(), &["ABB", "ITC"]);
        assert_eq!(
            cache.snapshot(d(4), "ABB").map(|s| s.oi_trend),
            Some(crate::types::OiTrend::NewLong)
        );
        assert_eq!(cache.bar("ABB", d(5)).map(|b| b.open), Some(99.0));
        assert_eq!(cache.snapshot_count(), 3);
    }

    #[tokio::test]
    async fn test_load_empty_store_gives_empty_cache() {
        let db = Database::in_memory().await.unwrap();
        let cache = load(&SqliteSnapshotSource::new(&db), None).await.unwrap();
        assert!(cache.is_empty());
    }
}
