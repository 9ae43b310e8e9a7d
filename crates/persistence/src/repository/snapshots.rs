//! Snapshot repository — per-date, per-symbol derivatives records

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A stored derivatives snapshot, exactly as persisted (nullable columns stay `None`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct SnapshotRecord {
    pub date: String,
    pub symbol: String,
    pub stock_name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub mcap_category: Option<String>,
    pub lot_size: Option<i64>,
    pub close: Option<f64>,
    pub change_pct: Option<f64>,
    pub oi_trend: Option<String>,
    pub cumulative_future_oi: Option<f64>,
    pub oi_change_pct: Option<f64>,
    pub cumulative_call_oi: Option<f64>,
    pub cumulative_put_oi: Option<f64>,
    pub pcr: Option<f64>,
    pub pcr_change_1d: Option<f64>,
    pub volume_times: Option<f64>,
    pub delivery_times: Option<f64>,
}

const SNAPSHOT_COLUMNS: &str = "date, symbol, stock_name, sector, industry, mcap_category, \
     lot_size, close, change_pct, oi_trend, cumulative_future_oi, oi_change_pct, \
     cumulative_call_oi, cumulative_put_oi, pcr, pcr_change_1d, volume_times, delivery_times";

/// `?, ?, ...` for an IN clause of `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Repository for derivatives snapshots
pub struct SnapshotRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SnapshotRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace snapshots (keyed by date + symbol) in one transaction.
    /// Returns the number of rows written.
    pub async fn upsert_many(&self, records: &[SnapshotRecord]) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;

        for r in records {
            let result = sqlx::query(
                r#"INSERT INTO derivative_snapshots
                    (date, symbol, stock_name, sector, industry, mcap_category, lot_size,
                     close, change_pct, oi_trend, cumulative_future_oi, oi_change_pct,
                     cumulative_call_oi, cumulative_put_oi, pcr, pcr_change_1d,
                     volume_times, delivery_times)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                           ?16, ?17, ?18)
                   ON CONFLICT(date, symbol) DO UPDATE SET
                     stock_name = excluded.stock_name,
                     sector = excluded.sector,
                     industry = excluded.industry,
                     mcap_category = excluded.mcap_category,
                     lot_size = excluded.lot_size,
                     close = excluded.close,
                     change_pct = excluded.change_pct,
                     oi_trend = excluded.oi_trend,
                     cumulative_future_oi = excluded.cumulative_future_oi,
                     oi_change_pct = excluded.oi_change_pct,
                     cumulative_call_oi = excluded.cumulative_call_oi,
                     cumulative_put_oi = excluded.cumulative_put_oi,
                     pcr = excluded.pcr,
                     pcr_change_1d = excluded.pcr_change_1d,
                     volume_times = excluded.volume_times,
                     delivery_times = excluded.delivery_times,
                     imported_at = strftime('%s', 'now')
                "#,
            )
            .bind(&r.date)
            .bind(&r.symbol)
            .bind(&r.stock_name)
            .bind(&r.sector)
            .bind(&r.industry)
            .bind(&r.mcap_category)
            .bind(r.lot_size)
            .bind(r.close)
            .bind(r.change_pct)
            .bind(&r.oi_trend)
            .bind(r.cumulative_future_oi)
            .bind(r.oi_change_pct)
            .bind(r.cumulative_call_oi)
            .bind(r.cumulative_put_oi)
            .bind(r.pcr)
            .bind(r.pcr_change_1d)
            .bind(r.volume_times)
            .bind(r.delivery_times)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Distinct trading dates, ascending. `limit = Some(n)` keeps the most recent n.
    pub async fn list_dates(&self, limit: Option<i64>) -> DbResult<Vec<String>> {
        // LIMIT -1 is "no limit" in SQLite
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT date FROM derivative_snapshots ORDER BY date DESC LIMIT ?",
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(self.pool)
        .await?;

        let mut dates: Vec<String> = rows.into_iter().map(|(d,)| d).collect();
        dates.reverse();
        Ok(dates)
    }

    /// Most recent trading date, if any data exists
    pub async fn latest_date(&self) -> DbResult<Option<String>> {
        // MAX over an empty table yields one NULL row
        let row: (Option<String>,) = sqlx::query_as("SELECT MAX(date) FROM derivative_snapshots")
            .fetch_one(self.pool)
            .await?;
        Ok(row.0)
    }

    /// All symbols ever recorded, alphabetical
    pub async fn get_symbols(&self) -> DbResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT symbol FROM derivative_snapshots ORDER BY symbol")
                .fetch_all(self.pool)
                .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    /// Every snapshot on any of `dates`
    pub async fn get_for_dates(&self, dates: &[String]) -> DbResult<Vec<SnapshotRecord>> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM derivative_snapshots WHERE date IN ({}) ORDER BY date, symbol",
            placeholders(dates.len())
        );
        let mut query = sqlx::query_as::<_, SnapshotRecord>(&sql);
        for d in dates {
            query = query.bind(d);
        }

        Ok(query.fetch_all(self.pool).await?)
    }

    /// History of one symbol, ascending by date
    pub async fn get_symbol_history(
        &self,
        symbol: &str,
        limit: i64,
    ) -> DbResult<Vec<SnapshotRecord>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM derivative_snapshots WHERE symbol = ? ORDER BY date DESC LIMIT ?"
        );
        let mut records = sqlx::query_as::<_, SnapshotRecord>(&sql)
            .bind(symbol)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn record(date: &str, symbol: &str, pcr: f64) -> SnapshotRecord {
        SnapshotRecord {
            date: date.to_string(),
            symbol: symbol.to_string(),
            sector: Some("Banking".to_string()),
            oi_trend: Some("NewLong".to_string()),
            close: Some(100.0),
            pcr: Some(pcr),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_dates_ascending_with_limit() {
        let db = Database::in_memory().await.unwrap();
        let repo = SnapshotRepository::new(db.pool());
        repo.upsert_many(&[
            record("2025-01-03", "AAA", 0.8),
            record("2025-01-01", "AAA", 0.8),
            record("2025-01-02", "AAA", 0.8),
            record("2025-01-02", "BBB", 0.9),
        ])
        .await
        .unwrap();

        let all = repo.list_dates(None).await.unwrap();
        assert_eq!(all, vec!["2025-01-01", "2025-01-02", "2025-01-03"]);

        let last_two = repo.list_dates(Some(2)).await.unwrap();
        assert_eq!(last_two, vec!["2025-01-02", "2025-01-03"]);

        assert_eq!(
            repo.latest_date().await.unwrap().as_deref(),
            Some("2025-01-03")
        );
        assert_eq!(repo.get_symbols().await.unwrap(), vec!["AAA", "BBB"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_date_symbol() {
        let db = Database::in_memory().await.unwrap();
        let repo = SnapshotRepository::new(db.pool());
        repo.upsert_many(&[record("2025-01-01", "AAA", 0.8)])
            .await
            .unwrap();
        repo.upsert_many(&[record("2025-01-01", "AAA", 1.3)])
            .await
            .unwrap();

        let rows = repo
            .get_for_dates(&["2025-01-01".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pcr, Some(1.3));
        assert_eq!(rows[0].volume_times, None);
    }

    #[tokio::test]
    async fn test_get_for_dates_filters_and_handles_empty() {
        let db = Database::in_memory().await.unwrap();
        let repo = SnapshotRepository::new(db.pool());
        repo.upsert_many(&[
            record("2025-01-01", "AAA", 0.8),
            record("2025-01-02", "AAA", 0.8),
            record("2025-01-03", "AAA", 0.8),
        ])
        .await
        .unwrap();

        assert!(repo.get_for_dates(&[]).await.unwrap().is_empty());
        let rows = repo
            .get_for_dates(&["2025-01-01".to_string(), "2025-01-03".to_string()])
            .await
            .unwrap();
        let dates: Vec<&str> = rows.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-01-01", "2025-01-03"]);

        let history = repo.get_symbol_history("AAA", 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].date, "2025-01-03");
    }
}
