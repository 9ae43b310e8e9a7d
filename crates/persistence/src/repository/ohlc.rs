//! OHLC repository — end-of-day bars per symbol

use super::snapshots::placeholders;
use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A stored end-of-day bar
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct OhlcRecord {
    pub symbol: String,
    pub date: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

/// Repository for OHLC bars
pub struct OhlcRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OhlcRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace bars (keyed by symbol + date). Returns rows written.
    pub async fn upsert_many(&self, bars: &[OhlcRecord]) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;

        for bar in bars {
            let result = sqlx::query(
                r#"INSERT INTO ohlc_bars (symbol, date, open, high, low, close)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(symbol, date) DO UPDATE SET
                     open = excluded.open,
                     high = excluded.high,
                     low = excluded.low,
                     close = excluded.close
                "#,
            )
            .bind(&bar.symbol)
            .bind(&bar.date)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Bars of `symbol` on any of `dates`, ascending
    pub async fn get_bars(&self, symbol: &str, dates: &[String]) -> DbResult<Vec<OhlcRecord>> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT symbol, date, open, high, low, close FROM ohlc_bars \
             WHERE symbol = ? AND date IN ({}) ORDER BY date",
            placeholders(dates.len())
        );
        let mut query = sqlx::query_as::<_, OhlcRecord>(&sql).bind(symbol);
        for d in dates {
            query = query.bind(d);
        }

        Ok(query.fetch_all(self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_get_bars_by_symbol_and_dates() {
        let db = Database::in_memory().await.unwrap();
        let repo = OhlcRepository::new(db.pool());
        let bar = |symbol: &str, date: &str, open: f64| OhlcRecord {
            symbol: symbol.to_string(),
            date: date.to_string(),
            open: Some(open),
            high: Some(open + 2.0),
            low: Some(open - 2.0),
            close: Some(open + 1.0),
        };
        repo.upsert_many(&[
            bar("AAA", "2025-01-01", 100.0),
            bar("AAA", "2025-01-02", 101.0),
            bar("BBB", "2025-01-01", 50.0),
        ])
        .await
        .unwrap();

        let bars = repo
            .get_bars("AAA", &["2025-01-02".to_string(), "2025-01-05".to_string()])
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open, Some(101.0));

        assert!(repo.get_bars("AAA", &[]).await.unwrap().is_empty());
    }
}
