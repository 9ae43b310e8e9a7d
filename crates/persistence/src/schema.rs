//! Database schema definitions

/// SQL to create all tables
/// NOTE: dates are stored as ISO `YYYY-MM-DD` TEXT so lexical order is chronological
pub const CREATE_TABLES: &str = r#"
-- One row per symbol per trading date (derivatives snapshot)
CREATE TABLE IF NOT EXISTS derivative_snapshots (
    date TEXT NOT NULL,
    symbol TEXT NOT NULL,
    stock_name TEXT,
    sector TEXT,
    mcap_category TEXT,
    close REAL,
    change_pct REAL,
    oi_trend TEXT,
    cumulative_future_oi REAL,
    oi_change_pct REAL,
    cumulative_call_oi REAL,
    cumulative_put_oi REAL,
    pcr REAL,
    pcr_change_1d REAL,
    volume_times REAL,
    delivery_times REAL,
    imported_at INTEGER DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (date, symbol)
);

-- End-of-day price bars
CREATE TABLE IF NOT EXISTS ohlc_bars (
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL,
    high REAL,
    low REAL,
    close REAL,
    PRIMARY KEY (symbol, date)
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_snapshots_symbol ON derivative_snapshots(symbol, date);
CREATE INDEX IF NOT EXISTS idx_snapshots_date ON derivative_snapshots(date)
"#;

/// Column additions applied after CREATE_TABLES ("duplicate column name" is tolerated)
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE derivative_snapshots ADD COLUMN industry TEXT",
    "ALTER TABLE derivative_snapshots ADD COLUMN lot_size INTEGER",
];
