//! Core types: snapshots, bars, trend and market-cap categories, backtest reports

use std::collections::BTreeMap;

use chrono::NaiveDate;
use persistence::repository::{OhlcRecord, SnapshotRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::MAX_GAP_PCT;

/// Futures open-interest positioning reported for a symbol on a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OiTrend {
    NewLong,
    NewShort,
    ShortCover,
    LongCover,
    Neutral,
    /// Missing or unrecognised label; scores as 0 everywhere
    Unknown,
}

impl OiTrend {
    /// Parse a stored label. `Aggressive*` variants collapse onto their base form.
    pub fn parse(raw: &str) -> Self {
        let label = raw.trim();
        let label = label.strip_prefix("Aggressive").unwrap_or(label);
        match label {
            "NewLong" => Self::NewLong,
            "NewShort" => Self::NewShort,
            "ShortCover" => Self::ShortCover,
            "LongCover" => Self::LongCover,
            "Neutral" => Self::Neutral,
            _ => Self::Unknown,
        }
    }

    /// NewLong or ShortCover
    pub fn is_bullish(&self) -> bool {
        matches!(self, Self::NewLong | Self::ShortCover)
    }

    /// NewShort or LongCover. Neutral is neither.
    pub fn is_bearish(&self) -> bool {
        matches!(self, Self::NewShort | Self::LongCover)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewLong => "NewLong",
            Self::NewShort => "NewShort",
            Self::ShortCover => "ShortCover",
            Self::LongCover => "LongCover",
            Self::Neutral => "Neutral",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for OiTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Market capitalisation bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum McapCategory {
    #[serde(rename = "Large Cap")]
    Large,
    #[serde(rename = "Mid Cap")]
    Mid,
    #[serde(rename = "Small Cap")]
    Small,
    Unknown,
}

impl McapCategory {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Large Cap" => Self::Large,
            "Mid Cap" => Self::Mid,
            "Small Cap" => Self::Small,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Large => "Large Cap",
            Self::Mid => "Mid Cap",
            Self::Small => "Small Cap",
            Self::Unknown => "Unknown",
        }
    }
}

/// Market-cap filter used by sector rotation, the action sheet and alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum McapFilter {
    #[default]
    All,
    #[serde(rename = "Large Cap")]
    Large,
    #[serde(rename = "Mid Cap")]
    Mid,
    #[serde(rename = "Small Cap")]
    Small,
}

impl McapFilter {
    pub fn parse(raw: &str) -> Self {
        match McapCategory::parse(raw) {
            McapCategory::Large => Self::Large,
            McapCategory::Mid => Self::Mid,
            McapCategory::Small => Self::Small,
            McapCategory::Unknown => Self::All,
        }
    }

    pub fn matches(&self, category: McapCategory) -> bool {
        match self {
            Self::All => true,
            Self::Large => category == McapCategory::Large,
            Self::Mid => category == McapCategory::Mid,
            Self::Small => category == McapCategory::Small,
        }
    }
}

impl std::fmt::Display for McapFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Large => write!(f, "Large Cap"),
            Self::Mid => write!(f, "Mid Cap"),
            Self::Small => write!(f, "Small Cap"),
        }
    }
}

/// One symbol on one trading date. Absent numeric fields are 0, absent text is "".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub symbol: String,
    pub stock_name: String,
    pub sector: String,
    pub industry: String,
    pub mcap_category: McapCategory,
    pub lot_size: u32,
    pub close: f64,
    /// Percent vs prior close
    pub change_pct: f64,
    pub oi_trend: OiTrend,
    pub cumulative_future_oi: f64,
    pub oi_change_pct: f64,
    pub cumulative_call_oi: f64,
    pub cumulative_put_oi: f64,
    pub pcr: f64,
    pub pcr_change_1d: f64,
    /// Volume as a multiple of its trailing average
    pub volume_times: f64,
    /// Delivery as a multiple of its trailing average
    pub delivery_times: f64,
}

impl Snapshot {
    /// Neutral snapshot: every metric 0, trend and cap `Unknown`
    pub fn new(date: NaiveDate, symbol: impl Into<String>) -> Self {
        Self {
            date,
            symbol: symbol.into(),
            stock_name: String::new(),
            sector: String::new(),
            industry: String::new(),
            mcap_category: McapCategory::Unknown,
            lot_size: 0,
            close: 0.0,
            change_pct: 0.0,
            oi_trend: OiTrend::Unknown,
            cumulative_future_oi: 0.0,
            oi_change_pct: 0.0,
            cumulative_call_oi: 0.0,
            cumulative_put_oi: 0.0,
            pcr: 0.0,
            pcr_change_1d: 0.0,
            volume_times: 0.0,
            delivery_times: 0.0,
        }
    }

    /// Sector label used for grouping; blank sectors collapse into "?"
    pub fn sector_key(&self) -> &str {
        if self.sector.is_empty() {
            "?"
        } else {
            &self.sector
        }
    }

    /// Convert a stored record, applying field defaults. Fails only on an unparseable date.
    pub fn from_record(record: SnapshotRecord) -> Result<Self, chrono::ParseError> {
        let date = parse_date(&record.date)?;
        let num = |v: Option<f64>| v.filter(|x| x.is_finite()).unwrap_or(0.0);

        Ok(Self {
            date,
            symbol: record.symbol,
            stock_name: record.stock_name.unwrap_or_default(),
            sector: record.sector.unwrap_or_default(),
            industry: record.industry.unwrap_or_default(),
            mcap_category: McapCategory::parse(record.mcap_category.as_deref().unwrap_or("")),
            lot_size: record
                .lot_size
                .and_then(|l| u32::try_from(l).ok())
                .unwrap_or(0),
            close: num(record.close),
            change_pct: num(record.change_pct),
            oi_trend: OiTrend::parse(record.oi_trend.as_deref().unwrap_or("")),
            cumulative_future_oi: num(record.cumulative_future_oi),
            oi_change_pct: num(record.oi_change_pct),
            cumulative_call_oi: num(record.cumulative_call_oi),
            cumulative_put_oi: num(record.cumulative_put_oi),
            pcr: num(record.pcr),
            pcr_change_1d: num(record.pcr_change_1d),
            volume_times: num(record.volume_times),
            delivery_times: num(record.delivery_times),
        })
    }
}

/// End-of-day bar. `open <= 0` marks the bar as missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl OhlcBar {
    pub fn is_valid(&self) -> bool {
        self.open > 0.0
    }
}

impl From<&OhlcRecord> for OhlcBar {
    fn from(r: &OhlcRecord) -> Self {
        Self {
            open: r.open.unwrap_or(0.0),
            high: r.high.unwrap_or(0.0),
            low: r.low.unwrap_or(0.0),
            close: r.close.unwrap_or(0.0),
        }
    }
}

// ============================================================================
// Backtest types
// ============================================================================

/// Configuration for a top-N walk-forward backtest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Picks taken per signal date
    pub top_n: usize,
    /// Holding period in trading days
    pub hold: usize,
    /// Notional deployed per trade
    pub capital: Decimal,
    /// Open-vs-close gap (%) above which a price is bad data
    pub max_gap_pct: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            hold: 1,
            capital: Decimal::from(100_000),
            max_gap_pct: MAX_GAP_PCT,
        }
    }
}

/// A single trade executed during backtest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub signal_date: NaiveDate,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub symbol: String,
    pub score: i32,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub shares: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
}

/// A point on the equity curve (cumulative P&L after a signal date)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: Decimal,
}

/// Per-calendar-month rollup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStats {
    pub pnl: Decimal,
    pub trades: u32,
    pub wins: u32,
}

/// Result of a backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub trades: Vec<TradeRecord>,
    pub equity: Vec<EquityPoint>,
    pub total_trades: u32,
    pub total_pnl: Decimal,
    pub return_pct: Decimal,
    pub win_rate: Decimal,
    pub profit_factor: Decimal,
    pub avg_win_pct: Decimal,
    pub avg_loss_pct: Decimal,
    pub max_dd: Decimal,
    /// Keyed `YYYY-MM`
    pub monthly: BTreeMap<String, MonthlyStats>,
}

impl BacktestResult {
    /// Well-formed report with every metric at zero
    pub fn empty(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            trades: Vec::new(),
            equity: Vec::new(),
            total_trades: 0,
            total_pnl: Decimal::ZERO,
            return_pct: Decimal::ZERO,
            win_rate: Decimal::ZERO,
            profit_factor: Decimal::ZERO,
            avg_win_pct: Decimal::ZERO,
            avg_loss_pct: Decimal::ZERO,
            max_dd: Decimal::ZERO,
            monthly: BTreeMap::new(),
        }
    }
}

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
}

/// Round to `dp` decimal places
pub(crate) fn round_to(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}
