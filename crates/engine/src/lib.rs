//! OI Pulse Engine — scoring, signals, sector rotation and backtesting
//!
//! Pure analytics over daily derivatives snapshots.
//! Provides:
//! - Directional score and outrunner conviction per snapshot
//! - Trend-flip, PCR, delivery, streak and call/put signal detectors
//! - Sector rotation with a weighted composite direction
//! - Action sheet / top-picks recommender
//! - Walk-forward backtesting over pluggable pick strategies

pub mod cache;
pub mod config;
pub mod engine;
pub mod outrunner;
pub mod recommender;
pub mod scorer;
pub mod sector;
pub mod signals;
pub mod strategy;
pub mod types;

use thiserror::Error;

/// Engine-level errors. Market-data gaps never surface here; only the store does.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Data store error: {0}")]
    Db(#[from] persistence::DbError),

    #[error("No trading dates loaded")]
    NoDates,

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
}

// Re-exports for convenience
pub use cache::{load, CacheHandle, DataCache, SnapshotSource, SqliteSnapshotSource};
pub use config::ScreenConfig;
pub use engine::{run_backtest, BacktestEngine};
pub use outrunner::{analyze_outrunners, OutrunnerConfig, OutrunnerReport};
pub use recommender::{
    get_action_sheet, get_historical_top7_performance, get_top_picks, ActionRow,
    ActionSheetParams, HistoricalPerformance,
};
pub use scorer::{
    base_score, outrunner_conviction, score_breakdown, trade_suggestion, Conviction,
    ScoreFactor, TradeSuggestion,
};
pub use sector::{sector_rotation, Direction, SectorRow};
pub use signals::{
    call_put_divergence, daily_summary, delivery_spikes, detect_trend_flips,
    enrich_oi_change_pct, oi_divergences, pcr_extremes, score_streaks, signal_convergence,
    CallPutSignal, ConvergentSignal, OiChange,
};
pub use strategy::{get_catalog, Candidate, Strategy, StrategyCatalogEntry, StrategyId};
pub use types::*;
