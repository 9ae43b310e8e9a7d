//! OI Pulse — derivatives snapshot scoring, signals and backtesting
//!
//! Usage:
//!   oi-pulse serve --port 3001                 — Launch the JSON API
//!   oi-pulse summary                           — Print today's market summary
//!   oi-pulse picks --top-n 7 --mcap "Mid Cap"  — Print the top picks
//!   oi-pulse backtest --strategy sweet_spot    — Walk-forward backtest
//!   oi-pulse outrunners                        — Next-day move analysis of picks

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use engine::recommender::{DEFAULT_LOOKBACK_DAYS, DEFAULT_TOP_N};
use engine::sector::DEFAULT_WINDOW;
use engine::signals::{DELIVERY_SPIKE, HIGH_PCR, LOW_PCR, STREAK_DAYS};
use engine::{
    analyze_outrunners, base_score, call_put_divergence, daily_summary, delivery_spikes,
    detect_trend_flips, enrich_oi_change_pct, get_action_sheet, get_catalog,
    get_historical_top7_performance, get_top_picks, oi_divergences, outrunner_conviction,
    pcr_extremes, run_backtest, score_breakdown, score_streaks, sector_rotation,
    trade_suggestion, ActionRow, ActionSheetParams, BacktestConfig, BacktestResult, CacheHandle,
    DataCache, McapFilter, OutrunnerConfig, OutrunnerReport, ScreenConfig, Snapshot,
    SqliteSnapshotSource, StrategyId,
};
use persistence::repository::SnapshotRepository;
use persistence::Database;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "oi-pulse")]
#[command(about = "Derivatives snapshot scoring, signals and backtesting", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Load only the most recent N trading days (default: all)
    #[arg(long, global = true)]
    days: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the JSON API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3001)]
        port: u16,
    },
    /// Print the daily summary and sector dashboard
    Summary {
        /// Sector lookback in trading days
        #[arg(long, default_value_t = DEFAULT_WINDOW)]
        window: usize,
    },
    /// Print the top picks for a date
    Picks {
        /// Number of picks
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,
        /// Market-cap filter: All, "Large Cap", "Mid Cap", "Small Cap"
        #[arg(long, default_value = "All")]
        mcap: String,
        /// View date (YYYY-MM-DD), latest when omitted
        #[arg(long)]
        date: Option<String>,
        /// Optional JSON export path
        #[arg(long)]
        export: Option<String>,
    },
    /// Run a walk-forward backtest
    Backtest {
        /// Strategy: baseline, sweet_spot, outrunner_conviction, confirmed
        #[arg(long, default_value = "sweet_spot")]
        strategy: String,
        /// Picks per signal date
        #[arg(long, default_value_t = 3)]
        top_n: usize,
        /// Holding period in trading days
        #[arg(long, default_value_t = 1)]
        hold: usize,
        /// Capital allocated to every trade
        #[arg(long, default_value_t = 100_000)]
        capital: u64,
        /// Optional JSON export path
        #[arg(long)]
        export: Option<String>,
    },
    /// Classify next-day intraday moves of the daily picks
    Outrunners {
        /// Picks per day
        #[arg(long, default_value_t = 3)]
        top_n: usize,
    },
}

#[derive(Clone)]
struct AppState {
    db: Arc<Database>,
    cache: Arc<CacheHandle>,
    screen: Arc<ScreenConfig>,
    days: Option<usize>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,oi_pulse=debug")
    } else {
        EnvFilter::new("info,engine=info,oi_pulse=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&host, port, cli.days).await?;
        }
        Commands::Summary { window } => {
            cmd_summary(window, cli.days).await?;
        }
        Commands::Picks {
            top_n,
            mcap,
            date,
            export,
        } => {
            cmd_picks(top_n, &mcap, date, export, cli.days).await?;
        }
        Commands::Backtest {
            strategy,
            top_n,
            hold,
            capital,
            export,
        } => {
            cmd_backtest(&strategy, top_n, hold, capital, export, cli.days).await?;
        }
        Commands::Outrunners { top_n } => {
            cmd_outrunners(top_n, cli.days).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Startup helpers
// ============================================================================

async fn open_db() -> anyhow::Result<(Database, String)> {
    let db_path =
        std::env::var("OI_PULSE_DB_PATH").unwrap_or_else(|_| "data/oi_pulse.db".to_string());
    let db = Database::new(&db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    info!("Database opened: {}", db_path);
    Ok((db, db_path))
}

async fn load_cache(db: &Database, days: Option<usize>) -> anyhow::Result<DataCache> {
    let cache = engine::load(&SqliteSnapshotSource::new(db), days)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load snapshots: {}", e))?;
    if cache.is_empty() {
        warn!("No snapshots in store; results will be empty");
    }
    Ok(cache)
}

/// Requested view date, or the latest loaded date
fn resolve_view_date(cache: &DataCache, raw: Option<&str>) -> Result<NaiveDate, String> {
    cache.resolve_view_date(raw).map_err(|e| e.to_string())
}

fn parse_mcap(raw: Option<&String>) -> McapFilter {
    raw.map(|s| McapFilter::parse(s)).unwrap_or_default()
}

fn write_export(path: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, &json)?;
    println!("\nResults exported to {}", path);
    Ok(())
}

// ============================================================================
// Serve command
// ============================================================================

async fn cmd_serve(host: &str, port: u16, days: Option<usize>) -> anyhow::Result<()> {
    info!("OI Pulse v{} starting...", APP_VERSION);

    let (db, db_path) = open_db().await?;
    let cache = load_cache(&db, days).await?;

    let state = AppState {
        db: Arc::new(db),
        cache: Arc::new(CacheHandle::new(cache)),
        screen: Arc::new(ScreenConfig::default()),
        days,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/summary", get(api_summary))
        .route("/sectors", get(api_sectors))
        .route("/action-sheet", get(api_action_sheet))
        .route("/top-picks", get(api_top_picks))
        .route("/alerts", get(api_alerts))
        .route("/history", get(api_history))
        .route("/stock/:symbol", get(api_stock))
        .route("/strategies", get(api_strategies))
        .route("/backtest", get(api_backtest))
        .route("/outrunners", get(api_outrunners))
        .route("/reload", post(api_reload))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== OI Pulse v{} ===", APP_VERSION);
    println!("Derivatives Signal Server");
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health              - Health check");
    println!("  GET  /api/summary             - Daily market summary");
    println!("  GET  /api/sectors             - Sector rotation dashboard");
    println!("  GET  /api/action-sheet        - Ranked action sheet");
    println!("  GET  /api/top-picks           - Top sweet-spot picks");
    println!("  GET  /api/alerts              - Flips, PCR extremes, spikes, streaks");
    println!("  GET  /api/history             - Past top-pick performance");
    println!("  GET  /api/stock/:symbol       - Symbol history and score detail");
    println!("  GET  /api/strategies          - Backtestable strategies");
    println!("  GET  /api/backtest            - Run a backtest");
    println!("  GET  /api/outrunners          - Next-day move analysis");
    println!("  POST /api/reload              - Reload snapshots from the store");
    println!("\n  Database: {}", db_path);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// CLI commands
// ============================================================================

async fn cmd_summary(window: usize, days: Option<usize>) -> anyhow::Result<()> {
    println!("\n=== OI Pulse v{} ===", APP_VERSION);
    let (db, _) = open_db().await?;
    let cache = load_cache(&db, days).await?;

    println!(
        "\n{}",
        daily_summary(&cache, cache.dates(), &ScreenConfig::default())
    );

    let rows = sector_rotation(&cache, cache.dates(), window, McapFilter::All);
    if rows.is_empty() {
        return Ok(());
    }

    println!("\nSector rotation ({}-day window):", window);
    println!(
        "  {:<24} {:>6} {:>8} {:>8} {:>8} {:>6} {:>7}  {}",
        "Sector", "Stocks", "Chg%", "Bull%", "Vol", "PCR", "Score", "Direction"
    );
    println!("  {}", "-".repeat(85));
    for r in &rows {
        println!(
            "  {:<24} {:>6} {:>+8.2} {:>8.1} {:>8.2} {:>6.2} {:>+7.3}  {}",
            r.sector,
            r.stock_count,
            r.agg_chg_pct,
            r.bull_pct,
            r.vol,
            r.pcr,
            r.direction_score,
            r.direction,
        );
    }

    Ok(())
}

async fn cmd_picks(
    top_n: usize,
    mcap: &str,
    date: Option<String>,
    export: Option<String>,
    days: Option<usize>,
) -> anyhow::Result<()> {
    println!("\n=== OI Pulse v{} ===", APP_VERSION);
    let (db, _) = open_db().await?;
    let cache = load_cache(&db, days).await?;

    let view_date = cache.resolve_view_date(date.as_deref())?;
    let mcap_filter = McapFilter::parse(mcap);
    let picks = get_top_picks(
        &cache,
        cache.dates(),
        view_date,
        mcap_filter,
        top_n,
        &ScreenConfig::default(),
    );

    if picks.is_empty() {
        println!("\nNo picks for {}.", view_date);
        return Ok(());
    }
    print_picks(&picks, view_date, mcap_filter);

    if let Some(export_path) = export {
        let export_data = serde_json::json!({
            "generated_at": Utc::now().to_rfc3339(),
            "date": view_date,
            "mcap_filter": mcap_filter,
            "picks": picks,
        });
        write_export(&export_path, &export_data)?;
    }

    Ok(())
}

fn print_picks(picks: &[ActionRow], date: NaiveDate, mcap_filter: McapFilter) {
    println!("\nTop {} picks for {} ({}):", picks.len(), date, mcap_filter);
    println!(
        "  {:>3}  {:<14} {:>5} {:>5} {:>5} {:>10} {:>7} {:<18} {:<10}",
        "#", "Symbol", "Rec", "Conv", "Score", "Close", "Chg%", "Trend", "Trade"
    );
    println!("  {}", "-".repeat(86));
    for (i, p) in picks.iter().enumerate() {
        println!(
            "  {:>3}  {:<14} {:>5} {:>5} {:>5} {:>10.2} {:>+7.2} {:<18} {:<10?}",
            i + 1,
            p.symbol,
            p.rec_score,
            p.conviction,
            p.score,
            p.close,
            p.change_pct,
            p.oi_trend.to_string(),
            p.suggestion.kind,
        );
    }
}

async fn cmd_backtest(
    strategy: &str,
    top_n: usize,
    hold: usize,
    capital: u64,
    export: Option<String>,
    days: Option<usize>,
) -> anyhow::Result<()> {
    println!("\n=== OI Pulse v{} ===", APP_VERSION);
    let id: StrategyId = strategy.parse()?;
    let (db, _) = open_db().await?;
    let cache = load_cache(&db, days).await?;

    let screen = ScreenConfig::default();
    let config = BacktestConfig {
        top_n,
        hold,
        capital: Decimal::from(capital),
        max_gap_pct: screen.max_gap_pct,
    };
    let result = run_backtest(&cache, id.build(&screen).as_ref(), &config);
    print_backtest(&result, id);

    if let Some(export_path) = export {
        let export_data = serde_json::json!({
            "generated_at": Utc::now().to_rfc3339(),
            "config": config,
            "result": result,
        });
        write_export(&export_path, &export_data)?;
    }

    Ok(())
}

fn print_backtest(result: &BacktestResult, id: StrategyId) {
    println!("\nBacktest: {}", id.display_name());
    println!("  Trades:        {}", result.total_trades);
    println!("  Total P&L:     {:+.2}", result.total_pnl);
    println!("  Return:        {:+.2}%", result.return_pct);
    println!("  Win rate:      {:.2}%", result.win_rate);
    println!("  Profit factor: {:.2}", result.profit_factor);
    println!("  Avg win:       {:+.2}%", result.avg_win_pct);
    println!("  Avg loss:      {:+.2}%", result.avg_loss_pct);
    println!("  Max drawdown:  {:.2}", result.max_dd);

    if result.monthly.is_empty() {
        return;
    }
    println!("\n  {:<8} {:>7} {:>6} {:>14}", "Month", "Trades", "Wins", "P&L");
    println!("  {}", "-".repeat(38));
    for (month, stats) in &result.monthly {
        println!(
            "  {:<8} {:>7} {:>6} {:>+14.2}",
            month, stats.trades, stats.wins, stats.pnl
        );
    }
}

async fn cmd_outrunners(top_n: usize, days: Option<usize>) -> anyhow::Result<()> {
    println!("\n=== OI Pulse v{} ===", APP_VERSION);
    let (db, _) = open_db().await?;
    let cache = load_cache(&db, days).await?;

    let config = OutrunnerConfig {
        top_n,
        ..Default::default()
    };
    let report = analyze_outrunners(&cache, &config, &ScreenConfig::default());
    print_outrunners(&report, &config);
    Ok(())
}

fn print_outrunners(report: &OutrunnerReport, config: &OutrunnerConfig) {
    if report.total_picks == 0 {
        println!("\nNo measurable picks.");
        return;
    }

    println!("\nOutrunner analysis (top {} per day):", config.top_n);
    println!("  Picks:       {}", report.total_picks);
    println!(
        "  Outrunners:  {} ({:.1}%)  >= {}% from open",
        report.outrunners, report.outrunner_rate, config.outrunner_pct
    );
    println!(
        "  Moderates:   {} ({:.1}%)  >= {}%",
        report.moderates, report.moderate_rate, config.moderate_pct
    );
    println!("  Duds:        {} ({:.1}%)", report.duds, report.dud_rate);
    println!("  Actionable:  {:.1}%", report.actionable_rate);
    println!(
        "  Closed green: {} ({:.1}%)",
        report.direction_ok, report.direction_rate
    );

    if let (Some(all), Some(base)) = (report.all, report.random_baseline) {
        println!("\n  {:<10} {:>6} {:>7} {:>7} {:>7}", "Group", "Count", "Up%", "Down%", "Range%");
        println!("  {}", "-".repeat(42));
        for (label, m) in [("Picks", all), ("Baseline", base)] {
            println!(
                "  {:<10} {:>6} {:>7.2} {:>7.2} {:>7.2}",
                label, m.count, m.up, m.down, m.range
            );
        }
    }
    if let Some(edge) = report.edge_pct {
        println!("\n  Edge vs baseline: {:+.2}% range", edge);
    }
}

// ============================================================================
// API Handlers — Dashboard
// ============================================================================

/// GET /api/health
async fn api_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cache = state.cache.current();
    Json(serde_json::json!({
        "status": "ok",
        "service": "oi-pulse",
        "version": APP_VERSION,
        "dates": cache.dates().len(),
        "latest_date": cache.latest_date(),
    }))
}

/// GET /api/summary — plain-text daily summary
async fn api_summary(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let cache = state.cache.current();
    let view_date = match resolve_view_date(&cache, params.get("date").map(|s| s.as_str())) {
        Ok(d) => d,
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e })),
    };

    Json(serde_json::json!({
        "success": true,
        "date": view_date,
        "summary": daily_summary(&cache, cache.dates_up_to(view_date), &state.screen),
    }))
}

/// GET /api/sectors — sector rotation dashboard (?window=5&mcap=Mid%20Cap)
async fn api_sectors(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let window: usize = params
        .get("window")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_WINDOW);
    let mcap_filter = parse_mcap(params.get("mcap"));

    let cache = state.cache.current();
    let view_date = match resolve_view_date(&cache, params.get("date").map(|s| s.as_str())) {
        Ok(d) => d,
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e, "data": [] })),
    };
    let rows = sector_rotation(&cache, cache.dates_up_to(view_date), window, mcap_filter);

    Json(serde_json::json!({
        "success": true,
        "date": view_date,
        "window": window,
        "mcap_filter": mcap_filter,
        "data": rows,
        "total": rows.len(),
    }))
}

#[derive(Deserialize)]
struct ActionSheetQuery {
    date: Option<String>,
    mcap: Option<String>,
    #[serde(default)]
    min_conviction: i32,
    #[serde(default)]
    min_score: i32,
    /// Comma-separated symbols
    watchlist: Option<String>,
    #[serde(default)]
    sweet_spot_only: bool,
}

/// GET /api/action-sheet — full ranked list with filters
async fn api_action_sheet(
    State(state): State<AppState>,
    Query(query): Query<ActionSheetQuery>,
) -> Json<serde_json::Value> {
    let cache = state.cache.current();
    let view_date = match resolve_view_date(&cache, query.date.as_deref()) {
        Ok(d) => d,
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e, "data": [] })),
    };

    let watchlist: Option<BTreeSet<String>> = query.watchlist.as_deref().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    });
    let params = ActionSheetParams {
        mcap_filter: parse_mcap(query.mcap.as_ref()),
        min_conviction: query.min_conviction,
        min_score: query.min_score,
        watchlist,
        sweet_spot_only: query.sweet_spot_only,
    };

    let rows = get_action_sheet(&cache, cache.dates(), view_date, &params, &state.screen);
    Json(serde_json::json!({
        "success": true,
        "date": view_date,
        "filters": params,
        "data": rows,
        "total": rows.len(),
    }))
}

/// GET /api/top-picks — top N sweet-spot picks (?top_n=7&mcap=All&date=)
async fn api_top_picks(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let top_n: usize = params
        .get("top_n")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TOP_N);
    let mcap_filter = parse_mcap(params.get("mcap"));

    let cache = state.cache.current();
    let view_date = match resolve_view_date(&cache, params.get("date").map(|s| s.as_str())) {
        Ok(d) => d,
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e, "data": [] })),
    };

    let picks = get_top_picks(&cache, cache.dates(), view_date, mcap_filter, top_n, &state.screen);
    Json(serde_json::json!({
        "success": true,
        "date": view_date,
        "mcap_filter": mcap_filter,
        "data": picks,
        "total": picks.len(),
    }))
}

/// GET /api/alerts — every detector for the view date
async fn api_alerts(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let cache = state.cache.current();
    let view_date = match resolve_view_date(&cache, params.get("date").map(|s| s.as_str())) {
        Ok(d) => d,
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e })),
    };
    let dates = cache.dates_up_to(view_date);

    Json(serde_json::json!({
        "success": true,
        "date": view_date,
        "trend_flips": detect_trend_flips(&cache, dates),
        "pcr_extremes": pcr_extremes(&cache, dates, LOW_PCR, HIGH_PCR),
        "delivery_spikes": delivery_spikes(&cache, dates, DELIVERY_SPIKE),
        "score_streaks": score_streaks(
            &cache,
            dates,
            STREAK_DAYS,
            state.screen.sweet_spot_lo,
            state.screen.sweet_spot_hi,
        ),
        "oi_divergences": oi_divergences(&cache, dates),
    }))
}

/// GET /api/history — next-day outcome of past top picks (?lookback=5)
async fn api_history(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let lookback: usize = params
        .get("lookback")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_LOOKBACK_DAYS);

    let cache = state.cache.current();
    let performance =
        get_historical_top7_performance(&cache, cache.dates(), lookback, &state.screen);

    Json(serde_json::json!({
        "success": true,
        "lookback_days": lookback,
        "data": performance,
    }))
}

/// GET /api/stock/:symbol — stored history plus score detail for the latest day
async fn api_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let limit: i64 = params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);
    let symbol = symbol.to_uppercase();

    let repo = SnapshotRepository::new(state.db.pool());
    let records = match repo.get_symbol_history(&symbol, limit).await {
        Ok(records) => records,
        Err(e) => {
            return Json(serde_json::json!({
                "success": false,
                "error": format!("Failed to query history for {}: {}", symbol, e),
            }))
        }
    };

    let history: Vec<Snapshot> = records
        .into_iter()
        .filter_map(|r| match Snapshot::from_record(r) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Skipping malformed snapshot");
                None
            }
        })
        .collect();

    let Some(latest) = history.last() else {
        return Json(serde_json::json!({
            "success": false,
            "error": format!("No snapshots for {}", symbol),
        }));
    };
    let prev = history.len().checked_sub(2).map(|i| &history[i]);

    let breakdown: Vec<serde_json::Value> = score_breakdown(latest)
        .into_iter()
        .map(|(factor, points)| {
            serde_json::json!({ "factor": factor.label(), "points": points })
        })
        .collect();

    Json(serde_json::json!({
        "success": true,
        "symbol": symbol,
        "latest": latest,
        "score": base_score(latest),
        "breakdown": breakdown,
        "conviction": outrunner_conviction(latest),
        "suggestion": trade_suggestion(latest),
        "oi_change": enrich_oi_change_pct(latest, prev),
        "call_put_signal": call_put_divergence(latest, prev),
        "history": history,
    }))
}

// ============================================================================
// API Handlers — Backtesting
// ============================================================================

/// GET /api/strategies
async fn api_strategies() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": get_catalog(),
    }))
}

#[derive(Deserialize)]
struct BacktestQuery {
    #[serde(default = "default_strategy")]
    strategy: String,
    top_n: Option<usize>,
    hold: Option<usize>,
    capital: Option<u64>,
}

fn default_strategy() -> String {
    StrategyId::SweetSpot.as_str().to_string()
}

/// GET /api/backtest — run a backtest over the loaded cache
async fn api_backtest(
    State(state): State<AppState>,
    Query(query): Query<BacktestQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let id: StrategyId = match query.strategy.parse() {
        Ok(id) => id,
        Err(e) => {
            return Ok(Json(serde_json::json!({
                "success": false,
                "error": e.to_string(),
            })))
        }
    };

    let defaults = BacktestConfig::default();
    let config = BacktestConfig {
        top_n: query.top_n.unwrap_or(defaults.top_n),
        hold: query.hold.unwrap_or(defaults.hold),
        capital: query.capital.map(Decimal::from).unwrap_or(defaults.capital),
        max_gap_pct: state.screen.max_gap_pct,
    };

    let cache = state.cache.current();
    let screen = state.screen.clone();
    let run_config = config.clone();
    let result = tokio::task::spawn_blocking(move || {
        run_backtest(&cache, id.build(&screen).as_ref(), &run_config)
    })
    .await
    .map_err(|e| {
        error!("Backtest task failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(serde_json::json!({
        "success": true,
        "strategy": id,
        "config": config,
        "result": result,
    })))
}

/// GET /api/outrunners — next-day move classification (?top_n=3)
async fn api_outrunners(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let defaults = OutrunnerConfig::default();
    let config = OutrunnerConfig {
        top_n: params
            .get("top_n")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.top_n),
        ..defaults
    };

    let cache = state.cache.current();
    let report = analyze_outrunners(&cache, &config, &state.screen);
    Json(serde_json::json!({
        "success": true,
        "config": config,
        "data": report,
    }))
}

/// POST /api/reload — re-read the store and swap the cache in
async fn api_reload(State(state): State<AppState>) -> Json<serde_json::Value> {
    match engine::load(&SqliteSnapshotSource::new(&state.db), state.days).await {
        Ok(cache) => {
            let dates = cache.dates().len();
            let latest = cache.latest_date();
            state.cache.replace(cache);
            info!(dates, latest = ?latest, "Snapshot cache reloaded");
            Json(serde_json::json!({
                "success": true,
                "dates": dates,
                "latest_date": latest,
            }))
        }
        Err(e) => {
            error!("Reload failed: {}", e);
            Json(serde_json::json!({
                "success": false,
                "error": format!("Reload failed: {}", e),
            }))
        }
    }
}
