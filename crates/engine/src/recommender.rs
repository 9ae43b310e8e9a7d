//! Outrunner-based recommendations: the ranked action sheet, top picks and
//! a look back at how recent top picks actually did.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::DataCache;
use crate::config::ScreenConfig;
use crate::scorer::{base_score, outrunner_conviction, trade_suggestion, TradeSuggestion};
use crate::sector::sector_direction_scores;
use crate::signals::{enrich_oi_change_pct, signal_convergence, ConvergentSignal};
use crate::types::{round_to, McapCategory, McapFilter, OiTrend};

pub const DEFAULT_TOP_N: usize = 7;
pub const DEFAULT_LOOKBACK_DAYS: usize = 5;

/// Filters for [`get_action_sheet`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSheetParams {
    pub mcap_filter: McapFilter,
    pub min_conviction: i32,
    pub min_score: i32,
    /// Only these symbols when set
    pub watchlist: Option<BTreeSet<String>>,
    pub sweet_spot_only: bool,
}

/// One ranked candidate
#[derive(Debug, Clone, Serialize)]
pub struct ActionRow {
    pub symbol: String,
    pub stock_name: String,
    pub sector: String,
    pub industry: String,
    pub mcap_category: McapCategory,
    pub lot_size: u32,
    pub conviction: i32,
    pub score: i32,
    pub rec_score: i32,
    pub signals: Vec<ConvergentSignal>,
    pub sector_bonus: i32,
    pub close: f64,
    pub change_pct: f64,
    pub oi_trend: OiTrend,
    pub pcr: f64,
    pub pcr_change_1d: f64,
    pub volume_times: f64,
    pub delivery_times: f64,
    pub cumulative_future_oi: f64,
    pub oi_change_pct: f64,
    pub cumulative_call_oi: f64,
    pub cumulative_put_oi: f64,
    pub call_oi_change_pct: Option<f64>,
    pub put_oi_change_pct: Option<f64>,
    pub suggestion: TradeSuggestion,
}

fn sector_bonus(direction_score: f64) -> i32 {
    if direction_score > 0.3 {
        3
    } else if direction_score >= 0.0 {
        1
    } else {
        0
    }
}

/// Full ranked list for `view_date`:
/// `rec_score = conviction + score + 2 * signals + sector bonus`,
/// ordered by (rec_score, conviction, score) descending.
pub fn get_action_sheet(
    cache: &DataCache,
    dates: &[NaiveDate],
    view_date: NaiveDate,
    params: &ActionSheetParams,
    screen: &ScreenConfig,
) -> Vec<ActionRow> {
    let Some(day) = cache.day(view_date) else {
        return Vec::new();
    };
    // Nothing after the view date may leak into the ranking
    let dates = &dates[..dates.partition_point(|d| *d <= view_date)];
    let prev_date = cache.prev_date(view_date);

    let sector_scores = if dates.len() >= 2 {
        sector_direction_scores(cache, dates, params.mcap_filter)
    } else {
        Default::default()
    };
    let convergence = signal_convergence(cache, dates, view_date, screen);

    let mut rows = Vec::new();
    for (sym, s) in day {
        if !params.mcap_filter.matches(s.mcap_category) {
            continue;
        }
        if screen.is_illiquid(s.volume_times, s.pcr) {
            continue;
        }
        let score = base_score(s);
        if params.sweet_spot_only && !screen.in_sweet_spot(score) {
            continue;
        }
        let conviction = outrunner_conviction(s).conviction;
        if conviction < params.min_conviction || score < params.min_score {
            continue;
        }
        if params
            .watchlist
            .as_ref()
            .is_some_and(|w| !w.is_empty() && !w.contains(sym))
        {
            continue;
        }

        let signals = convergence.get(sym).cloned().unwrap_or_default();
        let bonus = sector_bonus(sector_scores.get(s.sector_key()).copied().unwrap_or(0.0));
        let rec_score = conviction + score + 2 * signals.len() as i32 + bonus;
        let chg = enrich_oi_change_pct(s, prev_date.and_then(|d| cache.snapshot(d, sym)));

        rows.push(ActionRow {
            symbol: sym.clone(),
            stock_name: s.stock_name.clone(),
            sector: s.sector.clone(),
            industry: s.industry.clone(),
            mcap_category: s.mcap_category,
            lot_size: s.lot_size,
            conviction,
            score,
            rec_score,
            signals,
            sector_bonus: bonus,
            close: s.close,
            change_pct: s.change_pct,
            oi_trend: s.oi_trend,
            pcr: s.pcr,
            pcr_change_1d: s.pcr_change_1d,
            volume_times: s.volume_times,
            delivery_times: s.delivery_times,
            cumulative_future_oi: s.cumulative_future_oi,
            oi_change_pct: s.oi_change_pct,
            cumulative_call_oi: s.cumulative_call_oi,
            cumulative_put_oi: s.cumulative_put_oi,
            call_oi_change_pct: chg.call_oi_change_pct,
            put_oi_change_pct: chg.put_oi_change_pct,
            suggestion: trade_suggestion(s),
        });
    }

    // Stable: ties keep symbol order
    rows.sort_by(|a, b| {
        (b.rec_score, b.conviction, b.score).cmp(&(a.rec_score, a.conviction, a.score))
    });
    rows
}

/// Top `top_n` sweet-spot rows of the action sheet
pub fn get_top_picks(
    cache: &DataCache,
    dates: &[NaiveDate],
    view_date: NaiveDate,
    mcap_filter: McapFilter,
    top_n: usize,
    screen: &ScreenConfig,
) -> Vec<ActionRow> {
    let params = ActionSheetParams {
        mcap_filter,
        sweet_spot_only: true,
        ..Default::default()
    };
    let mut rows = get_action_sheet(cache, dates, view_date, &params, screen);
    rows.truncate(top_n);
    rows
}

// ============================================================================
// Historical top-pick performance
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickOutcome {
    pub date: NaiveDate,
    pub symbol: String,
    pub pnl_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalPerformance {
    pub total_picks: usize,
    pub green_count: usize,
    pub green_pct: f64,
    pub avg_chg_pct: f64,
    /// First ten measured picks
    pub details: Vec<PickOutcome>,
}

/// Close-to-close next-day return of each day's top picks over the last
/// `lookback_days` transitions. `None` when history is too short or nothing
/// could be measured.
pub fn get_historical_top7_performance(
    cache: &DataCache,
    dates: &[NaiveDate],
    lookback_days: usize,
    screen: &ScreenConfig,
) -> Option<HistoricalPerformance> {
    if lookback_days == 0 || dates.len() < lookback_days + 1 {
        return None;
    }

    let mut green = 0usize;
    let mut total = 0usize;
    let mut chg_sum = 0.0;
    let mut details = Vec::new();

    let first = dates.len() - lookback_days - 1;
    for idx in first..dates.len() - 1 {
        let (date, next) = (dates[idx], dates[idx + 1]);
        let picks = get_top_picks(
            cache,
            &dates[..=idx],
            date,
            McapFilter::All,
            DEFAULT_TOP_N,
            screen,
        );

        for p in picks {
            if p.close <= 0.0 {
                continue;
            }
            let Some(exit) = cache.snapshot(next, &p.symbol).map(|s| s.close) else {
                continue;
            };
            if exit <= 0.0 {
                continue;
            }

            let pct = (exit - p.close) / p.close * 100.0;
            total += 1;
            if pct > 0.0 {
                green += 1;
            }
            chg_sum += pct;
            details.push(PickOutcome {
                date,
                symbol: p.symbol,
                pnl_pct: round_to(pct, 2),
            });
        }
    }

    if total == 0 {
        debug!(lookback_days, "No measurable historical picks");
        return None;
    }

    details.truncate(10);
    Some(HistoricalPerformance {
        total_picks: total,
        green_count: green,
        green_pct: (green as f64 / total as f64 * 100.0).round(),
        avg_chg_pct: round_to(chg_sum / total as f64, 2),
        details,
    })
}
