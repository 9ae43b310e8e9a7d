//! Sector rotation: per-sector aggregates now vs a lookback window, with a
//! weighted composite direction and per-stock drill-down.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cache::DataCache;
use crate::scorer::base_score;
use crate::signals::{enrich_oi_change_pct, pct_change};
use crate::types::{round_to, McapCategory, McapFilter, OiTrend, Snapshot};

/// Lookback used when none is given
pub const DEFAULT_WINDOW: usize = 5;
/// |direction_score| above this is Improving / Declining
pub const DIRECTION_THRESHOLD: f64 = 0.3;

// ============================================================================
// Direction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Improving,
    Stable,
    Declining,
}

impl Direction {
    pub fn from_score(score: f64) -> Self {
        if score > DIRECTION_THRESHOLD {
            Self::Improving
        } else if score < -DIRECTION_THRESHOLD {
            Self::Declining
        } else {
            Self::Stable
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "Improving"),
            Self::Stable => write!(f, "Stable"),
            Self::Declining => write!(f, "Declining"),
        }
    }
}

/// +1 / -1 when `value` clears `cutoff` either way
fn bucket(value: f64, cutoff: f64) -> f64 {
    if value > cutoff {
        1.0
    } else if value < -cutoff {
        -1.0
    } else {
        0.0
    }
}

/// Activity multiple: ≥1.5 → +1, ramps linearly from 1.0, ≤0.7 → -1
fn activity_level(multiple: f64) -> f64 {
    if multiple >= 1.5 {
        1.0
    } else if multiple > 1.0 {
        (multiple - 1.0) / 0.5
    } else if multiple <= 0.7 {
        -1.0
    } else {
        0.0
    }
}

/// Composite in [-1, 1]: weighted factor votes normalised by the weight sum
fn direction_score(
    now: &SectorStats,
    dlv_delta: f64,
    vol_delta: f64,
    chg_delta: f64,
    call_chg: Option<f64>,
    put_chg: Option<f64>,
) -> f64 {
    let factors = [
        (0.20, activity_level(now.avg_dlv())),
        (0.15, bucket(dlv_delta, 0.1)),
        (0.20, activity_level(now.avg_vol())),
        (0.15, bucket(vol_delta, 0.1)),
        (0.20, bucket(now.avg_chg(), 1.0)),
        (0.15, bucket(chg_delta, 1.0)),
        (0.15, bucket(now.avg_oi_chg(), 2.0)),
        (0.10, call_chg.map_or(0.0, |c| bucket(c, 2.0))),
        // Put writers unwinding is bullish
        (0.10, put_chg.map_or(0.0, |p| -bucket(p, 2.0))),
    ];

    let weight_sum: f64 = factors.iter().map(|(w, _)| w).sum();
    let raw: f64 = factors.iter().map(|(w, f)| w * f).sum();
    round_to(raw / weight_sum, 3)
}

// ============================================================================
// Aggregation
// ============================================================================

#[derive(Debug, Clone, Default)]
struct SectorStats {
    count: usize,
    bull: usize,
    chg_sum: f64,
    pcr_sum: f64,
    vol_sum: f64,
    dlv_sum: f64,
    oi_chg_sum: f64,
    call_oi_sum: f64,
    put_oi_sum: f64,
}

impl SectorStats {
    fn add(&mut self, s: &Snapshot) {
        self.count += 1;
        if s.oi_trend.is_bullish() {
            self.bull += 1;
        }
        self.chg_sum += s.change_pct;
        self.pcr_sum += s.pcr;
        self.vol_sum += s.volume_times;
        self.dlv_sum += s.delivery_times;
        self.oi_chg_sum += s.oi_change_pct;
        self.call_oi_sum += s.cumulative_call_oi;
        self.put_oi_sum += s.cumulative_put_oi;
    }

    fn avg(&self, sum: f64) -> f64 {
        round_to(sum / self.count.max(1) as f64, 2)
    }

    fn bull_pct(&self) -> f64 {
        round_to(self.bull as f64 / self.count.max(1) as f64 * 100.0, 1)
    }

    fn avg_chg(&self) -> f64 {
        self.avg(self.chg_sum)
    }

    fn avg_pcr(&self) -> f64 {
        self.avg(self.pcr_sum)
    }

    fn avg_vol(&self) -> f64 {
        self.avg(self.vol_sum)
    }

    fn avg_dlv(&self) -> f64 {
        self.avg(self.dlv_sum)
    }

    fn avg_oi_chg(&self) -> f64 {
        self.avg(self.oi_chg_sum)
    }
}

fn filtered<'a>(
    cache: &'a DataCache,
    date: NaiveDate,
    mcap_filter: McapFilter,
) -> impl Iterator<Item = &'a Snapshot> {
    cache
        .day(date)
        .into_iter()
        .flat_map(|day| day.values())
        .filter(move |s| mcap_filter.matches(s.mcap_category))
}

fn sector_stats<'a>(stocks: impl Iterator<Item = &'a Snapshot>) -> BTreeMap<String, SectorStats> {
    let mut by_sector: BTreeMap<String, SectorStats> = BTreeMap::new();
    for s in stocks {
        by_sector.entry(s.sector_key().to_string()).or_default().add(s);
    }
    by_sector
}

/// Drill-down row for one member stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorStock {
    pub symbol: String,
    pub stock_name: String,
    pub mcap_category: McapCategory,
    pub change_pct: f64,
    pub oi_trend: OiTrend,
    pub pcr: f64,
    pub pcr_change_1d: f64,
    pub volume_times: f64,
    pub delivery_times: f64,
    pub score: i32,
    pub cumulative_future_oi: f64,
    pub oi_change_pct: f64,
    pub cumulative_call_oi: f64,
    pub cumulative_put_oi: f64,
    pub call_oi_change_pct: Option<f64>,
    pub put_oi_change_pct: Option<f64>,
}

/// One sector, now vs the lookback date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorRow {
    pub sector: String,
    pub stock_count: usize,
    pub agg_chg_pct: f64,
    pub chg_delta: f64,
    pub bull_pct: f64,
    pub bull_delta: f64,
    pub vol: f64,
    pub vol_delta: f64,
    pub dlv: f64,
    pub dlv_delta: f64,
    pub pcr: f64,
    pub pcr_delta: f64,
    pub avg_oi_chg_pct: f64,
    pub agg_call_oi: f64,
    /// vs the immediately preceding date, whatever the window
    pub agg_call_oi_chg_pct: Option<f64>,
    pub agg_put_oi: f64,
    pub agg_put_oi_chg_pct: Option<f64>,
    pub direction_score: f64,
    pub direction: Direction,
    pub stocks: Vec<SectorStock>,
}

/// Sector dashboard for the last of `dates`, compared with `window` dates
/// earlier (0 = same day only, clamped to the earliest available date).
/// Ranked by (direction_score, agg change %) descending.
pub fn sector_rotation(
    cache: &DataCache,
    dates: &[NaiveDate],
    window: usize,
    mcap_filter: McapFilter,
) -> Vec<SectorRow> {
    let Some(&today) = dates.last() else {
        return Vec::new();
    };
    let len = dates.len();
    let window = if window > 0 && len < window + 1 {
        (len - 1).max(1)
    } else {
        window
    };

    let stats_now = sector_stats(filtered(cache, today, mcap_filter));
    let stats_past = if window > 0 {
        let past_idx = len.saturating_sub(window + 1);
        sector_stats(filtered(cache, dates[past_idx], mcap_filter))
    } else {
        BTreeMap::new()
    };
    let prev_date = len.checked_sub(2).map(|i| dates[i]);
    let stats_prev_day = prev_date
        .map(|d| sector_stats(filtered(cache, d, mcap_filter)))
        .unwrap_or_default();

    let mut members: BTreeMap<String, Vec<SectorStock>> = BTreeMap::new();
    for s in filtered(cache, today, mcap_filter) {
        let prev = prev_date.and_then(|d| cache.snapshot(d, &s.symbol));
        let chg = enrich_oi_change_pct(s, prev);
        members
            .entry(s.sector_key().to_string())
            .or_default()
            .push(SectorStock {
                symbol: s.symbol.clone(),
                stock_name: s.stock_name.clone(),
                mcap_category: s.mcap_category,
                change_pct: s.change_pct,
                oi_trend: s.oi_trend,
                pcr: s.pcr,
                pcr_change_1d: s.pcr_change_1d,
                volume_times: s.volume_times,
                delivery_times: s.delivery_times,
                score: base_score(s),
                cumulative_future_oi: s.cumulative_future_oi,
                oi_change_pct: s.oi_change_pct,
                cumulative_call_oi: s.cumulative_call_oi,
                cumulative_put_oi: s.cumulative_put_oi,
                call_oi_change_pct: chg.call_oi_change_pct,
                put_oi_change_pct: chg.put_oi_change_pct,
            });
    }

    let mut rows: Vec<SectorRow> = stats_now
        .iter()
        .map(|(sector, now)| {
            let past = stats_past.get(sector);
            // Call/put OI always compares with the previous day, else the lookback date
            let prev = stats_prev_day.get(sector).or(past);

            let bull_delta = past.map_or(0.0, |p| now.bull_pct() - p.bull_pct());
            let pcr_delta = past.map_or(0.0, |p| now.avg_pcr() - p.avg_pcr());
            let chg_delta = now.avg_chg() - past.map_or(0.0, |p| p.avg_chg());
            let vol_delta = past.map_or(0.0, |p| now.avg_vol() - p.avg_vol());
            let dlv_delta = past.map_or(0.0, |p| now.avg_dlv() - p.avg_dlv());

            let call_chg = prev.and_then(|p| pct_change(now.call_oi_sum, p.call_oi_sum));
            let put_chg = prev.and_then(|p| pct_change(now.put_oi_sum, p.put_oi_sum));

            let score = direction_score(now, dlv_delta, vol_delta, chg_delta, call_chg, put_chg);

            SectorRow {
                sector: sector.clone(),
                stock_count: now.count,
                agg_chg_pct: now.avg_chg(),
                chg_delta: round_to(chg_delta, 2),
                bull_pct: now.bull_pct(),
                bull_delta: round_to(bull_delta, 1),
                vol: now.avg_vol(),
                vol_delta: round_to(vol_delta, 2),
                dlv: now.avg_dlv(),
                dlv_delta: round_to(dlv_delta, 2),
                pcr: now.avg_pcr(),
                pcr_delta: round_to(pcr_delta, 2),
                avg_oi_chg_pct: now.avg_oi_chg(),
                agg_call_oi: now.call_oi_sum,
                agg_call_oi_chg_pct: call_chg,
                agg_put_oi: now.put_oi_sum,
                agg_put_oi_chg_pct: put_chg,
                direction_score: score,
                direction: Direction::from_score(score),
                stocks: members.remove(sector).unwrap_or_default(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.direction_score
            .total_cmp(&a.direction_score)
            .then(b.agg_chg_pct.total_cmp(&a.agg_chg_pct))
    });
    rows
}

/// sector → direction score, as used for the recommender's sector bonus
pub fn sector_direction_scores(
    cache: &DataCache,
    dates: &[NaiveDate],
    mcap_filter: McapFilter,
) -> BTreeMap<String, f64> {
    sector_rotation(cache, dates, DEFAULT_WINDOW, mcap_filter)
        .into_iter()
        .map(|r| (r.sector, r.direction_score))
        .collect()
}
