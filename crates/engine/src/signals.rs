//! Signal detectors over the snapshot cache
//!
//! Every detector takes the cache plus an ascending date slice whose last
//! element is "today". Short histories yield empty results, never errors.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cache::{DataCache, DayMap};
use crate::config::ScreenConfig;
use crate::scorer::{base_score, outrunner_conviction};
use crate::types::{round_to, McapCategory, OiTrend, Snapshot};

pub const LOW_PCR: f64 = 0.5;
pub const HIGH_PCR: f64 = 1.5;
pub const DELIVERY_SPIKE: f64 = 2.0;
pub const STREAK_DAYS: usize = 3;
/// Call/put OI move (%) that counts as a divergence leg
pub const CALL_PUT_MOVE_PCT: f64 = 2.0;

// ============================================================================
// OI change enrichment
// ============================================================================

/// `(curr - prev) / prev * 100` rounded to 2 dp; `None` when `prev <= 0`
pub fn pct_change(curr: f64, prev: f64) -> Option<f64> {
    if !(prev > 0.0) {
        return None;
    }
    let pct = (curr - prev) / prev * 100.0;
    pct.is_finite().then(|| round_to(pct, 2))
}

/// Day-over-day change of cumulative call and put OI
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OiChange {
    pub call_oi_change_pct: Option<f64>,
    pub put_oi_change_pct: Option<f64>,
}

/// Call/put OI change vs the previous day's snapshot (both `None` without one)
pub fn enrich_oi_change_pct(s: &Snapshot, prev: Option<&Snapshot>) -> OiChange {
    match prev {
        Some(p) => OiChange {
            call_oi_change_pct: pct_change(s.cumulative_call_oi, p.cumulative_call_oi),
            put_oi_change_pct: pct_change(s.cumulative_put_oi, p.cumulative_put_oi),
        },
        None => OiChange::default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPutSignal {
    Bullish,
    Bearish,
}

/// Call OI up and put OI down (bullish), or the reverse (bearish)
pub fn call_put_divergence(s: &Snapshot, prev: Option<&Snapshot>) -> Option<CallPutSignal> {
    let chg = enrich_oi_change_pct(s, prev);
    let (call, put) = (chg.call_oi_change_pct?, chg.put_oi_change_pct?);

    if call > CALL_PUT_MOVE_PCT && put < -CALL_PUT_MOVE_PCT {
        Some(CallPutSignal::Bullish)
    } else if call < -CALL_PUT_MOVE_PCT && put > CALL_PUT_MOVE_PCT {
        Some(CallPutSignal::Bearish)
    } else {
        None
    }
}

fn today_and_yesterday(dates: &[NaiveDate]) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let today = dates.last().copied();
    let yesterday = dates.len().checked_sub(2).map(|i| dates[i]);
    (today, yesterday)
}

// ============================================================================
// Trend flips
// ============================================================================

/// Symbol whose OI trend turned bearish → bullish today
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendFlip {
    pub symbol: String,
    pub prev_trend: OiTrend,
    pub new_trend: OiTrend,
    pub close: f64,
    pub change_pct: f64,
    pub pcr: f64,
    pub volume_times: f64,
    pub delivery_times: f64,
    pub sector: String,
    pub mcap_category: McapCategory,
    pub score: i32,
    pub conviction: i32,
}

/// Bearish (NewShort/LongCover) yesterday, bullish today. Sorted by conviction.
pub fn detect_trend_flips(cache: &DataCache, dates: &[NaiveDate]) -> Vec<TrendFlip> {
    let (Some(today), Some(yesterday)) = today_and_yesterday(dates) else {
        return Vec::new();
    };
    let (Some(day), Some(prev_day)) = (cache.day(today), cache.day(yesterday)) else {
        return Vec::new();
    };

    let mut flips: Vec<TrendFlip> = day
        .iter()
        .filter_map(|(sym, s)| {
            let prev = prev_day.get(sym)?;
            if !(prev.oi_trend.is_bearish() && s.oi_trend.is_bullish()) {
                return None;
            }
            Some(TrendFlip {
                symbol: sym.clone(),
                prev_trend: prev.oi_trend,
                new_trend: s.oi_trend,
                close: s.close,
                change_pct: s.change_pct,
                pcr: s.pcr,
                volume_times: s.volume_times,
                delivery_times: s.delivery_times,
                sector: s.sector.clone(),
                mcap_category: s.mcap_category,
                score: base_score(s),
                conviction: outrunner_conviction(s).conviction,
            })
        })
        .collect();

    flips.sort_by(|a, b| b.conviction.cmp(&a.conviction));
    flips
}

// ============================================================================
// PCR extremes / delivery spikes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcrEntry {
    pub symbol: String,
    pub pcr: f64,
    pub pcr_change_1d: f64,
    pub close: f64,
    pub change_pct: f64,
    pub oi_trend: OiTrend,
    pub sector: String,
    pub mcap_category: McapCategory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PcrExtremes {
    /// Ascending by PCR
    pub low_pcr: Vec<PcrEntry>,
    /// Descending by PCR
    pub high_pcr: Vec<PcrEntry>,
}

/// Today's symbols with PCR at or beyond the given thresholds
pub fn pcr_extremes(cache: &DataCache, dates: &[NaiveDate], low: f64, high: f64) -> PcrExtremes {
    let mut out = PcrExtremes::default();
    let Some(day) = dates.last().and_then(|d| cache.day(*d)) else {
        return out;
    };

    for (sym, s) in day {
        let entry = || PcrEntry {
            symbol: sym.clone(),
            pcr: s.pcr,
            pcr_change_1d: s.pcr_change_1d,
            close: s.close,
            change_pct: s.change_pct,
            oi_trend: s.oi_trend,
            sector: s.sector.clone(),
            mcap_category: s.mcap_category,
        };
        if s.pcr <= low {
            out.low_pcr.push(entry());
        } else if s.pcr >= high {
            out.high_pcr.push(entry());
        }
    }

    out.low_pcr.sort_by(|a, b| a.pcr.total_cmp(&b.pcr));
    out.high_pcr.sort_by(|a, b| b.pcr.total_cmp(&a.pcr));
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySpike {
    pub symbol: String,
    pub delivery_times: f64,
    pub volume_times: f64,
    pub close: f64,
    pub change_pct: f64,
    pub oi_trend: OiTrend,
    pub pcr: f64,
    pub sector: String,
    pub mcap_category: McapCategory,
    pub score: i32,
}

/// Delivery at or above `threshold` × average today, highest first
pub fn delivery_spikes(cache: &DataCache, dates: &[NaiveDate], threshold: f64) -> Vec<DeliverySpike> {
    let Some(day) = dates.last().and_then(|d| cache.day(*d)) else {
        return Vec::new();
    };

    let mut spikes: Vec<DeliverySpike> = day
        .iter()
        .filter(|(_, s)| s.delivery_times >= threshold)
        .map(|(sym, s)| DeliverySpike {
            symbol: sym.clone(),
            delivery_times: s.delivery_times,
            volume_times: s.volume_times,
            close: s.close,
            change_pct: s.change_pct,
            oi_trend: s.oi_trend,
            pcr: s.pcr,
            sector: s.sector.clone(),
            mcap_category: s.mcap_category,
            score: base_score(s),
        })
        .collect();

    spikes.sort_by(|a, b| b.delivery_times.total_cmp(&a.delivery_times));
    spikes
}

// ============================================================================
// Score streaks
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreStreak {
    pub symbol: String,
    /// Consecutive in-band days ending today (at least `min_days`)
    pub streak_days: usize,
    pub score: i32,
    pub conviction: i32,
    pub close: f64,
    pub change_pct: f64,
    pub oi_trend: OiTrend,
    pub pcr: f64,
    pub volume_times: f64,
    pub delivery_times: f64,
    pub sector: String,
    pub mcap_category: McapCategory,
}

fn in_band(s: &Snapshot, lo: i32, hi: i32) -> bool {
    (lo..=hi).contains(&base_score(s))
}

/// Symbols scoring within `[lo, hi]` on every one of the last `min_days` dates.
/// Sorted by (streak_days, conviction) descending.
pub fn score_streaks(
    cache: &DataCache,
    dates: &[NaiveDate],
    min_days: usize,
    lo: i32,
    hi: i32,
) -> Vec<ScoreStreak> {
    if min_days == 0 || dates.len() < min_days {
        return Vec::new();
    }
    let Some(day) = dates.last().and_then(|d| cache.day(*d)) else {
        return Vec::new();
    };

    let mut streaks = Vec::new();
    for (sym, s) in day {
        let streak_days = dates
            .iter()
            .rev()
            .take_while(|d| cache.snapshot(**d, sym).is_some_and(|x| in_band(x, lo, hi)))
            .count();
        if streak_days < min_days {
            continue;
        }

        streaks.push(ScoreStreak {
            symbol: sym.clone(),
            streak_days,
            score: base_score(s),
            conviction: outrunner_conviction(s).conviction,
            close: s.close,
            change_pct: s.change_pct,
            oi_trend: s.oi_trend,
            pcr: s.pcr,
            volume_times: s.volume_times,
            delivery_times: s.delivery_times,
            sector: s.sector.clone(),
            mcap_category: s.mcap_category,
        });
    }

    streaks.sort_by(|a, b| {
        (b.streak_days, b.conviction).cmp(&(a.streak_days, a.conviction))
    });
    streaks
}

// ============================================================================
// Call/put OI divergences
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OiDivergence {
    pub symbol: String,
    pub signal: CallPutSignal,
    pub call_oi_change_pct: f64,
    pub put_oi_change_pct: f64,
    pub close: f64,
    pub change_pct: f64,
    pub sector: String,
    pub score: i32,
}

/// Every symbol with a call/put OI divergence today, widest spread first
pub fn oi_divergences(cache: &DataCache, dates: &[NaiveDate]) -> Vec<OiDivergence> {
    let (Some(today), Some(yesterday)) = today_and_yesterday(dates) else {
        return Vec::new();
    };
    let Some(day) = cache.day(today) else {
        return Vec::new();
    };

    let mut out: Vec<OiDivergence> = day
        .iter()
        .filter_map(|(sym, s)| {
            let prev = cache.snapshot(yesterday, sym);
            let signal = call_put_divergence(s, prev)?;
            let chg = enrich_oi_change_pct(s, prev);
            Some(OiDivergence {
                symbol: sym.clone(),
                signal,
                call_oi_change_pct: chg.call_oi_change_pct.unwrap_or(0.0),
                put_oi_change_pct: chg.put_oi_change_pct.unwrap_or(0.0),
                close: s.close,
                change_pct: s.change_pct,
                sector: s.sector.clone(),
                score: base_score(s),
            })
        })
        .collect();

    let spread = |d: &OiDivergence| (d.call_oi_change_pct - d.put_oi_change_pct).abs();
    out.sort_by(|a, b| spread(b).total_cmp(&spread(a)));
    out
}

// ============================================================================
// Signal convergence
// ============================================================================

/// Detector that fired for a symbol on the view date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvergentSignal {
    Flip,
    #[serde(rename = "PCR")]
    Pcr,
    Dlv,
    Streak,
    CallPut,
}

impl ConvergentSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flip => "Flip",
            Self::Pcr => "PCR",
            Self::Dlv => "Dlv",
            Self::Streak => "Streak",
            Self::CallPut => "CallPut",
        }
    }
}

impl std::fmt::Display for ConvergentSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which detectors fire per symbol as of `view_date` (dates after it are ignored).
/// Streaks are measured against the sweet-spot band of `screen`.
pub fn signal_convergence(
    cache: &DataCache,
    dates: &[NaiveDate],
    view_date: NaiveDate,
    screen: &ScreenConfig,
) -> BTreeMap<String, Vec<ConvergentSignal>> {
    let mut tags: BTreeMap<String, Vec<ConvergentSignal>> = BTreeMap::new();
    let end = dates.partition_point(|d| *d <= view_date);
    let dates = &dates[..end];
    if dates.last() != Some(&view_date) {
        return tags;
    }

    let mut tag = |sym: &str, signal: ConvergentSignal| {
        tags.entry(sym.to_string()).or_default().push(signal);
    };

    for f in detect_trend_flips(cache, dates) {
        tag(&f.symbol, ConvergentSignal::Flip);
    }
    for p in pcr_extremes(cache, dates, LOW_PCR, HIGH_PCR).low_pcr {
        tag(&p.symbol, ConvergentSignal::Pcr);
    }
    for d in delivery_spikes(cache, dates, DELIVERY_SPIKE) {
        tag(&d.symbol, ConvergentSignal::Dlv);
    }
    let (lo, hi) = (screen.sweet_spot_lo, screen.sweet_spot_hi);
    for s in score_streaks(cache, dates, STREAK_DAYS, lo, hi) {
        tag(&s.symbol, ConvergentSignal::Streak);
    }
    for d in oi_divergences(cache, dates) {
        if d.signal == CallPutSignal::Bullish {
            tag(&d.symbol, ConvergentSignal::CallPut);
        }
    }

    tags
}

// ============================================================================
// Daily summary
// ============================================================================

fn bullish_pct(day: &DayMap) -> f64 {
    if day.is_empty() {
        return 0.0;
    }
    let bulls = day.values().filter(|s| s.oi_trend.is_bullish()).count();
    bulls as f64 / day.len() as f64 * 100.0
}

/// One-paragraph morning digest of today's market breadth and detector hits
pub fn daily_summary(cache: &DataCache, dates: &[NaiveDate], screen: &ScreenConfig) -> String {
    let Some(today) = dates.last().copied() else {
        return "No data available.".to_string();
    };
    let Some(stocks) = cache.day(today).filter(|d| !d.is_empty()) else {
        return "No stock data for today.".to_string();
    };

    let total = stocks.len();
    let n_bull = stocks.values().filter(|s| s.oi_trend.is_bullish()).count();
    let n_bear = stocks.values().filter(|s| s.oi_trend.is_bearish()).count();
    let bull_pct = bullish_pct(stocks);

    let prev_bull_pct = today_and_yesterday(dates)
        .1
        .and_then(|d| cache.day(d))
        .map(bullish_pct)
        .unwrap_or(0.0);

    let avg_pcr = stocks.values().map(|s| s.pcr).sum::<f64>() / total as f64;
    let avg_chg = stocks.values().map(|s| s.change_pct).sum::<f64>() / total as f64;

    let mut lines = vec![format!(
        "**{today}** — {n_bull} bullish ({bull_pct:.0}%) vs {n_bear} bearish out of {total} stocks."
    )];

    if prev_bull_pct > 0.0 {
        let delta = bull_pct - prev_bull_pct;
        if delta.abs() > 2.0 {
            let word = if delta > 0.0 { "improved" } else { "weakened" };
            lines.push(format!(
                "Sentiment {word} from yesterday ({prev_bull_pct:.0}% → {bull_pct:.0}%)."
            ));
        }
    }

    lines.push(format!("Avg PCR: {avg_pcr:.2}, Avg Change: {avg_chg:+.2}%."));

    let flips = detect_trend_flips(cache, dates);
    if let Some(top) = flips.first() {
        lines.push(format!(
            "{} trend flip(s) detected — top: **{}** ({} → {}).",
            flips.len(),
            top.symbol,
            top.prev_trend,
            top.new_trend
        ));
    }

    let low_pcr = pcr_extremes(cache, dates, LOW_PCR, HIGH_PCR).low_pcr.len();
    if low_pcr > 0 {
        lines.push(format!(
            "{low_pcr} stock(s) at PCR extreme low (≤{LOW_PCR}) — put writers very confident."
        ));
    }

    let spikes = delivery_spikes(cache, dates, DELIVERY_SPIKE).len();
    if spikes > 0 {
        lines.push(format!(
            "{spikes} delivery spike(s) (≥{DELIVERY_SPIKE:.1}x) — institutional buying detected."
        ));
    }

    let streaks = score_streaks(
        cache,
        dates,
        STREAK_DAYS,
        screen.sweet_spot_lo,
        screen.sweet_spot_hi,
    )
    .len();
    if streaks > 0 {
        lines.push(format!(
            "{streaks} stock(s) on {STREAK_DAYS}+ day sweet-spot streak — persistent conviction."
        ));
    }

    let call_put = oi_divergences(cache, dates)
        .iter()
        .filter(|d| d.signal == CallPutSignal::Bullish)
        .count();
    if call_put > 0 {
        lines.push(format!(
            "{call_put} bullish call/put OI divergence(s) — calls building while puts unwind."
        ));
    }

    lines.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, day).unwrap()
    }

    fn snap(day: u32, symbol: &str) -> Snapshot {
        Snapshot::new(d(day), symbol)
    }

    fn with_trend(day: u32, symbol: &str, trend: OiTrend) -> Snapshot {
        Snapshot {
            oi_trend: trend,
            ..snap(day, symbol)
        }
    }

    /// Scores 26: trend 8, PCR 6, OI 3, volume 2, delivery 3, momentum 2, bonus 2
    fn sweet(day: u32, symbol: &str) -> Snapshot {
        Snapshot {
            oi_trend: OiTrend::NewLong,
            pcr: 0.8,
            oi_change_pct: 3.0,
            volume_times: 1.3,
            delivery_times: 1.3,
            change_pct: 1.5,
            ..snap(day, symbol)
        }
    }

    fn cold(day: u32, symbol: &str) -> Snapshot {
        Snapshot {
            oi_trend: OiTrend::NewShort,
            pcr: 1.4,
            ..snap(day, symbol)
        }
    }

    #[test]
    fn test_pct_change_guards_denominator() {
        assert_eq!(pct_change(110.0, 100.0), Some(10.0));
        assert_eq!(pct_change(1.0, 3.0), Some(-66.67));
        assert_eq!(pct_change(5.0, 0.0), None);
        assert_eq!(pct_change(5.0, -1.0), None);
        assert_eq!(pct_change(5.0, f64::NAN), None);
    }

    #[test]
    fn test_enrichment_without_previous_day_is_none() {
        let s = Snapshot {
            cumulative_call_oi: 1000.0,
            cumulative_put_oi: 800.0,
            ..snap(2, "ABB")
        };
        let chg = enrich_oi_change_pct(&s, None);
        assert_eq!(chg.call_oi_change_pct, None);
        assert_eq!(chg.put_oi_change_pct, None);

        let prev = Snapshot {
            cumulative_call_oi: 0.0,
            cumulative_put_oi: 1000.0,
            ..snap(1, "ABB")
        };
        let chg = enrich_oi_change_pct(&s, Some(&prev));
        assert_eq!(chg.call_oi_change_pct, None);
        assert_eq!(chg.put_oi_change_pct, Some(-20.0));
    }

    #[test]
    fn test_call_put_divergence() {
        let prev = Snapshot {
            cumulative_call_oi: 1000.0,
            cumulative_put_oi: 1000.0,
            ..snap(1, "ABB")
        };
        let bull = Snapshot {
            cumulative_call_oi: 1050.0,
            cumulative_put_oi: 950.0,
            ..snap(2, "ABB")
        };
        let bear = Snapshot {
            cumulative_call_oi: 950.0,
            cumulative_put_oi: 1050.0,
            ..snap(2, "ABB")
        };
        let flat = Snapshot {
            cumulative_call_oi: 1020.0,
            cumulative_put_oi: 900.0,
            ..snap(2, "ABB")
        };
        assert_eq!(call_put_divergence(&bull, Some(&prev)), Some(CallPutSignal::Bullish));
        assert_eq!(call_put_divergence(&bear, Some(&prev)), Some(CallPutSignal::Bearish));
        // +2.0% is not strictly above the threshold
        assert_eq!(call_put_divergence(&flat, Some(&prev)), None);
        assert_eq!(call_put_divergence(&bull, None), None);
    }

    #[test]
    fn test_flip_requires_bearish_prior_trend() {
        let cache = DataCache::from_parts(
            vec![
                with_trend(1, "AAA", OiTrend::NewShort),
                with_trend(2, "AAA", OiTrend::NewLong),
                with_trend(1, "BBB", OiTrend::Neutral),
                with_trend(2, "BBB", OiTrend::NewLong),
                with_trend(1, "CCC", OiTrend::LongCover),
                with_trend(2, "CCC", OiTrend::ShortCover),
                with_trend(2, "DDD", OiTrend::NewLong),
            ],
            vec![],
        );
        let flips = detect_trend_flips(&cache, cache.dates());
        let symbols: Vec<&str> = flips.iter().map(|f| f.symbol.as_str()).collect();
        // ShortCover (4) outranks NewLong (3) on conviction
        assert_eq!(symbols, vec!["CCC", "AAA"]);
        assert_eq!(flips[1].prev_trend, OiTrend::NewShort);

        assert!(detect_trend_flips(&cache, &cache.dates()[..1]).is_empty());
    }

    #[test]
    fn test_pcr_extremes_buckets_and_order() {
        let pcrs = [("A", 0.3), ("B", 0.6), ("C", 1.0), ("D", 1.6), ("E", 2.0)];
        let cache = DataCache::from_parts(
            pcrs.iter().map(|(sym, pcr)| Snapshot {
                pcr: *pcr,
                ..snap(1, sym)
            }),
            vec![],
        );
        let ext = pcr_extremes(&cache, cache.dates(), 0.5, 1.5);
        let low: Vec<f64> = ext.low_pcr.iter().map(|e| e.pcr).collect();
        let high: Vec<f64> = ext.high_pcr.iter().map(|e| e.pcr).collect();
        assert_eq!(low, vec![0.3]);
        assert_eq!(high, vec![2.0, 1.6]);

        assert!(pcr_extremes(&cache, &[], 0.5, 1.5).low_pcr.is_empty());
    }

    #[test]
    fn test_delivery_spikes_sorted_desc() {
        let cache = DataCache::from_parts(
            [("A", 2.0), ("B", 1.9), ("C", 3.4)].iter().map(|(sym, dlv)| Snapshot {
                delivery_times: *dlv,
                ..snap(1, sym)
            }),
            vec![],
        );
        let spikes = delivery_spikes(&cache, cache.dates(), 2.0);
        let symbols: Vec<&str> = spikes.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["C", "A"]);
    }

    #[test]
    fn test_streak_must_cover_every_recent_day() {
        assert!((20..=34).contains(&base_score(&sweet(1, "X"))));
        assert!(base_score(&cold(1, "X")) < 20);

        let cache = DataCache::from_parts(
            vec![
                // HOT: in band all four days
                sweet(1, "HOT"),
                sweet(2, "HOT"),
                sweet(3, "HOT"),
                sweet(4, "HOT"),
                // GAP: in band on days 2 and 3, misses today
                cold(1, "GAP"),
                sweet(2, "GAP"),
                sweet(3, "GAP"),
                cold(4, "GAP"),
                // NEW: in band only on the last three days
                cold(1, "NEW"),
                sweet(2, "NEW"),
                sweet(3, "NEW"),
                sweet(4, "NEW"),
            ],
            vec![],
        );

        let streaks = score_streaks(&cache, cache.dates(), 3, 20, 34);
        let got: Vec<(&str, usize)> = streaks
            .iter()
            .map(|s| (s.symbol.as_str(), s.streak_days))
            .collect();
        assert_eq!(got, vec![("HOT", 4), ("NEW", 3)]);

        assert!(score_streaks(&cache, &cache.dates()[..2], 3, 20, 34).is_empty());
    }

    #[test]
    fn test_convergence_tags_bullish_call_put_only() {
        let prev = |sym: &str| Snapshot {
            cumulative_call_oi: 1000.0,
            cumulative_put_oi: 1000.0,
            oi_trend: OiTrend::LongCover,
            pcr: 1.0,
            ..snap(1, sym)
        };
        let cache = DataCache::from_parts(
            vec![
                prev("UP"),
                prev("DOWN"),
                Snapshot {
                    cumulative_call_oi: 1100.0,
                    cumulative_put_oi: 900.0,
                    oi_trend: OiTrend::ShortCover,
                    pcr: 0.4,
                    delivery_times: 2.5,
                    ..snap(2, "UP")
                },
                Snapshot {
                    cumulative_call_oi: 900.0,
                    cumulative_put_oi: 1100.0,
                    pcr: 1.0,
                    ..snap(2, "DOWN")
                },
            ],
            vec![],
        );

        let tags = signal_convergence(&cache, cache.dates(), d(2), &ScreenConfig::default());
        assert_eq!(
            tags.get("UP"),
            Some(&vec![
                ConvergentSignal::Flip,
                ConvergentSignal::Pcr,
                ConvergentSignal::Dlv,
                ConvergentSignal::CallPut
            ])
        );
        assert!(tags.get("DOWN").is_none());

        // As of day 1 nothing has diverged yet
        assert!(signal_convergence(&cache, cache.dates(), d(1), &ScreenConfig::default()).is_empty());
    }

    #[test]
    fn test_convergence_streak_follows_screen_band() {
        let cache = DataCache::from_parts(
            vec![sweet(1, "AAA"), sweet(2, "AAA"), sweet(3, "AAA")],
            vec![],
        );

        let tags = signal_convergence(&cache, cache.dates(), d(3), &ScreenConfig::default());
        assert_eq!(tags.get("AAA"), Some(&vec![ConvergentSignal::Streak]));

        // 26 sits below a 30..=40 band
        let narrow = ScreenConfig {
            sweet_spot_lo: 30,
            sweet_spot_hi: 40,
            ..Default::default()
        };
        assert!(signal_convergence(&cache, cache.dates(), d(3), &narrow).is_empty());

        let text = daily_summary(&cache, cache.dates(), &ScreenConfig::default());
        assert!(text.contains("1 stock(s) on 3+ day sweet-spot streak"));
        let text = daily_summary(&cache, cache.dates(), &narrow);
        assert!(!text.contains("streak"));
    }

    #[test]
    fn test_small_sentiment_change_is_not_reported() {
        // 25 of 50 bullish yesterday, 26 of 51 today: under one point of change
        let day = |day: u32, total: usize, bulls: usize| {
            (0..total).map(move |i| {
                let trend = if i < bulls { OiTrend::NewLong } else { OiTrend::Neutral };
                with_trend(day, &format!("S{i:02}"), trend)
            })
        };
        let cache = DataCache::from_parts(day(1, 50, 25).chain(day(2, 51, 26)), vec![]);

        let text = daily_summary(&cache, cache.dates(), &ScreenConfig::default());
        assert!(text.starts_with("**2025-04-02** — 26 bullish (51%) vs 0 bearish out of 51 stocks."));
        assert!(!text.contains("Sentiment"));
    }

    #[test]
    fn test_daily_summary_text() {
        let cache = DataCache::from_parts(
            vec![
                with_trend(1, "A", OiTrend::NewShort),
                with_trend(1, "B", OiTrend::NewLong),
                with_trend(1, "C", OiTrend::Neutral),
                with_trend(1, "D", OiTrend::NewShort),
                Snapshot {
                    pcr: 0.8,
                    change_pct: 1.0,
                    ..with_trend(2, "A", OiTrend::NewLong)
                },
                Snapshot {
                    pcr: 1.2,
                    change_pct: 2.0,
                    ..with_trend(2, "B", OiTrend::NewLong)
                },
                Snapshot {
                    pcr: 1.0,
                    change_pct: -1.0,
                    ..with_trend(2, "C", OiTrend::Neutral)
                },
                Snapshot {
                    pcr: 1.0,
                    change_pct: 0.0,
                    ..with_trend(2, "D", OiTrend::LongCover)
                },
            ],
            vec![],
        );

        let text = daily_summary(&cache, cache.dates(), &ScreenConfig::default());
        assert!(text.starts_with("**2025-04-02** — 2 bullish (50%) vs 1 bearish out of 4 stocks."));
        assert!(text.contains("Sentiment improved from yesterday (25% → 50%)."));
        assert!(text.contains("Avg PCR: 1.00, Avg Change: +0.50%."));
        assert!(text.contains("1 trend flip(s) detected — top: **A** (NewShort → NewLong)."));

        assert_eq!(daily_summary(&cache, &[], &ScreenConfig::default()), "No data available.");
        assert_eq!(daily_summary(&cache, &[d(9)], &ScreenConfig::default()), "No stock data for today.");
    }
}
