//! Outrunner analysis: do sweet-spot picks actually move the next day?
//!
//! For an options buyer the stock has to move, either way. Each pick is
//! measured against the next day's bar from its open and classified as an
//! outrunner, a moderate mover or a dud, then compared with every liquid
//! symbol over the same dates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::DataCache;
use crate::config::ScreenConfig;
use crate::scorer::{score_breakdown, ScoreFactor};
use crate::strategy::StrategyId;
use crate::types::{round_to, McapCategory, OhlcBar, OiTrend};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutrunnerConfig {
    /// Picks per day
    pub top_n: usize,
    /// Minimum intraday move (%) from the open for an outrunner
    pub outrunner_pct: f64,
    /// Minimum move (%) for a moderate mover
    pub moderate_pct: f64,
}

impl Default for OutrunnerConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            outrunner_pct: 1.5,
            moderate_pct: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveClass {
    Outrunner,
    Moderate,
    Dud,
}

/// Next-day moves measured from the open, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NextDayMove {
    pub up: f64,
    pub down: f64,
    pub range: f64,
    pub close_chg: f64,
}

impl NextDayMove {
    /// `fallback_close` is used when the bar carries no close
    fn from_bar(bar: &OhlcBar, fallback_close: f64) -> Self {
        let open = bar.open;
        let close = if bar.close > 0.0 { bar.close } else { fallback_close };
        Self {
            up: (bar.high - open) / open * 100.0,
            down: (open - bar.low) / open * 100.0,
            range: (bar.high - bar.low) / open * 100.0,
            close_chg: if close > 0.0 {
                (close - open) / open * 100.0
            } else {
                0.0
            },
        }
    }

    pub fn max_move(&self) -> f64 {
        self.up.max(self.down)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutrunnerPick {
    pub pick_date: NaiveDate,
    pub next_date: NaiveDate,
    pub symbol: String,
    pub score: i32,
    pub close: f64,
    pub oi_trend: OiTrend,
    pub mcap_category: McapCategory,
    pub sector: String,
    pub moves: NextDayMove,
    pub label: MoveClass,
    /// Closed green from the open
    pub direction_ok: bool,
    pub breakdown: Vec<(ScoreFactor, i32)>,
}

/// Average moves of a group of picks
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveAverages {
    pub count: usize,
    pub up: f64,
    pub down: f64,
    pub range: f64,
    pub close_chg: f64,
}

impl MoveAverages {
    fn of<'a>(moves: impl Iterator<Item = &'a NextDayMove>) -> Option<Self> {
        let mut sum = NextDayMove::default();
        let mut count = 0usize;
        for m in moves {
            sum.up += m.up;
            sum.down += m.down;
            sum.range += m.range;
            sum.close_chg += m.close_chg;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(Self {
            count,
            up: round_to(sum.up / n, 2),
            down: round_to(sum.down / n, 2),
            range: round_to(sum.range / n, 2),
            close_chg: round_to(sum.close_chg / n, 2),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutrunnerReport {
    pub total_picks: usize,
    pub outrunners: usize,
    pub moderates: usize,
    pub duds: usize,
    pub outrunner_rate: f64,
    pub moderate_rate: f64,
    pub dud_rate: f64,
    /// Outrunners plus moderates
    pub actionable_rate: f64,
    pub direction_ok: usize,
    pub direction_rate: f64,
    pub outrunners_green: usize,
    pub all: Option<MoveAverages>,
    pub outrunner_moves: Option<MoveAverages>,
    pub moderate_moves: Option<MoveAverages>,
    pub dud_moves: Option<MoveAverages>,
    /// Every liquid symbol over the same dates
    pub random_baseline: Option<MoveAverages>,
    /// Picks' average range minus the baseline's
    pub edge_pct: Option<f64>,
    pub picks: Vec<OutrunnerPick>,
}

fn rate(n: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(n as f64 / total as f64 * 100.0, 1)
    }
}

/// Next-day bar for a signal close, if valid and within the gap limit
fn sane_bar<'a>(
    cache: &'a DataCache,
    symbol: &str,
    next: NaiveDate,
    close: f64,
    max_gap_pct: f64,
) -> Option<&'a OhlcBar> {
    if close <= 0.0 {
        return None;
    }
    let bar = cache.bar(symbol, next).filter(|b| b.is_valid() && b.high > 0.0)?;
    let gap = ((bar.open - close) / close * 100.0).abs();
    (gap <= max_gap_pct).then_some(bar)
}

/// Sweet-spot top-N picks per day measured against the next day's bar
pub fn analyze_outrunners(
    cache: &DataCache,
    config: &OutrunnerConfig,
    screen: &ScreenConfig,
) -> OutrunnerReport {
    let strategy = StrategyId::SweetSpot.build(screen);
    let dates = cache.dates();

    let mut picks = Vec::new();
    let mut baseline = Vec::new();

    for pair in dates.windows(2) {
        let (date, next) = (pair[0], pair[1]);

        for c in strategy.pick(cache, date).into_iter().take(config.top_n) {
            let Some(bar) = sane_bar(cache, &c.symbol, next, c.close, screen.max_gap_pct) else {
                continue;
            };
            let Some(s) = cache.snapshot(date, &c.symbol) else {
                continue;
            };
            let fallback = cache.snapshot(next, &c.symbol).map_or(0.0, |n| n.close);
            let moves = NextDayMove::from_bar(bar, fallback);

            let max_move = moves.max_move();
            let label = if max_move >= config.outrunner_pct {
                MoveClass::Outrunner
            } else if max_move >= config.moderate_pct {
                MoveClass::Moderate
            } else {
                MoveClass::Dud
            };

            picks.push(OutrunnerPick {
                pick_date: date,
                next_date: next,
                symbol: c.symbol,
                score: c.score,
                close: c.close,
                oi_trend: s.oi_trend,
                mcap_category: s.mcap_category,
                sector: s.sector.clone(),
                moves,
                label,
                direction_ok: moves.close_chg > 0.0,
                breakdown: score_breakdown(s),
            });
        }

        if let Some(day) = cache.day(date) {
            for s in day.values() {
                if screen.is_illiquid(s.volume_times, s.pcr) {
                    continue;
                }
                if let Some(bar) = sane_bar(cache, &s.symbol, next, s.close, screen.max_gap_pct) {
                    baseline.push(NextDayMove::from_bar(bar, 0.0));
                }
            }
        }
    }

    let total = picks.len();
    let count = |class: MoveClass| picks.iter().filter(|p| p.label == class).count();
    let (outrunners, moderates, duds) = (
        count(MoveClass::Outrunner),
        count(MoveClass::Moderate),
        count(MoveClass::Dud),
    );
    let direction_ok = picks.iter().filter(|p| p.direction_ok).count();
    let outrunners_green = picks
        .iter()
        .filter(|p| p.label == MoveClass::Outrunner && p.direction_ok)
        .count();
    let moves_of = |class: MoveClass| {
        MoveAverages::of(picks.iter().filter(|p| p.label == class).map(|p| &p.moves))
    };

    let all = MoveAverages::of(picks.iter().map(|p| &p.moves));
    let random_baseline = MoveAverages::of(baseline.iter());
    let edge_pct = match (total, baseline.len()) {
        (0, _) | (_, 0) => None,
        (n, m) => {
            let picks_range = picks.iter().map(|p| p.moves.range).sum::<f64>() / n as f64;
            let random_range = baseline.iter().map(|b| b.range).sum::<f64>() / m as f64;
            Some(round_to(picks_range - random_range, 2))
        }
    };

    info!(
        total,
        outrunners,
        moderates,
        duds,
        baseline = baseline.len(),
        "Outrunner analysis complete"
    );

    OutrunnerReport {
        total_picks: total,
        outrunners,
        moderates,
        duds,
        outrunner_rate: rate(outrunners, total),
        moderate_rate: rate(moderates, total),
        dud_rate: rate(duds, total),
        actionable_rate: rate(outrunners + moderates, total),
        direction_ok,
        direction_rate: rate(direction_ok, total),
        outrunners_green,
        all,
        outrunner_moves: moves_of(MoveClass::Outrunner),
        moderate_moves: moves_of(MoveClass::Moderate),
        dud_moves: moves_of(MoveClass::Dud),
        random_baseline,
        edge_pct,
        picks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Snapshot;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, day).unwrap()
    }

    /// Sweet-spot snapshot (score 26)
    fn sweet(day: u32, symbol: &str, close: f64) -> Snapshot {
        Snapshot {
            mcap_category: McapCategory::Mid,
            oi_trend: OiTrend::NewLong,
            close,
            pcr: 0.8,
            oi_change_pct: 3.0,
            volume_times: 1.3,
            delivery_times: 1.3,
            change_pct: 1.5,
            ..Snapshot::new(d(day), symbol)
        }
    }

    fn bar(symbol: &str, day: u32, open: f64, high: f64, low: f64, close: f64) -> (String, NaiveDate, OhlcBar) {
        (symbol.to_string(), d(day), OhlcBar { open, high, low, close })
    }

    fn cache() -> DataCache {
        DataCache::from_parts(
            vec![
                sweet(1, "AAA", 100.0),
                sweet(1, "BBB", 50.0),
                // Liquid but far below the sweet spot
                Snapshot {
                    oi_trend: OiTrend::NewShort,
                    pcr: 1.4,
                    volume_times: 1.0,
                    close: 10.0,
                    ..Snapshot::new(d(1), "CCC")
                },
                sweet(2, "AAA", 101.5),
                sweet(2, "BBB", 49.9),
                Snapshot::new(d(2), "CCC"),
            ],
            vec![
                bar("AAA", 2, 100.0, 102.0, 99.5, 101.5),
                bar("BBB", 2, 50.0, 50.5, 49.8, 49.9),
                bar("CCC", 2, 10.0, 10.1, 9.9, 10.0),
            ],
        )
    }

    #[test]
    fn test_classifies_picks() {
        let report = analyze_outrunners(&cache(), &OutrunnerConfig::default(), &ScreenConfig::default());

        assert_eq!(report.total_picks, 2);
        assert_eq!(report.outrunners, 1);
        assert_eq!(report.moderates, 1);
        assert_eq!(report.duds, 0);
        assert_eq!(report.outrunner_rate, 50.0);
        assert_eq!(report.actionable_rate, 100.0);
        assert_eq!(report.direction_ok, 1);
        assert_eq!(report.outrunners_green, 1);

        let aaa = report.picks.iter().find(|p| p.symbol == "AAA").unwrap();
        assert_eq!(aaa.label, MoveClass::Outrunner);
        assert_eq!(aaa.breakdown.len(), 7);

        assert_eq!(report.all.map(|a| a.range), Some(1.95));
        assert!(report.dud_moves.is_none());
    }

    #[test]
    fn test_random_baseline_and_edge() {
        let report = analyze_outrunners(&cache(), &OutrunnerConfig::default(), &ScreenConfig::default());
        let baseline = report.random_baseline.unwrap();
        assert_eq!(baseline.count, 3);
        assert_eq!(baseline.range, 1.97);
        assert_eq!(report.edge_pct, Some(-0.02));
    }

    #[test]
    fn test_gap_and_missing_bars_skip_picks() {
        let cache = DataCache::from_parts(
            vec![sweet(1, "AAA", 100.0), sweet(1, "BBB", 50.0), sweet(2, "AAA", 130.0)],
            vec![bar("AAA", 2, 130.0, 131.0, 129.0, 130.0)],
        );
        let report = analyze_outrunners(&cache, &OutrunnerConfig::default(), &ScreenConfig::default());
        assert_eq!(report.total_picks, 0);
        assert_eq!(report.edge_pct, None);
        assert!(report.all.is_none());
    }
}
