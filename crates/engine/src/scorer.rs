//! Scoring engine: directional score, outrunner conviction, trade suggestion
//!
//! All functions are pure over a single [`Snapshot`].

use serde::{Deserialize, Serialize};

use crate::types::{McapCategory, OiTrend, Snapshot};

/// Upper bound of [`outrunner_conviction`]
pub const MAX_CONVICTION: i32 = 19;

// ============================================================================
// Base score
// ============================================================================

/// Named factor of the base score, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreFactor {
    OiTrend,
    Pcr,
    OiChange,
    Volume,
    Delivery,
    Momentum,
    Bonus,
}

impl ScoreFactor {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OiTrend => "OI Trend",
            Self::Pcr => "PCR",
            Self::OiChange => "OI Change",
            Self::Volume => "Volume",
            Self::Delivery => "Delivery",
            Self::Momentum => "Momentum",
            Self::Bonus => "Bonus",
        }
    }
}

fn oi_trend_points(trend: OiTrend) -> i32 {
    match trend {
        OiTrend::NewLong | OiTrend::ShortCover => 8,
        OiTrend::NewShort | OiTrend::LongCover => -8,
        OiTrend::Neutral | OiTrend::Unknown => 0,
    }
}

/// PCR level plus its 1-day change
fn pcr_points(pcr: f64, pcr_change: f64) -> i32 {
    let level = if pcr < 0.7 {
        7
    } else if pcr <= 0.9 {
        6
    } else if pcr <= 1.0 {
        3
    } else if pcr > 1.2 {
        -3
    } else {
        0
    };

    let change = if pcr_change > 0.1 {
        -3
    } else if pcr_change < -0.1 {
        3
    } else if pcr_change < 0.0 && pcr < 1.0 {
        2
    } else {
        0
    };

    level + change
}

fn oi_change_points(oi_change_pct: f64) -> i32 {
    match oi_change_pct {
        x if x > 10.0 => 8,
        x if x > 5.0 => 5,
        x if x > 2.0 => 3,
        x if x > 0.0 => 1,
        x if x <= -5.0 => -3,
        _ => 0,
    }
}

fn volume_points(volume_times: f64) -> i32 {
    match volume_times {
        x if x > 2.0 => 5,
        x if x > 1.5 => 4,
        x if x > 1.2 => 2,
        x if x > 1.0 => 1,
        x if x <= 0.7 => -2,
        _ => 0,
    }
}

fn delivery_points(delivery_times: f64) -> i32 {
    match delivery_times {
        x if x > 2.0 => 7,
        x if x > 1.5 => 5,
        x if x > 1.2 => 3,
        x if x > 1.0 => 2,
        x if x <= 0.7 => -2,
        _ => 0,
    }
}

fn momentum_points(change_pct: f64) -> i32 {
    match change_pct {
        x if x > 3.0 => 5,
        x if x > 1.0 => 2,
        x if x > -1.0 => 0,
        x if x > -3.0 => -1,
        _ => -3,
    }
}

/// Everything lines up: cheap puts, above-average activity, green close
fn confluence_bonus(s: &Snapshot) -> i32 {
    if s.pcr < 1.0 && s.volume_times > 1.0 && s.delivery_times > 1.0 && s.change_pct > 0.0 {
        2
    } else {
        0
    }
}

/// Per-factor decomposition of [`base_score`]; values always sum to it
pub fn score_breakdown(s: &Snapshot) -> Vec<(ScoreFactor, i32)> {
    vec![
        (ScoreFactor::OiTrend, oi_trend_points(s.oi_trend)),
        (ScoreFactor::Pcr, pcr_points(s.pcr, s.pcr_change_1d)),
        (ScoreFactor::OiChange, oi_change_points(s.oi_change_pct)),
        (ScoreFactor::Volume, volume_points(s.volume_times)),
        (ScoreFactor::Delivery, delivery_points(s.delivery_times)),
        (ScoreFactor::Momentum, momentum_points(s.change_pct)),
        (ScoreFactor::Bonus, confluence_bonus(s)),
    ]
}

/// Composite directional score (roughly -15..=45)
pub fn base_score(s: &Snapshot) -> i32 {
    score_breakdown(s).iter().map(|(_, pts)| pts).sum()
}

// ============================================================================
// Outrunner conviction
// ============================================================================

/// One conviction factor: points awarded and a human-readable reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvictionReason {
    pub factor: &'static str,
    pub points: i32,
    pub reason: String,
}

/// Probability proxy for "moves at least 1.5% intraday tomorrow"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conviction {
    pub conviction: i32,
    pub max_conviction: i32,
    pub reasons: Vec<ConvictionReason>,
}

/// Conviction score (0..=19) with per-factor reasons.
///
/// Factor weights come from a 60-day review of sweet-spot picks: short
/// covering, mid caps, heavy volume/delivery and strong prior-day momentum
/// all raised the share of picks that moved enough to trade options.
pub fn outrunner_conviction(s: &Snapshot) -> Conviction {
    let mut reasons = Vec::with_capacity(7);
    let mut push = |factor: &'static str, points: i32, reason: String| {
        reasons.push(ConvictionReason {
            factor,
            points,
            reason,
        });
    };

    match s.oi_trend {
        OiTrend::ShortCover => push("OI Trend", 4, "Short squeeze — high outrunner rate".into()),
        OiTrend::NewLong => push("OI Trend", 3, "Strong long buildup".into()),
        _ => push("OI Trend", 0, "Bearish/Neutral trend".into()),
    }

    match s.mcap_category {
        McapCategory::Mid => push("MCap", 3, "Mid Cap — 80% outrunner, 3.0% range".into()),
        McapCategory::Large => push("MCap", 1, "Large Cap — 64% outrunner".into()),
        McapCategory::Small => push("MCap", 1, "Small Cap — 60% outrunner".into()),
        McapCategory::Unknown => push("MCap", 0, "Unknown cap".into()),
    }

    let vol = s.volume_times;
    match vol {
        v if v >= 2.0 => push("Volume", 3, format!("{v:.1}x — strong activity")),
        v if v >= 1.5 => push("Volume", 2, format!("{v:.1}x — above average")),
        v if v >= 1.0 => push("Volume", 1, format!("{v:.1}x — normal")),
        v => push("Volume", 0, format!("{v:.1}x — low volume")),
    }

    let dlv = s.delivery_times;
    match dlv {
        v if v >= 2.0 => push("Delivery", 3, format!("{v:.1}x — big hands buying")),
        v if v >= 1.5 => push("Delivery", 2, format!("{v:.1}x — good conviction")),
        v if v >= 1.0 => push("Delivery", 1, format!("{v:.1}x — normal")),
        v => push("Delivery", 0, format!("{v:.1}x — low delivery")),
    }

    let chg = s.change_pct;
    match chg {
        c if c >= 3.0 => push("Momentum", 3, format!("{c:+.1}% — strong momentum")),
        c if c >= 1.0 => push("Momentum", 2, format!("{c:+.1}% — positive trend")),
        c if c >= 0.0 => push("Momentum", 1, format!("{c:+.1}% — flat/mild")),
        c => push("Momentum", 0, format!("{c:+.1}% — negative")),
    }

    let pcr = s.pcr;
    if pcr < 0.7 && s.pcr_change_1d < 0.0 {
        push("PCR Signal", 2, format!("PCR {pcr:.2} dropping — put writers confident"));
    } else if pcr < 0.9 {
        push("PCR Signal", 1, format!("PCR {pcr:.2} — bullish zone"));
    } else {
        push("PCR Signal", 0, format!("PCR {pcr:.2} — neutral/bearish"));
    }

    let oi = s.oi_change_pct;
    if oi >= 5.0 {
        push("OI Buildup", 1, format!("OI +{oi:.1}% — strong positioning"));
    } else {
        push("OI Buildup", 0, format!("OI {oi:+.1}%"));
    }

    let conviction = reasons.iter().map(|r| r.points).sum();
    Conviction {
        conviction,
        max_conviction: MAX_CONVICTION,
        reasons,
    }
}

// ============================================================================
// Trade suggestion
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeKind {
    BuyCalls,
    Straddle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionConfidence {
    High,
    Moderate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeSuggestion {
    pub kind: TradeKind,
    pub confidence: SuggestionConfidence,
    pub reason: &'static str,
}

/// Options structure for a pick. Picks reliably move but closing direction is
/// right only about 38% of the time, so calls need stacked bullish evidence.
pub fn trade_suggestion(s: &Snapshot) -> TradeSuggestion {
    let mut bull_signals = 0;
    match s.oi_trend {
        OiTrend::ShortCover => bull_signals += 2,
        OiTrend::NewLong => bull_signals += 1,
        _ => {}
    }
    if s.pcr < 0.7 && s.pcr_change_1d < 0.0 {
        bull_signals += 2;
    } else if s.pcr < 0.9 {
        bull_signals += 1;
    }
    if s.change_pct > 1.0 {
        bull_signals += 1;
    }
    if s.delivery_times > 1.5 && s.change_pct > 0.0 {
        bull_signals += 1;
    }

    match bull_signals {
        n if n >= 5 => TradeSuggestion {
            kind: TradeKind::BuyCalls,
            confidence: SuggestionConfidence::High,
            reason: "Strong bullish convergence — trend + PCR + momentum aligned",
        },
        n if n >= 3 => TradeSuggestion {
            kind: TradeKind::BuyCalls,
            confidence: SuggestionConfidence::Moderate,
            reason: "Multiple bullish signals but not fully confirmed",
        },
        _ => TradeSuggestion {
            kind: TradeKind::Straddle,
            confidence: SuggestionConfidence::High,
            reason: "Stock will likely move but direction unclear — play volatility",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn scenario_a() -> Snapshot {
        Snapshot {
            oi_trend: OiTrend::ShortCover,
            pcr: 0.6,
            pcr_change_1d: -0.15,
            oi_change_pct: 12.0,
            volume_times: 2.2,
            delivery_times: 2.1,
            change_pct: 3.5,
            ..Snapshot::new(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(), "ABC")
        }
    }

    /// Deterministic spread of snapshots across every threshold band
    fn grid() -> Vec<Snapshot> {
        let trends = [
            OiTrend::NewLong,
            OiTrend::NewShort,
            OiTrend::ShortCover,
            OiTrend::LongCover,
            OiTrend::Neutral,
            OiTrend::Unknown,
        ];
        let caps = [
            McapCategory::Large,
            McapCategory::Mid,
            McapCategory::Small,
            McapCategory::Unknown,
        ];
        let levels = [0.0, 0.5, 0.7, 0.9, 1.0, 1.1, 1.3, 1.6, 2.5];
        let moves = [-6.0, -2.0, -0.5, 0.0, 0.5, 2.0, 3.5, 12.0];
        let pcr_moves = [-0.3, -0.05, 0.0, 0.05, 0.3];

        let mut out = Vec::new();
        for (i, trend) in trends.iter().enumerate() {
            for (j, level) in levels.iter().enumerate() {
                for (k, mv) in moves.iter().enumerate() {
                    out.push(Snapshot {
                        oi_trend: *trend,
                        mcap_category: caps[(i + j) % caps.len()],
                        pcr: *level,
                        pcr_change_1d: pcr_moves[(j + k) % pcr_moves.len()],
                        volume_times: levels[(j + k) % levels.len()],
                        delivery_times: levels[(i + k) % levels.len()],
                        change_pct: *mv,
                        oi_change_pct: moves[(i + j + k) % moves.len()],
                        ..Snapshot::new(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(), "X")
                    });
                }
            }
        }
        out
    }

    #[test]
    fn test_scenario_a_scores_45() {
        assert_eq!(base_score(&scenario_a()), 45);
    }

    #[test]
    fn test_scenario_b_mid_cap_hits_max_conviction() {
        let s = Snapshot {
            mcap_category: McapCategory::Mid,
            ..scenario_a()
        };
        let c = outrunner_conviction(&s);
        assert_eq!(c.conviction, 19);
        assert_eq!(c.max_conviction, MAX_CONVICTION);

        let large = Snapshot {
            mcap_category: McapCategory::Large,
            ..scenario_a()
        };
        assert_eq!(outrunner_conviction(&large).conviction, 17);
    }

    #[test]
    fn test_breakdown_sums_to_base_score() {
        for s in grid() {
            let total: i32 = score_breakdown(&s).iter().map(|(_, p)| p).sum();
            assert_eq!(total, base_score(&s), "{s:?}");
        }
    }

    #[test]
    fn test_conviction_bounded_and_consistent() {
        for s in grid() {
            let c = outrunner_conviction(&s);
            assert!((0..=MAX_CONVICTION).contains(&c.conviction), "{s:?}");
            let sum: i32 = c.reasons.iter().map(|r| r.points).sum();
            assert_eq!(sum, c.conviction);
            assert_eq!(c.reasons.len(), 7);
        }
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let s = scenario_a();
        assert_eq!(base_score(&s), base_score(&s.clone()));
        assert_eq!(outrunner_conviction(&s), outrunner_conviction(&s));
    }

    #[test]
    fn test_neutral_snapshot_defaults() {
        // All-zero snapshot: PCR 0 (+7), volume/delivery ≤0.7 (-2 each), flat momentum
        let s = Snapshot::new(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(), "ZERO");
        assert_eq!(base_score(&s), 3);
        let c = outrunner_conviction(&s);
        // Momentum ≥0 (+1) and PCR < 0.9 (+1)
        assert_eq!(c.conviction, 2);
        assert_eq!(c.reasons[1].reason, "Unknown cap");
    }

    #[test]
    fn test_pcr_change_band_boundaries() {
        assert_eq!(pcr_points(0.95, 0.11), 0);
        assert_eq!(pcr_points(0.95, -0.05), 5);
        assert_eq!(pcr_points(1.1, -0.05), 0);
        assert_eq!(pcr_points(1.3, -0.2), 0);
        assert_eq!(pcr_points(0.9, 0.0), 6);
    }

    #[test]
    fn test_breakdown_labels_in_order() {
        let labels: Vec<&str> = score_breakdown(&scenario_a())
            .iter()
            .map(|(f, _)| f.label())
            .collect();
        assert_eq!(
            labels,
            vec!["OI Trend", "PCR", "OI Change", "Volume", "Delivery", "Momentum", "Bonus"]
        );
    }

    #[test]
    fn test_trade_suggestion_tiers() {
        let strong = trade_suggestion(&scenario_a());
        assert_eq!(strong.kind, TradeKind::BuyCalls);
        assert_eq!(strong.confidence, SuggestionConfidence::High);

        let moderate = Snapshot {
            oi_trend: OiTrend::NewLong,
            pcr: 0.8,
            change_pct: 1.5,
            ..scenario_a()
        };
        // NewLong 1 + PCR<0.9 1 + momentum 1 + delivery 1 = 4
        assert_eq!(trade_suggestion(&moderate).confidence, SuggestionConfidence::Moderate);

        let unclear = Snapshot {
            oi_trend: OiTrend::Neutral,
            pcr: 1.1,
            change_pct: -0.5,
            ..scenario_a()
        };
        assert_eq!(trade_suggestion(&unclear).kind, TradeKind::Straddle);
    }
}
