//! Tunable screening constants
//!
//! The sweet-spot band, the liquidity guard and the gap sanity limit were all
//! calibrated empirically on past data. They live here so they can be
//! recalibrated without touching scoring or backtest logic.

use serde::{Deserialize, Serialize};

/// Default lower bound of the actionable score band
pub const SWEET_SPOT_LO: i32 = 20;
/// Default upper bound of the actionable score band
pub const SWEET_SPOT_HI: i32 = 34;
/// Default maximum plausible open-vs-close gap (%) before a price is treated as bad data
pub const MAX_GAP_PCT: f64 = 20.0;

/// Screening rules shared by the recommender, strategies and outrunner analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub sweet_spot_lo: i32,
    pub sweet_spot_hi: i32,
    /// A symbol with volume below this multiple...
    pub illiquid_volume_below: f64,
    /// ...and PCR at or above this level is untradeable noise
    pub illiquid_pcr_at_least: f64,
    pub max_gap_pct: f64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            sweet_spot_lo: SWEET_SPOT_LO,
            sweet_spot_hi: SWEET_SPOT_HI,
            illiquid_volume_below: 0.7,
            illiquid_pcr_at_least: 1.0,
            max_gap_pct: MAX_GAP_PCT,
        }
    }
}

impl ScreenConfig {
    pub fn in_sweet_spot(&self, score: i32) -> bool {
        (self.sweet_spot_lo..=self.sweet_spot_hi).contains(&score)
    }

    /// Liquidity guard: low volume combined with a neutral-to-bearish PCR
    pub fn is_illiquid(&self, volume_times: f64, pcr: f64) -> bool {
        volume_times < self.illiquid_volume_below && pcr >= self.illiquid_pcr_at_least
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweet_spot_is_inclusive() {
        let cfg = ScreenConfig::default();
        assert!(cfg.in_sweet_spot(20));
        assert!(cfg.in_sweet_spot(34));
        assert!(!cfg.in_sweet_spot(19));
        assert!(!cfg.in_sweet_spot(35));
    }

    #[test]
    fn test_liquidity_guard_needs_both_conditions() {
        let cfg = ScreenConfig::default();
        assert!(cfg.is_illiquid(0.5, 1.0));
        assert!(!cfg.is_illiquid(0.7, 1.4));
        assert!(!cfg.is_illiquid(0.5, 0.99));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: ScreenConfig = serde_json::from_str(r#"{"max_gap_pct": 15.0}"#).unwrap();
        assert_eq!(cfg.max_gap_pct, 15.0);
        assert_eq!(cfg.sweet_spot_hi, 34);
    }
}
