//! Pluggable pick strategies for the backtest runner
//!
//! A strategy ranks the symbols of one date; the runner takes the top N.
//! Every built-in strategy drops illiquid symbols first.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cache::DataCache;
use crate::config::ScreenConfig;
use crate::scorer::{base_score, outrunner_conviction};
use crate::EngineError;

/// How many of yesterday's picks count as "already ranked"
const CONFIRM_TOP: usize = 10;

/// A ranked pick for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub score: i32,
    pub close: f64,
    pub conviction: i32,
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Candidates for `date`, best first
    fn pick(&self, cache: &DataCache, date: NaiveDate) -> Vec<Candidate>;
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    Baseline,
    SweetSpot,
    OutrunnerConviction,
    Confirmed,
}

impl StrategyId {
    pub fn all() -> &'static [StrategyId] {
        &[
            Self::Baseline,
            Self::SweetSpot,
            Self::OutrunnerConviction,
            Self::Confirmed,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::SweetSpot => "sweet_spot",
            Self::OutrunnerConviction => "outrunner_conviction",
            Self::Confirmed => "confirmed",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Baseline => "Baseline (score ranked)",
            Self::SweetSpot => "Sweet Spot (20-34)",
            Self::OutrunnerConviction => "Outrunner Conviction",
            Self::Confirmed => "Confirmed (top-10 yesterday)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Baseline => "Highest base score first, no band filter.",
            Self::SweetSpot => "Only scores inside the sweet spot, highest first.",
            Self::OutrunnerConviction => {
                "Sweet-spot symbols ranked by outrunner conviction, then score."
            }
            Self::Confirmed => {
                "Sweet-spot symbols that were also in the previous day's top 10."
            }
        }
    }

    /// Instantiate the strategy with the given screening rules
    pub fn build(&self, screen: &ScreenConfig) -> Box<dyn Strategy> {
        let screen = screen.clone();
        match self {
            Self::Baseline => Box::new(Baseline { screen }),
            Self::SweetSpot => Box::new(SweetSpot { screen }),
            Self::OutrunnerConviction => Box::new(OutrunnerConviction { screen }),
            Self::Confirmed => Box::new(Confirmed { screen }),
        }
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == key)
            .ok_or_else(|| EngineError::UnknownStrategy(s.to_string()))
    }
}

/// A catalogue entry for a backtestable strategy
#[derive(Debug, Clone, Serialize)]
pub struct StrategyCatalogEntry {
    pub id: StrategyId,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn get_catalog() -> Vec<StrategyCatalogEntry> {
    StrategyId::all()
        .iter()
        .map(|id| StrategyCatalogEntry {
            id: *id,
            name: id.display_name(),
            description: id.description(),
        })
        .collect()
}

// ============================================================================
// Implementations
// ============================================================================

/// Liquid symbols on `date`, score descending (ties in symbol order)
fn liquid_by_score(cache: &DataCache, date: NaiveDate, screen: &ScreenConfig) -> Vec<Candidate> {
    let Some(day) = cache.day(date) else {
        return Vec::new();
    };

    let mut out: Vec<Candidate> = day
        .values()
        .filter(|s| !screen.is_illiquid(s.volume_times, s.pcr))
        .map(|s| Candidate {
            symbol: s.symbol.clone(),
            score: base_score(s),
            close: s.close,
            conviction: outrunner_conviction(s).conviction,
        })
        .collect();
    out.sort_by(|a, b| b.score.cmp(&a.score));
    out
}

fn sweet_spot(cache: &DataCache, date: NaiveDate, screen: &ScreenConfig) -> Vec<Candidate> {
    let mut picks = liquid_by_score(cache, date, screen);
    picks.retain(|c| screen.in_sweet_spot(c.score));
    picks
}

pub struct Baseline {
    screen: ScreenConfig,
}

impl Strategy for Baseline {
    fn name(&self) -> &str {
        StrategyId::Baseline.as_str()
    }

    fn pick(&self, cache: &DataCache, date: NaiveDate) -> Vec<Candidate> {
        liquid_by_score(cache, date, &self.screen)
    }
}

pub struct SweetSpot {
    screen: ScreenConfig,
}

impl Strategy for SweetSpot {
    fn name(&self) -> &str {
        StrategyId::SweetSpot.as_str()
    }

    fn pick(&self, cache: &DataCache, date: NaiveDate) -> Vec<Candidate> {
        sweet_spot(cache, date, &self.screen)
    }
}

pub struct OutrunnerConviction {
    screen: ScreenConfig,
}

impl Strategy for OutrunnerConviction {
    fn name(&self) -> &str {
        StrategyId::OutrunnerConviction.as_str()
    }

    fn pick(&self, cache: &DataCache, date: NaiveDate) -> Vec<Candidate> {
        let mut picks = sweet_spot(cache, date, &self.screen);
        picks.sort_by(|a, b| (b.conviction, b.score).cmp(&(a.conviction, a.score)));
        picks
    }
}

pub struct Confirmed {
    screen: ScreenConfig,
}

impl Strategy for Confirmed {
    fn name(&self) -> &str {
        StrategyId::Confirmed.as_str()
    }

    fn pick(&self, cache: &DataCache, date: NaiveDate) -> Vec<Candidate> {
        let Some(prev) = cache.prev_date(date) else {
            return Vec::new();
        };
        let yesterday: Vec<String> = sweet_spot(cache, prev, &self.screen)
            .into_iter()
            .take(CONFIRM_TOP)
            .map(|c| c.symbol)
            .collect();

        let mut picks = sweet_spot(cache, date, &self.screen);
        picks.retain(|c| yesterday.contains(&c.symbol));
        picks
    }
}
