//! Walk-forward top-N backtesting engine

use std::collections::BTreeMap;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::cache::DataCache;
use crate::strategy::Strategy;
use crate::types::*;

/// Backtesting engine that replays a pick strategy date by date
pub struct BacktestEngine;

impl BacktestEngine {
    /// Run `strategy` over every date of `cache` that has `hold` dates after it
    pub fn run(cache: &DataCache, strategy: &dyn Strategy, config: &BacktestConfig) -> BacktestResult {
        let dates = cache.dates();
        let hold = config.hold.max(1);
        let hundred = dec!(100);

        info!(
            strategy = strategy.name(),
            dates = dates.len(),
            top_n = config.top_n,
            hold,
            capital = %config.capital,
            "Starting backtest"
        );

        let mut trades: Vec<TradeRecord> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::new();
        let mut monthly: BTreeMap<String, MonthlyStats> = BTreeMap::new();
        let mut equity = Decimal::ZERO;
        let mut peak_equity = Decimal::ZERO;
        let mut max_dd = Decimal::ZERO;
        let mut rejected = 0u32;

        for (i, &date) in dates.iter().enumerate() {
            if i + hold >= dates.len() {
                break;
            }

            for pick in strategy.pick(cache, date).into_iter().take(config.top_n) {
                let prices = cache
                    .resolve_trade_prices(&pick.symbol, pick.close, i, hold, config.max_gap_pct)
                    .and_then(|(entry, exit)| {
                        Some((Decimal::from_f64(entry)?, Decimal::from_f64(exit)?))
                    });
                let Some((entry_price, exit_price)) = prices else {
                    rejected += 1;
                    continue;
                };
                if entry_price <= Decimal::ZERO {
                    rejected += 1;
                    continue;
                }

                let shares = config.capital / entry_price;
                let pnl = ((exit_price - entry_price) * shares).round_dp(2);
                let pnl_pct = ((exit_price - entry_price) / entry_price * hundred).round_dp(2);
                equity += pnl;

                let month = monthly.entry(date.format("%Y-%m").to_string()).or_default();
                month.pnl += pnl;
                month.trades += 1;
                if pnl > Decimal::ZERO {
                    month.wins += 1;
                }

                debug!(
                    symbol = %pick.symbol,
                    date = %date,
                    entry = %entry_price,
                    exit = %exit_price,
                    pnl = %pnl,
                    "Closed trade"
                );

                trades.push(TradeRecord {
                    signal_date: date,
                    entry_date: dates[i + 1],
                    exit_date: dates[i + hold],
                    symbol: pick.symbol,
                    score: pick.score,
                    entry_price,
                    exit_price,
                    shares,
                    pnl,
                    pnl_pct,
                });
            }

            equity_curve.push(EquityPoint { date, equity });

            // Track max drawdown
            if equity > peak_equity {
                peak_equity = equity;
            }
            let drawdown = peak_equity - equity;
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }

        if trades.is_empty() {
            info!(strategy = strategy.name(), rejected, "Backtest produced no trades");
            return BacktestResult::empty(strategy.name());
        }

        // Calculate final metrics
        let total_trades = trades.len() as u32;
        let winners: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl > Decimal::ZERO).collect();
        let losers: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl < Decimal::ZERO).collect();

        let win_rate = Decimal::from(winners.len() as u32) / Decimal::from(total_trades) * hundred;

        let return_pct = if config.capital > Decimal::ZERO {
            equity / config.capital * hundred
        } else {
            Decimal::ZERO
        };

        // Profit factor = gross profits / gross losses
        let gross_profits: Decimal = winners.iter().map(|t| t.pnl).sum();
        let gross_losses: Decimal = losers.iter().map(|t| t.pnl.abs()).sum();
        let profit_factor = if gross_losses > Decimal::ZERO {
            gross_profits / gross_losses
        } else {
            Decimal::ZERO
        };

        let avg_pct = |group: &[&TradeRecord]| {
            if group.is_empty() {
                Decimal::ZERO
            } else {
                group.iter().map(|t| t.pnl_pct).sum::<Decimal>() / Decimal::from(group.len() as u32)
            }
        };

        info!(
            strategy = strategy.name(),
            total_trades,
            rejected,
            win_rate = %win_rate.round_dp(2),
            total_pnl = %equity,
            max_dd = %max_dd,
            "Backtest complete"
        );

        BacktestResult {
            strategy: strategy.name().to_string(),
            total_trades,
            total_pnl: equity,
            return_pct: return_pct.round_dp(2),
            win_rate: win_rate.round_dp(2),
            profit_factor: profit_factor.round_dp(2),
            avg_win_pct: avg_pct(&winners).round_dp(2),
            avg_loss_pct: avg_pct(&losers).round_dp(2),
            max_dd,
            monthly,
            equity: equity_curve,
            trades,
        }
    }
}

/// Convenience wrapper around [`BacktestEngine::run`]
pub fn run_backtest(cache: &DataCache, strategy: &dyn Strategy, config: &BacktestConfig) -> BacktestResult {
    BacktestEngine::run(cache, strategy, config)
}
