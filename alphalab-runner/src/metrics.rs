//! Performance metrics — pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: trade list (and, for turnover, allocation
//! snapshots) in, scalar out. Returns are fractions; trades are treated as
//! independent, non-compounding bets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use alphalab_core::domain::{AllocationSnapshot, TradeResult};
use alphalab_core::time::as_hours;
use alphalab_core::BacktestConfig;

const EPS: f64 = 1e-15;
const HOURS_PER_YEAR: f64 = 365.25 * 24.0;

/// Annualization inputs derived from the backtest range and step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Evaluation steps per year (`365.25 days / shift`).
    pub periods_per_year: f64,
    /// Length of the backtest range in years.
    pub span_years: f64,
}

impl Default for EvaluationContext {
    /// Hourly steps over one year.
    fn default() -> Self {
        Self {
            periods_per_year: HOURS_PER_YEAR,
            span_years: 1.0,
        }
    }
}

impl EvaluationContext {
    pub fn from_config(config: &BacktestConfig) -> Self {
        let shift_hours = as_hours(config.shift);
        let span_hours = as_hours(config.end - config.start);
        Self {
            periods_per_year: if shift_hours > 0.0 {
                HOURS_PER_YEAR / shift_hours
            } else {
                HOURS_PER_YEAR
            },
            span_years: (span_hours / HOURS_PER_YEAR).max(f64::EPSILON),
        }
    }

    pub fn trades_per_year(&self, trade_count: usize) -> f64 {
        trade_count as f64 / self.span_years
    }
}

/// Gross wins over gross losses, with an explicit sentinel instead of infinity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProfitFactor {
    Ratio(f64),
    /// At least one win and no losses.
    NoLosingTrades,
}

impl ProfitFactor {
    /// Numeric value; `NoLosingTrades` maps to `f64::INFINITY`.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Ratio(x) => *x,
            Self::NoLosingTrades => f64::INFINITY,
        }
    }
}

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    pub median_return: f64,
    /// Simple sum of per-trade returns; overlapping positions are not netted.
    pub total_return: f64,
    pub max_drawdown: f64,
    pub profit_factor: ProfitFactor,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub calmar: Option<f64>,
    pub volatility: f64,
    pub var_95: f64,
    pub avg_win_loss_ratio: Option<f64>,
    pub turnover: f64,
    pub avg_holding_hours: f64,
    pub information_coefficient: Option<f64>,
}

impl PerformanceMetrics {
    /// Compute all metrics from a ledger and its allocation snapshots.
    pub fn compute(trades: &[TradeResult], allocations: &[AllocationSnapshot], ctx: &EvaluationContext) -> Self {
        let returns = returns_of(trades);
        let ppy = ctx.periods_per_year;
        let max_dd = max_drawdown(trades);
        Self {
            trade_count: trades.len(),
            winning_trades: trades.iter().filter(|t| t.return_pct > 0.0).count(),
            losing_trades: trades.iter().filter(|t| t.return_pct < 0.0).count(),
            win_rate: win_rate(trades),
            avg_return: mean_f64(&returns),
            median_return: median(&returns),
            total_return: total_return(trades),
            max_drawdown: max_dd,
            profit_factor: profit_factor(trades),
            sharpe: sharpe_ratio(&returns, ppy),
            sortino: sortino_ratio(&returns, ppy),
            calmar: calmar_ratio(&returns, max_dd, ctx.trades_per_year(trades.len())),
            volatility: volatility(&returns, ppy),
            var_95: value_at_risk(&returns, 0.95),
            avg_win_loss_ratio: avg_win_loss_ratio(&returns),
            turnover: turnover(allocations),
            avg_holding_hours: avg_holding_hours(trades),
            information_coefficient: information_coefficient(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Fraction of trades with a strictly positive return, in [0, 1].
pub fn win_rate(trades: &[TradeResult]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Sum of per-trade returns.
pub fn total_return(trades: &[TradeResult]) -> f64 {
    trades.iter().map(|t| t.return_pct).sum()
}

/// Worst drop of the cumulative-sum equity curve (trades ordered by exit time),
/// starting from 0. Always <= 0.
pub fn max_drawdown(trades: &[TradeResult]) -> f64 {
    let mut by_exit: Vec<&TradeResult> = trades.iter().collect();
    by_exit.sort_by_key(|t| t.exit_time);

    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for trade in by_exit {
        equity += trade.return_pct;
        peak = peak.max(equity);
        max_dd = max_dd.min(equity - peak);
    }
    max_dd
}

pub fn profit_factor(trades: &[TradeResult]) -> ProfitFactor {
    let gross_profit: f64 = trades.iter().map(|t| t.return_pct).filter(|r| *r > 0.0).sum();
    let gross_loss: f64 = trades
        .iter()
        .map(|t| t.return_pct)
        .filter(|r| *r < 0.0)
        .map(f64::abs)
        .sum();
    if gross_loss < EPS {
        return if gross_profit > 0.0 {
            ProfitFactor::NoLosingTrades
        } else {
            ProfitFactor::Ratio(0.0)
        };
    }
    ProfitFactor::Ratio(gross_profit / gross_loss)
}

/// Annualized Sharpe ratio over per-trade returns.
///
/// Sharpe = mean / std * sqrt(periods_per_year). `None` with fewer than two
/// returns or zero variance.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> Option<f64> {
    if !has_variance(returns) {
        return None;
    }
    Some(mean_f64(returns) / std_dev(returns) * periods_per_year.sqrt())
}

/// Annualized Sortino ratio.
///
/// Downside deviation is sqrt(sum(min(r, 0)^2) / n). `None` when nothing lost,
/// and, like Sharpe, with fewer than two returns or zero variance.
pub fn sortino_ratio(returns: &[f64], periods_per_year: f64) -> Option<f64> {
    if !has_variance(returns) {
        return None;
    }
    let downside_sq: f64 = returns.iter().map(|r| r.min(0.0).powi(2)).sum();
    let downside = (downside_sq / returns.len() as f64).sqrt();
    if downside < EPS {
        return None;
    }
    Some(mean_f64(returns) / downside * periods_per_year.sqrt())
}

/// Calmar ratio: (mean return * trades per year) / |max drawdown|.
///
/// `None` without drawdown, or with fewer than two returns or zero variance.
pub fn calmar_ratio(returns: &[f64], max_drawdown: f64, trades_per_year: f64) -> Option<f64> {
    if !has_variance(returns) || max_drawdown.abs() < EPS {
        return None;
    }
    Some(mean_f64(returns) * trades_per_year / max_drawdown.abs())
}

/// Risk-adjusted ratios are undefined below two returns or at zero variance.
fn has_variance(returns: &[f64]) -> bool {
    returns.len() >= 2 && std_dev(returns) >= EPS
}

/// Annualized standard deviation of returns.
pub fn volatility(returns: &[f64], periods_per_year: f64) -> f64 {
    std_dev(returns) * periods_per_year.sqrt()
}

/// Historical VaR: the `(1 - confidence)` percentile of returns.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile(&sorted, (1.0 - confidence) * 100.0)
}

/// Average win over average |loss|; `None` without losing trades.
pub fn avg_win_loss_ratio(returns: &[f64]) -> Option<f64> {
    let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if losses.is_empty() {
        return None;
    }
    let avg_loss = mean_f64(&losses).abs();
    if avg_loss < EPS {
        return None;
    }
    Some(mean_f64(&wins) / avg_loss)
}

/// Mean share of the held set replaced between consecutive snapshots.
///
/// Each pair contributes |symmetric difference| / max(|prev|, |cur|); pairs where
/// both snapshots hold nothing are skipped.
pub fn turnover(allocations: &[AllocationSnapshot]) -> f64 {
    let changes: Vec<f64> = allocations
        .windows(2)
        .filter_map(|w| {
            let prev: Vec<&str> = w[0].held().collect();
            let cur: Vec<&str> = w[1].held().collect();
            let denom = prev.len().max(cur.len());
            if denom == 0 {
                return None;
            }
            let only_prev = prev.iter().filter(|s| !cur.contains(s)).count();
            let only_cur = cur.iter().filter(|s| !prev.contains(s)).count();
            Some((only_prev + only_cur) as f64 / denom as f64)
        })
        .collect();
    mean_f64(&changes)
}

pub fn avg_holding_hours(trades: &[TradeResult]) -> f64 {
    let hours: Vec<f64> = trades.iter().map(|t| t.holding_hours()).collect();
    mean_f64(&hours)
}

/// Spearman rank correlation between entry alpha and realized return.
///
/// Ties share their average rank. `None` with fewer than two trades or when
/// either side is constant.
pub fn information_coefficient(trades: &[TradeResult]) -> Option<f64> {
    if trades.len() < 2 {
        return None;
    }
    let alphas: Vec<f64> = trades.iter().map(|t| t.alpha_score).collect();
    let rets = returns_of(trades);
    pearson(&average_ranks(&alphas), &average_ranks(&rets))
}

// ─── Rolling window ─────────────────────────────────────────────────

/// Metrics over one window of consecutive trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingPoint {
    /// Entry time of the first trade in the window.
    pub start: DateTime<Utc>,
    /// Entry time of the last trade in the window.
    pub end: DateTime<Utc>,
    pub win_rate: f64,
    pub avg_return: f64,
}

/// Rolling win rate and average return over `window` trades ordered by entry time.
/// Empty when there are fewer trades than `window`.
pub fn rolling_metrics(trades: &[TradeResult], window: usize) -> Vec<RollingPoint> {
    if window == 0 {
        return Vec::new();
    }
    let mut ordered: Vec<&TradeResult> = trades.iter().collect();
    ordered.sort_by_key(|t| t.entry_time);
    ordered
        .windows(window)
        .map(|w| {
            let rets: Vec<f64> = w.iter().map(|t| t.return_pct).collect();
            RollingPoint {
                start: w[0].entry_time,
                end: w[w.len() - 1].entry_time,
                win_rate: rets.iter().filter(|r| **r > 0.0).count() as f64 / rets.len() as f64,
                avg_return: mean_f64(&rets),
            }
        })
        .collect()
}

// ─── Helpers ────────────────────────────────────────────────────────

fn returns_of(trades: &[TradeResult]) -> Vec<f64> {
    trades.iter().map(|t| t.return_pct).collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile(&sorted, 50.0)
}

/// Linear-interpolated percentile of an ascending slice; 0 when empty.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// 1-based ranks; tied values share the average of their positions.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }
    ranks
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let (mx, my) = (mean_f64(x), mean_f64(y));
    let cov: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let vx: f64 = x.iter().map(|a| (a - mx).powi(2)).sum();
    let vy: f64 = y.iter().map(|b| (b - my).powi(2)).sum();
    if vx < EPS || vy < EPS {
        return None;
    }
    Some(cov / (vx * vy).sqrt())
}
