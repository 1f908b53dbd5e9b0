//! Built-in strategies shipped with the registry.

pub mod bollinger_reversion;
pub mod macd_rsi_confluence;
pub mod momentum_rank;

pub use bollinger_reversion::BollingerMeanReversion;
pub use macd_rsi_confluence::MacdRsiConfluence;
pub use momentum_rank::MomentumRank;

use crate::domain::Symbol;

/// Sort `(symbol, score)` candidates best-first (ties by symbol) and keep the top `n`.
pub(crate) fn top_ranked(mut candidates: Vec<(Symbol, f64)>, n: usize) -> Vec<Symbol> {
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    candidates.into_iter().take(n).map(|(s, _)| s).collect()
}

/// Percentage move from `entry` to `current`.
pub(crate) fn pnl_pct(entry_price: f64, current_price: f64) -> f64 {
    if entry_price <= 0.0 {
        return 0.0;
    }
    (current_price - entry_price) / entry_price * 100.0
}
