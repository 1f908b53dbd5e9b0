//! Signal combiner — merges several strategies' opinions into one signal per symbol.
//!
//! Input is every signal produced at one timestamp (any number of symbols and
//! strategies). Signals are grouped by symbol; a symbol with a single signal always
//! comes back with that signal's alpha and confidence untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::StrategySignal;

/// Metadata key: method that produced a combined signal.
pub const COMBINATION_METHOD_KEY: &str = "combination_method";
/// Metadata key: number of contributing signals.
pub const NUM_STRATEGIES_KEY: &str = "num_strategies";
/// Metadata key: contributor chosen by the best-strategy rule; owns exit decisions.
pub const LEAD_STRATEGY_KEY: &str = "lead_strategy";

const UNNAMED_STRATEGY: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationMethod {
    Weighted,
    ConfidenceWeighted,
    RankAverage,
    BestStrategy,
}

impl CombinationMethod {
    pub const ALL: [CombinationMethod; 4] = [
        Self::Weighted,
        Self::ConfidenceWeighted,
        Self::RankAverage,
        Self::BestStrategy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weighted => "weighted",
            Self::ConfidenceWeighted => "confidence_weighted",
            Self::RankAverage => "rank_average",
            Self::BestStrategy => "best_strategy",
        }
    }
}

impl fmt::Display for CombinationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SignalCombiner {
    method: CombinationMethod,
    /// Per-strategy weights for `Weighted`; absent strategies weigh 1.0.
    weights: BTreeMap<String, f64>,
}

impl SignalCombiner {
    pub fn new(method: CombinationMethod) -> Self {
        Self {
            method,
            weights: BTreeMap::new(),
        }
    }

    pub fn with_weights(mut self, weights: BTreeMap<String, f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn method(&self) -> CombinationMethod {
        self.method
    }

    /// One combined signal per symbol, ordered by symbol.
    pub fn combine(&self, signals: &[StrategySignal]) -> Vec<StrategySignal> {
        let mut by_symbol: BTreeMap<&str, Vec<&StrategySignal>> = BTreeMap::new();
        for s in signals {
            by_symbol.entry(s.symbol.as_str()).or_default().push(s);
        }

        let ranks = match self.method {
            CombinationMethod::RankAverage => Some(strategy_ranks(signals)),
            _ => None,
        };
        let universe = by_symbol.len();

        by_symbol
            .into_iter()
            .map(|(symbol, group)| {
                let lead = lead_signal(&group);
                if group.len() == 1 {
                    return self.annotate(group[0].clone(), 1, lead);
                }
                let (alpha, confidence) = match self.method {
                    CombinationMethod::Weighted => self.weighted(&group),
                    CombinationMethod::ConfidenceWeighted => confidence_weighted(&group),
                    CombinationMethod::RankAverage => {
                        rank_average(symbol, &group, ranks.as_ref(), universe)
                    }
                    CombinationMethod::BestStrategy => (lead.alpha_score, lead.confidence),
                };
                let horizon = group.iter().map(|s| s.horizon).min().unwrap_or(lead.horizon);
                let combined = StrategySignal::new(lead.timestamp, symbol, alpha, confidence, horizon);
                self.annotate(combined, group.len(), lead)
            })
            .collect()
    }

    fn annotate(&self, signal: StrategySignal, contributors: usize, lead: &StrategySignal) -> StrategySignal {
        let lead_name = strategy_key(lead).to_string();
        signal
            .with_metadata(COMBINATION_METHOD_KEY, self.method.as_str())
            .with_metadata(NUM_STRATEGIES_KEY, contributors)
            .with_metadata(LEAD_STRATEGY_KEY, lead_name)
    }

    fn weighted(&self, group: &[&StrategySignal]) -> (f64, f64) {
        let weights: Vec<f64> = group
            .iter()
            .map(|s| {
                self.weights
                    .get(strategy_key(s))
                    .copied()
                    .unwrap_or(1.0)
                    .max(0.0)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return mean_pair(group);
        }
        let alpha = group.iter().zip(&weights).map(|(s, w)| s.alpha_score * w).sum::<f64>() / total;
        let conf = group.iter().zip(&weights).map(|(s, w)| s.confidence * w).sum::<f64>() / total;
        (alpha, conf)
    }
}

/// Name used to attribute a signal to its strategy.
fn strategy_key(signal: &StrategySignal) -> &str {
    signal.strategy_name().unwrap_or(UNNAMED_STRATEGY)
}

/// Highest confidence, then highest |alpha|, then earliest in input order.
fn lead_signal<'a>(group: &[&'a StrategySignal]) -> &'a StrategySignal {
    let mut best = group[0];
    for &s in &group[1..] {
        let better = s.confidence > best.confidence
            || (s.confidence == best.confidence && s.alpha_score.abs() > best.alpha_score.abs());
        if better {
            best = s;
        }
    }
    best
}

fn mean_pair(group: &[&StrategySignal]) -> (f64, f64) {
    let n = group.len() as f64;
    (
        group.iter().map(|s| s.alpha_score).sum::<f64>() / n,
        group.iter().map(|s| s.confidence).sum::<f64>() / n,
    )
}

fn confidence_weighted(group: &[&StrategySignal]) -> (f64, f64) {
    let total_conf: f64 = group.iter().map(|s| s.confidence).sum();
    let mean_conf = total_conf / group.len() as f64;
    if total_conf <= 0.0 {
        return (mean_pair(group).0, mean_conf);
    }
    let alpha = group.iter().map(|s| s.alpha_score * s.confidence).sum::<f64>() / total_conf;
    (alpha, mean_conf)
}

/// Per-strategy rank of each symbol: alpha descending, ties by symbol, 1 = best.
fn strategy_ranks(signals: &[StrategySignal]) -> BTreeMap<(&str, &str), usize> {
    let mut by_strategy: BTreeMap<&str, Vec<&StrategySignal>> = BTreeMap::new();
    for s in signals {
        by_strategy.entry(strategy_key(s)).or_default().push(s);
    }
    let mut ranks = BTreeMap::new();
    for (strategy, mut list) in by_strategy {
        list.sort_by(|a, b| {
            b.alpha_score
                .total_cmp(&a.alpha_score)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        for (i, s) in list.into_iter().enumerate() {
            ranks.entry((strategy, s.symbol.as_str())).or_insert(i + 1);
        }
    }
    ranks
}

fn rank_average<'a>(
    symbol: &'a str,
    group: &[&'a StrategySignal],
    ranks: Option<&BTreeMap<(&'a str, &'a str), usize>>,
    universe: usize,
) -> (f64, f64) {
    let (mean_alpha, mean_conf) = mean_pair(group);
    let Some(ranks) = ranks else {
        return (mean_alpha, mean_conf);
    };
    if universe <= 1 {
        return (mean_alpha, mean_conf);
    }
    let found: Vec<usize> = group
        .iter()
        .filter_map(|&s| ranks.get(&(strategy_key(s), symbol)).copied())
        .collect();
    if found.is_empty() {
        return (mean_alpha, mean_conf);
    }
    let avg_rank = found.iter().sum::<usize>() as f64 / found.len() as f64;
    let score = 1.0 - 2.0 * (avg_rank - 1.0) / (universe as f64 - 1.0);
    (score.clamp(-1.0, 1.0), mean_conf)
}
