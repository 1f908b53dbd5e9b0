//! Criterion benchmarks for AlphaLab hot paths.
//!
//! Benchmarks:
//! 1. Single-strategy walk-forward run over a synthetic universe
//! 2. Portfolio run (two strategies, combine + allocate every step)
//! 3. Signal combination across methods
//! 4. Capital allocation across methods

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use alphalab_core::domain::StrategySignal;
use alphalab_core::features::{SyntheticConfig, SyntheticProvider};
use alphalab_core::portfolio::{
    AllocationMethod, AllocatorConfig, CapitalAllocator, CombinationMethod, PortfolioManager,
    SignalCombiner,
};
use alphalab_core::strategy::builtin::{BollingerMeanReversion, MomentumRank};
use alphalab_core::strategy::{StrategyConfig, StrategyRegistry};
use alphalab_core::{BacktestConfig, FeatureSet, Simulator};
use chrono::Duration;

// ── Helpers ──────────────────────────────────────────────────────────

fn universe(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("SYM{i:03}")).collect()
}

fn features(symbols: &[String], bars: usize) -> FeatureSet {
    let provider = SyntheticProvider::new(SyntheticConfig {
        bars,
        ..SyntheticConfig::default()
    });
    symbols.iter().map(|s| provider.generate(s).unwrap()).collect()
}

fn config(symbols: Vec<String>, features: &FeatureSet) -> BacktestConfig {
    let ts = features.get(&symbols[0]).unwrap().timestamps().to_vec();
    BacktestConfig::new(
        symbols,
        ts[50],
        ts[ts.len() - 10],
        Duration::hours(6),
        Duration::hours(1),
    )
}

fn signals(symbols: usize, strategies: usize) -> Vec<StrategySignal> {
    let now = SyntheticConfig::default().start;
    (0..strategies)
        .flat_map(|k| {
            (0..symbols).map(move |i| {
                let alpha = ((i * 7 + k * 3) % 20) as f64 / 10.0 - 1.0;
                let confidence = ((i + k) % 10) as f64 / 10.0;
                StrategySignal::new(now, format!("SYM{i:03}"), alpha, confidence, Duration::hours(4))
                    .with_strategy_name(&format!("strat{k}"))
            })
        })
        .collect()
}

// ── 1. Single-strategy run ───────────────────────────────────────────

fn bench_single_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulator_run");
    for n in [5, 20] {
        let symbols = universe(n);
        let data = features(&symbols, 500);
        let sim = Simulator::new(config(symbols, &data)).unwrap();
        let strategy = MomentumRank::default();
        group.bench_with_input(BenchmarkId::new("momentum_rank", n), &n, |b, _| {
            b.iter(|| black_box(sim.run(&strategy, black_box(&data), None)))
        });
        let strategy = BollingerMeanReversion::default();
        group.bench_with_input(BenchmarkId::new("bollinger_mean_reversion", n), &n, |b, _| {
            b.iter(|| black_box(sim.run(&strategy, black_box(&data), None)))
        });
    }
    group.finish();
}

// ── 2. Portfolio run ─────────────────────────────────────────────────

fn bench_portfolio_run(c: &mut Criterion) {
    let symbols = universe(20);
    let data = features(&symbols, 500);
    let sim = Simulator::new(config(symbols, &data)).unwrap();
    let manager = PortfolioManager::from_configs(
        &StrategyRegistry::with_builtins(),
        &[
            StrategyConfig::new(MomentumRank::NAME),
            StrategyConfig::new(BollingerMeanReversion::NAME),
        ],
        CombinationMethod::ConfidenceWeighted,
        AllocatorConfig::new(AllocationMethod::Proportional),
    )
    .unwrap();
    c.bench_function("portfolio_run_20", |b| {
        b.iter(|| black_box(sim.run_portfolio(&manager, black_box(&data), None)))
    });
}

// ── 3. Combination ───────────────────────────────────────────────────

fn bench_combine(c: &mut Criterion) {
    let input = signals(100, 4);
    let mut group = c.benchmark_group("combine_100x4");
    for method in CombinationMethod::ALL {
        let combiner = SignalCombiner::new(method);
        group.bench_function(method.as_str(), |b| b.iter(|| black_box(combiner.combine(black_box(&input)))));
    }
    group.finish();
}

// ── 4. Allocation ────────────────────────────────────────────────────

fn bench_allocate(c: &mut Criterion) {
    let combined = SignalCombiner::new(CombinationMethod::ConfidenceWeighted).combine(&signals(100, 4));
    let volatility: BTreeMap<String, f64> = combined
        .iter()
        .enumerate()
        .map(|(i, s)| (s.symbol.clone(), 0.5 + (i % 7) as f64))
        .collect();
    let mut group = c.benchmark_group("allocate_100");
    for method in AllocationMethod::ALL {
        let allocator = CapitalAllocator::new(AllocatorConfig {
            max_weight: 0.2,
            ..AllocatorConfig::new(method)
        })
        .unwrap();
        group.bench_function(method.as_str(), |b| {
            b.iter(|| black_box(allocator.allocate(black_box(&combined), &volatility)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_run,
    bench_portfolio_run,
    bench_combine,
    bench_allocate,
);
criterion_main!(benches);
