//! Integration tests for the runner: run files on disk through the full pipeline
//! over synthetic features.

use std::io::Write;
use std::sync::atomic::AtomicBool;

use alphalab_core::features::{SyntheticConfig, SyntheticProvider};
use alphalab_core::portfolio::{AllocationMethod, CombinationMethod};
use alphalab_core::RunStatus;
use alphalab_runner::{
    diversification_score, load_features, BacktestReport, MethodComparison, RunConfig, RunMode, Runner,
};

const SINGLE: &str = r#"
label = "momentum only"

[backtest]
universe = ["BTC", "ETH", "SOL"]
start = "2024-01-05T00:00:00Z"
end = "2024-01-15T00:00:00Z"
window_hours = 8.0
shift_hours = 4.0
fee_rate = 0.0005

[[strategies]]
name = "momentum_rank"
[strategies.params]
max_positions = 2
"#;

const PORTFOLIO: &str = r#"
[backtest]
universe = ["BTC", "ETH", "SOL", "DOGE"]
start = "2024-01-05T00:00:00Z"
end = "2024-01-15T00:00:00Z"
window_hours = 8.0
shift_hours = 4.0

[[strategies]]
name = "momentum_rank"
weight = 2.0

[[strategies]]
name = "bollinger_mean_reversion"

[portfolio]
combination = "confidence_weighted"
[portfolio.allocation]
method = "proportional"
max_weight = 0.4
"#;

fn provider() -> SyntheticProvider {
    SyntheticProvider::new(SyntheticConfig {
        bars: 24 * 20,
        volatility: 0.02,
        ..SyntheticConfig::default()
    })
}

fn write_run_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

fn assert_well_formed(report: &BacktestReport, config: &RunConfig) {
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.steps, config.backtest.step_count());
    assert_eq!(report.allocations.len(), report.steps);
    assert_eq!(report.metrics.trade_count, report.trades.len());
    assert!(report
        .trades
        .windows(2)
        .all(|w| w[0].entry_time <= w[1].entry_time));
    for trade in &report.trades {
        assert!(trade.decision_time < trade.entry_time);
        assert!(trade.entry_time <= trade.exit_time);
        assert!(trade.exit_time - trade.entry_time <= config.backtest.window);
        assert!(trade.max_drawdown_within_hold <= 0.0);
    }
    for snapshot in &report.allocations {
        assert!(snapshot.total_weight() <= 1.0 + 1e-9);
    }
}

// ── Single strategy ──

#[test]
fn single_strategy_run_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(&dir, "single.toml", SINGLE);
    let config = RunConfig::load(&path).unwrap();

    let report = Runner::default().run(&config, &provider(), None).unwrap();
    assert_eq!(report.mode, RunMode::SingleStrategy);
    assert_eq!(report.label, "momentum only");
    assert!(report.diagnostics.iter().all(|d| !d.is_strategy_fault()));
    assert!(!report.trades.is_empty());
    assert_well_formed(&report, &config);
}

#[test]
fn runs_are_reproducible() {
    let config = RunConfig::from_toml_str(SINGLE).unwrap();
    let runner = Runner::default();
    let a = runner.run(&config, &provider(), None).unwrap();
    let b = runner.run(&config, &provider(), None).unwrap();
    assert_eq!(a.run_id, b.run_id);
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
}

#[test]
fn sequential_and_parallel_reports_match() {
    let mut config = RunConfig::from_toml_str(SINGLE).unwrap();
    config.evaluation.parallel = true;
    let parallel = Runner::default().run(&config, &provider(), None).unwrap();
    config.evaluation.parallel = false;
    let sequential = Runner::default().run(&config, &provider(), None).unwrap();
    assert_eq!(
        serde_json::to_string(&parallel.trades).unwrap(),
        serde_json::to_string(&sequential.trades).unwrap()
    );
}

#[test]
fn cancelled_run_reports_partial_results() {
    let config = RunConfig::from_toml_str(SINGLE).unwrap();
    let flag = AtomicBool::new(true);
    let report = Runner::default().run(&config, &provider(), Some(&flag)).unwrap();
    assert!(report.is_cancelled());
    assert_eq!(report.steps, 0);
    assert!(report.trades.is_empty());
    assert_eq!(report.metrics.trade_count, 0);
}

// ── Portfolio ──

#[test]
fn portfolio_run_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(&dir, "portfolio.toml", PORTFOLIO);
    let config = RunConfig::load(&path).unwrap();

    let report = Runner::default().run(&config, &provider(), None).unwrap();
    assert_eq!(report.mode, RunMode::Portfolio);
    assert_eq!(report.label, "momentum_rank+bollinger_mean_reversion");
    assert_well_formed(&report, &config);
    for snapshot in &report.allocations {
        assert!((0.0..=1.0).contains(&diversification_score(&snapshot.weights)));
    }
    for trade in &report.trades {
        assert!(trade.weight.is_some_and(|w| w > 0.0));
    }
}

#[test]
fn report_json_survives_disk() {
    let config = RunConfig::from_toml_str(PORTFOLIO).unwrap();
    let report = Runner::default().run(&config, &provider(), None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = write_run_file(&dir, "report.json", &report.to_json().unwrap());
    let back: BacktestReport = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(back.run_id, report.run_id);
    assert_eq!(back.mode, RunMode::Portfolio);
    assert_eq!(back.trades.len(), report.trades.len());
    assert_eq!(back.allocations.len(), report.allocations.len());
}

// ── Comparison ──

#[test]
fn compare_every_combination_method() {
    let config = RunConfig::from_toml_str(PORTFOLIO).unwrap();
    let features = load_features(&provider(), &config.backtest.universe).unwrap();
    let runner = Runner::default();

    let rows = MethodComparison::new(&runner)
        .compare_combinations(&config, &features, &CombinationMethod::ALL)
        .unwrap();
    assert_eq!(rows.len(), CombinationMethod::ALL.len());
    let defined: Vec<f64> = rows.iter().filter_map(|r| r.sharpe).collect();
    assert!(defined.windows(2).all(|w| w[0] >= w[1]));
    let first_undefined = rows.iter().position(|r| r.sharpe.is_none()).unwrap_or(rows.len());
    assert!(rows[first_undefined..].iter().all(|r| r.sharpe.is_none()));
}

#[test]
fn allocation_comparison_matches_individual_runs() {
    let config = RunConfig::from_toml_str(PORTFOLIO).unwrap();
    let features = load_features(&provider(), &config.backtest.universe).unwrap();
    let runner = Runner::default();

    let rows = MethodComparison::new(&runner)
        .with_parallelism(false)
        .compare_allocation_methods(&config, &features, &[AllocationMethod::EqualWeight, AllocationMethod::TopN])
        .unwrap();
    assert_eq!(rows.len(), 2);

    let mut single = config.clone();
    single.portfolio.as_mut().unwrap().allocation.method = AllocationMethod::EqualWeight;
    let report = runner.run_on_features(&single, &features, None).unwrap();
    let row = rows.iter().find(|r| r.method == "equal_weight").unwrap();
    assert_eq!(row.trade_count, report.metrics.trade_count);
    assert_eq!(row.total_return, report.metrics.total_return);
}
