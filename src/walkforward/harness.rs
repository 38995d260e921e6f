//! Single-sleeve walk-forward evaluation.
//!
//! For each fold the weight panel is recomputed over the combined
//! train+test window, never over the test slice alone: rolling statistics
//! inside the signal engine then warm up on bars at or before each row, so
//! the start of the test window has defined weights without ever touching
//! post-test-start information. The rebalance mask is computed once over
//! the full history and sliced per fold, keeping the trade calendar's phase
//! stable as fold boundaries advance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::backtest::{apply_schedule, backtest, rebalance_mask};
use crate::data::{Panel, PanelError, TimeSeries};
use crate::metrics::perf_stats;
use crate::signal::StrategyParams;

use super::splits::{generate_splits, FoldSplit, WalkForwardConfig, WalkForwardMode};

/// Walk-forward configuration and alignment errors. All of these surface
/// before any fold computation begins.
#[derive(Error, Debug)]
pub enum WalkForwardError {
    #[error("unknown blend policy: {0}")]
    UnknownBlendPolicy(String),

    #[error("blend policy 'static' requires a static weight")]
    MissingStaticWeight,

    #[error("static blend weight {0} is outside [0, 1]")]
    InvalidStaticWeight(f64),

    #[error(transparent)]
    Panel(#[from] PanelError),
}

/// One weight-generating sleeve: a strategy parameter bundle plus its
/// rebalance cadence in bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleeveSpec {
    pub strategy: StrategyParams,
    pub every: usize,
}

/// Per-fold result row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldRecord {
    pub fold: usize,
    pub mode: WalkForwardMode,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
    pub train_days: i64,
    pub test_days: i64,
    pub cost_bps: f64,
    pub test_ann_ret: f64,
    pub test_ann_vol: f64,
    pub test_sharpe: f64,
}

/// Walk-forward output: the fold table and the stitched out-of-sample
/// net-return series.
#[derive(Debug, Clone)]
pub struct WalkForwardReport {
    pub folds: Vec<FoldRecord>,
    pub oos_net: TimeSeries,
}

/// Run a single-sleeve walk-forward over a return panel.
///
/// Insufficient history for one complete fold returns an empty report, not
/// an error.
pub fn run_walk_forward(
    returns: &Panel,
    sleeve: &SleeveSpec,
    cost_bps: f64,
    config: &WalkForwardConfig,
) -> Result<WalkForwardReport, WalkForwardError> {
    let cost_rate = cost_bps / 10_000.0;
    let bars_per_year = config.bars_per_year();
    let splits = generate_splits(returns.n_rows(), config);
    if splits.is_empty() {
        info!(
            rows = returns.n_rows(),
            train_bars = config.train_bars(),
            test_bars = config.test_bars(),
            "history too short for a single fold"
        );
        return Ok(WalkForwardReport {
            folds: Vec::new(),
            oos_net: TimeSeries::empty(),
        });
    }

    let mask = rebalance_mask(returns.n_rows(), sleeve.every);

    let mut folds = Vec::with_capacity(splits.len());
    let mut segments = Vec::with_capacity(splits.len());
    for split in &splits {
        let test_weights = fold_test_weights(returns, &sleeve.strategy, &mask, split);
        let test_returns = returns.slice_rows(split.test.clone());
        let result = backtest(&test_weights, &test_returns, cost_rate, bars_per_year);
        let stats = perf_stats(&result.net, bars_per_year);
        debug!(
            fold = split.fold,
            sharpe = stats.sharpe,
            "evaluated test slice"
        );

        folds.push(fold_record(returns, split, config.mode, cost_bps, &stats));
        segments.push(result.net);
    }

    let oos_net = TimeSeries::concat(&segments)?;
    Ok(WalkForwardReport { folds, oos_net })
}

/// Shared recompute-then-slice helper.
///
/// Builds weights over the fold's combined train+test window, applies the
/// globally-phased cadence mask restricted to that window, and slices out
/// the test range. Used by the single-sleeve harness and by the blender for
/// each sleeve.
pub(crate) fn fold_test_weights(
    returns: &Panel,
    strategy: &StrategyParams,
    mask: &[bool],
    split: &FoldSplit,
) -> Panel {
    let window = split.train.start..split.test.end;
    let fold_panel = returns.slice_rows(window.clone());
    let weights = strategy.weights(&fold_panel);
    let scheduled = apply_schedule(&weights, &mask[window.clone()]);
    let offset = split.test.start - window.start;
    scheduled.slice_rows(offset..offset + split.test.len())
}

pub(crate) fn fold_record(
    returns: &Panel,
    split: &FoldSplit,
    mode: WalkForwardMode,
    cost_bps: f64,
    stats: &crate::metrics::PerfStats,
) -> FoldRecord {
    let index = returns.index();
    let train_start = index[split.train.start];
    let train_end = index[split.train.end - 1];
    let test_start = index[split.test.start];
    let test_end = index[split.test.end - 1];
    FoldRecord {
        fold: split.fold,
        mode,
        train_start,
        train_end,
        test_start,
        test_end,
        train_days: (train_end - train_start).num_days() + 1,
        test_days: (test_end - test_start).num_days() + 1,
        cost_bps,
        test_ann_ret: stats.ann_ret,
        test_ann_vol: stats.ann_vol,
        test_sharpe: stats.sharpe,
    }
}
