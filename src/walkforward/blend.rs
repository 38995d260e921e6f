//! Two-sleeve blended walk-forward.
//!
//! The blend weight between sleeves is estimated strictly from each fold's
//! training segment, then applied as a per-fold constant to the test-slice
//! sleeve weights before the final backtest. Sleeve weight panels for the
//! test slice are recomputed over the combined train+test window through
//! the same helper the single-sleeve harness uses.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backtest::{ann_sharpe, apply_schedule, backtest, rebalance_mask};
use crate::data::{Panel, TimeSeries};

use super::harness::{fold_record, fold_test_weights, SleeveSpec, WalkForwardError};
use super::splits::{generate_splits, WalkForwardConfig, WalkForwardMode};

/// Default number of candidates for the train-optimized grid.
pub const DEFAULT_GRID_POINTS: usize = 51;

/// How the per-fold blend weight for sleeve B is chosen. Sleeve A always
/// receives the complement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendPolicy {
    /// Inverse proportional to each sleeve's training volatility.
    EqualVol,
    /// Constant 50/50 split.
    FixedHalf,
    /// Externally supplied weight, held constant across folds.
    Static { weight_b: f64 },
    /// Grid search for the best training Sharpe.
    TrainOptimized { grid: Vec<f64> },
}

impl BlendPolicy {
    /// Resolve a policy from its configuration name and optional
    /// parameters. Unknown names and malformed parameters are fatal here,
    /// before any fold computation.
    pub fn from_config(
        name: &str,
        static_weight: Option<f64>,
        grid_points: Option<usize>,
    ) -> Result<Self, WalkForwardError> {
        match name {
            "equal_vol" => Ok(Self::EqualVol),
            "fixed_half" => Ok(Self::FixedHalf),
            "static" => {
                let weight_b = static_weight.ok_or(WalkForwardError::MissingStaticWeight)?;
                if !(0.0..=1.0).contains(&weight_b) {
                    return Err(WalkForwardError::InvalidStaticWeight(weight_b));
                }
                Ok(Self::Static { weight_b })
            }
            "train_opt" => Ok(Self::TrainOptimized {
                grid: weight_grid(grid_points.unwrap_or(DEFAULT_GRID_POINTS)),
            }),
            other => Err(WalkForwardError::UnknownBlendPolicy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::EqualVol => "equal_vol",
            Self::FixedHalf => "fixed_half",
            Self::Static { .. } => "static",
            Self::TrainOptimized { .. } => "train_opt",
        }
    }
}

/// Evenly spaced blend-weight candidates over [0, 1].
pub fn weight_grid(points: usize) -> Vec<f64> {
    if points < 2 {
        return vec![0.5];
    }
    (0..points)
        .map(|i| i as f64 / (points as f64 - 1.0))
        .collect()
}

/// Per-fold result row for a blended run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendFoldRecord {
    pub fold: usize,
    pub mode: WalkForwardMode,
    pub train_start: chrono::DateTime<chrono::Utc>,
    pub train_end: chrono::DateTime<chrono::Utc>,
    pub test_start: chrono::DateTime<chrono::Utc>,
    pub test_end: chrono::DateTime<chrono::Utc>,
    pub train_days: i64,
    pub test_days: i64,
    pub policy: String,
    pub cost_bps: f64,
    /// Train-estimated weight on sleeve A (complement of `weight_b`).
    pub weight_a: f64,
    pub weight_b: f64,
    pub test_ann_ret: f64,
    pub test_ann_vol: f64,
    pub test_sharpe: f64,
}

/// Blended walk-forward output.
#[derive(Debug, Clone)]
pub struct BlendedReport {
    pub folds: Vec<BlendFoldRecord>,
    pub oos_net: TimeSeries,
}

/// Run a two-sleeve blended walk-forward over a return panel.
pub fn run_walk_forward_blended(
    returns: &Panel,
    sleeve_a: &SleeveSpec,
    sleeve_b: &SleeveSpec,
    policy: &BlendPolicy,
    cost_bps: f64,
    config: &WalkForwardConfig,
) -> Result<BlendedReport, WalkForwardError> {
    // Parameter validation is fatal up front, never mid-run.
    if let BlendPolicy::Static { weight_b } = policy {
        if !(0.0..=1.0).contains(weight_b) {
            return Err(WalkForwardError::InvalidStaticWeight(*weight_b));
        }
    }

    let cost_rate = cost_bps / 10_000.0;
    let bars_per_year = config.bars_per_year();
    let splits = generate_splits(returns.n_rows(), config);
    if splits.is_empty() {
        info!(rows = returns.n_rows(), "history too short for a single fold");
        return Ok(BlendedReport {
            folds: Vec::new(),
            oos_net: TimeSeries::empty(),
        });
    }

    let mask_a = rebalance_mask(returns.n_rows(), sleeve_a.every);
    let mask_b = rebalance_mask(returns.n_rows(), sleeve_b.every);

    let mut folds = Vec::with_capacity(splits.len());
    let mut segments = Vec::with_capacity(splits.len());
    for split in &splits {
        // Train-only sleeves, scheduled with the global mask sliced to the
        // train window, estimate the blend weight.
        let train_returns = returns.slice_rows(split.train.clone());
        let train_a = apply_schedule(
            &sleeve_a.strategy.weights(&train_returns),
            &mask_a[split.train.clone()],
        );
        let train_b = apply_schedule(
            &sleeve_b.strategy.weights(&train_returns),
            &mask_b[split.train.clone()],
        );
        let net_a = backtest(&train_a, &train_returns, cost_rate, bars_per_year).net;
        let net_b = backtest(&train_b, &train_returns, cost_rate, bars_per_year).net;
        let weight_b = estimate_blend_weight(policy, &net_a, &net_b, bars_per_year);
        let weight_a = 1.0 - weight_b;
        debug!(fold = split.fold, weight_b, "estimated blend weight");

        // Recompute both sleeves over train+test, slice the test range, and
        // evaluate the blended panel.
        let test_a = fold_test_weights(returns, &sleeve_a.strategy, &mask_a, split);
        let test_b = fold_test_weights(returns, &sleeve_b.strategy, &mask_b, split);
        let blended = Panel::blend(&test_a, &test_b, weight_a, weight_b)?;
        let test_returns = returns.slice_rows(split.test.clone());
        let result = backtest(&blended, &test_returns, cost_rate, bars_per_year);
        let stats = crate::metrics::perf_stats(&result.net, bars_per_year);

        let base = fold_record(returns, split, config.mode, cost_bps, &stats);
        folds.push(BlendFoldRecord {
            fold: base.fold,
            mode: base.mode,
            train_start: base.train_start,
            train_end: base.train_end,
            test_start: base.test_start,
            test_end: base.test_end,
            train_days: base.train_days,
            test_days: base.test_days,
            policy: policy.name().to_string(),
            cost_bps,
            weight_a,
            weight_b,
            test_ann_ret: stats.ann_ret,
            test_ann_vol: stats.ann_vol,
            test_sharpe: stats.sharpe,
        });
        segments.push(result.net);
    }

    let oos_net = TimeSeries::concat(&segments)?;
    Ok(BlendedReport { folds, oos_net })
}

/// Estimate the fold's blend weight for sleeve B from train-only net
/// returns.
pub(crate) fn estimate_blend_weight(
    policy: &BlendPolicy,
    net_a: &TimeSeries,
    net_b: &TimeSeries,
    bars_per_year: f64,
) -> f64 {
    match policy {
        BlendPolicy::FixedHalf => 0.5,
        BlendPolicy::Static { weight_b } => *weight_b,
        BlendPolicy::EqualVol => {
            let vol_a = net_a.std() * bars_per_year.sqrt();
            let vol_b = net_b.std() * bars_per_year.sqrt();
            // A degenerate zero-volatility sleeve pins the split at 50/50
            // instead of dividing by zero.
            if !vol_a.is_finite() || !vol_b.is_finite() || vol_a == 0.0 || vol_b == 0.0 {
                return 0.5;
            }
            let raw_a = 0.5 / vol_a;
            let raw_b = 0.5 / vol_b;
            raw_b / (raw_a + raw_b)
        }
        BlendPolicy::TrainOptimized { grid } => {
            // Candidate Sharpes computed in parallel but collected in grid
            // order; the scan below keeps the first-seen winner on ties.
            let sharpes: Vec<f64> = grid
                .par_iter()
                .map(|&w| {
                    let mixed: ndarray::Array1<f64> = net_a
                        .values()
                        .iter()
                        .zip(net_b.values().iter())
                        .map(|(&a, &b)| (1.0 - w) * a + w * b)
                        .collect();
                    ann_sharpe(mixed.view(), bars_per_year)
                })
                .collect();
            let mut best = 0.5;
            let mut best_sharpe = f64::NEG_INFINITY;
            for (&w, &sharpe) in grid.iter().zip(&sharpes) {
                if sharpe.is_finite() && sharpe > best_sharpe {
                    best_sharpe = sharpe;
                    best = w;
                }
            }
            best
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{StrategyKind, StrategyParams};
    use chrono::{DateTime, TimeZone, Utc};
    use ndarray::{Array1, Array2};

    fn hourly_index(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect()
    }

    fn series(values: Vec<f64>) -> TimeSeries {
        TimeSeries::new(hourly_index(values.len()), Array1::from_vec(values)).unwrap()
    }

    #[test]
    fn test_equal_vol_splits_by_inverse_volatility() {
        let a = series(vec![0.01, -0.01, 0.01, -0.01]);
        let b = series(vec![0.02, -0.02, 0.02, -0.02]);
        let w_b = estimate_blend_weight(&BlendPolicy::EqualVol, &a, &b, 8760.0);
        // B is twice as volatile, so it gets a third of the book.
        assert!((w_b - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_equal_vol_zero_variance_sleeve_gets_half() {
        let flat = series(vec![0.01, 0.01, 0.01, 0.01]);
        let wiggly = series(vec![0.02, -0.02, 0.02, -0.02]);
        let w_b = estimate_blend_weight(&BlendPolicy::EqualVol, &flat, &wiggly, 8760.0);
        assert_eq!(w_b, 0.5);
    }

    #[test]
    fn test_train_opt_is_deterministic() {
        let a = series(vec![0.01, -0.02, 0.015, 0.002, -0.01, 0.02, 0.005, -0.004]);
        let b = series(vec![-0.005, 0.01, -0.02, 0.01, 0.015, -0.01, 0.002, 0.008]);
        let policy = BlendPolicy::TrainOptimized {
            grid: weight_grid(DEFAULT_GRID_POINTS),
        };
        let first = estimate_blend_weight(&policy, &a, &b, 8760.0);
        let second = estimate_blend_weight(&policy, &a, &b, 8760.0);
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first));
    }

    #[test]
    fn test_train_opt_degenerate_grid_falls_back_to_half() {
        // Flat sleeves have undefined Sharpe for every candidate.
        let a = series(vec![0.01, 0.01, 0.01]);
        let b = series(vec![0.02, 0.02, 0.02]);
        let policy = BlendPolicy::TrainOptimized {
            grid: weight_grid(11),
        };
        assert_eq!(estimate_blend_weight(&policy, &a, &b, 8760.0), 0.5);
    }

    #[test]
    fn test_policy_parsing_and_validation() {
        assert!(matches!(
            BlendPolicy::from_config("equal_vol", None, None),
            Ok(BlendPolicy::EqualVol)
        ));
        assert!(matches!(
            BlendPolicy::from_config("static", Some(0.3), None),
            Ok(BlendPolicy::Static { weight_b }) if weight_b == 0.3
        ));
        assert!(matches!(
            BlendPolicy::from_config("static", None, None),
            Err(WalkForwardError::MissingStaticWeight)
        ));
        assert!(matches!(
            BlendPolicy::from_config("static", Some(1.5), None),
            Err(WalkForwardError::InvalidStaticWeight(_))
        ));
        assert!(matches!(
            BlendPolicy::from_config("sharpe_parity", None, None),
            Err(WalkForwardError::UnknownBlendPolicy(_))
        ));
    }

    #[test]
    fn test_weight_grid_spans_unit_interval() {
        let grid = weight_grid(51);
        assert_eq!(grid.len(), 51);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[50], 1.0);
        assert!((grid[25] - 0.5).abs() < 1e-12);
    }

    fn fixture_panel(n: usize) -> Panel {
        let mut values = Array2::zeros((n, 3));
        for t in 0..n {
            values[[t, 0]] = 0.01 * (((t % 5) as f64) - 2.0);
            values[[t, 1]] = -0.006 * (((t % 3) as f64) - 1.0);
            values[[t, 2]] = 0.004 * (((t % 7) as f64) - 3.0);
        }
        Panel::new(
            hourly_index(n),
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            values,
        )
        .unwrap()
    }

    fn sleeve(kind: StrategyKind, lookback: usize, skip: usize, every: usize) -> SleeveSpec {
        SleeveSpec {
            strategy: StrategyParams {
                kind,
                lookback,
                band: 0.0,
                beta_window: None,
                benchmark: None,
                vol_window: None,
                skip,
            },
            every,
        }
    }

    #[test]
    fn test_blended_run_produces_fold_table_and_stitched_series() {
        let panel = fixture_panel(20);
        let config = WalkForwardConfig {
            train_days: 2,
            test_days: 1,
            mode: WalkForwardMode::Expanding,
            bars_per_day: 4,
        };
        let report = run_walk_forward_blended(
            &panel,
            &sleeve(StrategyKind::Reversal, 2, 0, 1),
            &sleeve(StrategyKind::Momentum, 2, 1, 2),
            &BlendPolicy::FixedHalf,
            7.0,
            &config,
        )
        .unwrap();
        assert_eq!(report.folds.len(), 3);
        assert_eq!(report.oos_net.index(), &panel.index()[8..20]);
        for fold in &report.folds {
            assert_eq!(fold.weight_a, 0.5);
            assert_eq!(fold.weight_b, 0.5);
            assert_eq!(fold.policy, "fixed_half");
        }
    }

    #[test]
    fn test_blended_run_rejects_bad_static_weight_before_folds() {
        let panel = fixture_panel(20);
        let config = WalkForwardConfig {
            train_days: 2,
            test_days: 1,
            mode: WalkForwardMode::Expanding,
            bars_per_day: 4,
        };
        let result = run_walk_forward_blended(
            &panel,
            &sleeve(StrategyKind::Reversal, 2, 0, 1),
            &sleeve(StrategyKind::Momentum, 2, 1, 1),
            &BlendPolicy::Static { weight_b: 1.2 },
            7.0,
            &config,
        );
        assert!(matches!(
            result,
            Err(WalkForwardError::InvalidStaticWeight(_))
        ));
    }
}
