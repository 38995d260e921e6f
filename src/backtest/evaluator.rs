//! Vectorized no-lookahead backtest evaluator.
//!
//! The weight decided at bar t-1 earns the return realized at bar t. That
//! one-bar lag is the only lookahead protection inside the evaluator and is
//! never applied anywhere else; signal code produces same-bar weights.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::data::types::{nan_mean, nan_std};
use crate::data::{Panel, TimeSeries};

/// Annualized summary of one backtest, gross and net of costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub ann_ret_gross: f64,
    pub ann_ret_net: f64,
    pub ann_vol_gross: f64,
    pub ann_vol_net: f64,
    /// NaN when the return volatility is zero or undefined.
    pub sharpe_gross: f64,
    pub sharpe_net: f64,
    /// Mean per-bar turnover (sum of absolute weight changes).
    pub turnover_bar: f64,
    pub turnover_ann: f64,
    /// Annualized cost drag at the configured cost rate.
    pub cost_ann: f64,
}

/// Per-bar output series plus the summary.
#[derive(Debug, Clone)]
pub struct BacktestOutput {
    pub net: TimeSeries,
    pub gross: TimeSeries,
    pub turnover: TimeSeries,
    pub cost: TimeSeries,
    pub summary: BacktestSummary,
}

/// Evaluate a weight panel against a return panel over their common columns.
///
/// Both panels must share the same time index (the harness always slices
/// them from one parent panel). `cost_rate` is a fraction of notional per
/// unit of turnover. Undefined weights contribute neither P&L nor turnover.
pub fn backtest(
    weights: &Panel,
    returns: &Panel,
    cost_rate: f64,
    bars_per_year: f64,
) -> BacktestOutput {
    debug_assert_eq!(weights.index(), returns.index());

    let common = weights.common_columns(returns);
    let n = weights.n_rows();
    let mut gross = Array1::zeros(n);
    let mut turnover = Array1::zeros(n);

    if !common.is_empty() && n > 0 {
        let w_pos: Vec<usize> = common
            .iter()
            .filter_map(|c| weights.column_position(c))
            .collect();
        let r_pos: Vec<usize> = common
            .iter()
            .filter_map(|c| returns.column_position(c))
            .collect();
        let wv = weights.values();
        let rv = returns.values();

        for t in 1..n {
            let mut pnl = 0.0;
            let mut to = 0.0;
            for (&wc, &rc) in w_pos.iter().zip(&r_pos) {
                let contribution = wv[[t - 1, wc]] * rv[[t, rc]];
                if contribution.is_finite() {
                    pnl += contribution;
                }
                let change = wv[[t, wc]] - wv[[t - 1, wc]];
                if change.is_finite() {
                    to += change.abs();
                }
            }
            gross[t] = pnl;
            turnover[t] = to;
        }
    }

    let cost = turnover.mapv(|x| cost_rate * x);
    let net = &gross - &cost;

    let summary = BacktestSummary {
        ann_ret_gross: nan_mean(gross.view()) * bars_per_year,
        ann_ret_net: nan_mean(net.view()) * bars_per_year,
        ann_vol_gross: nan_std(gross.view()) * bars_per_year.sqrt(),
        ann_vol_net: nan_std(net.view()) * bars_per_year.sqrt(),
        sharpe_gross: ann_sharpe(gross.view(), bars_per_year),
        sharpe_net: ann_sharpe(net.view(), bars_per_year),
        turnover_bar: nan_mean(turnover.view()),
        turnover_ann: nan_mean(turnover.view()) * bars_per_year,
        cost_ann: nan_mean(cost.view()) * bars_per_year,
    };

    let index = weights.index().to_vec();
    BacktestOutput {
        net: TimeSeries::from_parts(index.clone(), net),
        gross: TimeSeries::from_parts(index.clone(), gross),
        turnover: TimeSeries::from_parts(index.clone(), turnover),
        cost: TimeSeries::from_parts(index, cost),
        summary,
    }
}

/// Annualized Sharpe ratio of a per-bar return series; NaN when the standard
/// deviation is zero or undefined.
pub fn ann_sharpe(returns: ndarray::ArrayView1<f64>, bars_per_year: f64) -> f64 {
    let sd = nan_std(returns);
    if !sd.is_finite() || sd == 0.0 {
        return f64::NAN;
    }
    nan_mean(returns) / sd * bars_per_year.sqrt()
}
