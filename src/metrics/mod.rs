//! Performance statistics module.
//!
//! Provides reporting-layer calculations on return series:
//! - Annualized return, volatility, Sharpe ratio
//! - Maximum drawdown
//! - Newey-West HAC t-statistics (series mean, benchmark alpha/beta)
//! - Rolling Sharpe ratio

pub mod stats;

pub use stats::{
    alpha_beta_hac, max_drawdown, nw_mean_tstat, perf_stats, perf_summary, rolling_sharpe,
    AlphaBeta, HacMeanStat, PerfStats, PerfSummary, StatsError,
};
