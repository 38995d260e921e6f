//! Backtest evaluation of weight panels.
//!
//! This module turns (weight panel, return panel) pairs into realized
//! performance:
//! - One-bar execution lag (the no-lookahead guarantee)
//! - Turnover and transaction-cost accounting
//! - Annualized gross/net summary statistics
//! - Rebalance cadence masks with hold-forward semantics

pub mod evaluator;
pub mod schedule;

pub use evaluator::{ann_sharpe, backtest, BacktestOutput, BacktestSummary};
pub use schedule::{apply_schedule, rebalance_mask};
