pub mod backtest;
pub mod config;
pub mod data;
pub mod metrics;
pub mod signal;
pub mod walkforward;

// Re-export commonly used types
pub use backtest::{backtest, BacktestOutput, BacktestSummary};
pub use config::{AppConfig, ConfigError};
pub use data::{Panel, PanelError, TimeSeries};
pub use metrics::{max_drawdown, perf_stats, perf_summary, PerfStats, PerfSummary};
pub use signal::{StrategyKind, StrategyParams};
pub use walkforward::{
    run_walk_forward, run_walk_forward_blended, BlendPolicy, BlendedReport, FoldRecord,
    SleeveSpec, WalkForwardConfig, WalkForwardMode, WalkForwardReport,
};
