//! Runtime constants and the TOML configuration surface.
//!
//! Constants match the hourly-bar conventions used across the crate; the
//! [`AppConfig`] sections map one-to-one onto the CLI's `--config` file.
//! Every configuration problem (unknown blend policy, out-of-range static
//! weight, zero-size windows) is caught at load time, before any fold
//! computation starts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signal::{StrategyKind, StrategyParams};
use crate::walkforward::{BlendPolicy, SleeveSpec, WalkForwardConfig, WalkForwardError, WalkForwardMode};

/// Bars per calendar day for hourly panels.
pub const BARS_PER_DAY: usize = 24;

/// Per-bar statistics scale to a 365-day year of hourly bars.
pub const ANNUALIZATION: f64 = (BARS_PER_DAY * 365) as f64;

/// Default round-trip cost assumption in basis points per unit turnover.
pub const COST_BPS: f64 = 7.0;

/// Default benchmark symbol for residualization and alpha/beta reporting.
pub const BENCH_DEFAULT: &str = "BTCUSDT";

/// Momentum signal-formation lag in bars. Deliberately its own constant:
/// it is unrelated to `BARS_PER_DAY` even though both happen to be 24.
pub const MOMENTUM_SKIP_BARS: usize = 24;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    WalkForward(#[from] WalkForwardError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataSection,
    pub costs: CostSection,
    pub walkforward: WalkForwardSection,
    pub reversal: ReversalSection,
    pub momentum: MomentumSection,
    pub blend: BlendSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataSection::default(),
            costs: CostSection::default(),
            walkforward: WalkForwardSection::default(),
            reversal: ReversalSection::default(),
            momentum: MomentumSection::default(),
            blend: BlendSection::default(),
        }
    }
}

impl AppConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on configuration that would otherwise surface mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.walkforward.train_days == 0 || self.walkforward.test_days == 0 {
            return Err(ConfigError::Invalid(
                "walkforward train_days and test_days must be positive".to_string(),
            ));
        }
        if self.walkforward.bars_per_day == 0 {
            return Err(ConfigError::Invalid(
                "walkforward bars_per_day must be positive".to_string(),
            ));
        }
        if self.reversal.lookback == 0 || self.momentum.lookback == 0 {
            return Err(ConfigError::Invalid(
                "strategy lookback must be positive".to_string(),
            ));
        }
        if self.reversal.band < 0.0 || self.momentum.band < 0.0 {
            return Err(ConfigError::Invalid(
                "z-score band must be non-negative".to_string(),
            ));
        }
        if self.costs.cost_bps < 0.0 {
            return Err(ConfigError::Invalid(
                "cost_bps must be non-negative".to_string(),
            ));
        }
        // Resolving the policy validates its name and parameters.
        self.blend.to_policy()?;
        Ok(())
    }

    pub fn reversal_sleeve(&self) -> SleeveSpec {
        SleeveSpec {
            strategy: self.reversal.to_params(self.data.benchmark.clone()),
            every: self.reversal.every,
        }
    }

    pub fn momentum_sleeve(&self) -> SleeveSpec {
        SleeveSpec {
            strategy: self.momentum.to_params(self.data.benchmark.clone()),
            every: self.momentum.every,
        }
    }
}

/// Input panel location and benchmark selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub dir: String,
    pub prices_file: String,
    pub returns_file: String,
    /// Benchmark column; absent from the panel means residualization is a
    /// no-op.
    pub benchmark: Option<String>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            dir: "data".to_string(),
            prices_file: "px_1h.csv".to_string(),
            returns_file: "ret_1h.csv".to_string(),
            benchmark: Some(BENCH_DEFAULT.to_string()),
        }
    }
}

/// Transaction-cost assumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSection {
    /// Basis points of notional per unit of turnover.
    pub cost_bps: f64,
}

impl Default for CostSection {
    fn default() -> Self {
        Self { cost_bps: COST_BPS }
    }
}

/// Fold sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardSection {
    pub train_days: usize,
    pub test_days: usize,
    pub mode: WalkForwardMode,
    pub bars_per_day: usize,
}

impl Default for WalkForwardSection {
    fn default() -> Self {
        Self {
            train_days: 365,
            test_days: 90,
            mode: WalkForwardMode::Expanding,
            bars_per_day: BARS_PER_DAY,
        }
    }
}

impl WalkForwardSection {
    pub fn to_config(&self) -> WalkForwardConfig {
        WalkForwardConfig {
            train_days: self.train_days,
            test_days: self.test_days,
            mode: self.mode,
            bars_per_day: self.bars_per_day,
        }
    }
}

/// Reversal sleeve parameters (hourly-bar defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReversalSection {
    pub lookback: usize,
    pub band: f64,
    pub beta_window: Option<usize>,
    pub vol_window: Option<usize>,
    pub every: usize,
}

impl Default for ReversalSection {
    fn default() -> Self {
        Self {
            lookback: 4,
            band: 2.5,
            beta_window: Some(168),
            vol_window: Some(24),
            every: 24,
        }
    }
}

impl ReversalSection {
    pub fn to_params(&self, benchmark: Option<String>) -> StrategyParams {
        StrategyParams {
            kind: StrategyKind::Reversal,
            lookback: self.lookback,
            band: self.band,
            beta_window: self.beta_window,
            benchmark,
            vol_window: self.vol_window,
            skip: 0,
        }
    }
}

/// Momentum sleeve parameters (hourly-bar defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumSection {
    pub lookback: usize,
    pub band: f64,
    pub beta_window: Option<usize>,
    pub vol_window: Option<usize>,
    pub skip: usize,
    pub every: usize,
}

impl Default for MomentumSection {
    fn default() -> Self {
        Self {
            lookback: 400,
            band: 2.5,
            beta_window: None,
            vol_window: None,
            skip: MOMENTUM_SKIP_BARS,
            every: 720,
        }
    }
}

impl MomentumSection {
    pub fn to_params(&self, benchmark: Option<String>) -> StrategyParams {
        StrategyParams {
            kind: StrategyKind::Momentum,
            lookback: self.lookback,
            band: self.band,
            beta_window: self.beta_window,
            benchmark,
            vol_window: self.vol_window,
            skip: self.skip,
        }
    }
}

/// Sleeve blending policy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendSection {
    /// One of `equal_vol`, `fixed_half`, `static`, `train_opt`.
    pub policy: String,
    /// Required when `policy = "static"`.
    pub static_weight: Option<f64>,
    /// Grid size for `policy = "train_opt"`.
    pub grid_points: Option<usize>,
}

impl Default for BlendSection {
    fn default() -> Self {
        Self {
            policy: "equal_vol".to_string(),
            static_weight: None,
            grid_points: None,
        }
    }
}

impl BlendSection {
    pub fn to_policy(&self) -> Result<BlendPolicy, WalkForwardError> {
        BlendPolicy::from_config(&self.policy, self.static_weight, self.grid_points)
    }
}
