//! Walk-forward fold generation.
//!
//! Partitions a bar index into (train, test) ranges. Test ranges are
//! contiguous, non-overlapping, and tile the history after the initial
//! training window; a trailing remainder shorter than one test window is
//! dropped.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Training-window behavior as folds advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkForwardMode {
    /// Train start anchored at the first bar; the window grows each fold.
    Expanding,
    /// Fixed-width train window sliding forward each fold.
    Rolling,
}

impl WalkForwardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expanding => "expanding",
            Self::Rolling => "rolling",
        }
    }
}

/// Fold sizing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Training window length in days.
    pub train_days: usize,
    /// Test window length in days.
    pub test_days: usize,
    /// Expanding or rolling train window.
    pub mode: WalkForwardMode,
    /// Bars per calendar day (24 for hourly bars).
    pub bars_per_day: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_days: 365,
            test_days: 90,
            mode: WalkForwardMode::Expanding,
            bars_per_day: 24,
        }
    }
}

impl WalkForwardConfig {
    pub fn train_bars(&self) -> usize {
        self.train_days * self.bars_per_day
    }

    pub fn test_bars(&self) -> usize {
        self.test_days * self.bars_per_day
    }

    /// Annualization constant implied by the bar cadence.
    pub fn bars_per_year(&self) -> f64 {
        (self.bars_per_day * 365) as f64
    }
}

/// One (train, test) pair of contiguous row ranges. Folds are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub fold: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Generate all folds that fit a history of `n_rows` bars.
///
/// Folds are produced only while a complete test window fits; insufficient
/// history yields an empty vector, which callers must treat as a valid
/// "nothing to evaluate" outcome.
pub fn generate_splits(n_rows: usize, config: &WalkForwardConfig) -> Vec<FoldSplit> {
    let train_bars = config.train_bars();
    let test_bars = config.test_bars();
    let mut splits = Vec::new();
    if train_bars == 0 || test_bars == 0 {
        return splits;
    }

    let mut train_end = train_bars;
    let mut fold = 1;
    while train_end + test_bars <= n_rows {
        let train_start = match config.mode {
            WalkForwardMode::Expanding => 0,
            WalkForwardMode::Rolling => train_end - train_bars,
        };
        splits.push(FoldSplit {
            fold,
            train: train_start..train_end,
            test: train_end..train_end + test_bars,
        });
        train_end += test_bars;
        fold += 1;
    }
    splits
}
