//! Walk-forward simulation module.
//!
//! Splits history into train/test folds, recomputes signals per fold over
//! the combined train+test window (no-lookahead warm-up), evaluates test
//! slices, and stitches the out-of-sample record:
//! - Expanding or rolling train windows
//! - Single-sleeve runs and two-sleeve blended runs
//! - Train-only blend-weight estimation (equal-vol, 50/50, static,
//!   grid-searched)

pub mod blend;
pub mod harness;
pub mod splits;

pub use blend::{
    run_walk_forward_blended, weight_grid, BlendFoldRecord, BlendPolicy, BlendedReport,
    DEFAULT_GRID_POINTS,
};
pub use harness::{run_walk_forward, FoldRecord, SleeveSpec, WalkForwardError, WalkForwardReport};
pub use splits::{generate_splits, FoldSplit, WalkForwardConfig, WalkForwardMode};
