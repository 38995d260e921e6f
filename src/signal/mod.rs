//! Signal engine: return panels in, portfolio weight panels out.
//!
//! Two cross-sectional strategy families (reversal, momentum) share one
//! post-processing pipeline: benchmark residualization, cross-sectional
//! z-score, hard banding, optional inverse-volatility scaling, and
//! dollar-neutral L1 normalization.

pub mod pipeline;
pub mod strategy;

pub use pipeline::{
    apply_band, inverse_vol_scale, neutralize_l1, residualize_to_bench, zscore_cross_section,
};
pub use strategy::{StrategyKind, StrategyParams};
