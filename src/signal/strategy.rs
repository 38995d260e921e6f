//! Strategy families and their parameter bundles.
//!
//! Exactly two cross-sectional families exist, behind one closed enum:
//! reversal (fade the last `lookback` bars) and momentum (follow the
//! `lookback`-bar trend of returns lagged by a skip period). Both share the
//! post-processing pipeline in [`crate::signal::pipeline`].

use serde::{Deserialize, Serialize};

use crate::config;
use crate::data::Panel;

use super::pipeline::{
    apply_band, inverse_vol_scale, neutralize_l1, residualize_to_bench, zscore_cross_section,
};

/// Strategy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Reversal,
    Momentum,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reversal => "reversal",
            Self::Momentum => "momentum",
        }
    }
}

/// Parameter bundle for one signal sleeve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Strategy family.
    pub kind: StrategyKind,

    /// Signal lookback in bars.
    pub lookback: usize,

    /// Cross-sectional z-score band; |z| below this is forced to zero.
    pub band: f64,

    /// Rolling regression window for benchmark residualization; None
    /// disables the step.
    pub beta_window: Option<usize>,

    /// Benchmark column for residualization; None disables the step.
    pub benchmark: Option<String>,

    /// Rolling window for inverse-volatility scaling; None disables it.
    pub vol_window: Option<usize>,

    /// Momentum-only lag between signal formation and the lookback sum.
    /// Deliberately independent of `lookback` and of the annualization
    /// constant.
    pub skip: usize,
}

impl StrategyParams {
    /// Cross-sectional reversal defaults (hourly bars).
    pub fn reversal() -> Self {
        Self {
            kind: StrategyKind::Reversal,
            lookback: 4,
            band: 2.5,
            beta_window: Some(168),
            benchmark: Some(config::BENCH_DEFAULT.to_string()),
            vol_window: Some(24),
            skip: 0,
        }
    }

    /// Cross-sectional momentum defaults (hourly bars).
    pub fn momentum() -> Self {
        Self {
            kind: StrategyKind::Momentum,
            lookback: 400,
            band: 2.5,
            beta_window: None,
            benchmark: Some(config::BENCH_DEFAULT.to_string()),
            vol_window: None,
            skip: config::MOMENTUM_SKIP_BARS,
        }
    }

    /// Turn a return panel into a dollar-neutral, L1-normalized weight
    /// panel.
    ///
    /// Weights at bar t use information up to and including bar t; the
    /// execution lag against future returns belongs to the evaluator.
    pub fn weights(&self, returns: &Panel) -> Panel {
        let resid = residualize_to_bench(returns, self.benchmark.as_deref(), self.beta_window);

        let score = match self.kind {
            StrategyKind::Reversal => {
                let cum = resid.rolling_sum(self.lookback);
                let negated = cum.values().mapv(|x| -x);
                cum.with_values(negated)
            }
            StrategyKind::Momentum => resid.shift(self.skip).rolling_sum(self.lookback),
        };

        let z = zscore_cross_section(&score);
        let banded = apply_band(&z, self.band);
        let scaled = match self.vol_window {
            Some(w) if w > 1 => inverse_vol_scale(&banded, &resid, w),
            _ => banded,
        };
        neutralize_l1(&scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use ndarray::Array2;

    fn hourly_index(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect()
    }

    /// Two assets, ten bars: A gains 1% per bar, B loses 1% per bar.
    fn diverging_panel() -> Panel {
        let mut values = Array2::zeros((10, 2));
        for t in 0..10 {
            values[[t, 0]] = 0.01;
            values[[t, 1]] = -0.01;
        }
        Panel::new(
            hourly_index(10),
            vec!["A".to_string(), "B".to_string()],
            values,
        )
        .unwrap()
    }

    fn bare(kind: StrategyKind, lookback: usize, skip: usize) -> StrategyParams {
        StrategyParams {
            kind,
            lookback,
            band: 0.0,
            beta_window: None,
            benchmark: None,
            vol_window: None,
            skip,
        }
    }

    #[test]
    fn test_reversal_fades_the_winner() {
        let w = bare(StrategyKind::Reversal, 2, 0).weights(&diverging_panel());
        for t in 1..10 {
            assert!((w.values()[[t, 0]] + 0.5).abs() < 1e-12, "bar {t}");
            assert!((w.values()[[t, 1]] - 0.5).abs() < 1e-12, "bar {t}");
        }
        // Warm-up bar has no defined signal and falls back to zero weight.
        assert_eq!(w.values()[[0, 0]], 0.0);
        assert_eq!(w.values()[[0, 1]], 0.0);
    }

    #[test]
    fn test_momentum_follows_the_winner_after_warmup() {
        let w = bare(StrategyKind::Momentum, 2, 1).weights(&diverging_panel());
        for t in 2..10 {
            assert!((w.values()[[t, 0]] - 0.5).abs() < 1e-12, "bar {t}");
            assert!((w.values()[[t, 1]] + 0.5).abs() < 1e-12, "bar {t}");
        }
        for t in 0..2 {
            assert_eq!(w.values()[[t, 0]], 0.0);
            assert_eq!(w.values()[[t, 1]], 0.0);
        }
    }

    #[test]
    fn test_weights_are_dollar_neutral() {
        let mut params = StrategyParams::reversal();
        params.benchmark = None;
        params.beta_window = None;
        params.vol_window = Some(3);
        params.lookback = 2;
        params.band = 0.0;
        let mut values = Array2::zeros((12, 3));
        for t in 0..12 {
            values[[t, 0]] = 0.01 * ((t % 3) as f64 - 1.0);
            values[[t, 1]] = -0.005 * (t as f64).sin();
            values[[t, 2]] = 0.002 * ((t * t) as f64).cos();
        }
        let p = Panel::new(
            hourly_index(12),
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            values,
        )
        .unwrap();
        let w = params.weights(&p);
        for t in 0..12 {
            let sum: f64 = w.values().row(t).sum();
            assert!(sum.abs() < 1e-9, "bar {t} sums to {sum}");
        }
    }

    #[test]
    fn test_missing_benchmark_is_a_noop() {
        let mut with_missing = bare(StrategyKind::Reversal, 2, 0);
        with_missing.benchmark = Some("NOTACOIN".to_string());
        with_missing.beta_window = Some(3);
        let without = bare(StrategyKind::Reversal, 2, 0);
        let p = diverging_panel();
        assert_eq!(
            with_missing.weights(&p).values(),
            without.weights(&p).values()
        );
    }

    #[test]
    fn test_wide_band_silences_everything() {
        let mut params = bare(StrategyKind::Reversal, 2, 0);
        params.band = 5.0;
        let w = params.weights(&diverging_panel());
        assert!(w.values().iter().all(|&x| x == 0.0));
    }
}
