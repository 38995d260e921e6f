//! Shared signal post-processing pipeline.
//!
//! Both strategy families run the same chain on a return panel:
//! residualize against the benchmark, cross-sectional z-score, hard band,
//! optional inverse-volatility scaling, then dollar-neutral L1 weights.
//! Undefined values (rolling warm-ups, zero denominators) stay NaN through
//! the chain and are only filled to 0.0 by the final normalization step.

use ndarray::{Array1, Array2, ArrayView1};

use crate::data::types::{nan_mean, nan_std, Panel};

/// Rolling-regression residuals of every column against a benchmark column.
///
/// beta is rolling cov / rolling var, alpha comes from the rolling means, and
/// the residual is `y - (alpha + beta * x)`. Rows before the window has a
/// full set of observations are NaN, and the benchmark column is dropped
/// from the result. A missing benchmark column or absent window disables the
/// step entirely (pass-through, not an error).
pub fn residualize_to_bench(returns: &Panel, bench: Option<&str>, window: Option<usize>) -> Panel {
    let (bench, window) = match (bench, window) {
        (Some(b), Some(w)) if w > 0 => (b, w),
        _ => return returns.clone(),
    };
    let bench_pos = match returns.column_position(bench) {
        Some(pos) => pos,
        None => return returns.clone(),
    };

    let x = returns.values().column(bench_pos);
    let x_mean = rolling_mean(x, window);
    let x_var = rolling_cov(x, x, window);

    let (rows, cols) = returns.values().dim();
    let mut out = Array2::from_elem((rows, cols), f64::NAN);
    for c in 0..cols {
        let y = returns.values().column(c);
        let y_mean = rolling_mean(y, window);
        let cov = rolling_cov(y, x, window);
        for t in 0..rows {
            // Zero benchmark variance leaves beta undefined for that bar.
            let beta = if x_var[t].is_finite() && x_var[t] != 0.0 {
                cov[t] / x_var[t]
            } else {
                f64::NAN
            };
            let alpha = y_mean[t] - beta * x_mean[t];
            out[[t, c]] = y[t] - (alpha + beta * x[t]);
        }
    }

    returns.with_values(out).drop_column(bench)
}

/// Cross-sectional z-score at each bar.
///
/// The bar is undefined (all NaN) when the cross-sectional standard
/// deviation is zero or fewer than two assets are defined.
pub fn zscore_cross_section(panel: &Panel) -> Panel {
    let (rows, cols) = panel.values().dim();
    let mut out = Array2::from_elem((rows, cols), f64::NAN);
    for t in 0..rows {
        let row = panel.values().row(t);
        let mu = nan_mean(row);
        let sd = nan_std(row);
        if !sd.is_finite() || sd == 0.0 {
            continue;
        }
        for c in 0..cols {
            out[[t, c]] = (row[c] - mu) / sd;
        }
    }
    panel.with_values(out)
}

/// Hard no-trade band: entries with |z| below the threshold become zero.
///
/// Undefined z-scores also become zero here, so a fully-undefined bar stops
/// contributing to the neutralization mean downstream. `band <= 0` disables
/// the step.
pub fn apply_band(panel: &Panel, band: f64) -> Panel {
    if band <= 0.0 {
        return panel.clone();
    }
    let values = panel
        .values()
        .mapv(|z| if z.is_finite() && z.abs() >= band { z } else { 0.0 });
    panel.with_values(values)
}

/// Divide each asset's score by its rolling return volatility.
///
/// Zero volatility marks the entry undefined rather than exploding it.
pub fn inverse_vol_scale(weights: &Panel, residual_returns: &Panel, vol_window: usize) -> Panel {
    let vol = residual_returns.rolling_std(vol_window);
    let (rows, cols) = weights.values().dim();
    let mut out = Array2::from_elem((rows, cols), f64::NAN);
    for t in 0..rows {
        for c in 0..cols {
            let v = vol.values()[[t, c]];
            out[[t, c]] = if v.is_finite() && v != 0.0 {
                weights.values()[[t, c]] / v
            } else {
                f64::NAN
            };
        }
    }
    weights.with_values(out)
}

/// Dollar-neutralize and L1-normalize each bar.
///
/// Subtracts the cross-sectional mean, divides by the sum of absolute
/// values, and fills every remaining undefined entry with zero. A bar whose
/// L1 norm is zero comes out as all zeros.
pub fn neutralize_l1(weights: &Panel) -> Panel {
    let (rows, cols) = weights.values().dim();
    let mut out = Array2::zeros((rows, cols));
    for t in 0..rows {
        let row = weights.values().row(t);
        let mu = nan_mean(row);
        let mut demeaned = Array1::from_elem(cols, f64::NAN);
        let mut l1 = 0.0;
        for c in 0..cols {
            let w = row[c] - mu;
            if w.is_finite() {
                demeaned[c] = w;
                l1 += w.abs();
            }
        }
        if l1 == 0.0 || !l1.is_finite() {
            continue;
        }
        for c in 0..cols {
            if demeaned[c].is_finite() {
                out[[t, c]] = demeaned[c] / l1;
            }
        }
    }
    weights.with_values(out)
}

fn rolling_mean(x: ArrayView1<f64>, window: usize) -> Array1<f64> {
    rolling_stat(x, x, window, |sx, _sy, _sxy, w| sx / w as f64)
}

/// Rolling sample covariance of `y` with `x`; NaN wherever either input is
/// missing inside the window.
fn rolling_cov(y: ArrayView1<f64>, x: ArrayView1<f64>, window: usize) -> Array1<f64> {
    rolling_stat(y, x, window, |sy, sx, sxy, w| {
        if w < 2 {
            return f64::NAN;
        }
        (sxy - sx * sy / w as f64) / (w as f64 - 1.0)
    })
}

fn rolling_stat(
    y: ArrayView1<f64>,
    x: ArrayView1<f64>,
    window: usize,
    stat: impl Fn(f64, f64, f64, usize) -> f64,
) -> Array1<f64> {
    let n = y.len();
    let mut out = Array1::from_elem(n, f64::NAN);
    if window == 0 {
        return out;
    }
    let mut sy = 0.0;
    let mut sx = 0.0;
    let mut sxy = 0.0;
    let mut missing = 0usize;
    for t in 0..n {
        if y[t].is_finite() && x[t].is_finite() {
            sy += y[t];
            sx += x[t];
            sxy += x[t] * y[t];
        } else {
            missing += 1;
        }
        if t >= window {
            let (yo, xo) = (y[t - window], x[t - window]);
            if yo.is_finite() && xo.is_finite() {
                sy -= yo;
                sx -= xo;
                sxy -= xo * yo;
            } else {
                missing -= 1;
            }
        }
        if t + 1 >= window && missing == 0 {
            out[t] = stat(sy, sx, sxy, window);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use ndarray::{array, Array2};

    fn hourly_index(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect()
    }

    fn panel(columns: &[&str], values: Array2<f64>) -> Panel {
        Panel::new(
            hourly_index(values.nrows()),
            columns.iter().map(|c| c.to_string()).collect(),
            values,
        )
        .unwrap()
    }

    #[test]
    fn test_residualize_passthrough_without_bench() {
        let p = panel(&["A", "B"], array![[0.01, 0.02], [0.03, 0.04]]);
        let out = residualize_to_bench(&p, Some("BTCUSDT"), Some(2));
        assert_eq!(out.columns(), p.columns());
        assert_eq!(out.values(), p.values());
    }

    #[test]
    fn test_residualize_drops_bench_and_warms_up() {
        let p = panel(
            &["A", "BENCH"],
            array![[0.01, 0.02], [0.02, 0.01], [0.03, 0.03], [0.01, 0.02]],
        );
        let out = residualize_to_bench(&p, Some("BENCH"), Some(3));
        assert_eq!(out.columns(), &["A".to_string()]);
        assert!(out.values()[[0, 0]].is_nan());
        assert!(out.values()[[1, 0]].is_nan());
        assert!(out.values()[[2, 0]].is_finite());
    }

    #[test]
    fn test_residualize_perfect_beta_gives_zero_residual() {
        // A is exactly 2x the benchmark: residuals vanish once warmed up.
        let bench = [0.01, -0.02, 0.03, 0.01, -0.01];
        let mut values = Array2::zeros((5, 2));
        for t in 0..5 {
            values[[t, 0]] = 2.0 * bench[t];
            values[[t, 1]] = bench[t];
        }
        let p = panel(&["A", "BENCH"], values);
        let out = residualize_to_bench(&p, Some("BENCH"), Some(3));
        for t in 2..5 {
            assert!(out.values()[[t, 0]].abs() < 1e-12);
        }
    }

    #[test]
    fn test_zscore_zero_dispersion_is_undefined() {
        let p = panel(&["A", "B"], array![[0.01, 0.01], [0.02, 0.01]]);
        let z = zscore_cross_section(&p);
        assert!(z.values()[[0, 0]].is_nan());
        assert!(z.values()[[0, 1]].is_nan());
        assert!(z.values()[[1, 0]].is_finite());
    }

    #[test]
    fn test_band_zeroes_small_and_undefined() {
        let p = panel(&["A", "B", "C"], array![[0.5, -3.0, f64::NAN]]);
        let banded = apply_band(&p, 1.0);
        assert_eq!(banded.values()[[0, 0]], 0.0);
        assert_eq!(banded.values()[[0, 1]], -3.0);
        assert_eq!(banded.values()[[0, 2]], 0.0);
    }

    #[test]
    fn test_neutralize_is_dollar_neutral_and_l1_one() {
        let p = panel(&["A", "B", "C"], array![[1.0, 2.0, 6.0]]);
        let w = neutralize_l1(&p);
        let sum: f64 = w.values().row(0).sum();
        let l1: f64 = w.values().row(0).iter().map(|x| x.abs()).sum();
        assert!(sum.abs() < 1e-12);
        assert!((l1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_neutralize_zero_l1_gives_zeros() {
        let p = panel(&["A", "B"], array![[1.0, 1.0], [f64::NAN, f64::NAN]]);
        let w = neutralize_l1(&p);
        assert_eq!(w.values()[[0, 0]], 0.0);
        assert_eq!(w.values()[[0, 1]], 0.0);
        assert_eq!(w.values()[[1, 0]], 0.0);
        assert_eq!(w.values()[[1, 1]], 0.0);
    }
}
