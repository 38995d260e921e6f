//! Performance and inference statistics on return series.
//!
//! Consumes the stitched out-of-sample net-return series (or any per-bar
//! arithmetic return series) downstream of the walk-forward harness:
//! annualized summaries, drawdown, Newey-West HAC t-statistics for the mean
//! and for benchmark alpha/beta, and a rolling Sharpe track.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::backtest::ann_sharpe;
use crate::data::TimeSeries;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("no overlapping observations between strategy and benchmark")]
    NoOverlap,
}

/// Mean-based annualized statistics, as used in fold records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerfStats {
    pub ann_ret: f64,
    pub ann_vol: f64,
    pub sharpe: f64,
}

/// Annualized per-bar statistics: arithmetic mean scaled to a year.
pub fn perf_stats(returns: &TimeSeries, bars_per_year: f64) -> PerfStats {
    PerfStats {
        ann_ret: returns.mean() * bars_per_year,
        ann_vol: returns.std() * bars_per_year.sqrt(),
        sharpe: ann_sharpe(returns.values().view(), bars_per_year),
    }
}

/// Geometric annualized summary with drawdown, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfSummary {
    pub label: String,
    pub ann_ret: f64,
    pub ann_vol: f64,
    pub sharpe: f64,
    pub max_dd: f64,
}

/// Geometric annualized return, vol, Sharpe (annual return over annual vol)
/// and maximum drawdown. Undefined entries are ignored.
pub fn perf_summary(returns: &TimeSeries, label: &str, bars_per_year: f64) -> PerfSummary {
    let finite: Vec<f64> = returns
        .values()
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .collect();
    if finite.is_empty() {
        return PerfSummary {
            label: label.to_string(),
            ann_ret: f64::NAN,
            ann_vol: f64::NAN,
            sharpe: f64::NAN,
            max_dd: f64::NAN,
        };
    }
    let growth: f64 = finite.iter().map(|r| 1.0 + r).product();
    let ann_ret = growth.powf(bars_per_year / finite.len() as f64) - 1.0;
    let ann_vol = returns.std() * bars_per_year.sqrt();
    let sharpe = if ann_vol.is_finite() && ann_vol != 0.0 {
        ann_ret / ann_vol
    } else {
        f64::NAN
    };
    PerfSummary {
        label: label.to_string(),
        ann_ret,
        ann_vol,
        sharpe,
        max_dd: max_drawdown(returns),
    }
}

/// Maximum drawdown of the cumulative-product equity curve built from an
/// arithmetic return series. Non-positive; 0 when equity never falls below
/// its running peak. Undefined returns count as flat bars.
pub fn max_drawdown(returns: &TimeSeries) -> f64 {
    if returns.is_empty() {
        return f64::NAN;
    }
    let mut equity: f64 = 1.0;
    let mut peak: f64 = 1.0;
    let mut worst: f64 = 0.0;
    for &r in returns.values().iter() {
        let r = if r.is_finite() { r } else { 0.0 };
        equity *= 1.0 + r;
        peak = peak.max(equity);
        worst = worst.min(equity / peak - 1.0);
    }
    worst
}

/// Newey-West t-statistic for the mean of a per-bar return series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HacMeanStat {
    pub mean_bar: f64,
    pub t_stat: f64,
    pub p_value: f64,
    pub ann_mean: f64,
}

/// HAC (Bartlett-kernel) t-stat for the series mean, robust to
/// autocorrelation up to `lag_bars`.
pub fn nw_mean_tstat(returns: &TimeSeries, lag_bars: usize, bars_per_year: f64) -> HacMeanStat {
    let y: Vec<f64> = returns
        .values()
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .collect();
    let n = y.len();
    if n < 2 {
        return HacMeanStat {
            mean_bar: f64::NAN,
            t_stat: f64::NAN,
            p_value: f64::NAN,
            ann_mean: f64::NAN,
        };
    }
    let mean = y.iter().sum::<f64>() / n as f64;
    let resid: Vec<f64> = y.iter().map(|v| v - mean).collect();

    // Long-run variance of the residuals with Bartlett weights.
    let lags = lag_bars.min(n - 1);
    let mut long_run = autocovariance(&resid, 0);
    for l in 1..=lags {
        let w = 1.0 - l as f64 / (lags as f64 + 1.0);
        long_run += 2.0 * w * autocovariance(&resid, l);
    }
    // Small-sample degrees-of-freedom correction, one estimated parameter.
    long_run *= n as f64 / (n as f64 - 1.0);

    let se = (long_run / n as f64).sqrt();
    let t_stat = if se > 0.0 { mean / se } else { f64::NAN };
    HacMeanStat {
        mean_bar: mean,
        t_stat,
        p_value: two_sided_p(t_stat),
        ann_mean: mean * bars_per_year,
    }
}

/// HAC OLS regression of a strategy return series on a benchmark series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaBeta {
    pub alpha_ann: f64,
    pub alpha_t: f64,
    pub alpha_p: f64,
    pub beta: f64,
    pub beta_t: f64,
    pub beta_p: f64,
    pub r_squared: f64,
    pub n_obs: usize,
}

/// OLS of strategy on benchmark with Newey-West standard errors.
///
/// Observations are matched on timestamps; bars undefined on either side
/// are dropped. A benchmark with zero variance leaves the coefficients
/// undefined rather than failing.
pub fn alpha_beta_hac(
    strategy: &TimeSeries,
    benchmark: &TimeSeries,
    lag_bars: usize,
    bars_per_year: f64,
) -> Result<AlphaBeta, StatsError> {
    let (y, x) = align_finite(strategy, benchmark);
    let n = y.len();
    if n == 0 {
        return Err(StatsError::NoOverlap);
    }

    let xbar = x.iter().sum::<f64>() / n as f64;
    let ybar = y.iter().sum::<f64>() / n as f64;
    let sxx: f64 = x.iter().map(|v| (v - xbar) * (v - xbar)).sum();
    let sxy: f64 = x
        .iter()
        .zip(&y)
        .map(|(xv, yv)| (xv - xbar) * (yv - ybar))
        .sum();

    if sxx == 0.0 || n < 3 {
        return Ok(AlphaBeta {
            alpha_ann: f64::NAN,
            alpha_t: f64::NAN,
            alpha_p: f64::NAN,
            beta: f64::NAN,
            beta_t: f64::NAN,
            beta_p: f64::NAN,
            r_squared: f64::NAN,
            n_obs: n,
        });
    }

    let beta = sxy / sxx;
    let alpha = ybar - beta * xbar;
    let resid: Vec<f64> = y
        .iter()
        .zip(&x)
        .map(|(yv, xv)| yv - alpha - beta * xv)
        .collect();

    let sse: f64 = resid.iter().map(|e| e * e).sum();
    let sst: f64 = y.iter().map(|v| (v - ybar) * (v - ybar)).sum();
    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { f64::NAN };

    // Bread: (X'X)^-1 for X = [1, x].
    let sx: f64 = x.iter().sum();
    let sxx_raw: f64 = x.iter().map(|v| v * v).sum();
    let det = n as f64 * sxx_raw - sx * sx;
    let inv = [
        [sxx_raw / det, -sx / det],
        [-sx / det, n as f64 / det],
    ];

    // Meat: Bartlett-weighted sum of score autocovariances, g_t = x_t e_t.
    let lags = lag_bars.min(n - 1);
    let score: Vec<[f64; 2]> = x
        .iter()
        .zip(&resid)
        .map(|(xv, e)| [e * 1.0, e * xv])
        .collect();
    let mut meat = [[0.0f64; 2]; 2];
    for l in 0..=lags {
        let w = 1.0 - l as f64 / (lags as f64 + 1.0);
        for t in l..n {
            for i in 0..2 {
                for j in 0..2 {
                    let term = score[t][i] * score[t - l][j];
                    meat[i][j] += if l == 0 { term } else { w * term };
                    if l > 0 {
                        meat[i][j] += w * score[t - l][i] * score[t][j];
                    }
                }
            }
        }
    }
    // Small-sample correction with two estimated parameters.
    let correction = n as f64 / (n as f64 - 2.0);
    for row in meat.iter_mut() {
        for v in row.iter_mut() {
            *v *= correction;
        }
    }

    // Sandwich: (X'X)^-1 S (X'X)^-1.
    let mut cov = [[0.0f64; 2]; 2];
    for i in 0..2 {
        for j in 0..2 {
            let mut acc = 0.0;
            for a in 0..2 {
                for b in 0..2 {
                    acc += inv[i][a] * meat[a][b] * inv[b][j];
                }
            }
            cov[i][j] = acc;
        }
    }

    let alpha_se = cov[0][0].max(0.0).sqrt();
    let beta_se = cov[1][1].max(0.0).sqrt();
    let alpha_t = if alpha_se > 0.0 { alpha / alpha_se } else { f64::NAN };
    let beta_t = if beta_se > 0.0 { beta / beta_se } else { f64::NAN };

    Ok(AlphaBeta {
        alpha_ann: alpha * bars_per_year,
        alpha_t,
        alpha_p: two_sided_p(alpha_t),
        beta,
        beta_t,
        beta_p: two_sided_p(beta_t),
        r_squared,
        n_obs: n,
    })
}

/// Trailing-window annualized Sharpe ratio series.
pub fn rolling_sharpe(returns: &TimeSeries, window_bars: usize, bars_per_year: f64) -> TimeSeries {
    let mu = returns.rolling_mean(window_bars);
    let sd = returns.rolling_std(window_bars);
    let values = mu
        .values()
        .iter()
        .zip(sd.values().iter())
        .map(|(&m, &s)| {
            if s.is_finite() && s != 0.0 {
                m / s * bars_per_year.sqrt()
            } else {
                f64::NAN
            }
        })
        .collect();
    TimeSeries::from_parts(returns.index().to_vec(), values)
}

fn autocovariance(resid: &[f64], lag: usize) -> f64 {
    let n = resid.len();
    if lag >= n {
        return 0.0;
    }
    resid[lag..]
        .iter()
        .zip(&resid[..n - lag])
        .map(|(a, b)| a * b)
        .sum::<f64>()
        / n as f64
}

fn two_sided_p(t_stat: f64) -> f64 {
    if !t_stat.is_finite() {
        return f64::NAN;
    }
    let normal = Normal::new(0.0, 1.0).unwrap();
    2.0 * (1.0 - normal.cdf(t_stat.abs()))
}

/// Match two series on timestamps, keeping bars finite on both sides.
fn align_finite(a: &TimeSeries, b: &TimeSeries) -> (Vec<f64>, Vec<f64>) {
    let mut ya = Vec::new();
    let mut xb = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < a.len() && j < b.len() {
        let ta = a.index()[i];
        let tb = b.index()[j];
        if ta == tb {
            let (va, vb) = (a.values()[i], b.values()[j]);
            if va.is_finite() && vb.is_finite() {
                ya.push(va);
                xb.push(vb);
            }
            i += 1;
            j += 1;
        } else if ta < tb {
            i += 1;
        } else {
            j += 1;
        }
    }
    (ya, xb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use ndarray::Array1;

    fn hourly_index(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect()
    }

    fn series(values: Vec<f64>) -> TimeSeries {
        TimeSeries::new(hourly_index(values.len()), Array1::from_vec(values)).unwrap()
    }

    #[test]
    fn test_max_drawdown_monotonic_is_zero() {
        let s = series(vec![0.01, 0.0, 0.02, 0.0]);
        assert_eq!(max_drawdown(&s), 0.0);
    }

    #[test]
    fn test_max_drawdown_simple_dip() {
        // Up 10%, down 50%, partial recovery: trough is 0.55/1.1 - 1 = -50%.
        let s = series(vec![0.10, -0.50, 0.20]);
        assert!((max_drawdown(&s) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_perf_stats_flat_series_has_nan_sharpe() {
        let s = series(vec![0.01, 0.01, 0.01]);
        let stats = perf_stats(&s, 8760.0);
        assert!((stats.ann_ret - 0.01 * 8760.0).abs() < 1e-9);
        assert!(stats.sharpe.is_nan());
    }

    #[test]
    fn test_nw_mean_tstat_zero_lag_matches_plain_t() {
        let s = series(vec![0.01, -0.02, 0.03, 0.005, -0.01, 0.02]);
        let hac = nw_mean_tstat(&s, 0, 8760.0);
        let n: f64 = 6.0;
        let mean = s.mean();
        // Population variance with the n/(n-1) correction equals the sample
        // variance, so the zero-lag HAC t reduces to the classic t-stat.
        let se = s.std() / n.sqrt();
        assert!((hac.t_stat - mean / se).abs() < 1e-9);
        assert!(hac.p_value > 0.0 && hac.p_value < 1.0);
    }

    #[test]
    fn test_alpha_beta_recovers_exact_linear_relation() {
        let bench = series(vec![0.01, -0.02, 0.03, 0.005, -0.015, 0.02, -0.01, 0.015]);
        let strat_vals: Vec<f64> = bench.values().iter().map(|x| 0.001 + 1.5 * x).collect();
        let strat = series(strat_vals);
        let result = alpha_beta_hac(&strat, &bench, 2, 8760.0).unwrap();
        assert!((result.beta - 1.5).abs() < 1e-9);
        assert!((result.alpha_ann - 0.001 * 8760.0).abs() < 1e-6);
        assert!((result.r_squared - 1.0).abs() < 1e-9);
        assert_eq!(result.n_obs, 8);
    }

    #[test]
    fn test_alpha_beta_requires_overlap() {
        let a = series(vec![0.01, 0.02]);
        let later: Vec<DateTime<Utc>> = hourly_index(10)[8..].to_vec();
        let b = TimeSeries::new(later, Array1::from_vec(vec![0.01, 0.02])).unwrap();
        assert!(matches!(
            alpha_beta_hac(&a, &b, 1, 8760.0),
            Err(StatsError::NoOverlap)
        ));
    }

    #[test]
    fn test_rolling_sharpe_warmup_is_nan() {
        let s = series(vec![0.01, -0.01, 0.02, 0.01, -0.02, 0.03]);
        let rs = rolling_sharpe(&s, 3, 8760.0);
        assert!(rs.values()[0].is_nan());
        assert!(rs.values()[1].is_nan());
        assert!(rs.values()[2].is_finite());
    }
}
