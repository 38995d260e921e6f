//! Rebalance scheduling.
//!
//! Converts an "every N bars" cadence into a boolean mask plus a
//! hold-forward rule. The mask is computed once over the full historical
//! index and sliced per fold, so the rebalance calendar keeps its phase as
//! fold boundaries advance.

use crate::data::Panel;

/// Cadence mask over `n_rows` bars: true marks bars where new weights take
/// effect. `every <= 1` rebalances on every bar.
pub fn rebalance_mask(n_rows: usize, every: usize) -> Vec<bool> {
    if every <= 1 {
        return vec![true; n_rows];
    }
    (0..n_rows).map(|i| i % every == 0).collect()
}

/// Hold weights between rebalance bars.
///
/// Rows outside the mask are erased and forward-filled from the last
/// retained defined value per column; rows before the first retained
/// defined value stay undefined. Pure transform.
pub fn apply_schedule(weights: &Panel, mask: &[bool]) -> Panel {
    debug_assert_eq!(mask.len(), weights.n_rows());

    let (rows, cols) = weights.values().dim();
    let mut out = ndarray::Array2::from_elem((rows, cols), f64::NAN);
    for c in 0..cols {
        let mut held = f64::NAN;
        for t in 0..rows {
            if mask[t] {
                let fresh = weights.values()[[t, c]];
                if fresh.is_finite() {
                    held = fresh;
                }
            }
            out[[t, c]] = held;
        }
    }
    weights.with_values(out)
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

    #[test]
    fn test_mask_every_bar_for_small_cadence() {
        assert_eq!(rebalance_mask(3, 0), vec![true, true, true]);
        assert_eq!(rebalance_mask(3, 1), vec![true, true, true]);
        assert_eq!(rebalance_mask(5, 2), vec![true, false, true, false, true]);
    }

    #[test]
    fn test_schedule_holds_within_blocks() {
        let mut values = Array2::zeros((7, 1));
        for t in 0..7 {
            values[[t, 0]] = t as f64;
        }
        let w = Panel::new(hourly_index(7), vec!["A".to_string()], values).unwrap();
        let mask = rebalance_mask(7, 3);
        let held = apply_schedule(&w, &mask);
        let expected = [0.0, 0.0, 0.0, 3.0, 3.0, 3.0, 6.0];
        for t in 0..7 {
            assert_eq!(held.values()[[t, 0]], expected[t], "bar {t}");
        }
    }

    #[test]
    fn test_rows_before_first_retained_value_stay_undefined() {
        let w = Panel::new(
            hourly_index(5),
            vec!["A".to_string()],
            ndarray::array![[f64::NAN], [f64::NAN], [2.0], [3.0], [4.0]],
        )
        .unwrap();
        // Sliced global mask whose first true bar inside this window is row 2.
        let mask = vec![false, false, true, false, true];
        let held = apply_schedule(&w, &mask);
        assert!(held.values()[[0, 0]].is_nan());
        assert!(held.values()[[1, 0]].is_nan());
        assert_eq!(held.values()[[2, 0]], 2.0);
        assert_eq!(held.values()[[3, 0]], 2.0);
        assert_eq!(held.values()[[4, 0]], 4.0);
    }

    #[test]
    fn test_undefined_signal_at_rebalance_bar_keeps_previous_weight() {
        let w = Panel::new(
            hourly_index(4),
            vec!["A".to_string()],
            ndarray::array![[1.0], [9.0], [f64::NAN], [9.0]],
        )
        .unwrap();
        let mask = vec![true, false, true, false];
        let held = apply_schedule(&w, &mask);
        assert_eq!(held.values()[[0, 0]], 1.0);
        assert_eq!(held.values()[[1, 0]], 1.0);
        // Rebalance bar with an undefined signal holds the prior weight.
        assert_eq!(held.values()[[2, 0]], 1.0);
        assert_eq!(held.values()[[3, 0]], 1.0);
    }
}
