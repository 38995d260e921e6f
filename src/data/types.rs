//! Core panel and series types.
//!
//! A [`Panel`] is a time-indexed table of f64 values, one column per asset,
//! backed by an `ndarray::Array2`. The index is strictly increasing and
//! shared by every column; `f64::NAN` marks undefined entries (warm-up rows
//! of rolling statistics, masked rebalance rows). A [`TimeSeries`] is the
//! single-column counterpart used for return streams.

use chrono::{DateTime, Utc};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use thiserror::Error;

/// Errors from panel construction and alignment.
#[derive(Error, Debug)]
pub enum PanelError {
    #[error("shape mismatch: {rows}x{cols} values vs {index_len} index rows, {columns_len} columns")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        index_len: usize,
        columns_len: usize,
    },

    #[error("index is not strictly increasing at row {0}")]
    IndexNotSorted(usize),

    #[error("duplicate column label: {0}")]
    DuplicateColumn(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("panels are not aligned on the same time index")]
    IndexMismatch,
}

/// Time-indexed value panel, one column per asset.
#[derive(Debug, Clone)]
pub struct Panel {
    index: Vec<DateTime<Utc>>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Panel {
    /// Build a panel, validating shape, index ordering and label uniqueness.
    pub fn new(
        index: Vec<DateTime<Utc>>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, PanelError> {
        let (rows, cols) = values.dim();
        if rows != index.len() || cols != columns.len() {
            return Err(PanelError::ShapeMismatch {
                rows,
                cols,
                index_len: index.len(),
                columns_len: columns.len(),
            });
        }
        for (i, pair) in index.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(PanelError::IndexNotSorted(i + 1));
            }
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(PanelError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self {
            index,
            columns,
            values,
        })
    }

    /// Same index and columns, new values. Internal shortcut for transforms
    /// that preserve shape.
    pub(crate) fn with_values(&self, values: Array2<f64>) -> Self {
        debug_assert_eq!(values.dim(), self.values.dim());
        Self {
            index: self.index.clone(),
            columns: self.columns.clone(),
            values,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0 || self.n_cols() == 0
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Position of a column label, if present.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Extract one column as a series.
    pub fn column(&self, name: &str) -> Result<TimeSeries, PanelError> {
        let pos = self
            .column_position(name)
            .ok_or_else(|| PanelError::ColumnNotFound(name.to_string()))?;
        Ok(TimeSeries {
            index: self.index.clone(),
            values: self.values.column(pos).to_owned(),
        })
    }

    /// Restrict to the given columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Self, PanelError> {
        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            positions.push(
                self.column_position(name)
                    .ok_or_else(|| PanelError::ColumnNotFound(name.clone()))?,
            );
        }
        let values = self.values.select(Axis(1), &positions);
        Ok(Self {
            index: self.index.clone(),
            columns: names.to_vec(),
            values,
        })
    }

    /// Columns present in both panels, in this panel's order.
    pub fn common_columns(&self, other: &Panel) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| other.column_position(c).is_some())
            .cloned()
            .collect()
    }

    /// Drop a column if present; no-op otherwise.
    pub fn drop_column(&self, name: &str) -> Self {
        match self.column_position(name) {
            None => self.clone(),
            Some(pos) => {
                let keep: Vec<usize> = (0..self.n_cols()).filter(|&i| i != pos).collect();
                let mut columns = self.columns.clone();
                columns.remove(pos);
                Self {
                    index: self.index.clone(),
                    columns,
                    values: self.values.select(Axis(1), &keep),
                }
            }
        }
    }

    /// Contiguous row slice as an owned panel.
    pub fn slice_rows(&self, rows: std::ops::Range<usize>) -> Self {
        Self {
            index: self.index[rows.clone()].to_vec(),
            columns: self.columns.clone(),
            values: self.values.slice(s![rows, ..]).to_owned(),
        }
    }

    /// Lag every column by `periods` rows; vacated rows become NaN.
    pub fn shift(&self, periods: usize) -> Self {
        let (rows, cols) = self.values.dim();
        let mut out = Array2::from_elem((rows, cols), f64::NAN);
        if periods < rows {
            out.slice_mut(s![periods.., ..])
                .assign(&self.values.slice(s![..rows - periods, ..]));
        }
        self.with_values(out)
    }

    /// Rolling sum per column. Defined only where the trailing window holds
    /// `window` finite values.
    pub fn rolling_sum(&self, window: usize) -> Self {
        self.rolling(window, |sum, _sumsq, _w| sum)
    }

    /// Rolling mean per column, same definedness rule as rolling_sum.
    pub fn rolling_mean(&self, window: usize) -> Self {
        self.rolling(window, |sum, _sumsq, w| sum / w as f64)
    }

    /// Rolling sample standard deviation per column.
    pub fn rolling_std(&self, window: usize) -> Self {
        self.rolling(window, |sum, sumsq, w| {
            if w < 2 {
                return f64::NAN;
            }
            let var = (sumsq - sum * sum / w as f64) / (w as f64 - 1.0);
            var.max(0.0).sqrt()
        })
    }

    fn rolling(&self, window: usize, stat: impl Fn(f64, f64, usize) -> f64) -> Self {
        let (rows, cols) = self.values.dim();
        let mut out = Array2::from_elem((rows, cols), f64::NAN);
        if window == 0 {
            return self.with_values(out);
        }
        for c in 0..cols {
            let col = self.values.column(c);
            let mut sum = 0.0;
            let mut sumsq = 0.0;
            let mut missing = 0usize;
            for t in 0..rows {
                let x = col[t];
                if x.is_finite() {
                    sum += x;
                    sumsq += x * x;
                } else {
                    missing += 1;
                }
                if t >= window {
                    let old = col[t - window];
                    if old.is_finite() {
                        sum -= old;
                        sumsq -= old * old;
                    } else {
                        missing -= 1;
                    }
                }
                if t + 1 >= window && missing == 0 {
                    out[[t, c]] = stat(sum, sumsq, window);
                }
            }
        }
        self.with_values(out)
    }

    /// Linear combination `wa * a + wb * b` over the union of columns.
    ///
    /// A column present in only one panel yields NaN (no defined position on
    /// the missing side), which the evaluator treats as no position.
    pub fn blend(a: &Panel, b: &Panel, wa: f64, wb: f64) -> Result<Panel, PanelError> {
        if a.index != b.index {
            return Err(PanelError::IndexMismatch);
        }
        let mut columns = a.columns.clone();
        for c in &b.columns {
            if !columns.contains(c) {
                columns.push(c.clone());
            }
        }
        let rows = a.n_rows();
        let mut values = Array2::from_elem((rows, columns.len()), f64::NAN);
        for (j, name) in columns.iter().enumerate() {
            if let (Some(ia), Some(ib)) = (a.column_position(name), b.column_position(name)) {
                for t in 0..rows {
                    values[[t, j]] = wa * a.values[[t, ia]] + wb * b.values[[t, ib]];
                }
            }
        }
        Ok(Panel {
            index: a.index.clone(),
            columns,
            values,
        })
    }
}

/// Single time-indexed value series.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    index: Vec<DateTime<Utc>>,
    values: Array1<f64>,
}

impl TimeSeries {
    /// Build a series, validating length and index ordering.
    pub fn new(index: Vec<DateTime<Utc>>, values: Array1<f64>) -> Result<Self, PanelError> {
        if index.len() != values.len() {
            return Err(PanelError::ShapeMismatch {
                rows: values.len(),
                cols: 1,
                index_len: index.len(),
                columns_len: 1,
            });
        }
        for (i, pair) in index.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(PanelError::IndexNotSorted(i + 1));
            }
        }
        Ok(Self { index, values })
    }

    /// Construction shortcut for internal transforms that keep a valid index.
    pub(crate) fn from_parts(index: Vec<DateTime<Utc>>, values: Array1<f64>) -> Self {
        debug_assert_eq!(index.len(), values.len());
        Self { index, values }
    }

    /// Empty series.
    pub fn empty() -> Self {
        Self {
            index: Vec::new(),
            values: Array1::zeros(0),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Mean over finite values; NaN when none are finite.
    pub fn mean(&self) -> f64 {
        nan_mean(self.values.view())
    }

    /// Sample standard deviation over finite values; NaN below two
    /// observations.
    pub fn std(&self) -> f64 {
        nan_std(self.values.view())
    }

    /// Contiguous slice as an owned series.
    pub fn slice(&self, rows: std::ops::Range<usize>) -> Self {
        Self {
            index: self.index[rows.clone()].to_vec(),
            values: self.values.slice(s![rows]).to_owned(),
        }
    }

    /// Rolling mean with a full-window definedness rule.
    pub fn rolling_mean(&self, window: usize) -> Self {
        self.rolling(window, |sum, _sumsq, w| sum / w as f64)
    }

    /// Rolling sample standard deviation.
    pub fn rolling_std(&self, window: usize) -> Self {
        self.rolling(window, |sum, sumsq, w| {
            if w < 2 {
                return f64::NAN;
            }
            let var = (sumsq - sum * sum / w as f64) / (w as f64 - 1.0);
            var.max(0.0).sqrt()
        })
    }

    fn rolling(&self, window: usize, stat: impl Fn(f64, f64, usize) -> f64) -> Self {
        let n = self.values.len();
        let mut out = Array1::from_elem(n, f64::NAN);
        if window == 0 {
            return Self::from_parts(self.index.clone(), out);
        }
        let mut sum = 0.0;
        let mut sumsq = 0.0;
        let mut missing = 0usize;
        for t in 0..n {
            let x = self.values[t];
            if x.is_finite() {
                sum += x;
                sumsq += x * x;
            } else {
                missing += 1;
            }
            if t >= window {
                let old = self.values[t - window];
                if old.is_finite() {
                    sum -= old;
                    sumsq -= old * old;
                } else {
                    missing -= 1;
                }
            }
            if t + 1 >= window && missing == 0 {
                out[t] = stat(sum, sumsq, window);
            }
        }
        Self::from_parts(self.index.clone(), out)
    }

    /// Concatenate time-disjoint segments into one series sorted by time.
    pub fn concat(segments: &[TimeSeries]) -> Result<TimeSeries, PanelError> {
        let mut pairs: Vec<(DateTime<Utc>, f64)> = segments
            .iter()
            .flat_map(|s| s.index.iter().copied().zip(s.values.iter().copied()))
            .collect();
        pairs.sort_by_key(|(t, _)| *t);
        let (index, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        TimeSeries::new(index, Array1::from_vec(values))
    }
}

/// Mean over finite entries; NaN when none are finite.
pub(crate) fn nan_mean(v: ArrayView1<f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &x in v.iter() {
        if x.is_finite() {
            sum += x;
            n += 1;
        }
    }
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Sample standard deviation over finite entries; NaN below two observations.
pub(crate) fn nan_std(v: ArrayView1<f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &x in v.iter() {
        if x.is_finite() {
            sum += x;
            n += 1;
        }
    }
    if n < 2 {
        return f64::NAN;
    }
    let mean = sum / n as f64;
    let mut ss = 0.0;
    for &x in v.iter() {
        if x.is_finite() {
            ss += (x - mean) * (x - mean);
        }
    }
    (ss / (n as f64 - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;

    fn hourly_index(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect()
    }

    #[test]
    fn test_new_rejects_shape_mismatch() {
        let result = Panel::new(
            hourly_index(2),
            vec!["A".to_string()],
            array![[1.0], [2.0], [3.0]],
        );
        assert!(matches!(result, Err(PanelError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_new_rejects_unsorted_index() {
        let mut index = hourly_index(3);
        index.swap(1, 2);
        let result = Panel::new(index, vec!["A".to_string()], array![[1.0], [2.0], [3.0]]);
        assert!(matches!(result, Err(PanelError::IndexNotSorted(_))));
    }

    #[test]
    fn test_shift_fills_nan() {
        let p = Panel::new(
            hourly_index(3),
            vec!["A".to_string()],
            array![[1.0], [2.0], [3.0]],
        )
        .unwrap();
        let shifted = p.shift(1);
        assert!(shifted.values()[[0, 0]].is_nan());
        assert_eq!(shifted.values()[[1, 0]], 1.0);
        assert_eq!(shifted.values()[[2, 0]], 2.0);
    }

    #[test]
    fn test_rolling_sum_warmup_and_nan() {
        let p = Panel::new(
            hourly_index(4),
            vec!["A".to_string()],
            array![[1.0], [2.0], [f64::NAN], [4.0]],
        )
        .unwrap();
        let sum = p.rolling_sum(2);
        assert!(sum.values()[[0, 0]].is_nan());
        assert_eq!(sum.values()[[1, 0]], 3.0);
        // NaN inside the window keeps the result undefined.
        assert!(sum.values()[[2, 0]].is_nan());
        assert!(sum.values()[[3, 0]].is_nan());
    }

    #[test]
    fn test_rolling_std_matches_sample_formula() {
        let p = Panel::new(
            hourly_index(3),
            vec!["A".to_string()],
            array![[1.0], [2.0], [4.0]],
        )
        .unwrap();
        let std = p.rolling_std(3);
        let mean: f64 = 7.0 / 3.0;
        let manual = (((1.0 - mean).powi(2) + (2.0 - mean).powi(2) + (4.0 - mean).powi(2)) / 2.0)
            .sqrt();
        assert!((std.values()[[2, 0]] - manual).abs() < 1e-12);
    }

    #[test]
    fn test_select_preserves_order() {
        let p = Panel::new(
            hourly_index(1),
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            array![[1.0, 2.0, 3.0]],
        )
        .unwrap();
        let sel = p.select(&["C".to_string(), "A".to_string()]).unwrap();
        assert_eq!(sel.columns(), &["C".to_string(), "A".to_string()]);
        assert_eq!(sel.values()[[0, 0]], 3.0);
        assert_eq!(sel.values()[[0, 1]], 1.0);
    }

    #[test]
    fn test_blend_union_columns() {
        let a = Panel::new(
            hourly_index(2),
            vec!["A".to_string(), "B".to_string()],
            array![[1.0, 2.0], [3.0, 4.0]],
        )
        .unwrap();
        let b = Panel::new(
            hourly_index(2),
            vec!["B".to_string(), "C".to_string()],
            array![[10.0, 20.0], [30.0, 40.0]],
        )
        .unwrap();
        let mix = Panel::blend(&a, &b, 0.5, 0.5).unwrap();
        assert_eq!(
            mix.columns(),
            &["A".to_string(), "B".to_string(), "C".to_string()]
        );
        // Shared column is averaged, one-sided columns are undefined.
        assert_eq!(mix.values()[[0, 1]], 6.0);
        assert!(mix.values()[[0, 0]].is_nan());
        assert!(mix.values()[[0, 2]].is_nan());
    }

    #[test]
    fn test_concat_sorts_segments() {
        let full = TimeSeries::new(hourly_index(4), array![1.0, 2.0, 3.0, 4.0]).unwrap();
        let head = full.slice(0..2);
        let tail = full.slice(2..4);
        let joined = TimeSeries::concat(&[tail, head]).unwrap();
        assert_eq!(joined.len(), 4);
        assert_eq!(joined.values()[0], 1.0);
        assert_eq!(joined.values()[3], 4.0);
    }

    #[test]
    fn test_concat_rejects_overlap() {
        let full = TimeSeries::new(hourly_index(4), array![1.0, 2.0, 3.0, 4.0]).unwrap();
        let a = full.slice(0..3);
        let b = full.slice(2..4);
        assert!(TimeSeries::concat(&[a, b]).is_err());
    }

    #[test]
    fn test_nan_stats() {
        let v = array![1.0, f64::NAN, 3.0];
        assert_eq!(nan_mean(v.view()), 2.0);
        assert!((nan_std(v.view()) - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert!(nan_std(array![1.0, f64::NAN].view()).is_nan());
    }
}
