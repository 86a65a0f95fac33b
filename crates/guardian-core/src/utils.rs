//! Shared helpers for the analyzers and detectors.
//!
//! Column extraction turns a polars `Series` into plain vectors once, with a
//! single definition of "missing" (null, or NaN in float columns). The
//! numeric helpers guard every division so degenerate inputs yield 0 or `None`.

use crate::types::ColumnKind;
use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is a float type (the only types that can hold NaN).
#[inline]
pub fn is_float_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Classify a DataType for analysis purposes.
pub fn column_kind(dtype: &DataType) -> ColumnKind {
    if is_numeric_dtype(dtype) {
        ColumnKind::Numeric
    } else if matches!(dtype, DataType::String | DataType::Categorical(_, _)) {
        ColumnKind::Text
    } else {
        ColumnKind::Other
    }
}

// =============================================================================
// Column Extraction
// =============================================================================

/// Per-row missing flags: null, or NaN for float columns.
pub fn missing_mask(series: &Series) -> PolarsResult<Vec<bool>> {
    if is_float_dtype(series.dtype()) {
        let floats = series.cast(&DataType::Float64)?;
        Ok(floats
            .f64()?
            .into_iter()
            .map(|v| v.is_none_or(f64::is_nan))
            .collect())
    } else {
        Ok(series.is_null().into_iter().map(|v| v.unwrap_or(true)).collect())
    }
}

/// Numeric values per row, `None` where missing.
pub fn numeric_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let floats = series.cast(&DataType::Float64)?;
    Ok(floats
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Non-missing numeric values, in row order.
pub fn present_numeric_values(series: &Series) -> PolarsResult<Vec<f64>> {
    Ok(numeric_values(series)?.into_iter().flatten().collect())
}

/// Text rendering of every cell, `None` where missing.
///
/// Numeric cells are rendered from their value so that `1` and `1.0` compare
/// equal across integer and float columns.
pub fn cell_keys(series: &Series) -> PolarsResult<Vec<Option<String>>> {
    if is_numeric_dtype(series.dtype()) {
        return Ok(numeric_values(series)?
            .into_iter()
            .map(|v| v.map(format_number))
            .collect());
    }

    let mask = missing_mask(series)?;
    let strings = series.cast(&DataType::String)?;
    Ok(strings
        .str()?
        .into_iter()
        .zip(mask)
        .map(|(v, missing)| if missing { None } else { v.map(str::to_string) })
        .collect())
}

/// Render a number without a trailing `.0` when it is integral.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Render a float the way report messages show percentages (`90.0`, `33.33`).
pub fn format_decimal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

// =============================================================================
// Numeric Utilities
// =============================================================================

/// Round to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `100 * part / whole`, or 0 when `whole` is 0.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (ddof = 1), `None` with fewer than two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Quantile of already sorted data with linear interpolation.
///
/// `q` is clamped to [0, 1]; an empty slice yields `None`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Percentile (0-100) of unsorted data with linear interpolation.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, p / 100.0)
}

/// Min-max normalize absolute values to [0, 1]; a degenerate range gives zeros.
pub fn normalize_abs(scores: &[f64]) -> Vec<f64> {
    let abs: Vec<f64> = scores.iter().map(|s| s.abs()).collect();
    let min = abs.iter().copied().fold(f64::INFINITY, f64::min);
    let max = abs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0.0; abs.len()];
    }
    abs.iter().map(|s| (s - min) / range).collect()
}

/// Indices of the `round_down(fraction * n)` largest scores, ascending.
///
/// Ties are broken by row order so the result is deterministic.
pub fn top_fraction(scores: &[f64], fraction: f64) -> Vec<usize> {
    let k = ((fraction * scores.len() as f64).floor() as usize).min(scores.len());
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    let mut top: Vec<usize> = order.into_iter().take(k).collect();
    top.sort_unstable();
    top
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_kind() {
        assert_eq!(column_kind(&DataType::Int64), ColumnKind::Numeric);
        assert_eq!(column_kind(&DataType::Float32), ColumnKind::Numeric);
        assert_eq!(column_kind(&DataType::String), ColumnKind::Text);
        assert_eq!(column_kind(&DataType::Boolean), ColumnKind::Other);
        assert_eq!(column_kind(&DataType::Date), ColumnKind::Other);
    }

    #[test]
    fn test_missing_mask_counts_nan_in_float_columns() {
        let series = Series::new("x".into(), &[Some(1.0), None, Some(f64::NAN), Some(4.0)]);
        assert_eq!(missing_mask(&series).unwrap(), vec![false, true, true, false]);
    }

    #[test]
    fn test_missing_mask_text() {
        let series = Series::new("s".into(), &[Some("a"), None, Some("NaN")]);
        assert_eq!(missing_mask(&series).unwrap(), vec![false, true, false]);
    }

    #[test]
    fn test_cell_keys_unify_integral_floats() {
        let ints = Series::new("i".into(), &[Some(1i64), None, Some(3)]);
        let floats = Series::new("f".into(), &[1.0f64, 2.5, 3.0]);
        assert_eq!(
            cell_keys(&ints).unwrap(),
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
        assert_eq!(
            cell_keys(&floats).unwrap(),
            vec![Some("1".to_string()), Some("2.5".to_string()), Some("3".to_string())]
        );
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&sorted, 0.25), Some(1.75));
        assert_eq!(quantile_sorted(&sorted, 0.75), Some(3.25));
        assert_eq!(quantile_sorted(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile_sorted(&sorted, 1.0), Some(4.0));
        assert_eq!(quantile_sorted(&[], 0.5), None);
    }

    #[test]
    fn test_percentile_unsorted() {
        let values = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        let p90 = percentile(&values, 90.0).unwrap();
        assert!((p90 - 4.6).abs() < 1e-12);
    }

    #[test]
    fn test_sample_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = sample_std(&values).unwrap();
        assert!((std - 2.138089935).abs() < 1e-6);
        assert_eq!(sample_std(&[1.0]), None);
    }

    #[test]
    fn test_normalize_abs() {
        assert_eq!(normalize_abs(&[-2.0, 1.0, 0.0]), vec![1.0, 0.5, 0.0]);
        assert_eq!(normalize_abs(&[3.0, -3.0]), vec![0.0, 0.0]);
        assert!(normalize_abs(&[]).is_empty());
    }

    #[test]
    fn test_top_fraction_breaks_ties_by_row() {
        let scores = [0.1, 0.9, 0.9, 0.2, 0.5];
        assert_eq!(top_fraction(&scores, 0.4), vec![1, 2]);
        assert_eq!(top_fraction(&scores, 0.1), Vec::<usize>::new());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_decimal(90.0), "90.0");
        assert_eq!(format_decimal(33.33), "33.33");
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(round_to(12.3456, 2), 12.35);
        assert_eq!(percentage(1, 4), 25.0);
        assert_eq!(percentage(1, 0), 0.0);
    }
}
