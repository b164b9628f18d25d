use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::table::{ColumnData, ObservationTable};
use crate::error::{Error, Result};

/// Values that are not NaN/inf, in input order.
pub fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Arithmetic mean over finite values; NaN when there are none.
pub fn mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Sample standard deviation (ddof = 1) over finite values; NaN below two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let (ss, n) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + (v - m).powi(2), n + 1));
    if n < 2 {
        f64::NAN
    } else {
        (ss / (n - 1) as f64).sqrt()
    }
}

pub fn nan_min(values: &[f64]) -> f64 {
    values.iter().copied().filter(|v| v.is_finite()).fold(f64::NAN, f64::min)
}

pub fn nan_max(values: &[f64]) -> f64 {
    values.iter().copied().filter(|v| v.is_finite()).fold(f64::NAN, f64::max)
}

/// Finite values sorted ascending.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut vals = finite_values(values);
    vals.sort_by(|a, b| a.total_cmp(b));
    vals
}

/// Quantile of already-sorted data with linear interpolation between order
/// statistics; NaN on empty input.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Quantile over the finite values of an unsorted slice.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted_finite(values), q)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Round to `places` decimals, passing non-finite values through.
pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `Some(v)` when `v` is finite. Everything that ends up in a serialized
/// result goes through this so NaN/inf never leak.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Descriptive statistics for a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptive {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; NaN with a single value.
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

impl Descriptive {
    /// Compute statistics from values, filtering out NaN.
    pub fn compute(values: &[f64]) -> Option<Self> {
        let vals = sorted_finite(values);
        if vals.is_empty() {
            return None;
        }

        Some(Descriptive {
            count: vals.len(),
            mean: mean(&vals),
            std: sample_std(&vals),
            min: vals[0],
            q25: quantile_sorted(&vals, 0.25),
            median: quantile_sorted(&vals, 0.5),
            q75: quantile_sorted(&vals, 0.75),
            max: vals[vals.len() - 1],
        })
    }
}

/// Label used for the single group of an ungrouped summary.
pub const ALL_ROWS: &str = "all";

/// Output of [`summary_statistics`]: group → column → statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub group_by: Option<String>,
    pub groups: BTreeMap<String, BTreeMap<String, Descriptive>>,
}

/// Count, mean, std, min, quartiles and max for `columns` (all numeric
/// columns when `None`), optionally per distinct value of `group_by`.
/// Rows whose group value is missing are left out, and columns with no
/// finite values in a group are omitted from that group.
pub fn summary_statistics(
    table: &ObservationTable,
    columns: Option<&[&str]>,
    group_by: Option<&str>,
) -> Result<SummaryStatistics> {
    let names: Vec<String> = match columns {
        Some(cols) => cols.iter().map(|c| c.to_string()).collect(),
        None => table
            .numeric_column_names()
            .into_iter()
            .filter(|c| Some(c.as_str()) != group_by)
            .collect(),
    };
    for name in &names {
        table.numeric(name)?;
    }

    let group_keys: Vec<Option<String>> = match group_by {
        None => vec![Some(ALL_ROWS.to_string()); table.len()],
        Some(g) => {
            let column = table.column(g).ok_or_else(|| Error::column_not_found(g))?;
            match &column.data {
                ColumnData::Numeric(v) => v
                    .iter()
                    .map(|x| x.is_finite().then(|| format!("{x}")))
                    .collect(),
                ColumnData::Text(v) => v
                    .iter()
                    .map(|s| (!s.is_empty()).then(|| s.clone()))
                    .collect(),
            }
        }
    };

    let mut rows_by_group: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (row, key) in group_keys.into_iter().enumerate() {
        if let Some(key) = key {
            rows_by_group.entry(key).or_default().push(row);
        }
    }

    let mut groups = BTreeMap::new();
    for (key, rows) in rows_by_group {
        let mut stats = BTreeMap::new();
        for name in &names {
            let column = table.numeric(name)?;
            let values: Vec<f64> = rows.iter().map(|&r| column[r]).collect();
            if let Some(d) = Descriptive::compute(&values) {
                stats.insert(name.clone(), d);
            }
        }
        groups.insert(key, stats);
    }

    Ok(SummaryStatistics { group_by: group_by.map(str::to_string), groups })
}
