use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::table::{KeyCell, ObservationTable, TIMESTAMP};
use crate::error::{Error, Result};
use crate::processing::statistics::{mean, median, quantile_sorted, sample_std, sorted_finite};

/// Implements `label`, `Display` and `FromStr` for a unit enum from a list
/// of `Variant => "name"` pairs.
macro_rules! named_variants {
    ($ty:ident, $err:ident, { $first:ident => $first_name:literal $(, $variant:ident => $name:literal)* $(,)? }) => {
        impl $ty {
            pub fn label(&self) -> &'static str {
                match self {
                    $ty::$first => $first_name,
                    $($ty::$variant => $name,)*
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $first_name => Ok($ty::$first),
                    $($name => Ok($ty::$variant),)*
                    _ => Err(Error::$err {
                        name: s.to_string(),
                        expected: concat!($first_name $(, ", ", $name)*),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    #[default]
    ZScore,
    Iqr,
}

named_variants!(OutlierMethod, UnknownMethod, { ZScore => "zscore", Iqr => "iqr" });

/// What to put in place of a detected outlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierStrategy {
    #[default]
    Nan,
    Median,
    Mean,
    /// Clamp to the detection bounds.
    Clip,
}

named_variants!(OutlierStrategy, UnknownStrategy, {
    Nan => "nan",
    Median => "median",
    Mean => "mean",
    Clip => "clip",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    Drop,
    ForwardFill,
    BackwardFill,
    #[default]
    Interpolate,
    Mean,
    Median,
    Zero,
}

named_variants!(MissingStrategy, UnknownStrategy, {
    Drop => "drop",
    ForwardFill => "forward_fill",
    BackwardFill => "backward_fill",
    Interpolate => "interpolate",
    Mean => "mean",
    Median => "median",
    Zero => "zero",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeStrategy {
    #[default]
    Zero,
    Nan,
    Abs,
}

named_variants!(NegativeStrategy, UnknownStrategy, { Zero => "zero", Nan => "nan", Abs => "abs" });

/// Which occurrence of a duplicated row survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keep {
    #[default]
    First,
    Last,
    None,
}

named_variants!(Keep, UnknownStrategy, { First => "first", Last => "last", None => "none" });

/// A column an operation was asked to touch but could not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleaningWarning {
    pub column: String,
    pub message: String,
}

/// Cleaned table plus everything the cleaner recorded along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningOutcome {
    pub table: ObservationTable,
    pub log: Vec<String>,
    pub warnings: Vec<CleaningWarning>,
}

/// Stateful cleaner over a private copy of a table.
///
/// Every operation appends one human-readable entry per column it touches to
/// the cleaning log, including the "nothing to do" cases. The caller's table
/// is never modified.
#[derive(Debug, Clone)]
pub struct DataCleaner {
    table: ObservationTable,
    log: Vec<String>,
    warnings: Vec<CleaningWarning>,
}

impl DataCleaner {
    pub fn new(table: &ObservationTable) -> Self {
        Self::from_owned(table.clone())
    }

    pub fn from_owned(table: ObservationTable) -> Self {
        Self { table, log: Vec::new(), warnings: Vec::new() }
    }

    pub fn table(&self) -> &ObservationTable {
        &self.table
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn warnings(&self) -> &[CleaningWarning] {
        &self.warnings
    }

    pub fn finish(self) -> CleaningOutcome {
        CleaningOutcome { table: self.table, log: self.log, warnings: self.warnings }
    }

    fn record(&mut self, entry: String) {
        tracing::debug!("{entry}");
        self.log.push(entry);
    }

    fn skip(&mut self, column: &str, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(CleaningWarning { column: column.to_string(), message });
    }

    /// Flags values more than `threshold` sample standard deviations from the
    /// mean. Nothing is flagged when the spread is zero or undefined.
    pub fn detect_outliers_zscore(&self, column: &str, threshold: f64) -> Result<Vec<bool>> {
        let values = self.table.numeric(column)?;
        let (m, sd) = (mean(values), sample_std(values));
        if !(sd > 0.0) {
            return Ok(vec![false; values.len()]);
        }
        Ok(values.iter().map(|x| ((x - m) / sd).abs() > threshold).collect())
    }

    /// Flags values outside `[Q1 - k·IQR, Q3 + k·IQR]`.
    pub fn detect_outliers_iqr(&self, column: &str, multiplier: f64) -> Result<Vec<bool>> {
        let values = self.table.numeric(column)?;
        let Some((lower, upper)) = iqr_bounds(values, multiplier) else {
            return Ok(vec![false; values.len()]);
        };
        Ok(values.iter().map(|&x| x < lower || x > upper).collect())
    }

    /// Detects outliers with `method` and replaces them per `strategy`.
    /// Returns the number of values flagged.
    pub fn handle_outliers(
        &mut self,
        column: &str,
        method: OutlierMethod,
        threshold: f64,
        strategy: OutlierStrategy,
    ) -> Result<usize> {
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "outlier threshold must be a non-negative number, got {threshold}"
            )));
        }
        let mask = match method {
            OutlierMethod::ZScore => self.detect_outliers_zscore(column, threshold)?,
            OutlierMethod::Iqr => self.detect_outliers_iqr(column, threshold)?,
        };
        let flagged = mask.iter().filter(|&&m| m).count();
        if flagged == 0 {
            self.record(format!("{column}: No outliers detected"));
            return Ok(0);
        }

        let values = self.table.numeric_mut(column)?;
        match strategy {
            OutlierStrategy::Nan | OutlierStrategy::Median | OutlierStrategy::Mean => {
                let fill = match strategy {
                    OutlierStrategy::Median => median(values),
                    OutlierStrategy::Mean => mean(values),
                    _ => f64::NAN,
                };
                for (v, &flagged) in values.iter_mut().zip(&mask) {
                    if flagged {
                        *v = fill;
                    }
                }
            }
            OutlierStrategy::Clip => {
                let bounds = match method {
                    OutlierMethod::ZScore => {
                        let (m, sd) = (mean(values), sample_std(values));
                        Some((m - threshold * sd, m + threshold * sd))
                    }
                    OutlierMethod::Iqr => iqr_bounds(values, threshold),
                };
                if let Some((lower, upper)) = bounds {
                    for v in values.iter_mut().filter(|v| !v.is_nan()) {
                        *v = v.clamp(lower, upper);
                    }
                }
            }
        }

        self.record(format!(
            "{column}: Handled {flagged} outliers using {}/{}",
            method.label(),
            strategy.label()
        ));
        Ok(flagged)
    }

    /// Fills (or drops) missing values in `column`. Returns how many were
    /// missing beforehand.
    pub fn handle_missing_values(&mut self, column: &str, strategy: MissingStrategy) -> Result<usize> {
        let values = self.table.numeric_mut(column)?;
        let missing = values.iter().filter(|v| v.is_nan()).count();
        if missing == 0 {
            self.record(format!("{column}: No missing values"));
            return Ok(0);
        }

        match strategy {
            MissingStrategy::Drop => {
                let keep: Vec<bool> = values.iter().map(|v| !v.is_nan()).collect();
                self.table.retain_rows(&keep);
            }
            MissingStrategy::ForwardFill => forward_fill(values),
            MissingStrategy::BackwardFill => {
                values.reverse();
                forward_fill(values);
                values.reverse();
            }
            MissingStrategy::Interpolate => interpolate_linear(values),
            MissingStrategy::Mean | MissingStrategy::Median | MissingStrategy::Zero => {
                let fill = match strategy {
                    MissingStrategy::Mean => mean(values),
                    MissingStrategy::Median => median(values),
                    _ => 0.0,
                };
                for v in values.iter_mut().filter(|v| v.is_nan()) {
                    *v = fill;
                }
            }
        }

        self.record(format!(
            "{column}: Handled {missing} missing values using {}",
            strategy.label()
        ));
        Ok(missing)
    }

    /// Replaces negative readings in each of `columns`. Absent columns are
    /// skipped with a warning. Returns the total number of values changed.
    pub fn clean_negative_values(&mut self, columns: &[&str], strategy: NegativeStrategy) -> Result<usize> {
        let mut total = 0;
        for &column in columns {
            if !self.table.has_column(column) {
                self.skip(column, format!("{column}: Column not found, skipping negative value cleaning"));
                continue;
            }
            let values = self.table.numeric_mut(column)?;
            let mut count = 0;
            for v in values.iter_mut().filter(|v| **v < 0.0) {
                *v = match strategy {
                    NegativeStrategy::Zero => 0.0,
                    NegativeStrategy::Nan => f64::NAN,
                    NegativeStrategy::Abs => v.abs(),
                };
                count += 1;
            }

            if count == 0 {
                self.record(format!("{column}: No negative values"));
            } else {
                self.record(format!(
                    "{column}: Cleaned {count} negative values using {}",
                    strategy.label()
                ));
            }
            total += count;
        }
        Ok(total)
    }

    /// Removes rows that repeat over `subset` (every column when `None`).
    /// Missing cells compare equal to each other.
    pub fn remove_duplicates(&mut self, subset: Option<&[&str]>, keep: Keep) -> Result<usize> {
        let subset: Option<Vec<String>> = subset.map(|s| s.iter().map(|c| c.to_string()).collect());
        let keys: Vec<Vec<KeyCell>> = (0..self.table.len())
            .map(|row| self.table.row_key(row, subset.as_deref()))
            .collect::<Result<_>>()?;

        let mut mask = vec![true; keys.len()];
        match keep {
            Keep::First | Keep::Last => {
                let mut seen = HashSet::new();
                let order: Box<dyn Iterator<Item = usize>> = if keep == Keep::First {
                    Box::new(0..keys.len())
                } else {
                    Box::new((0..keys.len()).rev())
                };
                for row in order {
                    if !seen.insert(&keys[row]) {
                        mask[row] = false;
                    }
                }
            }
            Keep::None => {
                let mut counts: HashMap<&Vec<KeyCell>, usize> = HashMap::new();
                for key in &keys {
                    *counts.entry(key).or_default() += 1;
                }
                for (row, key) in keys.iter().enumerate() {
                    mask[row] = counts[key] == 1;
                }
            }
        }

        let removed = mask.iter().filter(|&&k| !k).count();
        self.table.retain_rows(&mask);
        self.record(format!("Removed {removed} duplicate rows"));
        Ok(removed)
    }

    /// Numbered cleaning log under a banner.
    pub fn report(&self) -> String {
        format_report(&self.log)
    }
}

/// Render a cleaning log the way [`DataCleaner::report`] does.
pub fn format_report(log: &[String]) -> String {
    if log.is_empty() {
        return "No cleaning operations performed".to_string();
    }
    let mut report = format!("Data Cleaning Report\n{}\n", "=".repeat(50));
    for (i, entry) in log.iter().enumerate() {
        report.push_str(&format!("{}. {entry}\n", i + 1));
    }
    report
}

fn iqr_bounds(values: &[f64], multiplier: f64) -> Option<(f64, f64)> {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return None;
    }
    let q1 = quantile_sorted(&sorted, 0.25);
    let q3 = quantile_sorted(&sorted, 0.75);
    let iqr = q3 - q1;
    Some((q1 - multiplier * iqr, q3 + multiplier * iqr))
}

fn forward_fill(values: &mut [f64]) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }
}

/// Linear interpolation by row position. Leading gaps stay missing and
/// trailing gaps repeat the last valid value.
pub fn interpolate_linear(values: &mut [f64]) {
    let mut prev: Option<usize> = None;
    for i in 0..values.len() {
        if values[i].is_nan() {
            continue;
        }
        if let Some(p) = prev {
            let gap = i - p;
            if gap > 1 {
                let (a, b) = (values[p], values[i]);
                for k in 1..gap {
                    values[p + k] = a + (b - a) * k as f64 / gap as f64;
                }
            }
        }
        prev = Some(i);
    }
    if let Some(p) = prev {
        let last = values[p];
        for v in &mut values[p + 1..] {
            *v = last;
        }
    }
}

fn default_negative_columns() -> Vec<String> {
    ["GHI", "DNI", "DHI"].iter().map(|s| s.to_string()).collect()
}

fn default_outlier_columns() -> Vec<String> {
    ["GHI", "DNI", "DHI", "Tamb", "WS", "RH"].iter().map(|s| s.to_string()).collect()
}

fn default_zscore_threshold() -> f64 {
    3.5
}

/// Settings for [`quick_clean`]. Each `handle_*` switch turns one step off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickCleanOptions {
    pub handle_negatives: bool,
    pub handle_outliers: bool,
    pub handle_missing: bool,
    pub negative_columns: Vec<String>,
    pub outlier_columns: Vec<String>,
    pub zscore_threshold: f64,
}

impl Default for QuickCleanOptions {
    fn default() -> Self {
        Self {
            handle_negatives: true,
            handle_outliers: true,
            handle_missing: true,
            negative_columns: default_negative_columns(),
            outlier_columns: default_outlier_columns(),
            zscore_threshold: default_zscore_threshold(),
        }
    }
}

/// The standard cleaning sequence for a site table:
/// de-duplicate on timestamp, zero negative irradiance, blank z-score
/// outliers, then interpolate whatever is still missing. Steps switched
/// off in `options` are skipped without a log entry.
pub fn quick_clean(table: &ObservationTable, options: &QuickCleanOptions) -> Result<CleaningOutcome> {
    let mut cleaner = DataCleaner::new(table);

    if table.has_column(TIMESTAMP) {
        cleaner.remove_duplicates(Some(&[TIMESTAMP][..]), Keep::First)?;
    } else {
        cleaner.skip(TIMESTAMP, "Timestamp: Column not found, skipping duplicate removal".to_string());
    }

    if options.handle_negatives {
        let negative: Vec<&str> = options.negative_columns.iter().map(String::as_str).collect();
        cleaner.clean_negative_values(&negative, NegativeStrategy::Zero)?;
    }

    if options.handle_outliers {
        for column in &options.outlier_columns {
            if cleaner.table().numeric(column).is_ok() {
                cleaner.handle_outliers(column, OutlierMethod::ZScore, options.zscore_threshold, OutlierStrategy::Nan)?;
            }
        }
    }

    if options.handle_missing {
        let gappy: Vec<String> = cleaner
            .table()
            .numeric_column_names()
            .into_iter()
            .filter(|c| {
                cleaner
                    .table()
                    .numeric(c)
                    .map(|v| v.iter().any(|x| x.is_nan()))
                    .unwrap_or(false)
            })
            .collect();
        for column in &gappy {
            cleaner.handle_missing_values(column, MissingStrategy::Interpolate)?;
        }
    }

    tracing::info!(
        "Quick clean finished: {} rows, {} log entries",
        cleaner.table().len(),
        cleaner.log().len()
    );
    Ok(cleaner.finish())
}
