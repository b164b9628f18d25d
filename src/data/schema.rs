use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::data::datetime;
use crate::data::loader::{self, LoadedData};
use crate::error::Result;

/// How a column is expected to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    Datetime,
    Numeric,
    Text,
}

impl ColumnKind {
    pub fn label(&self) -> &'static str {
        match self {
            ColumnKind::Datetime => "datetime",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "string",
        }
    }
}

/// The fixed site-file schema, in file order.
pub const EXPECTED_COLUMNS: [(&str, ColumnKind); 19] = [
    ("Timestamp", ColumnKind::Datetime),
    ("GHI", ColumnKind::Numeric),
    ("DNI", ColumnKind::Numeric),
    ("DHI", ColumnKind::Numeric),
    ("ModA", ColumnKind::Numeric),
    ("ModB", ColumnKind::Numeric),
    ("Tamb", ColumnKind::Numeric),
    ("RH", ColumnKind::Numeric),
    ("WS", ColumnKind::Numeric),
    ("WSgust", ColumnKind::Numeric),
    ("WSstdev", ColumnKind::Numeric),
    ("WD", ColumnKind::Numeric),
    ("WDstdev", ColumnKind::Numeric),
    ("BP", ColumnKind::Numeric),
    ("Cleaning", ColumnKind::Numeric),
    ("Precipitation", ColumnKind::Numeric),
    ("TModA", ColumnKind::Numeric),
    ("TModB", ColumnKind::Numeric),
    ("Comments", ColumnKind::Text),
];

/// Irradiance components that must never be negative.
pub const IRRADIANCE_COLUMNS: [&str; 3] = ["GHI", "DNI", "DHI"];

/// Meteorological covariates reported alongside irradiance.
pub const METEOROLOGICAL_COLUMNS: [&str; 4] = ["Tamb", "RH", "WS", "BP"];

/// Expected kind for a schema column, `None` for unknown names.
pub fn kind_of(column: &str) -> Option<ColumnKind> {
    EXPECTED_COLUMNS
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, kind)| *kind)
}

/// Outcome of comparing a header against the expected schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnCheck {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    /// Same column set, different order.
    pub reordered: bool,
    pub actual: Vec<String>,
}

impl ColumnCheck {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && !self.reordered
    }

    /// Multi-line description of every mismatch.
    pub fn describe(&self) -> String {
        if self.is_valid() {
            return "All columns present and in correct order".to_string();
        }
        let mut msg = String::from("Column mismatch:\n");
        if !self.missing.is_empty() {
            msg.push_str(&format!("  Missing columns: {}\n", self.missing.join(", ")));
        }
        if !self.extra.is_empty() {
            msg.push_str(&format!("  Extra columns: {}\n", self.extra.join(", ")));
        }
        if self.reordered {
            let expected: Vec<&str> = EXPECTED_COLUMNS.iter().map(|(n, _)| *n).collect();
            msg.push_str("  Columns are present but in wrong order\n");
            msg.push_str(&format!("  Expected: {}\n", expected.join(", ")));
            msg.push_str(&format!("  Got: {}", self.actual.join(", ")));
        }
        msg
    }
}

/// Compare a header row against the expected schema.
pub fn validate_columns(actual: &[String]) -> ColumnCheck {
    let expected: Vec<&str> = EXPECTED_COLUMNS.iter().map(|(n, _)| *n).collect();
    let actual_set: HashSet<&str> = actual.iter().map(|s| s.as_str()).collect();
    let expected_set: HashSet<&str> = expected.iter().copied().collect();

    let missing: Vec<String> = expected
        .iter()
        .filter(|n| !actual_set.contains(*n))
        .map(|n| n.to_string())
        .collect();
    let extra: Vec<String> = actual
        .iter()
        .filter(|n| !expected_set.contains(n.as_str()))
        .cloned()
        .collect();
    let reordered = missing.is_empty()
        && extra.is_empty()
        && actual.iter().map(|s| s.as_str()).ne(expected.iter().copied());

    ColumnCheck { missing, extra, reordered, actual: actual.to_vec() }
}

/// Per-column type coercion result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCheck {
    pub column: String,
    pub expected: ColumnKind,
    /// Fraction of non-empty cells that parse as the expected kind.
    pub parse_rate: f64,
}

/// Full structural report for one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub row_count: usize,
    pub columns: ColumnCheck,
    pub types: Vec<TypeCheck>,
}

impl ValidationReport {
    /// Columns whose parse rate falls below `min_rate`.
    pub fn type_failures(&self, min_rate: f64) -> Vec<&TypeCheck> {
        self.types.iter().filter(|t| t.parse_rate < min_rate).collect()
    }

    pub fn is_valid(&self, min_rate: f64) -> bool {
        self.columns.is_valid() && self.type_failures(min_rate).is_empty()
    }
}

/// Validate the structure of a site file: readable, expected header, and
/// column contents that coerce to their declared kinds.
pub fn validate_file(path: &Path) -> Result<ValidationReport> {
    let loaded = loader::read_file(path)?;
    Ok(validate_loaded(path, &loaded))
}

pub fn validate_loaded(path: &Path, loaded: &LoadedData) -> ValidationReport {
    let columns = validate_columns(&loaded.columns);

    let mut types = Vec::new();
    for (name, cells) in loaded.columns.iter().zip(&loaded.column_data) {
        let Some(kind) = kind_of(name) else { continue };
        let non_empty: Vec<String> =
            cells.iter().filter(|c| !c.trim().is_empty()).cloned().collect();
        let parse_rate = if non_empty.is_empty() {
            1.0
        } else {
            match kind {
                ColumnKind::Datetime => datetime::column_to_datetimes(&non_empty)
                    .map(|(_, frac)| frac)
                    .unwrap_or(0.0),
                ColumnKind::Numeric => loader::column_to_f64(&non_empty).1,
                ColumnKind::Text => 1.0,
            }
        };
        types.push(TypeCheck { column: name.clone(), expected: kind, parse_rate });
    }

    ValidationReport {
        path: path.to_path_buf(),
        row_count: loaded.row_count,
        columns,
        types,
    }
}
