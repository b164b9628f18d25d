use std::collections::HashSet;

use serde::Serialize;

use crate::data::table::{ColumnData, ObservationTable};
use crate::error::Result;
use crate::processing::statistics::round_to;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingEntry {
    pub column: String,
    pub missing_count: usize,
    pub missing_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnQuality {
    pub column: String,
    pub missing_count: usize,
    pub missing_percent: f64,
    /// Only reported for numeric columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub total_rows: usize,
    pub total_columns: usize,
    pub duplicate_rows: usize,
    pub columns: Vec<ColumnQuality>,
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(count as f64 / total as f64 * 100.0, 2)
    }
}

fn missing_count(table: &ObservationTable, column: &str) -> usize {
    if column == crate::data::table::TIMESTAMP {
        return table
            .timestamps()
            .map(|ts| ts.iter().filter(|t| t.is_none()).count())
            .unwrap_or(0);
    }
    match table.column(column).map(|c| &c.data) {
        Some(ColumnData::Numeric(v)) => v.iter().filter(|x| x.is_nan()).count(),
        Some(ColumnData::Text(v)) => v.iter().filter(|s| s.is_empty()).count(),
        None => 0,
    }
}

/// Columns with at least one missing value, most gaps first.
pub fn missing_summary(table: &ObservationTable) -> Vec<MissingEntry> {
    let mut entries: Vec<MissingEntry> = table
        .column_names()
        .into_iter()
        .filter_map(|column| {
            let count = missing_count(table, &column);
            (count > 0).then(|| MissingEntry {
                missing_percent: percent(count, table.len()),
                missing_count: count,
                column,
            })
        })
        .collect();
    // stable, so ties keep column order
    entries.sort_by(|a, b| b.missing_count.cmp(&a.missing_count));
    entries
}

/// Row, duplicate and per-column missing/negative counts.
pub fn quality_report(table: &ObservationTable) -> Result<QualityReport> {
    let total = table.len();

    let mut seen = HashSet::new();
    let mut duplicate_rows = 0;
    for row in 0..total {
        if !seen.insert(table.row_key(row, None)?) {
            duplicate_rows += 1;
        }
    }

    let columns = table
        .column_names()
        .into_iter()
        .map(|column| {
            let missing = missing_count(table, &column);
            let negatives = table
                .numeric(&column)
                .ok()
                .map(|v| v.iter().filter(|x| **x < 0.0).count());
            ColumnQuality {
                missing_count: missing,
                missing_percent: percent(missing, total),
                negative_count: negatives,
                negative_percent: negatives.map(|n| percent(n, total)),
                column,
            }
        })
        .collect();

    Ok(QualityReport {
        total_rows: total,
        total_columns: table.column_names().len(),
        duplicate_rows,
        columns,
    })
}
