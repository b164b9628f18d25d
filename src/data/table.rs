use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the timestamp column in site files.
pub const TIMESTAMP: &str = "Timestamp";

/// Column payload. Missing numeric values are stored as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn retain_mask(&mut self, keep: &[bool]) {
        match self {
            ColumnData::Numeric(v) => retain_by_mask(v, keep),
            ColumnData::Text(v) => retain_by_mask(v, keep),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// One cell of a row key, used for duplicate detection.
/// NaN cells compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyCell {
    Missing,
    Number(u64),
    Text(String),
    Time(i64),
}

/// An ordered table of observations for one site.
///
/// Rows are addressed by position. The timestamp column is optional and kept
/// apart from the value columns because every temporal metric needs it
/// typed; the remaining columns keep their file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationTable {
    len: usize,
    timestamps: Option<Vec<Option<NaiveDateTime>>>,
    columns: Vec<Column>,
}

impl ObservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capability query: does this table carry `name`?
    /// `Timestamp` is reported like any other column.
    pub fn has_column(&self, name: &str) -> bool {
        if name == TIMESTAMP {
            return self.timestamps.is_some();
        }
        self.columns.iter().any(|c| c.name == name)
    }

    /// The subset of `names` this table lacks, in the order given.
    pub fn missing_columns(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter(|n| !self.has_column(n))
            .map(|n| n.to_string())
            .collect()
    }

    /// All column names in file order, timestamp first when present.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.columns.len() + 1);
        if self.timestamps.is_some() {
            names.push(TIMESTAMP.to_string());
        }
        names.extend(self.columns.iter().map(|c| c.name.clone()));
        names
    }

    /// Names of the numeric columns in file order.
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| matches!(c.data, ColumnData::Numeric(_)))
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn timestamps(&self) -> Option<&[Option<NaiveDateTime>]> {
        self.timestamps.as_deref()
    }

    /// Borrow a numeric column.
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name) {
            Some(Column { data: ColumnData::Numeric(v), .. }) => Ok(v),
            Some(_) => Err(Error::NotNumeric(name.to_string())),
            None => Err(Error::column_not_found(name)),
        }
    }

    pub fn numeric_mut(&mut self, name: &str) -> Result<&mut Vec<f64>> {
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(Column { data: ColumnData::Numeric(v), .. }) => Ok(v),
            Some(_) => Err(Error::NotNumeric(name.to_string())),
            None => Err(Error::column_not_found(name)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&[String]> {
        match self.column(name) {
            Some(Column { data: ColumnData::Text(v), .. }) => Ok(v),
            Some(_) => Err(Error::InvalidArgument(format!("Column '{name}' is not text"))),
            None => Err(Error::column_not_found(name)),
        }
    }

    /// Set (or replace) the timestamp column.
    pub fn set_timestamps(&mut self, timestamps: Vec<Option<NaiveDateTime>>) -> Result<()> {
        self.check_len(TIMESTAMP, timestamps.len())?;
        self.len = timestamps.len();
        self.timestamps = Some(timestamps);
        Ok(())
    }

    /// Append a numeric column, or replace one with the same name.
    pub fn push_numeric(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        self.push_column(name.into(), ColumnData::Numeric(values))
    }

    /// Append a text column, or replace one with the same name.
    pub fn push_text(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<()> {
        self.push_column(name.into(), ColumnData::Text(values))
    }

    /// Builder form of [`push_numeric`](Self::push_numeric).
    pub fn with_numeric(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.push_numeric(name, values)?;
        Ok(self)
    }

    /// Builder form of [`set_timestamps`](Self::set_timestamps).
    pub fn with_timestamps(mut self, timestamps: Vec<NaiveDateTime>) -> Result<Self> {
        self.set_timestamps(timestamps.into_iter().map(Some).collect())?;
        Ok(self)
    }

    fn push_column(&mut self, name: String, data: ColumnData) -> Result<()> {
        if name == TIMESTAMP {
            return Err(Error::InvalidArgument(
                "use set_timestamps for the Timestamp column".to_string(),
            ));
        }
        self.check_len(&name, data.len())?;
        self.len = data.len();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.data = data,
            None => self.columns.push(Column { name, data }),
        }
        Ok(())
    }

    fn check_len(&self, name: &str, len: usize) -> Result<()> {
        let has_rows = self.timestamps.is_some() || !self.columns.is_empty();
        if has_rows && len != self.len {
            return Err(Error::InvalidArgument(format!(
                "column '{name}' has {len} rows, table has {}",
                self.len
            )));
        }
        Ok(())
    }

    /// Append the rows of `other`. A column only one side has is padded
    /// with missing cells, and a column that is numeric on one side and text
    /// on the other is an error.
    pub fn append(&mut self, other: &ObservationTable) -> Result<()> {
        for column in &other.columns {
            if let Some(existing) = self.column(&column.name) {
                let same_kind = matches!(
                    (&existing.data, &column.data),
                    (ColumnData::Numeric(_), ColumnData::Numeric(_)) | (ColumnData::Text(_), ColumnData::Text(_))
                );
                if !same_kind {
                    return Err(Error::InvalidArgument(format!(
                        "column '{}' is numeric in one table and text in the other",
                        column.name
                    )));
                }
            }
        }

        let before = self.len;
        let total = before + other.len;
        if self.timestamps.is_some() || other.timestamps.is_some() {
            let ts = self.timestamps.get_or_insert_with(|| vec![None; before]);
            match &other.timestamps {
                Some(more) => ts.extend_from_slice(more),
                None => ts.resize(total, None),
            }
        }

        let added: Vec<&Column> = other
            .columns
            .iter()
            .filter(|c| self.column(&c.name).is_none())
            .collect();
        for column in &mut self.columns {
            match (&mut column.data, other.column(&column.name).map(|c| &c.data)) {
                (ColumnData::Numeric(v), Some(ColumnData::Numeric(more))) => v.extend_from_slice(more),
                (ColumnData::Text(v), Some(ColumnData::Text(more))) => v.extend_from_slice(more),
                (ColumnData::Numeric(v), _) => v.resize(total, f64::NAN),
                (ColumnData::Text(v), _) => v.resize(total, String::new()),
            }
        }
        for column in added {
            let data = match &column.data {
                ColumnData::Numeric(more) => {
                    let mut v = vec![f64::NAN; before];
                    v.extend_from_slice(more);
                    ColumnData::Numeric(v)
                }
                ColumnData::Text(more) => {
                    let mut v = vec![String::new(); before];
                    v.extend_from_slice(more);
                    ColumnData::Text(v)
                }
            };
            self.columns.push(Column { name: column.name.clone(), data });
        }
        self.len = total;
        Ok(())
    }

    /// Keep rows whose mask entry is true.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        debug_assert_eq!(keep.len(), self.len);
        if let Some(ts) = self.timestamps.as_mut() {
            retain_by_mask(ts, keep);
        }
        for col in &mut self.columns {
            col.data.retain_mask(keep);
        }
        self.len = keep.iter().filter(|&&k| k).count();
    }

    /// Key of row `row` over `subset` (all columns when `None`).
    pub fn row_key(&self, row: usize, subset: Option<&[String]>) -> Result<Vec<KeyCell>> {
        let names = match subset {
            Some(s) => s.to_vec(),
            None => self.column_names(),
        };
        names.iter().map(|name| self.key_cell(row, name)).collect()
    }

    fn key_cell(&self, row: usize, name: &str) -> Result<KeyCell> {
        if name == TIMESTAMP {
            let ts = self
                .timestamps
                .as_ref()
                .ok_or_else(|| Error::column_not_found(TIMESTAMP))?;
            return Ok(match ts[row] {
                Some(t) => KeyCell::Time(t.and_utc().timestamp_nanos_opt().unwrap_or(i64::MAX)),
                None => KeyCell::Missing,
            });
        }
        let column = self.column(name).ok_or_else(|| Error::column_not_found(name))?;
        Ok(match &column.data {
            ColumnData::Numeric(v) if v[row].is_nan() => KeyCell::Missing,
            // +0.0 and -0.0 are the same value
            ColumnData::Numeric(v) => KeyCell::Number((v[row] + 0.0).to_bits()),
            ColumnData::Text(v) => KeyCell::Text(v[row].clone()),
        })
    }

    /// Earliest and latest timestamp, if any row has one.
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let ts = self.timestamps.as_ref()?;
        let min = ts.iter().flatten().min()?;
        let max = ts.iter().flatten().max()?;
        Some((*min, *max))
    }
}

fn retain_by_mask<T>(values: &mut Vec<T>, keep: &[bool]) {
    let mut i = 0;
    values.retain(|_| {
        let k = keep[i];
        i += 1;
        k
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 8, 9)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    #[test]
    fn column_lengths_must_match() {
        let mut table = ObservationTable::new();
        table.push_numeric("GHI", vec![1.0, 2.0]).unwrap();
        assert!(table.push_numeric("DNI", vec![1.0]).is_err());
        assert!(table.set_timestamps(vec![Some(ts(1))]).is_err());
    }

    #[test]
    fn retain_rows_applies_to_every_column() {
        let mut table = ObservationTable::new()
            .with_timestamps(vec![ts(1), ts(2), ts(3)])
            .unwrap()
            .with_numeric("GHI", vec![1.0, 2.0, 3.0])
            .unwrap();
        table.push_text("Comments", vec!["a".into(), "b".into(), "c".into()]).unwrap();

        table.retain_rows(&[true, false, true]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric("GHI").unwrap(), &[1.0, 3.0]);
        assert_eq!(table.text("Comments").unwrap(), &["a".to_string(), "c".to_string()]);
        assert_eq!(table.timestamps().unwrap(), &[Some(ts(1)), Some(ts(3))]);
    }

    #[test]
    fn append_pads_columns_either_side_lacks() {
        let mut table = ObservationTable::new()
            .with_timestamps(vec![ts(1), ts(2)])
            .unwrap()
            .with_numeric("GHI", vec![1.0, 2.0])
            .unwrap();
        let other = ObservationTable::new()
            .with_numeric("GHI", vec![3.0])
            .unwrap()
            .with_numeric("Tamb", vec![25.0])
            .unwrap();

        table.append(&other).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.numeric("GHI").unwrap(), &[1.0, 2.0, 3.0]);
        let tamb = table.numeric("Tamb").unwrap();
        assert!(tamb[0].is_nan() && tamb[1].is_nan());
        assert_eq!(tamb[2], 25.0);
        assert_eq!(table.timestamps().unwrap(), &[Some(ts(1)), Some(ts(2)), None]);

        let mut text = ObservationTable::new();
        text.push_text("GHI", vec!["n/a".into()]).unwrap();
        assert!(matches!(table.append(&text), Err(Error::InvalidArgument(_))));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn capability_query_covers_timestamp() {
        let table = ObservationTable::new().with_numeric("GHI", vec![1.0]).unwrap();
        assert!(table.has_column("GHI"));
        assert!(!table.has_column(TIMESTAMP));
        assert_eq!(table.missing_columns(&["Timestamp", "GHI", "DNI"]), vec!["Timestamp", "DNI"]);
    }

    #[test]
    fn nan_cells_share_a_key() {
        let table = ObservationTable::new()
            .with_numeric("GHI", vec![f64::NAN, f64::NAN, 1.0])
            .unwrap();
        assert_eq!(table.row_key(0, None).unwrap(), table.row_key(1, None).unwrap());
        assert_ne!(table.row_key(0, None).unwrap(), table.row_key(2, None).unwrap());
    }
}
