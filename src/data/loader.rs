use std::path::{Path, PathBuf};

use crate::config::SiteConfig;
use crate::data::datetime;
use crate::data::schema::{self, ColumnKind};
use crate::data::table::{ColumnData, ObservationTable};
use crate::error::{Error, Result};

/// Result of reading a data file: column names and column data as strings
pub struct LoadedData {
    pub columns: Vec<String>,
    pub column_data: Vec<Vec<String>>, // column-major: column_data[col_idx][row_idx]
    pub row_count: usize,
}

/// Read a CSV or Excel file into raw string columns. The first row is the
/// header.
pub fn read_file(path: &Path) -> Result<LoadedData> {
    if !path.exists() {
        return Err(Error::DataFileNotFound {
            path: path.to_path_buf(),
            hint: "Please ensure the file exists in the correct directory.".to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => read_csv(path),
        "xls" | "xlsx" => read_excel(path),
        _ => Err(Error::UnsupportedFormat(ext)),
    }
}

fn read_csv(path: &Path) -> Result<LoadedData> {
    let content = std::fs::read(path)?;
    // Station loggers sometimes emit latin1 comments
    let text = String::from_utf8(content)
        .unwrap_or_else(|e| e.into_bytes().iter().map(|&b| b as char).collect());

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut all_rows: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        let record = result?;
        all_rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    rows_to_columns(path, all_rows)
}

fn read_excel(path: &Path) -> Result<LoadedData> {
    use calamine::{open_workbook_auto, Data, Reader};

    let mut workbook =
        open_workbook_auto(path).map_err(|e| Error::Spreadsheet(format!("Cannot open workbook: {e}")))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::Spreadsheet("No sheets found".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::Spreadsheet(format!("Cannot read sheet: {e}")))?;

    let all_rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    Data::String(s) => s.clone(),
                    Data::Float(f) => f.to_string(),
                    Data::Int(i) => i.to_string(),
                    Data::Bool(b) => b.to_string(),
                    Data::DateTime(dt) => dt
                        .as_datetime()
                        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| dt.to_string()),
                    Data::DateTimeIso(s) => s.clone(),
                    Data::DurationIso(s) => s.clone(),
                    Data::Error(e) => format!("{e:?}"),
                })
                .collect()
        })
        .collect();

    rows_to_columns(path, all_rows)
}

fn rows_to_columns(path: &Path, all_rows: Vec<Vec<String>>) -> Result<LoadedData> {
    let mut rows = all_rows.into_iter();
    let header = rows.next().ok_or_else(|| Error::Schema {
        path: path.to_path_buf(),
        details: "No header row found".to_string(),
    })?;

    let columns: Vec<String> = header.iter().map(|s| s.trim().to_string()).collect();
    let num_cols = columns.len();

    let mut column_data: Vec<Vec<String>> = vec![Vec::new(); num_cols];
    let mut row_count = 0;

    for row in rows {
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        for (col_idx, col_data) in column_data.iter_mut().enumerate() {
            col_data.push(row.get(col_idx).cloned().unwrap_or_default());
        }
        row_count += 1;
    }

    Ok(LoadedData { columns, column_data, row_count })
}

/// Extract numeric f64 values from a string column.
/// Returns (values, fraction_valid) where invalid entries become NaN.
pub fn column_to_f64(data: &[String]) -> (Vec<f64>, f64) {
    let mut values = Vec::with_capacity(data.len());
    let mut valid = 0usize;
    for s in data {
        match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => {
                values.push(v);
                valid += 1;
            }
            _ => values.push(f64::NAN),
        }
    }
    let frac = if data.is_empty() { 0.0 } else { valid as f64 / data.len() as f64 };
    (values, frac)
}

/// Build a typed table from raw string columns.
///
/// Schema columns are coerced to their declared kind (unparsable cells
/// become missing). Columns outside the schema become numeric when most
/// non-empty cells parse as numbers, and text otherwise.
pub fn to_table(loaded: LoadedData) -> Result<ObservationTable> {
    let mut table = ObservationTable::new();

    for (name, cells) in loaded.columns.into_iter().zip(loaded.column_data) {
        match schema::kind_of(&name) {
            Some(ColumnKind::Datetime) => {
                let parsed = match datetime::column_to_datetimes(&cells) {
                    Some((parsed, frac)) => {
                        if frac < 1.0 {
                            tracing::warn!(
                                "{name}: {:.1}% of values could not be parsed as datetime",
                                (1.0 - frac) * 100.0
                            );
                        }
                        parsed
                    }
                    None => {
                        tracing::warn!("Could not parse {name} as datetime; column left empty");
                        vec![None; cells.len()]
                    }
                };
                table.set_timestamps(parsed)?;
            }
            Some(ColumnKind::Numeric) => {
                let (values, _) = column_to_f64(&cells);
                table.push_numeric(name, values)?;
            }
            Some(ColumnKind::Text) => table.push_text(name, cells)?,
            None => {
                let non_empty = cells.iter().filter(|c| !c.trim().is_empty()).count();
                let (values, _) = column_to_f64(&cells);
                let parsed = values.iter().filter(|v| v.is_finite()).count();
                if non_empty > 0 && parsed as f64 / non_empty as f64 > 0.7 {
                    table.push_numeric(name, values)?;
                } else {
                    table.push_text(name, cells)?;
                }
            }
        }
    }

    Ok(table)
}

/// Read and type a single file.
pub fn load_table(path: &Path) -> Result<ObservationTable> {
    let loaded = read_file(path)?;
    let table = to_table(loaded)?;
    tracing::debug!("Loaded {} rows from {:?}", table.len(), path);
    Ok(table)
}

/// Write a table as CSV using the schema layout (timestamp first).
pub fn save_csv(table: &ObservationTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.column_names())?;

    let timestamps = table.timestamps();
    for row in 0..table.len() {
        let mut record: Vec<String> = Vec::with_capacity(table.columns().len() + 1);
        if let Some(ts) = timestamps {
            record.push(
                ts[row]
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            );
        }
        for column in table.columns() {
            record.push(match &column.data {
                ColumnData::Numeric(v) if v[row].is_finite() => format!("{}", v[row]),
                ColumnData::Numeric(_) => String::new(),
                ColumnData::Text(v) => v[row].clone(),
            });
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    tracing::info!("Wrote {} rows to {:?}", table.len(), path);
    Ok(())
}

/// Column [`DataLoader::load_combined`] adds to name each row's site.
pub const SITE_COLUMN: &str = "Country";

/// Which stage of the data directory to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Raw,
    Cleaned,
}

impl DataKind {
    pub fn label(&self) -> &'static str {
        match self {
            DataKind::Raw => "raw",
            DataKind::Cleaned => "cleaned",
        }
    }
}

/// Resolves site files under a data directory laid out as
/// `raw/`, `cleaned/` and `processed/`.
#[derive(Debug, Clone)]
pub struct DataLoader {
    data_dir: PathBuf,
}

impl DataLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn dir_for(&self, kind: DataKind) -> PathBuf {
        self.data_dir.join(kind.label())
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn site_path(&self, site: &SiteConfig, kind: DataKind) -> PathBuf {
        let file = match kind {
            DataKind::Raw => &site.raw_file,
            DataKind::Cleaned => &site.cleaned_file,
        };
        self.dir_for(kind).join(file)
    }

    /// Load one site's table. A missing file yields `DataFileNotFound` naming
    /// the expected location.
    pub fn load_site(&self, site: &SiteConfig, kind: DataKind) -> Result<ObservationTable> {
        let path = self.site_path(site, kind);
        if !path.exists() {
            let hint = match kind {
                DataKind::Raw => format!(
                    "Place the raw export for '{}' in {}.",
                    site.name,
                    self.dir_for(kind).display()
                ),
                DataKind::Cleaned => format!(
                    "Run `solarscope clean` first, or copy the cleaned file for '{}' into {}.",
                    site.name,
                    self.dir_for(kind).display()
                ),
            };
            return Err(Error::DataFileNotFound { path, hint });
        }
        load_table(&path)
    }

    /// Load every site that can be loaded. Failures are logged and the site
    /// is skipped so one bad file does not stop the batch.
    pub fn load_all(&self, sites: &[SiteConfig], kind: DataKind) -> Vec<(String, ObservationTable)> {
        let mut loaded = Vec::with_capacity(sites.len());
        for site in sites {
            match self.load_site(site, kind) {
                Ok(table) => {
                    tracing::info!("Loaded {} {} rows for {}", table.len(), kind.label(), site.name);
                    loaded.push((site.name.clone(), table));
                }
                Err(e) => tracing::warn!("Could not load {} data: {e}", site.name),
            }
        }
        loaded
    }

    /// Every loadable site stacked into one table, tagged with a
    /// [`SITE_COLUMN`] text column holding the site name. Columns a site
    /// lacks are left missing for its rows.
    pub fn load_combined(&self, sites: &[SiteConfig], kind: DataKind) -> Result<ObservationTable> {
        let loaded = self.load_all(sites, kind);
        if loaded.is_empty() {
            return Err(Error::DataFileNotFound {
                path: self.dir_for(kind),
                hint: format!("No {} data files could be loaded.", kind.label()),
            });
        }

        let mut combined = ObservationTable::new();
        let mut site_names = Vec::new();
        for (name, table) in &loaded {
            combined.append(table)?;
            site_names.extend(std::iter::repeat(name.clone()).take(table.len()));
        }
        combined.push_text(SITE_COLUMN, site_names)?;
        tracing::info!("Combined {} rows from {} sites", combined.len(), loaded.len());
        Ok(combined)
    }
}
