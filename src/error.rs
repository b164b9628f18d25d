use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the loader, cleaner, metrics engine and analyzer.
///
/// Usage errors (unknown column, unknown method name) and input errors
/// (missing or malformed files) surface here. Data conditions such as "no
/// outliers found" are never errors; they show up in logs and results.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),

    #[error("Column '{0}' is not numeric")]
    NotNumeric(String),

    #[error("Unknown method '{name}'. Use one of: {expected}")]
    UnknownMethod { name: String, expected: &'static str },

    #[error("Unknown strategy '{name}'. Use one of: {expected}")]
    UnknownStrategy { name: String, expected: &'static str },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient data for {test} (n = {got}, need at least {needed})")]
    InsufficientData {
        test: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("Data file not found: {}\n{hint}", path.display())]
    DataFileNotFound { path: PathBuf, hint: String },

    #[error("Schema mismatch in {}:\n{details}", path.display())]
    Schema { path: PathBuf, details: String },

    #[error("Unsupported file format: .{0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound(name.into())
    }

    /// True for errors that mean "this input is not usable" rather than a
    /// programming mistake. The driver skips the site and moves on.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::DataFileNotFound { .. }
                | Self::Schema { .. }
                | Self::UnsupportedFormat(_)
                | Self::Io(_)
                | Self::Csv(_)
                | Self::Spreadsheet(_)
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
