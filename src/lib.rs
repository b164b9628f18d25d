//! Solar irradiance pipeline: load site tables, clean them, derive solar and
//! statistical metrics, and write one JSON statistics document.

pub mod config;
pub mod data;
pub mod error;
pub mod processing;
pub mod report;

pub use config::{PipelineConfig, SiteConfig};
pub use data::loader::{DataKind, DataLoader};
pub use data::table::ObservationTable;
pub use error::{Error, Result};
pub use processing::cleaner::{quick_clean, CleaningOutcome, DataCleaner, QuickCleanOptions};
pub use processing::hypothesis::StatisticalAnalyzer;
pub use processing::metrics::SolarMetrics;
pub use report::document::StatisticsDocument;
