use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::processing::cleaner::QuickCleanOptions;
use crate::processing::hypothesis::DEFAULT_ALPHA;

/// One measurement station and the files it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    #[serde(default)]
    pub location: String,
    pub raw_file: String,
    pub cleaned_file: String,
}

impl SiteConfig {
    pub fn new(name: &str, location: &str, raw_file: &str, cleaned_file: &str) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            raw_file: raw_file.to_string(),
            cleaned_file: cleaned_file.to_string(),
        }
    }
}

fn default_sites() -> Vec<SiteConfig> {
    vec![
        SiteConfig::new("benin", "Malanville", "benin-malanville.csv", "benin_cleaned.csv"),
        SiteConfig::new("sierraleone", "Bumbuna", "sierraleone-bumbuna.csv", "sierraleone_cleaned.csv"),
        SiteConfig::new("togo", "Dapaong", "togo-dapaong_qc.csv", "togo_cleaned.csv"),
    ]
}

/// Pipeline settings, read from TOML. Every field has a default so an empty
/// file (or no file) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    /// Statistics document path; `<data_dir>/processed/dashboard_statistics.json`
    /// when unset.
    pub output: Option<PathBuf>,
    pub significance_level: f64,
    /// Seed for any random subsampling in the statistical tests.
    pub seed: u64,
    pub quick_clean: QuickCleanOptions,
    pub sites: Vec<SiteConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output: None,
            significance_level: DEFAULT_ALPHA,
            seed: 42,
            quick_clean: QuickCleanOptions::default(),
            sites: default_sites(),
        }
    }
}

pub const STATISTICS_FILE: &str = "dashboard_statistics.json";

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(Error::Config(format!(
                "significance_level must be in (0, 1), got {}",
                self.significance_level
            )));
        }
        if self.sites.is_empty() {
            return Err(Error::Config("at least one site must be configured".to_string()));
        }
        Ok(())
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.data_dir.join("processed").join(STATISTICS_FILE))
    }

    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.sites.len(), 3);
        assert_eq!(
            config.output_path(),
            PathBuf::from("data/processed/dashboard_statistics.json")
        );
    }

    #[test]
    fn partial_toml_overrides() {
        let config: PipelineConfig = toml::from_str(
            r#"
            data_dir = "/srv/solar"
            significance_level = 0.01

            [quick_clean]
            zscore_threshold = 4.0
            handle_outliers = false

            [[sites]]
            name = "togo"
            raw_file = "togo.csv"
            cleaned_file = "togo_clean.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.significance_level, 0.01);
        assert_eq!(config.quick_clean.zscore_threshold, 4.0);
        assert_eq!(config.quick_clean.outlier_columns.len(), 6);
        assert!(!config.quick_clean.handle_outliers);
        assert!(config.quick_clean.handle_negatives && config.quick_clean.handle_missing);
        assert_eq!(config.sites.len(), 1);
        assert!(config.site("togo").is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn alpha_out_of_range_is_rejected() {
        let config = PipelineConfig { significance_level: 1.5, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
