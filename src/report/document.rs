//! Shape of the derived statistics document.
//!
//! All maps are ordered so the serialized output is reproducible. Numeric
//! leaves are `Option<f64>` or map entries, and undefined values (NaN, inf)
//! are left out rather than written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::processing::metrics::{SiteComparison, SolarAssessment};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsDocument {
    pub countries: BTreeMap<String, SiteStatistics>,
    pub comparison: Comparison,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStatistics {
    pub record_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    pub solar_irradiance: BTreeMap<String, IrradianceSummary>,
    pub meteorological: BTreeMap<String, MeteorologicalSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solar_assessment: Option<SolarAssessment>,
    pub temporal_patterns: TemporalPatterns,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlations: Option<BTreeMap<String, BTreeMap<String, f64>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrradianceSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q25: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q75: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeteorologicalSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Per-period mean and max of one column. Keys are hours or months.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSeries {
    pub mean: BTreeMap<u32, f64>,
    pub max: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalPatterns {
    pub monthly: BTreeMap<String, PatternSeries>,
    pub hourly: BTreeMap<String, PatternSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub solar_potential: SiteComparison,
    /// Keyed by irradiance column, next to `solar_potential`.
    #[serde(flatten)]
    pub tests: BTreeMap<String, MetricTests>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTests {
    pub anova: AnovaSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f_statistic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    pub significant: bool,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub generation_date: String,
    pub countries_included: Vec<String>,
}
