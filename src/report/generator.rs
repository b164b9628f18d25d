use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;

use crate::data::datetime::format_datetime;
use crate::data::schema::{IRRADIANCE_COLUMNS, METEOROLOGICAL_COLUMNS};
use crate::data::table::ObservationTable;
use crate::error::Result;
use crate::processing::correlation::CorrelationMethod;
use crate::processing::hypothesis::StatisticalAnalyzer;
use crate::processing::metrics::{compare_across_sites, SolarMetrics, TemporalPattern, PATTERN_COLUMNS};
use crate::processing::statistics::{finite, Descriptive};
use crate::report::document::{
    AnovaSummary, Comparison, DateRange, IrradianceSummary, Metadata, MeteorologicalSummary,
    MetricTests, PatternSeries, SiteStatistics, StatisticsDocument, TemporalPatterns,
};

/// Variables correlated per site.
pub const CORRELATION_COLUMNS: [&str; 6] = ["GHI", "DNI", "DHI", "Tamb", "RH", "WS"];

fn irradiance_summary(d: &Descriptive) -> IrradianceSummary {
    IrradianceSummary {
        mean: finite(d.mean),
        median: finite(d.median),
        std: finite(d.std),
        min: finite(d.min),
        max: finite(d.max),
        q25: finite(d.q25),
        q75: finite(d.q75),
    }
}

fn meteorological_summary(d: &Descriptive) -> MeteorologicalSummary {
    MeteorologicalSummary {
        mean: finite(d.mean),
        median: finite(d.median),
        std: finite(d.std),
        min: finite(d.min),
        max: finite(d.max),
    }
}

fn pattern_series(pattern: TemporalPattern) -> BTreeMap<String, PatternSeries> {
    pattern
        .into_iter()
        .map(|(column, periods)| {
            let mut series = PatternSeries::default();
            for (period, stats) in periods {
                if let Some(m) = stats.mean {
                    series.mean.insert(period, m);
                }
                if let Some(m) = stats.max {
                    series.max.insert(period, m);
                }
            }
            (column, series)
        })
        .collect()
}

/// Everything the document reports for one site. Parts that need columns
/// the table lacks are left out with a warning.
pub fn site_statistics(site: &str, table: &ObservationTable, analyzer: &StatisticalAnalyzer) -> SiteStatistics {
    let described = |column: &str| table.numeric(column).ok().and_then(Descriptive::compute);

    let solar_irradiance = IRRADIANCE_COLUMNS
        .iter()
        .filter_map(|&c| described(c).map(|d| (c.to_string(), irradiance_summary(&d))))
        .collect();
    let meteorological = METEOROLOGICAL_COLUMNS
        .iter()
        .filter_map(|&c| described(c).map(|d| (c.to_string(), meteorological_summary(&d))))
        .collect();

    let metrics = SolarMetrics::new(table);
    let solar_assessment = match metrics.assess_solar_potential() {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::warn!("{site}: skipping solar assessment: {e}");
            None
        }
    };

    let mut temporal_patterns = TemporalPatterns::default();
    match (
        metrics.monthly_patterns(Some(&PATTERN_COLUMNS[..])),
        metrics.hourly_patterns(Some(&PATTERN_COLUMNS[..])),
    ) {
        (Ok(monthly), Ok(hourly)) => {
            temporal_patterns.monthly = pattern_series(monthly);
            temporal_patterns.hourly = pattern_series(hourly);
        }
        (Err(e), _) | (_, Err(e)) => tracing::warn!("{site}: skipping temporal patterns: {e}"),
    }

    let available: Vec<&str> = CORRELATION_COLUMNS
        .iter()
        .copied()
        .filter(|c| table.numeric(c).is_ok())
        .collect();
    let correlations = if available.len() > 1 {
        match analyzer.correlation_analysis(table, Some(available.as_slice()), CorrelationMethod::Pearson) {
            Ok(matrix) => Some(matrix.to_nested_map()),
            Err(e) => {
                tracing::warn!("{site}: skipping correlations: {e}");
                None
            }
        }
    } else {
        None
    };

    SiteStatistics {
        record_count: table.len(),
        date_range: table.date_range().map(|(start, end)| DateRange {
            start: format_datetime(&start),
            end: format_datetime(&end),
        }),
        solar_irradiance,
        meteorological,
        solar_assessment,
        temporal_patterns,
        correlations,
    }
}

/// One-way ANOVA across sites for each irradiance column every site has.
fn site_anova(sites: &[(String, ObservationTable)], analyzer: &StatisticalAnalyzer) -> BTreeMap<String, MetricTests> {
    let mut tests = BTreeMap::new();
    let names: Vec<&str> = sites.iter().map(|(n, _)| n.as_str()).collect();

    for metric in IRRADIANCE_COLUMNS {
        let groups: Option<Vec<&[f64]>> = sites.iter().map(|(_, t)| t.numeric(metric).ok()).collect();
        let Some(groups) = groups else {
            tracing::debug!("{metric}: not present at every site, no ANOVA");
            continue;
        };
        match analyzer.anova_oneway(&groups, Some(names.as_slice())) {
            Ok(result) => {
                tests.insert(
                    metric.to_string(),
                    MetricTests {
                        anova: AnovaSummary {
                            f_statistic: finite(result.f_statistic),
                            p_value: finite(result.p_value),
                            significant: result.significant_difference,
                            interpretation: result.interpretation,
                        },
                    },
                );
            }
            Err(e) => tracing::warn!("{metric}: ANOVA skipped: {e}"),
        }
    }
    tests
}

/// Assemble the full statistics document for the loaded sites.
pub fn build_document(
    sites: &[(String, ObservationTable)],
    analyzer: &StatisticalAnalyzer,
    generated_at: NaiveDateTime,
) -> StatisticsDocument {
    let mut countries = BTreeMap::new();
    for (site, table) in sites {
        tracing::info!("Processing {site} ({} rows)", table.len());
        countries.insert(site.clone(), site_statistics(site, table, analyzer));
    }

    tracing::info!("Generating cross-site comparison");
    let comparison = Comparison {
        solar_potential: compare_across_sites(sites),
        tests: site_anova(sites, analyzer),
    };

    StatisticsDocument {
        countries,
        comparison,
        metadata: Metadata {
            generation_date: format_datetime(&generated_at),
            countries_included: sites.iter().map(|(n, _)| n.clone()).collect(),
        },
    }
}

/// Write the document as pretty JSON, replacing any previous file.
pub fn write_document(document: &StatisticsDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(document)?;
    std::fs::write(path, &json)?;
    tracing::info!("Statistics saved to {:?} ({:.2} KB)", path, json.len() as f64 / 1024.0);
    Ok(())
}

pub fn read_document(path: &Path) -> Result<StatisticsDocument> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
