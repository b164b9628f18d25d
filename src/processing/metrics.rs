//! Solar-domain metrics over a site table.
//!
//! Irradiance is in W/m², temperatures in °C and energy in kWh/m². Every
//! method is a pure function of the borrowed table and its arguments.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::data::table::{ObservationTable, TIMESTAMP};
use crate::error::{Error, Result};
use crate::processing::binning::{binned_impact, BinRow};
use crate::processing::statistics::{finite, mean, median, nan_max, nan_min, round_to, sample_std};

pub const SOLAR_CONSTANT: f64 = 1367.0;
pub const DAYLIGHT_THRESHOLD: f64 = 10.0;
pub const TEMPERATURE_BINS: usize = 10;
pub const WIND_SPEED_BINS: usize = 5;

/// Columns every metric set expects. Absence is reported, not fatal.
pub const BASELINE_COLUMNS: [&str; 4] = [TIMESTAMP, "GHI", "DNI", "DHI"];

/// Columns summarized by the temporal pattern methods when none are given.
pub const PATTERN_COLUMNS: [&str; 3] = ["GHI", "DNI", "DHI"];

/// Mean, spread and peak of one column within one hour or month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStats {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub max: Option<f64>,
}

/// `column → period → stats`; periods are hours 0-23 or months 1-12.
pub type TemporalPattern = BTreeMap<String, BTreeMap<u32, PeriodStats>>;

/// Site-level summary used to compare locations.
///
/// `annual_ghi_kwh_m2` scales the mean daily energy to 365 days, which is
/// only meaningful when the table covers most of a year without long
/// seasonal gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarAssessment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_ghi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ghi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_dni: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_dhi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_clearness_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daylight_hours_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_daily_energy_kwh_m2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual_ghi_kwh_m2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_sun_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_ambient_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ambient_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ambient_temp: Option<f64>,
}

impl SolarAssessment {
    /// `(metric name, value)` pairs in declaration order, skipping absent values.
    pub fn metrics(&self) -> Vec<(&'static str, f64)> {
        [
            ("mean_ghi", self.mean_ghi),
            ("max_ghi", self.max_ghi),
            ("mean_dni", self.mean_dni),
            ("mean_dhi", self.mean_dhi),
            ("mean_clearness_index", self.mean_clearness_index),
            ("daylight_hours_percent", self.daylight_hours_percent),
            ("mean_daily_energy_kwh_m2", self.mean_daily_energy_kwh_m2),
            ("annual_ghi_kwh_m2", self.annual_ghi_kwh_m2),
            ("peak_sun_hours", self.peak_sun_hours),
            ("mean_ambient_temp", self.mean_ambient_temp),
            ("max_ambient_temp", self.max_ambient_temp),
            ("min_ambient_temp", self.min_ambient_temp),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }
}

pub struct SolarMetrics<'a> {
    table: &'a ObservationTable,
}

impl<'a> SolarMetrics<'a> {
    pub fn new(table: &'a ObservationTable) -> Self {
        let missing = table.missing_columns(&BASELINE_COLUMNS);
        if !missing.is_empty() {
            tracing::warn!("Missing columns: {:?}. Some metrics will not be available.", missing);
        }
        Self { table }
    }

    pub fn table(&self) -> &ObservationTable {
        self.table
    }

    fn timestamps(&self) -> Result<&'a [Option<NaiveDateTime>]> {
        self.table
            .timestamps()
            .ok_or_else(|| Error::column_not_found(TIMESTAMP))
    }

    /// `GHI / solar_constant`, clamped to `[0, 1]`.
    pub fn clearness_index(&self, solar_constant: f64) -> Result<Vec<f64>> {
        if !(solar_constant > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "solar constant must be positive, got {solar_constant}"
            )));
        }
        let ghi = self.table.numeric("GHI")?;
        Ok(ghi.iter().map(|g| (g / solar_constant).clamp(0.0, 1.0)).collect())
    }

    /// `DHI / GHI`, clamped to `[0, 1]`; missing where GHI is zero.
    pub fn diffuse_fraction(&self) -> Result<Vec<f64>> {
        let ghi = self.table.numeric("GHI")?;
        let dhi = self.table.numeric("DHI")?;
        Ok(dhi
            .iter()
            .zip(ghi)
            .map(|(d, g)| {
                let kd = d / g;
                if kd.is_infinite() { f64::NAN } else { kd.clamp(0.0, 1.0) }
            })
            .collect())
    }

    pub fn daylight_mask(&self, ghi_threshold: f64) -> Result<Vec<bool>> {
        let ghi = self.table.numeric("GHI")?;
        Ok(ghi.iter().map(|&g| g > ghi_threshold).collect())
    }

    /// Median spacing between consecutive timestamps, in hours. Falls back
    /// to one minute when no spacing can be measured.
    pub fn sampling_interval_hours(&self) -> Result<f64> {
        Ok(sampling_interval_hours(self.timestamps()?))
    }

    /// Energy per calendar day in kWh/m², integrating `irradiance_column`
    /// with one table-wide sampling interval.
    pub fn daily_energy(&self, irradiance_column: &str) -> Result<BTreeMap<NaiveDate, f64>> {
        let timestamps = self.timestamps()?;
        let values = self.table.numeric(irradiance_column)?;
        let interval = sampling_interval_hours(timestamps);

        let mut sums: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (ts, &v) in timestamps.iter().zip(values) {
            let Some(ts) = ts else { continue };
            let day = sums.entry(ts.date()).or_insert(0.0);
            if v.is_finite() {
                *day += v;
            }
        }
        Ok(sums
            .into_iter()
            .map(|(date, sum)| (date, sum * interval / 1000.0))
            .collect())
    }

    /// Ambient temperature bins against GHI, usually [`TEMPERATURE_BINS`] of them.
    pub fn temperature_impact(&self, bins: usize) -> Result<Vec<BinRow>> {
        binned_impact(self.table, "Tamb", "GHI", bins)
    }

    /// Wind speed bins against module temperature, usually [`WIND_SPEED_BINS`].
    pub fn wind_speed_impact(&self, bins: usize) -> Result<Vec<BinRow>> {
        binned_impact(self.table, "WS", "TModA", bins)
    }

    pub fn hourly_patterns(&self, columns: Option<&[&str]>) -> Result<TemporalPattern> {
        self.patterns(columns, |t| t.hour())
    }

    pub fn monthly_patterns(&self, columns: Option<&[&str]>) -> Result<TemporalPattern> {
        self.patterns(columns, |t| t.month())
    }

    fn patterns(&self, columns: Option<&[&str]>, period: fn(&NaiveDateTime) -> u32) -> Result<TemporalPattern> {
        let timestamps = self.timestamps()?;
        let columns = columns.unwrap_or(&PATTERN_COLUMNS[..]);

        let mut out = TemporalPattern::new();
        for &column in columns {
            let Ok(values) = self.table.numeric(column) else {
                tracing::warn!("{column}: not available for temporal patterns, skipping");
                continue;
            };

            let mut groups: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
            for (ts, &v) in timestamps.iter().zip(values) {
                if let Some(ts) = ts {
                    groups.entry(period(ts)).or_default().push(v);
                }
            }

            let stats = groups
                .into_iter()
                .map(|(p, vals)| {
                    let stats = PeriodStats {
                        mean: finite(round_to(mean(&vals), 2)),
                        std: finite(round_to(sample_std(&vals), 2)),
                        max: finite(round_to(nan_max(&vals), 2)),
                    };
                    (p, stats)
                })
                .collect();
            out.insert(column.to_string(), stats);
        }
        Ok(out)
    }

    /// Relative module efficiency from TModA, clamped to `[0.5, 1.2]`.
    pub fn panel_efficiency(&self, reference_temp: f64, temp_coefficient: f64) -> Result<Vec<f64>> {
        let tmod = self.table.numeric("TModA")?;
        Ok(tmod
            .iter()
            .map(|t| (1.0 + temp_coefficient * (t - reference_temp)).clamp(0.5, 1.2))
            .collect())
    }

    pub fn assess_solar_potential(&self) -> Result<SolarAssessment> {
        let ghi = self.table.numeric("GHI")?;
        let dni = self.table.numeric("DNI")?;
        let dhi = self.table.numeric("DHI")?;

        let daylight = self.daylight_mask(DAYLIGHT_THRESHOLD)?;
        let daylight_percent = if ghi.is_empty() {
            f64::NAN
        } else {
            daylight.iter().filter(|&&d| d).count() as f64 / ghi.len() as f64 * 100.0
        };

        let daily: Vec<f64> = self.daily_energy("GHI")?.into_values().collect();
        let mean_daily = mean(&daily);
        let annual = if daily.is_empty() {
            f64::NAN
        } else {
            daily.iter().sum::<f64>() * 365.0 / daily.len() as f64
        };

        let (mean_t, max_t, min_t) = match self.table.numeric("Tamb") {
            Ok(t) => (finite(mean(t)), finite(nan_max(t)), finite(nan_min(t))),
            Err(_) => (None, None, None),
        };

        Ok(SolarAssessment {
            mean_ghi: finite(mean(ghi)),
            max_ghi: finite(nan_max(ghi)),
            mean_dni: finite(mean(dni)),
            mean_dhi: finite(mean(dhi)),
            mean_clearness_index: finite(mean(&self.clearness_index(SOLAR_CONSTANT)?)),
            daylight_hours_percent: finite(daylight_percent),
            mean_daily_energy_kwh_m2: finite(mean_daily),
            annual_ghi_kwh_m2: finite(annual),
            peak_sun_hours: finite(mean_daily),
            mean_ambient_temp: mean_t,
            max_ambient_temp: max_t,
            min_ambient_temp: min_t,
        })
    }
}

fn sampling_interval_hours(timestamps: &[Option<NaiveDateTime>]) -> f64 {
    let deltas: Vec<f64> = timestamps
        .windows(2)
        .filter_map(|w| match (w[0], w[1]) {
            (Some(a), Some(b)) => Some((b - a).num_milliseconds() as f64 / 3_600_000.0),
            _ => None,
        })
        .collect();
    if deltas.is_empty() {
        1.0 / 60.0
    } else {
        median(&deltas)
    }
}

/// DNI from its horizontal components, floored at zero. Without a zenith
/// angle (radians) the horizontal difference is used as-is.
pub fn dni_from_ghi_dhi(ghi: &[f64], dhi: &[f64], zenith: Option<&[f64]>) -> Result<Vec<f64>> {
    if ghi.len() != dhi.len() || zenith.is_some_and(|z| z.len() != ghi.len()) {
        return Err(Error::InvalidArgument("GHI, DHI and zenith must have equal length".to_string()));
    }
    Ok(ghi
        .iter()
        .zip(dhi)
        .enumerate()
        .map(|(i, (g, d))| {
            let dni = match zenith {
                Some(z) => (g - d) / z[i].cos(),
                None => g - d,
            };
            // NaN passes through
            if dni < 0.0 { 0.0 } else { dni }
        })
        .collect())
}

/// `metric → site → value`, every value rounded to two decimals.
pub type SiteComparison = BTreeMap<String, BTreeMap<String, f64>>;

/// Runs [`SolarMetrics::assess_solar_potential`] for each site. Sites whose
/// assessment fails are logged and left out.
pub fn compare_across_sites(sites: &[(String, ObservationTable)]) -> SiteComparison {
    let mut comparison = SiteComparison::new();
    for (site, table) in sites {
        match SolarMetrics::new(table).assess_solar_potential() {
            Ok(assessment) => {
                for (metric, value) in assessment.metrics() {
                    comparison
                        .entry(metric.to_string())
                        .or_default()
                        .insert(site.clone(), round_to(value, 2));
                }
            }
            Err(e) => tracing::warn!("{site}: solar assessment unavailable: {e}"),
        }
    }
    comparison
}

/// Module output around panel cleaning events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleaningImpact {
    NoEvents,
    InsufficientData { cleaning_events: usize },
    Measured {
        cleaning_events: usize,
        events_analyzed: usize,
        window_rows: usize,
        mean_before_cleaning: f64,
        mean_after_cleaning: f64,
        percent_improvement: Option<f64>,
    },
}

impl CleaningImpact {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            CleaningImpact::NoEvents => Some("No cleaning events found"),
            CleaningImpact::InsufficientData { .. } => Some("Insufficient data around cleaning events"),
            CleaningImpact::Measured { .. } => None,
        }
    }
}

/// Compares the mean of `irradiance_column` over `window_days` before and
/// after each row where `cleaning_column` equals 1.
///
/// The window is converted to rows with the table's measured sampling
/// interval, or one-minute sampling when that cannot be measured.
pub fn cleaning_impact(
    table: &ObservationTable,
    cleaning_column: &str,
    irradiance_column: &str,
    window_days: u32,
) -> Result<CleaningImpact> {
    let cleaning = table.numeric(cleaning_column)?;
    let values = table.numeric(irradiance_column)?;

    let events: Vec<usize> = cleaning
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c == 1.0)
        .map(|(i, _)| i)
        .collect();
    if events.is_empty() {
        return Ok(CleaningImpact::NoEvents);
    }

    let interval_hours = table
        .timestamps()
        .map(sampling_interval_hours)
        .filter(|h| *h > 0.0)
        .unwrap_or(1.0 / 60.0);
    let window_rows = ((window_days as f64 * 24.0) / interval_hours).round().max(1.0) as usize;
    tracing::debug!(
        "Cleaning impact: {} events, window of {window_rows} rows at {:.4} h sampling",
        events.len(),
        interval_hours
    );

    let mut before = Vec::new();
    let mut after = Vec::new();
    for &event in &events {
        let start = event.saturating_sub(window_rows);
        let end = (event + window_rows).min(values.len());
        let b = mean(&values[start..event]);
        let a = mean(&values[event..end]);
        if b.is_finite() && a.is_finite() {
            before.push(b);
            after.push(a);
        }
    }
    if before.is_empty() {
        return Ok(CleaningImpact::InsufficientData { cleaning_events: events.len() });
    }

    let (mean_before, mean_after) = (mean(&before), mean(&after));
    Ok(CleaningImpact::Measured {
        cleaning_events: events.len(),
        events_analyzed: before.len(),
        window_rows,
        mean_before_cleaning: mean_before,
        mean_after_cleaning: mean_after,
        percent_improvement: finite((mean_after - mean_before) / mean_before * 100.0),
    })
}

/// Relative humidity bins against GHI.
pub fn rh_impact_on_irradiance(table: &ObservationTable, bins: usize) -> Result<Vec<BinRow>> {
    binned_impact(table, "RH", "GHI", bins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn minutes(start: NaiveDateTime, n: usize) -> Vec<NaiveDateTime> {
        (0..n).map(|i| start + Duration::minutes(i as i64)).collect()
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 8, 9)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap()
    }

    #[test]
    fn clearness_index_is_clamped() {
        let table = ObservationTable::new()
            .with_numeric("GHI", vec![-50.0, 683.5, 5000.0, f64::NAN])
            .unwrap();
        let kt = SolarMetrics::new(&table).clearness_index(SOLAR_CONSTANT).unwrap();
        assert_eq!(kt[0], 0.0);
        assert!((kt[1] - 0.5).abs() < 1e-12);
        assert_eq!(kt[2], 1.0);
        assert!(kt[3].is_nan());
    }

    #[test]
    fn diffuse_fraction_handles_zero_ghi() {
        let table = ObservationTable::new()
            .with_numeric("GHI", vec![0.0, 100.0, 100.0])
            .unwrap()
            .with_numeric("DHI", vec![5.0, 40.0, 150.0])
            .unwrap();
        let kd = SolarMetrics::new(&table).diffuse_fraction().unwrap();
        assert!(kd[0].is_nan());
        assert_eq!(kd[1], 0.4);
        assert_eq!(kd[2], 1.0);
    }

    #[test]
    fn one_day_of_minute_samples() {
        let table = ObservationTable::new()
            .with_timestamps(minutes(start(), 60))
            .unwrap()
            .with_numeric("GHI", vec![600.0; 60])
            .unwrap();
        let daily = SolarMetrics::new(&table).daily_energy("GHI").unwrap();
        assert_eq!(daily.len(), 1);
        let energy = daily.values().next().copied().unwrap();
        assert!((energy - 0.6).abs() < 1e-12);
    }

    #[test]
    fn metrics_without_timestamp_fail_cleanly() {
        let table = ObservationTable::new().with_numeric("GHI", vec![1.0]).unwrap();
        let metrics = SolarMetrics::new(&table);
        assert!(matches!(metrics.daily_energy("GHI"), Err(Error::ColumnNotFound(_))));
        assert!(matches!(metrics.diffuse_fraction(), Err(Error::ColumnNotFound(_))));
    }

    #[test]
    fn hourly_patterns_group_by_hour() {
        let table = ObservationTable::new()
            .with_timestamps(minutes(start(), 120))
            .unwrap()
            .with_numeric("GHI", (0..120).map(|i| if i < 60 { 100.0 } else { 300.0 }).collect())
            .unwrap();
        let patterns = SolarMetrics::new(&table).hourly_patterns(Some(&["GHI", "BP"][..])).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns["GHI"][&10].mean, Some(100.0));
        assert_eq!(patterns["GHI"][&11].max, Some(300.0));
        assert_eq!(patterns["GHI"][&11].std, Some(0.0));
    }

    #[test]
    fn panel_efficiency_bounds() {
        let table = ObservationTable::new()
            .with_numeric("TModA", vec![25.0, 50.0, 500.0, -100.0])
            .unwrap();
        let eff = SolarMetrics::new(&table).panel_efficiency(25.0, -0.004).unwrap();
        assert_eq!(eff[0], 1.0);
        assert!((eff[1] - 0.9).abs() < 1e-12);
        assert_eq!(eff[2], 0.5);
        assert_eq!(eff[3], 1.2);
    }

    #[test]
    fn dni_is_floored() {
        let dni = dni_from_ghi_dhi(&[500.0, 100.0], &[100.0, 200.0], None).unwrap();
        assert_eq!(dni, vec![400.0, 0.0]);
        let dni = dni_from_ghi_dhi(&[500.0], &[100.0], Some(&[0.0][..])).unwrap();
        assert_eq!(dni, vec![400.0]);
        assert!(dni_from_ghi_dhi(&[1.0], &[], None).is_err());
    }

    #[test]
    fn no_cleaning_events() {
        let table = ObservationTable::new()
            .with_numeric("Cleaning", vec![0.0; 10])
            .unwrap()
            .with_numeric("ModA", vec![500.0; 10])
            .unwrap();
        let impact = cleaning_impact(&table, "Cleaning", "ModA", 7).unwrap();
        assert_eq!(impact, CleaningImpact::NoEvents);
        assert_eq!(impact.message(), Some("No cleaning events found"));
    }

    #[test]
    fn cleaning_window_follows_sampling_interval() {
        // hourly data: one day is 24 rows
        let timestamps: Vec<NaiveDateTime> = (0..96).map(|i| start() + Duration::hours(i)).collect();
        let mut cleaning = vec![0.0; 96];
        cleaning[48] = 1.0;
        let moda: Vec<f64> = (0..96).map(|i| if i < 48 { 400.0 } else { 500.0 }).collect();
        let table = ObservationTable::new()
            .with_timestamps(timestamps)
            .unwrap()
            .with_numeric("Cleaning", cleaning)
            .unwrap()
            .with_numeric("ModA", moda)
            .unwrap();

        match cleaning_impact(&table, "Cleaning", "ModA", 1).unwrap() {
            CleaningImpact::Measured { window_rows, percent_improvement, .. } => {
                assert_eq!(window_rows, 24);
                assert_eq!(percent_improvement, Some(25.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cleaning_event_at_start_lacks_before_window() {
        let table = ObservationTable::new()
            .with_numeric("Cleaning", vec![1.0, 0.0, 0.0])
            .unwrap()
            .with_numeric("ModA", vec![1.0, 2.0, 3.0])
            .unwrap();
        let impact = cleaning_impact(&table, "Cleaning", "ModA", 1).unwrap();
        assert_eq!(impact, CleaningImpact::InsufficientData { cleaning_events: 1 });
    }
}
