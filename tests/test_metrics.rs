use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use solarscope::data::table::ObservationTable;
use solarscope::processing::metrics::*;

macro_rules! assert_approx {
    ($left:expr, $right:expr, $tol:expr) => {
        let (l, r) = ($left as f64, $right as f64);
        assert!(
            (l - r).abs() <= $tol,
            "assert_approx failed: left={}, right={}, diff={}, tol={}",
            l, r, (l - r).abs(), $tol
        );
    };
}

fn midnight() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 8, 9)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

fn series(step: Duration, n: usize) -> Vec<NaiveDateTime> {
    (0..n).map(|i| midnight() + step * i as i32).collect()
}

/// Two days of hourly data: 500 W/m² from 06:00 to 17:00, dark otherwise.
fn two_sunny_days() -> ObservationTable {
    let ts = series(Duration::hours(1), 48);
    let ghi: Vec<f64> = ts
        .iter()
        .map(|t| if (6..18).contains(&t.hour()) { 500.0 } else { 0.0 })
        .collect();
    let dni: Vec<f64> = ghi.iter().map(|g| g * 0.7).collect();
    let dhi: Vec<f64> = ghi.iter().map(|g| g * 0.3).collect();
    ObservationTable::new()
        .with_timestamps(ts)
        .unwrap()
        .with_numeric("GHI", ghi)
        .unwrap()
        .with_numeric("DNI", dni)
        .unwrap()
        .with_numeric("DHI", dhi)
        .unwrap()
}

// ── Derived quantities ──

#[test]
fn test_clearness_index_is_bounded() {
    let table = ObservationTable::new()
        .with_numeric("GHI", vec![-50.0, 0.0, 683.5, 1367.0, 2000.0, f64::NAN])
        .unwrap();
    let kt = SolarMetrics::new(&table).clearness_index(SOLAR_CONSTANT).unwrap();

    assert_eq!(kt.len(), 6);
    assert!(kt.iter().all(|k| k.is_nan() || (0.0..=1.0).contains(k)));
    assert_approx!(kt[2], 0.5, 1e-12);
    assert_eq!(kt[4], 1.0);
}

#[test]
fn test_diffuse_fraction_missing_at_zero_ghi() {
    let table = ObservationTable::new()
        .with_numeric("GHI", vec![0.0, 400.0])
        .unwrap()
        .with_numeric("DHI", vec![5.0, 100.0])
        .unwrap();
    let kd = SolarMetrics::new(&table).diffuse_fraction().unwrap();
    assert!(kd[0].is_nan());
    assert_approx!(kd[1], 0.25, 1e-12);
}

#[test]
fn test_dni_from_components() {
    let dni = dni_from_ghi_dhi(&[500.0, 50.0], &[100.0, 80.0], None).unwrap();
    assert_eq!(dni, vec![400.0, 0.0]);

    let zenith = [0.0, std::f64::consts::FRAC_PI_3];
    let dni = dni_from_ghi_dhi(&[500.0, 300.0], &[100.0, 100.0], Some(&zenith[..])).unwrap();
    assert_approx!(dni[0], 400.0, 1e-9);
    assert_approx!(dni[1], 400.0, 1e-9);

    assert!(dni_from_ghi_dhi(&[1.0], &[1.0, 2.0], None).is_err());
}

// ── Energy and assessment ──

#[test]
fn test_one_hour_at_600_is_point_six_kwh() {
    let table = ObservationTable::new()
        .with_timestamps(series(Duration::minutes(1), 60))
        .unwrap()
        .with_numeric("GHI", vec![600.0; 60])
        .unwrap();
    let metrics = SolarMetrics::new(&table);

    assert_approx!(metrics.sampling_interval_hours().unwrap(), 1.0 / 60.0, 1e-12);
    let daily = metrics.daily_energy("GHI").unwrap();
    assert_eq!(daily.len(), 1);
    assert_approx!(daily[&midnight().date()], 0.6, 1e-9);
}

#[test]
fn test_assessment_of_two_sunny_days() {
    let table = two_sunny_days();
    let assessment = SolarMetrics::new(&table).assess_solar_potential().unwrap();

    assert_approx!(assessment.mean_ghi.unwrap(), 250.0, 1e-9);
    assert_approx!(assessment.max_ghi.unwrap(), 500.0, 1e-9);
    assert_approx!(assessment.daylight_hours_percent.unwrap(), 50.0, 1e-9);
    assert_approx!(assessment.mean_daily_energy_kwh_m2.unwrap(), 6.0, 1e-9);
    assert_approx!(assessment.annual_ghi_kwh_m2.unwrap(), 2190.0, 1e-6);
    assert_eq!(assessment.peak_sun_hours, assessment.mean_daily_energy_kwh_m2);
    let kt = assessment.mean_clearness_index.unwrap();
    assert!((0.0..=1.0).contains(&kt));
    // no ambient temperature column
    assert!(assessment.mean_ambient_temp.is_none());
    assert!(assessment.metrics().iter().all(|(name, _)| !name.contains("ambient")));
}

#[test]
fn test_assessment_needs_irradiance() {
    let table = ObservationTable::new()
        .with_timestamps(series(Duration::hours(1), 3))
        .unwrap()
        .with_numeric("GHI", vec![1.0, 2.0, 3.0])
        .unwrap();
    assert!(SolarMetrics::new(&table).assess_solar_potential().is_err());
}

#[test]
fn test_hourly_pattern_keys_are_hours() {
    let table = two_sunny_days();
    let patterns = SolarMetrics::new(&table).hourly_patterns(None).unwrap();

    let ghi = &patterns["GHI"];
    assert_eq!(ghi.len(), 24);
    assert_eq!(ghi[&6].mean, Some(500.0));
    assert_eq!(ghi[&3].max, Some(0.0));
    assert_eq!(ghi[&12].std, Some(0.0));

    let monthly = SolarMetrics::new(&table).monthly_patterns(Some(&["GHI"][..])).unwrap();
    assert_eq!(monthly["GHI"].keys().copied().collect::<Vec<_>>(), vec![8]);
}

#[test]
fn test_site_comparison_is_metric_then_site() {
    let sunny = two_sunny_days();
    let mut dimmer = two_sunny_days();
    for g in dimmer.numeric_mut("GHI").unwrap() {
        *g *= 0.5;
    }
    // no GHI column, so no assessment
    let dark = ObservationTable::new()
        .with_timestamps(series(Duration::hours(1), 48))
        .unwrap()
        .with_numeric("DNI", vec![100.0; 48])
        .unwrap();
    let sites = vec![
        ("alpha".to_string(), sunny),
        ("beta".to_string(), dimmer),
        ("gamma".to_string(), dark),
    ];
    let comparison = compare_across_sites(&sites);

    assert_eq!(comparison["mean_ghi"]["alpha"], 250.0);
    assert_eq!(comparison["mean_ghi"]["beta"], 125.0);
    assert!(!comparison.contains_key("mean_ambient_temp"));
    assert!(comparison.values().all(|by_site| !by_site.contains_key("gamma")));
    assert_eq!(comparison["mean_ghi"].len(), 2);
}

// ── Cleaning events ──

#[test]
fn test_cleaning_without_events() {
    let table = two_sunny_days()
        .with_numeric("Cleaning", vec![0.0; 48])
        .unwrap()
        .with_numeric("ModA", vec![100.0; 48])
        .unwrap();
    let impact = cleaning_impact(&table, "Cleaning", "ModA", 7).unwrap();
    assert_eq!(impact, CleaningImpact::NoEvents);
    assert_eq!(impact.message(), Some("No cleaning events found"));
}

#[test]
fn test_cleaning_window_follows_sampling_interval() {
    // half-hourly, so a one-day window is 48 rows
    let n = 144;
    let mut cleaning = vec![0.0; n];
    cleaning[72] = 1.0;
    let moda: Vec<f64> = (0..n).map(|i| if i < 72 { 200.0 } else { 180.0 }).collect();
    let table = ObservationTable::new()
        .with_timestamps(series(Duration::minutes(30), n))
        .unwrap()
        .with_numeric("Cleaning", cleaning)
        .unwrap()
        .with_numeric("ModA", moda)
        .unwrap();

    match cleaning_impact(&table, "Cleaning", "ModA", 1).unwrap() {
        CleaningImpact::Measured {
            cleaning_events,
            window_rows,
            mean_before_cleaning,
            mean_after_cleaning,
            percent_improvement,
            ..
        } => {
            assert_eq!(cleaning_events, 1);
            assert_eq!(window_rows, 48);
            assert_approx!(mean_before_cleaning, 200.0, 1e-9);
            assert_approx!(mean_after_cleaning, 180.0, 1e-9);
            assert_approx!(percent_improvement.unwrap(), -10.0, 1e-9);
        }
        other => panic!("expected a measured impact, got {other:?}"),
    }
}

// ── Binned impact ──

#[test]
fn test_humidity_bins_cover_every_row() {
    let rh: Vec<f64> = (0..100).map(|i| i as f64).collect();
    let ghi: Vec<f64> = rh.iter().map(|h| 1000.0 - 5.0 * h).collect();
    let table = ObservationTable::new()
        .with_numeric("RH", rh)
        .unwrap()
        .with_numeric("GHI", ghi)
        .unwrap();
    let rows = rh_impact_on_irradiance(&table, 10).unwrap();

    assert_eq!(rows.len(), 10);
    assert_eq!(rows.iter().map(|r| r.count).sum::<usize>(), 100);
    // drier bins see more sun
    assert!(rows.windows(2).all(|w| w[0].dependent_mean > w[1].dependent_mean));
}

#[test]
fn test_temperature_bins_against_ghi() {
    let tamb: Vec<f64> = (0..100).map(|i| i as f64).collect();
    let ghi: Vec<f64> = tamb.iter().map(|t| 2.0 * t).collect();
    let table = ObservationTable::new()
        .with_numeric("Tamb", tamb)
        .unwrap()
        .with_numeric("GHI", ghi)
        .unwrap()
        .with_numeric("TModA", vec![-1.0; 100])
        .unwrap();
    let rows = SolarMetrics::new(&table).temperature_impact(TEMPERATURE_BINS).unwrap();

    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|r| r.count == 10));
    // first bin holds 0..=9
    assert_approx!(rows[0].driver_mean, 4.5, 1e-9);
    assert_approx!(rows[0].dependent_mean, 9.0, 1e-9);
    assert_approx!(rows[9].dependent_mean, 189.0, 1e-9);
}

#[test]
fn test_wind_bins_against_module_temperature() {
    let mut ws: Vec<f64> = (0..50).map(|i| i as f64).collect();
    let mut tmoda: Vec<f64> = ws.iter().map(|w| 50.0 - 0.5 * w).collect();
    ws.push(f64::NAN);
    tmoda.push(0.0);
    let table = ObservationTable::new()
        .with_numeric("WS", ws)
        .unwrap()
        .with_numeric("TModA", tmoda)
        .unwrap()
        .with_numeric("GHI", vec![800.0; 51])
        .unwrap();
    let metrics = SolarMetrics::new(&table);
    let rows = metrics.wind_speed_impact(WIND_SPEED_BINS).unwrap();

    assert_eq!(rows.len(), 5);
    // the row without a wind reading is dropped
    assert_eq!(rows.iter().map(|r| r.count).sum::<usize>(), 50);
    assert!(rows.iter().all(|r| r.count == 10));
    assert_approx!(rows[0].dependent_mean, 47.75, 1e-9);
    assert_approx!(rows[4].driver_mean, 44.5, 1e-9);
    assert_approx!(rows[4].dependent_mean, 27.75, 1e-9);
    // windier bins run cooler
    assert!(rows.windows(2).all(|w| w[0].dependent_mean > w[1].dependent_mean));

    let no_module = ObservationTable::new().with_numeric("WS", vec![1.0, 2.0]).unwrap();
    assert!(SolarMetrics::new(&no_module).wind_speed_impact(WIND_SPEED_BINS).is_err());
}
