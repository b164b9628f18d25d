use solarscope::data::table::ObservationTable;
use solarscope::error::Error;
use solarscope::processing::correlation::CorrelationMethod;
use solarscope::processing::hypothesis::*;
use solarscope::processing::statistics::Descriptive;

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

fn weather_table() -> ObservationTable {
    let n = 60;
    let ghi: Vec<f64> = (0..n).map(|i| 20.0 * i as f64).collect();
    let tamb: Vec<f64> = (0..n).map(|i| 22.0 + 0.1 * i as f64 + ((i * 7) % 5) as f64 * 0.2).collect();
    let rh: Vec<f64> = (0..n).map(|i| 90.0 - 0.5 * i as f64 + ((i * 3) % 4) as f64).collect();
    let mut ws: Vec<f64> = (0..n).map(|i| ((i * 11) % 13) as f64 * 0.4).collect();
    ws[5] = f64::NAN;
    ObservationTable::new()
        .with_numeric("GHI", ghi)
        .unwrap()
        .with_numeric("Tamb", tamb)
        .unwrap()
        .with_numeric("RH", rh)
        .unwrap()
        .with_numeric("WS", ws)
        .unwrap()
}

// ── Descriptive ──

#[test]
fn test_descriptive_ignores_missing() {
    let d = Descriptive::compute(&[4.0, f64::NAN, 1.0, 3.0, 2.0]).unwrap();
    assert_eq!(d.count, 4);
    assert_approx!(d.mean, 2.5, 1e-12);
    assert_approx!(d.median, 2.5, 1e-12);
    assert_eq!(d.min, 1.0);
    assert_eq!(d.max, 4.0);
    assert!(Descriptive::compute(&[f64::NAN]).is_none());
}

// ── Group comparisons ──

#[test]
fn test_anova_on_separated_groups() {
    let analyzer = StatisticalAnalyzer::new(0.05);
    let a = [10.0, 12.0, 11.0];
    let b = [20.0, 22.0, 21.0];
    let c = [10.0, 11.0, 12.0];
    let result = analyzer.anova_oneway(&[&a[..], &b[..], &c[..]], None).unwrap();

    assert_approx!(result.f_statistic, 100.0, 1e-9);
    assert!(result.p_value < 0.001);
    assert!(result.significant_difference);
    assert_eq!(result.num_groups, 3);
    assert_eq!(result.group_statistics[1].name, "Group 2");
    assert_approx!(result.group_statistics[1].mean, 21.0, 1e-12);
    assert!(result.interpretation.starts_with("Significant difference among groups"));
}

#[test]
fn test_anova_identical_groups_is_not_significant() {
    let analyzer = StatisticalAnalyzer::default();
    let a = [1.0, 2.0, 3.0, 4.0];
    let result = analyzer.anova_oneway(&[&a[..], &a[..]], Some(&["x", "y"][..])).unwrap();
    assert_approx!(result.f_statistic, 0.0, 1e-12);
    assert_approx!(result.p_value, 1.0, 1e-9);
    assert!(!result.significant_difference);
}

#[test]
fn test_group_count_and_name_errors() {
    let analyzer = StatisticalAnalyzer::default();
    let a = [1.0, 2.0];
    assert!(matches!(
        analyzer.anova_oneway(&[&a[..]], None),
        Err(Error::InsufficientData { .. })
    ));
    assert!(matches!(
        analyzer.kruskal_wallis(&[&a[..], &a[..]], Some(&["only one"][..])),
        Err(Error::InvalidArgument(_))
    ));
    let empty: [f64; 0] = [];
    assert!(analyzer.anova_oneway(&[&a[..], &empty[..]], None).is_err());
}

#[test]
fn test_student_t_known_value() {
    let analyzer = StatisticalAnalyzer::default();
    let result = analyzer
        .ttest_independent(&[1.0, 2.0, 3.0, 4.0, 5.0], &[3.0, 4.0, 5.0, 6.0, 7.0], true)
        .unwrap();
    assert_approx!(result.statistic, -2.0, 1e-12);
    assert_approx!(result.p_value, 0.0805, 1e-3);
    assert!(!result.significant_difference);

    let welch = analyzer
        .ttest_independent(&[1.0, 2.0, 3.0, 4.0, 5.0], &[3.0, 4.0, 5.0, 6.0, 7.0], false)
        .unwrap();
    assert_eq!(welch.test, "Welch's t-test");
    assert_approx!(welch.statistic, -2.0, 1e-12);
}

#[test]
fn test_mann_whitney_on_disjoint_groups() {
    let analyzer = StatisticalAnalyzer::default();
    let low = [1.0, 2.0, 3.0, 4.0, 5.0];
    let high = [6.0, 7.0, 8.0, 9.0, 10.0];
    let result = analyzer.mann_whitney_u(&low, &high, Alternative::TwoSided).unwrap();

    assert_eq!(result.u_statistic, 0.0);
    assert_approx!(result.p_value, 0.0122, 1e-3);
    assert!(result.significant_difference);
    assert_eq!(result.group1_median, 3.0);

    let one_sided = analyzer.mann_whitney_u(&low, &high, Alternative::Less).unwrap();
    assert!(one_sided.p_value < result.p_value);
    assert_eq!("greater".parse::<Alternative>().unwrap(), Alternative::Greater);
}

#[test]
fn test_compare_groups_picks_the_test() {
    let groups = vec![
        ("benin".to_string(), vec![5.0, 6.0, 7.0, 6.5]),
        ("togo".to_string(), vec![4.0, 4.5, 5.0, 4.2]),
        ("sierraleone".to_string(), vec![3.0, 3.5, 2.8, 3.1]),
    ];
    let parametric = compare_groups(&groups, true, 0.05).unwrap();
    let ranked = compare_groups(&groups, false, 0.05).unwrap();

    assert!(matches!(parametric, GroupComparison::Anova(_)));
    match &ranked {
        GroupComparison::KruskalWallis(r) => {
            assert_eq!(r.group_statistics[0].name, "benin");
            assert_eq!(r.group_statistics[0].median, Some(6.25));
        }
        other => panic!("expected Kruskal-Wallis, got {other:?}"),
    }
    assert!(parametric.significant_difference());
    assert!(ranked.p_value() < 0.05);
}

// ── Correlation ──

#[test]
fn test_correlation_matrix_is_symmetric() {
    let analyzer = StatisticalAnalyzer::default();
    let table = weather_table();
    let matrix = analyzer
        .correlation_analysis(&table, None, CorrelationMethod::Pearson)
        .unwrap();

    let k = matrix.columns.len();
    assert_eq!(k, 4);
    for i in 0..k {
        assert_eq!(matrix.correlation[i][i], 1.0);
        for j in 0..k {
            assert_eq!(matrix.correlation[i][j], matrix.correlation[j][i]);
            assert_eq!(matrix.p_values[i][j], matrix.p_values[j][i]);
            assert!(matrix.correlation[i][j].abs() <= 1.0 + 1e-12);
        }
    }
    assert!(matrix.significant_pairs <= k * (k - 1) / 2);
    assert!(matrix.correlation_between("GHI", "Tamb").unwrap() > 0.9);
    assert!(matrix.correlation_between("GHI", "RH").unwrap() < -0.9);
}

#[test]
fn test_rank_methods_agree_on_monotone_pairs() {
    let analyzer = StatisticalAnalyzer::default();
    let table = ObservationTable::new()
        .with_numeric("x", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        .unwrap()
        .with_numeric("y", vec![1.0, 4.0, 9.0, 16.0, 25.0, 36.0])
        .unwrap();

    for method in [CorrelationMethod::Spearman, CorrelationMethod::Kendall] {
        let matrix = analyzer.correlation_analysis(&table, None, method).unwrap();
        assert_approx!(matrix.correlation_between("x", "y").unwrap(), 1.0, 1e-12);
    }
}

#[test]
fn test_short_pairs_leave_gaps() {
    let analyzer = StatisticalAnalyzer::default();
    let nan = f64::NAN;
    let table = ObservationTable::new()
        .with_numeric("a", vec![1.0, 2.0, 3.0, 4.0])
        .unwrap()
        .with_numeric("b", vec![nan, nan, 1.0, 2.0])
        .unwrap();
    let matrix = analyzer
        .correlation_analysis(&table, Some(&["a", "b"][..]), CorrelationMethod::Pearson)
        .unwrap();

    assert!(matrix.correlation_between("a", "b").is_none());
    let nested = matrix.to_nested_map();
    assert!(!nested["a"].contains_key("b"));
    assert_eq!(nested["b"]["b"], 1.0);
}

#[test]
fn test_quick_correlation_sentence() {
    let x = [1.0, 2.0, 3.0, 4.0, 5.0];
    let y = [2.0, 4.0, 6.0, 8.0, 10.0];
    let result = quick_correlation_test(&x, &y, CorrelationMethod::Pearson).unwrap();
    assert!(result.interpretation.starts_with("Pearson correlation: 1.000 (significant"));
    assert!(quick_correlation_test(&x, &y[..4], CorrelationMethod::Pearson).is_err());
}

// ── Normality ──

#[test]
fn test_shapiro_subsample_is_seeded() {
    let data: Vec<f64> = (0..6000).map(|i| ((i * 37) % 1000) as f64 / 10.0).collect();
    let a = StatisticalAnalyzer::default().with_seed(7);
    let first = a.test_normality(&data, NormalityMethod::Shapiro).unwrap();
    let second = a.test_normality(&data, NormalityMethod::Shapiro).unwrap();

    assert_eq!(first.sample_size, SHAPIRO_MAX_SAMPLE);
    assert_eq!(first.statistic, second.statistic);
    assert_eq!(first.note.as_deref(), Some("Used sample of 5000 points for efficiency"));
}

#[test]
fn test_anderson_reports_critical_values() {
    let data: Vec<f64> = (1..=50).map(|i| i as f64).collect();
    let result = StatisticalAnalyzer::default()
        .test_normality(&data, NormalityMethod::Anderson)
        .unwrap();

    assert!(result.p_value.is_none());
    assert_eq!(result.critical_values.as_ref().map(Vec::len), Some(5));
    assert_eq!(result.significance_levels.as_ref().map(Vec::len), Some(5));
    assert!(result.statistic > 0.0);
}

#[test]
fn test_normality_needs_three_values() {
    let err = StatisticalAnalyzer::default()
        .test_normality(&[1.0, f64::NAN, 2.0], NormalityMethod::KsTest)
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientData { needed: 3, got: 2, .. }));
    assert!("lilliefors".parse::<NormalityMethod>().is_err());
}
