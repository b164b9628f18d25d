use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::data::table::ObservationTable;
use crate::error::{Error, Result};
use crate::processing::correlation::{
    average_ranks, correlate, paired_finite, tie_groups, CorrelationMethod,
};
use crate::processing::distributions::{chi2_sf, f_sf, normal_sf, t_two_sided};
use crate::processing::normality::{
    anderson_normal, ks_standard_normal, shapiro_wilk, ANDERSON_SIGNIFICANCE,
};
use crate::processing::statistics::{finite, finite_values, mean, median, sample_std};

/// Default significance level.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Shapiro-Wilk inputs above this size are subsampled.
pub const SHAPIRO_MAX_SAMPLE: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalityMethod {
    #[default]
    Shapiro,
    KsTest,
    Anderson,
}

impl NormalityMethod {
    pub fn label(&self) -> &'static str {
        match self {
            NormalityMethod::Shapiro => "shapiro",
            NormalityMethod::KsTest => "kstest",
            NormalityMethod::Anderson => "anderson",
        }
    }
}

impl FromStr for NormalityMethod {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "shapiro" => Ok(NormalityMethod::Shapiro),
            "kstest" => Ok(NormalityMethod::KsTest),
            "anderson" => Ok(NormalityMethod::Anderson),
            _ => Err(Error::UnknownMethod {
                name: s.to_string(),
                expected: "shapiro, kstest, anderson",
            }),
        }
    }
}

/// Alternative hypothesis for the Mann-Whitney U test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alternative {
    #[default]
    TwoSided,
    Less,
    Greater,
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Alternative::TwoSided => "two-sided",
            Alternative::Less => "less",
            Alternative::Greater => "greater",
        })
    }
}

impl FromStr for Alternative {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "two-sided" => Ok(Alternative::TwoSided),
            "less" => Ok(Alternative::Less),
            "greater" => Ok(Alternative::Greater),
            _ => Err(Error::UnknownMethod {
                name: s.to_string(),
                expected: "two-sided, less, greater",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalityResult {
    pub method: NormalityMethod,
    pub sample_size: usize,
    pub statistic: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_values: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significance_levels: Option<Vec<f64>>,
    pub is_normal: bool,
    pub interpretation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Correlation and p-value matrices over a set of columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub method: CorrelationMethod,
    pub columns: Vec<String>,
    /// Row-major; NaN where a pair had fewer than three complete rows.
    pub correlation: Vec<Vec<f64>>,
    pub p_values: Vec<Vec<f64>>,
    /// Unordered off-diagonal pairs with p below alpha.
    pub significant_pairs: usize,
}

impl CorrelationMatrix {
    fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn correlation_between(&self, a: &str, b: &str) -> Option<f64> {
        let (i, j) = (self.index_of(a)?, self.index_of(b)?);
        finite(self.correlation[i][j])
    }

    pub fn p_value_between(&self, a: &str, b: &str) -> Option<f64> {
        let (i, j) = (self.index_of(a)?, self.index_of(b)?);
        finite(self.p_values[i][j])
    }

    /// `column → column → coefficient`, leaving out undefined entries.
    pub fn to_nested_map(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        let mut out = BTreeMap::new();
        for (i, a) in self.columns.iter().enumerate() {
            let row: BTreeMap<String, f64> = self
                .columns
                .iter()
                .enumerate()
                .filter_map(|(j, b)| finite(self.correlation[i][j]).map(|r| (b.clone(), r)))
                .collect();
            out.insert(a.clone(), row);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TTestResult {
    pub test: String,
    pub statistic: f64,
    pub p_value: f64,
    pub significant_difference: bool,
    pub group1_mean: f64,
    pub group2_mean: f64,
    pub group1_std: f64,
    pub group2_std: f64,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub n: usize,
    pub mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaResult {
    pub test: String,
    pub f_statistic: f64,
    pub p_value: f64,
    pub significant_difference: bool,
    pub num_groups: usize,
    pub interpretation: String,
    pub group_statistics: Vec<GroupSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KruskalResult {
    pub test: String,
    pub h_statistic: f64,
    pub p_value: f64,
    pub significant_difference: bool,
    pub num_groups: usize,
    pub interpretation: String,
    pub group_statistics: Vec<GroupSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MannWhitneyResult {
    pub test: String,
    pub u_statistic: f64,
    pub p_value: f64,
    pub alternative: Alternative,
    pub significant_difference: bool,
    pub group1_median: f64,
    pub group2_median: f64,
    pub interpretation: String,
}

fn difference_text(p: f64, alpha: f64, between: &str) -> String {
    let lead = if p < alpha { "Significant" } else { "No significant" };
    format!("{lead} difference {between} groups (p={p:.4})")
}

/// Hypothesis tests at a fixed significance level.
///
/// Every method drops missing values first and returns a serializable
/// result carrying the raw statistic, the verdict at `alpha`, and a sentence
/// describing it.
#[derive(Debug, Clone)]
pub struct StatisticalAnalyzer {
    alpha: f64,
    seed: u64,
}

impl Default for StatisticalAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl StatisticalAnalyzer {
    pub fn new(significance_level: f64) -> Self {
        Self { alpha: significance_level, seed: 42 }
    }

    /// Seed for the Shapiro-Wilk subsample.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn test_normality(&self, data: &[f64], method: NormalityMethod) -> Result<NormalityResult> {
        let mut values = finite_values(data);
        if values.len() < 3 {
            return Err(Error::InsufficientData {
                test: "normality test",
                needed: 3,
                got: values.len(),
            });
        }

        let mut note = None;
        if method == NormalityMethod::Shapiro && values.len() > SHAPIRO_MAX_SAMPLE {
            let mut rng = StdRng::seed_from_u64(self.seed);
            let picked = rand::seq::index::sample(&mut rng, values.len(), SHAPIRO_MAX_SAMPLE);
            let sampled: Vec<f64> = picked.into_iter().map(|i| values[i]).collect();
            values = sampled;
            note = Some(format!("Used sample of {SHAPIRO_MAX_SAMPLE} points for efficiency"));
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let sample_size = values.len();

        let verdict = |is_normal: bool| if is_normal { "appears" } else { "does not appear" };

        let result = match method {
            NormalityMethod::Shapiro | NormalityMethod::KsTest => {
                let (statistic, p) = if method == NormalityMethod::Shapiro {
                    shapiro_wilk(&values)
                } else {
                    ks_standard_normal(&values)
                };
                let is_normal = p > self.alpha;
                NormalityResult {
                    method,
                    sample_size,
                    statistic,
                    p_value: Some(p),
                    critical_values: None,
                    significance_levels: None,
                    is_normal,
                    interpretation: format!(
                        "Data {} to be normally distributed (p={p:.4})",
                        verdict(is_normal)
                    ),
                    note,
                }
            }
            NormalityMethod::Anderson => {
                let (statistic, critical) = anderson_normal(&values);
                // the 5 % row
                let is_normal = statistic < critical[2];
                NormalityResult {
                    method,
                    sample_size,
                    statistic,
                    p_value: None,
                    critical_values: Some(critical.to_vec()),
                    significance_levels: Some(ANDERSON_SIGNIFICANCE.to_vec()),
                    is_normal,
                    interpretation: format!(
                        "Data {} to be normally distributed at {}% level",
                        verdict(is_normal),
                        ANDERSON_SIGNIFICANCE[2]
                    ),
                    note,
                }
            }
        };

        tracing::debug!(
            "Normality ({}) on {} points: statistic={:.4}",
            method.label(),
            sample_size,
            result.statistic
        );
        Ok(result)
    }

    /// Pairwise correlation matrix over `columns` (all numeric columns when
    /// `None`). Each pair uses only rows where both values are present.
    pub fn correlation_analysis(
        &self,
        table: &ObservationTable,
        columns: Option<&[&str]>,
        method: CorrelationMethod,
    ) -> Result<CorrelationMatrix> {
        let names: Vec<String> = match columns {
            Some(cols) => cols.iter().map(|c| c.to_string()).collect(),
            None => table.numeric_column_names(),
        };
        let data: Vec<&[f64]> = names
            .iter()
            .map(|n| table.numeric(n))
            .collect::<Result<_>>()?;

        let k = names.len();
        let mut correlation = vec![vec![f64::NAN; k]; k];
        let mut p_values = vec![vec![f64::NAN; k]; k];
        let mut significant_pairs = 0;

        for i in 0..k {
            correlation[i][i] = 1.0;
            p_values[i][i] = 0.0;
            for j in (i + 1)..k {
                let (x, y) = paired_finite(data[i], data[j]);
                if x.len() < 3 {
                    continue;
                }
                let (r, p) = correlate(&x, &y, method);
                correlation[i][j] = r;
                correlation[j][i] = r;
                p_values[i][j] = p;
                p_values[j][i] = p;
                if p < self.alpha {
                    significant_pairs += 1;
                }
            }
        }

        Ok(CorrelationMatrix { method, columns: names, correlation, p_values, significant_pairs })
    }

    /// Student's (`equal_var`) or Welch's two-sample t-test.
    pub fn ttest_independent(&self, group1: &[f64], group2: &[f64], equal_var: bool) -> Result<TTestResult> {
        let g1 = finite_values(group1);
        let g2 = finite_values(group2);
        let smallest = g1.len().min(g2.len());
        if smallest < 2 {
            return Err(Error::InsufficientData { test: "t-test", needed: 2, got: smallest });
        }

        let (n1, n2) = (g1.len() as f64, g2.len() as f64);
        let (m1, m2) = (mean(&g1), mean(&g2));
        let (s1, s2) = (sample_std(&g1), sample_std(&g2));
        let (v1, v2) = (s1 * s1, s2 * s2);

        let (t, df) = if equal_var {
            let df = n1 + n2 - 2.0;
            let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df;
            ((m1 - m2) / (pooled * (1.0 / n1 + 1.0 / n2)).sqrt(), df)
        } else {
            let (a, b) = (v1 / n1, v2 / n2);
            let df = (a + b).powi(2) / (a * a / (n1 - 1.0) + b * b / (n2 - 1.0));
            ((m1 - m2) / (a + b).sqrt(), df)
        };
        let p = t_two_sided(t, df);

        Ok(TTestResult {
            test: if equal_var { "Student's t-test" } else { "Welch's t-test" }.to_string(),
            statistic: t,
            p_value: p,
            significant_difference: p < self.alpha,
            group1_mean: m1,
            group2_mean: m2,
            group1_std: s1,
            group2_std: s2,
            interpretation: difference_text(p, self.alpha, "between"),
        })
    }

    /// One-way ANOVA across two or more groups.
    pub fn anova_oneway(&self, groups: &[&[f64]], group_names: Option<&[&str]>) -> Result<AnovaResult> {
        let cleaned = clean_groups(groups)?;
        let names = resolve_names(groups.len(), group_names)?;

        let k = cleaned.len() as f64;
        let n_total: usize = cleaned.iter().map(Vec::len).sum();
        let grand = cleaned.iter().flatten().sum::<f64>() / n_total as f64;

        let mut ss_between = 0.0;
        let mut ss_within = 0.0;
        for g in &cleaned {
            let m = mean(g);
            ss_between += g.len() as f64 * (m - grand).powi(2);
            ss_within += g.iter().map(|x| (x - m).powi(2)).sum::<f64>();
        }
        let df_between = k - 1.0;
        let df_within = n_total as f64 - k;

        let f = if ss_within == 0.0 {
            if ss_between == 0.0 { f64::NAN } else { f64::INFINITY }
        } else {
            (ss_between / df_between) / (ss_within / df_within)
        };
        let p = f_sf(f, df_between, df_within);

        let group_statistics = names
            .into_iter()
            .zip(&cleaned)
            .map(|(name, g)| GroupSummary {
                name,
                n: g.len(),
                mean: mean(g),
                std: finite(sample_std(g)),
                median: None,
            })
            .collect();

        tracing::debug!("ANOVA over {} groups: F={f:.4}, p={p:.4e}", cleaned.len());
        Ok(AnovaResult {
            test: "One-way ANOVA".to_string(),
            f_statistic: f,
            p_value: p,
            significant_difference: p < self.alpha,
            num_groups: cleaned.len(),
            interpretation: difference_text(p, self.alpha, "among"),
            group_statistics,
        })
    }

    /// Kruskal-Wallis H-test with tie correction.
    pub fn kruskal_wallis(&self, groups: &[&[f64]], group_names: Option<&[&str]>) -> Result<KruskalResult> {
        let cleaned = clean_groups(groups)?;
        let names = resolve_names(groups.len(), group_names)?;

        let pooled: Vec<f64> = cleaned.iter().flatten().copied().collect();
        let ranks = average_ranks(&pooled);
        let n = pooled.len() as f64;

        let mut offset = 0;
        let mut h = 0.0;
        for g in &cleaned {
            let rank_sum: f64 = ranks[offset..offset + g.len()].iter().sum();
            h += rank_sum * rank_sum / g.len() as f64;
            offset += g.len();
        }
        h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

        let ties: f64 = tie_groups(&pooled)
            .iter()
            .map(|&t| (t as f64).powi(3) - t as f64)
            .sum();
        let correction = 1.0 - ties / (n.powi(3) - n);
        let h = if correction > 0.0 { h / correction } else { f64::NAN };
        let p = chi2_sf(h, cleaned.len() as f64 - 1.0);

        let group_statistics = names
            .into_iter()
            .zip(&cleaned)
            .map(|(name, g)| GroupSummary {
                name,
                n: g.len(),
                mean: mean(g),
                std: None,
                median: Some(median(g)),
            })
            .collect();

        Ok(KruskalResult {
            test: "Kruskal-Wallis H-test".to_string(),
            h_statistic: h,
            p_value: p,
            significant_difference: p < self.alpha,
            num_groups: cleaned.len(),
            interpretation: difference_text(p, self.alpha, "among"),
            group_statistics,
        })
    }

    /// Mann-Whitney U test using the normal approximation with tie and
    /// continuity correction. The reported statistic is U for `group1`.
    pub fn mann_whitney_u(
        &self,
        group1: &[f64],
        group2: &[f64],
        alternative: Alternative,
    ) -> Result<MannWhitneyResult> {
        let g1 = finite_values(group1);
        let g2 = finite_values(group2);
        let smallest = g1.len().min(g2.len());
        if smallest < 1 {
            return Err(Error::InsufficientData { test: "Mann-Whitney U test", needed: 1, got: 0 });
        }

        let (n1, n2) = (g1.len() as f64, g2.len() as f64);
        let pooled: Vec<f64> = g1.iter().chain(&g2).copied().collect();
        let ranks = average_ranks(&pooled);
        let r1: f64 = ranks[..g1.len()].iter().sum();
        let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
        let u2 = n1 * n2 - u1;

        let n = n1 + n2;
        let ties: f64 = tie_groups(&pooled)
            .iter()
            .map(|&t| (t as f64).powi(3) - t as f64)
            .sum();
        let mu = n1 * n2 / 2.0;
        let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)))).sqrt();

        let u = match alternative {
            Alternative::TwoSided => u1.max(u2),
            Alternative::Greater => u1,
            Alternative::Less => u2,
        };
        let p = if sigma > 0.0 {
            let z = (u - mu - 0.5) / sigma;
            let tail = normal_sf(z);
            match alternative {
                Alternative::TwoSided => (2.0 * tail).clamp(0.0, 1.0),
                _ => tail.clamp(0.0, 1.0),
            }
        } else {
            f64::NAN
        };

        Ok(MannWhitneyResult {
            test: "Mann-Whitney U test".to_string(),
            u_statistic: u1,
            p_value: p,
            alternative,
            significant_difference: p < self.alpha,
            group1_median: median(&g1),
            group2_median: median(&g2),
            interpretation: difference_text(p, self.alpha, "between"),
        })
    }
}

fn clean_groups(groups: &[&[f64]]) -> Result<Vec<Vec<f64>>> {
    if groups.len() < 2 {
        return Err(Error::InsufficientData { test: "group comparison", needed: 2, got: groups.len() });
    }
    let cleaned: Vec<Vec<f64>> = groups.iter().map(|g| finite_values(g)).collect();
    let smallest = cleaned.iter().map(Vec::len).min().unwrap_or(0);
    if smallest == 0 {
        return Err(Error::InsufficientData { test: "group comparison", needed: 1, got: 0 });
    }
    let total: usize = cleaned.iter().map(Vec::len).sum();
    if total <= cleaned.len() {
        return Err(Error::InsufficientData {
            test: "group comparison",
            needed: cleaned.len() + 1,
            got: total,
        });
    }
    Ok(cleaned)
}

fn resolve_names(count: usize, names: Option<&[&str]>) -> Result<Vec<String>> {
    match names {
        Some(n) if n.len() != count => Err(Error::InvalidArgument(format!(
            "{} group names given for {count} groups",
            n.len()
        ))),
        Some(n) => Ok(n.iter().map(|s| s.to_string()).collect()),
        None => Ok((1..=count).map(|i| format!("Group {i}")).collect()),
    }
}

/// Result of [`compare_groups`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GroupComparison {
    Anova(AnovaResult),
    KruskalWallis(KruskalResult),
}

impl GroupComparison {
    pub fn p_value(&self) -> f64 {
        match self {
            GroupComparison::Anova(r) => r.p_value,
            GroupComparison::KruskalWallis(r) => r.p_value,
        }
    }

    pub fn significant_difference(&self) -> bool {
        match self {
            GroupComparison::Anova(r) => r.significant_difference,
            GroupComparison::KruskalWallis(r) => r.significant_difference,
        }
    }
}

/// ANOVA (`parametric`) or Kruskal-Wallis over named groups.
pub fn compare_groups(
    groups: &[(String, Vec<f64>)],
    parametric: bool,
    significance_level: f64,
) -> Result<GroupComparison> {
    let analyzer = StatisticalAnalyzer::new(significance_level);
    let names: Vec<&str> = groups.iter().map(|(n, _)| n.as_str()).collect();
    let data: Vec<&[f64]> = groups.iter().map(|(_, v)| v.as_slice()).collect();
    if parametric {
        analyzer.anova_oneway(&data, Some(names.as_slice())).map(GroupComparison::Anova)
    } else {
        analyzer.kruskal_wallis(&data, Some(names.as_slice())).map(GroupComparison::KruskalWallis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickCorrelation {
    pub method: CorrelationMethod,
    pub n: usize,
    pub correlation: f64,
    pub p_value: f64,
    pub significant: bool,
    pub interpretation: String,
}

/// Correlation between two series after dropping rows where either is missing.
pub fn quick_correlation_test(x: &[f64], y: &[f64], method: CorrelationMethod) -> Result<QuickCorrelation> {
    if x.len() != y.len() {
        return Err(Error::InvalidArgument(format!(
            "series lengths differ ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    let (x, y) = paired_finite(x, y);
    if x.len() < 3 {
        return Err(Error::InsufficientData { test: "correlation test", needed: 3, got: x.len() });
    }
    let (r, p) = correlate(&x, &y, method);
    let significant = p < DEFAULT_ALPHA;

    let label = method.label();
    let mut title = label.to_string();
    title[..1].make_ascii_uppercase();
    Ok(QuickCorrelation {
        method,
        n: x.len(),
        correlation: r,
        p_value: p,
        significant,
        interpretation: format!(
            "{title} correlation: {r:.3} ({}, p={p:.4})",
            if significant { "significant" } else { "not significant" }
        ),
    })
}
