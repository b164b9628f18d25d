use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::processing::distributions::{normal_sf, t_two_sided};

/// Correlation coefficient flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationMethod {
    pub fn label(&self) -> &'static str {
        match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
            CorrelationMethod::Kendall => "kendall",
        }
    }
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CorrelationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            "kendall" => Ok(CorrelationMethod::Kendall),
            _ => Err(Error::UnknownMethod {
                name: s.to_string(),
                expected: "pearson, spearman, kendall",
            }),
        }
    }
}

/// Keep only positions where both values are finite.
pub fn paired_finite(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip()
}

/// Coefficient and two-sided p-value for paired, finite data.
/// Both are NaN when either input is constant.
pub fn correlate(x: &[f64], y: &[f64], method: CorrelationMethod) -> (f64, f64) {
    match method {
        CorrelationMethod::Pearson => pearson(x, y),
        CorrelationMethod::Spearman => spearman(x, y),
        CorrelationMethod::Kendall => kendall_tau_b(x, y),
    }
}

/// Pearson r with the t-distribution p-value on n - 2 degrees of freedom.
pub fn pearson(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len();
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }
    let nf = n as f64;
    let mx = x.iter().sum::<f64>() / nf;
    let my = y.iter().sum::<f64>() / nf;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let r = (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0);
    (r, r_p_value(r, n))
}

fn r_p_value(r: f64, n: usize) -> f64 {
    if n < 3 {
        return f64::NAN;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    t_two_sided(t, df)
}

/// Spearman rho: Pearson on average ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> (f64, f64) {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// 1-based ranks with ties sharing their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Sizes of each group of tied values.
pub fn tie_groups(values: &[f64]) -> Vec<usize> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut groups = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        groups.push(j - i);
        i = j;
    }
    groups
}

fn pairs(t: usize) -> f64 {
    (t * t.saturating_sub(1)) as f64 / 2.0
}

/// Kendall tau-b with the tie-corrected normal approximation for the p-value.
///
/// Uses Knight's O(n log n) algorithm: sort by (x, y), then count the
/// exchanges a merge sort on y needs to find the discordant pairs.
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len();
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }

    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by(|&a, &b| x[a].total_cmp(&x[b]).then(y[a].total_cmp(&y[b])));

    // pairs tied on x, and tied on both
    let mut tied_x = 0.0;
    let mut tied_xy = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && x[idx[j]] == x[idx[i]] {
            j += 1;
        }
        tied_x += pairs(j - i);
        let mut k = i;
        while k < j {
            let mut l = k + 1;
            while l < j && y[idx[l]] == y[idx[k]] {
                l += 1;
            }
            tied_xy += pairs(l - k);
            k = l;
        }
        i = j;
    }

    let mut ys: Vec<f64> = idx.iter().map(|&i| y[i]).collect();
    let swaps = merge_count(&mut ys) as f64;

    let x_ties = tie_groups(x);
    let y_ties = tie_groups(y);
    let tied_y: f64 = y_ties.iter().map(|&t| pairs(t)).sum();

    let n0 = pairs(n);
    let s = n0 - tied_x - tied_y + tied_xy - 2.0 * swaps;
    let denom = ((n0 - tied_x) * (n0 - tied_y)).sqrt();
    if denom == 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let tau = (s / denom).clamp(-1.0, 1.0);

    let nf = n as f64;
    let v0 = nf * (nf - 1.0) * (2.0 * nf + 5.0);
    let vt = v_sum(&x_ties, |t| t * (t - 1.0) * (2.0 * t + 5.0));
    let vu = v_sum(&y_ties, |t| t * (t - 1.0) * (2.0 * t + 5.0));
    let v1 = v_sum(&x_ties, |t| t * (t - 1.0)) * v_sum(&y_ties, |t| t * (t - 1.0))
        / (2.0 * nf * (nf - 1.0));
    let v2 = if n > 2 {
        v_sum(&x_ties, |t| t * (t - 1.0) * (t - 2.0)) * v_sum(&y_ties, |t| t * (t - 1.0) * (t - 2.0))
            / (9.0 * nf * (nf - 1.0) * (nf - 2.0))
    } else {
        0.0
    };
    let var = (v0 - vt - vu) / 18.0 + v1 + v2;
    let p = if var > 0.0 {
        (2.0 * normal_sf(s.abs() / var.sqrt())).min(1.0)
    } else {
        f64::NAN
    };
    (tau, p)
}

fn v_sum(ties: &[usize], f: fn(f64) -> f64) -> f64 {
    ties.iter().map(|&t| f(t as f64)).sum()
}

/// Stable merge sort that returns the number of inversions.
fn merge_count(values: &mut [f64]) -> u64 {
    let n = values.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut swaps = merge_count(&mut values[..mid]) + merge_count(&mut values[mid..]);

    let mut merged = Vec::with_capacity(n);
    let (mut i, mut j) = (0, mid);
    while i < mid && j < n {
        if values[j] < values[i] {
            merged.push(values[j]);
            swaps += (mid - i) as u64;
            j += 1;
        } else {
            merged.push(values[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&values[i..mid]);
    merged.extend_from_slice(&values[j..n]);
    values.copy_from_slice(&merged);
    swaps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kendall_naive(x: &[f64], y: &[f64]) -> f64 {
        let n = x.len();
        let (mut c, mut d, mut tx, mut ty): (f64, f64, f64, f64) = (0.0, 0.0, 0.0, 0.0);
        for i in 0..n {
            for j in i + 1..n {
                let sx = (x[i] - x[j]).signum() * ((x[i] != x[j]) as i32 as f64);
                let sy = (y[i] - y[j]).signum() * ((y[i] != y[j]) as i32 as f64);
                if sx == 0.0 && sy == 0.0 {
                    continue;
                } else if sx == 0.0 {
                    tx += 1.0;
                } else if sy == 0.0 {
                    ty += 1.0;
                } else if sx == sy {
                    c += 1.0;
                } else {
                    d += 1.0;
                }
            }
        }
        (c - d) / ((c + d + tx) * (c + d + ty)).sqrt()
    }

    #[test]
    fn ranks_average_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
        assert_eq!(tie_groups(&[1.0, 1.0, 2.0, 3.0, 3.0, 3.0]), vec![2, 1, 3]);
    }

    #[test]
    fn pearson_perfect_line() {
        let (r, p) = pearson(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0]);
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(p, 0.0);
    }

    #[test]
    fn pearson_constant_input_is_undefined() {
        let (r, p) = pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]);
        assert!(r.is_nan() && p.is_nan());
    }

    #[test]
    fn spearman_is_rank_based() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 8.0, 27.0, 64.0, 125.0];
        let (rho, _) = spearman(&x, &y);
        assert!((rho - 1.0).abs() < 1e-12);
    }

    #[test]
    fn kendall_matches_pairwise_count_with_ties() {
        let x = [1.0, 2.0, 2.0, 3.0, 4.0, 4.0, 5.0, 6.0];
        let y = [2.0, 1.0, 3.0, 3.0, 5.0, 4.0, 4.0, 7.0];
        let (tau, p) = kendall_tau_b(&x, &y);
        assert!((tau - kendall_naive(&x, &y)).abs() < 1e-12, "tau = {tau}");
        assert!(p > 0.0 && p < 0.05);
    }

    #[test]
    fn kendall_reversed_order() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [5.0, 4.0, 3.0, 2.0, 1.0];
        let (tau, _) = kendall_tau_b(&x, &y);
        assert!((tau + 1.0).abs() < 1e-12);
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("kendall".parse::<CorrelationMethod>().unwrap(), CorrelationMethod::Kendall);
        assert!("cosine".parse::<CorrelationMethod>().is_err());
    }
}
