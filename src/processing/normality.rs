//! Normality test statistics.
//!
//! Shapiro-Wilk follows Royston's AS R94 approximation for the weights and
//! the p-value, the KS test compares against the standard normal, and the
//! Anderson-Darling statistic is computed for a normal fitted to the sample.

use crate::processing::distributions::{kolmogorov_sf, normal_cdf, normal_ppf, normal_sf};
use crate::processing::statistics::{mean, sample_std};

/// Anderson-Darling significance levels (%) reported with the critical values.
pub const ANDERSON_SIGNIFICANCE: [f64; 5] = [15.0, 10.0, 5.0, 2.5, 1.0];

const ANDERSON_BASE: [f64; 5] = [0.576, 0.656, 0.787, 0.918, 1.092];

fn poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Shapiro-Wilk W and its p-value. `sorted` must be ascending with at least
/// three finite values.
pub fn shapiro_wilk(sorted: &[f64]) -> (f64, f64) {
    let n = sorted.len();
    debug_assert!(n >= 3);

    let range = sorted[n - 1] - sorted[0];
    if range <= 0.0 {
        // constant input: W is defined as 1 with no evidence against normality
        return (1.0, 1.0);
    }

    let half = n / 2;
    let nf = n as f64;
    let mut a = vec![0.0; half];

    if n == 3 {
        a[0] = std::f64::consts::FRAC_1_SQRT_2;
    } else {
        const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
        const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];

        let m: Vec<f64> = (1..=half)
            .map(|i| normal_ppf((i as f64 - 0.375) / (nf + 0.25)))
            .collect();
        let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
        let ssumm2 = summ2.sqrt();
        let rsn = 1.0 / nf.sqrt();

        let a1 = poly(&C1, rsn) - m[0] / ssumm2;
        let (first, fac) = if n > 5 {
            let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
            let fac = ((summ2 - 2.0 * m[0].powi(2) - 2.0 * m[1].powi(2))
                / (1.0 - 2.0 * a1.powi(2) - 2.0 * a2.powi(2)))
            .sqrt();
            a[1] = a2;
            (2, fac)
        } else {
            let fac = ((summ2 - 2.0 * m[0].powi(2)) / (1.0 - 2.0 * a1.powi(2))).sqrt();
            (1, fac)
        };
        a[0] = a1;
        for i in first..half {
            a[i] = -m[i] / fac;
        }
    }

    let mu = mean(sorted);
    let ssq: f64 = sorted.iter().map(|x| (x - mu).powi(2)).sum();
    let numerator: f64 = (0..half)
        .map(|i| a[i] * (sorted[n - 1 - i] - sorted[i]))
        .sum();
    let w = (numerator * numerator / ssq).clamp(0.0, 1.0);

    (w, shapiro_p_value(w, n))
}

fn shapiro_p_value(w: f64, n: usize) -> f64 {
    let nf = n as f64;
    if n == 3 {
        let pi6 = 6.0 / std::f64::consts::PI;
        let stqr = std::f64::consts::FRAC_PI_3;
        return (pi6 * (w.sqrt().asin() - stqr)).max(0.0);
    }

    let w1 = (1.0 - w).ln();
    if n <= 11 {
        let gamma = poly(&[-2.273, 0.459], nf);
        if w1 >= gamma {
            return 1e-99;
        }
        let y = -(gamma - w1).ln();
        let m = poly(&[0.5440, -0.39978, 0.025054, -6.714e-4], nf);
        let s = poly(&[1.3822, -0.77857, 0.062767, -0.0020322], nf).exp();
        normal_sf((y - m) / s)
    } else {
        let xx = nf.ln();
        let m = poly(&[-1.5861, -0.31082, -0.083751, 0.0038915], xx);
        let s = poly(&[-0.4803, -0.082676, 0.0030302], xx).exp();
        normal_sf((w1 - m) / s)
    }
}

/// One-sample Kolmogorov-Smirnov test against N(0, 1).
///
/// The p-value uses the asymptotic Kolmogorov distribution with Stephens'
/// small-sample correction `(√n + 0.12 + 0.11/√n)·D`.
pub fn ks_standard_normal(sorted: &[f64]) -> (f64, f64) {
    let n = sorted.len();
    let nf = n as f64;
    let mut d: f64 = 0.0;
    for (i, &x) in sorted.iter().enumerate() {
        let cdf = normal_cdf(x);
        let d_plus = (i + 1) as f64 / nf - cdf;
        let d_minus = cdf - i as f64 / nf;
        d = d.max(d_plus).max(d_minus);
    }
    let en = nf.sqrt();
    let p = kolmogorov_sf((en + 0.12 + 0.11 / en) * d);
    (d, p)
}

/// Anderson-Darling A² for a normal fitted to the sample, with the
/// critical values at [`ANDERSON_SIGNIFICANCE`].
pub fn anderson_normal(sorted: &[f64]) -> (f64, [f64; 5]) {
    let n = sorted.len();
    let nf = n as f64;
    let mu = mean(sorted);
    let sd = sample_std(sorted);

    let factor = 1.0 + 4.0 / nf - 25.0 / (nf * nf);
    let critical = ANDERSON_BASE.map(|v| (v / factor * 1000.0).round() / 1000.0);

    if !(sd > 0.0) {
        return (f64::NAN, critical);
    }

    let z: Vec<f64> = sorted.iter().map(|x| (x - mu) / sd).collect();
    let s: f64 = (0..n)
        .map(|i| {
            let k = (2 * i + 1) as f64;
            // log CDF of z[i] plus log survival of z[n-1-i]
            k * (normal_cdf(z[i]).ln() + normal_sf(z[n - 1 - i]).ln())
        })
        .sum();
    let a2 = -nf - s / nf;
    (a2, critical)
}
