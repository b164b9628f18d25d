//! Thin wrappers over `statrs` distributions.
//!
//! Each helper returns NaN when the distribution cannot be constructed
//! (non-positive degrees of freedom and the like) so callers can fold
//! degenerate inputs into their results instead of failing.

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

fn standard_normal() -> Option<Normal> {
    Normal::new(0.0, 1.0).ok()
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    match standard_normal() {
        Some(n) if !z.is_nan() => n.cdf(z),
        _ => f64::NAN,
    }
}

/// Standard normal upper tail, `P(Z > z)`.
pub fn normal_sf(z: f64) -> f64 {
    match standard_normal() {
        Some(n) if !z.is_nan() => n.sf(z),
        _ => f64::NAN,
    }
}

/// Standard normal quantile function.
pub fn normal_ppf(p: f64) -> f64 {
    match standard_normal() {
        Some(n) if p > 0.0 && p < 1.0 => n.inverse_cdf(p),
        _ => f64::NAN,
    }
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
pub fn t_two_sided(t: f64, df: f64) -> f64 {
    if t.is_nan() || !(df > 0.0) {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).min(1.0),
        Err(_) => f64::NAN,
    }
}

/// Upper tail of the F distribution.
pub fn f_sf(f: f64, df1: f64, df2: f64) -> f64 {
    if f.is_nan() || !(df1 > 0.0) || !(df2 > 0.0) {
        return f64::NAN;
    }
    if f.is_infinite() {
        return 0.0;
    }
    match FisherSnedecor::new(df1, df2) {
        Ok(dist) => dist.sf(f.max(0.0)),
        Err(_) => f64::NAN,
    }
}

/// Upper tail of the chi-squared distribution.
pub fn chi2_sf(x: f64, df: f64) -> f64 {
    if x.is_nan() || !(df > 0.0) {
        return f64::NAN;
    }
    if x.is_infinite() {
        return 0.0;
    }
    match ChiSquared::new(df) {
        Ok(dist) => dist.sf(x.max(0.0)),
        Err(_) => f64::NAN,
    }
}

/// Upper tail of the Kolmogorov distribution, `Q(λ) = 2 Σ (-1)^(k-1) e^(-2k²λ²)`.
pub fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda.is_nan() {
        return f64::NAN;
    }
    if lambda < 0.2 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=100 {
        let k = k as f64;
        let term = (-2.0 * k * k * lambda * lambda).exp();
        sum += sign * term;
        if term < 1e-12 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}
