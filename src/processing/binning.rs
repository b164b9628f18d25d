use serde::Serialize;

use crate::data::table::ObservationTable;
use crate::error::{Error, Result};
use crate::processing::statistics::{finite, mean, round_to, sample_std};

/// One non-empty bin of an equal-width cut.
///
/// The interval is `(lower, upper]`. Aggregates are rounded to two decimals;
/// `dependent_std` is absent for single-row bins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinRow {
    pub lower: f64,
    pub upper: f64,
    pub dependent_mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependent_std: Option<f64>,
    pub count: usize,
    pub driver_mean: f64,
}

/// `bins + 1` equal-width edges over `[min, max]`.
///
/// Bins are right-closed, so the lowest edge is pushed down by 0.1 % of the
/// range to let the minimum fall into the first bin. A constant input gets a
/// ±0.1 % band around its value (±0.001 around zero).
pub fn equal_width_edges(min: f64, max: f64, bins: usize) -> Vec<f64> {
    let (lo, hi) = if min == max {
        let pad = |v: f64| if v != 0.0 { 0.001 * v.abs() } else { 0.001 };
        (min - pad(min), max + pad(max))
    } else {
        (min, max)
    };

    let step = (hi - lo) / bins as f64;
    let mut edges: Vec<f64> = (0..=bins).map(|i| lo + step * i as f64).collect();
    edges[bins] = hi;
    if min != max {
        edges[0] -= (max - min) * 0.001;
    }
    edges
}

/// Index of the right-closed bin holding `x`.
fn bin_index(edges: &[f64], x: f64) -> usize {
    let first_ge = edges.partition_point(|&e| e < x);
    first_ge.saturating_sub(1).min(edges.len() - 2)
}

/// Cut `driver` into `bins` equal-width intervals and summarize `dependent`
/// per interval. Rows missing either value are dropped first; empty bins are
/// not reported.
pub fn binned_impact(
    table: &ObservationTable,
    driver: &str,
    dependent: &str,
    bins: usize,
) -> Result<Vec<BinRow>> {
    if bins == 0 {
        return Err(Error::InvalidArgument("bins must be at least 1".to_string()));
    }
    let x = table.numeric(driver)?;
    let y = table.numeric(dependent)?;

    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .collect();
    if pairs.is_empty() {
        return Ok(Vec::new());
    }

    let min = pairs.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max = pairs.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let edges = equal_width_edges(min, max, bins);

    let mut buckets: Vec<(Vec<f64>, Vec<f64>)> = vec![(Vec::new(), Vec::new()); bins];
    for (a, b) in pairs {
        let bucket = &mut buckets[bin_index(&edges, a)];
        bucket.0.push(a);
        bucket.1.push(b);
    }

    let rows = buckets
        .into_iter()
        .enumerate()
        .filter(|(_, (xs, _))| !xs.is_empty())
        .map(|(i, (xs, ys))| BinRow {
            lower: edges[i],
            upper: edges[i + 1],
            dependent_mean: round_to(mean(&ys), 2),
            dependent_std: finite(round_to(sample_std(&ys), 2)),
            count: ys.len(),
            driver_mean: round_to(mean(&xs), 2),
        })
        .collect();
    Ok(rows)
}
