//! Small numerical toolkit used by the analyses.
//!
//! Every function here ignores non-finite values (`NaN` marks a missing
//! acquisition in the InSAR tables), matching how the tabular tooling the
//! workflow was designed around treats missing data.

/// Result of an ordinary least squares fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_value: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

fn finite(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| v.is_finite())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = finite(values).fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Sample standard deviation (one delta degree of freedom).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let count = finite(values).count();
    if count < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq: f64 = finite(values).map(|v| (v - m).powi(2)).sum();
    Some((sum_sq / (count - 1) as f64).sqrt())
}

/// Quantile with linear interpolation between the closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = finite(values).collect();
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Tukey fences: `(q1 - k*iqr, q3 + k*iqr)`.
pub fn iqr_bounds(values: &[f64], k: f64) -> Option<(f64, f64)> {
    let q1 = quantile(values, 0.25)?;
    let q3 = quantile(values, 0.75)?;
    let iqr = q3 - q1;
    Some((q1 - k * iqr, q3 + k * iqr))
}

pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let r_value = if syy == 0.0 {
        0.0
    } else {
        sxy / (sxx * syy).sqrt()
    };
    Some(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
        r_value,
    })
}

/// Removes the least squares line fitted over sample positions.
pub fn detrend(values: &[f64]) -> Vec<f64> {
    let x: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    match linear_regression(&x, values) {
        Some(fit) => values
            .iter()
            .zip(x.iter())
            .map(|(v, xi)| v - fit.predict(*xi))
            .collect(),
        None => values.to_vec(),
    }
}

/// Peak to peak range, halved when `half` is set.
pub fn amplitude(values: &[f64], half: bool) -> Option<f64> {
    let (min, max) = finite(values).fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })?;
    let range = max - min;
    Some(if half { range / 2.0 } else { range })
}

/// Per-column mean across the selected rows, `NaN` where a column has no data.
pub fn column_means<'a, I>(rows: I, columns: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut sums = vec![0.0; columns];
    let mut counts = vec![0usize; columns];
    for row in rows {
        for (i, v) in row.iter().take(columns).enumerate() {
            if v.is_finite() {
                sums[i] += v;
                counts[i] += 1;
            }
        }
    }
    sums.into_iter()
        .zip(counts)
        .map(|(s, c)| if c == 0 { f64::NAN } else { s / c as f64 })
        .collect()
}
