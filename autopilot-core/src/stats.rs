//! Small statistics helpers shared by the miners and the noise filter.

/// Arithmetic mean. Returns 0.0 for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance. Returns 0.0 for an empty slice.
#[must_use]
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Lower bound of the Wilson 95% interval for a binomial proportion.
///
/// A perfect proportion (p = 1) is reported as `max(0, 1 - 2/n)` so that
/// small samples cannot claim certainty. Used wherever a raw proportion
/// would overstate confidence on few observations.
#[must_use]
pub fn wilson_lower_bound(successes: usize, trials: usize) -> f64 {
    if trials == 0 {
        return 0.0;
    }
    let n = trials as f64;
    let p = successes as f64 / n;

    if p >= 1.0 {
        return (1.0 - 2.0 / n).max(0.0);
    }
    if p <= 0.0 {
        return 0.0;
    }

    let z = 1.96_f64;
    let denominator = 1.0 + z * z / n;
    let center = (p + z * z / (2.0 * n)) / denominator;
    let sqrt_term = (p * (1.0 - p) / n + z * z / (4.0 * n * n)).max(0.0);
    let margin = (z / denominator) * sqrt_term.sqrt();

    (center - margin).clamp(0.0, 1.0)
}
