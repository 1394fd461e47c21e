//! Descriptive statistics and integration primitives.
//!
//! Note: inputs are plain slices; non-finite values are the caller's concern
//! unless a function says otherwise.

/// |x| below this is treated as zero for ratio denominators.
pub const NEAR_ZERO: f64 = 1e-9;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1). A single value has SD 0.
pub fn sample_sd(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let n = values.len();
    if n < 2 {
        return Some(0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (n - 1) as f64).sqrt())
}

pub fn sem(values: &[f64]) -> Option<f64> {
    let sd = sample_sd(values)?;
    Some(sd / (values.len() as f64).sqrt())
}

/// Coefficient of variation in percent; `None` when the mean is ~0.
pub fn cv_percent(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m.abs() < NEAR_ZERO {
        return None;
    }
    let sd = sample_sd(values)?;
    Some(sd / m.abs() * 100.0)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| match acc {
        Some(a) if a <= v => Some(a),
        _ => Some(v),
    })
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| match acc {
        Some(a) if a >= v => Some(a),
        _ => Some(v),
    })
}

/// `a / b * 100`, `None` if either side is missing or `b` is ~0.
pub fn percent_of(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    let (a, b) = (a?, b?);
    if b.abs() < NEAR_ZERO || !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some(a / b * 100.0)
}

/// Trapezoidal integral of `y` over `x`.
///
/// Pairs with a non-finite coordinate are dropped, points are sorted by `x`
/// when it is not strictly increasing, and fewer than two usable points
/// integrate to 0.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    let mut pts: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    if pts.len() < 2 {
        return 0.0;
    }
    if !pts.windows(2).all(|w| w[1].0 > w[0].0) {
        pts.sort_by(|a, b| a.0.total_cmp(&b.0));
    }
    pts.windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sd_and_cv_use_sample_denominator() {
        let v = [1.0, 1.2];
        let sd = sample_sd(&v).unwrap();
        assert!((sd - 0.141421356).abs() < 1e-6);
        let cv = cv_percent(&v).unwrap();
        assert!((cv - 12.856).abs() < 1e-3);
    }

    #[test]
    fn single_value_has_zero_spread() {
        assert_eq!(sample_sd(&[3.0]), Some(0.0));
        assert_eq!(sem(&[3.0]), Some(0.0));
        assert_eq!(cv_percent(&[3.0]), Some(0.0));
    }

    #[test]
    fn cv_undefined_for_zero_mean() {
        assert_eq!(cv_percent(&[-1.0, 1.0]), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn trapezoid_matches_reference() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [0.0, 1.0, 3.0, 2.0, 4.0, 3.0];
        assert!((trapezoid(&x, &y) - 11.5).abs() < 1e-12);
    }

    #[test]
    fn trapezoid_edge_cases() {
        assert_eq!(trapezoid(&[], &[]), 0.0);
        assert_eq!(trapezoid(&[10.0], &[5.0]), 0.0);
        let with_nan = trapezoid(&[0.0, 1.0, 2.0, 3.0], &[1.0, f64::NAN, 3.0, 4.0]);
        assert!((with_nan - 7.5).abs() < 1e-12);
        let unsorted = trapezoid(&[0.0, 2.0, 1.0, 3.0], &[1.0, 2.0, 3.0, 4.0]);
        assert!((unsorted - 7.5).abs() < 1e-12);
    }

    #[test]
    fn percent_guards_zero_denominator() {
        assert_eq!(percent_of(Some(1.0), Some(0.0)), None);
        assert_eq!(percent_of(None, Some(2.0)), None);
        assert_eq!(percent_of(Some(1.0), Some(2.0)), Some(50.0));
    }
}
