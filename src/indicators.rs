//! Momentum indicator used by the stage classifier

/// Least-squares slope of the trailing `lookback` values.
///
/// Returns `None` when fewer than `lookback` values exist or `lookback < 2`;
/// the classifier treats that as no momentum reading.
pub fn close_slope(values: &[f64], lookback: usize) -> Option<f64> {
    if lookback < 2 || values.len() < lookback {
        return None;
    }

    let window = &values[values.len() - lookback..];
    let n = lookback as f64;

    // x = 0..lookback, so the x-statistics have closed forms
    let x_mean = (n - 1.0) / 2.0;
    let y_mean: f64 = window.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut x_variance = 0.0;
    for (i, &y) in window.iter().enumerate() {
        let dx = i as f64 - x_mean;
        covariance += dx * (y - y_mean);
        x_variance += dx * dx;
    }

    if x_variance == 0.0 {
        return None;
    }

    Some(covariance / x_variance)
}
