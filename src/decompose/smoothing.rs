//! Small smoothing filters shared by the decomposition and reshaping stages.

use crate::error::ComputationWarning;

/// Centered 3-point moving average; the end points are kept.
pub fn smooth3(values: &[f64]) -> Vec<f64> {
    if values.len() < 3 {
        return values.to_vec();
    }
    let mut out = values.to_vec();
    for i in 1..values.len() - 1 {
        out[i] = (values[i - 1] + values[i] + values[i + 1]) / 3.0;
    }
    out
}

/// Centered moving average over a periodic series (indices wrap).
pub fn circular_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 || window <= 1 {
        return values.to_vec();
    }
    let half = (window.min(n) / 2) as isize;
    (0..n as isize)
        .map(|i| {
            let sum: f64 = (-half..=half)
                .map(|k| values[(i + k).rem_euclid(n as isize) as usize])
                .sum();
            sum / (2 * half + 1) as f64
        })
        .collect()
}

/// Gaussian kernel smoothing over a periodic series (indices wrap).
///
/// # Errors
///
/// Returns a reason when `sigma` is not a positive finite number or the
/// kernel (radius `3σ`) would wrap onto itself.
pub fn circular_gaussian(values: &[f64], sigma: f64) -> Result<Vec<f64>, String> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(format!("invalid sigma {sigma}"));
    }
    let n = values.len();
    let radius = (3.0 * sigma).ceil() as usize;
    if n == 0 || 2 * radius + 1 > n {
        return Err(format!("kernel of radius {radius} exceeds pattern length {n}"));
    }
    let kernel: Vec<f64> = (0..=2 * radius)
        .map(|k| {
            let d = k as f64 - radius as f64;
            (-0.5 * (d / sigma).powi(2)).exp()
        })
        .collect();
    let norm: f64 = kernel.iter().sum();
    let r = radius as isize;
    Ok((0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * values[(i + k as isize - r).rem_euclid(n as isize) as usize])
                .sum::<f64>()
                / norm
        })
        .collect())
}

/// Gaussian smoothing of a seasonal cycle, falling back to a moving average
/// of width `2σ + 1`.
pub fn smooth_cycle(pattern: &[f64], sigma: f64) -> (Vec<f64>, Option<ComputationWarning>) {
    match circular_gaussian(pattern, sigma) {
        Ok(smoothed) => (smoothed, None),
        Err(reason) => {
            let window = (2.0 * sigma.max(0.0)).round() as usize + 1;
            (
                circular_moving_average(pattern, window),
                Some(ComputationWarning::SmoothingFallback { reason }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smooth3_keeps_endpoints() {
        assert_eq!(smooth3(&[3.0, 0.0, 3.0, 0.0]), vec![3.0, 2.0, 1.0, 0.0]);
        assert_eq!(smooth3(&[1.0, 2.0]), vec![1.0, 2.0]);
    }

    #[test]
    fn gaussian_preserves_constant_and_mean() {
        let flat = vec![4.0; 48];
        let smoothed = circular_gaussian(&flat, 2.0).unwrap();
        assert!(smoothed.iter().all(|v| (v - 4.0).abs() < 1e-12));

        let wave: Vec<f64> = (0..48).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let smoothed = circular_gaussian(&wave, 2.0).unwrap();
        let mean: f64 = smoothed.iter().sum::<f64>() / 48.0;
        assert!(mean.abs() < 1e-12);
        assert!(smoothed.iter().all(|v| v.abs() < 0.1));
    }

    #[test]
    fn short_cycles_fall_back_to_moving_average() {
        let pattern = [1.0, 2.0, 3.0, 4.0, 5.0];
        let (smoothed, warning) = smooth_cycle(&pattern, 3.0);
        assert_eq!(smoothed.len(), 5);
        assert!(matches!(warning, Some(ComputationWarning::SmoothingFallback { .. })));
        assert!(circular_gaussian(&pattern, f64::NAN).is_err());
    }
}
