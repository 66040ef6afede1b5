//! NaN-aware statistics for light-curve analysis
//!
//! Every reduction here ignores NaN entries, matching how flagged or
//! missing cadences appear in pixel data. Reductions over an input with
//! no finite-or-infinite values return `None`.

/// Copy the non-NaN values out of a slice.
fn valid_values(values: &[f64]) -> Vec<f64> {
    values.iter().filter(|v| !v.is_nan()).copied().collect()
}

/// Calculate median of a slice of f64 values
///
/// This function computes the median while filtering out NaN values but including
/// infinite values (±inf). For even-length data, returns the average of the two
/// middle values.
///
/// # Returns
///
/// * `Some(median)` - The median value
/// * `None` - If no valid values remain after filtering NaN
pub fn median(values: &[f64]) -> Option<f64> {
    let mut valid = valid_values(values);
    if valid.is_empty() {
        return None;
    }

    valid.sort_by(|a, b| a.total_cmp(b));

    let mid = valid.len() / 2;
    let median_value = if valid.len() % 2 == 0 {
        (valid[mid - 1] + valid[mid]) / 2.0
    } else {
        valid[mid]
    };

    Some(median_value)
}

/// Arithmetic mean ignoring NaN values
pub fn mean(values: &[f64]) -> Option<f64> {
    let valid = valid_values(values);
    if valid.is_empty() {
        return None;
    }
    Some(valid.iter().sum::<f64>() / valid.len() as f64)
}

/// Population standard deviation (divides by N) ignoring NaN values
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let valid = valid_values(values);
    let mu = mean(&valid)?;
    let variance = valid.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / valid.len() as f64;
    Some(variance.sqrt())
}

/// Median of absolute deviations from the median, ignoring NaN values
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - center).abs())
        .collect();
    median(&deviations)
}

/// Iterative sigma clipping around the median.
///
/// On each pass the median and population standard deviation of the
/// still-unmasked values are computed, and values further than
/// `sigma * std` from the median are masked. Iteration stops once a pass
/// masks nothing new or after `max_iters` passes. NaN values are always
/// masked.
///
/// # Arguments
/// * `values` - Data to clip
/// * `sigma` - Clipping threshold in standard deviations
/// * `max_iters` - Upper bound on clipping passes
///
/// # Returns
/// A mask the same length as `values` where `true` marks a clipped value.
pub fn sigma_clip_mask(values: &[f64], sigma: f64, max_iters: usize) -> Vec<bool> {
    let mut mask: Vec<bool> = values.iter().map(|v| v.is_nan()).collect();

    for _ in 0..max_iters {
        let kept: Vec<f64> = values
            .iter()
            .zip(&mask)
            .filter(|(_, masked)| !**masked)
            .map(|(v, _)| *v)
            .collect();

        let (center, spread) = match (median(&kept), std_dev(&kept)) {
            (Some(center), Some(spread)) => (center, spread),
            _ => break,
        };

        let mut newly_masked = 0;
        for (value, masked) in values.iter().zip(mask.iter_mut()) {
            if !*masked && (value - center).abs() > sigma * spread {
                *masked = true;
                newly_masked += 1;
            }
        }

        if newly_masked == 0 {
            break;
        }
    }

    mask
}

/// Running mean over a sliding window.
///
/// Returns `values.len() - window + 1` means, or an empty vector when the
/// window is zero or longer than the data.
pub fn running_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || window > values.len() {
        return Vec::new();
    }

    let mut cumsum = Vec::with_capacity(values.len() + 1);
    cumsum.push(0.0);
    for value in values {
        let last = cumsum[cumsum.len() - 1];
        cumsum.push(last + value);
    }

    (0..=values.len() - window)
        .map(|i| (cumsum[i + window] - cumsum[i]) / window as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_median_ignores_nan() {
        assert_eq!(median(&[f64::NAN, 5.0, 1.0, f64::NAN, 3.0]), Some(3.0));
        assert_eq!(median(&[f64::NAN, f64::NAN]), None);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_median_keeps_infinity() {
        assert_eq!(median(&[1.0, f64::INFINITY, 2.0]), Some(2.0));
    }

    #[test]
    fn test_mean_and_std() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&data).unwrap(), 5.0);
        assert_relative_eq!(std_dev(&data).unwrap(), 2.0);
        assert_eq!(std_dev(&[f64::NAN]), None);
    }

    #[test]
    fn test_median_absolute_deviation() {
        let data = [1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0];
        assert_relative_eq!(median_absolute_deviation(&data).unwrap(), 1.0);
    }

    #[test]
    fn test_sigma_clip_removes_outlier() {
        let mut data: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37).sin()).collect();
        data[42] = 50.0;
        data[7] = f64::NAN;

        let mask = sigma_clip_mask(&data, 5.0, 5);

        assert!(mask[42], "Spike should be clipped");
        assert!(mask[7], "NaN should be masked");
        assert_eq!(mask.iter().filter(|&&m| m).count(), 2);
    }

    #[test]
    fn test_sigma_clip_constant_data_keeps_everything() {
        let data = vec![3.0; 20];
        let mask = sigma_clip_mask(&data, 3.0, 5);
        assert!(mask.iter().all(|&m| !m));
    }

    #[test]
    fn test_running_mean() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(running_mean(&data, 2), vec![1.5, 2.5, 3.5, 4.5]);
        assert_eq!(running_mean(&data, 5), vec![3.0]);
        assert!(running_mean(&data, 6).is_empty());
        assert!(running_mean(&data, 0).is_empty());
    }
}
