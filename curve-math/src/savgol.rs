//! Savitzky-Golay smoothing filter
//!
//! Each output sample is the value, at that sample, of a polynomial fitted
//! by least squares to a window of neighbouring samples. Near the ends of
//! the series the window is pinned to the first or last `window` samples
//! and the fitted polynomial is evaluated off-centre, so the output has the
//! same length as the input with no padding artefacts.

use nalgebra::DMatrix;
use thiserror::Error;

use crate::lstsq::{pseudo_inverse, FitError};

/// Errors from invalid Savitzky-Golay parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SavgolError {
    #[error("window length must be a positive odd integer, got {0}")]
    InvalidWindow(usize),

    #[error("polynomial order {polyorder} must be less than window length {window}")]
    PolyorderTooLarge { polyorder: usize, window: usize },

    #[error("window length {window} exceeds data length {len}")]
    WindowTooLong { window: usize, len: usize },

    #[error("failed to build filter coefficients: {0}")]
    Coefficients(#[from] FitError),
}

/// Weights that evaluate the fitted polynomial at offset `x` from the window centre.
fn evaluation_weights(pinv: &DMatrix<f64>, x: f64) -> Vec<f64> {
    let (order_plus_one, window) = pinv.shape();
    (0..window)
        .map(|j| {
            (0..order_plus_one)
                .map(|k| pinv[(k, j)] * x.powi(k as i32))
                .sum()
        })
        .collect()
}

fn apply(weights: &[f64], window: &[f64]) -> f64 {
    weights.iter().zip(window).map(|(w, v)| w * v).sum()
}

/// Smooth `data` with a Savitzky-Golay filter.
///
/// # Arguments
/// * `data` - Evenly sampled series to smooth
/// * `window` - Window length in samples (odd)
/// * `polyorder` - Order of the fitted polynomial, less than `window`
///
/// # Returns
/// The smoothed series, same length as `data`.
pub fn savgol_filter(data: &[f64], window: usize, polyorder: usize) -> Result<Vec<f64>, SavgolError> {
    if window == 0 || window % 2 == 0 {
        return Err(SavgolError::InvalidWindow(window));
    }
    if polyorder >= window {
        return Err(SavgolError::PolyorderTooLarge { polyorder, window });
    }
    if window > data.len() {
        return Err(SavgolError::WindowTooLong {
            window,
            len: data.len(),
        });
    }

    let half = window / 2;
    let vandermonde = DMatrix::from_fn(window, polyorder + 1, |j, k| {
        (j as f64 - half as f64).powi(k as i32)
    });
    let pinv = pseudo_inverse(&vandermonde)?;

    let n = data.len();
    let centre_weights = evaluation_weights(&pinv, 0.0);
    let mut smoothed = Vec::with_capacity(n);

    for i in 0..n {
        let value = if i < half {
            let weights = evaluation_weights(&pinv, i as f64 - half as f64);
            apply(&weights, &data[..window])
        } else if i + half >= n {
            let start = n - window;
            let weights = evaluation_weights(&pinv, (i - start) as f64 - half as f64);
            apply(&weights, &data[start..])
        } else {
            apply(&centre_weights, &data[i - half..=i + half])
        };
        smoothed.push(value);
    }

    Ok(smoothed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_polynomial_is_preserved() {
        // A quadratic is reproduced exactly by a quadratic filter, edges included
        let data: Vec<f64> = (0..30)
            .map(|i| {
                let x = i as f64;
                0.5 * x * x - 3.0 * x + 7.0
            })
            .collect();

        let smoothed = savgol_filter(&data, 7, 2).unwrap();

        for (s, d) in smoothed.iter().zip(&data) {
            assert_relative_eq!(*s, *d, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_constant_series() {
        let data = vec![4.2; 15];
        let smoothed = savgol_filter(&data, 5, 1).unwrap();
        for s in smoothed {
            assert_relative_eq!(s, 4.2, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_moving_average_when_order_zero() {
        let data = [1.0, 2.0, 3.0, 10.0, 5.0, 6.0, 7.0];
        let smoothed = savgol_filter(&data, 3, 0).unwrap();
        assert_relative_eq!(smoothed[3], 6.0, epsilon = 1e-12);
        // Order-zero edge fits are the window mean
        assert_relative_eq!(smoothed[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_noise_is_reduced() {
        let data: Vec<f64> = (0..200)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let smoothed = savgol_filter(&data, 21, 2).unwrap();
        let interior_max = smoothed[20..180]
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        assert!(interior_max < 0.2, "alternating noise should be attenuated");
    }

    #[test]
    fn test_invalid_parameters() {
        let data = vec![1.0; 10];
        assert_eq!(
            savgol_filter(&data, 4, 2),
            Err(SavgolError::InvalidWindow(4))
        );
        assert_eq!(
            savgol_filter(&data, 5, 5),
            Err(SavgolError::PolyorderTooLarge {
                polyorder: 5,
                window: 5
            })
        );
        assert_eq!(
            savgol_filter(&data, 11, 2),
            Err(SavgolError::WindowTooLong { window: 11, len: 10 })
        );
    }
}
