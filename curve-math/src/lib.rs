//! curve-math - Numeric kernels for light-curve reduction
//!
//! This crate provides the numerical building blocks used when reducing
//! pixel time series into light curves and removing systematic trends:
//!
//! - **Least squares** - Direct SVD-based linear least squares and pseudo-inverse
//! - **Statistics** - NaN-aware median, mean, standard deviation, sigma clipping
//! - **Savitzky-Golay** - Polynomial smoothing filter with interpolated edges
//!
//! # Example
//!
//! ```
//! use curve_math::{least_squares, median};
//! use nalgebra::{DMatrix, DVector};
//!
//! // Fit y = 2 + 3x
//! let design = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
//! let target = DVector::from_vec(vec![2.0, 5.0, 8.0]);
//! let fit = least_squares(&design, &target).unwrap();
//! assert!((fit.coefficients[1] - 3.0).abs() < 1e-10);
//!
//! assert_eq!(median(&[3.0, f64::NAN, 1.0, 2.0]).unwrap(), 2.0);
//! ```

pub mod lstsq;
pub mod savgol;
pub mod stats;

// Re-export commonly used types
pub use lstsq::{least_squares, pseudo_inverse, FitError, LeastSquaresFit};
pub use savgol::{savgol_filter, SavgolError};
pub use stats::{
    mean, median, median_absolute_deviation, running_mean, sigma_clip_mask, std_dev,
};
