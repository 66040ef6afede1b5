//! Aperture photometry over pixel time series.
//!
//! An aperture is a boolean mask over one frame. [`ApertureAggregator`]
//! reduces a flux cube to a light curve by summing the selected pixels in
//! every cadence, combining their uncertainties in quadrature. The mask
//! builders in this module produce apertures from geometry or from a
//! reference image.

use std::collections::VecDeque;

use ndarray::{Array1, Array2, ArrayView2, ArrayView3};

use crate::error::{PhotometryError, Result};
use crate::source::FluxFloat;

/// Precomputed pixel selection for summing a flux cube.
#[derive(Debug, Clone)]
pub struct ApertureAggregator {
    frame_shape: (usize, usize),
    pixels: Vec<(usize, usize)>,
}

impl ApertureAggregator {
    /// Build an aggregator for `aperture`.
    ///
    /// Fails with [`PhotometryError::EmptyAperture`] if no pixel is selected.
    pub fn new(aperture: ArrayView2<bool>) -> Result<Self> {
        let pixels: Vec<(usize, usize)> = aperture
            .indexed_iter()
            .filter(|(_, selected)| **selected)
            .map(|(index, _)| index)
            .collect();

        if pixels.is_empty() {
            return Err(PhotometryError::EmptyAperture);
        }

        Ok(Self {
            frame_shape: aperture.dim(),
            pixels,
        })
    }

    /// Number of selected pixels.
    pub fn n_pixels(&self) -> usize {
        self.pixels.len()
    }

    /// Sum flux and combine errors in quadrature for every cadence.
    ///
    /// The result keeps the cube's precision: `f32` cubes produce `f32`
    /// sequences.
    pub fn aggregate<T: FluxFloat>(
        &self,
        flux: ArrayView3<T>,
        flux_err: ArrayView3<T>,
    ) -> Result<(Array1<T>, Array1<T>)> {
        if flux.dim() != flux_err.dim() {
            return Err(PhotometryError::DataShape(format!(
                "flux cube {:?} and error cube {:?} differ",
                flux.dim(),
                flux_err.dim()
            )));
        }
        let (n_cadences, rows, cols) = flux.dim();
        if (rows, cols) != self.frame_shape {
            return Err(PhotometryError::DataShape(format!(
                "aperture {:?} does not match frame ({rows}, {cols})",
                self.frame_shape
            )));
        }

        let mut summed_flux = Array1::<T>::zeros(n_cadences);
        let mut summed_err = Array1::<T>::zeros(n_cadences);

        for cadence in 0..n_cadences {
            let mut total = T::zero();
            let mut variance = T::zero();
            for &(row, col) in &self.pixels {
                total = total + flux[[cadence, row, col]];
                let sigma = flux_err[[cadence, row, col]];
                variance = variance + sigma * sigma;
            }
            summed_flux[cadence] = total;
            summed_err[cadence] = variance.sqrt();
        }

        Ok((summed_flux, summed_err))
    }
}

/// Sum `flux` over `aperture` and propagate `flux_err` in quadrature.
pub fn aggregate<T: FluxFloat>(
    flux: ArrayView3<T>,
    flux_err: ArrayView3<T>,
    aperture: ArrayView2<bool>,
) -> Result<(Array1<T>, Array1<T>)> {
    ApertureAggregator::new(aperture)?.aggregate(flux, flux_err)
}

/// Build a circular aperture.
///
/// A pixel is included if its centre lies within `radius` of `center`
/// (row, column), which may be subpixel.
pub fn circular_aperture(shape: (usize, usize), center: (f64, f64), radius: f64) -> Array2<bool> {
    let (row_center, col_center) = center;
    Array2::from_shape_fn(shape, |(row, col)| {
        let dy = row as f64 - row_center;
        let dx = col as f64 - col_center;
        (dx * dx + dy * dy).sqrt() <= radius
    })
}

/// Build an aperture from pixels significantly brighter than the image median.
///
/// Pixels above `median + threshold_sigma * 1.4826 * MAD` are candidates;
/// only the 4-connected region containing the brightest candidate is kept.
/// Non-finite pixels are never selected. Returns an all-false mask if no
/// pixel passes.
pub fn threshold_aperture(image: ArrayView2<f64>, threshold_sigma: f64) -> Array2<bool> {
    let finite: Vec<f64> = image.iter().copied().filter(|v| v.is_finite()).collect();
    let mut mask = Array2::from_elem(image.dim(), false);

    let (Some(center), Some(mad)) = (
        curve_math::median(&finite),
        curve_math::median_absolute_deviation(&finite),
    ) else {
        return mask;
    };
    let limit = center + threshold_sigma * 1.4826 * mad;

    let candidates = image.mapv(|v| v.is_finite() && v > limit);
    let brightest = image
        .indexed_iter()
        .filter(|(index, _)| candidates[*index])
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(index, _)| index);

    let Some(seed) = brightest else {
        return mask;
    };

    let (rows, cols) = image.dim();
    let mut queue = VecDeque::from([seed]);
    mask[seed] = true;

    while let Some((row, col)) = queue.pop_front() {
        let neighbours = [
            (row.wrapping_sub(1), col),
            (row + 1, col),
            (row, col.wrapping_sub(1)),
            (row, col + 1),
        ];
        for (r, c) in neighbours {
            if r < rows && c < cols && candidates[[r, c]] && !mask[[r, c]] {
                mask[[r, c]] = true;
                queue.push_back((r, c));
            }
        }
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array3};

    #[test]
    fn test_single_pixel_aperture_is_identity() {
        let flux = Array3::from_shape_fn((4, 3, 3), |(t, r, c)| (t * 9 + r * 3 + c) as f32 * 0.5);
        let flux_err = Array3::from_shape_fn((4, 3, 3), |(t, r, c)| 0.1 + (t + r + c) as f32);
        let mut aperture = Array2::from_elem((3, 3), false);
        aperture[[1, 2]] = true;

        let (summed, err) = aggregate(flux.view(), flux_err.view(), aperture.view()).unwrap();

        for t in 0..4 {
            assert_eq!(summed[t], flux[[t, 1, 2]]);
            assert_eq!(err[t], flux_err[[t, 1, 2]]);
        }
    }

    #[test]
    fn test_equal_errors_combine_in_quadrature() {
        let n_pixels = 6;
        let flux = Array3::<f64>::ones((5, 2, 3));
        let flux_err = Array3::<f64>::from_elem((5, 2, 3), 0.3);
        let aperture = Array2::from_elem((2, 3), true);

        let (summed, err) = aggregate(flux.view(), flux_err.view(), aperture.view()).unwrap();

        for t in 0..5 {
            assert_relative_eq!(summed[t], n_pixels as f64, epsilon = 1e-12);
            assert_relative_eq!(err[t], 0.3 * (n_pixels as f64).sqrt(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_errors_are_not_simply_summed() {
        let flux = Array3::<f64>::zeros((1, 1, 2));
        let flux_err = Array3::from_shape_vec((1, 1, 2), vec![3.0, 4.0]).unwrap();
        let aperture = array![[true, true]];

        let (_, err) = aggregate(flux.view(), flux_err.view(), aperture.view()).unwrap();

        assert_relative_eq!(err[0], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_f32_precision_preserved() {
        let flux = Array3::<f32>::from_elem((2, 2, 2), 0.1);
        let flux_err = Array3::<f32>::from_elem((2, 2, 2), 0.2);
        let aperture = Array2::from_elem((2, 2), true);

        let (summed, err): (Array1<f32>, Array1<f32>) =
            aggregate(flux.view(), flux_err.view(), aperture.view()).unwrap();

        let expected_flux = 0.1f32 + 0.1 + 0.1 + 0.1;
        let expected_err = (0.2f32 * 0.2 + 0.2 * 0.2 + 0.2 * 0.2 + 0.2 * 0.2).sqrt();
        assert_eq!(summed[0], expected_flux);
        assert_eq!(err[1], expected_err);
    }

    #[test]
    fn test_empty_aperture_rejected() {
        let aperture = Array2::from_elem((3, 3), false);
        assert!(matches!(
            ApertureAggregator::new(aperture.view()),
            Err(PhotometryError::EmptyAperture)
        ));
    }

    #[test]
    fn test_shape_mismatches_rejected() {
        let aggregator = ApertureAggregator::new(Array2::from_elem((2, 2), true).view()).unwrap();
        let flux = Array3::<f64>::zeros((3, 2, 2));
        let wrong_err = Array3::<f64>::zeros((3, 2, 3));
        let wrong_frame = Array3::<f64>::zeros((3, 3, 3));

        assert!(matches!(
            aggregator.aggregate(flux.view(), wrong_err.view()),
            Err(PhotometryError::DataShape(_))
        ));
        assert!(matches!(
            aggregator.aggregate(wrong_frame.view(), wrong_frame.view()),
            Err(PhotometryError::DataShape(_))
        ));
    }

    #[test]
    fn test_circular_aperture() {
        let mask = circular_aperture((5, 5), (2.0, 2.0), 1.0);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 5);
        assert!(mask[[2, 2]] && mask[[1, 2]] && mask[[2, 3]]);
        assert!(!mask[[1, 1]]);

        let big = circular_aperture((30, 30), (15.0, 15.0), 3.0);
        let expected = (std::f64::consts::PI * 9.0) as usize;
        let count = big.iter().filter(|&&m| m).count();
        assert!(count >= expected - 5 && count <= expected + 5);
    }

    #[test]
    fn test_threshold_aperture_keeps_brightest_region() {
        let mut image = Array2::<f64>::from_elem((7, 7), 10.0);
        image[[1, 1]] = 11.0;
        image[[4, 4]] = 500.0;
        image[[4, 5]] = 300.0;
        image[[0, 6]] = 200.0; // bright but disconnected
        image[[6, 0]] = f64::NAN;

        let mask = threshold_aperture(image.view(), 3.0);

        assert!(mask[[4, 4]] && mask[[4, 5]]);
        assert!(!mask[[0, 6]]);
        assert!(!mask[[6, 0]]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 2);
    }

    #[test]
    fn test_threshold_aperture_flat_image_is_empty() {
        let image = Array2::<f64>::from_elem((4, 4), 3.0);
        let mask = threshold_aperture(image.view(), 1.0);
        assert!(mask.iter().all(|&m| !m));
    }
}
