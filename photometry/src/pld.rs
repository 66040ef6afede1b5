//! Pixel level decorrelation.
//!
//! Pointing jitter moves starlight between pixels, so the fraction of the
//! total flux landing in each pixel traces the motion. [`PldCorrector`]
//! regresses the summed flux against those fractions plus a low-order
//! polynomial in time, one window of cadences at a time, and subtracts the
//! fitted model.

use std::ops::Range;

use curve_math::{least_squares, median};
use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::Array1;

use crate::error::{PhotometryError, Result};
use crate::lightcurve::LightCurve;
use crate::source::FluxFloat;
use crate::tpf::TargetPixelFile;

/// Pixel level decorrelation over the collected pixels of a target pixel file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PldCorrector {
    window_length: Option<usize>,
    polyorder: usize,
}

impl Default for PldCorrector {
    fn default() -> Self {
        Self {
            window_length: None,
            polyorder: 2,
        }
    }
}

impl PldCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cadences per independent fit. Defaults to half the series less one.
    pub fn window_length(mut self, cadences: usize) -> Self {
        self.window_length = Some(cadences);
        self
    }

    /// Degree of the per-window time polynomial.
    pub fn polyorder(mut self, order: usize) -> Self {
        self.polyorder = order;
        self
    }

    /// Decorrelate the summed flux of every collected pixel.
    ///
    /// Cadences with non-finite time are dropped. NaN pixels count as
    /// zero in the sum. Cadences whose summed flux is zero or non-finite
    /// are left out of the fit and come back as NaN. The median summed
    /// flux is added back, so the output keeps the target's flux level.
    /// Errors are the quadrature sum of the pixel errors.
    ///
    /// A trailing window too short to fit is merged into the one before.
    ///
    /// # Errors
    /// * [`PhotometryError::EmptyAperture`] if no pixel was collected
    /// * [`PhotometryError::InvalidArgument`] if an explicit window is
    ///   shorter than the number of fitted parameters
    /// * [`PhotometryError::InsufficientData`] if a window has fewer usable
    ///   cadences than parameters
    pub fn correct<T: FluxFloat>(&self, tpf: &TargetPixelFile<T>) -> Result<LightCurve<T>> {
        let pixel_mask = tpf.pixel_mask();
        let pixels: Vec<(usize, usize)> = pixel_mask
            .indexed_iter()
            .filter(|(_, collected)| **collected)
            .map(|(index, _)| index)
            .collect();
        if pixels.is_empty() {
            return Err(PhotometryError::EmptyAperture);
        }
        let n_params = pixels.len() + self.polyorder + 1;

        let time = tpf.time();
        let cadences: Vec<usize> = (0..time.len()).filter(|&i| time[i].is_finite()).collect();
        let n = cadences.len();
        if n == 0 {
            return Err(PhotometryError::InsufficientData {
                available: 0,
                required: n_params,
            });
        }

        let flux = tpf.flux();
        let flux_err = tpf.flux_err();
        let mut values = DMatrix::<f64>::zeros(n, pixels.len());
        let mut totals = vec![0.0; n];
        let mut errors = vec![0.0; n];
        for (row, &cadence) in cadences.iter().enumerate() {
            let mut variance = 0.0;
            for (column, &(r, c)) in pixels.iter().enumerate() {
                let value = flux[[cadence, r, c]].as_f64();
                if value.is_nan() {
                    continue;
                }
                values[(row, column)] = value;
                totals[row] += value;
                let err = flux_err[[cadence, r, c]].as_f64();
                if err.is_finite() {
                    variance += err * err;
                }
            }
            errors[row] = variance.sqrt();
        }
        let usable: Vec<bool> = totals.iter().map(|t| t.is_finite() && *t != 0.0).collect();

        let window = match self.window_length {
            Some(k) if k < n_params => {
                return Err(PhotometryError::InvalidArgument(format!(
                    "window of {k} cadences cannot fit {n_params} parameters"
                )));
            }
            Some(k) => k,
            None => match (n / 2).saturating_sub(1) {
                k if k < n_params => n,
                k => k,
            },
        };
        let windows = split_windows(n, window, n_params);
        debug!(
            "PLD over {} pixels, {n} cadences in {} windows",
            pixels.len(),
            windows.len()
        );

        let mut corrected = vec![f64::NAN; n];
        for range in windows {
            self.fit_window(&values, &totals, &usable, range, &mut corrected)?;
        }
        let usable_totals: Vec<f64> = totals
            .iter()
            .zip(&usable)
            .filter(|(_, ok)| **ok)
            .map(|(&t, _)| t)
            .collect();
        let level = median(&usable_totals).unwrap_or(f64::NAN);

        let flux: Array1<T> = corrected
            .iter()
            .map(|&v| T::from_f64_lossy(v + level))
            .collect();
        let flux_err: Array1<T> = errors
            .iter()
            .zip(&usable)
            .map(|(&e, ok)| if *ok { T::from_f64_lossy(e) } else { T::nan() })
            .collect();
        let time: Array1<f64> = cadences.iter().map(|&i| time[i]).collect();
        LightCurve::new(time, flux, flux_err)
    }

    fn fit_window(
        &self,
        values: &DMatrix<f64>,
        totals: &[f64],
        usable: &[bool],
        range: Range<usize>,
        corrected: &mut [f64],
    ) -> Result<()> {
        let n_pixels = values.ncols();
        let n_params = n_pixels + self.polyorder + 1;
        let m = range.len();
        let rows: Vec<usize> = range.clone().filter(|&i| usable[i]).collect();
        if rows.len() < n_params {
            return Err(PhotometryError::InsufficientData {
                available: rows.len(),
                required: n_params,
            });
        }

        let regressor = |i: usize, c: usize| {
            if c < n_pixels {
                values[(i, c)] / totals[i]
            } else {
                let position = if m > 1 {
                    (i - range.start) as f64 / (m - 1) as f64
                } else {
                    0.0
                };
                position.powi((c - n_pixels) as i32)
            }
        };

        let design = DMatrix::from_fn(rows.len(), n_params, |r, c| regressor(rows[r], c));
        let target = DVector::from_iterator(rows.len(), rows.iter().map(|&i| totals[i]));
        let weights = least_squares(&design, &target)?.coefficients;

        for &i in &rows {
            let model: f64 = (0..n_params).map(|c| regressor(i, c) * weights[c]).sum();
            corrected[i] = totals[i] - model;
        }
        Ok(())
    }
}

/// Consecutive windows of `window` cadences covering `0..n`. A trailing
/// window shorter than `min_len` is absorbed by its predecessor.
fn split_windows(n: usize, window: usize, min_len: usize) -> Vec<Range<usize>> {
    let mut windows: Vec<Range<usize>> = (0..n)
        .step_by(window.max(1))
        .map(|start| start..(start + window).min(n))
        .collect();
    if windows.len() > 1 && windows.last().is_some_and(|w| w.len() < min_len) {
        if let Some(tail) = windows.pop() {
            if let Some(previous) = windows.last_mut() {
                previous.end = tail.end;
            }
        }
    }
    windows
}
