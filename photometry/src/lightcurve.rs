//! Light curves: brightness time series with uncertainties.
//!
//! A [`LightCurve`] is an immutable triple of equal-length sequences. Every
//! transformation returns a new curve.

use curve_math::{mean, median, running_mean, savgol_filter, sigma_clip_mask, std_dev};
use ndarray::{Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PhotometryError, Result};
use crate::source::FluxFloat;

/// Iteration cap for sigma clipping.
const SIGMA_CLIP_MAX_ITERS: usize = 5;

/// Summary statistic used when binning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinMethod {
    #[default]
    Mean,
    Median,
}

/// Time, flux and flux uncertainty for a sequence of cadences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurve<T> {
    time: Array1<f64>,
    flux: Array1<T>,
    flux_err: Array1<T>,
}

impl<T: FluxFloat> LightCurve<T> {
    /// Create a light curve.
    ///
    /// Fails with [`PhotometryError::DataShape`] if the lengths differ, and
    /// with [`PhotometryError::InvalidArgument`] if an error is negative, or
    /// is not finite where the flux is finite.
    pub fn new(time: Array1<f64>, flux: Array1<T>, flux_err: Array1<T>) -> Result<Self> {
        check_lengths(time.len(), flux.len(), flux_err.len())?;

        for (i, (&f, &e)) in flux.iter().zip(flux_err.iter()).enumerate() {
            let valid_error = if f.is_finite() {
                e.is_finite() && e >= T::zero()
            } else {
                e.is_nan() || e >= T::zero()
            };
            if !valid_error {
                return Err(PhotometryError::InvalidArgument(format!(
                    "flux error {e} at cadence {i} is invalid for flux {f}"
                )));
            }
        }

        Ok(Self::from_parts(time, flux, flux_err))
    }

    /// Create a light curve whose uncertainties are unknown (NaN).
    pub fn without_errors(time: Array1<f64>, flux: Array1<T>) -> Result<Self> {
        check_lengths(time.len(), flux.len(), flux.len())?;
        let flux_err = Array1::from_elem(flux.len(), T::nan());
        Ok(Self::from_parts(time, flux, flux_err))
    }

    /// Assemble from arrays already known to be consistent.
    pub(crate) fn from_parts(time: Array1<f64>, flux: Array1<T>, flux_err: Array1<T>) -> Self {
        debug_assert!(time.len() == flux.len() && flux.len() == flux_err.len());
        Self {
            time,
            flux,
            flux_err,
        }
    }

    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    pub fn flux(&self) -> ArrayView1<'_, T> {
        self.flux.view()
    }

    pub fn flux_err(&self) -> ArrayView1<'_, T> {
        self.flux_err.view()
    }

    /// Number of cadences.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Whether any uncertainty is known.
    pub fn has_errors(&self) -> bool {
        self.flux_err.iter().any(|e| !e.is_nan())
    }

    fn flux_f64(&self) -> Vec<f64> {
        self.flux.iter().map(|f| f.as_f64()).collect()
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self::from_parts(
            self.time.select(Axis(0), indices),
            self.flux.select(Axis(0), indices),
            self.flux_err.select(Axis(0), indices),
        )
    }

    fn retain<F: Fn(usize) -> bool>(&self, keep: F) -> Self {
        let indices: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        self.select(&indices)
    }

    /// Concatenate this curve with `others`, in order.
    pub fn stitch(&self, others: &[&LightCurve<T>]) -> Self {
        let parts = std::iter::once(self).chain(others.iter().copied());
        let mut time = Vec::new();
        let mut flux = Vec::new();
        let mut flux_err = Vec::new();
        for part in parts {
            time.extend(part.time.iter().copied());
            flux.extend(part.flux.iter().copied());
            flux_err.extend(part.flux_err.iter().copied());
        }
        Self::from_parts(
            Array1::from_vec(time),
            Array1::from_vec(flux),
            Array1::from_vec(flux_err),
        )
    }

    /// Fold at `period` around the reference time `phase`.
    ///
    /// The returned time axis is phase in [-0.5, 0.5), sorted ascending;
    /// cadences at `phase + n * period` land on 0.
    pub fn fold(&self, period: f64, phase: f64) -> Result<Self> {
        if !(period.is_finite() && period > 0.0) {
            return Err(PhotometryError::InvalidArgument(format!(
                "fold period must be positive and finite, got {period}"
            )));
        }

        let folded: Vec<f64> = self
            .time
            .iter()
            .map(|t| ((t - phase + 0.5 * period) / period).rem_euclid(1.0) - 0.5)
            .collect();

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| folded[a].total_cmp(&folded[b]));

        let time = order.iter().map(|&i| folded[i]).collect();
        Ok(Self::from_parts(
            time,
            self.flux.select(Axis(0), &order),
            self.flux_err.select(Axis(0), &order),
        ))
    }

    /// Divide flux and uncertainty by the median flux.
    pub fn normalize(&self) -> Result<Self> {
        let center = median(&self.flux_f64()).ok_or_else(|| {
            PhotometryError::InvalidArgument("cannot normalize: no valid flux".to_string())
        })?;
        if center == 0.0 || !center.is_finite() {
            return Err(PhotometryError::InvalidArgument(format!(
                "cannot normalize by median flux {center}"
            )));
        }

        let scale = T::from_f64_lossy(center);
        Ok(Self::from_parts(
            self.time.clone(),
            self.flux.mapv(|f| f / scale),
            self.flux_err.mapv(|e| e / scale.abs()),
        ))
    }

    /// Drop cadences whose flux is NaN.
    pub fn remove_nans(&self) -> Self {
        self.retain(|i| !self.flux[i].is_nan())
    }

    /// Drop cadences whose time is NaN or infinite.
    pub fn remove_nonfinite_time(&self) -> Self {
        self.retain(|i| self.time[i].is_finite())
    }

    /// Remove outliers by iterative sigma clipping about the median.
    ///
    /// Returns the clean curve and a mask over the input cadences in
    /// which `true` marks a removed cadence. NaN flux is always removed.
    pub fn remove_outliers(&self, sigma: f64) -> Result<(Self, Vec<bool>)> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(PhotometryError::InvalidArgument(format!(
                "sigma must be positive and finite, got {sigma}"
            )));
        }

        let outliers = sigma_clip_mask(&self.flux_f64(), sigma, SIGMA_CLIP_MAX_ITERS);
        let clean = self.retain(|i| !outliers[i]);
        Ok((clean, outliers))
    }

    /// Bin into `len / binsize` contiguous chunks.
    ///
    /// When the length is not a multiple of the bin count, the first
    /// `len % n_bins` chunks hold one extra cadence. Binned uncertainty is
    /// `sqrt(Σ err²) / binsize`; a curve without uncertainties instead
    /// reports the scatter of the flux within each bin.
    pub fn bin(&self, binsize: usize, method: BinMethod) -> Result<Self> {
        if binsize == 0 {
            return Err(PhotometryError::InvalidArgument(
                "binsize must be at least 1".to_string(),
            ));
        }
        let n_bins = self.len() / binsize;
        if n_bins == 0 {
            return Err(PhotometryError::InvalidArgument(format!(
                "binsize {binsize} exceeds light curve length {}",
                self.len()
            )));
        }

        let summarize = |values: &[f64]| {
            match method {
                BinMethod::Mean => mean(values),
                BinMethod::Median => median(values),
            }
            .unwrap_or(f64::NAN)
        };
        let has_errors = self.has_errors();
        let flux = self.flux_f64();
        let flux_err: Vec<f64> = self.flux_err.iter().map(|e| e.as_f64()).collect();
        let time = self.time.to_vec();

        let base = self.len() / n_bins;
        let extra = self.len() % n_bins;

        let mut binned_time = Vec::with_capacity(n_bins);
        let mut binned_flux = Vec::with_capacity(n_bins);
        let mut binned_err = Vec::with_capacity(n_bins);

        let mut start = 0;
        for bin in 0..n_bins {
            let end = start + base + usize::from(bin < extra);
            binned_time.push(summarize(&time[start..end]));
            binned_flux.push(T::from_f64_lossy(summarize(&flux[start..end])));

            let err = if has_errors {
                let sum_sq: f64 = flux_err[start..end]
                    .iter()
                    .filter(|e| !e.is_nan())
                    .map(|e| e * e)
                    .sum();
                sum_sq.sqrt() / binsize as f64
            } else {
                std_dev(&flux[start..end]).unwrap_or(f64::NAN)
            };
            binned_err.push(T::from_f64_lossy(err));
            start = end;
        }

        Ok(Self::from_parts(
            Array1::from_vec(binned_time),
            Array1::from_vec(binned_flux),
            Array1::from_vec(binned_err),
        ))
    }

    /// Remove low-frequency trends with a Savitzky-Golay filter.
    ///
    /// NaN-flux cadences are dropped first. Returns `(flattened, trend)`,
    /// where the flattened flux and uncertainty are divided by the trend.
    pub fn flatten(&self, window: usize, polyorder: usize) -> Result<(Self, Self)> {
        let clean = self.remove_nans();
        let trend = savgol_filter(&clean.flux_f64(), window, polyorder)?;

        let flat_flux = clean
            .flux
            .iter()
            .zip(&trend)
            .map(|(&f, &t)| T::from_f64_lossy(f.as_f64() / t))
            .collect();
        let flat_err = clean
            .flux_err
            .iter()
            .zip(&trend)
            .map(|(&e, &t)| T::from_f64_lossy(e.as_f64() / t.abs()))
            .collect();

        let flattened = Self::from_parts(clean.time.clone(), flat_flux, flat_err);
        let trend = Self::from_parts(
            clean.time.clone(),
            trend.iter().map(|&t| T::from_f64_lossy(t)).collect(),
            clean.flux_err.clone(),
        );
        Ok((flattened, trend))
    }

    /// Savitzky-Golay CDPP noise proxy, in parts per million.
    ///
    /// Flattens the curve, clips outliers at `sigma`, then returns the
    /// standard deviation of a running mean over `transit_duration`
    /// cadences.
    pub fn cdpp(
        &self,
        transit_duration: usize,
        savgol_window: usize,
        savgol_polyorder: usize,
        sigma: f64,
    ) -> Result<f64> {
        if transit_duration == 0 {
            return Err(PhotometryError::InvalidArgument(
                "transit duration must be at least one cadence".to_string(),
            ));
        }

        let (flattened, _) = self.flatten(savgol_window, savgol_polyorder)?;
        let (cleaned, _) = flattened.remove_outliers(sigma)?;
        let means = running_mean(&cleaned.flux_f64(), transit_duration);

        let spread = std_dev(&means).ok_or(PhotometryError::InsufficientData {
            available: cleaned.len(),
            required: transit_duration,
        })?;
        Ok(spread * 1e6)
    }
}

fn check_lengths(time: usize, flux: usize, flux_err: usize) -> Result<()> {
    if time != flux || flux != flux_err {
        return Err(PhotometryError::DataShape(format!(
            "time ({time}), flux ({flux}) and flux_err ({flux_err}) lengths differ"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn ramp(n: usize) -> LightCurve<f64> {
        LightCurve::new(
            Array1::from_iter((0..n).map(|i| i as f64)),
            Array1::from_iter((0..n).map(|i| 100.0 + i as f64)),
            Array1::from_elem(n, 1.0),
        )
        .unwrap()
    }

    #[test]
    fn test_new_validates_lengths() {
        let err = LightCurve::new(array![1.0, 2.0], array![1.0f32], array![0.1f32]).unwrap_err();
        assert!(matches!(err, PhotometryError::DataShape(_)));
    }

    #[test]
    fn test_new_validates_errors() {
        assert!(LightCurve::new(array![1.0], array![1.0f64], array![-0.1]).is_err());
        assert!(LightCurve::new(array![1.0], array![1.0f64], array![f64::NAN]).is_err());
        // A NaN error is fine where the flux itself is missing
        assert!(LightCurve::new(array![1.0], array![f64::NAN], array![f64::NAN]).is_ok());
    }

    #[test]
    fn test_without_errors() {
        let lc = LightCurve::without_errors(array![0.0, 1.0], array![5.0f32, 6.0]).unwrap();
        assert!(!lc.has_errors());
        assert!(lc.flux_err().iter().all(|e| e.is_nan()));
    }

    #[test]
    fn test_stitch() {
        let a = ramp(3);
        let b = ramp(2);
        let stitched = a.stitch(&[&b, &a]);
        assert_eq!(stitched.len(), 8);
        assert_eq!(stitched.time()[3], 0.0);
        assert_eq!(stitched.flux()[4], 101.0);
        assert_eq!(stitched.flux()[7], 102.0);
    }

    #[test]
    fn test_fold() {
        let lc = LightCurve::new(
            array![0.0, 0.25, 1.0, 1.5, 2.75],
            array![1.0f64, 2.0, 3.0, 4.0, 5.0],
            array![0.1, 0.1, 0.1, 0.1, 0.1],
        )
        .unwrap();

        let folded = lc.fold(1.0, 0.0).unwrap();

        assert_eq!(folded.time().to_vec(), vec![-0.5, -0.25, 0.0, 0.0, 0.25]);
        assert_eq!(folded.flux().to_vec(), vec![4.0, 5.0, 1.0, 3.0, 2.0]);
        assert!(lc.fold(0.0, 0.0).is_err());
    }

    #[test]
    fn test_normalize() {
        let lc = LightCurve::new(
            array![0.0, 1.0, 2.0],
            array![2.0f64, 4.0, f64::NAN],
            array![0.2, 0.4, f64::NAN],
        )
        .unwrap();

        let normalized = lc.normalize().unwrap();

        assert_relative_eq!(normalized.flux()[0], 2.0 / 3.0);
        assert_relative_eq!(normalized.flux_err()[1], 0.4 / 3.0);
        assert!(normalized.flux()[2].is_nan());
    }

    #[test]
    fn test_normalize_rejects_zero_median() {
        let lc = LightCurve::new(array![0.0], array![0.0f64], array![0.0]).unwrap();
        assert!(lc.normalize().is_err());
    }

    #[test]
    fn test_remove_nans_and_nonfinite_time() {
        let lc = LightCurve::new(
            array![0.0, f64::NAN, 2.0, 3.0],
            array![1.0f64, 2.0, f64::NAN, 4.0],
            array![0.1, 0.1, f64::NAN, 0.1],
        )
        .unwrap();

        assert_eq!(lc.remove_nans().len(), 3);
        let finite_time = lc.remove_nonfinite_time();
        assert_eq!(finite_time.len(), 3);
        assert!(finite_time.time().iter().all(|t| t.is_finite()));
    }

    #[test]
    fn test_remove_outliers() {
        let n = 50;
        let mut flux: Vec<f64> = (0..n).map(|i| 10.0 + 0.01 * (i as f64).sin()).collect();
        flux[10] = 100.0;
        let lc = LightCurve::new(
            Array1::from_iter((0..n).map(|i| i as f64)),
            Array1::from_vec(flux),
            Array1::from_elem(n, 0.01),
        )
        .unwrap();

        let (clean, mask) = lc.remove_outliers(5.0).unwrap();

        assert_eq!(clean.len(), n - 1);
        assert!(mask[10]);
        assert!(lc.remove_outliers(-1.0).is_err());
    }

    #[test]
    fn test_bin_uneven_split() {
        let lc = ramp(10);
        let binned = lc.bin(3, BinMethod::Mean).unwrap();

        assert_eq!(binned.len(), 3);
        assert_eq!(binned.time().to_vec(), vec![1.5, 5.0, 8.0]);
        assert_relative_eq!(binned.flux_err()[0], 2.0 / 3.0);
        assert_relative_eq!(binned.flux_err()[1], 3.0_f64.sqrt() / 3.0);
    }

    #[test]
    fn test_bin_median_and_errors() {
        let lc = LightCurve::without_errors(
            array![0.0, 1.0, 2.0, 3.0],
            array![1.0f64, 9.0, 2.0, 4.0],
        )
        .unwrap();

        let binned = lc.bin(2, BinMethod::Median).unwrap();

        assert_eq!(binned.flux().to_vec(), vec![5.0, 3.0]);
        // Without uncertainties the scatter within each bin is reported
        assert_relative_eq!(binned.flux_err()[0], 4.0);
        assert_relative_eq!(binned.flux_err()[1], 1.0);

        assert!(lc.bin(0, BinMethod::Mean).is_err());
        assert!(lc.bin(5, BinMethod::Mean).is_err());
    }

    #[test]
    fn test_flatten_removes_smooth_trend() {
        let n = 101;
        let lc = LightCurve::new(
            Array1::from_iter((0..n).map(|i| i as f64)),
            Array1::from_iter((0..n).map(|i| 1000.0 + 2.0 * i as f64)),
            Array1::from_elem(n, 1.0f64),
        )
        .unwrap();

        let (flat, trend) = lc.flatten(11, 2).unwrap();

        for f in flat.flux() {
            assert_relative_eq!(*f, 1.0, epsilon = 1e-9);
        }
        assert_relative_eq!(trend.flux()[50], 1100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_flatten_window_too_long() {
        let lc = ramp(5);
        assert!(matches!(lc.flatten(7, 2), Err(PhotometryError::Savgol(_))));
    }

    #[test]
    fn test_cdpp_of_flat_curve_is_zero() {
        let n = 200;
        let lc = LightCurve::new(
            Array1::from_iter((0..n).map(|i| i as f64)),
            Array1::from_elem(n, 500.0f64),
            Array1::from_elem(n, 1.0),
        )
        .unwrap();

        let cdpp = lc.cdpp(13, 101, 2, 5.0).unwrap();
        assert_relative_eq!(cdpp, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cdpp_scales_with_noise() {
        let n = 400;
        let flux = Array1::from_iter((0..n).map(|i| 1.0 + 1e-3 * if i % 2 == 0 { 1.0 } else { -1.0 }));
        let lc = LightCurve::new(
            Array1::from_iter((0..n).map(|i| i as f64)),
            flux,
            Array1::from_elem(n, 1e-3f64),
        )
        .unwrap();

        let noisy = lc.cdpp(13, 101, 2, 5.0).unwrap();
        // Alternating noise largely averages out over an odd window
        assert!(noisy > 0.0);
        assert!(noisy < 1e3);
        assert!(lc.cdpp(0, 101, 2, 5.0).is_err());
    }
}
