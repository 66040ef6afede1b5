//! Pixel data sources.
//!
//! A [`PixelDataSource`] hands the reduction pipeline the arrays stored in
//! a target pixel file: per-cadence time and raw quality, the calibrated
//! flux and flux-error cubes (cadence × row × column), and static per-pixel
//! masks. Reading those arrays from disk is the implementor's concern; this
//! crate only ships an in-memory implementation.

use std::fmt::{Debug, Display};
use std::iter::Sum;

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ScalarOperand};
use num_traits::{Float, NumCast};
use serde::{Deserialize, Serialize};

/// Floating-point pixel value type (`f32` or `f64`).
///
/// Aggregation stays in the source's precision; conversions through `f64`
/// are only used for fitting and statistics.
pub trait FluxFloat:
    Float + Debug + Display + Default + Sum + ScalarOperand + Send + Sync + 'static
{
    /// Convert from `f64`, yielding NaN if the value is not representable.
    fn from_f64_lossy(value: f64) -> Self {
        <Self as NumCast>::from(value).unwrap_or_else(Self::nan)
    }

    /// Widen to `f64`.
    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl<T> FluxFloat for T where
    T: Float + Debug + Display + Default + Sum + ScalarOperand + Send + Sync + 'static
{
}

/// Supplier of target pixel data.
pub trait PixelDataSource {
    /// Precision of the stored flux and flux-error values
    type Flux: FluxFloat;

    /// Mid-cadence timestamps; non-finite for cadences with no valid time.
    fn time(&self) -> ArrayView1<'_, f64>;

    /// Raw per-cadence quality bits.
    fn quality(&self) -> ArrayView1<'_, u32>;

    /// Spacecraft cadence counter for each cadence.
    fn cadence_numbers(&self) -> ArrayView1<'_, i64>;

    /// Calibrated flux cube, shape (cadences, rows, columns).
    fn flux(&self) -> ArrayView3<'_, Self::Flux>;

    /// One-sigma flux uncertainty cube, same shape as [`flux`](Self::flux).
    fn flux_err(&self) -> ArrayView3<'_, Self::Flux>;

    /// Pipeline photometric aperture, shape (rows, columns).
    fn aperture_mask(&self) -> ArrayView2<'_, bool>;

    /// Pixels that were collected, shape (rows, columns).
    fn pixel_mask(&self) -> ArrayView2<'_, bool>;
}

/// Pixel data held in owned arrays.
///
/// No consistency checks are made here; [`TargetPixelFile`] validates
/// shapes when it is built from a source.
///
/// [`TargetPixelFile`]: crate::tpf::TargetPixelFile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryPixelSource<T> {
    time: Array1<f64>,
    quality: Array1<u32>,
    cadence_numbers: Array1<i64>,
    flux: Array3<T>,
    flux_err: Array3<T>,
    aperture_mask: Array2<bool>,
    pixel_mask: Array2<bool>,
}

impl<T: FluxFloat> InMemoryPixelSource<T> {
    /// Create a source with sequential cadence numbers and every pixel collected.
    pub fn new(
        time: Array1<f64>,
        quality: Array1<u32>,
        flux: Array3<T>,
        flux_err: Array3<T>,
        aperture_mask: Array2<bool>,
    ) -> Self {
        let cadence_numbers = Array1::from_iter(0..time.len() as i64);
        let pixel_mask = Array2::from_elem(aperture_mask.dim(), true);
        Self {
            time,
            quality,
            cadence_numbers,
            flux,
            flux_err,
            aperture_mask,
            pixel_mask,
        }
    }

    /// Replace the cadence numbers.
    pub fn with_cadence_numbers(mut self, cadence_numbers: Array1<i64>) -> Self {
        self.cadence_numbers = cadence_numbers;
        self
    }

    /// Replace the collected-pixel mask.
    pub fn with_pixel_mask(mut self, pixel_mask: Array2<bool>) -> Self {
        self.pixel_mask = pixel_mask;
        self
    }

    /// Replace the pipeline aperture.
    pub fn with_aperture_mask(mut self, aperture_mask: Array2<bool>) -> Self {
        self.aperture_mask = aperture_mask;
        self
    }
}

impl<T: FluxFloat> PixelDataSource for InMemoryPixelSource<T> {
    type Flux = T;

    fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    fn quality(&self) -> ArrayView1<'_, u32> {
        self.quality.view()
    }

    fn cadence_numbers(&self) -> ArrayView1<'_, i64> {
        self.cadence_numbers.view()
    }

    fn flux(&self) -> ArrayView3<'_, T> {
        self.flux.view()
    }

    fn flux_err(&self) -> ArrayView3<'_, T> {
        self.flux_err.view()
    }

    fn aperture_mask(&self) -> ArrayView2<'_, bool> {
        self.aperture_mask.view()
    }

    fn pixel_mask(&self) -> ArrayView2<'_, bool> {
        self.pixel_mask.view()
    }
}
