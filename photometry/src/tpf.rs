//! Target pixel files: quality-filtered pixel time series for one target.

use curve_math::median;
use log::{debug, warn};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

use crate::aperture::ApertureAggregator;
use crate::error::{PhotometryError, Result};
use crate::lightcurve::LightCurve;
use crate::quality::{QualityBitmask, QualityFlagRegistry, KEPLER_QUALITY_FLAGS};
use crate::source::{FluxFloat, PixelDataSource};

/// Pixel data for one target with a quality mask applied.
///
/// The source arrays are copied once at construction; cadences rejected
/// by the quality bitmask are dropped from every per-cadence accessor.
/// [`quality_mask`](Self::quality_mask) keeps the full-length view.
#[derive(Debug, Clone)]
pub struct TargetPixelFile<T> {
    bitmask: u32,
    quality_mask: Array1<bool>,
    kept: Vec<usize>,
    time: Array1<f64>,
    quality: Array1<u32>,
    cadence_numbers: Array1<i64>,
    flux: Array3<T>,
    flux_err: Array3<T>,
    aperture_mask: Array2<bool>,
    pixel_mask: Array2<bool>,
}

impl<T: FluxFloat> TargetPixelFile<T> {
    /// Build from a source using the built-in Kepler quality flags.
    pub fn new<S>(source: &S, bitmask: impl Into<QualityBitmask>) -> Result<Self>
    where
        S: PixelDataSource<Flux = T>,
    {
        Self::with_registry(source, bitmask, &KEPLER_QUALITY_FLAGS)
    }

    /// Build from a source, resolving `bitmask` against `registry`.
    ///
    /// Fails with [`PhotometryError::DataShape`] if the per-cadence arrays
    /// disagree in length, if the flux and error cubes differ in shape, or
    /// if a 2-D mask does not match the frame.
    pub fn with_registry<S>(
        source: &S,
        bitmask: impl Into<QualityBitmask>,
        registry: &QualityFlagRegistry,
    ) -> Result<Self>
    where
        S: PixelDataSource<Flux = T>,
    {
        validate_source(source)?;

        let bitmask = registry.resolve(bitmask.into());
        let quality_mask = registry.quality_mask(source.quality(), bitmask);
        let kept: Vec<usize> = quality_mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(index, _)| index)
            .collect();

        debug!(
            "Quality bitmask {bitmask} keeps {} of {} cadences",
            kept.len(),
            quality_mask.len()
        );
        if kept.is_empty() && !quality_mask.is_empty() {
            warn!("Quality bitmask {bitmask} rejects every cadence");
        }

        Ok(Self {
            bitmask,
            time: source.time().select(Axis(0), &kept),
            quality: source.quality().select(Axis(0), &kept),
            cadence_numbers: source.cadence_numbers().select(Axis(0), &kept),
            flux: source.flux().select(Axis(0), &kept),
            flux_err: source.flux_err().select(Axis(0), &kept),
            aperture_mask: source.aperture_mask().to_owned(),
            pixel_mask: source.pixel_mask().to_owned(),
            quality_mask,
            kept,
        })
    }

    /// Timestamps of kept cadences.
    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    /// Flux cube of kept cadences.
    pub fn flux(&self) -> ArrayView3<'_, T> {
        self.flux.view()
    }

    /// Flux uncertainty cube of kept cadences.
    pub fn flux_err(&self) -> ArrayView3<'_, T> {
        self.flux_err.view()
    }

    /// Raw quality of kept cadences.
    pub fn quality(&self) -> ArrayView1<'_, u32> {
        self.quality.view()
    }

    pub fn cadence_numbers(&self) -> ArrayView1<'_, i64> {
        self.cadence_numbers.view()
    }

    /// Keep mask over every cadence of the source.
    pub fn quality_mask(&self) -> ArrayView1<'_, bool> {
        self.quality_mask.view()
    }

    /// The resolved integer bitmask.
    pub fn bitmask(&self) -> u32 {
        self.bitmask
    }

    /// Number of kept cadences.
    pub fn n_cadences(&self) -> usize {
        self.kept.len()
    }

    /// (rows, columns) of one frame.
    pub fn frame_shape(&self) -> (usize, usize) {
        self.aperture_mask.dim()
    }

    pub fn aperture_mask(&self) -> ArrayView2<'_, bool> {
        self.aperture_mask.view()
    }

    pub fn pixel_mask(&self) -> ArrayView2<'_, bool> {
        self.pixel_mask.view()
    }

    /// Per-pixel median over kept cadences, ignoring NaN.
    ///
    /// Pixels with no finite sample are NaN.
    pub fn median_image(&self) -> Array2<f64> {
        let (rows, cols) = self.frame_shape();
        Array2::from_shape_fn((rows, cols), |(row, col)| {
            let samples: Vec<f64> = self
                .flux
                .slice(s![.., row, col])
                .iter()
                .map(|v| v.as_f64())
                .collect();
            median(&samples).unwrap_or(f64::NAN)
        })
    }

    /// Summed flux and quadrature error through the pipeline aperture.
    pub fn get_aperture_flux(&self) -> Result<(Array1<T>, Array1<T>)> {
        self.aperture_flux_with(self.aperture_mask.view())
    }

    fn aperture_flux_with(&self, aperture: ArrayView2<bool>) -> Result<(Array1<T>, Array1<T>)> {
        if aperture.dim() != self.frame_shape() {
            return Err(PhotometryError::DataShape(format!(
                "aperture {:?} does not match frame {:?}",
                aperture.dim(),
                self.frame_shape()
            )));
        }
        ApertureAggregator::new(aperture)?.aggregate(self.flux.view(), self.flux_err.view())
    }

    /// Light curve through the pipeline aperture.
    ///
    /// Cadences whose time is not finite are excluded.
    pub fn to_lightcurve(&self) -> Result<LightCurve<T>> {
        self.to_lightcurve_with(self.aperture_mask.view())
    }

    /// Light curve through a caller-supplied aperture.
    pub fn to_lightcurve_with(&self, aperture: ArrayView2<bool>) -> Result<LightCurve<T>> {
        Ok(self.lightcurve_with_indices(aperture)?.0)
    }

    /// Light curve plus the source cadence index of each of its points.
    pub(crate) fn lightcurve_with_indices(
        &self,
        aperture: ArrayView2<bool>,
    ) -> Result<(LightCurve<T>, Vec<usize>)> {
        let (flux, flux_err) = self.aperture_flux_with(aperture)?;

        let positions: Vec<usize> = self
            .time
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_finite())
            .map(|(position, _)| position)
            .collect();
        let source_indices = positions.iter().map(|&p| self.kept[p]).collect();

        let lc = LightCurve::from_parts(
            self.time.select(Axis(0), &positions),
            flux.select(Axis(0), &positions),
            flux_err.select(Axis(0), &positions),
        );
        Ok((lc, source_indices))
    }
}

fn validate_source<S: PixelDataSource>(source: &S) -> Result<()> {
    let n_time = source.time().len();
    let n_quality = source.quality().len();
    let n_cadence_numbers = source.cadence_numbers().len();
    let flux_dim = source.flux().dim();
    let err_dim = source.flux_err().dim();

    if n_quality != n_time || n_cadence_numbers != n_time || flux_dim.0 != n_time {
        return Err(PhotometryError::DataShape(format!(
            "time ({n_time}), quality ({n_quality}), cadence numbers ({n_cadence_numbers}) \
             and flux cube ({}) lengths differ",
            flux_dim.0
        )));
    }
    if flux_dim != err_dim {
        return Err(PhotometryError::DataShape(format!(
            "flux cube {flux_dim:?} and error cube {err_dim:?} differ"
        )));
    }

    let frame = (flux_dim.1, flux_dim.2);
    for (name, dim) in [
        ("aperture mask", source.aperture_mask().dim()),
        ("pixel mask", source.pixel_mask().dim()),
    ] {
        if dim != frame {
            return Err(PhotometryError::DataShape(format!(
                "{name} {dim:?} does not match frame {frame:?}"
            )));
        }
    }
    Ok(())
}
