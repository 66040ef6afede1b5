//! Deterministic synthetic pixel data for tests and demonstrations.
//!
//! NOTE: this is not a realistic instrument model. It produces a single
//! Gaussian star on a flat background with white noise, occasional quality
//! flags, and optional trends built from [`synthetic_basis_vectors`], which
//! is enough to exercise every stage of a reduction with known answers.

use std::f64::consts::PI;

use log::debug;
use ndarray::{Array1, Array2, Array3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::aperture::circular_aperture;
use crate::cotrend::BasisVectorSet;
use crate::error::{PhotometryError, Result};
use crate::quality::KEPLER_QUALITY_FLAGS;
use crate::source::InMemoryPixelSource;

/// Kepler long-cadence spacing in days (29.4 minutes)
pub const LONG_CADENCE_DAYS: f64 = 0.020_431_8;

/// Builder for a single-star [`InMemoryPixelSource<f32>`].
#[derive(Debug, Clone)]
pub struct SyntheticSourceBuilder {
    n_cadences: usize,
    frame_size: (usize, usize),
    star_flux: f64,
    fwhm: f64,
    background: f64,
    pixel_error: f64,
    flag_probability: f64,
    aperture_radius: f64,
    trend_coefficients: Vec<f64>,
    start_time: f64,
    first_cadence: i64,
    seed: u64,
}

impl Default for SyntheticSourceBuilder {
    fn default() -> Self {
        Self {
            n_cadences: 500,
            frame_size: (9, 9),
            star_flux: 50_000.0,
            fwhm: 2.5,
            background: 20.0,
            pixel_error: 5.0,
            flag_probability: 0.05,
            aperture_radius: 2.5,
            trend_coefficients: Vec::new(),
            start_time: 120.5,
            first_cadence: 1105,
            seed: 42,
        }
    }
}

impl SyntheticSourceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_cadences(mut self, n_cadences: usize) -> Self {
        self.n_cadences = n_cadences;
        self
    }

    /// Frame (rows, columns); the star sits at the centre.
    pub fn frame_size(mut self, rows: usize, cols: usize) -> Self {
        self.frame_size = (rows, cols);
        self
    }

    /// Total star flux summed over the frame.
    pub fn star_flux(mut self, star_flux: f64) -> Self {
        self.star_flux = star_flux;
        self
    }

    pub fn background(mut self, background: f64) -> Self {
        self.background = background;
        self
    }

    /// Per-pixel one-sigma noise, also reported as the flux error.
    /// Zero disables noise.
    pub fn pixel_error(mut self, pixel_error: f64) -> Self {
        self.pixel_error = pixel_error;
        self
    }

    /// Chance that a cadence carries one random quality flag.
    pub fn flag_probability(mut self, probability: f64) -> Self {
        self.flag_probability = probability;
        self
    }

    pub fn aperture_radius(mut self, radius: f64) -> Self {
        self.aperture_radius = radius;
        self
    }

    /// Star flux varies by `Σ cᵢ·bᵢ` using `synthetic_basis_vectors`.
    pub fn trend_coefficients(mut self, coefficients: Vec<f64>) -> Self {
        self.trend_coefficients = coefficients;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Basis vectors matching the injected trends, on the full cadence grid.
    pub fn basis_vectors(&self, count: usize) -> Result<BasisVectorSet> {
        synthetic_basis_vectors(self.n_cadences, count.max(self.trend_coefficients.len()))
    }

    /// Generate the source.
    ///
    /// Cadences flagged `NoData` get NaN time and NaN flux, like gaps in
    /// mission data.
    pub fn build(&self) -> Result<InMemoryPixelSource<f32>> {
        let (rows, cols) = self.frame_size;
        if rows == 0 || cols == 0 {
            return Err(PhotometryError::InvalidArgument(
                "synthetic frame must have at least one pixel".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.flag_probability) {
            return Err(PhotometryError::InvalidArgument(format!(
                "flag probability {} is outside [0, 1]",
                self.flag_probability
            )));
        }
        let noise = Normal::new(0.0, self.pixel_error).map_err(|e| {
            PhotometryError::InvalidArgument(format!("pixel error {}: {e}", self.pixel_error))
        })?;

        let center = ((rows as f64 - 1.0) / 2.0, (cols as f64 - 1.0) / 2.0);
        let psf = gaussian_weights(self.frame_size, center, self.fwhm);
        let basis = synthetic_basis_vectors(self.n_cadences, self.trend_coefficients.len())?;
        let trend: Vec<f64> = (0..self.n_cadences)
            .map(|i| {
                self.trend_coefficients
                    .iter()
                    .enumerate()
                    .map(|(k, c)| basis.get(k + 1).map_or(0.0, |v| c * v[i]))
                    .sum()
            })
            .collect();

        let flags = KEPLER_QUALITY_FLAGS.flags();
        let no_data = KEPLER_QUALITY_FLAGS
            .flag_by_code("NoData")
            .map_or(0, |flag| flag.value());

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut time = Array1::<f64>::zeros(self.n_cadences);
        let mut quality = Array1::<u32>::zeros(self.n_cadences);
        let mut flux = Array3::<f32>::zeros((self.n_cadences, rows, cols));

        for cadence in 0..self.n_cadences {
            if !flags.is_empty() && rng.gen::<f64>() < self.flag_probability {
                quality[cadence] = flags[rng.gen_range(0..flags.len())].value();
            }
            let missing = quality[cadence] & no_data != 0;

            time[cadence] = if missing {
                f64::NAN
            } else {
                self.start_time + cadence as f64 * LONG_CADENCE_DAYS
            };

            let star = self.star_flux + trend[cadence];
            for ((row, col), weight) in psf.indexed_iter() {
                let value = if missing {
                    f64::NAN
                } else {
                    self.background + star * weight + noise.sample(&mut rng)
                };
                flux[[cadence, row, col]] = value as f32;
            }
        }

        debug!(
            "Synthetic source: {} cadences, {} flagged",
            self.n_cadences,
            quality.iter().filter(|&&q| q != 0).count()
        );

        let flux_err = Array3::from_elem(flux.dim(), self.pixel_error as f32);
        let aperture = circular_aperture(self.frame_size, center, self.aperture_radius);
        let cadence_numbers = Array1::from_iter(
            (0..self.n_cadences as i64).map(|i| self.first_cadence + i),
        );

        Ok(
            InMemoryPixelSource::new(time, quality, flux, flux_err, aperture)
                .with_cadence_numbers(cadence_numbers),
        )
    }
}

/// Unit-norm Gaussian PSF weights over a frame.
fn gaussian_weights(shape: (usize, usize), center: (f64, f64), fwhm: f64) -> Array2<f64> {
    // FWHM = 2.355 * sigma
    let sigma = fwhm / 2.355;
    let weights = Array2::from_shape_fn(shape, |(row, col)| {
        let dy = row as f64 - center.0;
        let dx = col as f64 - center.1;
        (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
    });
    let total = weights.sum();
    weights / total
}

/// Smooth, mutually orthogonal, unit-norm basis vectors.
///
/// Vector `k` (1-based) is the cosine `cos(πk(i + ½)/n)`, so higher
/// indices vary faster.
pub fn synthetic_basis_vectors(n_cadences: usize, count: usize) -> Result<BasisVectorSet> {
    let mut set = BasisVectorSet::new();
    for k in 1..=count {
        let raw: Vec<f64> = (0..n_cadences)
            .map(|i| (PI * k as f64 * (i as f64 + 0.5) / n_cadences as f64).cos())
            .collect();
        let norm = raw.iter().map(|v| v * v).sum::<f64>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|v| v / norm).collect()
        } else {
            raw
        };
        set.push(format!("CBV {k}"), values)?;
    }
    Ok(set)
}
