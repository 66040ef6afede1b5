//! Common utilities for photometry integration tests

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Array3};
use photometry::InMemoryPixelSource;
use serde::Deserialize;

/// Kept-cadence counts recorded for one bitmask
#[derive(Debug, Deserialize)]
pub struct ExpectedCounts {
    /// Cadences passing the quality mask
    pub kept: usize,
    /// Cadences left once non-finite timestamps are dropped
    pub lightcurve: usize,
}

/// Golden quality-filtering fixture
#[derive(Debug, Deserialize)]
pub struct QualityFixture {
    pub frame_shape: (usize, usize),
    pub aperture: Vec<Vec<bool>>,
    /// `null` marks a cadence without a valid timestamp
    pub time: Vec<Option<f64>>,
    pub quality: Vec<u32>,
    /// Keyed by the string form of a quality bitmask
    pub expected: BTreeMap<String, ExpectedCounts>,
}

impl QualityFixture {
    pub fn load() -> Self {
        let path = test_helpers::fixture_path("quality_fixture.json")
            .expect("quality fixture should be checked in");
        let json = std::fs::read_to_string(path).expect("Failed to read fixture");
        serde_json::from_str(&json).expect("Failed to parse fixture")
    }

    pub fn n_cadences(&self) -> usize {
        self.time.len()
    }

    pub fn aperture_mask(&self) -> Array2<bool> {
        let (rows, cols) = self.frame_shape;
        Array2::from_shape_fn((rows, cols), |(r, c)| self.aperture[r][c])
    }

    /// Source with the fixture's time, quality and aperture and a constant cube.
    pub fn source(&self, flux: f32, flux_err: f32) -> InMemoryPixelSource<f32> {
        let (rows, cols) = self.frame_shape;
        let shape = (self.n_cadences(), rows, cols);
        InMemoryPixelSource::new(
            self.time.iter().map(|t| t.unwrap_or(f64::NAN)).collect(),
            Array1::from_vec(self.quality.clone()),
            Array3::from_elem(shape, flux),
            Array3::from_elem(shape, flux_err),
            self.aperture_mask(),
        )
    }
}

/// Single-pixel aperture at `(row, col)` on a frame of `shape`
pub fn single_pixel_aperture(shape: (usize, usize), row: usize, col: usize) -> Array2<bool> {
    let mut aperture = Array2::from_elem(shape, false);
    aperture[[row, col]] = true;
    aperture
}
