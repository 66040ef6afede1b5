//! Cotrending: removing shared systematics with basis vectors.
//!
//! A light curve's flux is modelled as `intercept + Σ cᵢ·bᵢ` over a
//! caller-chosen subset of basis vectors and solved with one SVD least
//! squares fit. The fitted trend is then removed, either by subtraction
//! (the intercept baseline stays in the flux) or by division by the model
//! normalized to its intercept.

use std::fmt;
use std::str::FromStr;

use curve_math::{least_squares, LeastSquaresFit};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{PhotometryError, Result};
use crate::lightcurve::LightCurve;
use crate::source::FluxFloat;

/// How the fitted trend is removed from the flux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CotrendMode {
    /// `flux - Σ cᵢ·bᵢ`
    #[default]
    Additive,
    /// `flux / ((intercept + Σ cᵢ·bᵢ) / intercept)`
    Multiplicative,
}

impl fmt::Display for CotrendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CotrendMode::Additive => write!(f, "additive"),
            CotrendMode::Multiplicative => write!(f, "multiplicative"),
        }
    }
}

impl FromStr for CotrendMode {
    type Err = PhotometryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "additive" => Ok(CotrendMode::Additive),
            "multiplicative" => Ok(CotrendMode::Multiplicative),
            other => Err(PhotometryError::InvalidArgument(format!(
                "unknown cotrend mode '{other}' (expected additive or multiplicative)"
            ))),
        }
    }
}

/// Ordered, named basis vectors sharing one cadence grid.
///
/// Deserialized sets go through [`push`](Self::push), so they hold the
/// same length invariant as sets built in code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBasisVectorSet")]
pub struct BasisVectorSet {
    names: Vec<String>,
    vectors: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct RawBasisVectorSet {
    names: Vec<String>,
    vectors: Vec<Vec<f64>>,
}

impl TryFrom<RawBasisVectorSet> for BasisVectorSet {
    type Error = PhotometryError;

    fn try_from(raw: RawBasisVectorSet) -> Result<Self> {
        if raw.names.len() != raw.vectors.len() {
            return Err(PhotometryError::DataShape(format!(
                "{} basis vector names for {} vectors",
                raw.names.len(),
                raw.vectors.len()
            )));
        }
        let mut set = Self::new();
        for (name, values) in raw.names.into_iter().zip(raw.vectors) {
            set.push(name, values)?;
        }
        Ok(set)
    }
}

impl BasisVectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vector. Every vector must have the same length.
    pub fn push(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        if let Some(expected) = self.n_cadences() {
            if values.len() != expected {
                return Err(PhotometryError::DataShape(format!(
                    "basis vector has {} cadences, set has {expected}",
                    values.len()
                )));
            }
        }
        self.names.push(name.into());
        self.vectors.push(values);
        Ok(())
    }

    /// Vector at a 1-based index.
    pub fn get(&self, index: usize) -> Result<&[f64]> {
        index
            .checked_sub(1)
            .and_then(|i| self.vectors.get(i))
            .map(Vec::as_slice)
            .ok_or(PhotometryError::IndexOutOfRange {
                index,
                available: self.vectors.len(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Length shared by every vector, if any vector is present.
    pub fn n_cadences(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }

    /// Keep only the given cadences, in order.
    pub(crate) fn select_cadences(&self, indices: &[usize]) -> Result<Self> {
        let n = self.vectors.iter().map(Vec::len).min().unwrap_or(usize::MAX);
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(PhotometryError::DataShape(format!(
                "cadence {bad} is beyond the basis length {n}"
            )));
        }
        Ok(Self {
            names: self.names.clone(),
            vectors: self
                .vectors
                .iter()
                .map(|v| indices.iter().map(|&i| v[i]).collect())
                .collect(),
        })
    }
}

/// Output of a cotrending fit.
#[derive(Debug, Clone, PartialEq)]
pub struct CotrendResult<T> {
    /// Flux with the fitted trend removed, on the input's cadences.
    pub corrected: LightCurve<T>,
    /// `intercept + Σ cᵢ·bᵢ` at every cadence; errors are zero.
    pub model: LightCurve<T>,
    /// Fitted coefficients in the caller's selection order.
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Cadences that entered the fit.
    pub n_fit_cadences: usize,
}

struct TrendFit<'a> {
    columns: Vec<&'a [f64]>,
    fit: LeastSquaresFit,
    n_rows: usize,
}

/// Fits and removes basis-vector trends from light curves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CotrendingEngine {
    mode: CotrendMode,
}

impl CotrendingEngine {
    pub fn new(mode: CotrendMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CotrendMode {
        self.mode
    }

    /// Fit `selected` (1-based) basis vectors to `lc` and remove the trend.
    ///
    /// The basis must be aligned with `lc` cadence for cadence. Only
    /// cadences where the flux and every selected basis value are finite
    /// enter the fit; the trend is evaluated everywhere.
    ///
    /// # Errors
    /// * [`PhotometryError::IndexOutOfRange`] for an index of 0 or past the set
    /// * [`PhotometryError::DataShape`] if the basis and light curve lengths differ
    /// * [`PhotometryError::InsufficientData`] if fewer than `selected.len() + 1`
    ///   cadences are usable
    pub fn cotrend<T: FluxFloat>(
        &self,
        lc: &LightCurve<T>,
        basis: &BasisVectorSet,
        selected: &[usize],
    ) -> Result<CotrendResult<T>> {
        let TrendFit {
            columns,
            fit,
            n_rows,
        } = fit_trend(lc, basis, selected)?;

        let intercept = fit.coefficients[0];
        let coefficients = fit.coefficients[1..].to_vec();

        if self.mode == CotrendMode::Multiplicative && !(intercept.is_finite() && intercept != 0.0)
        {
            return Err(PhotometryError::InvalidArgument(format!(
                "multiplicative cotrending needs a non-zero baseline, fitted intercept is {intercept}"
            )));
        }

        let trend: Vec<f64> = (0..lc.len())
            .map(|i| {
                columns
                    .iter()
                    .zip(&coefficients)
                    .map(|(column, c)| c * column[i])
                    .sum()
            })
            .collect();

        let flux = lc.flux();
        let flux_err = lc.flux_err();
        let (corrected_flux, corrected_err): (Vec<T>, Vec<T>) = match self.mode {
            CotrendMode::Additive => flux
                .iter()
                .zip(flux_err.iter())
                .zip(&trend)
                .map(|((&f, &e), &t)| (T::from_f64_lossy(f.as_f64() - t), e))
                .unzip(),
            CotrendMode::Multiplicative => flux
                .iter()
                .zip(flux_err.iter())
                .zip(&trend)
                .map(|((&f, &e), &t)| {
                    let factor = (intercept + t) / intercept;
                    (
                        T::from_f64_lossy(f.as_f64() / factor),
                        T::from_f64_lossy(e.as_f64() / factor.abs()),
                    )
                })
                .unzip(),
        };

        let time = lc.time().to_owned();
        let corrected = LightCurve::from_parts(
            time.clone(),
            Array1::from_vec(corrected_flux),
            Array1::from_vec(corrected_err),
        );
        let model = LightCurve::from_parts(
            time,
            trend.iter().map(|&t| T::from_f64_lossy(intercept + t)).collect(),
            Array1::zeros(lc.len()),
        );

        debug!(
            "{} cotrend with {} vectors over {n_rows} cadences: intercept {intercept}, coefficients {coefficients:?}",
            self.mode,
            selected.len()
        );

        Ok(CotrendResult {
            corrected,
            model,
            coefficients,
            intercept,
            n_fit_cadences: n_rows,
        })
    }
}

/// Choose how many leading basis vectors to fit.
///
/// Fits the nested selections `[1]`, `[1, 2]`, ... up to `max_vectors`
/// and returns the one with the lowest Bayesian information criterion,
/// `m·ln(RSS/m) + k·ln(m)` for `m` fitted cadences and `k` parameters.
pub fn select_basis_count<T: FluxFloat>(
    lc: &LightCurve<T>,
    basis: &BasisVectorSet,
    max_vectors: usize,
) -> Result<Vec<usize>> {
    let max_vectors = max_vectors.min(basis.len());
    let mut best: Option<(f64, usize)> = None;

    for count in 1..=max_vectors {
        let selection: Vec<usize> = (1..=count).collect();
        let outcome = match fit_trend(lc, basis, &selection) {
            Ok(outcome) => outcome,
            Err(PhotometryError::InsufficientData { .. }) if best.is_some() => break,
            Err(err) => return Err(err),
        };

        let m = outcome.n_rows as f64;
        let rss = outcome.fit.residual_sum_of_squares;
        let bic = m * (rss / m).ln() + (count + 1) as f64 * m.ln();
        debug!("BIC with {count} basis vectors: {bic}");

        if best.map_or(true, |(best_bic, _)| bic < best_bic) {
            best = Some((bic, count));
        }
    }

    Ok(best.map_or_else(Vec::new, |(_, count)| (1..=count).collect()))
}

fn fit_trend<'a, T: FluxFloat>(
    lc: &LightCurve<T>,
    basis: &'a BasisVectorSet,
    selected: &[usize],
) -> Result<TrendFit<'a>> {
    let columns = selected
        .iter()
        .map(|&index| basis.get(index))
        .collect::<Result<Vec<_>>>()?;

    if let Some((position, column)) = columns
        .iter()
        .enumerate()
        .find(|(_, column)| column.len() != lc.len())
    {
        return Err(PhotometryError::DataShape(format!(
            "basis vector {} has {} cadences, light curve has {}",
            selected[position],
            column.len(),
            lc.len()
        )));
    }

    let flux = lc.flux();
    let rows: Vec<usize> = (0..lc.len())
        .filter(|&i| flux[i].is_finite() && columns.iter().all(|c| c[i].is_finite()))
        .collect();

    let n_params = columns.len() + 1;
    if rows.len() < n_params {
        return Err(PhotometryError::InsufficientData {
            available: rows.len(),
            required: n_params,
        });
    }

    let design = DMatrix::from_fn(rows.len(), n_params, |r, c| match c {
        0 => 1.0,
        _ => columns[c - 1][rows[r]],
    });
    let target = DVector::from_iterator(rows.len(), rows.iter().map(|&i| flux[i].as_f64()));

    let fit = least_squares(&design, &target)?;
    if fit.rank < n_params {
        warn!(
            "Cotrending design is rank deficient ({} of {n_params} columns)",
            fit.rank
        );
    }

    Ok(TrendFit {
        columns,
        fit,
        n_rows: rows.len(),
    })
}
