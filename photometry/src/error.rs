use curve_math::{FitError, SavgolError};
use thiserror::Error;

/// Errors produced while reducing pixel data into light curves.
///
/// Every variant describes malformed input; none are transient, and no
/// operation returns a partial result alongside one of them.
#[derive(Error, Debug)]
pub enum PhotometryError {
    /// A quality preset name that the registry does not define.
    #[error("unknown quality preset '{name}' (expected one of: {known})")]
    UnknownPreset {
        /// The name that was requested.
        name: String,
        /// Comma-separated list of accepted names.
        known: String,
    },

    /// Arrays supplied together have inconsistent lengths or shapes.
    #[error("inconsistent data shape: {0}")]
    DataShape(String),

    /// The aperture mask selects no pixels.
    #[error("aperture selects no pixels")]
    EmptyAperture,

    /// Too few usable cadences to constrain the requested fit.
    #[error("insufficient data: {available} usable cadences, at least {required} required")]
    InsufficientData {
        /// Cadences available to the fit.
        available: usize,
        /// Minimum cadences the fit needs.
        required: usize,
    },

    /// A 1-indexed basis vector selection outside the available set.
    #[error("basis vector index {index} out of range (1..={available})")]
    IndexOutOfRange {
        /// The offending 1-indexed selection.
        index: usize,
        /// Number of basis vectors available.
        available: usize,
    },

    /// A quality flag registry definition that violates its invariants.
    #[error("invalid quality flag registry: {0}")]
    InvalidRegistry(String),

    /// A parameter outside the domain of a light-curve transformation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Linear least squares failure.
    #[error("fit failed: {0}")]
    Fit(#[from] FitError),

    /// Savitzky-Golay filter misconfiguration.
    #[error("smoothing failed: {0}")]
    Savgol(#[from] SavgolError),

    /// Configuration file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for photometry operations.
pub type Result<T> = std::result::Result<T, PhotometryError>;
