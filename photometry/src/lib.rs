//! photometry - Reduction of target pixel files to cotrended light curves
//!
//! The crate takes per-cadence pixel data for one target and turns it into
//! a systematics-corrected brightness time series:
//!
//! - **Quality flags** - decoding and preset masks over per-cadence bits
//! - **Target pixel files** - quality filtering of a pixel data source
//! - **Apertures** - summing selected pixels with quadrature errors
//! - **Light curves** - immutable time series and their transformations
//! - **Cotrending** - least squares removal of basis-vector trends
//! - **Pixel level decorrelation** - regression on per-pixel flux fractions
//!
//! # Example
//!
//! ```
//! use photometry::{reduce, PipelineConfig, SyntheticSourceBuilder};
//!
//! let builder = SyntheticSourceBuilder::new()
//!     .n_cadences(200)
//!     .trend_coefficients(vec![4000.0]);
//! let source = builder.build().unwrap();
//! let basis = builder.basis_vectors(2).unwrap();
//!
//! let output = reduce(&source, &basis, &PipelineConfig::default()).unwrap();
//! assert_eq!(output.cotrend.corrected.len(), output.uncorrected.len());
//! ```

pub mod aperture;
pub mod config;
pub mod cotrend;
pub mod error;
pub mod lightcurve;
pub mod pipeline;
pub mod pld;
pub mod quality;
pub mod source;
pub mod synthetic;
pub mod tpf;

pub use aperture::{aggregate, circular_aperture, threshold_aperture, ApertureAggregator};
pub use config::PipelineConfig;
pub use cotrend::{
    select_basis_count, BasisVectorSet, CotrendMode, CotrendResult, CotrendingEngine,
};
pub use error::{PhotometryError, Result};
pub use lightcurve::{BinMethod, LightCurve};
pub use pipeline::{reduce, PipelineOutput};
pub use pld::PldCorrector;
pub use quality::{
    QualityBitmask, QualityFlag, QualityFlagRegistry, QualityPreset, RegistryDefinition,
    KEPLER_QUALITY_FLAGS,
};
pub use source::{FluxFloat, InMemoryPixelSource, PixelDataSource};
pub use synthetic::{synthetic_basis_vectors, SyntheticSourceBuilder};
pub use tpf::TargetPixelFile;
