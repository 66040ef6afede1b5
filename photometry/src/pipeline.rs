//! End-to-end reduction of a pixel source to a cotrended light curve.

use log::info;
use num_traits::Float;

use crate::config::PipelineConfig;
use crate::cotrend::{BasisVectorSet, CotrendResult, CotrendingEngine};
use crate::error::{PhotometryError, Result};
use crate::lightcurve::LightCurve;
use crate::source::PixelDataSource;
use crate::tpf::TargetPixelFile;

/// Everything produced by [`reduce`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput<T> {
    /// Resolved quality bitmask
    pub bitmask: u32,
    /// Cadences kept by the quality bitmask
    pub n_kept_cadences: usize,
    /// Cadences with finite flux removed by sigma clipping
    pub n_outliers: usize,
    /// Cadences removed by sigma clipping because their flux is NaN
    pub n_nan_flux: usize,
    /// Light curve as fitted, after clipping and normalization
    pub uncorrected: LightCurve<T>,
    pub cotrend: CotrendResult<T>,
}

/// Quality-filter, extract, clean and cotrend `source`.
///
/// `basis` must be aligned to the source's full cadence grid; it is
/// narrowed with the same cadences as the light curve before fitting.
pub fn reduce<S: PixelDataSource>(
    source: &S,
    basis: &BasisVectorSet,
    config: &PipelineConfig,
) -> Result<PipelineOutput<S::Flux>> {
    config.validate()?;

    let n_source = source.time().len();
    if let Some(n_basis) = basis.n_cadences() {
        if n_basis != n_source {
            return Err(PhotometryError::DataShape(format!(
                "basis vectors have {n_basis} cadences, source has {n_source}"
            )));
        }
    }

    let tpf = TargetPixelFile::new(source, config.quality_bitmask)?;
    let (mut lc, mut cadences) = tpf.lightcurve_with_indices(tpf.aperture_mask())?;
    info!(
        "Quality bitmask {} ({}) kept {} of {n_source} cadences, {} with valid time",
        config.quality_bitmask,
        tpf.bitmask(),
        tpf.n_cadences(),
        lc.len()
    );

    let mut n_outliers = 0;
    let mut n_nan_flux = 0;
    if let Some(sigma) = config.outlier_sigma {
        let (clean, outliers) = lc.remove_outliers(sigma)?;
        for (&flux, _) in lc.flux().iter().zip(&outliers).filter(|(_, o)| **o) {
            if flux.is_nan() {
                n_nan_flux += 1;
            } else {
                n_outliers += 1;
            }
        }
        cadences = cadences
            .iter()
            .zip(&outliers)
            .filter(|(_, outlier)| !**outlier)
            .map(|(&cadence, _)| cadence)
            .collect();
        info!("Removed {n_outliers} outliers at {sigma} sigma and {n_nan_flux} NaN cadences");
        lc = clean;
    }

    if config.normalize {
        lc = lc.normalize()?;
    }

    let aligned = basis.select_cadences(&cadences)?;
    let cotrend =
        CotrendingEngine::new(config.cotrend_mode).cotrend(&lc, &aligned, &config.cbvs)?;
    info!(
        "Cotrended with basis vectors {:?}: coefficients {:?}",
        config.cbvs, cotrend.coefficients
    );

    Ok(PipelineOutput {
        bitmask: tpf.bitmask(),
        n_kept_cadences: tpf.n_cadences(),
        n_outliers,
        n_nan_flux,
        uncorrected: lc,
        cotrend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityBitmask;
    use crate::source::InMemoryPixelSource;
    use crate::synthetic::SyntheticSourceBuilder;
    use ndarray::{Array1, Array2, Array3};
    use approx::assert_relative_eq;
    use curve_math::std_dev;

    fn scatter(lc: &LightCurve<f32>) -> f64 {
        let values: Vec<f64> = lc.flux().iter().map(|&v| v as f64).collect();
        std_dev(&values).unwrap()
    }

    #[test]
    fn test_reduce_removes_injected_trend() {
        let builder = SyntheticSourceBuilder::new()
            .n_cadences(300)
            .trend_coefficients(vec![20_000.0, -8_000.0]);
        let source = builder.build().unwrap();
        let basis = builder.basis_vectors(2).unwrap();

        let output = reduce(&source, &basis, &PipelineConfig::default()).unwrap();

        let expected_kept = source
            .quality()
            .iter()
            .filter(|&&q| q & output.bitmask == 0)
            .count();
        assert_eq!(output.bitmask, 1_114_287);
        assert_eq!(output.n_kept_cadences, expected_kept);
        assert_eq!(output.cotrend.corrected.len(), output.uncorrected.len());
        assert!(scatter(&output.cotrend.corrected) < 0.2 * scatter(&output.uncorrected));
        // The aperture catches most of the star, so the fitted coefficient
        // has the injected sign and most of its size
        assert!(output.cotrend.coefficients[0] > 10_000.0);
        assert!(output.cotrend.coefficients[1] < -4_000.0);
    }

    #[test]
    fn test_reduce_with_clipping_and_normalization() {
        let builder = SyntheticSourceBuilder::new()
            .n_cadences(200)
            .trend_coefficients(vec![5_000.0]);
        let source = builder.build().unwrap();
        let basis = builder.basis_vectors(1).unwrap();
        let config = PipelineConfig {
            quality_bitmask: QualityBitmask::None,
            cbvs: vec![1],
            outlier_sigma: Some(5.0),
            normalize: true,
            ..Default::default()
        };

        let output = reduce(&source, &basis, &config).unwrap();

        assert_eq!(output.bitmask, 0);
        assert_eq!(output.n_kept_cadences, 200);
        let median = curve_math::median(
            &output.uncorrected.flux().iter().map(|&v| v as f64).collect::<Vec<_>>(),
        )
        .unwrap();
        assert_relative_eq!(median, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_nan_flux_is_not_counted_as_outlier() {
        let n = 12;
        let mut flux = Array3::<f64>::from_elem((n, 1, 1), 100.0);
        for (i, v) in flux.iter_mut().enumerate() {
            *v += (i % 3) as f64 * 0.1;
        }
        flux[[7, 0, 0]] = f64::NAN;
        let source = InMemoryPixelSource::new(
            Array1::from_iter((0..n).map(|i| i as f64)),
            Array1::zeros(n),
            flux,
            Array3::from_elem((n, 1, 1), 0.1),
            Array2::from_elem((1, 1), true),
        );
        let config = PipelineConfig {
            quality_bitmask: QualityBitmask::None,
            cbvs: vec![],
            outlier_sigma: Some(5.0),
            normalize: false,
            ..Default::default()
        };

        let output = reduce(&source, &BasisVectorSet::new(), &config).unwrap();

        assert_eq!(output.n_outliers, 0);
        assert_eq!(output.n_nan_flux, 1);
        assert_eq!(output.uncorrected.len(), n - 1);
        assert!(output.cotrend.corrected.flux().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_reduce_rejects_misaligned_basis() {
        let builder = SyntheticSourceBuilder::new().n_cadences(100);
        let source = builder.build().unwrap();
        let basis = crate::synthetic::synthetic_basis_vectors(99, 2).unwrap();

        assert!(matches!(
            reduce(&source, &basis, &PipelineConfig::default()),
            Err(PhotometryError::DataShape(_))
        ));
    }

    #[test]
    fn test_reduce_rejects_invalid_config() {
        let builder = SyntheticSourceBuilder::new().n_cadences(50);
        let source = builder.build().unwrap();
        let basis = builder.basis_vectors(2).unwrap();
        let config = PipelineConfig {
            cbvs: vec![0],
            ..Default::default()
        };

        assert!(matches!(
            reduce(&source, &basis, &config),
            Err(PhotometryError::InvalidArgument(_))
        ));
    }
}
