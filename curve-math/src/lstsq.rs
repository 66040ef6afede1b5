//! Linear least squares using nalgebra
//!
//! Solves overdetermined linear systems with a single SVD decomposition.
//! Singular values below a relative cutoff are treated as zero, so
//! rank-deficient designs (for example an all-zero column) yield the
//! minimum-norm solution instead of an error.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Errors that can occur while solving a least squares problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("underdetermined system: {rows} equations for {cols} unknowns")]
    Underdetermined { rows: usize, cols: usize },

    #[error("design has {design_rows} rows but target has {target_rows}")]
    DimensionMismatch {
        design_rows: usize,
        target_rows: usize,
    },

    #[error("design matrix contains non-finite values")]
    NonFinite,

    #[error("SVD solve failed: {0}")]
    SvdFailed(&'static str),
}

/// Result of a linear least squares fit
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresFit {
    /// Fitted coefficients, one per design column
    pub coefficients: Vec<f64>,

    /// Sum of squared residuals at the solution
    pub residual_sum_of_squares: f64,

    /// Numerical rank of the design matrix
    pub rank: usize,
}

/// Relative singular value cutoff, matching the usual `max(m, n) * eps` rule.
fn singular_value_cutoff(rows: usize, cols: usize, largest: f64) -> f64 {
    rows.max(cols) as f64 * f64::EPSILON * largest
}

/// Solve `design * x ≈ target` in the least squares sense.
///
/// # Arguments
/// * `design` - Design matrix, one row per observation
/// * `target` - Observed values
///
/// # Returns
/// * `Ok(LeastSquaresFit)` - Coefficients, residual sum of squares and rank
/// * `Err(FitError)` - If the system is underdetermined or malformed
pub fn least_squares(
    design: &DMatrix<f64>,
    target: &DVector<f64>,
) -> Result<LeastSquaresFit, FitError> {
    let (rows, cols) = design.shape();

    if target.len() != rows {
        return Err(FitError::DimensionMismatch {
            design_rows: rows,
            target_rows: target.len(),
        });
    }
    if rows < cols || cols == 0 {
        return Err(FitError::Underdetermined { rows, cols });
    }
    if design.iter().chain(target.iter()).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let svd = design.clone().svd(true, true);
    let largest = svd.singular_values.max();
    let eps = singular_value_cutoff(rows, cols, largest);
    let rank = svd.rank(eps);

    if rank < cols {
        log::debug!("rank-deficient design: rank {rank} of {cols} columns");
    }

    let solution = svd.solve(target, eps).map_err(FitError::SvdFailed)?;
    let residuals = target - design * &solution;

    Ok(LeastSquaresFit {
        coefficients: solution.iter().copied().collect(),
        residual_sum_of_squares: residuals.norm_squared(),
        rank,
    })
}

/// Compute the Moore-Penrose pseudo-inverse of a matrix.
///
/// Uses the same singular value cutoff as [`least_squares`].
pub fn pseudo_inverse(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, FitError> {
    let (rows, cols) = matrix.shape();
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let svd = matrix.clone().svd(true, true);
    let eps = singular_value_cutoff(rows, cols, svd.singular_values.max());
    svd.pseudo_inverse(eps).map_err(FitError::SvdFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_line_fit() {
        // y = 2 + 3x
        let design = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let target = DVector::from_vec(vec![2.0, 5.0, 8.0, 11.0]);

        let fit = least_squares(&design, &target).unwrap();

        assert_relative_eq!(fit.coefficients[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(fit.coefficients[1], 3.0, epsilon = 1e-10);
        assert!(fit.residual_sum_of_squares < 1e-20);
        assert_eq!(fit.rank, 2);
    }

    #[test]
    fn test_noisy_fit_minimizes_residual() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(i, x)| 1.0 + 0.5 * x + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();

        let design = DMatrix::from_fn(xs.len(), 2, |r, c| if c == 0 { 1.0 } else { xs[r] });
        let target = DVector::from_vec(ys);
        let fit = least_squares(&design, &target).unwrap();

        // Perturbing the solution must not reduce the residual
        for delta in [-1e-3, 1e-3] {
            let perturbed = DVector::from_vec(vec![
                fit.coefficients[0] + delta,
                fit.coefficients[1],
            ]);
            let rss = (&target - &design * perturbed).norm_squared();
            assert!(rss >= fit.residual_sum_of_squares);
        }
    }

    #[test]
    fn test_zero_column_gets_zero_coefficient() {
        let design = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let target = DVector::from_vec(vec![1.0, 2.0, 3.0]);

        let fit = least_squares(&design, &target).unwrap();

        assert_eq!(fit.rank, 1);
        assert_relative_eq!(fit.coefficients[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.coefficients[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_underdetermined_rejected() {
        let design = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let target = DVector::from_vec(vec![1.0]);

        assert_eq!(
            least_squares(&design, &target),
            Err(FitError::Underdetermined { rows: 1, cols: 2 })
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let design = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let target = DVector::from_vec(vec![1.0, 2.0, 3.0]);

        assert!(matches!(
            least_squares(&design, &target),
            Err(FitError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let design = DMatrix::from_row_slice(2, 1, &[1.0, f64::NAN]);
        let target = DVector::from_vec(vec![1.0, 2.0]);

        assert_eq!(least_squares(&design, &target), Err(FitError::NonFinite));
    }

    #[test]
    fn test_repeated_solve_is_bit_identical() {
        let design = DMatrix::from_fn(50, 3, |r, c| ((r * (c + 1)) as f64).sin());
        let target = DVector::from_fn(50, |r, _| (r as f64 * 0.3).cos());

        let a = least_squares(&design, &target).unwrap();
        let b = least_squares(&design, &target).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_pseudo_inverse_of_invertible_matrix() {
        let matrix = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let pinv = pseudo_inverse(&matrix).unwrap();

        assert_relative_eq!(pinv[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(pinv[(1, 1)], 0.25, epsilon = 1e-12);
        assert_relative_eq!(pinv[(0, 1)], 0.0, epsilon = 1e-12);
    }
}
