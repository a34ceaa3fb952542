// gradient.rs

//! Partial derivatives of the squared reconstruction error.
//!
//! For one observed cell `(i, j)` with known value `k` and prediction
//! `p = row_factors[i] . column_factors[:, j]`, the derivative of `(k - p)^2`
//! with respect to a factor entry is `-2 (k - p) e`, where `e` is the entry
//! it multiplies. The functions here return `2 (k - p) e`, so adding
//! `learning_rate * gradient` to the factor moves it downhill.

use crate::error::{Axis, FactorizationError, Result};
use crate::matrix::{dot, Matrix};

/// Which factor matrix the derivative is taken against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Row,
    Column,
}

/// Gradient contribution of a single cell of the original matrix.
///
/// Reads the factor matrices as they are right now, including updates made
/// earlier in the same phase.
pub fn single_gradient(
    known: &Matrix,
    target: Target,
    feature: usize,
    row_factors: &Matrix,
    row: usize,
    column_factors: &Matrix,
    col: usize,
) -> Result<f64> {
    let known_value = known.at(row, col);

    let row_vector = row_factors.row(row);
    let column_vector = column_factors.column(col);

    let predicted = dot(row_vector, &column_vector)?;

    let element = match target {
        Target::Row => column_vector[feature],
        Target::Column => row_vector[feature],
    };

    Ok(2.0 * (known_value - predicted) * element)
}

/// Average gradient for `row_factors[row][feature]` over the observed cells
/// of `row` in the original matrix.
pub fn row_feature_gradient(
    has_missing: bool,
    feature: usize,
    row: usize,
    known: &Matrix,
    row_factors: &Matrix,
    column_factors: &Matrix,
) -> Result<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for col in 0..known.cols() {
        if has_missing && known.at(row, col).is_nan() {
            continue;
        }

        sum += single_gradient(known, Target::Row, feature, row_factors, row, column_factors, col)?;
        count += 1;
    }

    if count == 0 {
        return Err(FactorizationError::EmptyObservationSet {
            axis: Axis::Row,
            index: row,
        });
    }
    Ok(sum / count as f64)
}

/// Average gradient for `column_factors[feature][col]` over the observed
/// cells of `col` in the original matrix.
pub fn column_feature_gradient(
    has_missing: bool,
    feature: usize,
    col: usize,
    known: &Matrix,
    row_factors: &Matrix,
    column_factors: &Matrix,
) -> Result<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for row in 0..known.rows() {
        if has_missing && known.at(row, col).is_nan() {
            continue;
        }

        sum += single_gradient(known, Target::Column, feature, row_factors, row, column_factors, col)?;
        count += 1;
    }

    if count == 0 {
        return Err(FactorizationError::EmptyObservationSet {
            axis: Axis::Column,
            index: col,
        });
    }
    Ok(sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{ValueSet, MISSING};
    use approx::assert_relative_eq;

    // known = [[5, ?], [?, 1]], row factors all 1, column factors all 1, F = 2
    fn fixture() -> (Matrix, Matrix, Matrix) {
        let known = Matrix::empty(2, 2)
            .with_values(&[ValueSet::new(5.0, 0, 0), ValueSet::new(1.0, 1, 1)])
            .unwrap();
        let row_factors = Matrix::new(2, 2, vec![1.0; 4]).unwrap();
        let column_factors = Matrix::new(2, 2, vec![1.0; 4]).unwrap();
        (known, row_factors, column_factors)
    }

    #[test]
    fn single_gradient_row_target() {
        let known = Matrix::new(1, 1, vec![5.0]).unwrap();
        let row_factors = Matrix::new(1, 2, vec![1.0, 2.0]).unwrap();
        let column_factors = Matrix::new(2, 1, vec![0.5, 1.0]).unwrap();

        // predicted = 0.5 + 2 = 2.5, element = column_factors[1][0] = 1
        let grad = single_gradient(&known, Target::Row, 1, &row_factors, 0, &column_factors, 0).unwrap();
        assert_relative_eq!(grad, 5.0);
    }

    #[test]
    fn single_gradient_column_target() {
        let known = Matrix::new(1, 1, vec![5.0]).unwrap();
        let row_factors = Matrix::new(1, 2, vec![1.0, 2.0]).unwrap();
        let column_factors = Matrix::new(2, 1, vec![0.5, 1.0]).unwrap();

        // element = row_factors[0][1] = 2
        let grad = single_gradient(&known, Target::Column, 1, &row_factors, 0, &column_factors, 0).unwrap();
        assert_relative_eq!(grad, 10.0);
    }

    #[test]
    fn single_gradient_surfaces_length_mismatch() {
        let known = Matrix::new(1, 1, vec![5.0]).unwrap();
        let row_factors = Matrix::new(1, 2, vec![1.0, 2.0]).unwrap();
        let column_factors = Matrix::new(3, 1, vec![1.0, 1.0, 1.0]).unwrap();

        let err = single_gradient(&known, Target::Row, 0, &row_factors, 0, &column_factors, 0).unwrap_err();
        assert!(matches!(err, FactorizationError::LengthMismatch { .. }));
    }

    #[test]
    fn sparse_row_gradient_skips_missing() {
        let (known, row_factors, column_factors) = fixture();
        // only (0,0) observed: 2 * (5 - 2) * 1
        let grad = row_feature_gradient(true, 0, 0, &known, &row_factors, &column_factors).unwrap();
        assert!(grad.is_finite());
        assert_relative_eq!(grad, 6.0);
    }

    #[test]
    fn sparse_column_gradient_skips_missing() {
        let (known, row_factors, column_factors) = fixture();
        // only (1,1) observed: 2 * (1 - 2) * 1
        let grad = column_feature_gradient(true, 1, 1, &known, &row_factors, &column_factors).unwrap();
        assert_relative_eq!(grad, -2.0);
    }

    #[test]
    fn dense_mode_does_not_skip() {
        let (known, row_factors, column_factors) = fixture();
        let grad = row_feature_gradient(false, 0, 0, &known, &row_factors, &column_factors).unwrap();
        assert!(grad.is_nan());
    }

    #[test]
    fn dense_row_gradient_averages() {
        let known = Matrix::new(1, 2, vec![3.0, 1.0]).unwrap();
        let row_factors = Matrix::new(1, 1, vec![1.0]).unwrap();
        let column_factors = Matrix::new(1, 2, vec![1.0, 1.0]).unwrap();

        // (2 * 2 * 1 + 2 * 0 * 1) / 2
        let grad = row_feature_gradient(false, 0, 0, &known, &row_factors, &column_factors).unwrap();
        assert_relative_eq!(grad, 2.0);
    }

    #[test]
    fn unobserved_row_is_an_error() {
        let known = Matrix::empty(2, 2).with_values(&[ValueSet::new(1.0, 0, 0)]).unwrap();
        let row_factors = Matrix::new(2, 1, vec![1.0, 1.0]).unwrap();
        let column_factors = Matrix::new(1, 2, vec![1.0, 1.0]).unwrap();

        let err = row_feature_gradient(true, 0, 1, &known, &row_factors, &column_factors).unwrap_err();
        assert!(matches!(
            err,
            FactorizationError::EmptyObservationSet { axis: Axis::Row, index: 1 }
        ));

        let err = column_feature_gradient(true, 0, 1, &known, &row_factors, &column_factors).unwrap_err();
        assert!(matches!(
            err,
            FactorizationError::EmptyObservationSet { axis: Axis::Column, index: 1 }
        ));
    }

    #[test]
    fn missing_known_value_in_dense_mode_propagates_nan() {
        let known = Matrix::new(1, 1, vec![MISSING]).unwrap();
        let factors = Matrix::new(1, 1, vec![1.0]).unwrap();
        let grad = single_gradient(&known, Target::Row, 0, &factors, 0, &factors, 0).unwrap();
        assert!(grad.is_nan());
    }
}
