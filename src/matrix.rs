// matrix.rs

//! # Matrix Module
//!
//! Dense, row-major `f64` matrix used both for the partially observed input
//! and for the two factor matrices. Unknown entries are stored as NaN (see
//! [`MISSING`]); every comparison-bearing operation here treats NaN as
//! "absent" rather than as a number.
//!
//! Rows and columns may carry optional string labels. Labels are pure
//! metadata: no numeric operation requires them.
//!
//! ## Usage:
//! ```rust
//! use factorizer::matrix::{Matrix, ValueSet};
//!
//! let m = Matrix::empty(2, 2)
//!     .with_values(&[ValueSet::new(1.0, 0, 0), ValueSet::new(4.0, 1, 1)])
//!     .unwrap();
//! assert_eq!(m.at(1, 1), 4.0);
//! assert!(m.at(0, 1).is_nan());
//! ```

use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, Uniform};
use tracing::warn;

use crate::error::{FactorizationError, Result};

/// Sentinel for an unknown entry. NaN never compares equal or ordered, so it
/// must be tested with `f64::is_nan`.
pub const MISSING: f64 = f64::NAN;

/// A single `(value, row, col)` write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueSet {
    pub value: f64,
    pub row: usize,
    pub col: usize,
}

impl ValueSet {
    pub fn new(value: f64, row: usize, col: usize) -> Self {
        Self { value, row, col }
    }
}

/// A single `(label, index)` write on one label axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    pub value: String,
    pub index: usize,
}

impl LabelSet {
    pub fn new<S: Into<String>>(value: S, index: usize) -> Self {
        Self {
            value: value.into(),
            index,
        }
    }
}

/// Row and column labels, aligned by index. An axis that was never written
/// holds empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
}

impl Labels {
    fn blank(rows: usize, cols: usize) -> Self {
        Self {
            row_labels: vec![String::new(); rows],
            column_labels: vec![String::new(); cols],
        }
    }
}

//Matrix
#[derive(Debug, Clone)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>, // Flat vector for matrix elements
    labels: Option<Labels>,
}

impl Matrix {
    /// Allocates a `rows x cols` matrix with every cell unknown.
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![MISSING; rows * cols],
            labels: None,
        }
    }

    /// Builds a matrix from a flat row-major buffer.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows * cols != data.len() {
            return Err(FactorizationError::dimension_mismatch(
                format!("{} values", rows * cols),
                format!("{} values", data.len()),
            ));
        }
        Ok(Self {
            rows,
            cols,
            data,
            labels: None,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn labels(&self) -> Option<&Labels> {
        self.labels.as_ref()
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(FactorizationError::IndexOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    /// Writes each triple in order, so a repeated coordinate keeps the last
    /// value. Nothing is written unless every coordinate is in bounds.
    pub fn set_values(&mut self, values: &[ValueSet]) -> Result<()> {
        for value in values {
            self.check_bounds(value.row, value.col)?;
        }
        for value in values {
            self.data[value.row * self.cols + value.col] = value.value;
        }
        Ok(())
    }

    pub fn with_values(mut self, values: &[ValueSet]) -> Result<Self> {
        self.set_values(values)?;
        Ok(self)
    }

    fn labels_mut(&mut self) -> &mut Labels {
        let (rows, cols) = (self.rows, self.cols);
        self.labels.get_or_insert_with(|| Labels::blank(rows, cols))
    }

    pub fn set_row_labels(&mut self, labels: &[LabelSet]) -> Result<()> {
        for label in labels {
            if label.index >= self.rows {
                return Err(FactorizationError::IndexOutOfBounds {
                    row: label.index,
                    col: 0,
                    rows: self.rows,
                    cols: self.cols,
                });
            }
        }
        let target = &mut self.labels_mut().row_labels;
        for label in labels {
            target[label.index] = label.value.clone();
        }
        Ok(())
    }

    pub fn set_column_labels(&mut self, labels: &[LabelSet]) -> Result<()> {
        for label in labels {
            if label.index >= self.cols {
                return Err(FactorizationError::IndexOutOfBounds {
                    row: 0,
                    col: label.index,
                    rows: self.rows,
                    cols: self.cols,
                });
            }
        }
        let target = &mut self.labels_mut().column_labels;
        for label in labels {
            target[label.index] = label.value.clone();
        }
        Ok(())
    }

    pub fn with_row_labels(mut self, labels: &[LabelSet]) -> Result<Self> {
        self.set_row_labels(labels)?;
        Ok(self)
    }

    pub fn with_column_labels(mut self, labels: &[LabelSet]) -> Result<Self> {
        self.set_column_labels(labels)?;
        Ok(self)
    }

    /// Replaces the whole label structure. Lengths must match the dimensions.
    pub fn set_labels(&mut self, labels: Labels) -> Result<()> {
        if labels.row_labels.len() != self.rows || labels.column_labels.len() != self.cols {
            return Err(FactorizationError::dimension_mismatch(
                format!("{} row labels and {} column labels", self.rows, self.cols),
                format!(
                    "{} row labels and {} column labels",
                    labels.row_labels.len(),
                    labels.column_labels.len()
                ),
            ));
        }
        self.labels = Some(labels);
        Ok(())
    }

    // Immutable access to matrix elements, may return the sentinel
    pub fn at(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows || col >= self.cols {
            panic!("Index out of bounds");
        }
        self.data[row * self.cols + col]
    }

    // Mutable access to matrix elements
    pub fn at_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        if row >= self.rows || col >= self.cols {
            panic!("Index out of bounds");
        }
        &mut self.data[row * self.cols + col]
    }

    /// Borrowed view of row `index`. This is not a copy: it aliases the
    /// matrix storage for as long as the borrow lives.
    pub fn row(&self, index: usize) -> &[f64] {
        let start = index * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Column `index`, always materialized as a new vector since columns are
    /// not contiguous in storage.
    pub fn column(&self, index: usize) -> Vec<f64> {
        (0..self.rows)
            .map(|row| self.data[row * self.cols + index])
            .collect()
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |row| self.row(row))
    }

    // Transpose - flip rows and cols, and the label axes with them
    pub fn transpose(&self) -> Self {
        let mut transposed = Matrix::empty(self.cols, self.rows);

        for i in 0..self.rows {
            for j in 0..self.cols {
                transposed.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }

        transposed.labels = self.labels.as_ref().map(|labels| Labels {
            row_labels: labels.column_labels.clone(),
            column_labels: labels.row_labels.clone(),
        });

        transposed
    }

    /// `a x b`. Row labels come from `a`, column labels from `b`.
    pub fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix> {
        if a.cols != b.rows {
            return Err(FactorizationError::dimension_mismatch(
                format!("{} rows in right operand", a.cols),
                format!("{} rows", b.rows),
            ));
        }

        let columns: Vec<Vec<f64>> = (0..b.cols).map(|j| b.column(j)).collect();
        let mut result = Matrix::empty(a.rows, b.cols);
        for i in 0..a.rows {
            for (j, column) in columns.iter().enumerate() {
                result.data[i * b.cols + j] = dot(a.row(i), column)?;
            }
        }

        if a.labels.is_some() || b.labels.is_some() {
            let mut labels = Labels::blank(a.rows, b.cols);
            if let Some(left) = &a.labels {
                labels.row_labels = left.row_labels.clone();
            }
            if let Some(right) = &b.labels {
                labels.column_labels = right.column_labels.clone();
            }
            result.labels = Some(labels);
        }

        Ok(result)
    }

    /// Sum of squared differences over the cells observed in `reference`.
    ///
    /// Despite the name this is a sum, not an average. Unknown reference
    /// cells contribute nothing; a difference that is itself NaN (an unknown
    /// candidate cell) is skipped and logged.
    pub fn mean_squared_error(reference: &Matrix, candidate: &Matrix) -> Result<f64> {
        if reference.rows != candidate.rows || reference.cols != candidate.cols {
            return Err(FactorizationError::dimension_mismatch(
                format!("{}x{}", reference.rows, reference.cols),
                format!("{}x{}", candidate.rows, candidate.cols),
            ));
        }

        let mut sum_error = 0.0;
        for (index, (&known, &estimate)) in reference.data.iter().zip(&candidate.data).enumerate() {
            if known.is_nan() {
                continue;
            }
            let element_error = (known - estimate).powi(2);
            if element_error.is_nan() {
                warn!(
                    row = index / reference.cols,
                    col = index % reference.cols,
                    known,
                    estimate,
                    "NaN squared error, cell skipped"
                );
                continue;
            }
            sum_error += element_error;
        }

        Ok(sum_error)
    }

    /// `(max, min)` over the observed cells, or `None` if nothing is observed.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|value| !value.is_nan())
            .fold(None, |acc, value| match acc {
                None => Some((value, value)),
                Some((max, min)) => Some((max.max(value), min.min(value))),
            })
    }

    pub fn has_missing(&self) -> bool {
        self.data.iter().any(|value| value.is_nan())
    }

    pub fn observed_count(&self) -> usize {
        self.data.iter().filter(|value| !value.is_nan()).count()
    }

    /// Overwrites every cell with a value drawn uniformly from `[min, max)`.
    pub fn fill_random(&mut self, min: f64, max: f64) -> Result<()> {
        let mut rng = rand::thread_rng();
        self.fill_random_with(&mut rng, min, max)
    }

    /// Same as [`Matrix::fill_random`] with a caller supplied generator. A
    /// zero-width range fills the constant.
    pub fn fill_random_with<R: Rng + ?Sized>(&mut self, rng: &mut R, min: f64, max: f64) -> Result<()> {
        if !min.is_finite() || !max.is_finite() || max < min || !(max - min).is_finite() {
            return Err(FactorizationError::InvalidRange { min, max });
        }
        if min == max {
            self.data.iter_mut().for_each(|x| *x = min);
            return Ok(());
        }

        let uniform = Uniform::new(min, max);
        self.data.iter_mut().for_each(|x| *x = uniform.sample(rng));
        Ok(())
    }

    pub fn with_random_values(mut self, min: f64, max: f64) -> Result<Self> {
        self.fill_random(min, max)?;
        Ok(self)
    }

    // Print the matrix in a readable format
    pub fn pretty_print(&self) {
        println!("{}", self);
    }
}

/// Sum of element-wise products. NaN inputs propagate.
pub fn dot(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(FactorizationError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

impl PartialEq for Matrix {
    // NaN cells compare equal to each other here: two unknowns are the same state
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self.labels == other.labels
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .labels
            .as_ref()
            .map(|l| l.row_labels.iter().map(String::len).max().unwrap_or(0))
            .unwrap_or(0);

        if let Some(labels) = &self.labels {
            write!(f, "{:width$} ", "", width = width)?;
            let header: Vec<_> = labels
                .column_labels
                .iter()
                .map(|label| format!("{:>10}", label))
                .collect();
            writeln!(f, " {}", header.join("  "))?;
        }

        for i in 0..self.rows {
            if let Some(labels) = &self.labels {
                write!(f, "{:width$} ", labels.row_labels[i], width = width)?;
            }
            let row: Vec<_> = self
                .row(i)
                .iter()
                .map(|x| if x.is_nan() { format!("{:>10}", "-") } else { format!("{:10.4}", x) })
                .collect();
            writeln!(f, "[{}]", row.join(", "))?;
        }
        Ok(())
    }
}
