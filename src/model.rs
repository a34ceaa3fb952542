// module Model

//! The factorization engine.
//!
//! An `R x C` original matrix is approximated by `row_factors (R x F)` times
//! `column_factors (F x C)`. Training is coordinate descent: every factor
//! entry is updated in place, one at a time, and each update is visible to
//! the gradients computed after it in the same phase.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::Config;
use crate::data_loader::MatrixLoader;
use crate::error::{FactorizationError, Result};
use crate::gradient::{column_feature_gradient, row_feature_gradient};
use crate::matrix::{dot, Labels, Matrix};
use crate::training_logs::{NoopObserver, TrainingObserver, TrainingSummary};

#[derive(Debug)]
pub struct Factorization {
    original: Matrix,
    row_factors: Matrix,
    column_factors: Matrix,
    features: usize,
    learning_rate: f64,
    iterations: usize,
    checkpoint_interval: usize,
    has_missing: bool,
}

impl Factorization {
    /// Builds the engine with factor matrices drawn from the thread RNG.
    pub fn new(original: Matrix, features: usize, learning_rate: f64, iterations: usize) -> Result<Self> {
        let mut rng = rand::thread_rng();
        Self::with_rng(original, features, learning_rate, iterations, &mut rng)
    }

    /// Builds the engine with factor matrices drawn from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(
        original: Matrix,
        features: usize,
        learning_rate: f64,
        iterations: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if features == 0 {
            return Err(FactorizationError::invalid_parameter("features must be greater than 0"));
        }
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(FactorizationError::invalid_parameter(format!(
                "learning rate must be a positive number, got {}",
                learning_rate
            )));
        }
        if original.is_empty() {
            return Err(FactorizationError::invalid_parameter("original matrix has no cells"));
        }

        let has_missing = original.has_missing();
        let (max, min) = original
            .min_max()
            .ok_or_else(|| FactorizationError::invalid_parameter("original matrix has no observed values"))?;

        let mut row_factors = Matrix::empty(original.rows(), features);
        row_factors.fill_random_with(rng, min, max)?;
        let mut column_factors = Matrix::empty(features, original.cols());
        column_factors.fill_random_with(rng, min, max)?;

        if let Some(labels) = original.labels() {
            let feature_labels: Vec<String> = (0..features).map(|index| format!("Feature-{}", index)).collect();

            row_factors.set_labels(Labels {
                row_labels: labels.row_labels.clone(),
                column_labels: feature_labels.clone(),
            })?;
            column_factors.set_labels(Labels {
                row_labels: feature_labels,
                column_labels: labels.column_labels.clone(),
            })?;
        }

        debug!(
            rows = original.rows(),
            cols = original.cols(),
            features,
            has_missing,
            min,
            max,
            "factor matrices initialized"
        );

        Ok(Self {
            original,
            row_factors,
            column_factors,
            features,
            learning_rate,
            iterations,
            checkpoint_interval: 1,
            has_missing,
        })
    }

    /// Loads the original matrix first, then asks the loader for parameters.
    pub fn from_loader<L: MatrixLoader + ?Sized>(loader: &L) -> Result<Self> {
        let original = loader.load()?;
        let parameters = loader.parameters();
        Self::new(original, parameters.features, parameters.learning_rate, parameters.iterations)
    }

    /// Same as [`Factorization::from_loader`], taking the checkpoint interval
    /// and seed from `config`.
    pub fn from_config<L: MatrixLoader + ?Sized>(config: &Config, loader: &L) -> Result<Self> {
        let original = loader.load()?;
        let parameters = loader.parameters();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let factorization = Self::with_rng(
            original,
            parameters.features,
            parameters.learning_rate,
            parameters.iterations,
            &mut rng,
        )?;
        Ok(factorization.with_checkpoint_interval(config.checkpoint_interval))
    }

    /// How many epochs pass between error evaluations. Zero is treated as 1.
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn original(&self) -> &Matrix {
        &self.original
    }

    pub fn row_factors(&self) -> &Matrix {
        &self.row_factors
    }

    pub fn column_factors(&self) -> &Matrix {
        &self.column_factors
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }

    pub fn has_missing(&self) -> bool {
        self.has_missing
    }

    // Row phase: rows outer, features inner, each update visible to the next gradient
    fn update_row_features(&mut self) -> Result<()> {
        for row in 0..self.row_factors.rows() {
            for feature in 0..self.features {
                let grad = row_feature_gradient(
                    self.has_missing,
                    feature,
                    row,
                    &self.original,
                    &self.row_factors,
                    &self.column_factors,
                )?;

                *self.row_factors.at_mut(row, feature) += self.learning_rate * grad;
            }
        }
        Ok(())
    }

    // Column phase: features outer, columns inner, against the row factors from the row phase
    fn update_column_features(&mut self) -> Result<()> {
        for feature in 0..self.features {
            for col in 0..self.column_factors.cols() {
                let grad = column_feature_gradient(
                    self.has_missing,
                    feature,
                    col,
                    &self.original,
                    &self.row_factors,
                    &self.column_factors,
                )?;

                *self.column_factors.at_mut(feature, col) += self.learning_rate * grad;
            }
        }
        Ok(())
    }

    /// Runs every epoch without telemetry.
    pub fn train(&mut self) -> Result<TrainingSummary> {
        self.train_with(&mut NoopObserver)
    }

    /// Runs exactly `iterations` epochs. The first failure stops the loop and
    /// is returned as is; updates already applied are kept.
    pub fn train_with(&mut self, observer: &mut dyn TrainingObserver) -> Result<TrainingSummary> {
        // Track training time
        let start_time = Instant::now();
        info!(
            iterations = self.iterations,
            features = self.features,
            learning_rate = self.learning_rate,
            sparse = self.has_missing,
            "training started"
        );

        for epoch in 0..self.iterations {
            self.update_row_features()?;
            observer.on_row_phase(epoch, &self.row_factors)?;

            self.update_column_features()?;
            observer.on_column_phase(epoch, &self.column_factors)?;

            if epoch % self.checkpoint_interval == 0 || epoch + 1 == self.iterations {
                let error = self.mean_squared_error()?;
                debug!(epoch, error, "checkpoint error");
                observer.on_checkpoint(epoch, error)?;
            }
        }

        let summary = TrainingSummary {
            epochs: self.iterations,
            final_error: self.mean_squared_error()?,
            elapsed: start_time.elapsed(),
        };
        observer.on_complete(&summary)?;
        Ok(summary)
    }

    /// Current product of the two factor matrices.
    pub fn approximation(&self) -> Result<Matrix> {
        Matrix::multiply(&self.row_factors, &self.column_factors)
    }

    /// Squared error of the current approximation over the observed cells.
    /// Like [`Matrix::mean_squared_error`] this is a sum.
    pub fn mean_squared_error(&self) -> Result<f64> {
        let approximation = self.approximation()?;
        Matrix::mean_squared_error(&self.original, &approximation)
    }

    /// Estimated value for a single cell, observed or not.
    pub fn predict(&self, row: usize, col: usize) -> Result<f64> {
        if row >= self.original.rows() || col >= self.original.cols() {
            return Err(FactorizationError::IndexOutOfBounds {
                row,
                col,
                rows: self.original.rows(),
                cols: self.original.cols(),
            });
        }
        dot(self.row_factors.row(row), &self.column_factors.column(col))
    }

    pub fn print_config(&self) {
        println!("Factorization Configuration:");
        println!("  Iterations: {}", self.iterations);
        println!("  Features: {}", self.features);
        println!("  Learning Rate: {:.5}", self.learning_rate);
        println!("  Checkpoint Interval: {}", self.checkpoint_interval);
        println!(
            "  Original Matrix: {} rows x {} cols ({} observed)",
            self.original.rows(),
            self.original.cols(),
            self.original.observed_count()
        );
        if self.has_missing {
            println!("  Sparse: unknown entries are skipped");
        }
        println!(
            "  Row Factors: {} rows x {} cols",
            self.row_factors.rows(),
            self.row_factors.cols()
        );
        println!(
            "  Column Factors: {} rows x {} cols",
            self.column_factors.rows(),
            self.column_factors.cols()
        );
    }
}
