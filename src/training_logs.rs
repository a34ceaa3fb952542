// training_logs.rs

//! Telemetry hooks for the training loop.
//!
//! The engine calls a [`TrainingObserver`] at phase, checkpoint and
//! completion boundaries. Nothing here influences the numbers; observers only
//! look at the factor matrices and the error.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::error::{FactorizationError, Result};
use crate::matrix::Matrix;

/// What a finished training run reports.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub final_error: f64,
    pub elapsed: Duration,
}

/// Hooks invoked by `Factorization::train_with`. Every hook defaults to a
/// no-op; an error returned from a hook stops training.
pub trait TrainingObserver {
    fn on_row_phase(&mut self, _epoch: usize, _row_factors: &Matrix) -> Result<()> {
        Ok(())
    }

    fn on_column_phase(&mut self, _epoch: usize, _column_factors: &Matrix) -> Result<()> {
        Ok(())
    }

    fn on_checkpoint(&mut self, _epoch: usize, _error: f64) -> Result<()> {
        Ok(())
    }

    fn on_complete(&mut self, _summary: &TrainingSummary) -> Result<()> {
        Ok(())
    }
}

pub struct NoopObserver;

impl TrainingObserver for NoopObserver {}

/// Emits phase and checkpoint events through `tracing`.
pub struct LogObserver;

impl TrainingObserver for LogObserver {
    fn on_row_phase(&mut self, epoch: usize, row_factors: &Matrix) -> Result<()> {
        debug!(epoch, factors = ?row_factors.rows_iter().collect::<Vec<_>>(), "row phase done");
        Ok(())
    }

    fn on_column_phase(&mut self, epoch: usize, column_factors: &Matrix) -> Result<()> {
        debug!(epoch, factors = ?column_factors.rows_iter().collect::<Vec<_>>(), "column phase done");
        Ok(())
    }

    fn on_checkpoint(&mut self, epoch: usize, error: f64) -> Result<()> {
        info!(epoch, error, "checkpoint");
        Ok(())
    }

    fn on_complete(&mut self, summary: &TrainingSummary) -> Result<()> {
        info!(
            epochs = summary.epochs,
            error = summary.final_error,
            "training completed in {:.2?}",
            summary.elapsed
        );
        Ok(())
    }
}

/// Keeps every checkpoint error, in order.
#[derive(Debug, Default, Clone)]
pub struct ErrorHistory {
    pub checkpoints: Vec<(usize, f64)>,
}

impl ErrorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.checkpoints.iter().map(|&(_, error)| error).collect()
    }

    pub fn last(&self) -> Option<f64> {
        self.checkpoints.last().map(|&(_, error)| error)
    }
}

impl TrainingObserver for ErrorHistory {
    fn on_checkpoint(&mut self, epoch: usize, error: f64) -> Result<()> {
        self.checkpoints.push((epoch, error));
        Ok(())
    }
}

/// Appends `epoch,error` rows to a CSV file. The header is written only when
/// the file is new or empty.
pub struct CsvTrainingLog {
    location: PathBuf,
    writer: csv::Writer<std::fs::File>,
}

impl CsvTrainingLog {
    pub fn open<P: AsRef<Path>>(location: P) -> Result<Self> {
        let location = location.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&location)
            .map_err(|e| FactorizationError::telemetry(format!("{}: {}", location.display(), e)))?;
        let needs_header = file
            .metadata()
            .map(|meta| meta.len() == 0)
            .map_err(FactorizationError::telemetry)?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer
                .write_record(["epoch", "error"])
                .map_err(FactorizationError::telemetry)?;
        }

        Ok(Self { location, writer })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl TrainingObserver for CsvTrainingLog {
    fn on_checkpoint(&mut self, epoch: usize, error: f64) -> Result<()> {
        self.writer
            .write_record(&[epoch.to_string(), error.to_string()])
            .map_err(FactorizationError::telemetry)
    }

    fn on_complete(&mut self, _summary: &TrainingSummary) -> Result<()> {
        self.writer.flush().map_err(FactorizationError::telemetry)
    }
}

/// Progress bar over epochs.
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new(epochs: usize) -> Result<Self> {
        let bar = ProgressBar::new(epochs as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .map_err(FactorizationError::telemetry)?
            .progress_chars("#>-");
        bar.set_style(style);
        Ok(Self { bar })
    }
}

impl TrainingObserver for ProgressObserver {
    fn on_column_phase(&mut self, _epoch: usize, _column_factors: &Matrix) -> Result<()> {
        self.bar.inc(1);
        Ok(())
    }

    fn on_checkpoint(&mut self, _epoch: usize, error: f64) -> Result<()> {
        self.bar.set_message(format!("error {:.4}", error));
        Ok(())
    }

    fn on_complete(&mut self, _summary: &TrainingSummary) -> Result<()> {
        self.bar.finish();
        Ok(())
    }
}

/// Fans every hook out to several observers, in order.
#[derive(Default)]
pub struct Observers<'a> {
    observers: Vec<&'a mut dyn TrainingObserver>,
}

impl<'a> Observers<'a> {
    pub fn new() -> Self {
        Self { observers: Vec::new() }
    }

    pub fn push(&mut self, observer: &'a mut dyn TrainingObserver) {
        self.observers.push(observer);
    }
}

impl TrainingObserver for Observers<'_> {
    fn on_row_phase(&mut self, epoch: usize, row_factors: &Matrix) -> Result<()> {
        self.observers
            .iter_mut()
            .try_for_each(|observer| observer.on_row_phase(epoch, row_factors))
    }

    fn on_column_phase(&mut self, epoch: usize, column_factors: &Matrix) -> Result<()> {
        self.observers
            .iter_mut()
            .try_for_each(|observer| observer.on_column_phase(epoch, column_factors))
    }

    fn on_checkpoint(&mut self, epoch: usize, error: f64) -> Result<()> {
        self.observers
            .iter_mut()
            .try_for_each(|observer| observer.on_checkpoint(epoch, error))
    }

    fn on_complete(&mut self, summary: &TrainingSummary) -> Result<()> {
        self.observers
            .iter_mut()
            .try_for_each(|observer| observer.on_complete(summary))
    }
}
