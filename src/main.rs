use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use factorizer::config::Config;
use factorizer::csv_plot;
use factorizer::data_loader::loader_for;
use factorizer::model::Factorization;
use factorizer::training_logs::{CsvTrainingLog, ErrorHistory, LogObserver, Observers, ProgressObserver};
use factorizer::FactorizationError;

static DATA_PATH: &str = "./data/{1}/{2}";

/// Factor a partially observed matrix and print the filled-in approximation.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Project directory under ./data holding config.json
    #[arg(default_value = "ratings")]
    project: String,

    /// Explicit config path, overrides the project lookup
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    iterations: Option<usize>,

    #[arg(long)]
    features: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Print the factor matrices after training
    #[arg(long)]
    show_factors: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_location = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DATA_PATH.replace("{1}", &cli.project).replace("{2}", "config.json")));

    let mut config = match Config::from_json(&config_location) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading config {}: {}", config_location.display(), e);
            return ExitCode::FAILURE;
        }
    };
    config.override_parameters(cli.iterations, cli.features, cli.learning_rate);
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    match run(&config, cli.show_factors) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, show_factors: bool) -> Result<(), FactorizationError> {
    let loader = loader_for(config);
    let mut factorization = Factorization::from_config(config, loader.as_ref())?;
    factorization.print_config();

    let mut history = ErrorHistory::new();
    let mut log_observer = LogObserver;
    let mut csv_log = config.log_location.as_ref().map(CsvTrainingLog::open).transpose()?;
    let mut progress = if config.show_progress {
        Some(ProgressObserver::new(factorization.iterations())?)
    } else {
        None
    };

    let summary = {
        let mut observers = Observers::new();
        observers.push(&mut history);
        observers.push(&mut log_observer);
        if let Some(csv_log) = csv_log.as_mut() {
            observers.push(csv_log);
        }
        if let Some(progress) = progress.as_mut() {
            observers.push(progress);
        }
        factorization.train_with(&mut observers)?
    };

    info!(
        "Training completed in {:.2?} (hh:mm:ss.milliseconds), squared error {:.4}",
        summary.elapsed, summary.final_error
    );

    if let Some(location) = &config.plot_location {
        csv_plot::plot_error_curve(&history.checkpoints, location)?;
        info!("error curve written to {}", location);
    }

    if show_factors {
        println!("Row factors:\n{}", factorization.row_factors());
        println!("Column factors:\n{}", factorization.column_factors());
    }
    println!("Original:\n{}", factorization.original());
    println!("Approximation:\n{}", factorization.approximation()?);
    Ok(())
}
