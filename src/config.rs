use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use serde_json::from_reader;
use tracing::warn;

use crate::data_loader::{JsonLoaderParser, Parameters};
use crate::error::ConfigError;

/// Where the original matrix comes from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Csv,
    Json,
}

/// How repeated JSON events for one cell are turned into a value.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Number of matching events.
    #[default]
    Sum,
    /// Number of matching events divided by the row's total.
    Normalize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct JsonConfig {
    #[serde(default)]
    pub parsers: Vec<JsonLoaderParser>,
    #[serde(default)]
    pub aggregation: Aggregation,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data_source: DataSource,
    pub location: String,

    #[serde(default = "default_iterations")]
    pub iterations: usize,

    #[serde(default = "default_features")]
    pub features: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_check_points")]
    pub check_points: usize,

    #[serde(skip)]
    pub checkpoint_interval: usize, // Set from iterations and check_points

    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub log_location: Option<String>,

    #[serde(default)]
    pub plot_location: Option<String>,

    #[serde(default = "default_show_progress")]
    pub show_progress: bool,

    //only read when data_source is json
    #[serde(default)]
    pub json: Option<JsonConfig>,
}

fn default_iterations() -> usize {
    Parameters::default().iterations
}

fn default_features() -> usize {
    Parameters::default().features
}

fn default_learning_rate() -> f64 {
    Parameters::default().learning_rate
}

fn default_check_points() -> usize {
    10
}

fn default_show_progress() -> bool {
    true
}

impl Config {
    // get config from the json file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Config = from_reader(reader)?;
        config.finalize()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.finalize()
    }

    fn finalize(mut self) -> Result<Self, ConfigError> {
        if self.features == 0 {
            return Err(ConfigError::Invalid("features must be greater than 0".to_string()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.data_source == DataSource::Json && self.json.as_ref().map_or(true, |j| j.parsers.is_empty()) {
            return Err(ConfigError::Invalid("json data source needs at least one parser".to_string()));
        }

        self.checkpoint_interval = Config::checkpoint_interval(self.iterations, self.check_points);
        Ok(self)
    }

    pub fn parameters(&self) -> Parameters {
        Parameters {
            iterations: self.iterations,
            features: self.features,
            learning_rate: self.learning_rate,
        }
    }

    /// Recomputes the checkpoint interval after a parameter override.
    pub fn override_parameters(&mut self, iterations: Option<usize>, features: Option<usize>, learning_rate: Option<f64>) {
        if let Some(iterations) = iterations {
            self.iterations = iterations;
        }
        if let Some(features) = features {
            self.features = features;
        }
        if let Some(learning_rate) = learning_rate {
            self.learning_rate = learning_rate;
        }
        self.checkpoint_interval = Config::checkpoint_interval(self.iterations, self.check_points);
    }

    //checkpoint calculation
    pub fn checkpoint_interval(iterations: usize, check_points: usize) -> usize {
        let mut checkpoints = check_points;
        if checkpoints < 1 || checkpoints > iterations {
            if check_points > iterations && iterations > 0 {
                warn!(check_points, iterations, "more check points than iterations");
            }
            checkpoints = if iterations > 1 { iterations / 2 } else { 1 };
        }
        (iterations / checkpoints).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_loader_parameters() {
        let config = Config::from_json_str(r#"{ "data_source": "csv", "location": "ratings.csv" }"#).unwrap();
        assert_eq!(config.iterations, 1000);
        assert_eq!(config.features, 2);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.checkpoint_interval, 100);
        assert!(config.show_progress);
        assert!(config.seed.is_none());
        assert_eq!(config.parameters(), Parameters::default());
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "data_source": "json", "location": "events.json", "iterations": 20, "seed": 9,
                 "json": {{ "aggregation": "normalize",
                           "parsers": [{{ "row_identifier": "user", "column_identifier": "service" }}] }} }}"#
        )
        .unwrap();

        let config = Config::from_json(file.path()).unwrap();
        assert_eq!(config.data_source, DataSource::Json);
        assert_eq!(config.iterations, 20);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.checkpoint_interval, 2);
        let json = config.json.unwrap();
        assert_eq!(json.aggregation, Aggregation::Normalize);
        assert_eq!(json.parsers[0].row_identifier, "user");
    }

    #[test]
    fn json_source_requires_parsers() {
        let err = Config::from_json_str(r#"{ "data_source": "json", "location": "e.json" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(Config::from_json_str(r#"{ "data_source": "csv", "location": "x", "features": 0 }"#).is_err());
        assert!(Config::from_json_str(r#"{ "data_source": "csv", "location": "x", "learning_rate": -1.0 }"#).is_err());
        assert!(Config::from_json_str(r#"{ "data_source": "parquet", "location": "x" }"#).is_err());
    }

    #[test]
    fn checkpoint_interval_bounds() {
        assert_eq!(Config::checkpoint_interval(1000, 10), 100);
        assert_eq!(Config::checkpoint_interval(10, 0), 2);
        assert_eq!(Config::checkpoint_interval(4, 8), 2);
        assert_eq!(Config::checkpoint_interval(0, 10), 1);
        assert_eq!(Config::checkpoint_interval(1, 1), 1);
    }

    #[test]
    fn overrides_recompute_interval() {
        let mut config = Config::from_json_str(r#"{ "data_source": "csv", "location": "x" }"#).unwrap();
        config.override_parameters(Some(50), Some(4), None);
        assert_eq!(config.iterations, 50);
        assert_eq!(config.features, 4);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.checkpoint_interval, 5);
    }
}
