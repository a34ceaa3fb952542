//! Loaders that turn external data into the original matrix.
//!
//! The engine only depends on [`MatrixLoader`]. Two file formats ship with
//! the crate:
//! - CSV triples with a `row,column,value` header
//! - a JSON array of flat event records, counted per (row id, column id)
//!
//! Row and column labels are assigned in first-seen order. Cells without an
//! entry stay unknown.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{Aggregation, Config, DataSource};
use crate::error::LoadError;
use crate::matrix::{LabelSet, Matrix, ValueSet, MISSING};

/// Training parameters a loader hands to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    pub iterations: usize,
    pub features: usize,
    pub learning_rate: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            iterations: 1000,
            features: 2,
            learning_rate: 0.01,
        }
    }
}

/// Source of an original matrix and the parameters to factor it with.
pub trait MatrixLoader {
    fn parameters(&self) -> Parameters;
    fn load(&self) -> Result<Matrix, LoadError>;
}

/// Picks the loader named by `config.data_source`.
pub fn loader_for(config: &Config) -> Box<dyn MatrixLoader> {
    match config.data_source {
        DataSource::Csv => Box::new(CsvLoader::new(&config.location).with_parameters(config.parameters())),
        DataSource::Json => {
            let json = config.json.clone().unwrap_or_default();
            Box::new(
                JsonLoader::from_path(&config.location, json.parsers)
                    .with_aggregation(json.aggregation)
                    .with_parameters(config.parameters()),
            )
        }
    }
}

// Labels in first-seen order with a reverse lookup
#[derive(Default)]
struct LabelIndex {
    labels: Vec<String>,
    positions: HashMap<String, usize>,
}

impl LabelIndex {
    fn index_of(&mut self, label: &str) -> usize {
        if let Some(&index) = self.positions.get(label) {
            return index;
        }
        let index = self.labels.len();
        self.labels.push(label.to_string());
        self.positions.insert(label.to_string(), index);
        index
    }

    fn len(&self) -> usize {
        self.labels.len()
    }

    fn label_sets(&self) -> Vec<LabelSet> {
        self.labels
            .iter()
            .enumerate()
            .map(|(index, label)| LabelSet::new(label.clone(), index))
            .collect()
    }
}

fn build_matrix(rows: &LabelIndex, columns: &LabelIndex, entries: &[ValueSet]) -> Result<Matrix, LoadError> {
    Matrix::empty(rows.len(), columns.len())
        .with_values(entries)
        .and_then(|m| m.with_row_labels(&rows.label_sets()))
        .and_then(|m| m.with_column_labels(&columns.label_sets()))
        .map_err(|e| LoadError::Matrix(e.to_string()))
}

/// Reads `row,column,value` triples. An empty value field, or `NaN`, marks the
/// cell unknown; a repeated coordinate keeps the last value.
pub struct CsvLoader {
    location: PathBuf,
    parameters: Parameters,
}

impl CsvLoader {
    pub fn new<P: AsRef<Path>>(location: P) -> Self {
        Self {
            location: location.as_ref().to_path_buf(),
            parameters: Parameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }
}

impl MatrixLoader for CsvLoader {
    fn parameters(&self) -> Parameters {
        self.parameters
    }

    fn load(&self) -> Result<Matrix, LoadError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_path(&self.location)?;

        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| LoadError::InvalidRecord {
                    record: 0,
                    reason: format!("missing '{}' column in header", name),
                })
        };
        let row_index = position("row")?;
        let column_index = position("column")?;
        let value_index = position("value")?;

        let mut rows = LabelIndex::default();
        let mut columns = LabelIndex::default();
        let mut entries = Vec::new();

        for (number, record) in reader.records().enumerate() {
            let record = record?;
            let field = |index: usize| record.get(index).unwrap_or("");

            let (row, column, raw) = (field(row_index), field(column_index), field(value_index));
            if row.is_empty() || column.is_empty() {
                return Err(LoadError::InvalidRecord {
                    record: number + 1,
                    reason: "row and column must not be empty".to_string(),
                });
            }

            let value = if raw.is_empty() {
                MISSING
            } else {
                raw.parse::<f64>().map_err(|e| LoadError::InvalidRecord {
                    record: number + 1,
                    reason: format!("invalid value '{}': {}", raw, e),
                })?
            };
            if value.is_infinite() {
                return Err(LoadError::InvalidRecord {
                    record: number + 1,
                    reason: format!("value '{}' is not finite", raw),
                });
            }

            entries.push(ValueSet::new(value, rows.index_of(row), columns.index_of(column)));
        }

        if entries.is_empty() {
            return Err(LoadError::Empty {
                source_name: self.location.display().to_string(),
            });
        }

        info!(
            rows = rows.len(),
            cols = columns.len(),
            entries = entries.len(),
            "loaded {}",
            self.location.display()
        );
        build_matrix(&rows, &columns, &entries)
    }
}

/// Optional filter on a record: `key` must be present and, when `values` is
/// non-empty, its value must be one of them.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Criteria {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Maps a matching record onto one (row id, column id) event.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct JsonLoaderParser {
    #[serde(default)]
    pub criteria: Option<Criteria>,
    pub row_identifier: String,
    pub column_identifier: String,
}

impl JsonLoaderParser {
    pub fn new<S1: Into<String>, S2: Into<String>>(row_identifier: S1, column_identifier: S2) -> Self {
        Self {
            criteria: None,
            row_identifier: row_identifier.into(),
            column_identifier: column_identifier.into(),
        }
    }

    pub fn with_criteria<S: Into<String>>(mut self, key: S, values: &[&str]) -> Self {
        self.criteria = Some(Criteria {
            key: key.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    fn matches(&self, record: &serde_json::Map<String, Value>) -> bool {
        match &self.criteria {
            None => true,
            Some(criteria) => match record.get(&criteria.key).and_then(scalar_text) {
                None => false,
                Some(value) => criteria.values.is_empty() || criteria.values.contains(&value),
            },
        }
    }

    fn identify(&self, record: &serde_json::Map<String, Value>) -> Option<(String, String)> {
        let row = record.get(&self.row_identifier).and_then(scalar_text)?;
        let column = record.get(&self.column_identifier).and_then(scalar_text)?;
        Some((row, column))
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

enum JsonSource {
    Path(PathBuf),
    Value(Value),
}

/// Counts events from a JSON array of flat objects.
pub struct JsonLoader {
    source: JsonSource,
    parsers: Vec<JsonLoaderParser>,
    aggregation: Aggregation,
    parameters: Parameters,
}

impl JsonLoader {
    pub fn from_path<P: AsRef<Path>>(location: P, parsers: Vec<JsonLoaderParser>) -> Self {
        Self {
            source: JsonSource::Path(location.as_ref().to_path_buf()),
            parsers,
            aggregation: Aggregation::default(),
            parameters: Parameters::default(),
        }
    }

    pub fn from_value(raw: Value, parsers: Vec<JsonLoaderParser>) -> Self {
        Self {
            source: JsonSource::Value(raw),
            parsers,
            aggregation: Aggregation::default(),
            parameters: Parameters::default(),
        }
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    fn source_name(&self) -> String {
        match &self.source {
            JsonSource::Path(path) => path.display().to_string(),
            JsonSource::Value(_) => "inline JSON".to_string(),
        }
    }

    fn read(&self) -> Result<Value, LoadError> {
        match &self.source {
            JsonSource::Path(path) => {
                let reader = BufReader::new(File::open(path)?);
                Ok(serde_json::from_reader(reader)?)
            }
            JsonSource::Value(value) => Ok(value.clone()),
        }
    }
}

impl MatrixLoader for JsonLoader {
    fn parameters(&self) -> Parameters {
        self.parameters
    }

    fn load(&self) -> Result<Matrix, LoadError> {
        let raw = self.read()?;
        let records = raw.as_array().ok_or_else(|| LoadError::InvalidRecord {
            record: 0,
            reason: "expected a top-level array of records".to_string(),
        })?;

        let mut rows = LabelIndex::default();
        let mut columns = LabelIndex::default();
        let mut counts: HashMap<(usize, usize), f64> = HashMap::new();
        let mut skipped = 0;

        for (number, record) in records.iter().enumerate() {
            let record = record.as_object().ok_or_else(|| LoadError::InvalidRecord {
                record: number,
                reason: "record is not an object".to_string(),
            })?;

            let mut used = false;
            for parser in self.parsers.iter().filter(|parser| parser.matches(record)) {
                if let Some((row, column)) = parser.identify(record) {
                    let cell = (rows.index_of(&row), columns.index_of(&column));
                    *counts.entry(cell).or_insert(0.0) += 1.0;
                    used = true;
                }
            }
            if !used {
                skipped += 1;
            }
        }

        if counts.is_empty() {
            return Err(LoadError::Empty {
                source_name: self.source_name(),
            });
        }
        debug!(records = records.len(), skipped, "json records scanned");

        if self.aggregation == Aggregation::Normalize {
            let mut totals = vec![0.0; rows.len()];
            for (&(row, _), &count) in &counts {
                totals[row] += count;
            }
            for (&(row, _), count) in counts.iter_mut() {
                *count /= totals[row];
            }
        }

        let entries: Vec<ValueSet> = counts
            .into_iter()
            .map(|((row, col), value)| ValueSet::new(value, row, col))
            .collect();

        info!(rows = rows.len(), cols = columns.len(), "loaded {}", self.source_name());
        build_matrix(&rows, &columns, &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;
    use std::io::Write;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn csv_triples_become_labelled_matrix() {
        let file = csv_file("row,column,value\nann,film,5\nbob,film,1\nann,book,3\nbob,book,\n");
        let m = CsvLoader::new(file.path()).load().unwrap();

        assert_eq!((m.rows(), m.cols()), (2, 2));
        let labels = m.labels().unwrap();
        assert_eq!(labels.row_labels, vec!["ann", "bob"]);
        assert_eq!(labels.column_labels, vec!["film", "book"]);
        assert_eq!(m.at(0, 0), 5.0);
        assert_eq!(m.at(0, 1), 3.0);
        assert!(m.at(1, 1).is_nan());
    }

    #[test]
    fn csv_column_order_is_taken_from_header() {
        let file = csv_file("value, column, row\n2, x, a\n");
        let m = CsvLoader::new(file.path()).load().unwrap();
        assert_eq!(m.at(0, 0), 2.0);
        assert_eq!(m.labels().unwrap().row_labels, vec!["a"]);
    }

    #[test]
    fn csv_rejects_bad_numbers() {
        let file = csv_file("row,column,value\na,b,five\n");
        let err = CsvLoader::new(file.path()).load().unwrap_err();
        assert!(matches!(err, LoadError::InvalidRecord { record: 1, .. }));
    }

    #[test]
    fn csv_requires_header_columns() {
        let file = csv_file("user,item,rating\na,b,1\n");
        assert!(matches!(
            CsvLoader::new(file.path()).load(),
            Err(LoadError::InvalidRecord { record: 0, .. })
        ));
    }

    #[test]
    fn csv_without_entries_is_empty() {
        let file = csv_file("row,column,value\n");
        assert!(matches!(CsvLoader::new(file.path()).load(), Err(LoadError::Empty { .. })));
    }

    #[test]
    fn csv_missing_file_is_an_error() {
        assert!(CsvLoader::new("/nonexistent/ratings.csv").load().is_err());
    }

    fn events() -> Value {
        json!([
            { "user": "ann", "service": "s3", "action": "GetObject" },
            { "user": "ann", "service": "s3", "action": "PutObject" },
            { "user": "ann", "service": "ec2", "action": "RunInstances" },
            { "user": "bob", "service": "ec2", "action": "RunInstances" },
            { "user": "bob", "action": "Login" }
        ])
    }

    #[test]
    fn json_counts_events() {
        let loader = JsonLoader::from_value(events(), vec![JsonLoaderParser::new("user", "service")]);
        let m = loader.load().unwrap();

        assert_eq!(m.labels().unwrap().row_labels, vec!["ann", "bob"]);
        assert_eq!(m.labels().unwrap().column_labels, vec!["s3", "ec2"]);
        assert_eq!(m.at(0, 0), 2.0);
        assert_eq!(m.at(0, 1), 1.0);
        assert!(m.at(1, 0).is_nan());
        assert_eq!(m.at(1, 1), 1.0);
    }

    #[test]
    fn json_criteria_filter_records() {
        let parser = JsonLoaderParser::new("user", "action").with_criteria("service", &["ec2"]);
        let m = JsonLoader::from_value(events(), vec![parser]).load().unwrap();
        assert_eq!(m.labels().unwrap().column_labels, vec!["RunInstances"]);
        assert_eq!(m.column(0), vec![1.0, 1.0]);
    }

    #[test]
    fn json_normalize_divides_by_row_total() {
        let m = JsonLoader::from_value(events(), vec![JsonLoaderParser::new("user", "service")])
            .with_aggregation(Aggregation::Normalize)
            .load()
            .unwrap();
        assert_relative_eq!(m.at(0, 0), 2.0 / 3.0);
        assert_relative_eq!(m.at(0, 1), 1.0 / 3.0);
        assert_relative_eq!(m.at(1, 1), 1.0);
    }

    #[test]
    fn json_without_matches_is_empty() {
        let loader = JsonLoader::from_value(events(), vec![JsonLoaderParser::new("user", "region")]);
        assert!(matches!(loader.load(), Err(LoadError::Empty { .. })));
    }

    #[test]
    fn json_requires_array() {
        let loader = JsonLoader::from_value(json!({ "user": "ann" }), vec![JsonLoaderParser::new("user", "service")]);
        assert!(matches!(loader.load(), Err(LoadError::InvalidRecord { .. })));
    }

    #[test]
    fn loaders_report_default_parameters() {
        assert_eq!(CsvLoader::new("x.csv").parameters(), Parameters::default());
        let custom = Parameters {
            iterations: 5,
            features: 3,
            learning_rate: 0.5,
        };
        assert_eq!(JsonLoader::from_value(json!([]), vec![]).with_parameters(custom).parameters(), custom);
    }
}
