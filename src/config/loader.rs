// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{DEFAULT_PIPELINE_NAME, DEFAULT_QUEUE_CAPACITY};
use crate::errors::PipelineError;
use crate::observability::messages::validation::ValidationFailed;
use crate::observability::messages::StructuredLog;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Declarative description of a pipeline: the stages and the edges between
/// them.
///
/// Usually loaded from a YAML (or TOML) file.
///
/// # Example
/// ```yaml
/// name: orders
/// options:
///   queue_capacity: 1000
/// stages:
///   - id: read
///     type: rows
///     options:
///       fields: [{ name: id, type: integer }]
///       data: [["1"], ["2"]]
///   - id: fix
///     type: set_constant
///     error_handling:
///       target: rejects
///       max_errors: 10
///     options:
///       fields: [{ name: id, value: "0" }]
///   - id: rejects
///     type: dummy
/// edges:
///   - from: read
///     to: fix
///     capacity: 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDescription {
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    #[serde(default)]
    pub options: PipelineOptions,
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

fn default_pipeline_name() -> String {
    DEFAULT_PIPELINE_NAME.to_string()
}

impl PipelineDescription {
    pub fn stage(&self, id: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.id == id)
    }
}

/// Pipeline-wide options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Capacity of every queue whose edge does not set one.
    pub queue_capacity: Option<usize>,
}

impl PipelineOptions {
    pub fn get_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Configuration of one stage.
///
/// # Fields
/// * `id` - Unique stage name
/// * `stage_type` - Registry key of the transform implementing this stage
/// * `copies` - Number of parallel instances (defaults to 1)
/// * `data_movement` - How rows are spread over multiple outputs
/// * `error_handling` - Optional diversion policy
/// * `options` - Transform-specific parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    #[serde(default = "default_copies")]
    pub copies: usize,
    #[serde(default)]
    pub data_movement: DataMovement,
    #[serde(default)]
    pub error_handling: Option<ErrorHandlingConfig>,
    #[serde(default)]
    pub options: HashMap<String, serde_yaml::Value>,
}

fn default_copies() -> usize {
    1
}

impl StageConfig {
    pub fn new(id: impl Into<String>, stage_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage_type: stage_type.into(),
            copies: 1,
            data_movement: DataMovement::default(),
            error_handling: None,
            options: HashMap::new(),
        }
    }

    pub fn with_copies(mut self, copies: usize) -> Self {
        self.copies = copies;
        self
    }

    pub fn with_error_handling(mut self, error_handling: ErrorHandlingConfig) -> Self {
        self.error_handling = Some(error_handling);
        self
    }

    pub fn with_data_movement(mut self, data_movement: DataMovement) -> Self {
        self.data_movement = data_movement;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_yaml::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// The error handling policy when it is present and enabled.
    pub fn active_error_handling(&self) -> Option<&ErrorHandlingConfig> {
        self.error_handling.as_ref().filter(|e| e.enabled)
    }
}

/// How a stage spreads rows over its output queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMovement {
    /// Every output queue receives every row.
    #[default]
    Copy,
    /// Rows are dealt round-robin over the output queues.
    Distribute,
}

/// Error diversion policy of a stage.
///
/// # Fields
/// * `target` - Stage receiving the error rows
/// * `enabled` - Diversion on/off, defaults to on
/// * `max_errors` - Rejected rows tolerated before aborting (unset = unlimited)
/// * `max_percent_errors` - Rejected share of rows read tolerated before aborting
/// * `min_percent_rows` - Rows to read before the percentage is evaluated
/// * `count_field`, `description_field`, `fields_field`, `codes_field` -
///   names of extra fields appended to every error row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    pub target: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub max_errors: Option<u64>,
    #[serde(default)]
    pub max_percent_errors: Option<f64>,
    #[serde(default)]
    pub min_percent_rows: Option<u64>,
    #[serde(default)]
    pub count_field: Option<String>,
    #[serde(default)]
    pub description_field: Option<String>,
    #[serde(default)]
    pub fields_field: Option<String>,
    #[serde(default)]
    pub codes_field: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ErrorHandlingConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            enabled: true,
            max_errors: None,
            max_percent_errors: None,
            min_percent_rows: None,
            count_field: None,
            description_field: None,
            fields_field: None,
            codes_field: None,
        }
    }

    /// Names of the configured error fields, in error-row order.
    pub fn error_field_names(&self) -> impl Iterator<Item = &str> + '_ {
        [
            &self.count_field,
            &self.description_field,
            &self.fields_field,
            &self.codes_field,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
    }
}

/// Directed edge between two stages.
///
/// An omitted copy index means "every copy": when both indices are omitted
/// and both stages run the same number of copies, copies are connected 1:1;
/// otherwise every selected source copy is connected to every selected target
/// copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub from: String,
    #[serde(default)]
    pub from_copy: Option<usize>,
    pub to: String,
    #[serde(default)]
    pub to_copy: Option<usize>,
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl EdgeConfig {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            from_copy: None,
            to: to.into(),
            to_copy: None,
            capacity: None,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn between_copies(mut self, from_copy: usize, to_copy: usize) -> Self {
        self.from_copy = Some(from_copy);
        self.to_copy = Some(to_copy);
        self
    }

    pub fn label(&self) -> String {
        format!("{} -> {}", self.from, self.to)
    }
}

/// Parse a description from text. TOML is used when `format_hint` is
/// `"toml"`, YAML otherwise.
pub fn parse_description(text: &str, format_hint: &str) -> Result<PipelineDescription, PipelineError> {
    if format_hint.eq_ignore_ascii_case("toml") {
        Ok(toml::from_str(text)?)
    } else {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Load a description from a YAML or TOML file, chosen by extension.
pub fn load_description<P: AsRef<Path>>(path: P) -> Result<PipelineDescription, PipelineError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml");
    parse_description(&content, extension)
}

/// Load a description and validate its stage graph.
pub fn load_and_validate_description<P: AsRef<Path>>(
    path: P,
) -> Result<PipelineDescription, PipelineError> {
    let description = load_description(path)?;

    if let Err(validation_errors) = crate::config::validate_description(&description) {
        ValidationFailed {
            error_count: validation_errors.len(),
        }
        .log();
        return Err(PipelineError::Validation(validation_errors));
    }

    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_basic_description() {
        let yaml = r#"
name: basic
stages:
  - id: read
    type: rows
  - id: out
    type: dummy
    copies: 2
    data_movement: distribute
edges:
  - from: read
    to: out
    capacity: 5
"#;

        let description = parse_description(yaml, "yaml").unwrap();
        assert_eq!(description.name, "basic");
        assert_eq!(description.stages.len(), 2);
        assert_eq!(description.stages[0].copies, 1);
        assert_eq!(description.stages[1].copies, 2);
        assert_eq!(description.stages[1].data_movement, DataMovement::Distribute);
        assert_eq!(description.edges[0].capacity, Some(5));
        assert_eq!(description.edges[0].from_copy, None);
    }

    #[test]
    fn test_defaults() {
        let yaml = r#"
stages:
  - id: only
    type: dummy
"#;
        let description = parse_description(yaml, "yaml").unwrap();
        assert_eq!(description.name, DEFAULT_PIPELINE_NAME);
        assert_eq!(description.options.get_queue_capacity(), DEFAULT_QUEUE_CAPACITY);
        assert!(description.edges.is_empty());
        assert!(description.stages[0].error_handling.is_none());
    }

    #[test]
    fn test_error_handling_parsing() {
        let yaml = r#"
stages:
  - id: fix
    type: set_constant
    error_handling:
      target: rejects
      max_errors: 3
      description_field: err_desc
  - id: rejects
    type: dummy
"#;
        let description = parse_description(yaml, "yaml").unwrap();
        let handling = description.stages[0].active_error_handling().unwrap();
        assert_eq!(handling.target, "rejects");
        assert!(handling.enabled);
        assert_eq!(handling.max_errors, Some(3));
        assert_eq!(handling.description_field.as_deref(), Some("err_desc"));
        assert_eq!(handling.count_field, None);
    }

    #[test]
    fn test_disabled_error_handling_is_inactive() {
        let stage = StageConfig::new("fix", "set_constant").with_error_handling(ErrorHandlingConfig {
            enabled: false,
            ..ErrorHandlingConfig::new("rejects")
        });
        assert!(stage.error_handling.is_some());
        assert!(stage.active_error_handling().is_none());
    }

    #[test]
    fn test_parse_toml_description() {
        let text = r#"
name = "from-toml"

[options]
queue_capacity = 64

[[stages]]
id = "read"
type = "rows"

[[stages]]
id = "out"
type = "dummy"

[[edges]]
from = "read"
to = "out"
"#;
        let description = parse_description(text, "toml").unwrap();
        assert_eq!(description.name, "from-toml");
        assert_eq!(description.options.get_queue_capacity(), 64);
        assert_eq!(description.edges.len(), 1);
    }

    #[test]
    fn test_load_and_validate_valid_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
stages:
  - id: a
    type: rows
  - id: b
    type: dummy
edges:
  - from: a
    to: b
"#
        )
        .unwrap();

        let description = load_and_validate_description(file.path()).unwrap();
        assert_eq!(description.stages.len(), 2);
    }

    #[test]
    fn test_load_and_validate_cyclic_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
stages:
  - id: a
    type: dummy
  - id: b
    type: dummy
edges:
  - from: a
    to: b
  - from: b
    to: a
"#
        )
        .unwrap();

        let err = load_and_validate_description(file.path()).unwrap_err();
        assert!(err.to_string().contains("Cyclic dependency detected"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_description("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
