// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in stage types.
//!
//! | type           | role                                              |
//! |----------------|---------------------------------------------------|
//! | `rows`         | source emitting rows declared in its options      |
//! | `dummy`        | passthrough                                       |
//! | `set_constant` | overwrites fields with a typed constant           |

pub mod dummy;
pub mod rows;
pub mod set_constant;

pub use dummy::DummyStage;
pub use rows::{RowsConfig, RowsSource};
pub use set_constant::{ConstantField, SetConstantConfig, SetConstantStage};

use crate::config::{StageConfig, TransformRegistry};
use crate::errors::PipelineError;

/// Register every built-in stage type.
pub fn register_builtins(registry: &mut TransformRegistry) {
    registry.register(dummy::STAGE_TYPE, dummy::create);
    registry.register(rows::STAGE_TYPE, rows::create);
    registry.register(set_constant::STAGE_TYPE, set_constant::create);
}

/// Render a scalar YAML option (string, number, bool or null) as text.
pub(crate) fn scalar_text(stage: &StageConfig, value: &serde_yaml::Value) -> Result<String, PipelineError> {
    match value {
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::String(s) => Ok(s.clone()),
        other => Err(PipelineError::configuration(
            &stage.id,
            format!("expected a scalar value, found {:?}", other),
        )),
    }
}

/// Deserialize a stage's whole option map into a typed configuration.
pub(crate) fn stage_options<T: serde::de::DeserializeOwned>(stage: &StageConfig) -> Result<T, PipelineError> {
    let mapping: serde_yaml::Mapping = stage
        .options
        .iter()
        .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.clone()))
        .collect();
    serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
        .map_err(|e| PipelineError::configuration(&stage.id, format!("invalid options: {}", e)))
}
