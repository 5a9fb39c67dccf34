// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Overwrites fields of every row with a constant.
//!
//! ```yaml
//! - id: defaults
//!   type: set_constant
//!   options:
//!     fields:
//!       - { name: amount, value: "1,234.50", mask: "#,##0.00" }
//!       - { name: comment, empty_string: true }
//! ```
//!
//! The constant is given as text and converted to the type of the field it
//! replaces once the stream's schema is known. A missing `value` sets the
//! field to null, or to an empty string when `empty_string` is set. When the
//! text doesn't convert every row fails with a conversion error, which the
//! stage's error handling can divert.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StageConfig;
use crate::errors::{PipelineError, RowError};
use crate::row::{convert_text, Row, Schema, Value};
use crate::stages::{scalar_text, stage_options};
use crate::traits::{StepOutcome, Transform};

pub const STAGE_TYPE: &str = "set_constant";
/// Error code of rows whose constant doesn't convert.
pub const CONVERSION_ERROR_CODE: &str = "SVC001";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConstantField {
    pub name: String,
    #[serde(default)]
    pub value: Option<serde_yaml::Value>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub empty_string: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetConstantConfig {
    pub fields: Vec<ConstantField>,
}

pub struct SetConstantStage {
    stage: StageConfig,
    config: SetConstantConfig,
    texts: Vec<Option<String>>,
    constants: Vec<(usize, Result<Value, RowError>)>,
}

impl SetConstantStage {
    pub fn new(stage: StageConfig, config: SetConstantConfig) -> Self {
        Self {
            stage,
            config,
            texts: Vec::new(),
            constants: Vec::new(),
        }
    }
}

#[async_trait]
impl Transform for SetConstantStage {
    fn name(&self) -> &'static str {
        STAGE_TYPE
    }

    fn init(&mut self) -> Result<(), PipelineError> {
        if self.config.fields.is_empty() {
            return Err(PipelineError::configuration(&self.stage.id, "no fields to set"));
        }
        let mut texts = Vec::with_capacity(self.config.fields.len());
        for (i, field) in self.config.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(PipelineError::configuration(&self.stage.id, "field name is empty"));
            }
            if self.config.fields[..i]
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&field.name))
            {
                return Err(PipelineError::configuration(
                    &self.stage.id,
                    format!("field '{}' is set more than once", field.name),
                ));
            }
            let text = match &field.value {
                Some(value) => Some(scalar_text(&self.stage, value)?),
                None if field.empty_string => Some(String::new()),
                None => None,
            };
            texts.push(text);
        }
        self.texts = texts;
        Ok(())
    }

    fn target_fields(&self) -> Vec<String> {
        self.config.fields.iter().map(|f| f.name.clone()).collect()
    }

    fn bind(&mut self, schema: &Schema, positions: &[usize]) -> Result<(), PipelineError> {
        let mut constants = Vec::with_capacity(positions.len());
        for ((field, text), &position) in self.config.fields.iter().zip(&self.texts).zip(positions) {
            let meta = schema.field(position).ok_or_else(|| {
                PipelineError::configuration(&self.stage.id, format!("no field at position {}", position))
            })?;
            let value = match text {
                Some(text) => convert_text(text, meta, field.mask.as_deref()),
                None => Ok(Value::Null),
            };
            constants.push((position, value));
        }
        self.constants = constants;
        Ok(())
    }

    async fn step(&mut self, input: Option<Row>) -> StepOutcome {
        let Some(mut row) = input else {
            return StepOutcome::NoMoreInput;
        };
        for (position, value) in &self.constants {
            match value {
                Ok(value) => {
                    row.set(*position, value.clone());
                }
                Err(error) => return StepOutcome::failed(CONVERSION_ERROR_CODE, error.clone()),
            }
        }
        StepOutcome::emit(row)
    }
}

pub fn create(config: &StageConfig, _copy: usize) -> Result<Box<dyn Transform>, PipelineError> {
    let options: SetConstantConfig = stage_options(config)?;
    Ok(Box::new(SetConstantStage::new(config.clone(), options)))
}
