// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Source stage emitting a fixed list of rows.
//!
//! ```yaml
//! - id: read
//!   type: rows
//!   options:
//!     fields:
//!       - { name: id, type: integer }
//!       - { name: born, type: date, format: "%d.%m.%Y" }
//!     data:
//!       - [1, "24.12.1999"]
//!       - [2, ""]
//! ```
//!
//! Cells are given as text and converted with the field's type and format.
//! A cell that doesn't convert fails that row only. When the stage runs
//! several copies, copy `c` emits the rows whose index is `c` modulo the
//! number of copies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StageConfig;
use crate::errors::PipelineError;
use crate::row::{convert_text, FieldMeta, Row, Schema};
use crate::stages::{scalar_text, stage_options};
use crate::traits::{RowFailure, StepOutcome, Transform};

pub const STAGE_TYPE: &str = "rows";
/// Error code of rows whose cells don't convert.
pub const CONVERSION_ERROR_CODE: &str = "RWS001";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RowsConfig {
    pub fields: Vec<FieldMeta>,
    #[serde(default)]
    pub data: Vec<Vec<serde_yaml::Value>>,
}

pub struct RowsSource {
    stage: StageConfig,
    config: RowsConfig,
    copy: usize,
    copies: usize,
    schema: Schema,
    cells: Vec<Vec<String>>,
    next: usize,
}

impl RowsSource {
    pub fn new(stage: StageConfig, config: RowsConfig, copy: usize) -> Self {
        let copies = stage.copies.max(1);
        Self {
            stage,
            config,
            copy,
            copies,
            schema: Schema::new(),
            cells: Vec::new(),
            next: copy,
        }
    }

    fn convert(&self, cells: &[String]) -> Result<Row, RowFailure> {
        let mut row = Row::default();
        for (text, field) in cells.iter().zip(self.schema.fields()) {
            let value = convert_text(text, field, None)
                .map_err(|e| RowFailure::new(CONVERSION_ERROR_CODE, e))?;
            row.push(value);
        }
        Ok(row)
    }
}

#[async_trait]
impl Transform for RowsSource {
    fn name(&self) -> &'static str {
        STAGE_TYPE
    }

    fn init(&mut self) -> Result<(), PipelineError> {
        self.schema = Schema::from_fields(self.config.fields.clone())
            .map_err(|e| PipelineError::configuration(&self.stage.id, e))?;

        let mut cells = Vec::with_capacity(self.config.data.len());
        for (index, line) in self.config.data.iter().enumerate() {
            if line.len() != self.schema.len() {
                return Err(PipelineError::configuration(
                    &self.stage.id,
                    format!(
                        "data row {} has {} values, {} fields are declared",
                        index,
                        line.len(),
                        self.schema.len()
                    ),
                ));
            }
            let texts = line
                .iter()
                .map(|value| scalar_text(&self.stage, value))
                .collect::<Result<Vec<_>, _>>()?;
            cells.push(texts);
        }
        self.cells = cells;
        self.next = self.copy;
        Ok(())
    }

    fn output_schema(&self, _input: Schema) -> Result<Schema, PipelineError> {
        Ok(self.schema.clone())
    }

    async fn step(&mut self, _input: Option<Row>) -> StepOutcome {
        let Some(cells) = self.cells.get(self.next) else {
            return StepOutcome::NoMoreInput;
        };
        let outcome = match self.convert(cells) {
            Ok(row) => StepOutcome::emit(row),
            Err(failure) => StepOutcome::Failed(failure),
        };
        self.next += self.copies;
        outcome
    }
}

pub fn create(config: &StageConfig, copy: usize) -> Result<Box<dyn Transform>, PipelineError> {
    let options: RowsConfig = stage_options(config)?;
    Ok(Box::new(RowsSource::new(config.clone(), options, copy)))
}
