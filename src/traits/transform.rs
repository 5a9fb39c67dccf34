// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The capability every stage type implements.
//!
//! A [`Transform`] is one stage instance's logic: its immutable configuration
//! and its private mutable state live in the implementing value, which is
//! created per stage copy by a [`TransformFactory`] and never shared.
//!
//! The stage runtime drives a transform through this sequence:
//!
//! ```text
//! init() ─► [first row] output_schema() ─► target_fields() ─► bind()
//!        ─► step(row) ─► step(row) ─► ... ─► end of input
//! ```
//!
//! Source stages (no input queues) are stepped with `None` until they return
//! [`StepOutcome::NoMoreInput`].

use async_trait::async_trait;

use crate::config::StageConfig;
use crate::config::consts::DEFAULT_ERROR_CODE;
use crate::errors::{PipelineError, RowError};
use crate::row::{Row, Schema};

/// Result of processing one input row.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Rows to send downstream. An empty vector drops the input row.
    Emit(Vec<Row>),
    /// The stage has nothing more to produce.
    NoMoreInput,
    /// The row could not be processed.
    Failed(RowFailure),
}

impl StepOutcome {
    pub fn emit(row: Row) -> Self {
        StepOutcome::Emit(vec![row])
    }

    pub fn failed(code: impl Into<String>, error: RowError) -> Self {
        StepOutcome::Failed(RowFailure::new(code, error))
    }
}

/// Detail of a per-row failure: the stage's error code and the error itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub code: String,
    pub error: RowError,
}

impl RowFailure {
    pub fn new(code: impl Into<String>, error: RowError) -> Self {
        Self {
            code: code.into(),
            error,
        }
    }
}

impl From<RowError> for RowFailure {
    fn from(error: RowError) -> Self {
        Self::new(DEFAULT_ERROR_CODE, error)
    }
}

#[async_trait]
pub trait Transform: Send {
    /// Registry key of this stage type.
    fn name(&self) -> &'static str;

    /// Validate configuration before any row is processed.
    fn init(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Derive the output schema from a clone of the input schema.
    fn output_schema(&self, input: Schema) -> Result<Schema, PipelineError> {
        Ok(input)
    }

    /// Names of the fields this stage writes to. Each must exist in the
    /// output schema and appear only once.
    fn target_fields(&self) -> Vec<String> {
        Vec::new()
    }

    /// Receive the resolved output schema and the position of every target
    /// field, in `target_fields()` order. Called once, on the first row.
    fn bind(&mut self, _schema: &Schema, _positions: &[usize]) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Process one input row, or produce the next row for source stages.
    async fn step(&mut self, input: Option<Row>) -> StepOutcome;
}

/// Creates one [`Transform`] per stage copy.
pub trait TransformFactory: Send + Sync {
    fn create(&self, config: &StageConfig, copy: usize) -> Result<Box<dyn Transform>, PipelineError>;
}

impl<F> TransformFactory for F
where
    F: Fn(&StageConfig, usize) -> Result<Box<dyn Transform>, PipelineError> + Send + Sync,
{
    fn create(&self, config: &StageConfig, copy: usize) -> Result<Box<dyn Transform>, PipelineError> {
        self(config, copy)
    }
}
