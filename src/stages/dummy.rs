// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::config::StageConfig;
use crate::errors::PipelineError;
use crate::row::Row;
use crate::traits::{StepOutcome, Transform};

pub const STAGE_TYPE: &str = "dummy";

/// Passes every row through unchanged.
#[derive(Debug, Default)]
pub struct DummyStage;

impl DummyStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transform for DummyStage {
    fn name(&self) -> &'static str {
        STAGE_TYPE
    }

    async fn step(&mut self, input: Option<Row>) -> StepOutcome {
        match input {
            Some(row) => StepOutcome::emit(row),
            None => StepOutcome::NoMoreInput,
        }
    }
}

pub fn create(_config: &StageConfig, _copy: usize) -> Result<Box<dyn Transform>, PipelineError> {
    Ok(Box::new(DummyStage::new()))
}
