// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while loading, building and running a pipeline.

use thiserror::Error;

use crate::errors::ValidationError;

/// Pipeline-level error type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed or ambiguous stage setup. Always fatal to the stage and
    /// escalates to a pipeline-wide abort.
    #[error("configuration error in stage '{stage}': {message}")]
    Configuration { stage: String, message: String },

    /// The description failed validation.
    #[error("pipeline description is invalid:\n{}", format_validation(.0))]
    Validation(Vec<ValidationError>),

    /// An operation was called in a run state that doesn't allow it.
    #[error("invalid pipeline state: {0}")]
    InvalidState(String),

    /// Reading a description file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML description could not be parsed.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML description could not be parsed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A stage task panicked or was aborted by the runtime.
    #[error("stage task for '{stage}' failed to join: {message}")]
    Join { stage: String, message: String },
}

impl PipelineError {
    pub fn configuration(stage: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Configuration {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration { .. })
    }
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Control-flow signals from queue operations during shutdown. Neither is a
/// user-visible failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSetError {
    /// The queue was marked done, or the stop signal fired while a `put`
    /// was blocked.
    #[error("row set is closed")]
    Closed,

    /// The stop signal fired while a `get` was blocked.
    #[error("row set operation cancelled")]
    Cancelled,
}
