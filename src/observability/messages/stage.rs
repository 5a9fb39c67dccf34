// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for stage runtime events.
//!
//! This module contains message types for logging events related to:
//! * Stage instance start and termination
//! * Lazy output schema resolution
//! * Per-row error diversion and escalation

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Stage instance loop starting.
///
/// # Log Level
/// `debug!` - One line per stage copy
pub struct StageStarted<'a> {
    pub stage: &'a str,
    pub copy: usize,
    pub inputs: usize,
    pub outputs: usize,
}

impl Display for StageStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}.{}' started: {} inputs, {} outputs",
            self.stage, self.copy, self.inputs, self.outputs
        )
    }
}

impl StructuredLog for StageStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            copy = self.copy,
            inputs = self.inputs,
            outputs = self.outputs,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "stage",
            span_name = name,
            stage = self.stage,
            copy = self.copy,
        )
    }
}

/// Output schema derived from the first row.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct OutputSchemaResolved<'a> {
    pub stage: &'a str,
    pub copy: usize,
    pub fields: &'a [&'a str],
}

impl Display for OutputSchemaResolved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}.{}' output schema: [{}]",
            self.stage,
            self.copy,
            self.fields.join(", ")
        )
    }
}

impl StructuredLog for OutputSchemaResolved<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            copy = self.copy,
            field_count = self.fields.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "output_schema",
            span_name = name,
            stage = self.stage,
            copy = self.copy,
        )
    }
}

/// Stage instance exited; counts are final.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_pipewood::observability::messages::stage::StageFinished;
///
/// let msg = StageFinished {
///     stage: "dummy",
///     copy: 0,
///     read: 10,
///     written: 9,
///     rejected: 1,
///     errors: 1,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct StageFinished<'a> {
    pub stage: &'a str,
    pub copy: usize,
    pub read: u64,
    pub written: u64,
    pub rejected: u64,
    pub errors: u64,
}

impl Display for StageFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}.{}' finished: read={}, written={}, rejected={}, errors={}",
            self.stage, self.copy, self.read, self.written, self.rejected, self.errors
        )
    }
}

impl StructuredLog for StageFinished<'_> {
    fn log(&self) {
        tracing::info!(
            stage = self.stage,
            copy = self.copy,
            read = self.read,
            written = self.written,
            rejected = self.rejected,
            errors = self.errors,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "stage_finished",
            span_name = name,
            stage = self.stage,
            copy = self.copy,
        )
    }
}

/// A failed row was sent to the stage's error queue.
///
/// # Log Level
/// `debug!` - Expected under diversion, one line per row
pub struct RowDiverted<'a> {
    pub stage: &'a str,
    pub copy: usize,
    pub code: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for RowDiverted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}.{}' diverted row [{}]: {}",
            self.stage, self.copy, self.code, self.error
        )
    }
}

impl StructuredLog for RowDiverted<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            copy = self.copy,
            code = self.code,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "row_diverted",
            span_name = name,
            stage = self.stage,
            copy = self.copy,
        )
    }
}

/// Stage failed and is stopping the whole pipeline.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use the_pipewood::observability::messages::stage::StageAborted;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "bad row");
/// let msg = StageAborted {
///     stage: "set_constant",
///     copy: 0,
///     error: &error,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct StageAborted<'a> {
    pub stage: &'a str,
    pub copy: usize,
    pub error: &'a dyn std::error::Error,
}

impl Display for StageAborted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}.{}' failed, stopping pipeline: {}",
            self.stage, self.copy, self.error
        )
    }
}

impl StructuredLog for StageAborted<'_> {
    fn log(&self) {
        tracing::error!(
            stage = self.stage,
            copy = self.copy,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "stage_aborted",
            span_name = name,
            stage = self.stage,
            copy = self.copy,
        )
    }
}

/// The error handler's threshold was exceeded.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ErrorThresholdExceeded<'a> {
    pub stage: &'a str,
    pub copy: usize,
    pub rejected: u64,
    pub threshold: &'a str,
}

impl Display for ErrorThresholdExceeded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}.{}' exceeded its error threshold ({}) after {} rejected rows",
            self.stage, self.copy, self.threshold, self.rejected
        )
    }
}

impl StructuredLog for ErrorThresholdExceeded<'_> {
    fn log(&self) {
        tracing::error!(
            stage = self.stage,
            copy = self.copy,
            rejected = self.rejected,
            threshold = self.threshold,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "error_threshold_exceeded",
            span_name = name,
            stage = self.stage,
            copy = self.copy,
        )
    }
}
