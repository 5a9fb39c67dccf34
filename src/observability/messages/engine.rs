// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for pipeline lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Building the stage/queue arena from a description
//! * Starting, stopping and finishing a pipeline run

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Pipeline arena built from a description.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_pipewood::observability::messages::engine::PipelineBuilt;
///
/// let msg = PipelineBuilt {
///     pipeline: "orders",
///     stage_instances: 4,
///     row_sets: 3,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct PipelineBuilt<'a> {
    pub pipeline: &'a str,
    pub stage_instances: usize,
    pub row_sets: usize,
}

impl Display for PipelineBuilt<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' built: {} stage instances, {} row sets",
            self.pipeline, self.stage_instances, self.row_sets
        )
    }
}

impl StructuredLog for PipelineBuilt<'_> {
    fn log(&self) {
        tracing::info!(
            pipeline = self.pipeline,
            stage_instances = self.stage_instances,
            row_sets = self.row_sets,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pipeline_built",
            span_name = name,
            pipeline = self.pipeline,
            stage_instances = self.stage_instances,
            row_sets = self.row_sets,
        )
    }
}

/// Every stage instance has been spawned.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PipelineStarted<'a> {
    pub pipeline: &'a str,
    pub stage_instances: usize,
}

impl Display for PipelineStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' started {} stage instances",
            self.pipeline, self.stage_instances
        )
    }
}

impl StructuredLog for PipelineStarted<'_> {
    fn log(&self) {
        tracing::info!(
            pipeline = self.pipeline,
            stage_instances = self.stage_instances,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pipeline",
            span_name = name,
            pipeline = self.pipeline,
            stage_instances = self.stage_instances,
        )
    }
}

/// Stage initialisation failed, the pipeline will not start.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct PipelinePreparationFailed<'a> {
    pub pipeline: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for PipelinePreparationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' could not be prepared: {}",
            self.pipeline, self.error
        )
    }
}

impl StructuredLog for PipelinePreparationFailed<'_> {
    fn log(&self) {
        tracing::error!(
            pipeline = self.pipeline,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "pipeline_preparation_failed",
            span_name = name,
            pipeline = self.pipeline,
            error = %self.error,
        )
    }
}

/// A stop was requested, either for every stage or for sources only.
///
/// # Log Level
/// `warn!` - Run is being cut short
///
/// # Example
/// ```
/// use the_pipewood::observability::messages::engine::PipelineStopRequested;
///
/// let msg = PipelineStopRequested {
///     pipeline: "orders",
///     sources_only: false,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct PipelineStopRequested<'a> {
    pub pipeline: &'a str,
    pub sources_only: bool,
}

impl Display for PipelineStopRequested<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.sources_only {
            write!(f, "Pipeline '{}' safe stop requested: stopping sources", self.pipeline)
        } else {
            write!(f, "Pipeline '{}' stop requested: stopping all stages", self.pipeline)
        }
    }
}

impl StructuredLog for PipelineStopRequested<'_> {
    fn log(&self) {
        tracing::warn!(
            pipeline = self.pipeline,
            sources_only = self.sources_only,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "pipeline_stop",
            span_name = name,
            pipeline = self.pipeline,
            sources_only = self.sources_only,
        )
    }
}

/// Every stage instance has exited.
///
/// # Log Level
/// `info!` on a clean run, `error!` when the run was aborted
pub struct PipelineFinished<'a> {
    pub pipeline: &'a str,
    pub rows_in: u64,
    pub rows_out: u64,
    pub errors: u64,
    pub aborted: bool,
    pub duration: std::time::Duration,
}

impl Display for PipelineFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' {}: rows_in={}, rows_out={}, errors={} in {:?}",
            self.pipeline,
            if self.aborted { "aborted" } else { "finished" },
            self.rows_in,
            self.rows_out,
            self.errors,
            self.duration
        )
    }
}

impl StructuredLog for PipelineFinished<'_> {
    fn log(&self) {
        if self.aborted {
            tracing::error!(
                pipeline = self.pipeline,
                rows_in = self.rows_in,
                rows_out = self.rows_out,
                errors = self.errors,
                duration_ms = self.duration.as_millis() as u64,
                "{}", self
            );
        } else {
            tracing::info!(
                pipeline = self.pipeline,
                rows_in = self.rows_in,
                rows_out = self.rows_out,
                errors = self.errors,
                duration_ms = self.duration.as_millis() as u64,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pipeline_finished",
            span_name = name,
            pipeline = self.pipeline,
            aborted = self.aborted,
            duration = ?self.duration,
        )
    }
}
