// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pipeline executor: builds the stage/queue arena from a description and
//! runs one tokio task per stage instance.
//!
//! # Building
//!
//! [`Pipeline::build`] validates the description, creates one transform per
//! stage copy through the [`TransformRegistry`] and allocates a row set for
//! every edge between stage copies:
//!
//! - both copy indices given: exactly that pair
//! - one index omitted: the given copy paired with every copy on the other side
//! - both omitted: copy `i` to copy `i` when both stages run the same number
//!   of copies, otherwise every pairing
//!
//! Each copy of a stage with active error handling gets one extra row set to
//! copy `i % copies` of its error target.
//!
//! # Running
//!
//! ```rust
//! use the_pipewood::config::{EdgeConfig, PipelineDescription, PipelineOptions, StageConfig, TransformRegistry};
//! use the_pipewood::engine::Pipeline;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let description = PipelineDescription {
//!     name: "example".to_string(),
//!     options: PipelineOptions::default(),
//!     stages: vec![
//!         StageConfig::new("read", "rows")
//!             .with_option("fields", serde_yaml::from_str("[{ name: id, type: integer }]")?)
//!             .with_option("data", serde_yaml::from_str("[['1'], ['2'], ['3']]")?),
//!         StageConfig::new("out", "dummy"),
//!     ],
//!     edges: vec![EdgeConfig::new("read", "out")],
//! };
//!
//! let mut pipeline = Pipeline::build(&description, &TransformRegistry::with_builtins())?;
//! let status = pipeline.execute().await?;
//!
//! assert_eq!(status.rows_in, 3);
//! assert_eq!(status.rows_out, 3);
//! assert!(!status.aborted);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::{validate_description, PipelineDescription, StageConfig, TransformRegistry};
use crate::engine::error_handler::ErrorHandler;
use crate::engine::rowset::{InputSet, RowSet, RowSetId, RowSetReader, RowSetWriter};
use crate::engine::runtime::{RunControl, StageCounters, StageRuntime, StageState, StageStatus};
use crate::errors::{PipelineError, ValidationError};
use crate::observability::messages::engine::{
    PipelineBuilt, PipelineFinished, PipelinePreparationFailed, PipelineStarted,
    PipelineStopRequested,
};
use crate::observability::messages::stage::{StageAborted, StageStarted};
use crate::observability::messages::StructuredLog;

/// Run state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Built, not started.
    Prepared,
    Running,
    /// A stop was requested, stage instances are winding down.
    Stopped,
    /// Every stage instance has exited.
    Finished,
}

/// Aggregate outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub pipeline: String,
    /// Rows produced by source stages.
    pub rows_in: u64,
    /// Rows emitted by stages without outputs.
    pub rows_out: u64,
    /// Failed rows, diverted or not.
    pub errors: u64,
    /// Whether a failure stopped the run.
    pub aborted: bool,
    pub stages: Vec<StageStatus>,
}

/// Cloneable handle to stop a running pipeline from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    pipeline: String,
    control: RunControl,
}

impl StopHandle {
    /// Stop every stage instance.
    pub fn stop(&self) {
        PipelineStopRequested {
            pipeline: &self.pipeline,
            sources_only: false,
        }
        .log();
        self.control.stop_all();
    }

    /// Stop source stages; the rest drain what is buffered and finish.
    pub fn safe_stop(&self) {
        PipelineStopRequested {
            pipeline: &self.pipeline,
            sources_only: true,
        }
        .log();
        self.control.stop_sources();
    }
}

struct Instance {
    stage: String,
    copy: usize,
    source: bool,
    sink: bool,
    counters: Arc<StageCounters>,
}

pub struct Pipeline {
    name: String,
    runtimes: Vec<StageRuntime>,
    instances: Vec<Instance>,
    row_sets: Vec<Arc<RowSet>>,
    handles: Vec<JoinHandle<StageStatus>>,
    control: RunControl,
    state: RunState,
    started_at: Option<Instant>,
}

/// Per-instance endpoints collected while wiring edges.
#[derive(Default)]
struct Wiring {
    inputs: Vec<RowSetReader>,
    outputs: Vec<RowSetWriter>,
    error_writer: Option<RowSetWriter>,
}

impl Pipeline {
    /// Build the arena of stage instances and row sets.
    pub fn build(description: &PipelineDescription, registry: &TransformRegistry) -> Result<Self, PipelineError> {
        validate_description(description).map_err(PipelineError::Validation)?;

        let unknown: Vec<ValidationError> = description
            .stages
            .iter()
            .filter(|stage| !registry.contains(&stage.stage_type))
            .map(|stage| ValidationError::UnknownStageType {
                stage_id: stage.id.clone(),
                stage_type: stage.stage_type.clone(),
            })
            .collect();
        if !unknown.is_empty() {
            return Err(PipelineError::Validation(unknown));
        }

        let control = RunControl::new();

        // First instance index of every stage.
        let mut offsets: HashMap<&str, usize> = HashMap::new();
        let mut total = 0;
        for stage in &description.stages {
            offsets.insert(stage.id.as_str(), total);
            total += stage.copies;
        }
        let instance_of = |stage: &str, copy: usize| offsets.get(stage).map(|offset| offset + copy);

        let mut wiring: Vec<Wiring> = (0..total).map(|_| Wiring::default()).collect();
        let mut row_sets = Vec::new();
        let default_capacity = description.options.get_queue_capacity();

        for edge in &description.edges {
            let (Some(from), Some(to)) = (description.stage(&edge.from), description.stage(&edge.to)) else {
                continue;
            };
            let capacity = edge.capacity.unwrap_or(default_capacity);

            for (from_copy, to_copy) in copy_pairs(from, edge.from_copy, to, edge.to_copy) {
                let (Some(producer), Some(consumer)) = (instance_of(&from.id, from_copy), instance_of(&to.id, to_copy)) else {
                    continue;
                };
                let (shared, writer, reader) = RowSet::channel(
                    RowSetId(row_sets.len()),
                    format!("{}.{}", from.id, from_copy),
                    format!("{}.{}", to.id, to_copy),
                    capacity,
                    control.stop_token().clone(),
                );
                row_sets.push(shared);
                wiring[producer].outputs.push(writer);
                wiring[consumer].inputs.push(reader);
            }
        }

        for stage in &description.stages {
            let Some(handling) = stage.active_error_handling() else {
                continue;
            };
            let Some(target) = description.stage(&handling.target) else {
                continue;
            };
            for copy in 0..stage.copies {
                let target_copy = copy % target.copies;
                let (Some(producer), Some(consumer)) = (instance_of(&stage.id, copy), instance_of(&target.id, target_copy)) else {
                    continue;
                };
                let (shared, writer, reader) = RowSet::channel(
                    RowSetId(row_sets.len()),
                    format!("{}.{}", stage.id, copy),
                    format!("{}.{}", target.id, target_copy),
                    default_capacity,
                    control.stop_token().clone(),
                );
                row_sets.push(shared);
                wiring[producer].error_writer = Some(writer);
                wiring[consumer].inputs.push(reader);
            }
        }

        let mut runtimes = Vec::with_capacity(total);
        let mut instances = Vec::with_capacity(total);
        let mut wiring = wiring.into_iter();

        for stage in &description.stages {
            for copy in 0..stage.copies {
                let Wiring {
                    inputs,
                    outputs,
                    error_writer,
                } = wiring.next().unwrap_or_default();

                let transform = registry.create(stage, copy)?;
                let error_handler = match (stage.active_error_handling(), error_writer) {
                    (Some(handling), Some(writer)) => Some(ErrorHandler::new(handling.clone(), writer)),
                    _ => None,
                };

                let runtime = StageRuntime::new(
                    stage.id.clone(),
                    copy,
                    transform,
                    InputSet::new(inputs, control.stop_token().clone()),
                    outputs,
                    error_handler,
                    stage.data_movement,
                    control.clone(),
                );
                instances.push(Instance {
                    stage: stage.id.clone(),
                    copy,
                    source: runtime.is_source(),
                    sink: runtime.is_sink(),
                    counters: runtime.counters(),
                });
                runtimes.push(runtime);
            }
        }

        PipelineBuilt {
            pipeline: &description.name,
            stage_instances: runtimes.len(),
            row_sets: row_sets.len(),
        }
        .log();

        Ok(Self {
            name: description.name.clone(),
            runtimes,
            instances,
            row_sets,
            handles: Vec::new(),
            control,
            state: RunState::Prepared,
            started_at: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every row set of the arena, indexed by [`RowSetId`].
    pub fn row_sets(&self) -> &[Arc<RowSet>] {
        &self.row_sets
    }

    pub fn row_set(&self, id: RowSetId) -> Option<&Arc<RowSet>> {
        self.row_sets.get(id.0)
    }

    pub fn run_state(&self) -> RunState {
        match self.state {
            RunState::Running if self.control.is_stopped() => RunState::Stopped,
            state => state,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            pipeline: self.name.clone(),
            control: self.control.clone(),
        }
    }

    /// Stop every stage instance. Blocked queue operations return at once.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Stop source stages only and let the rest of the pipeline drain.
    pub fn safe_stop(&self) {
        self.stop_handle().safe_stop();
    }

    /// Initialise every stage instance, then spawn them all.
    ///
    /// When any instance fails to initialise nothing is spawned: the run is
    /// marked aborted with the failure counted and the configuration error is
    /// returned.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.state != RunState::Prepared {
            return Err(PipelineError::InvalidState(format!(
                "pipeline '{}' was already started",
                self.name
            )));
        }

        if let Some(error) = self.runtimes.iter_mut().find_map(|runtime| runtime.init().err()) {
            PipelinePreparationFailed {
                pipeline: &self.name,
                error: &error,
            }
            .log();
            self.control.record_error();
            self.control.abort();
            self.runtimes.clear();
            self.state = RunState::Finished;
            return Err(error);
        }

        self.started_at = Some(Instant::now());
        for runtime in self.runtimes.drain(..) {
            let span = StageStarted {
                stage: runtime.stage(),
                copy: runtime.copy(),
                inputs: 0,
                outputs: 0,
            }
            .span("stage_runtime");
            self.handles.push(tokio::spawn(runtime.run().instrument(span)));
        }
        self.state = RunState::Running;

        PipelineStarted {
            pipeline: &self.name,
            stage_instances: self.handles.len(),
        }
        .log();
        Ok(())
    }

    /// Wait for every stage instance to exit and report the outcome.
    pub async fn wait_until_finished(&mut self) -> Result<PipelineStatus, PipelineError> {
        match self.state {
            RunState::Prepared => {
                return Err(PipelineError::InvalidState(format!(
                    "pipeline '{}' was never started",
                    self.name
                )))
            }
            RunState::Finished => return Ok(self.status()),
            RunState::Running | RunState::Stopped => {}
        }

        let handles: Vec<_> = self.handles.drain(..).collect();
        for (instance, handle) in self.instances.iter().zip(handles) {
            if let Err(join_error) = handle.await {
                let error = PipelineError::Join {
                    stage: format!("{}.{}", instance.stage, instance.copy),
                    message: join_error.to_string(),
                };
                StageAborted {
                    stage: &instance.stage,
                    copy: instance.copy,
                    error: &error,
                }
                .log();
                instance.counters.set_state(StageState::Aborted);
                self.control.record_error();
                self.control.abort();
            }
        }
        self.state = RunState::Finished;

        let status = self.status();
        PipelineFinished {
            pipeline: &self.name,
            rows_in: status.rows_in,
            rows_out: status.rows_out,
            errors: status.errors,
            aborted: status.aborted,
            duration: self.started_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
        .log();
        Ok(status)
    }

    /// Start the pipeline and wait for it to finish.
    pub async fn execute(&mut self) -> Result<PipelineStatus, PipelineError> {
        self.start()?;
        self.wait_until_finished().await
    }

    /// Current counts; final once the run state is `Finished`.
    pub fn status(&self) -> PipelineStatus {
        let stages: Vec<StageStatus> = self
            .instances
            .iter()
            .map(|i| StageStatus::capture(&i.stage, i.copy, &i.counters))
            .collect();

        let rows_in: u64 = self
            .instances
            .iter()
            .filter(|i| i.source)
            .map(|i| i.counters.written())
            .sum();
        let rows_out: u64 = self
            .instances
            .iter()
            .filter(|i| i.sink)
            .map(|i| i.counters.written())
            .sum();

        PipelineStatus {
            pipeline: self.name.clone(),
            rows_in,
            rows_out,
            errors: self.control.errors(),
            aborted: self.control.is_aborted(),
            stages,
        }
    }

    /// Status of one stage summed over its copies.
    pub fn stage_status(&self, stage: &str) -> Option<StageStatus> {
        let mut copies = self.instances.iter().filter(|i| i.stage == stage).peekable();
        copies.peek()?;

        let mut total = StageStatus {
            stage: stage.to_string(),
            copy: 0,
            state: StageState::Prepared,
            read: 0,
            written: 0,
            rejected: 0,
            errors: 0,
        };
        for instance in copies {
            let status = StageStatus::capture(&instance.stage, instance.copy, &instance.counters);
            total.read += status.read;
            total.written += status.written;
            total.rejected += status.rejected;
            total.errors += status.errors;
            total.state = status.state;
        }
        Some(total)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Tasks still running when the pipeline is dropped would block on
        // queues nobody reads; release them.
        if !self.handles.is_empty() {
            self.control.stop_all();
        }
    }
}

/// Copy index pairs an edge expands to.
fn copy_pairs(
    from: &StageConfig,
    from_copy: Option<usize>,
    to: &StageConfig,
    to_copy: Option<usize>,
) -> Vec<(usize, usize)> {
    match (from_copy, to_copy) {
        (Some(f), Some(t)) => vec![(f, t)],
        (Some(f), None) => (0..to.copies).map(|t| (f, t)).collect(),
        (None, Some(t)) => (0..from.copies).map(|f| (f, t)).collect(),
        (None, None) if from.copies == to.copies => (0..from.copies).map(|c| (c, c)).collect(),
        (None, None) => (0..from.copies)
            .flat_map(|f| (0..to.copies).map(move |t| (f, t)))
            .collect(),
    }
}
