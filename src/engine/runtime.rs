// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution loop of one stage instance.
//!
//! A [`StageRuntime`] owns everything a stage copy needs: its transform, the
//! reader side of its input row sets, the writer side of its output row sets
//! and its optional error handler. The pipeline spawns one tokio task per
//! runtime and talks to it only through [`RunControl`] and the shared
//! [`StageCounters`].
//!
//! # Loop
//!
//! ```text
//! ┌─► stop requested? ──yes──► exit (stopped)
//! │        │ no
//! │   read next row ──end of stream──► exit (finished)
//! │        │
//! │   first row? ──► resolve output schema, bind target fields
//! │        │
//! │   step(row) ──► Emit ──► put to outputs ─────────┐
//! │        ├──────► NoMoreInput ──► exit (finished)  │
//! │        └──────► Failed ──► divert or abort       │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Every exit path marks the outputs and the error queue done exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::consts::SCHEMA_MISMATCH_ERROR_CODE;
use crate::config::DataMovement;
use crate::engine::error_handler::{Diversion, ErrorHandler};
use crate::engine::rowset::{InputSet, Record, RowSetWriter};
use crate::errors::{PipelineError, RowError};
use crate::observability::messages::stage::{
    ErrorThresholdExceeded, OutputSchemaResolved, RowDiverted, StageAborted, StageFinished,
    StageStarted,
};
use crate::observability::messages::StructuredLog;
use crate::row::{Row, Schema};
use crate::traits::{RowFailure, StepOutcome, Transform};

/// Pipeline-wide run state shared by every stage instance.
#[derive(Debug, Clone)]
pub struct RunControl {
    stop: CancellationToken,
    source_stop: CancellationToken,
    errors: Arc<AtomicU64>,
    aborted: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        let stop = CancellationToken::new();
        let source_stop = stop.child_token();
        Self {
            stop,
            source_stop,
            errors: Arc::new(AtomicU64::new(0)),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Token cancelled by a pipeline-wide stop.
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Stop every stage instance.
    pub fn stop_all(&self) {
        self.stop.cancel();
    }

    /// Stop source stages only; a full stop implies this.
    pub fn stop_sources(&self) {
        self.source_stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn sources_stopped(&self) -> bool {
        self.source_stop.is_cancelled()
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    /// Mark the run as failed and stop every stage.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.stop_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of one stage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Prepared,
    Running,
    /// Input exhausted or the transform declared it was done.
    Finished,
    /// Ended by a stop request or a closed queue.
    Stopped,
    /// Ended by a failure that stopped the pipeline.
    Aborted,
}

impl StageState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => StageState::Running,
            2 => StageState::Finished,
            3 => StageState::Stopped,
            4 => StageState::Aborted,
            _ => StageState::Prepared,
        }
    }
}

/// Live counters of one stage instance, readable while it runs.
#[derive(Debug, Default)]
pub struct StageCounters {
    read: AtomicU64,
    written: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
    state: AtomicU8,
}

impl StageCounters {
    pub(crate) fn set_state(&self, state: StageState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn state(&self) -> StageState {
        StageState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn read(&self) -> u64 {
        self.read.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }
}

/// Snapshot of one stage instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    pub stage: String,
    pub copy: usize,
    pub state: StageState,
    pub read: u64,
    pub written: u64,
    pub rejected: u64,
    pub errors: u64,
}

impl StageStatus {
    pub fn capture(stage: &str, copy: usize, counters: &StageCounters) -> Self {
        Self {
            stage: stage.to_string(),
            copy,
            state: counters.state(),
            read: counters.read(),
            written: counters.written(),
            rejected: counters.rejected(),
            errors: counters.errors(),
        }
    }
}

enum Exit {
    Finished,
    Stopped,
    Aborted,
}

/// Schema state fixed by the first row.
struct Resolved {
    input: Arc<Schema>,
    output: Arc<Schema>,
}

pub struct StageRuntime {
    stage: String,
    copy: usize,
    transform: Box<dyn Transform>,
    inputs: InputSet,
    outputs: Vec<RowSetWriter>,
    error_handler: Option<ErrorHandler>,
    data_movement: DataMovement,
    next_output: usize,
    /// Rows read, or for a source the rows it produced or failed.
    processed: u64,
    resolved: Option<Resolved>,
    control: RunControl,
    counters: Arc<StageCounters>,
}

impl StageRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stage: impl Into<String>,
        copy: usize,
        transform: Box<dyn Transform>,
        inputs: InputSet,
        outputs: Vec<RowSetWriter>,
        error_handler: Option<ErrorHandler>,
        data_movement: DataMovement,
        control: RunControl,
    ) -> Self {
        Self {
            stage: stage.into(),
            copy,
            transform,
            inputs,
            outputs,
            error_handler,
            data_movement,
            next_output: 0,
            processed: 0,
            resolved: None,
            control,
            counters: Arc::new(StageCounters::default()),
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn copy(&self) -> usize {
        self.copy
    }

    pub fn counters(&self) -> Arc<StageCounters> {
        self.counters.clone()
    }

    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn is_sink(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Validate the transform's configuration. Runs before any instance of
    /// the pipeline is started.
    pub fn init(&mut self) -> Result<(), PipelineError> {
        self.transform.init()
    }

    /// Run the stage loop to completion.
    pub async fn run(mut self) -> StageStatus {
        StageStarted {
            stage: &self.stage,
            copy: self.copy,
            inputs: self.inputs.len(),
            outputs: self.outputs.len(),
        }
        .log();
        self.counters.set_state(StageState::Running);

        let state = match self.run_loop().await {
            Exit::Finished => StageState::Finished,
            Exit::Stopped => StageState::Stopped,
            Exit::Aborted => StageState::Aborted,
        };
        self.finish();
        self.counters.set_state(state);

        let status = StageStatus::capture(&self.stage, self.copy, &self.counters);
        StageFinished {
            stage: &self.stage,
            copy: self.copy,
            read: status.read,
            written: status.written,
            rejected: status.rejected,
            errors: status.errors,
        }
        .log();
        status
    }

    async fn run_loop(&mut self) -> Exit {
        if self.is_source() {
            if let Err(error) = self.resolve(Arc::new(Schema::new())) {
                return self.abort(&error);
            }
        }

        loop {
            let record = if self.is_source() {
                if self.control.sources_stopped() {
                    return Exit::Stopped;
                }
                None
            } else if self.control.is_stopped() {
                // Stopped: finish rows already queued for us, never wait for more.
                match self.inputs.try_get() {
                    Some(record) => Some(record),
                    None => return Exit::Stopped,
                }
            } else {
                match self.inputs.get().await {
                    Ok(Some(record)) => Some(record),
                    Ok(None) => return Exit::Finished,
                    Err(_) => continue,
                }
            };
            if record.is_some() {
                self.processed += 1;
                self.counters.read.fetch_add(1, Ordering::SeqCst);
            }

            if let Some(record) = &record {
                if self.resolved.is_none() {
                    if let Err(error) = self.resolve(record.schema.clone()) {
                        return self.abort(&error);
                    }
                }
                if let Some(failure) = self.schema_mismatch(record) {
                    if let Some(exit) = self.handle_failure(Some(record.clone()), failure).await {
                        return exit;
                    }
                    continue;
                }
            }

            // Keep a copy of the input only when it may have to be diverted.
            let retained = match (&record, &self.error_handler) {
                (Some(record), Some(_)) => Some(record.clone()),
                _ => None,
            };

            let is_source = record.is_none();
            let outcome = self.transform.step(record.map(|r| r.row)).await;
            if is_source && !matches!(outcome, StepOutcome::NoMoreInput) {
                self.processed += 1;
            }

            match outcome {
                StepOutcome::Emit(rows) => {
                    if let Some(exit) = self.emit(rows).await {
                        return exit;
                    }
                }
                StepOutcome::NoMoreInput => return Exit::Finished,
                StepOutcome::Failed(failure) => {
                    if let Some(exit) = self.handle_failure(retained, failure).await {
                        return exit;
                    }
                }
            }
        }
    }

    /// Lazy first-row setup: derive the output schema and bind the
    /// transform's target fields to their positions.
    fn resolve(&mut self, input: Arc<Schema>) -> Result<(), PipelineError> {
        let output = self.transform.output_schema(input.as_ref().clone())?;
        let targets = self.transform.target_fields();

        let mut positions = Vec::with_capacity(targets.len());
        for (i, name) in targets.iter().enumerate() {
            if targets[..i].iter().any(|t| t.eq_ignore_ascii_case(name)) {
                return Err(PipelineError::configuration(
                    &self.stage,
                    format!("field '{}' is targeted more than once", name),
                ));
            }
            let position = output.index_of(name).ok_or_else(|| {
                PipelineError::configuration(
                    &self.stage,
                    format!("field '{}' not found in the stream", name),
                )
            })?;
            positions.push(position);
        }
        self.transform.bind(&output, &positions)?;

        OutputSchemaResolved {
            stage: &self.stage,
            copy: self.copy,
            fields: &output.field_names(),
        }
        .log();

        self.resolved = Some(Resolved {
            input,
            output: Arc::new(output),
        });
        Ok(())
    }

    fn schema_mismatch(&self, record: &Record) -> Option<RowFailure> {
        let resolved = self.resolved.as_ref()?;
        let same_schema = Arc::ptr_eq(&resolved.input, &record.schema)
            || resolved.input.as_ref() == record.schema.as_ref();

        let message = if !same_schema {
            format!(
                "row schema [{}] differs from the stream schema [{}]",
                record.schema.field_names().join(", "),
                resolved.input.field_names().join(", ")
            )
        } else if record.row.len() != resolved.input.len() {
            format!(
                "row has {} values, the stream schema has {} fields",
                record.row.len(),
                resolved.input.len()
            )
        } else {
            return None;
        };

        Some(RowFailure::new(SCHEMA_MISMATCH_ERROR_CODE, RowError::runtime(message)))
    }

    async fn emit(&mut self, rows: Vec<Row>) -> Option<Exit> {
        let schema = match &self.resolved {
            Some(resolved) => resolved.output.clone(),
            None => Arc::new(Schema::new()),
        };

        for row in rows {
            if !self.outputs.is_empty() {
                let delivered = match self.data_movement {
                    DataMovement::Copy => self.put_all(&schema, row).await,
                    DataMovement::Distribute => self.put_next(&schema, row).await,
                };
                if !delivered {
                    return Some(Exit::Stopped);
                }
            }
            self.counters.written.fetch_add(1, Ordering::SeqCst);
        }
        None
    }

    async fn put_all(&mut self, schema: &Arc<Schema>, row: Row) -> bool {
        let last = self.outputs.len().saturating_sub(1);
        let mut row = Some(row);
        for (i, output) in self.outputs.iter_mut().enumerate() {
            let row = if i == last {
                row.take()
            } else {
                row.clone()
            };
            let Some(row) = row else { return false };
            if output.put(Record::new(schema.clone(), row)).await.is_err() {
                return false;
            }
        }
        true
    }

    async fn put_next(&mut self, schema: &Arc<Schema>, row: Row) -> bool {
        let index = self.next_output % self.outputs.len();
        self.next_output = (index + 1) % self.outputs.len();
        self.outputs[index]
            .put(Record::new(schema.clone(), row))
            .await
            .is_ok()
    }

    async fn handle_failure(&mut self, record: Option<Record>, failure: RowFailure) -> Option<Exit> {
        let processed = self.processed;
        let Some(handler) = self.error_handler.as_mut() else {
            return Some(self.abort(&failure.error));
        };

        match handler.divert(record, &failure, processed).await {
            Diversion::Diverted => {
                self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                self.control.record_error();
                RowDiverted {
                    stage: &self.stage,
                    copy: self.copy,
                    code: &failure.code,
                    error: &failure.error,
                }
                .log();
                None
            }
            Diversion::ThresholdExceeded(threshold) => {
                ErrorThresholdExceeded {
                    stage: &self.stage,
                    copy: self.copy,
                    rejected: handler.rejected(),
                    threshold: &threshold,
                }
                .log();
                Some(self.abort(&failure.error))
            }
            Diversion::Closed => Some(Exit::Stopped),
        }
    }

    fn abort(&self, error: &dyn std::error::Error) -> Exit {
        self.counters.errors.fetch_add(1, Ordering::SeqCst);
        self.control.record_error();
        StageAborted {
            stage: &self.stage,
            copy: self.copy,
            error,
        }
        .log();
        self.control.abort();
        Exit::Aborted
    }

    fn finish(&mut self) {
        for output in &mut self.outputs {
            output.mark_done();
        }
        if let Some(handler) = self.error_handler.as_mut() {
            handler.mark_done();
        }
    }
}
