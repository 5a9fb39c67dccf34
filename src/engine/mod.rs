// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod error_handler;
pub mod pipeline;
pub mod rowset;
pub mod runtime;
#[cfg(test)]
mod integration_tests;

pub use error_handler::{Diversion, ErrorHandler};
pub use pipeline::{Pipeline, PipelineStatus, RunState, StopHandle};
pub use rowset::{InputSet, Record, RowSet, RowSetId, RowSetReader, RowSetWriter};
pub use runtime::{RunControl, StageCounters, StageRuntime, StageState, StageStatus};
