// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod execution;
mod row;

pub use config::ValidationError;
pub use execution::{PipelineError, RowSetError};
pub use row::RowError;
