// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-row failures. Both variants are eligible for diversion to a stage's
//! error queue.

use thiserror::Error;

use crate::row::DataType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    /// A value could not be coerced to the target field's type/format.
    #[error("cannot convert '{value}' to {target} for field '{field}': {reason}")]
    Conversion {
        field: String,
        value: String,
        target: DataType,
        reason: String,
    },

    /// Any other per-row processing failure.
    #[error("{message}")]
    Runtime {
        message: String,
        field: Option<String>,
    },
}

impl RowError {
    pub fn runtime(message: impl Into<String>) -> Self {
        RowError::Runtime {
            message: message.into(),
            field: None,
        }
    }

    /// Name of the offending field, when the failure is attributable to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            RowError::Conversion { field, .. } => Some(field),
            RowError::Runtime { field, .. } => field.as_deref(),
        }
    }

    pub fn is_conversion(&self) -> bool {
        matches!(self, RowError::Conversion { .. })
    }
}
