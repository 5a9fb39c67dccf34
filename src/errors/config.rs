// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors that can occur while validating a pipeline description
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A cycle was detected in the stage graph
    CyclicDependency {
        /// The cycle path, first stage repeated at the end
        cycle: Vec<String>,
    },
    /// An edge names a stage that doesn't exist
    UnresolvedStage {
        /// The edge in `source -> target` form
        edge: String,
        /// The stage that couldn't be resolved
        missing_stage: String,
    },
    /// A stage has a duplicate ID
    DuplicateStageId {
        /// The duplicate stage ID
        stage_id: String,
    },
    /// An edge references a copy index the stage doesn't have
    CopyOutOfRange {
        stage_id: String,
        copy: usize,
        copies: usize,
    },
    /// A stage is configured with zero copies
    NoCopies {
        stage_id: String,
    },
    /// An edge or the pipeline default asks for a zero-sized queue
    ZeroCapacity {
        /// The edge in `source -> target` form, or `default`
        edge: String,
    },
    /// The error handling target of a stage doesn't exist
    UnresolvedErrorTarget {
        stage_id: String,
        target: String,
    },
    /// Two error fields of one stage share a name (case-insensitive)
    DuplicateErrorField {
        stage_id: String,
        field: String,
    },
    /// No factory is registered for a stage type
    UnknownStageType {
        stage_id: String,
        stage_type: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CyclicDependency { cycle } => {
                write!(f, "Cyclic dependency detected: {}", cycle.join(" -> "))
            }
            ValidationError::UnresolvedStage { edge, missing_stage } => {
                write!(
                    f,
                    "Edge '{}' references stage '{}' which does not exist",
                    edge, missing_stage
                )
            }
            ValidationError::DuplicateStageId { stage_id } => {
                write!(f, "Duplicate stage ID: '{}'", stage_id)
            }
            ValidationError::CopyOutOfRange {
                stage_id,
                copy,
                copies,
            } => {
                write!(
                    f,
                    "Stage '{}' has {} copies, copy index {} is out of range",
                    stage_id, copies, copy
                )
            }
            ValidationError::NoCopies { stage_id } => {
                write!(f, "Stage '{}' must run at least one copy", stage_id)
            }
            ValidationError::ZeroCapacity { edge } => {
                write!(f, "Queue capacity for '{}' must be greater than zero", edge)
            }
            ValidationError::UnresolvedErrorTarget { stage_id, target } => {
                write!(
                    f,
                    "Stage '{}' sends error rows to '{}' which does not exist",
                    stage_id, target
                )
            }
            ValidationError::DuplicateErrorField { stage_id, field } => {
                write!(
                    f,
                    "Stage '{}' names error field '{}' more than once",
                    stage_id, field
                )
            }
            ValidationError::UnknownStageType {
                stage_id,
                stage_type,
            } => {
                write!(
                    f,
                    "Stage '{}' has unknown type '{}'",
                    stage_id, stage_type
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}
