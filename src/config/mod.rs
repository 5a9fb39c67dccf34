// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod dependency_graph;
mod loader;
mod registry;
mod validation;

pub mod consts;

pub use dependency_graph::StageGraph;
pub use loader::{
    load_and_validate_description, load_description, parse_description, DataMovement,
    EdgeConfig, ErrorHandlingConfig, PipelineDescription, PipelineOptions, StageConfig,
};
pub use registry::TransformRegistry;
pub use validation::validate_description;
