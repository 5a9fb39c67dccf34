// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;        // descriptions, validation, stage registry
pub mod engine;        // row sets, stage runtime, pipeline executor
pub mod errors;        // error handling
pub mod observability;
pub mod row;           // values, schemas, text conversion
pub mod stages;        // built-in stage types
pub mod traits;        // transform capability
