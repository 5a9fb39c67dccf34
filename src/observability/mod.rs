// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Every diagnostic and operational log line in the crate is produced from a
//! message type in [`messages`]. Message types are plain structs with a
//! `Display` implementation and a [`messages::StructuredLog`] implementation
//! that emits the message with its fields attached as `tracing` key/values.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - pipeline build, start, stop and completion events
//! * `messages::stage` - stage runtime lifecycle and per-row error routing
//! * `messages::validation` - pipeline description validation
//!
//! # Usage
//!
//! ```rust
//! use the_pipewood::observability::messages::stage::StageStarted;
//! use the_pipewood::observability::messages::StructuredLog;
//!
//! StageStarted {
//!     stage: "set_constant",
//!     copy: 0,
//!     inputs: 1,
//!     outputs: 2,
//! }
//! .log();
//! ```

pub mod messages;
