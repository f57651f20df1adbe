// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Telemetry Pipeline
//!
//! A runtime for observability pipelines: events flow from a source through
//! a bounded buffer, a chain of processors, and out to one or more sinks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Application Layer                         │
//! │  (PipelineExecutor, BoundedBuffer, peer forwarding, bulk    │
//! │   sink, windowed stateful processor)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Domain Layer                             │
//! │  (Event/Record, Value, ports: Buffer/Processor/Sink/         │
//! │   BulkCluster/PeerForwarderTransport/WindowStore)            │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Infrastructure Layer                         │
//! │  (HTTP bulk cluster and peer transport, index management,    │
//! │   SQLite window storage, file-backed DLQ, config, metrics)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Buffers, sinks, and processors are all ports defined in
//! `telemetry_pipeline_domain`; this crate provides the concrete
//! application-layer implementations and wires them to infrastructure
//! adapters. Process-level concerns (signal handling, shutdown
//! coordination, CLI argument parsing) live in `telemetry_pipeline_bootstrap`.

pub mod application;
pub mod infrastructure;

// Tests are organized as #[cfg(test)] modules within each source file.

pub use telemetry_pipeline_domain::entities::event::{Event, EventMetadata, Record};
pub use telemetry_pipeline_domain::error::PipelineError;
pub use telemetry_pipeline_domain::value_objects::value::Value;
