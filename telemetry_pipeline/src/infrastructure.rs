// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! The infrastructure layer provides concrete implementations of the domain
//! ports and handles all external system interaction: HTTP to the bulk
//! cluster and to peer nodes, on-disk window storage, the dead-letter-queue
//! file, metrics, and logging.
//!
//! ## Module Structure
//!
//! ```text
//! infrastructure/
//! ├── adapters/    # BulkCluster, IndexManager, WindowStore, DlqWriter,
//! │                # PeerForwarderTransport implementations
//! ├── config/      # Runtime-settings structures (YAML parsing of these is
//! │                # a collaborator concern outside this crate)
//! ├── logging/     # tracing-subscriber setup
//! └── metrics/     # Prometheus registry and metric definitions
//! ```
//!
//! ## Design Principles
//!
//! ### Dependency Inversion
//! The infrastructure layer implements traits defined by the domain layer. It
//! depends on domain abstractions, never the reverse.
//!
//! ### Error Translation
//! Infrastructure adapters translate external errors (HTTP failures, I/O
//! errors, SQL errors) into `PipelineError` at the port boundary so the
//! application layer never sees a foreign error type.

pub mod adapters;
pub mod config;
pub mod logging;
pub mod metrics;
