// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bulk Cluster Port
//!
//! The transport boundary the bulk sink submits accumulated requests
//! through. A single diagnostic probe lets the retry policy distinguish a
//! recoverable network blip from a permanent connectivity loss on a
//! whole-request failure.

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::value_objects::bulk::{AccumulatingBulkRequest, BulkResponseEntry};

#[async_trait]
pub trait BulkCluster: Send + Sync {
    /// Submits the wire payload for `request` and returns one response
    /// entry per operation, in request order. An `Err` return means the
    /// whole request failed at the transport level (network/connection
    /// error) rather than any individual operation being rejected.
    async fn submit(&self, request: &AccumulatingBulkRequest) -> Result<Vec<BulkResponseEntry>, PipelineError>;

    /// Lightweight reachability check used after a whole-request failure
    /// to decide whether to keep retrying or treat the cluster as down.
    async fn probe(&self) -> Result<(), PipelineError>;
}

/// Index management collaborator invoked once per sink lifecycle, before
/// the first flush.
#[async_trait]
pub trait IndexManager: Send + Sync {
    /// Ensures the target index/alias/template exists per the configured
    /// strategy. Failures are fatal to sink initialization.
    async fn ensure_ready(&self) -> Result<(), PipelineError>;
}
