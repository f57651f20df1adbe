// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Buffer Port
//!
//! Many-producer/many-consumer queue contract with read-batch + checkpoint
//! semantics. Capacity and batch size are fixed at construction; a written
//! record is visible to at most one reader batch until that batch is
//! checkpointed or times out.

use std::time::Duration;

use async_trait::async_trait;

use crate::entities::event::Record;
use crate::error::PipelineError;
use crate::value_objects::checkpoint_token::CheckpointToken;

/// A bounded, concurrency-safe queue of [`Record`]s.
#[async_trait]
pub trait Buffer: Send + Sync {
    /// Writes one record, blocking up to `timeout` if the buffer is full.
    async fn write(&self, record: Record, timeout: Duration) -> Result<(), PipelineError>;

    /// Writes all records atomically against capacity: either every record
    /// fits, or none are written.
    async fn write_all(&self, records: Vec<Record>, timeout: Duration) -> Result<(), PipelineError>;

    /// Reads up to `max_batch` records. Returns immediately once `batch_size`
    /// records have accumulated, otherwise waits up to `timeout` and may
    /// return fewer than `max_batch`.
    async fn read(&self, max_batch: usize, timeout: Duration) -> Result<(Vec<Record>, CheckpointToken), PipelineError>;

    /// Acknowledges a batch as fully processed, releasing its capacity.
    async fn checkpoint(&self, token: CheckpointToken) -> Result<(), PipelineError>;

    async fn is_empty(&self) -> bool;

    async fn is_full(&self) -> bool;

    /// Drains pending writers with `Shutdown`, lets readers finish
    /// outstanding tokens, then refuses new operations.
    async fn shutdown(&self);
}
