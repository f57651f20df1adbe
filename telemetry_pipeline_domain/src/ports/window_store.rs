// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Window Store Port
//!
//! An ordered on-disk map backing one side of a rotating window (span
//! window or trace-group window). Keys are byte arrays compared
//! lexicographically. `get_iterator` yields a deterministic partition of
//! the entries without materializing the whole map, so `evaluate_edges`
//! can shard work across workers.

use async_trait::async_trait;

use crate::error::PipelineError;

#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), PipelineError>;

    async fn put_all(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), PipelineError>;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PipelineError>;

    async fn size(&self) -> Result<u64, PipelineError>;

    async fn size_in_bytes(&self) -> Result<u64, PipelineError>;

    async fn clear(&self) -> Result<(), PipelineError>;

    async fn delete(&self, key: &[u8]) -> Result<(), PipelineError>;

    /// Streams the subset of entries whose key hashes to `shard_id` out of
    /// `total_shards`, without materializing the whole map in memory.
    async fn get_iterator(&self, total_shards: u32, shard_id: u32) -> Result<Vec<(Vec<u8>, Vec<u8>)>, PipelineError>;

    /// Rotates this window's backing storage to a new generation named
    /// `label` (e.g. `db-<epoch-ms>` or `db-<epoch-ms>-empty`, per
    /// spec.md §6's window storage layout), preserving whatever content
    /// it currently holds under the new identity. A file-backed store
    /// renames its file and reopens; the exact identity scheme is
    /// backend-defined.
    async fn rotate_generation(&self, label: &str) -> Result<(), PipelineError>;

    /// Releases the backing storage entirely (e.g. unlinks the on-disk
    /// file). Called once at pipeline shutdown, after the last reader has
    /// finished. Default no-op for backends with nothing to release.
    async fn unlink(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}
