// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dead-Letter Queue Writer Port
//!
//! The append-only sink the bulk sink routes non-retryable and
//! retry-exhausted operations to. One file per sink instance, opened at
//! `initialize()` and released at `shutdown()`.

use async_trait::async_trait;

use crate::error::PipelineError;

#[async_trait]
pub trait DlqWriter: Send + Sync {
    /// Appends one newline-delimited JSON line to the dead-letter file.
    /// `line` must not itself contain a trailing newline.
    async fn write_line(&self, line: String) -> Result<(), PipelineError>;

    /// Flushes and releases the underlying file handle.
    async fn shutdown(&self) -> Result<(), PipelineError>;
}
