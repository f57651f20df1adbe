// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging
//!
//! A single entry point that installs a `tracing-subscriber` `fmt` layer
//! driven by `RUST_LOG`. Log *sink* configuration (file rotation, syslog,
//! structured JSON export) is a collaborator concern outside this crate;
//! every component here logs through `tracing::{info,debug,warn,error}!`
//! and `#[tracing::instrument]` at the same density the rest of the
//! runtime uses them.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a global `tracing` subscriber. Safe to call once at process
/// start; a second call is a no-op (the underlying `try_init` swallows
/// the "already set" error).
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
