// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Peer Forwarder Transport Port
//!
//! The wire boundary the peer forwarder uses to dispatch events it has
//! determined belong to a remote node. A non-2xx response causes the
//! caller to fall back to local processing of those events after logging.

use async_trait::async_trait;

use crate::entities::event::Event;
use crate::error::PipelineError;

#[async_trait]
pub trait PeerForwarderTransport: Send + Sync {
    /// POSTs `events` to `peer_endpoint` for `(pipeline_name, plugin_id)`.
    /// Returns `Ok(())` on a `200 OK`; any other outcome is represented as
    /// an `Err` so the caller can fall back to local processing.
    async fn send(&self, peer_endpoint: &str, pipeline_name: &str, plugin_id: &str, events: Vec<Event>) -> Result<(), PipelineError>;
}

/// Separator used when concatenating identification-key field values into
/// a single partition key. Chosen because it cannot appear in rendered
/// field values (an ASCII control character, not valid in JSON text).
pub const IDENTIFICATION_KEY_SEPARATOR: char = '\u{1f}';

/// Builds the partition key for `event` from the ordered identification
/// key field names a stateful processor declares. Returns `None` (meaning
/// "process locally, do not forward") if any key is missing.
pub fn partition_key(event: &Event, identification_keys: &[String]) -> Result<Option<String>, PipelineError> {
    let mut parts = Vec::with_capacity(identification_keys.len());
    for key in identification_keys {
        match event.get(key)? {
            Some(value) => parts.push(value.render()),
            None => return Ok(None),
        }
    }
    Ok(Some(parts.join(&IDENTIFICATION_KEY_SEPARATOR.to_string())))
}
