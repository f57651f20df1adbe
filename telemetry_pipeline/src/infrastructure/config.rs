// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runtime Configuration
//!
//! Typed, `serde`-deserializable settings structs for every knob the
//! pipeline runtime exposes. Parsing these from a YAML/TOML file is a
//! collaborator concern outside this crate; these structs, and their
//! defaults, are the contract the loader would populate.

use serde::{Deserialize, Serialize};

/// Pipeline executor settings (spec §6 "Pipeline").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub workers: usize,
    pub read_batch_size: usize,
    pub read_timeout_ms: u64,
    pub delay_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            read_batch_size: 128,
            read_timeout_ms: 1000,
            delay_ms: 3000,
        }
    }
}

/// Bounded buffer settings (spec §6 "Buffer").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    pub buffer_size: usize,
    pub batch_size: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self { buffer_size: 512, batch_size: 128 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkActionKind {
    Index,
    Create,
}

impl Default for BulkActionKind {
    fn default() -> Self {
        BulkActionKind::Index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    TraceAnalyticsRaw,
    TraceAnalyticsServiceMap,
    Custom,
    ManagementDisabled,
}

/// Bulk sink settings (spec §6 "Bulk sink"). Credentials and TLS
/// material are represented as opaque strings here; validating or
/// sourcing them is a collaborator concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkSinkSettings {
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cert_path: Option<String>,
    pub socket_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub index_alias: String,
    pub index_type: IndexType,
    pub template_file: Option<String>,
    pub document_id_field: Option<String>,
    pub action: BulkActionKind,
    pub bulk_size_mb: f64,
    pub dlq_file: Option<String>,
    pub max_retries: Option<u32>,
    pub ism_policy_file: Option<String>,
    pub shutdown_timeout_ms: u64,
}

impl BulkSinkSettings {
    pub fn bulk_size_bytes(&self) -> usize {
        (self.bulk_size_mb * 1024.0 * 1024.0) as usize
    }
}

impl Default for BulkSinkSettings {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            username: None,
            password: None,
            cert_path: None,
            socket_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            index_alias: "otel-traces".to_string(),
            index_type: IndexType::Custom,
            template_file: None,
            document_id_field: None,
            action: BulkActionKind::Index,
            bulk_size_mb: 5.0,
            dlq_file: None,
            max_retries: None,
            ism_policy_file: None,
            shutdown_timeout_ms: 30_000,
        }
    }
}

/// Windowed service-map processor settings (spec §6 "Service-map processor").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceMapSettings {
    pub window_duration_seconds: u64,
    pub db_path: String,
}

impl Default for ServiceMapSettings {
    fn default() -> Self {
        Self {
            window_duration_seconds: 180,
            db_path: "/tmp/data-prepper/service-map".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryMode {
    LocalNode,
    Static,
    Dns,
    AwsCloudMap,
}

impl Default for DiscoveryMode {
    fn default() -> Self {
        DiscoveryMode::LocalNode
    }
}

/// Peer forwarder settings (spec §6 "Peer forwarder").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerForwarderSettings {
    pub discovery_mode: DiscoveryMode,
    pub static_endpoints: Vec<String>,
    pub port: u16,
    pub tls_enabled: bool,
    pub target_batch_size: usize,
    pub target_batch_timeout_ms: u64,
    pub virtual_nodes_per_peer: u32,
}

impl Default for PeerForwarderSettings {
    fn default() -> Self {
        Self {
            discovery_mode: DiscoveryMode::LocalNode,
            static_endpoints: Vec::new(),
            port: 4994,
            tls_enabled: false,
            target_batch_size: 48,
            target_batch_timeout_ms: 3000,
            virtual_nodes_per_peer: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults_match_spec() {
        let s = PipelineSettings::default();
        assert_eq!(s.workers, 1);
        assert_eq!(s.read_batch_size, 128);
        assert_eq!(s.read_timeout_ms, 1000);
        assert_eq!(s.delay_ms, 3000);
    }

    #[test]
    fn buffer_defaults_match_spec() {
        let s = BufferSettings::default();
        assert_eq!(s.buffer_size, 512);
        assert_eq!(s.batch_size, 128);
    }

    #[test]
    fn bulk_size_bytes_converts_from_mb() {
        let s = BulkSinkSettings { bulk_size_mb: 5.0, ..Default::default() };
        assert_eq!(s.bulk_size_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn service_map_defaults_match_spec() {
        let s = ServiceMapSettings::default();
        assert_eq!(s.window_duration_seconds, 180);
        assert_eq!(s.db_path, "/tmp/data-prepper/service-map");
    }

    #[test]
    fn peer_forwarder_defaults_are_local_only() {
        let s = PeerForwarderSettings::default();
        assert_eq!(s.discovery_mode, DiscoveryMode::LocalNode);
        assert_eq!(s.virtual_nodes_per_peer, 10);
    }
}
