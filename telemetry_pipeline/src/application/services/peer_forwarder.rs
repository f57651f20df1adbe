// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Peer Forwarder
//!
//! Ensures that all events sharing an identification key land on the same
//! node, so stateful processors (C6) can correlate across a batch without
//! cross-node coordination. `LocalPeerForwarder` short-circuits to
//! all-local when discovery is local-only or only one peer is configured.

use std::collections::HashMap;
use std::sync::Arc;

use telemetry_pipeline_domain::entities::event::Record;
use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::peer_transport::{partition_key, PeerForwarderTransport};
use tokio::sync::RwLock;
use tracing::warn;

use super::bounded_buffer::BoundedBuffer;
use super::hash_ring::{HashRing, PeerId};
use crate::infrastructure::config::PeerForwarderSettings;

/// Outcome of partitioning one batch: events that stay local, and events
/// grouped by the remote peer they must be forwarded to.
pub struct ForwardResult {
    pub local_batch: Vec<Record>,
    pub per_peer_batches: HashMap<PeerId, Vec<Record>>,
}

/// Per-(pipeline, plugin) inbound queue for peer-forwarded events.
pub type ReceiveBufferKey = (String, String);

pub struct LocalPeerForwarder {
    ring: HashRing,
    local_peer_id: PeerId,
    local_only: bool,
    transport: Arc<dyn PeerForwarderTransport>,
    peer_endpoints: HashMap<PeerId, String>,
    receive_buffers: RwLock<HashMap<ReceiveBufferKey, Arc<BoundedBuffer>>>,
}

impl LocalPeerForwarder {
    pub fn new(settings: &PeerForwarderSettings, local_peer_id: impl Into<String>, transport: Arc<dyn PeerForwarderTransport>) -> Self {
        let local_peer_id = local_peer_id.into();
        // Endpoints double as peer ids; build a stable peer list including self.
        let mut peers: Vec<PeerId> = settings.static_endpoints.clone();
        if !peers.contains(&local_peer_id) {
            peers.push(local_peer_id.clone());
        }
        let peer_endpoints: HashMap<PeerId, String> = peers.iter().cloned().map(|p| (p.clone(), p)).collect();
        let local_only = matches!(settings.discovery_mode, crate::infrastructure::config::DiscoveryMode::LocalNode) || peers.len() <= 1;

        Self {
            ring: HashRing::new(&peers, settings.virtual_nodes_per_peer),
            local_peer_id,
            local_only,
            transport,
            peer_endpoints,
            receive_buffers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_receive_buffer(&self, pipeline_name: impl Into<String>, plugin_id: impl Into<String>, buffer: Arc<BoundedBuffer>) {
        let mut guard = self.receive_buffers.write().await;
        guard.insert((pipeline_name.into(), plugin_id.into()), buffer);
    }

    pub async fn receive_buffer(&self, pipeline_name: &str, plugin_id: &str) -> Option<Arc<BoundedBuffer>> {
        let guard = self.receive_buffers.read().await;
        guard.get(&(pipeline_name.to_string(), plugin_id.to_string())).cloned()
    }

    /// Partitions `batch` into events that stay local and events grouped
    /// by destination peer, using `identification_keys` to compute each
    /// event's partition key. Events missing any identification key are
    /// treated as local (no forwarding).
    pub fn partition(&self, batch: Vec<Record>, identification_keys: &[String]) -> Result<ForwardResult, PipelineError> {
        let mut local_batch = Vec::new();
        let mut per_peer_batches: HashMap<PeerId, Vec<Record>> = HashMap::new();

        if self.local_only {
            return Ok(ForwardResult { local_batch: batch, per_peer_batches });
        }

        for record in batch {
            let key = partition_key(&record.event, identification_keys)?;
            match key {
                None => local_batch.push(record),
                Some(key) => match self.ring.peer_for_key(&key) {
                    Some(peer) if *peer == self.local_peer_id => local_batch.push(record),
                    Some(peer) => per_peer_batches.entry(peer.clone()).or_default().push(record),
                    None => local_batch.push(record),
                },
            }
        }

        Ok(ForwardResult { local_batch, per_peer_batches })
    }

    /// Dispatches each peer's batch over the transport. On a non-2xx
    /// response or transport error, that peer's events are logged and
    /// folded back into `fallback_local` for local processing.
    pub async fn forward(&self, pipeline_name: &str, plugin_id: &str, batch: Vec<Record>, identification_keys: &[String]) -> Result<Vec<Record>, PipelineError> {
        let ForwardResult { mut local_batch, per_peer_batches } = self.partition(batch, identification_keys)?;

        for (peer, records) in per_peer_batches {
            let endpoint = match self.peer_endpoints.get(&peer) {
                Some(e) => e.clone(),
                None => {
                    warn!(peer = %peer, "no endpoint registered for peer, processing locally");
                    local_batch.extend(records);
                    continue;
                }
            };
            let events: Vec<_> = records.iter().map(|r| r.event.clone()).collect();
            match self.transport.send(&endpoint, pipeline_name, plugin_id, events).await {
                Ok(()) => {}
                Err(err) => {
                    warn!(peer = %peer, error = %err, "peer forward failed, falling back to local processing");
                    local_batch.extend(records);
                }
            }
        }

        Ok(local_batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use telemetry_pipeline_domain::entities::event::Event;
    use telemetry_pipeline_domain::value_objects::value::Value;

    struct CountingTransport {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl PeerForwarderTransport for CountingTransport {
        async fn send(&self, _peer_endpoint: &str, _pipeline_name: &str, _plugin_id: &str, events: Vec<telemetry_pipeline_domain::entities::event::Event>) -> Result<(), PipelineError> {
            self.sent.fetch_add(events.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn record_with_trace(id: &str) -> Record {
        let mut e = Event::new("TRACE");
        e.put("traceId", Value::String(id.to_string())).unwrap();
        Record::new(e)
    }

    fn settings(endpoints: Vec<String>) -> PeerForwarderSettings {
        PeerForwarderSettings {
            discovery_mode: crate::infrastructure::config::DiscoveryMode::Static,
            static_endpoints: endpoints,
            ..Default::default()
        }
    }

    #[test]
    fn local_only_short_circuits() {
        let transport = Arc::new(CountingTransport { sent: AtomicUsize::new(0) });
        let forwarder = LocalPeerForwarder::new(&PeerForwarderSettings::default(), "node-0", transport);
        let batch = vec![record_with_trace("t1")];
        let result = forwarder.partition(batch, &["traceId".to_string()]).unwrap();
        assert_eq!(result.local_batch.len(), 1);
        assert!(result.per_peer_batches.is_empty());
    }

    #[test]
    fn missing_identification_key_is_local() {
        let transport = Arc::new(CountingTransport { sent: AtomicUsize::new(0) });
        let forwarder = LocalPeerForwarder::new(&settings(vec!["node-0".into(), "node-1".into()]), "node-0", transport);
        let batch = vec![Record::new(Event::new("TRACE"))];
        let result = forwarder.partition(batch, &["traceId".to_string()]).unwrap();
        assert_eq!(result.local_batch.len(), 1);
    }

    #[test]
    fn partition_is_deterministic_for_fixed_ring() {
        let transport = Arc::new(CountingTransport { sent: AtomicUsize::new(0) });
        let peers = vec!["node-0".to_string(), "node-1".to_string()];
        let forwarder_a = LocalPeerForwarder::new(&settings(peers.clone()), "node-0", transport.clone());
        let forwarder_b = LocalPeerForwarder::new(&settings(peers), "node-1", transport);

        let batch_a = vec![record_with_trace("T1")];
        let batch_b = vec![record_with_trace("T1")];
        let result_a = forwarder_a.partition(batch_a, &["traceId".to_string()]).unwrap();
        let result_b = forwarder_b.partition(batch_b, &["traceId".to_string()]).unwrap();
        // Exactly one of the two nodes treats T1 as local; the other forwards it.
        assert_ne!(result_a.local_batch.is_empty(), result_b.local_batch.is_empty());
    }
}
