// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTTP Peer Forwarder Transport
//!
//! Dispatches peer-forwarded batches over HTTP/2 POST, per spec §6's
//! peer-forwarder RPC: `{ "pipelineName", "pluginId", "events": [...] }`,
//! expecting an empty `200 OK`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use telemetry_pipeline_domain::entities::event::Event;
use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::peer_transport::PeerForwarderTransport;

#[derive(Serialize)]
struct PeerForwardRequest<'a> {
    #[serde(rename = "pipelineName")]
    pipeline_name: &'a str,
    #[serde(rename = "pluginId")]
    plugin_id: &'a str,
    events: Vec<&'a Event>,
}

pub struct HttpPeerForwarderTransport {
    client: reqwest::Client,
}

impl HttpPeerForwarderTransport {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .http2_prior_knowledge()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| PipelineError::invalid_config(format!("failed to build peer forwarder client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PeerForwarderTransport for HttpPeerForwarderTransport {
    async fn send(&self, peer_endpoint: &str, pipeline_name: &str, plugin_id: &str, events: Vec<Event>) -> Result<(), PipelineError> {
        let body = PeerForwardRequest { pipeline_name, plugin_id, events: events.iter().collect() };
        let response = self
            .client
            .post(peer_endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::io_error(format!("peer forward to {peer_endpoint} failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PipelineError::io_error(format!("peer {peer_endpoint} responded {}", response.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_configured_timeouts() {
        let transport = HttpPeerForwarderTransport::new(Duration::from_millis(500), Duration::from_secs(3));
        assert!(transport.is_ok());
    }
}
