// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTTP Bulk Cluster
//!
//! `BulkCluster` implementation over a bulk-capable HTTP endpoint (an
//! OpenSearch/Elasticsearch-style `_bulk` API). Submits the accumulator's
//! newline-delimited wire payload and classifies each `items[]` entry of
//! the response into a [`BulkResponseEntry`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::bulk_cluster::BulkCluster;
use telemetry_pipeline_domain::value_objects::bulk::{AccumulatingBulkRequest, BulkErrorKind, BulkResponseEntry};

use crate::infrastructure::config::BulkSinkSettings;

#[derive(Debug, Deserialize)]
struct BulkApiResponse {
    items: Vec<std::collections::HashMap<String, BulkApiItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkApiItem {
    status: u16,
    #[serde(default)]
    error: Option<BulkApiError>,
}

#[derive(Debug, Deserialize)]
struct BulkApiError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Classifies one item's `(status, error.type)` into a [`BulkErrorKind`],
/// per spec §4.4's retry classification rules.
fn classify(status: u16, error: Option<&BulkApiError>) -> BulkErrorKind {
    match error {
        None if (200..300).contains(&status) => BulkErrorKind::None,
        Some(e) if e.kind.contains("version_conflict") => BulkErrorKind::VersionConflict,
        Some(_) if status == 429 => BulkErrorKind::TooManyRequests,
        Some(e) if e.kind.contains("rejected") || e.kind.contains("es_rejected") => BulkErrorKind::Rejected,
        Some(_) if status >= 500 => BulkErrorKind::ServerError,
        Some(e)
            if e.kind.contains("mapper_parsing")
                || e.kind.contains("parse_exception")
                || e.kind.contains("illegal_argument")
                || e.kind.contains("document_missing") =>
        {
            BulkErrorKind::DocumentLevel
        }
        Some(_) => BulkErrorKind::Unknown,
        None => BulkErrorKind::Unknown,
    }
}

pub struct HttpBulkCluster {
    client: reqwest::Client,
    hosts: Vec<String>,
    next_host: AtomicUsize,
    credentials: Option<(String, String)>,
}

impl HttpBulkCluster {
    pub fn new(settings: &BulkSinkSettings) -> Result<Self, PipelineError> {
        if settings.hosts.is_empty() {
            return Err(PipelineError::invalid_config("bulk sink requires at least one host"));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .timeout(Duration::from_millis(settings.socket_timeout_ms))
            .build()
            .map_err(|e| PipelineError::invalid_config(format!("failed to build bulk cluster client: {e}")))?;
        let credentials = match (&settings.username, &settings.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };
        Ok(Self { client, hosts: settings.hosts.clone(), next_host: AtomicUsize::new(0), credentials })
    }

    fn pick_host(&self) -> &str {
        let i = self.next_host.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        &self.hosts[i]
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }
}

#[async_trait]
impl BulkCluster for HttpBulkCluster {
    async fn submit(&self, request: &AccumulatingBulkRequest) -> Result<Vec<BulkResponseEntry>, PipelineError> {
        let host = self.pick_host();
        let url = format!("{}/_bulk", host.trim_end_matches('/'));
        let request_builder = self.authed(self.client.post(&url)).header("content-type", "application/x-ndjson").body(request.to_wire_payload());
        let response = request_builder.send().await.map_err(|e| PipelineError::io_error(format!("bulk request to {host} failed: {e}")))?;

        let parsed: BulkApiResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::io_error(format!("failed to parse bulk response from {host}: {e}")))?;

        let mut entries = Vec::with_capacity(parsed.items.len());
        for (index, item_map) in parsed.items.into_iter().enumerate() {
            let Some(item) = item_map.into_values().next() else { continue };
            entries.push(BulkResponseEntry {
                operation_index: index,
                status_code: item.status,
                error_kind: classify(item.status, item.error.as_ref()),
                message: item.error.and_then(|e| e.reason),
            });
        }
        Ok(entries)
    }

    async fn probe(&self) -> Result<(), PipelineError> {
        let host = self.pick_host();
        self.authed(self.client.get(host)).send().await.map_err(|e| PipelineError::io_error(format!("probe of {host} failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_2xx_with_no_error_is_success() {
        assert_eq!(classify(201, None), BulkErrorKind::None);
    }

    #[test]
    fn version_conflict_is_classified_distinctly() {
        let err = BulkApiError { kind: "version_conflict_engine_exception".to_string(), reason: None };
        assert_eq!(classify(409, Some(&err)), BulkErrorKind::VersionConflict);
    }

    #[test]
    fn mapper_parsing_exception_is_document_level() {
        let err = BulkApiError { kind: "mapper_parsing_exception".to_string(), reason: Some("bad field".to_string()) };
        assert_eq!(classify(400, Some(&err)), BulkErrorKind::DocumentLevel);
    }

    #[test]
    fn too_many_requests_is_retryable_kind() {
        let err = BulkApiError { kind: "es_rejected_execution_exception".to_string(), reason: None };
        assert_eq!(classify(429, Some(&err)), BulkErrorKind::TooManyRequests);
    }

    #[test]
    fn server_error_status_without_known_type_is_server_error() {
        let err = BulkApiError { kind: "internal_server_error".to_string(), reason: None };
        assert_eq!(classify(503, Some(&err)), BulkErrorKind::ServerError);
    }

    #[test]
    fn missing_hosts_fails_construction() {
        let settings = BulkSinkSettings::default();
        assert!(HttpBulkCluster::new(&settings).is_err());
    }
}
