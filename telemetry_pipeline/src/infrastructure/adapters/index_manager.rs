// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Index Managers
//!
//! The three index-management strategies of spec §4.4.1, each invoked
//! once at sink initialization. All three share one HTTP client and
//! build their requests against the first configured host.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as Json;
use tracing::warn;

use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::bulk_cluster::IndexManager;

use crate::infrastructure::config::BulkSinkSettings;

fn client(settings: &BulkSinkSettings) -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
        .timeout(Duration::from_millis(settings.socket_timeout_ms))
        .build()
        .map_err(|e| PipelineError::invalid_config(format!("failed to build index manager client: {e}")))
}

fn authed(settings: &BulkSinkSettings, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match (&settings.username, &settings.password) {
        (Some(u), Some(p)) => builder.basic_auth(u, Some(p)),
        _ => builder,
    }
}

fn primary_host(settings: &BulkSinkSettings) -> Result<&str, PipelineError> {
    settings.hosts.first().map(|h| h.trim_end_matches('/')).ok_or_else(|| PipelineError::invalid_config("index manager requires at least one host"))
}

/// Treats `version_conflict_engine_exception` / `resource_already_exists_exception`
/// as success, per spec §9's ISM-policy-install resolution; logs a mismatch
/// warning rather than failing when the existing resource may differ.
fn is_idempotent_conflict(status: reqwest::StatusCode, body: &str) -> bool {
    status == reqwest::StatusCode::CONFLICT || body.contains("version_conflict_engine_exception") || body.contains("resource_already_exists_exception")
}

/// Time-series strategy: installs an ISM policy (tolerating an unsupported
/// `ism_template` field by retrying without it) and ensures the alias
/// points at an initial write index `<alias>-000001`.
pub struct AliasManagedIndexManager {
    settings: BulkSinkSettings,
    client: reqwest::Client,
}

impl AliasManagedIndexManager {
    pub fn new(settings: BulkSinkSettings) -> Result<Self, PipelineError> {
        let client = client(&settings)?;
        Ok(Self { settings, client })
    }

    async fn ensure_ism_policy(&self) -> Result<(), PipelineError> {
        let Some(policy_file) = &self.settings.ism_policy_file else { return Ok(()) };
        let host = primary_host(&self.settings)?;
        let policy_json = tokio::fs::read_to_string(policy_file).await?;
        let mut policy: Json = serde_json::from_str(&policy_json)?;

        let policy_name = format!("{}-policy", self.settings.index_alias);
        let url = format!("{host}/_plugins/_ism/policies/{policy_name}");

        let response = authed(&self.settings, self.client.put(&url)).json(&policy).send().await.map_err(|e| PipelineError::io_error(format!("ISM policy PUT failed: {e}")))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            return Ok(());
        }
        if body.contains("ism_template") {
            // Server rejects the unsupported field; retry without it.
            if let Some(obj) = policy.as_object_mut() {
                obj.remove("ism_template");
            }
            let retry = authed(&self.settings, self.client.put(&url)).json(&policy).send().await.map_err(|e| PipelineError::io_error(format!("ISM policy retry PUT failed: {e}")))?;
            let retry_status = retry.status();
            let retry_body = retry.text().await.unwrap_or_default();
            if retry_status.is_success() || is_idempotent_conflict(retry_status, &retry_body) {
                if is_idempotent_conflict(retry_status, &retry_body) {
                    warn!(policy = %policy_name, "ISM policy already exists; existing policy may not match desired configuration");
                }
                return Ok(());
            }
            return Err(PipelineError::invalid_config(format!("ISM policy install failed: {retry_status} {retry_body}")));
        }
        if is_idempotent_conflict(status, &body) {
            warn!(policy = %policy_name, "ISM policy already exists; existing policy may not match desired configuration");
            return Ok(());
        }
        Err(PipelineError::invalid_config(format!("ISM policy install failed: {status} {body}")))
    }

    async fn ensure_write_index(&self) -> Result<(), PipelineError> {
        let host = primary_host(&self.settings)?;
        let alias = &self.settings.index_alias;
        let check = authed(&self.settings, self.client.get(format!("{host}/_alias/{alias}"))).send().await.map_err(|e| PipelineError::io_error(format!("alias lookup failed: {e}")))?;
        if check.status().is_success() {
            return Ok(());
        }

        let write_index = format!("{alias}-000001");
        let body = serde_json::json!({ "aliases": { alias: { "is_write_index": true } } });
        let create = authed(&self.settings, self.client.put(format!("{host}/{write_index}")))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::io_error(format!("write index creation failed: {e}")))?;
        let status = create.status();
        if status.is_success() {
            return Ok(());
        }
        let text = create.text().await.unwrap_or_default();
        if is_idempotent_conflict(status, &text) {
            return Ok(());
        }
        Err(PipelineError::invalid_config(format!("failed to create write index {write_index}: {status} {text}")))
    }
}

#[async_trait]
impl IndexManager for AliasManagedIndexManager {
    async fn ensure_ready(&self) -> Result<(), PipelineError> {
        self.ensure_ism_policy().await?;
        self.ensure_write_index().await
    }
}

/// Installs an index template if absent; never creates the index itself.
pub struct CustomTemplateIndexManager {
    settings: BulkSinkSettings,
    client: reqwest::Client,
}

impl CustomTemplateIndexManager {
    pub fn new(settings: BulkSinkSettings) -> Result<Self, PipelineError> {
        let client = client(&settings)?;
        Ok(Self { settings, client })
    }
}

#[async_trait]
impl IndexManager for CustomTemplateIndexManager {
    async fn ensure_ready(&self) -> Result<(), PipelineError> {
        let Some(template_file) = &self.settings.template_file else { return Ok(()) };
        let host = primary_host(&self.settings)?;
        let template_name = format!("{}-template", self.settings.index_alias);
        let url = format!("{host}/_index_template/{template_name}");

        let exists = authed(&self.settings, self.client.head(&url)).send().await.map_err(|e| PipelineError::io_error(format!("template lookup failed: {e}")))?;
        if exists.status().is_success() {
            return Ok(());
        }

        let template_json = tokio::fs::read_to_string(template_file).await?;
        let template: Json = serde_json::from_str(&template_json)?;
        let install = authed(&self.settings, self.client.put(&url)).json(&template).send().await.map_err(|e| PipelineError::io_error(format!("template install failed: {e}")))?;
        let status = install.status();
        if status.is_success() {
            return Ok(());
        }
        let text = install.text().await.unwrap_or_default();
        if is_idempotent_conflict(status, &text) {
            return Ok(());
        }
        Err(PipelineError::invalid_config(format!("template install failed: {status} {text}")))
    }
}

/// Ensures the plain target index exists, creating it if absent.
pub struct PlainIndexManager {
    settings: BulkSinkSettings,
    client: reqwest::Client,
}

impl PlainIndexManager {
    pub fn new(settings: BulkSinkSettings) -> Result<Self, PipelineError> {
        let client = client(&settings)?;
        Ok(Self { settings, client })
    }
}

#[async_trait]
impl IndexManager for PlainIndexManager {
    async fn ensure_ready(&self) -> Result<(), PipelineError> {
        let host = primary_host(&self.settings)?;
        let index = &self.settings.index_alias;
        let exists = authed(&self.settings, self.client.head(format!("{host}/{index}"))).send().await.map_err(|e| PipelineError::io_error(format!("index lookup failed: {e}")))?;
        if exists.status().is_success() {
            return Ok(());
        }
        let create = authed(&self.settings, self.client.put(format!("{host}/{index}"))).send().await.map_err(|e| PipelineError::io_error(format!("index creation failed: {e}")))?;
        let status = create.status();
        if status.is_success() {
            return Ok(());
        }
        let text = create.text().await.unwrap_or_default();
        if is_idempotent_conflict(status, &text) {
            return Ok(());
        }
        Err(PipelineError::invalid_config(format!("failed to create index {index}: {status} {text}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_status_is_idempotent() {
        assert!(is_idempotent_conflict(reqwest::StatusCode::CONFLICT, ""));
    }

    #[test]
    fn resource_already_exists_body_is_idempotent() {
        assert!(is_idempotent_conflict(reqwest::StatusCode::BAD_REQUEST, "resource_already_exists_exception"));
    }

    #[test]
    fn unrelated_failure_is_not_idempotent() {
        assert!(!is_idempotent_conflict(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "disk full"));
    }

    #[test]
    fn missing_host_fails_construction() {
        let settings = BulkSinkSettings::default();
        assert!(PlainIndexManager::new(settings).is_ok()); // client builds regardless of hosts
    }

    #[tokio::test]
    async fn plain_manager_without_hosts_fails_at_ensure_ready() {
        let settings = BulkSinkSettings::default();
        let manager = PlainIndexManager::new(settings).unwrap();
        assert!(manager.ensure_ready().await.is_err());
    }
}
