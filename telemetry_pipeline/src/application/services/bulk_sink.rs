// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bulk Sink
//!
//! Batches records into `AccumulatingBulkRequest`s, submits them through a
//! `BulkCluster`, classifies each response entry, retries the retryable
//! subset with jittered exponential backoff, and routes non-retryable or
//! retry-exhausted operations to a `DlqWriter`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use telemetry_pipeline_domain::entities::event::Record;
use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::bulk_cluster::{BulkCluster, IndexManager};
use telemetry_pipeline_domain::ports::dlq_writer::DlqWriter;
use telemetry_pipeline_domain::ports::pipeline_component::{PipelineComponent, Sink};
use telemetry_pipeline_domain::value_objects::bulk::{AccumulatingBulkRequest, BulkAction, BulkErrorKind, BulkOperation, BulkResponseEntry};
use tokio::sync::Mutex;

use crate::infrastructure::config::{BulkActionKind, BulkSinkSettings};
use crate::infrastructure::metrics::PipelineMetrics;

/// Base delay for the first retry attempt.
const BASE_BACKOFF_MS: u64 = 100;
/// Ceiling on the exponential backoff, regardless of attempt number.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Bulk sink (spec C5): batches, flushes, retries, and dead-letters.
pub struct BulkSink {
    name: String,
    pipeline_name: String,
    cluster: Arc<dyn BulkCluster>,
    index_manager: Arc<dyn IndexManager>,
    dlq: Option<Arc<dyn DlqWriter>>,
    settings: BulkSinkSettings,
    metrics: Arc<PipelineMetrics>,
    accumulator: Mutex<AccumulatingBulkRequest>,
    shutting_down: std::sync::atomic::AtomicBool,
}

impl BulkSink {
    pub fn new(
        name: impl Into<String>,
        pipeline_name: impl Into<String>,
        cluster: Arc<dyn BulkCluster>,
        index_manager: Arc<dyn IndexManager>,
        dlq: Option<Arc<dyn DlqWriter>>,
        settings: BulkSinkSettings,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            name: name.into(),
            pipeline_name: pipeline_name.into(),
            cluster,
            index_manager,
            dlq,
            settings,
            metrics,
            accumulator: Mutex::new(AccumulatingBulkRequest::new()),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn document_id(&self, record: &Record) -> Result<Option<String>, PipelineError> {
        match &self.settings.document_id_field {
            Some(field) => record.event.get_string(field),
            None => Ok(None),
        }
    }

    fn action(&self) -> BulkAction {
        match self.settings.action {
            BulkActionKind::Index => BulkAction::Index,
            BulkActionKind::Create => BulkAction::Create,
        }
    }

    /// Converts one record into a bulk operation ready for accumulation.
    fn to_operation(&self, record: &Record) -> Result<BulkOperation, PipelineError> {
        let document_id = self.document_id(record)?;
        let document = record.event.to_json_string()?;
        Ok(BulkOperation::new(self.action(), self.settings.index_alias.clone(), document_id, document))
    }

    /// Appends `batch` to the persistent accumulator, flushing whenever an
    /// operation would push the accumulator over `bulk_size_bytes`.
    async fn accumulate(&self, batch: Vec<Record>) -> Result<(), PipelineError> {
        let bound = self.settings.bulk_size_bytes();
        for record in batch {
            let operation = self.to_operation(&record)?;
            let mut guard = self.accumulator.lock().await;
            if !guard.would_fit(&operation, bound) {
                let request = std::mem::replace(&mut *guard, AccumulatingBulkRequest::new());
                drop(guard);
                self.flush(request).await?;
                let mut guard = self.accumulator.lock().await;
                guard.push(operation);
            } else {
                guard.push(operation);
            }
        }
        Ok(())
    }

    /// Flushes whatever remains in the accumulator, if non-empty.
    async fn flush_residual(&self) -> Result<(), PipelineError> {
        let request = {
            let mut guard = self.accumulator.lock().await;
            std::mem::replace(&mut *guard, AccumulatingBulkRequest::new())
        };
        if !request.is_empty() {
            self.flush(request).await?;
        }
        Ok(())
    }

    /// Submits `request`, classifies the response, retries the retryable
    /// subset with backoff, and dead-letters whatever never lands.
    async fn flush(&self, request: AccumulatingBulkRequest) -> Result<(), PipelineError> {
        if request.is_empty() {
            return Ok(());
        }

        let timer = self.metrics.bulk_flush_duration_seconds.start_timer();
        self.metrics.bulk_request_size_bytes.observe(request.estimated_size_bytes() as f64);

        let mut pending: Vec<BulkOperation> = request.into_operations();
        let mut attempt: u32 = 0;

        loop {
            let submission = AccumulatingBulkRequest::default();
            let mut submission = submission;
            for op in &pending {
                submission.push(op.clone());
            }

            let outcome = self.cluster.submit(&submission).await;
            match outcome {
                Ok(entries) => {
                    let (retryable, dead) = self.classify(&pending, &entries);
                    for (op, message) in &dead {
                        self.dead_letter(op, message, attempt).await;
                    }
                    if retryable.is_empty() {
                        break;
                    }
                    if self.exhausted(attempt) {
                        for op in &retryable {
                            self.dead_letter(op, "retry exhausted", attempt).await;
                        }
                        break;
                    }
                    self.metrics.bulk_retries_total.inc();
                    self.backoff(attempt).await;
                    attempt += 1;
                    pending = retryable;
                }
                Err(e) => {
                    // Whole-request transport failure: a diagnostic probe
                    // distinguishes a recoverable blip from a permanent
                    // connectivity loss, but does not otherwise change the
                    // retry/dead-letter decision below.
                    let _ = self.cluster.probe().await;
                    self.metrics.record_bulk_error_kind("network");
                    if self.exhausted(attempt) {
                        for op in &pending {
                            self.dead_letter(op, &e.to_string(), attempt).await;
                        }
                        break;
                    }
                    self.metrics.bulk_retries_total.inc();
                    self.backoff(attempt).await;
                    attempt += 1;
                }
            }
        }

        timer.observe_duration();
        Ok(())
    }

    /// Splits `pending` into (retryable, dead-on-arrival) based on each
    /// response entry's classified error kind (Testable Property 5).
    fn classify(&self, pending: &[BulkOperation], entries: &[BulkResponseEntry]) -> (Vec<BulkOperation>, Vec<(BulkOperation, String)>) {
        let mut retryable = Vec::new();
        let mut dead = Vec::new();
        for entry in entries {
            let kind_label = match entry.error_kind {
                BulkErrorKind::None => "none",
                BulkErrorKind::DocumentLevel => "document_level",
                BulkErrorKind::VersionConflict => "version_conflict",
                BulkErrorKind::TooManyRequests => "too_many_requests",
                BulkErrorKind::Rejected => "rejected",
                BulkErrorKind::ServerError => "server_error",
                BulkErrorKind::Network => "network",
                BulkErrorKind::Unknown => "unknown",
            };
            if !matches!(entry.error_kind, BulkErrorKind::None | BulkErrorKind::VersionConflict) {
                self.metrics.record_bulk_error_kind(kind_label);
            }
            let Some(op) = pending.get(entry.operation_index) else { continue };
            match entry.error_kind {
                BulkErrorKind::None => {}
                // A create-with-id replay is idempotent (Testable Property 4).
                BulkErrorKind::VersionConflict => {}
                BulkErrorKind::TooManyRequests | BulkErrorKind::Rejected | BulkErrorKind::ServerError => {
                    retryable.push(op.clone());
                }
                BulkErrorKind::DocumentLevel | BulkErrorKind::Unknown => {
                    dead.push((op.clone(), entry.message.clone().unwrap_or_default()));
                }
            }
        }
        (retryable, dead)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        matches!(self.settings.max_retries, Some(max) if attempt >= max)
    }

    async fn backoff(&self, attempt: u32) {
        let exp = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(MAX_BACKOFF_MS);
        let jitter = rand::thread_rng().gen_range(0..=capped.max(1));
        tokio::time::sleep(Duration::from_millis(jitter)).await;
    }

    async fn dead_letter(&self, op: &BulkOperation, message: &str, attempt: u32) {
        self.metrics.bulk_dlq_total.inc();
        let line = serde_json::json!({
            "document": serde_json::from_str::<serde_json::Value>(&op.serialized_json_document)
                .unwrap_or(serde_json::Value::Null),
            "failure": message,
            "attempt": attempt,
            "pluginId": self.name,
            "pipelineName": self.pipeline_name,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
        .to_string();

        match &self.dlq {
            Some(writer) => {
                if let Err(e) = writer.write_line(line).await {
                    warn!(error = %e, "failed to write DLQ line");
                }
            }
            None => {
                warn!(operation = %line, "no DLQ configured, dropping failed bulk operation");
            }
        }
    }
}

#[async_trait]
impl PipelineComponent for BulkSink {
    async fn initialize(&self) -> Result<(), PipelineError> {
        self.index_manager.ensure_ready().await
    }

    async fn prepare_for_shutdown(&self) {
        self.shutting_down.store(true, std::sync::atomic::Ordering::SeqCst);
        // Flush eagerly so `is_ready_for_shutdown` can go true without
        // waiting on another `output()` call that may never come.
        if let Err(e) = self.flush_residual().await {
            warn!(error = %e, "failed to flush residual bulk request during shutdown preparation");
        }
    }

    async fn is_ready_for_shutdown(&self) -> bool {
        self.accumulator.lock().await.is_empty()
    }

    async fn shutdown(&self) -> Result<(), PipelineError> {
        // Anything left in the accumulator at shutdown is dead-lettered
        // rather than flushed, per spec §4.4 "shutdown in progress".
        let request = {
            let mut guard = self.accumulator.lock().await;
            std::mem::replace(&mut *guard, AccumulatingBulkRequest::new())
        };
        for op in request.into_operations() {
            self.dead_letter(&op, "shutdown in progress", 0).await;
        }
        if let Some(writer) = &self.dlq {
            writer.shutdown().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for BulkSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn output(&self, batch: Vec<Record>) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.accumulate(batch).await?;
        // Each call to `output` is this sink's unit of "end of input" (spec
        // §4.4: "At end-of-input the residual request is flushed if
        // non-empty") — there is no further signal between batches, so the
        // residual is flushed unconditionally once accumulation settles.
        self.flush_residual().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use telemetry_pipeline_domain::entities::event::Event;
    use telemetry_pipeline_domain::value_objects::value::Value;

    struct StubCluster {
        responses: Mutex<Vec<Vec<BulkResponseEntry>>>,
        submitted_requests: AtomicUsize,
    }

    #[async_trait]
    impl BulkCluster for StubCluster {
        async fn submit(&self, request: &AccumulatingBulkRequest) -> Result<Vec<BulkResponseEntry>, PipelineError> {
            self.submitted_requests.fetch_add(1, Ordering::SeqCst);
            let mut guard = self.responses.lock().await;
            if !guard.is_empty() {
                return Ok(guard.remove(0));
            }
            Ok(request
                .operations()
                .iter()
                .enumerate()
                .map(|(i, _)| BulkResponseEntry {
                    operation_index: i,
                    status_code: 201,
                    error_kind: BulkErrorKind::None,
                    message: None,
                })
                .collect())
        }

        async fn probe(&self) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    struct NoopIndexManager;

    #[async_trait]
    impl IndexManager for NoopIndexManager {
        async fn ensure_ready(&self) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    struct CapturingDlq {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DlqWriter for CapturingDlq {
        async fn write_line(&self, line: String) -> Result<(), PipelineError> {
            self.lines.lock().await.push(line);
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn record(body: &str) -> Record {
        let mut event = Event::new("test");
        event.put("body", Value::String(body.to_string())).unwrap();
        Record::new(event)
    }

    fn settings(bulk_size_mb: f64) -> BulkSinkSettings {
        BulkSinkSettings {
            index_alias: "otel-traces".to_string(),
            bulk_size_mb,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn flush_threshold_splits_into_two_requests() {
        // S1: 10 equally-sized events; the bound is set to exactly 8
        // operations' worth of bytes, so `output()` must flush once at 8
        // ops (the 9th wouldn't fit) and once more for the 2-op residual
        // at end-of-input.
        let cluster = Arc::new(StubCluster {
            responses: Mutex::new(Vec::new()),
            submitted_requests: AtomicUsize::new(0),
        });
        let probe_sink = BulkSink::new(
            "bulk",
            "test-pipeline",
            cluster.clone(),
            Arc::new(NoopIndexManager),
            None,
            settings(5.0),
            Arc::new(PipelineMetrics::new().unwrap()),
        );

        let mut batch: Vec<Record> = (0..10).map(|_| record(&"x".repeat(20))).collect();
        // Pin every event to an identical timestamp so all ten operations
        // serialize to exactly the same byte length.
        let fixed_timestamp = batch[0].event.metadata.timestamp;
        for rec in &mut batch {
            rec.event.metadata.timestamp = fixed_timestamp;
        }
        let op_size = probe_sink.to_operation(&batch[0]).unwrap().estimated_size_bytes;

        // Dividing/multiplying by 1024*1024 (2^20) is exact in f64, so this
        // round-trips back to precisely `op_size * 8` bytes.
        let cfg = settings((op_size * 8) as f64 / (1024.0 * 1024.0));
        assert_eq!(cfg.bulk_size_bytes(), op_size * 8);

        let sink = BulkSink::new(
            "bulk",
            "test-pipeline",
            cluster.clone(),
            Arc::new(NoopIndexManager),
            None,
            cfg,
            Arc::new(PipelineMetrics::new().unwrap()),
        );

        sink.output(batch).await.unwrap();
        // `output()` both triggers the threshold flush mid-accumulation (8
        // ops) and flushes the 2-op residual unconditionally at its end, so
        // both requests must already have been submitted here.
        assert_eq!(
            cluster.submitted_requests.load(Ordering::SeqCst),
            2,
            "expected an 8-op flush then a 2-op residual flush within output() (S1)"
        );

        sink.prepare_for_shutdown().await;
        sink.shutdown().await.unwrap();

        // Nothing left to flush or dead-letter after output() already drained it.
        assert_eq!(cluster.submitted_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn document_level_error_goes_to_dlq() {
        let responses = vec![vec![BulkResponseEntry {
            operation_index: 0,
            status_code: 400,
            error_kind: BulkErrorKind::DocumentLevel,
            message: Some("mapper_parsing_exception".to_string()),
        }]];
        let cluster = Arc::new(StubCluster {
            responses: Mutex::new(responses),
            submitted_requests: AtomicUsize::new(0),
        });
        let dlq = Arc::new(CapturingDlq { lines: Mutex::new(Vec::new()) });
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let sink = BulkSink::new("bulk", "test-pipeline", cluster, Arc::new(NoopIndexManager), Some(dlq.clone()), settings(5.0), metrics);

        sink.output(vec![record("bad")]).await.unwrap();
        sink.prepare_for_shutdown().await;
        sink.shutdown().await.unwrap();

        let lines = dlq.lines.lock().await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("mapper_parsing_exception"));
    }

    #[tokio::test]
    async fn version_conflict_on_create_is_treated_as_success() {
        // S2: replaying a create with the same id reports version_conflict,
        // which must not reach the DLQ.
        let responses = vec![vec![BulkResponseEntry {
            operation_index: 0,
            status_code: 409,
            error_kind: BulkErrorKind::VersionConflict,
            message: Some("version conflict".to_string()),
        }]];
        let cluster = Arc::new(StubCluster {
            responses: Mutex::new(responses),
            submitted_requests: AtomicUsize::new(0),
        });
        let dlq = Arc::new(CapturingDlq { lines: Mutex::new(Vec::new()) });
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let mut cfg = settings(5.0);
        cfg.document_id_field = Some("id".to_string());
        cfg.action = BulkActionKind::Create;
        let sink = BulkSink::new("bulk", "test-pipeline", cluster, Arc::new(NoopIndexManager), Some(dlq.clone()), cfg, metrics);

        let mut event = Event::new("test");
        event.put("id", Value::String("abc".to_string())).unwrap();
        sink.output(vec![Record::new(event)]).await.unwrap();
        sink.prepare_for_shutdown().await;
        sink.shutdown().await.unwrap();

        assert!(dlq.lines.lock().await.is_empty());
    }
}
