// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service Implementation
//!
//! Prometheus-based metrics collection for pipeline observability: buffer
//! occupancy, records dropped, bulk flush latency/size/retries/DLQ counts,
//! and per-error-kind counters. Exporting these over an HTTP scrape
//! endpoint is a collaborator concern outside this crate; components take
//! an `Arc<PipelineMetrics>` and record directly.

use std::sync::Arc;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use telemetry_pipeline_domain::error::PipelineError;
use tracing::debug;

/// Prometheus metrics for the pipeline runtime.
pub struct PipelineMetrics {
    registry: Arc<Registry>,

    pub buffer_occupancy: IntGauge,
    pub records_dropped_total: IntCounter,

    pub bulk_flush_duration_seconds: Histogram,
    pub bulk_request_size_bytes: Histogram,
    pub bulk_retries_total: IntCounter,
    pub bulk_dlq_total: IntCounter,
    pub bulk_errors_by_kind_total: IntCounterVec,

    pub service_map_relationships_total: IntCounter,
    pub service_map_window_rotations_total: IntCounter,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();

        let buffer_occupancy = IntGauge::with_opts(Opts::new("buffer_occupancy", "Records currently in flight in the buffer").namespace("telemetry_pipeline"))
            .map_err(|e| PipelineError::metrics_error(format!("failed to create buffer_occupancy: {e}")))?;

        let records_dropped_total = IntCounter::with_opts(Opts::new("records_dropped_total", "Records dropped due to processor or batch failure").namespace("telemetry_pipeline"))
            .map_err(|e| PipelineError::metrics_error(format!("failed to create records_dropped_total: {e}")))?;

        let bulk_flush_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("bulk_flush_duration_seconds", "Latency of a bulk sink flush")
                .namespace("telemetry_pipeline")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .map_err(|e| PipelineError::metrics_error(format!("failed to create bulk_flush_duration_seconds: {e}")))?;

        let bulk_request_size_bytes = Histogram::with_opts(
            HistogramOpts::new("bulk_request_size_bytes", "Size of a flushed bulk request")
                .namespace("telemetry_pipeline")
                .buckets(vec![1024.0, 8192.0, 65536.0, 524_288.0, 1_048_576.0, 5_242_880.0]),
        )
        .map_err(|e| PipelineError::metrics_error(format!("failed to create bulk_request_size_bytes: {e}")))?;

        let bulk_retries_total = IntCounter::with_opts(Opts::new("bulk_retries_total", "Bulk operations retried").namespace("telemetry_pipeline"))
            .map_err(|e| PipelineError::metrics_error(format!("failed to create bulk_retries_total: {e}")))?;

        let bulk_dlq_total = IntCounter::with_opts(Opts::new("bulk_dlq_total", "Bulk operations routed to the dead-letter queue").namespace("telemetry_pipeline"))
            .map_err(|e| PipelineError::metrics_error(format!("failed to create bulk_dlq_total: {e}")))?;

        let bulk_errors_by_kind_total = IntCounterVec::new(
            Opts::new("bulk_errors_by_kind_total", "Bulk response errors by classified kind").namespace("telemetry_pipeline"),
            &["kind"],
        )
        .map_err(|e| PipelineError::metrics_error(format!("failed to create bulk_errors_by_kind_total: {e}")))?;

        let service_map_relationships_total = IntCounter::with_opts(Opts::new("service_map_relationships_total", "Relationships emitted by the windowed processor").namespace("telemetry_pipeline"))
            .map_err(|e| PipelineError::metrics_error(format!("failed to create service_map_relationships_total: {e}")))?;

        let service_map_window_rotations_total = IntCounter::with_opts(Opts::new("service_map_window_rotations_total", "Window rotations performed").namespace("telemetry_pipeline"))
            .map_err(|e| PipelineError::metrics_error(format!("failed to create service_map_window_rotations_total: {e}")))?;

        registry
            .register(Box::new(buffer_occupancy.clone()))
            .map_err(|e| PipelineError::metrics_error(format!("failed to register buffer_occupancy: {e}")))?;
        registry
            .register(Box::new(records_dropped_total.clone()))
            .map_err(|e| PipelineError::metrics_error(format!("failed to register records_dropped_total: {e}")))?;
        registry
            .register(Box::new(bulk_flush_duration_seconds.clone()))
            .map_err(|e| PipelineError::metrics_error(format!("failed to register bulk_flush_duration_seconds: {e}")))?;
        registry
            .register(Box::new(bulk_request_size_bytes.clone()))
            .map_err(|e| PipelineError::metrics_error(format!("failed to register bulk_request_size_bytes: {e}")))?;
        registry
            .register(Box::new(bulk_retries_total.clone()))
            .map_err(|e| PipelineError::metrics_error(format!("failed to register bulk_retries_total: {e}")))?;
        registry
            .register(Box::new(bulk_dlq_total.clone()))
            .map_err(|e| PipelineError::metrics_error(format!("failed to register bulk_dlq_total: {e}")))?;
        registry
            .register(Box::new(bulk_errors_by_kind_total.clone()))
            .map_err(|e| PipelineError::metrics_error(format!("failed to register bulk_errors_by_kind_total: {e}")))?;
        registry
            .register(Box::new(service_map_relationships_total.clone()))
            .map_err(|e| PipelineError::metrics_error(format!("failed to register service_map_relationships_total: {e}")))?;
        registry
            .register(Box::new(service_map_window_rotations_total.clone()))
            .map_err(|e| PipelineError::metrics_error(format!("failed to register service_map_window_rotations_total: {e}")))?;

        debug!("PipelineMetrics initialized with Prometheus registry");

        Ok(Self {
            registry: Arc::new(registry),
            buffer_occupancy,
            records_dropped_total,
            bulk_flush_duration_seconds,
            bulk_request_size_bytes,
            bulk_retries_total,
            bulk_dlq_total,
            bulk_errors_by_kind_total,
            service_map_relationships_total,
            service_map_window_rotations_total,
        })
    }

    pub fn record_bulk_error_kind(&self, kind: &str) {
        self.bulk_errors_by_kind_total.with_label_values(&[kind]).inc();
    }

    /// Renders the registry in Prometheus text exposition format. Scraping
    /// this over HTTP is a collaborator concern outside this crate.
    pub fn get_metrics(&self) -> Result<String, PipelineError> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .map_err(|e| PipelineError::metrics_error(format!("failed to encode metrics: {e}")))
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new().expect("failed to create default PipelineMetrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_service_initializes_and_renders() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.buffer_occupancy.set(3);
        metrics.bulk_retries_total.inc();
        let rendered = metrics.get_metrics().unwrap();
        assert!(rendered.contains("telemetry_pipeline_buffer_occupancy"));
        assert!(rendered.contains("telemetry_pipeline_bulk_retries_total"));
    }

    #[test]
    fn error_kind_counter_tracks_labels() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.record_bulk_error_kind("too_many_requests");
        metrics.record_bulk_error_kind("too_many_requests");
        metrics.record_bulk_error_kind("rejected");
        assert_eq!(metrics.bulk_errors_by_kind_total.with_label_values(&["too_many_requests"]).get(), 2);
        assert_eq!(metrics.bulk_errors_by_kind_total.with_label_values(&["rejected"]).get(), 1);
    }
}
