// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Executor
//!
//! Runs `workers` worker tasks against one [`Buffer`], each looping
//! read → processor chain → fan-out to sinks → checkpoint. Processors
//! that declare [`Processor::requires_single_thread`] are serialized
//! behind a shared lock so thread-affine state (e.g. a windowed
//! correlation processor) never sees two workers enter concurrently.
//!
//! Shutdown is two-phase, mirroring [`PipelineComponent`]: first every
//! processor and sink is told to `prepare_for_shutdown()`, then workers
//! keep draining until the buffer is empty and every component reports
//! `is_ready_for_shutdown()`, then `shutdown()` runs over every
//! component in reverse dependency order (sinks, then processors, then
//! the buffer itself).

use std::sync::Arc;
use std::time::Duration;

use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::buffer::Buffer;
use telemetry_pipeline_domain::ports::pipeline_component::{Processor, Sink};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::infrastructure::config::PipelineSettings;
use crate::infrastructure::metrics::PipelineMetrics;
use telemetry_pipeline_bootstrap::shutdown::CancellationToken;

/// How a processor chain stage maps onto worker tasks.
///
/// Most processors are stateless (or internally synchronized) and are
/// shared by every worker. A processor family that needs a fixed,
/// worker-bound identity — e.g. the windowed correlation processor's
/// per-instance registration index — is instead given one distinct
/// instance per worker, selected by `worker_id`.
pub enum ProcessorBinding {
    Shared(Arc<dyn Processor>),
    PerWorker(Vec<Arc<dyn Processor>>),
}

impl From<Arc<dyn Processor>> for ProcessorBinding {
    fn from(processor: Arc<dyn Processor>) -> Self {
        ProcessorBinding::Shared(processor)
    }
}

/// One stage of the processor chain, paired with the lock it must hold
/// while executing if it requires single-threaded access.
struct Stage {
    binding: ProcessorBinding,
    lock: Option<Mutex<()>>,
}

impl Stage {
    fn for_worker(&self, worker_id: usize) -> &Arc<dyn Processor> {
        match &self.binding {
            ProcessorBinding::Shared(processor) => processor,
            ProcessorBinding::PerWorker(instances) => &instances[worker_id % instances.len()],
        }
    }

    fn instances(&self) -> Box<dyn Iterator<Item = &Arc<dyn Processor>> + '_> {
        match &self.binding {
            ProcessorBinding::Shared(processor) => Box::new(std::iter::once(processor)),
            ProcessorBinding::PerWorker(instances) => Box::new(instances.iter()),
        }
    }
}

/// Wires one [`Buffer`] to a processor chain and a set of sinks, and
/// drives `workers` concurrent consumers of that buffer.
pub struct PipelineExecutor {
    name: String,
    buffer: Arc<dyn Buffer>,
    stages: Vec<Stage>,
    sinks: Vec<Arc<dyn Sink>>,
    settings: PipelineSettings,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineExecutor {
    pub fn new(name: impl Into<String>, buffer: Arc<dyn Buffer>, processors: Vec<ProcessorBinding>, sinks: Vec<Arc<dyn Sink>>, settings: PipelineSettings, metrics: Arc<PipelineMetrics>) -> Self {
        let stages = processors
            .into_iter()
            .map(|binding| {
                // A per-worker binding is already worker-exclusive; only a
                // shared processor needs cross-worker serialization.
                let lock = match &binding {
                    ProcessorBinding::Shared(processor) => processor.requires_single_thread().then(|| Mutex::new(())),
                    ProcessorBinding::PerWorker(_) => None,
                };
                Stage { binding, lock }
            })
            .collect();

        Self {
            name: name.into(),
            buffer,
            stages,
            sinks,
            settings,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawns `workers` tasks and returns their join handles. Each task
    /// runs until `cancel_token` is cancelled and the buffer drains, or
    /// until the buffer itself reports shutdown.
    pub fn spawn_workers(self: &Arc<Self>, cancel_token: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.settings.workers.max(1))
            .map(|worker_id| {
                let executor = Arc::clone(self);
                let token = cancel_token.clone();
                tokio::spawn(async move { executor.run_worker(worker_id, token).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: usize, cancel_token: CancellationToken) {
        let read_timeout = Duration::from_millis(self.settings.read_timeout_ms);
        loop {
            if cancel_token.is_cancelled() && self.buffer.is_empty().await {
                break;
            }

            let read_result = tokio::select! {
                biased;
                _ = cancel_token.cancelled(), if !cancel_token.is_cancelled() => continue,
                result = self.buffer.read(self.settings.read_batch_size, read_timeout) => result,
            };

            let (batch, token) = match read_result {
                Ok(pair) => pair,
                Err(err) if err.category() == "backpressure" => {
                    // Shutdown requested on an empty buffer; the next
                    // loop iteration's emptiness check will exit.
                    debug!(worker_id, error = %err, "buffer shutting down");
                    continue;
                }
                Err(err) => {
                    warn!(worker_id, error = %err, "buffer read failed");
                    continue;
                }
            };

            // Empty batches still run through the chain rather than
            // `continue`-ing early: a windowed processor needs a periodic
            // tick to notice a window has come due even when no records
            // arrived, and every sink already no-ops on empty input.
            self.metrics.buffer_occupancy.set(batch.len() as i64);

            match self.run_chain(worker_id, batch).await {
                Some(processed) => {
                    for sink in &self.sinks {
                        sink.output(processed.clone()).await.unwrap_or_else(|err| {
                            warn!(worker_id, sink = sink.name(), error = %err, "sink output failed");
                        });
                    }
                }
                None => {
                    // Dropped whole-batch; records_dropped_total was
                    // already incremented inside run_chain.
                }
            }

            if let Err(err) = self.buffer.checkpoint(token).await {
                warn!(worker_id, error = %err, "checkpoint failed");
            }
        }
        debug!(worker_id, pipeline = %self.name, "worker exited");
    }

    /// Runs `batch` through every stage in order. A per-stage failure
    /// drops the whole batch (conservative: processors may have already
    /// mutated records in place by the time an error surfaces) and
    /// increments `records_dropped_total`.
    async fn run_chain(&self, worker_id: usize, mut batch: Vec<telemetry_pipeline_domain::entities::event::Record>) -> Option<Vec<telemetry_pipeline_domain::entities::event::Record>> {
        for stage in &self.stages {
            let processor = stage.for_worker(worker_id);
            let dropped = batch.len();
            let result = match &stage.lock {
                Some(lock) => {
                    let _guard = lock.lock().await;
                    processor.execute(batch).await
                }
                None => processor.execute(batch).await,
            };
            batch = match result {
                Ok(next) => next,
                Err(err) => {
                    self.metrics.records_dropped_total.inc_by(dropped as u64);
                    warn!(processor = processor.name(), error = %err, dropped, "processor failed, dropping batch");
                    return None;
                }
            };
        }
        Some(batch)
    }

    /// Broadcasts `prepare_for_shutdown()` to every processor and sink,
    /// waits (polling at `poll_interval`) until the buffer is empty and
    /// every component reports ready, then tears down sinks, then
    /// processors, then the buffer, in that order.
    pub async fn shutdown(&self, poll_interval: Duration) -> Result<(), PipelineError> {
        for stage in &self.stages {
            for processor in stage.instances() {
                processor.prepare_for_shutdown().await;
            }
        }
        for sink in &self.sinks {
            sink.prepare_for_shutdown().await;
        }

        loop {
            let buffer_drained = self.buffer.is_empty().await;
            let mut all_ready = buffer_drained;
            for stage in &self.stages {
                for processor in stage.instances() {
                    all_ready &= processor.is_ready_for_shutdown().await;
                }
            }
            for sink in &self.sinks {
                all_ready &= sink.is_ready_for_shutdown().await;
            }
            if all_ready {
                break;
            }
            tokio::time::sleep(poll_interval).await;
        }

        self.buffer.shutdown().await;

        for sink in &self.sinks {
            sink.shutdown().await?;
        }
        for stage in self.stages.iter().rev() {
            for processor in stage.instances() {
                processor.shutdown().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use telemetry_pipeline_domain::entities::event::{Event, Record};
    use telemetry_pipeline_domain::ports::pipeline_component::PipelineComponent;
    use telemetry_pipeline_domain::value_objects::value::Value;

    use crate::application::services::bounded_buffer::BoundedBuffer;

    struct UppercaseProcessor;

    #[async_trait]
    impl PipelineComponent for UppercaseProcessor {}

    #[async_trait]
    impl Processor for UppercaseProcessor {
        fn name(&self) -> &str {
            "uppercase"
        }

        async fn execute(&self, batch: Vec<Record>) -> Result<Vec<Record>, PipelineError> {
            let mut out = Vec::with_capacity(batch.len());
            for mut record in batch {
                if let Some(name) = record.event.get_string("service")? {
                    record.event.put("service", Value::String(name.to_uppercase()))?;
                }
                out.push(record);
            }
            Ok(out)
        }
    }

    struct CountingSink {
        received: AtomicUsize,
    }

    #[async_trait]
    impl PipelineComponent for CountingSink {}

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn output(&self, batch: Vec<Record>) -> Result<(), PipelineError> {
            self.received.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn record(service: &str) -> Record {
        let mut e = Event::new("TRACE");
        e.put("service", Value::String(service.to_string())).unwrap();
        Record::new(e)
    }

    #[tokio::test]
    async fn worker_drains_buffer_into_sink_through_processor() {
        let buffer: Arc<dyn Buffer> = Arc::new(BoundedBuffer::new(8, 1));
        buffer.write(record("checkout"), Duration::from_millis(50)).await.unwrap();

        let sink = Arc::new(CountingSink { received: AtomicUsize::new(0) });
        let settings = PipelineSettings {
            workers: 1,
            read_batch_size: 8,
            read_timeout_ms: 50,
            delay_ms: 0,
        };
        let executor = Arc::new(PipelineExecutor::new(
            "test",
            buffer.clone(),
            vec![ProcessorBinding::Shared(Arc::new(UppercaseProcessor))],
            vec![sink.clone() as Arc<dyn Sink>],
            settings,
            Arc::new(PipelineMetrics::new().unwrap()),
        ));

        let coordinator = telemetry_pipeline_bootstrap::shutdown::ShutdownCoordinator::new(Duration::from_secs(1));
        let handles = executor.spawn_workers(coordinator.token());

        // Give the worker a moment to drain the single record, then shut down.
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.initiate_shutdown();
        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        }

        assert_eq!(sink.received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_processor_drops_batch_and_increments_metric() {
        struct AlwaysFails;
        #[async_trait]
        impl PipelineComponent for AlwaysFails {}
        #[async_trait]
        impl Processor for AlwaysFails {
            fn name(&self) -> &str {
                "always_fails"
            }
            async fn execute(&self, _batch: Vec<Record>) -> Result<Vec<Record>, PipelineError> {
                Err(PipelineError::processing_failed("boom"))
            }
        }

        let buffer: Arc<dyn Buffer> = Arc::new(BoundedBuffer::new(8, 1));
        let sink = Arc::new(CountingSink { received: AtomicUsize::new(0) });
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let executor = PipelineExecutor::new(
            "test",
            buffer.clone(),
            vec![ProcessorBinding::Shared(Arc::new(AlwaysFails))],
            vec![sink.clone() as Arc<dyn Sink>],
            PipelineSettings { workers: 1, read_batch_size: 8, read_timeout_ms: 20, delay_ms: 0 },
            metrics.clone(),
        );

        let dropped = executor.run_chain(0, vec![record("checkout")]).await;
        assert!(dropped.is_none());
        assert_eq!(metrics.records_dropped_total.get(), 1);
    }

    #[tokio::test]
    async fn worker_invokes_chain_even_on_empty_read() {
        struct TickCountingProcessor {
            ticks: AtomicUsize,
        }
        #[async_trait]
        impl PipelineComponent for TickCountingProcessor {}
        #[async_trait]
        impl Processor for TickCountingProcessor {
            fn name(&self) -> &str {
                "tick_counter"
            }
            async fn execute(&self, batch: Vec<Record>) -> Result<Vec<Record>, PipelineError> {
                self.ticks.fetch_add(1, Ordering::SeqCst);
                Ok(batch)
            }
        }

        let buffer: Arc<dyn Buffer> = Arc::new(BoundedBuffer::new(8, 1));
        let processor = Arc::new(TickCountingProcessor { ticks: AtomicUsize::new(0) });
        let sink = Arc::new(CountingSink { received: AtomicUsize::new(0) });
        let settings = PipelineSettings { workers: 1, read_batch_size: 8, read_timeout_ms: 10, delay_ms: 0 };
        let executor = Arc::new(PipelineExecutor::new(
            "test",
            buffer.clone(),
            vec![ProcessorBinding::Shared(processor.clone() as Arc<dyn Processor>)],
            vec![sink.clone() as Arc<dyn Sink>],
            settings,
            Arc::new(PipelineMetrics::new().unwrap()),
        ));

        let coordinator = telemetry_pipeline_bootstrap::shutdown::ShutdownCoordinator::new(Duration::from_secs(1));
        let handles = executor.spawn_workers(coordinator.token());

        // No records are ever written; the chain must still run on the
        // empty reads produced by each read-timeout.
        tokio::time::sleep(Duration::from_millis(60)).await;
        coordinator.initiate_shutdown();
        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        }

        assert!(processor.ticks.load(Ordering::SeqCst) > 0);
        assert_eq!(sink.received.load(Ordering::SeqCst), 0);
    }
}
