// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Windowed Stateful Processor (Service Map)
//!
//! Correlates spans into caller → callee relationships across a rotating
//! pair of windows, run on top of a peer forwarder so every worker sees
//! only spans for trace ids that hash to this node.
//!
//! The shared windows, relationship set, and cyclic barrier are owned by
//! one [`ProcessorGroup`] per processor configuration, not by any single
//! worker's processor instance — a bare static or a lock owned by worker
//! 0's instance alone would leave the other workers with no way to reach
//! it. `ProcessorGroup::register()` hands out a fixed registration index
//! to each [`ServiceMapProcessor`] built against it, in construction
//! order; the instance that receives index 0 is permanently "worker 0",
//! the rotation master, for the processor family's lifetime — this is a
//! structural property decided once at wiring time, not an election that
//! re-runs every rotation.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use telemetry_pipeline_domain::entities::event::{Event, Record};
use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::pipeline_component::{PipelineComponent, Processor};
use telemetry_pipeline_domain::ports::window_store::WindowStore;
use telemetry_pipeline_domain::value_objects::service_map::{Relationship, SpanKind, SpanState};
use telemetry_pipeline_domain::value_objects::value::Value;

use crate::application::services::cyclic_barrier::CyclicBarrier;
use crate::infrastructure::metrics::PipelineMetrics;

fn epoch_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

fn get_bytes(event: &Event, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
    match event.get(key)? {
        Some(v) => Ok(Some(v.as_bytes()?.to_vec())),
        None => Ok(None),
    }
}

fn encode_span_state(state: &SpanState) -> Result<Vec<u8>, PipelineError> {
    serde_json::to_vec(state).map_err(PipelineError::from)
}

fn decode_span_state(bytes: &[u8]) -> Result<SpanState, PipelineError> {
    serde_json::from_slice(bytes).map_err(PipelineError::from)
}

fn relationship_to_record(relationship: Relationship) -> Record {
    let mut event = Event::new("SERVICE_MAP_RELATIONSHIP");
    let _ = event.put("caller_service", Value::String(relationship.caller_service));
    let _ = event.put("caller_kind", Value::String(relationship.caller_kind.as_str().to_string()));
    let _ = event.put("callee_service", Value::String(relationship.callee_service));
    let _ = event.put("callee_operation", Value::String(relationship.callee_operation));
    let _ = event.put("trace_group", Value::String(relationship.trace_group));
    Record::new(event)
}

/// The two physical slots backing one rotating window pair (spans, or
/// trace groups), plus the filename labels currently assigned to each
/// slot. Labels are tracked here rather than read back from storage so
/// rotation can construct the next generation's label (e.g. dropping or
/// re-adding the `-empty` suffix) without the window store port needing
/// to expose its own path.
struct WindowPair {
    slots: [Arc<dyn WindowStore>; 2],
    labels: Mutex<[String; 2]>,
}

impl WindowPair {
    fn new(slots: [Arc<dyn WindowStore>; 2], labels: [String; 2]) -> Self {
        Self { slots, labels: Mutex::new(labels) }
    }

    /// Clears and relabels the slot at `reused_idx` as the new current
    /// generation, and strips any `-empty` suffix from the slot at
    /// `old_current_idx` now that it holds live data as the new
    /// previous. Returns nothing; callers track which index is current.
    async fn rotate(&self, prefix: &str, old_current_idx: usize, reused_idx: usize, now_ms: u128) -> Result<(), PipelineError> {
        self.slots[reused_idx].clear().await?;
        let new_current_label = format!("{prefix}-{now_ms}-empty");
        self.slots[reused_idx].rotate_generation(&new_current_label).await?;

        let mut labels = self.labels.lock().await;
        let old_current_label = labels[old_current_idx].clone();
        let new_previous_label = old_current_label.trim_end_matches("-empty").to_string();
        if new_previous_label != old_current_label {
            self.slots[old_current_idx].rotate_generation(&new_previous_label).await?;
        }
        labels[reused_idx] = new_current_label;
        labels[old_current_idx] = new_previous_label;
        Ok(())
    }
}

/// Shared state of one service-map processor family: the span and
/// trace-group window pairs, the cyclic barrier, the process-wide
/// relationship set, and the registration counter that assigns worker
/// 0's fixed identity. Constructed once per processor configuration and
/// shared by `Arc` among every worker-bound [`ServiceMapProcessor`].
pub struct ProcessorGroup {
    span_windows: WindowPair,
    trace_group_windows: WindowPair,
    current_idx: AtomicUsize,
    relationships: Mutex<BTreeSet<Relationship>>,
    last_rotation: Mutex<Instant>,
    rotation_armed: AtomicBool,
    window_duration: Duration,
    barrier: CyclicBarrier,
    process_workers: usize,
    next_registration: AtomicUsize,
    draining: AtomicBool,
    metrics: Arc<PipelineMetrics>,
}

impl ProcessorGroup {
    /// `current_idx` selects which of the two slots in each pair starts
    /// out as "current" — the index the caller opened with the
    /// `-empty` suffix.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        span_slots: [Arc<dyn WindowStore>; 2],
        span_labels: [String; 2],
        trace_group_slots: [Arc<dyn WindowStore>; 2],
        trace_group_labels: [String; 2],
        current_idx: usize,
        process_workers: usize,
        window_duration: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            span_windows: WindowPair::new(span_slots, span_labels),
            trace_group_windows: WindowPair::new(trace_group_slots, trace_group_labels),
            current_idx: AtomicUsize::new(current_idx),
            relationships: Mutex::new(BTreeSet::new()),
            last_rotation: Mutex::new(Instant::now()),
            rotation_armed: AtomicBool::new(false),
            window_duration,
            barrier: CyclicBarrier::new(process_workers.max(1)),
            process_workers: process_workers.max(1),
            next_registration: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
            metrics,
        })
    }

    /// Assigns the next registration index, in construction-call order.
    /// The instance that receives index 0 is worker 0 — the permanent
    /// rotation master for this processor family.
    pub fn register(&self) -> usize {
        self.next_registration.fetch_add(1, Ordering::SeqCst)
    }

    /// Builds `process_workers` worker-bound processor instances against
    /// this group, registering each in order so the first one returned
    /// is worker 0.
    pub fn spawn_worker_bound_processors(self: &Arc<Self>) -> Vec<Arc<dyn Processor>> {
        (0..self.process_workers)
            .map(|_| Arc::new(ServiceMapProcessor::new(Arc::clone(self))) as Arc<dyn Processor>)
            .collect()
    }

    fn current_slot(&self) -> usize {
        self.current_idx.load(Ordering::SeqCst)
    }

    async fn insert_span(&self, record: &Record) -> Result<(), PipelineError> {
        let event = &record.event;
        let Some(service_name) = event.get_string("service_name")? else {
            return Ok(());
        };
        let Some(span_id) = get_bytes(event, "span_id")? else {
            return Ok(());
        };
        let trace_id = get_bytes(event, "trace_id")?.unwrap_or_default();
        let parent_span_id = get_bytes(event, "parent_span_id")?;
        let span_kind = event.get_string("kind")?.map(|s| SpanKind::parse(&s)).unwrap_or(SpanKind::Unspecified);
        let span_name = event.get_string("name")?.unwrap_or_default();

        let state = SpanState {
            service_name,
            parent_span_id: parent_span_id.clone(),
            trace_id: trace_id.clone(),
            span_kind,
            span_name: span_name.clone(),
        };
        let encoded = encode_span_state(&state)?;

        let current_idx = self.current_slot();
        self.span_windows.slots[current_idx].put(span_id, encoded).await?;

        if parent_span_id.is_none() {
            self.trace_group_windows.slots[current_idx].put(trace_id, span_name.into_bytes()).await?;
        }
        Ok(())
    }

    /// Looks a span or trace-group root name up in `current`, falling
    /// back to `previous`.
    async fn lookup(store: &WindowPair, current_idx: usize, key: &[u8]) -> Result<Option<Vec<u8>>, PipelineError> {
        let previous_idx = 1 - current_idx;
        if let Some(v) = store.slots[current_idx].get(key).await? {
            return Ok(Some(v));
        }
        store.slots[previous_idx].get(key).await
    }

    /// The two-barrier rendezvous: every worker scans its shard of
    /// `previous ∪ current` spans, resolves parent and trace-group
    /// membership, emits relationships de-duplicated against the
    /// process-wide set, rendezvous at barrier 1, lets worker 0 rotate
    /// the windows, then rendezvous at barrier 2 before any worker may
    /// proceed to the next window.
    async fn evaluate_edges(&self, registration_index: usize) -> Result<Vec<Relationship>, PipelineError> {
        let current_idx = self.current_slot();
        let previous_idx = 1 - current_idx;
        let total_shards = self.process_workers as u32;
        let shard_id = registration_index as u32;

        let mut local = Vec::new();
        for slot_idx in [current_idx, previous_idx] {
            let shard = self.span_windows.slots[slot_idx].get_iterator(total_shards, shard_id).await?;
            for (_span_id, value) in shard {
                let child = decode_span_state(&value)?;
                let Some(parent_id) = child.parent_span_id.clone() else { continue };

                let parent = match Self::lookup(&self.span_windows, current_idx, &parent_id).await? {
                    Some(v) => decode_span_state(&v)?,
                    None => continue,
                };
                if parent.service_name == child.service_name {
                    continue;
                }
                let trace_group = match Self::lookup(&self.trace_group_windows, current_idx, &child.trace_id).await? {
                    Some(v) => String::from_utf8(v).map_err(|e| PipelineError::database_error(format!("corrupt trace group name: {e}")))?,
                    None => continue,
                };

                local.push(Relationship {
                    caller_service: parent.service_name.clone(),
                    caller_kind: parent.span_kind,
                    callee_service: child.service_name.clone(),
                    callee_operation: child.span_name.clone(),
                    trace_group: trace_group.clone(),
                });
                local.push(Relationship {
                    caller_service: child.service_name.clone(),
                    caller_kind: child.span_kind,
                    callee_service: child.service_name.clone(),
                    callee_operation: child.span_name.clone(),
                    trace_group,
                });
            }
        }

        let newly_emitted = {
            let mut seen = self.relationships.lock().await;
            local.into_iter().filter(|r| seen.insert(r.clone())).collect::<Vec<_>>()
        };
        self.metrics.service_map_relationships_total.inc_by(newly_emitted.len() as u64);

        // Barrier 1: rendezvous before rotation.
        self.barrier.wait().await?;

        if registration_index == 0 {
            let now_ms = epoch_ms();
            let new_current_idx = previous_idx;
            self.span_windows.rotate("db", current_idx, new_current_idx, now_ms).await?;
            self.trace_group_windows.rotate("trace-db", current_idx, new_current_idx, now_ms).await?;
            self.current_idx.store(new_current_idx, Ordering::SeqCst);
            *self.last_rotation.lock().await = Instant::now();
            self.rotation_armed.store(false, Ordering::SeqCst);
            self.metrics.service_map_window_rotations_total.inc();
            debug!(new_current_idx, "service map window rotated");
        }

        // Barrier 2: nobody proceeds until worker 0's rotation lands.
        self.barrier.wait().await?;

        Ok(newly_emitted)
    }
}

/// One worker-bound instance of the windowed stateful processor.
/// `registration_index` is fixed at construction via
/// [`ProcessorGroup::register`] — it never changes, and determines
/// both this instance's shard of the window keyspace and whether it is
/// the rotation master (`registration_index == 0`).
pub struct ServiceMapProcessor {
    group: Arc<ProcessorGroup>,
    registration_index: usize,
}

impl ServiceMapProcessor {
    pub fn new(group: Arc<ProcessorGroup>) -> Self {
        let registration_index = group.register();
        Self { group, registration_index }
    }

    fn is_master(&self) -> bool {
        self.registration_index == 0
    }
}

#[async_trait]
impl PipelineComponent for ServiceMapProcessor {
    async fn prepare_for_shutdown(&self) {
        self.group.draining.store(true, Ordering::SeqCst);
    }

    /// Shutdown drains workers, then unlinks the four window files.
    /// Only worker 0 performs the unlink: the files are shared group
    /// state, not per-instance, so releasing them once is correct and
    /// releasing them `process_workers` times would race a concurrent
    /// open.
    async fn shutdown(&self) -> Result<(), PipelineError> {
        if self.is_master() {
            for store in self.group.span_windows.slots.iter().chain(self.group.trace_group_windows.slots.iter()) {
                if let Err(err) = store.unlink().await {
                    warn!(error = %err, "failed to unlink service map window file");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for ServiceMapProcessor {
    fn name(&self) -> &str {
        "service_map"
    }

    async fn execute(&self, batch: Vec<Record>) -> Result<Vec<Record>, PipelineError> {
        let due_now = {
            let last = *self.group.last_rotation.lock().await;
            Instant::now().duration_since(last) >= self.group.window_duration
        };
        if due_now {
            self.group.rotation_armed.store(true, Ordering::SeqCst);
        }
        let should_join = due_now || self.group.rotation_armed.load(Ordering::SeqCst);

        let relationships = if should_join { self.group.evaluate_edges(self.registration_index).await? } else { Vec::new() };

        for record in &batch {
            self.group.insert_span(record).await?;
        }

        Ok(relationships.into_iter().map(relationship_to_record).collect())
    }
}
