// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bounded Buffer
//!
//! Concrete, async `Buffer` port implementation: a `tokio::sync::Mutex`-
//! guarded ring of pending records plus a `tokio::sync::Notify` pair (one
//! for "space freed", one for "data available"). Capacity counts written-
//! minus-checkpointed records, not merely pending-unread ones, so capacity
//! is released only at `checkpoint`, never at `read`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use telemetry_pipeline_domain::entities::event::Record;
use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::buffer::Buffer;
use telemetry_pipeline_domain::value_objects::checkpoint_token::CheckpointToken;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

struct Inner {
    pending: VecDeque<Record>,
    /// batch_id -> record count still awaiting checkpoint.
    in_flight: HashMap<u64, usize>,
    total_in_flight: usize,
    shutting_down: bool,
}

/// A bounded multi-producer/multi-consumer buffer. Capacity and batch size
/// are fixed at construction.
pub struct BoundedBuffer {
    capacity: usize,
    batch_size: usize,
    inner: Mutex<Inner>,
    space_freed: Notify,
    data_available: Notify,
    next_batch_id: AtomicU64,
    closed: AtomicBool,
}

impl BoundedBuffer {
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        Self {
            capacity,
            batch_size,
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
                total_in_flight: 0,
                shutting_down: false,
            }),
            space_freed: Notify::new(),
            data_available: Notify::new(),
            next_batch_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Buffer for BoundedBuffer {
    async fn write(&self, record: Record, timeout: Duration) -> Result<(), PipelineError> {
        self.write_all(vec![record], timeout).await
    }

    async fn write_all(&self, records: Vec<Record>, timeout: Duration) -> Result<(), PipelineError> {
        if records.is_empty() {
            return Ok(());
        }
        let needed = records.len();
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut guard = self.inner.lock().await;
                if guard.shutting_down {
                    return Err(PipelineError::shutdown("buffer is shutting down"));
                }
                if guard.total_in_flight + needed <= self.capacity {
                    guard.total_in_flight += needed;
                    guard.pending.extend(records);
                    drop(guard);
                    self.data_available.notify_waiters();
                    return Ok(());
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PipelineError::buffer_full(format!("buffer full after write_timeout: capacity={}", self.capacity)));
            }
            let _ = tokio::time::timeout(remaining, self.space_freed.notified()).await;
        }
    }

    async fn read(&self, max_batch: usize, timeout: Duration) -> Result<(Vec<Record>, CheckpointToken), PipelineError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut guard = self.inner.lock().await;
                if guard.pending.len() >= self.batch_size || (guard.shutting_down && !guard.pending.is_empty()) {
                    let take = max_batch.min(guard.pending.len());
                    let batch: Vec<Record> = guard.pending.drain(..take).collect();
                    let batch_id = self.next_batch_id.fetch_add(1, Ordering::SeqCst);
                    guard.in_flight.insert(batch_id, batch.len());
                    let token = CheckpointToken::new(batch_id, batch.len() as u64);
                    return Ok((batch, token));
                }
                if guard.shutting_down && guard.pending.is_empty() {
                    return Err(PipelineError::shutdown("buffer is shutting down"));
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let mut guard = self.inner.lock().await;
                if guard.pending.is_empty() {
                    return Ok((Vec::new(), CheckpointToken::new(self.next_batch_id.fetch_add(1, Ordering::SeqCst), 0)));
                }
                let take = max_batch.min(guard.pending.len());
                let batch: Vec<Record> = guard.pending.drain(..take).collect();
                let batch_id = self.next_batch_id.fetch_add(1, Ordering::SeqCst);
                guard.in_flight.insert(batch_id, batch.len());
                let token = CheckpointToken::new(batch_id, batch.len() as u64);
                return Ok((batch, token));
            }
            let _ = tokio::time::timeout(remaining, self.data_available.notified()).await;
        }
    }

    async fn checkpoint(&self, token: CheckpointToken) -> Result<(), PipelineError> {
        let mut guard = self.inner.lock().await;
        if let Some(count) = guard.in_flight.remove(&token.batch_id()) {
            guard.total_in_flight = guard.total_in_flight.saturating_sub(count);
            drop(guard);
            self.space_freed.notify_waiters();
        }
        Ok(())
    }

    async fn is_empty(&self) -> bool {
        let guard = self.inner.lock().await;
        guard.pending.is_empty() && guard.total_in_flight == 0
    }

    async fn is_full(&self) -> bool {
        let guard = self.inner.lock().await;
        guard.total_in_flight >= self.capacity
    }

    async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        guard.shutting_down = true;
        drop(guard);
        self.closed.store(true, Ordering::SeqCst);
        self.space_freed.notify_waiters();
        self.data_available.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_pipeline_domain::entities::event::Event;

    fn record() -> Record {
        Record::new(Event::new("LOG"))
    }

    #[tokio::test]
    async fn writes_up_to_capacity_succeed() {
        let buffer = BoundedBuffer::new(4, 1);
        for _ in 0..4 {
            buffer.write(record(), Duration::from_millis(50)).await.unwrap();
        }
        assert!(buffer.is_full().await);
    }

    #[tokio::test]
    async fn write_beyond_capacity_times_out_with_buffer_full() {
        let buffer = BoundedBuffer::new(4, 1);
        for _ in 0..4 {
            buffer.write(record(), Duration::from_millis(50)).await.unwrap();
        }
        let start = Instant::now();
        let err = buffer.write(record(), Duration::from_millis(100)).await.unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(90));
        assert_eq!(err.category(), "backpressure");
    }

    #[tokio::test]
    async fn checkpoint_releases_capacity() {
        let buffer = BoundedBuffer::new(2, 1);
        buffer.write(record(), Duration::from_millis(50)).await.unwrap();
        buffer.write(record(), Duration::from_millis(50)).await.unwrap();
        assert!(buffer.is_full().await);
        let (batch, token) = buffer.read(2, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(buffer.is_full().await, "capacity is held until checkpoint");
        buffer.checkpoint(token).await.unwrap();
        assert!(!buffer.is_full().await);
    }

    #[tokio::test]
    async fn read_waits_for_batch_size_then_times_out_with_partial() {
        let buffer = BoundedBuffer::new(8, 4);
        buffer.write(record(), Duration::from_millis(50)).await.unwrap();
        let (batch, _token) = buffer.read(4, Duration::from_millis(80)).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_fails_new_writes() {
        let buffer = BoundedBuffer::new(4, 1);
        buffer.shutdown().await;
        let err = buffer.write(record(), Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err.category(), "backpressure");
    }
}
