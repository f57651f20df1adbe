// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cyclic Barrier
//!
//! A rendezvous where `parties` workers each block until all have arrived,
//! then are all released together. Not present in `tokio` (which has no
//! barrier primitive), so it is hand-built on `tokio::sync::Mutex` +
//! `tokio::sync::Notify`. A generation counter distinguishes "this
//! rendezvous" from the next one so a late waiter from a broken round
//! cannot silently pass through a later one.

use telemetry_pipeline_domain::error::PipelineError;
use tokio::sync::{Mutex, Notify};

struct State {
    arrived: usize,
    generation: u64,
    broken: bool,
}

pub struct CyclicBarrier {
    parties: usize,
    state: Mutex<State>,
    released: Notify,
}

impl CyclicBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(State { arrived: 0, generation: 0, broken: false }),
            released: Notify::new(),
        }
    }

    /// Blocks the caller until `parties` workers have called `wait()` for
    /// the current generation. Returns `true` for the worker that observed
    /// the last arrival (the "master" for this rendezvous), `false` for
    /// all others. Fails with `BarrierBroken` if the barrier was broken
    /// before or during this wait.
    pub async fn wait(&self) -> Result<bool, PipelineError> {
        let generation_at_entry;
        let is_last;
        {
            let mut guard = self.state.lock().await;
            if guard.broken {
                return Err(PipelineError::barrier_broken("barrier already broken"));
            }
            generation_at_entry = guard.generation;
            guard.arrived += 1;
            is_last = guard.arrived == self.parties;
            if is_last {
                guard.arrived = 0;
                guard.generation += 1;
                drop(guard);
                self.released.notify_waiters();
                return Ok(true);
            }
        }

        loop {
            let notified = self.released.notified();
            {
                let guard = self.state.lock().await;
                if guard.broken {
                    return Err(PipelineError::barrier_broken("barrier broken while waiting"));
                }
                if guard.generation != generation_at_entry {
                    return Ok(false);
                }
            }
            notified.await;
            let guard = self.state.lock().await;
            if guard.broken {
                return Err(PipelineError::barrier_broken("barrier broken while waiting"));
            }
            if guard.generation != generation_at_entry {
                return Ok(false);
            }
        }
    }

    /// Marks the barrier broken. Called when a worker is cancelled
    /// mid-wait; every future `wait()` (and any waiter still parked)
    /// observes `BarrierBroken`.
    pub async fn break_barrier(&self) {
        let mut guard = self.state.lock().await;
        guard.broken = true;
        drop(guard);
        self.released.notify_waiters();
    }

    pub async fn is_broken(&self) -> bool {
        self.state.lock().await.broken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn all_parties_release_together() {
        let barrier = Arc::new(CyclicBarrier::new(3));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let b = barrier.clone();
            handles.push(tokio::spawn(async move { b.wait().await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn barrier_cycles_across_generations() {
        let barrier = Arc::new(CyclicBarrier::new(2));
        for _ in 0..2 {
            let b1 = barrier.clone();
            let b2 = barrier.clone();
            let h1 = tokio::spawn(async move { b1.wait().await });
            let h2 = tokio::spawn(async move { b2.wait().await });
            h1.await.unwrap().unwrap();
            h2.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn broken_barrier_fails_future_waits() {
        let barrier = CyclicBarrier::new(2);
        barrier.break_barrier().await;
        let err = barrier.wait().await.unwrap_err();
        assert_eq!(err.category(), "backpressure");
    }
}
