// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Link watchdog
//!
//! Telemetry is the only liveness signal a notification-driven link gives:
//! a board that browns out or drifts out of range often stops streaming
//! without any disconnect callback. The session re-arms this timer on
//! every decoded frame; if it ever fires, the link is considered stale.
//!
//! At most one timer is armed at a time. Every `arm()` bumps a generation
//! counter and the expiry callback receives the generation it was armed
//! with, so an expiry that races a re-arm can be told apart and ignored.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

pub(crate) struct Watchdog {
    interval: Duration,
    generation: u64,
    deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            generation: 0,
            deadline: None,
            timer: None,
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Cancel any running timer and start a new one
    ///
    /// `on_expire` runs on the timer task with the generation it was armed
    /// with. Returns that generation.
    pub(crate) fn arm<F, Fut>(&mut self, on_expire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let interval = self.interval;
        self.deadline = Some(Instant::now() + interval);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            on_expire(generation).await;
        }));

        trace!("[WATCHDOG] Armed generation {} for {:?}", generation, interval);
        generation
    }

    /// Claim an expiry from the timer task
    ///
    /// Returns `false` when the timer was cancelled or re-armed after
    /// `generation` fired. The handle is released, not aborted: the caller
    /// is running on that very task.
    pub(crate) fn claim_expiry(&mut self, generation: u64) -> bool {
        if self.generation != generation || self.timer.is_none() {
            return false;
        }
        self.timer = None;
        self.deadline = None;
        true
    }

    /// Stop the timer if armed
    pub(crate) fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            trace!("[WATCHDOG] Cancelled generation {}", self.generation);
        }
        self.deadline = None;
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
