// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender};
use log::debug;

use crate::config::LoopConfig;
use crate::error::LoopError;
use crate::job_engine::job::{IntervalFn, Job, JobQueue};
use crate::job_engine::timer::{TimerHandle, TimerRegistry};

/// Everything the dispatcher and the submitting threads share. Only ever
/// accessed through [`Shared::lock`].
pub(crate) struct LoopState<C> {
    /// A dispatcher is currently pumping (either mode).
    pub running: bool,
    /// Callbacks may run. Only changes while no callback is in flight.
    pub can_run: bool,
    /// `stop()` asked the worker to pause at its next checkpoint.
    pub pause_requested: bool,
    /// Queued jobs plus live timers. An interval counts once for as long as
    /// it is armed.
    pub job_count: usize,
    pub queue: JobQueue<C>,
    pub timers: TimerRegistry<C>,
}

impl<C> LoopState<C> {
    fn new() -> Self {
        Self {
            running: false,
            can_run: false,
            pause_requested: false,
            job_count: 0,
            queue: JobQueue::new(),
            timers: TimerRegistry::new(),
        }
    }

    pub fn enqueue(&mut self, job: Job<C>) {
        self.queue.enqueue(job);
        self.job_count += 1;
    }

    pub fn add_timeout(&mut self, callback: Job<C>, delay: Duration) -> TimerHandle {
        let handle = self.timers.set_timeout(callback, delay, Instant::now());
        self.job_count += 1;
        handle
    }

    pub fn add_interval(&mut self, callback: IntervalFn<C>, period: Duration) -> TimerHandle {
        let handle = self.timers.set_interval(callback, period, Instant::now());
        self.job_count += 1;
        handle
    }

    pub fn cancel(&mut self, handle: TimerHandle) {
        if self.timers.cancel(handle) {
            self.finish_item();
        }
    }

    /// A job or a one-shot timer has run to completion.
    pub fn finish_item(&mut self) {
        debug_assert!(self.job_count > 0, "job_count underflow");
        self.job_count = self.job_count.saturating_sub(1);
    }
}

pub(crate) struct Shared<C> {
    state: Mutex<LoopState<C>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    errors_tx: Sender<LoopError>,
    errors_rx: Receiver<LoopError>,
    pub config: LoopConfig,
}

impl<C> Shared<C> {
    pub fn new(config: LoopConfig) -> Self {
        // one pending wake-up is enough, further ones coalesce
        let (wake_tx, wake_rx) = async_channel::bounded(1);
        let (errors_tx, errors_rx) = async_channel::unbounded();
        Self {
            state: Mutex::new(LoopState::new()),
            wake_tx,
            wake_rx,
            errors_tx,
            errors_rx,
            config,
        }
    }

    /// The state is only changed in short sections that do not panic, so a
    /// poisoned lock still guards consistent data.
    pub fn lock(&self) -> MutexGuard<'_, LoopState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes the dispatcher if it is waiting.
    pub fn notify(&self) {
        // Full means a wake-up is already pending.
        let _ = self.wake_tx.try_send(());
    }

    pub fn wakeups(&self) -> &Receiver<()> {
        &self.wake_rx
    }

    /// Forgets wake-ups that arrived before the dispatcher looks at the state
    /// again.
    pub fn drain_wakeups(&self) {
        while self.wake_rx.try_recv().is_ok() {}
    }

    pub fn report(&self, error: LoopError) {
        if self.errors_tx.try_send(error).is_err() {
            debug!("error channel closed, dropping loop error");
        }
    }

    pub fn errors(&self) -> Receiver<LoopError> {
        self.errors_rx.clone()
    }
}
