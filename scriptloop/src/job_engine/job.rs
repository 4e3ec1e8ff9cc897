// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::VecDeque;

/// A single-use callback run against the execution context. Jobs have no
/// identity and cannot be cancelled once queued.
pub type Job<C> = Box<dyn FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static>;

/// The callback of a repeating timer.
pub type IntervalFn<C> = Box<dyn FnMut(&mut C) -> anyhow::Result<()> + Send + 'static>;

/// FIFO inbox of jobs waiting for the dispatcher.
///
/// Not synchronized by itself: it lives inside the loop state and is only
/// touched under the loop lock, together with the outstanding work counter.
pub struct JobQueue<C> {
    jobs: VecDeque<Job<C>>,
}

impl<C> JobQueue<C> {
    pub fn new() -> Self {
        Self {
            jobs: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, job: Job<C>) {
        self.jobs.push_back(job);
    }

    /// Removes every job queued right now, oldest first. Jobs enqueued later
    /// (including by the drained jobs themselves) wait for the next drain.
    pub fn drain_ready(&mut self) -> VecDeque<Job<C>> {
        std::mem::take(&mut self.jobs)
    }

    /// Puts jobs that were drained but not run back at the head of the
    /// queue, ahead of anything enqueued in the meantime.
    pub fn requeue_front(&mut self, mut unfinished: VecDeque<Job<C>>) {
        unfinished.append(&mut self.jobs);
        self.jobs = unfinished;
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl<C> Default for JobQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for JobQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("len", &self.jobs.len())
            .finish()
    }
}
