// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Pending one-shot and repeating timers.
//!
//! Deadlines sit in a min-heap keyed by `(due, seq)`; `seq` grows with every
//! (re)scheduling, so equal deadlines pop in registration order. Cancelling
//! only removes the timer record. Heap entries whose record is gone, or
//! whose `seq` no longer matches the record, are stale and get skipped.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;

use crate::job_engine::job::{IntervalFn, Job};

/// Intervals shorter than this are clamped, so a repeating timer can never
/// become due again within the tick that fired it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Longest delay honored (2^31 - 1 ms). Longer delays fire after
/// [`MIN_INTERVAL`] instead, as `setTimeout` does in browsers and Node.
pub const MAX_DELAY: Duration = Duration::from_millis(i32::MAX as u64);

fn effective_delay(delay: Duration) -> Duration {
    if delay > MAX_DELAY {
        debug!("delay {delay:?} exceeds {MAX_DELAY:?}, using {MIN_INTERVAL:?}");
        MIN_INTERVAL
    } else {
        delay
    }
}

/// Identifies a timer for cancellation. Timeouts and intervals share one id
/// space, and ids are never reused within a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Rebuilds a handle from an id a script handed back. Unknown ids are
    /// fine: clearing them does nothing.
    pub fn from_id(id: u64) -> Self {
        TimerHandle(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    due: Instant,
    seq: u64,
    id: u64,
}

enum TimerKind<C> {
    Once(Job<C>),
    Repeat {
        period: Duration,
        // `None` while the callback is running on the dispatcher.
        callback: Option<IntervalFn<C>>,
    },
}

struct TimerEntry<C> {
    seq: u64,
    kind: TimerKind<C>,
}

/// A matured timer handed to the dispatcher.
pub enum DueTimer<C> {
    /// Already removed from the registry.
    Timeout { handle: TimerHandle, callback: Job<C> },
    /// Already rescheduled; give the callback back with
    /// [`TimerRegistry::restore`] after running it.
    Interval {
        handle: TimerHandle,
        callback: IntervalFn<C>,
    },
}

pub struct TimerRegistry<C> {
    next_id: u64,
    next_seq: u64,
    timers: HashMap<u64, TimerEntry<C>>,
    schedule: BinaryHeap<Reverse<Deadline>>,
}

impl<C> TimerRegistry<C> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            next_seq: 0,
            timers: HashMap::new(),
            schedule: BinaryHeap::new(),
        }
    }

    pub fn set_timeout(&mut self, callback: Job<C>, delay: Duration, now: Instant) -> TimerHandle {
        self.insert(TimerKind::Once(callback), now + effective_delay(delay))
    }

    pub fn set_interval(
        &mut self,
        callback: IntervalFn<C>,
        period: Duration,
        now: Instant,
    ) -> TimerHandle {
        let period = effective_delay(period).max(MIN_INTERVAL);
        self.insert(
            TimerKind::Repeat {
                period,
                callback: Some(callback),
            },
            now + period,
        )
    }

    fn insert(&mut self, kind: TimerKind<C>, due: Instant) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let seq = self.bump_seq();
        self.timers.insert(id, TimerEntry { seq, kind });
        self.schedule.push(Reverse(Deadline { due, seq, id }));
        TimerHandle(id)
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Cancels a timer. Returns `true` only if a live timer was removed;
    /// already fired, already cancelled and unknown handles are no-ops.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let removed = self.timers.remove(&handle.0).is_some();
        if removed {
            debug!("timer {} cancelled", handle.0);
        }
        removed
    }

    /// Earliest deadline among live timers.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(head)) = self.schedule.peek().copied() {
            if self.is_current(&head) {
                return Some(head.due);
            }
            self.schedule.pop();
        }
        None
    }

    /// Removes and returns the earliest live timer due at or before `now`.
    ///
    /// Calling this repeatedly yields due timers in ascending deadline
    /// order, ties in registration order. Whether a timer was cancelled is
    /// decided here, under the same lock as `cancel`. A repeating timer is
    /// rescheduled to `now + period` before it is returned, so cancelling it
    /// from inside its own callback stops every later firing.
    pub fn pop_due(&mut self, now: Instant) -> Option<DueTimer<C>> {
        while let Some(Reverse(head)) = self.schedule.peek().copied() {
            if head.due > now {
                return None;
            }
            self.schedule.pop();
            if !self.is_current(&head) {
                continue;
            }

            let seq = self.bump_seq();
            let handle = TimerHandle(head.id);
            let Some(entry) = self.timers.get_mut(&head.id) else {
                continue;
            };
            if let TimerKind::Repeat { period, callback } = &mut entry.kind {
                let due = now + *period;
                let callback = callback.take();
                entry.seq = seq;
                self.schedule.push(Reverse(Deadline {
                    due,
                    seq,
                    id: head.id,
                }));
                // the only dispatcher restores every callback before popping again
                debug_assert!(callback.is_some(), "interval {} popped while running", head.id);
                if let Some(callback) = callback {
                    return Some(DueTimer::Interval { handle, callback });
                }
                continue;
            }
            if let Some(TimerEntry {
                kind: TimerKind::Once(callback),
                ..
            }) = self.timers.remove(&head.id)
            {
                return Some(DueTimer::Timeout { handle, callback });
            }
        }
        None
    }

    /// Hands an interval callback back after it ran. Returns `false` (and
    /// drops the callback) if the interval was cancelled meanwhile.
    pub fn restore(&mut self, handle: TimerHandle, callback: IntervalFn<C>) -> bool {
        match self.timers.get_mut(&handle.0).map(|entry| &mut entry.kind) {
            Some(TimerKind::Repeat { callback: slot, .. }) => {
                *slot = Some(callback);
                true
            }
            _ => false,
        }
    }

    fn is_current(&self, deadline: &Deadline) -> bool {
        self.timers
            .get(&deadline.id)
            .is_some_and(|entry| entry.seq == deadline.seq)
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<C> Default for TimerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for TimerRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("live", &self.timers.len())
            .field("scheduled", &self.schedule.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Trace = Vec<&'static str>;

    fn once(tag: &'static str) -> Job<Trace> {
        Box::new(move |trace: &mut Trace| {
            trace.push(tag);
            Ok(())
        })
    }

    fn repeat(tag: &'static str) -> IntervalFn<Trace> {
        Box::new(move |trace: &mut Trace| {
            trace.push(tag);
            Ok(())
        })
    }

    fn fire_all(registry: &mut TimerRegistry<Trace>, now: Instant, trace: &mut Trace) {
        while let Some(due) = registry.pop_due(now) {
            match due {
                DueTimer::Timeout { callback, .. } => callback(trace).unwrap(),
                DueTimer::Interval {
                    handle,
                    mut callback,
                } => {
                    callback(trace).unwrap();
                    registry.restore(handle, callback);
                }
            }
        }
    }

    #[test]
    fn test_due_timers_pop_by_deadline_then_registration() {
        let mut registry = TimerRegistry::new();
        let t0 = Instant::now();
        registry.set_timeout(once("late"), Duration::from_millis(30), t0);
        registry.set_timeout(once("first-tie"), Duration::from_millis(10), t0);
        registry.set_timeout(once("second-tie"), Duration::from_millis(10), t0);
        registry.set_timeout(once("middle"), Duration::from_millis(20), t0);

        let mut trace = Trace::new();
        fire_all(&mut registry, t0 + Duration::from_millis(25), &mut trace);
        assert_eq!(trace, vec!["first-tie", "second-tie", "middle"]);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.next_deadline(),
            Some(t0 + Duration::from_millis(30))
        );
    }

    #[test]
    fn test_nothing_pops_before_deadline() {
        let mut registry = TimerRegistry::new();
        let t0 = Instant::now();
        registry.set_timeout(once("a"), Duration::from_millis(10), t0);
        assert!(registry.pop_due(t0).is_none());
        assert!(registry.pop_due(t0 + Duration::from_millis(9)).is_none());
        assert!(registry.pop_due(t0 + Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_cancel_is_idempotent_and_skips_deadline() {
        let mut registry = TimerRegistry::new();
        let t0 = Instant::now();
        let early = registry.set_timeout(once("early"), Duration::from_millis(5), t0);
        registry.set_timeout(once("late"), Duration::from_millis(50), t0);

        assert!(registry.cancel(early));
        assert!(!registry.cancel(early));
        assert!(!registry.cancel(TimerHandle::from_id(999)));
        assert_eq!(
            registry.next_deadline(),
            Some(t0 + Duration::from_millis(50))
        );

        let mut trace = Trace::new();
        fire_all(&mut registry, t0 + Duration::from_millis(10), &mut trace);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_fired_timeout_cannot_be_cancelled() {
        let mut registry = TimerRegistry::new();
        let t0 = Instant::now();
        let handle = registry.set_timeout(once("a"), Duration::ZERO, t0);
        assert!(registry.pop_due(t0).is_some());
        assert!(!registry.cancel(handle));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_interval_is_rescheduled_before_it_runs() {
        let mut registry = TimerRegistry::new();
        let t0 = Instant::now();
        let period = Duration::from_millis(10);
        let handle = registry.set_interval(repeat("tick"), period, t0);

        let now = t0 + period;
        let Some(DueTimer::Interval { callback, .. }) = registry.pop_due(now) else {
            panic!("interval should be due");
        };
        assert_eq!(registry.next_deadline(), Some(now + period));
        assert!(registry.pop_due(now).is_none());

        // cancelled while its callback was in flight: the callback is dropped
        assert!(registry.cancel(handle));
        assert!(!registry.restore(handle, callback));
        assert_eq!(registry.next_deadline(), None);
    }

    #[test]
    fn test_interval_fires_each_period() {
        let mut registry = TimerRegistry::new();
        let t0 = Instant::now();
        let period = Duration::from_millis(10);
        registry.set_interval(repeat("tick"), period, t0);

        let mut trace = Trace::new();
        for n in 1..=3 {
            fire_all(&mut registry, t0 + period * n, &mut trace);
        }
        assert_eq!(trace, vec!["tick", "tick", "tick"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let mut registry = TimerRegistry::new();
        let t0 = Instant::now();
        registry.set_interval(repeat("tick"), Duration::ZERO, t0);
        assert_eq!(registry.next_deadline(), Some(t0 + MIN_INTERVAL));

        let mut trace = Trace::new();
        fire_all(&mut registry, t0 + MIN_INTERVAL, &mut trace);
        assert_eq!(trace, vec!["tick"]);
    }

    #[test]
    fn test_oversized_delays_fire_after_min_interval() {
        let mut registry = TimerRegistry::new();
        let t0 = Instant::now();
        registry.set_timeout(once("max"), Duration::MAX, t0);
        registry.set_timeout(once("u64-ms"), Duration::from_millis(u64::MAX), t0);
        registry.set_timeout(once("limit"), MAX_DELAY, t0);
        registry.set_interval(repeat("tick"), Duration::MAX, t0);
        assert_eq!(registry.len(), 4);

        let mut trace = Trace::new();
        fire_all(&mut registry, t0 + MIN_INTERVAL, &mut trace);
        assert_eq!(trace, vec!["max", "u64-ms", "tick"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.next_deadline(), Some(t0 + MIN_INTERVAL * 2));
    }
}
