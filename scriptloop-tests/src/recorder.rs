// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub label: String,

    /// Name of the thread the event was recorded on.
    pub thread: Option<String>,

    pub elapsed_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct EventLog {
    pub events: Vec<RecordedEvent>,
}

/// Collects labelled events from callbacks running on any thread.
#[derive(Clone)]
pub struct Recorder {
    started: Instant,
    log: Arc<Mutex<EventLog>>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            log: Arc::new(Mutex::new(EventLog::default())),
        }
    }

    pub fn record(&self, label: impl Into<String>) {
        let event = RecordedEvent {
            label: label.into(),
            thread: thread::current().name().map(str::to_string),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        };
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .push(event);
    }

    pub fn snapshot(&self) -> EventLog {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.snapshot()
            .events
            .into_iter()
            .map(|event| event.label)
            .collect()
    }

    pub fn count(&self, label: &str) -> usize {
        self.snapshot()
            .events
            .iter()
            .filter(|event| event.label == label)
            .count()
    }

    /// The log as JSON, for printing when an assertion fails.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_default()
    }
}

/// Polls `condition` every few milliseconds until it holds or `timeout`
/// passes. Returns whether it held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
