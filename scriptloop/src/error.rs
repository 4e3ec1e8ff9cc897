// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Errors of the event loop itself and of the callbacks it runs.

use std::fmt;

use thiserror::Error;

use crate::job_engine::timer::TimerHandle;

/// Which callback an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The closure passed to [`EventLoop::run`](crate::EventLoop::run).
    Initial,
    /// A job submitted via `run_on_loop`.
    Job,
    Timeout(TimerHandle),
    Interval(TimerHandle),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Initial => write!(f, "initial job"),
            Origin::Job => write!(f, "job"),
            Origin::Timeout(handle) => write!(f, "timeout {}", handle.id()),
            Origin::Interval(handle) => write!(f, "interval {}", handle.id()),
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoopError {
    /// Another dispatcher currently owns the execution context.
    #[error("event loop is already running")]
    AlreadyRunning,

    /// `stop()` was called by a callback running on the loop thread.
    #[error("stop() called from the loop thread would wait on itself")]
    StopFromLoopThread,

    /// The worker thread died and took the execution context with it.
    #[error("execution context was lost with a dead worker thread")]
    ContextLost,

    #[error("event loop worker thread panicked")]
    WorkerPanicked,

    #[error("failed to spawn event loop thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A callback returned an error. Other queued work is unaffected.
    #[error("{origin} failed: {error:#}")]
    Callback {
        origin: Origin,
        error: anyhow::Error,
    },

    /// A callback panicked. The panic is contained at the callback boundary.
    #[error("{origin} panicked: {message}")]
    Panicked { origin: Origin, message: String },
}

impl LoopError {
    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LoopError::AlreadyRunning => "loop_already_running",
            LoopError::StopFromLoopThread => "loop_stop_from_loop_thread",
            LoopError::ContextLost => "loop_context_lost",
            LoopError::WorkerPanicked => "loop_worker_panicked",
            LoopError::Spawn(_) => "loop_spawn_failed",
            LoopError::Callback { .. } => "callback_failed",
            LoopError::Panicked { .. } => "callback_panicked",
        }
    }

    /// The callback this error came from, if it came from one.
    pub fn origin(&self) -> Option<Origin> {
        match self {
            LoopError::Callback { origin, .. } | LoopError::Panicked { origin, .. } => {
                Some(*origin)
            }
            _ => None,
        }
    }
}

/// Errors raised by the JSON action interpreter.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The program could not be parsed or validated. Raised by `compile`,
    /// before anything reaches the loop.
    #[error("SyntaxError in {name}: {message}")]
    Compile { name: String, message: String },

    #[error("ReferenceError: {0} is not defined")]
    NotDefined(String),

    #[error("TypeError: {name} is not a {expected}")]
    WrongType { name: String, expected: &'static str },

    /// Raised by a `throw` statement.
    #[error("Uncaught {0}")]
    Thrown(String),
}
