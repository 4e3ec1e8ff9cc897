// SPDX-License-Identifier: MIT
// scriptloop: single-threaded timer event loop for embedded script contexts
//
// - Runs callbacks one at a time against a context that is not thread-safe.
// - Lets any thread submit jobs, arm and cancel timers, start and stop the loop.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod config;
pub mod console;
pub mod context;
pub mod error;
pub mod job_engine;
pub mod script;

pub use config::{LoopConfig, LoopMode};
pub use console::Console;
pub use context::{ExecutionContext, HostBindings};
pub use error::{LoopError, Origin};
pub use job_engine::event_loop::{EventLoop, LoopHandle};
pub use job_engine::job::{IntervalFn, Job};
pub use job_engine::timer::TimerHandle;
