// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Single-Threaded Timer Event Loop
//!
//! ## Overview
//! Callbacks run one at a time against an execution context that is not
//! thread-safe, while any thread may submit jobs, arm or cancel timers and
//! start or stop the loop.
//!
//! - One lock guards all shared state: the job queue, the timer registry,
//!   the outstanding work counter and the run flags.
//! - The job queue is unbounded (no backpressure). Jobs submitted while the
//!   loop is stopped stay queued until the next `start()`.
//! - The dispatcher drains ready jobs (FIFO), then due timers (by deadline,
//!   ties by registration order), then sleeps until the next deadline or
//!   until a submission wakes it.
//! - `run()` pumps on the calling thread until no work is left; `start()`
//!   pumps on a worker thread until `stop()`.
//!
//!
//! ```text
//!         +------------------------------------------+
//!         |   any thread: run_on_loop / set_timeout  |
//!         |   set_interval / clear_* / start / stop  |
//!         +--------------------+---------------------+
//!                              | lock + wake signal
//!                              v
//!         +--------------------+---------------------+
//!         |  LoopState: queue, timers, job_count     |
//!         +--------------------+---------------------+
//!                              |
//!                              v
//!         +--------------------+---------------------+
//!         |  Dispatcher (owns the context)           |
//!         |  jobs -> due timers -> wait              |
//!         +------------------------------------------+
//! ```

pub(crate) mod dispatcher;
pub mod event_loop;
pub mod job;
pub(crate) mod state;
pub mod timer;
