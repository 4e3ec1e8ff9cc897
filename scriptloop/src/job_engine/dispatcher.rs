// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;

use async_io::Timer;
use futures::future;
use log::{debug, warn};

use crate::error::{LoopError, Origin};
use crate::job_engine::state::Shared;
use crate::job_engine::timer::DueTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// `run()`: return once no work is outstanding.
    UntilIdle,
    /// `start()`: keep waiting for work until `stop()`.
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    /// No work left (only in [`Mode::UntilIdle`]).
    Idle,
    /// `stop()` was requested.
    Paused,
}

enum Wake {
    Now,
    At(Instant),
    OnSignal,
}

/// The loop body. Runs on whichever thread owns the execution context and
/// executes callbacks strictly one after another.
pub(crate) struct Dispatcher<C> {
    shared: Arc<Shared<C>>,
    mode: Mode,
}

impl<C> Dispatcher<C> {
    pub fn new(shared: Arc<Shared<C>>, mode: Mode) -> Self {
        Self { shared, mode }
    }

    /// Pumps until the mode's exit condition. Every callback error is handed
    /// to `report`; none of them ends the pumping.
    pub fn run(&self, ctx: &mut C, report: &mut dyn FnMut(LoopError)) -> Exit {
        self.shared.lock().running = true;
        debug!("dispatcher started ({:?})", self.mode);

        let exit = loop {
            // wake-ups from before this point are covered by the state we
            // are about to look at
            self.shared.drain_wakeups();
            if let ControlFlow::Break(exit) = self.tick(ctx, report) {
                break exit;
            }
            match self.next_wake() {
                ControlFlow::Break(exit) => break exit,
                ControlFlow::Continue(Wake::Now) => {}
                ControlFlow::Continue(Wake::At(deadline)) => self.wait(Some(deadline)),
                ControlFlow::Continue(Wake::OnSignal) => self.wait(None),
            }
        };

        let mut state = self.shared.lock();
        state.running = false;
        if exit == Exit::Paused {
            state.can_run = false;
            state.pause_requested = false;
        }
        debug!(
            "dispatcher exited ({exit:?}) with {} outstanding items",
            state.job_count
        );
        exit
    }

    /// One iteration: every job queued right now (FIFO), then every timer
    /// due right now (by deadline). A pause request is honored between any
    /// two callbacks.
    fn tick(&self, ctx: &mut C, report: &mut dyn FnMut(LoopError)) -> ControlFlow<Exit> {
        let mut ready = self.shared.lock().queue.drain_ready();
        while !ready.is_empty() {
            {
                let mut state = self.shared.lock();
                if state.pause_requested {
                    state.queue.requeue_front(ready);
                    return ControlFlow::Break(Exit::Paused);
                }
            }
            let Some(job) = ready.pop_front() else {
                break;
            };
            let outcome = invoke(Origin::Job, || job(&mut *ctx));
            self.shared.lock().finish_item();
            if let Err(error) = outcome {
                report(error);
            }
        }

        let now = Instant::now();
        loop {
            let due = {
                let mut state = self.shared.lock();
                if state.pause_requested {
                    return ControlFlow::Break(Exit::Paused);
                }
                match state.timers.pop_due(now) {
                    Some(due) => due,
                    None => break,
                }
            };
            let outcome = match due {
                DueTimer::Timeout { handle, callback } => {
                    let outcome = invoke(Origin::Timeout(handle), || callback(&mut *ctx));
                    self.shared.lock().finish_item();
                    outcome
                }
                DueTimer::Interval {
                    handle,
                    mut callback,
                } => {
                    let outcome = invoke(Origin::Interval(handle), || callback(&mut *ctx));
                    if !self.shared.lock().timers.restore(handle, callback) {
                        debug!("interval {} was cleared while running", handle.id());
                    }
                    outcome
                }
            };
            if let Err(error) = outcome {
                report(error);
            }
        }
        ControlFlow::Continue(())
    }

    fn next_wake(&self) -> ControlFlow<Exit, Wake> {
        let mut state = self.shared.lock();
        if state.pause_requested {
            return ControlFlow::Break(Exit::Paused);
        }
        if !state.queue.is_empty() {
            return ControlFlow::Continue(Wake::Now);
        }
        if self.mode == Mode::UntilIdle && state.job_count == 0 {
            return ControlFlow::Break(Exit::Idle);
        }
        match state.timers.next_deadline() {
            Some(deadline) if deadline <= Instant::now() => ControlFlow::Continue(Wake::Now),
            Some(deadline) => ControlFlow::Continue(Wake::At(deadline)),
            None => ControlFlow::Continue(Wake::OnSignal),
        }
    }

    /// The only place the dispatcher blocks: until `deadline` passes or a
    /// submission signals, whichever comes first.
    fn wait(&self, deadline: Option<Instant>) {
        let wakeups = self.shared.wakeups();
        match deadline {
            None => {
                let _ = wakeups.recv_blocking();
            }
            Some(deadline) => async_io::block_on(async {
                let signal = pin!(wakeups.recv());
                let _ = future::select(signal, Timer::at(deadline)).await;
            }),
        }
    }
}

/// Runs one callback, turning both errors and panics into a [`LoopError`].
pub(crate) fn invoke(
    origin: Origin,
    callback: impl FnOnce() -> anyhow::Result<()>,
) -> Result<(), LoopError> {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => {
            warn!("{origin} failed: {error:#}");
            Err(LoopError::Callback { origin, error })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("{origin} panicked: {message}");
            Err(LoopError::Panicked { origin, message })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
