// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use async_channel::Receiver;
use log::{debug, info, warn};

use crate::config::LoopConfig;
use crate::console::Console;
use crate::context::{ExecutionContext, HostBindings};
use crate::error::{LoopError, Origin};
use crate::job_engine::dispatcher::{invoke, Dispatcher, Mode};
use crate::job_engine::state::Shared;
use crate::job_engine::timer::TimerHandle;

/// Thread-safe submission side of an event loop.
///
/// Submissions never block and never run anything on the calling thread;
/// they only queue work and wake the dispatcher.
pub struct LoopHandle<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for LoopHandle<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C> LoopHandle<C> {
    /// Queues `job` for the next dispatcher iteration. While the loop is
    /// stopped the job waits for the next `start()` (or `run()`).
    pub fn run_on_loop<F>(&self, job: F)
    where
        F: FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    {
        self.shared.lock().enqueue(Box::new(job));
        self.shared.notify();
    }

    /// Arms a one-shot timer firing `delay` from now.
    pub fn set_timeout<F>(&self, callback: F, delay: Duration) -> TimerHandle
    where
        F: FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    {
        let handle = self.shared.lock().add_timeout(Box::new(callback), delay);
        self.shared.notify();
        debug!("timeout {} armed for {delay:?}", handle.id());
        handle
    }

    /// Arms a repeating timer, first firing one `period` from now.
    pub fn set_interval<F>(&self, callback: F, period: Duration) -> TimerHandle
    where
        F: FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
    {
        let handle = self.shared.lock().add_interval(Box::new(callback), period);
        self.shared.notify();
        debug!("interval {} armed every {period:?}", handle.id());
        handle
    }

    /// Cancels a timer. Clearing a fired, cleared or unknown timer does
    /// nothing.
    pub fn clear_timeout(&self, handle: TimerHandle) {
        self.shared.lock().cancel(handle);
        self.shared.notify();
    }

    /// Same as [`clear_timeout`](Self::clear_timeout); an interval keeps
    /// firing until this is called.
    pub fn clear_interval(&self, handle: TimerHandle) {
        self.clear_timeout(handle);
    }

    /// Queued jobs plus live timers.
    pub fn job_count(&self) -> usize {
        self.shared.lock().job_count
    }

    /// Whether callbacks may currently run. Never flips while a callback is
    /// in flight.
    pub fn can_run(&self) -> bool {
        self.shared.lock().can_run
    }

    /// Whether a dispatcher is currently pumping.
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }
}

struct Control<C> {
    /// `None` while a dispatcher owns the context.
    context: Option<C>,
    worker: Option<JoinHandle<C>>,
    /// The worker being joined by `stop()`, which runs without the lock.
    stopping: Option<ThreadId>,
    lost: bool,
}

/// Owns the execution context and decides which thread pumps it.
///
/// Dereferences to its [`LoopHandle`], so timers and jobs can be submitted
/// on the loop directly.
pub struct EventLoop<C: ExecutionContext> {
    handle: LoopHandle<C>,
    control: Mutex<Control<C>>,
    /// Signalled when a `stop()` has finished joining.
    stopped: Condvar,
}

impl<C: ExecutionContext> EventLoop<C> {
    pub fn new(context: C) -> Self {
        Self::with_config(context, LoopConfig::default())
    }

    pub fn with_config(mut context: C, config: LoopConfig) -> Self {
        let console = config.enable_console.then(Console::default);
        let handle = LoopHandle {
            shared: Arc::new(Shared::new(config)),
        };
        context.install(HostBindings {
            handle: handle.clone(),
            console,
        });
        Self {
            handle,
            control: Mutex::new(Control {
                context: Some(context),
                worker: None,
                stopping: None,
                lost: false,
            }),
            stopped: Condvar::new(),
        }
    }

    pub fn handle(&self) -> LoopHandle<C> {
        self.handle.clone()
    }

    fn control(&self) -> MutexGuard<'_, Control<C>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_context(&self) -> Result<C, LoopError> {
        let mut control = self.control();
        if control.lost {
            return Err(LoopError::ContextLost);
        }
        control.context.take().ok_or(LoopError::AlreadyRunning)
    }

    /// Runs `initial` on the calling thread, then pumps jobs and timers on
    /// it until no work is outstanding.
    ///
    /// Returns the first callback error of this run; later ones are only
    /// logged. Fails with [`LoopError::AlreadyRunning`] if the loop is
    /// started or already inside `run`.
    pub fn run<F>(&self, initial: F) -> Result<(), LoopError>
    where
        F: FnOnce(&mut C) -> anyhow::Result<()>,
    {
        let mut context = self.take_context()?;
        self.handle.shared.lock().can_run = true;

        let mut first_error = invoke(Origin::Initial, || initial(&mut context)).err();
        let dispatcher = Dispatcher::new(self.handle.shared.clone(), Mode::UntilIdle);
        dispatcher.run(&mut context, &mut |error| {
            if first_error.is_none() {
                first_error = Some(error);
            }
        });

        self.handle.shared.lock().can_run = false;
        self.control().context = Some(context);
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Starts pumping on a dedicated worker thread and returns immediately.
    /// Starting a started loop does nothing, and neither does starting a
    /// loop whose `stop()` is still in progress.
    ///
    /// Callback errors go to the channel returned by [`errors`](Self::errors).
    pub fn start(&self) -> Result<(), LoopError> {
        let mut control = self.control();
        if control.worker.is_some() || control.stopping.is_some() {
            debug!("event loop already started");
            return Ok(());
        }
        if control.lost {
            return Err(LoopError::ContextLost);
        }
        let Some(mut context) = control.context.take() else {
            return Err(LoopError::AlreadyRunning);
        };

        {
            let mut state = self.handle.shared.lock();
            state.can_run = true;
            state.pause_requested = false;
        }

        let shared = self.handle.shared.clone();
        let spawned = thread::Builder::new()
            .name(shared.config.thread_name.clone())
            .spawn(move || {
                let dispatcher = Dispatcher::new(shared.clone(), Mode::Continuous);
                let exit = dispatcher.run(&mut context, &mut |error| shared.report(error));
                debug!("event loop worker finished: {exit:?}");
                context
            });

        match spawned {
            Ok(worker) => {
                control.worker = Some(worker);
                info!("event loop started");
                Ok(())
            }
            Err(e) => {
                // the closure, and the context with it, is gone
                self.handle.shared.lock().can_run = false;
                control.lost = true;
                Err(LoopError::Spawn(e))
            }
        }
    }

    /// Pauses the worker after the callback in flight (if any) and waits
    /// until it has stopped. Queued jobs and armed timers are kept for the
    /// next `start()`. Stopping a stopped loop does nothing.
    ///
    /// Blocks for as long as the callback in flight runs. A concurrent
    /// `stop()` waits for the first one to finish.
    pub fn stop(&self) -> Result<(), LoopError> {
        let current = thread::current().id();
        let mut control = self.control();
        loop {
            let stopping = control.stopping;
            match stopping {
                None => break,
                Some(worker) if worker == current => {
                    return Err(LoopError::StopFromLoopThread);
                }
                Some(_) => {
                    control = self
                        .stopped
                        .wait(control)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }

        let Some(worker) = control.worker.take() else {
            return Ok(());
        };
        if worker.thread().id() == current {
            control.worker = Some(worker);
            return Err(LoopError::StopFromLoopThread);
        }
        control.stopping = Some(worker.thread().id());
        drop(control);

        self.handle.shared.lock().pause_requested = true;
        self.handle.shared.notify();
        let joined = worker.join();

        let mut control = self.control();
        control.stopping = None;
        let result = match joined {
            Ok(context) => {
                control.context = Some(context);
                info!("event loop stopped");
                Ok(())
            }
            Err(_) => {
                warn!("event loop worker panicked, execution context is lost");
                control.lost = true;
                let mut state = self.handle.shared.lock();
                state.can_run = false;
                state.running = false;
                state.pause_requested = false;
                Err(LoopError::WorkerPanicked)
            }
        };
        drop(control);
        self.stopped.notify_all();
        result
    }

    /// Callback errors raised while the loop runs in `start()` mode.
    pub fn errors(&self) -> Receiver<LoopError> {
        self.handle.shared.errors()
    }

    /// Gives `f` the execution context while no dispatcher is pumping.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut C) -> R) -> Result<R, LoopError> {
        let mut control = self.control();
        if control.lost {
            return Err(LoopError::ContextLost);
        }
        match control.context.as_mut() {
            Some(context) => Ok(f(context)),
            None => Err(LoopError::AlreadyRunning),
        }
    }

    /// Stops the loop and hands the execution context back.
    pub fn into_context(self) -> Result<C, LoopError> {
        self.stop()?;
        self.take_context()
    }
}

impl<C: ExecutionContext> Deref for EventLoop<C> {
    type Target = LoopHandle<C>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<C: ExecutionContext> Drop for EventLoop<C> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop event loop on drop: {e}");
        }
    }
}
