// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Boundary between the event loop and the execution context it drives.

use crate::console::Console;
use crate::job_engine::event_loop::LoopHandle;

/// An execution context that is not thread-safe: the loop guarantees that
/// at most one callback touches it at a time, from one thread at a time.
pub trait ExecutionContext: Send + 'static {
    /// Called once when an [`EventLoop`](crate::EventLoop) takes ownership
    /// of the context. Script runtimes register their `setTimeout`,
    /// `setInterval`, `clearTimeout`, `clearInterval` and `console`
    /// globals here.
    fn install(&mut self, bindings: HostBindings<Self>)
    where
        Self: Sized,
    {
        let _ = bindings;
    }
}

impl ExecutionContext for () {}

/// Host functions offered to a context.
pub struct HostBindings<C> {
    /// Timer and job submission, forwarding straight to the loop.
    pub handle: LoopHandle<C>,
    /// `None` when the loop was configured without a console.
    pub console: Option<Console>,
}
