// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use clap::ValueEnum;

pub const DEFAULT_THREAD_NAME: &str = "scriptloop";

/// Per-loop settings, fixed when the loop is created.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Install a console bridge into the execution context.
    pub enable_console: bool,
    /// Name of the worker thread spawned by `start()`.
    pub thread_name: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            enable_console: true,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl LoopConfig {
    pub fn with_console(mut self, enable: bool) -> Self {
        self.enable_console = enable;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// How the command line drives the loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
#[clap(rename_all = "kebab-case")]
pub enum LoopMode {
    #[default]
    /// Default: pump on the calling thread until no work is left
    Run,
    /// Pump on a worker thread for a fixed time, then stop
    Start,
}
