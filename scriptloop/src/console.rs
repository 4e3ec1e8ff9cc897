// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Console bridge handed to execution contexts when the loop is configured
//! with `enable_console`.

use log::{error, info, warn};

pub const CONSOLE_TARGET: &str = "console";

#[derive(Debug, Clone, Default)]
pub struct Console;

impl Console {
    pub fn log(&self, message: &str) {
        info!(target: CONSOLE_TARGET, "{message}");
    }

    pub fn warn(&self, message: &str) {
        warn!(target: CONSOLE_TARGET, "{message}");
    }

    pub fn error(&self, message: &str) {
        error!(target: CONSOLE_TARGET, "{message}");
    }
}
