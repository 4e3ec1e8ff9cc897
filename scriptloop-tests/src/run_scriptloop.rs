// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::process::{Command, Output};

/// Runs the `scriptloop` binary located via cargo run.
pub struct ScriptloopCommand {
    args: Vec<String>,
}

impl Default for ScriptloopCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptloopCommand {
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program_json(self, json: &str) -> Self {
        self.arg("--program-json").arg(json)
    }

    pub fn program_base64(self, b64: &str) -> Self {
        self.arg("--program-base64").arg(b64)
    }

    pub fn no_console(self) -> Self {
        self.arg("--no-console")
    }

    pub fn start_for_ms(self, duration_ms: u64) -> Self {
        self.arg("--mode")
            .arg("start")
            .arg("--duration-ms")
            .arg(duration_ms.to_string())
    }

    pub fn run(self) -> std::io::Result<Output> {
        println!("Executing scriptloop {:?}", self.args);
        Command::new(env!("CARGO"))
            .args(["run", "--quiet", "-p", "scriptloop", "--"])
            .args(&self.args)
            .env("RUST_LOG", "info")
            .output()
    }
}
