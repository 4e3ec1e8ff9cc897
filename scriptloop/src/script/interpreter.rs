// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use scriptloop_buffer::{Buffer, BufferSource};
use serde::Serialize;

use super::statement::{self, Level, Program, Statement};
use crate::console::Console;
use crate::context::{ExecutionContext, HostBindings};
use crate::error::ScriptError;
use crate::job_engine::event_loop::LoopHandle;
use crate::job_engine::timer::TimerHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Buffer(Buffer),
}

/// Execution context running JSON action programs. Timer ids are handed to
/// programs as plain integers, like in JavaScript.
#[derive(Default)]
pub struct Interpreter {
    host: Option<LoopHandle<Interpreter>>,
    console: Option<Console>,
    globals: HashMap<String, Value>,
    output: Vec<String>,
}

impl ExecutionContext for Interpreter {
    fn install(&mut self, bindings: HostBindings<Self>) {
        self.host = Some(bindings.handle);
        self.console = bindings.console;
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(name: &str, source: &str) -> Result<Program, ScriptError> {
        statement::compile(name, source)
    }

    pub fn run(&mut self, program: &Program) -> Result<(), ScriptError> {
        self.exec(&program.statements)
    }

    /// Console lines written so far, oldest first.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    fn exec(&mut self, statements: &[Statement]) -> Result<(), ScriptError> {
        statements.iter().try_for_each(|s| self.exec_one(s))
    }

    fn exec_one(&mut self, statement: &Statement) -> Result<(), ScriptError> {
        match statement {
            Statement::Log { message, level } => self.print(message.clone(), *level)?,
            Statement::LogValue { name } => {
                let line = match self.lookup(name)? {
                    Value::Int(i) => i.to_string(),
                    Value::Buffer(buffer) => serde_json::to_string(buffer)
                        .map_err(|e| ScriptError::Thrown(e.to_string()))?,
                };
                self.print(line, Level::Log)?;
            }
            Statement::Set { name, value } => {
                self.globals.insert(name.clone(), Value::Int(*value));
            }
            Statement::Incr { name } => {
                let next = self.int(name)? + 1;
                self.globals.insert(name.clone(), Value::Int(next));
            }
            Statement::SetTimeout {
                delay_ms,
                body,
                name,
            } => {
                let body = body.clone();
                let handle = self.host("setTimeout")?.set_timeout(
                    move |vm: &mut Interpreter| vm.exec(&body).map_err(anyhow::Error::from),
                    Duration::from_millis(*delay_ms),
                );
                self.bind_timer(name, handle);
            }
            Statement::SetInterval {
                period_ms,
                body,
                name,
            } => {
                let body = body.clone();
                let handle = self.host("setInterval")?.set_interval(
                    move |vm: &mut Interpreter| vm.exec(&body).map_err(anyhow::Error::from),
                    Duration::from_millis(*period_ms),
                );
                self.bind_timer(name, handle);
            }
            Statement::ClearTimeout { name } => {
                let id = self.int(name)?;
                let host = self.host("clearTimeout")?;
                if let Ok(id) = u64::try_from(id) {
                    host.clear_timeout(TimerHandle::from_id(id));
                }
            }
            Statement::ClearInterval { name } => {
                let id = self.int(name)?;
                let host = self.host("clearInterval")?;
                if let Ok(id) = u64::try_from(id) {
                    host.clear_interval(TimerHandle::from_id(id));
                }
            }
            Statement::IfAbove { name, value, then } => {
                if self.int(name)? > *value {
                    self.exec(then)?;
                }
            }
            Statement::Buffer {
                name,
                from,
                alloc,
                fill,
            } => {
                let source = match (from, alloc) {
                    (Some(value), _) => BufferSource::from_json(value),
                    (None, Some(size)) => BufferSource::Alloc {
                        size: *size,
                        fill: fill.clone(),
                    },
                    (None, None) => {
                        return Err(ScriptError::Thrown(format!("buffer {name} has no source")))
                    }
                };
                self.globals
                    .insert(name.clone(), Value::Buffer(Buffer::from_source(source)));
            }
            Statement::Sleep { ms } => thread::sleep(Duration::from_millis(*ms)),
            Statement::Throw { message } => return Err(ScriptError::Thrown(message.clone())),
        }
        Ok(())
    }

    fn print(&mut self, line: String, level: Level) -> Result<(), ScriptError> {
        let console = self
            .console
            .as_ref()
            .ok_or_else(|| ScriptError::NotDefined("console".to_string()))?;
        match level {
            Level::Log => console.log(&line),
            Level::Warn => console.warn(&line),
            Level::Error => console.error(&line),
        }
        self.output.push(line);
        Ok(())
    }

    fn host(&self, function: &str) -> Result<&LoopHandle<Interpreter>, ScriptError> {
        self.host
            .as_ref()
            .ok_or_else(|| ScriptError::NotDefined(function.to_string()))
    }

    fn bind_timer(&mut self, name: &Option<String>, handle: TimerHandle) {
        if let Some(name) = name {
            // ids count up from 1 and never get near i64::MAX
            let id = i64::try_from(handle.id()).unwrap_or(i64::MAX);
            self.globals.insert(name.clone(), Value::Int(id));
        }
    }

    fn lookup(&self, name: &str) -> Result<&Value, ScriptError> {
        self.globals
            .get(name)
            .ok_or_else(|| ScriptError::NotDefined(name.to_string()))
    }

    fn int(&self, name: &str) -> Result<i64, ScriptError> {
        match self.lookup(name)? {
            Value::Int(i) => Ok(*i),
            Value::Buffer(_) => Err(ScriptError::WrongType {
                name: name.to_string(),
                expected: "number",
            }),
        }
    }
}
