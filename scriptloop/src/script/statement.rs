// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    #[default]
    Log,
    Warn,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Statement {
    Log {
        message: String,
        #[serde(default)]
        level: Level,
    },

    LogValue {
        name: String,
    },

    Set {
        name: String,
        value: i64,
    },

    Incr {
        name: String,
    },

    SetTimeout {
        delay_ms: u64,
        body: Vec<Statement>,
        /// Variable receiving the timer id.
        #[serde(default)]
        name: Option<String>,
    },

    SetInterval {
        period_ms: u64,
        body: Vec<Statement>,
        #[serde(default)]
        name: Option<String>,
    },

    ClearTimeout {
        name: String,
    },

    ClearInterval {
        name: String,
    },

    IfAbove {
        name: String,
        value: i64,
        then: Vec<Statement>,
    },

    /// `Buffer.from(from)` or `Buffer.alloc(alloc, fill)`.
    Buffer {
        name: String,
        #[serde(default)]
        from: Option<serde_json::Value>,
        #[serde(default)]
        alloc: Option<usize>,
        #[serde(default)]
        fill: Option<String>,
    },

    /// Blocks the loop thread.
    Sleep {
        ms: u64,
    },

    Throw {
        message: String,
    },
}

/// A parsed and validated program, ready to run any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    pub statements: Vec<Statement>,
}

pub fn compile(name: &str, source: &str) -> Result<Program, ScriptError> {
    let compile_error = |message: String| ScriptError::Compile {
        name: name.to_string(),
        message,
    };
    let statements: Vec<Statement> =
        serde_json::from_str(source).map_err(|e| compile_error(e.to_string()))?;
    validate(&statements).map_err(compile_error)?;
    Ok(Program {
        name: name.to_string(),
        statements,
    })
}

fn validate(statements: &[Statement]) -> Result<(), String> {
    for statement in statements {
        match statement {
            Statement::Buffer {
                name,
                from,
                alloc,
                fill,
            } => match (from, alloc) {
                (Some(_), None) if fill.is_some() => {
                    return Err(format!("buffer {name}: fill is only allowed with alloc"));
                }
                (Some(_), None) | (None, Some(_)) => {}
                _ => {
                    return Err(format!(
                        "buffer {name}: exactly one of from / alloc is required"
                    ));
                }
            },
            Statement::SetTimeout { body, .. } | Statement::SetInterval { body, .. } => {
                validate(body)?
            }
            Statement::IfAbove { then, .. } => validate(then)?,
            _ => {}
        }
    }
    Ok(())
}
