// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! A small execution context driven by the event loop: programs are JSON
//! arrays of statements, and the timer statements forward straight to the
//! loop's host functions.

pub mod interpreter;
pub mod statement;

pub use interpreter::{Interpreter, Value};
pub use statement::{Level, Program, Statement};
