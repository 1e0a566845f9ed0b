//! thsh: a small interactive Unix shell.
//!
//! A line is parsed into a [`parser::Pipeline`] of stages joined by `|`, with
//! optional `<` and `>` redirects and trailing-wildcard globs such as `*.txt`.
//! Stages run as builtins inside the interpreter or as child processes found
//! through `PATH`. Every stage of a pipeline is started before any of them is
//! waited on; the children are tracked by the [`job::JobRegistry`].
//!
//! The main entry point is [`Interpreter`], which owns all shell state and
//! drives both the interactive loop and non-interactive scripts.

mod builtin;
pub mod command;
pub mod completion;
pub mod env;
pub mod error;
mod executor;
pub mod glob;
pub mod history;
mod interpreter;
mod io_adapters;
pub mod job;
pub mod parser;
pub mod path;

#[cfg(test)]
mod testutil;

/// Re-export of the shell driver.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;
