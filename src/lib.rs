//! Batch execution of DSLX functions and procs through a bytecode interpreter.
//!
//! A batch call compiles the source text once, resolves the top-level name, and
//! then runs one row at a time: a function is interpreted once per argument
//! row, a proc is spawned once and ticked once per row with its inputs
//! pre-loaded onto channels.

pub mod bytecode;
pub mod channel;
pub mod dslx;
pub mod error;
pub mod golden;
pub mod harness;
pub mod location;
pub mod toolchain;
pub mod types;
pub mod value;


use std::path::Path;

pub use error::{Error, ErrorKind, Result};
pub use harness::{BatchHarness, EmptyRowPolicy, ProcRow, RowFailurePolicy, RunConfig};
pub use value::{Bits, Value};

/// Interprets the function `top_name` of `text` once per row of `args_batch`.
///
/// The first failing row fails the whole call.
pub fn run_function_batch(
    text: &str,
    top_name: &str,
    args_batch: &[Vec<Value>],
    stdlib_path: impl AsRef<Path>,
) -> Result<Vec<Value>> {
    let config = RunConfig::default().with_stdlib_path(stdlib_path.as_ref());
    BatchHarness::dslx(config)
        .run_function(text, top_name, args_batch)?
        .into_iter()
        .collect()
}

/// Spawns the proc `top_name` of `text` once and ticks it once per row of
/// `args_batch`, starting from `initial_state`.
///
/// Each row holds one value per input channel. The first failing tick fails the
/// whole call.
pub fn run_proc_batch(
    text: &str,
    top_name: &str,
    args_batch: &[Vec<Value>],
    initial_state: &[Value],
    stdlib_path: impl AsRef<Path>,
) -> Result<Vec<ProcRow>> {
    let config = RunConfig::default().with_stdlib_path(stdlib_path.as_ref());
    BatchHarness::dslx(config)
        .run_proc(text, top_name, args_batch, initial_state)?
        .into_iter()
        .collect()
}
