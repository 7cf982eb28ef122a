//! Batch execution over a [`Toolchain`]: function batches and proc batches.

pub mod config;
pub mod function;
pub mod network;
pub mod proc_runner;
pub mod sign;

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::dslx::DslxToolchain;
use crate::error::{Error, LookupError, Result};
use crate::location::FileName;
use crate::toolchain::{MemberKind, ModuleMember, Toolchain};
use crate::value::Value;

pub use config::{EmptyRowPolicy, RowFailurePolicy, RunConfig};
pub use function::ArgumentBatchRunner;
pub use network::{ChannelEdge, ProcNetwork};
pub use proc_runner::{ProcNetworkRunner, ProcRow};

/// Name of the module batch source text is compiled as.
pub const BATCH_MODULE: &str = "batched";

pub struct BatchHarness<T: Toolchain> {
    toolchain: T,
    config: RunConfig,
}

impl BatchHarness<DslxToolchain> {
    pub fn dslx(config: RunConfig) -> Self {
        let toolchain = DslxToolchain::new(config.stdlib_path.clone(), config.search_paths.clone())
            .with_max_call_depth(config.max_call_depth);
        Self::new(toolchain, config)
    }

    /// Renders `error` for a terminal. Compile errors are labelled against the
    /// file they were found in, which may be an imported module.
    pub fn render_error(&self, error: &Error) -> String {
        let source = match error {
            Error::Compile(compile) => compile
                .span
                .file()
                .and_then(|file| self.toolchain.source(&file)),
            _ => None,
        };
        match source {
            Some(code) => error.display(code),
            None => error.to_string(),
        }
    }
}

impl<T: Toolchain> BatchHarness<T> {
    pub fn new(toolchain: T, config: RunConfig) -> Self {
        Self { toolchain, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    /// Runs `top_name`, which must be a function, once per row of `batch`.
    pub fn run_function(
        &mut self,
        text: &str,
        top_name: &str,
        batch: &[Vec<Value>],
    ) -> Result<Vec<Result<Value>>> {
        let module = self.toolchain.parse_and_typecheck(text, FileName::BATCH)?;
        let function = match self.lookup(&module, top_name)? {
            ModuleMember::Function(function) => function,
            other => return Err(wrong_kind(top_name, MemberKind::Function, other.kind())),
        };
        ArgumentBatchRunner::new(&mut self.toolchain, self.config.row_failures).run(
            &module,
            top_name,
            &function,
            batch,
        )
    }

    /// Runs `top_name`, which must be a proc, for one tick per row of `batch`.
    pub fn run_proc(
        &mut self,
        text: &str,
        top_name: &str,
        batch: &[Vec<Value>],
        initial_state: &[Value],
    ) -> Result<Vec<Result<ProcRow>>> {
        let module = self.toolchain.parse_and_typecheck(text, FileName::BATCH)?;
        let proc = match self.lookup(&module, top_name)? {
            ModuleMember::Proc(proc) => proc,
            other => return Err(wrong_kind(top_name, MemberKind::Proc, other.kind())),
        };
        let row_failures = self.config.row_failures;
        let empty_rows = self.config.empty_rows;
        ProcNetworkRunner::new(&mut self.toolchain, row_failures, empty_rows).run(
            &module,
            top_name,
            &proc,
            batch,
            initial_state,
        )
    }

    fn lookup(&self, module: &T::Module, name: &str) -> Result<ModuleMember<T::Function, T::Proc>> {
        let Some(member) = self.toolchain.find_member(module, name) else {
            return Err(LookupError::NotFound {
                module: BATCH_MODULE.to_owned(),
                name: name.to_owned(),
            }
            .into());
        };
        debug!(name, kind = %member.kind(), "resolved top-level member");
        Ok(member)
    }
}

fn wrong_kind(name: &str, expected: MemberKind, found: MemberKind) -> Error {
    LookupError::WrongKind {
        name: name.to_owned(),
        expected,
        found,
    }
    .into()
}
