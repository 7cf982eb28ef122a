use tracing::{debug, trace};

use crate::error::Result;
use crate::harness::config::RowFailurePolicy;
use crate::harness::sign::convert_row;
use crate::toolchain::Toolchain;
use crate::value::Value;

/// Replays a batch of argument rows through one compiled function.
pub struct ArgumentBatchRunner<'t, T: Toolchain> {
    toolchain: &'t mut T,
    row_failures: RowFailurePolicy,
}

impl<'t, T: Toolchain> ArgumentBatchRunner<'t, T> {
    pub fn new(toolchain: &'t mut T, row_failures: RowFailurePolicy) -> Self {
        Self {
            toolchain,
            row_failures,
        }
    }

    /// Emits `function` once, then converts and interprets each row in order.
    ///
    /// Under [`RowFailurePolicy::AbortBatch`] the first failing row is the
    /// result of the whole call, and every returned entry is `Ok`.
    pub fn run(
        &mut self,
        module: &T::Module,
        name: &str,
        function: &T::Function,
        batch: &[Vec<Value>],
    ) -> Result<Vec<Result<Value>>> {
        let signature = self.toolchain.signature(module, function)?;
        let bytecode = self.toolchain.emit(module, function)?;
        debug!(function = name, rows = batch.len(), "running function batch");

        let what = format!("function `{name}`");
        let mut results = Vec::with_capacity(batch.len());
        for (index, row) in batch.iter().enumerate() {
            let result = convert_row(row, &signature.params, &what)
                .and_then(|args| self.toolchain.interpret(&bytecode, &args))
                .map_err(|error| error.at_row(index));
            match result {
                Ok(value) => {
                    trace!(row = index, %value, "row finished");
                    results.push(Ok(value));
                }
                Err(error) if self.row_failures == RowFailurePolicy::AbortBatch => {
                    return Err(error)
                }
                Err(error) => {
                    debug!(row = index, %error, "row failed");
                    results.push(Err(error));
                }
            }
        }
        Ok(results)
    }
}
