use serde::Serialize;
use tracing::{debug, trace};

use crate::error::Result;
use crate::harness::config::{EmptyRowPolicy, RowFailurePolicy};
use crate::harness::network::ProcNetwork;
use crate::toolchain::Toolchain;
use crate::value::Value;

/// The outcome of one tick: the state the next tick starts from and the values
/// drained from the output channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcRow {
    pub next_state: Vec<Value>,
    pub outputs: Vec<Value>,
}

impl ProcRow {
    /// The row as a `(next_state, outputs)` pair of tuples.
    pub fn into_value(self) -> Value {
        Value::Tuple(vec![Value::Tuple(self.next_state), Value::Tuple(self.outputs)])
    }
}

/// Runs a proc for one tick per batch row.
pub struct ProcNetworkRunner<'t, T: Toolchain> {
    toolchain: &'t mut T,
    row_failures: RowFailurePolicy,
    empty_rows: EmptyRowPolicy,
}

impl<'t, T: Toolchain> ProcNetworkRunner<'t, T> {
    pub fn new(
        toolchain: &'t mut T,
        row_failures: RowFailurePolicy,
        empty_rows: EmptyRowPolicy,
    ) -> Self {
        Self {
            toolchain,
            row_failures,
            empty_rows,
        }
    }

    pub fn run(
        &mut self,
        module: &T::Module,
        name: &str,
        proc: &T::Proc,
        batch: &[Vec<Value>],
        initial_state: &[Value],
    ) -> Result<Vec<Result<ProcRow>>> {
        let params = self.toolchain.config_params(module, proc)?;
        let mut network = ProcNetwork::wire(name, &params)?;
        debug!(
            proc = name,
            inputs = ?network.input_positions(),
            outputs = ?network.output_positions(),
            rows = batch.len(),
            "wired proc network"
        );
        network.preload(batch)?;
        let spawned = self
            .toolchain
            .spawn(module, proc, network.config_args(), initial_state)?;
        network.attach(spawned)?;

        let mut results = Vec::with_capacity(batch.len());
        for index in 0..batch.len() {
            let ticked = network.tick();
            let outputs = network.drain_outputs();
            match ticked {
                Ok(()) => {
                    trace!(row = index, ?outputs, "drained outputs");
                    if outputs.is_empty() && self.empty_rows == EmptyRowPolicy::Drop {
                        continue;
                    }
                    results.push(Ok(ProcRow {
                        next_state: network.state().to_vec(),
                        outputs,
                    }));
                }
                Err(error) => {
                    let error = error.at_row(index);
                    if self.row_failures == RowFailurePolicy::AbortBatch {
                        return Err(error);
                    }
                    debug!(row = index, %error, discarded = outputs.len(), "tick failed");
                    network.discard_unread_inputs(batch.len() - index - 1);
                    results.push(Err(error));
                }
            }
        }

        let leftovers = network.leftovers();
        if !leftovers.is_empty() {
            debug!(proc = name, ?leftovers, "values left on channels");
        }
        Ok(results)
    }
}
