//! The instance graph a proc batch runs in.
//!
//! Channels live in a [`ChannelArena`] owned by the network. The harness sits
//! on the far side of every [`ChannelEdge`]: it fills input channels before the
//! first tick and drains output channels after each one.

use tracing::trace;

use crate::channel::{ChannelArena, ChannelId};
use crate::error::{Error, Result};
use crate::harness::sign::convert;
use crate::toolchain::{ProcInstance, Spawned};
use crate::types::{ChannelDirection, ConcreteType, ConfigParam};
use crate::value::Value;

/// A channel between the harness and a config parameter of the proc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEdge {
    pub param: String,
    /// Position among the proc's config parameters.
    pub position: usize,
    pub channel: ChannelId,
    pub payload: ConcreteType,
    pub direction: ChannelDirection,
}

#[derive(Debug)]
pub struct ProcNode<I> {
    pub instance: I,
    /// State the next tick starts from.
    pub state: Vec<Value>,
}

#[derive(Debug)]
pub struct ProcNetwork<I> {
    proc_name: String,
    channels: ChannelArena,
    config_args: Vec<Value>,
    inputs: Vec<ChannelEdge>,
    outputs: Vec<ChannelEdge>,
    nodes: Vec<ProcNode<I>>,
}

impl<I: ProcInstance> ProcNetwork<I> {
    /// Allocates one fresh channel per config parameter, in declaration order.
    pub fn wire(proc_name: &str, params: &[ConfigParam]) -> Result<Self> {
        let mut channels = ChannelArena::new();
        let mut config_args = Vec::with_capacity(params.len());
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for (position, param) in params.iter().enumerate() {
            let Some((payload, direction)) = param.ty.as_channel() else {
                return Err(Error::config(
                    proc_name,
                    format!(
                        "config parameter `{}` has type `{}`; only channels are supported",
                        param.name, param.ty
                    ),
                ));
            };
            let channel = channels.alloc();
            config_args.push(Value::Channel(channel));
            let edge = ChannelEdge {
                param: param.name.clone(),
                position,
                channel,
                payload: payload.clone(),
                direction,
            };
            match direction {
                ChannelDirection::In => inputs.push(edge),
                ChannelDirection::Out => outputs.push(edge),
            }
        }
        Ok(Self {
            proc_name: proc_name.to_owned(),
            channels,
            config_args,
            inputs,
            outputs,
            nodes: Vec::new(),
        })
    }

    pub fn config_args(&self) -> &[Value] {
        &self.config_args
    }

    pub fn input_positions(&self) -> Vec<usize> {
        self.inputs.iter().map(|edge| edge.position).collect()
    }

    pub fn output_positions(&self) -> Vec<usize> {
        self.outputs.iter().map(|edge| edge.position).collect()
    }

    /// Enqueues every row onto the input channels, row by row, before anything runs.
    pub fn preload(&mut self, batch: &[Vec<Value>]) -> Result<()> {
        for (index, row) in batch.iter().enumerate() {
            if row.len() != self.inputs.len() {
                return Err(Error::Arity {
                    row: Some(index),
                    what: format!(
                        "proc `{}` with {} input channels",
                        self.proc_name,
                        self.inputs.len()
                    ),
                    expected: self.inputs.len(),
                    found: row.len(),
                });
            }
            for (edge, value) in self.inputs.iter().zip(row) {
                let value = convert(value, &edge.payload).map_err(|message| Error::Conversion {
                    row: Some(index),
                    message: format!("input channel `{}`: {message}", edge.param),
                })?;
                self.channels.push(edge.channel, value);
            }
        }
        Ok(())
    }

    /// Adds the spawned instances. Only a single instance is supported.
    pub fn attach(&mut self, spawned: Vec<Spawned<I>>) -> Result<()> {
        if spawned.len() != 1 {
            return Err(Error::config(
                &self.proc_name,
                format!(
                    "unsupported topology: expected exactly one proc instance, got {}",
                    spawned.len()
                ),
            ));
        }
        self.nodes.extend(spawned.into_iter().map(|spawned| ProcNode {
            instance: spawned.instance,
            state: spawned.initial_state,
        }));
        Ok(())
    }

    /// Ticks every node once. A node keeps its previous state when its tick fails.
    pub fn tick(&mut self) -> Result<()> {
        for node in &mut self.nodes {
            let next = node.instance.tick(&mut self.channels, &node.state)?;
            trace!(proc = node.instance.name(), state = ?next, "tick");
            node.state = next;
        }
        Ok(())
    }

    /// Drops queued inputs the failed row left unread, so each input channel
    /// holds exactly one value per remaining row.
    pub fn discard_unread_inputs(&mut self, remaining_rows: usize) {
        for edge in &self.inputs {
            while self.channels.depth(edge.channel) > remaining_rows {
                let dropped = self.channels.pop(edge.channel);
                trace!(channel = %edge.param, ?dropped, "discarded unread input");
            }
        }
    }

    /// State of the root instance.
    pub fn state(&self) -> &[Value] {
        self.nodes.first().map(|node| node.state.as_slice()).unwrap_or(&[])
    }

    /// Pops the front value of each non-empty output channel, in declaration order.
    pub fn drain_outputs(&mut self) -> Vec<Value> {
        let channels = &mut self.channels;
        self.outputs
            .iter()
            .filter_map(|edge| channels.pop(edge.channel))
            .collect()
    }

    /// Values left behind on every channel, by parameter name.
    pub fn leftovers(&self) -> Vec<(&str, usize)> {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .map(|edge| (edge.param.as_str(), self.channels.depth(edge.channel)))
            .filter(|(_, depth)| *depth > 0)
            .collect()
    }
}
