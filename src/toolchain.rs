//! The seam between the batch harness and the language toolchain.
//!
//! The harness only ever talks to parsing, type checking, emission and
//! interpretation through [`Toolchain`], so it can be driven by the DSLX
//! toolchain in [`crate::dslx`] or by a stand-in in tests.

use std::fmt;

use crate::channel::ChannelArena;
use crate::error::Result;
use crate::location::FileName;
use crate::types::{ConfigParam, FunctionSignature};
use crate::value::Value;

/// What a top-level name resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleMember<F, P> {
    Function(F),
    Proc(P),
    Constant,
    Import,
}

impl<F, P> ModuleMember<F, P> {
    pub fn kind(&self) -> MemberKind {
        match self {
            Self::Function(_) => MemberKind::Function,
            Self::Proc(_) => MemberKind::Proc,
            Self::Constant => MemberKind::Constant,
            Self::Import => MemberKind::Import,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Function,
    Proc,
    Constant,
    Import,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Proc => write!(f, "proc"),
            Self::Constant => write!(f, "constant"),
            Self::Import => write!(f, "import"),
        }
    }
}

/// One live proc instance and the state its first tick starts from.
#[derive(Debug)]
pub struct Spawned<I> {
    pub instance: I,
    pub initial_state: Vec<Value>,
}

pub trait ProcInstance {
    fn name(&self) -> &str;

    /// Runs one activation of `next` from `state` and returns the next state.
    /// Channel operations act on `channels`.
    fn tick(&mut self, channels: &mut ChannelArena, state: &[Value]) -> Result<Vec<Value>>;
}

pub trait Toolchain {
    type Module;
    type Function: Clone;
    type Proc: Clone;
    type Bytecode;
    type Instance: ProcInstance;

    fn parse_and_typecheck(&mut self, source: &str, file: FileName) -> Result<Self::Module>;

    fn find_member(
        &self,
        module: &Self::Module,
        name: &str,
    ) -> Option<ModuleMember<Self::Function, Self::Proc>>;

    fn signature(
        &self,
        module: &Self::Module,
        function: &Self::Function,
    ) -> Result<FunctionSignature>;

    fn emit(&mut self, module: &Self::Module, function: &Self::Function) -> Result<Self::Bytecode>;

    fn interpret(&mut self, bytecode: &Self::Bytecode, args: &[Value]) -> Result<Value>;

    fn config_params(&self, module: &Self::Module, proc: &Self::Proc) -> Result<Vec<ConfigParam>>;

    /// Instantiates `proc` bound to `config_args`. Emits the proc's `next` on the way.
    fn spawn(
        &mut self,
        module: &Self::Module,
        proc: &Self::Proc,
        config_args: &[Value],
        initial_state: &[Value],
    ) -> Result<Vec<Spawned<Self::Instance>>>;
}
