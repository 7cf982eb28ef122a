//! Stack-machine bytecode for DSLX functions and proc `next` bodies.

pub mod emitter;
pub mod interpreter;

use std::fmt;

use crate::dslx::ast::{BinaryOp, ChannelBuiltin, UnaryOp};
use crate::value::Value;

pub use emitter::{emit_function, emit_proc_next};
pub use interpreter::Interpreter;

/// Index of a local variable storage cell within one function frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(pub u32);

/// Index of a function within a [`BytecodeProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Literal(Value),
    Load(Slot),
    Store(Slot),
    Pop,
    Binop(BinaryOp),
    Unop(UnaryOp),
    /// Resizes a bits value, extending by the operand's signedness.
    Cast { width: u32, signed: bool },
    CreateTuple(usize),
    /// Replaces a tuple with its elements, element 0 on top.
    ExpandTuple,
    TupleIndex(usize),
    CreateArray(usize),
    Index,
    Jump(usize),
    JumpIfFalse(usize),
    Call(FunctionId),
    /// Channel handle is below the builtin's other operands.
    Channel { builtin: ChannelBuiltin, label: String },
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "literal {value}"),
            Self::Load(slot) => write!(f, "load ${}", slot.0),
            Self::Store(slot) => write!(f, "store ${}", slot.0),
            Self::Pop => write!(f, "pop"),
            Self::Binop(op) => write!(f, "binop {op}"),
            Self::Unop(UnaryOp::Negate) => write!(f, "unop -"),
            Self::Unop(UnaryOp::Invert) => write!(f, "unop !"),
            Self::Cast { width, signed } => {
                write!(f, "cast {}{width}", if *signed { 's' } else { 'u' })
            }
            Self::CreateTuple(n) => write!(f, "tuple {n}"),
            Self::ExpandTuple => write!(f, "expand"),
            Self::TupleIndex(i) => write!(f, "tuple_index {i}"),
            Self::CreateArray(n) => write!(f, "array {n}"),
            Self::Index => write!(f, "index"),
            Self::Jump(target) => write!(f, "jump @{target}"),
            Self::JumpIfFalse(target) => write!(f, "jump_if_false @{target}"),
            Self::Call(id) => write!(f, "call #{}", id.0),
            Self::Channel { builtin, label } => write!(f, "{builtin} {label}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BytecodeFunction {
    pub name: String,
    /// Arguments arrive in slots `0..param_count`.
    pub param_count: usize,
    pub slot_count: usize,
    pub code: Vec<Op>,
}

/// An entry function plus everything it transitively calls.
#[derive(Debug, Clone)]
pub struct BytecodeProgram {
    functions: Vec<BytecodeFunction>,
}

impl BytecodeProgram {
    pub fn new(functions: Vec<BytecodeFunction>) -> Self {
        Self { functions }
    }

    pub fn entry(&self) -> FunctionId {
        FunctionId(0)
    }

    pub fn entry_function(&self) -> Option<&BytecodeFunction> {
        self.function(self.entry())
    }

    pub fn function(&self, id: FunctionId) -> Option<&BytecodeFunction> {
        self.functions.get(id.0 as usize)
    }

    pub fn functions(&self) -> &[BytecodeFunction] {
        &self.functions
    }
}

impl fmt::Display for BytecodeProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, function) in self.functions.iter().enumerate() {
            writeln!(
                f,
                "#{index} {} (params: {}, slots: {})",
                function.name, function.param_count, function.slot_count
            )?;
            for (pc, op) in function.code.iter().enumerate() {
                writeln!(f, "  {pc:>4}  {op}")?;
            }
        }
        Ok(())
    }
}
