use std::cmp::Ordering;

use tracing::trace;

use crate::bytecode::{BytecodeProgram, FunctionId, Op};
use crate::channel::{ChannelArena, ChannelId};
use crate::dslx::ast::{BinaryOp, ChannelBuiltin, UnaryOp};
use crate::error::{Error, Result};
use crate::value::{Bits, Value};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Runs a [`BytecodeProgram`]. Channel operations need an arena attached.
pub struct Interpreter<'a> {
    program: &'a BytecodeProgram,
    channels: Option<&'a mut ChannelArena>,
    max_call_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a BytecodeProgram) -> Self {
        Self {
            program,
            channels: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_channels(mut self, channels: &'a mut ChannelArena) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Calls the program's entry function.
    pub fn run(&mut self, args: Vec<Value>) -> Result<Value> {
        self.call(self.program.entry(), args, 1)
    }

    fn call(&mut self, id: FunctionId, args: Vec<Value>, depth: usize) -> Result<Value> {
        let program = self.program;
        let function = program
            .function(id)
            .ok_or_else(|| Error::runtime(format!("call to missing function #{}", id.0)))?;
        let name = function.name.as_str();
        let fault = |message: String| Error::runtime(format!("in `{name}`: {message}"));

        if depth > self.max_call_depth {
            return Err(fault(format!(
                "call depth exceeded the limit of {}",
                self.max_call_depth
            )));
        }
        if args.len() != function.param_count {
            return Err(fault(format!(
                "expected {} arguments, got {}",
                function.param_count,
                args.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = vec![None; function.slot_count.max(args.len())];
        for (slot, arg) in slots.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;

        macro_rules! pop {
            () => {
                stack
                    .pop()
                    .ok_or_else(|| fault("stack underflow".to_owned()))?
            };
        }
        macro_rules! pop_bits {
            () => {{
                let value = pop!();
                value
                    .as_bits()
                    .ok_or_else(|| fault(format!("expected bits, found a {}", value.kind())))?
            }};
        }

        while let Some(op) = function.code.get(pc) {
            pc += 1;
            match op {
                Op::Literal(value) => stack.push(value.clone()),
                Op::Load(slot) => {
                    let value = slots
                        .get(slot.0 as usize)
                        .and_then(Option::as_ref)
                        .ok_or_else(|| {
                            fault(format!("slot ${} read before it was written", slot.0))
                        })?;
                    stack.push(value.clone());
                }
                Op::Store(slot) => {
                    let value = pop!();
                    let cell = slots
                        .get_mut(slot.0 as usize)
                        .ok_or_else(|| fault(format!("slot ${} is out of range", slot.0)))?;
                    *cell = Some(value);
                }
                Op::Pop => {
                    pop!();
                }
                Op::Binop(op) => {
                    let rhs = pop!();
                    let lhs = pop!();
                    stack.push(binop(*op, lhs, rhs).map_err(fault)?);
                }
                Op::Unop(op) => {
                    let operand = pop_bits!();
                    let result = match op {
                        UnaryOp::Negate => operand.wrapping_neg(),
                        UnaryOp::Invert => operand.not(),
                    };
                    stack.push(Value::Bits(result));
                }
                Op::Cast { width, signed } => {
                    let operand = pop_bits!();
                    stack.push(Value::Bits(operand.resize(*width, *signed)));
                }
                Op::CreateTuple(count) => {
                    let elements = split_top(&mut stack, *count).map_err(fault)?;
                    stack.push(Value::Tuple(elements));
                }
                Op::CreateArray(count) => {
                    let elements = split_top(&mut stack, *count).map_err(fault)?;
                    stack.push(Value::Array(elements));
                }
                Op::ExpandTuple => match pop!() {
                    Value::Tuple(elements) => stack.extend(elements.into_iter().rev()),
                    other => return Err(fault(format!("cannot destructure a {}", other.kind()))),
                },
                Op::TupleIndex(index) => match pop!() {
                    Value::Tuple(elements) => {
                        let count = elements.len();
                        let element = elements.into_iter().nth(*index).ok_or_else(|| {
                            fault(format!(
                                "tuple index {index} is out of range for {count} elements"
                            ))
                        })?;
                        stack.push(element);
                    }
                    other => return Err(fault(format!("cannot index into a {}", other.kind()))),
                },
                Op::Index => {
                    let index = pop_bits!();
                    match pop!() {
                        Value::Array(elements) => {
                            let count = elements.len();
                            let element = usize::try_from(index.raw())
                                .ok()
                                .and_then(|i| elements.into_iter().nth(i))
                                .ok_or_else(|| {
                                    fault(format!(
                                        "index {} is out of bounds for {count} elements",
                                        index.raw()
                                    ))
                                })?;
                            stack.push(element);
                        }
                        other => return Err(fault(format!("cannot index into a {}", other.kind()))),
                    }
                }
                Op::Jump(target) => pc = *target,
                Op::JumpIfFalse(target) => {
                    if !pop_bits!().is_true() {
                        pc = *target;
                    }
                }
                Op::Call(callee) => {
                    let param_count = program
                        .function(*callee)
                        .map(|f| f.param_count)
                        .ok_or_else(|| fault(format!("call to missing function #{}", callee.0)))?;
                    let args = split_top(&mut stack, param_count).map_err(fault)?;
                    let result = self.call(*callee, args, depth + 1)?;
                    stack.push(result);
                }
                Op::Channel { builtin, label } => {
                    let result = self.channel_op(*builtin, label, &mut stack).map_err(&fault)?;
                    stack.push(result);
                }
            }
        }

        stack
            .pop()
            .ok_or_else(|| fault("function produced no value".to_owned()))
    }

    fn channel_op(
        &mut self,
        builtin: ChannelBuiltin,
        label: &str,
        stack: &mut Vec<Value>,
    ) -> std::result::Result<Value, String> {
        let mut operands = split_top(stack, builtin.arity())?.into_iter();
        let channel = match operands.next() {
            Some(Value::Channel(id)) => id,
            _ => return Err(format!("`{label}` is not a channel")),
        };
        let channels = self
            .channels
            .as_deref_mut()
            .ok_or_else(|| {
                format!("`{builtin}` on `{label}` needs channels, but none are attached")
            })?;
        if !channels.contains(channel) {
            return Err(format!("`{label}` refers to unknown {channel}"));
        }
        let result = match builtin {
            ChannelBuiltin::Recv => receive(channels, channel, label)?,
            ChannelBuiltin::RecvIf => {
                let condition = condition_operand(builtin, &mut operands)?;
                let default = operands.next().unwrap_or_else(Value::unit);
                if condition.is_true() {
                    receive(channels, channel, label)?
                } else {
                    default
                }
            }
            ChannelBuiltin::RecvNonBlocking => {
                let default = operands.next().unwrap_or_else(Value::unit);
                match channels.pop(channel) {
                    Some(value) => Value::Tuple(vec![value, Value::bool(true)]),
                    None => Value::Tuple(vec![default, Value::bool(false)]),
                }
            }
            ChannelBuiltin::Send => {
                let value = operands.next().unwrap_or_else(Value::unit);
                trace!(channel = label, %value, "send");
                channels.push(channel, value);
                Value::unit()
            }
            ChannelBuiltin::SendIf => {
                let condition = condition_operand(builtin, &mut operands)?;
                let value = operands.next().unwrap_or_else(Value::unit);
                if condition.is_true() {
                    trace!(channel = label, %value, "send");
                    channels.push(channel, value);
                }
                Value::unit()
            }
        };
        Ok(result)
    }
}

fn condition_operand(
    builtin: ChannelBuiltin,
    operands: &mut impl Iterator<Item = Value>,
) -> std::result::Result<Bits, String> {
    match operands.next() {
        Some(Value::Bits(bits)) => Ok(bits),
        _ => Err(format!("`{builtin}` expects a bits condition")),
    }
}

fn receive(
    channels: &mut ChannelArena,
    channel: ChannelId,
    label: &str,
) -> std::result::Result<Value, String> {
    let value = channels
        .pop(channel)
        .ok_or_else(|| format!("`recv` on empty channel `{label}`"))?;
    trace!(channel = label, %value, "recv");
    Ok(value)
}

fn split_top(stack: &mut Vec<Value>, count: usize) -> std::result::Result<Vec<Value>, String> {
    if stack.len() < count {
        return Err("stack underflow".to_owned());
    }
    Ok(stack.split_off(stack.len() - count))
}

fn binop(op: BinaryOp, lhs: Value, rhs: Value) -> std::result::Result<Value, String> {
    let (Some(a), Some(b)) = (lhs.as_bits(), rhs.as_bits()) else {
        return match op {
            BinaryOp::Eq => Ok(Value::bool(lhs == rhs)),
            BinaryOp::Ne => Ok(Value::bool(lhs != rhs)),
            _ => Err(format!("`{op}` cannot combine a {} and a {}", lhs.kind(), rhs.kind())),
        };
    };
    let compare = |expected: &[Ordering]| Value::bool(expected.contains(&a.compare(&b)));
    let bits = |result: Bits| Value::Bits(result);
    Ok(match op {
        BinaryOp::Add => bits(a.wrapping_add(b)),
        BinaryOp::Sub => bits(a.wrapping_sub(b)),
        BinaryOp::Mul => bits(a.wrapping_mul(b)),
        BinaryOp::Div => bits(a.checked_div(b).ok_or("division by zero")?),
        BinaryOp::Rem => bits(a.checked_rem(b).ok_or("division by zero")?),
        BinaryOp::Shl => bits(a.shl(b)),
        BinaryOp::Shr => bits(a.shr(b)),
        BinaryOp::BitAnd | BinaryOp::And => bits(a.and(b)),
        BinaryOp::BitOr | BinaryOp::Or => bits(a.or(b)),
        BinaryOp::BitXor => bits(a.xor(b)),
        BinaryOp::Eq => compare(&[Ordering::Equal]),
        BinaryOp::Ne => compare(&[Ordering::Less, Ordering::Greater]),
        BinaryOp::Lt => compare(&[Ordering::Less]),
        BinaryOp::Le => compare(&[Ordering::Less, Ordering::Equal]),
        BinaryOp::Gt => compare(&[Ordering::Greater]),
        BinaryOp::Ge => compare(&[Ordering::Greater, Ordering::Equal]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::bytecode::{emit_function, emit_proc_next};
    use crate::dslx::import::ImportData;
    use crate::error::ErrorKind;
    use crate::location::FileName;

    fn compile(source: &str, name: &str) -> BytecodeProgram {
        let module = Arc::new(
            ImportData::default()
                .parse_and_typecheck(source, FileName::BATCH, "batched")
                .unwrap(),
        );
        emit_function(&module, name).unwrap()
    }

    fn run(source: &str, name: &str, args: Vec<Value>) -> Result<Value> {
        Interpreter::new(&compile(source, name)).run(args)
    }

    #[test]
    fn arithmetic_and_control_flow() {
        let source = "fn pick(a: u8, b: u8) -> u8 {
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            hi - lo
        }";
        assert_eq!(
            run(source, "pick", vec![Value::ubits(8, 3), Value::ubits(8, 10)]).unwrap(),
            Value::ubits(8, 7)
        );
        assert_eq!(
            run(source, "pick", vec![Value::ubits(8, 10), Value::ubits(8, 3)]).unwrap(),
            Value::ubits(8, 7)
        );
    }

    #[test]
    fn signed_operations_and_casts() {
        let source = "fn f(x: s8) -> s16 { (x >> 1) as s16 * s16:3 }";
        assert_eq!(
            run(source, "f", vec![Value::sbits(8, -8)]).unwrap(),
            Value::sbits(16, -12)
        );
    }

    #[test]
    fn recursion_and_depth_limit() {
        let source = "fn count(n: u32) -> u32 {
            if n == 0 { u32:0 } else { count(n - 1) + 1 }
        }";
        assert_eq!(
            run(source, "count", vec![Value::ubits(32, 10)]).unwrap(),
            Value::ubits(32, 10)
        );
        let program = compile(source, "count");
        let error = Interpreter::new(&program)
            .with_max_call_depth(16)
            .run(vec![Value::ubits(32, 100)])
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Runtime);
        assert!(error.to_string().contains("call depth"), "{error}");
    }

    #[test]
    fn runtime_faults() {
        let error = run(
            "fn f(a: u8, b: u8) -> u8 { a / b }",
            "f",
            vec![Value::ubits(8, 1), Value::ubits(8, 0)],
        )
        .unwrap_err();
        assert_eq!(error.to_string(), "in `f`: division by zero");

        let error = run(
            "fn f(a: u8[2], i: u4) -> u8 { a[i] }",
            "f",
            vec![
                Value::Array(vec![Value::ubits(8, 1), Value::ubits(8, 2)]),
                Value::ubits(4, 5),
            ],
        )
        .unwrap_err();
        assert!(error.to_string().contains("out of bounds"), "{error}");
    }

    #[test]
    fn tuple_and_array_equality() {
        let source = "fn f(a: (u8, u8), b: (u8, u8)) -> bool { a == b }";
        let pair = |x, y| Value::Tuple(vec![Value::ubits(8, x), Value::ubits(8, y)]);
        assert_eq!(run(source, "f", vec![pair(1, 2), pair(1, 2)]).unwrap(), Value::bool(true));
        assert_eq!(run(source, "f", vec![pair(1, 2), pair(2, 1)]).unwrap(), Value::bool(false));
    }

    #[test]
    fn channel_operations() {
        let module = Arc::new(
            ImportData::default()
                .parse_and_typecheck(
                    "proc P {
                        config(i: chan<u8> in, o: chan<u8> out) { }
                        next(seen: u8) {
                            let (x, valid) = recv_non_blocking(i, u8:0);
                            send_if(o, valid, x + seen);
                            if valid { seen + 1 } else { seen }
                        }
                    }",
                    FileName::BATCH,
                    "batched",
                )
                .unwrap(),
        );
        let program = emit_proc_next(&module, "P").unwrap();
        let mut channels = ChannelArena::new();
        let input = channels.alloc();
        let output = channels.alloc();
        channels.push(input, Value::ubits(8, 40));

        let args = |seen| {
            vec![
                Value::Channel(input),
                Value::Channel(output),
                Value::ubits(8, seen),
            ]
        };
        let state = Interpreter::new(&program)
            .with_channels(&mut channels)
            .run(args(2))
            .unwrap();
        assert_eq!(state, Value::ubits(8, 3));
        assert_eq!(channels.pop(output), Some(Value::ubits(8, 42)));

        let state = Interpreter::new(&program)
            .with_channels(&mut channels)
            .run(args(3))
            .unwrap();
        assert_eq!(state, Value::ubits(8, 3));
        assert_eq!(channels.depth(output), 0);
    }

    #[test]
    fn recv_on_empty_channel_fails() {
        let module = Arc::new(
            ImportData::default()
                .parse_and_typecheck(
                    "proc P { config(i: chan<u8> in) { } next() { let _ = recv(i); () } }",
                    FileName::BATCH,
                    "batched",
                )
                .unwrap(),
        );
        let program = emit_proc_next(&module, "P").unwrap();
        let mut channels = ChannelArena::new();
        let input = channels.alloc();
        let error = Interpreter::new(&program)
            .with_channels(&mut channels)
            .run(vec![Value::Channel(input)])
            .unwrap_err();
        assert!(error.to_string().contains("empty channel `i`"), "{error}");
    }
}
