use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::bytecode::{BytecodeFunction, BytecodeProgram, FunctionId, Op, Slot};
use crate::dslx::ast::{
    ChannelBuiltin, ConstantDef, Expr, ExprKind, Function, ModuleMember, Param, Pattern, Statement,
};
use crate::dslx::typecheck::{literal_bits, TypecheckedModule};
use crate::error::{Error, Result};
use crate::location::Span;
use crate::types::ConcreteType;
use crate::value::Value;

/// Compiles `name` and every function it reaches into one program, `name` first.
pub fn emit_function(module: &Arc<TypecheckedModule>, name: &str) -> Result<BytecodeProgram> {
    let Some(ModuleMember::Function(function)) = module.module.members.get(name) else {
        return Err(Error::emission(name, "no such function"));
    };
    let mut builder = ProgramBuilder::new(module);
    builder.request(module, function);
    builder.finish(name)
}

/// Compiles a proc's `next`. Its parameters are the proc members followed by the state.
pub fn emit_proc_next(module: &Arc<TypecheckedModule>, name: &str) -> Result<BytecodeProgram> {
    let Some(ModuleMember::Proc(proc)) = module.module.members.get(name) else {
        return Err(Error::emission(name, "no such proc"));
    };
    let mut builder = ProgramBuilder::new(module);
    builder.functions.push(None);

    let entity = format!("{name}.next");
    let mut emitter = FunctionEmitter::new(&mut builder, Arc::clone(module), entity.clone());
    for param in &proc.config.params {
        let slot = emitter.alloc_slot();
        emitter.members.insert(param.name.clone(), slot);
    }
    let function = emitter.compile(entity.clone(), &proc.next.params, &proc.next.body)?;
    builder.functions[0] = Some(function);
    builder.finish(&entity)
}

struct ProgramBuilder {
    /// Functions of this module keep their plain names in listings.
    root: String,
    functions: Vec<Option<BytecodeFunction>>,
    ids: HashMap<(String, String), FunctionId>,
    pending: VecDeque<(Arc<TypecheckedModule>, Arc<Function>, FunctionId)>,
}

impl ProgramBuilder {
    fn new(root: &TypecheckedModule) -> Self {
        Self {
            root: root.name().to_owned(),
            functions: Vec::new(),
            ids: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    fn request(&mut self, module: &Arc<TypecheckedModule>, function: &Arc<Function>) -> FunctionId {
        let key = (module.name().to_owned(), function.name.clone());
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(None);
        self.ids.insert(key, id);
        self.pending
            .push_back((Arc::clone(module), Arc::clone(function), id));
        id
    }

    fn finish(mut self, entity: &str) -> Result<BytecodeProgram> {
        while let Some((module, function, id)) = self.pending.pop_front() {
            let name = if module.name() == self.root {
                function.name.clone()
            } else {
                format!("{}::{}", module.name(), function.name)
            };
            let emitter = FunctionEmitter::new(&mut self, module, name.clone());
            let compiled = emitter.compile(name, &function.params, &function.body)?;
            self.functions[id.0 as usize] = Some(compiled);
        }
        let functions = self
            .functions
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::emission(entity, "a called function was never compiled"))?;
        let program = BytecodeProgram::new(functions);
        debug!(entity, functions = program.functions().len(), "emitted bytecode");
        trace!("\n{program}");
        Ok(program)
    }
}

struct FunctionEmitter<'p> {
    program: &'p mut ProgramBuilder,
    module: Arc<TypecheckedModule>,
    entity: String,
    scopes: Vec<HashMap<String, Slot>>,
    members: HashMap<String, Slot>,
    slot_count: u32,
    code: Vec<Op>,
}

impl<'p> FunctionEmitter<'p> {
    fn new(
        program: &'p mut ProgramBuilder,
        module: Arc<TypecheckedModule>,
        entity: String,
    ) -> Self {
        Self {
            program,
            module,
            entity,
            scopes: Vec::new(),
            members: HashMap::new(),
            slot_count: 0,
            code: Vec::new(),
        }
    }

    fn compile(mut self, name: String, params: &[Param], body: &Expr) -> Result<BytecodeFunction> {
        let mut scope = HashMap::new();
        for param in params {
            let slot = self.alloc_slot();
            scope.insert(param.name.clone(), slot);
        }
        self.scopes.push(scope);
        self.emit(body)?;
        Ok(BytecodeFunction {
            name,
            param_count: self.members.len() + params.len(),
            slot_count: self.slot_count as usize,
            code: self.code,
        })
    }

    fn alloc_slot(&mut self) -> Slot {
        let slot = Slot(self.slot_count);
        self.slot_count += 1;
        slot
    }

    fn error(&self, span: &Span, message: impl std::fmt::Display) -> Error {
        Error::emission(self.entity.clone(), format!("{span}: {message}"))
    }

    fn ty(&self, expr: &Expr) -> Result<ConcreteType> {
        self.module
            .type_info
            .get(expr.id)
            .cloned()
            .ok_or_else(|| self.error(&expr.span, "expression has no type information"))
    }

    fn lookup_local(&self, name: &str) -> Option<Slot> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn constant(module: &TypecheckedModule, name: &str) -> Option<Arc<ConstantDef>> {
        match module.module.members.get(name) {
            Some(ModuleMember::Constant(constant)) => Some(Arc::clone(constant)),
            _ => None,
        }
    }

    /// Inlines a constant's defining expression, evaluated in its own module.
    fn emit_constant(
        &mut self,
        module: Arc<TypecheckedModule>,
        constant: &ConstantDef,
    ) -> Result<()> {
        let saved_module = std::mem::replace(&mut self.module, module);
        let saved_scopes = std::mem::take(&mut self.scopes);
        let saved_members = std::mem::take(&mut self.members);
        let result = self.emit(&constant.value);
        self.module = saved_module;
        self.scopes = saved_scopes;
        self.members = saved_members;
        result
    }

    fn emit(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Number {
                negative, magnitude, ..
            } => {
                let ConcreteType::Bits { signed, width } = self.ty(expr)? else {
                    return Err(self.error(&expr.span, "number literal is not a bits type"));
                };
                let bits = literal_bits(signed, width as u128, *negative, *magnitude)
                    .map_err(|message| self.error(&expr.span, message))?;
                self.code.push(Op::Literal(Value::Bits(bits)));
            }
            ExprKind::Bool(value) => self.code.push(Op::Literal(Value::bool(*value))),
            ExprKind::Name(name) => {
                if let Some(slot) = self.lookup_local(name) {
                    self.code.push(Op::Load(slot));
                } else if let Some(constant) = Self::constant(&self.module, name) {
                    let module = Arc::clone(&self.module);
                    self.emit_constant(module, &constant)?;
                } else if let Some(slot) = self.members.get(name) {
                    self.code.push(Op::Load(*slot));
                } else {
                    return Err(self.error(&expr.span, format!("unresolved name `{name}`")));
                }
            }
            ExprKind::Path { module, name } => {
                let imported = self.imported(module, &expr.span)?;
                let Some(constant) = Self::constant(&imported, name) else {
                    let message = format!("`{module}::{name}` is not a constant");
                    return Err(self.error(&expr.span, message));
                };
                self.emit_constant(imported, &constant)?;
            }
            ExprKind::Unary(op, operand) => {
                self.emit(operand)?;
                self.code.push(Op::Unop(*op));
            }
            ExprKind::Binary(op, lhs, rhs) => {
                self.emit(lhs)?;
                self.emit(rhs)?;
                self.code.push(Op::Binop(*op));
            }
            ExprKind::Cast(operand, _) => {
                let ConcreteType::Bits { signed, width } = self.ty(expr)? else {
                    return Err(self.error(&expr.span, "cast target is not a bits type"));
                };
                self.emit(operand)?;
                self.code.push(Op::Cast { width, signed });
            }
            ExprKind::Tuple(elements) => {
                for element in elements {
                    self.emit(element)?;
                }
                self.code.push(Op::CreateTuple(elements.len()));
            }
            ExprKind::Array(elements) => {
                for element in elements {
                    self.emit(element)?;
                }
                self.code.push(Op::CreateArray(elements.len()));
            }
            ExprKind::TupleIndex(base, index) => {
                self.emit(base)?;
                self.code.push(Op::TupleIndex(*index));
            }
            ExprKind::Index(base, index) => {
                self.emit(base)?;
                self.emit(index)?;
                self.code.push(Op::Index);
            }
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.emit(condition)?;
                let jump_if_false = self.code.len();
                self.code.push(Op::JumpIfFalse(0));
                self.emit(then)?;
                let jump_to_end = self.code.len();
                self.code.push(Op::Jump(0));
                self.code[jump_if_false] = Op::JumpIfFalse(self.code.len());
                self.emit(otherwise)?;
                self.code[jump_to_end] = Op::Jump(self.code.len());
            }
            ExprKind::Block(statements, tail) => {
                self.scopes.push(HashMap::new());
                let result = self.emit_block(statements, tail.as_deref());
                self.scopes.pop();
                result?;
            }
            ExprKind::Call { callee, args } => {
                let target = match &callee.module {
                    Some(module) => self.imported(module, &expr.span)?,
                    None => Arc::clone(&self.module),
                };
                match target.module.members.get(&callee.name) {
                    Some(ModuleMember::Function(function)) => {
                        let function = Arc::clone(function);
                        for arg in args {
                            self.emit(arg)?;
                        }
                        let id = self.program.request(&target, &function);
                        self.code.push(Op::Call(id));
                    }
                    _ => {
                        let builtin = ChannelBuiltin::from_name(&callee.name);
                        let builtin = match (&callee.module, builtin) {
                            (None, Some(builtin)) => builtin,
                            _ => {
                                let message = format!("`{callee}` is not a function");
                                return Err(self.error(&expr.span, message));
                            }
                        };
                        let label = match args.first().map(|arg| &arg.kind) {
                            Some(ExprKind::Name(name)) => name.clone(),
                            _ => {
                                let message = format!("`{builtin}` needs a channel");
                                return Err(self.error(&expr.span, message));
                            }
                        };
                        for arg in args {
                            self.emit(arg)?;
                        }
                        self.code.push(Op::Channel { builtin, label });
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_block(&mut self, statements: &[Statement], tail: Option<&Expr>) -> Result<()> {
        for statement in statements {
            match statement {
                Statement::Let { pattern, value, .. } => {
                    self.emit(value)?;
                    self.bind(pattern);
                }
                Statement::Expr(expr) => {
                    self.emit(expr)?;
                    self.code.push(Op::Pop);
                }
            }
        }
        match tail {
            Some(tail) => self.emit(tail),
            None => {
                self.code.push(Op::Literal(Value::unit()));
                Ok(())
            }
        }
    }

    fn bind(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Name(_, name) => {
                let slot = self.alloc_slot();
                self.code.push(Op::Store(slot));
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), slot);
                }
            }
            Pattern::Wildcard(_) => self.code.push(Op::Pop),
            Pattern::Tuple(_, patterns) => {
                self.code.push(Op::ExpandTuple);
                for pattern in patterns {
                    self.bind(pattern);
                }
            }
        }
    }

    fn imported(&self, module: &str, span: &Span) -> Result<Arc<TypecheckedModule>> {
        self.module
            .imports
            .get(module)
            .cloned()
            .ok_or_else(|| self.error(span, format!("module `{module}` is not imported")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dslx::import::ImportData;
    use crate::location::FileName;

    fn module(source: &str) -> Arc<TypecheckedModule> {
        let mut imports = ImportData::default();
        Arc::new(
            imports
                .parse_and_typecheck(source, FileName::BATCH, "batched")
                .unwrap(),
        )
    }

    #[test]
    fn callees_are_compiled_once_after_the_entry() {
        let module = module(
            "fn sq(x: u8) -> u8 { x * x }
             fn sum_sq(a: u8, b: u8) -> u8 { sq(a) + sq(b) }",
        );
        let program = emit_function(&module, "sum_sq").unwrap();
        let names: Vec<_> = program.functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["sum_sq", "sq"]);
        let calls = program.functions()[0]
            .code
            .iter()
            .filter(|op| matches!(op, Op::Call(FunctionId(1))))
            .count();
        assert_eq!(calls, 2);
    }

    #[test]
    fn constants_are_inlined() {
        let module = module("const K = u8:7; fn f() -> u8 { K }");
        let program = emit_function(&module, "f").unwrap();
        assert_eq!(
            program.functions()[0].code,
            vec![Op::Literal(Value::ubits(8, 7))]
        );
    }

    #[test]
    fn proc_members_take_the_first_slots() {
        let module = module(
            "proc P {
                config(i: chan<u8> in, o: chan<u8> out) { }
                next(n: u8) { send(o, recv(i) + n); n }
            }",
        );
        let program = emit_proc_next(&module, "P").unwrap();
        let next = program.entry_function().unwrap();
        assert_eq!(next.param_count, 3);
        assert_eq!(
            next.code[..4],
            [
                Op::Load(Slot(1)),
                Op::Load(Slot(0)),
                Op::Channel {
                    builtin: ChannelBuiltin::Recv,
                    label: "i".to_owned()
                },
                Op::Load(Slot(2)),
            ]
        );
    }

    #[test]
    fn unknown_entity_is_an_emission_error() {
        let module = module("fn f() {}");
        let error = emit_function(&module, "g").unwrap_err();
        assert_eq!(error.kind(), crate::error::ErrorKind::Emission);
    }
}
