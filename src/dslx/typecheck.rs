use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::dslx::ast::*;
use crate::dslx::error::CompileError;
use crate::dslx::import::ImportData;
use crate::location::Span;
use crate::types::{ConcreteType, ConfigParam, FunctionSignature, MAX_BITS_WIDTH};
use crate::value::Bits;

/// Concrete types of every expression node in one module.
#[derive(Debug, Default)]
pub struct TypeInfo {
    types: HashMap<NodeId, ConcreteType>,
}

impl TypeInfo {
    pub fn get(&self, id: NodeId) -> Option<&ConcreteType> {
        self.types.get(&id)
    }

    fn insert(&mut self, id: NodeId, ty: ConcreteType) {
        self.types.insert(id, ty);
    }
}

#[derive(Debug, Clone)]
pub struct ProcTypes {
    pub members: Vec<ConfigParam>,
    pub state: Vec<ConcreteType>,
}

impl ProcTypes {
    /// What `next` evaluates to: unit, the single element, or a tuple.
    pub fn state_type(&self) -> ConcreteType {
        state_type(&self.state)
    }
}

pub fn state_type(state: &[ConcreteType]) -> ConcreteType {
    match state {
        [single] => single.clone(),
        _ => ConcreteType::Tuple(state.to_vec()),
    }
}

#[derive(Debug)]
pub struct TypecheckedModule {
    pub module: Module,
    pub type_info: TypeInfo,
    pub functions: IndexMap<String, FunctionSignature>,
    pub procs: IndexMap<String, ProcTypes>,
    pub constants: IndexMap<String, ConcreteType>,
    pub imports: IndexMap<String, Arc<TypecheckedModule>>,
}

impl TypecheckedModule {
    pub fn name(&self) -> &str {
        &self.module.name
    }
}

/// Checks that a literal fits its declared bits type and builds its value.
pub fn literal_bits(
    signed: bool,
    width: u128,
    negative: bool,
    magnitude: u128,
) -> Result<Bits, String> {
    let width = bits_width(width)?;
    let ty = if signed { format!("s{width}") } else { format!("u{width}") };
    let limit = if width == 128 { u128::MAX } else { (1u128 << width) - 1 };
    if negative {
        if !signed {
            return Err(format!("negative literal -{magnitude} does not fit in unsigned `{ty}`"));
        }
        let min_magnitude = 1u128 << (width - 1);
        if magnitude > min_magnitude {
            return Err(format!("literal -{magnitude} does not fit in `{ty}`"));
        }
        Ok(Bits::new(width, true, magnitude.wrapping_neg()))
    } else {
        if magnitude > limit {
            return Err(format!("literal {magnitude} does not fit in `{ty}`"));
        }
        Ok(Bits::new(width, signed, magnitude))
    }
}

fn bits_width(width: u128) -> Result<u32, String> {
    match u32::try_from(width) {
        Ok(width) if (1..=MAX_BITS_WIDTH).contains(&width) => Ok(width),
        _ => Err(format!(
            "bit width {width} is out of range; widths go from 1 to {MAX_BITS_WIDTH}"
        )),
    }
}

pub fn resolve_type(
    annotation: &TypeAnnotation,
    allow_channel: bool,
) -> Result<ConcreteType, CompileError> {
    let error = |message: String| CompileError::type_error(annotation.span.clone(), message);
    Ok(match &annotation.kind {
        TypeAnnotationKind::Bits { signed, width } => ConcreteType::Bits {
            signed: *signed,
            width: bits_width(*width).map_err(error)?,
        },
        TypeAnnotationKind::Tuple(elements) => ConcreteType::Tuple(
            elements
                .iter()
                .map(|element| resolve_type(element, false))
                .collect::<Result<_, _>>()?,
        ),
        TypeAnnotationKind::Array(element, size) => {
            let size = usize::try_from(*size)
                .map_err(|_| error(format!("array size {size} is too large")))?;
            ConcreteType::Array(Box::new(resolve_type(element, false)?), size)
        }
        TypeAnnotationKind::Channel(payload, direction) => {
            if !allow_channel {
                return Err(error(
                    "channel types are only allowed on proc config parameters".to_owned(),
                ));
            }
            ConcreteType::Channel(Box::new(resolve_type(payload, false)?), *direction)
        }
    })
}

/// Literals whose type must come from context.
fn is_bare(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Number {
            annotation: None, ..
        } => true,
        ExprKind::Unary(_, operand) => is_bare(operand),
        ExprKind::Binary(op, lhs, rhs) if !op.is_comparison() && !op.is_logical() => {
            is_bare(lhs) && (op.is_shift() || is_bare(rhs))
        }
        _ => false,
    }
}

fn mismatch(span: &Span, expected: &ConcreteType, found: &ConcreteType) -> CompileError {
    CompileError::type_error(
        span.clone(),
        format!("expected type `{expected}`, found `{found}`"),
    )
}

pub fn typecheck_module(
    module: Module,
    import_data: &mut ImportData,
) -> Result<TypecheckedModule, CompileError> {
    let mut imports = IndexMap::new();
    let mut functions = IndexMap::new();
    let mut procs = IndexMap::new();

    for member in module.members.values() {
        match member {
            ModuleMember::Import(import) => {
                let imported = import_data.import(&import.name, &import.span)?;
                imports.insert(import.name.clone(), imported);
            }
            ModuleMember::Function(function) => {
                let params = function
                    .params
                    .iter()
                    .map(|param| resolve_type(&param.annotation, false))
                    .collect::<Result<_, _>>()?;
                let ret = match &function.ret {
                    Some(ret) => resolve_type(ret, false)?,
                    None => ConcreteType::unit(),
                };
                functions.insert(function.name.clone(), FunctionSignature { params, ret });
            }
            ModuleMember::Proc(proc) => {
                let members = proc
                    .config
                    .params
                    .iter()
                    .map(|param| {
                        Ok(ConfigParam {
                            name: param.name.clone(),
                            ty: resolve_type(&param.annotation, true)?,
                        })
                    })
                    .collect::<Result<_, CompileError>>()?;
                let state = proc
                    .next
                    .params
                    .iter()
                    .map(|param| resolve_type(&param.annotation, false))
                    .collect::<Result<_, _>>()?;
                procs.insert(proc.name.clone(), ProcTypes { members, state });
            }
            ModuleMember::Constant(_) => {}
        }
    }

    let mut checker = Checker {
        module: &module,
        imports: &imports,
        functions: &functions,
        procs: &procs,
        constants: IndexMap::new(),
        members: None,
        scopes: Vec::new(),
        type_info: TypeInfo::default(),
    };

    for member in module.members.values() {
        match member {
            ModuleMember::Constant(constant) => {
                let ty = match &constant.annotation {
                    Some(annotation) => {
                        let ty = resolve_type(annotation, false)?;
                        checker.check(&constant.value, &ty)?;
                        ty
                    }
                    None => checker.infer(&constant.value)?,
                };
                checker.constants.insert(constant.name.clone(), ty);
            }
            ModuleMember::Function(function) => {
                let signature = &functions[&function.name];
                checker.with_params(&function.params, &signature.params, |checker| {
                    checker.check(&function.body, &signature.ret)
                })?;
            }
            ModuleMember::Proc(proc) => {
                let types = &procs[&proc.name];
                let member_types: Vec<_> = types.members.iter().map(|m| m.ty.clone()).collect();
                checker.with_params(&proc.config.params, &member_types, |checker| {
                    checker.check(&proc.config.body, &ConcreteType::unit())
                })?;
                checker.members = Some(types.members.as_slice());
                let result = checker.with_params(&proc.next.params, &types.state, |checker| {
                    checker.check(&proc.next.body, &types.state_type())
                });
                checker.members = None;
                result?;
            }
            ModuleMember::Import(_) => {}
        }
    }

    let Checker {
        constants, type_info, ..
    } = checker;
    Ok(TypecheckedModule {
        module,
        type_info,
        functions,
        procs,
        constants,
        imports,
    })
}

struct Checker<'a> {
    module: &'a Module,
    imports: &'a IndexMap<String, Arc<TypecheckedModule>>,
    functions: &'a IndexMap<String, FunctionSignature>,
    procs: &'a IndexMap<String, ProcTypes>,
    /// Only constants defined so far are visible.
    constants: IndexMap<String, ConcreteType>,
    /// The enclosing proc's members, while checking `next`.
    members: Option<&'a [ConfigParam]>,
    scopes: Vec<HashMap<String, ConcreteType>>,
    type_info: TypeInfo,
}

impl<'a> Checker<'a> {
    fn with_params<T>(
        &mut self,
        params: &[Param],
        types: &[ConcreteType],
        body: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        let mut scope = HashMap::new();
        for (param, ty) in params.iter().zip(types) {
            if scope.insert(param.name.clone(), ty.clone()).is_some() {
                return Err(CompileError::type_error(
                    param.span.clone(),
                    format!("parameter `{}` is declared twice", param.name),
                ));
            }
        }
        self.scopes.push(scope);
        let result = body(self);
        self.scopes.pop();
        result
    }

    fn record(&mut self, expr: &Expr, ty: &ConcreteType) {
        self.type_info.insert(expr.id, ty.clone());
    }

    fn check(&mut self, expr: &Expr, expected: &ConcreteType) -> Result<(), CompileError> {
        match (&expr.kind, expected) {
            (
                ExprKind::Number {
                    annotation: None,
                    negative,
                    magnitude,
                },
                _,
            ) => {
                let ConcreteType::Bits { signed, width } = expected else {
                    return Err(CompileError::type_error(
                        expr.span.clone(),
                        format!("a number cannot have type `{expected}`"),
                    ));
                };
                literal_bits(*signed, *width as u128, *negative, *magnitude)
                    .map_err(|message| CompileError::type_error(expr.span.clone(), message))?;
            }
            (ExprKind::Unary(_, operand), ConcreteType::Bits { .. }) => {
                self.check(operand, expected)?;
            }
            (ExprKind::Binary(op, lhs, rhs), ConcreteType::Bits { .. })
                if !op.is_comparison() && !op.is_logical() =>
            {
                self.check(lhs, expected)?;
                if op.is_shift() {
                    self.check_amount(rhs)?;
                } else {
                    self.check(rhs, expected)?;
                }
            }
            (ExprKind::Tuple(elements), ConcreteType::Tuple(types))
                if elements.len() == types.len() =>
            {
                for (element, ty) in elements.iter().zip(types) {
                    self.check(element, ty)?;
                }
            }
            (ExprKind::Array(elements), ConcreteType::Array(element_type, size))
                if elements.len() == *size =>
            {
                for element in elements {
                    self.check(element, element_type)?;
                }
            }
            (
                ExprKind::If {
                    condition,
                    then,
                    otherwise,
                },
                _,
            ) => {
                self.check(condition, &ConcreteType::bool())?;
                self.check(then, expected)?;
                self.check(otherwise, expected)?;
            }
            (ExprKind::Block(statements, tail), _) => {
                self.scopes.push(HashMap::new());
                let result = self.check_block(statements, tail.as_deref(), expr, Some(expected));
                self.scopes.pop();
                result?;
            }
            _ => {
                let found = self.infer(expr)?;
                if &found != expected {
                    return Err(mismatch(&expr.span, expected, &found));
                }
                return Ok(());
            }
        }
        self.record(expr, expected);
        Ok(())
    }

    fn check_block(
        &mut self,
        statements: &[Statement],
        tail: Option<&Expr>,
        block: &Expr,
        expected: Option<&ConcreteType>,
    ) -> Result<ConcreteType, CompileError> {
        for statement in statements {
            match statement {
                Statement::Let {
                    pattern,
                    annotation,
                    value,
                    ..
                } => {
                    let ty = match annotation {
                        Some(annotation) => {
                            let ty = resolve_type(annotation, false)?;
                            self.check(value, &ty)?;
                            ty
                        }
                        None => self.infer(value)?,
                    };
                    self.bind(pattern, &ty)?;
                }
                Statement::Expr(expr) => {
                    self.infer(expr)?;
                }
            }
        }
        match (tail, expected) {
            (Some(tail), Some(expected)) => {
                self.check(tail, expected)?;
                Ok(expected.clone())
            }
            (Some(tail), None) => self.infer(tail),
            (None, expected) => {
                let unit = ConcreteType::unit();
                match expected {
                    Some(expected) if *expected != unit => Err(CompileError::type_error(
                        block.span.clone(),
                        format!("block has no trailing expression, but `{expected}` is expected"),
                    )),
                    _ => Ok(unit),
                }
            }
        }
    }

    fn bind(&mut self, pattern: &Pattern, ty: &ConcreteType) -> Result<(), CompileError> {
        match pattern {
            Pattern::Name(_, name) => {
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), ty.clone());
                }
                Ok(())
            }
            Pattern::Wildcard(_) => Ok(()),
            Pattern::Tuple(span, patterns) => match ty {
                ConcreteType::Tuple(types) if types.len() == patterns.len() => {
                    for (pattern, ty) in patterns.iter().zip(types) {
                        self.bind(pattern, ty)?;
                    }
                    Ok(())
                }
                _ => Err(CompileError::type_error(
                    span.clone(),
                    format!(
                        "a tuple pattern with {} elements cannot match `{ty}`",
                        patterns.len()
                    ),
                )),
            },
        }
    }

    /// Shift amounts and indices: any unsigned bits type, bare numbers default to `u32`.
    fn check_amount(&mut self, expr: &Expr) -> Result<(), CompileError> {
        if is_bare(expr) {
            return self.check(expr, &ConcreteType::unsigned(32));
        }
        let ty = self.infer(expr)?;
        if !ty.is_unsigned_bits() {
            return Err(CompileError::type_error(
                expr.span.clone(),
                format!("expected an unsigned bits type, found `{ty}`"),
            ));
        }
        Ok(())
    }

    fn require_bits(&self, expr: &Expr, ty: &ConcreteType) -> Result<(), CompileError> {
        if ty.is_bits() {
            Ok(())
        } else {
            Err(CompileError::type_error(
                expr.span.clone(),
                format!("expected a bits type, found `{ty}`"),
            ))
        }
    }

    /// Infers one type shared by all `exprs`, taken from the first one that is
    /// not a bare literal.
    fn infer_common(&mut self, exprs: &[&Expr]) -> Result<ConcreteType, CompileError> {
        let anchor = exprs.iter().position(|expr| !is_bare(expr)).unwrap_or(0);
        let ty = self.infer(exprs[anchor])?;
        for (i, expr) in exprs.iter().enumerate() {
            if i != anchor {
                self.check(expr, &ty)?;
            }
        }
        Ok(ty)
    }

    fn infer(&mut self, expr: &Expr) -> Result<ConcreteType, CompileError> {
        let span = &expr.span;
        let ty = match &expr.kind {
            ExprKind::Number {
                annotation: Some(annotation),
                negative,
                magnitude,
            } => {
                let ty = resolve_type(annotation, false)?;
                let ConcreteType::Bits { signed, width } = ty else {
                    return Err(CompileError::type_error(
                        annotation.span.clone(),
                        format!("a number cannot have type `{ty}`"),
                    ));
                };
                literal_bits(signed, width as u128, *negative, *magnitude)
                    .map_err(|message| CompileError::type_error(span.clone(), message))?;
                ty
            }
            ExprKind::Number {
                annotation: None, ..
            } => {
                return Err(CompileError::type_error(
                    span.clone(),
                    "cannot infer the type of this number; give it a type like `u32:5`",
                ))
            }
            ExprKind::Bool(_) => ConcreteType::bool(),
            ExprKind::Name(name) => self.lookup_name(name, span)?,
            ExprKind::Path { module, name } => {
                let imported = self.imported(module, span)?;
                match imported.constants.get(name) {
                    Some(ty) => ty.clone(),
                    None => {
                        return Err(CompileError::type_error(
                            span.clone(),
                            format!("module `{module}` has no constant named `{name}`"),
                        ))
                    }
                }
            }
            ExprKind::Unary(_, operand) => {
                let ty = self.infer(operand)?;
                self.require_bits(operand, &ty)?;
                ty
            }
            ExprKind::Binary(op, lhs, rhs) => self.infer_binary(*op, lhs, rhs)?,
            ExprKind::Cast(operand, annotation) => {
                let target = resolve_type(annotation, false)?;
                self.require_bits(expr, &target)?;
                if is_bare(operand) {
                    self.check(operand, &target)?;
                } else {
                    let ty = self.infer(operand)?;
                    self.require_bits(operand, &ty)?;
                }
                target
            }
            ExprKind::Tuple(elements) => ConcreteType::Tuple(
                elements
                    .iter()
                    .map(|element| self.infer(element))
                    .collect::<Result<_, _>>()?,
            ),
            ExprKind::Array(elements) => {
                if elements.is_empty() {
                    return Err(CompileError::type_error(
                        span.clone(),
                        "cannot infer the element type of an empty array",
                    ));
                }
                let refs: Vec<&Expr> = elements.iter().collect();
                let element = self.infer_common(&refs)?;
                ConcreteType::Array(Box::new(element), elements.len())
            }
            ExprKind::TupleIndex(base, index) => {
                let ty = self.infer(base)?;
                match ty {
                    ConcreteType::Tuple(mut elements) if *index < elements.len() => {
                        elements.swap_remove(*index)
                    }
                    ConcreteType::Tuple(elements) => {
                        return Err(CompileError::type_error(
                            span.clone(),
                            format!(
                                "tuple index {index} is out of range for a tuple of {} elements",
                                elements.len()
                            ),
                        ))
                    }
                    other => {
                        return Err(CompileError::type_error(
                            base.span.clone(),
                            format!("`.{index}` needs a tuple, found `{other}`"),
                        ))
                    }
                }
            }
            ExprKind::Index(base, index) => {
                let ty = self.infer(base)?;
                let ConcreteType::Array(element, _) = ty else {
                    return Err(CompileError::type_error(
                        base.span.clone(),
                        format!("indexing needs an array, found `{ty}`"),
                    ));
                };
                self.check_amount(index)?;
                *element
            }
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.check(condition, &ConcreteType::bool())?;
                self.infer_common(&[then.as_ref(), otherwise.as_ref()])?
            }
            ExprKind::Block(statements, tail) => {
                self.scopes.push(HashMap::new());
                let result = self.check_block(statements, tail.as_deref(), expr, None);
                self.scopes.pop();
                result?
            }
            ExprKind::Call { callee, args } => self.infer_call(expr, callee, args)?,
        };
        self.record(expr, &ty);
        Ok(ty)
    }

    fn infer_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<ConcreteType, CompileError> {
        if op.is_logical() {
            self.check(lhs, &ConcreteType::bool())?;
            self.check(rhs, &ConcreteType::bool())?;
            return Ok(ConcreteType::bool());
        }
        if op.is_shift() {
            let ty = self.infer(lhs)?;
            self.require_bits(lhs, &ty)?;
            self.check_amount(rhs)?;
            return Ok(ty);
        }
        let ty = self.infer_common(&[lhs, rhs])?;
        if op.is_comparison() {
            if !ty.is_bits() && !matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
                return Err(CompileError::type_error(
                    lhs.span.clone(),
                    format!("`{op}` needs bits operands, found `{ty}`"),
                ));
            }
            return Ok(ConcreteType::bool());
        }
        self.require_bits(lhs, &ty)?;
        Ok(ty)
    }

    fn lookup_name(&self, name: &str, span: &Span) -> Result<ConcreteType, CompileError> {
        let ty = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.constants.get(name))
            .or_else(|| {
                self.members
                    .and_then(|members| members.iter().find(|m| m.name == name))
                    .map(|member| &member.ty)
            });
        match ty {
            Some(ty) if ty.contains_channel() => Err(CompileError::type_error(
                span.clone(),
                format!(
                    "channel `{name}` can only be used as the first argument of a channel operation"
                ),
            )),
            Some(ty) => Ok(ty.clone()),
            None => match self.module.members.get(name) {
                Some(ModuleMember::Constant(_)) => Err(CompileError::type_error(
                    span.clone(),
                    format!("constant `{name}` is used before its definition"),
                )),
                Some(_) => Err(CompileError::type_error(
                    span.clone(),
                    format!("`{name}` is not a value"),
                )),
                None => Err(CompileError::type_error(
                    span.clone(),
                    format!("undefined name `{name}`"),
                )),
            },
        }
    }

    fn imported(
        &self,
        module: &str,
        span: &Span,
    ) -> Result<&'a Arc<TypecheckedModule>, CompileError> {
        self.imports.get(module).ok_or_else(|| {
            CompileError::type_error(
                span.clone(),
                format!("module `{module}` is not imported"),
            )
        })
    }

    fn infer_call(
        &mut self,
        call: &Expr,
        callee: &Callee,
        args: &[Expr],
    ) -> Result<ConcreteType, CompileError> {
        let functions: &'a IndexMap<String, FunctionSignature> = self.functions;
        let signature = match &callee.module {
            Some(module) => {
                let imported = self.imported(module, &call.span)?;
                imported.functions.get(&callee.name).ok_or_else(|| {
                    CompileError::type_error(
                        call.span.clone(),
                        format!("module `{module}` has no function named `{}`", callee.name),
                    )
                })?
            }
            None => match functions.get(&callee.name) {
                Some(signature) => signature,
                None => {
                    if let Some(builtin) = ChannelBuiltin::from_name(&callee.name) {
                        return self.infer_channel_builtin(call, builtin, args);
                    }
                    let message = if self.procs.contains_key(&callee.name) {
                        format!("`{}` is a proc and cannot be called", callee.name)
                    } else {
                        format!("undefined function `{}`", callee.name)
                    };
                    return Err(CompileError::type_error(call.span.clone(), message));
                }
            },
        };
        if signature.params.len() != args.len() {
            return Err(CompileError::type_error(
                call.span.clone(),
                format!(
                    "`{callee}` takes {} arguments, but {} were given",
                    signature.params.len(),
                    args.len()
                ),
            ));
        }
        for (arg, param) in args.iter().zip(&signature.params) {
            self.check(arg, param)?;
        }
        Ok(signature.ret.clone())
    }

    fn infer_channel_builtin(
        &mut self,
        call: &Expr,
        builtin: ChannelBuiltin,
        args: &[Expr],
    ) -> Result<ConcreteType, CompileError> {
        let Some(members) = self.members else {
            return Err(CompileError::type_error(
                call.span.clone(),
                format!("`{builtin}` can only be used inside a proc's `next`"),
            ));
        };
        if args.len() != builtin.arity() {
            return Err(CompileError::type_error(
                call.span.clone(),
                format!(
                    "`{builtin}` takes {} arguments, but {} were given",
                    builtin.arity(),
                    args.len()
                ),
            ));
        }
        let channel = &args[0];
        let member = match &channel.kind {
            ExprKind::Name(name) if !self.scopes.iter().any(|scope| scope.contains_key(name)) => {
                members.iter().find(|member| &member.name == name)
            }
            _ => None,
        };
        let Some((payload, direction)) = member.and_then(|member| member.ty.as_channel()) else {
            return Err(CompileError::type_error(
                channel.span.clone(),
                format!("the first argument of `{builtin}` must name a channel of the proc"),
            ));
        };
        if direction != builtin.direction() {
            return Err(CompileError::type_error(
                channel.span.clone(),
                format!(
                    "`{builtin}` needs a channel declared `{}`, this one is `{direction}`",
                    builtin.direction()
                ),
            ));
        }
        let payload = payload.clone();
        if let Some(member) = member {
            self.record(channel, &member.ty);
        }
        Ok(match builtin {
            ChannelBuiltin::Recv => payload,
            ChannelBuiltin::RecvIf => {
                self.check(&args[1], &ConcreteType::bool())?;
                self.check(&args[2], &payload)?;
                payload
            }
            ChannelBuiltin::RecvNonBlocking => {
                self.check(&args[1], &payload)?;
                ConcreteType::Tuple(vec![payload, ConcreteType::bool()])
            }
            ChannelBuiltin::Send => {
                self.check(&args[1], &payload)?;
                ConcreteType::unit()
            }
            ChannelBuiltin::SendIf => {
                self.check(&args[1], &ConcreteType::bool())?;
                self.check(&args[2], &payload)?;
                ConcreteType::unit()
            }
        })
    }
}
