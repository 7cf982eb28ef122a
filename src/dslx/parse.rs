//! Hand-written recursive descent parser over logos tokens.
//!
//! Expressions use precedence climbing; everything else is keyword dispatched.

use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::dslx::ast::*;
use crate::dslx::error::CompileError;
use crate::dslx::lexer::{number_value, tokenize, SpannedToken, Token};
use crate::dslx::typecheck::literal_bits;
use crate::location::{FileName, LineIndex, Span, Spanning};
use crate::types::ChannelDirection;
use crate::value::Value;

pub fn parse_module(source: &str, file: FileName, name: &str) -> Result<Module, CompileError> {
    let mut parser = Parser::new(source, file)?;
    let mut members: IndexMap<String, ModuleMember> = IndexMap::new();
    while !parser.at_end() {
        let (member_name, member) = parser.parse_member()?;
        if members.contains_key(&member_name) {
            return Err(CompileError::type_error(
                member.span(),
                format!("`{member_name}` is already defined in this module"),
            ));
        }
        members.insert(member_name, member);
    }
    Ok(Module {
        name: name.to_owned(),
        file: parser.file,
        members,
    })
}

/// Parses a textual value such as `u8:3`, `(s4:-1, true)` or `[u2:1, u2:2]`.
pub fn parse_value(text: &str) -> Result<Value, CompileError> {
    let mut parser = Parser::new(text, FileName::LITERAL)?;
    let expr = parser.parse_expr()?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of value"));
    }
    evaluate_literal(&expr)
}

fn evaluate_literal(expr: &Expr) -> Result<Value, CompileError> {
    match &expr.kind {
        ExprKind::Number {
            annotation: Some(annotation),
            negative,
            magnitude,
        } => {
            let TypeAnnotationKind::Bits { signed, width } = annotation.kind else {
                return Err(CompileError::type_error(
                    annotation.span.clone(),
                    "value literals must have a bits type",
                ));
            };
            literal_bits(signed, width, *negative, *magnitude)
                .map(Value::Bits)
                .map_err(|message| CompileError::type_error(expr.span.clone(), message))
        }
        ExprKind::Number {
            annotation: None, ..
        } => Err(CompileError::type_error(
            expr.span.clone(),
            "value literals need a type prefix, like `u8:3`",
        )),
        ExprKind::Bool(value) => Ok(Value::bool(*value)),
        ExprKind::Tuple(elements) => Ok(Value::Tuple(
            elements.iter().map(evaluate_literal).collect::<Result<_, _>>()?,
        )),
        ExprKind::Array(elements) => Ok(Value::Array(
            elements.iter().map(evaluate_literal).collect::<Result<_, _>>()?,
        )),
        _ => Err(CompileError::syntax(
            expr.span.clone(),
            "expected a literal value",
        )),
    }
}

/// Splits `u8`/`s32`/`bool` into signedness and width.
fn bits_type_name(name: &str) -> Option<(bool, u128)> {
    if name == "bool" {
        return Some((false, 1));
    }
    let signed = match name.as_bytes().first()? {
        b'u' => false,
        b's' => true,
        _ => return None,
    };
    let digits = &name[1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|width| (signed, width))
}

/// `uN[8]`, `sN[8]` and `bits[8]` take their width in brackets.
fn parametric_bits_name(name: &str) -> Option<bool> {
    match name {
        "uN" | "bits" => Some(false),
        "sN" => Some(true),
        _ => None,
    }
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    Some(match token {
        Token::OrOr => (BinaryOp::Or, 1),
        Token::AndAnd => (BinaryOp::And, 2),
        Token::EqEq => (BinaryOp::Eq, 3),
        Token::NotEq => (BinaryOp::Ne, 3),
        Token::Lt => (BinaryOp::Lt, 3),
        Token::LtEq => (BinaryOp::Le, 3),
        Token::Gt => (BinaryOp::Gt, 3),
        Token::GtEq => (BinaryOp::Ge, 3),
        Token::Pipe => (BinaryOp::BitOr, 4),
        Token::Caret => (BinaryOp::BitXor, 5),
        Token::Amp => (BinaryOp::BitAnd, 6),
        Token::Shl => (BinaryOp::Shl, 7),
        Token::Shr => (BinaryOp::Shr, 7),
        Token::Plus => (BinaryOp::Add, 8),
        Token::Minus => (BinaryOp::Sub, 8),
        Token::Star => (BinaryOp::Mul, 9),
        Token::Slash => (BinaryOp::Div, 9),
        Token::Percent => (BinaryOp::Rem, 9),
        _ => return None,
    })
}

const CAST_BINDING_POWER: u8 = 10;

/// Deepest expression, type or pattern the parser accepts. Every later pass
/// recurses over the tree, so this bounds their stack use too.
pub const MAX_NESTING_DEPTH: usize = 256;

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_SEGMENT: usize = 1024 * 1024;

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    file: FileName,
    lines: LineIndex,
    source_len: usize,
    next_id: u32,
    depth: usize,
}

impl Parser {
    fn new(source: &str, file: FileName) -> Result<Self, CompileError> {
        Ok(Self {
            tokens: tokenize(source, &file)?,
            pos: 0,
            lines: LineIndex::new(source),
            source_len: source.len(),
            file,
            next_id: 0,
            depth: 0,
        })
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    fn check(&self, expected: &Token) -> bool {
        let expected = std::mem::discriminant(expected);
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn span(&self, range: Range<usize>) -> Span {
        self.lines.span(range, &self.file)
    }

    fn current_range(&self) -> Range<usize> {
        match self.tokens.get(self.pos) {
            Some(token) => token.range.clone(),
            None => self.source_len..self.source_len,
        }
    }

    fn start(&self) -> usize {
        self.current_range().start
    }

    /// Span from `start` to the end of the last consumed token.
    fn span_from(&self, start: usize) -> Span {
        let end = match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(token) => token.range.end.max(start),
            None => start,
        };
        self.span(start..end)
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let found = match self.peek() {
            Some(token) => token.to_string(),
            None => "end of input".to_owned(),
        };
        CompileError::syntax(
            self.span(self.current_range()),
            format!("expected {expected}, found {found}"),
        )
    }

    fn expect(&mut self, expected: Token) -> Result<(), CompileError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), CompileError> {
        match self.tokens.get(self.pos).cloned() {
            Some(SpannedToken {
                token: Token::Ident(name),
                range,
            }) => {
                self.pos += 1;
                Ok((name, self.span(range)))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Span, CompileError> {
        match self.peek() {
            Some(Token::Ident(name)) if name == keyword => {
                let range = self.current_range();
                self.pos += 1;
                Ok(self.span(range))
            }
            _ => Err(self.unexpected(&format!("`{keyword}`"))),
        }
    }

    fn expect_number(&mut self, what: &str) -> Result<u128, CompileError> {
        match self.peek() {
            Some(Token::Number(digits)) => {
                let range = self.current_range();
                let value = number_value(digits).ok_or_else(|| {
                    CompileError::syntax(
                        self.span(range.clone()),
                        format!("`{digits}` is not a valid number"),
                    )
                })?;
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// One level deeper, failing past [`MAX_NESTING_DEPTH`].
    fn descend(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(CompileError::syntax(
                self.span(self.current_range()),
                format!("nesting is deeper than {MAX_NESTING_DEPTH} levels"),
            ));
        }
        Ok(())
    }

    /// Runs `parse` one level deeper. Levels it descends itself are released
    /// when it returns.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        let outer = self.depth;
        let result = self.descend().and_then(|()| {
            stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || parse(self))
        });
        self.depth = outer;
        result
    }

    fn node(&mut self, start: usize, kind: ExprKind) -> Expr {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Expr {
            id,
            span: self.span_from(start),
            kind,
        }
    }

    // === Module members ===

    fn parse_member(&mut self) -> Result<(String, ModuleMember), CompileError> {
        let start = self.start();
        if self.eat(&Token::Import) {
            let (name, _) = self.expect_ident("module name")?;
            self.expect(Token::Semi)?;
            let import = Import {
                span: self.span_from(start),
                name: name.clone(),
            };
            return Ok((name, ModuleMember::Import(Arc::new(import))));
        }
        self.eat(&Token::Pub);
        match self.peek() {
            Some(Token::Const) => {
                let constant = self.parse_constant(start)?;
                Ok((constant.name.clone(), ModuleMember::Constant(Arc::new(constant))))
            }
            Some(Token::Fn) => {
                let function = self.parse_function(start)?;
                Ok((function.name.clone(), ModuleMember::Function(Arc::new(function))))
            }
            Some(Token::Proc) => {
                let proc = self.parse_proc(start)?;
                Ok((proc.name.clone(), ModuleMember::Proc(Arc::new(proc))))
            }
            _ => Err(self.unexpected("`import`, `const`, `fn` or `proc`")),
        }
    }

    fn parse_constant(&mut self, start: usize) -> Result<ConstantDef, CompileError> {
        self.expect(Token::Const)?;
        let (name, _) = self.expect_ident("constant name")?;
        let annotation = if self.eat(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(Token::Assign)?;
        let value = self.parse_expr()?;
        self.expect(Token::Semi)?;
        Ok(ConstantDef {
            span: self.span_from(start),
            name,
            annotation,
            value,
        })
    }

    fn parse_function(&mut self, start: usize) -> Result<Function, CompileError> {
        self.expect(Token::Fn)?;
        let (name, _) = self.expect_ident("function name")?;
        let params = self.parse_params()?;
        let ret = if self.eat(&Token::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Function {
            span: self.span_from(start),
            name,
            params,
            ret,
            body,
        })
    }

    fn parse_proc(&mut self, start: usize) -> Result<Proc, CompileError> {
        self.expect(Token::Proc)?;
        let (name, _) = self.expect_ident("proc name")?;
        self.expect(Token::LBrace)?;

        let config_start = self.start();
        self.expect_keyword("config")?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        let config = ProcConfig {
            span: self.span_from(config_start),
            params,
            body,
        };

        let next_start = self.start();
        self.expect_keyword("next")?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        let next = ProcNext {
            span: self.span_from(next_start),
            params,
            body,
        };

        self.expect(Token::RBrace)?;
        Ok(Proc {
            span: self.span_from(start),
            name,
            config,
            next,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, CompileError> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.eat(&Token::RParen) {
            let start = self.start();
            let (name, _) = self.expect_ident("parameter name")?;
            self.expect(Token::Colon)?;
            let annotation = self.parse_type()?;
            params.push(Param {
                span: self.span_from(start),
                name,
                annotation,
            });
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok(params)
    }

    // === Types ===

    fn parse_type(&mut self) -> Result<TypeAnnotation, CompileError> {
        self.nested(Self::parse_array_type)
    }

    fn parse_array_type(&mut self) -> Result<TypeAnnotation, CompileError> {
        let start = self.start();
        let mut ty = self.parse_base_type()?;
        while self.eat(&Token::LBracket) {
            self.descend()?;
            let size = self.expect_number("array size")?;
            self.expect(Token::RBracket)?;
            ty = TypeAnnotation {
                span: self.span_from(start),
                kind: TypeAnnotationKind::Array(Box::new(ty), size),
            };
        }
        Ok(ty)
    }

    fn parse_base_type(&mut self) -> Result<TypeAnnotation, CompileError> {
        let start = self.start();
        if self.eat(&Token::LParen) {
            let mut elements = Vec::new();
            while !self.eat(&Token::RParen) {
                elements.push(self.parse_type()?);
                if !self.eat(&Token::Comma) {
                    self.expect(Token::RParen)?;
                    break;
                }
            }
            return Ok(TypeAnnotation {
                span: self.span_from(start),
                kind: TypeAnnotationKind::Tuple(elements),
            });
        }
        if self.eat(&Token::Chan) {
            self.expect(Token::Lt)?;
            let payload = self.parse_type()?;
            self.expect(Token::Gt)?;
            let direction = match self.peek() {
                Some(Token::Ident(word)) if word == "in" => ChannelDirection::In,
                Some(Token::Ident(word)) if word == "out" => ChannelDirection::Out,
                _ => return Err(self.unexpected("channel direction `in` or `out`")),
            };
            self.pos += 1;
            return Ok(TypeAnnotation {
                span: self.span_from(start),
                kind: TypeAnnotationKind::Channel(Box::new(payload), direction),
            });
        }
        let (name, span) = self.expect_ident("type")?;
        if let Some(signed) = parametric_bits_name(&name) {
            self.expect(Token::LBracket)?;
            let width = self.expect_number("bit width")?;
            self.expect(Token::RBracket)?;
            return Ok(TypeAnnotation {
                span: self.span_from(start),
                kind: TypeAnnotationKind::Bits { signed, width },
            });
        }
        match bits_type_name(&name) {
            Some((signed, width)) => Ok(TypeAnnotation {
                span,
                kind: TypeAnnotationKind::Bits { signed, width },
            }),
            None => Err(CompileError::type_error(
                span,
                format!("unknown type `{name}`"),
            )),
        }
    }

    // === Expressions ===

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr, CompileError> {
        self.nested(|parser| parser.parse_operators(min_bp))
    }

    /// Left-associative chains grow the tree without recursing, so each link
    /// counts as a level.
    fn parse_operators(&mut self, min_bp: u8) -> Result<Expr, CompileError> {
        let start = self.start();
        let mut lhs = self.parse_unary()?;
        loop {
            if self.check(&Token::As) {
                if CAST_BINDING_POWER < min_bp {
                    break;
                }
                self.pos += 1;
                self.descend()?;
                let ty = self.parse_type()?;
                lhs = self.node(start, ExprKind::Cast(Box::new(lhs), ty));
                continue;
            }
            let Some((op, bp)) = self.peek().and_then(binary_op) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.pos += 1;
            self.descend()?;
            let rhs = self.parse_expr_bp(bp + 1)?;
            lhs = self.node(start, ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let start = self.start();
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Negate,
            Some(Token::Bang) => UnaryOp::Invert,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        let operand = self.nested(Self::parse_unary)?;
        Ok(self.node(start, ExprKind::Unary(op, Box::new(operand))))
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let start = self.start();
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::LBracket) {
                self.descend()?;
                let index = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                expr = self.node(start, ExprKind::Index(Box::new(expr), Box::new(index)));
            } else if self.eat(&Token::Dot) {
                self.descend()?;
                let index = self.expect_number("tuple index")?;
                let index = usize::try_from(index).map_err(|_| {
                    CompileError::syntax(self.span_from(start), "tuple index is too large")
                })?;
                expr = self.node(start, ExprKind::TupleIndex(Box::new(expr), index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        while !self.eat(&Token::RParen) {
            args.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok(args)
    }

    fn starts_typed_literal(&self, name: &str) -> bool {
        match self.peek_nth(1) {
            Some(Token::Colon) => bits_type_name(name).is_some(),
            Some(Token::LBracket) => parametric_bits_name(name).is_some(),
            _ => false,
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let start = self.start();
        match self.peek().cloned() {
            Some(Token::Number(_)) => {
                let magnitude = self.expect_number("number")?;
                Ok(self.node(
                    start,
                    ExprKind::Number {
                        annotation: None,
                        negative: false,
                        magnitude,
                    },
                ))
            }
            Some(Token::True) | Some(Token::False) => {
                let value = self.check(&Token::True);
                self.pos += 1;
                Ok(self.node(start, ExprKind::Bool(value)))
            }
            Some(Token::Ident(name)) if self.starts_typed_literal(&name) => {
                let annotation = self.parse_type()?;
                self.expect(Token::Colon)?;
                let negative = self.eat(&Token::Minus);
                let magnitude = self.expect_number("literal value")?;
                Ok(self.node(
                    start,
                    ExprKind::Number {
                        annotation: Some(annotation),
                        negative,
                        magnitude,
                    },
                ))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                let module = if self.eat(&Token::ColonColon) {
                    let (member, _) = self.expect_ident("module member")?;
                    Some((name.clone(), member))
                } else {
                    None
                };
                if self.check(&Token::LParen) {
                    let args = self.parse_args()?;
                    let callee = match module {
                        Some((module, member)) => Callee {
                            module: Some(module),
                            name: member,
                        },
                        None => Callee { module: None, name },
                    };
                    return Ok(self.node(start, ExprKind::Call { callee, args }));
                }
                let kind = match module {
                    Some((module, name)) => ExprKind::Path { module, name },
                    None => ExprKind::Name(name),
                };
                Ok(self.node(start, kind))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                if self.eat(&Token::RParen) {
                    return Ok(self.node(start, ExprKind::Tuple(Vec::new())));
                }
                let first = self.parse_expr()?;
                if self.eat(&Token::RParen) {
                    return Ok(first);
                }
                let mut elements = vec![first];
                while self.eat(&Token::Comma) {
                    if self.check(&Token::RParen) {
                        break;
                    }
                    elements.push(self.parse_expr()?);
                }
                self.expect(Token::RParen)?;
                Ok(self.node(start, ExprKind::Tuple(elements)))
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let mut elements = Vec::new();
                while !self.eat(&Token::RBracket) {
                    elements.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        self.expect(Token::RBracket)?;
                        break;
                    }
                }
                Ok(self.node(start, ExprKind::Array(elements)))
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::LBrace) => self.parse_block(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_if(&mut self) -> Result<Expr, CompileError> {
        let start = self.start();
        self.expect(Token::If)?;
        let condition = self.parse_expr()?;
        let then = self.parse_block()?;
        self.expect(Token::Else)?;
        let otherwise = if self.check(&Token::If) {
            self.nested(Self::parse_if)?
        } else {
            self.parse_block()?
        };
        Ok(self.node(
            start,
            ExprKind::If {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        ))
    }

    fn parse_block(&mut self) -> Result<Expr, CompileError> {
        let start = self.start();
        self.expect(Token::LBrace)?;
        let mut statements = Vec::new();
        let mut tail = None;
        while !self.eat(&Token::RBrace) {
            if self.check(&Token::Let) {
                statements.push(self.parse_let()?);
                continue;
            }
            let expr = self.parse_expr()?;
            if self.eat(&Token::Semi) {
                statements.push(Statement::Expr(expr));
            } else if self.eat(&Token::RBrace) {
                tail = Some(Box::new(expr));
                break;
            } else if matches!(expr.kind, ExprKind::If { .. } | ExprKind::Block(..)) {
                statements.push(Statement::Expr(expr));
            } else {
                return Err(self.unexpected("`;` or `}`"));
            }
        }
        Ok(self.node(start, ExprKind::Block(statements, tail)))
    }

    fn parse_let(&mut self) -> Result<Statement, CompileError> {
        let start = self.start();
        self.expect(Token::Let)?;
        let pattern = self.parse_pattern()?;
        let annotation = if self.eat(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(Token::Assign)?;
        let value = self.parse_expr()?;
        self.expect(Token::Semi)?;
        Ok(Statement::Let {
            span: self.span_from(start),
            pattern,
            annotation,
            value,
        })
    }

    fn parse_pattern(&mut self) -> Result<Pattern, CompileError> {
        self.nested(Self::parse_pattern_at)
    }

    fn parse_pattern_at(&mut self) -> Result<Pattern, CompileError> {
        let start = self.start();
        if self.eat(&Token::LParen) {
            let mut elements = Vec::new();
            while !self.eat(&Token::RParen) {
                elements.push(self.parse_pattern()?);
                if !self.eat(&Token::Comma) {
                    self.expect(Token::RParen)?;
                    break;
                }
            }
            return Ok(Pattern::Tuple(self.span_from(start), elements));
        }
        let (name, span) = self.expect_ident("pattern")?;
        if name == "_" {
            Ok(Pattern::Wildcard(span))
        } else {
            Ok(Pattern::Name(span, name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dslx::error::CompileErrorKind;

    fn parse(source: &str) -> Module {
        parse_module(source, FileName::from("test.x"), "test").unwrap()
    }

    fn body_of(module: &Module, name: &str) -> Expr {
        match &module.members[name] {
            ModuleMember::Function(f) => f.body.clone(),
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_with_typed_literal() {
        let module = parse("fn add(x: u8, y: u8) -> u8 { x + y + u8:1 }");
        let ModuleMember::Function(function) = &module.members["add"] else {
            panic!("expected function");
        };
        assert_eq!(function.params.len(), 2);
        assert!(function.ret.is_some());
        let ExprKind::Block(statements, Some(tail)) = &function.body.kind else {
            panic!("expected block");
        };
        assert!(statements.is_empty());
        let ExprKind::Binary(BinaryOp::Add, lhs, rhs) = &tail.kind else {
            panic!("expected addition, got {:?}", tail.kind);
        };
        assert!(matches!(lhs.kind, ExprKind::Binary(BinaryOp::Add, ..)));
        assert!(matches!(
            rhs.kind,
            ExprKind::Number {
                annotation: Some(_),
                magnitude: 1,
                ..
            }
        ));
    }

    #[test]
    fn precedence_of_shift_and_compare() {
        let module = parse("fn f(a: u8) -> bool { a << 1 == a * 2 }");
        let ExprKind::Block(_, Some(tail)) = body_of(&module, "f").kind else {
            panic!("expected block");
        };
        let ExprKind::Binary(BinaryOp::Eq, lhs, rhs) = &tail.kind else {
            panic!("expected comparison");
        };
        assert!(matches!(lhs.kind, ExprKind::Binary(BinaryOp::Shl, ..)));
        assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOp::Mul, ..)));
    }

    #[test]
    fn cast_binds_tighter_than_addition() {
        let module = parse("fn f(a: u8) -> u16 { a as u16 + u16:1 }");
        let ExprKind::Block(_, Some(tail)) = body_of(&module, "f").kind else {
            panic!("expected block");
        };
        let ExprKind::Binary(BinaryOp::Add, lhs, _) = &tail.kind else {
            panic!("expected addition");
        };
        assert!(matches!(lhs.kind, ExprKind::Cast(..)));
    }

    #[test]
    fn parses_proc_with_channels() {
        let module = parse(
            "proc Counter {
                config(input: chan<u32> in, output: chan<u32> out) { }
                next(count: u32) {
                    let x = recv(input);
                    send(output, count + x);
                    count + u32:1
                }
            }",
        );
        let ModuleMember::Proc(proc) = &module.members["Counter"] else {
            panic!("expected proc");
        };
        assert_eq!(proc.config.params.len(), 2);
        assert!(matches!(
            proc.config.params[0].annotation.kind,
            TypeAnnotationKind::Channel(_, ChannelDirection::In)
        ));
        assert!(matches!(
            proc.config.params[1].annotation.kind,
            TypeAnnotationKind::Channel(_, ChannelDirection::Out)
        ));
        assert_eq!(proc.next.params[0].name, "count");
    }

    #[test]
    fn parses_patterns_and_paths() {
        let module = parse(
            "import util;
             const K = u4:3;
             fn f(t: (u4, (u4, u4))) -> u4 {
                 let (a, (_, c)) = t;
                 util::mix(a, c) + K
             }",
        );
        assert!(matches!(module.members["util"], ModuleMember::Import(_)));
        assert!(matches!(module.members["K"], ModuleMember::Constant(_)));
        let ExprKind::Block(statements, Some(tail)) = body_of(&module, "f").kind else {
            panic!("expected block");
        };
        assert!(matches!(
            &statements[0],
            Statement::Let {
                pattern: Pattern::Tuple(_, elements),
                ..
            } if elements.len() == 2
        ));
        let ExprKind::Binary(_, call, _) = &tail.kind else {
            panic!("expected addition");
        };
        assert!(matches!(
            &call.kind,
            ExprKind::Call { callee: Callee { module: Some(m), .. }, .. } if m == "util"
        ));
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let error = parse_module("fn f() {} fn f() {}", FileName::from("t.x"), "t").unwrap_err();
        assert!(error.message.contains("already defined"));
    }

    #[test]
    fn missing_else_is_a_syntax_error() {
        let error = parse_module("fn f(a: u1) -> u1 { if a { a } }", FileName::from("t.x"), "t")
            .unwrap_err();
        assert!(error.message.contains("`else`"), "{}", error.message);
    }

    #[test]
    fn value_literals() {
        assert_eq!(parse_value("u8:3").unwrap(), Value::ubits(8, 3));
        assert_eq!(parse_value("s4:-1").unwrap(), Value::sbits(4, -1));
        assert_eq!(parse_value("bits[3]:0b101").unwrap(), Value::ubits(3, 5));
        assert_eq!(
            parse_value("(u8:1, [true, false])").unwrap(),
            Value::Tuple(vec![
                Value::ubits(8, 1),
                Value::Array(vec![Value::bool(true), Value::bool(false)])
            ])
        );
        assert!(parse_value("3").is_err());
        assert!(parse_value("u2:4").is_err());
    }

    fn parenthesized(depth: usize, inner: &str) -> String {
        format!("{}{inner}{}", "(".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        for depth in [500, 2000, 5000] {
            let source = format!("fn f() -> u8 {{ {} }}", parenthesized(depth, "u8:1"));
            let error = parse_module(&source, FileName::from("t.x"), "t").unwrap_err();
            assert_eq!(error.kind, CompileErrorKind::Syntax);
            assert!(error.message.contains("nesting"), "{}", error.message);
        }
        let literal = format!("{}u8:1{}", "(".repeat(5000), ",)".repeat(5000));
        assert!(parse_value(&literal).is_err());
    }

    #[test]
    fn operator_chains_count_toward_nesting() {
        let chain = vec!["a"; 1000].join(" + ");
        let source = format!("fn f(a: u8) -> u8 {{ {chain} }}");
        assert!(parse_module(&source, FileName::from("t.x"), "t").is_err());

        let indexed = format!("fn f(a: u8[1]) -> u8 {{ a{} }}", "[0]".repeat(1000));
        assert!(parse_module(&indexed, FileName::from("t.x"), "t").is_err());
    }

    #[test]
    fn nesting_within_the_limit_parses() {
        let source = format!("fn f() -> u8 {{ {} }}", parenthesized(100, "u8:1"));
        let module = parse(&source);
        assert!(matches!(
            body_of(&module, "f").kind,
            ExprKind::Block(_, Some(_))
        ));
        assert_eq!(parse_value(&parenthesized(100, "u8:7")).unwrap(), Value::ubits(8, 7));
    }
}
