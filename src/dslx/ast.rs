use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::location::{FileName, Span, Spanning};
use crate::types::ChannelDirection;

/// Identifies an expression node within one module; type information is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub file: FileName,
    pub members: IndexMap<String, ModuleMember>,
}

#[derive(Debug, Clone)]
pub enum ModuleMember {
    Function(Arc<Function>),
    Proc(Arc<Proc>),
    Constant(Arc<ConstantDef>),
    Import(Arc<Import>),
}

impl Spanning for ModuleMember {
    fn span(&self) -> Span {
        match self {
            Self::Function(function) => function.span.clone(),
            Self::Proc(proc) => proc.span.clone(),
            Self::Constant(constant) => constant.span.clone(),
            Self::Import(import) => import.span.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Import {
    pub span: Span,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ConstantDef {
    pub span: Span,
    pub name: String,
    pub annotation: Option<TypeAnnotation>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub span: Span,
    pub name: String,
    pub annotation: TypeAnnotation,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub span: Span,
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<TypeAnnotation>,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub struct Proc {
    pub span: Span,
    pub name: String,
    pub config: ProcConfig,
    pub next: ProcNext,
}

/// The config phase. Its parameters become the proc's members, visible in `next`.
#[derive(Debug, Clone)]
pub struct ProcConfig {
    pub span: Span,
    pub params: Vec<Param>,
    pub body: Expr,
}

/// The per-tick phase. Its parameters are the proc state.
#[derive(Debug, Clone)]
pub struct ProcNext {
    pub span: Span,
    pub params: Vec<Param>,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub struct TypeAnnotation {
    pub span: Span,
    pub kind: TypeAnnotationKind,
}

#[derive(Debug, Clone)]
pub enum TypeAnnotationKind {
    Bits { signed: bool, width: u128 },
    Tuple(Vec<TypeAnnotation>),
    Array(Box<TypeAnnotation>, u128),
    Channel(Box<TypeAnnotation>, ChannelDirection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::Shr)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Number {
        annotation: Option<TypeAnnotation>,
        negative: bool,
        magnitude: u128,
    },
    Bool(bool),
    Name(String),
    Path { module: String, name: String },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Cast(Box<Expr>, TypeAnnotation),
    Tuple(Vec<Expr>),
    Array(Vec<Expr>),
    TupleIndex(Box<Expr>, usize),
    Index(Box<Expr>, Box<Expr>),
    If {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Block(Vec<Statement>, Option<Box<Expr>>),
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Callee {
    pub module: Option<String>,
    pub name: String,
}

impl fmt::Display for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}::{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Statement {
    Let {
        span: Span,
        pattern: Pattern,
        annotation: Option<TypeAnnotation>,
        value: Expr,
    },
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Name(Span, String),
    Wildcard(Span),
    Tuple(Span, Vec<Pattern>),
}

/// Channel operations available inside a proc's `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBuiltin {
    Recv,
    RecvIf,
    RecvNonBlocking,
    Send,
    SendIf,
}

impl ChannelBuiltin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "recv" => Some(Self::Recv),
            "recv_if" => Some(Self::RecvIf),
            "recv_non_blocking" => Some(Self::RecvNonBlocking),
            "send" => Some(Self::Send),
            "send_if" => Some(Self::SendIf),
            _ => None,
        }
    }

    pub fn direction(self) -> ChannelDirection {
        match self {
            Self::Recv | Self::RecvIf | Self::RecvNonBlocking => ChannelDirection::In,
            Self::Send | Self::SendIf => ChannelDirection::Out,
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Recv => 1,
            Self::RecvNonBlocking | Self::Send => 2,
            Self::RecvIf | Self::SendIf => 3,
        }
    }
}

impl fmt::Display for ChannelBuiltin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Recv => "recv",
            Self::RecvIf => "recv_if",
            Self::RecvNonBlocking => "recv_non_blocking",
            Self::Send => "send",
            Self::SendIf => "send_if",
        };
        f.write_str(name)
    }
}
