use std::fmt;
use std::sync::Arc;

use crate::location::{labels_from_span, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    Syntax,
    Type,
    Import,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Type => write!(f, "type"),
            Self::Import => write!(f, "import"),
        }
    }
}

/// A parse, typecheck or import failure, located in the source text.
#[derive(Debug, Clone, PartialEq, thiserror::Error, miette::Diagnostic)]
#[error("{span}: {kind} error: {message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Span,
    pub message: String,
}

impl CompileError {
    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        Self {
            kind: CompileErrorKind::Syntax,
            span,
            message: message.into(),
        }
    }

    pub fn type_error(span: Span, message: impl Into<String>) -> Self {
        Self {
            kind: CompileErrorKind::Type,
            span,
            message: message.into(),
        }
    }

    pub fn import(span: Span, message: impl Into<String>) -> Self {
        Self {
            kind: CompileErrorKind::Import,
            span,
            message: message.into(),
        }
    }

    pub fn to_report(&self, source_code: Arc<str>) -> miette::Report {
        let labels = labels_from_span(&source_code, &self.span);
        miette::miette!(labels = labels, "{} error: {}", self.kind, self.message)
            .with_source_code(source_code)
    }
}
