use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dslx::error::CompileError;
use crate::toolchain::MemberKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a failed batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Compile,
    Emission,
    Lookup,
    Config,
    Arity,
    Conversion,
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Compile => "compile",
            Self::Emission => "emission",
            Self::Lookup => "lookup",
            Self::Config => "config",
            Self::Arity => "arity",
            Self::Conversion => "conversion",
            Self::Runtime => "runtime",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error, miette::Diagnostic)]
pub enum LookupError {
    #[error("module `{module}` has no member named `{name}`")]
    NotFound { module: String, name: String },
    #[error("`{name}` is a {found}, but a {expected} was requested")]
    WrongKind {
        name: String,
        expected: MemberKind,
        found: MemberKind,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(code(dslx_batch::compile))]
    Compile(#[from] CompileError),

    #[error("cannot emit bytecode for `{entity}`: {message}")]
    #[diagnostic(code(dslx_batch::emission))]
    Emission { entity: String, message: String },

    #[error(transparent)]
    #[diagnostic(code(dslx_batch::lookup))]
    Lookup(#[from] LookupError),

    #[error("cannot wire proc `{proc_name}`: {reason}")]
    #[diagnostic(code(dslx_batch::config))]
    Config { proc_name: String, reason: String },

    #[error("{}{what} expects {expected} values, got {found}", row_prefix(.row))]
    #[diagnostic(code(dslx_batch::arity))]
    Arity {
        row: Option<usize>,
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("{}{message}", row_prefix(.row))]
    #[diagnostic(code(dslx_batch::conversion))]
    Conversion { row: Option<usize>, message: String },

    #[error("{}{message}", row_prefix(.row))]
    #[diagnostic(code(dslx_batch::runtime))]
    Runtime { row: Option<usize>, message: String },
}

fn row_prefix(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!("row {row}: "),
        None => String::new(),
    }
}

impl Error {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            row: None,
            message: message.into(),
        }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            row: None,
            message: message.into(),
        }
    }

    pub fn emission(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Emission {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn config(proc_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            proc_name: proc_name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Compile(_) => ErrorKind::Compile,
            Self::Emission { .. } => ErrorKind::Emission,
            Self::Lookup(_) => ErrorKind::Lookup,
            Self::Config { .. } => ErrorKind::Config,
            Self::Arity { .. } => ErrorKind::Arity,
            Self::Conversion { .. } => ErrorKind::Conversion,
            Self::Runtime { .. } => ErrorKind::Runtime,
        }
    }

    /// Attaches the batch row to row-scoped errors that do not carry one yet.
    pub fn at_row(mut self, index: usize) -> Self {
        match &mut self {
            Self::Arity { row, .. } | Self::Conversion { row, .. } | Self::Runtime { row, .. } => {
                row.get_or_insert(index);
            }
            _ => {}
        }
        self
    }

    /// Renders the error for a terminal, with source labels for compile errors.
    pub fn display(&self, code: Arc<str>) -> String {
        match self {
            Self::Compile(error) => format!("{:?}", error.to_report(code)),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_is_attached_once() {
        let error = Error::runtime("division by zero").at_row(3).at_row(7);
        assert_eq!(error.to_string(), "row 3: division by zero");
        assert_eq!(error.kind(), ErrorKind::Runtime);
    }

    #[test]
    fn call_level_errors_ignore_rows() {
        let error = Error::config("P", "parameter `x` is not a channel").at_row(1);
        assert_eq!(error.to_string(), "cannot wire proc `P`: parameter `x` is not a channel");
    }

    #[test]
    fn arity_message() {
        let error = Error::Arity {
            row: Some(0),
            what: "function `add`".to_owned(),
            expected: 2,
            found: 1,
        };
        assert_eq!(error.to_string(), "row 0: function `add` expects 2 values, got 1");
        assert_eq!(error.kind(), ErrorKind::Arity);
    }
}
