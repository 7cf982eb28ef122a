//! A DSLX subset: lexer, parser, type checker and import resolution, plus the
//! [`DslxToolchain`] that exposes them to the batch harness.

pub mod ast;
pub mod error;
pub mod import;
pub mod lexer;
pub mod parse;
pub mod toolchain;
pub mod typecheck;

pub use error::{CompileError, CompileErrorKind};
pub use toolchain::{DslxProcInstance, DslxToolchain};
