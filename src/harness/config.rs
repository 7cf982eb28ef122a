use std::path::PathBuf;

use crate::bytecode::interpreter::DEFAULT_MAX_CALL_DEPTH;

/// What a failing row does to the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFailurePolicy {
    /// The first failing row fails the whole call; nothing is returned.
    #[default]
    AbortBatch,
    /// Every row gets its own `Ok` or `Err` entry and the batch keeps going.
    TagRows,
}

/// What happens to proc rows whose output tuple came out empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyRowPolicy {
    #[default]
    Keep,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub stdlib_path: PathBuf,
    pub search_paths: Vec<PathBuf>,
    pub row_failures: RowFailurePolicy,
    pub empty_rows: EmptyRowPolicy,
    pub max_call_depth: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            stdlib_path: PathBuf::from("."),
            search_paths: Vec::new(),
            row_failures: RowFailurePolicy::default(),
            empty_rows: EmptyRowPolicy::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl RunConfig {
    pub fn with_stdlib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdlib_path = path.into();
        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_row_failures(mut self, policy: RowFailurePolicy) -> Self {
        self.row_failures = policy;
        self
    }

    pub fn with_empty_rows(mut self, policy: EmptyRowPolicy) -> Self {
        self.empty_rows = policy;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}
