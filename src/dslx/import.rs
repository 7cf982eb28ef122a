use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::dslx::error::CompileError;
use crate::dslx::parse::parse_module;
use crate::dslx::typecheck::{typecheck_module, TypecheckedModule};
use crate::location::{FileName, Span};

/// Resolves `import name;` to `name.x` on the search path, caching typechecked modules.
#[derive(Debug, Default)]
pub struct ImportData {
    search_paths: Vec<PathBuf>,
    cache: HashMap<String, Arc<TypecheckedModule>>,
    in_progress: Vec<String>,
    sources: HashMap<FileName, Arc<str>>,
}

impl ImportData {
    /// The stdlib directory is searched first, then `search_paths` in order.
    pub fn new(
        stdlib_path: impl Into<PathBuf>,
        search_paths: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        let mut paths = vec![stdlib_path.into()];
        paths.extend(search_paths);
        Self {
            search_paths: paths,
            ..Self::default()
        }
    }

    /// Source text of any file loaded so far, for error rendering.
    pub fn source(&self, file: &FileName) -> Option<Arc<str>> {
        self.sources.get(file).cloned()
    }

    pub fn parse_and_typecheck(
        &mut self,
        source: &str,
        file: FileName,
        module_name: &str,
    ) -> Result<TypecheckedModule, CompileError> {
        self.sources.insert(file.clone(), Arc::from(source));
        let module = parse_module(source, file, module_name)?;
        self.in_progress.push(module_name.to_owned());
        let result = typecheck_module(module, self);
        self.in_progress.pop();
        result
    }

    pub fn import(
        &mut self,
        name: &str,
        span: &Span,
    ) -> Result<Arc<TypecheckedModule>, CompileError> {
        if let Some(module) = self.cache.get(name) {
            return Ok(Arc::clone(module));
        }
        if self.in_progress.iter().any(|m| m == name) {
            let mut cycle = self.in_progress.clone();
            cycle.push(name.to_owned());
            return Err(CompileError::import(
                span.clone(),
                format!("import cycle: {}", cycle.join(" -> ")),
            ));
        }
        let file_name = format!("{name}.x");
        let Some(path) = self
            .search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
        else {
            return Err(CompileError::import(
                span.clone(),
                format!(
                    "cannot find module `{name}`; looked for `{file_name}` in {} directories",
                    self.search_paths.len()
                ),
            ));
        };
        debug!(module = name, path = %path.display(), "importing module");
        let source = fs::read_to_string(&path).map_err(|err| {
            CompileError::import(span.clone(), format!("cannot read `{}`: {err}", path.display()))
        })?;
        let module = Arc::new(self.parse_and_typecheck(&source, FileName::from(path), name)?);
        self.cache.insert(name.to_owned(), Arc::clone(&module));
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dslx::error::CompileErrorKind;
    use std::path::Path;

    fn lib_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("lib")
    }

    #[test]
    fn imports_resolve_from_the_search_path() {
        let mut imports = ImportData::new(lib_dir(), []);
        let module = imports
            .parse_and_typecheck(
                "import mathlib; fn f(x: u8) -> u8 { mathlib::double(x) + mathlib::ONE }",
                FileName::BATCH,
                "batched",
            )
            .unwrap();
        assert!(module.imports.contains_key("mathlib"));
        assert!(module.imports["mathlib"].functions.contains_key("double"));
    }

    #[test]
    fn missing_module_is_an_import_error() {
        let mut imports = ImportData::new(lib_dir(), []);
        let error = imports
            .parse_and_typecheck("import nowhere;", FileName::BATCH, "batched")
            .unwrap_err();
        assert_eq!(error.kind, CompileErrorKind::Import);
        assert!(error.message.contains("nowhere.x"));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut imports = ImportData::new(lib_dir(), []);
        let error = imports
            .parse_and_typecheck("import cycle_a;", FileName::BATCH, "batched")
            .unwrap_err();
        assert_eq!(error.kind, CompileErrorKind::Import);
        assert!(error.message.contains("cycle_a -> cycle_b -> cycle_a"), "{}", error.message);
    }
}
