use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::bytecode::interpreter::DEFAULT_MAX_CALL_DEPTH;
use crate::bytecode::{emit_function, emit_proc_next, BytecodeProgram, Interpreter};
use crate::channel::ChannelArena;
use crate::dslx::ast;
use crate::dslx::import::ImportData;
use crate::dslx::typecheck::TypecheckedModule;
use crate::error::{Error, LookupError, Result};
use crate::harness::sign::convert_row;
use crate::location::FileName;
use crate::toolchain::{ModuleMember, ProcInstance, Spawned, Toolchain};
use crate::types::{ConfigParam, FunctionSignature};
use crate::value::Value;

/// Stack the front end runs on. Parsing bounds nesting, so this is enough for
/// the checker's recursion at the deepest accepted tree.
const COMPILE_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Parses, typechecks, emits and interprets DSLX source text.
#[derive(Debug)]
pub struct DslxToolchain {
    imports: ImportData,
    max_call_depth: usize,
}

impl DslxToolchain {
    pub fn new(
        stdlib_path: impl Into<PathBuf>,
        search_paths: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        Self {
            imports: ImportData::new(stdlib_path, search_paths),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Source text of a file this toolchain has read, for rendering compile errors.
    pub fn source(&self, file: &FileName) -> Option<Arc<str>> {
        self.imports.source(file)
    }
}

fn module_name(file: &FileName) -> String {
    Path::new(file.0.as_str())
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

impl Toolchain for DslxToolchain {
    type Module = Arc<TypecheckedModule>;
    type Function = Arc<ast::Function>;
    type Proc = Arc<ast::Proc>;
    type Bytecode = BytecodeProgram;
    type Instance = DslxProcInstance;

    fn parse_and_typecheck(&mut self, source: &str, file: FileName) -> Result<Self::Module> {
        let name = module_name(&file);
        let imports = &mut self.imports;
        let module = stacker::grow(COMPILE_STACK_SIZE, || {
            imports.parse_and_typecheck(source, file, &name)
        })?;
        debug!(module = name, members = module.module.members.len(), "typechecked module");
        Ok(Arc::new(module))
    }

    fn find_member(
        &self,
        module: &Self::Module,
        name: &str,
    ) -> Option<ModuleMember<Self::Function, Self::Proc>> {
        Some(match module.module.members.get(name)? {
            ast::ModuleMember::Function(function) => ModuleMember::Function(Arc::clone(function)),
            ast::ModuleMember::Proc(proc) => ModuleMember::Proc(Arc::clone(proc)),
            ast::ModuleMember::Constant(_) => ModuleMember::Constant,
            ast::ModuleMember::Import(_) => ModuleMember::Import,
        })
    }

    fn signature(
        &self,
        module: &Self::Module,
        function: &Self::Function,
    ) -> Result<FunctionSignature> {
        module.functions.get(&function.name).cloned().ok_or_else(|| {
            LookupError::NotFound {
                module: module.name().to_owned(),
                name: function.name.clone(),
            }
            .into()
        })
    }

    fn emit(&mut self, module: &Self::Module, function: &Self::Function) -> Result<Self::Bytecode> {
        emit_function(module, &function.name)
    }

    fn interpret(&mut self, bytecode: &Self::Bytecode, args: &[Value]) -> Result<Value> {
        Interpreter::new(bytecode)
            .with_max_call_depth(self.max_call_depth)
            .run(args.to_vec())
    }

    fn config_params(&self, module: &Self::Module, proc: &Self::Proc) -> Result<Vec<ConfigParam>> {
        module
            .procs
            .get(&proc.name)
            .map(|types| types.members.clone())
            .ok_or_else(|| {
                LookupError::NotFound {
                    module: module.name().to_owned(),
                    name: proc.name.clone(),
                }
                .into()
            })
    }

    fn spawn(
        &mut self,
        module: &Self::Module,
        proc: &Self::Proc,
        config_args: &[Value],
        initial_state: &[Value],
    ) -> Result<Vec<Spawned<Self::Instance>>> {
        let Some(types) = module.procs.get(&proc.name) else {
            return Err(LookupError::NotFound {
                module: module.name().to_owned(),
                name: proc.name.clone(),
            }
            .into());
        };
        if config_args.len() != types.members.len() {
            return Err(Error::config(
                &proc.name,
                format!(
                    "expected {} config arguments, got {}",
                    types.members.len(),
                    config_args.len()
                ),
            ));
        }
        let initial_state = convert_row(
            initial_state,
            &types.state,
            &format!("initial state of proc `{}`", proc.name),
        )?;
        let program = emit_proc_next(module, &proc.name)?;
        debug!(proc = proc.name, "spawned proc instance");
        Ok(vec![Spawned {
            instance: DslxProcInstance {
                name: proc.name.clone(),
                program,
                members: config_args.to_vec(),
                state_len: types.state.len(),
                max_call_depth: self.max_call_depth,
            },
            initial_state,
        }])
    }
}

/// A proc bound to its channels. Each tick runs the compiled `next` once.
#[derive(Debug)]
pub struct DslxProcInstance {
    name: String,
    program: BytecodeProgram,
    members: Vec<Value>,
    state_len: usize,
    max_call_depth: usize,
}

impl ProcInstance for DslxProcInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, channels: &mut ChannelArena, state: &[Value]) -> Result<Vec<Value>> {
        if state.len() != self.state_len {
            return Err(Error::runtime(format!(
                "proc `{}` has {} state elements, got {}",
                self.name,
                self.state_len,
                state.len()
            )));
        }
        let mut args = self.members.clone();
        args.extend_from_slice(state);
        let next = Interpreter::new(&self.program)
            .with_channels(channels)
            .with_max_call_depth(self.max_call_depth)
            .run(args)?;
        match (self.state_len, next) {
            (1, single) => Ok(vec![single]),
            (len, Value::Tuple(elements)) if elements.len() == len => Ok(elements),
            (_, other) => Err(Error::runtime(format!(
                "`{}.next` returned `{other}`, which does not match its state",
                self.name
            ))),
        }
    }
}
