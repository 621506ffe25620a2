//! Compile driver.
//!
//! A [`Module`] collects extensions and function definitions. Compiling it
//! runs every function through type checking, linearity analysis and
//! lowering, then assembles the module graph:
//!
//! ```text
//! register ──► check ──► linearity ──► lower ──┐
//!              (one pipeline per function)     ├──► assemble ──► CompiledProgram
//!                                              ┘
//! ```
//!
//! Functions are independent until assembly, so with
//! [`CompileOptions::parallel`] they run on the rayon pool. Results are
//! collected in function-id order either way, which keeps diagnostics and
//! the emitted document identical between runs.

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use qflow_ir::{Document, Graph};

use crate::assemble::{CompiledFunction, assemble};
use crate::ast::{FunctionDef, ModuleSource, Signature};
use crate::check::check_function;
use crate::error::{CompileError, CompileResult, Diagnostic, Diagnostics};
use crate::linearity::check_linearity;
use crate::lower::lower_function;
use crate::ops::{Extension, OpTable};
use crate::registry::{FunctionId, Registry};

/// Options controlling a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Check and lower functions on the rayon pool.
    pub parallel: bool,
    /// Validate every function graph and the assembled module graph.
    pub validate: bool,
    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl CompileOptions {
    /// Create options with the defaults: parallel, validating, pretty.
    pub fn new() -> Self {
        Self {
            parallel: true,
            validate: true,
            pretty: true,
        }
    }

    /// Enable or disable parallel compilation.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enable or disable graph validation.
    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Enable or disable pretty-printed JSON.
    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A module under construction.
///
/// Registration diagnostics are recorded as they happen and reported
/// together with everything else when the module is checked or compiled.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    registry: Registry,
    ops: OpTable,
    diagnostics: Vec<Diagnostic>,
}

impl Module {
    /// Create an empty module with no extensions loaded.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Registry::new(),
            ops: OpTable::new(),
            diagnostics: vec![],
        }
    }

    /// Create a module with the built-in `quantum` and `angles` extensions.
    pub fn with_prelude(name: impl Into<String>) -> Self {
        Self {
            ops: OpTable::with_prelude(),
            ..Self::new(name)
        }
    }

    /// Build a module from a source document.
    ///
    /// Fails if the document names an unknown extension. Registration
    /// problems are recorded as diagnostics.
    pub fn from_source(source: ModuleSource) -> CompileResult<Self> {
        let mut module = Self::new(source.name);
        for name in &source.extensions {
            let ext =
                Extension::builtin(name).ok_or_else(|| CompileError::UnknownExtension(name.clone()))?;
            module.load(&ext)?;
        }
        for def in source.functions {
            // Recorded in `self.diagnostics`.
            let _ = module.register(def);
        }
        Ok(module)
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load an extension into the operation table.
    pub fn load(&mut self, ext: &Extension) -> CompileResult<()> {
        self.ops.load(ext)
    }

    /// The operation table.
    pub fn ops(&self) -> &OpTable {
        &self.ops
    }

    /// The function registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register a function definition.
    pub fn register(&mut self, def: FunctionDef) -> Result<FunctionId, Diagnostic> {
        debug!("Registering function '{}'", def.name);
        self.registry
            .register(def)
            .inspect_err(|d| self.diagnostics.push(d.clone()))
    }

    /// Declare a function signature ahead of its definition.
    pub fn declare(&mut self, name: &str, signature: Signature) -> Result<FunctionId, Diagnostic> {
        self.registry
            .declare(name, signature)
            .inspect_err(|d| self.diagnostics.push(d.clone()))
    }

    /// Get the id for a name, reserving a slot if it is not known yet.
    pub fn resolve(&mut self, name: &str) -> FunctionId {
        self.registry.resolve(name)
    }

    /// Check every function without assembling a module graph.
    ///
    /// Returns all diagnostics; an empty list means [`Module::compile`]
    /// would succeed.
    #[instrument(skip_all, fields(module = %self.name))]
    pub fn check(&self, options: &CompileOptions) -> CompileResult<Diagnostics> {
        let (diagnostics, _) = self.run(options)?;
        info!(
            "Checked {} functions, {} diagnostic(s)",
            self.registry.len(),
            diagnostics.len()
        );
        Ok(diagnostics)
    }

    /// Compile the module.
    ///
    /// Any diagnostic fails the whole compilation with
    /// [`CompileError::Failed`] carrying every diagnostic found.
    #[instrument(skip_all, fields(module = %self.name))]
    pub fn compile(self, options: &CompileOptions) -> CompileResult<CompiledProgram> {
        info!(
            "Compiling module '{}' with {} functions (parallel: {})",
            self.name,
            self.registry.len(),
            options.parallel
        );

        let (diagnostics, graphs) = self.run(options)?;
        if !diagnostics.is_empty() {
            info!("Compilation failed with {} diagnostic(s)", diagnostics.len());
            return Err(CompileError::Failed(diagnostics));
        }

        let assembly = assemble(graphs)?;
        if options.validate {
            assembly.graph.validate()?;
        }

        info!(
            "Compiled module '{}': {} nodes, {} edges, {} regions",
            self.name,
            assembly.graph.node_count(),
            assembly.graph.edge_count(),
            assembly.graph.regions().len()
        );
        Ok(CompiledProgram {
            name: self.name,
            graph: assembly.graph,
            functions: assembly.functions,
            pretty: options.pretty,
        })
    }

    /// Run every defined function through the pipeline.
    ///
    /// Diagnostics come out as registration problems, then missing
    /// definitions, then per function in id order sorted by location.
    fn run(&self, options: &CompileOptions) -> CompileResult<(Diagnostics, Vec<(FunctionId, Graph)>)> {
        let defs: Vec<(FunctionId, &FunctionDef)> = self.registry.definitions().collect();
        let results: Vec<CompileResult<Graph>> = if options.parallel {
            defs.par_iter()
                .map(|(id, def)| self.compile_function(*id, def, options))
                .collect()
        } else {
            defs.iter()
                .map(|(id, def)| self.compile_function(*id, def, options))
                .collect()
        };

        let mut diagnostics = Diagnostics::from(self.diagnostics.clone());
        diagnostics.extend(self.registry.close());

        let mut graphs = Vec::with_capacity(defs.len());
        for ((id, _), result) in defs.iter().zip(results) {
            match result {
                Ok(graph) => graphs.push((*id, graph)),
                Err(CompileError::Failed(found)) => diagnostics.extend(found),
                Err(other) => return Err(other),
            }
        }
        Ok((diagnostics, graphs))
    }

    fn compile_function(
        &self,
        id: FunctionId,
        def: &FunctionDef,
        options: &CompileOptions,
    ) -> CompileResult<Graph> {
        let typed = check_function(&self.registry, &self.ops, id, def).map_err(failed)?;
        check_linearity(&typed).map_err(failed)?;
        let graph = lower_function(&typed)?;
        if options.validate {
            graph.validate()?;
        }
        Ok(graph)
    }
}

fn failed(mut diagnostics: Vec<Diagnostic>) -> CompileError {
    diagnostics.sort_by_key(|d| d.span);
    CompileError::Failed(diagnostics.into())
}

/// A successfully compiled module.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    name: String,
    graph: Graph,
    functions: Vec<CompiledFunction>,
    pretty: bool,
}

impl CompiledProgram {
    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Compiled functions in id order.
    pub fn functions(&self) -> &[CompiledFunction] {
        &self.functions
    }

    /// Look up a compiled function by name.
    pub fn function(&self, name: &str) -> Option<&CompiledFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Serialize to a JSON document.
    pub fn to_json(&self) -> CompileResult<String> {
        Ok(serialize(self)?.to_json(self.pretty)?)
    }
}

/// Build the document for a compiled program.
///
/// Only fails if the module graph is malformed, which indicates a compiler
/// defect.
pub fn serialize(program: &CompiledProgram) -> CompileResult<Document> {
    Ok(Document::from_graph(&program.name, &program.graph)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Stmt};
    use crate::error::DiagnosticKind;
    use qflow_ir::Type;

    fn flip() -> FunctionDef {
        FunctionDef::new("flip")
            .param("q", Type::Qubit)
            .returns(Type::Qubit)
            .body(vec![Stmt::ret(Expr::call("x", [Expr::var("q")]))])
    }

    #[test]
    fn test_options_builder() {
        let options = CompileOptions::new()
            .with_parallel(false)
            .with_validation(false)
            .with_pretty(false);
        assert!(!options.parallel);
        assert!(!options.validate);
        assert!(!options.pretty);
        assert_eq!(CompileOptions::default(), CompileOptions::new());
    }

    #[test]
    fn test_compile_single_function() {
        let mut module = Module::with_prelude("demo");
        module.register(flip()).unwrap();
        let program = module.compile(&CompileOptions::default()).unwrap();

        assert_eq!(program.name(), "demo");
        assert_eq!(program.functions().len(), 1);
        let doc = serialize(&program).unwrap();
        assert_eq!(doc.count_kind("gate"), 1);
        assert_eq!(doc.count_kind("function"), 1);
        assert!(program.to_json().unwrap().contains("\"module\": \"demo\""));
    }

    #[test]
    fn test_duplicate_registration_is_reported() {
        let mut module = Module::with_prelude("demo");
        module.register(flip()).unwrap();
        assert!(module.register(flip()).is_err());

        let diagnostics = module.check(&CompileOptions::default()).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.has(DiagnosticKind::DuplicateName));
    }

    #[test]
    fn test_missing_extension_leaves_ops_unbound() {
        let mut module = Module::new("bare");
        module.register(flip()).unwrap();
        let err = module.compile(&CompileOptions::default()).unwrap_err();
        let diagnostics = err.diagnostics().unwrap();
        assert!(diagnostics.has(DiagnosticKind::UnboundName));
    }

    #[test]
    fn test_undefined_declaration() {
        let mut module = Module::with_prelude("demo");
        module
            .declare("helper", Signature::new(vec![Type::Int], vec![Type::Int]))
            .unwrap();
        let diagnostics = module.check(&CompileOptions::default()).unwrap();
        assert_eq!(diagnostics.count(DiagnosticKind::UnboundName), 1);
    }

    #[test]
    fn test_unknown_extension_in_source() {
        let source = ModuleSource {
            name: "demo".into(),
            extensions: vec!["pulses".into()],
            functions: vec![],
        };
        assert!(matches!(
            Module::from_source(source),
            Err(CompileError::UnknownExtension(name)) if name == "pulses"
        ));
    }

    #[test]
    fn test_diagnostics_follow_function_order() {
        let mut module = Module::with_prelude("demo");
        module
            .register(FunctionDef::new("first").body(vec![
                Stmt::expr(Expr::var("late").at(3, 5)),
                Stmt::expr(Expr::var("early").at(2, 5)),
            ]))
            .unwrap();
        module
            .register(FunctionDef::new("second").body(vec![Stmt::break_loop().at(1, 1)]))
            .unwrap();

        let diagnostics = module
            .check(&CompileOptions::default().with_parallel(false))
            .unwrap();
        let order: Vec<_> = diagnostics
            .iter()
            .map(|d| (d.function.as_str(), d.span.line))
            .collect();
        assert_eq!(order, [("first", 2), ("first", 3), ("second", 1)]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let build = || {
            let mut module = Module::with_prelude("demo");
            module.register(flip()).unwrap();
            module
                .register(
                    FunctionDef::new("twice")
                        .param("q", Type::Qubit)
                        .returns(Type::Qubit)
                        .body(vec![Stmt::ret(Expr::call(
                            "flip",
                            [Expr::call("flip", [Expr::var("q")])],
                        ))]),
                )
                .unwrap();
            module
        };
        let parallel = build()
            .compile(&CompileOptions::default())
            .unwrap()
            .to_json()
            .unwrap();
        let sequential = build()
            .compile(&CompileOptions::default().with_parallel(false))
            .unwrap()
            .to_json()
            .unwrap();
        assert_eq!(parallel, sequential);
    }
}
