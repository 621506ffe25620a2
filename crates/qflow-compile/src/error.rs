//! Error types for the compiler crate.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use qflow_ir::IrError;

use crate::ast::Span;

/// Category of a source diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DiagnosticKind {
    /// A function name was registered twice.
    DuplicateName,
    /// A variable or callee could not be resolved.
    UnboundName,
    /// Ill-typed expression, call or return.
    Type,
    /// Quantum resource leaked or consumed more than once.
    Linearity,
    /// Malformed control flow or unresolvable join.
    ControlFlow,
}

impl DiagnosticKind {
    /// Stable error name shown to users.
    pub fn name(self) -> &'static str {
        match self {
            DiagnosticKind::DuplicateName => "DuplicateNameError",
            DiagnosticKind::UnboundName => "UnboundNameError",
            DiagnosticKind::Type => "TypeError",
            DiagnosticKind::Linearity => "LinearityError",
            DiagnosticKind::ControlFlow => "ControlFlowError",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A problem in the program being compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind} in `{function}` at {span}: {message}")]
pub struct Diagnostic {
    /// Category.
    pub kind: DiagnosticKind,
    /// Function the problem was found in.
    pub function: String,
    /// Source location.
    pub span: Span,
    /// Human-readable description.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(
        kind: DiagnosticKind,
        function: impl Into<String>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            function: function.into(),
            span,
            message: message.into(),
        }
    }
}

/// Ordered list of diagnostics from one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no diagnostics.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in report order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Count diagnostics of one kind.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.0.iter().filter(|d| d.kind == kind).count()
    }

    /// Check if any diagnostic has the given kind.
    pub fn has(&self, kind: DiagnosticKind) -> bool {
        self.0.iter().any(|d| d.kind == kind)
    }

    /// Take the underlying list.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(list: Vec<Diagnostic>) -> Self {
        Self(list)
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

/// Errors that can occur while loading or compiling a module.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// The module has diagnostics; no document was produced.
    #[error("Compilation failed with {} diagnostic(s)", .0.len())]
    Failed(Diagnostics),

    /// Graph construction or serialization failed. Indicates a compiler defect.
    #[error("Serialization error: {0}")]
    Serialization(#[from] IrError),

    /// Two extensions define the same operation differently.
    #[error("Operation '{name}' from extension '{second}' conflicts with extension '{first}'")]
    ExtensionConflict {
        /// Operation name.
        name: String,
        /// Extension that defined it first.
        first: String,
        /// Extension with the conflicting definition.
        second: String,
    },

    /// No built-in extension has this name.
    #[error("Unknown extension: {0}")]
    UnknownExtension(String),

    /// An extension document is malformed.
    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    /// A module source document is malformed.
    #[error("Invalid module source: {0}")]
    Source(String),
}

impl CompileError {
    /// The diagnostics of a failed compilation.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            CompileError::Failed(diagnostics) => Some(diagnostics),
            _ => None,
        }
    }
}

impl From<Diagnostics> for CompileError {
    fn from(diagnostics: Diagnostics) -> Self {
        CompileError::Failed(diagnostics)
    }
}

/// Result type for compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;
