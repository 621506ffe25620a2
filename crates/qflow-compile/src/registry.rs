//! Function registration and name resolution.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;

use crate::ast::{FunctionDef, Signature, Span};
use crate::error::{Diagnostic, DiagnosticKind};

/// Stable id of a function within its module.
///
/// Ids are allocated in first-mention order. Compilation and module assembly
/// follow id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FunctionId(pub u32);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    declared: Option<Signature>,
    definition: Option<FunctionDef>,
}

impl Entry {
    fn signature(&self) -> Option<Signature> {
        self.definition
            .as_ref()
            .map(FunctionDef::signature)
            .or_else(|| self.declared.clone())
    }
}

/// Name table of a module.
///
/// A name moves through three states: forward reference (resolved but not
/// yet seen), declared (signature only) and defined. Every slot must be
/// defined by the time the registry is closed.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<Entry>,
    index: FxHashMap<String, FunctionId>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, name: &str) -> FunctionId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = FunctionId(
            u32::try_from(self.entries.len()).expect("FunctionId overflow: exceeds u32::MAX"),
        );
        self.entries.push(Entry {
            name: name.to_string(),
            declared: None,
            definition: None,
        });
        self.index.insert(name.to_string(), id);
        id
    }

    /// Register a definition.
    ///
    /// Fills a forward or declared slot of the same name. A second definition
    /// is a `DuplicateName` error, a definition that disagrees with an earlier
    /// declaration is a `Type` error.
    pub fn register(&mut self, def: FunctionDef) -> Result<FunctionId, Diagnostic> {
        if let Some(&id) = self.index.get(&def.name) {
            let entry = &self.entries[id.0 as usize];
            if let Some(existing) = &entry.definition {
                return Err(Diagnostic::new(
                    DiagnosticKind::DuplicateName,
                    &def.name,
                    def.span,
                    format!(
                        "function `{}` is already defined at {}",
                        def.name, existing.span
                    ),
                ));
            }
            if let Some(declared) = &entry.declared {
                let actual = def.signature();
                if *declared != actual {
                    return Err(Diagnostic::new(
                        DiagnosticKind::Type,
                        &def.name,
                        def.span,
                        format!(
                            "definition of `{}` has signature {actual} but was declared as {declared}",
                            def.name
                        ),
                    ));
                }
            }
        }
        let id = self.slot(&def.name);
        self.entries[id.0 as usize].definition = Some(def);
        Ok(id)
    }

    /// Declare a signature ahead of the definition.
    pub fn declare(&mut self, name: &str, signature: Signature) -> Result<FunctionId, Diagnostic> {
        if let Some(existing) = self.lookup(name).map(|(_, sig)| sig) {
            if existing != signature {
                return Err(Diagnostic::new(
                    DiagnosticKind::Type,
                    name,
                    Span::default(),
                    format!("`{name}` is declared as {signature} but already has signature {existing}"),
                ));
            }
        }
        let id = self.slot(name);
        self.entries[id.0 as usize].declared = Some(signature);
        Ok(id)
    }

    /// Resolve a name to its id, allocating a forward slot if it is unseen.
    pub fn resolve(&mut self, name: &str) -> FunctionId {
        self.slot(name)
    }

    /// Look up a name with a known signature.
    pub fn lookup(&self, name: &str) -> Option<(FunctionId, Signature)> {
        let id = *self.index.get(name)?;
        let sig = self.entries[id.0 as usize].signature()?;
        Some((id, sig))
    }

    /// Check whether a name has any slot, even a forward one.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Name of a slot.
    pub fn name(&self, id: FunctionId) -> Option<&str> {
        self.entries.get(id.0 as usize).map(|e| e.name.as_str())
    }

    /// Defined functions in id order.
    pub fn definitions(&self) -> impl Iterator<Item = (FunctionId, &FunctionDef)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            e.definition
                .as_ref()
                .map(|def| (FunctionId(i as u32), def))
        })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no name was ever mentioned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// End registration: report every slot that never received a definition.
    pub fn close(&self) -> Vec<Diagnostic> {
        self.entries
            .iter()
            .filter(|e| e.definition.is_none())
            .map(|e| {
                let message = if e.declared.is_some() {
                    format!("function `{}` is declared but never defined", e.name)
                } else {
                    format!("function `{}` is referenced but never defined", e.name)
                };
                Diagnostic::new(DiagnosticKind::UnboundName, &e.name, Span::default(), message)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Stmt};
    use qflow_ir::Type;

    fn is_even() -> FunctionDef {
        FunctionDef::new("is_even")
            .param("n", Type::Int)
            .returns(Type::Bool)
            .body(vec![Stmt::ret(Expr::bool(true))])
    }

    #[test]
    fn test_forward_reference_keeps_id() {
        let mut reg = Registry::new();
        let odd = reg.resolve("is_odd");
        let even = reg.register(is_even()).unwrap();
        let odd_def = FunctionDef::new("is_odd")
            .param("n", Type::Int)
            .returns(Type::Bool)
            .body(vec![Stmt::ret(Expr::bool(false))]);
        assert_eq!(reg.register(odd_def).unwrap(), odd);
        assert_eq!(odd, FunctionId(0));
        assert_eq!(even, FunctionId(1));
        assert!(reg.close().is_empty());

        let order: Vec<_> = reg.definitions().map(|(_, d)| d.name.as_str()).collect();
        assert_eq!(order, ["is_odd", "is_even"]);
    }

    #[test]
    fn test_duplicate_definition() {
        let mut reg = Registry::new();
        reg.register(is_even().at(1, 1)).unwrap();
        let err = reg.register(is_even().at(9, 1)).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::DuplicateName);
        assert!(err.message.contains("already defined at 1:1"));
    }

    #[test]
    fn test_declaration_must_match_definition() {
        let mut reg = Registry::new();
        reg.declare("is_even", Signature::new(vec![Type::Int], vec![Type::Int]))
            .unwrap();
        let err = reg.register(is_even()).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Type);
        assert!(err.message.contains("declared as (int) -> int"));
    }

    #[test]
    fn test_close_reports_missing_definitions() {
        let mut reg = Registry::new();
        reg.resolve("ghost");
        reg.declare("later", Signature::new(vec![], vec![])).unwrap();
        let diags = reg.close();
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.kind == DiagnosticKind::UnboundName));
        assert!(diags[1].message.contains("declared but never defined"));
        assert!(reg.lookup("ghost").is_none());
        assert!(reg.lookup("later").is_some());
    }
}
