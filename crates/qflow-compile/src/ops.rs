//! Operation signatures and extension loading.
//!
//! Primitive operations are not part of the language: they come from
//! extensions loaded into an [`OpTable`] before compilation. Each operation
//! has a fixed signature and a class that decides which graph node it lowers
//! to.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use qflow_ir::{NodeKind, Type};

use crate::error::{CompileError, CompileResult};

/// How an operation treats quantum resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpClass {
    /// Introduces fresh qubits.
    Alloc,
    /// Consumes qubits and re-emits the same number.
    Gate,
    /// Consumes qubits and emits classical outcomes.
    Measure,
    /// Consumes qubits and emits nothing.
    Discard,
    /// Classical conversion.
    Convert,
}

/// Signature of a primitive operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpSignature {
    /// Operation name as written in calls.
    pub name: String,
    /// Operation class.
    pub class: OpClass,
    /// Input types in order.
    #[serde(default)]
    pub inputs: Vec<Type>,
    /// Output types in order.
    #[serde(default)]
    pub outputs: Vec<Type>,
}

impl OpSignature {
    /// Create a signature.
    pub fn new(name: &str, class: OpClass, inputs: Vec<Type>, outputs: Vec<Type>) -> Self {
        Self {
            name: name.to_string(),
            class,
            inputs,
            outputs,
        }
    }

    /// Type of a call expression applying this operation.
    pub fn result_type(&self) -> Type {
        Type::from_returns(&self.outputs)
    }

    /// Graph node kind the operation lowers to.
    pub fn node_kind(&self) -> NodeKind {
        let op = self.name.clone();
        match self.class {
            OpClass::Alloc => NodeKind::Alloc { op },
            OpClass::Gate => NodeKind::Gate { op },
            OpClass::Measure => NodeKind::Measure { op },
            OpClass::Discard => NodeKind::Discard { op },
            OpClass::Convert => NodeKind::Op { op },
        }
    }

    /// Check that the types agree with the class.
    pub fn validate(&self) -> Result<(), String> {
        let qubits = |types: &[Type]| types.iter().filter(|t| **t == Type::Qubit).count();
        if let Some(bad) = self
            .inputs
            .iter()
            .chain(&self.outputs)
            .find(|t| !t.is_scalar())
        {
            return Err(format!("'{}' uses non-scalar type {bad}", self.name));
        }
        let (qin, qout) = (qubits(&self.inputs), qubits(&self.outputs));
        let ok = match self.class {
            OpClass::Alloc => qin == 0 && qout > 0 && qout == self.outputs.len(),
            OpClass::Gate => qin > 0 && qin == qout && qout == self.outputs.len(),
            OpClass::Measure => qin > 0 && qout == 0 && !self.outputs.is_empty(),
            OpClass::Discard => qin > 0 && self.outputs.is_empty(),
            OpClass::Convert => qin == 0 && qout == 0 && !self.outputs.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "'{}' has types that do not fit class {:?}",
                self.name, self.class
            ))
        }
    }
}

/// A named bundle of operation signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// Extension name.
    pub name: String,
    /// Operations it provides.
    pub ops: Vec<OpSignature>,
}

impl Extension {
    /// The quantum extension: allocation, gates, measurement and discard.
    pub fn quantum() -> Self {
        use OpClass::{Alloc, Discard, Gate, Measure};
        use Type::{Angle, Bool, Qubit};

        let mut ops = vec![OpSignature::new("qubit", Alloc, vec![], vec![Qubit])];
        for name in ["h", "x", "y", "z", "s", "sdg", "t", "tdg", "reset"] {
            ops.push(OpSignature::new(name, Gate, vec![Qubit], vec![Qubit]));
        }
        for name in ["rx", "ry", "rz"] {
            ops.push(OpSignature::new(name, Gate, vec![Qubit, Angle], vec![Qubit]));
        }
        for name in ["cx", "cy", "cz", "swap"] {
            ops.push(OpSignature::new(
                name,
                Gate,
                vec![Qubit, Qubit],
                vec![Qubit, Qubit],
            ));
        }
        ops.push(OpSignature::new(
            "ccx",
            Gate,
            vec![Qubit, Qubit, Qubit],
            vec![Qubit, Qubit, Qubit],
        ));
        ops.push(OpSignature::new("measure", Measure, vec![Qubit], vec![Bool]));
        ops.push(OpSignature::new("discard", Discard, vec![Qubit], vec![]));

        Self {
            name: "quantum".into(),
            ops,
        }
    }

    /// The angles extension: conversions between `float` and `angle`, and
    /// angle arithmetic.
    ///
    /// Angles are turns modulo one. `atrunc` rounds to the given number of
    /// binary digits; `afromrad` and `atorad` convert from and to radians.
    pub fn angles() -> Self {
        use OpClass::Convert;
        use Type::{Angle, Bool, Float, Int};

        let ops = vec![
            OpSignature::new("angle", Convert, vec![Float], vec![Angle]),
            OpSignature::new("float", Convert, vec![Angle], vec![Float]),
            OpSignature::new("afromrad", Convert, vec![Float], vec![Angle]),
            OpSignature::new("atorad", Convert, vec![Angle], vec![Float]),
            OpSignature::new("aadd", Convert, vec![Angle, Angle], vec![Angle]),
            OpSignature::new("asub", Convert, vec![Angle, Angle], vec![Angle]),
            OpSignature::new("aneg", Convert, vec![Angle], vec![Angle]),
            OpSignature::new("amul", Convert, vec![Angle, Int], vec![Angle]),
            OpSignature::new("adiv", Convert, vec![Angle, Int], vec![Angle]),
            OpSignature::new("atrunc", Convert, vec![Angle, Int], vec![Angle]),
            OpSignature::new("aeq", Convert, vec![Angle, Angle], vec![Bool]),
        ];
        Self {
            name: "angles".into(),
            ops,
        }
    }

    /// Look up a built-in extension by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "quantum" => Some(Self::quantum()),
            "angles" => Some(Self::angles()),
            _ => None,
        }
    }

    /// Parse an extension document and validate its signatures.
    pub fn from_json(source: &str) -> CompileResult<Self> {
        let ext: Self = serde_json::from_str(source)
            .map_err(|e| CompileError::InvalidExtension(e.to_string()))?;
        for op in &ext.ops {
            op.validate().map_err(CompileError::InvalidExtension)?;
        }
        Ok(ext)
    }
}

/// Table of loaded operation signatures.
///
/// Populated before compilation and only read afterwards, so it can be shared
/// between worker threads.
#[derive(Debug, Clone, Default)]
pub struct OpTable {
    ops: Vec<(OpSignature, String)>,
    index: FxHashMap<String, usize>,
    extensions: Vec<String>,
}

impl OpTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the built-in `quantum` and `angles` extensions.
    pub fn with_prelude() -> Self {
        let mut table = Self::new();
        for ext in [Extension::quantum(), Extension::angles()] {
            // The built-in extensions share no operation names.
            let _ = table.load(&ext);
        }
        table
    }

    /// Load an extension.
    ///
    /// Redefining an operation with an identical signature is accepted; a
    /// different signature under the same name is an error and leaves the
    /// table unchanged.
    pub fn load(&mut self, ext: &Extension) -> CompileResult<()> {
        for op in &ext.ops {
            if let Some(&i) = self.index.get(&op.name) {
                let (existing, owner) = &self.ops[i];
                if existing != op {
                    return Err(CompileError::ExtensionConflict {
                        name: op.name.clone(),
                        first: owner.clone(),
                        second: ext.name.clone(),
                    });
                }
            }
        }
        for op in &ext.ops {
            if !self.index.contains_key(&op.name) {
                self.index.insert(op.name.clone(), self.ops.len());
                self.ops.push((op.clone(), ext.name.clone()));
            }
        }
        if !self.extensions.contains(&ext.name) {
            self.extensions.push(ext.name.clone());
        }
        debug!("Loaded extension {} ({} ops)", ext.name, ext.ops.len());
        Ok(())
    }

    /// Look up an operation.
    pub fn get(&self, name: &str) -> Option<&OpSignature> {
        self.index.get(name).map(|&i| &self.ops[i].0)
    }

    /// Iterate over operations in load order, with their extension name.
    pub fn iter(&self) -> impl Iterator<Item = (&OpSignature, &str)> {
        self.ops.iter().map(|(op, ext)| (op, ext.as_str()))
    }

    /// Names of loaded extensions in load order.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if no operations are loaded.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
