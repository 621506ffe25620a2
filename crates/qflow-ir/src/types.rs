//! Value types carried by ports and edges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The static type of a value.
///
/// `Qubit` is the only linear type: a qubit value must be consumed exactly
/// once. Every other type is classical and may be copied freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    /// Boolean value (measurement outcomes, conditions).
    Bool,
    /// Signed integer.
    Int,
    /// Double precision float.
    Float,
    /// Rotation angle. Distinct from `Float` and never coerced to or from it.
    Angle,
    /// Handle to one unit of quantum state.
    Qubit,
    /// Multi-value result. The empty tuple is the unit type.
    Tuple(Vec<Type>),
}

impl Type {
    /// The unit type (no value).
    pub fn unit() -> Self {
        Type::Tuple(vec![])
    }

    /// Build the result type of a function from its declared return list.
    ///
    /// Zero returns give the unit type, one return gives that type and more
    /// than one give a tuple.
    pub fn from_returns(returns: &[Type]) -> Self {
        match returns {
            [single] => single.clone(),
            many => Type::Tuple(many.to_vec()),
        }
    }

    /// Check if this is the unit type.
    #[inline]
    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Tuple(items) if items.is_empty())
    }

    /// Check if values of this type are linear resources.
    #[inline]
    pub fn is_linear(&self) -> bool {
        match self {
            Type::Qubit => true,
            Type::Tuple(items) => items.iter().any(Type::is_linear),
            _ => false,
        }
    }

    /// Check if this type is numeric (`int`, `float` or `angle`).
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Angle)
    }

    /// Check if this is a single (non-tuple) value type.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Type::Tuple(_))
    }

    /// The value kind of a scalar type.
    pub fn kind(&self) -> ValueKind {
        if matches!(self, Type::Qubit) {
            ValueKind::Quantum
        } else {
            ValueKind::Classical
        }
    }

    /// Flatten tuples into the sequence of scalar types they carry.
    pub fn flatten(&self) -> Vec<Type> {
        let mut out = vec![];
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Type>) {
        match self {
            Type::Tuple(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            scalar => out.push(scalar.clone()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Angle => write!(f, "angle"),
            Type::Qubit => write!(f, "qubit"),
            Type::Tuple(items) if items.is_empty() => write!(f, "none"),
            Type::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Coarse classification of a value: quantum resource or classical data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// A linear quantum resource transfer.
    Quantum,
    /// A copyable classical value.
    Classical,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Quantum => write!(f, "quantum"),
            ValueKind::Classical => write!(f, "classical"),
        }
    }
}

/// A constant value embedded in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Literal {
    /// Boolean constant.
    Bool(bool),
    /// Integer constant.
    Int(i64),
    /// Float constant.
    Float(f64),
    /// Angle constant, in radians.
    Angle(f64),
}

impl Literal {
    /// The type of this constant.
    pub fn ty(&self) -> Type {
        match self {
            Literal::Bool(_) => Type::Bool,
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::Angle(_) => Type::Angle,
        }
    }

    /// The constant as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::Bool(b) => serde_json::Value::from(*b),
            Literal::Int(i) => serde_json::Value::from(*i),
            Literal::Float(v) | Literal::Angle(v) => serde_json::Value::from(*v),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Angle(v) => write!(f, "angle({v:?})"),
        }
    }
}
