//! Function descriptors: the statement trees the front end consumes.
//!
//! Descriptors are produced by a host reflection or parsing layer. They are
//! plain serde data, so a module can also be supplied as a JSON or YAML
//! document (see [`ModuleSource`]).

use serde::{Deserialize, Serialize};
use std::fmt;

use qflow_ir::Type;

use crate::error::{CompileError, CompileResult};

/// Source location of a statement or expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// 1-based line, 0 when unknown.
    pub line: u32,
    /// 1-based column, 0 when unknown.
    pub col: u32,
}

impl Span {
    /// Create a span.
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnOp {
    /// Boolean negation.
    Not,
    /// Arithmetic negation.
    Neg,
}

impl UnOp {
    /// Operator name, used as the graph op name.
    pub fn name(self) -> &'static str {
        match self {
            UnOp::Not => "not",
            UnOp::Neg => "neg",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Operator name, used as the graph op name.
    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// What the expression computes.
    #[serde(flatten)]
    pub kind: ExprKind,
    /// Where it appears.
    #[serde(default)]
    pub span: Span,
}

/// Expression forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    /// Variable reference.
    Var { name: String },
    /// Boolean literal.
    Bool { value: bool },
    /// Integer literal.
    Int { value: i64 },
    /// Float literal.
    Float { value: f64 },
    /// Angle literal, in radians.
    Angle { value: f64 },
    /// Host value injected with a statically declared type.
    Lift {
        source: String,
        value: f64,
        #[serde(rename = "type")]
        ty: Type,
    },
    /// Call of an operation or a registered function.
    Call {
        func: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// Unary operator.
    Unary { op: UnOp, operand: Box<Expr> },
    /// Binary operator.
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Tuple of values.
    Tuple { items: Vec<Expr> },
}

impl Expr {
    /// Create an expression with an unknown location.
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }

    /// Attach a source location.
    #[must_use]
    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.span = Span::new(line, col);
        self
    }

    /// Variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Var { name: name.into() })
    }

    /// Boolean literal.
    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Bool { value })
    }

    /// Integer literal.
    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int { value })
    }

    /// Float literal.
    pub fn float(value: f64) -> Self {
        Self::new(ExprKind::Float { value })
    }

    /// Angle literal.
    pub fn angle(value: f64) -> Self {
        Self::new(ExprKind::Angle { value })
    }

    /// Lifted host value.
    pub fn lift(source: impl Into<String>, value: f64, ty: Type) -> Self {
        Self::new(ExprKind::Lift {
            source: source.into(),
            value,
            ty,
        })
    }

    /// Call expression.
    pub fn call(func: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::new(ExprKind::Call {
            func: func.into(),
            args: args.into_iter().collect(),
        })
    }

    /// Boolean negation.
    pub fn not(operand: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op: UnOp::Not,
            operand: Box::new(operand),
        })
    }

    /// Arithmetic negation.
    pub fn neg(operand: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op: UnOp::Neg,
            operand: Box::new(operand),
        })
    }

    /// Binary operator application.
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// Tuple expression.
    pub fn tuple(items: impl IntoIterator<Item = Expr>) -> Self {
        Self::new(ExprKind::Tuple {
            items: items.into_iter().collect(),
        })
    }

    /// Check if this is the literal `true`.
    pub fn is_true_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Bool { value: true })
    }
}

/// A statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    /// What the statement does.
    #[serde(flatten)]
    pub kind: StmtKind,
    /// Where it appears.
    #[serde(default)]
    pub span: Span,
}

/// Statement forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StmtKind {
    /// `a = e` or `a, b = e`.
    Assign { targets: Vec<String>, value: Expr },
    /// Expression evaluated for its effect.
    Expr { value: Expr },
    /// Conditional with an optional else arm.
    If {
        cond: Expr,
        #[serde(rename = "then")]
        then_body: Vec<Stmt>,
        #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
        else_body: Option<Vec<Stmt>>,
    },
    /// `while cond: body`.
    While { cond: Expr, body: Vec<Stmt> },
    /// `for var in range(count): body`.
    For {
        var: String,
        count: Expr,
        body: Vec<Stmt>,
    },
    /// Leave the innermost loop.
    Break,
    /// Start the next iteration of the innermost loop.
    Continue,
    /// Return from the function.
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
    },
}

impl Stmt {
    /// Create a statement with an unknown location.
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }

    /// Attach a source location.
    #[must_use]
    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.span = Span::new(line, col);
        self
    }

    /// `target = value`.
    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Self::new(StmtKind::Assign {
            targets: vec![target.into()],
            value,
        })
    }

    /// `t0, t1, ... = value`.
    pub fn unpack<S: Into<String>>(targets: impl IntoIterator<Item = S>, value: Expr) -> Self {
        Self::new(StmtKind::Assign {
            targets: targets.into_iter().map(Into::into).collect(),
            value,
        })
    }

    /// Expression statement.
    pub fn expr(value: Expr) -> Self {
        Self::new(StmtKind::Expr { value })
    }

    /// `if cond: then_body`.
    pub fn if_then(cond: Expr, then_body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::If {
            cond,
            then_body,
            else_body: None,
        })
    }

    /// `if cond: then_body else: else_body`.
    pub fn if_else(cond: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::If {
            cond,
            then_body,
            else_body: Some(else_body),
        })
    }

    /// `while cond: body`.
    pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::While { cond, body })
    }

    /// `for var in range(count): body`.
    pub fn for_range(var: impl Into<String>, count: Expr, body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::For {
            var: var.into(),
            count,
            body,
        })
    }

    /// `break`.
    pub fn break_loop() -> Self {
        Self::new(StmtKind::Break)
    }

    /// `continue`.
    pub fn continue_loop() -> Self {
        Self::new(StmtKind::Continue)
    }

    /// `return value`.
    pub fn ret(value: Expr) -> Self {
        Self::new(StmtKind::Return { value: Some(value) })
    }

    /// Bare `return`.
    pub fn ret_none() -> Self {
        Self::new(StmtKind::Return { value: None })
    }
}

/// A typed function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    #[serde(rename = "type")]
    pub ty: Type,
}

/// Parameter and return types of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Parameter types in order.
    pub params: Vec<Type>,
    /// Declared return types. Empty for none, several for a multi-value return.
    pub returns: Vec<Type>,
}

impl Signature {
    /// Create a signature.
    pub fn new(params: Vec<Type>, returns: Vec<Type>) -> Self {
        Self { params, returns }
    }

    /// Type of a call expression with this signature.
    pub fn result_type(&self) -> Type {
        Type::from_returns(&self.returns)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, ty) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        write!(f, ") -> {}", self.result_type())
    }
}

/// A function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    /// Function name, unique within its module.
    pub name: String,
    /// Ordered parameters.
    #[serde(default)]
    pub params: Vec<Param>,
    /// Declared return types.
    #[serde(default)]
    pub returns: Vec<Type>,
    /// Body statements.
    pub body: Vec<Stmt>,
    /// Location of the definition.
    #[serde(default)]
    pub span: Span,
}

impl FunctionDef {
    /// Start a definition with no parameters, no returns and an empty body.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: vec![],
            returns: vec![],
            body: vec![],
            span: Span::default(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
        });
        self
    }

    /// Add a return type.
    #[must_use]
    pub fn returns(mut self, ty: Type) -> Self {
        self.returns.push(ty);
        self
    }

    /// Set the body.
    #[must_use]
    pub fn body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }

    /// Attach a source location.
    #[must_use]
    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.span = Span::new(line, col);
        self
    }

    /// The function's signature.
    pub fn signature(&self) -> Signature {
        Signature {
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            returns: self.returns.clone(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["quantum".to_string(), "angles".to_string()]
}

/// A whole module as supplied by a host layer or a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSource {
    /// Module name.
    pub name: String,
    /// Extensions to load before compiling.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Function definitions in definition order.
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
}

impl ModuleSource {
    /// Parse a JSON module document.
    pub fn from_json(source: &str) -> CompileResult<Self> {
        serde_json::from_str(source).map_err(|e| CompileError::Source(e.to_string()))
    }

    /// Parse a YAML module document.
    pub fn from_yaml(source: &str) -> CompileResult<Self> {
        serde_yaml_ng::from_str(source).map_err(|e| CompileError::Source(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_display() {
        let def = FunctionDef::new("rx")
            .param("q", Type::Qubit)
            .param("a", Type::Angle)
            .returns(Type::Qubit);
        assert_eq!(def.signature().to_string(), "(qubit, angle) -> qubit");
        assert_eq!(
            FunctionDef::new("main").signature().to_string(),
            "() -> none"
        );
    }

    #[test]
    fn test_expr_json_shape() {
        let expr = Expr::call("rz", [Expr::var("q"), Expr::angle(1.5)]).at(3, 7);
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["kind"], "call");
        assert_eq!(json["func"], "rz");
        assert_eq!(json["args"][1]["kind"], "angle");
        assert_eq!(json["span"]["line"], 3);
        let back: Expr = serde_json::from_value(json).unwrap();
        assert_eq!(back, expr);
    }

    #[test]
    fn test_module_from_json_defaults() {
        let src = r#"{
            "name": "demo",
            "functions": [{
                "name": "main",
                "returns": ["bool"],
                "body": [
                    {"kind": "assign", "targets": ["q"],
                     "value": {"kind": "call", "func": "qubit"}},
                    {"kind": "return",
                     "value": {"kind": "call", "func": "measure",
                               "args": [{"kind": "var", "name": "q"}]}}
                ]
            }]
        }"#;
        let module = ModuleSource::from_json(src).unwrap();
        assert_eq!(module.extensions, vec!["quantum", "angles"]);
        let main = &module.functions[0];
        assert_eq!(main.returns, vec![Type::Bool]);
        assert!(matches!(main.body[1].kind, StmtKind::Return { value: Some(_) }));
    }

    #[test]
    fn test_module_from_yaml() {
        let src = r"
name: flags
extensions: [quantum]
functions:
  - name: flip
    params:
      - { name: b, type: bool }
    returns: [bool]
    body:
      - kind: if
        cond: { kind: var, name: b }
        then:
          - kind: return
            value: { kind: bool, value: false }
      - kind: return
        value: { kind: bool, value: true }
";
        let module = ModuleSource::from_yaml(src).unwrap();
        assert_eq!(module.extensions, vec!["quantum"]);
        let flip = &module.functions[0];
        assert_eq!(flip.params[0].ty, Type::Bool);
        match &flip.body[0].kind {
            StmtKind::If { else_body, .. } => assert!(else_body.is_none()),
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_source_is_reported() {
        let err = ModuleSource::from_json("{\"functions\": 3}").unwrap_err();
        assert!(matches!(err, CompileError::Source(_)));
    }
}
