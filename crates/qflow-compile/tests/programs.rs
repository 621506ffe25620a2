//! End-to-end compilation of complete programs.
//!
//! Each test registers a module, compiles it, and inspects either the
//! emitted graph or the diagnostics.

use qflow_compile::{
    BinOp, CompileOptions, CompiledProgram, Diagnostic, DiagnosticKind, Expr, FunctionDef, Module,
    Stmt, serialize,
};
use qflow_ir::{NodeKind, Port, Type, ValueKind};

/// Helper: compile a list of definitions with the prelude loaded.
fn compile(defs: Vec<FunctionDef>) -> CompiledProgram {
    let mut module = Module::with_prelude("test");
    for def in defs {
        module.register(def).unwrap();
    }
    module.compile(&CompileOptions::default()).unwrap()
}

/// Helper: compile and return the diagnostics of the failed compilation.
fn diagnostics(defs: Vec<FunctionDef>) -> Vec<Diagnostic> {
    let mut module = Module::with_prelude("test");
    for def in defs {
        let _ = module.register(def);
    }
    let err = module.compile(&CompileOptions::default()).unwrap_err();
    err.diagnostics()
        .expect("compilation should fail with diagnostics")
        .iter()
        .cloned()
        .collect()
}

/// Helper: kinds of a diagnostic list.
fn kinds(diagnostics: &[Diagnostic]) -> Vec<DiagnosticKind> {
    diagnostics.iter().map(|d| d.kind).collect()
}

/// Helper: nodes of a given kind name.
fn nodes_of<'a>(program: &'a CompiledProgram, kind: &str) -> Vec<&'a qflow_ir::Node> {
    program
        .graph()
        .nodes()
        .filter(|(_, n)| n.kind.name() == kind)
        .map(|(_, n)| n)
        .collect()
}

fn quantum(ports: &[Port]) -> usize {
    ports.iter().filter(|p| p.kind() == ValueKind::Quantum).count()
}

fn rx() -> FunctionDef {
    FunctionDef::new("rx")
        .param("q", Type::Qubit)
        .param("a", Type::Angle)
        .returns(Type::Qubit)
        .body(vec![
            Stmt::assign("q", Expr::call("h", [Expr::var("q")])),
            Stmt::assign("q", Expr::call("rz", [Expr::var("q"), Expr::var("a")])),
            Stmt::ret(Expr::call("h", [Expr::var("q")])),
        ])
}

fn teleport() -> FunctionDef {
    FunctionDef::new("teleport")
        .param("psi", Type::Qubit)
        .returns(Type::Qubit)
        .body(vec![
            Stmt::assign("a", Expr::call("qubit", [])),
            Stmt::assign("b", Expr::call("qubit", [])),
            Stmt::assign("a", Expr::call("h", [Expr::var("a")])),
            Stmt::unpack(["a", "b"], Expr::call("cx", [Expr::var("a"), Expr::var("b")])),
            Stmt::unpack(
                ["psi", "a"],
                Expr::call("cx", [Expr::var("psi"), Expr::var("a")]),
            ),
            Stmt::assign("psi", Expr::call("h", [Expr::var("psi")])),
            Stmt::assign("m1", Expr::call("measure", [Expr::var("psi")])),
            Stmt::assign("m2", Expr::call("measure", [Expr::var("a")])),
            Stmt::if_then(
                Expr::var("m2"),
                vec![Stmt::assign("b", Expr::call("x", [Expr::var("b")]))],
            ),
            Stmt::if_then(
                Expr::var("m1"),
                vec![Stmt::assign("b", Expr::call("z", [Expr::var("b")]))],
            ),
            Stmt::ret(Expr::var("b")),
        ])
}

/// Repeat-until-success: retry with a fresh ancilla until it measures true.
fn repeat_until_success() -> FunctionDef {
    FunctionDef::new("rus")
        .param("q", Type::Qubit)
        .returns(Type::Qubit)
        .body(vec![
            Stmt::while_loop(
                Expr::bool(true),
                vec![
                    Stmt::assign("a", Expr::call("h", [Expr::call("qubit", [])])),
                    Stmt::unpack(["a", "q"], Expr::call("cx", [Expr::var("a"), Expr::var("q")])),
                    Stmt::assign("a", Expr::call("t", [Expr::var("a")])),
                    Stmt::if_then(
                        Expr::call("measure", [Expr::var("a")]),
                        vec![Stmt::break_loop()],
                    ),
                    Stmt::assign("q", Expr::call("z", [Expr::var("q")])),
                ],
            ),
            Stmt::ret(Expr::var("q")),
        ])
}

/// Bounded repeat-until-success: a failed first stage discards its ancilla
/// and retries, a successful second stage breaks out.
fn bounded_retry() -> FunctionDef {
    FunctionDef::new("rus")
        .param("q", Type::Qubit)
        .param("tries", Type::Int)
        .returns(Type::Qubit)
        .body(vec![
            Stmt::for_range(
                "_",
                Expr::var("tries"),
                vec![
                    Stmt::assign("a", Expr::call("h", [Expr::call("qubit", [])])),
                    Stmt::assign("b", Expr::call("h", [Expr::call("qubit", [])])),
                    Stmt::unpack(
                        ["b", "a"],
                        Expr::call("cx", [Expr::var("b"), Expr::call("tdg", [Expr::var("a")])]),
                    ),
                    Stmt::if_then(
                        Expr::not(Expr::call("measure", [Expr::call("t", [Expr::var("a")])])),
                        vec![
                            Stmt::expr(Expr::call("discard", [Expr::var("b")])),
                            Stmt::continue_loop(),
                        ],
                    ),
                    Stmt::unpack(
                        ["q", "b"],
                        Expr::call(
                            "cx",
                            [
                                Expr::call("z", [Expr::call("t", [Expr::var("q")])]),
                                Expr::var("b"),
                            ],
                        ),
                    ),
                    Stmt::if_then(
                        Expr::call("measure", [Expr::call("t", [Expr::var("b")])]),
                        vec![Stmt::break_loop()],
                    ),
                    Stmt::assign("q", Expr::call("x", [Expr::var("q")])),
                ],
            ),
            Stmt::ret(Expr::var("q")),
        ])
}

fn parity(name: &str, other: &str, base: bool) -> FunctionDef {
    FunctionDef::new(name)
        .param("n", Type::Int)
        .returns(Type::Bool)
        .body(vec![
            Stmt::if_then(
                Expr::binary(BinOp::Eq, Expr::var("n"), Expr::int(0)),
                vec![Stmt::ret(Expr::bool(base))],
            ),
            Stmt::ret(Expr::call(
                other,
                [Expr::binary(BinOp::Sub, Expr::var("n"), Expr::int(1))],
            )),
        ])
}

// ============================================================================
// Programs that compile
// ============================================================================

#[test]
fn test_rx_lowers_to_gate_chain() {
    let program = compile(vec![rx()]);
    let doc = serialize(&program).unwrap();

    assert_eq!(doc.count_kind("gate"), 3);
    let root = &doc.regions[0];
    assert_eq!(quantum(&root.boundary_in), 1);
    assert_eq!(quantum(&root.boundary_out), 1);

    let gates: Vec<_> = nodes_of(&program, "gate")
        .iter()
        .filter_map(|n| n.op_name())
        .collect();
    assert_eq!(gates, ["h", "rz", "h"]);
}

#[test]
fn test_teleport_corrections_unify() {
    let program = compile(vec![teleport()]);
    let doc = serialize(&program).unwrap();

    assert_eq!(doc.count_kind("alloc"), 2);
    assert_eq!(doc.count_kind("measure"), 2);
    assert_eq!(doc.count_kind("branch"), 2);

    for branch in nodes_of(&program, "branch") {
        assert_eq!(branch.outputs, vec![Port::labelled(Type::Qubit, "b")]);
    }
}

#[test]
fn test_repeat_until_success_threads_one_handle() {
    let program = compile(vec![repeat_until_success()]);
    let carried = vec![Port::labelled(Type::Qubit, "q")];

    let loops = nodes_of(&program, "loop");
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].inputs, carried);
    assert_eq!(loops[0].outputs, carried);
    for kind in ["break", "continue"] {
        let jumps = nodes_of(&program, kind);
        assert_eq!(jumps.len(), 1, "{kind}");
        assert_eq!(jumps[0].inputs, carried, "{kind}");
    }
}

#[test]
fn test_mutual_recursion_through_forward_references() {
    let program = compile(vec![
        parity("is_even", "is_odd", true),
        parity("is_odd", "is_even", false),
    ]);
    let even = program.function("is_even").unwrap();
    let odd = program.function("is_odd").unwrap();

    let targets: Vec<_> = nodes_of(&program, "call")
        .iter()
        .map(|n| match &n.kind {
            NodeKind::Call {
                callee,
                callee_node,
                callee_region,
                ..
            } => (callee.clone(), *callee_node, *callee_region),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(
        targets,
        [
            ("is_odd".to_string(), Some(odd.node), Some(odd.region)),
            ("is_even".to_string(), Some(even.node), Some(even.region)),
        ]
    );
}

#[test]
fn test_for_loop_with_lifted_angle() {
    let program = compile(vec![
        FunctionDef::new("rotate")
            .param("q", Type::Qubit)
            .param("n", Type::Int)
            .returns(Type::Qubit)
            .body(vec![
                Stmt::assign("theta", Expr::lift("theta", 0.25, Type::Angle)),
                Stmt::for_range(
                    "i",
                    Expr::var("n"),
                    vec![Stmt::assign(
                        "q",
                        Expr::call("rz", [Expr::var("q"), Expr::var("theta")]),
                    )],
                ),
                Stmt::ret(Expr::var("q")),
            ]),
    ]);
    let doc = serialize(&program).unwrap();
    assert_eq!(doc.count_kind("lift"), 1);
    assert_eq!(doc.count_kind("loop"), 1);
    assert_eq!(doc.count_kind("gate"), 1);
}

#[test]
fn test_bounded_retry_threads_counter_and_handle() {
    let program = compile(vec![bounded_retry()]);
    let carried = vec![
        Port::labelled(Type::Int, "%count.0"),
        Port::labelled(Type::Int, "%iter.0"),
        Port::labelled(Type::Qubit, "q"),
    ];

    let loops = nodes_of(&program, "loop");
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].inputs, carried);
    assert_eq!(loops[0].outputs, carried);
    // The exit arm of the loop test plus the explicit `break`, and the
    // explicit `continue` plus the end of the body.
    for kind in ["break", "continue"] {
        let jumps = nodes_of(&program, kind);
        assert_eq!(jumps.len(), 2, "{kind}");
        for jump in jumps {
            assert_eq!(jump.inputs, carried, "{kind}");
            assert_eq!(jump.outputs, carried, "{kind}");
        }
    }
    assert_eq!(nodes_of(&program, "discard").len(), 1);
    assert_eq!(nodes_of(&program, "measure").len(), 2);
}

#[test]
fn test_nested_for_loops() {
    let program = compile(vec![
        FunctionDef::new("grid")
            .param("q", Type::Qubit)
            .param("n", Type::Int)
            .returns(Type::Qubit)
            .body(vec![
                Stmt::for_range(
                    "i",
                    Expr::var("n"),
                    vec![Stmt::for_range(
                        "j",
                        Expr::var("n"),
                        vec![Stmt::assign("q", Expr::call("h", [Expr::var("q")]))],
                    )],
                ),
                Stmt::ret(Expr::var("q")),
            ]),
    ]);
    program.graph().validate().unwrap();

    let loops = nodes_of(&program, "loop");
    assert_eq!(loops.len(), 2);
    for node in &loops {
        assert_eq!(quantum(&node.inputs), 1);
        assert_eq!(node.inputs, node.outputs);
    }
    assert_eq!(nodes_of(&program, "break").len(), 2);
    assert_eq!(nodes_of(&program, "continue").len(), 2);
    assert_eq!(nodes_of(&program, "gate").len(), 1);
}

#[test]
fn test_while_inside_for() {
    let program = compile(vec![
        FunctionDef::new("settle")
            .param("q", Type::Qubit)
            .param("n", Type::Int)
            .returns(Type::Qubit)
            .body(vec![
                Stmt::for_range(
                    "i",
                    Expr::var("n"),
                    vec![
                        Stmt::while_loop(
                            Expr::bool(true),
                            vec![
                                Stmt::assign("a", Expr::call("qubit", [])),
                                Stmt::unpack(
                                    ["q", "a"],
                                    Expr::call("cx", [Expr::var("q"), Expr::var("a")]),
                                ),
                                Stmt::if_then(
                                    Expr::call("measure", [Expr::var("a")]),
                                    vec![Stmt::break_loop()],
                                ),
                            ],
                        ),
                        Stmt::assign("q", Expr::call("t", [Expr::var("q")])),
                    ],
                ),
                Stmt::ret(Expr::var("q")),
            ]),
    ]);
    program.graph().validate().unwrap();

    let mut carried: Vec<_> = nodes_of(&program, "loop")
        .iter()
        .map(|n| n.inputs.len())
        .collect();
    carried.sort_unstable();
    // The inner loop threads only `q`; the outer adds its counter and bound.
    assert_eq!(carried, [1, 3]);
}

#[test]
fn test_angle_arithmetic_lowers_to_ops() {
    let program = compile(vec![
        FunctionDef::new("scaled")
            .param("q", Type::Qubit)
            .param("a", Type::Angle)
            .param("k", Type::Int)
            .returns(Type::Qubit)
            .body(vec![Stmt::ret(Expr::call(
                "rz",
                [
                    Expr::var("q"),
                    Expr::call(
                        "atrunc",
                        [
                            Expr::call("amul", [Expr::var("a"), Expr::var("k")]),
                            Expr::int(8),
                        ],
                    ),
                ],
            ))]),
    ]);
    let ops: Vec<_> = nodes_of(&program, "op")
        .iter()
        .filter_map(|n| n.op_name())
        .collect();
    assert_eq!(ops.len(), 2);
    assert!(ops.contains(&"amul"));
    assert!(ops.contains(&"atrunc"));
}

#[test]
fn test_compile_is_deterministic() {
    let build = || {
        let mut module = Module::with_prelude("det");
        for def in [
            rx(),
            teleport(),
            repeat_until_success(),
            parity("is_even", "is_odd", true),
            parity("is_odd", "is_even", false),
        ] {
            module.register(def).unwrap();
        }
        module
    };
    let first = build().compile(&CompileOptions::default()).unwrap().to_json().unwrap();
    let second = build().compile(&CompileOptions::default()).unwrap().to_json().unwrap();
    let sequential = build()
        .compile(&CompileOptions::default().with_parallel(false))
        .unwrap()
        .to_json()
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first, sequential);
}

// ============================================================================
// Programs that fail
// ============================================================================

#[test]
fn test_double_measure() {
    let found = diagnostics(vec![
        FunctionDef::new("twice")
            .param("q", Type::Qubit)
            .returns(Type::Bool)
            .body(vec![
                Stmt::assign("a", Expr::call("measure", [Expr::var("q")])),
                Stmt::assign("b", Expr::call("measure", [Expr::var("q").at(3, 17)])),
                Stmt::ret(Expr::binary(BinOp::And, Expr::var("a"), Expr::var("b"))),
            ]),
    ]);
    assert_eq!(kinds(&found), [DiagnosticKind::Linearity]);
    assert!(found[0].message.contains("consumed twice"));
    assert_eq!(found[0].span.line, 3);
}

#[test]
fn test_leaked_qubit() {
    let found = diagnostics(vec![
        FunctionDef::new("leak").body(vec![Stmt::assign("q", Expr::call("qubit", []))]),
    ]);
    assert_eq!(kinds(&found), [DiagnosticKind::Linearity]);
    assert!(found[0].message.contains("never consumed"));
}

#[test]
fn test_conditional_discard() {
    let found = diagnostics(vec![
        FunctionDef::new("maybe")
            .param("q", Type::Qubit)
            .param("c", Type::Bool)
            .body(vec![Stmt::if_then(
                Expr::var("c"),
                vec![Stmt::expr(Expr::call("discard", [Expr::var("q")]))],
            )]),
    ]);
    assert!(!found.is_empty());
    assert!(found.iter().all(|d| d.kind == DiagnosticKind::Linearity));
}

#[test]
fn test_discard_in_one_arm_return_in_other() {
    let found = diagnostics(vec![
        FunctionDef::new("split")
            .param("q", Type::Qubit)
            .param("c", Type::Bool)
            .returns(Type::Qubit)
            .body(vec![
                Stmt::if_else(
                    Expr::var("c"),
                    vec![Stmt::expr(Expr::call("discard", [Expr::var("q")]))],
                    vec![Stmt::assign("q", Expr::call("x", [Expr::var("q")]))],
                ),
                Stmt::ret(Expr::var("q")),
            ]),
    ]);
    assert!(!found.is_empty());
    assert!(found.iter().all(|d| d.kind == DiagnosticKind::Linearity));
    assert!(found.iter().any(|d| d.message.contains("`q`")));
}

#[test]
fn test_reserved_name_is_rejected() {
    let found = diagnostics(vec![
        FunctionDef::new("hidden")
            .param("q", Type::Qubit)
            .returns(Type::Qubit)
            .body(vec![
                Stmt::assign("%count.0", Expr::int(3)),
                Stmt::for_range(
                    "i",
                    Expr::var("%count.0"),
                    vec![Stmt::assign("q", Expr::call("h", [Expr::var("q")]))],
                ),
                Stmt::ret(Expr::var("q")),
            ]),
    ]);
    assert_eq!(kinds(&found), [DiagnosticKind::Type]);
    assert!(found[0].message.contains("reserved"));
}

#[test]
fn test_float_is_not_an_angle() {
    let found = diagnostics(vec![
        FunctionDef::new("bad_rz")
            .param("q", Type::Qubit)
            .returns(Type::Qubit)
            .body(vec![Stmt::ret(Expr::call(
                "rz",
                [Expr::var("q"), Expr::float(0.5)],
            ))]),
    ]);
    assert_eq!(kinds(&found), [DiagnosticKind::Type]);
}

#[test]
fn test_duplicate_definition() {
    let found = diagnostics(vec![rx(), rx()]);
    assert_eq!(kinds(&found), [DiagnosticKind::DuplicateName]);
    assert_eq!(found[0].function, "rx");
}

#[test]
fn test_unbound_callee() {
    let found = diagnostics(vec![
        FunctionDef::new("main")
            .param("q", Type::Qubit)
            .returns(Type::Qubit)
            .body(vec![Stmt::ret(Expr::call("oracle", [Expr::var("q")]))]),
    ]);
    assert_eq!(kinds(&found), [DiagnosticKind::UnboundName]);
}

#[test]
fn test_break_outside_loop() {
    let found = diagnostics(vec![FunctionDef::new("stray").body(vec![Stmt::break_loop()])]);
    assert_eq!(kinds(&found), [DiagnosticKind::ControlFlow]);
}

#[test]
fn test_every_function_is_reported() {
    let found = diagnostics(vec![
        rx(),
        FunctionDef::new("stray").body(vec![Stmt::break_loop()]),
        FunctionDef::new("leak").body(vec![Stmt::assign("q", Expr::call("qubit", []))]),
        rx(),
    ]);
    assert_eq!(
        kinds(&found),
        [
            DiagnosticKind::DuplicateName,
            DiagnosticKind::ControlFlow,
            DiagnosticKind::Linearity,
        ]
    );
    let functions: Vec<_> = found.iter().map(|d| d.function.as_str()).collect();
    assert_eq!(functions, ["rx", "stray", "leak"]);
}

// ============================================================================
// Generated straight-line programs
// ============================================================================

mod generated {
    use super::*;
    use proptest::prelude::*;

    const QUBITS: usize = 3;

    #[derive(Debug, Clone)]
    enum GateOp {
        H(usize),
        T(usize),
        Rz(usize, f64),
        Cx(usize, usize),
    }

    fn name(q: usize) -> String {
        format!("q{q}")
    }

    impl GateOp {
        fn stmt(&self) -> Stmt {
            match self {
                GateOp::H(q) => Stmt::assign(name(*q), Expr::call("h", [Expr::var(name(*q))])),
                GateOp::T(q) => Stmt::assign(name(*q), Expr::call("t", [Expr::var(name(*q))])),
                GateOp::Rz(q, theta) => Stmt::assign(
                    name(*q),
                    Expr::call("rz", [Expr::var(name(*q)), Expr::angle(*theta)]),
                ),
                GateOp::Cx(c, t) => Stmt::unpack(
                    [name(*c), name(*t)],
                    Expr::call("cx", [Expr::var(name(*c)), Expr::var(name(*t))]),
                ),
            }
        }
    }

    fn arb_gate_op() -> impl Strategy<Value = GateOp> {
        prop_oneof![
            (0..QUBITS).prop_map(GateOp::H),
            (0..QUBITS).prop_map(GateOp::T),
            (0..QUBITS, -3.0_f64..3.0).prop_map(|(q, theta)| GateOp::Rz(q, theta)),
            (0..QUBITS, 0..QUBITS)
                .prop_filter("Control and target must differ", |(c, t)| c != t)
                .prop_map(|(c, t)| GateOp::Cx(c, t)),
        ]
    }

    fn function(index: usize, ops: &[GateOp], extra: Option<Stmt>) -> FunctionDef {
        let mut def = FunctionDef::new(format!("f{index}"));
        for q in 0..QUBITS {
            def = def.param(name(q), Type::Qubit).returns(Type::Qubit);
        }
        let mut body: Vec<Stmt> = ops.iter().map(GateOp::stmt).collect();
        body.extend(extra);
        body.push(Stmt::ret(Expr::tuple((0..QUBITS).map(|q| Expr::var(name(q))))));
        def.body(body)
    }

    fn module(programs: &[Vec<GateOp>]) -> Module {
        let mut module = Module::with_prelude("generated");
        for (i, ops) in programs.iter().enumerate() {
            module.register(function(i, ops, None)).unwrap();
        }
        module
    }

    proptest! {
        /// Parallel and sequential compilation emit identical bytes.
        #[test]
        fn test_parallel_and_sequential_agree(
            programs in prop::collection::vec(prop::collection::vec(arb_gate_op(), 0..=12), 1..=4)
        ) {
            let parallel = module(&programs)
                .compile(&CompileOptions::default())
                .unwrap()
                .to_json()
                .unwrap();
            let sequential = module(&programs)
                .compile(&CompileOptions::default().with_parallel(false))
                .unwrap()
                .to_json()
                .unwrap();
            prop_assert_eq!(parallel, sequential);
        }

        /// Every generated gate becomes exactly one gate node.
        #[test]
        fn test_gate_count_preserved(ops in prop::collection::vec(arb_gate_op(), 0..=16)) {
            let program = module(std::slice::from_ref(&ops))
                .compile(&CompileOptions::default())
                .unwrap();
            let doc = serialize(&program).unwrap();
            prop_assert_eq!(doc.count_kind("gate"), ops.len());
        }

        /// Measuring a qubit before returning it is always rejected.
        #[test]
        fn test_measured_qubit_cannot_be_returned(
            ops in prop::collection::vec(arb_gate_op(), 0..=8),
            victim in 0..QUBITS,
        ) {
            let extra = Stmt::assign("m", Expr::call("measure", [Expr::var(name(victim))]));
            let mut module = Module::with_prelude("generated");
            module.register(function(0, &ops, Some(extra))).unwrap();
            let err = module.compile(&CompileOptions::default()).unwrap_err();
            let found = err.diagnostics().unwrap();
            prop_assert_eq!(found.len(), 1);
            prop_assert!(found.has(DiagnosticKind::Linearity));
        }
    }
}
