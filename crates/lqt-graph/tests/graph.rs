use lqt_graph::{
    AnalysisSession, LowerError, NodeId, Source,
    hir::{
        BinOp, Body, DeclId, DeclKind, ExprId, ExprKind, FnDecl, Param, Program, Res, Ty, ValDecl,
    },
};
use lqt_term::Term;

fn fun(params: Vec<Param>, body: ExprId) -> DeclKind {
    DeclKind::Fun(FnDecl {
        params,
        dispatch_receiver: None,
        extension_receiver: None,
        ret_ty: Ty::Int,
        ret_annot: None,
        body: Body::Expr(body),
    })
}

fn ite(p: &mut Program, cond: ExprId, then: ExprId, els: ExprId) -> ExprId {
    p.expr(ExprKind::If { cond, then, els: Some(els) }, Ty::Int)
}

/// `fun max(x: Int, y: Int) = if (x > y) x else y`
fn max_program() -> (Program, DeclId) {
    let mut p = Program::default();
    let max = p.next_decl_id();
    let x = p.name("x", Res::Param(max, 0), Ty::Int);
    let y = p.name("y", Res::Param(max, 1), Ty::Int);
    let cond = p.binary(BinOp::Gt, x, y, Ty::Bool);
    let x2 = p.name("x", Res::Param(max, 0), Ty::Int);
    let y2 = p.name("y", Res::Param(max, 1), Ty::Int);
    let body = ite(&mut p, cond, x2, y2);
    p.push_decl("max", fun(vec![Param::new("x", Ty::Int), Param::new("y", Ty::Int)], body));
    (p, max)
}

/// `fun sum(k: Int) = if (k < 0) 0 else sum(k - 1) + k`
fn sum_program() -> (Program, DeclId) {
    let mut p = Program::default();
    let sum = p.next_decl_id();
    let k = p.name("k", Res::Param(sum, 0), Ty::Int);
    let zero = p.int(0);
    let cond = p.binary(BinOp::Lt, k, zero, Ty::Bool);
    let zero2 = p.int(0);
    let k2 = p.name("k", Res::Param(sum, 0), Ty::Int);
    let one = p.int(1);
    let arg = p.binary(BinOp::Sub, k2, one, Ty::Int);
    let call = p.call("sum", sum, vec![arg], Ty::Int);
    let k3 = p.name("k", Res::Param(sum, 0), Ty::Int);
    let add = p.binary(BinOp::Add, call, k3, Ty::Int);
    let body = ite(&mut p, cond, zero2, add);
    p.push_decl("sum", fun(vec![Param::new("k", Ty::Int)], body));
    (p, sum)
}

/// `fun inc(x: Int) = x + 1` and `fun twice(a: Int) = inc(a) + inc(1)`
fn twice_program() -> (Program, DeclId, DeclId) {
    let mut p = Program::default();
    let inc = p.next_decl_id();
    let x = p.name("x", Res::Param(inc, 0), Ty::Int);
    let one = p.int(1);
    let body = p.binary(BinOp::Add, x, one, Ty::Int);
    p.push_decl("inc", fun(vec![Param::annotated("x", Ty::Int, "it >= 0")], body));

    let twice = p.next_decl_id();
    let a = p.name("a", Res::Param(twice, 0), Ty::Int);
    let first = p.call("inc", inc, vec![a], Ty::Int);
    let one = p.int(1);
    let second = p.call("inc", inc, vec![one], Ty::Int);
    let body = p.binary(BinOp::Add, first, second, Ty::Int);
    p.push_decl("twice", fun(vec![Param::new("a", Ty::Int)], body));
    (p, inc, twice)
}

fn var(session: &AnalysisSession, node: NodeId) -> Term {
    Term::var(&session.graph[node].var)
}

fn node_of(session: &AnalysisSession, expr: u32) -> NodeId {
    session.graph.lookup(Source::Expr(ExprId(expr))).unwrap()
}

#[test]
fn max_body_is_an_ite_over_operand_variables() {
    let (p, max) = max_program();
    let mut session = AnalysisSession::new();
    let node = session.build_decl(&p, max).unwrap();

    let function = session.graph[node].as_function().unwrap();
    let body = function.ret.unwrap();
    let [cond, then, els] = [2, 3, 4].map(|e| node_of(&session, e));
    let expected = Term::eq(
        var(&session, body),
        Term::ite(var(&session, cond), var(&session, then), var(&session, els)),
    );
    assert_eq!(session.graph[body].pred(), Some(&expected));
    assert_eq!(session.graph[body].depends_on, vec![cond, then, els]);
    assert_eq!(
        session.graph[node].pred(),
        Some(&Term::eq(var(&session, node), var(&session, body)))
    );
    // references to a parameter point at the parameter's node
    assert_eq!(
        session.graph[then].pred(),
        Some(&Term::eq(var(&session, then), var(&session, function.params[0])))
    );
}

#[test]
fn building_twice_returns_the_same_node() {
    let (p, max) = max_program();
    let mut session = AnalysisSession::new();
    let first = session.build_decl(&p, max).unwrap();
    let len = session.graph.len();
    let pred = session.graph[first].pred().cloned();

    assert_eq!(session.build_decl(&p, max).unwrap(), first);
    assert_eq!(session.build_expr(&p, ExprId(5)).unwrap(), session.graph[first].expect_function().ret.unwrap());
    assert_eq!(session.graph.len(), len);
    assert_eq!(session.graph[first].pred().cloned(), pred);
}

#[test]
fn recursion_terminates_with_an_unconstrained_call() {
    let (p, sum) = sum_program();
    let mut session = AnalysisSession::new();
    let node = session.build_decl(&p, sum).unwrap();

    let calls = session.graph.call_sites_of(node);
    assert_eq!(calls.len(), 1);
    let call = &session.graph[calls[0]];
    assert!(call.as_call().unwrap().recursive);
    assert_eq!(call.pred(), None);
    assert!(!call.depends_on.contains(&node));
    assert!(!session.is_in_progress(node));
    assert!(session.graph[node].pred().is_some());
}

#[test]
fn graphs_are_acyclic() {
    for (p, decl) in [max_program(), sum_program()] {
        let mut session = AnalysisSession::new();
        let node = session.build_decl(&p, decl).unwrap();
        assert_eq!(session.graph.check_acyclic(), Ok(()));
        for (id, _) in session.graph.nodes() {
            let closure = session.graph.dependency_closure(id);
            assert_eq!(closure[0], id);
            assert!(closure[1..].iter().all(|dep| !session.graph.dependency_closure(*dep).contains(&id)));
        }
        assert!(session.graph.dependency_closure(node).len() > 1);
    }
}

#[test]
fn one_sided_conditional_skips_only_its_declaration() {
    let (mut p, max) = max_program();
    let cond = p.expr(ExprKind::Lit(lqt_graph::hir::Lit::Bool(true)), Ty::Bool);
    let then = p.int(1);
    let body = p.expr(ExprKind::If { cond, then, els: None }, Ty::Int);
    let bad = p.push_decl("bad", fun(vec![], body));

    let mut session = AnalysisSession::new();
    assert!(matches!(session.build_decl(&p, bad), Err(LowerError::Unsupported(_))));
    assert!(session.build_decl(&p, max).is_ok());
    // the failure is remembered
    assert!(matches!(session.build_decl(&p, bad), Err(LowerError::Unsupported(_))));
}

#[test]
fn untyped_expression_is_a_missing_resolution() {
    let mut p = Program::default();
    p.exprs.push(lqt_graph::hir::Expr { kind: ExprKind::Lit(lqt_graph::hir::Lit::Int(1)), ty: None });
    let decl = p.push_decl("f", fun(vec![], ExprId(0)));
    let mut session = AnalysisSession::new();
    assert!(matches!(session.build_decl(&p, decl), Err(LowerError::MissingResolution(_))));
}

#[test]
fn block_bodies_and_field_accesses_are_unsupported() {
    let mut p = Program::default();
    let one = p.int(1);
    let block = p.expr(ExprKind::Block(vec![one]), Ty::Int);
    let f = p.push_decl(
        "f",
        DeclKind::Fun(FnDecl {
            params: vec![],
            dispatch_receiver: None,
            extension_receiver: None,
            ret_ty: Ty::Int,
            ret_annot: None,
            body: Body::Block(block),
        }),
    );
    let field = p.expr(ExprKind::Field { base: one, field: "len".into() }, Ty::Int);
    let g = p.push_decl("g", fun(vec![], field));

    let mut session = AnalysisSession::new();
    assert!(matches!(session.build_decl(&p, f), Err(LowerError::Unsupported(_))));
    assert!(matches!(session.build_decl(&p, g), Err(LowerError::Unsupported(_))));
}

#[test]
fn arity_mismatch_is_unsupported() {
    let (mut p, max) = max_program();
    let one = p.int(1);
    let call = p.call("max", max, vec![one], Ty::Int);
    let f = p.push_decl("f", fun(vec![], call));
    let mut session = AnalysisSession::new();
    assert!(matches!(session.build_decl(&p, f), Err(LowerError::Unsupported(_))));
}

#[test]
fn annotations_are_lowered_over_node_variables() {
    let (p, inc, _) = twice_program();
    let mut session = AnalysisSession::new();
    let node = session.build_decl(&p, inc).unwrap();
    let param = session.graph[node].expect_function().params[0];
    let expected = Term::binary(lqt_term::BinOp::Ge, var(&session, param), Term::int(0));
    assert_eq!(session.graph[param].declared, Some(expected));
}

#[test]
fn unresolved_annotation_identifier_skips_the_declaration() {
    let mut p = Program::default();
    let body = p.int(0);
    let f = p.push_decl("f", fun(vec![Param::annotated("x", Ty::Int, "it > bound")], body));
    let mut session = AnalysisSession::new();
    assert!(matches!(session.build_decl(&p, f), Err(LowerError::MissingResolution(_))));
}

#[test]
fn values_and_names_referring_to_them() {
    let mut p = Program::default();
    let five = p.int(5);
    let val = p.push_decl("five", DeclKind::Val(ValDecl { ty: Ty::Int, init: five, annot: None }));
    let name = p.name("five", Res::Decl(val), Ty::Int);
    let f = p.push_decl("f", fun(vec![], name));

    let mut session = AnalysisSession::new();
    let node = session.build_decl(&p, f).unwrap();
    let val_node = session.graph.lookup(Source::Decl(val)).unwrap();
    let name_node = node_of(&session, name.0);
    assert_eq!(session.graph[name_node].depends_on, vec![val_node]);
    assert!(session.graph.dependency_closure(node).contains(&node_of(&session, five.0)));
}

#[test]
fn call_sites_get_independent_versions() {
    let (p, inc, twice) = twice_program();
    let mut session = AnalysisSession::new();
    let inc_node = session.build_decl(&p, inc).unwrap();
    let twice_node = session.build_decl(&p, twice).unwrap();

    let root = session.instantiate_root(twice_node);
    let count = session.versioned_count();
    assert_eq!(session.instantiate(twice_node, session.versioned(root).version), root);
    assert_eq!(session.versioned_count(), count);

    let closure = session.versioned_closure(root);
    let callees: Vec<_> = closure
        .iter()
        .filter_map(|&id| session.versioned(id).callee)
        .collect();
    assert_eq!(callees.len(), 2);
    let [a, b] = [callees[0], callees[1]];
    assert_eq!(session.versioned(a).node, inc_node);
    assert_eq!(session.versioned(b).node, inc_node);
    assert_ne!(session.versioned(a).version, session.versioned(b).version);
    assert_ne!(session.versioned_var(a), session.versioned_var(b));

    // each (node, version) pair appears once
    let mut pairs: Vec<_> = closure
        .iter()
        .map(|&id| (session.versioned(id).node, session.versioned(id).version))
        .collect();
    let len = pairs.len();
    pairs.sort();
    pairs.dedup();
    assert_eq!(pairs.len(), len);
}

#[test]
fn call_facts_bind_parameters_to_arguments() {
    let (p, inc, twice) = twice_program();
    let mut session = AnalysisSession::new();
    let inc_node = session.build_decl(&p, inc).unwrap();
    let twice_node = session.build_decl(&p, twice).unwrap();
    let root = session.instantiate_root(twice_node);

    let call = session
        .versioned_closure(root)
        .into_iter()
        .find(|&id| session.graph[session.versioned(id).node].as_call().is_some())
        .unwrap();
    let callee = session.versioned(call).callee.unwrap();
    let (v, w) = (session.versioned(call).version, session.versioned(callee).version);
    let param = &session.graph[session.graph[inc_node].expect_function().params[0]].var;
    let arg = &session.graph[session.graph[session.versioned(call).node].as_call().unwrap().args[0]].var;
    let ret = &session.graph[session.graph[inc_node].expect_function().ret.unwrap()].var;
    let own = &session.graph[session.versioned(call).node].var;

    let facts = session.versioned_pred(call);
    assert_eq!(
        facts,
        vec![
            Term::eq(Term::var(format!("{v}_{own}")), Term::var(format!("{w}_{ret}"))),
            Term::eq(Term::var(format!("{w}_{param}")), Term::var(format!("{v}_{arg}"))),
        ]
    );
    assert!(session.closure_predicates(root).len() > facts.len());
    assert_eq!(
        session.rename_in(call, &Term::eq(Term::var(own.clone()), Term::var(ret.clone()))),
        Term::eq(Term::var(format!("{v}_{own}")), Term::var(format!("{w}_{ret}")))
    );
    assert_eq!(session.rename_in(call, &Term::var(arg.clone())), Term::var(format!("{v}_{arg}")));
}

#[test]
fn recursive_call_uses_the_recorded_summary() {
    let (p, sum) = sum_program();
    let mut session = AnalysisSession::new();
    let node = session.build_decl(&p, sum).unwrap();
    let k = session.graph[node].expect_function().params[0];
    let summary = Term::binary(lqt_term::BinOp::Ge, var(&session, node), Term::int(0));
    session.record_inferred(node, summary);

    let root = session.instantiate_root(node);
    let call = session
        .versioned_closure(root)
        .into_iter()
        .find(|&id| session.versioned(id).node == session.graph.call_sites_of(node)[0])
        .unwrap();
    let version = session.versioned(call).version;
    let call_var = &session.graph[session.versioned(call).node].var;
    assert_eq!(
        session.versioned_pred(call),
        vec![Term::binary(
            lqt_term::BinOp::Ge,
            Term::var(format!("{version}_{call_var}")),
            Term::int(0)
        )]
    );
    assert!(session.versioned_closure(root).iter().all(|&id| session.versioned(id).node != k || session.versioned(id).version == version));
}

#[test]
fn programs_deserialize_from_json() {
    let json = r#"{
        "exprs": [
            { "kind": { "lit": { "int": 5 } }, "ty": "int" },
            { "kind": { "name": { "ident": "x", "res": { "param": [0, 0] } } }, "ty": "int" }
        ],
        "decls": [
            {
                "name": "id",
                "kind": { "fun": {
                    "params": [{ "name": "x", "ty": "int", "annot": "it > 0" }],
                    "ret_ty": "int",
                    "body": { "expr": 1 }
                } }
            }
        ]
    }"#;
    let p: Program = serde_json::from_str(json).unwrap();
    let mut session = AnalysisSession::new();
    let node = session.build_decl(&p, DeclId(0)).unwrap();
    assert_eq!(session.graph[node].expect_function().params.len(), 1);
}
