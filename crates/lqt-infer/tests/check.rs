use std::{fs, process::Command, time::Duration};

use liquid_fixpoint::{Solution, smt::SatResult};
use lqt_config::SolverOpts;
use lqt_graph::{
    AnalysisSession, NodeId,
    hir::{BinOp, Body, DeclId, DeclKind, ExprId, ExprKind, FnDecl, Param, Program, Res, Ty},
};
use lqt_infer::{Checker, Refinements, Verdict, encode, obligations::ObligationKind};
use lqt_term::{Term, parse_term};
use tempfile::TempDir;

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

/// `fun max(x: Int, y: Int) = if (x > y) x else y`
fn max_program() -> (Program, DeclId) {
    let mut p = Program::default();
    let max = p.next_decl_id();
    let x = p.name("x", Res::Param(max, 0), Ty::Int);
    let y = p.name("y", Res::Param(max, 1), Ty::Int);
    let cond = p.binary(BinOp::Gt, x, y, Ty::Bool);
    let x2 = p.name("x", Res::Param(max, 0), Ty::Int);
    let y2 = p.name("y", Res::Param(max, 1), Ty::Int);
    let body = p.expr(ExprKind::If { cond, then: x2, els: Some(y2) }, Ty::Int);
    p.push_decl("max", fun(vec![Param::new("x", Ty::Int), Param::new("y", Ty::Int)], body));
    (p, max)
}

/// `fun pos(x: Int /* it > 0 */) = x`, `fun good() = pos(5)` and `fun bad() = pos(-1)`
fn positive_program() -> (Program, [DeclId; 3]) {
    let mut p = Program::default();
    let pos = p.next_decl_id();
    let x = p.name("x", Res::Param(pos, 0), Ty::Int);
    p.push_decl("pos", fun(vec![Param::annotated("x", Ty::Int, "it > 0")], x));
    let five = p.int(5);
    let call = p.call("pos", pos, vec![five], Ty::Int);
    let good = p.push_decl("good", fun(vec![], call));
    let minus_one = p.int(-1);
    let call = p.call("pos", pos, vec![minus_one], Ty::Int);
    let bad = p.push_decl("bad", fun(vec![], call));
    (p, [pos, good, bad])
}

fn opts(dir: &TempDir, fixpoint: &str, smt: &str) -> SolverOpts {
    let fixpoint_path = dir.path().join("fixpoint.sh");
    let smt_path = dir.path().join("smt.sh");
    fs::write(&fixpoint_path, fixpoint).unwrap();
    fs::write(&smt_path, smt).unwrap();
    SolverOpts {
        fixpoint: "sh".into(),
        fixpoint_flags: vec![fixpoint_path.display().to_string()],
        smt_solver: "sh".into(),
        smt_flags: vec![smt_path.display().to_string()],
        work_dir: dir.path().join("work"),
        timeout: Duration::from_secs(10),
        clear_work_dir: false,
    }
}

fn build(p: &Program, decl: DeclId) -> (AnalysisSession, NodeId) {
    let mut session = AnalysisSession::new();
    let node = session.build_decl(p, decl).unwrap();
    (session, node)
}

#[test]
fn max_has_branch_constraints_and_no_obligations() {
    let dir = tempfile::tempdir().unwrap();
    let checker = Checker::new(opts(&dir, "exit 0\n", "cat > /dev/null\necho sat\n"));
    let (p, max) = max_program();
    let (mut session, node) = build(&p, max);
    let report = checker.check_decl(&mut session, node, "max");

    assert!(report.results.is_empty());
    assert_eq!(report.verdict, Verdict::Verified);
    // two branches into the conditional's unknown, the body into the result's unknown
    assert_eq!(report.query.query.constraints.len(), 3);
    assert_eq!(report.query.query.wfs.len(), 2);
    assert_eq!(report.query.kvars.len(), 2);
    assert!(dir.path().join("work/0.fq").exists());
}

#[test]
fn binds_follow_dependencies() {
    let (p, max) = max_program();
    let (mut session, node) = build(&p, max);
    let root = session.instantiate_root(node);
    let fq = encode(&session, root);
    let query = &fq.query;

    assert_eq!(query.binds.len(), session.versioned_closure(root).len());
    // the function is bound last, after its body
    let last = query.binds.last().unwrap();
    assert_eq!(last.name, session.versioned_var(root));
    assert_eq!(last.pred.terms.len(), 1);
    let (lhs, _) = last.pred.terms[0].as_eq().unwrap();
    assert_eq!(lhs, &Term::var("v"));

    let text = query.to_string();
    let qualifiers = text.find("qualif").unwrap();
    let binds = text.find("bind ").unwrap();
    let constraints = text.find("constraint:").unwrap();
    let wfs = text.find("wf:").unwrap();
    assert!(qualifiers < binds && binds < constraints && constraints < wfs);
}

#[test]
fn unknowns_cannot_see_their_own_bind() {
    let (p, max) = max_program();
    let (mut session, node) = build(&p, max);
    let root = session.instantiate_root(node);
    let fq = encode(&session, root);
    let query = &fq.query;

    assert_eq!(query.wfs.len(), fq.kvars.len());
    for (name, &id) in &fq.kvars {
        let wf = query
            .wfs
            .iter()
            .find(|wf| wf.pred.terms == vec![Term::kvar(name.clone(), vec![])])
            .unwrap();
        let own = query.binds.iter().find(|b| b.name == session.versioned_var(id)).unwrap();
        assert!(wf.env.iter().all(|bind| bind != own.id));
        assert_eq!(wf.env.len(), query.binds.len() - 1);
    }
}

#[test]
fn solutions_fold_back_onto_nodes() {
    let (p, max) = max_program();
    let (mut session, node) = build(&p, max);
    let root = session.instantiate_root(node);
    let fq = encode(&session, root);
    let result_kvar = fq.kvars.iter().find(|(_, id)| **id == root).unwrap().0.clone();
    let x = session.graph[session.graph[node].expect_function().params[0]].var.clone();
    let version = session.versioned(root).version;

    let solution = Solution {
        name: result_kvar,
        assignments: vec![],
        candidates: vec![parse_term(&format!("v >= {version}_{x}")).unwrap()],
    };
    let refinements = Refinements::new(&session, &fq, &[solution]);
    assert_eq!(refinements.len(), 1);
    let summary = refinements.summary(&session, root).unwrap();
    let f = &session.graph[node].var;
    assert_eq!(summary, parse_term(&format!("{f} >= {x}")).unwrap());
}

#[test]
fn call_obligation_substitutes_the_argument() {
    let (p, [pos, good, _]) = positive_program();
    let mut session = AnalysisSession::new();
    session.build_decl(&p, pos).unwrap();
    let node = session.build_decl(&p, good).unwrap();
    let root = session.instantiate_root(node);

    let obligations = lqt_infer::obligations::collect(&session, root, "good");
    assert_eq!(obligations.len(), 1);
    let obligation = &obligations[0];
    assert_eq!(
        obligation.kind,
        ObligationKind::Argument { callee: "pos".into(), param: "x".into() }
    );
    let call = session.graph.call_sites_of(session.graph.lookup(lqt_graph::Source::Decl(pos)).unwrap())[0];
    let arg = session.graph[call].as_call().unwrap().args[0];
    let arg = format!("{}_{}", session.versioned(root).version, session.graph[arg].var);
    assert!(obligation.assumptions.contains(&Term::eq(Term::var(&arg), Term::int(5))));
    assert_eq!(obligation.goal, Term::not(parse_term(&format!("{arg} > 0")).unwrap()));
}

#[test]
fn smt_answers_become_verdicts() {
    let (p, [pos, good, _]) = positive_program();

    let dir = tempfile::tempdir().unwrap();
    let checker = Checker::new(opts(&dir, "exit 0\n", "cat > /dev/null\necho unsat\n"));
    let (mut session, _) = build(&p, pos);
    let node = session.build_decl(&p, good).unwrap();
    assert_eq!(checker.check_decl(&mut session, node, "good").verdict, Verdict::Verified);

    let dir = tempfile::tempdir().unwrap();
    let sat = "cat > /dev/null\necho sat\necho '((define-fun x () Int (- 1)))'\n";
    let checker = Checker::new(opts(&dir, "exit 0\n", sat));
    let (mut session, _) = build(&p, pos);
    let node = session.build_decl(&p, good).unwrap();
    let report = checker.check_decl(&mut session, node, "good");
    let Verdict::Violated(cex) = report.verdict else { panic!("expected a violation") };
    assert_eq!(cex.model.get("x"), Some("-1"));
    assert!(matches!(report.results[0].1, SatResult::Sat(_)));

    let dir = tempfile::tempdir().unwrap();
    let checker = Checker::new(opts(&dir, "exit 0\n", "cat > /dev/null\necho unknown\n"));
    let (mut session, _) = build(&p, pos);
    let node = session.build_decl(&p, good).unwrap();
    assert!(matches!(checker.check_decl(&mut session, node, "good").verdict, Verdict::Inconclusive(_)));
}

fn has_z3() -> bool {
    Command::new("z3").arg("-version").output().is_ok()
}

#[test]
fn z3_separates_safe_and_unsafe_calls() {
    if !has_z3() {
        return;
    }
    let (p, [pos, good, bad]) = positive_program();
    let dir = tempfile::tempdir().unwrap();
    let mut opts = opts(&dir, "exit 0\n", "");
    opts.smt_solver = "z3".into();
    opts.smt_flags = vec!["-in".into()];
    let checker = Checker::new(opts);

    let mut session = AnalysisSession::new();
    session.build_decl(&p, pos).unwrap();
    let good = session.build_decl(&p, good).unwrap();
    let bad = session.build_decl(&p, bad).unwrap();
    assert_eq!(checker.check_decl(&mut session, good, "good").verdict, Verdict::Verified);
    let Verdict::Violated(cex) = checker.check_decl(&mut session, bad, "bad").verdict else {
        panic!("expected a violation")
    };
    assert!(cex.obligation.contains("pos"));
    assert!(cex.model.assignments.iter().any(|(_, value)| value == "-1"));
}

#[test]
fn declared_result_refinement_is_an_obligation() {
    let (mut p, _) = max_program();
    let DeclKind::Fun(max) = &mut p.decls[0].kind else { unreachable!() };
    max.ret_annot = Some("it >= x && it >= y".into());
    let mut session = AnalysisSession::new();
    let node = session.build_decl(&p, DeclId(0)).unwrap();
    let root = session.instantiate_root(node);
    let obligations = lqt_infer::obligations::collect(&session, root, "max");
    assert_eq!(obligations.len(), 1);
    assert_eq!(obligations[0].kind, ObligationKind::Return { function: "max".into() });
    assert!(obligations[0].assumptions.len() >= 5);
}
