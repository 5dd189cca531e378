use std::{
    fs,
    path::Path,
    process::Command,
    time::{Duration, Instant},
};

use liquid_fixpoint::{
    Predicate, Query, SolveOutcome, Solver, SolverError, Type,
    smt::{SatResult, SmtQuery, SmtSolver},
};
use lqt_config::SolverOpts;
use lqt_term::{Term, parse_term};
use tempfile::TempDir;

/// Options running `script` through `sh` in place of both solvers.
fn opts(dir: &TempDir, script: &str) -> SolverOpts {
    let script_path = dir.path().join("solver.sh");
    fs::write(&script_path, script).unwrap();
    let script_path = script_path.display().to_string();
    SolverOpts {
        fixpoint: "sh".into(),
        fixpoint_flags: vec![script_path.clone()],
        smt_solver: "sh".into(),
        smt_flags: vec![script_path],
        work_dir: dir.path().join("work"),
        timeout: Duration::from_secs(10),
        clear_work_dir: false,
    }
}

fn query() -> Query {
    let mut query = Query::new();
    query.add_bind("x", Predicate::new("v", Type::int(), vec![parse_term("v > 0").unwrap()]));
    let k = Predicate::new("v", Type::int(), vec![Term::kvar("k_x", vec![])]);
    query.add_wf(query.full_env(), k.clone());
    query.add_constraint(query.full_env(), Predicate::new("v", Type::int(), vec![]), k);
    query
}

#[test]
fn reads_companion_solution_file() {
    let dir = tempfile::tempdir().unwrap();
    let solver = Solver::new(opts(&dir, "printf '%s\\n' 'Solution:' '$k_x v > 0; v = 1' > \"$1.fqout\"\n"));
    let SolveOutcome::Solved(solutions) = solver.run(&query()).unwrap() else {
        panic!("expected a solution")
    };
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].name, "k_x");
    assert_eq!(solutions[0].refinement(), parse_term("v > 0 || v = 1").unwrap());

    let written = fs::read_to_string(dir.path().join("work/0.fq")).unwrap();
    assert_eq!(written, query().to_string());
}

#[test]
fn each_query_gets_a_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let solver = Solver::new(opts(&dir, "exit 0\n"));
    solver.solve(&query());
    solver.solve(&query());
    assert!(dir.path().join("work/0.fq").exists());
    assert!(dir.path().join("work/1.fq").exists());
}

#[test]
fn crash_and_missing_solution_mean_no_solutions() {
    let dir = tempfile::tempdir().unwrap();
    let solver = Solver::new(opts(&dir, "echo 'Crash!: oops' >&2\nexit 2\n"));
    assert!(matches!(solver.run(&query()).unwrap(), SolveOutcome::Crashed(msg) if msg.contains("oops")));
    assert!(solver.solve(&query()).is_empty());

    let dir = tempfile::tempdir().unwrap();
    let solver = Solver::new(opts(&dir, "echo Safe\n"));
    assert!(matches!(solver.run(&query()).unwrap(), SolveOutcome::NoSolution));
}

#[test]
fn stale_solution_files_are_never_read() {
    let dir = tempfile::tempdir().unwrap();
    let work = dir.path().join("work");
    fs::create_dir_all(&work).unwrap();
    fs::write(work.join("0.fq.fqout"), "$k_x v > 100\n").unwrap();
    let solver = Solver::new(opts(&dir, "exit 0\n"));
    assert!(solver.solve(&query()).is_empty());
    assert!(work.join("1.fq").exists());

    // written after the directory was scanned, for the id the next query gets
    fs::write(work.join("2.fq.fqout"), "$k_x v > 100\n").unwrap();
    assert!(matches!(solver.run(&query()).unwrap(), SolveOutcome::NoSolution));
    assert!(work.join("2.fq").exists());
    assert!(!work.join("2.fq.fqout").exists());
}

#[test]
fn timeout_is_an_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = opts(&dir, "sleep 5\n");
    opts.timeout = Duration::from_millis(200);
    let solver = Solver::new(opts);
    assert!(matches!(solver.run(&query()).unwrap(), SolveOutcome::TimedOut));
}

#[test]
fn background_children_do_not_extend_the_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = opts(&dir, "sleep 5 &\nexit 0\n");
    opts.timeout = Duration::from_millis(200);
    let solver = Solver::new(opts);
    let start = Instant::now();
    assert!(matches!(solver.run(&query()).unwrap(), SolveOutcome::TimedOut));
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[test]
fn io_failure_is_local_to_one_call() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = opts(&dir, "");
    opts.fixpoint = dir.path().join("no-such-solver");
    let solver = Solver::new(opts);
    assert!(matches!(solver.run(&query()), Err(SolverError::Io(_))));
    assert!(solver.solve(&query()).is_empty());
}

#[test]
fn smt_adapter_reads_verdict_from_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let opts = opts(&dir, "cat > /dev/null\necho unsat\n");
    let smt = SmtSolver::new(&opts);
    let query = SmtQuery::new(vec![parse_term("x = 5").unwrap()], parse_term("~(x > 0)").unwrap());
    assert_eq!(smt.check(&query), SatResult::Unsat);
}

fn has_z3() -> bool {
    Command::new("z3").arg("-version").output().is_ok_and(|out| out.status.success())
}

#[test]
fn z3_finds_counterexample() {
    if !has_z3() {
        return;
    }
    let mut opts = opts(&tempfile::tempdir().unwrap(), "");
    opts.smt_solver = Path::new("z3").into();
    opts.smt_flags = vec!["-in".into(), "-smt2".into()];
    let smt = SmtSolver::new(&opts);

    let safe = SmtQuery::new(vec![parse_term("1_a = 5").unwrap()], parse_term("~(1_a > 0)").unwrap());
    assert_eq!(smt.check(&safe), SatResult::Unsat);

    let unsafe_ = SmtQuery::new(vec![parse_term("1_a = -1").unwrap()], parse_term("~(1_a > 0)").unwrap());
    let SatResult::Sat(model) = smt.check(&unsafe_) else { panic!("expected sat") };
    assert_eq!(model.get("1_a"), Some("-1"));
}
