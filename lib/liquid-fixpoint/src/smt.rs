//! Discharging closed safety obligations with an SMT solver speaking SMT-LIB2 over stdin.
use std::{fmt, fmt::Write as _, path::PathBuf, process::Command, time::Duration};

use lqt_config::SolverOpts;
use lqt_term::{BinOp, Constant, Name, Term, UnOp};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    SolverError,
    process::{ProcessOutcome, run_with_timeout},
    sexp::{self, Sexp},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Int,
    Bool,
    Str,
}

impl fmt::Display for SmtSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtSort::Int => write!(f, "Int"),
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::Str => write!(f, "String"),
        }
    }
}

/// Asserts every assumption together with `goal`. To prove `assumptions => p`, pass `not p` as the
/// goal: `Unsat` then means the implication holds.
#[derive(Clone, Debug)]
pub struct SmtQuery {
    /// Sorts of free variables. Variables missing here are declared as `Int`.
    pub sorts: FxHashMap<Name, SmtSort>,
    pub assumptions: Vec<Term>,
    pub goal: Term,
}

impl SmtQuery {
    pub fn new(assumptions: Vec<Term>, goal: Term) -> Self {
        SmtQuery { sorts: FxHashMap::default(), assumptions, goal }
    }
}

/// A satisfying assignment, in the order the solver reported it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Model {
    pub assignments: Vec<(Name, String)>,
}

impl Model {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.assignments.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SatResult {
    Sat(Model),
    Unsat,
    Unknown(String),
}

impl SatResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SatResult::Sat(_))
    }
}

/// Anything that can decide satisfiability of a set of assumptions.
pub trait SatCheck {
    fn check(&mut self, assumptions: &[Term]) -> SatResult;
}

pub struct SmtSolver {
    binary: PathBuf,
    flags: Vec<String>,
    timeout: Duration,
}

impl SmtSolver {
    pub fn new(opts: &SolverOpts) -> Self {
        SmtSolver {
            binary: opts.smt_solver.clone(),
            flags: opts.smt_flags.clone(),
            timeout: opts.timeout,
        }
    }

    /// Like [`SmtSolver::try_check`] but reports failures as [`SatResult::Unknown`].
    pub fn check(&self, query: &SmtQuery) -> SatResult {
        match self.try_check(query) {
            Ok(result) => result,
            Err(err) => {
                warn!(%err, "smt check failed");
                SatResult::Unknown(err.to_string())
            }
        }
    }

    pub fn try_check(&self, query: &SmtQuery) -> Result<SatResult, SolverError> {
        let script = to_smtlib(query)?;
        debug!(%script, "smt query");
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.flags);
        let output = match run_with_timeout(cmd, Some(&script), self.timeout)? {
            ProcessOutcome::Exited(output) => output,
            ProcessOutcome::TimedOut => return Ok(SatResult::Unknown("timeout".to_string())),
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_response(&stdout)
    }

    /// A [`SatCheck`] asserting `goal` next to the checked assumptions.
    pub fn goal_check<'a>(
        &'a self,
        sorts: &'a FxHashMap<Name, SmtSort>,
        goal: &'a Term,
    ) -> GoalCheck<'a> {
        GoalCheck { solver: self, sorts, goal }
    }
}

pub struct GoalCheck<'a> {
    solver: &'a SmtSolver,
    sorts: &'a FxHashMap<Name, SmtSort>,
    goal: &'a Term,
}

impl SatCheck for GoalCheck<'_> {
    fn check(&mut self, assumptions: &[Term]) -> SatResult {
        let query = SmtQuery {
            sorts: self.sorts.clone(),
            assumptions: assumptions.to_vec(),
            goal: self.goal.clone(),
        };
        self.solver.check(&query)
    }
}

fn parse_response(stdout: &str) -> Result<SatResult, SolverError> {
    let sexps = sexp::parse(stdout)
        .map_err(|err| SolverError::Protocol(format!("{} at offset {}", err.msg, err.pos)))?;
    let mut sexps = sexps.into_iter();
    match sexps.next().as_ref().and_then(Sexp::as_atom) {
        Some("unsat") => Ok(SatResult::Unsat),
        Some("sat") => Ok(SatResult::Sat(sexps.next().map(parse_model).unwrap_or_default())),
        Some("unknown") => Ok(SatResult::Unknown("solver returned unknown".to_string())),
        _ => Err(SolverError::Protocol(format!("unexpected solver output: {stdout}"))),
    }
}

/// Reads `(define-fun x () Int 3)` entries. Older z3 versions wrap them in `(model ...)`.
fn parse_model(sexp: Sexp) -> Model {
    let Sexp::List(items) = sexp else { return Model::default() };
    let mut assignments = vec![];
    for item in items {
        if let Sexp::List(def) = item
            && let [head, name, _args, _sort, value] = &def[..]
            && head.as_atom() == Some("define-fun")
            && let Some(name) = name.as_atom()
        {
            assignments.push((name.to_string(), render_value(value)));
        }
    }
    Model { assignments }
}

fn render_value(value: &Sexp) -> String {
    match value {
        Sexp::List(items) => {
            match &items[..] {
                [op, n] if op.as_atom() == Some("-") && n.as_atom().is_some() => format!("-{n}"),
                _ => value.to_string(),
            }
        }
        Sexp::Atom(s) => s.clone(),
    }
}

pub fn to_smtlib(query: &SmtQuery) -> Result<String, SolverError> {
    let mut out = String::new();
    let mut vars: Vec<Name> = vec![];
    let mut funs: Vec<(Name, usize)> = vec![];
    for term in query.assumptions.iter().chain([&query.goal]) {
        for x in term.free_vars() {
            if !vars.contains(&x) {
                vars.push(x);
            }
        }
        for app in term.uninterpreted_apps() {
            if !funs.iter().any(|(f, _)| *f == app.0) {
                funs.push(app);
            }
        }
    }

    let _ = writeln!(out, "(set-option :produce-models true)");
    for x in &vars {
        let sort = query.sorts.get(x).copied().unwrap_or(SmtSort::Int);
        let _ = writeln!(out, "(declare-const {} {sort})", symbol(x));
    }
    for (f, arity) in &funs {
        let args = vec!["Int"; *arity].join(" ");
        let _ = writeln!(out, "(declare-fun {} ({args}) Int)", symbol(f));
    }
    for term in query.assumptions.iter().chain([&query.goal]) {
        let _ = writeln!(out, "(assert {})", term_to_smt(term)?);
    }
    let _ = writeln!(out, "(check-sat)");
    let _ = writeln!(out, "(get-model)");
    Ok(out)
}

/// Symbols starting with a digit, as produced by versioning, must be quoted.
fn symbol(name: &str) -> String {
    let simple = name.chars().next().is_some_and(|c| !c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || "_.!?".contains(c));
    if simple { name.to_string() } else { format!("|{name}|") }
}

fn term_to_smt(term: &Term) -> Result<String, SolverError> {
    let s = match term {
        Term::Var(x) => symbol(x),
        Term::Constant(Constant::Int(n)) if *n < 0 => format!("(- {})", n.unsigned_abs()),
        Term::Constant(Constant::Int(n)) => n.to_string(),
        Term::Constant(Constant::Bool(b)) => b.to_string(),
        Term::Constant(Constant::Str(s)) => format!("\"{}\"", s.replace('"', "\"\"")),
        Term::Unary(UnOp::Not, arg) => format!("(not {})", term_to_smt(arg)?),
        Term::Unary(UnOp::Neg, arg) => format!("(- {})", term_to_smt(arg)?),
        Term::Binary(op, args) => {
            let lhs = term_to_smt(&args[0])?;
            let rhs = term_to_smt(&args[1])?;
            let op = match op {
                BinOp::Ne => return Ok(format!("(not (= {lhs} {rhs}))")),
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "div",
                BinOp::Mod => "mod",
                BinOp::Eq | BinOp::Iff => "=",
                BinOp::Lt => "<",
                BinOp::Le => "<=",
                BinOp::Gt => ">",
                BinOp::Ge => ">=",
                BinOp::And => "and",
                BinOp::Or => "or",
                BinOp::Imp => "=>",
            };
            format!("({op} {lhs} {rhs})")
        }
        Term::App(f, args) if args.is_empty() => symbol(f),
        Term::App(f, args) => {
            if let Some((c, t, e)) = term.as_ite() {
                return Ok(format!(
                    "(ite {} {} {})",
                    term_to_smt(c)?,
                    term_to_smt(t)?,
                    term_to_smt(e)?
                ));
            }
            let args = args.iter().map(term_to_smt).collect::<Result<Vec<_>, _>>()?;
            format!("({} {})", symbol(f), args.join(" "))
        }
        Term::Subst(..) | Term::Assign(..) => {
            return Err(SolverError::Unsupported(format!("unknown refinement in obligation: {term}")));
        }
    };
    Ok(s)
}

#[cfg(test)]
mod tests {
    use lqt_term::parse_term;

    use super::*;

    #[test]
    fn renders_declarations_and_assertions() {
        let mut sorts = FxHashMap::default();
        sorts.insert("b".to_string(), SmtSort::Bool);
        let query = SmtQuery {
            sorts,
            assumptions: vec![parse_term("1_x = -1 && b").unwrap(), parse_term("len(s) >= 0").unwrap()],
            goal: parse_term("~(1_x != 0)").unwrap(),
        };
        let script = to_smtlib(&query).unwrap();
        let expected = "\
(set-option :produce-models true)
(declare-const |1_x| Int)
(declare-const b Bool)
(declare-const s Int)
(declare-fun len (Int) Int)
(assert (and (= |1_x| (- 1)) b))
(assert (>= (len s) 0))
(assert (not (not (= |1_x| 0))))
(check-sat)
(get-model)
";
        assert_eq!(script, expected);
    }

    #[test]
    fn kvars_are_rejected() {
        let query = SmtQuery::new(vec![], parse_term("$k[v:=x]").unwrap());
        assert!(matches!(to_smtlib(&query), Err(SolverError::Unsupported(_))));
    }

    #[test]
    fn parses_responses() {
        assert_eq!(parse_response("unsat\n(error \"model is not available\")\n").unwrap(), SatResult::Unsat);
        let sat = parse_response("sat\n(\n  (define-fun |0_a| () Int\n    (- 1))\n  (define-fun b () Bool true)\n)\n").unwrap();
        let SatResult::Sat(model) = sat else { panic!("expected sat") };
        assert_eq!(model.get("0_a"), Some("-1"));
        assert_eq!(model.to_string(), "0_a = -1, b = true");
        assert!(matches!(parse_response("unknown\n").unwrap(), SatResult::Unknown(_)));
        assert!(parse_response("segfault").is_err());
    }
}
