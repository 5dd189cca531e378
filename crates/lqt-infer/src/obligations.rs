//! Safety obligations of an analyzed function: the refinements declared on the parameters of every
//! function it calls, and its own declared result refinement.
use std::fmt;

use liquid_fixpoint::smt::{SmtQuery, SmtSort};
use lqt_graph::{AnalysisSession, VersionedId, hir::Ty, versioned_name};
use lqt_term::{Name, Term};
use rustc_hash::FxHashMap;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObligationKind {
    /// The argument passed for `param` at a call of `callee`.
    Argument { callee: Name, param: Name },
    Receiver { callee: Name },
    Return { function: Name },
    /// The declared refinement of a top-level value.
    Value { name: Name },
}

impl fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObligationKind::Argument { callee, param } => {
                write!(f, "argument `{param}` of call to `{callee}`")
            }
            ObligationKind::Receiver { callee } => write!(f, "receiver of call to `{callee}`"),
            ObligationKind::Return { function } => write!(f, "result of `{function}`"),
            ObligationKind::Value { name } => write!(f, "value `{name}`"),
        }
    }
}

/// `assumptions => not goal` must be valid, i.e. `assumptions && goal` unsatisfiable.
#[derive(Clone, Debug)]
pub struct Obligation {
    pub kind: ObligationKind,
    pub assumptions: Vec<Term>,
    /// The negated refinement.
    pub goal: Term,
    pub sorts: FxHashMap<Name, SmtSort>,
}

impl Obligation {
    pub fn to_smt(&self) -> SmtQuery {
        SmtQuery {
            sorts: self.sorts.clone(),
            assumptions: self.assumptions.clone(),
            goal: self.goal.clone(),
        }
    }
}

fn smt_sort(ty: &Ty) -> SmtSort {
    match ty {
        Ty::Bool => SmtSort::Bool,
        Ty::Str => SmtSort::Str,
        Ty::Int | Ty::Unit | Ty::Named(_) => SmtSort::Int,
    }
}

struct ObligationCtxt<'a> {
    session: &'a AnalysisSession,
    /// Declared refinements of the root function's own parameters.
    assumed: Vec<Term>,
    root_sorts: FxHashMap<Name, SmtSort>,
}

/// Obligations of the declaration `name` instantiated at `root`. Only calls made directly by the
/// declaration are considered, not the ones inside instantiated callee bodies.
pub fn collect(session: &AnalysisSession, root: VersionedId, name: &str) -> Vec<Obligation> {
    let root_node = &session.graph[session.versioned(root).node];
    let version = session.versioned(root).version;
    let mut assumed = vec![];
    let mut root_sorts = FxHashMap::default();
    if let Some(function) = root_node.as_function() {
        let params = function
            .params
            .iter()
            .chain(&function.dispatch_receiver)
            .chain(&function.extension_receiver);
        for &param in params {
            let Some(id) = session.lookup_versioned(param, version) else { continue };
            root_sorts.insert(session.versioned_var(id), smt_sort(&session.graph[param].ty));
            assumed.extend(session.versioned_declared(id));
        }
    }
    let cx = ObligationCtxt { session, assumed, root_sorts };

    let mut obligations = vec![];
    for id in session.versioned_closure(root) {
        if session.versioned(id).version == version {
            cx.call_obligations(id, &mut obligations);
        }
    }
    if let Some(refinement) = session.versioned_declared(root) {
        let kind = if root_node.as_function().is_some() {
            ObligationKind::Return { function: name.to_string() }
        } else {
            ObligationKind::Value { name: name.to_string() }
        };
        obligations.push(cx.obligation(kind, root, refinement));
    }
    obligations
}

impl ObligationCtxt<'_> {
    fn call_obligations(&self, id: VersionedId, out: &mut Vec<Obligation>) {
        let session = self.session;
        let v = session.versioned(id);
        let Some(call) = session.graph[v.node].as_call() else { return };
        let function = session.graph[call.callee].expect_function();
        // version of unbound callee variables
        let callee_version = v.callee.map_or(v.version, |callee| session.versioned(callee).version);

        let mut targets = vec![];
        for (idx, (&param, &arg)) in function.params.iter().zip(&call.args).enumerate() {
            let kind = ObligationKind::Argument {
                callee: function.name.clone(),
                param: function.param_names.get(idx).cloned().unwrap_or_default(),
            };
            targets.push((param, arg, kind));
        }
        if let (Some(param), Some(arg)) = (function.call_receiver(), call.receiver) {
            targets.push((param, arg, ObligationKind::Receiver { callee: function.name.clone() }));
        }

        let mut map = FxHashMap::default();
        let all_params = function
            .params
            .iter()
            .chain(&function.dispatch_receiver)
            .chain(&function.extension_receiver);
        for &param in all_params {
            let var = &session.graph[param].var;
            map.insert(var.clone(), Term::var(versioned_name(callee_version, var)));
        }
        for (param, arg, _) in &targets {
            let arg = versioned_name(v.version, &session.graph[*arg].var);
            map.insert(session.graph[*param].var.clone(), Term::var(arg));
        }

        for (param, _, kind) in targets {
            if let Some(declared) = &session.graph[param].declared {
                out.push(self.obligation(kind, id, declared.subst(&map)));
            }
        }
    }

    /// `refinement` is over versioned variables; the assumptions are the facts of `id`'s closure.
    fn obligation(&self, kind: ObligationKind, id: VersionedId, refinement: Term) -> Obligation {
        let session = self.session;
        let closure = session.versioned_closure(id);
        let mut sorts = self.root_sorts.clone();
        for &dep in &closure {
            let node = &session.graph[session.versioned(dep).node];
            sorts.insert(session.versioned_var(dep), smt_sort(&node.ty));
        }
        let mut assumptions = session.closure_predicates(id);
        assumptions.extend(self.assumed.iter().cloned());
        assumptions.retain(|t| !t.is_true());
        Obligation { kind, assumptions, goal: Term::not(refinement), sorts }
    }
}
