//! Checking one function: encode its graph as a fixpoint query to infer the refinements of its
//! unknowns, then discharge its safety obligations with an SMT solver.
mod encoding;
pub mod obligations;
mod qualifiers;

use std::fmt;

pub use encoding::{FixpointQuery, Refinements, VALUE_VAR, sort_of};
use liquid_fixpoint::{
    Solver,
    smt::{Model, SatResult, SmtSolver},
};
use lqt_config::SolverOpts;
use lqt_graph::{AnalysisSession, NodeId, VersionedId};
use obligations::Obligation;
use serde::Serialize;
use tracing::{debug, info};

use crate::encoding::FixpointCtxt;

/// Encodes the function instantiated at `root`.
pub fn encode(session: &AnalysisSession, root: VersionedId) -> FixpointQuery {
    FixpointCtxt::new(session, root).encode()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Counterexample {
    /// The obligation that does not hold.
    pub obligation: String,
    pub model: Model,
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} may be violated when {}", self.obligation, self.model)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Violated(Counterexample),
    Inconclusive(String),
}

impl Verdict {
    /// A violation wins over an inconclusive check, which wins over success.
    pub fn aggregate<'a>(
        results: impl IntoIterator<Item = (&'a Obligation, &'a SatResult)>,
    ) -> Verdict {
        let mut verdict = Verdict::Verified;
        for (obligation, result) in results {
            match result {
                SatResult::Sat(model) => {
                    return Verdict::Violated(Counterexample {
                        obligation: obligation.kind.to_string(),
                        model: model.clone(),
                    });
                }
                SatResult::Unknown(reason) => {
                    if verdict == Verdict::Verified {
                        verdict = Verdict::Inconclusive(format!("{}: {reason}", obligation.kind));
                    }
                }
                SatResult::Unsat => {}
            }
        }
        verdict
    }
}

pub struct CheckReport {
    pub root: VersionedId,
    pub query: FixpointQuery,
    pub refinements: Refinements,
    pub results: Vec<(Obligation, SatResult)>,
    pub verdict: Verdict,
}

/// Both solver back ends.
pub struct Checker {
    solver: Solver,
    smt: SmtSolver,
}

impl Checker {
    pub fn new(opts: SolverOpts) -> Self {
        Checker { smt: SmtSolver::new(&opts), solver: Solver::new(opts) }
    }

    pub fn smt(&self) -> &SmtSolver {
        &self.smt
    }

    /// Checks the declaration `name` whose node is `decl`. The inferred refinement of a function's
    /// result is recorded in `session` before the obligations are collected, so recursive calls
    /// can use it.
    pub fn check_decl(
        &self,
        session: &mut AnalysisSession,
        decl: NodeId,
        name: &str,
    ) -> CheckReport {
        let root = session.instantiate_root(decl);
        let query = encode(session, root);

        let solutions = if query.query.wfs.is_empty() {
            debug!("no unknowns, skipping fixpoint");
            vec![]
        } else {
            self.solver.solve(&query.query)
        };
        let refinements = Refinements::new(session, &query, &solutions);
        if let Some(summary) = refinements.summary(session, root) {
            info!(%summary, "inferred result refinement");
            session.record_inferred(decl, summary);
        }

        let results: Vec<_> = obligations::collect(session, root, name)
            .into_iter()
            .map(|obligation| {
                let result = self.smt.check(&obligation.to_smt());
                debug!(obligation = %obligation.kind, ?result);
                (obligation, result)
            })
            .collect();
        let verdict = Verdict::aggregate(results.iter().map(|(o, r)| (o, r)));
        CheckReport { root, query, refinements, results, verdict }
    }
}
