use std::{fmt, panic::AssertUnwindSafe};

use liquid_fixpoint::{delta::DeltaDebugger, smt::SatResult};
use lqt_common::{
    bug::catch_bugs,
    dbg::{self, check_decl_span},
};
use lqt_config::{self as config, SolverOpts};
use lqt_graph::{
    AnalysisSession, LowerError,
    hir::{DeclId, FrontEnd},
};
use lqt_infer::{CheckReport, Checker, Counterexample, Verdict};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::order;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Unsupported,
    MissingResolution,
    /// An internal invariant was violated while analyzing the declaration.
    Bug,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Skip {
    pub reason: SkipReason,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Verified,
    Violated(Counterexample),
    Inconclusive(String),
    Skipped(Skip),
}

impl Outcome {
    fn skipped(err: &LowerError) -> Outcome {
        let reason = match err {
            LowerError::Unsupported(_) => SkipReason::Unsupported,
            LowerError::MissingResolution(_) => SkipReason::MissingResolution,
        };
        Outcome::Skipped(Skip { reason, message: err.to_string() })
    }
}

impl From<Verdict> for Outcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Verified => Outcome::Verified,
            Verdict::Violated(cex) => Outcome::Violated(cex),
            Verdict::Inconclusive(reason) => Outcome::Inconclusive(reason),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DeclReport {
    pub name: String,
    pub outcome: Outcome,
    /// Refinement inferred for the result of a function.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred: Option<String>,
}

impl fmt::Display for DeclReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Verified => write!(f, "{}: verified", self.name),
            Outcome::Violated(cex) => write!(f, "{}: {cex}", self.name),
            Outcome::Inconclusive(reason) => write!(f, "{}: inconclusive ({reason})", self.name),
            Outcome::Skipped(skip) => write!(f, "{}: skipped ({})", self.name, skip.message),
        }
    }
}

pub struct Driver {
    checker: Checker,
    pub dump_query: bool,
    pub delta_iterations: usize,
    pub seed: u64,
}

impl Driver {
    pub fn new(opts: SolverOpts) -> Self {
        Driver {
            checker: Checker::new(opts),
            dump_query: false,
            delta_iterations: config::delta_iterations(),
            seed: config::seed(),
        }
    }

    pub fn from_flags() -> Self {
        let mut driver = Driver::new(SolverOpts::from_flags());
        driver.dump_query = config::dump_query();
        driver
    }

    /// Checks every included declaration, callees before their callers, and reports them in that
    /// order.
    pub fn check_program(&self, fe: &impl FrontEnd) -> Vec<DeclReport> {
        let mut session = AnalysisSession::new();
        let mut reports = vec![];
        for decl in order::callees_first(fe) {
            let Some(name) = fe.decl(decl).map(|d| d.name.clone()) else { continue };
            if !config::is_included(&name) {
                debug!(name = name.as_str(), "not included");
                continue;
            }
            let _span = check_decl_span!(name.as_str()).entered();
            reports.push(self.check_decl_catching_bugs(&mut session, fe, decl, name));
        }
        reports
    }

    fn check_decl_catching_bugs(
        &self,
        session: &mut AnalysisSession,
        fe: &impl FrontEnd,
        decl: DeclId,
        name: String,
    ) -> DeclReport {
        let mut this = AssertUnwindSafe((self, &mut *session, fe));
        let msg = format!("decl: {name}");
        let result = catch_bugs(&msg, move || {
            let (driver, session, fe) = &mut *this;
            driver.check_decl(session, *fe, decl, &name)
        });
        match result {
            Ok(report) => report,
            Err(bug) => {
                session.record_failure(decl, LowerError::Unsupported(bug.clone()));
                let name = fe.decl(decl).map(|d| d.name.clone()).unwrap_or_default();
                let outcome = Outcome::Skipped(Skip { reason: SkipReason::Bug, message: bug });
                DeclReport { name, outcome, inferred: None }
            }
        }
    }

    fn check_decl(
        &self,
        session: &mut AnalysisSession,
        fe: &impl FrontEnd,
        decl: DeclId,
        name: &str,
    ) -> DeclReport {
        let node = match session.build_decl(fe, decl) {
            Ok(node) => node,
            Err(err) => {
                warn!(name, %err, "skipping declaration");
                return DeclReport {
                    name: name.to_string(),
                    outcome: Outcome::skipped(&err),
                    inferred: None,
                };
            }
        };
        let report = self.checker.check_decl(session, node, name);
        if self.dump_query {
            self.dump(name, &report);
        }
        info!(name, verdict = ?report.verdict);
        DeclReport {
            name: name.to_string(),
            outcome: report.verdict.into(),
            inferred: session.inferred(node).map(ToString::to_string),
        }
    }

    /// Writes the fixpoint query and, for every obligation that holds, the assumptions it needs.
    fn dump(&self, name: &str, report: &CheckReport) {
        if let Err(err) = dbg::dump_item_info(name, "fq", &report.query.query) {
            warn!(%err, "cannot dump query");
        }
        let mut cores = String::new();
        for (obligation, result) in &report.results {
            if *result != SatResult::Unsat {
                continue;
            }
            let mut debugger = DeltaDebugger::new(self.delta_iterations, self.seed);
            let mut check = self.checker.smt().goal_check(&obligation.sorts, &obligation.goal);
            let reduction = debugger.reduce(obligation.assumptions.clone(), &mut check);
            cores.push_str(&format!("{} ({} checks):\n", obligation.kind, reduction.checks));
            for assumption in &reduction.assumptions {
                cores.push_str(&format!("  {assumption}\n"));
            }
        }
        if !cores.is_empty()
            && let Err(err) = dbg::dump_item_info(name, "core", &cores)
        {
            warn!(%err, "cannot dump assumption cores");
        }
    }
}
