//! Randomized shrinking of a set of assumptions.
//!
//! Each step drops one randomly chosen assumption and checks the rest. A removal is undone only
//! when it turns a check that was not satisfiable into a satisfiable one. The number of steps is
//! capped, so the result is small but not necessarily 1-minimal.
use lqt_term::Term;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::smt::{SatCheck, SatResult};

pub struct DeltaDebugger {
    pub max_iterations: usize,
    rng: StdRng,
}

#[derive(Debug)]
pub struct Reduction {
    pub assumptions: Vec<Term>,
    /// Number of calls made to the checker, including the initial one.
    pub checks: usize,
    pub result: SatResult,
}

impl DeltaDebugger {
    pub fn new(max_iterations: usize, seed: u64) -> Self {
        DeltaDebugger { max_iterations, rng: StdRng::seed_from_u64(seed) }
    }

    pub fn reduce(&mut self, assumptions: Vec<Term>, checker: &mut impl SatCheck) -> Reduction {
        let mut current = assumptions;
        let mut result = checker.check(&current);
        let mut checks = 1;
        for iteration in 0..self.max_iterations {
            if current.is_empty() {
                break;
            }
            let idx = self.rng.gen_range(0..current.len());
            let mut candidate = current.clone();
            let removed = candidate.remove(idx);
            let next = checker.check(&candidate);
            checks += 1;
            if !result.is_sat() && next.is_sat() {
                debug!(iteration, %removed, "removal undone");
                continue;
            }
            debug!(iteration, %removed, remaining = candidate.len(), "removed");
            current = candidate;
            result = next;
        }
        Reduction { assumptions: current, checks, result }
    }
}
