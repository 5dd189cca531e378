use lqt_term::Term;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    LowerError, NodeId,
    hir::DeclId,
    liquid::LiquidGraph,
    versioning::VersionTable,
};

/// State of one analysis run: the node arena, memo tables and counters. Nothing is shared between
/// sessions, so a fresh session starts from a clean slate.
#[derive(Default)]
pub struct AnalysisSession {
    pub graph: LiquidGraph,
    pub(crate) versions: VersionTable,
    /// Functions whose body is being analyzed.
    pub(crate) in_progress: FxHashSet<NodeId>,
    /// Top-level values whose initializer is being analyzed.
    pub(crate) active_vals: FxHashSet<DeclId>,
    pub(crate) failed: FxHashMap<DeclId, LowerError>,
    var_count: usize,
    inferred: FxHashMap<NodeId, Term>,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A variable name unique within this session, `<hint>_<n>`.
    pub(crate) fn fresh_var(&mut self, hint: &str) -> String {
        let hint: String = hint
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let hint = if hint.is_empty() { "t" } else { hint.as_str() };
        let n = self.var_count;
        self.var_count += 1;
        format!("{hint}_{n}")
    }

    /// Marks `decl` as failed after its analysis was aborted from outside the builder, so later
    /// references to it fail too instead of seeing a half-built graph.
    pub fn record_failure(&mut self, decl: DeclId, err: LowerError) {
        self.in_progress.clear();
        self.active_vals.clear();
        self.failed.insert(decl, err);
    }

    pub fn is_in_progress(&self, node: NodeId) -> bool {
        self.in_progress.contains(&node)
    }

    /// Stores the refinement inferred for `node`, over the node's own variable.
    pub fn record_inferred(&mut self, node: NodeId, refinement: Term) {
        self.inferred.insert(node, refinement);
    }

    pub fn inferred(&self, node: NodeId) -> Option<&Term> {
        self.inferred.get(&node)
    }
}
