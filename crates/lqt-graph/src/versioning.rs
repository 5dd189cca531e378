//! Version-tagged copies of subgraphs.
//!
//! A function's nodes are shared by all its call sites. To reason about two calls of the same
//! function in one query, every call instantiates the callee at a fresh [`Version`], and each
//! variable is prefixed with the version of the node owning it before it is handed to a solver.
use std::{collections::VecDeque, fmt};

use lqt_common::{
    bug,
    index::IndexVec,
    newtype_index,
};
use lqt_term::{Name, Term};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    AnalysisSession, NodeId,
    liquid::{CallData, FunctionData, LiquidKind},
};

newtype_index! {
    pub struct VersionedId;
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Version(pub u32);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node at a version. Dependencies of a node share its version, except the callee of a call,
/// which lives at a version of its own.
#[derive(Debug)]
pub struct VersionedLiquidType {
    pub node: NodeId,
    pub version: Version,
    pub deps: Vec<VersionedId>,
    /// Instantiated callee of a non-recursive call.
    pub callee: Option<VersionedId>,
}

#[derive(Default)]
pub(crate) struct VersionTable {
    arena: IndexVec<VersionedId, VersionedLiquidType>,
    memo: FxHashMap<(NodeId, Version), VersionedId>,
    last_version: u32,
}

pub fn versioned_name(version: Version, var: &str) -> Name {
    format!("{version}_{var}")
}

impl AnalysisSession {
    /// A version never handed out before in this session. Version `0` is never returned.
    pub fn fresh_version(&mut self) -> Version {
        self.versions.last_version += 1;
        Version(self.versions.last_version)
    }

    /// Instantiates `node` at a fresh version.
    pub fn instantiate_root(&mut self, node: NodeId) -> VersionedId {
        let version = self.fresh_version();
        self.instantiate(node, version)
    }

    /// Returns the unique versioned node for `(node, version)`, creating it and its dependencies
    /// on first request.
    pub fn instantiate(&mut self, node: NodeId, version: Version) -> VersionedId {
        if let Some(&id) = self.versions.memo.get(&(node, version)) {
            return id;
        }
        let callee = match &self.graph[node].kind {
            LiquidKind::Call(call) if !call.recursive => Some(call.callee),
            _ => None,
        };
        let callee_version = callee.map(|_| self.fresh_version());

        let mut deps = vec![];
        let mut versioned_callee = None;
        for dep in self.graph[node].depends_on.clone() {
            if Some(dep) == callee
                && let Some(callee_version) = callee_version
            {
                let id = self.instantiate(dep, callee_version);
                versioned_callee = Some(id);
                deps.push(id);
            } else {
                deps.push(self.instantiate(dep, version));
            }
        }
        let id = self.versions.arena.push(VersionedLiquidType {
            node,
            version,
            deps,
            callee: versioned_callee,
        });
        self.versions.memo.insert((node, version), id);
        id
    }

    pub fn versioned(&self, id: VersionedId) -> &VersionedLiquidType {
        &self.versions.arena[id]
    }

    pub fn versioned_count(&self) -> usize {
        self.versions.arena.len()
    }

    pub fn lookup_versioned(&self, node: NodeId, version: Version) -> Option<VersionedId> {
        self.versions.memo.get(&(node, version)).copied()
    }

    pub fn versioned_var(&self, id: VersionedId) -> Name {
        let v = self.versioned(id);
        versioned_name(v.version, &self.graph[v.node].var)
    }

    /// `root` followed by everything it transitively depends on, breadth first.
    pub fn versioned_closure(&self, root: VersionedId) -> Vec<VersionedId> {
        let mut seen = FxHashSet::default();
        let mut order = vec![];
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if seen.insert(id) {
                order.push(id);
                queue.extend(self.versioned(id).deps.iter().copied());
            }
        }
        order
    }

    /// Renames the free variables of `term`, which belongs to versioned node `id`. Variables of the
    /// node's direct dependencies take the version of that dependency, the return value of an
    /// instantiated callee takes the callee's version and everything else takes the node's own.
    pub fn rename_in(&self, id: VersionedId, term: &Term) -> Term {
        let v = self.versioned(id);
        let mut versions: FxHashMap<&str, Version> = FxHashMap::default();
        for &dep in &v.deps {
            let dep = self.versioned(dep);
            versions.insert(&self.graph[dep.node].var, dep.version);
        }
        if let Some(callee) = v.callee {
            let callee = self.versioned(callee);
            if let Some(ret) = self.graph[callee.node].expect_function().ret {
                versions.insert(&self.graph[ret].var, callee.version);
            }
        }
        versions.insert(&self.graph[v.node].var, v.version);

        let map: FxHashMap<Name, Term> = term
            .free_vars()
            .into_iter()
            .map(|x| {
                let version = versions.get(x.as_str()).copied().unwrap_or(v.version);
                let renamed = Term::var(versioned_name(version, &x));
                (x, renamed)
            })
            .collect();
        term.subst(&map)
    }

    /// The facts known about versioned node `id`, over versioned variables: its own predicate and,
    /// for a call, the equalities binding the callee's parameters to the arguments. A recursive
    /// call stands for the callee's inferred refinement when one has been recorded.
    pub fn versioned_pred(&self, id: VersionedId) -> Vec<Term> {
        let v = self.versioned(id);
        let node = &self.graph[v.node];
        let mut preds = vec![];
        if let Some(pred) = node.pred() {
            preds.push(self.rename_in(id, pred));
        }
        let Some(call) = node.as_call() else { return preds };

        if call.recursive {
            preds.extend(self.recursive_summary(id));
            return preds;
        }
        let Some(callee) = v.callee else { bug!("call `{}` was not instantiated", node.var) };
        let callee_version = self.versioned(callee).version;
        let function = self.graph[call.callee].expect_function();
        for (param, arg) in bindings(function, call) {
            let param = versioned_name(callee_version, &self.graph[param].var);
            let arg = versioned_name(v.version, &self.graph[arg].var);
            preds.push(Term::eq(Term::var(param), Term::var(arg)));
        }
        preds
    }

    /// The inferred refinement of a recursive call's callee with the function's variable and
    /// parameters replaced by the call's variable and arguments.
    fn recursive_summary(&self, id: VersionedId) -> Option<Term> {
        let v = self.versioned(id);
        let node = &self.graph[v.node];
        let call = node.as_call()?;
        let inferred = self.inferred(call.callee)?;
        let function = self.graph[call.callee].expect_function();

        let mut map = FxHashMap::default();
        map.insert(
            self.graph[call.callee].var.clone(),
            Term::var(versioned_name(v.version, &node.var)),
        );
        for (param, arg) in bindings(function, call) {
            map.insert(
                self.graph[param].var.clone(),
                Term::var(versioned_name(v.version, &self.graph[arg].var)),
            );
        }
        // a summary mentioning anything else cannot be placed at this call
        if inferred.free_vars().iter().any(|x| !map.contains_key(x)) {
            return None;
        }
        Some(inferred.subst(&map))
    }

    /// The declared refinement of versioned node `id`, over versioned variables.
    pub fn versioned_declared(&self, id: VersionedId) -> Option<Term> {
        let declared = self.graph[self.versioned(id).node].declared.as_ref()?;
        Some(self.rename_in(id, declared))
    }

    /// Every fact of the closure of `root`, dependencies' facts in breadth-first order.
    pub fn closure_predicates(&self, root: VersionedId) -> Vec<Term> {
        self.versioned_closure(root)
            .into_iter()
            .flat_map(|id| self.versioned_pred(id))
            .collect()
    }
}

/// Callee parameters paired with the call's arguments, the receiver last.
fn bindings(function: &FunctionData, call: &CallData) -> Vec<(NodeId, NodeId)> {
    let mut pairs: Vec<_> = function.params.iter().copied().zip(call.args.iter().copied()).collect();
    pairs.extend(function.call_receiver().zip(call.receiver));
    pairs
}
