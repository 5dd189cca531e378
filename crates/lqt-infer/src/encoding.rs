//! Encoding a versioned function graph as a fixpoint query.
use liquid_fixpoint::{BindId, Environment, Predicate, Query, Solution, Type};
use lqt_graph::{AnalysisSession, NodeId, VersionedId, hir::Ty};
use lqt_term::{Name, Term};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::qualifiers::{self, FIXPOINT_QUALIFIERS};

/// Value variable of every refinement in the query.
pub const VALUE_VAR: &str = "v";

/// A query together with what its unknowns stand for.
pub struct FixpointQuery {
    pub query: Query,
    /// Unknown refinement name to the versioned node it refines.
    pub kvars: FxHashMap<Name, VersionedId>,
    pub root: VersionedId,
}

pub fn sort_of(ty: &Ty) -> Type {
    match ty {
        Ty::Bool => Type::bool(),
        Ty::Str => Type::str(),
        Ty::Int | Ty::Unit | Ty::Named(_) => Type::int(),
    }
}

fn kvar_name(var: &str) -> Name {
    format!("k_{var}")
}

pub(crate) struct FixpointCtxt<'a> {
    session: &'a AnalysisSession,
    root: VersionedId,
    /// Parameters and receivers of the root function, whose declared refinements are assumed.
    root_params: FxHashSet<NodeId>,
    query: Query,
    kvars: FxHashMap<Name, VersionedId>,
    binds: FxHashMap<VersionedId, BindId>,
}

impl<'a> FixpointCtxt<'a> {
    pub(crate) fn new(session: &'a AnalysisSession, root: VersionedId) -> Self {
        let mut root_params = FxHashSet::default();
        if let Some(function) = session.graph[session.versioned(root).node].as_function() {
            root_params.extend(function.params.iter().copied());
            root_params.extend(function.dispatch_receiver);
            root_params.extend(function.extension_receiver);
        }
        FixpointCtxt {
            session,
            root,
            root_params,
            query: Query::new(),
            kvars: FxHashMap::default(),
            binds: FxHashMap::default(),
        }
    }

    pub(crate) fn encode(mut self) -> FixpointQuery {
        for qualifier in FIXPOINT_QUALIFIERS.iter() {
            self.query.add_qualifier(qualifier.clone());
        }

        let mut order = vec![];
        self.post_order(self.root, &mut FxHashSet::default(), &mut order);
        for &id in &order {
            self.encode_bind(id);
        }
        self.scrape_qualifiers(&order);
        for &id in &order {
            self.encode_branches(id);
        }
        self.encode_result();

        debug!(
            binds = self.query.binds.len(),
            constraints = self.query.constraints.len(),
            wfs = self.query.wfs.len(),
            "encoded query"
        );
        FixpointQuery { query: self.query, kvars: self.kvars, root: self.root }
    }

    /// Dependencies before dependents.
    fn post_order(
        &self,
        id: VersionedId,
        visited: &mut FxHashSet<VersionedId>,
        order: &mut Vec<VersionedId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        for &dep in &self.session.versioned(id).deps {
            self.post_order(dep, visited, order);
        }
        order.push(id);
    }

    fn is_root_param(&self, id: VersionedId) -> bool {
        let v = self.session.versioned(id);
        v.version == self.session.versioned(self.root).version && self.root_params.contains(&v.node)
    }

    fn ty(&self, id: VersionedId) -> Type {
        sort_of(&self.session.graph[self.session.versioned(id).node].ty)
    }

    fn encode_bind(&mut self, id: VersionedId) {
        let session = self.session;
        let var = session.versioned_var(id);
        let mut facts = session.versioned_pred(id);
        if self.is_root_param(id) {
            facts.extend(session.versioned_declared(id));
        }
        let terms: Vec<Term> = facts
            .iter()
            .flat_map(|fact| fact.simplify().conjuncts())
            .map(|fact| fact.subst_var(&var, Term::var(VALUE_VAR)))
            .collect();
        for term in &terms {
            for (name, arity) in term.uninterpreted_apps() {
                self.query.add_constant(name, Type::function_of_arity(arity));
            }
        }
        let bind = self.query.add_bind(var, Predicate::new(VALUE_VAR, self.ty(id), terms));
        self.binds.insert(id, bind);
    }

    fn scrape_qualifiers(&mut self, order: &[VersionedId]) {
        let session = self.session;
        let mut seen = FxHashSet::default();
        for &id in order {
            let node = &session.graph[session.versioned(id).node];
            let Some(declared) = &node.declared else { continue };
            if !seen.insert(declared.clone()) {
                continue;
            }
            let name = format!("Annot{}", seen.len() - 1);
            if let Some(qualifier) = qualifiers::scrape(name, declared, &node.var) {
                self.query.add_qualifier(qualifier);
            }
        }
    }

    /// Each outcome of a conditional flows into an unknown refinement of the merged value.
    fn encode_branches(&mut self, id: VersionedId) {
        let facts = self.session.versioned_pred(id);
        let Some((_, value)) = facts.first().and_then(Term::as_eq) else { return };
        let Some((cond, then, els)) = value.as_ite() else { return };

        let ty = self.ty(id);
        let kvar = self.fresh_kvar(id);
        let merged = Predicate::new(VALUE_VAR, ty.clone(), vec![kvar]);
        let v = Term::var(VALUE_VAR);
        for (guard, branch) in [(cond.clone(), then), (Term::not(cond.clone()), els)] {
            let lhs = Predicate::new(
                VALUE_VAR,
                ty.clone(),
                vec![guard, Term::eq(v.clone(), branch.clone())],
            );
            self.query.add_constraint(self.query.full_env(), lhs, merged.clone());
        }
        self.query.add_wf(self.wf_env(id), merged);
    }

    /// The root function's result flows into its own unknown refinement, the summary callers get.
    fn encode_result(&mut self) {
        let session = self.session;
        let root = session.versioned(self.root);
        let Some(function) = session.graph[root.node].as_function() else { return };
        let Some(ret) = function.ret else { return };
        let Some(ret) = session.lookup_versioned(ret, root.version) else { return };

        let ty = self.ty(self.root);
        let kvar = self.fresh_kvar(self.root);
        let result = Predicate::new(VALUE_VAR, ty.clone(), vec![kvar]);
        let lhs = Predicate::new(
            VALUE_VAR,
            ty,
            vec![Term::eq(Term::var(VALUE_VAR), Term::var(session.versioned_var(ret)))],
        );
        self.query.add_constraint(self.query.full_env(), lhs, result.clone());
        self.query.add_wf(self.wf_env(self.root), result);
    }

    /// Every bind except the refined node's own, which would let `v = <node>` qualify as a
    /// solution.
    fn wf_env(&self, id: VersionedId) -> Environment {
        let own = self.binds.get(&id).copied();
        Environment::new(self.query.full_env().iter().filter(|&bind| Some(bind) != own))
    }

    fn fresh_kvar(&mut self, id: VersionedId) -> Term {
        let name = kvar_name(&self.session.versioned_var(id));
        self.kvars.insert(name.clone(), id);
        Term::kvar(name, vec![])
    }
}

/// Solutions folded back onto the nodes they refine, each over the node's versioned variable.
#[derive(Debug, Default)]
pub struct Refinements {
    by_node: FxHashMap<VersionedId, Term>,
}

impl Refinements {
    pub fn new(session: &AnalysisSession, fq: &FixpointQuery, solutions: &[Solution]) -> Self {
        let mut by_node = FxHashMap::default();
        for solution in solutions {
            let Some(&id) = fq.kvars.get(&solution.name) else {
                debug!(name = %solution.name, "solution for unknown kvar");
                continue;
            };
            let var = Term::var(session.versioned_var(id));
            by_node.insert(id, solution.refinement().subst_var(VALUE_VAR, var).simplify());
        }
        Refinements { by_node }
    }

    pub fn get(&self, id: VersionedId) -> Option<&Term> {
        self.by_node.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// The refinement of `root` over the unversioned variables of its graph, when it only mentions
    /// variables of `root`'s own instantiation and says something.
    pub fn summary(&self, session: &AnalysisSession, root: VersionedId) -> Option<Term> {
        let term = self.get(root)?;
        if term.is_true() {
            return None;
        }
        let prefix = format!("{}_", session.versioned(root).version);
        let mut map = FxHashMap::default();
        for x in term.free_vars() {
            let base = Term::var(x.strip_prefix(&prefix)?);
            map.insert(x, base);
        }
        Some(term.subst(&map))
    }
}
