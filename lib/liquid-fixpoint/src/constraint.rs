use std::collections::BTreeSet;

use lqt_common::{index::IndexGen, newtype_index};
use lqt_term::{Name, Term};

newtype_index! {
    pub struct BindId;
}

newtype_index! {
    pub struct ConstraintId;
}

newtype_index! {
    pub struct WfId;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// A base sort such as `int`, `bool` or `Str`.
    Named(Name),
    /// The `i`-th sort variable of a qualifier, written `@(i)`.
    Positional(u32),
    Parametric(Name, Vec<Type>),
    Function { params: Vec<Type>, output: Box<Type> },
}

impl Type {
    pub fn int() -> Type {
        Type::Named("int".to_string())
    }

    pub fn bool() -> Type {
        Type::Named("bool".to_string())
    }

    pub fn str() -> Type {
        Type::Named("Str".to_string())
    }

    /// The sort of an uninterpreted function taking `arity` integers to an integer.
    pub fn function_of_arity(arity: usize) -> Type {
        Type::Function { params: vec![Type::int(); arity], output: Box::new(Type::int()) }
    }
}

/// A refinement `{ name : ty | [terms] }`. The terms are read as a conjunction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    pub name: Name,
    pub ty: Type,
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn new(name: impl Into<Name>, ty: Type, terms: Vec<Term>) -> Self {
        Predicate { name: name.into(), ty, terms }
    }
}

#[derive(Clone, Debug)]
pub struct Bind {
    pub id: BindId,
    pub name: Name,
    pub pred: Predicate,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment(BTreeSet<BindId>);

impl Environment {
    pub fn new(binds: impl IntoIterator<Item = BindId>) -> Self {
        Environment(binds.into_iter().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = BindId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Under the assumptions in `env`, `lhs` implies `rhs`.
#[derive(Clone, Debug)]
pub struct Constraint {
    pub id: ConstraintId,
    pub env: Environment,
    pub lhs: Predicate,
    pub rhs: Predicate,
}

/// Declares the unknown refinement in `pred` to be well formed in `env`.
#[derive(Clone, Debug)]
pub struct WfConstraint {
    pub id: WfId,
    pub env: Environment,
    pub pred: Predicate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Qualifier {
    pub name: Name,
    pub params: Vec<(Name, Type)>,
    pub body: Term,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantDecl {
    pub name: Name,
    pub ty: Type,
}

/// A Horn-clause query. Every section is kept apart so the serialization order does not depend on
/// the order in which items were added.
#[derive(Default)]
pub struct Query {
    pub qualifiers: Vec<Qualifier>,
    pub constants: Vec<ConstantDecl>,
    pub binds: Vec<Bind>,
    pub constraints: Vec<Constraint>,
    pub wfs: Vec<WfConstraint>,
    bind_gen: IndexGen<BindId>,
    constraint_gen: IndexGen<ConstraintId>,
    wf_gen: IndexGen<WfId>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_qualifier(&mut self, qualifier: Qualifier) {
        if !self.qualifiers.iter().any(|q| q.name == qualifier.name) {
            self.qualifiers.push(qualifier);
        }
    }

    /// Declares an uninterpreted constant. Redeclarations are ignored.
    pub fn add_constant(&mut self, name: impl Into<Name>, ty: Type) {
        let name = name.into();
        if !self.constants.iter().any(|c| c.name == name) {
            self.constants.push(ConstantDecl { name, ty });
        }
    }

    pub fn add_bind(&mut self, name: impl Into<Name>, pred: Predicate) -> BindId {
        let id = self.bind_gen.fresh();
        self.binds.push(Bind { id, name: name.into(), pred });
        id
    }

    pub fn add_constraint(
        &mut self,
        env: Environment,
        lhs: Predicate,
        rhs: Predicate,
    ) -> ConstraintId {
        let id = self.constraint_gen.fresh();
        self.constraints.push(Constraint { id, env, lhs, rhs });
        id
    }

    pub fn add_wf(&mut self, env: Environment, pred: Predicate) -> WfId {
        let id = self.wf_gen.fresh();
        self.wfs.push(WfConstraint { id, env, pred });
        id
    }

    /// An environment with every bind added so far.
    pub fn full_env(&self) -> Environment {
        Environment::new(self.binds.iter().map(|bind| bind.id))
    }

    pub fn bind(&self, id: BindId) -> Option<&Bind> {
        self.binds.iter().find(|bind| bind.id == id)
    }
}
