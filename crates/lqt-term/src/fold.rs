//! Rewriting of terms.
//!
//! [`Term::fold_with`] hands the term to [`TermFolder::fold_term`], which by default dispatches on
//! the variant through [`Term::super_fold_with`]. Every per-variant method rebuilds the node from
//! its folded children, so a folder only overrides the variants it cares about.

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::term::{Assignment, BinOp, Constant, Name, Term, UnOp};

pub trait TermFolder: Sized {
    fn fold_term(&mut self, term: &Term) -> Term {
        term.super_fold_with(self)
    }

    fn fold_var(&mut self, name: &Name) -> Term {
        Term::Var(name.clone())
    }

    fn fold_int(&mut self, n: i64) -> Term {
        Term::Constant(Constant::Int(n))
    }

    fn fold_bool(&mut self, b: bool) -> Term {
        Term::Constant(Constant::Bool(b))
    }

    fn fold_str(&mut self, s: &str) -> Term {
        Term::Constant(Constant::Str(s.to_string()))
    }

    fn fold_unary(&mut self, op: UnOp, arg: &Term) -> Term {
        Term::unary(op, arg.fold_with(self))
    }

    fn fold_binary(&mut self, op: BinOp, lhs: &Term, rhs: &Term) -> Term {
        Term::binary(op, lhs.fold_with(self), rhs.fold_with(self))
    }

    fn fold_app(&mut self, name: &Name, args: &[Term]) -> Term {
        Term::App(name.clone(), args.iter().map(|arg| arg.fold_with(self)).collect())
    }

    fn fold_subst(&mut self, name: &Name, assignments: &[Assignment]) -> Term {
        Term::Subst(name.clone(), assignments.iter().map(|a| self.fold_assignment(a)).collect())
    }

    fn fold_assignment(&mut self, assignment: &Assignment) -> Assignment {
        Assignment::new(assignment.lhs.fold_with(self), assignment.rhs.fold_with(self))
    }
}

impl Term {
    pub fn fold_with<F: TermFolder>(&self, folder: &mut F) -> Term {
        folder.fold_term(self)
    }

    pub fn super_fold_with<F: TermFolder>(&self, folder: &mut F) -> Term {
        match self {
            Term::Var(name) => folder.fold_var(name),
            Term::Constant(Constant::Int(n)) => folder.fold_int(*n),
            Term::Constant(Constant::Bool(b)) => folder.fold_bool(*b),
            Term::Constant(Constant::Str(s)) => folder.fold_str(s),
            Term::Unary(op, arg) => folder.fold_unary(*op, arg),
            Term::Binary(op, args) => {
                let [lhs, rhs] = &**args;
                folder.fold_binary(*op, lhs, rhs)
            }
            Term::App(name, args) => folder.fold_app(name, args),
            Term::Subst(name, assignments) => folder.fold_subst(name, assignments),
            Term::Assign(assignment) => Term::Assign(Box::new(folder.fold_assignment(assignment))),
        }
    }

    /// Replaces free occurrences of the mapped variables.
    pub fn subst(&self, map: &FxHashMap<Name, Term>) -> Term {
        if map.is_empty() {
            return self.clone();
        }
        self.fold_with(&mut Subst::new(map))
    }

    pub fn subst_var(&self, from: &str, to: Term) -> Term {
        let mut map = FxHashMap::default();
        map.insert(from.to_string(), to);
        self.subst(&map)
    }

    /// Free variables in first-occurrence order.
    pub fn free_vars(&self) -> Vec<Name> {
        let mut collector = FreeVars::default();
        self.fold_with(&mut collector);
        collector.into_vars()
    }

    pub fn simplify(&self) -> Term {
        self.fold_with(&mut Simplify)
    }
}

/// Substitutes variables by terms. The left-hand side of an [`Assignment`] is a binder for the
/// unknown's formal parameter and is only renamed when it maps to another variable.
pub struct Subst<'a> {
    map: &'a FxHashMap<Name, Term>,
}

impl<'a> Subst<'a> {
    pub fn new(map: &'a FxHashMap<Name, Term>) -> Self {
        Subst { map }
    }
}

impl TermFolder for Subst<'_> {
    fn fold_var(&mut self, name: &Name) -> Term {
        self.map.get(name).cloned().unwrap_or_else(|| Term::Var(name.clone()))
    }

    fn fold_assignment(&mut self, assignment: &Assignment) -> Assignment {
        let lhs = match &assignment.lhs {
            Term::Var(x) if matches!(self.map.get(x), Some(Term::Var(_))) => self.fold_var(x),
            lhs => lhs.clone(),
        };
        Assignment::new(lhs, assignment.rhs.fold_with(self))
    }
}

/// Collects free variables. Acts as the identity on the term it folds.
#[derive(Default)]
pub struct FreeVars {
    vars: Vec<Name>,
}

impl FreeVars {
    pub fn into_vars(self) -> Vec<Name> {
        self.vars
    }
}

impl TermFolder for FreeVars {
    fn fold_var(&mut self, name: &Name) -> Term {
        if !self.vars.contains(name) {
            self.vars.push(name.clone());
        }
        Term::Var(name.clone())
    }

    fn fold_assignment(&mut self, assignment: &Assignment) -> Assignment {
        // the left-hand side names a formal of the unknown, not a free variable
        Assignment::new(assignment.lhs.clone(), assignment.rhs.fold_with(self))
    }
}

/// Bottom-up constant folding of boolean connectives.
pub struct Simplify;

impl TermFolder for Simplify {
    fn fold_unary(&mut self, op: UnOp, arg: &Term) -> Term {
        let arg = arg.fold_with(self);
        match (op, arg) {
            (UnOp::Not, Term::Constant(Constant::Bool(b))) => Term::bool(!b),
            (UnOp::Not, Term::Unary(UnOp::Not, inner)) => *inner,
            (UnOp::Neg, Term::Constant(Constant::Int(n))) if n != i64::MIN => Term::int(-n),
            (op, arg) => Term::unary(op, arg),
        }
    }

    fn fold_binary(&mut self, op: BinOp, lhs: &Term, rhs: &Term) -> Term {
        let lhs = lhs.fold_with(self);
        let rhs = rhs.fold_with(self);
        let as_bool = |t: &Term| if let Term::Constant(Constant::Bool(b)) = t { Some(*b) } else { None };
        match (op, as_bool(&lhs), as_bool(&rhs)) {
            (BinOp::And, Some(true), _) | (BinOp::Or, Some(false), _) => rhs,
            (BinOp::And, _, Some(true)) | (BinOp::Or, _, Some(false)) => lhs,
            (BinOp::And, Some(false), _) | (BinOp::And, _, Some(false)) => Term::FALSE,
            (BinOp::Or, Some(true), _) | (BinOp::Or, _, Some(true)) => Term::TRUE,
            (BinOp::Imp, Some(true), _) => rhs,
            (BinOp::Imp, Some(false), _) | (BinOp::Imp, _, Some(true)) => Term::TRUE,
            (BinOp::Eq, _, _) if lhs == rhs => Term::TRUE,
            _ => Term::binary(op, lhs, rhs),
        }
    }

    fn fold_app(&mut self, name: &Name, args: &[Term]) -> Term {
        let args = args.iter().map(|arg| arg.fold_with(self)).collect_vec();
        if let Some((c, a, b)) = Term::App(name.clone(), args.clone()).as_ite() {
            match c {
                Term::Constant(Constant::Bool(true)) => return a.clone(),
                Term::Constant(Constant::Bool(false)) => return b.clone(),
                _ if a == b => return a.clone(),
                _ => {}
            }
        }
        Term::App(name.clone(), args)
    }
}
