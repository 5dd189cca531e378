use itertools::Itertools;

pub type Name = String;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Term {
    Var(Name),
    Constant(Constant),
    Unary(UnOp, Box<Term>),
    Binary(BinOp, Box<[Term; 2]>),
    /// Application of a named predicate or function, e.g. `ite(c, a, b)` or `len(s)`.
    App(Name, Vec<Term>),
    /// An unknown refinement `$k` with pending substitutions `$k[x:=e]...`.
    Subst(Name, Vec<Assignment>),
    Assign(Box<Assignment>),
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Assignment {
    pub lhs: Term,
    pub rhs: Term,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Str(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Imp,
    Iff,
}

impl BinOp {
    pub fn is_relation(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or | BinOp::Imp | BinOp::Iff)
    }

    /// Whether the operator produces a boolean.
    pub fn is_predicate(self) -> bool {
        self.is_relation() || self.is_logical()
    }
}

/// Name of the predicate application used for conditional values.
pub const ITE: &str = "ite";

impl Term {
    pub const TRUE: Term = Term::Constant(Constant::Bool(true));
    pub const FALSE: Term = Term::Constant(Constant::Bool(false));

    pub fn var(name: impl Into<Name>) -> Term {
        Term::Var(name.into())
    }

    pub fn int(n: i64) -> Term {
        Term::Constant(Constant::Int(n))
    }

    pub fn bool(b: bool) -> Term {
        Term::Constant(Constant::Bool(b))
    }

    pub fn str(s: impl Into<String>) -> Term {
        Term::Constant(Constant::Str(s.into()))
    }

    pub fn unary(op: UnOp, arg: Term) -> Term {
        Term::Unary(op, Box::new(arg))
    }

    pub fn binary(op: BinOp, lhs: Term, rhs: Term) -> Term {
        Term::Binary(op, Box::new([lhs, rhs]))
    }

    pub fn eq(lhs: Term, rhs: Term) -> Term {
        Term::binary(BinOp::Eq, lhs, rhs)
    }

    pub fn not(arg: Term) -> Term {
        Term::unary(UnOp::Not, arg)
    }

    pub fn imp(lhs: Term, rhs: Term) -> Term {
        Term::binary(BinOp::Imp, lhs, rhs)
    }

    pub fn ite(cond: Term, then: Term, els: Term) -> Term {
        Term::App(ITE.to_string(), vec![cond, then, els])
    }

    pub fn app(name: impl Into<Name>, args: Vec<Term>) -> Term {
        Term::App(name.into(), args)
    }

    pub fn kvar(name: impl Into<Name>, assignments: Vec<Assignment>) -> Term {
        Term::Subst(name.into(), assignments)
    }

    /// Right-nested conjunction; the empty conjunction is `true`.
    pub fn and(terms: impl IntoIterator<Item = Term>) -> Term {
        Self::fold_op(BinOp::And, terms).unwrap_or(Term::TRUE)
    }

    /// Right-nested disjunction; the empty disjunction is `false`.
    pub fn or(terms: impl IntoIterator<Item = Term>) -> Term {
        Self::fold_op(BinOp::Or, terms).unwrap_or(Term::FALSE)
    }

    fn fold_op(op: BinOp, terms: impl IntoIterator<Item = Term>) -> Option<Term> {
        let terms = terms.into_iter().collect_vec();
        terms.into_iter().rev().reduce(|acc, t| Term::binary(op, t, acc))
    }

    pub fn as_var(&self) -> Option<&str> {
        if let Term::Var(name) = self { Some(name) } else { None }
    }

    pub fn as_eq(&self) -> Option<(&Term, &Term)> {
        match self {
            Term::Binary(BinOp::Eq, args) => Some((&args[0], &args[1])),
            _ => None,
        }
    }

    pub fn as_ite(&self) -> Option<(&Term, &Term, &Term)> {
        match self {
            Term::App(name, args) if name == ITE && args.len() == 3 => {
                Some((&args[0], &args[1], &args[2]))
            }
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Term::Constant(Constant::Bool(true)))
    }

    /// The top-level conjuncts of the term, with literal `true`s removed.
    pub fn conjuncts(&self) -> Vec<Term> {
        fn go(term: &Term, out: &mut Vec<Term>) {
            match term {
                Term::Binary(BinOp::And, args) => {
                    go(&args[0], out);
                    go(&args[1], out);
                }
                t if t.is_true() => {}
                t => out.push(t.clone()),
            }
        }
        let mut out = vec![];
        go(self, &mut out);
        out
    }

    /// Names of all applications other than `ite`, with their arity, in first-occurrence order.
    pub fn uninterpreted_apps(&self) -> Vec<(Name, usize)> {
        fn go(term: &Term, out: &mut Vec<(Name, usize)>) {
            match term {
                Term::Var(_) | Term::Constant(_) => {}
                Term::Unary(_, arg) => go(arg, out),
                Term::Binary(_, args) => args.iter().for_each(|a| go(a, out)),
                Term::App(name, args) => {
                    if name != ITE && !out.iter().any(|(n, _)| n == name) {
                        out.push((name.clone(), args.len()));
                    }
                    args.iter().for_each(|a| go(a, out));
                }
                Term::Subst(_, assignments) => {
                    assignments.iter().for_each(|a| go(&a.rhs, out));
                }
                Term::Assign(a) => go(&a.rhs, out),
            }
        }
        let mut out = vec![];
        go(self, &mut out);
        out
    }
}

impl From<Constant> for Term {
    fn from(c: Constant) -> Self {
        Term::Constant(c)
    }
}

impl Assignment {
    pub fn new(lhs: Term, rhs: Term) -> Self {
        Assignment { lhs, rhs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjuncts_flatten_and_drop_true() {
        let t = Term::and([
            Term::var("a"),
            Term::TRUE,
            Term::and([Term::var("b"), Term::var("c")]),
        ]);
        assert_eq!(t.conjuncts(), vec![Term::var("a"), Term::var("b"), Term::var("c")]);
        assert!(Term::and([]).conjuncts().is_empty());
    }

    #[test]
    fn ite_is_recognized() {
        let t = Term::ite(Term::var("c"), Term::int(1), Term::int(2));
        let (c, a, b) = t.as_ite().unwrap();
        assert_eq!(c, &Term::var("c"));
        assert_eq!(a, &Term::int(1));
        assert_eq!(b, &Term::int(2));
        assert!(Term::app("f", vec![Term::int(1)]).as_ite().is_none());
    }

    #[test]
    fn uninterpreted_apps_skip_ite() {
        let t = Term::ite(
            Term::app("p", vec![Term::var("x")]),
            Term::app("len", vec![Term::var("s")]),
            Term::app("len", vec![Term::var("t")]),
        );
        assert_eq!(t.uninterpreted_apps(), vec![("p".to_string(), 1), ("len".to_string(), 1)]);
    }
}
