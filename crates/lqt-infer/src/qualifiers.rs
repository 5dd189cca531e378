use std::sync::LazyLock;

use liquid_fixpoint::{Qualifier, Type};
use lqt_term::{BinOp, Term};

fn qualifier(name: &str, arity: u32, body: Term) -> Qualifier {
    let params = ["v", "x"]
        .into_iter()
        .zip(0..arity)
        .map(|(name, idx)| (name.to_string(), Type::Positional(idx)))
        .collect();
    Qualifier { name: name.to_string(), params, body }
}

fn cmp(op: BinOp, rhs: Term) -> Term {
    Term::binary(op, Term::var("v"), rhs)
}

pub(crate) static FIXPOINT_QUALIFIERS: LazyLock<[Qualifier; 12]> = LazyLock::new(|| {
    let zero = || Term::int(0);
    let x = || Term::var("x");
    [
        // UNARY
        qualifier("EqZero", 1, cmp(BinOp::Eq, zero())),
        qualifier("GtZero", 1, cmp(BinOp::Gt, zero())),
        qualifier("GeZero", 1, cmp(BinOp::Ge, zero())),
        qualifier("LtZero", 1, cmp(BinOp::Lt, zero())),
        qualifier("LeZero", 1, cmp(BinOp::Le, zero())),
        // BINARY
        qualifier("Eq", 2, cmp(BinOp::Eq, x())),
        qualifier("Gt", 2, cmp(BinOp::Gt, x())),
        qualifier("Ge", 2, cmp(BinOp::Ge, x())),
        qualifier("Lt", 2, cmp(BinOp::Lt, x())),
        qualifier("Le", 2, cmp(BinOp::Le, x())),
        // BOOL
        qualifier("EqTrue", 1, cmp(BinOp::Eq, Term::TRUE)),
        qualifier("EqFalse", 1, cmp(BinOp::Eq, Term::FALSE)),
    ]
});

/// A qualifier from a declared refinement mentioning no variable but the annotated one.
pub(crate) fn scrape(name: String, refinement: &Term, var: &str) -> Option<Qualifier> {
    if refinement.free_vars() != [var] {
        return None;
    }
    Some(qualifier(&name, 1, refinement.subst_var(var, Term::var("v"))))
}
