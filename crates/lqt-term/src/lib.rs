//! Immutable refinement terms and the machinery to rewrite them.
//!
//! A [`Term`] is a closed tagged union. Terms are never mutated in place: every rewrite goes through
//! a [`TermFolder`], whose default methods rebuild each variant from its folded children.
mod fold;
mod format;
mod lexer;
pub mod parser;
mod term;

pub use fold::{FreeVars, Simplify, Subst, TermFolder};
pub use parser::{ParseError, parse_term};
pub use term::{Assignment, BinOp, Constant, Name, Term, UnOp};
