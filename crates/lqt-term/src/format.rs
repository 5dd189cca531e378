//! Rendering of terms in fixpoint surface syntax. The output parses back with
//! [`parse_term`](crate::parse_term).
use std::fmt;

use crate::term::{Assignment, BinOp, Constant, Term, UnOp};

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(name) => write!(f, "{name}"),
            Term::Constant(c) => write!(f, "{c}"),
            Term::Unary(op, arg) => write!(f, "({op}{arg})"),
            Term::Binary(op, args) => write!(f, "({} {op} {})", args[0], args[1]),
            Term::App(name, args) => {
                if let Some((c, t, e)) = self.as_ite() {
                    return write!(f, "(if {c} then {t} else {e})");
                }
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Term::Subst(name, assignments) => {
                write!(f, "${name}")?;
                for assignment in assignments {
                    write!(f, "[{assignment}]")?;
                }
                Ok(())
            }
            Term::Assign(assignment) => write!(f, "{assignment}"),
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:={}", self.lhs, self.rhs)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) if *n < 0 => write!(f, "(-{})", n.unsigned_abs()),
            Constant::Int(n) => write!(f, "{n}"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Str(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
        }
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Not => write!(f, "~"),
            UnOp::Neg => write!(f, "-"),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "mod",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Imp => "=>",
            BinOp::Iff => "<=>",
        };
        f.write_str(s)
    }
}
