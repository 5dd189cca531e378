use std::fmt;

use itertools::Itertools;

use crate::{
    Bind, BindId, ConstantDecl, Constraint, Environment, Predicate, Qualifier, Query, Type,
    WfConstraint,
};

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for qualif in &self.qualifiers {
            writeln!(f, "{qualif}")?;
        }
        writeln!(f)?;

        for constant in &self.constants {
            writeln!(f, "{constant}")?;
        }
        writeln!(f)?;

        for bind in &self.binds {
            writeln!(f, "{bind}")?;
        }
        writeln!(f)?;

        for cstr in &self.constraints {
            writeln!(f, "{cstr}")?;
        }

        for wf in &self.wfs {
            writeln!(f, "{wf}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "qualif {}({}): ({})",
            self.name,
            self.params
                .iter()
                .format_with(", ", |(name, ty), f| f(&format_args!("{name} : {ty}"))),
            self.body
        )
    }
}

impl fmt::Display for ConstantDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constant {} : ({})", self.name, self.ty)
    }
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bind {} {} : {}", self.id.as_u32(), self.name, self.pred)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "constraint:")?;
        writeln!(f, "  env {}", self.env)?;
        writeln!(f, "  lhs {}", self.lhs)?;
        writeln!(f, "  rhs {}", self.rhs)?;
        writeln!(f, "  id {} tag []", self.id.as_u32())
    }
}

impl fmt::Display for WfConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "wf:")?;
        writeln!(f, "  env {}", self.env)?;
        writeln!(f, "  reft {}", self.pred)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.iter().map(BindId::as_u32).format("; "))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} : {} | [{}]}}", self.name, self.ty, self.terms.iter().format("; "))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Named(name) => write!(f, "{name}"),
            Type::Positional(i) => write!(f, "@({i})"),
            Type::Parametric(name, args) => write!(f, "({name} {})", args.iter().format(" ")),
            Type::Function { params, output } => {
                write!(f, "func(0, [{}; {output}])", params.iter().format("; "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lqt_term::{BinOp, Term};

    use crate::{Predicate, Qualifier, Query, Type};

    #[test]
    fn sections_have_fixed_order() {
        let mut query = Query::new();
        let x = query.add_bind("x", Predicate::new("v", Type::int(), vec![]));
        let pred = Predicate::new(
            "v",
            Type::int(),
            vec![Term::eq(Term::var("v"), Term::binary(BinOp::Add, Term::var("x"), Term::int(1)))],
        );
        let y = query.add_bind("y", pred);
        let k = Predicate::new("v", Type::int(), vec![Term::kvar("k_y", vec![])]);
        query.add_wf(query.full_env(), k.clone());
        query.add_constraint(query.full_env(), Predicate::new("v", Type::int(), vec![]), k);
        query.add_constant("len", Type::function_of_arity(1));
        query.add_qualifier(Qualifier {
            name: "GtZero".into(),
            params: vec![("v".into(), Type::Positional(0))],
            body: Term::binary(BinOp::Gt, Term::var("v"), Term::int(0)),
        });
        assert_eq!((x.as_u32(), y.as_u32()), (0, 1));

        let expected = "\
qualif GtZero(v : @(0)): ((v > 0))

constant len : (func(0, [int; int]))

bind 0 x : {v : int | []}
bind 1 y : {v : int | [(v = (x + 1))]}

constraint:
  env [0; 1]
  lhs {v : int | []}
  rhs {v : int | [$k_y]}
  id 0 tag []

wf:
  env [0; 1]
  reft {v : int | [$k_y]}

";
        assert_eq!(query.to_string(), expected);
    }
}
