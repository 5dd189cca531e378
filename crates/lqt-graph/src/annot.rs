use lqt_term::{Name, Term, parse_term};
use rustc_hash::FxHashMap;

use crate::{LowerError, LowerResult};

/// Identifier denoting the annotated entity.
pub(crate) const IT: &str = "it";

/// Lowers the annotation `src`: `it` becomes `it_var` and every other identifier is looked up
/// with `resolve`.
pub(crate) fn lower_annotation(
    src: &str,
    it_var: &str,
    resolve: impl Fn(&str) -> Option<Name>,
) -> LowerResult<Term> {
    let term = parse_term(src).map_err(|err| {
        LowerError::Unsupported(format!("malformed annotation `{src}`: {err}"))
    })?;
    let mut map = FxHashMap::default();
    for x in term.free_vars() {
        let target = if x == IT {
            it_var.to_string()
        } else {
            resolve(&x).ok_or_else(|| {
                LowerError::MissingResolution(format!("`{x}` in annotation `{src}`"))
            })?
        };
        map.insert(x, Term::Var(target));
    }
    Ok(term.subst(&map))
}
