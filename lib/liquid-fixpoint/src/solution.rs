use lqt_term::{Assignment, Name, Term, parser::{ParseError, Parser, Token}};
use rustc_hash::FxHashMap;

/// The candidate refinements the solver found for one unknown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    pub name: Name,
    pub assignments: Vec<Assignment>,
    pub candidates: Vec<Term>,
}

impl Solution {
    /// The disjunction of all candidates with the pending substitutions applied. An unknown
    /// without candidates tells nothing and is read as `true`.
    pub fn refinement(&self) -> Term {
        if self.candidates.is_empty() {
            return Term::TRUE;
        }
        let mut map = FxHashMap::default();
        for assignment in &self.assignments {
            if let Some(x) = assignment.lhs.as_var() {
                map.insert(x.to_string(), assignment.rhs.clone());
            }
        }
        Term::or(self.candidates.iter().map(|candidate| candidate.subst(&map)))
    }
}

/// Parses the contents of a solution file. Every line starting with `$` has the shape
/// `$name[x:=e]... e; e; ...`; other lines are ignored.
pub fn parse_solutions(text: &str) -> Result<Vec<Solution>, ParseError> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('$'))
        .map(parse_solution_line)
        .collect()
}

fn parse_solution_line(line: &str) -> Result<Solution, ParseError> {
    let mut parser = Parser::new(line)?;
    let (name, assignments) = parser.parse_kvar()?;
    let mut candidates = vec![];
    while !parser.at_end() {
        candidates.push(parser.parse_expr()?);
        if !parser.eat(&Token::Semi) {
            break;
        }
    }
    parser.expect_end()?;
    Ok(Solution { name, assignments, candidates })
}
