use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub fn as_atom(&self) -> Option<&str> {
        if let Sexp::Atom(s) = self { Some(s) } else { None }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(s) => write!(f, "{s}"),
            Sexp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseError {
    pub msg: &'static str,
    pub pos: usize,
}

/// Parses a sequence of s-expressions. Quoted symbols `|..|` are returned without the bars,
/// string literals keep their quotes, and `;` starts a line comment.
pub fn parse(text: &str) -> Result<Vec<Sexp>, ParseError> {
    let mut stack: Vec<Vec<Sexp>> = vec![vec![]];
    let mut chars = text.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        match c {
            '(' => stack.push(vec![]),
            ')' => {
                let list = stack.pop().filter(|_| !stack.is_empty());
                let Some(list) = list else {
                    return Err(ParseError { msg: "unbalanced `)`", pos });
                };
                push(&mut stack, Sexp::List(list));
            }
            ';' => {
                while chars.next_if(|&(_, c)| c != '\n').is_some() {}
            }
            '|' => {
                let mut atom = String::new();
                loop {
                    match chars.next() {
                        Some((_, '|')) => break,
                        Some((_, c)) => atom.push(c),
                        None => return Err(ParseError { msg: "unterminated `|`", pos }),
                    }
                }
                push(&mut stack, Sexp::Atom(atom));
            }
            '"' => {
                let mut atom = String::from('"');
                loop {
                    match chars.next() {
                        // `""` escapes a quote
                        Some((_, '"')) if chars.next_if(|&(_, c)| c == '"').is_some() => {
                            atom.push_str("\"\"");
                        }
                        Some((_, '"')) => break,
                        Some((_, c)) => atom.push(c),
                        None => return Err(ParseError { msg: "unterminated string", pos }),
                    }
                }
                atom.push('"');
                push(&mut stack, Sexp::Atom(atom));
            }
            c if c.is_whitespace() => {}
            c => {
                let mut atom = String::from(c);
                while let Some((_, c)) =
                    chars.next_if(|&(_, c)| !c.is_whitespace() && !"()|\";".contains(c))
                {
                    atom.push(c);
                }
                push(&mut stack, Sexp::Atom(atom));
            }
        }
    }
    match <[_; 1]>::try_from(stack) {
        Ok([top]) => Ok(top),
        Err(_) => Err(ParseError { msg: "unbalanced `(`", pos: text.len() }),
    }
}

fn push(stack: &mut [Vec<Sexp>], sexp: Sexp) {
    if let Some(top) = stack.last_mut() {
        top.push(sexp);
    }
}
