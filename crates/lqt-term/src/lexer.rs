use std::fmt;

use crate::parser::{ParseError, ParseErrorKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    /// `$name`, an unknown refinement.
    KVar(String),
    Int(i64),
    Str(String),
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Comma,
    Semi,
    ColonEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// Both `=` and `==`.
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    /// Both `!` and `~`.
    Not,
    FatArrow,
    Iff,
}

impl Token {
    pub fn descr(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier `{name}`"),
            Token::KVar(name) => format!("`${name}`"),
            Token::Int(n) => format!("literal `{n}`"),
            Token::Str(s) => format!("literal {s:?}"),
            tok => format!("`{tok}`"),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::Ident(name) => return write!(f, "{name}"),
            Token::KVar(name) => return write!(f, "${name}"),
            Token::Int(n) => return write!(f, "{n}"),
            Token::Str(s) => return write!(f, "{s:?}"),
            Token::OpenParen => "(",
            Token::CloseParen => ")",
            Token::OpenBracket => "[",
            Token::CloseBracket => "]",
            Token::Comma => ",",
            Token::Semi => ";",
            Token::ColonEq => ":=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Eq => "=",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Not => "~",
            Token::FatArrow => "=>",
            Token::Iff => "<=>",
        };
        f.write_str(s)
    }
}

/// Longest match first.
static PUNCTUATION: [(&str, Token); 25] = [
    ("<=>", Token::Iff),
    (":=", Token::ColonEq),
    ("==", Token::Eq),
    ("=>", Token::FatArrow),
    ("!=", Token::Ne),
    ("<=", Token::Le),
    (">=", Token::Ge),
    ("&&", Token::AndAnd),
    ("||", Token::OrOr),
    ("(", Token::OpenParen),
    (")", Token::CloseParen),
    ("[", Token::OpenBracket),
    ("]", Token::CloseBracket),
    (",", Token::Comma),
    (";", Token::Semi),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("*", Token::Star),
    ("/", Token::Slash),
    ("%", Token::Percent),
    ("=", Token::Eq),
    ("<", Token::Lt),
    (">", Token::Gt),
    ("!", Token::Not),
    ("~", Token::Not),
];

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '\''
}

/// Splits `src` into tokens paired with their byte offsets.
///
/// A run starting with a digit is an identifier if it contains any non-digit identifier character,
/// so versioned names such as `3_x_1` lex as a single identifier.
pub fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = vec![];
    let mut chars = src.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if is_ident_char(c) || c == '$' {
            chars.next();
            let start = if c == '$' { pos + 1 } else { pos };
            let mut end = pos + c.len_utf8();
            while let Some(&(i, c)) = chars.peek() {
                if !is_ident_char(c) {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            let word = &src[start..end];
            let tok = if c == '$' {
                if word.is_empty() {
                    return Err(ParseErrorKind::InvalidChar('$').at(pos));
                }
                Token::KVar(word.to_string())
            } else if word.bytes().all(|b| b.is_ascii_digit()) {
                let n = word.parse().map_err(|_| ParseErrorKind::IntOverflow.at(pos))?;
                Token::Int(n)
            } else {
                Token::Ident(word.to_string())
            };
            tokens.push((tok, pos));
            continue;
        }
        if c == '"' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some((_, '"')) => break,
                    Some((_, '\\')) => {
                        match chars.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, 't')) => s.push('\t'),
                            Some((_, c)) => s.push(c),
                            None => return Err(ParseErrorKind::UnterminatedString.at(pos)),
                        }
                    }
                    Some((_, c)) => s.push(c),
                    None => return Err(ParseErrorKind::UnterminatedString.at(pos)),
                }
            }
            tokens.push((Token::Str(s), pos));
            continue;
        }
        let Some((punct, tok)) = PUNCTUATION.iter().find(|(punct, _)| src[pos..].starts_with(punct))
        else {
            return Err(ParseErrorKind::InvalidChar(c).at(pos));
        };
        for _ in 0..punct.len() {
            chars.next();
        }
        let tok = tok.clone();
        tokens.push((tok, pos));
    }
    Ok(tokens)
}
