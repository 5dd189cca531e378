//! Recursive-descent parser for the surface syntax shared by annotations and solver solutions.
//!
//! Precedence, from loosest to tightest: `<=>`, `=>` (right associative), `||`, `&&`, relations
//! (non associative), `+ -`, `* / % mod`, prefix `- ! ~ not`, atoms.
use std::fmt;

pub use crate::lexer::Token;
use crate::{
    lexer::tokenize,
    term::{Assignment, BinOp, Name, Term, UnOp},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Byte offset into the source.
    pub pos: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedEof,
    UnexpectedToken { found: String, expected: &'static str },
    InvalidChar(char),
    UnterminatedString,
    IntOverflow,
}

impl ParseErrorKind {
    pub(crate) fn at(self, pos: usize) -> ParseError {
        ParseError { kind: self, pos }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::UnexpectedEof => write!(f, "unexpected end of input")?,
            ParseErrorKind::UnexpectedToken { found, expected } => {
                write!(f, "unexpected {found}, expected {expected}")?;
            }
            ParseErrorKind::InvalidChar(c) => write!(f, "invalid character `{c}`")?,
            ParseErrorKind::UnterminatedString => write!(f, "unterminated string literal")?,
            ParseErrorKind::IntOverflow => write!(f, "integer literal out of range")?,
        }
        write!(f, " at offset {}", self.pos)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T = Term> = Result<T, ParseError>;

/// Parses `src` as a single term, requiring all input to be consumed.
pub fn parse_term(src: &str) -> ParseResult {
    let mut parser = Parser::new(src)?;
    let term = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(term)
}

const KEYWORDS: [&str; 9] = ["if", "then", "else", "true", "false", "mod", "not", "and", "or"];

pub struct Parser {
    tokens: Vec<(Token, usize)>,
    cursor: usize,
    eof: usize,
}

impl Parser {
    pub fn new(src: &str) -> ParseResult<Self> {
        Ok(Parser { tokens: tokenize(src)?, cursor: 0, eof: src.len() })
    }

    pub fn at_end(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(tok, _)| tok)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.cursor).map_or(self.eof, |(_, pos)| *pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.cursor).map(|(tok, _)| tok.clone());
        self.cursor += 1;
        tok
    }

    /// Consumes the next token if it is `tok`.
    pub fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        self.eat(&Token::Ident(kw.to_string()))
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Some(tok) => ParseErrorKind::UnexpectedToken { found: tok.descr(), expected }.at(self.pos()),
            None => ParseErrorKind::UnexpectedEof.at(self.pos()),
        }
    }

    pub fn expect(&mut self, tok: &Token, expected: &'static str) -> ParseResult<()> {
        if self.eat(tok) { Ok(()) } else { Err(self.unexpected(expected)) }
    }

    pub fn expect_end(&self) -> ParseResult<()> {
        if self.at_end() { Ok(()) } else { Err(self.unexpected("end of input")) }
    }

    pub fn parse_expr(&mut self) -> ParseResult {
        self.parse_iff()
    }

    /// Parses `$name` followed by any number of `[x:=e, ...]` groups.
    pub fn parse_kvar(&mut self) -> ParseResult<(Name, Vec<Assignment>)> {
        let Some(Token::KVar(name)) = self.peek().cloned() else {
            return Err(self.unexpected("unknown refinement"));
        };
        self.cursor += 1;
        let mut assignments = vec![];
        while self.eat(&Token::OpenBracket) {
            loop {
                let lhs = self.parse_ident()?;
                self.expect(&Token::ColonEq, "`:=`")?;
                let rhs = self.parse_expr()?;
                assignments.push(Assignment::new(Term::Var(lhs), rhs));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::CloseBracket, "`]`")?;
        }
        Ok((name, assignments))
    }

    fn parse_ident(&mut self) -> ParseResult<Name> {
        match self.peek() {
            Some(Token::Ident(name)) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.cursor += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn parse_iff(&mut self) -> ParseResult {
        let mut lhs = self.parse_imp()?;
        while self.eat(&Token::Iff) {
            let rhs = self.parse_imp()?;
            lhs = Term::binary(BinOp::Iff, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_imp(&mut self) -> ParseResult {
        let lhs = self.parse_or()?;
        if self.eat(&Token::FatArrow) {
            let rhs = self.parse_imp()?;
            return Ok(Term::imp(lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> ParseResult {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::OrOr) || self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Term::binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult {
        let mut lhs = self.parse_rel()?;
        while self.eat(&Token::AndAnd) || self.eat_keyword("and") {
            let rhs = self.parse_rel()?;
            lhs = Term::binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> ParseResult {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.cursor += 1;
        let rhs = self.parse_additive()?;
        Ok(Term::binary(op, lhs, rhs))
    }

    fn parse_additive(&mut self) -> ParseResult {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.cursor += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Term::binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult {
        let mut lhs = self.parse_prefix()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                Some(Token::Ident(kw)) if kw == "mod" => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.cursor += 1;
            let rhs = self.parse_prefix()?;
            lhs = Term::binary(op, lhs, rhs);
        }
    }

    fn parse_prefix(&mut self) -> ParseResult {
        if self.eat(&Token::Minus) {
            // keep negative literals as constants
            if let Some(Token::Int(n)) = self.peek() {
                let n = -*n;
                self.cursor += 1;
                return Ok(Term::int(n));
            }
            return Ok(Term::unary(UnOp::Neg, self.parse_prefix()?));
        }
        if self.eat(&Token::Not) || self.eat_keyword("not") {
            return Ok(Term::not(self.parse_prefix()?));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> ParseResult {
        match self.peek() {
            Some(Token::Int(n)) => {
                let n = *n;
                self.cursor += 1;
                Ok(Term::int(n))
            }
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.cursor += 1;
                Ok(Term::str(s))
            }
            Some(Token::KVar(_)) => {
                let (name, assignments) = self.parse_kvar()?;
                Ok(Term::kvar(name, assignments))
            }
            Some(Token::OpenParen) => {
                self.cursor += 1;
                let term = self.parse_expr()?;
                self.expect(&Token::CloseParen, "`)`")?;
                Ok(term)
            }
            Some(Token::Ident(kw)) if kw == "true" || kw == "false" => {
                let b = kw == "true";
                self.cursor += 1;
                Ok(Term::bool(b))
            }
            Some(Token::Ident(kw)) if kw == "if" => {
                self.cursor += 1;
                let cond = self.parse_expr()?;
                if !self.eat_keyword("then") {
                    return Err(self.unexpected("`then`"));
                }
                let then = self.parse_expr()?;
                if !self.eat_keyword("else") {
                    return Err(self.unexpected("`else`"));
                }
                let els = self.parse_expr()?;
                Ok(Term::ite(cond, then, els))
            }
            Some(Token::Ident(_)) => {
                let name = self.parse_ident()?;
                if self.eat(&Token::OpenParen) {
                    let mut args = vec![];
                    if !self.eat(&Token::CloseParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.eat(&Token::CloseParen) {
                                break;
                            }
                            self.expect(&Token::Comma, "`,` or `)`")?;
                        }
                    }
                    return Ok(Term::app(name, args));
                }
                Ok(Term::Var(name))
            }
            _ => {
                let err = self.unexpected("expression");
                self.bump();
                Err(err)
            }
        }
    }
}
