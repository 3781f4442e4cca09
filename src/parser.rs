//! Minimal S-expression reader for recipe files.
//!
//! ```lisp
//! ; comments run to end of line
//! (recipe "memcached" "1.4.5"
//!   (unpack "http://example.org/memcached-${version}.tar.gz"
//!     (configure "--with-libevent=${pwd}/__ext__")
//!     (make install)))
//! ```

use crate::ast::Expr;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: unexpected end of input")]
    UnexpectedEof { line: usize },
    #[error("line {line}: unexpected character '{ch}'")]
    UnexpectedChar { line: usize, ch: char },
    #[error("line {line}: unclosed string")]
    UnclosedString { line: usize },
    #[error("line {line}: unclosed list")]
    UnclosedList { line: usize },
}

/// A top-level expression together with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub expr: Expr,
    pub line: usize,
}

/// Parse every top-level expression in a file.
pub fn parse_all(input: &str) -> Result<Vec<Form>, ParseError> {
    let mut reader = Reader::new(input);
    let mut forms = Vec::new();
    loop {
        reader.skip_blank();
        if reader.peek().is_none() {
            return Ok(forms);
        }
        let line = reader.line;
        let expr = reader.expr()?;
        forms.push(Form { expr, line });
    }
}

struct Reader<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.skip_blank();
        match self.peek() {
            None => Err(ParseError::UnexpectedEof { line: self.line }),
            Some('(') => self.list(),
            Some('"') => self.string(),
            Some(')') => Err(ParseError::UnexpectedChar {
                line: self.line,
                ch: ')',
            }),
            Some(_) => Ok(self.atom()),
        }
    }

    fn list(&mut self) -> Result<Expr, ParseError> {
        let opened_at = self.line;
        self.bump(); // '('
        let mut items = Vec::new();

        loop {
            self.skip_blank();
            match self.peek() {
                None => return Err(ParseError::UnclosedList { line: opened_at }),
                Some(')') => {
                    self.bump();
                    return Ok(Expr::List(items));
                }
                Some(_) => items.push(self.expr()?),
            }
        }
    }

    fn string(&mut self) -> Result<Expr, ParseError> {
        let opened_at = self.line;
        self.bump(); // '"'
        let mut s = String::new();

        loop {
            match self.bump() {
                None => return Err(ParseError::UnclosedString { line: opened_at }),
                Some('"') => return Ok(Expr::Atom(s)),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some(c) => {
                        s.push('\\');
                        s.push(c);
                    }
                    None => return Err(ParseError::UnclosedString { line: opened_at }),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn atom(&mut self) -> Expr {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';') {
                break;
            }
            s.push(c);
            self.bump();
        }
        Expr::Atom(s)
    }

    fn skip_blank(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            }
            if self.peek() != Some(';') {
                break;
            }
            while self.peek().is_some_and(|c| c != '\n') {
                self.bump();
            }
        }
    }
}
