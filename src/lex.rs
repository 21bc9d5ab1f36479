use miette::{Diagnostic, SourceSpan};
use thiserror::Error;
use tracing::trace;

use crate::token::{OperatorKind, Token, TokenKind};

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
#[error("{kind}")]
#[diagnostic(
    code(calcrepl::lex),
    help("numbers look like `12`, `.5`, `3.25` or `2.5e-3`")
)]
pub struct LexError {
    pub kind: LexErrorKind,

    #[label("here")]
    pub span: SourceSpan,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexErrorKind {
    #[error("invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("invalid character: second decimal point in number")]
    RepeatedDot,
    #[error("malformed scientific notation")]
    MalformedExponent,
    #[error("incomplete scientific notation")]
    IncompleteExponent,
    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),
}

/// Splits an expression into tokens.
///
/// Whitespace is dropped before scanning, so it never separates tokens: `s in(x)` reads as
/// `sin(x)`. Spans still refer to byte offsets in the original text.
pub struct Lexer {
    chars: Vec<(usize, char)>,
    pos: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).collect()
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            chars: input
                .char_indices()
                .filter(|(_, c)| !c.is_whitespace())
                .collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<(usize, char)> {
        self.chars.get(self.pos).copied()
    }

    fn char_at(&self, pos: usize) -> Option<char> {
        self.chars.get(pos).map(|&(_, c)| c)
    }

    fn fail(&mut self, kind: LexErrorKind, span: impl Into<SourceSpan>) -> LexError {
        // every lexing error ends the scan
        self.pos = self.chars.len();
        LexError {
            kind,
            span: span.into(),
        }
    }

    fn single(&mut self, kind: TokenKind, offset: usize, c: char) -> Token {
        self.pos += 1;
        Token::new(kind, offset..offset + c.len_utf8())
    }

    fn number(&mut self) -> Result<Token, LexError> {
        let start = self.chars[self.pos].0;
        let mut end = start;
        let mut literal = String::new();
        let mut dotted = false;
        let mut scientific = false;

        while let Some((offset, c)) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' if scientific => {
                    return Err(self.fail(LexErrorKind::MalformedExponent, offset..offset + 1));
                }
                '.' if dotted => {
                    return Err(self.fail(LexErrorKind::RepeatedDot, offset..offset + 1));
                }
                '.' => {
                    if literal.is_empty() {
                        literal.push('0');
                    }
                    dotted = true;
                }
                'e' | 'E' if literal.ends_with(|c: char| c.is_ascii_digit()) => {
                    if scientific {
                        return Err(self.fail(LexErrorKind::MalformedExponent, offset..offset + 1));
                    }
                    scientific = true;
                }
                '+' | '-' if literal.ends_with(['e', 'E']) => {}
                _ => break,
            }
            literal.push(c);
            end = offset + c.len_utf8();
            self.pos += 1;
        }

        if literal.ends_with(['e', 'E', '+', '-']) {
            return Err(self.fail(LexErrorKind::IncompleteExponent, start..end));
        }
        if literal.ends_with('.') {
            literal.push('0');
        }

        match literal.parse() {
            Ok(n) => Ok(Token::new(TokenKind::Number(n), start..end)),
            Err(_) => Err(self.fail(LexErrorKind::InvalidNumber(literal), start..end)),
        }
    }

    /// True when the characters after the cursor spell `suffix` followed by `(`.
    fn followed_by_call(&self, suffix: &str) -> bool {
        let n = suffix.chars().count();
        suffix
            .chars()
            .enumerate()
            .all(|(i, c)| self.char_at(self.pos + i) == Some(c))
            && self.char_at(self.pos + n) == Some('(')
    }

    fn identifier(&mut self) -> Token {
        let start = self.chars[self.pos].0;
        let mut end = start;
        let mut name = String::new();

        while let Some((offset, c)) = self.peek() {
            if !c.is_ascii_alphabetic() {
                break;
            }
            name.push(c);
            end = offset + 1;
            self.pos += 1;
        }

        // `log10(` and `atan2(` would otherwise split into a name and a number
        let suffix = match name.as_str() {
            "log" => Some("10"),
            "atan" => Some("2"),
            _ => None,
        };
        if let Some(suffix) = suffix
            && self.followed_by_call(suffix)
        {
            self.pos += suffix.len();
            end = self.chars[self.pos - 1].0 + 1;
            name.push_str(suffix);
            return Token::new(TokenKind::Function(name), start..end);
        }

        let kind = if self.char_at(self.pos) == Some('(') {
            TokenKind::Function(name)
        } else {
            TokenKind::Variable(name)
        };
        Token::new(kind, start..end)
    }
}

impl Iterator for Lexer {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (offset, c) = self.peek()?;

        let token = match c {
            '0'..='9' | '.' => self.number(),
            c if c.is_ascii_alphabetic() => Ok(self.identifier()),
            '(' => Ok(self.single(TokenKind::LeftParen, offset, c)),
            ')' => Ok(self.single(TokenKind::RightParen, offset, c)),
            ',' => Ok(self.single(TokenKind::Comma, offset, c)),
            c => match OperatorKind::from_symbol(c) {
                Some(op) => Ok(self.single(TokenKind::Operator(op), offset, c)),
                None => Err(self.fail(
                    LexErrorKind::InvalidCharacter(c),
                    offset..offset + c.len_utf8(),
                )),
            },
        };

        if let Ok(token) = &token {
            trace!(%token, "lexed");
        }
        Some(token)
    }
}
