use miette::{Diagnostic, SourceSpan};
use thiserror::Error;
use tracing::debug;

use crate::{
    ast::Node,
    token::{OperatorKind, Token, TokenKind},
};

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
#[error("{kind}")]
#[diagnostic(code(calcrepl::parse))]
pub struct ParseError {
    pub kind: ParseErrorKind,

    #[label("here")]
    pub span: SourceSpan,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("expected '(' after function `{0}`")]
    ExpectedCallParen(String),
    #[error("expected ')'")]
    ExpectedClosingParen,
    #[error("expected an operand, found `{0}`")]
    ExpectedOperand(String),
    #[error("unexpected `{0}` after the end of the expression")]
    TrailingToken(String),
    #[error("expression nests deeper than {0} levels")]
    NestingTooDeep(usize),
}

/// Levels of nested sub-expressions and unary operators one parse may open. Postfix `!` is
/// capped separately at the same count for the whole input.
pub const MAX_NESTING: usize = 256;

/// Precedence-climbing parser over an already lexed token list.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Offset just past the last token, where end-of-input errors point.
    end: usize,
    depth: usize,
    factorials: usize,
}

impl Parser {
    /// Takes ownership of `tokens`, marking every `+`/`-` in prefix position as unary.
    ///
    /// Prefix position means: first token, or right after `(`, `,` or an operator other than
    /// the postfix `!`.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        for i in 0..tokens.len() {
            let unary = match tokens[i].kind {
                TokenKind::Operator(OperatorKind::Add) => OperatorKind::UnaryPlus,
                TokenKind::Operator(OperatorKind::Subtract) => OperatorKind::UnaryMinus,
                _ => continue,
            };
            let prefix = match i.checked_sub(1).map(|prev| &tokens[prev].kind) {
                None | Some(TokenKind::LeftParen | TokenKind::Comma) => true,
                Some(TokenKind::Operator(op)) => *op != OperatorKind::Factorial,
                Some(_) => false,
            };
            if prefix {
                tokens[i].kind = TokenKind::Operator(unary);
            }
        }

        let end = tokens
            .last()
            .map_or(0, |token| token.span.offset() + token.span.len());

        Parser {
            tokens,
            pos: 0,
            end,
            depth: 0,
            factorials: 0,
        }
    }

    /// Parses one expression covering every token.
    pub fn parse(mut self) -> Result<Node, ParseError> {
        let node = self.parse_expression(0)?;
        if let Some(token) = self.peek() {
            return Err(ParseError {
                kind: ParseErrorKind::TrailingToken(token.kind.to_string()),
                span: token.span,
            });
        }
        debug!(%node, "parsed");
        Ok(node)
    }

    /// Parses the longest expression whose infix operators bind at least as tightly as
    /// `min_bp`, stopping at the first token that cannot continue it.
    ///
    /// Right operands are parsed with the operator's own binding power as the floor, so runs
    /// of equal precedence group to the right: `2^3^2` is `2^(3^2)`.
    ///
    /// Fails with [`ParseErrorKind::NestingTooDeep`] once more than [`MAX_NESTING`] levels are
    /// open, before the recursion can exhaust the stack.
    pub fn parse_expression(&mut self, min_bp: u8) -> Result<Node, ParseError> {
        let depth = self.depth;
        self.descend()?;
        let node = self.parse_within(min_bp);
        self.depth = depth;
        node
    }

    fn parse_within(&mut self, min_bp: u8) -> Result<Node, ParseError> {
        let mut lhs = self.parse_term()?;

        loop {
            let op = match self.peek() {
                Some(Token {
                    kind: TokenKind::Operator(op),
                    ..
                }) if op.is_binary() => *op,
                _ => break,
            };
            let bp = op.binding_power();
            if bp < min_bp {
                break;
            }
            self.pos += 1;

            let rhs = self.parse_expression(bp)?;
            lhs = Node::binary(op, lhs, rhs);
        }

        self.postfix(lhs)
    }

    fn parse_term(&mut self) -> Result<Node, ParseError> {
        let Some(token) = self.next() else {
            return Err(self.at_end(ParseErrorKind::UnexpectedEnd));
        };

        let term = match token.kind {
            TokenKind::Number(n) => Node::Number(n),
            TokenKind::Variable(name) => Node::Variable(name),
            TokenKind::Function(name) => {
                self.expect(TokenKind::LeftParen, || {
                    ParseErrorKind::ExpectedCallParen(name.clone())
                })?;
                let arguments = self.parse_arguments()?;
                self.expect(TokenKind::RightParen, || ParseErrorKind::ExpectedClosingParen)?;
                Node::Function { name, arguments }
            }
            TokenKind::LeftParen => {
                let inner = self.parse_expression(0)?;
                self.expect(TokenKind::RightParen, || ParseErrorKind::ExpectedClosingParen)?;
                inner
            }
            TokenKind::Operator(op) if op.is_unary() => {
                let operand = self.parse_expression(op.binding_power())?;
                return Ok(Node::unary(op, operand));
            }
            kind => {
                return Err(ParseError {
                    kind: ParseErrorKind::ExpectedOperand(kind.to_string()),
                    span: token.span,
                });
            }
        };

        self.postfix(term)
    }

    /// Arguments after the opening parenthesis, up to but not including `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut arguments = Vec::new();
        if self.next_is(&TokenKind::RightParen) {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.parse_expression(0)?);
            if !self.next_is(&TokenKind::Comma) {
                break;
            }
            self.pos += 1;
        }
        Ok(arguments)
    }

    /// Wraps `node` once per `!` that follows it; `x!!` is the factorial of `x!`.
    fn postfix(&mut self, mut node: Node) -> Result<Node, ParseError> {
        while let Some(token) = self
            .peek()
            .filter(|token| token.is_operator(OperatorKind::Factorial))
        {
            // a `!` deepens the finished tree, so closing a group does not give the level back
            if self.factorials >= MAX_NESTING {
                return Err(ParseError {
                    kind: ParseErrorKind::NestingTooDeep(MAX_NESTING),
                    span: token.span,
                });
            }
            self.factorials += 1;
            self.pos += 1;
            node = Node::unary(OperatorKind::Factorial, node);
        }
        Ok(node)
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            let span = self
                .peek()
                .map_or(SourceSpan::from((self.end, 0)), |token| token.span);
            return Err(ParseError {
                kind: ParseErrorKind::NestingTooDeep(MAX_NESTING),
                span,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next_is(&self, kind: &TokenKind) -> bool {
        self.peek().is_some_and(|token| &token.kind == kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(token)
    }

    fn expect(
        &mut self,
        expected: TokenKind,
        error: impl FnOnce() -> ParseErrorKind,
    ) -> Result<(), ParseError> {
        let found = self
            .peek()
            .map(|token| (token.kind == expected, token.span));
        match found {
            Some((true, _)) => {
                self.pos += 1;
                Ok(())
            }
            Some((false, span)) => Err(ParseError {
                kind: error(),
                span,
            }),
            None => Err(self.at_end(error())),
        }
    }

    fn at_end(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            span: SourceSpan::from((self.end, 0)),
        }
    }
}
