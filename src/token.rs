use std::fmt::Display;

use miette::SourceSpan;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range in the original input, whitespace included.
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Operator(OperatorKind),
    Variable(String),
    Function(String),
    LeftParen,
    RightParen,
    Comma,
}

/// Operators in declaration order. The order matters: the binding power table is
/// index-aligned with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntDivide,
    Power,
    Mod,
    Factorial,
    Assignment,
    UnaryMinus,
    UnaryPlus,
}

const BINDING_POWER: [u8; 11] = [1, 2, 3, 3, 3, 4, 3, 5, 0, 4, 4];

impl OperatorKind {
    pub fn binding_power(self) -> u8 {
        BINDING_POWER[self as usize]
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        Some(match c {
            '+' => OperatorKind::Add,
            '-' => OperatorKind::Subtract,
            '*' => OperatorKind::Multiply,
            '/' => OperatorKind::Divide,
            '\\' => OperatorKind::IntDivide,
            '^' => OperatorKind::Power,
            '%' => OperatorKind::Mod,
            '!' => OperatorKind::Factorial,
            '=' => OperatorKind::Assignment,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            OperatorKind::Add => "+",
            OperatorKind::Subtract => "-",
            OperatorKind::Multiply => "*",
            OperatorKind::Divide => "/",
            OperatorKind::IntDivide => "\\",
            OperatorKind::Power => "^",
            OperatorKind::Mod => "%",
            OperatorKind::Factorial => "!",
            OperatorKind::Assignment => "=",
            OperatorKind::UnaryMinus => "u-",
            OperatorKind::UnaryPlus => "u+",
        }
    }

    pub fn is_unary(self) -> bool {
        matches!(self, OperatorKind::UnaryMinus | OperatorKind::UnaryPlus)
    }

    /// Infix operators, the ones the precedence loop may consume.
    pub fn is_binary(self) -> bool {
        !self.is_unary() && self != OperatorKind::Factorial
    }
}

impl Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Token {
    pub fn new(kind: TokenKind, span: impl Into<SourceSpan>) -> Self {
        Token {
            kind,
            span: span.into(),
        }
    }

    pub fn is_operator(&self, op: OperatorKind) -> bool {
        self.kind == TokenKind::Operator(op)
    }
}

/// The token as it would be written in an expression.
impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::Operator(op) => write!(f, "{op}"),
            TokenKind::Variable(name) | TokenKind::Function(name) => f.write_str(name),
            TokenKind::LeftParen => f.write_str("("),
            TokenKind::RightParen => f.write_str(")"),
            TokenKind::Comma => f.write_str(","),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TokenKind::Number(n) => write!(f, "NUMBER {n}"),
            TokenKind::Operator(op) => write!(f, "OPERATOR {op}"),
            TokenKind::Variable(name) => write!(f, "VARIABLE {name}"),
            TokenKind::Function(name) => write!(f, "FUNCTION {name}"),
            TokenKind::LeftParen => write!(f, "LEFT_PAREN ("),
            TokenKind::RightParen => write!(f, "RIGHT_PAREN )"),
            TokenKind::Comma => write!(f, "COMMA ,"),
        }
    }
}
