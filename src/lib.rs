//! Evaluator for a small calculator language.
//!
//! Input goes through three stages: [`lex::tokenize`] turns text into [`Token`]s, the
//! [`Parser`] climbs operator precedence to build a [`Node`] tree, and the [`Evaluator`]
//! walks the tree against a session holding variables and single-parameter user functions.
//!
//! ```
//! use calcrepl::Evaluator;
//!
//! let mut session = Evaluator::new();
//! session.eval_line("f(x) = x^2 + 2").unwrap();
//! assert_eq!(session.eval_line("f(3)").unwrap(), 11.0);
//! ```

use miette::Diagnostic;
use thiserror::Error;

pub mod ast;
pub mod eval;
pub mod lex;
pub mod parse;
pub mod system;
pub mod token;

pub use ast::Node;
pub use eval::{EvalError, Evaluator};
pub use lex::{LexError, Lexer};
pub use parse::{ParseError, Parser};
pub use token::{OperatorKind, Token, TokenKind};

/// Failure of any pipeline stage.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),
}
