//! Built-in functions, looked up by name before user definitions.

use std::fmt::Display;

use crate::eval::EvalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (qualifier, n) = match self {
            Arity::Exactly(n) => ("exactly", n),
            Arity::AtLeast(n) => ("at least", n),
        };
        let noun = if *n == 1 { "argument" } else { "arguments" };
        write!(f, "{qualifier} {n} {noun}")
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Operation {
    Unary(fn(f64) -> f64),
    /// Unary with a domain check.
    Guarded(fn(f64) -> Result<f64, EvalError>),
    Binary(fn(f64, f64) -> f64),
    /// One or more arguments.
    Variadic(fn(&[f64]) -> f64),
}

#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub operation: Operation,
}

impl Builtin {
    pub fn arity(&self) -> Arity {
        match self.operation {
            Operation::Unary(_) | Operation::Guarded(_) => Arity::Exactly(1),
            Operation::Binary(_) => Arity::Exactly(2),
            Operation::Variadic(_) => Arity::AtLeast(1),
        }
    }

    pub fn call(&self, args: &[f64]) -> Result<f64, EvalError> {
        match (self.operation, args) {
            (Operation::Unary(f), [x]) => Ok(f(*x)),
            (Operation::Guarded(f), [x]) => f(*x),
            (Operation::Binary(f), [a, b]) => Ok(f(*a, *b)),
            (Operation::Variadic(f), args) if !args.is_empty() => Ok(f(args)),
            _ => Err(EvalError::Arity {
                function: self.name.to_string(),
                expected: self.arity(),
                found: args.len(),
            }),
        }
    }
}

#[rustfmt::skip]
pub static BUILTINS: &[Builtin] = &[
    Builtin { name: "sin", operation: Operation::Unary(f64::sin) },
    Builtin { name: "cos", operation: Operation::Unary(f64::cos) },
    Builtin { name: "tan", operation: Operation::Guarded(tan) },
    Builtin { name: "asin", operation: Operation::Guarded(asin) },
    Builtin { name: "acos", operation: Operation::Guarded(acos) },
    Builtin { name: "atan", operation: Operation::Unary(f64::atan) },
    // atan2(y, x)
    Builtin { name: "atan2", operation: Operation::Binary(f64::atan2) },
    Builtin { name: "exp", operation: Operation::Unary(f64::exp) },
    Builtin { name: "sqrt", operation: Operation::Guarded(sqrt) },
    Builtin { name: "log", operation: Operation::Guarded(ln) },
    Builtin { name: "log10", operation: Operation::Guarded(log10) },
    Builtin { name: "abs", operation: Operation::Unary(f64::abs) },
    Builtin { name: "floor", operation: Operation::Unary(f64::floor) },
    Builtin { name: "ceil", operation: Operation::Unary(f64::ceil) },
    Builtin { name: "round", operation: Operation::Unary(f64::round) },
    Builtin { name: "factorial", operation: Operation::Guarded(factorial) },
    Builtin { name: "min", operation: Operation::Variadic(min) },
    Builtin { name: "max", operation: Operation::Variadic(max) },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn domain(function: &'static str, reason: &'static str) -> EvalError {
    EvalError::Domain { function, reason }
}

fn tan(x: f64) -> Result<f64, EvalError> {
    if x.cos() == 0.0 {
        return Err(domain("tan", "is undefined at pi/2 + k*pi"));
    }
    Ok(x.tan())
}

fn asin(x: f64) -> Result<f64, EvalError> {
    if !(-1.0..=1.0).contains(&x) {
        return Err(domain("asin", "requires an argument in [-1, 1]"));
    }
    Ok(x.asin())
}

fn acos(x: f64) -> Result<f64, EvalError> {
    if !(-1.0..=1.0).contains(&x) {
        return Err(domain("acos", "requires an argument in [-1, 1]"));
    }
    Ok(x.acos())
}

fn sqrt(x: f64) -> Result<f64, EvalError> {
    if x < 0.0 {
        return Err(domain("sqrt", "requires a non-negative argument"));
    }
    Ok(x.sqrt())
}

fn ln(x: f64) -> Result<f64, EvalError> {
    if x <= 0.0 {
        return Err(domain("log", "requires a positive argument"));
    }
    Ok(x.ln())
}

fn log10(x: f64) -> Result<f64, EvalError> {
    if x <= 0.0 {
        return Err(domain("log10", "requires a positive argument"));
    }
    Ok(x.log10())
}

// `f64::min` and `f64::max` skip NaN, so it is checked for up front
fn min(args: &[f64]) -> f64 {
    if args.iter().any(|x| x.is_nan()) {
        return f64::NAN;
    }
    args.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(args: &[f64]) -> f64 {
    if args.iter().any(|x| x.is_nan()) {
        return f64::NAN;
    }
    args.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// `n!` for a non-negative integral `n`. Shared by the postfix operator and `factorial()`.
pub fn factorial(n: f64) -> Result<f64, EvalError> {
    if n < 0.0 || n.floor() != n {
        return Err(EvalError::Factorial(n));
    }
    // 171! no longer fits in an f64
    if n > 170.0 {
        return Ok(f64::INFINITY);
    }
    Ok((2..=n as u32).map(f64::from).product())
}
