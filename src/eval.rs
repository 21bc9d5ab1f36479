use std::{collections::HashMap, f64::consts};

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    Parser,
    ast::Node,
    lex::tokenize,
    system::{self, Arity},
    token::OperatorKind,
};

/// Nested user-function calls allowed before evaluation gives up.
pub const MAX_CALL_DEPTH: usize = 64;

/// Nested nodes one evaluation may descend through, user-function bodies included.
pub const MAX_EVAL_DEPTH: usize = 512;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum EvalError {
    #[error("undefined variable: {0}")]
    #[diagnostic(help("assign it first, for example `x = 1`"))]
    UndefinedVariable(String),

    #[error("undefined function: {0}")]
    #[diagnostic(help("define it first, for example `f(x) = x^2`"))]
    UndefinedFunction(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulo by zero")]
    ModuloByZero,

    #[error("{function} expects {expected}, got {found}")]
    Arity {
        function: String,
        expected: Arity,
        found: usize,
    },

    #[error("{function} {reason}")]
    Domain {
        function: &'static str,
        reason: &'static str,
    },

    #[error("factorial requires a non-negative integer, got {0}")]
    Factorial(f64),

    #[error("incorrect number of arguments for function: {name} (expected {expected}, got {found})")]
    IncorrectArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("assignment target must be a variable or a function signature")]
    InvalidAssignmentTarget,

    #[error("function definition requires exactly one variable parameter: {0}")]
    #[diagnostic(help("write it as `f(x) = ...` with a single parameter name"))]
    InvalidFunctionDefinition(String),

    #[error("cannot redefine built-in function: {0}")]
    #[diagnostic(help("built-in names are reserved, pick another name for the function"))]
    BuiltinRedefinition(String),

    #[error("maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("expression nests deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("operator {op} cannot take {found} operands")]
    MalformedOperator { op: OperatorKind, found: usize },
}

/// Values bound for the duration of one user-function call.
pub type Locals = HashMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct UserFunction {
    pub parameter: String,
    pub body: Node,
}

/// Global variables and user functions of one session.
#[derive(Debug, Clone)]
pub struct Environment {
    variables: HashMap<String, f64>,
    functions: HashMap<String, UserFunction>,
}

impl Default for Environment {
    fn default() -> Self {
        let variables = HashMap::from([
            ("pi".to_string(), consts::PI),
            ("e".to_string(), consts::E),
            ("inf".to_string(), f64::INFINITY),
            ("nan".to_string(), f64::NAN),
        ]);
        Environment {
            variables,
            functions: HashMap::new(),
        }
    }
}

impl Environment {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    pub fn define(&mut self, name: String, value: f64) {
        self.variables.insert(name, value);
    }

    pub fn function(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(name)
    }

    pub fn define_function(&mut self, name: String, function: UserFunction) {
        self.functions.insert(name, function);
    }
}

#[derive(Debug, Default)]
pub struct Evaluator {
    environment: Environment,
    depth: usize,
    nesting: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Tokenizes, parses and evaluates one line against this session.
    pub fn eval_line(&mut self, line: &str) -> Result<f64, crate::Error> {
        let tokens = tokenize(line)?;
        let node = Parser::new(tokens).parse()?;
        Ok(self.evaluate(&node, None)?)
    }

    /// Evaluates `node`. Names resolve in `locals` first, then in the global variables.
    pub fn evaluate(&mut self, node: &Node, locals: Option<&Locals>) -> Result<f64, EvalError> {
        if self.nesting >= MAX_EVAL_DEPTH {
            return Err(EvalError::NestingTooDeep(MAX_EVAL_DEPTH));
        }
        self.nesting += 1;
        let value = match node {
            Node::Number(n) => Ok(*n),
            Node::Variable(name) => locals
                .and_then(|frame| frame.get(name).copied())
                .or_else(|| self.environment.get(name))
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
            Node::Operator(op, operands) => self.operator(*op, operands, locals),
            Node::Function { name, arguments } => self.call(name, arguments, locals),
        };
        self.nesting -= 1;
        value
    }

    fn operator(
        &mut self,
        op: OperatorKind,
        operands: &[Node],
        locals: Option<&Locals>,
    ) -> Result<f64, EvalError> {
        match (op, operands) {
            (OperatorKind::UnaryMinus, [operand]) => Ok(-self.evaluate(operand, locals)?),
            (OperatorKind::UnaryPlus, [operand]) => self.evaluate(operand, locals),
            (OperatorKind::Factorial, [operand]) => {
                system::factorial(self.evaluate(operand, locals)?)
            }
            (OperatorKind::Assignment, [target, value]) => self.assign(target, value, locals),
            (op, [lhs, rhs]) if op.is_binary() => {
                let lhs = self.evaluate(lhs, locals)?;
                let rhs = self.evaluate(rhs, locals)?;
                arithmetic(op, lhs, rhs)
            }
            (op, operands) => Err(EvalError::MalformedOperator {
                op,
                found: operands.len(),
            }),
        }
    }

    fn assign(
        &mut self,
        target: &Node,
        value: &Node,
        locals: Option<&Locals>,
    ) -> Result<f64, EvalError> {
        match target {
            Node::Variable(name) => {
                let value = self.evaluate(value, locals)?;
                debug!(%name, value, "assigned variable");
                self.environment.define(name.clone(), value);
                Ok(value)
            }
            Node::Function { name, arguments } => {
                let [Node::Variable(parameter)] = arguments.as_slice() else {
                    return Err(EvalError::InvalidFunctionDefinition(name.clone()));
                };
                if system::lookup(name).is_some() {
                    warn!(%name, "refusing to redefine built-in function");
                    return Err(EvalError::BuiltinRedefinition(name.clone()));
                }
                debug!(%name, %parameter, body = %value, "defined function");
                self.environment.define_function(
                    name.clone(),
                    UserFunction {
                        parameter: parameter.clone(),
                        body: value.clone(),
                    },
                );
                Ok(0.0)
            }
            _ => Err(EvalError::InvalidAssignmentTarget),
        }
    }

    fn call(
        &mut self,
        name: &str,
        arguments: &[Node],
        locals: Option<&Locals>,
    ) -> Result<f64, EvalError> {
        if let Some(builtin) = system::lookup(name) {
            let expected = builtin.arity();
            if !expected.accepts(arguments.len()) {
                return Err(EvalError::Arity {
                    function: name.to_string(),
                    expected,
                    found: arguments.len(),
                });
            }
            let values = arguments
                .iter()
                .map(|argument| self.evaluate(argument, locals))
                .collect::<Result<Vec<_>, _>>()?;
            return builtin.call(&values);
        }

        let Some(function) = self.environment.function(name).cloned() else {
            return Err(EvalError::UndefinedFunction(name.to_string()));
        };
        let [argument] = arguments else {
            return Err(EvalError::IncorrectArgumentCount {
                name: name.to_string(),
                expected: 1,
                found: arguments.len(),
            });
        };
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::CallDepthExceeded(MAX_CALL_DEPTH));
        }

        let argument = self.evaluate(argument, locals)?;
        debug!(%name, argument, "calling user function");
        // the body sees its parameter and the globals, never the caller's frame
        let frame = Locals::from([(function.parameter, argument)]);

        self.depth += 1;
        let result = self.evaluate(&function.body, Some(&frame));
        self.depth -= 1;
        result
    }
}

fn arithmetic(op: OperatorKind, lhs: f64, rhs: f64) -> Result<f64, EvalError> {
    match op {
        OperatorKind::Add => Ok(lhs + rhs),
        OperatorKind::Subtract => Ok(lhs - rhs),
        OperatorKind::Multiply => Ok(lhs * rhs),
        OperatorKind::Divide | OperatorKind::IntDivide if rhs == 0.0 => {
            Err(EvalError::DivisionByZero)
        }
        OperatorKind::Divide => Ok(lhs / rhs),
        OperatorKind::IntDivide => Ok((lhs / rhs).floor()),
        OperatorKind::Power => Ok(lhs.powf(rhs)),
        OperatorKind::Mod => {
            // both sides lose their fractional part first: 7.9 % 2.5 == 7 % 2
            let (lhs, rhs) = (lhs.trunc(), rhs.trunc());
            if rhs == 0.0 {
                return Err(EvalError::ModuloByZero);
            }
            // a NaN operand or an infinite dividend gives NaN
            Ok(lhs % rhs)
        }
        op => Err(EvalError::MalformedOperator { op, found: 2 }),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::Error;

    fn eval(input: &str) -> Result<f64, Error> {
        Evaluator::new().eval_line(input)
    }

    fn eval_err(input: &str) -> EvalError {
        match eval(input) {
            Err(Error::Eval(e)) => e,
            other => panic!("expected an evaluation error for `{input}`, got {other:?}"),
        }
    }

    fn assert_close(got: f64, expected: f64) {
        assert!(
            (got - expected).abs() < 1e-9,
            "expected {expected}, got {got}"
        );
    }

    #[rstest]
    #[case("1 + 2", 3.0)]
    #[case("10 - 3", 7.0)]
    #[case("4 * 5", 20.0)]
    #[case("20 / 4", 5.0)]
    #[case("20 \\ 3", 6.0)]
    #[case("-7 \\ 2", -4.0)]
    #[case("2 ^ 3", 8.0)]
    #[case("10 % 3", 1.0)]
    #[case("-7 % 3", -1.0)]
    #[case("7.9 % 2.5", 1.0)]
    #[case("2+3*4", 14.0)]
    #[case("2^3^2", 512.0)]
    #[case("(2+3)*4", 20.0)]
    #[case("2.5e-3", 0.0025)]
    fn arithmetic_operators(#[case] input: &str, #[case] expected: f64) {
        assert_close(eval(input).unwrap(), expected);
    }

    #[rstest]
    #[case("5!", 120.0)]
    #[case("0!", 1.0)]
    #[case("3!!", 720.0)]
    #[case("-5!", -120.0)]
    #[case("--5", 5.0)]
    #[case("+5", 5.0)]
    #[case("-3", -3.0)]
    #[case("2*-3", -6.0)]
    #[case("5!-3", 117.0)]
    fn unary_and_factorial(#[case] input: &str, #[case] expected: f64) {
        assert_close(eval(input).unwrap(), expected);
    }

    #[rstest]
    #[case("inf % 3")]
    #[case("-inf % 3")]
    #[case("5 % nan")]
    #[case("nan % 5")]
    fn modulo_of_non_finite_operands_is_nan(#[case] input: &str) {
        assert!(eval(input).unwrap().is_nan());
    }

    #[test]
    fn modulo_keeps_large_operands_exact() {
        assert_eq!(eval("1e300 % 7").unwrap(), 1e300 % 7.0);
        assert_eq!(eval("5 % inf").unwrap(), 5.0);
        assert_eq!(eval("-7 % -3").unwrap(), -1.0);
    }

    #[test]
    fn power_domain_is_permissive() {
        assert!(eval("(-8)^(1/3)").unwrap().is_nan());
        assert_eq!(eval("0^-1").unwrap(), f64::INFINITY);
    }

    #[rstest]
    #[case("5/0", EvalError::DivisionByZero)]
    #[case("5\\0", EvalError::DivisionByZero)]
    #[case("5%0", EvalError::ModuloByZero)]
    #[case("5%0.5", EvalError::ModuloByZero)]
    #[case("(-1)!", EvalError::Factorial(-1.0))]
    #[case("2.5!", EvalError::Factorial(2.5))]
    #[case("factorial(-1)", EvalError::Factorial(-1.0))]
    #[case("factorial(2.5)", EvalError::Factorial(2.5))]
    #[case("y + 1", EvalError::UndefinedVariable("y".into()))]
    #[case("g(1)", EvalError::UndefinedFunction("g".into()))]
    #[case("3 = 4", EvalError::InvalidAssignmentTarget)]
    #[case("2 + x = 3", EvalError::InvalidAssignmentTarget)]
    #[case("f(2) = 3", EvalError::InvalidFunctionDefinition("f".into()))]
    #[case("f(x, y) = x", EvalError::InvalidFunctionDefinition("f".into()))]
    #[case("sin(x) = x", EvalError::BuiltinRedefinition("sin".into()))]
    fn evaluation_failures(#[case] input: &str, #[case] expected: EvalError) {
        assert_eq!(eval_err(input), expected);
    }

    #[rstest]
    #[case("sqrt(-1)", "sqrt")]
    #[case("log(0)", "log")]
    #[case("log10(0)", "log10")]
    #[case("asin(2)", "asin")]
    #[case("acos(-2)", "acos")]
    fn domain_failures(#[case] input: &str, #[case] function: &str) {
        assert!(matches!(eval_err(input), EvalError::Domain { function: f, .. } if f == function));
    }

    #[rstest]
    #[case("min()", "min")]
    #[case("max()", "max")]
    #[case("sin(1, 2)", "sin")]
    #[case("atan2(1)", "atan2")]
    fn builtin_arity(#[case] input: &str, #[case] name: &str) {
        assert!(matches!(eval_err(input), EvalError::Arity { function, .. } if function == name));
    }

    #[test]
    fn builtin_calls() {
        assert_close(eval("sin(0)").unwrap(), 0.0);
        assert_close(eval("tan(pi/4)").unwrap(), 1.0);
        assert_close(eval("atan2(1, 1)").unwrap(), consts::FRAC_PI_4);
        assert_close(eval("log(e)").unwrap(), 1.0);
        assert_close(eval("log10(100)").unwrap(), 2.0);
        assert_close(eval("max(1, 5, 2)").unwrap(), 5.0);
        assert_close(eval("min(4, -2, 9)").unwrap(), -2.0);
        assert_close(eval("max(1,-2)").unwrap(), 1.0);
        assert!(eval("min(nan, 1)").unwrap().is_nan());
        assert!(eval("max(1, nan)").unwrap().is_nan());
        assert_close(eval("abs(-3) + floor(2.7) + ceil(2.1) + round(2.5)").unwrap(), 11.0);
    }

    #[test]
    fn constants_are_seeded() {
        assert_close(eval("pi").unwrap(), consts::PI);
        assert_close(eval("e").unwrap(), consts::E);
        assert_eq!(eval("inf").unwrap(), f64::INFINITY);
        assert!(eval("nan").unwrap().is_nan());
    }

    #[test]
    fn assignment_stores_and_returns_the_value() {
        let mut evaluator = Evaluator::new();
        assert_eq!(evaluator.eval_line("x = 5").unwrap(), 5.0);
        assert_eq!(evaluator.environment().get("x"), Some(5.0));
        assert_eq!(evaluator.eval_line("x = x * 2").unwrap(), 10.0);
        assert_eq!(evaluator.eval_line("a = b = 3").unwrap(), 3.0);
        assert_eq!(evaluator.environment().get("a"), Some(3.0));
        assert_eq!(evaluator.environment().get("b"), Some(3.0));
    }

    #[test]
    fn failed_evaluation_leaves_state_untouched() {
        let mut evaluator = Evaluator::new();
        evaluator.eval_line("x = 1").unwrap();
        assert!(evaluator.eval_line("x = 1/0").is_err());
        assert_eq!(evaluator.environment().get("x"), Some(1.0));
    }

    #[test]
    fn function_definition_returns_zero_and_stores_a_snapshot() {
        let mut evaluator = Evaluator::new();
        assert_eq!(evaluator.eval_line("f(x) = x^2 + 2").unwrap(), 0.0);
        let function = evaluator.environment().function("f").unwrap();
        assert_eq!(function.parameter, "x");
        assert_eq!(function.body.to_string(), "(+ (^ x 2) 2)");
        assert_eq!(evaluator.eval_line("f(3)").unwrap(), 11.0);
    }

    #[test]
    fn redefinition_replaces_the_body() {
        let mut evaluator = Evaluator::new();
        evaluator.eval_line("f(x) = x + 1").unwrap();
        evaluator.eval_line("f(x) = x * 10").unwrap();
        assert_eq!(evaluator.eval_line("f(2)").unwrap(), 20.0);
    }

    #[test]
    fn parameters_shadow_globals_only_inside_the_body() {
        let mut evaluator = Evaluator::new();
        evaluator.eval_line("x = 100").unwrap();
        evaluator.eval_line("k = 3").unwrap();
        evaluator.eval_line("f(x) = x + k").unwrap();
        assert_eq!(evaluator.eval_line("f(1)").unwrap(), 4.0);
        assert_eq!(evaluator.eval_line("x").unwrap(), 100.0);
    }

    #[test]
    fn bodies_do_not_see_the_callers_frame() {
        let mut evaluator = Evaluator::new();
        evaluator.eval_line("g(y) = x").unwrap();
        evaluator.eval_line("f(x) = g(0)").unwrap();
        assert_eq!(
            evaluator.eval_line("f(1)").unwrap_err().to_string(),
            "undefined variable: x"
        );
    }

    #[test]
    fn user_functions_compose() {
        let mut evaluator = Evaluator::new();
        evaluator.eval_line("sq(t) = t*t").unwrap();
        evaluator.eval_line("h(t) = sq(t) + sq(t + 1)").unwrap();
        assert_eq!(evaluator.eval_line("h(2)").unwrap(), 13.0);
        assert_eq!(evaluator.eval_line("sq(sq(2))").unwrap(), 16.0);
    }

    #[test]
    fn user_function_arity() {
        let mut evaluator = Evaluator::new();
        evaluator.eval_line("f(x) = x").unwrap();
        for input in ["f()", "f(1, 2)"] {
            assert!(matches!(
                evaluator.eval_line(input),
                Err(Error::Eval(EvalError::IncorrectArgumentCount { expected: 1, .. }))
            ));
        }
    }

    #[test]
    fn self_reference_hits_the_depth_limit() {
        let mut evaluator = Evaluator::new();
        evaluator.eval_line("f(x) = f(x - 1)").unwrap();
        assert!(matches!(
            evaluator.eval_line("f(1)"),
            Err(Error::Eval(EvalError::CallDepthExceeded(MAX_CALL_DEPTH)))
        ));
        // the counter unwinds with the error
        evaluator.eval_line("g(x) = x").unwrap();
        assert_eq!(evaluator.eval_line("g(5)").unwrap(), 5.0);
    }

    #[test]
    fn deep_trees_fail_instead_of_overflowing() {
        let mut evaluator = Evaluator::new();
        let mut node = Node::Number(1.0);
        for _ in 0..2 * MAX_EVAL_DEPTH {
            node = Node::unary(OperatorKind::UnaryMinus, node);
        }
        assert_eq!(
            evaluator.evaluate(&node, None),
            Err(EvalError::NestingTooDeep(MAX_EVAL_DEPTH))
        );
        // the counter unwinds with the error
        assert_eq!(evaluator.eval_line("-(-(2))").unwrap(), 2.0);
    }

    #[test]
    fn nesting_counts_through_user_function_bodies() {
        let mut evaluator = Evaluator::new();
        let minus = "-".repeat(200);
        evaluator.eval_line(&format!("a(x) = {minus}x")).unwrap();
        evaluator.eval_line(&format!("b(x) = {minus}a(x)")).unwrap();
        evaluator.eval_line(&format!("c(x) = {minus}b(x)")).unwrap();
        assert_eq!(evaluator.eval_line("b(3)").unwrap(), 3.0);
        assert!(matches!(
            evaluator.eval_line("c(3)"),
            Err(Error::Eval(EvalError::NestingTooDeep(MAX_EVAL_DEPTH)))
        ));
    }

    #[test]
    fn builtin_redefinition_explains_itself() {
        let err = eval_err("max(x) = x");
        assert_eq!(err, EvalError::BuiltinRedefinition("max".into()));
        assert!(err.help().is_some());
    }

    #[test]
    fn locals_override_globals() {
        let mut evaluator = Evaluator::new();
        let node = Node::Variable("pi".into());
        let frame = Locals::from([("pi".to_string(), 3.0)]);
        assert_eq!(evaluator.evaluate(&node, Some(&frame)), Ok(3.0));
        assert_eq!(evaluator.evaluate(&node, None), Ok(consts::PI));
    }

    #[test]
    fn malformed_trees_are_rejected() {
        let mut evaluator = Evaluator::new();
        let node = Node::Operator(OperatorKind::Add, vec![Node::Number(1.0)]);
        assert_eq!(
            evaluator.evaluate(&node, None),
            Err(EvalError::MalformedOperator {
                op: OperatorKind::Add,
                found: 1
            })
        );
    }
}
