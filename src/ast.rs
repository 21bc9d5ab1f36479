use std::fmt::Display;

use crate::token::OperatorKind;

/// A parsed expression.
///
/// Arity is not encoded in the shape: a `Function` may carry any number of arguments and an
/// `Operator` any number of operands. The evaluator checks what each tag expects.
/// `Clone` is a deep copy, which is what lets a function body outlive the input it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(f64),
    Variable(String),
    Function { name: String, arguments: Vec<Node> },
    Operator(OperatorKind, Vec<Node>),
}

impl Node {
    pub fn unary(op: OperatorKind, operand: Node) -> Self {
        Node::Operator(op, vec![operand])
    }

    pub fn binary(op: OperatorKind, lhs: Node, rhs: Node) -> Self {
        Node::Operator(op, vec![lhs, rhs])
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Number(_) | Node::Variable(_) => &[],
            Node::Function { arguments, .. } => arguments,
            Node::Operator(_, operands) => operands,
        }
    }

    /// Indented, one node per line.
    pub fn tree(&self) -> Tree<'_> {
        Tree(self)
    }
}

/// Renders as an s-expression: `(+ 1 (* 2 x))`, `(max 1 2 3)`.
impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Number(n) => write!(f, "{n}"),
            Node::Variable(name) => write!(f, "{name}"),
            Node::Function { name, arguments } => {
                write!(f, "({name}")?;
                for argument in arguments {
                    write!(f, " {argument}")?;
                }
                write!(f, ")")
            }
            Node::Operator(op, operands) => {
                write!(f, "({op}")?;
                for operand in operands {
                    write!(f, " {operand}")?;
                }
                write!(f, ")")
            }
        }
    }
}

pub struct Tree<'a>(&'a Node);

impl Tree<'_> {
    fn write(node: &Node, indent: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pad = "";
        match node {
            Node::Number(n) => writeln!(f, "{pad:indent$}Number: {n}")?,
            Node::Variable(name) => writeln!(f, "{pad:indent$}Variable: {name}")?,
            Node::Function { name, .. } => writeln!(f, "{pad:indent$}Function: {name}")?,
            Node::Operator(op, _) => writeln!(f, "{pad:indent$}Operator: {op}")?,
        }
        for child in node.children() {
            Self::write(child, indent + 2, f)?;
        }
        Ok(())
    }
}

impl Display for Tree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Self::write(self.0, 0, f)
    }
}
