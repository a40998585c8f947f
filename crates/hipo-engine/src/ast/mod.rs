//! Abstract Syntax Tree (AST) definitions for hipo programs.
//!
//! Every node category is a closed enum, so the semantic pass and the code
//! generator match exhaustively over it.

use std::fmt;

/// A complete program: the body between `<?php` and `?>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// The top-level body
    pub body: Body,
}

/// A body: declarations first, then statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    /// Variable and function declarations, in source order
    pub declarations: Vec<Declaration>,
    /// Statements, in source order
    pub statements: Vec<Statement>,
}

impl Body {
    /// Iterates over the variable declarations of this body.
    pub fn variables(&self) -> impl Iterator<Item = &VarDecl> {
        self.declarations.iter().filter_map(|decl| match decl {
            Declaration::Var(var) => Some(var),
            Declaration::Function(_) => None,
        })
    }

    /// Iterates over the function declarations of this body.
    pub fn functions(&self) -> impl Iterator<Item = &FuncDecl> {
        self.declarations.iter().filter_map(|decl| match decl {
            Declaration::Function(func) => Some(func),
            Declaration::Var(_) => None,
        })
    }
}

/// A declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// `$name [= expr];`
    Var(VarDecl),
    /// `function name($a, $b) { ... }`
    Function(FuncDecl),
}

/// A variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    /// The variable name, including `$`
    pub name: String,
    /// Optional initializer expression
    pub initializer: Option<Expr>,
}

/// A function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    /// The function name
    pub name: String,
    /// Parameter names, including `$`
    pub params: Vec<String>,
    /// The function body
    pub body: Body,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `echo expr . PHP_EOL;`
    Echo(Expr),
    /// `$name = expr;`
    Assign(Assignment),
    /// `if (cond) { ... } else { ... }`
    If(IfStatement),
    /// `while (cond) { ... }`
    While(WhileStatement),
    /// `name(args);`
    Call(Call),
}

/// An assignment statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Target variable name
    pub name: String,
    /// Assigned value
    pub expr: Expr,
}

/// An if statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    /// The condition
    pub condition: Condition,
    /// Statements run when the condition holds
    pub then_body: Vec<Statement>,
    /// Statements run otherwise, if an else branch exists
    pub else_body: Option<Vec<Statement>>,
}

/// A while loop.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    /// The loop condition
    pub condition: Condition,
    /// The loop body
    pub body: Vec<Statement>,
}

/// A function call, used both as a statement and as an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// The callee name (never includes `$`)
    pub name: String,
    /// Argument expressions
    pub args: Vec<Expr>,
}

/// An expression used in boolean position.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The wrapped expression
    pub expr: Expr,
}

impl From<Expr> for Condition {
    fn from(expr: Expr) -> Self {
        Self { expr }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Variable reference
    Var(String),
    /// `floatval(readline())`
    Read,
    /// Unary operation
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Function call in expression position
    Call(Call),
}

impl Expr {
    /// Creates a variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// Creates a binary expression.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    /// Creates a unary expression.
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary(op, Box::new(operand))
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation (-)
    Neg,
    /// Logical not (!)
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// /
    Div,
    /// ==
    Eq,
    /// !=
    Ne,
    /// >=
    Ge,
    /// <=
    Le,
    /// >
    Gt,
    /// <
    Lt,
    /// &&
    And,
    /// ||
    Or,
}

impl BinaryOp {
    /// Returns the operator as written in source.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Var(name) => f.write_str(name),
            Expr::Read => f.write_str("floatval(readline())"),
            Expr::Unary(UnaryOp::Neg, operand) => write!(f, "-{}", operand),
            Expr::Unary(UnaryOp::Not, operand) => write!(f, "!{}", operand),
            Expr::Binary(op, left, right) => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Call(call) => {
                write!(f, "{}(", call.name)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}
