//! The parser's view of a filter expression: variable names and
//! literal text instead of the register indices and interned ids the
//! executor works with. [`crate::codegen`] lowers an `Expr` into a
//! [`crate::operator::selection::Predicate`] once it knows which
//! register each variable landed in.

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),

    Equal(Box<Expr>, Box<Expr>),
    NotEqual(Box<Expr>, Box<Expr>),
    Less(Box<Expr>, Box<Expr>),
    LessOrEqual(Box<Expr>, Box<Expr>),

    Plus(Box<Expr>, Box<Expr>),
    Minus(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),

    Bound(String),
    IsIRI(Box<Expr>),
    Str(Box<Expr>),

    Variable(String),
    NumberLiteral(f64),
    IRILiteral(String),
    StringLiteral(String),
}
