use std::fmt;

/// Reserved prototype name used to wrap a bare top-level expression into a
/// zero-argument function. User code may never declare this name.
pub const ANON_FN_NAME: &str = "__anon_expr";

/// Expression tree. Children are exclusively owned, so every expression forms
/// a strict tree that is dropped recursively with its parent.
#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(char, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// A function's externally visible signature: its name and parameter names,
/// independent of whether a body has been generated for it.
#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
}

impl Prototype {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Prototype {
            name: name.into(),
            params,
        }
    }

    /// The synthetic zero-parameter prototype wrapping a top-level expression.
    pub fn anonymous() -> Self {
        Prototype::new(ANON_FN_NAME, Vec::new())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub proto: Prototype,
    pub body: Expr,
}

/// One top-level unit as produced by the parser. A bare expression is wrapped
/// into a `Definition` with the anonymous prototype before it gets here.
#[derive(Debug, PartialEq, Clone)]
pub enum Item {
    Definition(Function),
    Extern(Prototype),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(value) => write!(f, "{}", value),
            Expr::Variable(name) => write!(f, "{}", name),
            // fully parenthesized so reparsing the rendering rebuilds the
            // exact same tree regardless of the precedence table
            Expr::Binary(op, lhs, rhs) => write!(f, "({}{}{})", lhs, op, rhs),
            Expr::Call(callee, args) => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(" "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {} {}", self.proto, self.body)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Definition(func) => write!(f, "{}", func),
            Item::Extern(proto) => write!(f, "extern {}", proto),
        }
    }
}
