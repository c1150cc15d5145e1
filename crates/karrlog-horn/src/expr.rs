//! Expression types for Horn clause bodies and invariant formulas

// These constructors build AST nodes, not perform operations.
// Implementing std::ops traits would be semantically incorrect.
#![allow(clippy::should_implement_trait)]

use std::fmt;
use std::sync::Arc;

/// Sort (type) of expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    Bool,
    Int,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Int => write!(f, "Int"),
        }
    }
}

/// A named, sorted variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var {
    pub name: String,
    pub sort: Sort,
}

impl Var {
    pub fn new(name: impl Into<String>, sort: Sort) -> Self {
        Self {
            name: name.into(),
            sort,
        }
    }

    /// Integer variable shorthand; almost every variable in this engine is one.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, Sort::Int)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Operations in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Boolean operations
    Not,
    And,
    Or,

    // Arithmetic operations
    Add,
    Sub,
    Mul,
    Neg,

    // Comparisons
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Expression over integers and booleans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Boolean constant
    Bool(bool),
    /// Integer constant
    Int(i64),
    /// Variable reference
    Var(Var),
    /// Operation application
    Op(Op, Vec<Arc<Expr>>),
}

impl Expr {
    // Convenience constructors

    pub fn int(n: i64) -> Self {
        Expr::Int(n)
    }

    pub fn var(v: Var) -> Self {
        Expr::Var(v)
    }

    pub fn not(e: Expr) -> Self {
        // Double negation elimination: NOT(NOT(x)) = x
        if let Expr::Op(Op::Not, args) = &e {
            if args.len() == 1 {
                return (*args[0]).clone();
            }
        }
        Expr::Op(Op::Not, vec![Arc::new(e)])
    }

    pub fn and(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::And, vec![Arc::new(a), Arc::new(b)])
    }

    pub fn or(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Or, vec![Arc::new(a), Arc::new(b)])
    }

    pub fn add(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Add, vec![Arc::new(a), Arc::new(b)])
    }

    /// N-ary sum; an empty list collapses to the zero literal.
    pub fn add_many(terms: Vec<Expr>) -> Self {
        match terms.len() {
            0 => Expr::Int(0),
            1 => terms.into_iter().next().unwrap(),
            _ => Expr::Op(Op::Add, terms.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Sub, vec![Arc::new(a), Arc::new(b)])
    }

    pub fn mul(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Mul, vec![Arc::new(a), Arc::new(b)])
    }

    pub fn neg(e: Expr) -> Self {
        Expr::Op(Op::Neg, vec![Arc::new(e)])
    }

    pub fn eq(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Eq, vec![Arc::new(a), Arc::new(b)])
    }

    pub fn ne(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Ne, vec![Arc::new(a), Arc::new(b)])
    }

    pub fn lt(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Lt, vec![Arc::new(a), Arc::new(b)])
    }

    pub fn le(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Le, vec![Arc::new(a), Arc::new(b)])
    }

    pub fn gt(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Gt, vec![Arc::new(a), Arc::new(b)])
    }

    pub fn ge(a: Expr, b: Expr) -> Self {
        Expr::Op(Op::Ge, vec![Arc::new(a), Arc::new(b)])
    }

    /// Conjunction of several expressions; empty list is `true`.
    pub fn and_many(exprs: Vec<Expr>) -> Self {
        let mut flat = Vec::new();
        for e in exprs {
            match e {
                Expr::Bool(true) => {}
                Expr::Bool(false) => return Expr::Bool(false),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expr::Bool(true),
            1 => flat.into_iter().next().unwrap(),
            _ => Expr::Op(Op::And, flat.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Bool(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Expr::Bool(false))
    }

    /// Get the sort of this expression
    pub fn sort(&self) -> Sort {
        match self {
            Expr::Bool(_) => Sort::Bool,
            Expr::Int(_) => Sort::Int,
            Expr::Var(v) => v.sort,
            Expr::Op(op, _) => match op {
                Op::Not | Op::And | Op::Or => Sort::Bool,
                Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => Sort::Bool,
                Op::Add | Op::Sub | Op::Mul | Op::Neg => Sort::Int,
            },
        }
    }

    /// Substitute variables in the expression.
    ///
    /// All substitutions are applied simultaneously: replacement terms are
    /// never rescanned, so a key occurring inside a replacement is left alone.
    pub fn substitute(&self, subst: &[(Var, Expr)]) -> Expr {
        match self {
            Expr::Bool(_) | Expr::Int(_) => self.clone(),
            Expr::Var(v) => {
                for (var, expr) in subst {
                    if var == v {
                        return expr.clone();
                    }
                }
                self.clone()
            }
            Expr::Op(op, args) => {
                let new_args: Vec<_> = args.iter().map(|a| Arc::new(a.substitute(subst))).collect();
                Expr::Op(*op, new_args)
            }
        }
    }

    /// Get all variables in the expression
    pub fn vars(&self) -> Vec<Var> {
        let mut result = Vec::new();
        self.collect_vars(&mut result);
        result
    }

    fn collect_vars(&self, result: &mut Vec<Var>) {
        match self {
            Expr::Bool(_) | Expr::Int(_) => {}
            Expr::Var(v) => {
                if !result.contains(v) {
                    result.push(v.clone());
                }
            }
            Expr::Op(_, args) => {
                for arg in args {
                    arg.collect_vars(result);
                }
            }
        }
    }

    /// Flatten nested conjunctions into a list of atomic conjuncts.
    /// Trivial `true` conjuncts are dropped.
    pub fn conjuncts(&self) -> Vec<Expr> {
        fn walk(e: &Expr, out: &mut Vec<Expr>) {
            match e {
                Expr::Op(Op::And, args) => {
                    for a in args {
                        walk(a, out);
                    }
                }
                Expr::Bool(true) => {}
                _ => out.push(e.clone()),
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Var(v) => write!(f, "{v}"),
            Expr::Op(op, args) => {
                let op_str = match op {
                    Op::Not => "not",
                    Op::And => "and",
                    Op::Or => "or",
                    Op::Add => "+",
                    Op::Sub => "-",
                    Op::Mul => "*",
                    Op::Neg => "-",
                    Op::Eq => "=",
                    Op::Ne => "distinct",
                    Op::Lt => "<",
                    Op::Le => "<=",
                    Op::Gt => ">",
                    Op::Ge => ">=",
                };
                write!(f, "({op_str}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_negation() {
        let x = Var::int("x");
        let e = Expr::gt(Expr::var(x.clone()), Expr::int(0));
        assert_eq!(Expr::not(Expr::not(e.clone())), e);
    }

    #[test]
    fn test_substitute_is_simultaneous() {
        let x = Var::int("x");
        let y = Var::int("y");
        // x -> y, y -> x swaps the two variables
        let e = Expr::sub(Expr::var(x.clone()), Expr::var(y.clone()));
        let swapped = e.substitute(&[
            (x.clone(), Expr::var(y.clone())),
            (y.clone(), Expr::var(x.clone())),
        ]);
        assert_eq!(swapped, Expr::sub(Expr::var(y), Expr::var(x)));
    }

    #[test]
    fn test_conjuncts_flatten() {
        let x = Var::int("x");
        let a = Expr::ge(Expr::var(x.clone()), Expr::int(0));
        let b = Expr::le(Expr::var(x.clone()), Expr::int(5));
        let c = Expr::eq(Expr::var(x), Expr::int(2));
        let nested = Expr::and(a.clone(), Expr::and(Expr::Bool(true), Expr::and(b.clone(), c.clone())));
        assert_eq!(nested.conjuncts(), vec![a, b, c]);
    }

    #[test]
    fn test_and_many_collapses() {
        assert!(Expr::and_many(vec![]).is_true());
        assert!(Expr::and_many(vec![Expr::Bool(true), Expr::Bool(false)]).is_false());
        let x = Expr::var(Var::int("x"));
        let single = Expr::ge(x, Expr::int(0));
        assert_eq!(Expr::and_many(vec![single.clone()]), single);
    }

    #[test]
    fn test_sorts() {
        let x = Var::int("x");
        assert_eq!(Expr::add(Expr::var(x.clone()), Expr::int(1)).sort(), Sort::Int);
        assert_eq!(Expr::le(Expr::var(x), Expr::int(1)).sort(), Sort::Bool);
    }
}
