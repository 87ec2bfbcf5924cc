// AST node types for signal notation (.sig) source files.
//
// One statement per line: bindings (`let`), outputs, control, delay-line and
// shared instructions. Every node carries a `SimpleSpan` for error reporting
// in the resolver.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

use crate::sig::BinOp;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete listing: a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub span: Span,
}

// ── Statements ──

/// A top-level statement with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `let NAME = expr`: textual binding, substituted at each use.
    Let { name: Ident, value: Expr },
    /// `out INDEX = expr`
    Out { index: u32, index_span: Span, value: Expr },
    /// `control NAME = expr`
    Control { name: Ident, value: Expr },
    /// `delayline NAME[SIZE] = expr`
    DelayLine { name: Ident, size: u32, value: Expr },
    /// `shared NAME = expr`
    Shared { name: Ident, value: Expr },
}

impl StatementKind {
    /// The name this statement declares, if any (`out` declares none).
    pub fn declared_name(&self) -> Option<&Ident> {
        match self {
            StatementKind::Let { name, .. }
            | StatementKind::Control { name, .. }
            | StatementKind::DelayLine { name, .. }
            | StatementKind::Shared { name, .. } => Some(name),
            StatementKind::Out { .. } => None,
        }
    }

    pub fn value(&self) -> &Expr {
        match self {
            StatementKind::Let { value, .. }
            | StatementKind::Out { value, .. }
            | StatementKind::Control { value, .. }
            | StatementKind::DelayLine { value, .. }
            | StatementKind::Shared { value, .. } => value,
        }
    }
}

// ── Identifiers ──

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Real(f64),
    /// String literal; only meaningful as a `slider` label.
    Str(String),
    /// Reference to a declared name.
    Name(Ident),
    /// `name(args...)`: builtin (`input`, `slider`) or math function.
    Call { name: Ident, args: Vec<Expr> },
    /// `line@delay`
    DelayRead { line: Ident, delay: Box<Expr> },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}
