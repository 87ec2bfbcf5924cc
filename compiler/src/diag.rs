// diag.rs — Unified diagnostics model
//
// Provides the diagnostic type shared by the reader, resolver and pipeline,
// plus the table of stable diagnostic codes.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0100`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    /// Lexer or parser error.
    pub const SYNTAX: DiagCode = DiagCode("E0001");

    pub const UNDEFINED_NAME: DiagCode = DiagCode("E0100");
    pub const DUPLICATE_DEFINITION: DiagCode = DiagCode("E0101");
    /// A name's definition depends on itself without an instruction in between.
    pub const CYCLIC_REFERENCE: DiagCode = DiagCode("E0102");
    pub const UNKNOWN_FUNCTION: DiagCode = DiagCode("E0103");
    pub const WRONG_ARITY: DiagCode = DiagCode("E0104");
    pub const DUPLICATE_OUTPUT: DiagCode = DiagCode("E0105");
    /// `@` applied to a non-delay-line, or a delay line used without `@`.
    pub const NOT_A_DELAY_LINE: DiagCode = DiagCode("E0106");
    /// Builtin argument of the wrong form (e.g. a non-literal input channel).
    pub const INVALID_ARGUMENT: DiagCode = DiagCode("E0107");

    /// The split certificate did not hold.
    pub const SPLIT_POSTCONDITION: DiagCode = DiagCode("E0900");

    pub const UNUSED_LET: DiagCode = DiagCode("W0100");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain, e.g. each step of a reference cycle.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub message: String,
    pub span: Option<Span>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, related spans, or causes.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
            cause_chain: Vec::new(),
        }
    }

    pub fn error(code: DiagCode, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message).with_code(code)
    }

    pub fn warning(code: DiagCode, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, span, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            span,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        for cause in &self.cause_chain {
            write!(f, "\n  note: {}", cause.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 0..1)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, dummy_span(), "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::warning(codes::UNUSED_LET, dummy_span(), "unused let 'x'");
        assert_eq!(format!("{d}"), "warning[W0100]: unused let 'x'");
    }

    #[test]
    fn display_includes_causes_then_hint() {
        let d = Diagnostic::error(codes::CYCLIC_REFERENCE, dummy_span(), "cycle through 'a'")
            .with_cause("'a' refers to 'b'", None)
            .with_hint("route feedback through a control or delay line");
        assert_eq!(
            format!("{d}"),
            "error[E0102]: cycle through 'a'\n  note: 'a' refers to 'b'\n  hint: route feedback through a control or delay line"
        );
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(codes::DUPLICATE_DEFINITION, dummy_span(), "duplicate 'x'")
            .with_hint("rename one of them")
            .with_related(dummy_span(), "first defined here")
            .with_cause("second definition", Some(dummy_span()));

        assert_eq!(d.code, Some(DiagCode("E0101")));
        assert!(d.is_error());
        assert_eq!(d.hint.as_deref(), Some("rename one of them"));
        assert_eq!(d.related_spans.len(), 1);
        assert_eq!(d.cause_chain.len(), 1);
    }
}
