// resolve.rs — Name resolution and lowering of signal notation
//
// Walks the parsed AST, resolves every name against the declared statements,
// and builds the signal graph: `let` bindings are substituted at each use,
// control and shared names become control-reads of the instruction's body,
// and `line@delay` becomes a delay-line read.
//
// Preconditions: `program` is a well-formed AST from the parser.
// Postconditions: returns a signal context, the top-level instruction set and
//                 all accumulated diagnostics. Instructions whose bodies
//                 failed to resolve are left out of the set.
// Failure modes: unknown names, duplicate definitions, cyclic references and
//                bad calls produce `Diagnostic` entries. Resolution continues
//                past errors.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::context::{InstrSet, SignalContext};
use crate::diag::{codes, Diagnostic};
use crate::id::{NodeId, Symbol};
use crate::sig::MathFn;

// ── Public types ────────────────────────────────────────────────────────────

/// Result of name resolution.
#[derive(Debug)]
pub struct ResolveResult {
    pub cx: SignalContext,
    pub instrs: InstrSet,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolveResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Resolve all names in a parsed program and lower it to a signal graph.
pub fn resolve(program: &Program) -> ResolveResult {
    let mut ctx = ResolveCtx::new();

    // Pass 1: collect declarations, reserve instruction names
    ctx.collect_decls(program);

    // Pass 2: lower instruction bodies and build the writes
    ctx.lower_instructions(program);

    // Post-pass: report errors inside unused bindings, then the bindings
    ctx.check_lets(program);

    ResolveResult {
        cx: ctx.cx,
        instrs: ctx.instrs,
        diagnostics: ctx.diagnostics,
    }
}

// ── Internal context ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Let,
    Control,
    DelayLine,
    Shared,
}

impl DeclKind {
    fn describe(self) -> &'static str {
        match self {
            DeclKind::Let => "let binding",
            DeclKind::Control => "control",
            DeclKind::DelayLine => "delay line",
            DeclKind::Shared => "shared value",
        }
    }
}

struct Decl<'p> {
    kind: DeclKind,
    name: &'p Ident,
    value: &'p Expr,
}

struct ResolveCtx<'p> {
    cx: SignalContext,
    instrs: InstrSet,
    diagnostics: Vec<Diagnostic>,
    decls: HashMap<&'p str, Decl<'p>>,
    /// Lowered bodies. `None` marks a body that failed to resolve.
    bodies: HashMap<&'p str, Option<NodeId>>,
    /// Names whose bodies are being lowered, outermost first.
    in_progress: Vec<&'p Ident>,
    used_lets: HashSet<&'p str>,
}

impl<'p> ResolveCtx<'p> {
    fn new() -> Self {
        ResolveCtx {
            cx: SignalContext::new(),
            instrs: InstrSet::new(),
            diagnostics: Vec::new(),
            decls: HashMap::new(),
            bodies: HashMap::new(),
            in_progress: Vec::new(),
            used_lets: HashSet::new(),
        }
    }

    // ── Pass 1: collect declarations ────────────────────────────────────

    fn collect_decls(&mut self, program: &'p Program) {
        for stmt in &program.statements {
            let (kind, name, value) = match &stmt.kind {
                StatementKind::Let { name, value } => (DeclKind::Let, name, value),
                StatementKind::Control { name, value } => (DeclKind::Control, name, value),
                StatementKind::DelayLine { name, value, .. } => {
                    (DeclKind::DelayLine, name, value)
                }
                StatementKind::Shared { name, value } => (DeclKind::Shared, name, value),
                StatementKind::Out { .. } => continue,
            };
            if let Some(existing) = self.decls.get(name.name.as_str()) {
                let first = existing.name.span;
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::DUPLICATE_DEFINITION,
                        name.span,
                        format!("duplicate definition of '{}'", name.name),
                    )
                    .with_related(first, "first defined here"),
                );
                continue;
            }
            if kind != DeclKind::Let {
                self.cx.ids.reserve(&Symbol::new(&name.name));
            }
            self.decls
                .insert(name.name.as_str(), Decl { kind, name, value });
        }
    }

    // ── Pass 2: lower instructions ──────────────────────────────────────

    fn lower_instructions(&mut self, program: &'p Program) {
        let mut outputs: HashMap<u32, Span> = HashMap::new();
        for stmt in &program.statements {
            let instr = match &stmt.kind {
                StatementKind::Let { .. } => continue,
                StatementKind::Out {
                    index,
                    index_span,
                    value,
                } => {
                    if let Some(first) = outputs.get(index) {
                        self.diagnostics.push(
                            Diagnostic::error(
                                codes::DUPLICATE_OUTPUT,
                                *index_span,
                                format!("output {} is written more than once", index),
                            )
                            .with_related(*first, "first written here"),
                        );
                        continue;
                    }
                    outputs.insert(*index, *index_span);
                    self.lower(value)
                        .map(|body| self.cx.arena.output(*index, body))
                }
                StatementKind::Control { name, .. } => self
                    .owned_body(name)
                    .map(|body| self.cx.arena.control_write(Symbol::new(&name.name), body)),
                StatementKind::DelayLine { name, size, .. } => {
                    self.owned_body(name).map(|body| {
                        self.cx
                            .arena
                            .delay_line_write(Symbol::new(&name.name), *size, body)
                    })
                }
                StatementKind::Shared { name, .. } => self.owned_body(name).map(|body| {
                    self.cx
                        .arena
                        .make_shared_write(Symbol::new(&name.name), body, body)
                }),
            };
            if let Some(instr) = instr {
                self.instrs.insert(instr);
            }
        }
    }

    /// Body of a declaration this statement owns. Duplicates are skipped.
    fn owned_body(&mut self, name: &'p Ident) -> Option<NodeId> {
        let owns = self
            .decls
            .get(name.name.as_str())
            .is_some_and(|d| d.name.span == name.span);
        if owns {
            self.body(name)
        } else {
            None
        }
    }

    // ── Post-pass: bindings ─────────────────────────────────────────────

    fn check_lets(&mut self, program: &'p Program) {
        for stmt in &program.statements {
            let StatementKind::Let { name, .. } = &stmt.kind else {
                continue;
            };
            if self.used_lets.contains(name.name.as_str()) {
                continue;
            }
            // Lowering reports errors inside the body; only clean bindings warn.
            if self.owned_body(name).is_none() {
                continue;
            }
            self.diagnostics.push(Diagnostic::warning(
                codes::UNUSED_LET,
                name.span,
                format!("let binding '{}' is never used", name.name),
            ));
        }
    }

    // ── Declaration bodies ──────────────────────────────────────────────

    /// Lower the body of a declared name once; later calls reuse the result.
    fn body(&mut self, name: &'p Ident) -> Option<NodeId> {
        let key = name.name.as_str();
        if let Some(done) = self.bodies.get(key) {
            return *done;
        }
        if let Some(pos) = self.in_progress.iter().position(|n| n.name == name.name) {
            self.report_cycle(name, pos);
            self.bodies.insert(key, None);
            return None;
        }
        let value = self.decls.get(key)?.value;
        self.in_progress.push(name);
        let body = self.lower(value);
        self.in_progress.pop();
        self.bodies.insert(key, body);
        body
    }

    fn report_cycle(&mut self, at: &Ident, start: usize) {
        let chain = &self.in_progress[start..];
        let mut diag = Diagnostic::error(
            codes::CYCLIC_REFERENCE,
            at.span,
            format!("'{}' is defined in terms of itself", at.name),
        );
        for (i, step) in chain.iter().enumerate() {
            let next = chain.get(i + 1).map_or(at.name.as_str(), |n| n.name.as_str());
            diag = diag.with_cause(
                format!("'{}' refers to '{}'", step.name, next),
                Some(step.span),
            );
        }
        self.diagnostics.push(diag.with_hint(
            "signal definitions must not depend on their own current value",
        ));
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn lower(&mut self, expr: &'p Expr) -> Option<NodeId> {
        match &expr.kind {
            ExprKind::Int(n) => Some(self.cx.arena.int(*n)),
            ExprKind::Real(v) => Some(self.cx.arena.real(*v)),
            ExprKind::Str(_) => {
                self.diagnostics.push(Diagnostic::error(
                    codes::INVALID_ARGUMENT,
                    expr.span,
                    "string literals are only allowed as slider labels",
                ));
                None
            }
            ExprKind::Name(id) => self.lower_name(id),
            ExprKind::Call { name, args } => self.lower_call(name, args, expr.span),
            ExprKind::DelayRead { line, delay } => self.lower_delay_read(line, delay),
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower(lhs);
                let rhs = self.lower(rhs);
                Some(self.cx.arena.bin_op(*op, lhs?, rhs?))
            }
        }
    }

    fn lower_name(&mut self, id: &'p Ident) -> Option<NodeId> {
        let Some(kind) = self.decls.get(id.name.as_str()).map(|d| d.kind) else {
            self.undefined(id);
            return None;
        };
        match kind {
            DeclKind::Let => {
                self.used_lets.insert(id.name.as_str());
                self.body(id)
            }
            DeclKind::Control | DeclKind::Shared => {
                let origin = self.body(id)?;
                Some(self.cx.arena.make_control_read(Symbol::new(&id.name), origin))
            }
            DeclKind::DelayLine => {
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::NOT_A_DELAY_LINE,
                        id.span,
                        format!("delay line '{}' must be read with '@'", id.name),
                    )
                    .with_hint(format!("write '{}@1' to read the previous sample", id.name)),
                );
                None
            }
        }
    }

    fn lower_delay_read(&mut self, line: &'p Ident, delay: &'p Expr) -> Option<NodeId> {
        let Some(kind) = self.decls.get(line.name.as_str()).map(|d| d.kind) else {
            self.undefined(line);
            return None;
        };
        if kind != DeclKind::DelayLine {
            self.diagnostics.push(Diagnostic::error(
                codes::NOT_A_DELAY_LINE,
                line.span,
                format!("'{}' is a {}, not a delay line", line.name, kind.describe()),
            ));
            return None;
        }
        // The read names the line only; feedback through a line is not a cycle.
        let delay_node = self.lower(delay)?;
        let min_delay = match delay.kind {
            ExprKind::Int(n) => u32::try_from(n).unwrap_or(0),
            _ => 0,
        };
        Some(
            self.cx
                .arena
                .delay_line_read(Symbol::new(&line.name), min_delay, delay_node),
        )
    }

    fn lower_call(&mut self, name: &'p Ident, args: &'p [Expr], span: Span) -> Option<NodeId> {
        match name.name.as_str() {
            "input" => {
                self.check_arity(name, 1, args.len(), span)?;
                match args[0].kind {
                    ExprKind::Int(n) if u32::try_from(n).is_ok() => {
                        Some(self.cx.arena.input(n as u32))
                    }
                    _ => {
                        self.invalid_argument(&args[0], "input channel must be a non-negative integer literal");
                        None
                    }
                }
            }
            "slider" => {
                self.check_arity(name, 2, args.len(), span)?;
                let label = match &args[0].kind {
                    ExprKind::Str(s) => Some(s.as_str()),
                    _ => {
                        self.invalid_argument(&args[0], "slider label must be a string literal");
                        None
                    }
                };
                let init = match args[1].kind {
                    ExprKind::Int(n) => Some(n as f64),
                    ExprKind::Real(v) => Some(v),
                    _ => {
                        self.invalid_argument(&args[1], "slider initial value must be a number literal");
                        None
                    }
                };
                Some(self.cx.arena.slider(label?, init?))
            }
            other => {
                let Some(fun) = MathFn::from_name(other) else {
                    let known: Vec<&str> = MathFn::ALL.iter().map(|f| f.name()).collect();
                    self.diagnostics.push(
                        Diagnostic::error(
                            codes::UNKNOWN_FUNCTION,
                            name.span,
                            format!("unknown function '{}'", other),
                        )
                        .with_hint(format!(
                            "available: input, slider, {}",
                            known.join(", ")
                        )),
                    );
                    return None;
                };
                self.check_arity(name, fun.arity(), args.len(), span)?;
                let lowered: Vec<Option<NodeId>> = args.iter().map(|a| self.lower(a)).collect();
                let args = lowered.into_iter().collect::<Option<Vec<_>>>()?;
                Some(self.cx.arena.math(fun, args))
            }
        }
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    fn check_arity(&mut self, name: &Ident, expected: usize, got: usize, span: Span) -> Option<()> {
        if expected == got {
            return Some(());
        }
        self.diagnostics.push(Diagnostic::error(
            codes::WRONG_ARITY,
            span,
            format!(
                "'{}' takes {} argument{}, found {}",
                name.name,
                expected,
                if expected == 1 { "" } else { "s" },
                got
            ),
        ));
        None
    }

    fn invalid_argument(&mut self, arg: &Expr, message: &str) {
        self.diagnostics.push(Diagnostic::error(
            codes::INVALID_ARGUMENT,
            arg.span,
            message,
        ));
    }

    fn undefined(&mut self, id: &Ident) {
        self.diagnostics.push(Diagnostic::error(
            codes::UNDEFINED_NAME,
            id.span,
            format!("undefined name '{}'", id.name),
        ));
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::{DiagCode, DiagLevel};
    use crate::sig::SigKind;

    /// Parse and resolve source.
    fn resolve_source(source: &str) -> ResolveResult {
        let result = crate::parser::parse(source);
        assert!(
            result.errors.is_empty(),
            "parse errors in test: {:?}",
            result.errors
        );
        let program = result.program.expect("parse failed in test");
        resolve(&program)
    }

    /// Resolve and expect no errors.
    fn resolve_ok(source: &str) -> ResolveResult {
        let result = resolve_source(source);
        assert!(
            !result.has_errors(),
            "unexpected errors: {:#?}",
            result.diagnostics
        );
        result
    }

    fn codes_of(result: &ResolveResult, level: DiagLevel) -> Vec<DiagCode> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.level == level)
            .filter_map(|d| d.code)
            .collect()
    }

    fn render(result: &ResolveResult) -> String {
        result.cx.render(&result.instrs)
    }

    // ── Lowering ────────────────────────────────────────────────────────

    #[test]
    fn lets_are_substituted() {
        let r = resolve_ok("let x = input(0)\nout 0 = x + x\n");
        assert_eq!(render(&r), "out 0 = (input(0) + input(0))\n");
    }

    #[test]
    fn substituted_lets_share_one_node() {
        let r = resolve_ok("let x = sin(input(0))\nout 0 = x * x\n");
        let out = *r.instrs.iter().next().unwrap();
        let SigKind::Output { body, .. } = r.cx.arena.kind(out) else {
            panic!("expected Output")
        };
        let subs = r.cx.arena.sub_signals(*body);
        assert_eq!(subs[0], subs[1]);
    }

    #[test]
    fn control_names_become_reads_of_the_body() {
        let r = resolve_ok("control c = slider(\"cut\", 1000) * 2\nout 0 = input(0) * c\n");
        assert_eq!(
            render(&r),
            "control c = (slider(\"cut\", 1000.0) * 2)\nout 0 = (input(0) * c)\n"
        );
        let read = r
            .cx
            .arena
            .reachable(r.instrs.iter().copied())
            .into_iter()
            .find(|&n| r.cx.arena.as_control_read(n).is_some())
            .expect("control read");
        let (id, origin) = r.cx.arena.as_control_read(read).unwrap();
        assert_eq!(id.as_str(), "c");
        assert_eq!(
            r.cx.arena.display(origin).to_string(),
            "(slider(\"cut\", 1000.0) * 2)"
        );
    }

    #[test]
    fn delay_reads_carry_literal_min_delay() {
        let r = resolve_ok("delayline d[16] = input(1)\nout 0 = d@3 + d@(1 + 1)\n");
        let reads: Vec<u32> = r
            .cx
            .arena
            .reachable(r.instrs.iter().copied())
            .into_iter()
            .filter_map(|n| r.cx.arena.as_delay_line_read(n).map(|d| d.min_delay))
            .collect();
        assert_eq!(reads.len(), 2);
        assert!(reads.contains(&3));
        assert!(reads.contains(&0));
    }

    #[test]
    fn shared_statements_are_accepted() {
        let r = resolve_ok("shared V1 = sin(input(0))\nout 0 = V1 + V1\n");
        assert_eq!(
            render(&r),
            "shared V1 = sin(input(0))\nout 0 = (V1 + V1)\n"
        );
    }

    #[test]
    fn declarations_in_any_order() {
        let r = resolve_ok("out 0 = c + 1\ncontrol c = k * 2\nlet k = slider(\"k\", 1)\n");
        assert_eq!(r.instrs.len(), 2);
    }

    #[test]
    fn instruction_names_are_reserved() {
        let mut r = resolve_ok("shared V1 = input(0)\nout 0 = V1\n");
        assert_eq!(r.cx.ids.fresh("V").as_str(), "V2");
    }

    #[test]
    fn negative_literals() {
        let r = resolve_ok("out 0 = input(0) * -0.5\n");
        assert_eq!(render(&r), "out 0 = (input(0) * -0.5)\n");
    }

    // ── Errors ──────────────────────────────────────────────────────────

    #[test]
    fn undefined_name() {
        let r = resolve_source("out 0 = y\n");
        assert_eq!(codes_of(&r, DiagLevel::Error), vec![codes::UNDEFINED_NAME]);
        assert!(r.instrs.is_empty());
    }

    #[test]
    fn duplicate_definition() {
        let r = resolve_source("let x = 1\ncontrol x = 2\nout 0 = x\n");
        assert_eq!(
            codes_of(&r, DiagLevel::Error),
            vec![codes::DUPLICATE_DEFINITION]
        );
        assert_eq!(r.diagnostics[0].related_spans.len(), 1);
        // The first definition wins; the duplicate instruction is dropped.
        assert_eq!(render(&r), "out 0 = 1\n");
    }

    #[test]
    fn duplicate_output_index() {
        let r = resolve_source("out 0 = 1\nout 0 = 2\n");
        assert_eq!(codes_of(&r, DiagLevel::Error), vec![codes::DUPLICATE_OUTPUT]);
    }

    #[test]
    fn self_reference_is_cyclic() {
        let r = resolve_source("control c = c + 1\nout 0 = c\n");
        assert_eq!(
            codes_of(&r, DiagLevel::Error),
            vec![codes::CYCLIC_REFERENCE]
        );
    }

    #[test]
    fn mutual_reference_reports_chain() {
        let r = resolve_source("let a = b + 1\nlet b = a * 2\nout 0 = a\n");
        let errors: Vec<&Diagnostic> = r.diagnostics.iter().filter(|d| d.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, Some(codes::CYCLIC_REFERENCE));
        assert_eq!(errors[0].cause_chain.len(), 2);
        assert_eq!(errors[0].cause_chain[0].message, "'a' refers to 'b'");
        assert_eq!(errors[0].cause_chain[1].message, "'b' refers to 'a'");
    }

    #[test]
    fn delay_line_may_read_itself() {
        let r = resolve_ok("delayline d[4] = input(0) + d@1\nout 0 = d@1\n");
        assert_eq!(
            render(&r),
            "delayline d[4] = (input(0) + d@1)\nout 0 = d@1\n"
        );
    }

    #[test]
    fn delay_lines_may_read_each_other() {
        let r = resolve_ok(
            "delayline a[2] = input(0) + b@2\ndelayline b[2] = a@1 * 0.5\nout 0 = a@1 + b@1\n",
        );
        assert_eq!(r.instrs.len(), 3);
    }

    #[test]
    fn cycle_through_control_beside_delay_line_is_rejected() {
        let r = resolve_source("delayline d[4] = c\ncontrol c = d@1 + c\nout 0 = d@1\n");
        assert_eq!(
            codes_of(&r, DiagLevel::Error),
            vec![codes::CYCLIC_REFERENCE]
        );
    }

    #[test]
    fn unknown_function() {
        let r = resolve_source("out 0 = sinh(input(0))\n");
        assert_eq!(
            codes_of(&r, DiagLevel::Error),
            vec![codes::UNKNOWN_FUNCTION]
        );
    }

    #[test]
    fn wrong_arity() {
        let r = resolve_source("out 0 = max(input(0))\nout 1 = input(0, 1)\n");
        assert_eq!(
            codes_of(&r, DiagLevel::Error),
            vec![codes::WRONG_ARITY, codes::WRONG_ARITY]
        );
    }

    #[test]
    fn bad_builtin_arguments() {
        let r = resolve_source("out 0 = input(-1)\nout 1 = slider(1, 2)\nout 2 = \"x\"\n");
        assert_eq!(
            codes_of(&r, DiagLevel::Error),
            vec![
                codes::INVALID_ARGUMENT,
                codes::INVALID_ARGUMENT,
                codes::INVALID_ARGUMENT
            ]
        );
    }

    #[test]
    fn delay_line_misuse() {
        let r = resolve_source(
            "delayline d[4] = input(0)\ncontrol c = 1\nout 0 = d\nout 1 = c@1\n",
        );
        assert_eq!(
            codes_of(&r, DiagLevel::Error),
            vec![codes::NOT_A_DELAY_LINE, codes::NOT_A_DELAY_LINE]
        );
    }

    #[test]
    fn unused_let_warns() {
        let r = resolve_source("let unused = 1\nout 0 = 2\n");
        assert!(!r.has_errors());
        assert_eq!(codes_of(&r, DiagLevel::Warning), vec![codes::UNUSED_LET]);
    }

    #[test]
    fn errors_inside_unused_let_are_reported() {
        let r = resolve_source("let unused = nope\nout 0 = 2\n");
        assert_eq!(codes_of(&r, DiagLevel::Error), vec![codes::UNDEFINED_NAME]);
        assert!(codes_of(&r, DiagLevel::Warning).is_empty());
    }

    #[test]
    fn resolution_continues_past_errors() {
        let r = resolve_source("out 0 = nope\nout 1 = input(0)\n");
        assert_eq!(r.instrs.len(), 1);
        assert_eq!(render(&r), "out 1 = input(0)\n");
    }
}
