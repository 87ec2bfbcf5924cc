// pipeline.rs — Compilation state and pass orchestration
//
// Holds all pass artifacts and runs the minimal set of passes for a given
// terminal PassId.
//
// Preconditions: the Program must be set before calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics; split certificate failure.
// Side effects: calls on_pass_complete callback after each pass for immediate display;
//   logs each pass's elapsed time at debug level.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::ast::Program;
use crate::context::{InstrSet, SignalContext};
use crate::diag::{codes, Diagnostic};
use crate::pass::{descriptor, required_passes, PassId, StageCert};
use crate::split::SplitCert;

// ── Artifact storage ───────────────────────────────────────────────────────

/// Holds all compilation artifacts and accumulated diagnostics.
#[derive(Debug)]
pub struct CompilationState {
    pub program: Program,
    /// Arena, types, properties and identifiers shared by every pass.
    pub cx: SignalContext,
    /// Instruction set produced by `Resolve`.
    pub instrs: InstrSet,
    /// Number of nodes typed by `TypeInfer`, once it has run.
    pub typed_nodes: Option<usize>,
    /// Instruction set produced by `Split`.
    pub split: Option<InstrSet>,
    pub cert: Option<SplitCert>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            cx: SignalContext::new(),
            instrs: InstrSet::new(),
            typed_nodes: None,
            split: None,
            cert: None,
            diagnostics: Vec::new(),
            has_error: false,
        }
    }
}

// ── Parsing ────────────────────────────────────────────────────────────────

/// Parse `source`, turning lexer and parser errors into `E0001` diagnostics.
pub fn parse_program(source: &str) -> Result<Program, Vec<Diagnostic>> {
    let result = crate::parser::parse(source);
    let diags: Vec<Diagnostic> = result
        .errors
        .iter()
        .map(|e| Diagnostic::error(codes::SYNTAX, *e.span(), e.to_string()))
        .collect();
    match result.program {
        Some(program) if diags.is_empty() => Ok(program),
        Some(program) => {
            debug!(statements = program.statements.len(), "discarding partial parse");
            Err(diags)
        }
        None => Err(diags),
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

// ── Helper: per-pass bookkeeping ───────────────────────────────────────────

/// Per-pass post-processing: callback, accumulate, log, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = diags.iter().any(Diagnostic::is_error);
    state.diagnostics.extend(diags);
    debug!(
        pass = descriptor(pass_id).name,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "pass complete"
    );
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → log → error check.
/// With `verify` set, the split certificate is checked and a failing
/// obligation becomes an `E0900` error.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    verify: bool,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        let diags = match pass_id {
            PassId::Resolve => {
                let result = crate::resolve::resolve(&state.program);
                state.cx = result.cx;
                state.instrs = result.instrs;
                result.diagnostics
            }
            PassId::TypeInfer => {
                let roots = state.instrs.iter().copied();
                let n = state.cx.types.annotate_all(&state.cx.arena, roots);
                state.typed_nodes = Some(n);
                Vec::new()
            }
            PassId::Split => {
                let input = state.instrs.clone();
                let output = crate::split::split_common_subexpr(&mut state.cx, &input);
                let mut diags = Vec::new();
                if verify {
                    let cert = crate::split::verify_split(&state.cx.arena, &input, &output);
                    if !cert.all_pass() {
                        let failed: Vec<&str> = cert
                            .obligations()
                            .into_iter()
                            .filter(|(_, ok)| !ok)
                            .map(|(name, _)| name)
                            .collect();
                        diags.push(Diagnostic::error(
                            codes::SPLIT_POSTCONDITION,
                            state.program.span,
                            format!("split verification failed: {}", failed.join(", ")),
                        ));
                    }
                    state.cert = Some(cert);
                }
                state.split = Some(output);
                diags
            }
        };
        finish_pass(state, pass_id, diags, t.elapsed(), &mut on_pass_complete)?;
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────
