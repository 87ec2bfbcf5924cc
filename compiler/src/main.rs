// main.rs — sigc command-line driver
//
// Reads a signal-notation source file, runs the pipeline up to the requested
// emit stage and writes the result to stdout or `-o`.
//
// Failure modes: compile errors exit with 1, I/O errors with 2. Diagnostics
//                and logs go to stderr.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sigc::diag::Diagnostic;
use sigc::pass::PassId;
use sigc::pipeline::{run_pipeline, CompilationState};
use tracing::{debug, Level, Metadata};
use tracing_subscriber::filter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Parsed syntax tree (debug form)
    Ast,
    /// Resolved instruction set
    Sig,
    /// Resolved instructions annotated with their types
    Typed,
    /// Instruction set after common-subexpression splitting
    Split,
    /// Split instruction set as JSON records
    Json,
    /// Split statistics as JSON
    Stats,
}

impl EmitStage {
    fn terminal(self) -> Option<PassId> {
        match self {
            EmitStage::Ast => None,
            EmitStage::Sig => Some(PassId::Resolve),
            EmitStage::Typed => Some(PassId::TypeInfer),
            EmitStage::Split | EmitStage::Json | EmitStage::Stats => Some(PassId::Split),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "sigc",
    version,
    about = "Signal instruction compiler — splits repeated sample-rate subexpressions into shared instructions"
)]
struct Cli {
    /// Input .sig source file
    source: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Split)]
    emit: EmitStage,

    /// Skip the split postcondition check
    #[arg(long)]
    no_verify: bool,

    /// Log compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    debug!(source = %cli.source.display(), emit = ?cli.emit, "starting");

    // ── Read and parse source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("sigc: error: {}: {}", cli.source.display(), e);
            return ExitCode::from(2);
        }
    };

    let program = match sigc::pipeline::parse_program(&source) {
        Ok(p) => p,
        Err(diags) => {
            report(&cli.source, &source, &diags);
            return ExitCode::from(1);
        }
    };
    debug!(statements = program.statements.len(), "parsed");

    let text = match cli.emit.terminal() {
        None => format!("{:#?}\n", program),
        Some(terminal) => {
            let mut state = CompilationState::new(program);
            let result = run_pipeline(&mut state, terminal, !cli.no_verify, |_, diags| {
                report(&cli.source, &source, diags)
            });
            if let Err(e) = result {
                debug!(pass = ?e.failing_pass, "compilation failed");
                return ExitCode::from(1);
            }
            match emit(&mut state, cli.emit) {
                Ok(text) => text,
                Err(e) => {
                    eprintln!("sigc: error: {}", e);
                    return ExitCode::from(2);
                }
            }
        }
    };

    // ── Write output ──
    let written = match &cli.output {
        Some(path) => std::fs::write(path, text).map_err(|e| (path.clone(), e)),
        None => {
            print!("{}", text);
            Ok(())
        }
    };
    if let Err((path, e)) = written {
        eprintln!("sigc: error: {}: {}", path.display(), e);
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}

fn emit(state: &mut CompilationState, stage: EmitStage) -> Result<String, serde_json::Error> {
    let split = state.split.clone().unwrap_or_default();
    Ok(match stage {
        EmitStage::Ast => format!("{:#?}\n", state.program),
        EmitStage::Sig => state.cx.render(&state.instrs),
        EmitStage::Typed => {
            let instrs = state.instrs.clone();
            state.cx.render_typed(&instrs)
        }
        EmitStage::Split => state.cx.render(&split),
        EmitStage::Json => {
            let records = state.cx.records(&split);
            serde_json::to_string_pretty(&records)? + "\n"
        }
        EmitStage::Stats => {
            let stats = sigc::split::split_stats(&state.cx.arena, &state.instrs, &split);
            serde_json::to_string_pretty(&stats)? + "\n"
        }
    })
}

/// Print diagnostics to stderr as `file:line:col: message`.
fn report(path: &Path, source: &str, diags: &[Diagnostic]) {
    for d in diags {
        let (line, col) = line_col(source, d.span.start);
        eprintln!("{}:{}:{}: {}", path.display(), line, col, d);
        for related in &d.related_spans {
            let (line, col) = line_col(source, related.span.start);
            eprintln!("  {}:{}:{}: {}", path.display(), line, col, related.label);
        }
    }
}

fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let col = before.len() - before.rfind('\n').map_or(0, |i| i + 1) + 1;
    (line, col)
}

fn init_logger(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let console_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter::filter_fn(|metadata| {
            // For external crates, show only the error logs.
            metadata.level() <= &Level::ERROR
                || metadata
                    .module_path()
                    .unwrap_or_default()
                    .starts_with("sigc")
        }))
        .with_filter(filter::filter_fn(up_to(level)));
    tracing_subscriber::registry().with(console_log).init();
}

fn up_to(level: Level) -> impl Fn(&Metadata) -> bool {
    move |metadata| metadata.level() <= &level
}
