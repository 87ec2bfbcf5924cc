// sig.rs — Hash-consed signal arena
//
// Every signal expression and instruction is interned in a `SigArena` and
// addressed by a `NodeId`. Structurally identical nodes share one handle, so
// handle equality is the identity used by every analysis and memo table.
//
// Preconditions: sub-signal and origin handles passed to constructors belong
//   to the same arena.
// Postconditions: a node's sub-signals and origin have strictly smaller
//   handles than the node itself (the graph is acyclic by construction).
// Failure modes: a handle from another arena panics on lookup.
// Side effects: none beyond arena growth.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::id::{NodeId, Symbol};

// ── Operators ───────────────────────────────────────────────────────────────

/// Infix arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
        }
    }
}

/// Built-in math functions callable as `name(args...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MathFn {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Abs,
    Tanh,
    Floor,
    Min,
    Max,
    Pow,
}

impl MathFn {
    pub const ALL: [MathFn; 12] = [
        MathFn::Sin,
        MathFn::Cos,
        MathFn::Tan,
        MathFn::Exp,
        MathFn::Log,
        MathFn::Sqrt,
        MathFn::Abs,
        MathFn::Tanh,
        MathFn::Floor,
        MathFn::Min,
        MathFn::Max,
        MathFn::Pow,
    ];

    pub fn from_name(name: &str) -> Option<MathFn> {
        MathFn::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Sqrt => "sqrt",
            MathFn::Abs => "abs",
            MathFn::Tanh => "tanh",
            MathFn::Floor => "floor",
            MathFn::Min => "min",
            MathFn::Max => "max",
            MathFn::Pow => "pow",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            MathFn::Min | MathFn::Max | MathFn::Pow => 2,
            _ => 1,
        }
    }
}

/// A real constant stored by bit pattern, so constants hash and compare by
/// identity (`0.0` and `-0.0` are distinct nodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Real(u64);

impl Real {
    pub fn new(v: f64) -> Self {
        Real(v.to_bits())
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

// ── Node kinds ──────────────────────────────────────────────────────────────

/// The payload of an interned node.
///
/// Origins carried by control reads and shared writes are annotations (they
/// name the pre-rewrite signal for typing) and are not sub-signals. A
/// delay-line read names its line only, so a line may read its own past.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SigKind {
    Int(i64),
    Real(Real),
    /// Audio input channel. Already O(1) to read.
    Input(u32),
    /// Block-rate user control.
    Slider { label: String, init: Real },
    BinOp(BinOp, NodeId, NodeId),
    Math(MathFn, Vec<NodeId>),
    /// Read of a named control or shared instruction.
    ControlRead { id: Symbol, origin: NodeId },
    /// Read of a delay line `delay` samples in the past.
    DelayLineRead {
        id: Symbol,
        min_delay: u32,
        delay: NodeId,
    },
    Output { index: u32, body: NodeId },
    ControlWrite { id: Symbol, body: NodeId },
    DelayLineWrite {
        id: Symbol,
        max_delay: u32,
        body: NodeId,
    },
    /// Instruction computing a repeated subexpression once.
    SharedWrite {
        id: Symbol,
        origin: NodeId,
        body: NodeId,
    },
}

impl SigKind {
    /// Immediate sub-signals, in order.
    pub fn sub_signals(&self) -> Vec<NodeId> {
        match self {
            SigKind::Int(_)
            | SigKind::Real(_)
            | SigKind::Input(_)
            | SigKind::Slider { .. }
            | SigKind::ControlRead { .. } => Vec::new(),
            SigKind::BinOp(_, a, b) => vec![*a, *b],
            SigKind::Math(_, args) => args.clone(),
            SigKind::DelayLineRead { delay, .. } => vec![*delay],
            SigKind::Output { body, .. }
            | SigKind::ControlWrite { body, .. }
            | SigKind::DelayLineWrite { body, .. }
            | SigKind::SharedWrite { body, .. } => vec![*body],
        }
    }

    /// The same node shape with its sub-signals replaced, position by position.
    pub fn with_sub_signals(&self, subs: &[NodeId]) -> SigKind {
        assert_eq!(
            subs.len(),
            self.sub_signals().len(),
            "sub-signal count mismatch while rebuilding {:?}",
            self
        );
        let mut kind = self.clone();
        match &mut kind {
            SigKind::Int(_)
            | SigKind::Real(_)
            | SigKind::Input(_)
            | SigKind::Slider { .. }
            | SigKind::ControlRead { .. } => {}
            SigKind::BinOp(_, a, b) => {
                *a = subs[0];
                *b = subs[1];
            }
            SigKind::Math(_, args) => args.copy_from_slice(subs),
            SigKind::DelayLineRead { delay, .. } => *delay = subs[0],
            SigKind::Output { body, .. }
            | SigKind::ControlWrite { body, .. }
            | SigKind::DelayLineWrite { body, .. }
            | SigKind::SharedWrite { body, .. } => *body = subs[0],
        }
        kind
    }

    fn origin(&self) -> Option<NodeId> {
        match self {
            SigKind::ControlRead { origin, .. } | SigKind::SharedWrite { origin, .. } => {
                Some(*origin)
            }
            _ => None,
        }
    }

    /// True for top-level instruction kinds.
    pub fn is_instruction(&self) -> bool {
        matches!(
            self,
            SigKind::Output { .. }
                | SigKind::ControlWrite { .. }
                | SigKind::DelayLineWrite { .. }
                | SigKind::SharedWrite { .. }
        )
    }
}

/// Fields of a delay-line read, as returned by [`SigArena::as_delay_line_read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayLineRead<'a> {
    pub id: &'a Symbol,
    pub min_delay: u32,
    pub delay: NodeId,
}

// ── Arena ───────────────────────────────────────────────────────────────────

/// Interning store for signal nodes.
#[derive(Debug, Default)]
pub struct SigArena {
    nodes: Vec<SigKind>,
    interned: HashMap<SigKind, NodeId>,
}

impl SigArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Return the handle of `kind`, creating the node on first sight.
    pub fn intern(&mut self, kind: SigKind) -> NodeId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        debug_assert!(
            kind.sub_signals()
                .into_iter()
                .chain(kind.origin())
                .all(|s| s < id),
            "node {:?} references a handle that does not exist yet",
            kind
        );
        self.interned.insert(kind.clone(), id);
        self.nodes.push(kind);
        id
    }

    /// Payload of `id`. Panics if `id` was not allocated by this arena.
    pub fn kind(&self, id: NodeId) -> &SigKind {
        match self.nodes.get(id.index()) {
            Some(kind) => kind,
            None => panic!("signal {id} does not belong to this arena"),
        }
    }

    pub fn sub_signals(&self, id: NodeId) -> Vec<NodeId> {
        self.kind(id).sub_signals()
    }

    /// Intern `id` with its sub-signals replaced. Returns `id` itself when
    /// nothing changed.
    pub fn with_sub_signals(&mut self, id: NodeId, subs: &[NodeId]) -> NodeId {
        let kind = self.kind(id);
        if kind.sub_signals() == subs {
            return id;
        }
        let rebuilt = kind.with_sub_signals(subs);
        self.intern(rebuilt)
    }

    /// All nodes reachable from `roots` through sub-signals, each once.
    pub fn reachable(&self, roots: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.sub_signals(id));
        }
        order
    }

    // ── Constructors ──

    pub fn int(&mut self, v: i64) -> NodeId {
        self.intern(SigKind::Int(v))
    }

    pub fn real(&mut self, v: f64) -> NodeId {
        self.intern(SigKind::Real(Real::new(v)))
    }

    pub fn input(&mut self, channel: u32) -> NodeId {
        self.intern(SigKind::Input(channel))
    }

    pub fn slider(&mut self, label: &str, init: f64) -> NodeId {
        self.intern(SigKind::Slider {
            label: label.to_string(),
            init: Real::new(init),
        })
    }

    pub fn bin_op(&mut self, op: BinOp, a: NodeId, b: NodeId) -> NodeId {
        self.intern(SigKind::BinOp(op, a, b))
    }

    pub fn math(&mut self, fun: MathFn, args: Vec<NodeId>) -> NodeId {
        self.intern(SigKind::Math(fun, args))
    }

    pub fn make_control_read(&mut self, id: Symbol, origin: NodeId) -> NodeId {
        self.intern(SigKind::ControlRead { id, origin })
    }

    pub fn delay_line_read(&mut self, id: Symbol, min_delay: u32, delay: NodeId) -> NodeId {
        self.intern(SigKind::DelayLineRead {
            id,
            min_delay,
            delay,
        })
    }

    pub fn output(&mut self, index: u32, body: NodeId) -> NodeId {
        self.intern(SigKind::Output { index, body })
    }

    pub fn control_write(&mut self, id: Symbol, body: NodeId) -> NodeId {
        self.intern(SigKind::ControlWrite { id, body })
    }

    pub fn delay_line_write(&mut self, id: Symbol, max_delay: u32, body: NodeId) -> NodeId {
        self.intern(SigKind::DelayLineWrite {
            id,
            max_delay,
            body,
        })
    }

    pub fn make_shared_write(&mut self, id: Symbol, origin: NodeId, body: NodeId) -> NodeId {
        self.intern(SigKind::SharedWrite { id, origin, body })
    }

    // ── Kind predicates ──

    pub fn is_input(&self, id: NodeId) -> bool {
        matches!(self.kind(id), SigKind::Input(_))
    }

    pub fn as_control_read(&self, id: NodeId) -> Option<(&Symbol, NodeId)> {
        match self.kind(id) {
            SigKind::ControlRead { id, origin } => Some((id, *origin)),
            _ => None,
        }
    }

    pub fn as_delay_line_read(&self, id: NodeId) -> Option<DelayLineRead<'_>> {
        match self.kind(id) {
            SigKind::DelayLineRead {
                id,
                min_delay,
                delay,
            } => Some(DelayLineRead {
                id,
                min_delay: *min_delay,
                delay: *delay,
            }),
            _ => None,
        }
    }

    /// `(id, origin, body)` of a shared write.
    pub fn as_shared_write(&self, id: NodeId) -> Option<(&Symbol, NodeId, NodeId)> {
        match self.kind(id) {
            SigKind::SharedWrite { id, origin, body } => Some((id, *origin, *body)),
            _ => None,
        }
    }

    /// Name written by an instruction, if it writes a named slot.
    pub fn written_name(&self, id: NodeId) -> Option<&Symbol> {
        match self.kind(id) {
            SigKind::ControlWrite { id, .. }
            | SigKind::DelayLineWrite { id, .. }
            | SigKind::SharedWrite { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Render `id` in signal notation.
    pub fn display(&self, id: NodeId) -> SigDisplay<'_> {
        SigDisplay { arena: self, id }
    }
}

// ── Printing ────────────────────────────────────────────────────────────────

/// Display adapter produced by [`SigArena::display`].
///
/// Shared sub-signals are printed at every use; output size follows the tree
/// expansion of the node, not the DAG.
pub struct SigDisplay<'a> {
    arena: &'a SigArena,
    id: NodeId,
}

impl fmt::Display for SigDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sig(self.arena, self.id, f)
    }
}

fn write_real(v: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // `{:?}` keeps a fractional part (`1.0`), so the literal reads back as real.
    write!(f, "{:?}", v)
}

fn write_sig(arena: &SigArena, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match arena.kind(id) {
        SigKind::Int(v) => write!(f, "{v}"),
        SigKind::Real(r) => write_real(r.value(), f),
        SigKind::Input(i) => write!(f, "input({i})"),
        SigKind::Slider { label, init } => {
            write!(f, "slider({label:?}, ")?;
            write_real(init.value(), f)?;
            write!(f, ")")
        }
        SigKind::BinOp(op, a, b) => {
            write!(f, "(")?;
            write_sig(arena, *a, f)?;
            write!(f, " {} ", op.symbol())?;
            write_sig(arena, *b, f)?;
            write!(f, ")")
        }
        SigKind::Math(fun, args) => {
            write!(f, "{}(", fun.name())?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_sig(arena, *arg, f)?;
            }
            write!(f, ")")
        }
        SigKind::ControlRead { id, .. } => write!(f, "{id}"),
        SigKind::DelayLineRead { id, delay, .. } => {
            write!(f, "{id}@")?;
            write_sig(arena, *delay, f)
        }
        SigKind::Output { index, body } => {
            write!(f, "out {index} = ")?;
            write_sig(arena, *body, f)
        }
        SigKind::ControlWrite { id, body } => {
            write!(f, "control {id} = ")?;
            write_sig(arena, *body, f)
        }
        SigKind::DelayLineWrite {
            id,
            max_delay,
            body,
        } => {
            write!(f, "delayline {id}[{max_delay}] = ")?;
            write_sig(arena, *body, f)
        }
        SigKind::SharedWrite { id, body, .. } => {
            write!(f, "shared {id} = ")?;
            write_sig(arena, *body, f)
        }
    }
}
