// split.rs — Common-subexpression splitting
//
// Factors repeated sample-rate subexpressions out of an instruction set. Each
// profitable repeated node becomes a shared-write instruction computed once,
// and every use site reads it through a control-read.
//
// Preconditions: instruction handles belong to `cx.arena`; types are either
//   annotated or inferable from the arena.
// Postconditions: the output holds one rewritten instruction per input
//   instruction plus the new shared writes; C1-C4 hold (see `verify_split`).
// Failure modes: none.
// Side effects: interns new nodes; records each extracted node's identifier
//   in the property store, so later runs reuse it.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, trace};

use crate::context::{InstrSet, SignalContext};
use crate::id::{IdAllocator, NodeId, Symbol};
use crate::occurrences::Occurrences;
use crate::pass::StageCert;
use crate::property::PropertyStore;
use crate::rewrite::{rebuild, SignalTransform};
use crate::sig::{SigArena, SigKind};
use crate::types::{TypeTable, Variability};

/// Naming prefix of shared-write identifiers.
pub const SHARED_PREFIX: &str = "V";

// ── Extractor ───────────────────────────────────────────────────────────────

/// Rewriter that hoists repeated, sample-rate nodes into shared writes.
pub struct CommonSubexpr<'a> {
    occ: &'a Occurrences,
    types: &'a mut TypeTable,
    props: &'a mut PropertyStore,
    ids: &'a mut IdAllocator,
    memo: HashMap<NodeId, NodeId>,
    shared: InstrSet,
}

impl<'a> CommonSubexpr<'a> {
    pub fn new(
        occ: &'a Occurrences,
        types: &'a mut TypeTable,
        props: &'a mut PropertyStore,
        ids: &'a mut IdAllocator,
    ) -> Self {
        CommonSubexpr {
            occ,
            types,
            props,
            ids,
            memo: HashMap::new(),
            shared: InstrSet::new(),
        }
    }

    /// Shared writes created so far.
    pub fn shared(&self) -> &InstrSet {
        &self.shared
    }

    pub fn into_shared(self) -> InstrSet {
        self.shared
    }

    /// Checks run in order; the first failing one rejects the node.
    fn is_shareable(&mut self, arena: &SigArena, sig: NodeId) -> bool {
        if self.occ.get(sig) <= 1 {
            return false;
        }
        if self.types.type_of(arena, sig).variability < Variability::Samp {
            return false;
        }
        if arena.is_input(sig) {
            return false;
        }
        if arena.as_control_read(sig).is_some() {
            return false;
        }
        arena.as_delay_line_read(sig).is_none()
    }
}

impl SignalTransform for CommonSubexpr<'_> {
    fn memo(&mut self) -> &mut HashMap<NodeId, NodeId> {
        &mut self.memo
    }

    fn transformation(&mut self, arena: &mut SigArena, sig: NodeId) -> NodeId {
        if !self.is_shareable(arena, sig) {
            return rebuild(self, arena, sig);
        }
        // Nested candidates are extracted before this node is wrapped.
        let body = rebuild(self, arena, sig);
        let id = self.props.unique_id(self.ids, SHARED_PREFIX, sig);
        debug!(
            %id,
            %sig,
            occurrences = self.occ.get(sig),
            kind = ?arena.kind(sig),
            "candidate for sharing"
        );
        let write = arena.make_shared_write(id.clone(), sig, body);
        self.shared.insert(write);
        arena.make_control_read(id, sig)
    }
}

// ── Pass driver ─────────────────────────────────────────────────────────────

/// Split repeated subexpressions of `instrs` into shared instructions.
///
/// Returns the rewritten instructions together with the new shared writes.
/// Running the pass again on its own output returns that output unchanged.
pub fn split_common_subexpr(cx: &mut SignalContext, instrs: &InstrSet) -> InstrSet {
    let occ = Occurrences::count(&cx.arena, instrs);
    let mut cs = CommonSubexpr::new(&occ, &mut cx.types, &mut cx.props, &mut cx.ids);

    let mut result = InstrSet::new();
    for &instr in instrs {
        result.insert(cs.apply(&mut cx.arena, instr));
    }

    let shared = cs.into_shared();
    debug!(
        instructions = instrs.len(),
        distinct_nodes = occ.distinct(),
        shared = shared.len(),
        "split common subexpressions"
    );
    result.extend(shared);

    for &instr in &result {
        trace!(%instr, kind = ?cx.arena.kind(instr), "split result");
    }
    result
}

// ── Statistics ──────────────────────────────────────────────────────────────

/// Size summary of one split run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitStats {
    pub input_instructions: usize,
    pub output_instructions: usize,
    pub shared_instructions: usize,
    pub distinct_nodes: usize,
}

pub fn split_stats(arena: &SigArena, input: &InstrSet, output: &InstrSet) -> SplitStats {
    SplitStats {
        input_instructions: input.len(),
        output_instructions: output.len(),
        shared_instructions: new_shared_writes(arena, input, output).count(),
        distinct_nodes: arena.reachable(output.iter().copied()).len(),
    }
}

/// Shared writes created by the pass: their identifier is not written by any
/// input instruction. Shared statements supplied with the input keep their
/// name even when their body is rewritten.
fn new_shared_writes<'a>(
    arena: &'a SigArena,
    input: &'a InstrSet,
    output: &'a InstrSet,
) -> impl Iterator<Item = NodeId> + 'a {
    let declared: HashSet<&Symbol> = input.iter().filter_map(|&i| arena.written_name(i)).collect();
    output.iter().copied().filter(move |&o| {
        arena
            .as_shared_write(o)
            .is_some_and(|(id, _, _)| !declared.contains(id))
    })
}

// ── Verification ────────────────────────────────────────────────────────────

/// Machine-checkable evidence for split postconditions (C1-C4).
#[derive(Debug, Clone)]
pub struct SplitCert {
    /// C1: Every input instruction keeps exactly one counterpart in the output,
    /// and every other output instruction is a new shared write.
    pub c1_instructions_preserved: bool,
    /// C2: No shared write created by the pass wraps an input or an existing read.
    pub c2_no_double_wrap: bool,
    /// C3: Shared-write identifiers are unique.
    pub c3_unique_shared_ids: bool,
    /// C4: Every control-read introduced by the pass names a written slot.
    pub c4_reads_defined: bool,
}

impl StageCert for SplitCert {
    fn all_pass(&self) -> bool {
        self.c1_instructions_preserved
            && self.c2_no_double_wrap
            && self.c3_unique_shared_ids
            && self.c4_reads_defined
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("C1_instructions_preserved", self.c1_instructions_preserved),
            ("C2_no_double_wrap", self.c2_no_double_wrap),
            ("C3_unique_shared_ids", self.c3_unique_shared_ids),
            ("C4_reads_defined", self.c4_reads_defined),
        ]
    }
}

/// Verify split postconditions for `output`, produced from `input`.
pub fn verify_split(arena: &SigArena, input: &InstrSet, output: &InstrSet) -> SplitCert {
    SplitCert {
        c1_instructions_preserved: verify_c1_instructions_preserved(arena, input, output),
        c2_no_double_wrap: verify_c2_no_double_wrap(arena, input, output),
        c3_unique_shared_ids: verify_c3_unique_shared_ids(arena, output),
        c4_reads_defined: verify_c4_reads_defined(arena, input, output),
    }
}

/// Slot written by an instruction: an output channel or a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Output(u32),
    Named(Symbol),
}

fn slot(arena: &SigArena, id: NodeId) -> Option<Slot> {
    match arena.kind(id) {
        SigKind::Output { index, .. } => Some(Slot::Output(*index)),
        _ => arena.written_name(id).cloned().map(Slot::Named),
    }
}

/// C1: Each slot written by the input is written by as many output
/// instructions as input ones, and every output instruction outside those
/// slots is a new shared write.
fn verify_c1_instructions_preserved(arena: &SigArena, input: &InstrSet, output: &InstrSet) -> bool {
    if output.len() < input.len() {
        return false;
    }
    let mut expected: HashMap<Slot, usize> = HashMap::new();
    for s in input.iter().filter_map(|&i| slot(arena, i)) {
        *expected.entry(s).or_default() += 1;
    }
    let mut written: HashMap<Slot, usize> = HashMap::new();
    for &o in output {
        match slot(arena, o) {
            Some(s) if expected.contains_key(&s) => *written.entry(s).or_default() += 1,
            _ if arena.as_shared_write(o).is_some() => {}
            _ => return false,
        }
    }
    expected == written
}

/// C2: No new shared write has an input, control-read, or delay-line-read
/// origin, and none merely forwards a control-read.
fn verify_c2_no_double_wrap(arena: &SigArena, input: &InstrSet, output: &InstrSet) -> bool {
    new_shared_writes(arena, input, output)
        .filter_map(|o| arena.as_shared_write(o))
        .all(|(_, origin, body)| {
            !arena.is_input(origin)
                && arena.as_control_read(origin).is_none()
                && arena.as_delay_line_read(origin).is_none()
                && arena.as_control_read(body).is_none()
        })
}

/// C3: No two shared writes in the output share an identifier.
fn verify_c3_unique_shared_ids(arena: &SigArena, output: &InstrSet) -> bool {
    let mut seen = HashSet::new();
    output
        .iter()
        .filter_map(|&o| arena.as_shared_write(o))
        .all(|(id, _, _)| seen.insert(id.clone()))
}

/// C4: Control-reads reachable from the output but not from the input name a
/// slot written by some output instruction.
fn verify_c4_reads_defined(arena: &SigArena, input: &InstrSet, output: &InstrSet) -> bool {
    let control_reads = |roots: &InstrSet| -> HashSet<Symbol> {
        arena
            .reachable(roots.iter().copied())
            .into_iter()
            .filter_map(|n| arena.as_control_read(n).map(|(id, _)| id.clone()))
            .collect()
    };
    let before = control_reads(input);
    let written: HashSet<&Symbol> = output.iter().filter_map(|&o| arena.written_name(o)).collect();
    control_reads(output)
        .iter()
        .filter(|id| !before.contains(*id))
        .all(|id| written.contains(id))
}

// ── Tests ───────────────────────────────────────────────────────────────────
