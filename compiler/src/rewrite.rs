// rewrite.rs — Memoized signal rewriting
//
// Generic depth-first transformer over the signal DAG. Implementors supply a
// memo table and may override `transformation`, the per-node hook; the
// default hook rebuilds a node from its rewritten sub-signals. `apply` is the
// entry point and rewrites each distinct node at most once per transformer.
//
// Preconditions: every handle belongs to the arena passed in.
// Postconditions: `apply(n)` returns the same handle on every call for a given
//   transformer; nodes whose sub-signals are unchanged map to themselves.
// Failure modes: none.
// Side effects: interns rebuilt nodes in the arena.

use std::collections::HashMap;

use crate::id::NodeId;
use crate::sig::SigArena;

pub trait SignalTransform {
    /// Memo table of already rewritten nodes.
    fn memo(&mut self) -> &mut HashMap<NodeId, NodeId>;

    /// Per-node rewrite hook. Called once per distinct node.
    fn transformation(&mut self, arena: &mut SigArena, sig: NodeId) -> NodeId {
        rebuild(self, arena, sig)
    }

    /// Rewrite `sig`, reusing the memoized result when there is one.
    fn apply(&mut self, arena: &mut SigArena, sig: NodeId) -> NodeId {
        if let Some(&done) = self.memo().get(&sig) {
            return done;
        }
        let result = self.transformation(arena, sig);
        self.memo().insert(sig, result);
        result
    }
}

/// Default structural rebuild: rewrite every sub-signal through `t`, then
/// re-intern the node with the results.
pub fn rebuild<T: SignalTransform + ?Sized>(t: &mut T, arena: &mut SigArena, sig: NodeId) -> NodeId {
    let subs = arena.sub_signals(sig);
    if subs.is_empty() {
        return sig;
    }
    let rewritten: Vec<NodeId> = subs.iter().map(|&s| t.apply(arena, s)).collect();
    arena.with_sub_signals(sig, &rewritten)
}

/// Transformer with no override: maps every node to itself.
#[derive(Debug, Default)]
pub struct Identity {
    memo: HashMap<NodeId, NodeId>,
}

impl Identity {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalTransform for Identity {
    fn memo(&mut self) -> &mut HashMap<NodeId, NodeId> {
        &mut self.memo
    }
}
