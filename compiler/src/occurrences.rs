// occurrences.rs — Occurrence counting over an instruction set
//
// Counts, for every distinct node reachable from the instructions, how many
// references to it exist. A node's sub-signals are visited only on its first
// encounter, so the work is linear in nodes plus edges even when the DAG is
// heavily shared.
//
// Preconditions: instruction handles belong to `arena`.
// Postconditions: `get(n)` is the number of incoming references to `n` (plus
//   one per occurrence as a root); 0 for unreachable nodes.
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;

use crate::id::NodeId;
use crate::sig::SigArena;

#[derive(Debug, Default)]
pub struct Occurrences {
    counts: HashMap<NodeId, u32>,
}

impl Occurrences {
    pub fn count<'a>(arena: &SigArena, instrs: impl IntoIterator<Item = &'a NodeId>) -> Self {
        let mut occ = Occurrences::default();
        for &root in instrs {
            occ.visit(arena, root);
        }
        occ
    }

    fn visit(&mut self, arena: &SigArena, root: NodeId) {
        let mut stack = vec![root];
        while let Some(e) = stack.pop() {
            let n = self.counts.entry(e).or_insert(0);
            *n += 1;
            if *n == 1 {
                // First occurrence: descend once.
                stack.extend(arena.sub_signals(e));
            }
        }
    }

    pub fn get(&self, e: NodeId) -> u32 {
        self.counts.get(&e).copied().unwrap_or(0)
    }

    /// Number of distinct nodes seen.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::{BinOp, MathFn};

    #[test]
    fn counts_every_reference() {
        let mut arena = SigArena::new();
        let x = arena.input(0);
        let s = arena.math(MathFn::Sin, vec![x]);
        let sum = arena.bin_op(BinOp::Add, s, s);
        let prod = arena.bin_op(BinOp::Mul, s, sum);
        let o0 = arena.output(0, sum);
        let o1 = arena.output(1, prod);

        let occ = Occurrences::count(&arena, &[o0, o1]);
        assert_eq!(occ.get(o0), 1);
        assert_eq!(occ.get(o1), 1);
        assert_eq!(occ.get(prod), 1);
        assert_eq!(occ.get(sum), 2);
        // twice in sum, once in prod
        assert_eq!(occ.get(s), 3);
        // only below s, visited once
        assert_eq!(occ.get(x), 1);
        assert_eq!(occ.distinct(), 6);
    }

    #[test]
    fn leaves_are_counted() {
        let mut arena = SigArena::new();
        let one = arena.int(1);
        let out = arena.output(0, one);
        let occ = Occurrences::count(&arena, &[out]);
        assert_eq!(occ.get(one), 1);
    }

    #[test]
    fn unvisited_nodes_count_zero() {
        let mut arena = SigArena::new();
        let x = arena.input(0);
        let y = arena.input(1);
        let out = arena.output(0, x);
        let occ = Occurrences::count(&arena, &[out]);
        assert_eq!(occ.get(y), 0);
    }

    #[test]
    fn origins_are_not_traversed() {
        let mut arena = SigArena::new();
        let x = arena.input(0);
        let s = arena.math(MathFn::Sin, vec![x]);
        let cr = arena.make_control_read(crate::id::Symbol::new("c"), s);
        let sum = arena.bin_op(BinOp::Add, cr, cr);
        let out = arena.output(0, sum);
        let occ = Occurrences::count(&arena, &[out]);
        assert_eq!(occ.get(cr), 2);
        assert_eq!(occ.get(s), 0);
    }

    #[test]
    fn deep_sharing_is_linear() {
        // x_{k+1} = x_k + x_k: 2^depth tree paths, depth + 1 distinct nodes.
        let mut arena = SigArena::new();
        let mut cur = arena.input(0);
        for _ in 0..64 {
            cur = arena.bin_op(BinOp::Add, cur, cur);
        }
        let out = arena.output(0, cur);
        let occ = Occurrences::count(&arena, &[out]);
        assert_eq!(occ.distinct(), 66);
        assert_eq!(occ.get(cur), 1);
    }
}
