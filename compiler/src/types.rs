// types.rs — Signal types and variability inference
//
// Classifies each node by how often its value may change (Konst < Block <
// Samp) and by numeric nature (Int < Real). Types are inferred on demand and
// memoized per handle; explicit annotations take precedence over inference.
//
// Preconditions: handles belong to the arena passed alongside.
// Postconditions: every queried node (and every node below it) has a cached type.
// Failure modes: none.
// Side effects: fills the type cache.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::id::NodeId;
use crate::sig::{SigArena, SigKind};

/// How often a signal's value may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variability {
    /// Known at compile time.
    Konst,
    /// Changes at most once per audio block (user controls).
    Block,
    /// Changes every sample.
    Samp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Nature {
    Int,
    Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SigType {
    pub nature: Nature,
    pub variability: Variability,
}

impl SigType {
    pub const fn new(nature: Nature, variability: Variability) -> Self {
        SigType {
            nature,
            variability,
        }
    }

    /// Least upper bound of two types.
    pub fn join(self, other: SigType) -> SigType {
        SigType {
            nature: self.nature.max(other.nature),
            variability: self.variability.max(other.variability),
        }
    }
}

impl fmt::Display for SigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nature = match self.nature {
            Nature::Int => "int",
            Nature::Real => "real",
        };
        let variability = match self.variability {
            Variability::Konst => "konst",
            Variability::Block => "block",
            Variability::Samp => "samp",
        };
        write!(f, "{nature}/{variability}")
    }
}

/// Cache of node types.
#[derive(Debug, Default)]
pub struct TypeTable {
    types: HashMap<NodeId, SigType>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the type of `id`, overriding whatever inference would produce.
    pub fn annotate(&mut self, id: NodeId, ty: SigType) {
        self.types.insert(id, ty);
    }

    /// Cached type of `id`, without inferring.
    pub fn get(&self, id: NodeId) -> Option<SigType> {
        self.types.get(&id).copied()
    }

    /// Type of `id`, inferring and caching it (and its sub-signals) if needed.
    pub fn type_of(&mut self, arena: &SigArena, id: NodeId) -> SigType {
        if let Some(ty) = self.get(id) {
            return ty;
        }
        let ty = self.infer(arena, id);
        self.types.insert(id, ty);
        ty
    }

    /// Type every node reachable from `roots`. Returns how many nodes are typed.
    pub fn annotate_all(
        &mut self,
        arena: &SigArena,
        roots: impl IntoIterator<Item = NodeId>,
    ) -> usize {
        let mut nodes = arena.reachable(roots);
        // Children before parents keeps the recursion in `type_of` shallow.
        nodes.sort();
        for &id in &nodes {
            self.type_of(arena, id);
        }
        nodes.len()
    }

    fn infer(&mut self, arena: &SigArena, id: NodeId) -> SigType {
        match arena.kind(id) {
            SigKind::Int(_) => SigType::new(Nature::Int, Variability::Konst),
            SigKind::Real(_) => SigType::new(Nature::Real, Variability::Konst),
            SigKind::Input(_) => SigType::new(Nature::Real, Variability::Samp),
            SigKind::Slider { .. } => SigType::new(Nature::Real, Variability::Block),
            SigKind::BinOp(_, a, b) => {
                let (a, b) = (*a, *b);
                self.type_of(arena, a).join(self.type_of(arena, b))
            }
            SigKind::Math(_, args) => {
                let args = args.clone();
                let mut ty = SigType::new(Nature::Real, Variability::Konst);
                for arg in args {
                    ty = ty.join(self.type_of(arena, arg));
                }
                ty
            }
            SigKind::ControlRead { origin, .. } => self.type_of(arena, *origin),
            // Delay lines hold real samples; the line's body is not consulted.
            SigKind::DelayLineRead { .. } => SigType::new(Nature::Real, Variability::Samp),
            SigKind::Output { body, .. }
            | SigKind::ControlWrite { body, .. }
            | SigKind::DelayLineWrite { body, .. }
            | SigKind::SharedWrite { body, .. } => self.type_of(arena, *body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Symbol;
    use crate::sig::{BinOp, MathFn};

    #[test]
    fn variability_order() {
        assert!(Variability::Konst < Variability::Block);
        assert!(Variability::Block < Variability::Samp);
        assert!(Nature::Int < Nature::Real);
    }

    #[test]
    fn leaves() {
        let mut arena = SigArena::new();
        let mut types = TypeTable::new();
        let i = arena.int(3);
        let r = arena.real(0.25);
        let x = arena.input(0);
        let g = arena.slider("gain", 1.0);
        assert_eq!(
            types.type_of(&arena, i),
            SigType::new(Nature::Int, Variability::Konst)
        );
        assert_eq!(
            types.type_of(&arena, r),
            SigType::new(Nature::Real, Variability::Konst)
        );
        assert_eq!(types.type_of(&arena, x).variability, Variability::Samp);
        assert_eq!(types.type_of(&arena, g).variability, Variability::Block);
    }

    #[test]
    fn operations_join_their_arguments() {
        let mut arena = SigArena::new();
        let mut types = TypeTable::new();
        let two = arena.int(2);
        let g = arena.slider("gain", 1.0);
        let x = arena.input(0);

        let block = arena.bin_op(BinOp::Mul, g, two);
        assert_eq!(
            types.type_of(&arena, block),
            SigType::new(Nature::Real, Variability::Block)
        );

        let ints = arena.bin_op(BinOp::Add, two, two);
        assert_eq!(
            types.type_of(&arena, ints),
            SigType::new(Nature::Int, Variability::Konst)
        );

        let sin = arena.math(MathFn::Sin, vec![two]);
        assert_eq!(
            types.type_of(&arena, sin),
            SigType::new(Nature::Real, Variability::Konst)
        );

        let samp = arena.math(MathFn::Max, vec![block, x]);
        assert_eq!(types.type_of(&arena, samp).variability, Variability::Samp);
    }

    #[test]
    fn control_reads_follow_origin_and_delay_reads_are_real() {
        let mut arena = SigArena::new();
        let mut types = TypeTable::new();
        let g = arena.slider("gain", 1.0);
        let two = arena.int(2);
        let body = arena.bin_op(BinOp::Mul, g, two);
        let cr = arena.make_control_read(Symbol::new("c"), body);
        assert_eq!(types.type_of(&arena, cr).variability, Variability::Block);

        let one = arena.int(1);
        let dl = arena.delay_line_read(Symbol::new("d"), 1, one);
        assert_eq!(
            types.type_of(&arena, dl),
            SigType::new(Nature::Real, Variability::Samp)
        );
    }

    #[test]
    fn annotations_override_inference() {
        let mut arena = SigArena::new();
        let mut types = TypeTable::new();
        let x = arena.input(0);
        let sq = arena.bin_op(BinOp::Mul, x, x);
        types.annotate(sq, SigType::new(Nature::Real, Variability::Block));
        assert_eq!(types.type_of(&arena, sq).variability, Variability::Block);
    }

    #[test]
    fn annotate_all_types_reachable_nodes() {
        let mut arena = SigArena::new();
        let mut types = TypeTable::new();
        let x = arena.input(0);
        let sq = arena.bin_op(BinOp::Mul, x, x);
        let out = arena.output(0, sq);
        let unrelated = arena.int(9);
        assert_eq!(types.annotate_all(&arena, [out]), 3);
        assert!(types.get(x).is_some());
        assert!(types.get(sq).is_some());
        assert!(types.get(unrelated).is_none());
    }

    #[test]
    fn display() {
        let ty = SigType::new(Nature::Real, Variability::Samp);
        assert_eq!(ty.to_string(), "real/samp");
    }
}
