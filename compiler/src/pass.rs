// pass.rs — Pass descriptors, dependency resolution, artifact IDs
//
// Declares the compiler's semantic passes (parse is outside the runner),
// their dependency edges, and the artifacts they produce. Used by the pipeline
// runner to compute the minimal pass subset for each --emit target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass (parse excluded, it runs before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Resolve,
    TypeInfer,
    Split,
}

/// Machine-readable artifact identifiers. Each maps to a concrete field of
/// the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Signals,   // SignalContext arena + InstrSet
    Types,     // TypeTable entries for every reachable node
    Split,     // rewritten InstrSet
    SplitCert, // SplitCert
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Resolve => PassDescriptor {
            name: "resolve",
            inputs: &[],
            outputs: &[ArtifactId::Signals],
            invariants: "all names resolved, no cyclic instruction references",
        },
        PassId::TypeInfer => PassDescriptor {
            name: "type_infer",
            inputs: &[PassId::Resolve],
            outputs: &[ArtifactId::Types],
            invariants: "every reachable node has a variability",
        },
        PassId::Split => PassDescriptor {
            name: "split",
            inputs: &[PassId::TypeInfer],
            outputs: &[ArtifactId::Split, ArtifactId::SplitCert],
            invariants: "C1-C4 obligations verified",
        },
    }
}

// ── Stage certificates ─────────────────────────────────────────────────────

/// Machine-checkable evidence that a pass met its postconditions.
pub trait StageCert {
    fn all_pass(&self) -> bool;
    /// `(name, holds)` for every obligation, in a stable order.
    fn obligations(&self) -> Vec<(&'static str, bool)>;
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 3] = [PassId::Resolve, PassId::TypeInfer, PassId::Split];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_split_includes_all() {
        assert_eq!(
            required_passes(PassId::Split),
            vec![PassId::Resolve, PassId::TypeInfer, PassId::Split]
        );
    }

    #[test]
    fn required_passes_resolve_is_minimal() {
        assert_eq!(required_passes(PassId::Resolve), vec![PassId::Resolve]);
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let order = required_passes(*pass);
            let self_pos = order.iter().position(|p| p == pass).unwrap();
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep).unwrap();
                assert!(
                    dep_pos < self_pos,
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
