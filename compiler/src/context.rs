// context.rs — Signal compilation context
//
// Bundles the state shared by the signal passes: the node arena, the type
// cache, the per-node property store, and the identifier allocator. Passes
// receive the context explicitly; nothing here is global.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::id::{IdAllocator, NodeId};
use crate::property::PropertyStore;
use crate::sig::{SigArena, SigKind};
use crate::types::{SigType, TypeTable};

/// A set of top-level instructions, deduplicated by handle and iterated in
/// handle order.
pub type InstrSet = BTreeSet<NodeId>;

#[derive(Debug, Default)]
pub struct SignalContext {
    pub arena: SigArena,
    pub types: TypeTable,
    pub props: PropertyStore,
    pub ids: IdAllocator,
}

impl SignalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print each instruction of `instrs` on its own line, in handle order.
    pub fn render(&self, instrs: &InstrSet) -> String {
        let mut out = String::new();
        for &i in instrs {
            out.push_str(&self.arena.display(i).to_string());
            out.push('\n');
        }
        out
    }

    /// Like `render`, with each instruction's type appended as a comment.
    pub fn render_typed(&mut self, instrs: &InstrSet) -> String {
        let mut out = String::new();
        for &i in instrs {
            let ty = self.types.type_of(&self.arena, i);
            out.push_str(&format!("{}  # {}\n", self.arena.display(i), ty));
        }
        out
    }

    /// Serializable description of each instruction, in handle order.
    pub fn records(&mut self, instrs: &InstrSet) -> Vec<InstrRecord> {
        instrs
            .iter()
            .map(|&i| {
                let (kind, index) = match self.arena.kind(i) {
                    SigKind::Output { index, .. } => ("output", Some(*index)),
                    SigKind::ControlWrite { .. } => ("control", None),
                    SigKind::DelayLineWrite { .. } => ("delayline", None),
                    SigKind::SharedWrite { .. } => ("shared", None),
                    _ => ("signal", None),
                };
                InstrRecord {
                    kind,
                    id: self.arena.written_name(i).map(|s| s.to_string()),
                    index,
                    text: self.arena.display(i).to_string(),
                    ty: self.types.type_of(&self.arena, i),
                }
            })
            .collect()
    }
}

/// One instruction of a `--emit json` dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrRecord {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub text: String,
    #[serde(rename = "type")]
    pub ty: SigType,
}
