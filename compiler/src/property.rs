// property.rs — Per-node property store
//
// Side table attaching values to (node, key) pairs. Properties live as long
// as the compilation context and are never invalidated; later passes may read
// what earlier passes wrote.

use std::collections::HashMap;

use crate::id::{IdAllocator, NodeId, Symbol};

/// Key of a node property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// Unique identifier assigned to the node under a naming prefix.
    UniqueId(&'static str),
}

#[derive(Debug, Default)]
pub struct PropertyStore {
    props: HashMap<(NodeId, PropKey), Symbol>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_property(&self, node: NodeId, key: &PropKey) -> Option<&Symbol> {
        self.props.get(&(node, key.clone()))
    }

    pub fn set_property(&mut self, node: NodeId, key: PropKey, value: Symbol) {
        self.props.insert((node, key), value);
    }

    /// Identifier of `node` under `prefix`, allocated on first request and
    /// returned unchanged afterwards.
    pub fn unique_id(&mut self, ids: &mut IdAllocator, prefix: &'static str, node: NodeId) -> Symbol {
        self.props
            .entry((node, PropKey::UniqueId(prefix)))
            .or_insert_with(|| ids.fresh(prefix))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}
