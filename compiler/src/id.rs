// id.rs — Node handles and instruction names
//
// `NodeId` addresses an interned node in the signal arena. `Symbol` names an
// instruction (control, delay line, shared write). The allocator hands out
// fresh symbols in allocation order, so identifier assignment is deterministic
// for a given input program.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Handle of an interned signal node.
///
/// Handles are allocated after all sub-signals of the node exist, so a node's
/// sub-signals always carry strictly smaller handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Name of an instruction. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: impl AsRef<str>) -> Self {
        Symbol(Rc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocator for fresh instruction names.
///
/// A single counter is shared by all prefixes, so `fresh("V")` followed by
/// `fresh("W")` yields `V1`, `W2`. Names declared by the program are reserved
/// up front and skipped.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
    taken: HashSet<Symbol>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` as used. Returns false if it was already taken.
    pub fn reserve(&mut self, name: &Symbol) -> bool {
        self.taken.insert(name.clone())
    }

    pub fn is_taken(&self, name: &Symbol) -> bool {
        self.taken.contains(name)
    }

    /// Produce a name of the form `<prefix><n>` never returned before and
    /// never reserved.
    pub fn fresh(&mut self, prefix: &str) -> Symbol {
        loop {
            self.next += 1;
            let candidate = Symbol::new(format!("{prefix}{}", self.next));
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_are_sequential() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.fresh("V").as_str(), "V1");
        assert_eq!(ids.fresh("V").as_str(), "V2");
        assert_eq!(ids.fresh("W").as_str(), "W3");
    }

    #[test]
    fn fresh_skips_reserved_names() {
        let mut ids = IdAllocator::new();
        assert!(ids.reserve(&Symbol::new("V1")));
        assert!(ids.reserve(&Symbol::new("V2")));
        assert_eq!(ids.fresh("V").as_str(), "V3");
    }

    #[test]
    fn reserve_reports_duplicates() {
        let mut ids = IdAllocator::new();
        let name = Symbol::new("gain");
        assert!(ids.reserve(&name));
        assert!(!ids.reserve(&name));
        assert!(ids.is_taken(&name));
    }
}
