// id.rs — Stable identities for stream nodes and variable bindings
//
// Both IDs are arena indices into a `StreamGraph`. Constant environments are
// keyed by `VarId`, never by source name, so two variables that happen to
// share a name (e.g. after unrolling or subtree cloning) never alias.

use std::fmt;

use serde::Serialize;

/// Identity of a stream node (filter, pipeline, splitjoin, feedback loop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// Identity of a variable binding: a formal parameter or a local declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VarId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
