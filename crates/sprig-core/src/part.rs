use std::fmt;
use std::rc::Rc;

use crate::tree::NodeId;

/// Where in the host tree a binding applies. Only the binding for a given
/// kind interprets it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Part {
    /// Content placed immediately before `anchor` (a comment node).
    ChildNode { anchor: NodeId },
    Attribute { node: NodeId, name: Rc<str> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PartKind {
    ChildNode,
    Attribute,
}

impl Part {
    pub fn kind(&self) -> PartKind {
        match self {
            Part::ChildNode { .. } => PartKind::ChildNode,
            Part::Attribute { .. } => PartKind::Attribute,
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            Part::ChildNode { anchor } => *anchor,
            Part::Attribute { node, .. } => *node,
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartKind::ChildNode => f.write_str("child-node"),
            PartKind::Attribute => f.write_str("attribute"),
        }
    }
}
