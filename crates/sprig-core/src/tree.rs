//! # Host tree
//!
//! An in-memory, DOM-shaped node arena. Bindings never touch it while
//! rendering except to create detached nodes; every change to attached
//! structure goes through a committed [`Effect`](crate::effect::Effect).
//!
//! Nodes keep a doubly linked sibling list so insertion, removal and moving a
//! run of siblings are all O(length of the run). Removed nodes stay in the
//! arena (like detached DOM nodes) and can be inserted again.

use std::fmt::Write as _;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use thiserror::Error;

new_key_type! {
    pub struct NodeId;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Element {
        tag: Rc<str>,
        attributes: SmallVec<[(Rc<str>, String); 4]>,
    },
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("node {0:?} does not exist")]
    Missing(NodeId),
    #[error("node {0:?} is not attached to a parent")]
    Detached(NodeId),
    #[error("node {0:?} cannot hold children")]
    NotAContainer(NodeId),
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("node {0:?} holds no character data")]
    NotCharacterData(NodeId),
    #[error("nodes from {start:?} do not reach {end:?} as siblings")]
    BrokenRange { start: NodeId, end: NodeId },
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct HostTree {
    nodes: SlotMap<NodeId, Node>,
}

impl HostTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_root(&mut self) -> NodeId {
        self.nodes.insert(Node::new(NodeKind::Root))
    }

    pub fn create_element(&mut self, tag: impl Into<Rc<str>>) -> NodeId {
        self.nodes.insert(Node::new(NodeKind::Element {
            tag: tag.into(),
            attributes: SmallVec::new(),
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.nodes.insert(Node::new(NodeKind::Text(text.into())))
    }

    pub fn create_comment(&mut self, data: impl Into<String>) -> NodeId {
        self.nodes.insert(Node::new(NodeKind::Comment(data.into())))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id).map(|n| &n.kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.next_sibling)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.prev_sibling)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.first_child)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.first_child(id);
        while let Some(child) = cursor {
            out.push(child);
            cursor = self.next_sibling(child);
        }
        out
    }

    fn node(&self, id: NodeId) -> Result<&Node, HostError> {
        self.nodes.get(id).ok_or(HostError::Missing(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, HostError> {
        self.nodes.get_mut(id).ok_or(HostError::Missing(id))
    }

    fn unlink(&mut self, id: NodeId) -> Result<(), HostError> {
        let (parent, prev, next) = {
            let node = self.node(id)?;
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        let Some(parent) = parent else {
            return Ok(());
        };
        match prev {
            Some(prev) => self.node_mut(prev)?.next_sibling = next,
            None => self.node_mut(parent)?.first_child = next,
        }
        match next {
            Some(next) => self.node_mut(next)?.prev_sibling = prev,
            None => self.node_mut(parent)?.last_child = prev,
        }
        let node = self.node_mut(id)?;
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
        Ok(())
    }

    fn ensure_container(&self, id: NodeId) -> Result<(), HostError> {
        match self.node(id)?.kind {
            NodeKind::Root | NodeKind::Element { .. } => Ok(()),
            _ => Err(HostError::NotAContainer(id)),
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.ensure_container(parent)?;
        self.node(child)?;
        self.unlink(child)?;
        let last = self.node(parent)?.last_child;
        {
            let node = self.node_mut(child)?;
            node.parent = Some(parent);
            node.prev_sibling = last;
        }
        match last {
            Some(last) => self.node_mut(last)?.next_sibling = Some(child),
            None => self.node_mut(parent)?.first_child = Some(child),
        }
        self.node_mut(parent)?.last_child = Some(child);
        Ok(())
    }

    /// Inserts `child` right before `reference`, in `reference`'s parent.
    pub fn insert_before(&mut self, child: NodeId, reference: NodeId) -> Result<(), HostError> {
        if child == reference {
            return Ok(());
        }
        self.node(child)?;
        let parent = self
            .node(reference)?
            .parent
            .ok_or(HostError::Detached(reference))?;
        self.unlink(child)?;
        let prev = self.node(reference)?.prev_sibling;
        {
            let node = self.node_mut(child)?;
            node.parent = Some(parent);
            node.prev_sibling = prev;
            node.next_sibling = Some(reference);
        }
        self.node_mut(reference)?.prev_sibling = Some(child);
        match prev {
            Some(prev) => self.node_mut(prev)?.next_sibling = Some(child),
            None => self.node_mut(parent)?.first_child = Some(child),
        }
        Ok(())
    }

    pub fn remove(&mut self, id: NodeId) -> Result<(), HostError> {
        self.node(id)?;
        self.unlink(id)
    }

    /// Siblings from `start` through `end`, inclusive.
    pub fn range(&self, start: NodeId, end: NodeId) -> Result<Vec<NodeId>, HostError> {
        let mut out = vec![start];
        let mut cursor = start;
        while cursor != end {
            cursor = self
                .node(cursor)?
                .next_sibling
                .ok_or(HostError::BrokenRange { start, end })?;
            out.push(cursor);
        }
        Ok(out)
    }

    pub fn move_range_before(
        &mut self,
        start: NodeId,
        end: NodeId,
        reference: NodeId,
    ) -> Result<(), HostError> {
        let nodes = self.range(start, end)?;
        if nodes.contains(&reference) {
            return Ok(());
        }
        for node in nodes {
            self.insert_before(node, reference)?;
        }
        Ok(())
    }

    pub fn remove_range(&mut self, start: NodeId, end: NodeId) -> Result<(), HostError> {
        for node in self.range(start, end)? {
            self.unlink(node)?;
        }
        Ok(())
    }

    /// Unlinks `id` and frees it together with its whole subtree. The freed
    /// ids are dead afterwards; use `remove` for nodes that may come back.
    pub fn destroy(&mut self, id: NodeId) -> Result<(), HostError> {
        self.unlink(id)?;
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(node) = self.nodes.remove(id) else {
                continue;
            };
            let mut child = node.first_child;
            while let Some(c) = child {
                pending.push(c);
                child = self.nodes.get(c).and_then(|n| n.next_sibling);
            }
        }
        Ok(())
    }

    pub fn destroy_range(&mut self, start: NodeId, end: NodeId) -> Result<(), HostError> {
        for node in self.range(start, end)? {
            self.destroy(node)?;
        }
        Ok(())
    }

    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), HostError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => {
                let value = value.into();
                match attributes.iter_mut().find(|(n, _)| &**n == name) {
                    Some((_, v)) => *v = value,
                    None => attributes.push((Rc::from(name), value)),
                }
                Ok(())
            }
            _ => Err(HostError::NotAnElement(id)),
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), HostError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => {
                attributes.retain(|(n, _)| &**n != name);
                Ok(())
            }
            _ => Err(HostError::NotAnElement(id)),
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| &**n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<(), HostError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Text(t) | NodeKind::Comment(t) => {
                *t = text.into();
                Ok(())
            }
            _ => Err(HostError::NotCharacterData(id)),
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Text(t)) => out.push_str(t),
            Some(NodeKind::Root | NodeKind::Element { .. }) => {
                for child in self.children(id) {
                    self.collect_text(child, out);
                }
            }
            _ => {}
        }
    }

    /// Markup for the subtree at `id`. A root renders only its children;
    /// comments render as `<!--data-->`.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            None => {}
            Some(NodeKind::Root) => {
                for child in self.children(id) {
                    self.write_html(child, out);
                }
            }
            Some(NodeKind::Element { tag, attributes }) => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attributes {
                    if value.is_empty() {
                        let _ = write!(out, " {name}");
                    } else {
                        let _ = write!(out, " {name}=\"{value}\"");
                    }
                }
                out.push('>');
                for child in self.children(id) {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
            Some(NodeKind::Text(t)) => out.push_str(t),
            Some(NodeKind::Comment(data)) => {
                let _ = write!(out, "<!--{data}-->");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters(tree: &mut HostTree, parent: NodeId, text: &str) -> Vec<NodeId> {
        text.chars()
            .map(|c| {
                let id = tree.create_text(c.to_string());
                tree.append_child(parent, id).unwrap();
                id
            })
            .collect()
    }

    #[test]
    fn insert_before_relinks_siblings() {
        let mut tree = HostTree::new();
        let root = tree.create_root();
        let ids = letters(&mut tree, root, "abc");
        let x = tree.create_text("x");
        tree.insert_before(x, ids[1]).unwrap();
        assert_eq!(tree.to_html(root), "axbc");

        // moving an attached node relinks it
        tree.insert_before(ids[2], ids[0]).unwrap();
        assert_eq!(tree.to_html(root), "caxb");
        assert_eq!(tree.first_child(root), Some(ids[2]));
    }

    #[test]
    fn insert_before_detached_reference_fails() {
        let mut tree = HostTree::new();
        let a = tree.create_text("a");
        let b = tree.create_text("b");
        assert_eq!(tree.insert_before(a, b), Err(HostError::Detached(b)));
    }

    #[test]
    fn move_and_remove_ranges() {
        let mut tree = HostTree::new();
        let root = tree.create_root();
        let ids = letters(&mut tree, root, "abcde");

        tree.move_range_before(ids[3], ids[4], ids[0]).unwrap();
        assert_eq!(tree.to_html(root), "deabc");

        tree.remove_range(ids[0], ids[1]).unwrap();
        assert_eq!(tree.to_html(root), "dec");
        assert!(tree.parent(ids[0]).is_none());

        // reinserting a removed node works
        tree.append_child(root, ids[0]).unwrap();
        assert_eq!(tree.to_html(root), "deca");
    }

    #[test]
    fn destroy_range_frees_subtrees() {
        let mut tree = HostTree::new();
        let root = tree.create_root();
        let ids = letters(&mut tree, root, "ab");
        let li = tree.create_element("li");
        tree.insert_before(li, ids[1]).unwrap();
        letters(&mut tree, li, "xyz");
        assert_eq!(tree.len(), 7);

        tree.destroy_range(ids[0], li).unwrap();
        assert_eq!(tree.to_html(root), "b");
        assert_eq!(tree.len(), 2);
        assert!(!tree.contains(li));
        assert_eq!(tree.remove(ids[0]), Err(HostError::Missing(ids[0])));

        // a detached node can be destroyed too
        let loose = tree.create_comment("");
        tree.destroy(loose).unwrap();
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn broken_range_is_reported() {
        let mut tree = HostTree::new();
        let root = tree.create_root();
        let ids = letters(&mut tree, root, "ab");
        assert_eq!(
            tree.range(ids[1], ids[0]),
            Err(HostError::BrokenRange {
                start: ids[1],
                end: ids[0]
            })
        );
    }

    #[test]
    fn html_serialisation() {
        let mut tree = HostTree::new();
        let root = tree.create_root();
        let ul = tree.create_element("ul");
        tree.append_child(root, ul).unwrap();
        tree.set_attribute(ul, "class", "items").unwrap();
        tree.set_attribute(ul, "hidden", "").unwrap();
        let li = tree.create_element("li");
        tree.append_child(ul, li).unwrap();
        let t = tree.create_text("one");
        tree.append_child(li, t).unwrap();
        let marker = tree.create_comment("");
        tree.append_child(ul, marker).unwrap();

        assert_eq!(
            tree.to_html(root),
            "<ul class=\"items\" hidden><li>one</li><!----></ul>"
        );
        assert_eq!(tree.text_content(root), "one");

        tree.remove_attribute(ul, "hidden").unwrap();
        assert_eq!(tree.attribute(ul, "class"), Some("items"));
        assert_eq!(tree.attribute(ul, "hidden"), None);
    }
}
