use std::cell::RefCell;
use std::rc::Rc;

use crate::binding::Binding;
use crate::effect::{CommitPhase, Effect};
use crate::error::{Error, Result};
use crate::part::Part;
use crate::tree::{HostTree, NodeId};
use crate::updater::Updater;
use crate::value::Value;

/// Primitive content of a child-node part, rendered as one text node.
pub struct TextBinding {
    part: Part,
    anchor: NodeId,
    value: Value,
    attached: bool,
    state: Rc<RefCell<TextState>>,
}

struct TextState {
    anchor: NodeId,
    node: Option<NodeId>,
    /// `None` means detached.
    content: Option<String>,
    dirty: bool,
    /// Disconnected: a pending commit only ever removes the node.
    disposed: bool,
}

impl TextBinding {
    pub fn new(value: Value, part: Part) -> Result<Self> {
        let Part::ChildNode { anchor } = part else {
            return Err(Error::PartMismatch {
                directive: "text",
                part: part.kind(),
            });
        };
        text_of(&value)?;
        Ok(Self {
            part,
            anchor,
            value,
            attached: false,
            state: Rc::new(RefCell::new(TextState {
                anchor,
                node: None,
                content: None,
                dirty: false,
                disposed: false,
            })),
        })
    }

    fn schedule(&self, content: Option<String>, updater: &Updater) {
        let mut state = self.state.borrow_mut();
        state.content = content;
        if !state.dirty {
            state.dirty = true;
            updater.enqueue_mutation_effect(Box::new(TextCommit(self.state.clone())));
        }
    }
}

fn text_of(value: &Value) -> Result<String> {
    value.to_text().ok_or(Error::ValueShape {
        binding: "text",
        expected: "a primitive value",
    })
}

impl Binding for TextBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn start_node(&self) -> NodeId {
        self.state.borrow().node.unwrap_or(self.anchor)
    }

    fn end_node(&self) -> NodeId {
        self.start_node()
    }

    fn connect(&mut self, updater: &Updater) -> Result<()> {
        if self.attached {
            return Ok(());
        }
        self.attached = true;
        self.schedule(Some(text_of(&self.value)?), updater);
        Ok(())
    }

    fn bind(&mut self, value: Value, updater: &Updater) -> Result<()> {
        if self.attached && value.same(&self.value) {
            return Ok(());
        }
        let text = text_of(&value)?;
        self.value = value;
        self.attached = true;
        self.schedule(Some(text), updater);
        Ok(())
    }

    fn unbind(&mut self, updater: &Updater) {
        if self.attached {
            self.attached = false;
            self.schedule(None, updater);
        }
    }

    fn disconnect(&mut self) {
        self.attached = false;
        self.state.borrow_mut().disposed = true;
    }
}

struct TextCommit(Rc<RefCell<TextState>>);

impl Effect for TextCommit {
    fn commit(self: Box<Self>, _phase: CommitPhase, host: &mut HostTree) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.dirty = false;
        let content = if state.disposed { None } else { state.content.clone() };
        match (content, state.node) {
            (Some(text), Some(node)) => host.set_text(node, text)?,
            (Some(text), None) => {
                let node = host.create_text(text);
                host.insert_before(node, state.anchor)?;
                state.node = Some(node);
            }
            // The node is never reused, so it is freed rather than unlinked.
            // An enclosing range may have been freed first.
            (None, Some(node)) => {
                if host.contains(node) {
                    host.destroy(node)?;
                }
                state.node = None;
            }
            (None, None) => {}
        }
        Ok(())
    }
}
