use std::cell::RefCell;
use std::rc::Rc;

use crate::binding::Binding;
use crate::effect::{CommitPhase, Effect};
use crate::error::{Error, Result};
use crate::part::Part;
use crate::tree::{HostTree, NodeId};
use crate::updater::Updater;
use crate::value::Value;

/// `None` and `false` remove the attribute, `true` sets it empty, other
/// primitives set their text form.
pub struct AttributeBinding {
    part: Part,
    node: NodeId,
    value: Value,
    attached: bool,
    state: Rc<RefCell<AttributeState>>,
}

struct AttributeState {
    node: NodeId,
    name: Rc<str>,
    pending: Option<String>,
    dirty: bool,
}

fn render(value: &Value) -> Result<Option<String>> {
    match value {
        Value::None | Value::Bool(false) => Ok(None),
        Value::Bool(true) => Ok(Some(String::new())),
        Value::Int(_) | Value::Float(_) | Value::Str(_) => Ok(value.to_text()),
        Value::List(_) | Value::Record(_) | Value::Directive(_) => Err(Error::ValueShape {
            binding: "attribute",
            expected: "a primitive value",
        }),
    }
}

impl AttributeBinding {
    pub fn new(value: Value, part: Part) -> Result<Self> {
        let Part::Attribute { node, name } = &part else {
            return Err(Error::PartMismatch {
                directive: "attribute",
                part: part.kind(),
            });
        };
        render(&value)?;
        let state = AttributeState {
            node: *node,
            name: name.clone(),
            pending: None,
            dirty: false,
        };
        Ok(Self {
            node: *node,
            part,
            value,
            attached: false,
            state: Rc::new(RefCell::new(state)),
        })
    }

    fn schedule(&self, pending: Option<String>, updater: &Updater) {
        let mut state = self.state.borrow_mut();
        state.pending = pending;
        if !state.dirty {
            state.dirty = true;
            updater.enqueue_mutation_effect(Box::new(AttributeCommit(self.state.clone())));
        }
    }
}

impl Binding for AttributeBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn start_node(&self) -> NodeId {
        self.node
    }

    fn end_node(&self) -> NodeId {
        self.node
    }

    fn connect(&mut self, updater: &Updater) -> Result<()> {
        if self.attached {
            return Ok(());
        }
        self.attached = true;
        self.schedule(render(&self.value)?, updater);
        Ok(())
    }

    fn bind(&mut self, value: Value, updater: &Updater) -> Result<()> {
        if self.attached && value.same(&self.value) {
            return Ok(());
        }
        let pending = render(&value)?;
        self.value = value;
        self.attached = true;
        self.schedule(pending, updater);
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
    }
}

struct AttributeCommit(Rc<RefCell<AttributeState>>);

impl Effect for AttributeCommit {
    fn commit(self: Box<Self>, _phase: CommitPhase, host: &mut HostTree) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.dirty = false;
        match state.pending.take() {
            Some(value) => host.set_attribute(state.node, &state.name, value)?,
            None => host.remove_attribute(state.node, &state.name)?,
        }
        Ok(())
    }
}
