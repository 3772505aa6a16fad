use std::cell::RefCell;
use std::rc::Rc;

use crate::binding::{Binding, Directive, downcast_rc, downcast_ref, resolve_binding};
use crate::effect::{CommitPhase, Effect};
use crate::error::{Error, Result};
use crate::part::Part;
use crate::tree::{HostTree, NodeId};
use crate::updater::Updater;
use crate::value::Value;

/// A host element with bound attributes and child slots.
///
/// Two elements are the same kind when tag, attribute names and child
/// count match, so re-rendering the same shape only re-binds values.
#[derive(Clone, Debug)]
pub struct Element {
    tag: Rc<str>,
    attributes: Vec<(Rc<str>, Value)>,
    children: Vec<Value>,
}

pub fn element(tag: impl Into<Rc<str>>) -> Element {
    Element::new(tag)
}

impl Element {
    pub fn new(tag: impl Into<Rc<str>>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<Rc<str>>, value: impl Into<Value>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, value: impl Into<Value>) -> Self {
        self.children.push(value.into());
        self
    }

    pub fn children<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.children.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl From<Element> for Value {
    fn from(element: Element) -> Self {
        Value::directive(element)
    }
}

impl Directive for Element {
    fn name(&self) -> &'static str {
        "element"
    }

    fn is_same_kind(&self, other: &dyn Directive) -> bool {
        downcast_ref::<Element>(other).is_some_and(|other| {
            self.tag == other.tag
                && self.children.len() == other.children.len()
                && self.attributes.len() == other.attributes.len()
                && self
                    .attributes
                    .iter()
                    .zip(&other.attributes)
                    .all(|((a, _), (b, _))| a == b)
        })
    }

    fn resolve_binding(self: Rc<Self>, part: Part, updater: &Updater) -> Result<Box<dyn Binding>> {
        Ok(Box::new(ElementBinding::new(self, part, updater)?))
    }
}

pub struct ElementBinding {
    part: Part,
    value: Value,
    directive: Rc<Element>,
    element: NodeId,
    attributes: Vec<Box<dyn Binding>>,
    children: Vec<Box<dyn Binding>>,
    attached: bool,
    mount: Rc<RefCell<MountState>>,
}

struct MountState {
    element: NodeId,
    anchor: NodeId,
    attached: bool,
    mounted: bool,
    dirty: bool,
}

impl ElementBinding {
    pub fn new(directive: Rc<Element>, part: Part, updater: &Updater) -> Result<Self> {
        let Part::ChildNode { anchor } = part else {
            return Err(Error::PartMismatch {
                directive: "element",
                part: part.kind(),
            });
        };
        let element = updater.with_host(|host| host.create_element(directive.tag.clone()));

        let mut attributes = Vec::with_capacity(directive.attributes.len());
        for (name, value) in &directive.attributes {
            let part = Part::Attribute {
                node: element,
                name: name.clone(),
            };
            attributes.push(resolve_binding(value.clone(), part, updater)?);
        }

        let mut children = Vec::with_capacity(directive.children.len());
        for value in &directive.children {
            let slot = updater.with_host(|host| {
                let slot = host.create_comment("");
                host.append_child(element, slot).map(|_| slot)
            })?;
            let part = Part::ChildNode { anchor: slot };
            children.push(resolve_binding(value.clone(), part, updater)?);
        }

        Ok(Self {
            part,
            value: Value::Directive(directive.clone()),
            directive,
            element,
            attributes,
            children,
            attached: false,
            mount: Rc::new(RefCell::new(MountState {
                element,
                anchor,
                attached: false,
                mounted: false,
                dirty: false,
            })),
        })
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    fn schedule(&self, attached: bool, updater: &Updater) {
        let mut mount = self.mount.borrow_mut();
        mount.attached = attached;
        if !mount.dirty {
            mount.dirty = true;
            updater.enqueue_mutation_effect(Box::new(MountCommit(self.mount.clone())));
        }
    }

    fn bind_parts(&mut self, updater: &Updater) -> Result<()> {
        let directive = self.directive.clone();
        for (binding, (_, value)) in self.attributes.iter_mut().zip(&directive.attributes) {
            binding.bind(value.clone(), updater)?;
        }
        for (binding, value) in self.children.iter_mut().zip(&directive.children) {
            binding.bind(value.clone(), updater)?;
        }
        Ok(())
    }
}

impl Binding for ElementBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn start_node(&self) -> NodeId {
        self.element
    }

    fn end_node(&self) -> NodeId {
        self.element
    }

    fn connect(&mut self, updater: &Updater) -> Result<()> {
        if self.attached {
            return Ok(());
        }
        self.attached = true;
        self.schedule(true, updater);
        for binding in self.attributes.iter_mut().chain(self.children.iter_mut()) {
            binding.connect(updater)?;
        }
        Ok(())
    }

    fn bind(&mut self, value: Value, updater: &Updater) -> Result<()> {
        let directive = value
            .as_directive()
            .and_then(downcast_rc::<Element>)
            .filter(|next| self.directive.is_same_kind(next.as_ref()))
            .ok_or(Error::ValueShape {
                binding: "element",
                expected: "an element of the same shape",
            })?;
        if self.attached && Rc::ptr_eq(&directive, &self.directive) {
            return Ok(());
        }
        self.directive = directive;
        self.value = value;
        if !self.attached {
            self.attached = true;
            self.schedule(true, updater);
        }
        self.bind_parts(updater)
    }

    fn unbind(&mut self, updater: &Updater) {
        if !self.attached {
            return;
        }
        self.attached = false;
        for binding in self.attributes.iter_mut().chain(self.children.iter_mut()) {
            binding.unbind(updater);
        }
        self.schedule(false, updater);
    }

    fn disconnect(&mut self) {
        self.attached = false;
        for binding in self.attributes.iter_mut().chain(self.children.iter_mut()) {
            binding.disconnect();
        }
    }
}

struct MountCommit(Rc<RefCell<MountState>>);

impl Effect for MountCommit {
    fn commit(self: Box<Self>, _phase: CommitPhase, host: &mut HostTree) -> Result<()> {
        let mut mount = self.0.borrow_mut();
        mount.dirty = false;
        match (mount.attached, mount.mounted) {
            (true, false) => {
                host.insert_before(mount.element, mount.anchor)?;
                mount.mounted = true;
            }
            (false, true) => {
                host.remove(mount.element)?;
                mount.mounted = false;
            }
            _ => {}
        }
        Ok(())
    }
}
