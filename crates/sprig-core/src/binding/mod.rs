//! # Bindings
//!
//! A binding adapts a [`Value`] to a [`Part`] of the host tree. Every binding
//! goes through the same life cycle:
//!
//! - `connect`: first attach. Enqueues at most one effect until that effect
//!   commits, however often it is called.
//! - `bind`: new value for the same part. Equivalent values (see
//!   [`Value::same`] / [`Value::shallow_eq`]) schedule nothing, so callers can
//!   bind on every render. Binding after `unbind` re-attaches.
//! - `unbind`: logical detach. The binding keeps what it needs to be bound
//!   again.
//! - `disconnect`: final and synchronous. Releases child bindings and render
//!   blocks. Calling it twice is a no-op.
//!
//! Bindings never mutate attached host structure directly; they enqueue
//! effects on the [`Updater`] and the updater commits them in phase order.

mod attribute;
mod child;
mod component;
mod element;
mod text;

use std::any::Any;
use std::rc::Rc;

pub use attribute::AttributeBinding;
pub use child::ChildBinding;
pub use component::{Component, ComponentBinding, ComponentFn, RenderFn};
pub use element::{Element, ElementBinding, element};
pub use text::TextBinding;

use crate::error::Result;
use crate::part::Part;
use crate::tree::NodeId;
use crate::updater::Updater;
use crate::value::Value;

pub trait Binding {
    fn part(&self) -> &Part;
    fn value(&self) -> &Value;
    /// First node of the content this binding represents.
    fn start_node(&self) -> NodeId;
    /// Last node of that content.
    fn end_node(&self) -> NodeId;

    fn connect(&mut self, updater: &Updater) -> Result<()>;
    fn bind(&mut self, value: Value, updater: &Updater) -> Result<()>;
    fn unbind(&mut self, updater: &Updater);
    fn disconnect(&mut self);
}

/// A value that knows how to produce its own binding.
pub trait Directive: Any {
    fn name(&self) -> &'static str;

    /// Whether a binding created for `self` can be re-bound to `other`
    /// instead of being replaced.
    fn is_same_kind(&self, other: &dyn Directive) -> bool;

    fn resolve_binding(self: Rc<Self>, part: Part, updater: &Updater) -> Result<Box<dyn Binding>>;
}

pub fn downcast_ref<D: Directive>(directive: &dyn Directive) -> Option<&D> {
    let any: &dyn Any = directive;
    any.downcast_ref()
}

pub fn downcast_rc<D: Directive>(directive: &Rc<dyn Directive>) -> Option<Rc<D>> {
    let any: Rc<dyn Any> = directive.clone();
    any.downcast().ok()
}

/// Binding factory: directives build their own binding, plain values get the
/// default binding for the part kind.
pub fn resolve_binding(value: Value, part: Part, updater: &Updater) -> Result<Box<dyn Binding>> {
    match part {
        Part::ChildNode { .. } => Ok(Box::new(ChildBinding::new(value, part, updater)?)),
        Part::Attribute { .. } => match value {
            Value::Directive(directive) => directive.resolve_binding(part, updater),
            value => Ok(Box::new(AttributeBinding::new(value, part)?)),
        },
    }
}
