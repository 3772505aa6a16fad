use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::binding::{Binding, ChildBinding, Directive, downcast_rc, downcast_ref};
use crate::block::{BlockFlags, BlockId, Renderable};
use crate::error::{Error, Result};
use crate::hooks::RenderContext;
use crate::part::Part;
use crate::tree::NodeId;
use crate::updater::{Runtime, Updater};
use crate::value::Value;

pub type RenderFn = Rc<dyn Fn(&Value, &mut RenderContext<'_>) -> Result<Value>>;

/// A render function. Its output is bound to the component's part like any
/// other child value.
#[derive(Clone)]
pub struct ComponentFn {
    name: &'static str,
    render: RenderFn,
}

impl ComponentFn {
    pub fn new(
        name: &'static str,
        render: impl Fn(&Value, &mut RenderContext<'_>) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            name,
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// A directive rendering this function with `props`.
    pub fn with(&self, props: impl Into<Value>) -> Value {
        Value::directive(Component {
            function: self.clone(),
            props: props.into(),
        })
    }
}

impl fmt::Debug for ComponentFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFn").field("name", &self.name).finish()
    }
}

#[derive(Clone, Debug)]
pub struct Component {
    function: ComponentFn,
    props: Value,
}

impl Component {
    pub fn props(&self) -> &Value {
        &self.props
    }
}

impl Directive for Component {
    fn name(&self) -> &'static str {
        self.function.name
    }

    fn is_same_kind(&self, other: &dyn Directive) -> bool {
        downcast_ref::<Component>(other)
            .is_some_and(|other| Rc::ptr_eq(&self.function.render, &other.function.render))
    }

    fn resolve_binding(self: Rc<Self>, part: Part, updater: &Updater) -> Result<Box<dyn Binding>> {
        Ok(Box::new(ComponentBinding::new(self, part, updater)?))
    }
}

/// Owns one block. The block is created on first connect, kept while the
/// binding is merely unbound, and removed on disconnect.
pub struct ComponentBinding {
    part: Part,
    anchor: NodeId,
    value: Value,
    component: Rc<Component>,
    props: Rc<RefCell<Value>>,
    block: Option<BlockId>,
    attached: bool,
    runtime: Weak<Runtime>,
}

impl ComponentBinding {
    pub fn new(component: Rc<Component>, part: Part, updater: &Updater) -> Result<Self> {
        let Part::ChildNode { anchor } = part else {
            return Err(Error::PartMismatch {
                directive: component.function.name,
                part: part.kind(),
            });
        };
        Ok(Self {
            part,
            anchor,
            value: Value::Directive(component.clone()),
            props: Rc::new(RefCell::new(component.props.clone())),
            component,
            block: None,
            attached: false,
            runtime: Rc::downgrade(updater.runtime()),
        })
    }

    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    fn mount(&mut self, updater: &Updater) {
        if let Some(id) = self.block {
            updater.blocks_mut().remove_flags(id, BlockFlags::UNMOUNTING);
            updater.request_block_update(id, updater.current_priority());
            return;
        }
        let unit = ComponentBlock {
            render: self.component.function.render.clone(),
            props: self.props.clone(),
            part: self.part.clone(),
            output: None,
        };
        let parent = updater.current_block();
        let priority = updater.current_priority();
        let id = updater.blocks_mut().insert(parent, priority, Box::new(unit));
        log::debug!(
            "mounted component `{}` as {id:?} at {priority}",
            self.component.function.name
        );
        updater.enqueue_block(id);
        self.block = Some(id);
    }
}

impl Binding for ComponentBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn start_node(&self) -> NodeId {
        self.anchor
    }

    fn end_node(&self) -> NodeId {
        self.anchor
    }

    fn connect(&mut self, updater: &Updater) -> Result<()> {
        if !self.attached {
            self.attached = true;
            self.mount(updater);
        }
        Ok(())
    }

    fn bind(&mut self, value: Value, updater: &Updater) -> Result<()> {
        let component = value
            .as_directive()
            .and_then(downcast_rc::<Component>)
            .filter(|next| self.component.is_same_kind(next.as_ref()))
            .ok_or(Error::ValueShape {
                binding: "component",
                expected: "the same component",
            })?;
        let changed = !component.props.shallow_eq(&self.props.borrow());
        if changed {
            *self.props.borrow_mut() = component.props.clone();
        }
        self.component = component;
        self.value = value;

        if !self.attached {
            self.attached = true;
            self.mount(updater);
            return Ok(());
        }
        let Some(id) = self.block else {
            return Ok(());
        };
        if changed {
            updater.request_block_update(id, updater.current_priority());
        } else if updater.blocks().flags(id).contains(BlockFlags::UPDATING) {
            // Skipped earlier because this render was pending; it will not
            // be picked up again otherwise.
            updater.enqueue_block(id);
        }
        Ok(())
    }

    fn unbind(&mut self, updater: &Updater) {
        if !self.attached {
            return;
        }
        self.attached = false;
        let Some(id) = self.block else {
            return;
        };
        updater.blocks_mut().insert_flags(id, BlockFlags::UNMOUNTING);
        let unit = updater.blocks_mut().take_unit(id);
        if let Some(mut unit) = unit {
            unit.unmount(updater);
            let orphan = updater.blocks_mut().restore_unit(id, unit);
            if let Some(mut orphan) = orphan {
                orphan.disconnect();
            }
        }
    }

    fn disconnect(&mut self) {
        self.attached = false;
        let Some(id) = self.block.take() else {
            return;
        };
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        let removed = runtime.blocks.borrow_mut().remove(id);
        if let Some((unit, hooks)) = removed {
            log::debug!("unmounted component `{}` ({id:?})", self.component.function.name);
            if let Some(mut unit) = unit {
                unit.disconnect();
            }
            if let Some(hooks) = hooks {
                hooks.dispose();
            }
        }
    }
}

struct ComponentBlock {
    render: RenderFn,
    props: Rc<RefCell<Value>>,
    part: Part,
    output: Option<ChildBinding>,
}

impl Renderable for ComponentBlock {
    fn update(&mut self, ctx: &mut RenderContext<'_>) -> Result<()> {
        let props = self.props.borrow().clone();
        let value = (self.render)(&props, ctx)?;
        let updater = ctx.updater();
        match &mut self.output {
            Some(output) => output.bind(value, updater),
            None => {
                let mut output = ChildBinding::new(value, self.part.clone(), updater)?;
                output.connect(updater)?;
                self.output = Some(output);
                Ok(())
            }
        }
    }

    fn unmount(&mut self, updater: &Updater) {
        if let Some(output) = &mut self.output {
            output.unbind(updater);
        }
    }

    fn disconnect(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.disconnect();
        }
    }
}
