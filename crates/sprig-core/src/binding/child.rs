use std::mem;
use std::rc::Rc;

use crate::binding::{Binding, Directive, TextBinding};
use crate::error::{Error, Result};
use crate::list::List;
use crate::part::Part;
use crate::tree::NodeId;
use crate::updater::Updater;
use crate::value::Value;

/// Default binding for child-node parts. Dispatches on the value: nothing,
/// text, or whatever binding a directive resolves to. A bare `Value::List`
/// renders as an unkeyed list.
///
/// When the content changes kind, the outgoing directive binding is unbound
/// and parked rather than disconnected. Switching back to the same kind
/// re-binds the parked binding, so a component keeps its block and hooks.
pub struct ChildBinding {
    part: Part,
    anchor: NodeId,
    value: Value,
    content: Content,
    parked: Option<(Box<dyn Binding>, Rc<dyn Directive>)>,
}

enum Content {
    Empty,
    Text(TextBinding),
    Directive {
        binding: Box<dyn Binding>,
        directive: Rc<dyn Directive>,
    },
}

enum Shape {
    Empty,
    Text,
    Directive(Rc<dyn Directive>),
}

fn shape_of(value: &Value) -> Result<Shape> {
    match value {
        Value::None => Ok(Shape::Empty),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => Ok(Shape::Text),
        Value::Directive(directive) => Ok(Shape::Directive(directive.clone())),
        Value::List(items) => Ok(Shape::Directive(Rc::new(List::new(items.clone())))),
        Value::Record(_) => Err(Error::ValueShape {
            binding: "child",
            expected: "a primitive, a list or a directive",
        }),
    }
}

impl ChildBinding {
    pub fn new(value: Value, part: Part, updater: &Updater) -> Result<Self> {
        let Part::ChildNode { anchor } = part else {
            return Err(Error::PartMismatch {
                directive: "child",
                part: part.kind(),
            });
        };
        let content = Self::create(shape_of(&value)?, &value, &part, updater)?;
        Ok(Self {
            part,
            anchor,
            value,
            content,
            parked: None,
        })
    }

    fn create(shape: Shape, value: &Value, part: &Part, updater: &Updater) -> Result<Content> {
        Ok(match shape {
            Shape::Empty => Content::Empty,
            Shape::Text => Content::Text(TextBinding::new(value.clone(), part.clone())?),
            Shape::Directive(directive) => Content::Directive {
                binding: directive.clone().resolve_binding(part.clone(), updater)?,
                directive,
            },
        })
    }

    fn replace(&mut self, shape: Shape, value: &Value, updater: &Updater) -> Result<()> {
        let revived = match &shape {
            Shape::Directive(next) => self
                .parked
                .take_if(|(_, parked)| parked.is_same_kind(next.as_ref())),
            Shape::Empty | Shape::Text => None,
        };

        match mem::replace(&mut self.content, Content::Empty) {
            Content::Empty => {}
            Content::Text(mut binding) => {
                binding.unbind(updater);
                binding.disconnect();
            }
            Content::Directive {
                mut binding,
                directive,
            } => {
                binding.unbind(updater);
                if let Some((mut stale, _)) = self.parked.replace((binding, directive)) {
                    stale.disconnect();
                }
            }
        }

        self.content = match (revived, shape) {
            (Some((mut binding, _)), Shape::Directive(next)) => {
                binding.bind(Value::Directive(next.clone()), updater)?;
                Content::Directive {
                    binding,
                    directive: next,
                }
            }
            (_, shape) => {
                let mut content = Self::create(shape, value, &self.part, updater)?;
                match &mut content {
                    Content::Empty => {}
                    Content::Text(binding) => binding.connect(updater)?,
                    Content::Directive { binding, .. } => binding.connect(updater)?,
                }
                content
            }
        };
        Ok(())
    }
}

impl Binding for ChildBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn start_node(&self) -> NodeId {
        match &self.content {
            Content::Empty => self.anchor,
            Content::Text(binding) => binding.start_node(),
            Content::Directive { binding, .. } => binding.start_node(),
        }
    }

    fn end_node(&self) -> NodeId {
        match &self.content {
            Content::Empty => self.anchor,
            Content::Text(binding) => binding.end_node(),
            Content::Directive { binding, .. } => binding.end_node(),
        }
    }

    fn connect(&mut self, updater: &Updater) -> Result<()> {
        match &mut self.content {
            Content::Empty => Ok(()),
            Content::Text(binding) => binding.connect(updater),
            Content::Directive { binding, .. } => binding.connect(updater),
        }
    }

    fn bind(&mut self, value: Value, updater: &Updater) -> Result<()> {
        let shape = shape_of(&value)?;
        let reusable = match (&self.content, &shape) {
            (Content::Empty, Shape::Empty) | (Content::Text(_), Shape::Text) => true,
            (Content::Directive { directive, .. }, Shape::Directive(next)) => {
                directive.is_same_kind(next.as_ref())
            }
            _ => false,
        };

        if reusable {
            match (&mut self.content, shape) {
                (Content::Text(binding), _) => binding.bind(value.clone(), updater)?,
                (Content::Directive { binding, directive }, Shape::Directive(next)) => {
                    binding.bind(Value::Directive(next.clone()), updater)?;
                    *directive = next;
                }
                _ => {}
            }
        } else {
            self.replace(shape, &value, updater)?;
        }
        self.value = value;
        Ok(())
    }

    fn unbind(&mut self, updater: &Updater) {
        match &mut self.content {
            Content::Empty => {}
            Content::Text(binding) => binding.unbind(updater),
            Content::Directive { binding, .. } => binding.unbind(updater),
        }
    }

    fn disconnect(&mut self) {
        match &mut self.content {
            Content::Empty => {}
            Content::Text(binding) => binding.disconnect(),
            Content::Directive { binding, .. } => binding.disconnect(),
        }
        if let Some((mut parked, _)) = self.parked.take() {
            parked.disconnect();
        }
    }
}
