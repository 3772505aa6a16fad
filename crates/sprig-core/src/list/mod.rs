//! # Lists
//!
//! [`List`] renders a sequence of items into one child-node part. With a key
//! selector, items are matched across renders by key: a reordered item is
//! moved along with everything it rendered instead of being rebuilt. Without
//! one, items are matched by position.
//!
//! Each item occupies a range delimited by two comment markers. The item's
//! own binding renders in front of the end marker, so moving or removing the
//! item is a single range operation on the host tree.

mod reconcile;

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

pub use reconcile::{Interrupted, ListOps, reconcile, reconcile_positional};

use crate::binding::{Binding, Directive, downcast_rc, downcast_ref, resolve_binding};
use crate::effect::{CommitPhase, Effect};
use crate::error::{Error, Result};
use crate::part::Part;
use crate::tree::{HostTree, NodeId};
use crate::updater::Updater;
use crate::value::{Key, Value};

pub type KeyFn = Rc<dyn Fn(&Value, usize) -> Key>;
pub type ValueFn = Rc<dyn Fn(&Value, usize) -> Value>;

#[derive(Clone)]
pub struct List {
    items: Rc<[Value]>,
    key_of: Option<KeyFn>,
    value_of: Option<ValueFn>,
}

/// Unkeyed list over `items`.
pub fn list(items: impl IntoIterator<Item = Value>) -> List {
    List::new(items.into_iter().collect())
}

impl List {
    pub fn new(items: Rc<[Value]>) -> Self {
        Self {
            items,
            key_of: None,
            value_of: None,
        }
    }

    pub fn keyed(mut self, key_of: impl Fn(&Value, usize) -> Key + 'static) -> Self {
        self.key_of = Some(Rc::new(key_of));
        self
    }

    /// Maps each item to the value that gets rendered for it.
    pub fn map(mut self, value_of: impl Fn(&Value, usize) -> Value + 'static) -> Self {
        self.value_of = Some(Rc::new(value_of));
        self
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn is_keyed(&self) -> bool {
        self.key_of.is_some()
    }

    fn keys(&self) -> Result<Vec<Key>> {
        let Some(key_of) = &self.key_of else {
            return Ok((0..self.items.len()).map(Key::Index).collect());
        };
        let keys: Vec<Key> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| key_of(item, i))
            .collect();
        let mut seen = HashSet::with_capacity(keys.len());
        for key in &keys {
            if !seen.insert(key) {
                return Err(Error::DuplicateKey(key.clone()));
            }
        }
        Ok(keys)
    }

    fn values(&self) -> Vec<Value> {
        match &self.value_of {
            Some(value_of) => self
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| value_of(item, i))
                .collect(),
            None => self.items.to_vec(),
        }
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("items", &self.items)
            .field("keyed", &self.is_keyed())
            .finish()
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::directive(list)
    }
}

impl Directive for List {
    fn name(&self) -> &'static str {
        "list"
    }

    fn is_same_kind(&self, other: &dyn Directive) -> bool {
        downcast_ref::<List>(other).is_some()
    }

    fn resolve_binding(self: Rc<Self>, part: Part, updater: &Updater) -> Result<Box<dyn Binding>> {
        let _ = updater;
        Ok(Box::new(ListBinding::new(self, part)?))
    }
}

struct ListItem {
    start: NodeId,
    end: NodeId,
    binding: Box<dyn Binding>,
}

pub struct ListBinding {
    part: Part,
    anchor: NodeId,
    value: Value,
    directive: Rc<List>,
    keys: Vec<Key>,
    items: Vec<ListItem>,
    attached: bool,
    /// Item markers were taken out of the host tree by `unbind`.
    detached: bool,
    /// Keys were produced by a selector on the last render.
    keyed: bool,
    /// The last render failed, so `items` no longer reflect `directive`.
    stale: bool,
}

impl ListBinding {
    pub fn new(directive: Rc<List>, part: Part) -> Result<Self> {
        let Part::ChildNode { anchor } = part else {
            return Err(Error::PartMismatch {
                directive: "list",
                part: part.kind(),
            });
        };
        Ok(Self {
            part,
            anchor,
            value: Value::Directive(directive.clone()),
            directive,
            keys: Vec::new(),
            items: Vec::new(),
            attached: false,
            detached: false,
            keyed: false,
            stale: false,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn reconcile(&mut self, directive: &List, updater: &Updater) -> Result<()> {
        let keys = directive.keys()?;
        let values = directive.values();
        if self.detached {
            self.detached = false;
            for item in &self.items {
                updater.enqueue_mutation_effect(Box::new(ItemCommit::Insert {
                    start: item.start,
                    end: item.end,
                    reference: self.anchor,
                }));
            }
        }
        let old_items = std::mem::take(&mut self.items);
        let old_keys = std::mem::take(&mut self.keys);
        let mut ops = ItemOps {
            updater,
            anchor: self.anchor,
        };
        let (before, after) = (old_items.len(), keys.len());
        let walked = if directive.is_keyed() && self.keyed {
            reconcile(&old_keys, old_items, &keys, values, &mut ops)
        } else if directive.is_keyed() {
            // Index keys from an unkeyed render cannot be matched against
            // selector keys; start over.
            for item in old_items {
                ops.discard(item);
            }
            reconcile(&[], Vec::new(), &keys, values, &mut ops)
        } else {
            reconcile_positional(old_items, values, &mut ops)
        };
        self.items = match walked {
            Ok(items) => items,
            Err(Interrupted { error, items }) => {
                // Drop every item; the next render builds the list afresh.
                log::debug!("list render failed, discarding {} item(s): {error}", items.len());
                for item in items {
                    ops.discard(item);
                }
                self.keyed = false;
                self.stale = true;
                return Err(error);
            }
        };
        log::trace!(
            "list reconciled: {before} -> {after} item(s), keyed: {}",
            directive.is_keyed()
        );
        self.keys = keys;
        self.keyed = directive.is_keyed();
        self.stale = false;
        Ok(())
    }
}

impl Binding for ListBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn start_node(&self) -> NodeId {
        self.items.first().map_or(self.anchor, |item| item.start)
    }

    fn end_node(&self) -> NodeId {
        self.anchor
    }

    fn connect(&mut self, updater: &Updater) -> Result<()> {
        if self.attached {
            return Ok(());
        }
        self.attached = true;
        let directive = self.directive.clone();
        self.reconcile(&directive, updater)
    }

    fn bind(&mut self, value: Value, updater: &Updater) -> Result<()> {
        let directive = value
            .as_directive()
            .and_then(downcast_rc::<List>)
            .ok_or(Error::ValueShape {
                binding: "list",
                expected: "a list",
            })?;
        if self.attached && !self.stale && Rc::ptr_eq(&directive, &self.directive) {
            return Ok(());
        }
        self.attached = true;
        self.reconcile(&directive, updater)?;
        self.directive = directive;
        self.value = value;
        Ok(())
    }

    fn unbind(&mut self, updater: &Updater) {
        if !self.attached {
            return;
        }
        self.attached = false;
        self.detached = true;
        // Item content goes first, so only the markers are left in each range.
        for item in &mut self.items {
            item.binding.unbind(updater);
            updater.enqueue_mutation_effect(Box::new(ItemCommit::Remove {
                start: item.start,
                end: item.end,
            }));
        }
    }

    fn disconnect(&mut self) {
        self.attached = false;
        for item in &mut self.items {
            item.binding.disconnect();
        }
    }
}

struct ItemOps<'a> {
    updater: &'a Updater,
    anchor: NodeId,
}

impl ListOps<ListItem, Value> for ItemOps<'_> {
    fn update(&mut self, item: &mut ListItem, value: Value) -> Result<()> {
        item.binding.bind(value, self.updater)
    }

    fn insert(&mut self, value: Value, before: Option<&ListItem>) -> Result<ListItem> {
        let (start, end) = self
            .updater
            .with_host(|host| (host.create_comment(""), host.create_comment("")));
        let mut binding = match resolve_binding(value, Part::ChildNode { anchor: end }, self.updater) {
            Ok(binding) => binding,
            Err(error) => {
                // Nothing was queued for the markers yet; free them here.
                self.updater.with_host(|host| {
                    let _ = host.destroy(start);
                    let _ = host.destroy(end);
                });
                return Err(error);
            }
        };
        let reference = before.map_or(self.anchor, |item| item.start);
        // Markers go in first so the item's own effects find its end marker
        // attached.
        self.updater
            .enqueue_mutation_effect(Box::new(ItemCommit::Insert {
                start,
                end,
                reference,
            }));
        if let Err(error) = binding.connect(self.updater) {
            self.discard(ListItem {
                start,
                end,
                binding,
            });
            return Err(error);
        }
        Ok(ListItem {
            start,
            end,
            binding,
        })
    }

    fn relocate(&mut self, item: &ListItem, before: Option<&ListItem>) -> Result<()> {
        let reference = before.map_or(self.anchor, |item| item.start);
        self.updater.enqueue_mutation_effect(Box::new(ItemCommit::Move {
            start: item.start,
            end: item.end,
            reference,
        }));
        Ok(())
    }

    fn remove(&mut self, item: ListItem) -> Result<()> {
        self.discard(item);
        Ok(())
    }
}

impl ItemOps<'_> {
    /// Disconnects the item for good and frees its range on commit.
    fn discard(&mut self, mut item: ListItem) {
        item.binding.disconnect();
        self.updater.enqueue_mutation_effect(Box::new(ItemCommit::Destroy {
            start: item.start,
            end: item.end,
        }));
    }
}

enum ItemCommit {
    Insert {
        start: NodeId,
        end: NodeId,
        reference: NodeId,
    },
    Move {
        start: NodeId,
        end: NodeId,
        reference: NodeId,
    },
    /// Unlinks the range; the item may be inserted again.
    Remove {
        start: NodeId,
        end: NodeId,
    },
    Destroy {
        start: NodeId,
        end: NodeId,
    },
}

impl Effect for ItemCommit {
    fn commit(self: Box<Self>, _phase: CommitPhase, host: &mut HostTree) -> Result<()> {
        match *self {
            ItemCommit::Insert {
                start,
                end,
                reference,
            } => {
                host.insert_before(start, reference)?;
                host.insert_before(end, reference)?;
            }
            ItemCommit::Move {
                start,
                end,
                reference,
            } => host.move_range_before(start, end, reference)?,
            ItemCommit::Remove { start, end } => host.remove_range(start, end)?,
            ItemCommit::Destroy { start, end } => host.destroy_range(start, end)?,
        }
        Ok(())
    }
}
