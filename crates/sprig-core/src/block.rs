//! # Blocks
//!
//! A block is one render unit: a [`Renderable`] plus the bookkeeping the
//! pipeline needs to decide whether and when to run it. Blocks live in a
//! [`BlockTree`] arena. A block refers to its parent by id only, so
//! ownership stays with the binding that created the block.

use bitflags::bitflags;
use slotmap::{SlotMap, new_key_type};

use crate::error::Result;
use crate::hooks::{HookSlots, RenderContext};
use crate::priority::TaskPriority;
use crate::updater::Updater;

new_key_type! {
    pub struct BlockId;
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BlockFlags: u8 {
        /// Needs to run `update` again.
        const UPDATING = 1 << 0;
        /// Unbound from its part; kept around for reuse.
        const UNMOUNTING = 1 << 1;
        /// Rendered, with mutation effects that have not committed yet.
        const MUTATING = 1 << 2;
    }
}

pub trait Renderable {
    /// Re-renders the unit. May create and enqueue child blocks through the
    /// context's updater.
    fn update(&mut self, ctx: &mut RenderContext<'_>) -> Result<()>;

    /// The owning binding was unbound. The unit should unbind its output
    /// but keep enough state to be updated again.
    fn unmount(&mut self, updater: &Updater) {
        let _ = updater;
    }

    /// Final release of everything the unit owns.
    fn disconnect(&mut self) {}
}

struct BlockNode {
    parent: Option<BlockId>,
    flags: BlockFlags,
    priority: TaskPriority,
    hooks: Option<HookSlots>,
    unit: Option<Box<dyn Renderable>>,
}

#[derive(Default)]
pub struct BlockTree {
    nodes: SlotMap<BlockId, BlockNode>,
}

impl BlockTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block that still has to render for the first time.
    pub fn insert(
        &mut self,
        parent: Option<BlockId>,
        priority: TaskPriority,
        unit: Box<dyn Renderable>,
    ) -> BlockId {
        self.nodes.insert(BlockNode {
            parent,
            flags: BlockFlags::UPDATING,
            priority,
            hooks: Some(HookSlots::default()),
            unit: Some(unit),
        })
    }

    /// Drops the block from the arena and hands back whatever it still owns.
    /// Either part is `None` while the block is checked out for rendering.
    pub fn remove(
        &mut self,
        id: BlockId,
    ) -> Option<(Option<Box<dyn Renderable>>, Option<HookSlots>)> {
        self.nodes.remove(id).map(|node| (node.unit, node.hooks))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn parent(&self, id: BlockId) -> Option<BlockId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    pub fn flags(&self, id: BlockId) -> BlockFlags {
        self.nodes
            .get(id)
            .map(|node| node.flags)
            .unwrap_or_default()
    }

    pub fn insert_flags(&mut self, id: BlockId, flags: BlockFlags) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.flags.insert(flags);
        }
    }

    pub fn remove_flags(&mut self, id: BlockId, flags: BlockFlags) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.flags.remove(flags);
        }
    }

    pub fn priority(&self, id: BlockId) -> Option<TaskPriority> {
        self.nodes.get(id).map(|node| node.priority)
    }

    /// True when the block is dirty, still mounted, and no ancestor is
    /// dirty. A dirty ancestor re-renders this block anyway.
    pub fn should_update(&self, id: BlockId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if !node.flags.contains(BlockFlags::UPDATING)
            || node.flags.contains(BlockFlags::UNMOUNTING)
        {
            return false;
        }
        let mut cursor = node.parent;
        while let Some(parent) = cursor {
            let Some(node) = self.nodes.get(parent) else {
                break;
            };
            if node.flags.contains(BlockFlags::UPDATING) {
                return false;
            }
            cursor = node.parent;
        }
        true
    }

    /// Marks the block dirty. A clean block takes `priority` as is, a block
    /// that is already dirty only ever gets more urgent. Returns false when
    /// the block no longer exists.
    pub fn request(&mut self, id: BlockId, priority: TaskPriority) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.flags.contains(BlockFlags::UPDATING) {
            node.priority = node.priority.max(priority);
        } else {
            node.flags.insert(BlockFlags::UPDATING);
            node.priority = priority;
        }
        true
    }

    /// Takes the unit and its hooks out for rendering and clears `UPDATING`,
    /// so requests made during the render flag the block again.
    pub(crate) fn checkout(&mut self, id: BlockId) -> Option<(Box<dyn Renderable>, HookSlots)> {
        let node = self.nodes.get_mut(id)?;
        let unit = node.unit.take()?;
        let Some(hooks) = node.hooks.take() else {
            node.unit = Some(unit);
            return None;
        };
        node.flags.remove(BlockFlags::UPDATING);
        Some((unit, hooks))
    }

    /// Puts a rendered unit back. Hands it back to the caller if the block
    /// was removed in the meantime.
    pub(crate) fn checkin(
        &mut self,
        id: BlockId,
        unit: Box<dyn Renderable>,
        hooks: HookSlots,
    ) -> Option<(Box<dyn Renderable>, HookSlots)> {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.unit = Some(unit);
                node.hooks = Some(hooks);
                None
            }
            None => Some((unit, hooks)),
        }
    }

    pub(crate) fn take_unit(&mut self, id: BlockId) -> Option<Box<dyn Renderable>> {
        self.nodes.get_mut(id)?.unit.take()
    }

    pub(crate) fn restore_unit(
        &mut self,
        id: BlockId,
        unit: Box<dyn Renderable>,
    ) -> Option<Box<dyn Renderable>> {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.unit = Some(unit);
                None
            }
            None => Some(unit),
        }
    }
}
