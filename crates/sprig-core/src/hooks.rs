//! # Hooks
//!
//! Per-block state that survives re-renders. Slots are positional: the n-th
//! `remember` call of a render gets the n-th slot, so calls must happen in
//! the same order every render. Use `remember_with_key` for state behind
//! conditionals.
//!
//! Effects registered with [`RenderContext::use_effect`] and
//! [`RenderContext::use_layout_effect`] run in their commit phase, after the
//! host tree has been mutated, and only when their dependencies changed.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::block::BlockId;
use crate::effect::{CommitPhase, Effect};
use crate::error::Result;
use crate::tree::HostTree;
use crate::updater::{Runtime, Updater};
use crate::value::Value;

/// Cleanup returned by an effect callback.
#[derive(Clone)]
pub struct Cleanup(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    pub fn noop() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Runs at most once.
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }
}

#[derive(Default)]
struct EffectSlot {
    deps: RefCell<Option<Value>>,
    cleanup: RefCell<Option<Cleanup>>,
    disposed: Cell<bool>,
}

impl EffectSlot {
    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
    }
}

#[derive(Default)]
pub struct HookSlots {
    slots: Vec<Box<dyn Any>>,
    cursor: usize,
    keyed: HashMap<String, Box<dyn Any>>,
    effects: Vec<Rc<EffectSlot>>,
}

impl HookSlots {
    pub fn len(&self) -> usize {
        self.slots.len() + self.keyed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin(&mut self) {
        self.cursor = 0;
    }

    /// Returns the slot at the cursor and whether it was just created.
    fn slot<T: 'static>(&mut self, init: impl FnOnce() -> T) -> (Rc<T>, bool) {
        let cursor = self.cursor;
        self.cursor += 1;

        if cursor >= self.slots.len() {
            let rc = Rc::new(init());
            self.slots.push(Box::new(rc.clone()));
            return (rc, true);
        }

        if let Some(rc) = self.slots[cursor].downcast_ref::<Rc<T>>() {
            (rc.clone(), false)
        } else {
            log::warn!(
                "remember: slot {cursor} type changed; replacing. \
                 If this is due to a conditional, prefer remember_with_key."
            );
            let rc = Rc::new(init());
            self.slots[cursor] = Box::new(rc.clone());
            (rc, true)
        }
    }

    fn keyed_slot<T: 'static>(&mut self, key: String, init: impl FnOnce() -> T) -> Rc<T> {
        if let Some(existing) = self.keyed.get(&key) {
            if let Some(rc) = existing.downcast_ref::<Rc<T>>() {
                return rc.clone();
            }
            log::warn!("remember_with_key: key '{key}' reused with a different type; replacing.");
        }
        let rc = Rc::new(init());
        self.keyed.insert(key, Box::new(rc.clone()));
        rc
    }

    /// Runs every pending cleanup and stops queued effects from running.
    pub(crate) fn dispose(self) {
        for effect in self.effects {
            effect.disposed.set(true);
            effect.run_cleanup();
        }
    }
}

/// What a block's `update` gets to work with.
pub struct RenderContext<'a> {
    block: BlockId,
    hooks: &'a mut HookSlots,
    updater: &'a Updater,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(block: BlockId, hooks: &'a mut HookSlots, updater: &'a Updater) -> Self {
        hooks.begin();
        Self {
            block,
            hooks,
            updater,
        }
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn updater(&self) -> &'a Updater {
        self.updater
    }

    pub fn remember<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<T> {
        self.hooks.slot(init).0
    }

    pub fn remember_with_key<T: 'static>(
        &mut self,
        key: impl Into<String>,
        init: impl FnOnce() -> T,
    ) -> Rc<T> {
        self.hooks.keyed_slot(key.into(), init)
    }

    /// Current value plus a setter that re-renders this block.
    pub fn use_state<T: Clone + 'static>(&mut self, init: impl FnOnce() -> T) -> (T, StateSetter<T>) {
        let cell = self.remember(|| RefCell::new(init()));
        let value = cell.borrow().clone();
        let setter = StateSetter {
            cell,
            block: self.block,
            runtime: Rc::downgrade(self.updater.runtime()),
        };
        (value, setter)
    }

    /// Runs `f` in the passive phase whenever `deps` is not shallow-equal to
    /// the previous render's. `Value::None` deps run once.
    pub fn use_effect(
        &mut self,
        deps: impl Into<Value>,
        f: impl FnOnce(&HostTree) -> Cleanup + 'static,
    ) {
        self.register_effect(CommitPhase::Passive, deps.into(), Box::new(f));
    }

    /// Like `use_effect`, but runs in the layout phase, right after the
    /// mutations of the same batch.
    pub fn use_layout_effect(
        &mut self,
        deps: impl Into<Value>,
        f: impl FnOnce(&HostTree) -> Cleanup + 'static,
    ) {
        self.register_effect(CommitPhase::Layout, deps.into(), Box::new(f));
    }

    /// Schedules another render of this block.
    pub fn request_update(&self) {
        self.updater.runtime().request_update(self.block);
    }

    fn register_effect(&mut self, phase: CommitPhase, deps: Value, callback: EffectCallback) {
        let (slot, created) = self.hooks.slot(EffectSlot::default);
        if created {
            self.hooks.effects.push(slot.clone());
        }
        {
            let mut previous = slot.deps.borrow_mut();
            if previous.as_ref().is_some_and(|previous| previous.shallow_eq(&deps)) {
                return;
            }
            *previous = Some(deps);
        }
        let effect = Box::new(HookEffect { slot, callback });
        match phase {
            CommitPhase::Layout => self.updater.enqueue_layout_effect(effect),
            CommitPhase::Mutation | CommitPhase::Passive => {
                self.updater.enqueue_passive_effect(effect)
            }
        }
    }
}

type EffectCallback = Box<dyn FnOnce(&HostTree) -> Cleanup>;

struct HookEffect {
    slot: Rc<EffectSlot>,
    callback: EffectCallback,
}

impl Effect for HookEffect {
    fn commit(self: Box<Self>, _phase: CommitPhase, host: &mut HostTree) -> Result<()> {
        let HookEffect { slot, callback } = *self;
        if slot.disposed.get() {
            return Ok(());
        }
        slot.run_cleanup();
        let cleanup = callback(host);
        *slot.cleanup.borrow_mut() = Some(cleanup);
        Ok(())
    }
}

/// Writes a `use_state` slot and requests a re-render of the owning block.
pub struct StateSetter<T> {
    cell: Rc<RefCell<T>>,
    block: BlockId,
    runtime: Weak<Runtime>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            block: self.block,
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: 'static> StateSetter<T> {
    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
        self.notify();
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.cell.borrow_mut());
        self.notify();
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.cell.borrow().clone()
    }

    fn notify(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.request_update(self.block);
        }
    }
}
