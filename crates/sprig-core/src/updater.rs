//! # Updater
//!
//! An [`Updater`] owns the queues of one scheduling round: blocks waiting to
//! render and effects waiting to commit, per phase. Bindings and blocks only
//! ever append to these queues; [`Updater::schedule_update`] turns them into
//! host tasks:
//!
//! - one render task per queued block, at that block's priority. Each runs
//!   on a forked updater with its own queues and commits what it produced
//!   when it is done;
//! - one user-blocking task committing mutation effects, then layout
//!   effects;
//! - one background task committing passive effects.
//!
//! All updaters of an engine share one [`Runtime`]: the host tree, the block
//! arena, the scheduler and the counter behind [`Updater::wait_for_update`].

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::channel::oneshot;

use crate::block::{BlockFlags, BlockId, BlockTree};
use crate::effect::{CommitPhase, Effect, commit_all};
use crate::error::{Error, Result};
use crate::hooks::RenderContext;
use crate::priority::TaskPriority;
use crate::scheduler::Scheduler;
use crate::tree::HostTree;

#[derive(Default)]
struct Pipeline {
    blocks: Vec<BlockId>,
    mutation_effects: Vec<Box<dyn Effect>>,
    layout_effects: Vec<Box<dyn Effect>>,
    passive_effects: Vec<Box<dyn Effect>>,
}

/// Counts scheduled tasks that have not settled yet.
#[derive(Default)]
pub(crate) struct TaskCounter {
    count: Cell<usize>,
    waiters: RefCell<Vec<oneshot::Sender<()>>>,
}

impl TaskCounter {
    fn begin(self: &Rc<Self>) -> TaskGuard {
        self.count.set(self.count.get() + 1);
        TaskGuard(self.clone())
    }

    fn wait(&self) -> WaitForUpdate {
        if self.count.get() == 0 {
            return WaitForUpdate { receiver: None };
        }
        let (sender, receiver) = oneshot::channel();
        self.waiters.borrow_mut().push(sender);
        WaitForUpdate {
            receiver: Some(receiver),
        }
    }
}

/// Settles one task when dropped, whether it succeeded, failed or was
/// dropped by the host.
struct TaskGuard(Rc<TaskCounter>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let count = self.0.count.get().saturating_sub(1);
        self.0.count.set(count);
        if count == 0 {
            let waiters = std::mem::take(&mut *self.0.waiters.borrow_mut());
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
    }
}

/// Resolves once no scheduled task is pending.
#[must_use = "futures do nothing unless polled"]
pub struct WaitForUpdate {
    receiver: Option<oneshot::Receiver<()>>,
}

impl Future for WaitForUpdate {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match &mut self.receiver {
            None => Poll::Ready(()),
            Some(receiver) => receiver.poll_unpin(cx).map(|_| ()),
        }
    }
}

/// State shared by every updater of one engine.
pub(crate) struct Runtime {
    pub(crate) scheduler: Scheduler,
    pub(crate) host: RefCell<HostTree>,
    pub(crate) blocks: RefCell<BlockTree>,
    current_block: Cell<Option<BlockId>>,
    /// Blocks requested on the root updater while a render was running.
    /// Picked up by the running render loop.
    swept: RefCell<Vec<BlockId>>,
    tasks: Rc<TaskCounter>,
    root: RefCell<Weak<Updater>>,
}

impl Runtime {
    fn root(&self) -> Option<Rc<Updater>> {
        self.root.borrow().upgrade()
    }

    /// Marks `block` dirty at the current event priority and schedules it.
    pub(crate) fn request_update(&self, block: BlockId) {
        let Some(root) = self.root() else {
            return;
        };
        let priority = self.scheduler.get_current_priority();
        if root.request_block_update(block, priority) {
            root.schedule_update();
        }
    }

    fn commit_blocking(
        &self,
        mutation: Vec<Box<dyn Effect>>,
        layout: Vec<Box<dyn Effect>>,
    ) -> Result<()> {
        let mut host = self.host.borrow_mut();
        let mutations = commit_all(mutation, CommitPhase::Mutation, &mut host)?;
        let layouts = commit_all(layout, CommitPhase::Layout, &mut host)?;
        log::trace!("committed {mutations} mutation and {layouts} layout effect(s)");
        Ok(())
    }

    async fn commit_passive(self: Rc<Self>, effects: Vec<Box<dyn Effect>>) -> Result<()> {
        let count = effects.len();
        let mut started = self.scheduler.get_current_time();
        for effect in effects {
            let elapsed = self.scheduler.get_current_time().duration_since(started);
            if self.scheduler.should_yield_to_main(elapsed) {
                log::trace!("passive commit yielding after {elapsed:?}");
                self.scheduler
                    .yield_to_main(Some(TaskPriority::Background))
                    .await;
                started = self.scheduler.get_current_time();
            }
            let mut host = self.host.borrow_mut();
            effect.commit(CommitPhase::Passive, &mut host)?;
        }
        log::trace!("committed {count} passive effect(s)");
        Ok(())
    }
}

/// Marks a block as rendering for as long as it lives.
struct CurrentBlock<'a> {
    runtime: &'a Runtime,
    previous: Option<BlockId>,
}

impl<'a> CurrentBlock<'a> {
    fn enter(runtime: &'a Runtime, block: BlockId) -> Self {
        let previous = runtime.current_block.replace(Some(block));
        Self { runtime, previous }
    }
}

impl Drop for CurrentBlock<'_> {
    fn drop(&mut self) {
        self.runtime.current_block.set(self.previous);
    }
}

/// Clears `MUTATING` once the block's mutations are in the host tree.
struct BlockCommitted {
    runtime: Weak<Runtime>,
    block: BlockId,
}

impl Effect for BlockCommitted {
    fn commit(self: Box<Self>, _phase: CommitPhase, _host: &mut HostTree) -> Result<()> {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime
                .blocks
                .borrow_mut()
                .remove_flags(self.block, BlockFlags::MUTATING);
        }
        Ok(())
    }
}

pub struct Updater {
    runtime: Rc<Runtime>,
    pipeline: RefCell<Pipeline>,
    is_root: bool,
}

impl Updater {
    /// Creates the root updater of a fresh runtime.
    pub fn new(scheduler: Scheduler) -> Rc<Self> {
        let runtime = Rc::new(Runtime {
            scheduler,
            host: RefCell::new(HostTree::new()),
            blocks: RefCell::new(BlockTree::new()),
            current_block: Cell::new(None),
            swept: RefCell::new(Vec::new()),
            tasks: Rc::new(TaskCounter::default()),
            root: RefCell::new(Weak::new()),
        });
        let root = Rc::new(Self {
            runtime: runtime.clone(),
            pipeline: RefCell::new(Pipeline::default()),
            is_root: true,
        });
        *runtime.root.borrow_mut() = Rc::downgrade(&root);
        root
    }

    fn fork(&self) -> Rc<Self> {
        Rc::new(Self {
            runtime: self.runtime.clone(),
            pipeline: RefCell::new(Pipeline::default()),
            is_root: false,
        })
    }

    pub(crate) fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.runtime.scheduler
    }

    pub fn host_tree(&self) -> Ref<'_, HostTree> {
        self.runtime.host.borrow()
    }

    /// Direct host access, for creating detached nodes while rendering.
    pub fn with_host<R>(&self, f: impl FnOnce(&mut HostTree) -> R) -> R {
        f(&mut self.runtime.host.borrow_mut())
    }

    pub fn blocks(&self) -> Ref<'_, BlockTree> {
        self.runtime.blocks.borrow()
    }

    pub(crate) fn blocks_mut(&self) -> RefMut<'_, BlockTree> {
        self.runtime.blocks.borrow_mut()
    }

    /// The block whose `update` is running, if any.
    pub fn current_block(&self) -> Option<BlockId> {
        self.runtime.current_block.get()
    }

    /// Priority of the rendering block, otherwise the host's event priority.
    pub fn current_priority(&self) -> TaskPriority {
        self.current_block()
            .and_then(|id| self.blocks().priority(id))
            .unwrap_or_else(|| self.runtime.scheduler.get_current_priority())
    }

    pub fn enqueue_block(&self, id: BlockId) {
        if self.is_root && self.current_block().is_some() {
            let mut swept = self.runtime.swept.borrow_mut();
            if !swept.contains(&id) {
                swept.push(id);
            }
            return;
        }
        let mut pipeline = self.pipeline.borrow_mut();
        if !pipeline.blocks.contains(&id) {
            pipeline.blocks.push(id);
        }
    }

    pub fn enqueue_mutation_effect(&self, effect: Box<dyn Effect>) {
        self.pipeline.borrow_mut().mutation_effects.push(effect);
    }

    pub fn enqueue_layout_effect(&self, effect: Box<dyn Effect>) {
        self.pipeline.borrow_mut().layout_effects.push(effect);
    }

    pub fn enqueue_passive_effect(&self, effect: Box<dyn Effect>) {
        self.pipeline.borrow_mut().passive_effects.push(effect);
    }

    pub fn pending_blocks(&self) -> usize {
        self.pipeline.borrow().blocks.len()
    }

    pub fn pending_effects(&self, phase: CommitPhase) -> usize {
        let pipeline = self.pipeline.borrow();
        match phase {
            CommitPhase::Mutation => pipeline.mutation_effects.len(),
            CommitPhase::Layout => pipeline.layout_effects.len(),
            CommitPhase::Passive => pipeline.passive_effects.len(),
        }
    }

    /// Flags `id` dirty and queues it. Returns false if the block is gone.
    pub fn request_block_update(&self, id: BlockId, priority: TaskPriority) -> bool {
        let exists = self.blocks_mut().request(id, priority);
        if exists {
            self.enqueue_block(id);
        }
        exists
    }

    pub fn pending_tasks(&self) -> usize {
        self.runtime.tasks.count.get()
    }

    pub fn wait_for_update(&self) -> WaitForUpdate {
        self.runtime.tasks.wait()
    }

    /// Turns the queued work into host tasks. Does nothing while a block is
    /// rendering; the running render loop picks the work up instead.
    pub fn schedule_update(&self) {
        if self.current_block().is_some() {
            log::trace!("update requested while rendering; folded into the running pass");
            return;
        }
        let pipeline = self.pipeline.take();
        for id in pipeline.blocks {
            let Some(priority) = self.blocks().priority(id) else {
                continue;
            };
            let updater = self.fork();
            self.spawn(priority, move || updater.render_pipeline(id));
        }
        self.commit(
            pipeline.mutation_effects,
            pipeline.layout_effects,
            pipeline.passive_effects,
        );
    }

    fn spawn<F, Fut>(&self, priority: TaskPriority, callback: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let guard = self.runtime.tasks.begin();
        let task = self.runtime.scheduler.request_callback(priority, callback);
        let host = self.runtime.scheduler.host();
        let reporter = Rc::downgrade(host);
        host.spawn_local(
            async move {
                if let Err(error) = task.await {
                    if let Some(host) = reporter.upgrade() {
                        host.report_error(error);
                    }
                }
                drop(guard);
            }
            .boxed_local(),
        );
    }

    fn commit(
        &self,
        mutation: Vec<Box<dyn Effect>>,
        layout: Vec<Box<dyn Effect>>,
        passive: Vec<Box<dyn Effect>>,
    ) {
        if !mutation.is_empty() || !layout.is_empty() {
            let runtime = self.runtime.clone();
            self.spawn(TaskPriority::UserBlocking, move || async move {
                runtime.commit_blocking(mutation, layout)
            });
        }
        if !passive.is_empty() {
            let runtime = self.runtime.clone();
            self.spawn(TaskPriority::Background, move || runtime.commit_passive(passive));
        }
    }

    /// Renders `root` and everything it queues, pass by pass, then commits.
    async fn render_pipeline(self: Rc<Self>, root: BlockId) -> Result<()> {
        let scheduler = self.runtime.scheduler.clone();
        let mut pending = vec![root];
        let mut started = scheduler.get_current_time();
        let mut rendered = 0usize;

        while !pending.is_empty() {
            log::trace!("render pass over {} block(s)", pending.len());
            for id in std::mem::take(&mut pending) {
                if !self.blocks().should_update(id) {
                    continue;
                }
                let elapsed = scheduler.get_current_time().duration_since(started);
                if scheduler.should_yield_to_main(elapsed) {
                    let priority = self.blocks().priority(id).unwrap_or_default();
                    log::trace!("render yielding after {elapsed:?} at {priority}");
                    scheduler.yield_to_main(Some(priority)).await;
                    started = scheduler.get_current_time();
                    if !self.blocks().should_update(id) {
                        continue;
                    }
                }
                if let Err(error) = self.render_block(id) {
                    // Edits queued before the failure are committed as they are.
                    self.flush();
                    return Err(error);
                }
                rendered += 1;
            }
            pending = self.take_blocks();
        }

        log::trace!("rendered {rendered} block(s) from {root:?}");
        self.flush();
        Ok(())
    }

    fn flush(&self) {
        let pipeline = self.pipeline.take();
        self.commit(
            pipeline.mutation_effects,
            pipeline.layout_effects,
            pipeline.passive_effects,
        );
    }

    fn take_blocks(&self) -> Vec<BlockId> {
        let mut blocks = std::mem::take(&mut self.pipeline.borrow_mut().blocks);
        for id in self.runtime.swept.borrow_mut().drain(..) {
            if !blocks.contains(&id) {
                blocks.push(id);
            }
        }
        blocks
    }

    fn render_block(&self, id: BlockId) -> Result<()> {
        let checked_out = self.blocks_mut().checkout(id);
        let Some((mut unit, mut hooks)) = checked_out else {
            return Err(Error::BlockMissing);
        };
        let mutations_before = self.pending_effects(CommitPhase::Mutation);

        let result = {
            let _current = CurrentBlock::enter(&self.runtime, id);
            let mut ctx = RenderContext::new(id, &mut hooks, self);
            unit.update(&mut ctx)
        };

        let orphan = self.blocks_mut().checkin(id, unit, hooks);
        if let Some((mut unit, hooks)) = orphan {
            log::debug!("{id:?} was removed while rendering");
            unit.disconnect();
            hooks.dispose();
            return result;
        }
        result?;

        if self.pending_effects(CommitPhase::Mutation) > mutations_before {
            self.blocks_mut().insert_flags(id, BlockFlags::MUTATING);
            self.enqueue_mutation_effect(Box::new(BlockCommitted {
                runtime: Rc::downgrade(&self.runtime),
                block: id,
            }));
        }
        Ok(())
    }
}
