use std::cell::Ref;
use std::rc::Rc;

use crate::binding::{Binding, resolve_binding};
use crate::block::BlockTree;
use crate::effect::effect_fn;
use crate::error::Result;
use crate::host::Host;
use crate::part::Part;
use crate::scheduler::{Scheduler, SchedulerOptions};
use crate::tree::{HostTree, NodeId};
use crate::updater::{Updater, WaitForUpdate};
use crate::value::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub scheduler: SchedulerOptions,
}

/// Entry point: owns the host tree and the root updater, and mounts values
/// into containers.
pub struct Engine {
    updater: Rc<Updater>,
}

impl Engine {
    pub fn new(host: Rc<dyn Host>, options: EngineOptions) -> Self {
        let scheduler = Scheduler::new(host, options.scheduler);
        Self {
            updater: Updater::new(scheduler),
        }
    }

    /// A fresh root node to mount into.
    pub fn create_container(&self) -> NodeId {
        self.updater.with_host(HostTree::create_root)
    }

    /// Renders `value` at the end of `container`. Nothing reaches the host
    /// tree until the scheduled tasks run.
    pub fn mount(&self, value: impl Into<Value>, container: NodeId) -> Result<Root> {
        let anchor = self.updater.with_host(|host| {
            let anchor = host.create_comment("");
            host.append_child(container, anchor).map(|_| anchor)
        })?;
        let mut binding = resolve_binding(value.into(), Part::ChildNode { anchor }, &self.updater)?;
        binding.connect(&self.updater)?;
        self.updater.schedule_update();
        log::debug!("mounted root at {anchor:?}");
        Ok(Root {
            updater: self.updater.clone(),
            binding,
            anchor,
        })
    }

    pub fn host_tree(&self) -> Ref<'_, HostTree> {
        self.updater.host_tree()
    }

    pub fn blocks(&self) -> Ref<'_, BlockTree> {
        self.updater.blocks()
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.updater.scheduler()
    }

    pub fn updater(&self) -> &Rc<Updater> {
        &self.updater
    }

    pub fn pending_tasks(&self) -> usize {
        self.updater.pending_tasks()
    }

    pub fn wait_for_update(&self) -> WaitForUpdate {
        self.updater.wait_for_update()
    }
}

/// A mounted value.
pub struct Root {
    updater: Rc<Updater>,
    binding: Box<dyn Binding>,
    anchor: NodeId,
}

impl Root {
    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    pub fn value(&self) -> &Value {
        self.binding.value()
    }

    /// Re-renders the root with `value`. A failed bind still commits the
    /// edits it queued before failing.
    pub fn update(&mut self, value: impl Into<Value>) -> Result<()> {
        let bound = self.binding.bind(value.into(), &self.updater);
        self.updater.schedule_update();
        bound
    }

    /// Removes the rendered content and the anchor, and releases every block
    /// under this root.
    pub fn unmount(mut self) {
        self.binding.unbind(&self.updater);
        self.binding.disconnect();
        let anchor = self.anchor;
        self.updater
            .enqueue_mutation_effect(effect_fn(move |_, host| Ok(host.remove(anchor)?)));
        self.updater.schedule_update();
        log::debug!("unmounted root at {anchor:?}");
    }
}
