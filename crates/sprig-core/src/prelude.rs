pub use crate::binding::{
    Binding, Component, ComponentFn, Directive, Element, resolve_binding, element,
};
pub use crate::block::{BlockFlags, BlockId, Renderable};
pub use crate::effect::{CommitPhase, Effect, effect_fn};
pub use crate::engine::{Engine, EngineOptions, Root};
pub use crate::error::{Error, Result};
pub use crate::hooks::{Cleanup, RenderContext, StateSetter};
pub use crate::host::{EventContinuity, Host, Job};
pub use crate::list::{List, list};
pub use crate::part::Part;
pub use crate::priority::TaskPriority;
pub use crate::scheduler::{Scheduler, SchedulerOptions, Task};
pub use crate::tree::{HostTree, NodeId};
pub use crate::updater::{Updater, WaitForUpdate};
pub use crate::value::{Key, Value};
