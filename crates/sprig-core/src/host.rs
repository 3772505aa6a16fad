//! # Host contract
//!
//! The engine never talks to an OS event loop directly. Everything it needs
//! from the environment goes through [`Host`]: a clock, a way to post work,
//! and a way to drive local futures. Most primitives are optional; a host that
//! lacks one hands the job back (`Err(job)`) and the [`Scheduler`] falls back
//! to something weaker.
//!
//! [`Scheduler`]: crate::scheduler::Scheduler

use std::time::Duration;

use futures::future::LocalBoxFuture;
use web_time::Instant;

use crate::error::Error;
use crate::priority::TaskPriority;

pub type Job = Box<dyn FnOnce()>;

/// Whether the input event being dispatched is part of a continuous stream
/// (pointer move, drag, scroll, wheel) or a discrete one (click, key press).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventContinuity {
    Discrete,
    Continuous,
}

pub trait Host {
    /// Monotonic clock reading.
    fn now(&self) -> Instant;

    /// Native priority-aware task post.
    fn post_task(&self, job: Job, priority: TaskPriority) -> Result<(), Job> {
        let _ = priority;
        Err(job)
    }

    /// Native yield: run `job` as a continuation of the current task,
    /// ahead of regular tasks of the same priority.
    fn post_yield(&self, job: Job, priority: TaskPriority) -> Result<(), Job> {
        let _ = priority;
        Err(job)
    }

    /// Input-pending probe. `None` when the host cannot tell.
    fn is_input_pending(&self, include_continuous: bool) -> Option<bool> {
        let _ = include_continuous;
        None
    }

    /// The event currently being dispatched, if any.
    fn current_event(&self) -> Option<EventContinuity> {
        None
    }

    fn queue_microtask(&self, job: Job);

    fn request_idle_callback(&self, job: Job) -> Result<(), Job> {
        Err(job)
    }

    fn set_timeout(&self, job: Job, delay: Duration);

    fn spawn_local(&self, future: LocalBoxFuture<'static, ()>);

    /// Channel for task failures nobody awaited.
    fn report_error(&self, error: Error) {
        log::error!("unhandled task failure: {error}");
    }
}
