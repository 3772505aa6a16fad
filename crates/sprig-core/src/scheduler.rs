use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::channel::oneshot;
use web_time::Instant;

use crate::error::{Error, Result};
use crate::host::{EventContinuity, Host, Job};
use crate::priority::TaskPriority;

/// Time-slice thresholds for [`Scheduler::should_yield_to_main`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Below this a render pass never yields.
    pub min_slice: Duration,
    /// Up to this only discrete input makes a pass yield.
    pub discrete_input_slice: Duration,
    /// At or above this a pass always yields.
    pub max_slice: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            min_slice: Duration::from_millis(5),
            discrete_input_slice: Duration::from_millis(50),
            max_slice: Duration::from_millis(300),
        }
    }
}

impl SchedulerOptions {
    pub fn aggressive() -> Self {
        Self {
            min_slice: Duration::from_millis(1),
            discrete_input_slice: Duration::from_millis(10),
            max_slice: Duration::from_millis(50),
        }
    }

    pub fn relaxed() -> Self {
        Self {
            min_slice: Duration::from_millis(16),
            discrete_input_slice: Duration::from_millis(100),
            max_slice: Duration::from_millis(500),
        }
    }
}

/// Priority-aware dispatch on top of whatever the [`Host`] offers.
#[derive(Clone)]
pub struct Scheduler {
    host: Rc<dyn Host>,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(host: Rc<dyn Host>, options: SchedulerOptions) -> Self {
        Self { host, options }
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn get_current_time(&self) -> Instant {
        self.host.now()
    }

    /// Discrete input gets `UserBlocking`, continuous input and idle time
    /// get `UserVisible`.
    pub fn get_current_priority(&self) -> TaskPriority {
        match self.host.current_event() {
            Some(EventContinuity::Discrete) => TaskPriority::UserBlocking,
            Some(EventContinuity::Continuous) | None => TaskPriority::UserVisible,
        }
    }

    /// Schedules `callback` at `priority`. The returned task resolves with
    /// the callback's result, or with [`Error::Panicked`] if it panicked.
    pub fn request_callback<F, Fut, T>(&self, priority: TaskPriority, callback: F) -> Task<T>
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let host = self.host.clone();
        let job: Job = Box::new(move || {
            let future = async move {
                let result = match catch_unwind(AssertUnwindSafe(callback)) {
                    Ok(future) => AssertUnwindSafe(future)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Err(Error::from_panic(payload))),
                    Err(payload) => Err(Error::from_panic(payload)),
                };
                let _ = sender.send(result);
            };
            host.spawn_local(future.boxed_local());
        });
        self.post(job, priority);
        Task { receiver }
    }

    fn post(&self, job: Job, priority: TaskPriority) {
        let job = match self.host.post_task(job, priority) {
            Ok(()) => return,
            Err(job) => job,
        };
        match priority {
            TaskPriority::UserBlocking => {
                log::debug!("no native task post; {priority} task goes to the microtask queue");
                self.host.queue_microtask(job);
            }
            TaskPriority::UserVisible => {
                log::debug!("no native task post; {priority} task goes to a timeout");
                self.host.set_timeout(job, Duration::ZERO);
            }
            TaskPriority::Background => match self.host.request_idle_callback(job) {
                Ok(()) => log::debug!("no native task post; {priority} task goes to idle time"),
                Err(job) => {
                    log::debug!("no native task post or idle callback; {priority} task goes to a timeout");
                    self.host.set_timeout(job, Duration::ZERO);
                }
            },
        }
    }

    pub fn should_yield_to_main(&self, elapsed: Duration) -> bool {
        if elapsed < self.options.min_slice {
            return false;
        }
        if elapsed >= self.options.max_slice {
            return true;
        }
        let include_continuous = elapsed >= self.options.discrete_input_slice;
        self.host
            .is_input_pending(include_continuous)
            .unwrap_or(true)
    }

    /// Resolves once control went back to the host loop. Without a native
    /// yield the continuation runs from the microtask queue.
    pub fn yield_to_main(&self, priority: Option<TaskPriority>) -> YieldToMain {
        let (sender, receiver) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = sender.send(());
        });
        let priority = priority.unwrap_or_else(|| self.get_current_priority());
        if let Err(job) = self.host.post_yield(job, priority) {
            self.host.queue_microtask(job);
        }
        YieldToMain { receiver }
    }
}

/// Handle to a scheduled callback.
#[must_use = "a task does nothing useful unless awaited or detached"]
pub struct Task<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T: 'static> Task<T> {
    /// Drops the handle but keeps failures visible through
    /// [`Host::report_error`].
    pub fn detach(self, host: &Rc<dyn Host>) {
        let reporter = host.clone();
        host.spawn_local(
            async move {
                if let Err(error) = self.await {
                    reporter.report_error(error);
                }
            }
            .boxed_local(),
        );
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Canceled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct YieldToMain {
    receiver: oneshot::Receiver<()>,
}

impl Future for YieldToMain {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A dropped continuation still counts as having yielded.
        self.receiver.poll_unpin(cx).map(|_| ())
    }
}
