use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawnExt, noop_waker};
use web_time::Instant;

use sprig_core::{Error, EventContinuity, Host, Job, TaskPriority};

use crate::clock::{Clock, SystemClock};

/// Which optional host primitives the loop exposes. Switching one off makes
/// the scheduler fall back the way it would on a host without it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCapabilities {
    pub post_task: bool,
    pub native_yield: bool,
    pub input_pending: bool,
    pub idle_callback: bool,
}

impl HostCapabilities {
    pub fn all() -> Self {
        Self {
            post_task: true,
            native_yield: true,
            input_pending: true,
            idle_callback: true,
        }
    }

    pub fn none() -> Self {
        Self {
            post_task: false,
            native_yield: false,
            input_pending: false,
            idle_callback: false,
        }
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// How many jobs of each kind the loop has run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub tasks: usize,
    pub continuations: usize,
    pub timeouts: usize,
    pub idle_callbacks: usize,
    pub microtasks: usize,
    pub events: usize,
}

struct Timer {
    due: Instant,
    seq: u64,
    job: Job,
}

enum Source {
    Task,
    Continuation,
    Timeout,
    Idle,
}

/// A single-threaded cooperative loop implementing [`Host`].
///
/// One turn runs one macrotask, picked in this order: user-blocking work
/// (yield continuations before fresh tasks), due timers, user-visible work,
/// background work, and idle callbacks only when nothing else is runnable.
/// After every macrotask and every dispatched event the microtask queue and
/// the local futures are drained.
pub struct EventLoop {
    capabilities: HostCapabilities,
    clock: Rc<dyn Clock>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    continuations: RefCell<[VecDeque<Job>; 3]>,
    tasks: RefCell<[VecDeque<Job>; 3]>,
    timers: RefCell<Vec<Timer>>,
    next_seq: Cell<u64>,
    idle: RefCell<VecDeque<Job>>,
    microtasks: RefCell<VecDeque<Job>>,
    pending_discrete: Cell<bool>,
    pending_continuous: Cell<bool>,
    current_event: Cell<Option<EventContinuity>>,
    errors: RefCell<Vec<Error>>,
    stats: Cell<LoopStats>,
}

impl EventLoop {
    pub fn new(capabilities: HostCapabilities) -> Rc<Self> {
        Self::with_clock(capabilities, Rc::new(SystemClock))
    }

    pub fn with_clock(capabilities: HostCapabilities, clock: Rc<dyn Clock>) -> Rc<Self> {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Rc::new(Self {
            capabilities,
            clock,
            pool: RefCell::new(pool),
            spawner,
            continuations: RefCell::new(Default::default()),
            tasks: RefCell::new(Default::default()),
            timers: RefCell::new(Vec::new()),
            next_seq: Cell::new(0),
            idle: RefCell::new(VecDeque::new()),
            microtasks: RefCell::new(VecDeque::new()),
            pending_discrete: Cell::new(false),
            pending_continuous: Cell::new(false),
            current_event: Cell::new(None),
            errors: RefCell::new(Vec::new()),
            stats: Cell::new(LoopStats::default()),
        })
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    pub fn stats(&self) -> LoopStats {
        self.stats.get()
    }

    /// Failures reported by tasks nobody awaited, oldest first.
    pub fn take_errors(&self) -> Vec<Error> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }

    /// Simulates input waiting in the host queue. Only visible through
    /// `is_input_pending` when the capability is on.
    pub fn set_pending_input(&self, discrete: bool, continuous: bool) {
        self.pending_discrete.set(discrete);
        self.pending_continuous.set(continuous);
    }

    /// Runs `handler` as if it were an input event handler. Pending input
    /// of that kind counts as consumed.
    pub fn dispatch_event<R>(&self, continuity: EventContinuity, handler: impl FnOnce() -> R) -> R {
        match continuity {
            EventContinuity::Discrete => self.pending_discrete.set(false),
            EventContinuity::Continuous => self.pending_continuous.set(false),
        }
        self.bump(|s| s.events += 1);
        let previous = self.current_event.replace(Some(continuity));
        let result = handler();
        self.current_event.set(previous);
        self.checkpoint();
        result
    }

    /// Runs one macrotask. Returns `false` when nothing was runnable.
    pub fn run_once(&self) -> bool {
        self.checkpoint();
        let Some((job, source)) = self.next_macrotask() else {
            return false;
        };
        self.bump(|s| match source {
            Source::Task => s.tasks += 1,
            Source::Continuation => s.continuations += 1,
            Source::Timeout => s.timeouts += 1,
            Source::Idle => s.idle_callbacks += 1,
        });
        job();
        self.checkpoint();
        true
    }

    /// Runs until every queue is empty, waiting on the clock for timers
    /// that are not yet due.
    pub fn run_until_idle(&self) {
        while self.advance() {}
    }

    /// Drives the loop until `future` completes. `None` if the loop ran dry
    /// first.
    pub fn block_on<F: Future>(&self, future: F) -> Option<F::Output> {
        let mut future = pin!(future);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Some(output);
            }
            if !self.advance() {
                log::debug!("event loop ran dry before the future completed");
                return None;
            }
        }
    }

    fn advance(&self) -> bool {
        if self.run_once() {
            return true;
        }
        match self.next_deadline() {
            Some(due) => {
                self.clock.wait_until(due);
                true
            }
            None => false,
        }
    }

    fn checkpoint(&self) {
        loop {
            let job = self.microtasks.borrow_mut().pop_front();
            if let Some(job) = job {
                self.bump(|s| s.microtasks += 1);
                job();
                continue;
            }
            self.pool.borrow_mut().run_until_stalled();
            if self.microtasks.borrow().is_empty() {
                break;
            }
        }
    }

    fn next_macrotask(&self) -> Option<(Job, Source)> {
        let urgent = TaskPriority::UserBlocking.index();
        if let Some(next) = self.pop_priority(urgent) {
            return Some(next);
        }
        if let Some(job) = self.pop_due_timer() {
            return Some((job, Source::Timeout));
        }
        for priority in [TaskPriority::UserVisible, TaskPriority::Background] {
            if let Some(next) = self.pop_priority(priority.index()) {
                return Some(next);
            }
        }
        self.idle.borrow_mut().pop_front().map(|job| (job, Source::Idle))
    }

    fn pop_priority(&self, index: usize) -> Option<(Job, Source)> {
        if let Some(job) = self.continuations.borrow_mut()[index].pop_front() {
            return Some((job, Source::Continuation));
        }
        self.tasks.borrow_mut()[index]
            .pop_front()
            .map(|job| (job, Source::Task))
    }

    fn pop_due_timer(&self) -> Option<Job> {
        let now = self.clock.now();
        let mut timers = self.timers.borrow_mut();
        let (at, _) = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= now)
            .min_by_key(|(_, t)| (t.due, t.seq))?;
        Some(timers.swap_remove(at).job)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.borrow().iter().map(|t| t.due).min()
    }

    fn bump(&self, f: impl FnOnce(&mut LoopStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl Host for EventLoop {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn post_task(&self, job: Job, priority: TaskPriority) -> Result<(), Job> {
        if !self.capabilities.post_task {
            return Err(job);
        }
        self.tasks.borrow_mut()[priority.index()].push_back(job);
        Ok(())
    }

    fn post_yield(&self, job: Job, priority: TaskPriority) -> Result<(), Job> {
        if !self.capabilities.native_yield {
            return Err(job);
        }
        self.continuations.borrow_mut()[priority.index()].push_back(job);
        Ok(())
    }

    fn is_input_pending(&self, include_continuous: bool) -> Option<bool> {
        if !self.capabilities.input_pending {
            return None;
        }
        Some(self.pending_discrete.get() || (include_continuous && self.pending_continuous.get()))
    }

    fn current_event(&self) -> Option<EventContinuity> {
        self.current_event.get()
    }

    fn queue_microtask(&self, job: Job) {
        self.microtasks.borrow_mut().push_back(job);
    }

    fn request_idle_callback(&self, job: Job) -> Result<(), Job> {
        if !self.capabilities.idle_callback {
            return Err(job);
        }
        self.idle.borrow_mut().push_back(job);
        Ok(())
    }

    fn set_timeout(&self, job: Job, delay: Duration) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.timers.borrow_mut().push(Timer {
            due: self.clock.now() + delay,
            seq,
            job,
        });
    }

    fn spawn_local(&self, future: LocalBoxFuture<'static, ()>) {
        if let Err(e) = self.spawner.spawn_local(future) {
            log::error!("failed to spawn local future: {e}");
        }
    }

    fn report_error(&self, error: Error) {
        log::warn!("task failed: {error}");
        self.errors.borrow_mut().push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Job) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let job = move |name: &'static str| -> Job {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name))
        };
        (log, job)
    }

    #[test]
    fn test_turn_order() {
        let clock = Rc::new(TestClock::new());
        let el = EventLoop::with_clock(HostCapabilities::all(), clock);
        let (log, job) = recorder();

        assert!(el.request_idle_callback(job("idle")).is_ok());
        assert!(el.post_task(job("background"), TaskPriority::Background).is_ok());
        assert!(el.post_task(job("visible"), TaskPriority::UserVisible).is_ok());
        el.set_timeout(job("timeout"), Duration::ZERO);
        assert!(el.post_task(job("blocking"), TaskPriority::UserBlocking).is_ok());
        assert!(el.post_yield(job("continuation"), TaskPriority::UserBlocking).is_ok());
        el.queue_microtask(job("microtask"));

        el.run_until_idle();
        assert_eq!(
            *log.borrow(),
            ["microtask", "continuation", "blocking", "timeout", "visible", "background", "idle"]
        );
        let stats = el.stats();
        assert_eq!(stats.tasks, 3);
        assert_eq!(stats.continuations, 1);
        assert_eq!(stats.idle_callbacks, 1);
        assert_eq!(stats.microtasks, 1);
    }

    #[test]
    fn test_timers_fire_in_deadline_then_post_order() {
        let clock = Rc::new(TestClock::new());
        let el = EventLoop::with_clock(HostCapabilities::all(), clock.clone());
        let (log, job) = recorder();
        let start = clock.now();

        el.set_timeout(job("late"), Duration::from_millis(20));
        el.set_timeout(job("first"), Duration::from_millis(10));
        el.set_timeout(job("second"), Duration::from_millis(10));

        assert!(!el.run_once());
        el.run_until_idle();
        assert_eq!(*log.borrow(), ["first", "second", "late"]);
        assert_eq!(clock.now().duration_since(start), Duration::from_millis(20));
    }

    #[test]
    fn test_missing_capabilities_hand_jobs_back() {
        let el = EventLoop::new(HostCapabilities::none());
        assert!(el.post_task(Box::new(|| ()), TaskPriority::UserVisible).is_err());
        assert!(el.post_yield(Box::new(|| ()), TaskPriority::UserVisible).is_err());
        assert!(el.request_idle_callback(Box::new(|| ())).is_err());
        el.set_pending_input(true, true);
        assert_eq!(el.is_input_pending(true), None);
    }

    #[test]
    fn test_input_probe_and_event_dispatch() {
        let el = EventLoop::new(HostCapabilities::all());
        el.set_pending_input(false, true);
        assert_eq!(el.is_input_pending(false), Some(false));
        assert_eq!(el.is_input_pending(true), Some(true));

        let seen = el.dispatch_event(EventContinuity::Continuous, || el.current_event());
        assert_eq!(seen, Some(EventContinuity::Continuous));
        assert_eq!(el.current_event(), None);
        assert_eq!(el.is_input_pending(true), Some(false));
        assert_eq!(el.stats().events, 1);
    }

    #[test]
    fn test_block_on_drives_spawned_futures() {
        let el = EventLoop::new(HostCapabilities::all());
        let (sender, receiver) = futures::channel::oneshot::channel();
        let host = el.clone();
        assert!(
            el.post_task(
                Box::new(move || {
                    host.spawn_local(Box::pin(async move {
                        let _ = sender.send(7);
                    }))
                }),
                TaskPriority::Background,
            )
            .is_ok()
        );
        assert_eq!(el.block_on(receiver), Some(Ok(7)));

        let (_sender, never) = futures::channel::oneshot::channel::<()>();
        assert_eq!(el.block_on(never), None);
    }
}
