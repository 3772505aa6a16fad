//! # Host loop
//!
//! [`EventLoop`] is a single-threaded, cooperative implementation of
//! [`sprig_core::Host`]. It keeps one task queue and one continuation queue per
//! priority, a timer list, an idle queue and a microtask queue, and drives
//! local futures on a `futures` [`LocalPool`](futures::executor::LocalPool).
//!
//! ```rust,ignore
//! use sprig_core::prelude::*;
//! use sprig_platform::{EventLoop, HostCapabilities};
//!
//! let event_loop = EventLoop::new(HostCapabilities::all());
//! let engine = Engine::new(event_loop.clone(), EngineOptions::default());
//! let container = engine.create_container();
//! let _root = engine.mount(element("p").child("hello"), container)?;
//! event_loop.block_on(engine.wait_for_update());
//! assert_eq!(engine.host_tree().to_html(container), "<p>hello<!----></p><!---->");
//! ```
//!
//! Capabilities can be switched off one by one to see how the scheduler
//! behaves on a poorer host, and [`TestClock`] makes time-slicing
//! deterministic.

pub mod clock;
pub mod event_loop;

pub use clock::*;
pub use event_loop::*;
