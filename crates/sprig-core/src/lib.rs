//! # Rendering, bindings and scheduling
//!
//! Sprig keeps a host tree (an in-memory, DOM-shaped node arena) in sync with
//! values produced by render functions, without ever blocking the host loop
//! for long. There are four main pieces:
//!
//! - [`Scheduler`]: priority-aware task posting and a time-sliced
//!   `should_yield_to_main` checkpoint on top of whatever the [`Host`] offers.
//! - [`Updater`]: the render/commit pipeline. Render work is queued per
//!   block; host mutations are queued as [`Effect`]s and committed in phase
//!   order: mutation, then layout, then passive.
//! - [`Binding`]: adapts a [`Value`] to a [`Part`] of the host tree through
//!   `connect` / `bind` / `unbind` / `disconnect`.
//! - [`List`]: keyed reconciliation that moves item ranges instead of
//!   rebuilding them.
//!
//! ## Mounting
//!
//! ```rust,ignore
//! use sprig_core::prelude::*;
//!
//! let counter = ComponentFn::new("counter", |props, ctx| {
//!     let (count, set_count) = ctx.use_state(|| 0i64);
//!     ctx.use_effect(count, move |_| {
//!         log::info!("count is now {count}");
//!         Cleanup::noop()
//!     });
//!     let _ = set_count;
//!     Ok(element("p").attr("title", props.clone()).child(count).into())
//! });
//!
//! let engine = Engine::new(host, EngineOptions::default());
//! let container = engine.create_container();
//! let mut root = engine.mount(counter.with("clicks"), container)?;
//! // ... run the host loop until engine.wait_for_update() resolves
//! root.update(counter.with("taps"))?;
//! ```
//!
//! `mount` and `Root::update` only queue work. Blocks render in tasks posted
//! at their priority; their mutations land in the host tree in a
//! user-blocking commit task, passive effects in a background one.
//!
//! ## Hooks
//!
//! - `remember` is order-based: the Nth call in a render refers to the Nth
//!   stored value. `remember_with_key` is key-based and stable across
//!   conditional branches.
//! - `use_state` returns the current value and a [`StateSetter`] that
//!   re-renders the owning block.
//! - `use_effect` / `use_layout_effect` run after commit when their
//!   dependencies changed, and clean up before re-running and on unmount.

pub mod binding;
pub mod block;
pub mod effect;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod host;
pub mod list;
pub mod part;
pub mod prelude;
pub mod priority;
pub mod scheduler;
pub mod tree;
pub mod updater;
pub mod value;

pub use binding::*;
pub use block::*;
pub use effect::*;
pub use engine::*;
pub use error::*;
pub use hooks::*;
pub use host::*;
pub use list::*;
pub use part::*;
pub use priority::*;
pub use scheduler::*;
pub use tree::*;
pub use updater::*;
pub use value::*;
