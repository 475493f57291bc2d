//! Priority-ordered event dispatch for suspend-capable listeners.
//!
//! Listeners are registered per owner through
//! [`SessionRegistry::register_listener`](crate::SessionRegistry::register_listener)
//! and fired with
//! [`SessionRegistry::fire_event`](crate::SessionRegistry::fire_event) in one of
//! two modes:
//!
//! - [`EventExecutionMode::Concurrent`] launches every listener as its own task,
//!   in priority order, without waiting for any of them.
//! - [`EventExecutionMode::Consecutive`] runs one outer task that starts each
//!   listener and waits for it before starting the next.

mod bus;
mod dispatch;
mod registration;
mod types;

pub use registration::{HandlerKind, ListenerRegistration};
pub use types::{CancelFlag, Cancellable, Event, EventExecutionMode, EventPriority};

pub(crate) use bus::EventBus;
pub(crate) use dispatch::fire;
