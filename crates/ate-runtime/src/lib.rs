//! # ate-runtime
//!
//! Named, isolated Lua runtimes for Atë.
//!
//! This crate provides:
//! - [`Runtime`]: one sandboxed interpreter behind a per-runtime lock
//! - [`RuntimeManager`]: a registry that replays default objects and
//!   scripts into every runtime it creates
//! - The event bridge: [`Subscription`] routes external events into the
//!   script-side `events:post` dispatcher
//! - [`EventHub`]: an in-process [`EventProcessor`]
//! - Host helpers for the `network` bootstrap object
//!
//! ## Concurrency
//!
//! Operations on one runtime are totally ordered; separate runtimes run
//! in parallel. Host functions and event processors are invoked while the
//! runtime lock is held and must not call back into the same runtime.

pub mod bindings;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod events;
pub mod hub;
pub mod manager;
pub mod network;
pub mod runtime;
pub mod value;

pub use config::ManagerConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use events::{subscription_id, Event, EventProcessor, Subscriber, Subscription};
pub use hub::EventHub;
pub use manager::RuntimeManager;
pub use runtime::{Runtime, RuntimeOptions};
pub use value::{ApiValue, HostFunction};

pub use ate_capability::{CapabilitySurface, CapturingLogger, FixedClock};
