//! Runtime core: server definition, process lifecycle and the child's main loop.
//!
//! Public API from this module: [`Supervisor`], [`ServerCollection`], [`Server`]
//! and the types handed to server code ([`Context`], [`Handlers`], [`KeepList`]).
//!
//! Internal modules:
//! - [`server`]: the `Server` trait, handler table, child-side context;
//! - [`supervisor`]: fork, parent-side lifecycle, control channel;
//! - [`bootstrap`]: child entry point (descriptor sweep, hooks, `_exit`);
//! - [`dispatcher`]: the child's read-dispatch-handle loop;
//! - [`escalation`]: bounded close → terminate → kill stop sequence;
//! - [`collection`]: keyed supervisors with idle cleaning;
//! - [`shutdown`]: parent-side OS shutdown signal.

mod bootstrap;
mod collection;
mod config;
mod dispatcher;
mod escalation;
mod server;
mod shutdown;
mod supervisor;

pub use collection::{ServerCollection, SharedSupervisor};
pub use config::SupervisorConfig;
pub use dispatcher::LoopExit;
pub use escalation::StopTier;
pub use server::{Context, Handler, Handlers, KeepList, Server};
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::{ServerState, Supervisor};
