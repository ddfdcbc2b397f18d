//! Child-side signal management.
//!
//! ## Contents
//! - [`SignalManager`] captures, overrides and restores process dispositions
//! - [`SignalTable`], [`SignalAction`] per-server bindings (quit, ignore, deferred callback)
//! - [`request_quit`], [`quit_requested`] the cooperative quit flag shared with the main loop

mod manager;
mod table;

pub use manager::{
    Disposition, SignalManager, is_trappable, quit_requested, request_quit, set_wakeup_fd,
    take_pending, take_quit_request,
};
pub use table::{SignalAction, SignalCallback, SignalTable};
