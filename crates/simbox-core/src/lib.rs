//! Session orchestration for simbox.
//!
//! This crate ties the runtime backends together with the persisted state file
//! and display forwarding into the `Dispatcher`, which routes one lifecycle
//! command per invocation to the selected backend.

pub mod dispatch;
pub mod forwarding;
pub mod state;

pub use dispatch::{open_session, Dispatcher, LifecycleCommand, Outcome, SessionConfig};
pub use forwarding::{DisplayHost, ForwardingController, ForwardingFlag};
pub use state::{StateError, StateFile};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("runtime error: {0}")]
    Runtime(#[from] simbox_runtime::RuntimeError),
    #[error("state error: {0}")]
    State(#[from] StateError),
}
