//! Session lifecycle: budgets, counters, digests, crash recovery.
//!
//! A session is a bounded, budgeted batch of application tasks run under
//! one set of limits. The [`SessionController`] owns every state
//! transition and every counter mutation; workers interact with it only
//! through [`SessionController::register_result`].

mod controller;
mod digest;
#[allow(clippy::module_inception)]
mod session;
mod window;

pub use controller::SessionController;
pub use digest::Digest;
pub use session::{
    CounterDelta, SessionCounters, SessionLimits, SessionParams, SessionRecord, SessionSnapshot,
    SessionStatus, DEFAULT_MAX_APPLICATIONS, DEFAULT_MAX_DURATION, DEFAULT_MAX_PARALLEL_WORKERS,
};
