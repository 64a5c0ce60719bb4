//! Per-destination rate limiting and admission control.
//!
//! Every application task targets one destination domain; this module
//! arbitrates whether a task may start against that domain right now, and
//! paces the actions of tasks that do.
//!
//! # Architecture
//!
//! - [`DomainKey`]: normalized domain identity, the unit of throttling
//! - [`DomainPolicy`] / [`ThrottleConfig`]: immutable limits, loaded once
//! - [`DomainThrottle`]: live counters plus the atomic admission check
//! - [`ThrottleGuard`]: RAII slot handle; drop releases on every exit path
//! - [`Denial`]: typed reasons a task was refused
//! - [`DelaySpec`]: stateless randomized pacing for human-like form input

mod key;
mod pacing;
mod policy;
mod state;
#[allow(clippy::module_inception)]
mod throttle;

pub use key::DomainKey;
pub use pacing::{DelayDistribution, DelaySpec};
pub use policy::{DomainPolicy, ThrottleConfig};
pub use state::Denial;
pub use throttle::{DomainThrottle, ThrottleGuard};
