//! The notification seam.
//!
//! Digests are handed to a [`Notifier`] exactly once per session,
//! fire-and-forget: a notifier failure is logged by the controller and
//! never blocks or fails session termination. Delivery mechanics
//! (Telegram, e-mail, webhooks) live outside the core.

use async_trait::async_trait;

use crate::session::Digest;

/// Delivers an end-of-session digest to the outside world.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Send the digest; errors are reported as a string for logging only
    async fn send(&self, digest: &Digest) -> std::result::Result<(), String>;
}

/// A notifier that writes the digest summary to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, digest: &Digest) -> std::result::Result<(), String> {
        log::info!("session digest: {}", digest.summary());
        Ok(())
    }
}
