//! Abstraction over the process-wide, zero-payload signal primitive.
//!
//! A signal never carries the message; it only tells subscribers to
//! re-check the store for a channel. Delivery is immediate and
//! best-effort: a process that is not subscribed at post time misses
//! the signal permanently. There is no buffering and no replay.

pub mod fs;
pub mod loopback;

pub use fs::FsSignalBridge;
pub use loopback::LoopbackBridge;

use std::sync::Arc;

/// Callback invoked in the bridge's delivery context when a signal
/// arrives for a subscribed channel. Receives the channel identifier.
///
/// The callback is an owned context object handed to the bridge; it
/// stays alive until the matching [`NotificationBridge::unsubscribe`].
pub type SignalCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Opaque handle identifying one subscription on one bridge instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalToken(pub(crate) u64);

/// Bridge error types
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create file system watcher: {0}")]
    Watch(#[from] notify::Error),
}

/// A system-wide publish/subscribe mechanism keyed by channel.
pub trait NotificationBridge: Send + Sync {
    /// Broadcast a zero-payload signal for `channel`.
    ///
    /// Fire-and-forget: failures are swallowed (and logged by
    /// implementations), and delivery reaches only currently
    /// subscribed parties.
    fn post(&self, channel: &str);

    /// Register `on_signal` to run whenever a signal for `channel`
    /// arrives.
    ///
    /// The bridge multiplexes tokens; keeping the number of
    /// subscriptions per channel bounded is the caller's concern (the
    /// listener registry holds exactly one per channel).
    fn subscribe(&self, channel: &str, on_signal: SignalCallback) -> SignalToken;

    /// Drop a subscription. Unknown tokens are ignored.
    fn unsubscribe(&self, token: SignalToken);
}
