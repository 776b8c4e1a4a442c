//! Core value types for the relay.

use std::fmt;
use std::sync::Arc;

/// A named callback bound to a channel.
///
/// Identity for registry purposes is the (channel, name) pair. The
/// action never participates in identity: binding a second listener
/// with the same name on the same channel replaces the first one.
pub struct Listener<M> {
    name: String,
    action: Arc<dyn Fn(Option<&M>) + Send + Sync>,
}

impl<M> Listener<M> {
    /// Create a listener with the given name and action.
    ///
    /// The action receives the latest stored value for the channel, or
    /// `None` when nothing is stored (or the stored bytes cannot be
    /// decoded). It runs synchronously inside the delivery context, so
    /// it should return promptly; a blocking action delays delivery to
    /// every listener dispatched after it on the same channel.
    pub fn new(
        name: impl Into<String>,
        action: impl Fn(Option<&M>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
        }
    }

    /// The registry identity of this listener (within one channel).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, message: Option<&M>) {
        (self.action)(message)
    }
}

impl<M> Clone for Listener<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            action: Arc::clone(&self.action),
        }
    }
}

impl<M> fmt::Debug for Listener<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("name", &self.name).finish()
    }
}

/// An empty channel identifier can never be routed; this is a
/// programmer error, not a recoverable failure.
pub(crate) fn assert_channel(channel: &str) {
    assert!(!channel.is_empty(), "channel identifier must not be empty");
}
