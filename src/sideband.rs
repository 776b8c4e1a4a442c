//! Public facade composing store, bridge and listener registry.

use crate::bridge::{BridgeError, FsSignalBridge, NotificationBridge};
use crate::codec::{JsonCodec, MessageCodec};
use crate::registry::ListenerRegistry;
use crate::store::{FileStore, StoreError};
use crate::types::{assert_channel, Listener};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Setup error types
#[derive(Debug, thiserror::Error)]
pub enum SidebandError {
    #[error("Failed to prepare message store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to initialize notification bridge: {0}")]
    Bridge(#[from] BridgeError),
}

/// One-value-per-channel message relay over a shared directory.
///
/// Each channel holds at most one message. `pass_message` durably
/// publishes the latest value and wakes the other side; bound
/// listeners are invoked with the freshly read value. Only the latest
/// value is retained (last-writer-wins) and signals are fire-and-forget,
/// so a process that misses one recovers by polling
/// [`latest_message`](Sideband::latest_message).
///
/// Every operation requires a non-empty channel identifier and panics
/// on an empty one; no correct routing is possible without it.
pub struct Sideband<M> {
    store: Arc<FileStore>,
    codec: Arc<dyn MessageCodec<M>>,
    bridge: Arc<dyn NotificationBridge>,
    registry: ListenerRegistry<M>,
}

impl<M: 'static> Sideband<M> {
    /// Wire a relay over `root` (plus an optional named subdirectory)
    /// with an injected codec and bridge.
    pub fn new(
        root: impl AsRef<Path>,
        subdirectory: Option<&str>,
        codec: Arc<dyn MessageCodec<M>>,
        bridge: Arc<dyn NotificationBridge>,
    ) -> Result<Self, SidebandError> {
        let store = Arc::new(FileStore::new(root, subdirectory)?);
        let registry =
            ListenerRegistry::new(Arc::clone(&store), Arc::clone(&codec), Arc::clone(&bridge));
        Ok(Self {
            store,
            codec,
            bridge,
            registry,
        })
    }

    /// Publish `message` on `channel` and signal the other side.
    ///
    /// With a present message, the slot write fully completes before
    /// the signal is posted; a failed write (or a failed encode)
    /// suppresses the signal so readers are never woken to a value
    /// that was not stored. With `None`, the store is skipped entirely
    /// and a signal is always posted — a pure ping, valid even on a
    /// channel that has never been written.
    pub fn pass_message(&self, channel: &str, message: Option<&M>) {
        assert_channel(channel);
        match message {
            Some(message) => match self.codec.encode(message) {
                Ok(bytes) => {
                    if self.store.put(channel, &bytes) {
                        self.bridge.post(channel);
                    }
                }
                Err(err) => {
                    warn!("Failed to encode message for '{}', signal suppressed: {}", channel, err);
                }
            },
            None => self.bridge.post(channel),
        }
    }

    /// Bind `listener` to `channel`, replacing any listener with the
    /// same name. The listener is invoked immediately with whatever is
    /// currently stored (including nothing).
    pub fn bind_listener(&self, listener: Listener<M>, channel: &str) {
        assert_channel(channel);
        self.registry.bind(channel, listener);
    }

    /// Unbind the listener with `listener`'s name from `channel`.
    pub fn remove_listener(&self, listener: &Listener<M>, channel: &str) {
        assert_channel(channel);
        self.registry.unbind(channel, listener.name());
    }

    /// Unbind only the listener named `name` from `channel`; other
    /// listeners on the channel keep dispatching.
    pub fn remove_listener_by_name(&self, name: &str, channel: &str) {
        assert_channel(channel);
        self.registry.unbind(channel, name);
    }

    /// Unbind every listener from `channel`.
    pub fn remove_all_listeners(&self, channel: &str) {
        assert_channel(channel);
        self.registry.unbind_all(channel);
    }

    /// Read the latest stored value for `channel` directly.
    ///
    /// Never triggers dispatch and never touches the signal bridge.
    /// Missing, deleted and undecodable values all read as `None`.
    pub fn latest_message(&self, channel: &str) -> Option<M> {
        assert_channel(channel);
        self.registry.read_current(channel)
    }

    /// Delete the stored value for `channel`. Listener bindings are
    /// unaffected.
    pub fn destroy_message(&self, channel: &str) {
        assert_channel(channel);
        self.store.delete(channel);
    }

    /// Delete every stored value. Listener bindings are unaffected.
    pub fn destroy_all_messages(&self) {
        self.store.delete_all();
    }
}

impl<M: Serialize + DeserializeOwned + 'static> Sideband<M> {
    /// Open a relay with the default wiring: JSON codec plus the
    /// file-watching signal bridge over the same shared directory.
    ///
    /// Both processes call this with the same `root`/`subdirectory`.
    pub fn open(root: impl AsRef<Path>, subdirectory: Option<&str>) -> Result<Self, SidebandError> {
        let store = Arc::new(FileStore::new(root, subdirectory)?);
        let bridge: Arc<dyn NotificationBridge> = Arc::new(FsSignalBridge::new(store.directory())?);
        let codec: Arc<dyn MessageCodec<M>> = Arc::new(JsonCodec::new());
        let registry =
            ListenerRegistry::new(Arc::clone(&store), Arc::clone(&codec), Arc::clone(&bridge));
        Ok(Self {
            store,
            codec,
            bridge,
            registry,
        })
    }
}
