//! Named listener registry and signal dispatch.
//!
//! Listeners are keyed by the (channel, name) pair. The registry owns
//! the per-channel bridge subscription bookkeeping: however many
//! listeners a channel holds, the bridge sees exactly one
//! subscription, and the registry fans a dispatch out to all of them.

use crate::bridge::{NotificationBridge, SignalCallback, SignalToken};
use crate::codec::MessageCodec;
use crate::store::FileStore;
use crate::types::Listener;
use log::{debug, trace, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Thread-safe collection of named listeners, one dispatcher per
/// channel.
///
/// State is mutated by arbitrary caller threads (bind/unbind) and read
/// by the signal delivery context; everything lives behind one mutex
/// per registry instance. Enumerate-for-dispatch snapshots the
/// listener set under the lock and invokes the actions after releasing
/// it, so an action may call back into the registry.
pub struct ListenerRegistry<M> {
    store: Arc<FileStore>,
    codec: Arc<dyn MessageCodec<M>>,
    bridge: Arc<dyn NotificationBridge>,
    inner: Arc<Mutex<RegistryState<M>>>,
}

struct RegistryState<M> {
    channels: HashMap<String, ChannelListeners<M>>,
}

struct ChannelListeners<M> {
    token: SignalToken,
    /// BTreeMap so a dispatch iterates listeners in stable name order.
    listeners: BTreeMap<String, Listener<M>>,
}

impl<M: 'static> ListenerRegistry<M> {
    pub fn new(
        store: Arc<FileStore>,
        codec: Arc<dyn MessageCodec<M>>,
        bridge: Arc<dyn NotificationBridge>,
    ) -> Self {
        Self {
            store,
            codec,
            bridge,
            inner: Arc::new(Mutex::new(RegistryState {
                channels: HashMap::new(),
            })),
        }
    }

    /// Insert or replace the listener keyed by (`channel`, its name).
    ///
    /// The first listener on a channel registers the channel's single
    /// bridge subscription. The freshly bound listener is invoked once,
    /// synchronously, with the current store value, so it catches up on
    /// the latest message without waiting for a future signal.
    pub fn bind(&self, channel: &str, listener: Listener<M>) {
        let bootstrap = listener.clone();
        let name = listener.name().to_string();
        {
            let mut guard = self.inner.lock().unwrap();
            if !guard.channels.contains_key(channel) {
                let token = self.bridge.subscribe(channel, self.dispatch_callback());
                guard.channels.insert(
                    channel.to_string(),
                    ChannelListeners {
                        token,
                        listeners: BTreeMap::new(),
                    },
                );
                debug!("First listener on '{}', signal subscription registered", channel);
            }
            let entry = guard.channels.get_mut(channel).unwrap();
            if entry.listeners.insert(name.clone(), listener).is_some() {
                debug!("Replaced listener '{}' on '{}'", name, channel);
            }
        }

        let current = self.read_current(channel);
        bootstrap.invoke(current.as_ref());
    }

    /// Remove only the entry matching both `channel` and `name`; other
    /// listeners on the channel stay bound.
    pub fn unbind(&self, channel: &str, name: &str) {
        let mut guard = self.inner.lock().unwrap();
        let released = match guard.channels.get_mut(channel) {
            Some(entry) => {
                if entry.listeners.remove(name).is_none() {
                    return;
                }
                if entry.listeners.is_empty() {
                    Some(entry.token)
                } else {
                    None
                }
            }
            None => return,
        };
        if let Some(token) = released {
            guard.channels.remove(channel);
            drop(guard);
            self.bridge.unsubscribe(token);
            debug!("Last listener on '{}' removed, signal subscription released", channel);
        }
    }

    /// Remove every listener for `channel` and release its bridge
    /// subscription.
    pub fn unbind_all(&self, channel: &str) {
        let mut guard = self.inner.lock().unwrap();
        if let Some(entry) = guard.channels.remove(channel) {
            drop(guard);
            self.bridge.unsubscribe(entry.token);
            debug!("Unbound all listeners on '{}'", channel);
        }
    }

    /// Read and decode the latest stored value for `channel`.
    ///
    /// Undecodable bytes surface as `None`, never as an error.
    pub(crate) fn read_current(&self, channel: &str) -> Option<M> {
        read_message(&self.store, self.codec.as_ref(), channel)
    }

    /// The per-channel bridge callback: an owned closure over the
    /// registry internals, handed to the bridge as the dispatch entry
    /// point.
    fn dispatch_callback(&self) -> SignalCallback {
        let store = Arc::clone(&self.store);
        let codec = Arc::clone(&self.codec);
        let inner = Arc::clone(&self.inner);
        Arc::new(move |channel: &str| {
            dispatch(&store, codec.as_ref(), &inner, channel);
        })
    }
}

impl<M> Drop for ListenerRegistry<M> {
    fn drop(&mut self) {
        let tokens: Vec<SignalToken> = {
            let mut guard = self.inner.lock().unwrap();
            guard
                .channels
                .drain()
                .map(|(_, entry)| entry.token)
                .collect()
        };
        for token in tokens {
            self.bridge.unsubscribe(token);
        }
    }
}

/// Dispatch a signal for `channel`: one store read, one decode, then
/// fan-out of the same value to every listener bound at snapshot time.
fn dispatch<M>(
    store: &FileStore,
    codec: &dyn MessageCodec<M>,
    inner: &Mutex<RegistryState<M>>,
    channel: &str,
) {
    let message = read_message(store, codec, channel);

    let listeners: Vec<Listener<M>> = {
        let guard = inner.lock().unwrap();
        match guard.channels.get(channel) {
            Some(entry) => entry.listeners.values().cloned().collect(),
            None => return,
        }
    };

    trace!("Dispatching '{}' to {} listener(s)", channel, listeners.len());
    for listener in &listeners {
        listener.invoke(message.as_ref());
    }
}

fn read_message<M>(store: &FileStore, codec: &dyn MessageCodec<M>, channel: &str) -> Option<M> {
    let bytes = store.get(channel)?;
    match codec.decode(&bytes) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!("Undecodable message on '{}': {}", channel, err);
            None
        }
    }
}
