//! In-process signal delivery.

use super::{NotificationBridge, SignalCallback, SignalToken};
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Synchronous in-process bridge.
///
/// `post` invokes every subscriber for the channel on the caller's own
/// thread before returning. Useful for wiring both ends of a relay
/// inside one process, and as the deterministic bridge in tests.
#[derive(Default)]
pub struct LoopbackBridge {
    inner: Mutex<LoopbackState>,
}

#[derive(Default)]
struct LoopbackState {
    next_token: u64,
    subscribers: HashMap<String, Vec<(SignalToken, SignalCallback)>>,
}

impl LoopbackBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions for `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let state = self.inner.lock().unwrap();
        state
            .subscribers
            .get(channel)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl NotificationBridge for LoopbackBridge {
    fn post(&self, channel: &str) {
        // Snapshot under the lock, invoke outside it: a callback may
        // re-enter the bridge (bind or post from inside a listener).
        let callbacks: Vec<SignalCallback> = {
            let state = self.inner.lock().unwrap();
            match state.subscribers.get(channel) {
                Some(entries) => entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => Vec::new(),
            }
        };

        trace!(
            "Loopback post on '{}' reaches {} subscriber(s)",
            channel,
            callbacks.len()
        );
        for callback in callbacks {
            callback(channel);
        }
    }

    fn subscribe(&self, channel: &str, on_signal: SignalCallback) -> SignalToken {
        let mut state = self.inner.lock().unwrap();
        state.next_token += 1;
        let token = SignalToken(state.next_token);
        state
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push((token, on_signal));
        token
    }

    fn unsubscribe(&self, token: SignalToken) {
        let mut state = self.inner.lock().unwrap();
        for entries in state.subscribers.values_mut() {
            entries.retain(|(t, _)| *t != token);
        }
        state.subscribers.retain(|_, entries| !entries.is_empty());
    }
}
