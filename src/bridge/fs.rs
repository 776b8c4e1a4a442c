//! Cross-process signal delivery over a watched directory.
//!
//! `post` atomically rewrites a per-channel nonce file inside the
//! signal directory. Every process watching that directory wakes up,
//! maps the file back to its channel and invokes the subscribed
//! callbacks. A single rename can surface as several filesystem events
//! on some platforms; the last-seen nonce collapses them so one post
//! wakes a subscriber at most once.

use super::{BridgeError, NotificationBridge, SignalCallback, SignalToken};
use crate::store::encode_channel_name;
use log::{debug, trace, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher};
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};

/// Extension of signal nonce files.
const SIGNAL_EXTENSION: &str = "sig";

/// Name of the signal subdirectory inside the shared area.
pub const SIGNAL_DIR_NAME: &str = ".signals";

/// File-watching signal bridge.
///
/// Both processes create one bridge over the same shared directory;
/// the signal files live in a `.signals` subdirectory next to the
/// message slots. One `notify` watcher per bridge instance covers
/// every channel, so subscriptions cost no per-channel OS resources.
pub struct FsSignalBridge {
    signal_dir: PathBuf,
    post_sequence: AtomicU64,
    state: Arc<Mutex<BridgeState>>,
    // Dropping the watcher closes the notify channel, which stops the
    // drain thread.
    _watcher: RecommendedWatcher,
}

#[derive(Default)]
struct BridgeState {
    next_token: u64,
    /// Keyed by the encoded file stem the watcher will report.
    channels: HashMap<String, ChannelSubscribers>,
    /// Token to encoded stem, for unsubscribe.
    tokens: HashMap<u64, String>,
}

struct ChannelSubscribers {
    channel: String,
    last_nonce: Option<String>,
    callbacks: Vec<(SignalToken, SignalCallback)>,
}

impl FsSignalBridge {
    /// Create a bridge over the signal directory inside `shared_root`.
    pub fn new(shared_root: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let signal_dir = shared_root.as_ref().join(SIGNAL_DIR_NAME);
        fs::create_dir_all(&signal_dir)?;

        let (notify_tx, notify_rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(notify_tx)?;
        watcher.watch(&signal_dir, RecursiveMode::NonRecursive)?;

        let state = Arc::new(Mutex::new(BridgeState::default()));
        let thread_state = Arc::clone(&state);
        std::thread::spawn(move || {
            Self::drain_events(notify_rx, thread_state);
        });

        debug!("Signal bridge watching {}", signal_dir.display());
        Ok(Self {
            signal_dir,
            post_sequence: AtomicU64::new(0),
            state,
            _watcher: watcher,
        })
    }

    /// Background thread: translate notify events back into channel
    /// callbacks until the watcher goes away.
    fn drain_events(notify_rx: Receiver<NotifyResult<Event>>, state: Arc<Mutex<BridgeState>>) {
        while let Ok(event_result) = notify_rx.recv() {
            match event_result {
                Ok(event) => {
                    match event.kind {
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any => {}
                        _ => continue, // Removals and metadata churn carry no signal
                    }
                    for path in &event.paths {
                        Self::deliver(&state, path);
                    }
                }
                Err(err) => warn!("Signal watcher error: {}", err),
            }
        }
        debug!("Signal watcher channel closed, drain thread exiting");
    }

    fn deliver(state: &Mutex<BridgeState>, path: &Path) {
        let is_signal = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == SIGNAL_EXTENSION)
            .unwrap_or(false);
        if !is_signal {
            return;
        }
        let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem.to_string(),
            None => return,
        };

        let nonce = fs::read_to_string(path).ok();

        let (channel, callbacks) = {
            let mut guard = state.lock().unwrap();
            let entry = match guard.channels.get_mut(&stem) {
                Some(entry) => entry,
                None => return, // Not subscribed in this process
            };
            if nonce.is_some() && entry.last_nonce == nonce {
                return; // Duplicate event for a post already delivered
            }
            entry.last_nonce = nonce;
            let callbacks: Vec<SignalCallback> = entry
                .callbacks
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect();
            (entry.channel.clone(), callbacks)
        };

        trace!(
            "Signal for '{}' reaches {} subscriber(s)",
            channel,
            callbacks.len()
        );
        for callback in callbacks {
            callback(&channel);
        }
    }

    fn signal_path(&self, channel: &str) -> PathBuf {
        self.signal_dir
            .join(format!("{}.{}", encode_channel_name(channel), SIGNAL_EXTENSION))
    }
}

impl NotificationBridge for FsSignalBridge {
    fn post(&self, channel: &str) {
        // A fresh nonce per post; receivers use it to collapse the
        // duplicate events one rename can produce.
        let nonce = format!(
            "{:016x}-{:016x}",
            self.post_sequence.fetch_add(1, Ordering::Relaxed),
            rand::thread_rng().gen::<u64>()
        );
        let staging = self.signal_dir.join(format!(".tmp-{}", nonce));

        if let Err(err) = fs::write(&staging, &nonce) {
            warn!("Failed to stage signal for '{}': {}", channel, err);
            return;
        }
        if let Err(err) = fs::rename(&staging, self.signal_path(channel)) {
            warn!("Failed to post signal for '{}': {}", channel, err);
            let _ = fs::remove_file(&staging);
        }
    }

    fn subscribe(&self, channel: &str, on_signal: SignalCallback) -> SignalToken {
        let stem = encode_channel_name(channel);
        let mut guard = self.state.lock().unwrap();
        guard.next_token += 1;
        let token = SignalToken(guard.next_token);

        let entry = guard
            .channels
            .entry(stem.clone())
            .or_insert_with(|| ChannelSubscribers {
                channel: channel.to_string(),
                last_nonce: None,
                callbacks: Vec::new(),
            });
        entry.callbacks.push((token, on_signal));
        guard.tokens.insert(token.0, stem);

        debug!("Subscribed to signals for '{}'", channel);
        token
    }

    fn unsubscribe(&self, token: SignalToken) {
        let mut guard = self.state.lock().unwrap();
        let stem = match guard.tokens.remove(&token.0) {
            Some(stem) => stem,
            None => return,
        };
        let emptied = match guard.channels.get_mut(&stem) {
            Some(entry) => {
                entry.callbacks.retain(|(t, _)| *t != token);
                entry.callbacks.is_empty()
            }
            None => false,
        };
        if emptied {
            guard.channels.remove(&stem);
        }
    }
}
