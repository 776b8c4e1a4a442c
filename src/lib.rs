//! One-value-per-channel message relay between two processes that
//! share a storage directory but no address space.
//!
//! A [`Sideband`] durably publishes the latest value per channel into
//! the shared directory and posts a zero-payload wake-up signal;
//! listeners bound on the other side are invoked with the freshly read
//! value instead of polling. Only the latest value is retained and
//! signals are fire-and-forget.
//!
//! ```
//! use sideband::{JsonCodec, Listener, LoopbackBridge, Sideband};
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let relay: Sideband<String> = Sideband::new(
//!     dir.path(),
//!     None,
//!     Arc::new(JsonCodec::new()),
//!     Arc::new(LoopbackBridge::new()),
//! )
//! .unwrap();
//!
//! relay.bind_listener(
//!     Listener::new("greeter", |message| {
//!         if let Some(message) = message {
//!             println!("latest: {}", message);
//!         }
//!     }),
//!     "greetings",
//! );
//!
//! relay.pass_message("greetings", Some(&"hello".to_string()));
//! assert_eq!(relay.latest_message("greetings"), Some("hello".to_string()));
//! ```
//!
//! For two real processes, use [`Sideband::open`], which watches the
//! shared directory for signals instead of looping back in-process.

pub mod bridge;
pub mod codec;
pub mod registry;
pub mod sideband;
pub mod store;
pub mod types;

// 公開API
pub use bridge::{
    BridgeError, FsSignalBridge, LoopbackBridge, NotificationBridge, SignalCallback, SignalToken,
};
pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use registry::ListenerRegistry;
pub use sideband::{Sideband, SidebandError};
pub use store::{FileStore, StoreError};
pub use types::Listener;
