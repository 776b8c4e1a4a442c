//! Disk-backed message slots shared between processes.
//!
//! Each channel owns exactly one slot file inside the shared
//! directory. Writers stage the new content in a temporary file and
//! rename it over the slot, so a reader in the other process observes
//! either the fully-old or the fully-new bytes, never a torn write.
//! Only the latest value per channel is retained.

use log::{debug, warn};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension of message slot files.
const MESSAGE_EXTENSION: &str = "msg";

/// Longest encoded channel name kept verbatim. Anything longer is
/// replaced by its SHA-256 digest to stay well under the filename
/// component limit of common filesystems.
const MAX_ENCODED_LEN: usize = 200;

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Single-slot-per-channel payload storage over a shared directory.
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the store directory under `root`,
    /// optionally nested in a named subdirectory.
    pub fn new(root: impl AsRef<Path>, subdirectory: Option<&str>) -> Result<Self, StoreError> {
        let directory = match subdirectory {
            Some(name) => root.as_ref().join(name),
            None => root.as_ref().to_path_buf(),
        };
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    /// The directory holding the slot files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Replace the slot for `channel` with `bytes`.
    ///
    /// Returns `false` on any I/O failure; callers use the result to
    /// decide whether a signal for this write may be posted.
    pub fn put(&self, channel: &str, bytes: &[u8]) -> bool {
        let path = self.message_path(channel);
        let staging = self
            .directory
            .join(format!(".tmp-{:08x}", rand::thread_rng().gen::<u32>()));

        if let Err(err) = fs::write(&staging, bytes) {
            warn!("Failed to stage message for '{}': {}", channel, err);
            return false;
        }
        if let Err(err) = fs::rename(&staging, &path) {
            warn!("Failed to commit message for '{}': {}", channel, err);
            let _ = fs::remove_file(&staging);
            return false;
        }

        debug!("Stored {} byte(s) for '{}'", bytes.len(), channel);
        true
    }

    /// Read the latest bytes stored for `channel`.
    ///
    /// A missing or deleted slot is `None`, not an error; so is an
    /// unreadable one.
    pub fn get(&self, channel: &str) -> Option<Vec<u8>> {
        match fs::read(self.message_path(channel)) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!("Failed to read message for '{}': {}", channel, err);
                None
            }
        }
    }

    /// Remove the slot for `channel`. Missing slots are not errors.
    pub fn delete(&self, channel: &str) {
        match fs::remove_file(self.message_path(channel)) {
            Ok(()) => debug!("Deleted message for '{}'", channel),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!("Failed to delete message for '{}': {}", channel, err),
        }
    }

    /// Remove every slot file in the store directory.
    ///
    /// Only `*.msg` files are touched; the signal directory and any
    /// foreign files sharing the directory are left alone.
    pub fn delete_all(&self) {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Failed to enumerate store directory: {}", err);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_slot = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == MESSAGE_EXTENSION)
                .unwrap_or(false);
            if !is_slot {
                continue;
            }
            if let Err(err) = fs::remove_file(&path) {
                warn!("Failed to delete {}: {}", path.display(), err);
            }
        }
    }

    fn message_path(&self, channel: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", encode_channel_name(channel), MESSAGE_EXTENSION))
    }
}

/// Map a channel identifier to a filesystem-safe file name.
///
/// Alphanumerics and `-`, `_`, `.` pass through; every other byte is
/// escaped as `%XX`, which keeps the mapping injective. The encoding is
/// write-only: nothing ever decodes a file name back into a channel.
pub(crate) fn encode_channel_name(channel: &str) -> String {
    let mut encoded = String::with_capacity(channel.len());
    for &byte in channel.as_bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                encoded.push(byte as char)
            }
            _ => {
                encoded.push('%');
                encoded.push_str(&format!("{:02X}", byte));
            }
        }
    }

    if encoded.len() > MAX_ENCODED_LEN {
        // "%%" can never come out of the escape loop above (every '%'
        // it emits is followed by two hex digits), so digest names
        // cannot collide with escaped ones.
        let digest = Sha256::digest(channel.as_bytes());
        encoded = digest
            .iter()
            .fold(String::from("%%"), |mut acc, byte| {
                acc.push_str(&format!("{:02x}", byte));
                acc
            });
    }

    encoded
}
