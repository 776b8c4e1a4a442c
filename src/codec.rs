//! Message payload encoding.
//!
//! The store only ever sees opaque bytes; this module is the seam
//! where typed messages are converted to and from them. The concrete
//! codec is injected into the facade, with [`JsonCodec`] shipped as
//! the default for any serde-serializable payload.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Codec error types
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Other(String),
}

/// Converts messages of type `M` to and from stored bytes.
///
/// Implementations must be usable from both arbitrary caller threads
/// and the signal delivery context, hence `Send + Sync`.
pub trait MessageCodec<M>: Send + Sync {
    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<M, CodecError>;
}

/// JSON codec for any `Serialize + DeserializeOwned` message type.
pub struct JsonCodec<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> JsonCodec<M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> Default for JsonCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MessageCodec<M> for JsonCodec<M>
where
    M: Serialize + DeserializeOwned,
{
    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<M, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
