//! # Envelope Codec
//!
//! Wire schema of a gossip message (protobuf, message name `GraphcastMessage`).
//!
//! ```text
//! field  tag  type    meaning
//! -----  ---  ------  ------------------------------------------
//! radio_payload  1  string  opaque JSON application payload
//! nonce          2  int64   sender wall clock in ms since epoch
//! block_number   3  int64   block the report is anchored to
//! block_hash     4  string  hash of that block
//! signature      5  string  0x-hex r || s || v over the typed data
//! ```
//!
//! Nonces and block numbers are non-negative, so the unsigned varint
//! encoding below is byte-identical to the signed one.

use prost::Message;

use super::entities::BlockPointer;
use super::errors::DecodeError;

/// A signed gossip message as carried on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(string, tag = "1")]
    pub radio_payload: String,
    #[prost(uint64, tag = "2")]
    pub nonce: u64,
    #[prost(uint64, tag = "3")]
    pub block_number: u64,
    #[prost(string, tag = "4")]
    pub block_hash: String,
    #[prost(string, tag = "5")]
    pub signature: String,
}

impl Envelope {
    pub fn new(
        radio_payload: impl Into<String>,
        nonce: u64,
        block: &BlockPointer,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            radio_payload: radio_payload.into(),
            nonce,
            block_number: block.number,
            block_hash: block.hash.clone(),
            signature: signature.into(),
        }
    }

    /// Block the sender anchored this message to.
    pub fn block(&self) -> BlockPointer {
        BlockPointer::new(self.block_number, self.block_hash.clone())
    }

    /// Serialize to protobuf bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Parse protobuf bytes.
    ///
    /// An empty payload is treated as truncated input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let envelope =
            Envelope::decode(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        if envelope.radio_payload.is_empty() {
            return Err(DecodeError::MissingPayload);
        }
        Ok(envelope)
    }
}

/// Encode a report into wire bytes.
pub fn encode(payload: &str, nonce: u64, block: &BlockPointer, signature: &str) -> Vec<u8> {
    Envelope::new(payload, nonce, block, signature).to_bytes()
}

/// Decode wire bytes into an [`Envelope`].
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    Envelope::from_bytes(bytes)
}
