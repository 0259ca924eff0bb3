//! Error types for the gossip attestation engine.

use thiserror::Error;

/// Failure to turn wire bytes into an [`Envelope`](super::Envelope).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Bytes are not a valid protobuf message.
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// The opaque application payload is absent (truncated or corrupted input).
    #[error("Envelope is missing its application payload")]
    MissingPayload,
}

/// A payload that does not fit the declared typed-data schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema declares no fields")]
    Empty,

    #[error("Field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("Field '{0}' is reserved for the envelope header")]
    ReservedField(String),

    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Payload must be a JSON object")]
    NotAnObject,

    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Field '{field}' must be of type {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    #[error("Field '{field}' has an invalid value: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Signing and sender recovery errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Outbound payload does not match the declared schema.
    #[error("cannot write and encode the message, check formatting: {0}")]
    Formatting(SchemaError),

    /// Inbound payload cannot be hashed, so no sender can be recovered.
    #[error("Payload does not match the message schema: {0}")]
    Payload(SchemaError),

    #[error("Invalid private key")]
    InvalidKey,

    #[error("Invalid signature format")]
    InvalidSignature,

    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    /// EIP-2: high-S signatures are malleable and never produced by honest signers.
    #[error("Signature S value is not in the lower half of the curve order")]
    MalleableSignature,

    #[error("Failed to recover public key")]
    RecoveryFailed,

    #[error("Signing failed")]
    SigningFailed,
}

/// Content-addressed deployment identifier that cannot be turned into a cost model key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeploymentIdError {
    #[error("Deployment id is not valid base58: {0}")]
    InvalidBase58(String),

    #[error("Deployment id is not a sha2-256 multihash (got {0} bytes)")]
    UnexpectedMultihash(usize),
}

/// A malformed gossip topic string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid topic '{0}'")]
pub struct TopicError(pub String);
