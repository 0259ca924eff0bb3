//! # Identity & Signature Layer
//!
//! Signs typed-data digests with the operator key and recovers the sender of
//! inbound reports (secp256k1 ECDSA, Ethereum address derivation).
//!
//! ## Security Notes
//!
//! - **Malleability (EIP-2)**: signatures with a high S value are rejected on
//!   recovery and never produced when signing
//! - Recovery IDs are accepted in both raw (0/1) and Ethereum (27/28) form
//! - Signatures travel as `0x` hex of `r || s || v` with v in {27, 28}

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde_json::Value;
use sha3::{Digest, Keccak256};

use super::entities::{format_address, Address, BlockPointer, Hash};
use super::errors::{IdentityError, SchemaError};
use super::typed_data::TypedSchema;

/// Signature split into its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl RecoverableSignature {
    /// `0x`-prefixed hex of the 65-byte `r || s || v` form.
    pub fn to_hex(&self) -> String {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        format!("0x{}", hex::encode(bytes))
    }

    pub fn from_hex(text: &str) -> Result<Self, IdentityError> {
        let stripped = text.strip_prefix("0x").unwrap_or(text);
        let bytes = hex::decode(stripped).map_err(|_| IdentityError::InvalidSignature)?;
        if bytes.len() != 65 {
            return Err(IdentityError::InvalidSignature);
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }
}

/// The operator's local signing key.
#[derive(Clone)]
pub struct LocalWallet {
    signing_key: SigningKey,
    address: Address,
}

impl LocalWallet {
    pub fn new(signing_key: SigningKey) -> Self {
        let address = address_from_pubkey(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Parse a hex private key, with or without `0x`.
    pub fn from_hex_key(key: &str) -> Result<Self, IdentityError> {
        let stripped = key.trim().strip_prefix("0x").unwrap_or(key.trim());
        let bytes = hex::decode(stripped).map_err(|_| IdentityError::InvalidKey)?;
        let signing_key = SigningKey::from_slice(&bytes).map_err(|_| IdentityError::InvalidKey)?;
        Ok(Self::new(signing_key))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Lower-case hex address.
    pub fn address_string(&self) -> String {
        format_address(&self.address)
    }

    /// Sign a prehashed digest, normalising S to the lower half.
    pub fn sign_digest(&self, digest: &Hash) -> Result<RecoverableSignature, IdentityError> {
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| IdentityError::SigningFailed)?;

        // Negating S flips the parity of the recovered R point
        let (sig, recid) = match sig.normalize_s() {
            Some(normalized) => {
                let flipped = RecoveryId::from_byte(recid.to_byte() ^ 1)
                    .ok_or(IdentityError::SigningFailed)?;
                (normalized, flipped)
            }
            None => (sig, recid),
        };

        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(RecoverableSignature {
            r,
            s,
            v: recid.to_byte() + 27,
        })
    }
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address_string())
            .finish_non_exhaustive()
    }
}

/// Sign an application payload and its envelope header.
///
/// Returns the `0x` hex signature. Any mismatch between the payload and the
/// schema surfaces as [`IdentityError::Formatting`].
pub fn sign(
    wallet: &LocalWallet,
    schema: &TypedSchema,
    payload: &str,
    nonce: u64,
    block: &BlockPointer,
) -> Result<String, IdentityError> {
    let value = parse_payload(payload).map_err(IdentityError::Formatting)?;
    let digest = schema
        .signing_digest(&value, nonce, block)
        .map_err(IdentityError::Formatting)?;
    Ok(wallet.sign_digest(&digest)?.to_hex())
}

/// Recover the lower-case address that signed a payload and envelope header.
///
/// A schema or domain mismatch does not fail here; it recovers some other
/// address, which the validity filter then refuses.
pub fn recover_sender(
    schema: &TypedSchema,
    payload: &str,
    nonce: u64,
    block: &BlockPointer,
    signature: &str,
) -> Result<String, IdentityError> {
    let value = parse_payload(payload).map_err(IdentityError::Payload)?;
    let digest = schema
        .signing_digest(&value, nonce, block)
        .map_err(IdentityError::Payload)?;
    let signature = RecoverableSignature::from_hex(signature)?;
    let address = recover_address(&digest, &signature)?;
    Ok(format_address(&address))
}

/// Recover the signer's Ethereum address from a signature.
pub fn recover_address(
    message_hash: &Hash,
    signature: &RecoverableSignature,
) -> Result<Address, IdentityError> {
    let recovery_id = parse_recovery_id(signature.v)?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&signature.r);
    sig_bytes[32..].copy_from_slice(&signature.s);
    let sig = Signature::from_slice(&sig_bytes).map_err(|_| IdentityError::InvalidSignature)?;

    if sig.normalize_s().is_some() {
        return Err(IdentityError::MalleableSignature);
    }

    let recovered_key = VerifyingKey::recover_from_prehash(message_hash, &sig, recovery_id)
        .map_err(|_| IdentityError::RecoveryFailed)?;

    Ok(address_from_pubkey(&recovered_key))
}

/// Keccak256 hash function.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Derive Ethereum address from public key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let pubkey_bytes = public_key.to_encoded_point(false);
    let pubkey_slice = pubkey_bytes.as_bytes();

    // Keccak256 hash of public key (without 0x04 prefix)
    let hash = keccak256(&pubkey_slice[1..]);

    // Take last 20 bytes as address
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Parse recovery ID from v value.
fn parse_recovery_id(v: u8) -> Result<RecoveryId, IdentityError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(IdentityError::InvalidRecoveryId(v)),
    };
    RecoveryId::from_byte(id).ok_or(IdentityError::InvalidRecoveryId(v))
}

fn parse_payload(payload: &str) -> Result<Value, SchemaError> {
    serde_json::from_str(payload).map_err(|e| SchemaError::InvalidJson(e.to_string()))
}
