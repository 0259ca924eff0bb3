//! Deployment identifier transforms.
//!
//! Deployments are gossiped as base58 IPFS hashes (`Qm...`), but the indexer
//! management server keys cost models by the bytes32 digest. The multihash
//! prefix `0x1220` (sha2-256, 32 bytes) is replaced with `0x`.

use super::errors::DeploymentIdError;

const SHA2_256_CODE: u8 = 0x12;
const SHA2_256_LEN: u8 = 0x20;

/// `QmWmyo...` → `0x7d5a...` (32 bytes of hex).
pub fn cost_model_key(ipfs_hash: &str) -> Result<String, DeploymentIdError> {
    let bytes = bs58::decode(ipfs_hash)
        .into_vec()
        .map_err(|e| DeploymentIdError::InvalidBase58(e.to_string()))?;

    match bytes.as_slice() {
        [SHA2_256_CODE, SHA2_256_LEN, digest @ ..] if digest.len() == SHA2_256_LEN as usize => {
            Ok(format!("0x{}", hex::encode(digest)))
        }
        _ => Err(DeploymentIdError::UnexpectedMultihash(bytes.len())),
    }
}
