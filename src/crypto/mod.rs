//! ML-DSA-65 signatures for client envelopes and relay counter-signatures.
//!
//! Clients and the relay use one scheme:
//!
//! - the signature string is `hex(public_key || signature)`
//! - the address is `0x` followed by the hex of the last 20 bytes of
//!   `SHA-256(public_key)`
//! - every signature is bound to [`SIGNING_CONTEXT`]
//!
//! This lets anyone holding a pinned envelope check it without a key
//! registry: the embedded public key must hash to the claimed address and the
//! signature must verify under it.

mod signer;
mod verifier;

pub use signer::RelaySigner;
pub use verifier::{verify_signature, MlDsaVerifier, Verifier};

use crate::error::{Error, Result};
use saorsa_pqc::api::sig::{MlDsaPublicKey, MlDsaSignature, MlDsaVariant};
use sha2::{Digest, Sha256};

/// Signing context for domain separation.
pub const SIGNING_CONTEXT: &[u8] = b"snapshot-relay-message-v1";

/// ML-DSA-65 signature size in bytes.
pub const SIGNATURE_SIZE: usize = 3309;

/// ML-DSA-65 public key size in bytes.
pub const PUBLIC_KEY_SIZE: usize = 1952;

/// ML-DSA-65 secret key size in bytes.
pub const SECRET_KEY_SIZE: usize = 4032;

/// Address bytes taken from the public key hash.
const ADDRESS_LEN: usize = 20;

/// Derive the address for raw public key bytes.
#[must_use]
pub fn address_from_public_key(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    format!("0x{}", hex::encode(&digest[digest.len() - ADDRESS_LEN..]))
}

/// Encode a public key and signature into the wire signature string.
#[must_use]
pub fn encode_signature(public_key: &[u8], signature: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(public_key.len() + signature.len());
    bytes.extend_from_slice(public_key);
    bytes.extend_from_slice(signature);
    hex::encode(bytes)
}

/// Split a wire signature string into its public key and signature.
///
/// # Errors
///
/// Returns an error if the string is not hex, has the wrong length, or either
/// half fails to parse.
pub fn decode_signature(encoded: &str) -> Result<(Vec<u8>, MlDsaPublicKey, MlDsaSignature)> {
    let bytes = hex::decode(encoded.trim_start_matches("0x"))
        .map_err(|e| Error::Crypto(format!("Signature is not hex: {e}")))?;

    if bytes.len() != PUBLIC_KEY_SIZE + SIGNATURE_SIZE {
        return Err(Error::Crypto(format!(
            "Invalid signature size: expected {}, got {}",
            PUBLIC_KEY_SIZE + SIGNATURE_SIZE,
            bytes.len()
        )));
    }

    let (pk_bytes, sig_bytes) = bytes.split_at(PUBLIC_KEY_SIZE);
    let public_key = MlDsaPublicKey::from_bytes(MlDsaVariant::MlDsa65, pk_bytes)
        .map_err(|e| Error::Crypto(format!("Invalid public key: {e}")))?;
    let signature = MlDsaSignature::from_bytes(MlDsaVariant::MlDsa65, sig_bytes)
        .map_err(|e| Error::Crypto(format!("Invalid signature format: {e}")))?;

    Ok((pk_bytes.to_vec(), public_key, signature))
}
