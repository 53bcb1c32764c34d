//! Signature verification for submitted envelopes.

use super::{address_from_public_key, decode_signature, SIGNING_CONTEXT};
use crate::error::{Error, Result};
use async_trait::async_trait;
use saorsa_pqc::api::sig::ml_dsa_65;
use tracing::debug;

/// Checks that a signature over a message was produced by an address.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Returns `true` if `signature` is valid for `address` over `message`.
    async fn verify(&self, address: &str, message: &[u8], signature: &str) -> bool;
}

/// Verify a wire signature string against an address.
///
/// # Errors
///
/// Returns an error if:
/// - The signature string is malformed
/// - The embedded public key does not belong to `address`
/// - The signature verification fails
pub fn verify_signature(address: &str, message: &[u8], signature: &str) -> Result<()> {
    let (pk_bytes, public_key, sig) = decode_signature(signature)?;

    let derived = address_from_public_key(&pk_bytes);
    if !derived.eq_ignore_ascii_case(address) {
        return Err(Error::Crypto(format!(
            "Public key belongs to {derived}, not {address}"
        )));
    }

    let dsa = ml_dsa_65();
    let valid = dsa
        .verify_with_context(&public_key, message, &sig, SIGNING_CONTEXT)
        .map_err(|e| Error::Crypto(format!("Signature verification error: {e}")))?;

    if valid {
        Ok(())
    } else {
        Err(Error::Crypto(
            "Signature verification failed: invalid signature".to_string(),
        ))
    }
}

/// [`Verifier`] backed by ML-DSA-65.
#[derive(Debug, Clone, Copy, Default)]
pub struct MlDsaVerifier;

#[async_trait]
impl Verifier for MlDsaVerifier {
    async fn verify(&self, address: &str, message: &[u8], signature: &str) -> bool {
        match verify_signature(address, message, signature) {
            Ok(()) => true,
            Err(e) => {
                debug!("Signature check failed for {address}: {e}");
                false
            }
        }
    }
}
