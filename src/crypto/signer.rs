//! The relay's custodial signing key.

use super::{
    address_from_public_key, encode_signature, verify_signature, PUBLIC_KEY_SIZE,
    SECRET_KEY_SIZE, SIGNING_CONTEXT,
};
use crate::error::{Error, Result};
use crate::message::ContentId;
use saorsa_pqc::api::sig::{ml_dsa_65, MlDsaSecretKey, MlDsaVariant};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Holds the relay key for the lifetime of the process.
///
/// Construct once at startup and share by `Arc`. The key file holds
/// `hex(secret_key || public_key)`, as written by `snapshot-relay-keygen`.
pub struct RelaySigner {
    secret_key: MlDsaSecretKey,
    public_key: Vec<u8>,
    address: String,
}

impl RelaySigner {
    /// Generate a fresh key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> Result<Self> {
        let (public_key, secret_key) = ml_dsa_65()
            .generate_keypair()
            .map_err(|e| Error::Crypto(format!("Key generation failed: {e}")))?;
        let public_key = public_key.to_bytes();
        let address = address_from_public_key(&public_key);
        Ok(Self {
            secret_key,
            public_key,
            address,
        })
    }

    /// Load the key from its hex encoding.
    ///
    /// The pair is checked by signing and verifying a test message, so a
    /// secret that does not match its public key fails here rather than on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is missing, malformed, or inconsistent.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(Error::Config("Relayer key is empty".to_string()));
        }

        let bytes = hex::decode(secret)
            .map_err(|e| Error::Config(format!("Relayer key is not hex: {e}")))?;
        if bytes.len() != SECRET_KEY_SIZE + PUBLIC_KEY_SIZE {
            return Err(Error::Config(format!(
                "Invalid relayer key size: expected {}, got {}",
                SECRET_KEY_SIZE + PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }

        let (sk_bytes, pk_bytes) = bytes.split_at(SECRET_KEY_SIZE);
        let secret_key = MlDsaSecretKey::from_bytes(MlDsaVariant::MlDsa65, sk_bytes)
            .map_err(|e| Error::Crypto(format!("Invalid relayer secret key: {e}")))?;

        let signer = Self {
            secret_key,
            public_key: pk_bytes.to_vec(),
            address: address_from_public_key(pk_bytes),
        };

        let sample = signer.sign_message(b"relayer key self-check")?;
        verify_signature(&signer.address, b"relayer key self-check", &sample)
            .map_err(|e| Error::Config(format!("Relayer key pair is inconsistent: {e}")))?;

        Ok(signer)
    }

    /// Load the key from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds an invalid key.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Cannot read relayer key '{}': {e}",
                path.display()
            ))
        })?;
        let signer = Self::from_hex(&content)?;
        info!("Loaded relayer key {} from {}", signer.address, path.display());
        Ok(signer)
    }

    /// Hex encoding accepted by [`RelaySigner::from_hex`].
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut bytes = self.secret_key.to_bytes();
        bytes.extend_from_slice(&self.public_key);
        hex::encode(bytes)
    }

    /// The relayer address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign an author content id.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, id: &ContentId) -> Result<String> {
        self.sign_message(id.as_str().as_bytes())
    }

    /// Sign arbitrary bytes, producing a wire signature string.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_message(&self, message: &[u8]) -> Result<String> {
        let signature = ml_dsa_65()
            .sign_with_context(&self.secret_key, message, SIGNING_CONTEXT)
            .map_err(|e| Error::Crypto(format!("Signing failed: {e}")))?;
        Ok(encode_signature(&self.public_key, &signature.to_bytes()))
    }
}

impl fmt::Debug for RelaySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_signature_verifies_as_relayer() {
        let signer = RelaySigner::generate().unwrap();
        let id = ContentId::new("a1b2c3");
        let signature = signer.sign(&id).unwrap();
        verify_signature(signer.address(), id.as_str().as_bytes(), &signature).unwrap();
    }

    #[test]
    fn test_hex_round_trip_keeps_address() {
        let signer = RelaySigner::generate().unwrap();
        let loaded = RelaySigner::from_hex(&signer.to_hex()).unwrap();
        assert_eq!(loaded.address(), signer.address());
    }

    #[test]
    fn test_missing_secret_fails_fast() {
        let err = RelaySigner::from_hex("  ").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_malformed_secret_fails_fast() {
        assert!(RelaySigner::from_hex("zz").is_err());
        let err = RelaySigner::from_hex(&hex::encode([1u8; 64])).unwrap_err();
        assert!(err.to_string().contains("Invalid relayer key size"));
    }

    #[test]
    fn test_mismatched_pair_fails_fast() {
        let a = RelaySigner::generate().unwrap();
        let b = RelaySigner::generate().unwrap();
        let mut bytes = a.secret_key.to_bytes();
        bytes.extend_from_slice(&b.public_key);
        assert!(RelaySigner::from_hex(&hex::encode(bytes)).is_err());
    }

    #[test]
    fn test_from_file() {
        let signer = RelaySigner::generate().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", signer.to_hex()).unwrap();

        let loaded = RelaySigner::from_file(file.path()).unwrap();
        assert_eq!(loaded.address(), signer.address());
        assert!(RelaySigner::from_file(Path::new("/nonexistent/relayer.key")).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = RelaySigner::generate().unwrap();
        let text = format!("{signer:?}");
        assert!(text.contains(signer.address()));
        assert!(!text.contains(&signer.to_hex()[..64]));
    }
}
