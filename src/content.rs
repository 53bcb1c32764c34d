//! Content-addressed pinning.
//!
//! The relay pins both hops of the trust chain before anything is persisted.
//! Identifiers are derived from content, so pinning the same envelope twice
//! returns the same id and the second pin is a no-op.

use crate::error::{Error, Result};
use crate::message::ContentId;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::debug;

/// Pins arbitrary JSON objects and returns their content id.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Pin `object` under a human-readable `label`.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be stored.
    async fn pin(&self, label: &str, object: &Value) -> Result<ContentId>;
}

/// Rebuild `value` with every object's keys in sorted order.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonical(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Content id of a JSON object: hex SHA-256 of its canonical encoding
/// (object keys sorted, no whitespace).
///
/// # Errors
///
/// Returns an error if the object cannot be serialized.
pub fn content_id(object: &Value) -> Result<ContentId> {
    let bytes = serde_json::to_vec(&canonical(object))?;
    Ok(ContentId::new(hex::encode(Sha256::digest(&bytes))))
}

/// Pins objects as files in a local directory, one file per content id.
#[derive(Debug, Clone)]
pub struct LocalPinStore {
    dir: PathBuf,
}

impl LocalPinStore {
    /// Open (creating if needed) a pin directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path a content id is pinned at.
    #[must_use]
    pub fn path_for(&self, id: &ContentId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Read a pinned object back.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is not pinned or cannot be decoded.
    pub async fn get(&self, id: &ContentId) -> Result<Value> {
        let bytes = tokio::fs::read(self.path_for(id))
            .await
            .map_err(|e| Error::ContentStore(format!("{id} is not pinned: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ContentStore for LocalPinStore {
    async fn pin(&self, label: &str, object: &Value) -> Result<ContentId> {
        let id = content_id(object)?;
        let path = self.path_for(&id);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("{label} already pinned as {id}");
            return Ok(id);
        }

        // Write to a temp name first so a crash never leaves a torn pin.
        let bytes = serde_json::to_vec(&canonical(object))?;
        let tmp = self.dir.join(format!("{id}.tmp"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::ContentStore(format!("Failed to pin {label}: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::ContentStore(format!("Failed to pin {label}: {e}")))?;

        debug!("Pinned {label} as {id}");
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pin_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let store = LocalPinStore::open(dir.path()).unwrap();
        let object = json!({"address": "0xabc", "msg": "{}", "sig": "00", "version": "2"});

        let first = store.pin("snapshot/a", &object).await.unwrap();
        let second = store.pin("snapshot/b", &object).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.get(&first).await.unwrap(), object);
    }

    #[tokio::test]
    async fn test_key_order_does_not_change_id() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(content_id(&a).unwrap(), content_id(&b).unwrap());
    }

    #[tokio::test]
    async fn test_different_content_different_id() {
        let dir = TempDir::new().unwrap();
        let store = LocalPinStore::open(dir.path()).unwrap();
        let a = store.pin("a", &json!({"n": 1})).await.unwrap();
        let b = store.pin("b", &json!({"n": 2})).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_get_unpinned_fails() {
        let dir = TempDir::new().unwrap();
        let store = LocalPinStore::open(dir.path()).unwrap();
        assert!(store.get(&ContentId::new("missing")).await.is_err());
    }
}
