//! Append-only durable backend.
//!
//! Records are appended to a JSON-lines log and fsync'd one at a time. On
//! open the log is replayed into an in-memory index that serves queries. The
//! log is never rewritten: records are immutable once accepted.

use super::RecordBackend;
use crate::error::{Error, Result};
use crate::message::{ContentId, RelayedRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Log file name inside the store directory.
pub const LOG_FILE: &str = "records.jsonl";

#[derive(Default)]
struct RecordIndex {
    records: HashMap<ContentId, Arc<RelayedRecord>>,
    /// Acceptance order.
    order: Vec<ContentId>,
    proposals: HashMap<String, Vec<ContentId>>,
    votes: HashMap<(String, ContentId), Vec<ContentId>>,
}

impl RecordIndex {
    fn contains(&self, id: &ContentId) -> bool {
        self.records.contains_key(id)
    }

    fn insert(&mut self, record: RelayedRecord) {
        let id = record.author_content_id.clone();
        if self.contains(&id) {
            return;
        }

        if record.proposal().is_some() {
            self.proposals
                .entry(record.token().to_string())
                .or_default()
                .push(id.clone());
        } else if let Some(vote) = record.vote() {
            self.votes
                .entry((record.token().to_string(), vote.proposal.clone()))
                .or_default()
                .push(id.clone());
        }

        self.order.push(id.clone());
        self.records.insert(id, Arc::new(record));
    }

    fn resolve(&self, ids: Option<&Vec<ContentId>>) -> Vec<Arc<RelayedRecord>> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.records.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

/// Open log file and the length it held after its last committed record.
struct LogFile {
    file: File,
    committed: u64,
}

impl LogFile {
    /// Append one newline-terminated record and sync it.
    ///
    /// Bytes past `committed` are left over from an append that failed part
    /// way. They are cut off first so the record starts on its own line.
    async fn append(&mut self, line: &[u8], path: &Path) -> std::io::Result<()> {
        let len = self.file.metadata().await?.len();
        if len != self.committed {
            warn!(
                "Discarding {} stray bytes at the end of {}",
                len.saturating_sub(self.committed),
                path.display()
            );
            self.file.set_len(self.committed).await?;
        }
        self.file.write_all(line).await?;
        self.file.sync_data().await?;
        self.committed += line.len() as u64;
        Ok(())
    }
}

/// File-backed, append-only record store.
pub struct LogStore {
    path: PathBuf,
    file: Mutex<LogFile>,
    index: RwLock<RecordIndex>,
}

impl LogStore {
    /// Open (creating if needed) the log in `dir` and replay it.
    ///
    /// A trailing line that fails to decode (a torn write from a crash) is
    /// skipped with a warning; the rest of the log is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or log file cannot be opened.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(LOG_FILE);

        let mut index = RecordIndex::default();
        let mut torn_tail = false;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                torn_tail = !content.is_empty() && !content.ends_with('\n');
                for (line_no, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<RelayedRecord>(line) {
                        Ok(record) => index.insert(record),
                        Err(e) => warn!(
                            "Skipping unreadable record at {}:{}: {e}",
                            path.display(),
                            line_no + 1
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        // Terminate a torn line so the next append starts on its own line.
        if torn_tail {
            file.write_all(b"\n").await?;
            file.sync_data().await?;
        }
        let committed = file.metadata().await?.len();

        info!(
            "Opened record log {} ({} records)",
            path.display(),
            index.order.len()
        );

        Ok(Self {
            path,
            file: Mutex::new(LogFile { file, committed }),
            index: RwLock::new(index),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().order.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordBackend for LogStore {
    fn name(&self) -> &'static str {
        "durable"
    }

    async fn put(&self, record: &RelayedRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        // Serialize appends so concurrent writers never interleave lines.
        let mut file = self.file.lock().await;
        if self.index.read().contains(&record.author_content_id) {
            return Ok(());
        }

        if let Err(e) = file.append(&line, &self.path).await {
            // Best effort: the next append trims whatever is left.
            let committed = file.committed;
            if let Err(trim) = file.file.set_len(committed).await {
                warn!("Could not trim {} after failed append: {trim}", self.path.display());
            }
            return Err(Error::Storage(format!(
                "Append to {} failed: {e}",
                self.path.display()
            )));
        }

        self.index.write().insert(record.clone());
        Ok(())
    }

    async fn proposals(&self, token: &str) -> Result<Vec<Arc<RelayedRecord>>> {
        let index = self.index.read();
        Ok(super::most_recent_first(
            index.resolve(index.proposals.get(token)),
        ))
    }

    async fn votes(&self, token: &str, proposal: &ContentId) -> Result<Vec<Arc<RelayedRecord>>> {
        let index = self.index.read();
        let key = (token.to_string(), proposal.clone());
        Ok(index.resolve(index.votes.get(&key)))
    }

    async fn proposal(&self, token: &str, id: &ContentId) -> Result<Option<Arc<RelayedRecord>>> {
        Ok(self
            .index
            .read()
            .records
            .get(id)
            .filter(|record| record.token() == token && record.proposal().is_some())
            .cloned())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Arc<RelayedRecord>>> {
        let index = self.index.read();
        Ok(index
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| index.records.get(id).cloned())
            .collect())
    }
}
