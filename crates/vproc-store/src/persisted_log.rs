use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use vproc_domain::RecordId;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Queued in the Reporter but not yet acknowledged by the chain.
    Pending,
    /// Chain client returned success; safe to drop on compaction.
    Acknowledged,
}

#[derive(Serialize, Deserialize)]
struct LogLine {
    record_id: RecordId,
    payload: Vec<u8>,
    state: RecordState,
}

/// Crash-safe append-only log of pending usage records (spec §6,
/// "Persisted state layout"). Every record the Reporter Queue accepts is
/// appended here before being handed to the chain client; on restart
/// [`PersistedLog::replay`] returns everything not yet acknowledged so no
/// record is lost to a process crash mid-submission.
///
/// Backed by a single JSON-lines file. Acknowledgements are appended, not
/// rewritten in place, so a crash mid-write never corrupts a prior entry;
/// [`PersistedLog::compact`] rewrites the file to drop acknowledged lines
/// once it grows past a useful size.
pub struct PersistedLog {
    path: PathBuf,
    writer: Mutex<File>,
}

impl PersistedLog {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let writer = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(PersistedLog { path, writer: Mutex::new(writer) })
    }

    pub async fn append(&self, record_id: &RecordId, payload: &[u8]) -> Result<(), StoreError> {
        self.append_line(&LogLine { record_id: record_id.clone(), payload: payload.to_vec(), state: RecordState::Pending }).await
    }

    pub async fn mark_acknowledged(&self, record_id: &RecordId) -> Result<(), StoreError> {
        self.append_line(&LogLine { record_id: record_id.clone(), payload: Vec::new(), state: RecordState::Acknowledged }).await
    }

    async fn append_line(&self, line: &LogLine) -> Result<(), StoreError> {
        let mut encoded = serde_json::to_vec(line)?;
        encoded.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Returns every record whose latest entry is still `Pending`, in the
    /// order they were first appended.
    pub async fn replay(&self) -> Result<Vec<(RecordId, Vec<u8>)>, StoreError> {
        let file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file).lines();
        let mut order: Vec<RecordId> = Vec::new();
        let mut latest: HashMap<RecordId, LogLine> = HashMap::new();
        while let Some(raw) = reader.next_line().await? {
            if raw.trim().is_empty() {
                continue;
            }
            let line: LogLine = serde_json::from_str(&raw)?;
            if !latest.contains_key(&line.record_id) {
                order.push(line.record_id.clone());
            }
            latest.insert(line.record_id.clone(), line);
        }
        Ok(order
            .into_iter()
            .filter_map(|id| {
                let line = latest.remove(&id)?;
                match line.state {
                    RecordState::Pending => Some((id, line.payload)),
                    RecordState::Acknowledged => None,
                }
            })
            .collect())
    }

    /// Rewrites the log file keeping only records still pending.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let pending = self.replay().await?;
        let mut writer = self.writer.lock().await;
        let tmp_path = self.path.with_extension("compact.tmp");
        let mut tmp = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path).await?;
        for (record_id, payload) in &pending {
            let mut encoded = serde_json::to_vec(&LogLine {
                record_id: record_id.clone(),
                payload: payload.clone(),
                state: RecordState::Pending,
            })?;
            encoded.push(b'\n');
            tmp.write_all(&encoded).await?;
        }
        tmp.flush().await?;
        fs::rename(&tmp_path, &self.path).await?;
        *writer = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_returns_pending_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistedLog::open(dir.path().join("pending.jsonl")).await.unwrap();
        log.append(&RecordId::new("r1"), b"one").await.unwrap();
        log.append(&RecordId::new("r2"), b"two").await.unwrap();

        let pending = log.replay().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].0.as_str(), "r1");
        assert_eq!(pending[1].0.as_str(), "r2");
    }

    #[tokio::test]
    async fn acknowledged_records_drop_out_of_replay() {
        let dir = tempfile::tempdir().unwrap();
        let log = PersistedLog::open(dir.path().join("pending.jsonl")).await.unwrap();
        log.append(&RecordId::new("r1"), b"one").await.unwrap();
        log.append(&RecordId::new("r2"), b"two").await.unwrap();
        log.mark_acknowledged(&RecordId::new("r1")).await.unwrap();

        let pending = log.replay().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.as_str(), "r2");
    }

    #[tokio::test]
    async fn reopening_after_restart_sees_prior_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.jsonl");
        {
            let log = PersistedLog::open(&path).await.unwrap();
            log.append(&RecordId::new("r1"), b"one").await.unwrap();
        }
        let reopened = PersistedLog::open(&path).await.unwrap();
        let pending = reopened.replay().await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn compact_drops_acknowledged_entries_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.jsonl");
        let log = PersistedLog::open(&path).await.unwrap();
        log.append(&RecordId::new("r1"), b"one").await.unwrap();
        log.append(&RecordId::new("r2"), b"two").await.unwrap();
        log.mark_acknowledged(&RecordId::new("r1")).await.unwrap();
        log.compact().await.unwrap();

        let reopened = PersistedLog::open(&path).await.unwrap();
        let pending = reopened.replay().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.as_str(), "r2");
    }
}
