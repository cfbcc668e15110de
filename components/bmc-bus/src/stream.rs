use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bmc_core::SubjectPattern;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::BusError;
use crate::message::StreamRecord;
use crate::retention::Retention;

/// A single named, append-only, file-backed stream scoped to a subject set
/// (spec.md §3 "Stream"). Writes are length-prefixed JSON frames so a
/// reaper can scan and truncate without needing a delimiter-escaping
/// scheme.
pub struct Stream {
    pub name: String,
    subjects: RwLock<Vec<SubjectPattern>>,
    retention: RwLock<Retention>,
    path: PathBuf,
    next_seq: AtomicU64,
    write_lock: Mutex<()>,
}

impl Stream {
    pub async fn create(
        dir: &std::path::Path,
        name: &str,
        subjects: Vec<SubjectPattern>,
        retention: Retention,
    ) -> Result<Arc<Self>, BusError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| BusError::Stream(format!("create stream dir: {e}")))?;
        let path = dir.join(format!("{name}.log"));
        if !path.exists() {
            fs::File::create(&path)
                .await
                .map_err(|e| BusError::Stream(format!("create stream file: {e}")))?;
        }
        let next_seq = Self::last_sequence(&path).await.unwrap_or(0) + 1;
        Ok(Arc::new(Stream {
            name: name.to_owned(),
            subjects: RwLock::new(subjects),
            retention: RwLock::new(retention),
            path,
            next_seq: AtomicU64::new(next_seq),
            write_lock: Mutex::new(()),
        }))
    }

    /// Update subjects/retention in place; idempotent with `create`.
    pub fn reconfigure(&self, subjects: Vec<SubjectPattern>, retention: Retention) {
        *self.subjects.write() = subjects;
        *self.retention.write() = retention;
    }

    pub fn matches(&self, subject: &bmc_core::Subject) -> bool {
        self.subjects.read().iter().any(|p| p.matches(subject))
    }

    pub async fn append(
        &self,
        subject: &str,
        payload: Vec<u8>,
        headers: std::collections::HashMap<String, String>,
    ) -> Result<u64, BusError> {
        let _guard = self.write_lock.lock().await;
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = StreamRecord {
            sequence: seq,
            subject: subject.to_owned(),
            payload,
            headers,
            timestamp: Utc::now(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| BusError::Stream(format!("encode record: {e}")))?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| BusError::Stream(format!("open stream file: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| BusError::Stream(format!("write stream file: {e}")))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| BusError::Stream(format!("write stream file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| BusError::Stream(format!("flush stream file: {e}")))?;
        Ok(seq)
    }

    pub async fn read_all(&self) -> Result<Vec<StreamRecord>, BusError> {
        let contents = fs::read_to_string(&self.path)
            .await
            .map_err(|e| BusError::Stream(format!("read stream file: {e}")))?;
        let mut out = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StreamRecord>(line) {
                Ok(r) => out.push(r),
                Err(e) => warn!(stream = %self.name, "skipping corrupt stream record: {e}"),
            }
        }
        Ok(out)
    }

    async fn last_sequence(path: &std::path::Path) -> Option<u64> {
        let contents = fs::read_to_string(path).await.ok()?;
        contents
            .lines()
            .rev()
            .find_map(|l| serde_json::from_str::<StreamRecord>(l).ok())
            .map(|r| r.sequence)
    }

    /// Enforce `max_age` / `max_bytes` / `max_messages` by rewriting the
    /// file with only the records that remain in bounds. Runs on a
    /// background interval (`streams::reap_loop`), never inline with a
    /// publish, so retention enforcement never adds latency to the hot
    /// path.
    pub async fn enforce_retention(&self) -> Result<(), BusError> {
        let retention = *self.retention.read();
        if retention.max_age.is_none() && retention.max_bytes.is_none() && retention.max_messages.is_none()
        {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let records = self.read_all_locked().await?;
        let mut kept: Vec<StreamRecord> = records;

        if let Some(max_messages) = retention.max_messages {
            let max_messages = max_messages as usize;
            if kept.len() > max_messages {
                let drop = kept.len() - max_messages;
                kept.drain(0..drop);
            }
        }
        if let Some(max_age) = retention.max_age {
            let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
            kept.retain(|r| r.timestamp >= cutoff);
        }
        if let Some(max_bytes) = retention.max_bytes {
            let mut total: u64 = 0;
            let mut start = kept.len();
            for (i, r) in kept.iter().enumerate().rev() {
                total += r.payload.len() as u64;
                if total > max_bytes {
                    start = i + 1;
                    break;
                }
                start = i;
            }
            kept = kept.split_off(start);
        }

        self.rewrite_locked(&kept).await
    }

    async fn read_all_locked(&self) -> Result<Vec<StreamRecord>, BusError> {
        let contents = fs::read_to_string(&self.path)
            .await
            .map_err(|e| BusError::Stream(format!("read stream file: {e}")))?;
        Ok(contents
            .lines()
            .filter_map(|l| serde_json::from_str::<StreamRecord>(l).ok())
            .collect())
    }

    async fn rewrite_locked(&self, records: &[StreamRecord]) -> Result<(), BusError> {
        let tmp_path = self.path.with_extension("log.tmp");
        let mut tmp = fs::File::create(&tmp_path)
            .await
            .map_err(|e| BusError::Stream(format!("create tmp stream file: {e}")))?;
        for r in records {
            let line = serde_json::to_string(r)
                .map_err(|e| BusError::Stream(format!("encode record: {e}")))?;
            tmp.write_all(line.as_bytes())
                .await
                .map_err(|e| BusError::Stream(format!("write tmp stream file: {e}")))?;
            tmp.write_all(b"\n")
                .await
                .map_err(|e| BusError::Stream(format!("write tmp stream file: {e}")))?;
        }
        tmp.flush()
            .await
            .map_err(|e| BusError::Stream(format!("flush tmp stream file: {e}")))?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| BusError::Stream(format!("rename tmp stream file: {e}")))?;
        debug!(stream = %self.name, kept = records.len(), "enforced stream retention");
        Ok(())
    }
}
