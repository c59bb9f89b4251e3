//! Crash-safe progress store: an append-only NDJSON record log plus a small JSON checkpoint.
//!
//! Layout under the output directory:
//!   records.ndjson   one `Record` per line, appended and synced page by page
//!   checkpoint.json  completed/skipped tasks and admitted identity keys, replaced atomically

use crate::ndjson::{NdjsonAppender, NdjsonReader};
use crate::record::{IdentityKey, Record};
use crate::task::SearchTask;
use crate::util::write_json_atomic;
use ahash::AHashSet;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const LOG_FILE: &str = "records.ndjson";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
const CHECKPOINT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTask {
    pub task: SearchTask,
    pub reason: String,
}

/// Completed tasks and admitted keys. Skipped tasks are kept for reporting
/// only; they are not "done" and later runs retry them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub completed: Vec<SearchTask>,
    #[serde(default)]
    pub skipped: Vec<SkippedTask>,
    #[serde(default)]
    pub seen_keys: Vec<IdentityKey>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ProgressState {
    pub fn is_completed(&self, task: &SearchTask) -> bool {
        self.completed.contains(task)
    }

    pub fn mark_completed(&mut self, task: &SearchTask) {
        self.skipped.retain(|s| s.task != *task);
        if !self.is_completed(task) {
            self.completed.push(task.clone());
        }
    }

    pub fn mark_skipped(&mut self, task: &SearchTask, reason: impl Into<String>) {
        self.skipped.retain(|s| s.task != *task);
        self.skipped.push(SkippedTask { task: task.clone(), reason: reason.into() });
    }
}

pub struct ProgressStore {
    dir: PathBuf,
    log_path: PathBuf,
    checkpoint_path: PathBuf,
    appender: Option<NdjsonAppender>,
    read_buf_bytes: usize,
    write_buf_bytes: usize,
}

impl ProgressStore {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            log_path: dir.join(LOG_FILE),
            checkpoint_path: dir.join(CHECKPOINT_FILE),
            appender: None,
            read_buf_bytes: 256 * 1024,
            write_buf_bytes: 64 * 1024,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// True if a previous run left a log or a checkpoint here.
    pub fn has_prior_state(&self) -> bool {
        self.log_path.exists() || self.checkpoint_path.exists()
    }

    /// Reconstruct prior records and progress. A missing store yields empty state.
    ///
    /// Records merge first-seen-wins by identity key, so logs concatenated from
    /// different runs load cleanly. The returned `seen_keys` is the union of the
    /// checkpoint's keys and every logged record's key.
    pub fn load(&self) -> Result<(Vec<Record>, ProgressState)> {
        let mut state = if self.checkpoint_path.exists() {
            let raw = fs::read_to_string(&self.checkpoint_path)
                .with_context(|| format!("read {}", self.checkpoint_path.display()))?;
            serde_json::from_str::<ProgressState>(&raw)
                .with_context(|| format!("parse {}", self.checkpoint_path.display()))?
        } else {
            ProgressState::default()
        };

        let records = self.read_log()?;

        let mut keys: AHashSet<IdentityKey> = state.seen_keys.drain(..).collect();
        keys.extend(records.iter().filter_map(Record::identity_key));
        let mut keys: Vec<IdentityKey> = keys.into_iter().collect();
        keys.sort_unstable();
        state.seen_keys = keys;

        Ok((records, state))
    }

    fn read_log(&self) -> Result<Vec<Record>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = NdjsonReader::open(&self.log_path, self.read_buf_bytes)
            .with_context(|| format!("open {}", self.log_path.display()))?;

        let mut records = Vec::new();
        let mut seen: AHashSet<IdentityKey> = AHashSet::new();
        let mut buf: Vec<u8> = Vec::with_capacity(4 * 1024);
        let mut line_no = 0usize;
        let mut bad = 0usize;
        let mut dupes = 0usize;
        loop {
            let n = rdr.read_line(&mut buf).with_context(|| format!("read {}", self.log_path.display()))?;
            if n == 0 { break; }
            line_no += 1;
            if buf.is_empty() { continue; }
            let rec: Record = match serde_json::from_slice(&buf) {
                Ok(r) => r,
                Err(e) => {
                    // Typically the torn tail of an interrupted append.
                    tracing::warn!("{}:{}: ignoring unreadable record: {}", self.log_path.display(), line_no, e);
                    bad += 1;
                    continue;
                }
            };
            if let Some(k) = rec.identity_key() {
                if !seen.insert(k) {
                    dupes += 1;
                    continue;
                }
            }
            records.push(rec);
        }
        if bad > 0 || dupes > 0 {
            tracing::info!("loaded {} records ({} unreadable, {} duplicates dropped)", records.len(), bad, dupes);
        }
        Ok(records)
    }

    /// Append records to the log and make them durable before returning.
    pub fn append(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if self.appender.is_none() {
            let a = NdjsonAppender::open(&self.log_path, self.write_buf_bytes)
                .with_context(|| format!("open for append {}", self.log_path.display()))?;
            self.appender = Some(a);
        }
        if let Some(w) = self.appender.as_mut() {
            for rec in records {
                let line = serde_json::to_string(rec).context("serialize record")?;
                w.write_line(&line).with_context(|| format!("append {}", self.log_path.display()))?;
            }
            w.commit()?;
        }
        Ok(())
    }

    /// Persist the progress state atomically.
    pub fn checkpoint(&self, state: &ProgressState) -> Result<()> {
        let mut snapshot = state.clone();
        snapshot.version = CHECKPOINT_VERSION;
        snapshot.updated_at = OffsetDateTime::now_utc().format(&Rfc3339).ok();
        write_json_atomic(&self.checkpoint_path, &snapshot)
    }
}
