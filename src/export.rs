//! Final CSV exports: the combined primary table and a fixed-size sample.

use crate::record::{Record, RecordKind};
use crate::util::{create_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

/// Column order of the primary table.
pub const COLUMNS: [&str; 13] = [
    "kind", "title", "text", "combined_text", "author", "score", "comment_count",
    "source_url", "origin_task", "community", "collected_at", "text_length", "has_signal",
];

#[derive(Serialize)]
struct Row<'a> {
    kind: RecordKind,
    title: &'a str,
    text: &'a str,
    combined_text: &'a str,
    author: &'a str,
    score: i64,
    comment_count: Option<i64>,
    source_url: &'a str,
    origin_task: &'a str,
    community: &'a str,
    collected_at: &'a str,
    text_length: usize,
    has_signal: bool,
}

impl<'a> From<&'a Record> for Row<'a> {
    fn from(r: &'a Record) -> Self {
        Row {
            kind: r.kind,
            title: &r.title,
            text: &r.text,
            combined_text: &r.combined_text,
            author: &r.author,
            score: r.score,
            comment_count: r.comment_count,
            source_url: &r.source_url,
            origin_task: &r.origin_task,
            community: &r.community,
            collected_at: &r.collected_at,
            text_length: r.text_length,
            has_signal: r.has_signal,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExportCfg {
    pub prefix: String,
    pub sample_size: usize,
    pub min_text_len: usize,
}

impl Default for ExportCfg {
    fn default() -> Self {
        Self { prefix: "optimus_reddit".to_string(), sample_size: 100, min_text_len: 30 }
    }
}

/// Aggregate figures reported at the end of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetSummary {
    pub total: usize,
    pub posts: usize,
    pub comments: usize,
    pub communities: usize,
    pub queries: usize,
    pub with_signal: usize,
}

impl DatasetSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut s = DatasetSummary::default();
        let mut communities = BTreeSet::new();
        let mut queries = BTreeSet::new();
        for r in records {
            s.total += 1;
            match r.kind {
                RecordKind::Post => s.posts += 1,
                RecordKind::Comment => s.comments += 1,
            }
            if r.has_signal {
                s.with_signal += 1;
            }
            communities.insert(r.community.as_str());
            queries.insert(r.origin_task.as_str());
        }
        s.communities = communities.len();
        s.queries = queries.len();
        s
    }

    pub fn signal_pct(&self) -> f64 {
        if self.total == 0 { 0.0 } else { 100.0 * self.with_signal as f64 / self.total as f64 }
    }
}

#[derive(Clone, Debug)]
pub struct ExportOutcome {
    pub combined_path: PathBuf,
    pub sample_path: PathBuf,
    pub rows: usize,
    pub sample_rows: usize,
    pub dropped_short: usize,
    pub summary: DatasetSummary,
}

/// Write `{prefix}_{YYYYmmdd_HHMMSS}.csv` with every record whose combined text
/// has at least `min_text_len` characters, and `{prefix}_sample.csv` with the
/// first `sample_size` of those rows. Both use the same header.
pub fn export_dataset(records: &[Record], out_dir: &Path, cfg: &ExportCfg) -> Result<ExportOutcome> {
    let kept: Vec<&Record> = records.iter().filter(|r| r.text_length >= cfg.min_text_len).collect();
    let dropped_short = records.len() - kept.len();

    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .context("format export timestamp")?;
    let combined_path = out_dir.join(format!("{}_{}.csv", cfg.prefix, stamp));
    let sample_path = out_dir.join(format!("{}_sample.csv", cfg.prefix));

    write_csv(&combined_path, kept.iter().copied())?;
    let sample_rows = kept.len().min(cfg.sample_size);
    write_csv(&sample_path, kept.iter().take(cfg.sample_size).copied())?;

    Ok(ExportOutcome {
        combined_path,
        sample_path,
        rows: kept.len(),
        sample_rows,
        dropped_short,
        summary: DatasetSummary::from_records(kept.iter().copied()),
    })
}

fn write_csv<'a>(path: &Path, rows: impl Iterator<Item = &'a Record>) -> Result<()> {
    let tmp = path.with_extension("csv.inprogress");
    {
        let f = create_with_backoff(&tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
        let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(f);
        // Header written explicitly so an empty table still carries the schema.
        w.write_record(COLUMNS).with_context(|| format!("write {}", tmp.display()))?;
        for r in rows {
            w.serialize(Row::from(r)).with_context(|| format!("write {}", tmp.display()))?;
        }
        w.flush().with_context(|| format!("flush {}", tmp.display()))?;
    }
    replace_file_atomic_backoff(&tmp, path)
}
