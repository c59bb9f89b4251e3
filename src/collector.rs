//! Collection orchestrator: resume from the store, drive the scheduler, normalize,
//! deduplicate, append, checkpoint, and finalize exports.
//!
//! Phases: Idle -> Resuming -> Running(task) -> Checkpointing -> ... -> Finalizing -> Done.
//! An interrupt at any point jumps to Finalizing with whatever is already durable.

use crate::classify::{KeywordClassifier, Vocabulary};
use crate::config::CollectOptions;
use crate::dedupe::DedupIndex;
use crate::export::{export_dataset, ExportOutcome};
use crate::fetch::reddit::{RedditConfig, RedditFetcher};
use crate::fetch::Fetcher;
use crate::normalize::Normalizer;
use crate::progress::ProgressScope;
use crate::record::Record;
use crate::schedule::{DelayPolicy, ScheduleEvent, Scheduler, SleepWait, StopFlag, TaskOutcome, Wait};
use crate::store::{ProgressState, ProgressStore, SkippedTask};
use crate::task::SearchTask;
use crate::util::init_tracing_once;
use anyhow::{bail, Result};
use std::path::Path;
use std::time::Duration;

#[allow(dead_code)] // payloads are for the debug trace
#[derive(Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Resuming,
    Running(String),
    Checkpointing(String),
    Finalizing { skipped: usize },
    Done,
}

/// Outcome of one `run`/`resume` invocation.
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    /// Tasks completed during this invocation.
    pub completed: Vec<SearchTask>,
    /// Tasks already completed by earlier runs (not re-fetched).
    pub previously_completed: Vec<SearchTask>,
    pub skipped: Vec<SkippedTask>,
    /// Task cut short by an interrupt; its appended pages are kept, it is not done.
    pub interrupted_task: Option<SearchTask>,
    /// Tasks never started because the run was interrupted.
    pub not_started: Vec<SearchTask>,
    pub interrupted: bool,
    pub records_loaded: usize,
    pub records_admitted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub total_records: usize,
    pub dedup_keys: usize,
    pub export: Option<ExportOutcome>,
}

/// Read-only view of persisted progress against the configured plan.
#[derive(Clone, Debug, Default)]
pub struct StatusReport {
    pub completed: Vec<SearchTask>,
    pub skipped: Vec<SkippedTask>,
    pub remaining: Vec<SearchTask>,
    pub records: usize,
    pub keys: usize,
}

#[derive(Clone)]
pub struct Collector {
    pub(crate) opts: CollectOptions,
    stop: StopFlag,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self { opts: CollectOptions::default(), stop: StopFlag::new() }
    }

    pub fn with_options(opts: CollectOptions) -> Self {
        Self { opts, stop: StopFlag::new() }
    }

    // -------- Builder methods --------
    pub fn out_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_out_dir(dir); self }
    pub fn tasks<I: IntoIterator<Item = SearchTask>>(mut self, tasks: I) -> Self { self.opts = self.opts.with_tasks(tasks); self }
    pub fn delays(mut self, delays: DelayPolicy) -> Self { self.opts = self.opts.with_delays(delays); self }
    pub fn inter_task_delay(mut self, d: Duration) -> Self { self.opts = self.opts.with_inter_task_delay(d); self }
    pub fn inter_page_delay(mut self, d: Duration) -> Self { self.opts = self.opts.with_inter_page_delay(d); self }
    pub fn backoff_delay(mut self, d: Duration) -> Self { self.opts = self.opts.with_backoff_delay(d); self }
    pub fn vocabulary(mut self, vocab: Vocabulary) -> Self { self.opts = self.opts.with_vocabulary(vocab); self }
    pub fn sample_size(mut self, n: usize) -> Self { self.opts = self.opts.with_sample_size(n); self }
    pub fn min_export_len(mut self, n: usize) -> Self { self.opts = self.opts.with_min_export_len(n); self }
    pub fn export_prefix(mut self, prefix: impl Into<String>) -> Self { self.opts = self.opts.with_export_prefix(prefix); self }
    pub fn reddit(mut self, reddit: RedditConfig) -> Self { self.opts = self.opts.with_reddit(reddit); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn stop_flag(mut self, stop: StopFlag) -> Self { self.stop = stop; self }

    pub fn options(&self) -> &CollectOptions {
        &self.opts
    }

    /// Handle for requesting a cooperative stop (e.g. from a Ctrl-C handler).
    pub fn stop_handle(&self) -> StopFlag {
        self.stop.clone()
    }

    // -------- Entry points --------

    /// Collect against Reddit with real sleeps. Resumes automatically if the
    /// output directory holds a previous run's progress.
    pub fn run(&self) -> Result<RunReport> {
        let fetcher = RedditFetcher::new(self.opts.reddit.clone())?;
        self.run_with(fetcher, SleepWait::default())
    }

    /// Like `run`, but requires existing progress in the output directory.
    pub fn resume(&self) -> Result<RunReport> {
        self.ensure_prior_state()?;
        self.run()
    }

    pub fn resume_with<F: Fetcher, W: Wait>(&self, fetcher: F, waiter: W) -> Result<RunReport> {
        self.ensure_prior_state()?;
        self.run_with(fetcher, waiter)
    }

    /// Full orchestration with injected fetch and wait collaborators.
    pub fn run_with<F: Fetcher, W: Wait>(&self, fetcher: F, waiter: W) -> Result<RunReport> {
        init_tracing_once();
        let mut run = Run::new(&self.opts, &self.stop)?;
        run.resume()?;
        run.collect(fetcher, waiter)?;
        run.finalize()
    }

    pub fn status(&self) -> Result<StatusReport> {
        init_tracing_once();
        let store = ProgressStore::open(&self.opts.out_dir)?;
        let (records, state) = store.load()?;
        let remaining = self.opts.tasks.iter().filter(|t| !state.is_completed(t)).cloned().collect();
        Ok(StatusReport {
            completed: state.completed,
            skipped: state.skipped,
            remaining,
            records: records.len(),
            keys: state.seen_keys.len(),
        })
    }

    /// Re-run only the Finalizing phase from the persisted log.
    pub fn export(&self) -> Result<ExportOutcome> {
        init_tracing_once();
        let store = ProgressStore::open(&self.opts.out_dir)?;
        let (records, _) = store.load()?;
        if records.is_empty() {
            bail!("no records in {}", store.log_path().display());
        }
        let out = export_dataset(&records, store.dir(), &self.opts.export)?;
        log_export(&out);
        Ok(out)
    }

    fn ensure_prior_state(&self) -> Result<()> {
        let store = ProgressStore::open(&self.opts.out_dir)?;
        if !store.has_prior_state() {
            bail!("nothing to resume: no log or checkpoint in {}", self.opts.out_dir.display());
        }
        Ok(())
    }
}

/// State owned by a single orchestrated run.
struct Run<'a> {
    opts: &'a CollectOptions,
    stop: &'a StopFlag,
    phase: Phase,
    store: ProgressStore,
    state: ProgressState,
    index: DedupIndex,
    records: Vec<Record>,
    remaining: Vec<SearchTask>,
    report: RunReport,
}

impl<'a> Run<'a> {
    fn new(opts: &'a CollectOptions, stop: &'a StopFlag) -> Result<Self> {
        Ok(Self {
            opts,
            stop,
            phase: Phase::Idle,
            store: ProgressStore::open(&opts.out_dir)?,
            state: ProgressState::default(),
            index: DedupIndex::new(),
            records: Vec::new(),
            remaining: Vec::new(),
            report: RunReport::default(),
        })
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!("phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn resume(&mut self) -> Result<()> {
        self.enter(Phase::Resuming);
        let (records, state) = self.store.load()?;
        self.index.seed(state.seen_keys.iter().cloned())?;

        self.remaining = self.opts.tasks.iter().filter(|t| !state.is_completed(t)).cloned().collect();
        self.report.previously_completed =
            self.opts.tasks.iter().filter(|t| state.is_completed(t)).cloned().collect();
        self.report.records_loaded = records.len();

        if self.store.has_prior_state() {
            tracing::info!(
                "resuming from {}: {} records, {} keys, {}/{} tasks already done",
                self.store.dir().display(),
                records.len(),
                self.index.len(),
                self.report.previously_completed.len(),
                self.opts.tasks.len()
            );
        }
        let est = self.opts.delays.inter_task.as_secs() * self.remaining.len().saturating_sub(1) as u64;
        tracing::info!(
            "{} searches planned, {} posts targeted, estimated {:.1} min of rate-limit waits",
            self.remaining.len(),
            crate::task::total_post_target(&self.remaining),
            est as f64 / 60.0
        );

        self.records = records;
        self.state = state;
        Ok(())
    }

    fn collect<F: Fetcher, W: Wait>(&mut self, fetcher: F, waiter: W) -> Result<()> {
        let classifier = KeywordClassifier::new(&self.opts.vocabulary)?;
        let normalizer = Normalizer::new(classifier);
        let progress = ProgressScope::tasks(self.opts.progress, self.remaining.len() as u64, "Collecting");
        let total = self.remaining.len();

        let scheduler = Scheduler::new(fetcher, waiter, self.opts.delays, self.stop.clone());
        let mut task_new = 0usize;
        for event in scheduler.run(self.remaining.clone()) {
            match event {
                ScheduleEvent::TaskStarted { task, position } => {
                    tracing::info!("[{}/{}] searching {}", position, total, task);
                    progress.set_message(task.id());
                    self.enter(Phase::Running(task.id()));
                    task_new = 0;
                }
                ScheduleEvent::Page { task, items, .. } => {
                    let mut admitted = Vec::with_capacity(items.len());
                    for raw in &items {
                        let rec = normalizer.normalize(raw, &task);
                        let Some(key) = rec.identity_key() else {
                            self.report.rejected += 1;
                            continue;
                        };
                        if self.index.admit(&key) {
                            admitted.push(rec);
                        } else {
                            self.report.duplicates += 1;
                        }
                    }
                    self.store.append(&admitted)?;
                    task_new += admitted.len();
                    self.report.records_admitted += admitted.len();
                    self.records.extend(admitted);
                }
                ScheduleEvent::TaskFinished { task, outcome, pages, posts } => {
                    match outcome {
                        TaskOutcome::Done => {
                            tracing::info!("{}: done, {} posts over {} pages, {} new records", task, posts, pages, task_new);
                            self.state.mark_completed(&task);
                            self.report.completed.push(task.clone());
                        }
                        TaskOutcome::Skipped(e) => {
                            tracing::warn!("{}: skipped after {} pages ({} new records kept): {}", task, pages, task_new, e);
                            self.state.mark_skipped(&task, e.to_string());
                            self.report.skipped.push(SkippedTask { task: task.clone(), reason: e.to_string() });
                        }
                        TaskOutcome::Interrupted => {
                            tracing::warn!("{}: interrupted after {} pages; not marked done", task, pages);
                            self.report.interrupted_task = Some(task);
                            continue;
                        }
                    }
                    self.enter(Phase::Checkpointing(task.id()));
                    self.state.seen_keys = self.index.sorted_keys();
                    self.store.checkpoint(&self.state)?;
                    progress.inc();
                    tracing::info!("running total: {} records", self.records.len());
                }
            }
        }

        self.report.interrupted = self.stop.is_stopped() || self.report.interrupted_task.is_some();
        let not_started: Vec<SearchTask> = self
            .remaining
            .iter()
            .filter(|t| {
                !self.report.completed.contains(*t)
                    && !self.report.skipped.iter().any(|s| &s.task == *t)
                    && self.report.interrupted_task.as_ref() != Some(*t)
            })
            .cloned()
            .collect();
        self.report.not_started = not_started;
        progress.finish(if self.report.interrupted { "interrupted" } else { "done" });
        Ok(())
    }

    fn finalize(mut self) -> Result<RunReport> {
        self.enter(Phase::Finalizing { skipped: self.report.skipped.len() });
        if self.report.interrupted {
            tracing::warn!(
                "interrupted: {} tasks not started; rerun to continue from the checkpoint",
                self.report.not_started.len()
            );
        }

        self.report.total_records = self.records.len();
        self.report.dedup_keys = self.index.len();
        if self.records.is_empty() {
            tracing::warn!("no data collected; nothing to export");
        } else {
            let out = export_dataset(&self.records, self.store.dir(), &self.opts.export)?;
            log_export(&out);
            self.report.export = Some(out);
        }

        tracing::info!(
            "completed {} (plus {} earlier), skipped {}, total records {}",
            self.report.completed.len(),
            self.report.previously_completed.len(),
            self.report.skipped.len(),
            self.report.total_records
        );
        for s in &self.report.skipped {
            tracing::warn!("skipped: {} ({})", s.task, s.reason);
        }
        self.enter(Phase::Done);
        Ok(self.report)
    }
}

fn log_export(out: &ExportOutcome) {
    let s = &out.summary;
    tracing::info!(
        "exported {} rows ({} under minimum length dropped) to {}; sample of {} at {}",
        out.rows,
        out.dropped_short,
        out.combined_path.display(),
        out.sample_rows,
        out.sample_path.display()
    );
    tracing::info!(
        "posts {}, comments {}, communities {}, queries {}, metaphor signals {} ({:.1}%)",
        s.posts, s.comments, s.communities, s.queries, s.with_signal, s.signal_pct()
    );
}
