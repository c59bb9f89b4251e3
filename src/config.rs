use crate::classify::Vocabulary;
use crate::export::ExportCfg;
use crate::fetch::reddit::RedditConfig;
use crate::schedule::DelayPolicy;
use crate::task::{default_tasks, SearchTask};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct CollectOptions {
    pub out_dir: PathBuf,
    pub tasks: Vec<SearchTask>,       // execution order
    pub delays: DelayPolicy,
    pub vocabulary: Vocabulary,
    pub export: ExportCfg,
    pub reddit: RedditConfig,
    pub progress: bool,               // show progress bar
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("optimus_data"),
            tasks: default_tasks(),
            delays: DelayPolicy::default(),
            vocabulary: Vocabulary::default(),
            export: ExportCfg::default(),
            reddit: RedditConfig::default(),
            progress: true,
        }
    }
}

impl CollectOptions {
    pub fn with_out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_tasks<I>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = SearchTask>,
    {
        self.tasks = tasks.into_iter().collect();
        self
    }
    pub fn with_delays(mut self, delays: DelayPolicy) -> Self {
        self.delays = delays;
        self
    }
    pub fn with_inter_task_delay(mut self, d: Duration) -> Self {
        self.delays.inter_task = d;
        self
    }
    pub fn with_inter_page_delay(mut self, d: Duration) -> Self {
        self.delays.inter_page = d;
        self
    }
    pub fn with_backoff_delay(mut self, d: Duration) -> Self {
        self.delays.backoff = d;
        self
    }
    pub fn with_vocabulary(mut self, vocab: Vocabulary) -> Self {
        self.vocabulary = vocab;
        self
    }
    pub fn with_sample_size(mut self, n: usize) -> Self {
        self.export.sample_size = n;
        self
    }
    pub fn with_min_export_len(mut self, n: usize) -> Self {
        self.export.min_text_len = n;
        self
    }
    pub fn with_export_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.export.prefix = prefix.into();
        self
    }
    pub fn with_reddit(mut self, reddit: RedditConfig) -> Self {
        self.reddit = reddit;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
}
