mod config;
mod task;
mod record;
mod classify;
mod normalize;
mod dedupe;
mod fetch;
mod schedule;
mod ndjson;
mod store;
mod export;
mod collector;

mod progress;
mod util;

pub use crate::config::CollectOptions;
pub use crate::task::{default_tasks, load_tasks_file, total_post_target, SearchTask};
pub use crate::record::{IdentityKey, RawComment, RawItem, RawPost, Record, RecordKind};
pub use crate::collector::{Collector, RunReport, StatusReport};

// Expose the collaborators so callers can inject their own fetcher/classifier/waits.
pub use crate::classify::{Classifier, KeywordClassifier, Vocabulary};
pub use crate::normalize::Normalizer;
pub use crate::dedupe::DedupIndex;
pub use crate::fetch::{FetchError, Fetcher, Page};
pub use crate::fetch::reddit::{RedditConfig, RedditFetcher};
pub use crate::schedule::{DelayPolicy, NoWait, ScheduleEvent, ScheduleRun, Scheduler, SleepWait, StopFlag, TaskOutcome, Wait};

// Persistence and exports.
pub use crate::store::{ProgressState, ProgressStore, SkippedTask, CHECKPOINT_FILE, LOG_FILE};
pub use crate::export::{export_dataset, DatasetSummary, ExportCfg, ExportOutcome, COLUMNS};

pub use crate::util::init_tracing_once;
