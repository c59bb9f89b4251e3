//! Fetch layer: the contract the scheduler drives, and its typed failure modes.

pub mod reddit;

use crate::record::RawItem;
use crate::task::SearchTask;
use thiserror::Error;

/// Failure of a single page fetch. The scheduler branches on the kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Rate limited or temporarily unavailable; worth one retry.
    #[error("transient fetch error: {0}")]
    Transient(String),
    /// Not found, forbidden or malformed; retrying will not help.
    #[error("permanent fetch error: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// One page of results for a task. `next` is an opaque cursor owned by the
/// fetcher; `None` means the task's results are exhausted.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub items: Vec<RawItem>,
    pub next: Option<String>,
}

impl Page {
    /// Number of posts (not comments) on this page.
    pub fn post_count(&self) -> usize {
        self.items.iter().filter(|i| matches!(i, RawItem::Post(_))).count()
    }
}

/// Source of raw items. Called strictly sequentially by the scheduler;
/// `cursor == None` asks for the first page of `task`.
pub trait Fetcher {
    fn fetch_page(&mut self, task: &SearchTask, cursor: Option<&str>) -> Result<Page, FetchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &mut F {
    fn fetch_page(&mut self, task: &SearchTask, cursor: Option<&str>) -> Result<Page, FetchError> {
        (**self).fetch_page(task, cursor)
    }
}
