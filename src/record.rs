//! Raw Reddit shapes as returned by the fetch layer, and the canonical flat `Record`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Submission fields we read from a search listing child (`kind == "t3"`).
/// Extra fields are ignored by serde; every field is optional so a sparse
/// payload still deserializes.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawPost {
    pub id: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub num_comments: Option<i64>,
    pub permalink: Option<String>,
    pub subreddit: Option<String>,
}

/// Comment fields we read from a thread listing child (`kind == "t1"`).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawComment {
    pub id: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub permalink: Option<String>,
    pub subreddit: Option<String>,

    // Filled in by the fetcher from the parent post, not present on the wire.
    #[serde(skip)]
    pub link_title: Option<String>,
    #[serde(skip)]
    pub link_permalink: Option<String>,
}

/// One unprocessed item handed from the fetch layer to the normalizer.
#[derive(Clone, Debug)]
pub enum RawItem {
    Post(RawPost),
    Comment(RawComment),
}

impl RawItem {
    /// Platform id, if present and non-blank.
    pub fn id(&self) -> Option<&str> {
        let id = match self {
            RawItem::Post(p) => p.id.as_deref(),
            RawItem::Comment(c) => c.id.as_deref(),
        };
        id.map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Post,
    Comment,
}

impl RecordKind {
    /// Reddit "thing" prefix for this kind.
    pub fn fullname_prefix(self) -> &'static str {
        match self {
            RecordKind::Post => "t3",
            RecordKind::Comment => "t1",
        }
    }
}

/// Deduplication key: the Reddit fullname (`t3_<id>` / `t1_<id>`).
/// A comment is keyed by its own id, never its parent's.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(kind: RecordKind, id: &str) -> Self {
        Self(format!("{}_{}", kind.fullname_prefix(), id))
    }

    /// Wrap an already-formatted key (as persisted in a checkpoint).
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical normalized unit stored in the dataset.
///
/// Invariants (established by `Normalizer`):
///  - `text_length == combined_text.chars().count()`
///  - `has_signal == classifier(combined_text)`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String, // platform id, empty if the platform omitted it
    pub kind: RecordKind,
    pub title: String,
    pub text: String,
    pub combined_text: String,
    pub author: String,
    pub score: i64,
    pub comment_count: Option<i64>, // posts only
    pub source_url: String,
    pub origin_task: String, // query string of the producing SearchTask
    pub community: String,
    pub collected_at: String, // RFC3339, UTC
    pub text_length: usize,
    pub has_signal: bool,
}

impl Record {
    /// `None` when the platform gave no id; such records are never admitted.
    pub fn identity_key(&self) -> Option<IdentityKey> {
        let id = self.id.trim();
        if id.is_empty() {
            None
        } else {
            Some(IdentityKey::new(self.kind, id))
        }
    }
}
