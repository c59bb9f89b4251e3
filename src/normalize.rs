use crate::classify::Classifier;
use crate::record::{RawItem, Record, RecordKind};
use crate::task::SearchTask;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const REDDIT_WEB: &str = "https://old.reddit.com";
const COMMENT_TITLE_CHARS: usize = 50;

/// Converts raw posts/comments into `Record`s. Total: missing fields fall back
/// to defaults (empty text, zero score, author "unknown"), never an error.
pub struct Normalizer<C: Classifier> {
    classifier: C,
}

impl<C: Classifier> Normalizer<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    pub fn normalize(&self, raw: &RawItem, task: &SearchTask) -> Record {
        self.normalize_at(raw, task, OffsetDateTime::now_utc())
    }

    /// Same as `normalize` with an explicit collection timestamp.
    pub fn normalize_at(&self, raw: &RawItem, task: &SearchTask, collected_at: OffsetDateTime) -> Record {
        let id = raw.id().unwrap_or_default().to_string();
        let collected_at = collected_at.format(&Rfc3339).unwrap_or_default();

        let (kind, title, own_title, text, author, score, comment_count, source_url, community) = match raw {
            RawItem::Post(p) => {
                let title = p.title.clone().unwrap_or_default();
                (
                    RecordKind::Post,
                    title.clone(),
                    title,
                    p.selftext.clone().unwrap_or_default(),
                    author_or_unknown(p.author.as_deref()),
                    p.score.unwrap_or(0),
                    Some(p.num_comments.unwrap_or(0)),
                    web_url(p.permalink.as_deref()),
                    p.subreddit.clone(),
                )
            }
            RawItem::Comment(c) => {
                let permalink = c.permalink.as_deref().or(c.link_permalink.as_deref());
                (
                    RecordKind::Comment,
                    comment_label(c.link_title.as_deref().unwrap_or_default()),
                    String::new(),
                    c.body.clone().unwrap_or_default(),
                    author_or_unknown(c.author.as_deref()),
                    c.score.unwrap_or(0),
                    None,
                    web_url(permalink),
                    c.subreddit.clone(),
                )
            }
        };

        // Comments contribute only their body; the "Comment on:" label is display-only.
        let combined_text = format!("{own_title} {text}").trim().to_string();
        let text_length = combined_text.chars().count();
        let has_signal = self.classifier.classify(&combined_text);

        Record {
            id,
            kind,
            title,
            text,
            combined_text,
            author,
            score,
            comment_count,
            source_url,
            origin_task: task.query.clone(),
            community: community
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| task.community.clone()),
            collected_at,
            text_length,
            has_signal,
        }
    }
}

fn author_or_unknown(author: Option<&str>) -> String {
    match author.map(str::trim) {
        Some(a) if !a.is_empty() => a.to_string(),
        _ => "unknown".to_string(),
    }
}

fn web_url(permalink: Option<&str>) -> String {
    match permalink.map(str::trim) {
        Some(p) if p.starts_with("http") => p.to_string(),
        Some(p) if !p.is_empty() => format!("{REDDIT_WEB}{p}"),
        _ => String::new(),
    }
}

fn comment_label(parent_title: &str) -> String {
    let head: String = parent_title.chars().take(COMMENT_TITLE_CHARS).collect();
    format!("Comment on: {head}...")
}
