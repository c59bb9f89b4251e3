//! Reddit transport over the public JSON endpoints (`search.json` and thread `.json`).
//!
//! One page is one post thread: the post itself plus its accepted top-level comments.
//! The search listing for the current task is fetched lazily and cached; the cursor
//! is the index of the next post in that listing. When a task asks for more than one
//! listing page worth of posts, Reddit's `after` token extends the cache.

use super::{FetchError, Fetcher, Page};
use crate::record::{RawComment, RawItem, RawPost};
use crate::task::SearchTask;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const LISTING_MAX: usize = 100;

#[derive(Clone, Debug)]
pub struct RedditConfig {
    pub base_url: String,
    pub user_agent: String,
    pub sort: String,
    pub max_comments_per_post: usize,
    pub min_comment_len: usize,
    pub timeout: Duration,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: "https://old.reddit.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            sort: "comments".to_string(),
            max_comments_per_post: 20,
            min_comment_len: 30,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
    after: Option<String>,
}

#[derive(Deserialize)]
struct Thing<T> {
    kind: String,
    data: T,
}

struct ListingCache {
    task: SearchTask,
    posts: Vec<RawPost>,
    after: Option<String>,
    fetched: bool,
}

impl ListingCache {
    fn new(task: &SearchTask) -> Self {
        Self { task: task.clone(), posts: Vec::new(), after: None, fetched: false }
    }

    fn can_grow(&self) -> bool {
        self.posts.len() < self.task.limit && (!self.fetched || self.after.is_some())
    }
}

pub struct RedditFetcher {
    client: Client,
    cfg: RedditConfig,
    cache: Option<ListingCache>,
}

impl RedditFetcher {
    pub fn new(cfg: RedditConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout)
            .build()?;
        Ok(Self { client, cfg, cache: None })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, FetchError> {
        let resp = self.client.get(url).query(query).send().map_err(map_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(map_status(status, url));
        }
        resp.json::<T>().map_err(map_reqwest)
    }

    fn fetch_listing_page(&self, cache: &mut ListingCache) -> Result<(), FetchError> {
        let task = &cache.task;
        let url = format!("{}/r/{}/search.json", self.cfg.base_url, task.community);
        let want = (task.limit - cache.posts.len()).min(LISTING_MAX);
        let mut query = vec![
            ("q", task.query.clone()),
            ("restrict_sr", "on".to_string()),
            ("sort", self.cfg.sort.clone()),
            ("limit", want.to_string()),
        ];
        if let Some(after) = &cache.after {
            query.push(("after", after.clone()));
        }

        let listing: Listing<RawPost> = self.get_json(&url, &query)?;
        let before = cache.posts.len();
        cache.posts.extend(
            listing.data.children.into_iter().filter(|t| t.kind == "t3").map(|t| t.data),
        );
        cache.posts.truncate(task.limit);
        cache.after = listing.data.after;
        cache.fetched = true;
        // A page that adds nothing cannot be followed.
        if cache.posts.len() == before {
            cache.after = None;
        }
        tracing::debug!(
            "r/{} '{}': listing now has {} posts (more: {})",
            task.community, task.query, cache.posts.len(), cache.after.is_some()
        );
        Ok(())
    }

    fn fetch_comments(&self, post: &RawPost) -> Result<Vec<RawComment>, FetchError> {
        let Some(permalink) = post.permalink.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(Vec::new());
        };
        let url = format!("{}{}.json", self.cfg.base_url, permalink);
        let thread: Vec<Listing<RawComment>> = self.get_json(&url, &[])?;
        let Some(comments) = thread.into_iter().nth(1) else {
            return Ok(Vec::new());
        };

        let accepted = comments
            .data
            .children
            .into_iter()
            .take(self.cfg.max_comments_per_post)
            .filter(|t| t.kind == "t1")
            .map(|t| t.data)
            .filter(|c| self.accept_comment(c))
            .map(|mut c| {
                c.link_title = post.title.clone();
                c.link_permalink = post.permalink.clone();
                if c.subreddit.is_none() {
                    c.subreddit = post.subreddit.clone();
                }
                c
            })
            .collect();
        Ok(accepted)
    }

    fn page_at(&self, cache: &mut ListingCache, idx: usize) -> Result<Page, FetchError> {
        while cache.posts.len() <= idx && cache.can_grow() {
            self.fetch_listing_page(cache)?;
        }
        let Some(post) = cache.posts.get(idx).cloned() else {
            return Ok(Page::default());
        };

        let mut items = Vec::new();
        if post.num_comments.unwrap_or(0) > 0 {
            match self.fetch_comments(&post) {
                Ok(comments) => items.extend(comments.into_iter().map(RawItem::Comment)),
                Err(e @ FetchError::Transient(_)) => return Err(e),
                Err(e) => tracing::warn!("comments skipped for post {:?}: {}", post.id, e),
            }
        }
        items.insert(0, RawItem::Post(post));

        let has_next = idx + 1 < cache.posts.len() || (cache.can_grow() && cache.after.is_some());
        Ok(Page { items, next: has_next.then(|| (idx + 1).to_string()) })
    }

    fn accept_comment(&self, c: &RawComment) -> bool {
        let body = c.body.as_deref().unwrap_or_default();
        !matches!(body, "" | "[deleted]" | "[removed]") && body.chars().count() >= self.cfg.min_comment_len
    }
}

impl Fetcher for RedditFetcher {
    fn fetch_page(&mut self, task: &SearchTask, cursor: Option<&str>) -> Result<Page, FetchError> {
        let idx = match cursor {
            None => 0,
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| FetchError::Permanent(format!("invalid cursor '{c}' for {}", task.id())))?,
        };

        let mut cache = match self.cache.take() {
            Some(c) if cursor.is_some() && c.task == *task => c,
            _ => ListingCache::new(task),
        };

        let result = self.page_at(&mut cache, idx);
        self.cache = Some(cache);
        result
    }
}

fn map_status(status: StatusCode, url: &str) -> FetchError {
    let msg = format!("HTTP {status} for {url}");
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        FetchError::Transient(msg)
    } else {
        FetchError::Permanent(msg)
    }
}

fn map_reqwest(e: reqwest::Error) -> FetchError {
    if let Some(status) = e.status() {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        return map_status(status, &url);
    }
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        FetchError::Transient(e.to_string())
    } else {
        FetchError::Permanent(e.to_string())
    }
}
