#![allow(dead_code)]

use rcollect::{FetchError, Fetcher, Page, RawComment, RawItem, RawPost, Record, SearchTask, StopFlag, Wait};
use serde_json::json;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// Shared, ordered trace of fetches and waits, used to check sequencing.
pub type EventLog = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// A Reddit search result shaped like a `search.json` child's `data`.
pub fn post(id: &str, title: &str, selftext: &str) -> RawItem {
    let p: RawPost = serde_json::from_value(json!({
        "id": id, "title": title, "selftext": selftext, "author": "alice",
        "score": 42, "num_comments": 2, "subreddit": "robotics",
        "permalink": format!("/r/robotics/comments/{id}/slug/"),
        "over_18": false, "domain": "self.robotics"
    }))
    .unwrap();
    RawItem::Post(p)
}

/// A top-level comment as found in a thread's second listing.
pub fn comment(id: &str, body: &str) -> RawItem {
    let mut c: RawComment = serde_json::from_value(json!({
        "id": id, "body": body, "author": "bob", "score": -3,
        "subreddit": "robotics", "parent_id": "t3_p1",
        "permalink": format!("/r/robotics/comments/p1/slug/{id}/")
    }))
    .unwrap();
    c.link_title = Some("Optimus folds laundry".to_string());
    RawItem::Comment(c)
}

/// One scripted response to a `fetch_page` call.
#[derive(Clone, Debug)]
pub enum Step {
    Page(Vec<RawItem>),
    Transient,
    Permanent,
}

/// In-memory fetcher: each task replays its own queue of steps, one per call.
/// A page reports a next cursor while further steps remain queued for its task.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<SearchTask, VecDeque<Step>>,
    pub calls: Vec<(String, Option<String>)>,
    log: Option<EventLog>,
    stop_after_pages: Option<(usize, StopFlag)>,
    pages_served: usize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, task: &SearchTask, steps: Vec<Step>) -> Self {
        self.scripts.insert(task.clone(), steps.into());
        self
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Raise `stop` right after the `n`-th page has been handed out.
    pub fn stop_after_pages(mut self, n: usize, stop: StopFlag) -> Self {
        self.stop_after_pages = Some((n, stop));
        self
    }

    pub fn calls_for(&self, task: &SearchTask) -> usize {
        self.calls.iter().filter(|(id, _)| *id == task.id()).count()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch_page(&mut self, task: &SearchTask, cursor: Option<&str>) -> Result<Page, FetchError> {
        self.calls.push((task.id(), cursor.map(str::to_string)));
        if let Some(log) = &self.log {
            log.borrow_mut().push(format!("fetch {} {}", task.query, cursor.unwrap_or("-")));
        }
        let queue = self.scripts.entry(task.clone()).or_default();
        match queue.pop_front() {
            None => Ok(Page::default()),
            Some(Step::Transient) => Err(FetchError::Transient("HTTP 429 Too Many Requests".into())),
            Some(Step::Permanent) => Err(FetchError::Permanent("HTTP 404 Not Found".into())),
            Some(Step::Page(items)) => {
                let next = (!queue.is_empty()).then(|| (self.calls.len()).to_string());
                self.pages_served += 1;
                if let Some((n, stop)) = &self.stop_after_pages {
                    if self.pages_served == *n {
                        stop.request_stop();
                    }
                }
                Ok(Page { items, next })
            }
        }
    }
}

/// Records every requested delay instead of sleeping.
#[derive(Default)]
pub struct RecordingWait {
    pub delays: RefCell<Vec<Duration>>,
    log: Option<EventLog>,
}

impl RecordingWait {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: EventLog) -> Self {
        Self { delays: RefCell::new(Vec::new()), log: Some(log) }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Wait for RecordingWait {
    fn wait(&self, delay: Duration, stop: &StopFlag) -> bool {
        self.delays.borrow_mut().push(delay);
        if let Some(log) = &self.log {
            log.borrow_mut().push(format!("wait {}", delay.as_secs()));
        }
        !stop.is_stopped()
    }
}

/// Three post threads and two extra comments: five distinct items, ids prefixed by `tag`.
pub fn five_item_script(tag: &str) -> Vec<Step> {
    vec![
        Step::Page(vec![
            post(&format!("{tag}p1"), "Optimus folds laundry", "It moves like a person would, honestly."),
            comment(&format!("{tag}c1"), "It seems almost alive when it picks up the shirt."),
        ]),
        Step::Page(vec![
            post(&format!("{tag}p2"), "Optimus update", "New hands with 22 degrees of freedom."),
            comment(&format!("{tag}c2"), "Those specs are impressive for a prototype arm."),
        ]),
        Step::Page(vec![post(&format!("{tag}p3"), "Is Optimus remote controlled at all?", "")]),
    ]
}

pub fn tempdir() -> PathBuf {
    tempfile::tempdir().unwrap().into_path()
}

/// Read every record from the NDJSON log.
pub fn read_log(dir: &Path) -> Vec<Record> {
    let path = dir.join(rcollect::LOG_FILE);
    if !path.exists() {
        return Vec::new();
    }
    let r = BufReader::new(File::open(path).unwrap());
    r.lines()
        .map(|l| l.unwrap())
        .filter(|s| !s.trim().is_empty())
        .map(|s| serde_json::from_str(&s).unwrap())
        .collect()
}

pub fn read_checkpoint(dir: &Path) -> rcollect::ProgressState {
    let raw = std::fs::read_to_string(dir.join(rcollect::CHECKPOINT_FILE)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

/// Sorted identity keys of a record set.
pub fn keys_of(records: &[Record]) -> Vec<String> {
    let mut v: Vec<String> = records
        .iter()
        .filter_map(|r| r.identity_key())
        .map(|k| k.as_str().to_string())
        .collect();
    v.sort();
    v
}

/// Read a CSV export into (header, rows).
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    let header = rdr.headers().unwrap().iter().map(str::to_string).collect();
    let rows = rdr
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}
