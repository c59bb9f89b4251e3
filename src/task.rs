//! Search tasks: one (community, query, limit) triple per unit of collection work.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One subreddit search. Identity is the whole tuple; two tasks are the same
/// task only if community, query and limit all match exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchTask {
    pub community: String, // subreddit name, no "r/"
    pub query: String,
    pub limit: usize,      // max posts to collect for this search
}

impl SearchTask {
    pub fn new(community: impl AsRef<str>, query: impl Into<String>, limit: usize) -> Self {
        let mut c = community.as_ref().trim().to_string();
        if let Some(rest) = c.strip_prefix("r/") {
            c = rest.to_string();
        }
        Self { community: c, query: query.into(), limit }
    }

    /// Stable textual id used in logs and checkpoints.
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.community, self.query, self.limit)
    }
}

impl fmt::Display for SearchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r/{} '{}' ({} posts)", self.community, self.query, self.limit)
    }
}

/// The built-in collection plan: Optimus discourse across six communities,
/// from enthusiast to technical to skeptical audiences.
pub fn default_tasks() -> Vec<SearchTask> {
    let plan: [(&str, &str, usize); 12] = [
        ("teslamotors", "optimus", 100),
        ("teslamotors", "tesla robot", 50),
        ("teslamotors", "humanoid robot", 50),
        ("robotics", "tesla optimus", 100),
        ("robotics", "optimus robot", 50),
        ("technology", "tesla optimus", 100),
        ("technology", "optimus robot", 50),
        ("Futurology", "tesla optimus", 100),
        ("Futurology", "optimus humanoid", 50),
        ("artificial", "tesla optimus", 50),
        ("artificial", "optimus robot", 50),
        ("RealTesla", "optimus", 100),
    ];
    plan.iter().map(|(c, q, l)| SearchTask::new(c, *q, *l)).collect()
}

/// Load a task list from a JSON file: `[{"community": "...", "query": "...", "limit": 50}, ...]`.
/// Order in the file is execution order.
pub fn load_tasks_file(path: &Path) -> Result<Vec<SearchTask>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let tasks: Vec<SearchTask> =
        serde_json::from_str(&raw).with_context(|| format!("parse task list {}", path.display()))?;
    Ok(tasks.into_iter().map(|t| SearchTask::new(&t.community, t.query, t.limit)).collect())
}

/// Total posts targeted by a plan.
pub fn total_post_target(tasks: &[SearchTask]) -> usize {
    tasks.iter().map(|t| t.limit).sum()
}
