use crate::record::IdentityKey;
use ahash::AHashSet;
use anyhow::{bail, Result};

/// Run-wide set of admitted identity keys. Grows only; there is no removal.
///
/// On resume the index is `seed`ed from persisted state before the first `admit`.
/// Seeding after admission has started is rejected.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: AHashSet<IdentityKey>,
    admitting: bool,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load previously admitted keys.
    pub fn seed<I>(&mut self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = IdentityKey>,
    {
        if self.admitting {
            bail!("dedup index cannot be seeded after admission has started");
        }
        let before = self.seen.len();
        self.seen.extend(keys);
        Ok(self.seen.len() - before)
    }

    /// True exactly once per key: on its first occurrence.
    pub fn admit(&mut self, key: &IdentityKey) -> bool {
        self.admitting = true;
        if self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.clone());
        true
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Keys in sorted order, for a deterministic checkpoint file.
    pub fn sorted_keys(&self) -> Vec<IdentityKey> {
        let mut v: Vec<IdentityKey> = self.seen.iter().cloned().collect();
        v.sort_unstable();
        v
    }
}
