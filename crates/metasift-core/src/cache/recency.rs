//! In-memory recency index: URL → last-access stamp, ordered by stamp.

use std::collections::{BTreeMap, HashMap};

/// Stamps are Unix milliseconds, bumped so that every stamp is unique and
/// later touches always sort after earlier ones.
#[derive(Debug, Default)]
pub(crate) struct RecencyIndex {
    by_url: HashMap<String, i64>,
    by_stamp: BTreeMap<i64, String>,
    last: i64,
}

impl RecencyIndex {
    pub(crate) fn contains(&self, url: &str) -> bool {
        self.by_url.contains_key(url)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_url.len()
    }

    /// Mark `url` as used now. Returns the stamp to persist.
    pub(crate) fn touch(&mut self, url: &str, now_ms: i64) -> i64 {
        let stamp = now_ms.max(self.last + 1);
        self.insert(url, stamp);
        stamp
    }

    /// Insert a persisted stamp (restart path). Colliding stamps are bumped.
    pub(crate) fn restore(&mut self, url: &str, stamp: i64) -> i64 {
        let mut stamp = stamp;
        while self.by_stamp.contains_key(&stamp) {
            stamp += 1;
        }
        self.insert(url, stamp);
        stamp
    }

    fn insert(&mut self, url: &str, stamp: i64) {
        if let Some(old) = self.by_url.insert(url.to_string(), stamp) {
            self.by_stamp.remove(&old);
        }
        self.by_stamp.insert(stamp, url.to_string());
        self.last = self.last.max(stamp);
    }

    pub(crate) fn remove(&mut self, url: &str) -> bool {
        match self.by_url.remove(url) {
            Some(stamp) => {
                self.by_stamp.remove(&stamp);
                true
            }
            None => false,
        }
    }

    /// Remove and return the `n` least recently used URLs, oldest first.
    pub(crate) fn take_oldest(&mut self, n: usize) -> Vec<String> {
        let victims: Vec<(i64, String)> = self
            .by_stamp
            .iter()
            .take(n)
            .map(|(s, u)| (*s, u.clone()))
            .collect();
        for (stamp, url) in &victims {
            self.by_stamp.remove(stamp);
            self.by_url.remove(url);
        }
        victims.into_iter().map(|(_, url)| url).collect()
    }

    pub(crate) fn oldest_and_newest(&self) -> Option<(i64, i64)> {
        let (&first, _) = self.by_stamp.first_key_value()?;
        let (&last, _) = self.by_stamp.last_key_value()?;
        Some((first, last))
    }

    pub(crate) fn clear(&mut self) {
        self.by_url.clear();
        self.by_stamp.clear();
    }
}
