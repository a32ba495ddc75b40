pub mod awaiting;

use std::collections::HashMap;
use std::hash::Hash;

pub use crate::awaiting::{Awaiting, Entry, Expired, RetryPolicy};

/// Generates u16 sequence IDs, one wrapping counter per target.
///
/// IDs still in flight for the same target are skipped, so an ID is never handed out twice while
/// a command using it is outstanding.
pub struct SequenceIds<K> {
    counters: HashMap<K, u16>,
}

impl<K> SequenceIds<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            counters: HashMap::new(),
        }
    }

    /// Returns the next ID for `key` that `in_use` does not claim, or `None` if all 65536 are
    /// taken.
    pub fn next<F>(&mut self, key: &K, mut in_use: F) -> Option<u16>
    where
        F: FnMut(u16) -> bool,
    {
        let counter = self.counters.entry(key.clone()).or_insert(0);
        for _ in 0..=u16::MAX {
            let id = *counter;
            *counter = counter.wrapping_add(1);
            if !in_use(id) {
                return Some(id);
            }
        }
        None
    }

    /// The ID that `next` will try first for `key`.
    pub fn peek(&self, key: &K) -> u16 {
        self.counters.get(key).copied().unwrap_or(0)
    }
}

impl<K> Default for SequenceIds<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
