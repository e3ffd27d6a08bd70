use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reading::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Evict the oldest reading once the store is full.
    #[default]
    Overwrite,
    /// Stop accepting readings once the store is full.
    Freeze,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history capacity must be at least one reading")]
    ZeroCapacity,
}

/// Fixed-capacity reading history.
///
/// Storage is allocated once at construction. `head` is the slot holding the
/// oldest reading and `len` counts occupied slots, so insertion order is
/// `head, head + 1, ..` modulo capacity.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    slots: Vec<Option<Reading>>,
    head: usize,
    len: usize,
    retention: RetentionPolicy,
}

impl HistoryStore {
    pub fn new(capacity: usize, retention: RetentionPolicy) -> Result<Self, HistoryError> {
        if capacity == 0 {
            return Err(HistoryError::ZeroCapacity);
        }
        Ok(Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
            retention,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Returns false only when the store is frozen and full.
    pub fn append(&mut self, reading: Reading) -> bool {
        let capacity = self.capacity();

        if self.is_full() {
            match self.retention {
                RetentionPolicy::Freeze => return false,
                RetentionPolicy::Overwrite => {
                    self.slots[self.head] = Some(reading);
                    self.head = (self.head + 1) % capacity;
                    return true;
                }
            }
        }

        let tail = (self.head + self.len) % capacity;
        self.slots[tail] = Some(reading);
        self.len += 1;
        true
    }

    pub fn latest(&self) -> Option<&Reading> {
        if self.is_empty() {
            return None;
        }
        let index = (self.head + self.len - 1) % self.capacity();
        self.slots[index].as_ref()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> + '_ {
        let capacity = self.capacity();
        (0..self.len).filter_map(move |offset| self.slots[(self.head + offset) % capacity].as_ref())
    }

    pub fn snapshot(&self) -> Vec<Reading> {
        self.iter().cloned().collect()
    }
}
