//! Insertion-ordered slot ring driving eviction.

use std::collections::HashMap;

/// Fixed number of slots written in circular order, plus the key → value mapping.
///
/// Each admission takes the slot under the cursor. A key stays in the mapping while
/// at least one slot references it, so re-admitting a key extends its lifetime to
/// its newest slot and the mapping never holds more than `capacity` keys.
#[derive(Debug, Clone)]
pub struct FifoRing<V> {
    slots: Vec<Option<String>>,
    position: usize,
    references: HashMap<String, usize>,
    entries: HashMap<String, V>,
}

impl<V> FifoRing<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            position: 0,
            references: HashMap::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot that the next admission overwrites.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn slots(&self) -> &[Option<String>] {
        &self.slots
    }

    /// Write `key` into the current slot and store `value` under it.
    ///
    /// Returns the key that lost its last slot and was dropped from the mapping.
    /// With zero capacity nothing is stored.
    pub fn admit(&mut self, key: String, value: V) -> Option<String> {
        let capacity = self.capacity();
        if capacity == 0 {
            return None;
        }

        let displaced = self.slots[self.position].replace(key.clone());
        self.position = (self.position + 1) % capacity;

        *self.references.entry(key.clone()).or_insert(0) += 1;
        self.entries.insert(key, value);

        displaced.and_then(|old| self.release(old))
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.position = 0;
        self.references.clear();
        self.entries.clear();
    }

    fn release(&mut self, key: String) -> Option<String> {
        let remaining = self.references.get_mut(&key)?;
        if *remaining > 1 {
            *remaining -= 1;
            return None;
        }
        self.references.remove(&key);
        self.entries.remove(&key);
        Some(key)
    }
}
