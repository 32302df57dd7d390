//! Dictionary encoding for string columns
//!
//! Each string column owns a `StringDictionary`: distinct values are stored
//! once and rows hold a `StringId`. Pivot workloads group and split on
//! low-cardinality string columns (lines, directions, stop names), so the
//! dictionary keeps both memory and key hashing cheap.
//!
//! Entries are reference counted. When the last row referencing a value is
//! overwritten or removed the slot is freed and its ID recycled.
//!
//! ```
//! use livepivot::StringDictionary;
//!
//! let mut dict = StringDictionary::new();
//! let a = dict.intern("uptown");
//! let b = dict.intern("downtown");
//! assert_eq!(dict.intern("uptown"), a);
//! assert_ne!(a, b);
//! assert_eq!(dict.resolve(a), Some("uptown"));
//! ```

use std::collections::HashMap;

/// Dictionary slot identifier.
pub type StringId = u32;

#[derive(Debug, Clone, Default)]
pub struct StringDictionary {
    ids: HashMap<String, StringId>,
    values: Vec<String>,
    ref_counts: Vec<u32>,
    free_ids: Vec<StringId>,
}

impl StringDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a value, adding one reference.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.ids.get(s) {
            self.ref_counts[id as usize] += 1;
            return id;
        }

        let id = match self.free_ids.pop() {
            Some(free_id) => {
                self.values[free_id as usize] = s.to_string();
                self.ref_counts[free_id as usize] = 1;
                free_id
            }
            None => {
                self.values.push(s.to_string());
                self.ref_counts.push(1);
                (self.values.len() - 1) as StringId
            }
        };

        self.ids.insert(s.to_string(), id);
        id
    }

    /// Drop one reference; the slot is recycled when the count reaches zero.
    pub fn release(&mut self, id: StringId) {
        let idx = id as usize;
        if idx >= self.ref_counts.len() || self.ref_counts[idx] == 0 {
            return;
        }
        self.ref_counts[idx] -= 1;
        if self.ref_counts[idx] == 0 {
            self.ids.remove(&self.values[idx]);
            self.values[idx].clear();
            self.free_ids.push(id);
        }
    }

    /// Resolve a live ID.
    pub fn resolve(&self, id: StringId) -> Option<&str> {
        let idx = id as usize;
        match self.ref_counts.get(idx) {
            Some(&count) if count > 0 => Some(self.values[idx].as_str()),
            _ => None,
        }
    }

    /// Number of distinct live values.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.values.clear();
        self.ref_counts.clear();
        self.free_ids.clear();
    }

    pub fn stats(&self) -> DictionaryStats {
        DictionaryStats {
            distinct_values: self.len(),
            total_references: self.ref_counts.iter().map(|&r| r as u64).sum(),
            free_slots: self.free_ids.len(),
        }
    }
}

/// Dictionary occupancy counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryStats {
    pub distinct_values: usize,
    pub total_references: u64,
    pub free_slots: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_dedup() {
        let mut dict = StringDictionary::new();
        let a = dict.intern("A");
        let b = dict.intern("C");
        assert_eq!(dict.intern("A"), a);
        assert_ne!(a, b);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.stats().total_references, 3);
    }

    #[test]
    fn test_dictionary_release_recycles_slot() {
        let mut dict = StringDictionary::new();
        let first = dict.intern("N");
        dict.intern("S");

        dict.release(first);
        assert!(dict.resolve(first).is_none());
        assert_eq!(dict.len(), 1);

        let reused = dict.intern("E");
        assert_eq!(reused, first);
        assert_eq!(dict.resolve(reused), Some("E"));
    }

    #[test]
    fn test_dictionary_stats() {
        let mut dict = StringDictionary::new();
        dict.intern("x");
        dict.intern("y");
        dict.intern("x");
        let id = dict.intern("z");
        dict.release(id);

        let stats = dict.stats();
        assert_eq!(stats.distinct_values, 2);
        assert_eq!(stats.total_references, 3);
        assert_eq!(stats.free_slots, 1);
    }

    #[test]
    fn test_dictionary_empty_string() {
        let mut dict = StringDictionary::new();
        let id = dict.intern("");
        assert_eq!(dict.resolve(id), Some(""));
    }
}
