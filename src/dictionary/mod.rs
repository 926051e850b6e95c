//! Translation dictionaries
//!
//! This module provides:
//! - The hand-built open-addressing [`HashTable`]
//! - [`Dictionary`], an immutable snapshot shared read-only by sessions
//! - [`Vocab`], the pair of forward/reverse dictionaries loaded at startup

pub mod hash_table;
pub mod prime;
pub mod vocab;

pub use hash_table::{DictionaryEntry, HashTable, INITIAL_BASE_SIZE};
pub use vocab::{Direction, Vocab};

/// Read-only word map. Built once, then shared behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    table: HashTable,
}

impl Dictionary {
    /// Look up the translation of a (capitalized) word
    pub fn lookup(&self, word: &str) -> Option<&str> {
        self.table.get(word)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.table.iter()
    }
}

impl From<HashTable> for Dictionary {
    fn from(table: HashTable) -> Self {
        Self { table }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            table: iter.into_iter().collect(),
        }
    }
}
