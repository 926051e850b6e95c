//! Open-addressing hash table with double hashing
//!
//! Slot layout:
//! ```text
//! +-------+----------+----------------+-------+
//! | Empty | Deleted  | Occupied(k, v) | Empty |  ...  size = prime >= base_size
//! +-------+----------+----------------+-------+
//! ```
//!
//! A key's probe walk is `index = (h1 + attempt * (h2 + 1)) mod size` where
//! `h1` and `h2` are polynomial string hashes with bases 7 and 11. Deleted
//! slots are tombstones: lookups walk past them, only `Empty` ends a walk.
//!
//! The table grows (base size doubled) when occupied plus tombstoned slots
//! exceed 70% before an insert, and shrinks (base size halved, never below
//! [`INITIAL_BASE_SIZE`]) when live entries drop under 10% before a delete.

use super::prime::next_prime;

/// Hash base for the primary hash
pub const HT_PRIME_1: u64 = 7;

/// Hash base for the step hash
pub const HT_PRIME_2: u64 = 11;

/// Base size of a fresh table; resize never goes below this
pub const INITIAL_BASE_SIZE: usize = 601;

const RESIZE_UP_PERCENT: usize = 70;
const RESIZE_DOWN_PERCENT: usize = 10;

/// A key/value pair owned by the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Empty,
    Deleted,
    Occupied(DictionaryEntry),
}

/// Polynomial string hash `sum(prime^(len-1-i) * s[i]) mod n`, reduced at every step.
pub fn hash(s: &str, prime: u64, n: usize) -> usize {
    let n = n as u64;
    let mut hash = 0u64;
    for byte in s.bytes() {
        hash = (hash * prime + u64::from(byte)) % n;
    }
    hash as usize
}

/// Slot probed for `key` on the given attempt.
pub fn slot_index(key: &str, num_buckets: usize, attempt: usize) -> usize {
    ProbeSeq::new(key, num_buckets).index(attempt)
}

/// Probe walk for one key, bounded to one pass over the table.
#[derive(Debug, Clone)]
struct ProbeSeq {
    h1: usize,
    step: usize,
    size: usize,
    attempt: usize,
}

impl ProbeSeq {
    fn new(key: &str, size: usize) -> Self {
        let h1 = hash(key, HT_PRIME_1, size);
        let h2 = hash(key, HT_PRIME_2, size);
        // h2 + 1 == size would revisit h1 forever
        let step = match (h2 + 1) % size {
            0 => 1,
            step => step,
        };
        Self {
            h1,
            step,
            size,
            attempt: 0,
        }
    }

    fn index(&self, attempt: usize) -> usize {
        (self.h1 + attempt * self.step) % self.size
    }
}

impl Iterator for ProbeSeq {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.attempt >= self.size {
            return None;
        }
        let index = self.index(self.attempt);
        self.attempt += 1;
        Some(index)
    }
}

/// String-to-string hash table used as the translation dictionary
#[derive(Debug, Clone)]
pub struct HashTable {
    base_size: usize,
    slots: Vec<Slot>,
    count: usize,
    tombstones: usize,
}

impl HashTable {
    /// Create an empty table at the initial base size
    pub fn new() -> Self {
        Self::sized(INITIAL_BASE_SIZE)
    }

    fn sized(base_size: usize) -> Self {
        let size = next_prime(base_size);
        Self {
            base_size,
            slots: vec![Slot::Empty; size],
            count: 0,
            tombstones: 0,
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots (always prime)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn base_size(&self) -> usize {
        self.base_size
    }

    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Occupied plus tombstoned slots, as an integer percentage of capacity
    pub fn load_percent(&self) -> usize {
        (self.count + self.tombstones) * 100 / self.slots.len()
    }

    fn live_percent(&self) -> usize {
        self.count * 100 / self.slots.len()
    }

    /// Insert or overwrite `key`
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if self.load_percent() > RESIZE_UP_PERCENT {
            self.resize(self.base_size * 2);
        }
        self.insert_entry(DictionaryEntry {
            key: key.into(),
            value: value.into(),
        });
    }

    fn insert_entry(&mut self, entry: DictionaryEntry) {
        let mut first_deleted = None;

        for index in ProbeSeq::new(&entry.key, self.slots.len()) {
            match self.slots[index] {
                Slot::Empty => {
                    self.slots[index] = Slot::Occupied(entry);
                    self.count += 1;
                    return;
                }
                Slot::Deleted => {
                    first_deleted.get_or_insert(index);
                }
                Slot::Occupied(ref mut existing) => {
                    if existing.key == entry.key {
                        existing.value = entry.value;
                        return;
                    }
                }
            }
        }

        // Walk exhausted without an empty slot: fall back to a tombstone
        match first_deleted {
            Some(index) => {
                self.slots[index] = Slot::Occupied(entry);
                self.tombstones -= 1;
                self.count += 1;
            }
            None => {
                self.resize(self.base_size * 2);
                self.insert_entry(entry);
            }
        }
    }

    /// Look up the value stored for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        for index in ProbeSeq::new(key, self.slots.len()) {
            match &self.slots[index] {
                Slot::Empty => return None,
                Slot::Deleted => continue,
                Slot::Occupied(entry) => {
                    if entry.key == key {
                        return Some(&entry.value);
                    }
                }
            }
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Tombstone every slot on `key`'s probe walk that holds `key`.
    ///
    /// The walk does not stop at the first match. Returns whether anything
    /// was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        if self.live_percent() < RESIZE_DOWN_PERCENT {
            self.resize(self.base_size / 2);
        }

        let mut removed = 0;
        for index in ProbeSeq::new(key, self.slots.len()) {
            let hit = match &self.slots[index] {
                Slot::Empty => break,
                Slot::Deleted => false,
                Slot::Occupied(entry) => entry.key == key,
            };
            if hit {
                self.slots[index] = Slot::Deleted;
                removed += 1;
            }
        }

        self.count -= removed;
        self.tombstones += removed;
        removed > 0
    }

    /// Rebuild at `base_size`, dropping tombstones. No-op below the initial base size.
    fn resize(&mut self, base_size: usize) {
        if base_size < INITIAL_BASE_SIZE {
            return;
        }

        let mut resized = HashTable::sized(base_size);
        for slot in std::mem::take(&mut self.slots) {
            if let Slot::Occupied(entry) = slot {
                resized.insert_entry(entry);
            }
        }
        *self = resized;
    }

    /// Iterate live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied(entry) => Some((entry.key.as_str(), entry.value.as_str())),
            _ => None,
        })
    }
}

impl Default for HashTable {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for HashTable {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HashTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = HashTable::new();
        table.extend(iter);
        table
    }
}
