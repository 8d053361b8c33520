use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, instrument};

use super::entry::Entry;
use super::{KvsEngine, SubscribeOutcome, UnsubscribeOutcome, WriteOutcome};
use crate::error::{KvsError, Result};
use crate::protocol::MAX_STRING_SIZE;

/// the default number of buckets in a [`KvStore`]
pub const TABLE_SIZE: usize = 26;

/// The primary struct for working with the store.
///
/// A `KvStore` is a cheap handle: cloning it gives another handle to the same table, which is
/// how the connection handlers, the job runners and the backup manager share it.
///
/// The table has a fixed number of buckets chosen at creation time. Keys are hashed with the
/// classic `hash * 33 + byte` function and collisions are chained inside the bucket. The whole
/// table is guarded by one reader/writer lock: `read`, `for_each_entry` and `subscribers` take it
/// shared, every mutation takes it exclusively.
#[derive(Debug, Clone)]
pub struct KvStore {
    table: Arc<RwLock<Table>>,
}

#[derive(Debug)]
struct Table {
    // each bucket is a chain of entries in insertion order
    buckets: Vec<Vec<Entry>>,
}

impl KvStore {
    /// creates an empty store with [`TABLE_SIZE`] buckets
    pub fn new() -> Self {
        KvStore {
            table: Arc::new(RwLock::new(Table {
                buckets: vec![Vec::new(); TABLE_SIZE],
            })),
        }
    }

    /// creates an empty store with `buckets` buckets.
    ///
    /// # Errors
    /// returns [`KvsError::Parsing`] if `buckets` is zero, or [`KvsError::OutOfMemory`] if the
    /// bucket array could not be allocated
    #[instrument]
    pub fn with_buckets(buckets: usize) -> Result<Self> {
        if buckets == 0 {
            return Err(KvsError::Parsing(
                "the store needs at least one bucket".to_string(),
            ));
        }
        let mut array = Vec::new();
        array.try_reserve_exact(buckets)?;
        array.resize_with(buckets, Vec::new);
        debug!("created store with {} buckets", buckets);

        Ok(KvStore {
            table: Arc::new(RwLock::new(Table { buckets: array })),
        })
    }

    fn shared(&self) -> Result<RwLockReadGuard<'_, Table>> {
        self.table.read().map_err(|_| KvsError::Poisoned)
    }

    fn exclusive(&self) -> Result<RwLockWriteGuard<'_, Table>> {
        self.table.write().map_err(|_| KvsError::Poisoned)
    }
}

impl Default for KvStore {
    fn default() -> Self {
        KvStore::new()
    }
}

impl Table {
    fn bucket_of(&self, key: &str) -> usize {
        (hash(key) % self.buckets.len() as u64) as usize
    }

    fn find(&self, key: &str) -> Option<&Entry> {
        self.buckets[self.bucket_of(key)]
            .iter()
            .find(|entry| entry.key == key)
    }

    fn find_mut(&mut self, key: &str) -> Option<&mut Entry> {
        let idx = self.bucket_of(key);
        self.buckets[idx].iter_mut().find(|entry| entry.key == key)
    }
}

/// djb2: `hash * 33 + byte`, starting from 5381
fn hash(key: &str) -> u64 {
    key.bytes()
        .fold(5381_u64, |h, b| h.wrapping_mul(33).wrapping_add(u64::from(b)))
}

fn check_len(what: &'static str, s: &str) -> Result<()> {
    if s.len() > MAX_STRING_SIZE {
        return Err(KvsError::TooLong {
            what,
            len: s.len(),
            max: MAX_STRING_SIZE,
        });
    }
    Ok(())
}

impl KvsEngine for KvStore {
    /// inserts `key` and `value` into the table, overwriting any existing value.
    ///
    /// # Errors
    /// returns [`KvsError::TooLong`] if the key or value exceed [`MAX_STRING_SIZE`], and
    /// [`KvsError::OutOfMemory`] if a new entry could not be allocated. In both cases the
    /// table is left untouched.
    fn write_tracked(&self, key: String, value: String) -> Result<WriteOutcome> {
        check_len("key", &key)?;
        check_len("value", &value)?;

        let mut table = self.exclusive()?;
        if let Some(entry) = table.find_mut(&key) {
            if entry.value == value {
                return Ok(WriteOutcome::default());
            }
            entry.value = value;
            return Ok(WriteOutcome {
                changed: true,
                subscribers: entry.subscribers().to_vec(),
            });
        }

        let idx = table.bucket_of(&key);
        let bucket = &mut table.buckets[idx];
        bucket.try_reserve(1)?;
        bucket.push(Entry::new(key, value));

        Ok(WriteOutcome {
            changed: true,
            subscribers: Vec::new(),
        })
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let table = self.shared()?;
        Ok(table.find(key).map(|entry| entry.value.clone()))
    }

    fn delete(&self, key: &str) -> Result<Option<String>> {
        let mut table = self.exclusive()?;
        let idx = table.bucket_of(key);
        let bucket = &mut table.buckets[idx];
        // chain order is not significant, but keep it stable for readable dumps
        Ok(bucket
            .iter()
            .position(|entry| entry.key == key)
            .map(|pos| bucket.remove(pos).value))
    }

    fn for_each_entry<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&str, &str),
    {
        let table = self.shared()?;
        for entry in table.buckets.iter().flatten() {
            visitor(&entry.key, &entry.value);
        }
        Ok(())
    }

    fn subscribe(&self, key: &str, endpoint: &str) -> Result<SubscribeOutcome> {
        let mut table = self.exclusive()?;
        Ok(match table.find_mut(key) {
            Some(entry) => entry.subscribe(endpoint),
            None => SubscribeOutcome::KeyNotFound,
        })
    }

    fn unsubscribe(&self, key: &str, endpoint: &str) -> Result<UnsubscribeOutcome> {
        let mut table = self.exclusive()?;
        Ok(match table.find_mut(key) {
            Some(entry) => entry.unsubscribe(endpoint),
            None => UnsubscribeOutcome::KeyNotFound,
        })
    }

    fn unsubscribe_all(&self, endpoint: &str) -> Result<usize> {
        let mut table = self.exclusive()?;
        let removed = table
            .buckets
            .iter_mut()
            .flatten()
            .map(|entry| entry.unsubscribe(endpoint))
            .filter(|outcome| *outcome == UnsubscribeOutcome::Removed)
            .count();
        debug!(endpoint, removed, "removed all subscriptions");
        Ok(removed)
    }

    fn subscribers(&self, key: &str) -> Result<Option<Vec<String>>> {
        let table = self.shared()?;
        Ok(table.find(key).map(|entry| entry.subscribers().to_vec()))
    }
}
