//! This module provides the key/value storage engine.
//!
//! The only implementation is [`KvStore`], a fixed-size chained hash table guarded by a single
//! reader/writer lock. Each entry of the table also carries the list of notification endpoints
//! subscribed to its key, so subscription changes are serialized with writes to the same table.
//!
//! [`KvStore`]: ./struct.KvStore.html
use crate::Result;

/// A trait for the functionality of a key/value storage engine with per-key subscriptions
pub trait KvsEngine: Clone + Send + 'static {
    /// writes `key` and `value`, creating the entry if it does not exist yet.
    ///
    /// The returned [`WriteOutcome`] reports whether the stored value changed and, if so, a copy
    /// of the key's subscriber list taken under the same exclusive lock as the write.
    fn write_tracked(&self, key: String, value: String) -> Result<WriteOutcome>;

    /// writes `key` and `value`, returning `true` if the key was created or its value changed.
    fn write(&self, key: String, value: String) -> Result<bool> {
        Ok(self.write_tracked(key, value)?.changed)
    }

    /// Gets the value associated with the given `key`
    ///
    /// Returns `None` if the given `key` does not exist.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Removes the given `key`, its value and its subscriber list from the store
    ///
    /// Returns the removed value, or `None` if the key was not found.
    fn delete(&self, key: &str) -> Result<Option<String>>;

    /// calls `visitor` with every key and value in the store, in bucket/chain order.
    ///
    /// The shared lock is held for the whole traversal, so `visitor` should be fast.
    fn for_each_entry<F>(&self, visitor: F) -> Result<()>
    where
        F: FnMut(&str, &str);

    /// copies every key/value pair out of the store under a single shared lock acquisition
    fn snapshot(&self) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        self.for_each_entry(|key, value| pairs.push((key.to_string(), value.to_string())))?;
        Ok(pairs)
    }

    /// adds `endpoint` to the subscriber list of `key`
    fn subscribe(&self, key: &str, endpoint: &str) -> Result<SubscribeOutcome>;

    /// removes `endpoint` from the subscriber list of `key`
    fn unsubscribe(&self, key: &str, endpoint: &str) -> Result<UnsubscribeOutcome>;

    /// removes `endpoint` from the subscriber lists of every key in the store.
    ///
    /// This is a linear scan of the whole table under the exclusive lock.
    /// Returns the number of subscriptions that were removed.
    fn unsubscribe_all(&self, endpoint: &str) -> Result<usize>;

    /// returns a copy of the subscriber list of `key`, or `None` if the key does not exist
    fn subscribers(&self, key: &str) -> Result<Option<Vec<String>>>;
}

/// The result of a write to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// `true` if the key was newly created or the stored value differs from the previous one
    pub changed: bool,
    /// the subscribers of the key at the time of the write, empty when nothing changed
    pub subscribers: Vec<String>,
}

mod entry;
mod table;

pub use self::entry::{SubscribeOutcome, UnsubscribeOutcome};
pub use self::table::{KvStore, TABLE_SIZE};
