/// The outcome of subscribing an endpoint to a key
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// the endpoint was appended to the subscriber list
    Added,
    /// the endpoint was already subscribed, the list is unchanged
    AlreadyPresent,
    /// there is no entry for the key
    KeyNotFound,
    /// the subscriber list could not grow, the list is unchanged
    OutOfMemory,
}

impl SubscribeOutcome {
    /// returns `true` if, after the operation, the endpoint is subscribed to the key
    pub fn is_success(&self) -> bool {
        matches!(self, SubscribeOutcome::Added | SubscribeOutcome::AlreadyPresent)
    }
}

/// The outcome of unsubscribing an endpoint from a key
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// the endpoint was removed from the subscriber list
    Removed,
    /// the endpoint was not subscribed, the list is unchanged
    NotPresent,
    /// there is no entry for the key
    KeyNotFound,
}

impl UnsubscribeOutcome {
    /// returns `true` if, after the operation, the endpoint is not subscribed to the key
    pub fn is_success(&self) -> bool {
        matches!(self, UnsubscribeOutcome::Removed | UnsubscribeOutcome::NotPresent)
    }
}

/// One record of the hash table: a key, its value and the endpoints subscribed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub(crate) key: String,
    pub(crate) value: String,
    // no duplicates, order is not significant
    subscribers: Vec<String>,
}

impl Entry {
    pub(crate) fn new(key: String, value: String) -> Self {
        Entry {
            key,
            value,
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn subscribers(&self) -> &[String] {
        &self.subscribers
    }

    /// appends `endpoint` unless it is already present.
    ///
    /// Both allocations (the list slot and the owned endpoint) are made before the list is
    /// touched, so a failure leaves the list exactly as it was.
    pub(crate) fn subscribe(&mut self, endpoint: &str) -> SubscribeOutcome {
        if self.subscribers.iter().any(|s| s == endpoint) {
            return SubscribeOutcome::AlreadyPresent;
        }

        let mut owned = String::new();
        if owned.try_reserve_exact(endpoint.len()).is_err()
            || self.subscribers.try_reserve(1).is_err()
        {
            return SubscribeOutcome::OutOfMemory;
        }
        owned.push_str(endpoint);
        self.subscribers.push(owned);
        SubscribeOutcome::Added
    }

    /// removes `endpoint` if present. The relative order of the remaining endpoints may change.
    pub(crate) fn unsubscribe(&mut self, endpoint: &str) -> UnsubscribeOutcome {
        match self.subscribers.iter().position(|s| s == endpoint) {
            Some(idx) => {
                self.subscribers.swap_remove(idx);
                UnsubscribeOutcome::Removed
            }
            None => UnsubscribeOutcome::NotPresent,
        }
    }
}
