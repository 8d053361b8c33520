use crossbeam::channel::{self, Receiver, Sender};

use crate::{KvsError, Result};

/// A counting resource with a fixed number of numbered slots.
///
/// The free slot ids live in a bounded crossbeam channel. Acquiring a slot receives an id
/// (blocking while the channel is empty) and dropping the returned [`SlotGuard`] sends it back,
/// which wakes exactly one blocked acquirer.
#[derive(Debug, Clone)]
pub struct SlotPool {
    tx: Sender<usize>,
    rx: Receiver<usize>,
    capacity: usize,
}

impl SlotPool {
    /// creates a pool with `capacity` free slots, numbered `0..capacity`
    ///
    /// # Errors
    /// returns [`KvsError::Parsing`] if `capacity` is zero, since nothing could ever be acquired
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(KvsError::Parsing(
                "a slot pool needs a capacity of at least one".to_string(),
            ));
        }
        let (tx, rx) = channel::bounded(capacity);
        for id in 0..capacity {
            tx.send(id)
                .map_err(|e| KvsError::StringErr(format!("could not fill slot pool: {}", e)))?;
        }
        Ok(SlotPool { tx, rx, capacity })
    }

    /// the total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// the number of slots not currently held
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// takes a slot, blocking until one is free
    pub fn acquire(&self) -> SlotGuard {
        // the pool owns a sender, so the channel can never be disconnected
        let id = self
            .rx
            .recv()
            .unwrap_or_else(|_| unreachable!("slot pool channel disconnected"));
        SlotGuard {
            id,
            tx: self.tx.clone(),
        }
    }

    /// takes a slot if one is free right now
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        self.rx.try_recv().ok().map(|id| SlotGuard {
            id,
            tx: self.tx.clone(),
        })
    }
}

/// A held slot. The slot is given back to its pool when the guard is dropped.
#[derive(Debug)]
pub struct SlotGuard {
    id: usize,
    tx: Sender<usize>,
}

impl SlotGuard {
    /// the id of the held slot
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // cannot fail: the channel has room for every id and the pool keeps a receiver alive
        let _ = self.tx.send(self.id);
    }
}
