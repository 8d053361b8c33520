//! Thread pools used to run client sessions and job files.
//!
//! Three implementations of [`ThreadPool`] are provided: [`NaiveThreadPool`] starts a thread per
//! job, [`SharedQueueThreadPool`] feeds a fixed set of threads from a crossbeam channel and
//! [`RayonThreadPool`] wraps a rayon pool.
use crate::Result;

/// The interface shared by every thread pool
pub trait ThreadPool {
    /// creates a pool with `threads` threads
    ///
    /// # Errors
    /// returns an error if a thread (or the underlying pool) could not be created
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// runs `job` on a thread of the pool
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

mod naive;
mod rayon_pool;
mod shared_queue;

pub use self::naive::NaiveThreadPool;
pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;
