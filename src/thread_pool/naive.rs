use std::thread;

use tracing::error;

use super::ThreadPool;
use crate::Result;

/// a simple thread-pool that is not actually a pool. It starts a new thread on every spawn
/// request, which gives one thread per connected client when used for sessions
#[derive(Debug)]
pub struct NaiveThreadPool {
    threads: u32,
}

impl NaiveThreadPool {
    /// the size hint this pool was created with
    pub fn threads(&self) -> u32 {
        self.threads
    }
}

impl ThreadPool for NaiveThreadPool {
    fn new(threads: u32) -> Result<Self> {
        Ok(NaiveThreadPool { threads })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = thread::Builder::new().spawn(job) {
            error!("Failed to spawn a thread: {}", e);
        }
    }
}
