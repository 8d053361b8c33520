use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::TABLE_SIZE;
use crate::{KvsError, Result};

/// The kind of thread pool used to run sessions and jobs
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// a new thread per job
    Naive,
    /// a fixed set of threads fed by a shared queue
    Shared,
    /// a rayon thread pool
    Rayon,
}

/// Server configuration options, loaded from a JSON file and/or the command line
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// directory containing `.job` files to run at start-up
    pub jobs_dir: Option<PathBuf>,

    /// path of the FIFO clients connect through; no FIFO is served when `None`
    pub registration_pipe: Option<PathBuf>,

    /// maximum number of concurrently connected clients
    pub max_sessions: usize,

    /// number of threads running job files
    pub max_threads: u32,

    /// maximum number of backups being written at the same time
    pub max_backups: usize,

    /// number of buckets in the hash table
    pub buckets: usize,

    /// how long a session waits for its client to open the response pipe
    pub response_timeout_ms: u64,

    /// the thread pool implementation
    pub pool: PoolKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            jobs_dir: None,
            registration_pipe: None,
            max_sessions: 8,
            max_threads: 4,
            max_backups: 2,
            buckets: TABLE_SIZE,
            response_timeout_ms: 5000,
            pool: PoolKind::Shared,
        }
    }
}

impl ServerConfig {
    /// reads a configuration from the JSON file at `path`. Missing fields take their default.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// checks that the configuration can actually run something
    ///
    /// # Errors
    /// returns [`KvsError::Parsing`] describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.jobs_dir.is_none() && self.registration_pipe.is_none() {
            return Err(KvsError::Parsing(
                "either a jobs directory or a registration pipe is needed".to_string(),
            ));
        }
        let limits = [
            ("max_sessions", self.max_sessions),
            ("max_threads", self.max_threads as usize),
            ("max_backups", self.max_backups),
            ("buckets", self.buckets),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(KvsError::Parsing(format!("{} must be greater than zero", name)));
        }
        // every session gets its own pool thread
        if u32::try_from(self.max_sessions).is_err() {
            return Err(KvsError::Parsing(format!(
                "max_sessions must be at most {}",
                u32::MAX
            )));
        }
        Ok(())
    }

    /// `response_timeout_ms` as a `Duration`
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}
