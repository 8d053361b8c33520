use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};

use crate::backup::{BackupHandle, BackupManager};
use crate::notify::Dispatcher;
use crate::{KvsEngine, Result};

/// printed in place of the value of a key that `read` could not find
pub const READ_MISSING: &str = "KVSERROR";
/// printed for every key that `delete` could not find
pub const DELETE_MISSING: &str = "KVSMISSING";

/// The batch operations offered on top of a storage engine.
///
/// Writes that change a value are followed by a notification to the key's subscribers. Results
/// of reads, deletes and `show` are printed to a writer in the bracketed `[(key,value)...]` form.
#[derive(Debug, Clone)]
pub struct Kvs<E: KvsEngine> {
    engine: E,
    dispatcher: Dispatcher,
    backups: BackupManager<E>,
}

impl<E: KvsEngine> Kvs<E> {
    /// wraps `engine`, allowing `max_backups` backups to be written concurrently
    pub fn new(engine: E, max_backups: usize) -> Result<Self> {
        Ok(Kvs {
            backups: BackupManager::new(engine.clone(), max_backups)?,
            dispatcher: Dispatcher::new(),
            engine,
        })
    }

    /// the underlying storage engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// writes every pair, notifying subscribers of each key whose value changed.
    ///
    /// Each pair is written under its own exclusive lock and its notifications are sent after
    /// that lock is released. A pair that cannot be written is logged and skipped.
    ///
    /// Returns the number of keys that were created or changed.
    pub fn write(&self, pairs: &[(String, String)]) -> Result<usize> {
        let mut changed = 0;
        for (key, value) in pairs {
            let outcome = match self.engine.write_tracked(key.clone(), value.clone()) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Failed to write key pair ({},{}): {}", key, value, e);
                    continue;
                }
            };
            if !outcome.changed {
                continue;
            }
            changed += 1;
            if let Err(e) = self.dispatcher.notify(key, value, &outcome.subscribers) {
                warn!("could not notify subscribers of {}: {}", key, e);
            }
        }
        Ok(changed)
    }

    /// prints `[(key,value)...]` for every key, using `KVSERROR` for missing keys
    pub fn read<W: Write>(&self, keys: &[String], out: &mut W) -> Result<()> {
        let mut line = String::from("[");
        for key in keys {
            let value = self.engine.read(key)?;
            let _ = write!(line, "({},{})", key, value.as_deref().unwrap_or(READ_MISSING));
        }
        line.push_str("]\n");
        out.write_all(line.as_bytes())?;
        Ok(())
    }

    /// deletes every key, printing `[(key,KVSMISSING)...]` if at least one key was missing
    pub fn delete<W: Write>(&self, keys: &[String], out: &mut W) -> Result<()> {
        let mut missing = String::new();
        for key in keys {
            if self.engine.delete(key)?.is_none() {
                let _ = write!(missing, "({},{})", key, DELETE_MISSING);
            }
        }
        if !missing.is_empty() {
            out.write_all(format!("[{}]\n", missing).as_bytes())?;
        }
        Ok(())
    }

    /// prints every pair in the store as `[(key,value)(key,value)...]`.
    ///
    /// The pairs are copied out under the shared lock and printed after it is released.
    pub fn show<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut line = String::from("[");
        for (key, value) in self.engine.snapshot()? {
            let _ = write!(line, "({},{})", key, value);
        }
        line.push_str("]\n");
        out.write_all(line.as_bytes())?;
        Ok(())
    }

    /// blocks the calling thread for `delay_ms` milliseconds
    pub fn wait(&self, delay_ms: u64) {
        thread::sleep(Duration::from_millis(delay_ms));
    }

    /// starts backup number `seq` of `job_name` into `dir`, see [`BackupManager::backup`]
    pub fn backup(&self, job_name: &str, seq: u64, dir: &Path) -> Result<BackupHandle> {
        self.backups.backup(job_name, seq, dir)
    }
}
