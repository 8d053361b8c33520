use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::slots::{SlotGuard, SlotPool};
use crate::{KvsEngine, KvsError, Result};

/// Takes point-in-time snapshots of the store and writes them to backup files.
///
/// A backup copies every pair out of the store under one acquisition of the shared lock, then
/// releases the lock and serializes the copy on a dedicated thread. Writes issued after
/// [`BackupManager::backup`] returns are never part of that backup, and the store is only
/// blocked for the duration of the copy, never for the file I/O.
///
/// At most `max_concurrent` backups are in flight; further calls block until one finishes.
#[derive(Debug, Clone)]
pub struct BackupManager<E: KvsEngine> {
    engine: E,
    slots: SlotPool,
}

impl<E: KvsEngine> BackupManager<E> {
    /// creates a manager allowing `max_concurrent` backups to be written at the same time
    pub fn new(engine: E, max_concurrent: usize) -> Result<Self> {
        Ok(BackupManager {
            engine,
            slots: SlotPool::new(max_concurrent)?,
        })
    }

    /// snapshots the store and starts writing it to `dir/<job_name>-<seq>.bck`.
    ///
    /// Returns as soon as the snapshot is taken; use [`BackupHandle::wait`] to wait for the file.
    ///
    /// # Errors
    /// returns an error if the snapshot could not be taken or the writer thread could not start
    pub fn backup(&self, job_name: &str, seq: u64, dir: &Path) -> Result<BackupHandle> {
        let slot = self.slots.acquire();
        let pairs = self.engine.snapshot()?;
        let path = backup_path(dir, job_name, seq);
        debug!(?path, pairs = pairs.len(), "snapshot taken");

        let file_path = path.clone();
        let handle = thread::Builder::new()
            .name(format!("backup-{}-{}", job_name, seq))
            .spawn(move || write_backup(&file_path, &pairs, slot))?;

        Ok(BackupHandle { path, handle })
    }
}

/// the path of backup number `seq` of `job_name` inside `dir`
pub fn backup_path(dir: &Path, job_name: &str, seq: u64) -> PathBuf {
    dir.join(format!("{}-{}.bck", job_name, seq))
}

/// A backup being written in the background
#[derive(Debug)]
pub struct BackupHandle {
    path: PathBuf,
    handle: JoinHandle<Result<()>>,
}

impl BackupHandle {
    /// the file this backup is written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// waits for the backup file to be completely written
    pub fn wait(self) -> Result<PathBuf> {
        self.handle
            .join()
            .map_err(|_| KvsError::StringErr(format!("backup thread for {:?} panicked", self.path)))??;
        Ok(self.path)
    }
}

// the slot is held until the file is written
fn write_backup(path: &Path, pairs: &[(String, String)], _slot: SlotGuard) -> Result<()> {
    let result = write_pairs(path, pairs);
    match &result {
        Ok(()) => info!("backup written to {:?}", path),
        Err(e) => error!("could not write backup {:?}: {}", path, e),
    }
    result
}

/// writes one `(key, value)` line per pair
fn write_pairs(path: &Path, pairs: &[(String, String)]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (key, value) in pairs {
        writeln!(writer, "({}, {})", key, value)?;
    }
    writer.flush()?;
    Ok(())
}
