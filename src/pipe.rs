//! Helpers for creating and opening named pipes (FIFOs).
//!
//! Opening a FIFO blocks until the other end is opened too. The non-blocking writer variants
//! are used where the server must not wait on a client that may never show up.
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use nix::libc;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::debug;

use crate::Result;

// how long to sleep between attempts to open a pipe that has no reader yet
const RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// creates a FIFO at `path` with mode 0666, replacing any file already there
pub fn create_fifo(path: &Path) -> Result<()> {
    remove_fifo(path)?;
    mkfifo(path, Mode::from_bits_truncate(0o666))?;
    debug!("created fifo {:?}", path);
    Ok(())
}

/// removes the FIFO at `path`. A missing file is not an error.
pub fn remove_fifo(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// opens `path` for reading, blocking until a writer opens it
pub fn open_reader(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// opens `path` for writing, blocking until a reader opens it
pub fn open_writer(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).open(path)
}

/// opens `path` for writing without waiting for a reader.
///
/// On a FIFO this fails with `ENXIO` when nobody has it open for reading. On a regular file the
/// data is appended.
pub fn open_nonblocking_writer(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .append(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

/// opens `path` for writing, retrying while the pipe has no reader, until `timeout` elapses.
///
/// # Errors
/// returns an error of kind `TimedOut` if no reader showed up in time, or the underlying error
/// if the pipe could not be opened for any other reason
pub fn open_writer_with_timeout(path: &Path, timeout: Duration) -> io::Result<File> {
    let deadline = Instant::now() + timeout;
    loop {
        match open_nonblocking_writer(path) {
            Ok(file) => return Ok(file),
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                if Instant::now() >= deadline {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no reader on {:?} after {:?}", path, timeout),
                    ));
                }
                thread::sleep(RETRY_INTERVAL);
            }
            Err(e) => return Err(e),
        }
    }
}
