use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// type alias for all operations on a [`KvStore`] that could fail with a [`KvsError`]
///
/// [`KvStore`]: ./struct.KvStore.html
pub type Result<T> = std::result::Result<T, KvsError>;

/// The Error variants used throughout this crate.
///
/// Lower level errors from std, `serde_json` and `nix` are wrapped with `#[from]` so that `?`
/// can be used on them directly.
#[derive(Debug, Error)]
pub enum KvsError {
    /// variant for errors caused by file or pipe IO
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// a configuration file could not be decoded
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// a named pipe could not be created or removed
    #[error("pipe error: {0}")]
    Pipe(#[from] nix::Error),

    /// an allocation needed to grow the table or a subscriber list failed
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// variant for errors when a key was not found in the store
    #[error("Key not found")]
    KeyNotFound,

    /// a thread panicked while holding the table lock
    #[error("the store lock was poisoned")]
    Poisoned,

    /// a key or value exceeds the maximum string size
    #[error("{what} is {len} bytes long, the maximum is {max}")]
    TooLong {
        /// what was too long ("key", "value", "path")
        what: &'static str,
        /// the offending length
        len: usize,
        /// the maximum allowed length
        max: usize,
    },

    /// a malformed frame was read from, or could not be written to, a channel
    #[error("protocol error: {0}")]
    Protocol(String),

    /// a client tried to connect with an identity that already has an active session
    #[error("a session is already active for {0}")]
    SessionActive(String),

    /// errors when parsing command line arguments or job files
    #[error("parsing error: {0}")]
    Parsing(String),

    /// a general purpose error containing a description of what happened
    #[error("{0}")]
    StringErr(String),
}
