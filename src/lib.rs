#![deny(missing_docs)]
//! A concurrent, in-process key-value store (kvs) that maps [`String`] keys to [`String`] values,
//! shared by independent client processes through named pipes.
//!
//! This crate provides the [`KvStore`] engine itself, the [`KvsServer`] that serves it over
//! FIFOs, a [`KvsClient`], and the `kvs-server` and `kvs-client` executables.
//!
//! ## Storage
//! [`KvStore`] is a hash table with a fixed number of buckets and chained collision resolution,
//! guarded by a single reader/writer lock. Reads and enumeration take the lock shared, writes,
//! deletes and subscription changes take it exclusively. See the [`KvsEngine`] trait.
//!
//! ## Subscriptions and notifications
//! Every entry carries the list of notification pipes subscribed to its key. When a write
//! changes a value (a write of the same value does not), the subscriber list is copied under the
//! write lock and, once the lock is released, the [`Dispatcher`] sends `(key, value)` to every
//! subscriber. Delivery is best-effort: unreachable subscribers are logged and skipped.
//!
//! ## Sessions
//! Clients register on the server's FIFO with a CONNECT request naming their request, response
//! and notification pipes. The [`SessionManager`] admits at most a fixed number of concurrent
//! sessions; further connects block until a session ends. Each session runs its own
//! [`Connection`] loop on a thread, handling SUBSCRIBE, UNSUBSCRIBE and DISCONNECT. Disconnecting
//! removes all of the session's subscriptions and frees its slot.
//!
//! ## Protocol
//! See the [`protocol`] module for the exact byte layout of requests, responses and
//! notifications.
//!
//! ## Jobs and backups
//! The server can also run `.job` files (see the [`job`] module), scripts of WRITE, READ,
//! DELETE, SHOW, WAIT and BACKUP commands. A backup copies the table under the read lock and
//! writes the copy to `<job>-<n>.bck` on a separate thread, see [`BackupManager`].
//!
//! [`String`]: https://doc.rust-lang.org/std/string/struct.String.html

pub use backup::{backup_path, BackupHandle, BackupManager};
pub use client::{KvsClient, Notifications};
pub use config::{PoolKind, ServerConfig};
pub use connection::{Connection, FifoChannel, SessionChannel};
pub use engine::{KvStore, KvsEngine, SubscribeOutcome, UnsubscribeOutcome, WriteOutcome, TABLE_SIZE};
pub use error::{KvsError, Result};
pub use notify::Dispatcher;
pub use operations::{Kvs, DELETE_MISSING, READ_MISSING};
pub use server::KvsServer;
pub use session::{Session, SessionManager, SessionSlot, SlotState};
pub use slots::{SlotGuard, SlotPool};
pub use thread_pool::{NaiveThreadPool, RayonThreadPool, SharedQueueThreadPool, ThreadPool};

mod backup;
mod client;
mod config;
mod connection;
mod engine;
mod error;
pub mod job;
mod notify;
mod operations;
pub mod pipe;
pub mod protocol;
mod server;
mod session;
mod slots;
pub mod thread_pool;
