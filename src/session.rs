use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::protocol::ConnectRequest;
use crate::slots::{SlotGuard, SlotPool};
use crate::{KvsError, Result};

/// The server side state of one connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// the client's name, derived from the file name of its request pipe
    pub identity: String,
    /// the pipe the client writes requests into
    pub request: PathBuf,
    /// the pipe the server answers on
    pub response: PathBuf,
    /// the pipe the server sends notifications to, also the session's subscriber endpoint
    pub notification: PathBuf,
}

impl Session {
    /// builds a session from the endpoints of a CONNECT request
    pub fn new(endpoints: ConnectRequest) -> Self {
        let identity = endpoints
            .request
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_string();
        Session {
            identity,
            request: endpoints.request,
            response: endpoints.response,
            notification: endpoints.notification,
        }
    }

    /// the notification endpoint as stored in subscriber lists
    pub fn endpoint(&self) -> String {
        self.notification.to_string_lossy().into_owned()
    }
}

/// The lifecycle of a session slot: `Free -> Reserved -> Active -> Free`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    /// nobody holds the slot
    Free,
    /// a connecting client was admitted and is doing its handshake
    Reserved,
    /// the handshake succeeded, the slot belongs to the named identity
    Active(String),
}

/// Bounds the number of concurrent sessions.
///
/// [`SessionManager::admit`] blocks while every slot is taken: the server stalls new connects
/// rather than rejecting them. Slots are released when the [`SessionSlot`] is dropped, so a
/// failed handshake or a finished disconnect gives the slot back on every path.
///
/// The manager never touches the store, so its lock and the table lock are never nested.
#[derive(Debug, Clone)]
pub struct SessionManager {
    pool: SlotPool,
    states: Arc<Mutex<Vec<SlotState>>>,
}

impl SessionManager {
    /// creates a manager allowing `max_sessions` concurrent sessions
    pub fn new(max_sessions: usize) -> Result<Self> {
        Ok(SessionManager {
            pool: SlotPool::new(max_sessions)?,
            states: Arc::new(Mutex::new(vec![SlotState::Free; max_sessions])),
        })
    }

    /// the maximum number of concurrent sessions
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// reserves a slot, blocking until one is free
    pub fn admit(&self) -> Result<SessionSlot> {
        let guard = self.pool.acquire();
        self.reserve(guard)
    }

    /// reserves a slot if one is free right now
    pub fn try_admit(&self) -> Result<Option<SessionSlot>> {
        self.pool
            .try_acquire()
            .map(|guard| self.reserve(guard))
            .transpose()
    }

    /// a copy of the state of every slot
    pub fn states(&self) -> Result<Vec<SlotState>> {
        Ok(lock(&self.states)?.clone())
    }

    /// the number of slots in the `Active` state
    pub fn active_sessions(&self) -> Result<usize> {
        Ok(lock(&self.states)?
            .iter()
            .filter(|state| matches!(state, SlotState::Active(_)))
            .count())
    }

    fn reserve(&self, guard: SlotGuard) -> Result<SessionSlot> {
        let slot = SessionSlot {
            guard,
            states: Arc::clone(&self.states),
        };
        lock(&self.states)?[slot.id()] = SlotState::Reserved;
        debug!(slot = slot.id(), "session slot reserved");
        Ok(slot)
    }
}

/// A reserved or active session slot, released on drop
#[derive(Debug)]
pub struct SessionSlot {
    guard: SlotGuard,
    states: Arc<Mutex<Vec<SlotState>>>,
}

impl SessionSlot {
    /// the slot number
    pub fn id(&self) -> usize {
        self.guard.id()
    }

    /// marks the slot active for `identity`.
    ///
    /// # Errors
    /// returns [`KvsError::SessionActive`] if another slot is already active for `identity`;
    /// the slot stays reserved
    pub fn activate(&mut self, identity: &str) -> Result<()> {
        let mut states = lock(&self.states)?;
        let taken = states.iter().enumerate().any(|(id, state)| {
            id != self.id() && matches!(state, SlotState::Active(other) if other == identity)
        });
        if taken {
            return Err(KvsError::SessionActive(identity.to_string()));
        }
        states[self.id()] = SlotState::Active(identity.to_string());
        info!(slot = self.id(), identity, "session active");
        Ok(())
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        states[self.guard.id()] = SlotState::Free;
        debug!(slot = self.guard.id(), "session slot released");
        // the guard field is dropped after this, handing the id back to the pool
    }
}

fn lock(states: &Mutex<Vec<SlotState>>) -> Result<MutexGuard<'_, Vec<SlotState>>> {
    states.lock().map_err(|_| KvsError::Poisoned)
}
