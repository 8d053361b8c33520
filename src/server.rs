use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::connection::{Connection, FifoChannel};
use crate::pipe::{create_fifo, open_reader};
use crate::protocol::{ConnectRequest, Request};
use crate::session::{Session, SessionManager};
use crate::thread_pool::ThreadPool;
use crate::{KvsEngine, Result};

/// A named-pipe server in front of a key value storage engine.
///
/// The server listens for CONNECT requests on a registration FIFO. Each accepted client gets a
/// session slot from the [`SessionManager`] and its own [`Connection`] running on a thread of
/// the pool. When every slot is taken the accept loop blocks until a session ends.
///
/// The pool should have at least as many threads as the session manager has slots, otherwise
/// admitted sessions wait in the pool's queue before their handshake.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use pipekv::{KvStore, KvsServer, SessionManager};
/// use pipekv::thread_pool::{NaiveThreadPool, ThreadPool};
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let pool = NaiveThreadPool::new(4)?;
/// let sessions = SessionManager::new(4)?;
/// let server = KvsServer::new(KvStore::new(), pool, sessions, Duration::from_secs(5));
/// // server.run(Path::new("/tmp/kvs-register"))?;
/// # Ok(())
/// # }
/// ```
pub struct KvsServer<E: KvsEngine, P: ThreadPool> {
    /// the kvs engine shared by every session
    engine: E,
    /// the threads that run the sessions
    pool: P,
    sessions: SessionManager,
    response_timeout: Duration,
}

impl<E: KvsEngine, P: ThreadPool> KvsServer<E, P> {
    /// Create a new `KvsServer`.
    ///
    /// `response_timeout` bounds how long a session waits for its client to open the response
    /// pipe.
    pub fn new(engine: E, pool: P, sessions: SessionManager, response_timeout: Duration) -> Self {
        KvsServer {
            engine,
            pool,
            sessions,
            response_timeout,
        }
    }

    /// the session manager admitting clients to this server
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// creates the registration FIFO at `registration` and accepts clients on it forever.
    ///
    /// # Errors
    /// returns an error if the FIFO could not be created, or could no longer be opened
    pub fn run(self, registration: &Path) -> Result<()> {
        create_fifo(registration)?;
        info!("Listening on {:?}", registration);

        loop {
            let mut pipe = open_reader(registration)?;
            // several clients may write into one open of the pipe, read until all of them closed
            loop {
                match Request::read_from(&mut pipe) {
                    Ok(Some(Request::Connect(endpoints))) => self.accept(endpoints)?,
                    Ok(Some(other)) => warn!(?other, "unexpected request on the registration pipe"),
                    Ok(None) => break,
                    Err(e) => {
                        error!("Connection failed: {}", e);
                        break;
                    }
                }
            }
        }
    }

    /// admits a client, blocking while the session pool is full, and starts its session
    fn accept(&self, endpoints: ConnectRequest) -> Result<()> {
        let session = Session::new(endpoints);
        debug!(identity = %session.identity, "admitting client");
        let slot = self.sessions.admit()?;

        let engine = self.engine.clone();
        let timeout = self.response_timeout;
        self.pool.spawn(move || {
            let channel = FifoChannel::new(&session, timeout);
            match Connection::handshake(engine, session, slot, channel) {
                Ok(connection) => connection.serve(),
                Err(e) => error!("handshake failed: {}", e),
            }
        });
        Ok(())
    }
}
