use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::pipe::{open_reader, open_writer_with_timeout};
use crate::protocol::{OpCode, Request, Response, ResultCode};
use crate::session::{Session, SessionSlot};
use crate::{KvsEngine, Result};

// pause after a failed read of the request channel before trying again
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The request/response channel pair of one session
pub trait SessionChannel: Send + 'static {
    /// waits for the next request.
    ///
    /// Returns `Ok(None)` when the client closed the channel without sending anything.
    fn next_request(&mut self) -> Result<Option<Request>>;

    /// sends `response` to the client
    fn respond(&mut self, response: Response) -> Result<()>;
}

/// A [`SessionChannel`] over the session's request and response FIFOs.
///
/// The request FIFO is opened for every request and closed after it, so exactly one opcode is
/// consumed per open. The response FIFO is opened with a timeout, so a client that never reads
/// its answer cannot hold the session thread forever.
#[derive(Debug, Clone)]
pub struct FifoChannel {
    request: PathBuf,
    response: PathBuf,
    timeout: Duration,
}

impl FifoChannel {
    /// creates a channel for `session`, waiting at most `timeout` for the client to read a response
    pub fn new(session: &Session, timeout: Duration) -> Self {
        FifoChannel {
            request: session.request.clone(),
            response: session.response.clone(),
            timeout,
        }
    }
}

impl SessionChannel for FifoChannel {
    fn next_request(&mut self) -> Result<Option<Request>> {
        let mut pipe = open_reader(&self.request)?;
        Request::read_from(&mut pipe)
    }

    fn respond(&mut self, response: Response) -> Result<()> {
        let mut pipe = open_writer_with_timeout(&self.response, self.timeout)?;
        response.write_to(&mut pipe)
    }
}

enum Control {
    Continue,
    Disconnect,
}

/// The protocol state machine of one active session.
///
/// A `Connection` only exists after a successful handshake. It owns the session's slot, so the
/// slot is released whenever the connection is dropped: after a DISCONNECT, or when the
/// handshake fails part way.
#[derive(Debug)]
pub struct Connection<E: KvsEngine, C: SessionChannel> {
    engine: E,
    channel: C,
    session: Session,
    // held only for its Drop
    _slot: SessionSlot,
}

impl<E: KvsEngine, C: SessionChannel> Connection<E, C> {
    /// activates `slot` for `session` and acknowledges the CONNECT.
    ///
    /// # Errors
    /// returns [`KvsError::SessionActive`] if the identity already has an active session (a
    /// failure code is sent to the client), or the transport error if the acknowledgement could
    /// not be written. In both cases `slot` is dropped, which frees it.
    ///
    /// [`KvsError::SessionActive`]: ./enum.KvsError.html#variant.SessionActive
    pub fn handshake(engine: E, session: Session, mut slot: SessionSlot, mut channel: C) -> Result<Self> {
        if let Err(e) = slot.activate(&session.identity) {
            let refused = Response::new(OpCode::Connect, ResultCode::Failure);
            if let Err(send_err) = channel.respond(refused) {
                warn!("could not refuse {}: {}", session.identity, send_err);
            }
            return Err(e);
        }
        channel.respond(Response::new(OpCode::Connect, ResultCode::Success))?;
        info!(identity = %session.identity, "client connected");

        Ok(Connection {
            engine,
            channel,
            session,
            _slot: slot,
        })
    }

    /// the session this connection serves
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// handles requests until the client disconnects.
    ///
    /// Read failures on the request channel are treated as transient: they are logged and the
    /// channel is reopened. A client that dies without sending DISCONNECT keeps its slot.
    #[instrument(skip(self), fields(identity = %self.session.identity))]
    pub fn serve(mut self) {
        loop {
            let request = match self.channel.next_request() {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => {
                    error!("could not read request: {}", e);
                    thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            };
            debug!(?request, "received request");

            if let Control::Disconnect = self.handle(request) {
                break;
            }
        }
        info!("client disconnected");
    }

    fn handle(&mut self, request: Request) -> Control {
        let endpoint = self.session.endpoint();
        match request {
            Request::Connect(_) => {
                warn!("ignoring CONNECT on an already connected session");
            }
            Request::Disconnect => {
                let removed = self.engine.unsubscribe_all(&endpoint);
                if let Err(e) = &removed {
                    error!("could not remove subscriptions: {}", e);
                }
                self.reply(OpCode::Disconnect, removed.is_ok());
                return Control::Disconnect;
            }
            Request::Subscribe { key } => {
                let ok = match self.engine.subscribe(&key, &endpoint) {
                    Ok(outcome) => {
                        debug!(%key, ?outcome, "subscribe");
                        outcome.is_success()
                    }
                    Err(e) => {
                        error!("could not subscribe to {}: {}", key, e);
                        false
                    }
                };
                self.reply(OpCode::Subscribe, ok);
            }
            Request::Unsubscribe { key } => {
                let ok = match self.engine.unsubscribe(&key, &endpoint) {
                    Ok(outcome) => {
                        debug!(%key, ?outcome, "unsubscribe");
                        outcome.is_success()
                    }
                    Err(e) => {
                        error!("could not unsubscribe from {}: {}", key, e);
                        false
                    }
                };
                self.reply(OpCode::Unsubscribe, ok);
            }
            Request::Unknown(op) => {
                warn!(op, "ignoring unknown opcode");
            }
        }
        Control::Continue
    }

    fn reply(&mut self, op: OpCode, ok: bool) {
        if let Err(e) = self.channel.respond(Response::new(op, ResultCode::from(ok))) {
            error!("could not answer {:?}: {}", op, e);
        }
    }
}
