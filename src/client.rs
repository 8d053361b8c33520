use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::pipe::{create_fifo, open_reader, open_writer, remove_fifo};
use crate::protocol::{ConnectRequest, Notification, OpCode, Request, Response, ResultCode};
use crate::{KvsError, Result};

/// `KvsClient` contains the functionality for communication with a [`KvsServer`]
///
/// The client owns three FIFOs: it writes requests into the request pipe, reads answers from the
/// response pipe and receives notifications on the notification pipe. The notification pipe is
/// kept open for reading and writing for the whole session, so the server can deliver
/// notifications at any time without waiting for a reader.
///
/// [`KvsServer`]: ./struct.KvsServer.html
#[derive(Debug)]
pub struct KvsClient {
    request: PathBuf,
    response: PathBuf,
    notification: PathBuf,
    notification_pipe: File,
}

impl KvsClient {
    /// creates the client's FIFOs and registers with the server listening on `server`.
    ///
    /// # Errors
    /// returns [`KvsError::TooLong`] if a path does not fit in a CONNECT request, an IO error
    /// if a pipe could not be created or opened, and [`KvsError::StringErr`] if the server
    /// refused the connection
    pub fn connect(request: &Path, response: &Path, notification: &Path, server: &Path) -> Result<Self> {
        let connect = Request::Connect(ConnectRequest {
            request: request.to_path_buf(),
            response: response.to_path_buf(),
            notification: notification.to_path_buf(),
        })
        .encode()?;

        for path in [request, response, notification] {
            create_fifo(path)?;
        }
        let notification_pipe = OpenOptions::new()
            .read(true)
            .write(true)
            .open(notification)?;

        let client = KvsClient {
            request: request.to_path_buf(),
            response: response.to_path_buf(),
            notification: notification.to_path_buf(),
            notification_pipe,
        };

        match client.register(server, &connect) {
            Ok(true) => {
                debug!("connected to {:?}", server);
                Ok(client)
            }
            Ok(false) => {
                client.remove_pipes();
                Err(KvsError::StringErr("the server refused the connection".to_string()))
            }
            Err(e) => {
                client.remove_pipes();
                Err(e)
            }
        }
    }

    /// subscribes to `key`. Returns `true` if the server answered with success.
    pub fn subscribe(&mut self, key: &str) -> Result<bool> {
        self.call(Request::Subscribe { key: key.to_string() }, OpCode::Subscribe)
    }

    /// unsubscribes from `key`. Returns `true` if the server answered with success.
    pub fn unsubscribe(&mut self, key: &str) -> Result<bool> {
        self.call(Request::Unsubscribe { key: key.to_string() }, OpCode::Unsubscribe)
    }

    /// ends the session and removes the client's FIFOs.
    /// Returns `true` if the server answered with success.
    pub fn disconnect(mut self) -> Result<bool> {
        let ok = self.call(Request::Disconnect, OpCode::Disconnect);
        self.remove_pipes();
        ok
    }

    /// an iterator over the notifications sent to this client.
    ///
    /// The iterator blocks until the next notification arrives and never ends on its own.
    pub fn notifications(&self) -> Result<Notifications> {
        Ok(Notifications {
            pipe: self.notification_pipe.try_clone()?,
        })
    }

    fn register(&self, server: &Path, connect: &[u8]) -> Result<bool> {
        let mut server_pipe = open_writer(server)?;
        server_pipe.write_all(connect)?;
        drop(server_pipe);
        self.read_response(OpCode::Connect)
    }

    fn call(&mut self, request: Request, op: OpCode) -> Result<bool> {
        let frame = request.encode()?;
        let mut pipe = open_writer(&self.request)?;
        pipe.write_all(&frame)?;
        drop(pipe);
        self.read_response(op)
    }

    fn read_response(&self, op: OpCode) -> Result<bool> {
        let mut pipe = open_reader(&self.response)?;
        let response = Response::read_from(&mut pipe)?;
        if response.op != op {
            return Err(KvsError::Protocol(format!(
                "expected an answer to {:?}, got {:?}",
                op, response.op
            )));
        }
        Ok(response.result == ResultCode::Success)
    }

    fn remove_pipes(&self) {
        for path in [&self.request, &self.response, &self.notification] {
            if let Err(e) = remove_fifo(path) {
                warn!("could not remove {:?}: {}", path, e);
            }
        }
    }
}

/// Notifications received by a [`KvsClient`], see [`KvsClient::notifications`]
#[derive(Debug)]
pub struct Notifications {
    pipe: File,
}

impl Iterator for Notifications {
    type Item = Result<Notification>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(Notification::read_from(&mut self.pipe))
    }
}
