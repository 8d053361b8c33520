//! The wire format spoken over the named pipes.
//!
//! Requests start with a one byte [`OpCode`] followed by fixed-width, NUL-padded fields.
//! Responses are always three bytes: the opcode as an ASCII digit, a result code (`'0'` success,
//! `'1'` failure) and a NUL terminator. Notifications are 82 bytes: the key and the value, each
//! space-padded to [`MAX_STRING_SIZE`] and followed by a NUL.
use std::convert::TryFrom;
use std::ffi::OsStr;
use std::fmt;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::{KvsError, Result};

/// maximum length, in bytes, of a key or a value
pub const MAX_STRING_SIZE: usize = 40;
/// maximum length, in bytes, of a pipe path sent in a CONNECT request
pub const MAX_PIPE_PATH_LENGTH: usize = 40;
/// width of a key (or value) field on the wire
pub const KEY_FIELD_LEN: usize = MAX_STRING_SIZE + 1;
/// length of a CONNECT payload: request, response and notification paths
pub const CONNECT_PAYLOAD_LEN: usize = 3 * MAX_PIPE_PATH_LENGTH;
/// length of a response message
pub const RESPONSE_LEN: usize = 3;
/// length of a notification message
pub const NOTIFICATION_LEN: usize = 2 * KEY_FIELD_LEN;

/// The operation codes a client can send
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// register a new session, sent on the server's registration pipe
    Connect = 1,
    /// end the session
    Disconnect = 2,
    /// subscribe to a key
    Subscribe = 3,
    /// unsubscribe from a key
    Unsubscribe = 4,
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> std::result::Result<Self, Self::Error> {
        match byte {
            1 => Ok(OpCode::Connect),
            2 => Ok(OpCode::Disconnect),
            3 => Ok(OpCode::Subscribe),
            4 => Ok(OpCode::Unsubscribe),
            other => Err(other),
        }
    }
}

/// The three endpoints a client sends when it connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// the pipe the client writes requests into
    pub request: PathBuf,
    /// the pipe the server writes responses into
    pub response: PathBuf,
    /// the pipe the server writes notifications into
    pub notification: PathBuf,
}

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// open a session
    Connect(ConnectRequest),
    /// close the session
    Disconnect,
    /// subscribe the session to `key`
    Subscribe {
        /// the key to subscribe to
        key: String,
    },
    /// unsubscribe the session from `key`
    Unsubscribe {
        /// the key to unsubscribe from
        key: String,
    },
    /// an opcode this server does not know, its payload (if any) is not consumed
    Unknown(u8),
}

impl Request {
    /// reads one request from `reader`.
    ///
    /// Returns `Ok(None)` if the reader is at end of file before the opcode.
    ///
    /// # Errors
    /// returns [`KvsError::Protocol`] if the payload is truncated or not valid UTF-8
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Request>> {
        let mut op = [0_u8; 1];
        loop {
            match reader.read(&mut op) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let request = match OpCode::try_from(op[0]) {
            Ok(OpCode::Connect) => {
                let mut buf = [0_u8; CONNECT_PAYLOAD_LEN];
                read_payload(reader, &mut buf)?;
                let mut paths = buf
                    .chunks(MAX_PIPE_PATH_LENGTH)
                    .map(|field| PathBuf::from(OsStr::from_bytes(trim_field(field))));
                Request::Connect(ConnectRequest {
                    request: paths.next().unwrap_or_default(),
                    response: paths.next().unwrap_or_default(),
                    notification: paths.next().unwrap_or_default(),
                })
            }
            Ok(OpCode::Disconnect) => Request::Disconnect,
            Ok(OpCode::Subscribe) => Request::Subscribe {
                key: read_key(reader)?,
            },
            Ok(OpCode::Unsubscribe) => Request::Unsubscribe {
                key: read_key(reader)?,
            },
            Err(unknown) => Request::Unknown(unknown),
        };
        Ok(Some(request))
    }

    /// encodes this request into its wire form
    ///
    /// # Errors
    /// returns [`KvsError::TooLong`] if a path or key does not fit in its field
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(1 + CONNECT_PAYLOAD_LEN);
        match self {
            Request::Connect(paths) => {
                buf.push(OpCode::Connect as u8);
                for path in [&paths.request, &paths.response, &paths.notification] {
                    put_field(
                        &mut buf,
                        "path",
                        path_bytes(path),
                        MAX_PIPE_PATH_LENGTH,
                        MAX_PIPE_PATH_LENGTH,
                        0,
                    )?;
                }
            }
            Request::Disconnect => buf.push(OpCode::Disconnect as u8),
            Request::Subscribe { key } => {
                buf.push(OpCode::Subscribe as u8);
                put_key(&mut buf, key)?;
            }
            Request::Unsubscribe { key } => {
                buf.push(OpCode::Unsubscribe as u8);
                put_key(&mut buf, key)?;
            }
            Request::Unknown(op) => buf.push(*op),
        }
        Ok(buf)
    }
}

/// Whether the server could carry out a request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResultCode {
    /// encoded as `'0'`
    Success,
    /// encoded as `'1'`
    Failure,
}

impl From<bool> for ResultCode {
    fn from(ok: bool) -> Self {
        if ok {
            ResultCode::Success
        } else {
            ResultCode::Failure
        }
    }
}

/// A response written by the server on a session's response pipe
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Response {
    /// the operation this response answers
    pub op: OpCode,
    /// the outcome of the operation
    pub result: ResultCode,
}

impl Response {
    /// builds a response for `op`
    pub fn new(op: OpCode, result: ResultCode) -> Self {
        Response { op, result }
    }

    /// encodes this response into its three byte wire form
    pub fn encode(&self) -> [u8; RESPONSE_LEN] {
        let result = match self.result {
            ResultCode::Success => b'0',
            ResultCode::Failure => b'1',
        };
        [b'0' + self.op as u8, result, 0]
    }

    /// decodes a response from its three byte wire form
    pub fn decode(buf: &[u8; RESPONSE_LEN]) -> Result<Response> {
        let op = buf[0]
            .checked_sub(b'0')
            .and_then(|op| OpCode::try_from(op).ok())
            .ok_or_else(|| KvsError::Protocol(format!("invalid response opcode {}", buf[0])))?;
        let result = match buf[1] {
            b'0' => ResultCode::Success,
            b'1' => ResultCode::Failure,
            other => {
                return Err(KvsError::Protocol(format!("invalid result code {}", other)));
            }
        };
        Ok(Response { op, result })
    }

    /// writes this response to `writer` with a single `write_all`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode())?;
        writer.flush()?;
        Ok(())
    }

    /// reads one response from `reader`
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Response> {
        let mut buf = [0_u8; RESPONSE_LEN];
        reader.read_exact(&mut buf)?;
        Response::decode(&buf)
    }
}

/// A key whose value changed, as delivered on a notification pipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// the key that changed
    pub key: String,
    /// its new value
    pub value: String,
}

impl Notification {
    /// builds a notification
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Notification {
            key: key.into(),
            value: value.into(),
        }
    }

    /// encodes this notification into its fixed 82 byte form
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(NOTIFICATION_LEN);
        put_padded(&mut buf, "key", self.key.as_bytes())?;
        put_padded(&mut buf, "value", self.value.as_bytes())?;
        Ok(buf)
    }

    /// decodes a notification from its fixed 82 byte form
    pub fn decode(buf: &[u8; NOTIFICATION_LEN]) -> Result<Notification> {
        let (key, value) = buf.split_at(KEY_FIELD_LEN);
        Ok(Notification {
            key: field_string(trim_padded(key))?,
            value: field_string(trim_padded(value))?,
        })
    }

    /// reads one notification from `reader`
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Notification> {
        let mut buf = [0_u8; NOTIFICATION_LEN];
        reader.read_exact(&mut buf)?;
        Notification::decode(&buf)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.key, self.value)
    }
}

fn read_payload<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => KvsError::Protocol("truncated request payload".into()),
        _ => KvsError::Io(e),
    })
}

fn read_key<R: Read>(reader: &mut R) -> Result<String> {
    let mut buf = [0_u8; KEY_FIELD_LEN];
    read_payload(reader, &mut buf)?;
    field_string(trim_field(&buf))
}

fn path_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_bytes()
}

// the content of a NUL padded field
fn trim_field(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

// the content of a space padded, NUL terminated field
fn trim_padded(field: &[u8]) -> &[u8] {
    let content = trim_field(field);
    let end = content
        .iter()
        .rposition(|&b| b != b' ')
        .map_or(0, |last| last + 1);
    &content[..end]
}

fn field_string(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| KvsError::Protocol(format!("field is not valid UTF-8: {}", e)))
}

fn put_field(
    buf: &mut Vec<u8>,
    what: &'static str,
    content: &[u8],
    max: usize,
    width: usize,
    pad: u8,
) -> Result<()> {
    if content.len() > max {
        return Err(KvsError::TooLong {
            what,
            len: content.len(),
            max,
        });
    }
    buf.extend_from_slice(content);
    buf.resize(buf.len() + width - content.len(), pad);
    Ok(())
}

fn put_key(buf: &mut Vec<u8>, key: &str) -> Result<()> {
    put_field(buf, "key", key.as_bytes(), MAX_STRING_SIZE, KEY_FIELD_LEN, 0)
}

fn put_padded(buf: &mut Vec<u8>, what: &'static str, content: &[u8]) -> Result<()> {
    put_field(buf, what, content, MAX_STRING_SIZE, MAX_STRING_SIZE, b' ')?;
    buf.push(0);
    Ok(())
}
