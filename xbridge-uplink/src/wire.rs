// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::fmt::{self, Display, Formatter};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Args, Error, Response, MAX_FRAME_LEN};

/// Where a native contract listens for the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CodeAddr {
    /// `tcp://host:port`
    Tcp(String),
    /// `unix:///path/to/socket`
    Unix(PathBuf),
}

impl FromStr for CodeAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(Error::InvalidAddr(s.to_owned().into()));
            }
            return Ok(Self::Tcp(addr.to_owned()));
        }
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(Error::InvalidAddr(s.to_owned().into()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        Err(Error::InvalidAddr(s.to_owned().into()))
    }
}

impl Display for CodeAddr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl CodeAddr {
    /// Opens a connection to a contract listening on this address.
    pub fn connect(&self) -> io::Result<Stream> {
        match self {
            Self::Tcp(addr) => {
                let stream = TcpStream::connect(addr)?;
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
            #[cfg(unix)]
            Self::Unix(path) => UnixStream::connect(path).map(Stream::Unix),
            #[cfg(not(unix))]
            Self::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }

    /// Starts listening on this address.
    ///
    /// A stale socket file left behind by a previous process is removed
    /// first.
    pub fn bind(&self) -> io::Result<Listener> {
        match self {
            Self::Tcp(addr) => TcpListener::bind(addr).map(Listener::Tcp),
            #[cfg(unix)]
            Self::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                UnixListener::bind(path).map(Listener::Unix)
            }
            #[cfg(not(unix))]
            Self::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }
}

/// A connected contract channel.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Self::Unix(s) => s.flush(),
        }
    }
}

/// A bound contract listener.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    pub fn accept(&self) -> io::Result<Stream> {
        match self {
            Self::Tcp(l) => {
                let (stream, _) = l.accept()?;
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
            #[cfg(unix)]
            Self::Unix(l) => l.accept().map(|(stream, _)| Stream::Unix(stream)),
        }
    }
}

/// A method invocation sent from the host to a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoke {
    pub ctx_id: u64,
    pub contract: String,
    pub method: String,
    pub args: Args,
    pub initiator: String,
    pub caller: String,
    pub auth_require: Vec<String>,
    pub transfer_amount: u128,
}

/// Frames sent from the host to a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Request {
    Invoke(Invoke),
    SyscallReply(SyscallReply),
}

/// Frames sent from a contract to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    Syscall(Syscall),
    Done(Response),
}

/// Requests a running contract makes back into the chain.
///
/// Object keys are scoped to the calling contract's own bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Syscall {
    GetObject {
        key: Vec<u8>,
    },
    PutObject {
        key: Vec<u8>,
        value: Vec<u8>,
    },
    DeleteObject {
        key: Vec<u8>,
    },
    Select {
        start: Vec<u8>,
        end: Vec<u8>,
    },
    Transfer {
        to: String,
        amount: u128,
    },
    EmitEvent {
        name: String,
        body: Vec<u8>,
    },
    Call {
        module: String,
        contract: String,
        method: String,
        args: Args,
    },
    Log {
        entry: String,
    },
}

/// A key-value pair returned by [`Syscall::Select`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// The host's answer to a [`Syscall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SyscallReply {
    Done,
    Value(Option<Vec<u8>>),
    Entries(Vec<Entry>),
    Response(Response),
    Error(String),
}

/// Writes `msg` as a length-prefixed JSON frame.
pub fn write_frame<W, T>(w: &mut W, msg: &T) -> Result<(), Error>
where
    W: Write,
    T: Serialize,
{
    let payload = serde_json::to_vec(msg)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(payload.len()));
    }

    let len = payload.len() as u32;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&payload)?;
    w.flush()?;

    Ok(())
}

/// Reads one length-prefixed JSON frame.
///
/// Returns [`Error::Closed`] if the peer closed the connection cleanly
/// between frames.
pub fn read_frame<R, T>(r: &mut R) -> Result<T, Error>
where
    R: Read,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    if let Err(err) = r.read_exact(&mut len_buf) {
        return Err(match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset => {
                Error::Closed
            }
            _ => err.into(),
        });
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;

    Ok(serde_json::from_slice(&payload)?)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn parse_addresses() -> Result<(), Error> {
        assert_eq!(
            "tcp://127.0.0.1:4000".parse::<CodeAddr>()?,
            CodeAddr::Tcp("127.0.0.1:4000".into())
        );
        assert_eq!(
            "unix:///tmp/code.sock".parse::<CodeAddr>()?,
            CodeAddr::Unix(PathBuf::from("/tmp/code.sock"))
        );
        assert!("http://localhost".parse::<CodeAddr>().is_err());
        assert!("tcp://".parse::<CodeAddr>().is_err());

        let addr = CodeAddr::Tcp("0.0.0.0:1".into());
        assert_eq!(addr.to_string().parse::<CodeAddr>()?, addr);

        Ok(())
    }

    #[test]
    fn frames_in_sequence() -> Result<(), Error> {
        let mut buf = Vec::new();
        write_frame(
            &mut buf,
            &Message::Syscall(Syscall::PutObject {
                key: b"alice".to_vec(),
                value: b"1".to_vec(),
            }),
        )?;
        write_frame(&mut buf, &Message::Done(Response::ok("1")))?;

        let mut cursor = Cursor::new(buf);
        let first: Message = read_frame(&mut cursor)?;
        let second: Message = read_frame(&mut cursor)?;

        assert!(matches!(
            first,
            Message::Syscall(Syscall::PutObject { .. })
        ));
        assert_eq!(second, Message::Done(Response::ok("1")));

        let closed = read_frame::<_, Message>(&mut cursor);
        assert!(matches!(closed, Err(Error::Closed)));

        Ok(())
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let len = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        let mut cursor = Cursor::new(len.to_vec());
        let res = read_frame::<_, Message>(&mut cursor);
        assert!(matches!(res, Err(Error::FrameTooLarge(_))));
    }
}
