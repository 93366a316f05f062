// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Transport abstraction: `listen`/`dial` over self-describing path
//! addresses, with TCP and WebSocket variants behind one interface.
//!
//! Sends are serialized per connection; receives are not mutually excluded
//! with sends. Accept and receive futures are cancel-safe: dropping them
//! releases the operation promptly, and closing the listener or connection
//! surfaces [`TransportError::Closed`] to blocked callers.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::bifrost::codec::{CodecError, Frame};
use crate::bifrost::tcp::{TcpFrameConn, TcpFrameListener};
use crate::bifrost::ws::{WsFrameConn, WsFrameListener};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Address does not name a known transport.
    #[error("unsupported address scheme")]
    UnsupportedScheme,
    /// Address body is malformed.
    #[error("malformed address")]
    BadAddress,
    /// Wire format failure; fatal to the connection.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// Connection or listener closed while an operation was in flight.
    #[error("closed")]
    Closed,
    /// The operation is not available on this transport variant.
    #[error("unsupported on this transport")]
    Unsupported,
    /// WebSocket protocol failure.
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// Underlying I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Human-readable, self-describing transport address.
///
/// `/tcp/127.0.0.1:9001` or `/ws/host:443`. Parsed by transport selection
/// only; the codec never sees addresses.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathAddr {
    /// Raw TCP, one encoded frame after another on the stream.
    Tcp(String),
    /// WebSocket, one encoded frame per binary message.
    Ws(String),
}

impl PathAddr {
    /// The host:port body of the address.
    pub fn authority(&self) -> &str {
        match self {
            PathAddr::Tcp(a) | PathAddr::Ws(a) => a,
        }
    }
}

impl fmt::Display for PathAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathAddr::Tcp(a) => write!(f, "/tcp/{a}"),
            PathAddr::Ws(a) => write!(f, "/ws/{a}"),
        }
    }
}

impl FromStr for PathAddr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, TransportError> {
        let rest = s.strip_prefix('/').ok_or(TransportError::BadAddress)?;
        let (scheme, body) = rest.split_once('/').ok_or(TransportError::BadAddress)?;
        if body.is_empty() {
            return Err(TransportError::BadAddress);
        }
        match scheme {
            "tcp" => Ok(PathAddr::Tcp(body.to_string())),
            "ws" => Ok(PathAddr::Ws(body.to_string())),
            _ => Err(TransportError::UnsupportedScheme),
        }
    }
}

/// A bound listener, TCP or WebSocket.
pub enum Listener {
    /// TCP variant.
    Tcp(TcpFrameListener),
    /// WebSocket variant.
    Ws(WsFrameListener),
}

impl Listener {
    /// Accept the next inbound connection.
    ///
    /// Cancel-safe: dropping the future abandons the accept without losing a
    /// connection.
    pub async fn accept(&self) -> Result<Conn, TransportError> {
        match self {
            Listener::Tcp(l) => Ok(Conn::Tcp(l.accept().await?)),
            Listener::Ws(l) => Ok(Conn::Ws(l.accept().await?)),
        }
    }

    /// The bound local address (with the OS-assigned port).
    pub fn local_addr(&self) -> Result<PathAddr, TransportError> {
        match self {
            Listener::Tcp(l) => l.local_addr(),
            Listener::Ws(l) => l.local_addr(),
        }
    }
}

/// A framed connection, TCP or WebSocket.
pub enum Conn {
    /// TCP variant.
    Tcp(TcpFrameConn),
    /// WebSocket variant.
    Ws(WsFrameConn),
}

impl Conn {
    /// Send one frame. At most one writer suspends in the kernel at a time.
    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        match self {
            Conn::Tcp(c) => c.send(frame).await,
            Conn::Ws(c) => c.send(frame).await,
        }
    }

    /// Receive the next frame.
    pub async fn receive(&self) -> Result<Frame, TransportError> {
        match self {
            Conn::Tcp(c) => c.receive().await,
            Conn::Ws(c) => c.receive().await,
        }
    }

    /// Remote address.
    pub fn remote_addr(&self) -> PathAddr {
        match self {
            Conn::Tcp(c) => c.remote_addr(),
            Conn::Ws(c) => c.remote_addr(),
        }
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), TransportError> {
        match self {
            Conn::Tcp(c) => c.close().await,
            Conn::Ws(c) => c.close().await,
        }
    }

    /// Surrender the underlying byte stream for promotion into an encrypted
    /// session.
    ///
    /// Only the TCP variant exposes an ordered byte stream; the handshake
    /// framing is incompatible with WebSocket message boundaries. Must be
    /// called before any unframed traffic; buffered frame bytes are
    /// discarded.
    pub fn into_stream(self) -> Result<TcpStream, TransportError> {
        match self {
            Conn::Tcp(c) => c.into_stream(),
            Conn::Ws(_) => Err(TransportError::Unsupported),
        }
    }
}

/// Bind a listener for the given address.
pub async fn listen(addr: &PathAddr) -> Result<Listener, TransportError> {
    match addr {
        PathAddr::Tcp(a) => Ok(Listener::Tcp(TcpFrameListener::bind(a).await?)),
        PathAddr::Ws(a) => Ok(Listener::Ws(WsFrameListener::bind(a).await?)),
    }
}

/// Dial a remote address.
pub async fn dial(addr: &PathAddr) -> Result<Conn, TransportError> {
    match addr {
        PathAddr::Tcp(a) => Ok(Conn::Tcp(TcpFrameConn::dial(a).await?)),
        PathAddr::Ws(a) => Ok(Conn::Ws(WsFrameConn::dial(a).await?)),
    }
}
