// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

//! WebSocket transport: one encoded frame per binary message.
//!
//! The receiver re-parses magic and type from the message bytes. Message
//! fragmentation is not supported; a message that is not exactly one frame
//! is a codec error.

#![forbid(unsafe_code)]

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_async, connect_async};

use crate::bifrost::codec::{decode_frame, encode_frame, Frame};
use crate::bifrost::transport::{PathAddr, TransportError};

type BoxSink = Box<dyn Sink<Message, Error = WsError> + Send + Unpin>;
type BoxStream = Box<dyn Stream<Item = Result<Message, WsError>> + Send + Unpin>;

/// Listener for framed WebSocket connections.
pub struct WsFrameListener {
    inner: TcpListener,
}

impl WsFrameListener {
    /// Bind to `host:port`.
    pub async fn bind(authority: &str) -> Result<Self, TransportError> {
        let inner = TcpListener::bind(authority).await?;
        Ok(Self { inner })
    }

    /// Accept the next connection and complete the WebSocket upgrade.
    pub async fn accept(&self) -> Result<WsFrameConn, TransportError> {
        let (stream, peer) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        let ws = accept_async(stream).await?;
        let (sink, source) = ws.split();
        Ok(WsFrameConn {
            sink: Mutex::new(Box::new(sink)),
            source: Mutex::new(Box::new(source)),
            remote: PathAddr::Ws(peer.to_string()),
        })
    }

    /// Bound local address.
    pub fn local_addr(&self) -> Result<PathAddr, TransportError> {
        Ok(PathAddr::Ws(self.inner.local_addr()?.to_string()))
    }
}

/// Framed connection over a WebSocket.
pub struct WsFrameConn {
    sink: Mutex<BoxSink>,
    source: Mutex<BoxStream>,
    remote: PathAddr,
}

impl WsFrameConn {
    /// Dial `host:port` and complete the WebSocket upgrade.
    pub async fn dial(authority: &str) -> Result<Self, TransportError> {
        let (ws, _resp) = connect_async(format!("ws://{authority}")).await?;
        let (sink, source) = ws.split();
        Ok(Self {
            sink: Mutex::new(Box::new(sink)),
            source: Mutex::new(Box::new(source)),
            remote: PathAddr::Ws(authority.to_string()),
        })
    }

    /// Send one frame as one binary message.
    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let bytes = encode_frame(frame)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(bytes)).await?;
        Ok(())
    }

    /// Receive the next frame; non-binary messages are skipped.
    pub async fn receive(&self) -> Result<Frame, TransportError> {
        let mut source = self.source.lock().await;
        loop {
            match source.next().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(decode_frame(&bytes)?),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Remote address.
    pub fn remote_addr(&self) -> PathAddr {
        self.remote.clone()
    }

    /// Send a close frame and flush.
    pub async fn close(&self) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        sink.close().await.map_err(TransportError::from)
    }
}
