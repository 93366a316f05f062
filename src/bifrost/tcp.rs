// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

//! TCP transport: one encoded frame after another on the stream.

#![forbid(unsafe_code)]

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpListener, TcpStream,
};
use tokio::sync::Mutex;

use crate::bifrost::codec::{read_frame, write_frame, Frame};
use crate::bifrost::transport::{PathAddr, TransportError};

/// Listener for framed TCP connections.
pub struct TcpFrameListener {
    inner: TcpListener,
}

impl TcpFrameListener {
    /// Bind to `host:port`.
    pub async fn bind(authority: &str) -> Result<Self, TransportError> {
        let inner = TcpListener::bind(authority).await?;
        Ok(Self { inner })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<TcpFrameConn, TransportError> {
        let (stream, peer) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        Ok(TcpFrameConn::from_stream(stream, PathAddr::Tcp(peer.to_string())))
    }

    /// Bound local address.
    pub fn local_addr(&self) -> Result<PathAddr, TransportError> {
        Ok(PathAddr::Tcp(self.inner.local_addr()?.to_string()))
    }
}

/// Framed connection over TCP.
///
/// The write half sits behind its own lock so sends are serialized; the
/// read half has an independent lock so receives never wait on senders.
pub struct TcpFrameConn {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    remote: PathAddr,
}

impl TcpFrameConn {
    fn from_stream(stream: TcpStream, remote: PathAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            remote,
        }
    }

    /// Connect to `host:port`.
    pub async fn dial(authority: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(authority).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self::from_stream(stream, PathAddr::Tcp(peer.to_string())))
    }

    /// Send one frame.
    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await?;
        Ok(())
    }

    /// Receive the next frame.
    pub async fn receive(&self) -> Result<Frame, TransportError> {
        let mut reader = self.reader.lock().await;
        Ok(read_frame(&mut *reader).await?)
    }

    /// Remote address.
    pub fn remote_addr(&self) -> PathAddr {
        self.remote.clone()
    }

    /// Close the write side; the peer observes EOF.
    pub async fn close(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }

    /// Reassemble the underlying stream for session promotion.
    pub fn into_stream(self) -> Result<TcpStream, TransportError> {
        let reader = self.reader.into_inner();
        let writer = self.writer.into_inner();
        reader
            .into_inner()
            .reunite(writer)
            .map_err(|_| TransportError::Closed)
    }
}
