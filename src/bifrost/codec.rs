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

//! Bifrost binary frame codec.
//!
//! Wire layout, fixed big-endian:
//!
//! ```text
//! offset 0..2   magic        = 0x56 0x48 ('V','H')
//! offset 2..6   payload_len  = u32
//! offset 6      frame_type   = u8
//! offset 7..    payload      = payload_len bytes
//! ```
//!
//! The codec is stateless: one buffered reader may carry an arbitrary
//! sequence of consecutive frames, and a partial header is never treated as
//! a frame.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::types::FrameType;

/// Wire magic: `'V'`, `'H'`.
pub const FRAME_MAGIC: [u8; 2] = [0x56, 0x48];

/// Frame header length (magic + payload length + type).
pub const FRAME_HEADER_LEN: usize = 7;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Frame codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Wire magic mismatch.
    #[error("invalid magic")]
    InvalidMagic,
    /// Declared payload length exceeds the 16 MiB cap.
    #[error("payload too long")]
    PayloadTooLong,
    /// Frame type byte is not a known type.
    #[error("unknown frame type")]
    UnknownFrameType,
    /// A byte buffer did not contain exactly one frame.
    #[error("length mismatch")]
    LengthMismatch,
    /// Underlying I/O failure (including short reads).
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Bifrost wire unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame type.
    pub frame_type: FrameType,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Construct a frame.
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            payload,
        }
    }

    /// Construct a DATA frame.
    pub fn data(payload: Vec<u8>) -> Self {
        Self::new(FrameType::Data, payload)
    }
}

/// Encode a frame into a pre-sized buffer. Non-blocking.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, CodecError> {
    if frame.payload.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLong);
    }
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + frame.payload.len());
    out.extend_from_slice(&FRAME_MAGIC);
    out.extend_from_slice(&(frame.payload.len() as u32).to_be_bytes());
    out.push(frame.frame_type.as_u8());
    out.extend_from_slice(&frame.payload);
    Ok(out)
}

/// Decode exactly one frame from a byte buffer (WebSocket message body).
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CodecError> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(CodecError::LengthMismatch);
    }
    if bytes[..2] != FRAME_MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[2..6]);
    let payload_len = u32::from_be_bytes(len_bytes) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLong);
    }
    let frame_type = FrameType::from_u8(bytes[6]).ok_or(CodecError::UnknownFrameType)?;
    if bytes.len() != FRAME_HEADER_LEN + payload_len {
        return Err(CodecError::LengthMismatch);
    }
    Ok(Frame {
        frame_type,
        payload: bytes[FRAME_HEADER_LEN..].to_vec(),
    })
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), CodecError> {
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Fails with [`CodecError::InvalidMagic`] on a magic mismatch,
/// [`CodecError::PayloadTooLong`] past the cap, and a generic I/O error on a
/// short read.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, CodecError> {
    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic).await?;
    if magic != FRAME_MAGIC {
        return Err(CodecError::InvalidMagic);
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let payload_len = u32::from_be_bytes(len_bytes) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLong);
    }

    let mut type_byte = [0u8; 1];
    reader.read_exact(&mut type_byte).await?;
    let frame_type = FrameType::from_u8(type_byte[0]).ok_or(CodecError::UnknownFrameType)?;

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    Ok(Frame {
        frame_type,
        payload,
    })
}
