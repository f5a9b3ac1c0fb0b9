//! Frame header codec and async frame I/O.
//!
//! # Wire format
//!
//! ```text
//! [4 bytes BE: magic "FSX1"]
//! [1 byte:     version]
//! [1 byte:     message type code]
//! [4 bytes BE: payload length]
//! [2 bytes BE: reserved, 0]
//! [payload bytes]
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{MsgType, HEADER_SIZE, MAGIC, MAX_PAYLOAD, VERSION};

/// Errors raised while framing or reframing the byte stream.
///
/// Every variant is fatal to the connection that produced it.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("bad magic: 0x{0:08x}")]
    BadMagic(u32),

    #[error("bad version: {0}")]
    BadVersion(u8),

    #[error("payload length {0} exceeds {MAX_PAYLOAD} bytes")]
    OversizedPayload(u32),

    #[error("stream ended mid-frame")]
    TruncatedPayload,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw message type code; may be unknown to this build.
    pub type_code: u8,
    /// Payload length in bytes. Zero is legal.
    pub len: u32,
}

impl FrameHeader {
    /// Encodes the header into its 12-byte wire form.
    pub fn encode(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        buf[4] = VERSION;
        buf[5] = self.type_code;
        buf[6..10].copy_from_slice(&self.len.to_be_bytes());
        // reserved bytes stay zero
        buf
    }

    /// Decodes and validates a 12-byte header.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, FrameError> {
        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != MAGIC {
            return Err(FrameError::BadMagic(magic));
        }
        if buf[4] != VERSION {
            return Err(FrameError::BadVersion(buf[4]));
        }
        let len = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        if len > MAX_PAYLOAD {
            return Err(FrameError::OversizedPayload(len));
        }
        Ok(Self {
            type_code: buf[5],
            len,
        })
    }
}

/// A complete message as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub type_code: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// The message type, or `None` for codes this build does not know.
    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::from_code(self.type_code)
    }
}

/// Encodes a full frame (header + payload) into one buffer.
pub fn encode_frame(ty: MsgType, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        type_code: ty.code(),
        len: payload.len() as u32,
    };
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Reads one frame from the stream.
///
/// Returns `None` on a clean end-of-stream (the peer closed between frames).
/// A stream that ends inside a header or payload yields
/// [`FrameError::TruncatedPayload`].
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Frame>, FrameError> {
    let mut hdr = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut hdr[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::TruncatedPayload);
        }
        filled += n;
    }

    let header = FrameHeader::decode(&hdr)?;

    let mut payload = vec![0u8; header.len as usize];
    if !payload.is_empty() {
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FrameError::TruncatedPayload
            } else {
                FrameError::Io(e)
            }
        })?;
    }

    Ok(Some(Frame {
        type_code: header.type_code,
        payload,
    }))
}

/// Writes one frame (header + payload) to the stream.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    ty: MsgType,
    payload: &[u8],
) -> Result<(), FrameError> {
    let header = FrameHeader {
        type_code: ty.code(),
        len: payload.len() as u32,
    };
    writer.write_all(&header.encode()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}
