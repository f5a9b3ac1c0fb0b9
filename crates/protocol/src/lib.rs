//! Wire protocol for the FSX file-transfer broker.
//!
//! Every message on the wire is a fixed 12-byte header followed by a payload
//! of the length named in the header. All integers are big-endian; string
//! fields are a `u16` length prefix followed by raw bytes, concatenated in
//! fixed order with no delimiters.
//!
//! See [`frame`] for the header layout and [`messages`] for the typed
//! payloads.

pub mod frame;
pub mod messages;
pub mod wire;

pub use frame::{encode_frame, read_frame, write_frame, Frame, FrameError, FrameHeader};
pub use wire::{PayloadReader, WireError};

/// Frame magic, `"FSX1"` in ASCII.
pub const MAGIC: u32 = 0x4653_5831;

/// Protocol version carried in every header.
pub const VERSION: u8 = 1;

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Largest payload accepted on the wire (16 MiB, inclusive).
pub const MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

/// Message type codes.
///
/// Unknown codes are kept as raw bytes by the frame layer so the connection
/// can log and skip them instead of dropping the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Hello = 1,
    Ping = 2,
    Pong = 3,

    RegisterReq = 10,
    RegisterResp = 11,
    LoginReq = 12,
    LoginResp = 13,

    OnlineListReq = 20,
    OnlineListResp = 21,

    FileOfferReq = 30,
    FileOfferResp = 31,
    FileAcceptReq = 32,
    FileAcceptResp = 33,
    FileChunk = 34,
    FileDone = 35,
    FileResult = 36,
}

impl MsgType {
    /// Maps a wire code to a known message type.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Hello),
            2 => Some(Self::Ping),
            3 => Some(Self::Pong),
            10 => Some(Self::RegisterReq),
            11 => Some(Self::RegisterResp),
            12 => Some(Self::LoginReq),
            13 => Some(Self::LoginResp),
            20 => Some(Self::OnlineListReq),
            21 => Some(Self::OnlineListResp),
            30 => Some(Self::FileOfferReq),
            31 => Some(Self::FileOfferResp),
            32 => Some(Self::FileAcceptReq),
            33 => Some(Self::FileAcceptResp),
            34 => Some(Self::FileChunk),
            35 => Some(Self::FileDone),
            36 => Some(Self::FileResult),
            _ => None,
        }
    }

    /// The wire code for this message type.
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_spells_fsx1() {
        assert_eq!(&MAGIC.to_be_bytes(), b"FSX1");
    }

    #[test]
    fn every_code_roundtrips() {
        for code in 0u8..=255 {
            if let Some(ty) = MsgType::from_code(code) {
                assert_eq!(ty.code(), code);
            }
        }
        assert_eq!(MsgType::from_code(34), Some(MsgType::FileChunk));
        assert_eq!(MsgType::from_code(99), None);
    }
}
