//! Wire protocol for the ship/shore link.
//!
//! This crate defines the framing used on the single TCP connection between
//! the two peers. It is deliberately minimal: byte-level encode/decode and
//! the frame type registry, nothing else.
//!
//! # Wire Format
//!
//! All frames use a length-type-value layout, big-endian:
//! ```text
//! [length:4][type:1][payload:length]
//! ```
//!
//! `length` counts payload bytes only (the 5-byte header is excluded). There
//! is no magic number and no version field — the link is point-to-point and
//! both peers ship together.
//!
//! # Frame Types
//!
//! | Tag | Name         | Direction    | Payload                        |
//! |-----|--------------|--------------|--------------------------------|
//! | 1   | REQUEST      | ship → shore | serialized HTTP request        |
//! | 2   | RESPONSE     | shore → ship | serialized HTTP response       |
//! | 3   | CONNECT_OPEN | ship → shore | ASCII `host:port`              |
//! | 4   | CONNECT_OK   | shore → ship | empty                          |
//! | 5   | CONNECT_FAIL | shore → ship | optional reason string         |
//! | 6   | DATA         | both         | opaque tunnel bytes            |
//! | 7   | CLOSE        | both         | empty                          |

use thiserror::Error;

/// Size of the frame header: 4-byte length + 1-byte type.
pub const HEADER_LEN: usize = 5;

/// Default hard cap on the payload `length` field: 1 MiB.
///
/// Full requests and responses travel as single frames, so this also bounds
/// the body size the proxy pair will carry.
pub const DEFAULT_MAX_FRAME_LEN: u32 = 1_048_576;

/// Errors raised while decoding a frame header.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("unknown frame type: {0:#04x}")]
    UnknownType(u8),
}

/// Frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Serialized HTTP request, ship to shore.
    Request = 1,
    /// Serialized HTTP response, shore to ship.
    Response = 2,
    /// Open a CONNECT tunnel to the `host:port` in the payload.
    ConnectOpen = 3,
    /// Tunnel target reachable; tunnel is now open.
    ConnectOk = 4,
    /// Tunnel target unreachable; payload is an optional reason.
    ConnectFail = 5,
    /// Opaque tunnel bytes, either direction.
    Data = 6,
    /// Tunnel teardown, either direction.
    Close = 7,
}

impl FrameType {
    /// Decode a type tag from its wire byte.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(FrameType::Request),
            2 => Some(FrameType::Response),
            3 => Some(FrameType::ConnectOpen),
            4 => Some(FrameType::ConnectOk),
            5 => Some(FrameType::ConnectFail),
            6 => Some(FrameType::Data),
            7 => Some(FrameType::Close),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FrameType::Request => "REQUEST",
            FrameType::Response => "RESPONSE",
            FrameType::ConnectOpen => "CONNECT_OPEN",
            FrameType::ConnectOk => "CONNECT_OK",
            FrameType::ConnectFail => "CONNECT_FAIL",
            FrameType::Data => "DATA",
            FrameType::Close => "CLOSE",
        };
        write!(f, "{name}")
    }
}

/// A single frame on the shared link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn request(raw: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Request,
            payload: raw,
        }
    }

    pub fn response(raw: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Response,
            payload: raw,
        }
    }

    /// CONNECT_OPEN carrying an ASCII `host:port` target.
    pub fn connect_open(target: &str) -> Self {
        Self {
            frame_type: FrameType::ConnectOpen,
            payload: target.as_bytes().to_vec(),
        }
    }

    pub fn connect_ok() -> Self {
        Self {
            frame_type: FrameType::ConnectOk,
            payload: Vec::new(),
        }
    }

    pub fn connect_fail(reason: &str) -> Self {
        Self {
            frame_type: FrameType::ConnectFail,
            payload: reason.as_bytes().to_vec(),
        }
    }

    pub fn data(chunk: &[u8]) -> Self {
        Self {
            frame_type: FrameType::Data,
            payload: chunk.to_vec(),
        }
    }

    pub fn close() -> Self {
        Self {
            frame_type: FrameType::Close,
            payload: Vec::new(),
        }
    }

    /// Encode the frame for transmission.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.push(self.frame_type as u8);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a frame from a byte buffer.
    ///
    /// Returns the decoded frame and the number of bytes consumed, or
    /// `Ok(None)` if the buffer does not yet contain a complete frame.
    /// A `length` beyond `max_len` or an unknown type tag is a protocol
    /// violation and returns an error; callers are expected to tear the
    /// link down in response.
    pub fn decode(buf: &[u8], max_len: u32) -> Result<Option<(Frame, usize)>, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if len > max_len {
            return Err(DecodeError::FrameTooLarge { len, max: max_len });
        }

        let frame_type = FrameType::from_u8(buf[4]).ok_or(DecodeError::UnknownType(buf[4]))?;

        let total = HEADER_LEN + len as usize;
        if buf.len() < total {
            return Ok(None);
        }

        let payload = buf[HEADER_LEN..total].to_vec();
        Ok(Some((Frame { frame_type, payload }, total)))
    }
}
