//! Async framed I/O for the sealink link.
//!
//! This crate wraps any byte stream in the frame protocol defined by
//! `sealink-proto`: a [`FrameReader`] that reassembles frames from partial
//! reads and a [`FrameWriter`] that serializes them, both enforcing the
//! configured frame-size cap. The tunnel relay shared by the two peers
//! lives in [`pump`].
//!
//! The reader and writer are generic over `AsyncRead`/`AsyncWrite` so the
//! binaries can run them over the two halves of a `TcpStream` while tests
//! run them over in-memory duplex pipes.

pub mod error;
pub mod pump;

pub use error::{LinkError, Result};

use bytes::{Buf, BytesMut};
use sealink_proto::{Frame, HEADER_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Frame reader over the split halves of a TCP link.
pub type TcpFrameReader = FrameReader<OwnedReadHalf>;
/// Frame writer over the split halves of a TCP link.
pub type TcpFrameWriter = FrameWriter<OwnedWriteHalf>;

/// Split a connected link socket into a framed reader/writer pair.
pub fn framed_pair(stream: TcpStream, max_frame_len: u32) -> (TcpFrameReader, TcpFrameWriter) {
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();
    (
        FrameReader::new(read_half, max_frame_len),
        FrameWriter::new(write_half, max_frame_len),
    )
}

/// Reads frames from a byte stream, accumulating partial reads internally.
///
/// `read_frame` is cancellation-safe: progress lives in the internal buffer,
/// so a future dropped mid-read (e.g. by `select!`) loses nothing and the
/// next call resumes where it left off. The tunnel relay depends on this.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_frame_len: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_len: u32) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_LEN + 8 * 1024),
            max_frame_len,
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns [`LinkError::Closed`] on clean EOF at a frame boundary and
    /// an I/O error on EOF mid-frame.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some((frame, consumed)) = Frame::decode(&self.buf, self.max_frame_len)? {
                self.buf.advance(consumed);
                return Ok(frame);
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Err(LinkError::Closed);
                }
                return Err(LinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                )));
            }
        }
    }
}

/// Writes frames to a byte stream, flushing after each one.
pub struct FrameWriter<W> {
    inner: W,
    max_frame_len: u32,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, max_frame_len: u32) -> Self {
        Self {
            inner,
            max_frame_len,
        }
    }

    /// Serialize and send one frame.
    ///
    /// Refuses payloads beyond the frame cap before any bytes hit the wire,
    /// so an oversize send never desynchronizes the link.
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        if frame.payload.len() > self.max_frame_len as usize {
            return Err(LinkError::Frame(sealink_proto::DecodeError::FrameTooLarge {
                len: frame.payload.len() as u32,
                max: self.max_frame_len,
            }));
        }

        self.inner.write_all(&frame.encode()).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
