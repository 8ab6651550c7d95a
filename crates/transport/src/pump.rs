//! Bidirectional tunnel relay for CONNECT exchanges.
//!
//! While a tunnel is open the link is exclusive to it: the ship worker and
//! the shore dispatcher both sit inside [`relay`] until the CLOSE handshake
//! completes, which is what keeps REQUEST/RESPONSE frames from interleaving
//! with tunnel traffic.
//!
//! Termination: local EOF, local write failure, or a CLOSE frame from the
//! peer. Whichever side initiates sends a single CLOSE and then drains
//! tunnel frames until the peer's CLOSE arrives, so the frame stream is
//! back in sync when the relay returns. A side that receives CLOSE first
//! acknowledges with its own CLOSE and exits immediately.

use crate::{FrameReader, FrameWriter, LinkError, Result};
use sealink_proto::{Frame, FrameType};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Upper bound on a single DATA frame's payload.
pub const DATA_CHUNK_LEN: usize = 16 * 1024;

/// Relay bytes between `local` and the framed link until the tunnel closes.
///
/// On the ship, `local` is the client socket; on the shore, the target
/// socket. Returns `Ok(())` when the CLOSE handshake completed and the link
/// is reusable; any error means the link itself is broken and must be torn
/// down by the caller.
pub async fn relay<S, R, W>(
    local: S,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut local_rd, mut local_wr) = tokio::io::split(local);
    let mut buf = vec![0u8; DATA_CHUNK_LEN];

    // True if the peer's CLOSE arrived before we sent our own.
    let peer_closed_first = loop {
        tokio::select! {
            read = local_rd.read(&mut buf) => match read {
                Ok(0) => {
                    trace!("local socket EOF, closing tunnel");
                    writer.send(&Frame::close()).await?;
                    break false;
                }
                Ok(n) => {
                    writer.send(&Frame::data(&buf[..n])).await?;
                }
                Err(e) => {
                    trace!("local socket read error, closing tunnel: {e}");
                    writer.send(&Frame::close()).await?;
                    break false;
                }
            },
            frame = reader.read_frame() => {
                let frame = frame?;
                match frame.frame_type {
                    FrameType::Data => {
                        if local_wr.write_all(&frame.payload).await.is_err() {
                            trace!("local socket write error, closing tunnel");
                            writer.send(&Frame::close()).await?;
                            break false;
                        }
                    }
                    FrameType::Close => break true,
                    other => return Err(LinkError::UnexpectedFrame(other)),
                }
            }
        }
    };

    if peer_closed_first {
        // Acknowledge so the peer's drain terminates.
        writer.send(&Frame::close()).await?;
    } else {
        // We initiated; discard in-flight DATA until the peer acknowledges.
        loop {
            let frame = reader.read_frame().await?;
            match frame.frame_type {
                FrameType::Data => continue,
                FrameType::Close => break,
                other => return Err(LinkError::UnexpectedFrame(other)),
            }
        }
    }

    local_wr.shutdown().await.ok();
    debug!("tunnel closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealink_proto::DEFAULT_MAX_FRAME_LEN;
    use tokio::io::{duplex, DuplexStream, ReadHalf, WriteHalf};

    type TestReader = FrameReader<ReadHalf<DuplexStream>>;
    type TestWriter = FrameWriter<WriteHalf<DuplexStream>>;

    /// An in-memory link: (ship reader, ship writer, shore reader, shore writer).
    fn link_pair() -> (TestReader, TestWriter, TestReader, TestWriter) {
        let (ship_side, shore_side) = duplex(256 * 1024);
        let (ship_rd, ship_wr) = tokio::io::split(ship_side);
        let (shore_rd, shore_wr) = tokio::io::split(shore_side);
        (
            FrameReader::new(ship_rd, DEFAULT_MAX_FRAME_LEN),
            FrameWriter::new(ship_wr, DEFAULT_MAX_FRAME_LEN),
            FrameReader::new(shore_rd, DEFAULT_MAX_FRAME_LEN),
            FrameWriter::new(shore_wr, DEFAULT_MAX_FRAME_LEN),
        )
    }

    #[tokio::test]
    async fn bytes_cross_the_tunnel_both_ways() {
        let (mut ship_rd, mut ship_wr, mut shore_rd, mut shore_wr) = link_pair();

        // "client" talks to the ship relay, "target" to the shore relay.
        let (mut client, ship_local) = duplex(64 * 1024);
        let (mut target, shore_local) = duplex(64 * 1024);

        let ship = tokio::spawn(async move {
            relay(ship_local, &mut ship_rd, &mut ship_wr).await
        });
        let shore = tokio::spawn(async move {
            relay(shore_local, &mut shore_rd, &mut shore_wr).await
        });

        client.write_all(b"PING").await.unwrap();
        let mut buf = [0u8; 4];
        target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING");

        target.write_all(b"PONG").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PONG");

        // Client hangs up; both relays should complete the CLOSE handshake.
        drop(client);
        ship.await.unwrap().unwrap();
        shore.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn close_initiated_by_remote_end() {
        let (mut ship_rd, mut ship_wr, mut shore_rd, mut shore_wr) = link_pair();

        let (mut client, ship_local) = duplex(64 * 1024);
        let (target, shore_local) = duplex(64 * 1024);

        let ship = tokio::spawn(async move {
            relay(ship_local, &mut ship_rd, &mut ship_wr).await
        });
        let shore = tokio::spawn(async move {
            relay(shore_local, &mut shore_rd, &mut shore_wr).await
        });

        // The target side hangs up first; the client observes EOF.
        drop(target);
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());

        ship.await.unwrap().unwrap();
        shore.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn large_transfer_is_chunked_and_ordered() {
        let (mut ship_rd, mut ship_wr, mut shore_rd, mut shore_wr) = link_pair();

        let (mut client, ship_local) = duplex(512 * 1024);
        let (mut target, shore_local) = duplex(512 * 1024);

        let ship = tokio::spawn(async move {
            relay(ship_local, &mut ship_rd, &mut ship_wr).await
        });
        let shore = tokio::spawn(async move {
            relay(shore_local, &mut shore_rd, &mut shore_wr).await
        });

        // Well past DATA_CHUNK_LEN so the relay must split it.
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&payload).await.unwrap();
            drop(client);
        });

        let mut received = Vec::new();
        target.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected);

        writer.await.unwrap();
        ship.await.unwrap().unwrap();
        shore.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn non_tunnel_frame_is_a_violation() {
        let (mut ship_rd, mut ship_wr, _shore_rd, mut shore_wr) = link_pair();

        let (_client, ship_local) = duplex(1024);

        let ship = tokio::spawn(async move {
            relay(ship_local, &mut ship_rd, &mut ship_wr).await
        });

        // A REQUEST frame must never appear while a tunnel is open.
        shore_wr
            .send(&Frame::request(b"GET / HTTP/1.1\r\n\r\n".to_vec()))
            .await
            .unwrap();

        let err = ship.await.unwrap().expect_err("relay must reject");
        assert!(matches!(err, LinkError::UnexpectedFrame(FrameType::Request)));
    }
}
