//! Shore-side link session: accept loop and frame dispatcher.
//!
//! One ship at a time. The dispatcher handles frames strictly in order —
//! no concurrent request execution — and stays in tunnel mode for the
//! duration of a CONNECT, which is what keeps the link exclusive to the
//! tunnel until CLOSE.

use crate::cli::ShoreConfig;
use crate::upstream;
use sealink_proto::{Frame, FrameType};
use sealink_transport::{framed_pair, pump, LinkError, TcpFrameReader, TcpFrameWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Accept ship connections forever. A new accept pre-empts any previous
/// session: its task is aborted, which drops its link socket and closes
/// every tunnel it owned.
pub async fn serve(listener: TcpListener, config: ShoreConfig) -> crate::Result<()> {
    let client = upstream::build_client(config.request_timeout, config.connect_timeout)?;

    let mut session: Option<JoinHandle<()>> = None;
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "ship connected");

        if let Some(previous) = session.take() {
            if !previous.is_finished() {
                warn!("new ship connection pre-empts the previous session");
                previous.abort();
            }
        }

        let client = client.clone();
        let config = config.clone();
        session = Some(tokio::spawn(async move {
            match run_session(stream, client, config).await {
                Ok(()) | Err(LinkError::Closed) => info!(%peer, "ship disconnected"),
                Err(e) => warn!(%peer, "ship session failed: {e}"),
            }
        }));
    }
}

/// Dispatch frames from one ship connection until it closes or breaks
/// protocol.
pub async fn run_session(
    stream: TcpStream,
    client: reqwest::Client,
    config: ShoreConfig,
) -> sealink_transport::Result<()> {
    let (mut reader, mut writer) = framed_pair(stream, config.max_frame_len);

    loop {
        let frame = reader.read_frame().await?;
        match frame.frame_type {
            FrameType::Request => {
                let response =
                    upstream::execute(&client, &frame.payload, config.max_frame_len).await;
                writer.send(&Frame::response(response)).await?;
            }
            FrameType::ConnectOpen => {
                handle_connect(&frame.payload, &mut reader, &mut writer, &config).await?;
            }
            other => {
                // Only REQUEST and CONNECT_OPEN are valid outside a tunnel.
                warn!(frame_type = %other, "protocol violation, closing link");
                return Err(LinkError::UnexpectedFrame(other));
            }
        }
    }
}

/// Dial the tunnel target and, on success, relay until CLOSE.
async fn handle_connect(
    payload: &[u8],
    reader: &mut TcpFrameReader,
    writer: &mut TcpFrameWriter,
    config: &ShoreConfig,
) -> sealink_transport::Result<()> {
    let target = match std::str::from_utf8(payload) {
        Ok(target) => target.to_string(),
        Err(_) => {
            writer
                .send(&Frame::connect_fail("target is not valid UTF-8"))
                .await?;
            return Ok(());
        }
    };

    debug!("opening tunnel to {target}");
    match timeout(config.connect_timeout, TcpStream::connect(&target)).await {
        Ok(Ok(upstream_sock)) => {
            let _ = upstream_sock.set_nodelay(true);
            writer.send(&Frame::connect_ok()).await?;
            pump::relay(upstream_sock, reader, writer).await?;
            debug!("tunnel to {target} closed, resuming dispatch");
            Ok(())
        }
        Ok(Err(e)) => {
            info!("tunnel connect to {target} failed: {e}");
            writer.send(&Frame::connect_fail(&e.to_string())).await?;
            Ok(())
        }
        Err(_) => {
            info!("tunnel connect to {target} timed out");
            writer
                .send(&Frame::connect_fail("connect timed out"))
                .await?;
            Ok(())
        }
    }
}
