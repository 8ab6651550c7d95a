//! The single queue consumer that owns the shore link.
//!
//! Exchanges are processed strictly one at a time in enqueue order. While
//! the link is down the worker blocks in reconnect backoff and the queue
//! keeps accepting; queued exchanges survive a reconnect, only the in-flight
//! one is failed.

use crate::exchange::{Exchange, ExchangeKind};
use crate::uplink::Uplink;
use sealink_proto::{Frame, FrameType};
use sealink_transport::{pump, LinkError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const BAD_GATEWAY: &[u8] =
    b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

enum Step {
    Exchange(Option<Exchange>),
    Link(sealink_transport::Result<Frame>),
}

enum TunnelReply {
    Ok,
    Refused(String),
}

pub struct Worker {
    queue: mpsc::UnboundedReceiver<Exchange>,
    uplink: Uplink,
}

impl Worker {
    pub fn new(queue: mpsc::UnboundedReceiver<Exchange>, uplink: Uplink) -> Self {
        Self { queue, uplink }
    }

    pub async fn run(mut self) {
        loop {
            let step = {
                // Blocks through reconnect backoff when the link is down;
                // the queue keeps accepting but is not drained meanwhile.
                let (reader, _) = self.uplink.ensure_connected().await;
                tokio::select! {
                    exchange = self.queue.recv() => Step::Exchange(exchange),
                    // Idle poll: nothing is in flight, so any read completion
                    // means the link dropped or the shore broke protocol.
                    frame = reader.read_frame() => Step::Link(frame),
                }
            };

            match step {
                Step::Exchange(Some(exchange)) => self.handle_exchange(exchange).await,
                Step::Exchange(None) => {
                    debug!("queue closed, worker stopping");
                    break;
                }
                Step::Link(Ok(frame)) => {
                    warn!(
                        frame_type = %frame.frame_type,
                        "unsolicited frame while idle, resetting link"
                    );
                    self.uplink.reset();
                }
                Step::Link(Err(e)) => {
                    info!("link lost while idle: {e}");
                    self.uplink.reset();
                }
            }
        }
    }

    async fn handle_exchange(&mut self, exchange: Exchange) {
        let Exchange { client, kind, done } = exchange;
        debug!(kind = kind.name(), "processing exchange");

        match kind {
            ExchangeKind::Http { raw } => self.proxy_http(raw, client).await,
            ExchangeKind::Tunnel { target, early } => {
                self.proxy_tunnel(&target, early, client).await
            }
        }

        // The front-end task is blocked on this; client socket is closed by
        // now (always-close policy).
        let _ = done.send(());
    }

    /// Send the request as one REQUEST frame and relay the RESPONSE payload
    /// back to the client verbatim.
    async fn proxy_http(&mut self, raw: Vec<u8>, mut client: TcpStream) {
        let result = async {
            let (reader, writer) = self.uplink.ensure_connected().await;
            writer.send(&Frame::request(raw)).await?;

            let frame = reader.read_frame().await?;
            match frame.frame_type {
                FrameType::Response => Ok(frame.payload),
                other => Err(LinkError::UnexpectedFrame(other)),
            }
        }
        .await;

        match result {
            Ok(payload) => {
                if let Err(e) = client.write_all(&payload).await {
                    debug!("client write failed after response: {e}");
                }
            }
            Err(e) => {
                // No response bytes have been written yet, so the client
                // gets a synthesized failure.
                info!("exchange failed: {e}");
                self.uplink.reset();
                let _ = client.write_all(BAD_GATEWAY).await;
            }
        }
        let _ = client.shutdown().await;
    }

    /// Open a tunnel on the link, confirm it to the client, then stay in
    /// the relay until the CLOSE handshake completes.
    async fn proxy_tunnel(&mut self, target: &str, early: Vec<u8>, mut client: TcpStream) {
        let opened = async {
            let (reader, writer) = self.uplink.ensure_connected().await;
            writer.send(&Frame::connect_open(target)).await?;

            let frame = reader.read_frame().await?;
            match frame.frame_type {
                FrameType::ConnectOk => Ok(TunnelReply::Ok),
                FrameType::ConnectFail => Ok(TunnelReply::Refused(
                    String::from_utf8_lossy(&frame.payload).into_owned(),
                )),
                other => Err(LinkError::UnexpectedFrame(other)),
            }
        }
        .await;

        match opened {
            Ok(TunnelReply::Ok) => {
                // Even if this write fails, the relay below observes the dead
                // client immediately and runs the CLOSE handshake, keeping
                // the link in sync.
                let _ = client.write_all(CONNECTION_ESTABLISHED).await;

                let relayed = async {
                    let (reader, writer) = self.uplink.ensure_connected().await;
                    if !early.is_empty() {
                        writer.send(&Frame::data(&early)).await?;
                    }
                    pump::relay(client, reader, writer).await
                }
                .await;

                if let Err(e) = relayed {
                    info!("tunnel relay failed: {e}");
                    self.uplink.reset();
                }
            }
            Ok(TunnelReply::Refused(reason)) => {
                info!("shore refused tunnel to {target}: {reason}");
                let _ = client.write_all(BAD_GATEWAY).await;
                let _ = client.shutdown().await;
            }
            Err(e) => {
                info!("tunnel open failed: {e}");
                self.uplink.reset();
                let _ = client.write_all(BAD_GATEWAY).await;
                let _ = client.shutdown().await;
            }
        }
    }
}
