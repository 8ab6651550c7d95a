//! Reconnect state machine for the single shore link.
//!
//! Exactly one connected link exists per ship instance. The state machine
//! is Disconnected → Connecting → Connected: [`Uplink::ensure_connected`]
//! dials forever with exponential backoff, and any I/O error makes the
//! owner call [`Uplink::reset`], returning to Disconnected.

use crate::backoff;
use crate::cli::ShipConfig;
use sealink_transport::{framed_pair, TcpFrameReader, TcpFrameWriter};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

pub struct Uplink {
    host: String,
    port: u16,
    max_frame_len: u32,
    initial_delay: Duration,
    max_delay: Duration,
    conn: Option<(TcpFrameReader, TcpFrameWriter)>,
}

impl Uplink {
    pub fn new(config: &ShipConfig) -> Self {
        Self {
            host: config.offshore_host.clone(),
            port: config.offshore_port,
            max_frame_len: config.max_frame_len,
            initial_delay: config.reconnect_initial_delay,
            max_delay: config.reconnect_max_delay,
            conn: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Drop the current connection. The next `ensure_connected` dials again.
    pub fn reset(&mut self) {
        if self.conn.take().is_some() {
            info!("shore link reset");
        }
    }

    /// Return the connected reader/writer halves, dialing first if the link
    /// is down. Blocks through backoff; never gives up.
    pub async fn ensure_connected(&mut self) -> (&mut TcpFrameReader, &mut TcpFrameWriter) {
        if self.conn.is_none() {
            let stream = self.dial().await;
            self.conn = Some(framed_pair(stream, self.max_frame_len));
        }
        let conn = self.conn.as_mut().expect("connection established above");
        (&mut conn.0, &mut conn.1)
    }

    async fn dial(&self) -> TcpStream {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(host = %self.host, port = self.port, attempt, "connecting to shore");
            match TcpStream::connect((self.host.as_str(), self.port)).await {
                Ok(stream) => {
                    info!(host = %self.host, port = self.port, "connected to shore");
                    return stream;
                }
                Err(e) => {
                    let delay =
                        backoff::reconnect_delay(attempt, self.initial_delay, self.max_delay);
                    warn!("connect to shore failed ({e}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
