//! Ship-side proxy.
//!
//! Accepts HTTP/1.1 from local clients, queues every request as an
//! [`exchange::Exchange`], and drains the queue one at a time over the
//! single framed link to the shore peer. Strict FIFO: while an exchange is
//! in flight (or a tunnel is open) nothing else touches the link.

pub mod backoff;
pub mod cli;
pub mod error;
pub mod exchange;
pub mod front;
pub mod uplink;
pub mod worker;

pub use cli::{Cli, ShipConfig};
pub use error::{Result, ShipError};

use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Run the ship proxy on an already-bound listener.
///
/// Spawns the link worker and then serves the accept loop until the
/// listener fails. Taking the listener rather than a port lets tests bind
/// an ephemeral port first.
pub async fn serve(listener: TcpListener, config: ShipConfig) -> Result<()> {
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();

    let uplink = uplink::Uplink::new(&config);
    tokio::spawn(worker::Worker::new(queue_rx, uplink).run());

    front::accept_loop(listener, queue_tx, config.max_frame_len as usize).await?;
    Ok(())
}
