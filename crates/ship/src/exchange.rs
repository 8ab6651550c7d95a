use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// One client request awaiting completion.
///
/// Created by the front end after a full request has been parsed, owned
/// exclusively by the worker once dequeued, and destroyed after the terminal
/// bytes (response end, or tunnel CLOSE) have been written to the client.
pub struct Exchange {
    /// The accepted client socket. The worker owns it for the exchange's
    /// lifetime; the front end must not read from it again.
    pub client: TcpStream,
    pub kind: ExchangeKind,
    /// Fired by the worker once the exchange is finished, successfully or
    /// not; the front-end task blocks on the other end.
    pub done: oneshot::Sender<()>,
}

pub enum ExchangeKind {
    /// Plain HTTP exchange carrying the verbatim request bytes, request
    /// line through end of body.
    Http { raw: Vec<u8> },
    /// CONNECT tunnel to `target` (`host:port`). `early` holds any bytes
    /// the client pipelined after the CONNECT head; they are forwarded as
    /// the first DATA frame once the tunnel is confirmed.
    Tunnel { target: String, early: Vec<u8> },
}

impl ExchangeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExchangeKind::Http { .. } => "http",
            ExchangeKind::Tunnel { .. } => "tunnel",
        }
    }
}
