//! Client-facing HTTP front end.
//!
//! One task per accepted client: read exactly one request, enqueue it as an
//! [`Exchange`], then block on the completion signal. Bytes are captured
//! verbatim — the front end parses only as much as it takes to know where
//! the request ends (request line, `Content-Length`, chunked framing).

use crate::exchange::{Exchange, ExchangeKind};
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// Cap on the request head (request line + headers).
const MAX_HEAD_LEN: usize = 64 * 1024;

const PAYLOAD_TOO_LARGE: &[u8] =
    b"HTTP/1.1 413 Payload Too Large\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("IO error reading request: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Malformed(&'static str),

    #[error("request exceeds the configured size cap")]
    TooLarge,

    #[error("client closed before sending a request")]
    Eof,
}

/// Accept clients forever, funneling every parsed request into the queue.
pub async fn accept_loop(
    listener: TcpListener,
    queue: mpsc::UnboundedSender<Exchange>,
    max_request_len: usize,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let queue = queue.clone();
        tokio::spawn(async move {
            handle_client(stream, peer, queue, max_request_len).await;
        });
    }
}

async fn handle_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    queue: mpsc::UnboundedSender<Exchange>,
    max_request_len: usize,
) {
    let started = Instant::now();

    let kind = match read_request(&mut stream, max_request_len).await {
        Ok(kind) => kind,
        Err(RequestError::TooLarge) => {
            warn!(%peer, "request exceeds size cap, rejecting");
            let _ = stream.write_all(PAYLOAD_TOO_LARGE).await;
            return;
        }
        Err(RequestError::Eof) => return,
        Err(e) => {
            // Malformed or half-sent request: close with no enqueue.
            debug!(%peer, "dropping client: {e}");
            return;
        }
    };

    debug!(%peer, kind = kind.name(), "queueing exchange");

    let (done_tx, done_rx) = oneshot::channel();
    let exchange = Exchange {
        client: stream,
        kind,
        done: done_tx,
    };
    if queue.send(exchange).is_err() {
        error!("worker queue closed, dropping client");
        return;
    }

    // The worker owns the socket until it signals completion.
    let _ = done_rx.await;
    debug!(
        %peer,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "exchange complete"
    );
}

/// Read one full request off the socket.
///
/// For CONNECT the result carries the target and any bytes that followed
/// the head; for everything else it carries the verbatim request bytes.
pub async fn read_request<R: AsyncRead + Unpin>(
    stream: &mut R,
    max_request_len: usize,
) -> Result<ExchangeKind, RequestError> {
    let mut buf: Vec<u8> = Vec::with_capacity(4 * 1024);
    let head_end = read_head(stream, &mut buf).await?;

    let line_end = find(&buf[..head_end], b"\r\n").unwrap_or(head_end);
    let request_line = std::str::from_utf8(&buf[..line_end])
        .map_err(|_| RequestError::Malformed("request line is not valid UTF-8"))?;

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or(RequestError::Malformed("empty request line"))?;
    let target = parts
        .next()
        .ok_or(RequestError::Malformed("missing request target"))?;
    let version = parts
        .next()
        .ok_or(RequestError::Malformed("missing HTTP version"))?;
    if !version.starts_with("HTTP/") {
        return Err(RequestError::Malformed("bad HTTP version"));
    }
    if parts.next().is_some() {
        return Err(RequestError::Malformed("extra tokens in request line"));
    }

    if method.eq_ignore_ascii_case("CONNECT") {
        let (_, port) = target
            .rsplit_once(':')
            .ok_or(RequestError::Malformed("CONNECT target missing port"))?;
        if port.parse::<u16>().is_err() {
            return Err(RequestError::Malformed("CONNECT target port invalid"));
        }
        return Ok(ExchangeKind::Tunnel {
            target: target.to_string(),
            early: buf[head_end..].to_vec(),
        });
    }

    let head = &buf[..head_end];
    let length = content_length(head)?;
    let chunked = is_chunked(head);

    // Content-Length alongside Transfer-Encoding means the two framings can
    // disagree; RFC 7230 §3.3.3 says refuse rather than pick one.
    if chunked && length.is_some() {
        return Err(RequestError::Malformed(
            "both Content-Length and Transfer-Encoding present",
        ));
    }

    if chunked {
        read_chunked_body(stream, &mut buf, head_end, max_request_len).await?;
    } else if let Some(length) = length {
        let total = head_end
            .checked_add(length)
            .ok_or(RequestError::TooLarge)?;
        if total > max_request_len {
            return Err(RequestError::TooLarge);
        }
        while buf.len() < total {
            fill(stream, &mut buf).await?;
        }
        buf.truncate(total);
    } else {
        buf.truncate(head_end);
    }

    Ok(ExchangeKind::Http { raw: buf })
}

/// Read until the head terminator; returns the index just past `\r\n\r\n`.
async fn read_head<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut Vec<u8>,
) -> Result<usize, RequestError> {
    loop {
        if let Some(pos) = find(buf, b"\r\n\r\n") {
            return Ok(pos + 4);
        }
        if buf.len() > MAX_HEAD_LEN {
            return Err(RequestError::TooLarge);
        }
        let n = stream.read_buf(buf).await?;
        if n == 0 {
            return Err(if buf.is_empty() {
                RequestError::Eof
            } else {
                RequestError::Malformed("connection closed mid-head")
            });
        }
    }
}

/// Read one more nonzero chunk of bytes into `buf`.
async fn fill<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut Vec<u8>,
) -> Result<(), RequestError> {
    let n = stream.read_buf(buf).await?;
    if n == 0 {
        return Err(RequestError::Malformed("connection closed mid-body"));
    }
    Ok(())
}

/// Consume a `Transfer-Encoding: chunked` body, leaving the verbatim bytes
/// (chunk framing included) in `buf` and truncating anything past the final
/// trailer line.
async fn read_chunked_body<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    mut pos: usize,
    max_request_len: usize,
) -> Result<(), RequestError> {
    loop {
        let line_end = read_line(stream, buf, pos, max_request_len).await?;
        let size_line = std::str::from_utf8(&buf[pos..line_end])
            .map_err(|_| RequestError::Malformed("chunk size is not valid UTF-8"))?;
        let size_hex = size_line
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| RequestError::Malformed("bad chunk size"))?;
        pos = line_end + 2;

        if size == 0 {
            // Trailer section: zero or more header lines, then an empty line.
            loop {
                let trailer_end = read_line(stream, buf, pos, max_request_len).await?;
                let empty = trailer_end == pos;
                pos = trailer_end + 2;
                if empty {
                    buf.truncate(pos);
                    return Ok(());
                }
            }
        }

        let chunk_end = pos
            .checked_add(size)
            .and_then(|p| p.checked_add(2))
            .ok_or(RequestError::TooLarge)?;
        if chunk_end > max_request_len {
            return Err(RequestError::TooLarge);
        }
        while buf.len() < chunk_end {
            fill(stream, buf).await?;
        }
        if &buf[chunk_end - 2..chunk_end] != b"\r\n" {
            return Err(RequestError::Malformed("chunk data not CRLF-terminated"));
        }
        pos = chunk_end;
    }
}

/// Ensure `buf` holds a full line starting at `from`; returns the index of
/// its `\r\n` terminator.
async fn read_line<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    from: usize,
    max_request_len: usize,
) -> Result<usize, RequestError> {
    loop {
        if let Some(i) = find(&buf[from..], b"\r\n") {
            return Ok(from + i);
        }
        if buf.len() > max_request_len {
            return Err(RequestError::TooLarge);
        }
        fill(stream, buf).await?;
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Case-insensitive header lookup over the raw head bytes.
fn header_value<'a>(head: &'a [u8], name: &str) -> Option<&'a str> {
    let text = std::str::from_utf8(head).ok()?;
    for line in text.split("\r\n").skip(1) {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case(name) {
                return Some(value.trim());
            }
        }
    }
    None
}

fn content_length(head: &[u8]) -> Result<Option<usize>, RequestError> {
    match header_value(head, "content-length") {
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| RequestError::Malformed("bad Content-Length")),
        None => Ok(None),
    }
}

fn is_chunked(head: &[u8]) -> bool {
    header_value(head, "transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}
