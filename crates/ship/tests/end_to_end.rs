//! End-to-end tests for the ship peer against a stub shore.
//!
//! The stub speaks the raw frame protocol, which gives the tests full
//! control over ordering, delays, and protocol violations without any real
//! Internet traffic.

use sealink_proto::{Frame, FrameType, DEFAULT_MAX_FRAME_LEN};
use sealink_ship::{serve, ShipConfig};
use sealink_transport::{framed_pair, FrameReader, TcpFrameReader, TcpFrameWriter};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Wrap a test body so a hang fails instead of blocking the suite.
async fn within<F: std::future::Future<Output = ()>>(fut: F) {
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("test timed out");
}

/// Start an in-process ship wired at a stub shore listener.
///
/// Returns the ship's client-facing address and the listener the stub shore
/// accepts link connections on. Reconnect delays are shortened so the drop
/// tests run quickly.
async fn start_ship() -> (SocketAddr, TcpListener) {
    let shore_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let shore_port = shore_listener.local_addr().unwrap().port();

    let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = client_listener.local_addr().unwrap();

    let config = ShipConfig {
        offshore_host: "127.0.0.1".to_string(),
        offshore_port: shore_port,
        reconnect_initial_delay: Duration::from_millis(20),
        reconnect_max_delay: Duration::from_millis(200),
        ..Default::default()
    };
    tokio::spawn(serve(client_listener, config));

    (proxy_addr, shore_listener)
}

async fn accept_link(shore: &TcpListener) -> (TcpFrameReader, TcpFrameWriter) {
    let (conn, _) = shore.accept().await.unwrap();
    framed_pair(conn, DEFAULT_MAX_FRAME_LEN)
}

async fn send_request(proxy: SocketAddr, raw: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(raw).await.unwrap();
    stream
}

async fn read_to_end(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

/// Read from the client socket until the response head terminator.
async fn read_head(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    while !out.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        out.push(byte[0]);
    }
    out
}

fn http_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

#[tokio::test]
async fn plain_get_round_trips_byte_identical() {
    within(async {
        let (proxy, shore) = start_ship().await;

        let request = b"GET http://example.invalid/hello HTTP/1.1\r\nHost: example.invalid\r\n\r\n";
        let mut client = send_request(proxy, request).await;

        let (mut link_rd, mut link_wr) = accept_link(&shore).await;
        let frame = link_rd.read_frame().await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Request);
        assert_eq!(frame.payload, request);

        let canned = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        link_wr.send(&Frame::response(canned.to_vec())).await.unwrap();

        assert_eq!(read_to_end(&mut client).await, canned);
    })
    .await;
}

#[tokio::test]
async fn sequential_ordering_across_clients() {
    within(async {
        let (proxy, shore) = start_ship().await;
        let (mut link_rd, mut link_wr) = accept_link(&shore).await;

        // Stagger the sends so enqueue order is deterministic.
        let mut client_a =
            send_request(proxy, b"GET http://s/a HTTP/1.1\r\nHost: s\r\n\r\n").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut client_b =
            send_request(proxy, b"GET http://s/b HTTP/1.1\r\nHost: s\r\n\r\n").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut client_c =
            send_request(proxy, b"GET http://s/c HTTP/1.1\r\nHost: s\r\n\r\n").await;

        // The shore must observe REQUEST frames in arrival order, with /a
        // first even though its response is delayed.
        let first = link_rd.read_frame().await.unwrap();
        assert!(first.payload.starts_with(b"GET http://s/a "));
        tokio::time::sleep(Duration::from_millis(200)).await;
        link_wr
            .send(&Frame::response(http_response("alpha")))
            .await
            .unwrap();

        let second = link_rd.read_frame().await.unwrap();
        assert!(second.payload.starts_with(b"GET http://s/b "));
        link_wr
            .send(&Frame::response(http_response("bravo")))
            .await
            .unwrap();

        let third = link_rd.read_frame().await.unwrap();
        assert!(third.payload.starts_with(b"GET http://s/c "));
        link_wr
            .send(&Frame::response(http_response("charlie")))
            .await
            .unwrap();

        // Each response lands on its own socket.
        assert!(read_to_end(&mut client_a).await.ends_with(b"alpha"));
        assert!(read_to_end(&mut client_b).await.ends_with(b"bravo"));
        assert!(read_to_end(&mut client_c).await.ends_with(b"charlie"));
    })
    .await;
}

#[tokio::test]
async fn connect_tunnel_echoes_and_closes() {
    within(async {
        let (proxy, shore) = start_ship().await;
        let (mut link_rd, mut link_wr) = accept_link(&shore).await;

        let mut client = send_request(
            proxy,
            b"CONNECT example.invalid:443 HTTP/1.1\r\nHost: example.invalid:443\r\n\r\n",
        )
        .await;

        let open = link_rd.read_frame().await.unwrap();
        assert_eq!(open.frame_type, FrameType::ConnectOpen);
        assert_eq!(open.payload, b"example.invalid:443");
        link_wr.send(&Frame::connect_ok()).await.unwrap();

        let head = read_head(&mut client).await;
        assert_eq!(head, b"HTTP/1.1 200 Connection Established\r\n\r\n");

        // Echo one round through the tunnel.
        client.write_all(b"PING").await.unwrap();
        let data = link_rd.read_frame().await.unwrap();
        assert_eq!(data.frame_type, FrameType::Data);
        assert_eq!(data.payload, b"PING");
        link_wr.send(&Frame::data(&data.payload)).await.unwrap();

        let mut echo = [0u8; 4];
        client.read_exact(&mut echo).await.unwrap();
        assert_eq!(&echo, b"PING");

        // Client hangs up; the ship must send CLOSE and wait for ours.
        client.shutdown().await.unwrap();
        let close = link_rd.read_frame().await.unwrap();
        assert_eq!(close.frame_type, FrameType::Close);
        link_wr.send(&Frame::close()).await.unwrap();

        // The link is back in request mode: a plain GET still works.
        let mut after =
            send_request(proxy, b"GET http://s/after HTTP/1.1\r\nHost: s\r\n\r\n").await;
        let frame = link_rd.read_frame().await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Request);
        link_wr
            .send(&Frame::response(http_response("done")))
            .await
            .unwrap();
        assert!(read_to_end(&mut after).await.ends_with(b"done"));
    })
    .await;
}

#[tokio::test]
async fn connect_refusal_becomes_502() {
    within(async {
        let (proxy, shore) = start_ship().await;
        let (mut link_rd, mut link_wr) = accept_link(&shore).await;

        let mut client =
            send_request(proxy, b"CONNECT dead.invalid:1 HTTP/1.1\r\n\r\n").await;

        let open = link_rd.read_frame().await.unwrap();
        assert_eq!(open.frame_type, FrameType::ConnectOpen);
        link_wr
            .send(&Frame::connect_fail("connection refused"))
            .await
            .unwrap();

        let body = read_to_end(&mut client).await;
        assert!(body.starts_with(b"HTTP/1.1 502 Bad Gateway\r\n"));
    })
    .await;
}

#[tokio::test]
async fn link_drop_mid_exchange_synthesizes_502() {
    within(async {
        let (proxy, shore) = start_ship().await;
        let (mut link_rd, _link_wr) = accept_link(&shore).await;

        let mut client =
            send_request(proxy, b"GET http://s/x HTTP/1.1\r\nHost: s\r\n\r\n").await;
        let frame = link_rd.read_frame().await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Request);

        // Kill the link before responding; the in-flight exchange fails.
        drop(link_rd);
        drop(_link_wr);

        let body = read_to_end(&mut client).await;
        assert!(body.starts_with(b"HTTP/1.1 502 Bad Gateway\r\n"));
    })
    .await;
}

#[tokio::test]
async fn reconnects_after_idle_link_drop() {
    within(async {
        let (proxy, shore) = start_ship().await;

        // Establish the link, then kill the shore side while idle.
        let first_link = accept_link(&shore).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(first_link);

        // The ship notices and redials within the (shortened) backoff cap.
        let (mut link_rd, mut link_wr) = accept_link(&shore).await;

        let mut client =
            send_request(proxy, b"GET http://s/again HTTP/1.1\r\nHost: s\r\n\r\n").await;
        let frame = link_rd.read_frame().await.unwrap();
        assert!(frame.payload.starts_with(b"GET http://s/again "));
        link_wr
            .send(&Frame::response(http_response("recovered")))
            .await
            .unwrap();
        assert!(read_to_end(&mut client).await.ends_with(b"recovered"));
    })
    .await;
}

#[tokio::test]
async fn oversize_frame_tears_link_and_recovers() {
    within(async {
        let (proxy, shore) = start_ship().await;

        let (conn, _) = shore.accept().await.unwrap();
        let (link_raw_rd, mut link_raw_wr) = conn.into_split();
        let mut link_rd = FrameReader::new(link_raw_rd, DEFAULT_MAX_FRAME_LEN);

        let mut client =
            send_request(proxy, b"GET http://s/big HTTP/1.1\r\nHost: s\r\n\r\n").await;
        let frame = link_rd.read_frame().await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Request);

        // Announce a frame beyond the cap; the ship must tear the link down
        // rather than buffer it.
        let mut raw = (DEFAULT_MAX_FRAME_LEN + 1).to_be_bytes().to_vec();
        raw.push(2);
        link_raw_wr.write_all(&raw).await.unwrap();

        let body = read_to_end(&mut client).await;
        assert!(body.starts_with(b"HTTP/1.1 502 Bad Gateway\r\n"));

        // A fresh link comes up and the next request completes.
        let (mut link_rd, mut link_wr) = accept_link(&shore).await;
        let mut after =
            send_request(proxy, b"GET http://s/ok HTTP/1.1\r\nHost: s\r\n\r\n").await;
        let frame = link_rd.read_frame().await.unwrap();
        assert!(frame.payload.starts_with(b"GET http://s/ok "));
        link_wr
            .send(&Frame::response(http_response("fine")))
            .await
            .unwrap();
        assert!(read_to_end(&mut after).await.ends_with(b"fine"));
    })
    .await;
}

#[tokio::test]
async fn unsolicited_frame_while_idle_resets_link() {
    within(async {
        let (proxy, shore) = start_ship().await;
        let (_link_rd, mut link_wr) = accept_link(&shore).await;

        // Nothing is in flight; a RESPONSE out of nowhere is a violation.
        link_wr
            .send(&Frame::response(b"HTTP/1.1 200 OK\r\n\r\n".to_vec()))
            .await
            .unwrap();

        // The ship drops that link and dials a fresh one.
        let (mut link_rd, mut link_wr) = accept_link(&shore).await;

        let mut client =
            send_request(proxy, b"GET http://s/next HTTP/1.1\r\nHost: s\r\n\r\n").await;
        let frame = link_rd.read_frame().await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Request);
        link_wr
            .send(&Frame::response(http_response("clean")))
            .await
            .unwrap();
        assert!(read_to_end(&mut client).await.ends_with(b"clean"));
    })
    .await;
}

#[tokio::test]
async fn malformed_request_closes_client_without_enqueue() {
    within(async {
        let (proxy, shore) = start_ship().await;
        let (mut link_rd, _link_wr) = accept_link(&shore).await;

        let mut client = send_request(proxy, b"TOTAL GARBAGE\r\n\r\n").await;
        assert!(read_to_end(&mut client).await.is_empty());

        // The garbage never reached the link; a valid request is next.
        let mut ok_client =
            send_request(proxy, b"GET http://s/ok HTTP/1.1\r\nHost: s\r\n\r\n").await;
        let frame = link_rd.read_frame().await.unwrap();
        assert!(frame.payload.starts_with(b"GET http://s/ok "));
        let _ = ok_client.shutdown().await;
    })
    .await;
}
