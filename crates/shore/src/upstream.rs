//! Real HTTP execution for REQUEST frames.
//!
//! The ship forwards request bytes verbatim; this module parses them just
//! far enough to execute the fetch, strips hop-by-hop headers in both
//! directions, and re-serializes the response into a single RESPONSE
//! payload. Gateway failures never tear the link — they become synthesized
//! responses.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tracing::{debug, warn};

/// Headers that apply to a single transport hop and must not cross a proxy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "keep-alive",
    "te",
    "trailer",
    "proxy-authenticate",
    "proxy-authorization",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Build the upstream HTTP client.
///
/// Redirects off and pooling off: the proxy is transparent, and every
/// upstream connection is used for exactly one request (the
/// `Connection: close` policy). TLS verification uses the host's system
/// trust roots.
pub fn build_client(
    request_timeout: Duration,
    connect_timeout: Duration,
) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(0)
        .http1_only()
        // This process IS the proxy; never route fetches through another one.
        .no_proxy()
        .build()
}

/// A request parsed from raw wire bytes, split only as far as execution
/// needs; the body stays untouched.
#[derive(Debug)]
pub struct ParsedRequest<'a> {
    pub method: &'a str,
    pub target: &'a str,
    pub headers: Vec<(&'a str, &'a str)>,
    pub body: &'a [u8],
}

impl ParsedRequest<'_> {
    pub fn parse(raw: &[u8]) -> Option<ParsedRequest<'_>> {
        let head_end = find(raw, b"\r\n\r\n")?;
        let head = std::str::from_utf8(&raw[..head_end]).ok()?;
        let body = &raw[head_end + 4..];

        let mut lines = head.split("\r\n");
        let request_line = lines.next()?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?;
        let target = parts.next()?;
        parts.next()?; // version

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim(), value.trim()))
            .collect();

        Some(ParsedRequest {
            method,
            target,
            headers,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }

    /// Absolute URL per proxy rules: an absolute-form target is used as-is,
    /// an origin-form target is combined with the `Host` header.
    pub fn absolute_url(&self) -> Option<String> {
        if self.target.starts_with("http://") || self.target.starts_with("https://") {
            return Some(self.target.to_string());
        }
        if self.target.starts_with('/') {
            let host = self.header("host")?;
            return Some(format!("http://{}{}", host, self.target));
        }
        None
    }

    /// Headers forwarded upstream: everything except hop-by-hop, `Host`
    /// (derived from the URL), and `Content-Length` (derived from the body).
    pub fn forwarded_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().copied().filter(|(name, _)| {
            !is_hop_by_hop(name)
                && !name.eq_ignore_ascii_case("host")
                && !name.eq_ignore_ascii_case("content-length")
        })
    }
}

/// Execute one REQUEST payload against the real Internet.
///
/// Always returns serialized response bytes: real upstream responses on
/// success, synthesized `400`/`502`/`504` responses on failure.
pub async fn execute(client: &reqwest::Client, raw: &[u8], max_frame_len: u32) -> Vec<u8> {
    let Some(parsed) = ParsedRequest::parse(raw) else {
        warn!("unparseable request payload");
        return synthesize(400, "Bad Request");
    };
    let Some(url) = parsed.absolute_url() else {
        warn!("no absolute URL for request target {}", parsed.target);
        return synthesize(400, "Bad Request");
    };
    let Ok(method) = reqwest::Method::from_bytes(parsed.method.as_bytes()) else {
        return synthesize(400, "Bad Request");
    };

    debug!(%method, %url, "executing upstream request");

    let mut headers = HeaderMap::new();
    for (name, value) in parsed.forwarded_headers() {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            debug!(header = name, "skipping unrepresentable header");
            continue;
        };
        headers.append(name, value);
    }

    let result = client
        .request(method, &url)
        .headers(headers)
        .body(parsed.body.to_vec())
        .send()
        .await;

    match result {
        Ok(response) => serialize_response(response, max_frame_len).await,
        Err(e) if e.is_timeout() => {
            warn!(%url, "upstream request timed out");
            synthesize(504, "Gateway Timeout")
        }
        Err(e) => {
            warn!(%url, "upstream request failed: {e}");
            synthesize(502, "Bad Gateway")
        }
    }
}

/// Serialize a live response into RESPONSE payload bytes: status line,
/// headers with hop-by-hop stripped and `Content-Length` recomputed,
/// `Connection: close`, body.
async fn serialize_response(response: reqwest::Response, max_frame_len: u32) -> Vec<u8> {
    let status = response.status();
    let headers = response.headers().clone();

    if let Some(length) = response.content_length() {
        if length > u64::from(max_frame_len) {
            warn!(length, "upstream response exceeds frame cap");
            return synthesize(502, "Bad Gateway");
        }
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) if e.is_timeout() => {
            warn!("upstream body read timed out");
            return synthesize(504, "Gateway Timeout");
        }
        Err(e) => {
            warn!("upstream body read failed: {e}");
            return synthesize(502, "Bad Gateway");
        }
    };

    let mut out = Vec::with_capacity(body.len() + 512);
    out.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        )
        .as_bytes(),
    );
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) || *name == reqwest::header::CONTENT_LENGTH {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    out.extend_from_slice(b"Connection: close\r\n\r\n");
    out.extend_from_slice(&body);

    if out.len() > max_frame_len as usize {
        warn!(len = out.len(), "serialized response exceeds frame cap");
        return synthesize(502, "Bad Gateway");
    }
    out
}

/// Build a minimal synthesized response for gateway-level failures.
pub fn synthesize(status: u16, reason: &str) -> Vec<u8> {
    let body = format!("{status} {reason}\n");
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
    .into_bytes()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
