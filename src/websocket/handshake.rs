//! HTTP/1.1 Upgrade handshake.
//!
//! # Handshake Flow
//!
//! 1. Generate 16 random bytes and base64 them into `Sec-WebSocket-Key`
//! 2. Send the `GET` upgrade request
//! 3. Require an `HTTP/1.x 101` status line
//! 4. Read headers up to the blank line, unfolding continuation lines
//! 5. Check `Upgrade`, `Connection` and `Sec-WebSocket-Accept`
//!
//! The response is parsed from the same buffered reader that later feeds the
//! frame reader, so no frame bytes that arrive with the response are lost.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use url::{Host, Url};

use crate::network::{DEFAULT_WSS_PORT, DEFAULT_WS_PORT};
use crate::websocket::error::{WebSocketError, WsResult};

/// GUID appended to the client key before hashing (RFC 6455 section 1.3).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Connection parameters derived from a `ws://` or `wss://` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeTarget {
    /// Whether TLS must be negotiated before the handshake
    pub secure: bool,
    /// Host to connect to (and TLS server name)
    pub host: String,
    /// TCP port, defaulted from the scheme when absent
    pub port: u16,
    /// Value of the `Host` header; carries the port only if the URL did
    pub host_header: String,
    /// Path plus query string
    pub resource: String,
}

impl HandshakeTarget {
    /// Parse a WebSocket URL.
    ///
    /// # Errors
    ///
    /// - [`WebSocketError::InvalidUrl`] if the URL does not parse or has no host
    /// - [`WebSocketError::UnsupportedScheme`] for anything but `ws` and `wss`
    pub fn parse(url: &str) -> WsResult<Self> {
        let url = Url::parse(url)?;
        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(WebSocketError::UnsupportedScheme(other.to_string())),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(WebSocketError::InvalidUrl(format!("{url} has no host"))),
        };
        let authority = url.host_str().unwrap_or(&host).to_string();

        let host_header = match url.port() {
            Some(port) => format!("{authority}:{port}"),
            None => authority,
        };
        let port = url
            .port()
            .unwrap_or(if secure { DEFAULT_WSS_PORT } else { DEFAULT_WS_PORT });

        let mut resource = url.path().to_string();
        if resource.is_empty() {
            resource.push('/');
        }
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Self {
            secure,
            host,
            port,
            host_header,
            resource,
        })
    }
}

/// Compute the `Sec-WebSocket-Accept` value a server must return for `key`.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Fresh `Sec-WebSocket-Key`.
pub fn generate_key() -> String {
    BASE64_STANDARD.encode(rand::random::<[u8; 16]>())
}

/// Run the client side of the handshake.
///
/// On success `reader` is positioned at the first byte after the response headers.
pub async fn perform<R, W>(reader: &mut R, writer: &mut W, target: &HandshakeTarget) -> WsResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    perform_with_key(reader, writer, target, &generate_key()).await
}

async fn perform_with_key<R, W>(
    reader: &mut R,
    writer: &mut W,
    target: &HandshakeTarget,
    key: &str,
) -> WsResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(build_request(target, key).as_bytes()).await?;
    writer.flush().await?;

    let headers = read_response(reader).await?;
    validate_headers(&headers, key)
}

fn build_request(target: &HandshakeTarget, key: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        target.resource, target.host_header, key
    )
}

async fn read_response<R: AsyncBufRead + Unpin>(reader: &mut R) -> WsResult<Vec<(String, String)>> {
    let mut budget = MAX_HEADER_BYTES;

    let status_line = read_line(reader, &mut budget).await?;
    let mut parts = status_line.split_whitespace();
    let protocol = parts.next().unwrap_or_default();
    if !protocol.starts_with("HTTP/1.") {
        return Err(WebSocketError::IncompatibleProtocol(protocol.to_string()));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| WebSocketError::MalformedHeader(status_line.clone()))?;
    if status != 101 {
        return Err(WebSocketError::InvalidStatusCode(status));
    }

    let mut headers: Vec<(String, String)> = Vec::new();
    loop {
        let line = read_line(reader, &mut budget).await?;
        if line.is_empty() {
            return Ok(headers);
        }

        if line.starts_with(|c: char| c == ' ' || c == '\t') {
            match headers.last_mut() {
                Some((_, value)) => value.push_str(&line[1..]),
                None => return Err(WebSocketError::MalformedHeader(line)),
            }
            continue;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| WebSocketError::MalformedHeader(line.clone()))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, budget: &mut usize) -> WsResult<String> {
    let mut raw = Vec::new();
    let n = (&mut *reader)
        .take(*budget as u64)
        .read_until(b'\n', &mut raw)
        .await?;
    *budget -= n;

    if raw.last() != Some(&b'\n') {
        if *budget == 0 {
            return Err(WebSocketError::MalformedHeader(
                "response header section is too large".to_string(),
            ));
        }
        return Err(WebSocketError::UnexpectedEof);
    }
    raw.pop();
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

fn validate_headers(headers: &[(String, String)], key: &str) -> WsResult<()> {
    let upgrade = header(headers, "Upgrade").ok_or(WebSocketError::MissingHeader("Upgrade"))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(WebSocketError::InvalidUpgradeHeader(upgrade.to_string()));
    }

    let connection =
        header(headers, "Connection").ok_or(WebSocketError::MissingHeader("Connection"))?;
    if !connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(WebSocketError::InvalidConnectionHeader(connection.to_string()));
    }

    let accept = header(headers, "Sec-WebSocket-Accept")
        .ok_or(WebSocketError::MissingHeader("Sec-WebSocket-Accept"))?;
    if accept != accept_key(key) {
        return Err(WebSocketError::AcceptMismatch);
    }
    Ok(())
}
